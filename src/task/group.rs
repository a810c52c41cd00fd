//! Group transactions
//!
//! A [`TaskGroup`] runs several storable tasks that share one base
//! transaction. Every member commits or rolls back on its own; the
//! [`GroupTx`] counts those calls as votes and hands the base transaction a
//! single commit once every member voted to commit, or a single rollback as
//! soon as all votes are in and any of them was a rollback.

use crate::crawler::Runner;
use crate::schema::Entity;
use crate::storage::{StorageError, StorageResult, Storer, Tx};
use crate::task::{AnyTask, Atomized, StorableTask};
use crate::HarvestError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Tally {
    remaining: usize,
    all_succeeded: bool,
}

/// A transaction shared by `n` participants
///
/// `store` goes straight to the base transaction, which therefore has to
/// accept concurrent calls. `commit` and `rollback` are votes: the base
/// transaction receives exactly one terminal call, after the last vote.
pub struct GroupTx {
    inner: Arc<dyn Tx>,
    tally: Mutex<Tally>,
}

impl GroupTx {
    pub fn new(inner: Arc<dyn Tx>, participants: usize) -> Self {
        Self {
            inner,
            tally: Mutex::new(Tally {
                remaining: participants,
                all_succeeded: true,
            }),
        }
    }

    /// Votes still missing before the base transaction is finished
    pub fn remaining(&self) -> StorageResult<usize> {
        let tally = self.tally.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(tally.remaining)
    }

    fn vote(&self, success: bool) -> StorageResult<()> {
        // Held through the terminal call.
        let mut tally = self.tally.lock().map_err(|_| StorageError::Poisoned)?;
        if tally.remaining == 0 {
            return Err(StorageError::Finished);
        }

        tally.remaining -= 1;
        tally.all_succeeded &= success;
        if tally.remaining > 0 {
            return Ok(());
        }

        if tally.all_succeeded {
            tracing::debug!("All group members succeeded, committing");
            self.inner.commit()
        } else {
            tracing::debug!("Group member failed, rolling back");
            self.inner.rollback()
        }
    }
}

impl Storer for GroupTx {
    fn store(&self, value: Box<dyn Entity>) -> StorageResult<()> {
        self.inner.store(value)
    }
}

impl Tx for GroupTx {
    fn commit(&self) -> StorageResult<()> {
        self.vote(true)
    }

    fn rollback(&self) -> StorageResult<()> {
        self.vote(false)
    }
}

/// One member's view of the group: it may vote once
struct Ballot {
    group: Arc<GroupTx>,
    voted: AtomicBool,
}

impl Ballot {
    fn new(group: Arc<GroupTx>) -> Self {
        Self {
            group,
            voted: AtomicBool::new(false),
        }
    }

    fn cast(&self, success: bool) -> StorageResult<()> {
        if self.voted.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Finished);
        }
        self.group.vote(success)
    }

    fn has_voted(&self) -> bool {
        self.voted.load(Ordering::SeqCst)
    }
}

impl Storer for Ballot {
    fn store(&self, value: Box<dyn Entity>) -> StorageResult<()> {
        self.group.store(value)
    }
}

impl Tx for Ballot {
    fn commit(&self) -> StorageResult<()> {
        self.cast(true)
    }

    fn rollback(&self) -> StorageResult<()> {
        self.cast(false)
    }
}

/// Storable tasks committed together into one base transaction
pub struct TaskGroup {
    tasks: Vec<Box<dyn StorableTask>>,
    tx: Arc<dyn Tx>,
}

impl TaskGroup {
    pub fn new(tx: Arc<dyn Tx>) -> Self {
        Self {
            tasks: Vec::new(),
            tx,
        }
    }

    /// Adds a member
    ///
    /// # Panics
    ///
    /// Panics if `task` is already transactional; see
    /// [`AnyTask::into_storable`].
    pub fn add(&mut self, task: AnyTask) {
        self.tasks.push(task.into_storable());
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every member through `runner`
    ///
    /// An empty group succeeds without touching the base transaction. If the
    /// runner gives up on a member, every member not yet run votes to roll
    /// back and the runner's error is returned.
    pub async fn run(self, runner: &dyn Runner) -> Result<(), HarvestError> {
        if self.tasks.is_empty() {
            return Ok(());
        }

        let group = Arc::new(GroupTx::new(self.tx, self.tasks.len()));
        let ballots: Vec<Arc<Ballot>> = (0..self.tasks.len())
            .map(|_| Arc::new(Ballot::new(group.clone())))
            .collect();

        for (i, task) in self.tasks.into_iter().enumerate() {
            let member: Arc<dyn Tx> = ballots[i].clone();
            if let Err(e) = runner.run(Box::new(Atomized::new(task, member))).await {
                for ballot in ballots[i..].iter().filter(|b| !b.has_voted()) {
                    if let Err(vote_err) = ballot.rollback() {
                        tracing::debug!("Ignoring rollback vote error: {}", vote_err);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{Body, Request, Response};
    use crate::schema::{Attribute, Record, Value};
    use crate::task::{Requester, Task, TextTask};
    use crate::storage::Database;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        stores: AtomicUsize,
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    impl Storer for Counting {
        fn store(&self, _value: Box<dyn Entity>) -> StorageResult<()> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Tx for Counting {
        fn commit(&self) -> StorageResult<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn rollback(&self) -> StorageResult<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn row(id: i64) -> Record {
        Record::from_attributes(
            "Item",
            vec![
                Attribute::new("ID", Some(Value::Int(id)), false),
                Attribute::new("Label", Some(Value::Text(format!("item {}", id))), false),
            ],
        )
    }

    /// Stores one row, failing on a `fail` body
    struct Member {
        id: i64,
    }

    impl Requester for Member {
        fn request(&self) -> Request {
            Request::get(&format!("https://example.com/{}", self.id)).unwrap()
        }
    }

    #[async_trait]
    impl TextTask for Member {
        async fn handle(&self, body: &mut Body, storer: &dyn Storer) -> Result<(), HarvestError> {
            storer.store(Box::new(row(self.id)))?;
            if body.text().await? == "fail" {
                return Err(anyhow::anyhow!("member {} failed", self.id).into());
            }
            Ok(())
        }
    }

    /// Answers every request in place, `fail` for the listed paths
    struct InlineRunner {
        failing: Vec<&'static str>,
        abort: bool,
    }

    impl InlineRunner {
        fn new(failing: Vec<&'static str>) -> Self {
            Self {
                failing,
                abort: false,
            }
        }
    }

    #[async_trait]
    impl Runner for InlineRunner {
        async fn run(&self, task: Box<dyn Task>) -> Result<(), HarvestError> {
            let request = task.request();
            let body = if self.failing.contains(&request.url.path()) {
                "fail"
            } else {
                "ok"
            };
            let mut response = Response::new(StatusCode::OK, request.url, Body::from_bytes(body));
            match Task::handle(&task, Some(&mut response)).await {
                Err(e) if self.abort => Err(e),
                _ => Ok(()),
            }
        }

        async fn close(&self) {}
    }

    fn group_of(ids: &[i64], tx: Arc<dyn Tx>) -> TaskGroup {
        let mut group = TaskGroup::new(tx);
        for &id in ids {
            group.add(AnyTask::text(Member { id }));
        }
        group
    }

    #[test]
    fn test_single_terminal_call_after_last_vote() {
        let base = Arc::new(Counting::default());
        let group = GroupTx::new(base.clone(), 3);

        group.commit().unwrap();
        group.commit().unwrap();
        assert_eq!(base.commits.load(Ordering::SeqCst), 0);
        assert_eq!(group.remaining().unwrap(), 1);

        group.commit().unwrap();
        assert_eq!(group.remaining().unwrap(), 0);
        assert_eq!(base.commits.load(Ordering::SeqCst), 1);
        assert_eq!(base.rollbacks.load(Ordering::SeqCst), 0);
    }

    /// Panics on its terminal call
    struct Exploding;

    impl Storer for Exploding {
        fn store(&self, _value: Box<dyn Entity>) -> StorageResult<()> {
            Ok(())
        }
    }

    impl Tx for Exploding {
        fn commit(&self) -> StorageResult<()> {
            panic!("commit exploded");
        }

        fn rollback(&self) -> StorageResult<()> {
            panic!("rollback exploded");
        }
    }

    #[test]
    fn test_poisoned_tally_is_reported() {
        let group = GroupTx::new(Arc::new(Exploding), 1);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| group.commit()));
        assert!(outcome.is_err());

        assert!(matches!(group.remaining(), Err(StorageError::Poisoned)));
        assert!(matches!(group.rollback(), Err(StorageError::Poisoned)));
    }

    #[test]
    fn test_one_rollback_vote_rolls_back() {
        let base = Arc::new(Counting::default());
        let group = GroupTx::new(base.clone(), 3);

        group.commit().unwrap();
        group.rollback().unwrap();
        group.commit().unwrap();

        assert_eq!(base.commits.load(Ordering::SeqCst), 0);
        assert_eq!(base.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extra_vote_is_rejected() {
        let base = Arc::new(Counting::default());
        let group = GroupTx::new(base.clone(), 1);

        group.commit().unwrap();
        assert!(matches!(group.commit(), Err(StorageError::Finished)));
        assert_eq!(base.commits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ballot_votes_once() {
        let base = Arc::new(Counting::default());
        let ballot = Ballot::new(Arc::new(GroupTx::new(base.clone(), 2)));

        ballot.commit().unwrap();
        assert!(matches!(ballot.rollback(), Err(StorageError::Finished)));
        assert_eq!(base.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_votes() {
        let base = Arc::new(Counting::default());
        let group = Arc::new(GroupTx::new(base.clone(), 16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let group = group.clone();
                std::thread::spawn(move || group.commit().unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(base.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_group_leaves_base_untouched() {
        let base = Arc::new(Counting::default());
        TaskGroup::new(base.clone())
            .run(&InlineRunner::new(vec![]))
            .await
            .unwrap();

        assert_eq!(base.commits.load(Ordering::SeqCst), 0);
        assert_eq!(base.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_members_succeed_commits_once() {
        let base = Arc::new(Counting::default());
        group_of(&[1, 2, 3], base.clone())
            .run(&InlineRunner::new(vec![]))
            .await
            .unwrap();

        assert_eq!(base.stores.load(Ordering::SeqCst), 3);
        assert_eq!(base.commits.load(Ordering::SeqCst), 1);
        assert_eq!(base.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_failing_member_rolls_back_once() {
        let base = Arc::new(Counting::default());
        group_of(&[1, 2, 3], base.clone())
            .run(&InlineRunner::new(vec!["/2"]))
            .await
            .unwrap();

        assert_eq!(base.stores.load(Ordering::SeqCst), 3);
        assert_eq!(base.commits.load(Ordering::SeqCst), 0);
        assert_eq!(base.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_runner_abort_votes_for_unrun_members() {
        let base = Arc::new(Counting::default());
        let runner = InlineRunner {
            failing: vec!["/1"],
            abort: true,
        };

        let err = group_of(&[1, 2, 3], base.clone())
            .run(&runner)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "member 1 failed");
        assert_eq!(base.stores.load(Ordering::SeqCst), 1);
        assert_eq!(base.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(base.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_group_commit_into_sqlite() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE item (id INTEGER PRIMARY KEY, label TEXT)")
            .unwrap();

        group_of(&[1, 2], Arc::new(db.begin()))
            .run(&InlineRunner::new(vec![]))
            .await
            .unwrap();

        let conn = db.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_group_rollback_leaves_sqlite_empty() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE item (id INTEGER PRIMARY KEY, label TEXT)")
            .unwrap();

        group_of(&[1, 2], Arc::new(db.begin()))
            .run(&InlineRunner::new(vec!["/1"]))
            .await
            .unwrap();

        let conn = db.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
