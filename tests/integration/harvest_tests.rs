use std::sync::{Arc, Mutex};
use sumi_harvest::config::{RunnerConfig, UserAgentConfig};
use sumi_harvest::crawler::{
    run, ConcurrentRunner, Doer, ErrorHandler, HttpDoer, LogErrors, Request, Runner,
    SequentialRunner, TitleTask, PAGE_TITLE_SCHEMA,
};
use sumi_harvest::storage::{open_database, Database};
use sumi_harvest::task::AnyTask;
use sumi_harvest::HarvestError;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn doer() -> Arc<dyn Doer> {
    Arc::new(HttpDoer::from_config(&user_agent()).expect("Failed to build HTTP client"))
}

fn runner_config(workers: usize) -> RunnerConfig {
    RunnerConfig {
        workers,
        retry_count: 2,
    }
}

/// Opens a fresh database file with the page title table
fn create_database() -> (TempDir, Arc<Database>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = open_database(&dir.path().join("harvest.db")).expect("Failed to open database");
    db.execute_batch(PAGE_TITLE_SCHEMA)
        .expect("Failed to create schema");
    (dir, db)
}

fn stored_titles(db: &Database) -> Vec<(String, Option<String>, i64)> {
    let conn = db.lock().unwrap();
    let mut stmt = conn
        .prepare("SELECT url, title, link_count FROM page_title ORDER BY url")
        .unwrap();
    let rows: Vec<(String, Option<String>, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    rows
}

async fn mount_page(server: &MockServer, page: &str, title: &str) {
    let body = format!(
        r#"<html><head><title>{}</title></head><body><a href="/next">Next</a></body></html>"#,
        title
    );
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("Content-Type", "text/html"),
        )
        .mount(server)
        .await;
}

fn title_tasks(server: &MockServer, pages: &[&str]) -> Vec<AnyTask> {
    pages
        .iter()
        .map(|page| AnyTask::dom(TitleTask::new(&format!("{}{}", server.uri(), page)).unwrap()))
        .collect()
}

/// Remembers every error it is handed
#[derive(Default)]
struct Collect(Mutex<Vec<String>>);

impl ErrorHandler for Collect {
    fn handle_error(&self, _request: &Request, error: HarvestError) -> Result<(), HarvestError> {
        self.0.lock().unwrap().push(error.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_group_commits_every_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", "Page A").await;
    mount_page(&server, "/b", "Page B").await;
    let (_dir, db) = create_database();

    let runner = SequentialRunner::new(doer(), Arc::new(LogErrors), &runner_config(1));
    run(&runner, Arc::new(db.begin()), title_tasks(&server, &["/a", "/b"]))
        .await
        .unwrap();

    let rows = stored_titles(&db);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, format!("{}/a", server.uri()));
    assert_eq!(rows[0].1.as_deref(), Some("Page A"));
    assert_eq!(rows[0].2, 1);
    assert_eq!(rows[1].1.as_deref(), Some("Page B"));
}

#[tokio::test]
async fn test_missing_page_rolls_back_group() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", "Page A").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let (_dir, db) = create_database();
    let errors = Arc::new(Collect::default());

    let runner = SequentialRunner::new(doer(), errors.clone(), &runner_config(1));
    run(
        &runner,
        Arc::new(db.begin()),
        title_tasks(&server, &["/a", "/missing"]),
    )
    .await
    .unwrap();

    assert_eq!(*errors.0.lock().unwrap(), vec!["404 Not Found".to_string()]);
    assert!(stored_titles(&db).is_empty());
}

#[tokio::test]
async fn test_single_page_commits_on_its_own() {
    let server = MockServer::start().await;
    mount_page(&server, "/only", "Only").await;
    let (_dir, db) = create_database();

    let runner = SequentialRunner::new(doer(), Arc::new(LogErrors), &runner_config(1));
    run(&runner, Arc::new(db.begin()), title_tasks(&server, &["/only"]))
        .await
        .unwrap();

    assert_eq!(stored_titles(&db).len(), 1);
}

#[tokio::test]
async fn test_repeated_harvest_keeps_one_row_per_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", "Page A").await;
    let (_dir, db) = create_database();
    let runner = SequentialRunner::new(doer(), Arc::new(LogErrors), &runner_config(1));

    for _ in 0..2 {
        run(&runner, Arc::new(db.begin()), title_tasks(&server, &["/a"]))
            .await
            .unwrap();
    }

    assert_eq!(stored_titles(&db).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_group_commit() {
    let server = MockServer::start().await;
    let pages = ["/1", "/2", "/3", "/4", "/5", "/6"];
    for page in pages {
        mount_page(&server, page, &format!("Page {}", page)).await;
    }
    let (_dir, db) = create_database();

    let runner = ConcurrentRunner::new(doer(), Arc::new(LogErrors), &runner_config(3));
    run(&runner, Arc::new(db.begin()), title_tasks(&server, &pages))
        .await
        .unwrap();
    runner.close().await;

    assert_eq!(stored_titles(&db).len(), pages.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_missing_page_rolls_back_group() {
    let server = MockServer::start().await;
    let pages = ["/1", "/2", "/3", "/4", "/missing"];
    for page in &pages[..4] {
        mount_page(&server, page, &format!("Page {}", page)).await;
    }
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let (_dir, db) = create_database();
    let errors = Arc::new(Collect::default());

    let runner = ConcurrentRunner::new(doer(), errors.clone(), &runner_config(3));
    run(&runner, Arc::new(db.begin()), title_tasks(&server, &pages))
        .await
        .unwrap();
    runner.close().await;

    assert_eq!(*errors.0.lock().unwrap(), vec!["404 Not Found".to_string()]);
    assert!(stored_titles(&db).is_empty());

    // The group released the database, so a later harvest still commits
    let sequential = SequentialRunner::new(doer(), Arc::new(LogErrors), &runner_config(1));
    run(&sequential, Arc::new(db.begin()), title_tasks(&server, &["/1"]))
        .await
        .unwrap();
    assert_eq!(stored_titles(&db).len(), 1);
}

#[tokio::test]
async fn test_unreachable_host_reaches_error_handler() {
    let (_dir, db) = create_database();
    let errors = Arc::new(Collect::default());
    let runner = SequentialRunner::new(doer(), errors.clone(), &runner_config(1));

    // Nothing listens on port 1
    let task = AnyTask::dom(TitleTask::new("http://127.0.0.1:1/").unwrap());
    run(&runner, Arc::new(db.begin()), vec![task]).await.unwrap();

    let errors = errors.0.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Transport error for http://127.0.0.1:1/"));
    assert!(stored_titles(&db).is_empty());
}

#[tokio::test]
async fn test_aborting_handler_stops_the_group() {
    let server = MockServer::start().await;
    mount_page(&server, "/b", "Page B").await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    let (_dir, db) = create_database();

    let abort = |_: &Request, e: HarvestError| -> Result<(), HarvestError> { Err(e) };
    let runner = SequentialRunner::new(doer(), Arc::new(abort), &runner_config(1));
    let err = run(
        &runner,
        Arc::new(db.begin()),
        title_tasks(&server, &["/gone", "/b"]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HarvestError::Status { code: 410, .. }));
    assert!(stored_titles(&db).is_empty());
    // "/b" is never fetched
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}
