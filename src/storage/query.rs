//! Parameterized query construction for records
//!
//! Only two statement shapes are produced: a conditional insert and a keyed
//! update or delete. Placeholders are written as `?` and renumbered to the
//! positional `$1, $2, ...` form once the command text is complete.

use crate::schema::{db_type, key, non_key, non_null, values, Field, Record, Value};
use rusqlite::Connection;
use std::fmt;

/// A command with its positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub command: String,
    pub args: Vec<Option<Value>>,
}

impl Query {
    /// Executes the query, returning the number of affected rows
    pub fn execute(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(&self.command, rusqlite::params_from_iter(self.args.iter()))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.command)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                Some(v) => write!(f, "{}", v)?,
                None => write!(f, "NULL")?,
            }
        }
        write!(f, "]")
    }
}

/// Builds a query inserting the record unless a row with its keys exists
///
/// Inserted columns are the DB-typed, non-null fields. A record without key
/// fields is inserted unconditionally.
pub fn insert_ignore_query(record: &Record) -> Query {
    let fields = record.select(&[db_type, non_null]);
    let keys = record.select(&[key]);

    let mut parts = vec![
        "INSERT INTO".to_string(),
        quote(&record.name),
        brace(&field_list(&fields)),
        "SELECT".to_string(),
        placeholder_list(fields.len()),
    ];
    if !keys.is_empty() {
        parts.push("WHERE NOT EXISTS".to_string());
        parts.push(brace(&join(&[
            "SELECT 1 FROM".to_string(),
            quote(&record.name),
            "WHERE".to_string(),
            field_equal_list(&keys, " AND "),
        ])));
    }

    let mut args = values(&fields);
    args.extend(values(&keys));
    Query {
        command: positional(&join(&parts)),
        args,
    }
}

/// Builds a query updating the non-key fields of the row matching the keys
///
/// When the record has no non-key field to set, the key fields themselves are
/// set so the statement stays valid.
pub fn update_query(record: &Record) -> Query {
    let keys = record.select(&[key]);
    let mut rest = record.select(&[non_key, db_type, non_null]);
    if rest.is_empty() {
        rest = keys.clone();
    }

    let command = join(&[
        "UPDATE".to_string(),
        quote(&record.name),
        "SET".to_string(),
        field_equal_list(&rest, ", "),
        "WHERE".to_string(),
        field_equal_list(&keys, " AND "),
    ]);

    let mut args = values(&rest);
    args.extend(values(&keys));
    Query {
        command: positional(&command),
        args,
    }
}

/// Builds a query deleting rows matching the record
///
/// Every DB-typed, non-null field takes part in the predicate, not only the
/// key fields.
pub fn delete_query(record: &Record) -> Query {
    let fields = record.select(&[db_type, non_null]);
    let command = join(&[
        "DELETE FROM".to_string(),
        quote(&record.name),
        "WHERE".to_string(),
        field_equal_list(&fields, " AND "),
    ]);

    Query {
        command: positional(&command),
        args: values(&fields),
    }
}

fn field_list(fields: &[&Field]) -> String {
    fields
        .iter()
        .map(|f| quote(&f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholder_list(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn field_equal_list(fields: &[&Field], sep: &str) -> String {
    fields
        .iter()
        .map(|f| format!("{}=?", quote(&f.name)))
        .collect::<Vec<_>>()
        .join(sep)
}

fn join(parts: &[String]) -> String {
    parts.join(" ")
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

fn brace(s: &str) -> String {
    format!("({})", s)
}

/// Rewrites `?` placeholders as `$1, $2, ...` in textual order
fn positional(command: &str) -> String {
    let mut out = String::with_capacity(command.len() + 8);
    let mut n = 1;
    for c in command.chars() {
        if c == '?' {
            out.push('$');
            out.push_str(&n.to_string());
            n += 1;
        } else {
            out.push(c);
        }
    }
    out
}
