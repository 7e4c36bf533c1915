//! Shared helpers for integration tests.
#![allow(dead_code)]

use simpledb::{Database, DbConfig, Session};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A database backed by a file in a temporary directory.
///
/// Field order matters: the database closes its connections before the
/// directory is removed.
pub struct TestDb {
    pub db: Database,
    pub url: String,
    _dir: TempDir,
}

/// Route library logs to the test harness (`RUST_LOG=simpledb=debug`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn sqlite_db() -> TestDb {
    sqlite_db_with_trace(false)
}

pub fn sqlite_db_with_trace(trace: bool) -> TestDb {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("test.db").display());
    let config = DbConfig::parse(&url).unwrap().with_trace(trace);
    TestDb {
        db: Database::connect(config).unwrap(),
        url,
        _dir: dir,
    }
}

pub fn create_articles(session: &Session) {
    session
        .run(
            "CREATE TABLE article (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT,
                views INTEGER,
                published BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME
            )",
            (),
        )
        .unwrap();
}

/// Insert `count` articles titled `article-1..=count`; returns their ids.
pub fn seed_articles(session: &Session, count: usize) -> Vec<i64> {
    (1..=count)
        .map(|i| {
            session
                .gen_sql()
                .append("INSERT INTO article (title, views, published)", ())
                .append("VALUES (?, ?, ?)", (format!("article-{}", i), i as i64, i % 2 == 0))
                .insert()
                .unwrap()
                .unwrap()
        })
        .collect()
}

pub fn count_articles(session: &Session) -> i64 {
    session
        .gen_sql()
        .append("SELECT COUNT(*) FROM article", ())
        .select_long()
        .unwrap()
        .unwrap()
}
