#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use ydb::prelude::*;

static ENGINE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Opens a session on a fresh in-memory database.
pub async fn memory_session() -> Session {
    let engine = format!("test-{}", ENGINE_COUNTER.fetch_add(1, Ordering::SeqCst));
    register_engine(engine.clone(), "sqlite::memory:");
    Session::connect(&engine)
        .await
        .unwrap_or_else(|e| panic!("Failed to open session on {engine}: {e}"))
}

/// Opens a session on the SQLite file at `path`.
pub async fn file_session(path: &std::path::Path) -> Session {
    let engine = format!("test-{}", ENGINE_COUNTER.fetch_add(1, Ordering::SeqCst));
    register_engine(engine.clone(), format!("sqlite://{}", path.display()));
    Session::connect(&engine)
        .await
        .unwrap_or_else(|e| panic!("Failed to open session on {}: {e}", path.display()))
}

/// Declares `user v0.1.0` with a 32-byte id and an indexed email.
pub async fn declare_user(session: &mut Session) -> Materialized {
    session
        .begin_table("user v0.1.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(32)).not_null())
        .unwrap()
        .column(ColumnSpec::scalar("email", ScalarType::Text))
        .unwrap()
        .unique(["id"])
        .unwrap()
        .index(["email"])
        .unwrap()
        .finalize(session)
        .await
        .unwrap()
}

/// The `register(id, email)` method, allowing up to `n` rows per email.
pub fn register_method(n: u64) -> ApiMethod {
    ApiMethod::new("register")
        .param("id", ValueKind::Text)
        .param("email", ValueKind::Text)
        .limit(n, "email={email}")
        .insert([("id", "{id}"), ("email", "{email}")])
}

pub fn args(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

/// Counts the rows of a physical table.
pub async fn count_rows(session: &Session, physical: &str) -> i64 {
    let rows = session
        .connection()
        .unwrap()
        .query(&format!("SELECT COUNT(*) FROM \"{physical}\""), &[])
        .await
        .unwrap();
    match rows[0][0] {
        Value::Int(n) => n,
        ref other => panic!("Expected a count, got {other:?}"),
    }
}
