//! Integration tests for table declarations and version migrations.
//!
//! Each version of a table lives in its own physical table; these tests
//! declare versions through a session and check both the reported plan and
//! the rows that end up in the new version.

mod common;

use common::{count_rows, declare_user, file_session, memory_session};
use ydb::prelude::*;

async fn declare_article_v1(session: &mut Session) {
    session
        .begin_table("article v0.1.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null())
        .unwrap()
        .column(ColumnSpec::scalar("title", ScalarType::Text))
        .unwrap()
        .finalize(session)
        .await
        .unwrap();
}

async fn insert_articles(session: &Session, titles: &[&str]) {
    let conn = session.connection().unwrap();
    for (i, title) in titles.iter().enumerate() {
        let id = vec![b'a', b'0' + u8::try_from(i).unwrap(), 0, 0];
        conn.execute(
            "INSERT INTO \"article_v0_1_0\" (\"id\", \"title\") VALUES (?, ?)",
            &[Value::Blob(id), Value::from(*title)],
        )
        .await
        .unwrap();
    }
}

async fn select_all(session: &Session, sql: &str) -> Vec<Row> {
    session.connection().unwrap().query(sql, &[]).await.unwrap()
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_create_records_catalog() {
    let mut session = memory_session().await;
    assert_eq!(declare_user(&mut session).await, Materialized::Created);

    let schema = session.table("user").unwrap();
    assert_eq!(schema.id.to_string(), "user 0.1.0");
    assert_eq!(schema.columns.len(), 2);

    let catalog = Catalog::new(session.connection().unwrap().clone());
    let stored = catalog
        .get_schema(&"user 0.1.0".parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&stored.schema, schema);

    let indexes = select_all(
        &session,
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'user_v0_1_0' ORDER BY name",
    )
    .await;
    assert_eq!(
        indexes,
        vec![
            vec![Value::from("user_v0_1_0_ix_email")],
            vec![Value::from("user_v0_1_0_uq_id")],
        ]
    );
}

#[tokio::test]
async fn test_duplicate_schema_keeps_first_declaration() {
    let mut session = memory_session().await;
    declare_article_v1(&mut session).await;
    insert_articles(&session, &["hello"]).await;

    let err = session
        .begin_table("article v0.1.0")
        .unwrap()
        .column(ColumnSpec::scalar("body", ScalarType::Text))
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSchema);

    assert_eq!(session.table("article").unwrap().columns.len(), 2);
    assert_eq!(count_rows(&session, "article_v0_1_0").await, 1);
}

#[tokio::test]
async fn test_constraint_on_undeclared_column() {
    let session = memory_session().await;
    let err = session
        .begin_table("user v0.1.0")
        .unwrap()
        .column(ColumnSpec::scalar("email", ScalarType::Text))
        .unwrap()
        .unique(["id"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeclaration);
}

#[tokio::test]
async fn test_sql_preview() {
    let mut session = memory_session().await;
    declare_user(&mut session).await;

    let builder = session
        .begin_table("article v0.1.0")
        .unwrap()
        .column(
            ColumnSpec::from_args("author", ColumnShape::FixedBytes(32), &["id@user"]).unwrap(),
        )
        .unwrap()
        .column(ColumnSpec::from_args("body", ColumnShape::Scalar(ScalarType::Text), &["'empty'"]).unwrap())
        .unwrap();

    let sql = builder.sql(&session).await.unwrap();
    assert_eq!(
        sql,
        vec![
            "CREATE TABLE \"article_v0_1_0\" (\n  \
             \"author\" BLOB CHECK (length(\"author\") = 32) REFERENCES \"user_v0_1_0\"(\"id\"),\n  \
             \"body\" TEXT DEFAULT 'empty'\n)"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_reference_to_undeclared_table() {
    let mut session = memory_session().await;
    let err = session
        .begin_table("article v0.1.0")
        .unwrap()
        .column(
            ColumnSpec::new("author", ColumnShape::FixedBytes(32))
                .references("id@user".parse().unwrap()),
        )
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeclaration);
    assert!(session.table("article").is_none());
}

#[tokio::test]
async fn test_reference_shape_must_match() {
    let mut session = memory_session().await;
    declare_user(&mut session).await;
    let err = session
        .begin_table("article v0.1.0")
        .unwrap()
        .column(
            ColumnSpec::new("author", ColumnShape::FixedBytes(16))
                .references("id@user".parse().unwrap()),
        )
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeclaration);
}

// =============================================================================
// Migrations
// =============================================================================

#[tokio::test]
async fn test_additive_migration_with_default() {
    let mut session = memory_session().await;
    declare_article_v1(&mut session).await;
    insert_articles(&session, &["first", "second"]).await;

    let outcome = session
        .begin_table("article v0.2.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null())
        .unwrap()
        .column(ColumnSpec::scalar("title", ScalarType::Text))
        .unwrap()
        .column(ColumnSpec::scalar("body", ScalarType::Text).default("empty"))
        .unwrap()
        .from("article v0.1.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Materialized::Migrated {
            plan: MigrationPlan::Additive {
                new_columns: vec!["body".to_string()],
                widened: vec![],
            },
            rows: 2,
        }
    );
    assert_eq!(session.table("article").unwrap().id.to_string(), "article 0.2.0");

    let rows = select_all(
        &session,
        "SELECT \"title\", \"body\" FROM \"article_v0_2_0\" ORDER BY \"title\"",
    )
    .await;
    assert_eq!(
        rows,
        vec![
            vec![Value::from("first"), Value::from("empty")],
            vec![Value::from("second"), Value::from("empty")],
        ]
    );
    // The prior version is left as it was.
    assert_eq!(count_rows(&session, "article_v0_1_0").await, 2);
}

#[tokio::test]
async fn test_widening_pads_rows_and_applies_renames() {
    let mut session = memory_session().await;
    declare_article_v1(&mut session).await;
    insert_articles(&session, &["first"]).await;

    let outcome = session
        .begin_table("article v0.2.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(8)).not_null())
        .unwrap()
        .column(ColumnSpec::scalar("headline", ScalarType::Text))
        .unwrap()
        .column(ColumnSpec::scalar("views", ScalarType::Int64).not_null())
        .unwrap()
        .from(
            "article v0.1.0",
            MigrationSpec::new().rename("headline", "title").fill("views", 0),
        )
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap();
    assert!(matches!(outcome, Materialized::Migrated { rows: 1, .. }));

    let rows = select_all(
        &session,
        "SELECT \"id\", \"headline\", \"views\" FROM \"article_v0_2_0\"",
    )
    .await;
    assert_eq!(
        rows,
        vec![vec![
            Value::Blob(vec![b'a', b'0', 0, 0, 0, 0, 0, 0]),
            Value::from("first"),
            Value::Int(0),
        ]]
    );
}

#[tokio::test]
async fn test_narrowing_is_incompatible() {
    let mut session = memory_session().await;
    declare_article_v1(&mut session).await;

    let err = session
        .begin_table("article v0.2.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(2)).not_null())
        .unwrap()
        .from("article v0.1.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleMigration);
    assert_eq!(session.table("article").unwrap().id.to_string(), "article 0.1.0");

    let tables = select_all(
        &session,
        "SELECT name FROM sqlite_master WHERE name = 'article_v0_2_0'",
    )
    .await;
    assert!(tables.is_empty());
}

#[tokio::test]
async fn test_migration_from_undeclared_version() {
    let mut session = memory_session().await;
    let err = session
        .begin_table("article v0.2.0")
        .unwrap()
        .column(ColumnSpec::scalar("title", ScalarType::Text))
        .unwrap()
        .from("article v0.1.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeclaration);

    let err = session
        .begin_table("article v0.2.0")
        .unwrap()
        .from("article v0.3.0", MigrationSpec::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeclaration);
}

#[tokio::test]
async fn test_dropped_column_cannot_come_back() {
    let mut session = memory_session().await;
    declare_article_v1(&mut session).await;

    let outcome = session
        .begin_table("article v0.2.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null())
        .unwrap()
        .from("article v0.1.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Materialized::Migrated {
            plan: MigrationPlan::Destructive { .. },
            ..
        }
    ));

    let err = session
        .begin_table("article v0.3.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null())
        .unwrap()
        .column(ColumnSpec::scalar("title", ScalarType::Text))
        .unwrap()
        .from("article v0.2.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleMigration);
}

// =============================================================================
// Persistence across sessions
// =============================================================================

#[tokio::test]
async fn test_reopened_database_adopts_and_migrates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ydb.sqlite3");

    {
        let mut session = file_session(&path).await;
        declare_article_v1(&mut session).await;
        insert_articles(&session, &["kept"]).await;
    }

    let mut session = file_session(&path).await;

    let err = session
        .begin_table("article v0.1.0")
        .unwrap()
        .column(ColumnSpec::scalar("title", ScalarType::Text))
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSchema);

    let outcome = session
        .begin_table("article v0.2.0")
        .unwrap()
        .column(ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null())
        .unwrap()
        .column(ColumnSpec::scalar("title", ScalarType::Text))
        .unwrap()
        .column(ColumnSpec::scalar("body", ScalarType::Text).default("empty"))
        .unwrap()
        .from("article v0.1.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap();
    assert!(matches!(outcome, Materialized::Migrated { rows: 1, .. }));

    let mut other = file_session(&path).await;
    declare_article_v1(&mut other).await;
    assert_eq!(
        other.table("article").unwrap().id.to_string(),
        "article 0.1.0"
    );
}

// =============================================================================
// Fixed arrays
// =============================================================================

#[tokio::test]
async fn test_lengthened_array_migrates_rows() {
    let mut session = memory_session().await;
    let shape = |len| ColumnShape::FixedArray {
        element: ScalarType::Int64,
        len,
    };
    session
        .begin_table("sample v0.1.0")
        .unwrap()
        .column(ColumnSpec::new("xs", shape(3)))
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap();
    session
        .connection()
        .unwrap()
        .execute(
            "INSERT INTO \"sample_v0_1_0\" (\"xs\") VALUES (?)",
            &[Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])],
        )
        .await
        .unwrap();

    let outcome = session
        .begin_table("sample v0.2.0")
        .unwrap()
        .column(ColumnSpec::new("xs", shape(4)))
        .unwrap()
        .from("sample v0.1.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Materialized::Migrated {
            plan: MigrationPlan::Additive {
                new_columns: vec![],
                widened: vec!["xs".to_string()],
            },
            rows: 1,
        }
    );

    let rows = select_all(&session, "SELECT \"xs\" FROM \"sample_v0_2_0\"").await;
    assert_eq!(rows, vec![vec![Value::from("[1,2,3,null]")]]);
}

#[tokio::test]
async fn test_shortened_array_is_incompatible() {
    let mut session = memory_session().await;
    let shape = |len| ColumnShape::FixedArray {
        element: ScalarType::Int64,
        len,
    };
    session
        .begin_table("sample v0.1.0")
        .unwrap()
        .column(ColumnSpec::new("xs", shape(4)))
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap();

    let err = session
        .begin_table("sample v0.2.0")
        .unwrap()
        .column(ColumnSpec::new("xs", shape(3)))
        .unwrap()
        .from("sample v0.1.0", MigrationSpec::new())
        .unwrap()
        .finalize(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleMigration);
    assert!(session.table("sample").is_some_and(|t| t.id.version == Version::new(0, 1, 0)));
}
