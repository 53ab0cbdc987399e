use super::*;
use crate::{
    config::BackendConfig,
    db::mutation::{ColumnValues, Key, KeyRange, KeySet, Mutation},
    error::ErrorClass,
    value::Value,
};

fn foo_schema() -> TableSchema {
    TableSchema::try_new("FOO", ["ID", "NAME"], ["ID"]).unwrap()
}

fn backend() -> MemoryBackend {
    let backend = MemoryBackend::new(BackendConfig::default());
    backend.create_table_if_missing(&foo_schema()).unwrap();
    backend
}

fn row(id: i64, name: &str) -> ColumnValues {
    ColumnValues::new().with("ID", id).with("NAME", name)
}

fn commit_all(backend: &MemoryBackend, mutations: &[Mutation]) -> Result<(), InternalError> {
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            for mutation in mutations {
                ctx.buffer(mutation.clone())?;
            }
            Ok(WorkOutcome::Commit)
        })
        .map(|_| ())
}

#[test]
fn schema_rejects_unknown_key_column() {
    let err = TableSchema::try_new("T", ["A"], ["B"]).unwrap_err();
    assert_eq!(err.class, ErrorClass::Validation);

    let err = TableSchema::try_new("T", ["A", "A"], ["A"]).unwrap_err();
    assert_eq!(err.class, ErrorClass::Validation);

    let err = TableSchema::try_new("T", ["A"], Vec::<String>::new()).unwrap_err();
    assert_eq!(err.class, ErrorClass::Validation);
}

#[test]
fn create_table_is_idempotent() {
    let backend = backend();
    backend.create_table_if_missing(&foo_schema()).unwrap();

    let other = TableSchema::try_new("FOO", ["ID", "NAME"], ["NAME"]).unwrap();
    let err = backend.create_table_if_missing(&other).unwrap_err();
    assert_eq!(err.class, ErrorClass::AlreadyExists);
    assert_eq!(backend.table("FOO"), Some(foo_schema()));
}

#[test]
fn insert_update_and_upsert_semantics() {
    let backend = backend();
    commit_all(&backend, &[Mutation::insert("FOO", row(1, "a"))]).unwrap();

    let err = commit_all(&backend, &[Mutation::insert("FOO", row(1, "b"))]).unwrap_err();
    assert_eq!(err.class, ErrorClass::AlreadyExists);

    let err = commit_all(&backend, &[Mutation::update("FOO", row(2, "b"))]).unwrap_err();
    assert_eq!(err.class, ErrorClass::NotFound);

    commit_all(
        &backend,
        &[
            Mutation::update("FOO", row(1, "renamed")),
            Mutation::insert_or_update("FOO", row(2, "two")),
        ],
    )
    .unwrap();

    assert_eq!(backend.get("FOO", &Key::single(1)), Some(row(1, "renamed")));
    assert_eq!(backend.get("FOO", &Key::single(2)), Some(row(2, "two")));
}

#[test]
fn update_merges_unbound_columns() {
    let backend = backend();
    commit_all(&backend, &[Mutation::insert("FOO", row(1, "a"))]).unwrap();
    commit_all(
        &backend,
        &[Mutation::update("FOO", ColumnValues::new().with("ID", 1))],
    )
    .unwrap();

    assert_eq!(backend.get("FOO", &Key::single(1)), Some(row(1, "a")));
}

#[test]
fn failed_commit_leaves_no_partial_writes() {
    let backend = backend();
    let err = commit_all(
        &backend,
        &[
            Mutation::insert("FOO", row(1, "a")),
            Mutation::update("FOO", row(9, "missing")),
        ],
    )
    .unwrap_err();

    assert_eq!(err.class, ErrorClass::NotFound);
    assert_eq!(backend.row_count("FOO"), 0);
}

#[test]
fn writes_must_bind_known_columns_and_keys() {
    let backend = backend();

    let err = commit_all(
        &backend,
        &[Mutation::insert("FOO", ColumnValues::new().with("NAME", "x"))],
    )
    .unwrap_err();
    assert_eq!(err.class, ErrorClass::Validation);

    let err = commit_all(
        &backend,
        &[Mutation::insert("FOO", row(1, "a").with("COLOR", "red"))],
    )
    .unwrap_err();
    assert_eq!(err.class, ErrorClass::Validation);

    let err = commit_all(&backend, &[Mutation::insert("BAR", row(1, "a"))]).unwrap_err();
    assert_eq!(err.class, ErrorClass::NotFound);
}

#[test]
fn delete_shapes() {
    let backend = backend();
    let inserts = (1..=6)
        .map(|id| Mutation::insert("FOO", row(id, "n")))
        .collect::<Vec<_>>();
    commit_all(&backend, &inserts).unwrap();

    // Missing rows are not an error.
    commit_all(
        &backend,
        &[
            Mutation::delete("FOO", KeySet::key(Key::single(1))),
            Mutation::delete("FOO", KeySet::key(Key::single(99))),
        ],
    )
    .unwrap();
    assert_eq!(backend.row_count("FOO"), 5);

    let range = KeyRange::closed_open(Key::single(2), Key::single(4));
    commit_all(&backend, &[Mutation::delete("FOO", KeySet::Range(range))]).unwrap();
    let remaining = backend
        .rows("FOO")
        .iter()
        .filter_map(|r| r.get("ID").cloned())
        .collect::<Vec<_>>();
    assert_eq!(remaining, vec![Value::Int(4), Value::Int(5), Value::Int(6)]);

    commit_all(&backend, &[Mutation::delete("FOO", KeySet::All)]).unwrap();
    assert_eq!(backend.row_count("FOO"), 0);
}

#[test]
fn rollback_outcome_discards_buffer() {
    let backend = backend();
    let committed = backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            ctx.buffer(Mutation::insert("FOO", row(1, "a")))?;
            Ok(WorkOutcome::Rollback)
        })
        .unwrap();

    assert_eq!(committed, None);
    assert_eq!(backend.row_count("FOO"), 0);
}

#[test]
fn injected_conflicts_rerun_the_closure() {
    let backend = backend();
    backend.inject_conflicts(3);

    let mut invocations = 0;
    let timestamp = backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            invocations += 1;
            ctx.buffer(Mutation::insert("FOO", row(1, "a")))?;
            Ok(WorkOutcome::Commit)
        })
        .unwrap();

    assert!(timestamp.is_some());
    assert_eq!(invocations, 4);
    assert_eq!(backend.row_count("FOO"), 1);
}

#[test]
fn exhausted_retries_fail_the_transaction() {
    let backend = MemoryBackend::new(BackendConfig {
        max_commit_attempts: 2,
    });
    backend.create_table_if_missing(&foo_schema()).unwrap();
    backend.inject_conflicts(5);

    let err = commit_all(&backend, &[Mutation::insert("FOO", row(1, "a"))]).unwrap_err();

    assert_eq!(err.class, ErrorClass::TransactionFailed);
    assert_eq!(backend.attempts(), 2);
    assert_eq!(backend.row_count("FOO"), 0);
}

#[test]
fn concurrent_write_to_read_set_conflicts() {
    let backend = backend();
    commit_all(&backend, &[Mutation::insert("FOO", row(1, "a"))]).unwrap();

    let mut invocations = 0;
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            invocations += 1;
            let rows = ctx.read("FOO", &KeySet::key(Key::single(1)))?;
            assert_eq!(rows.len(), 1);

            // Another transaction commits between our read and our commit.
            if invocations == 1 {
                commit_all(&backend, &[Mutation::update("FOO", row(1, "b"))])?;
            }

            ctx.buffer(Mutation::insert_or_update("FOO", row(1, "c")))?;
            Ok(WorkOutcome::Commit)
        })
        .unwrap();

    assert_eq!(invocations, 2);
    assert_eq!(backend.get("FOO", &Key::single(1)), Some(row(1, "c")));
}

#[test]
fn commit_timestamps_increase() {
    let backend = backend();
    let first = backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            ctx.buffer(Mutation::insert("FOO", row(1, "a")))?;
            Ok(WorkOutcome::Commit)
        })
        .unwrap()
        .unwrap();
    let second = backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            ctx.buffer(Mutation::insert("FOO", row(2, "b")))?;
            Ok(WorkOutcome::Commit)
        })
        .unwrap()
        .unwrap();

    assert!(second > first);
    assert_eq!(backend.last_commit_timestamp(), Some(second));
}

#[test]
fn reads_return_rows_in_key_order() {
    let backend = backend();
    commit_all(
        &backend,
        &[
            Mutation::insert("FOO", row(3, "c")),
            Mutation::insert("FOO", row(1, "a")),
            Mutation::insert("FOO", row(2, "b")),
        ],
    )
    .unwrap();

    let mut seen = Vec::new();
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            seen = ctx.read("FOO", &KeySet::All)?;
            Ok(WorkOutcome::Rollback)
        })
        .unwrap();

    assert_eq!(seen, vec![row(1, "a"), row(2, "b"), row(3, "c")]);
}

#[test]
fn failed_commit_restores_deleted_rows() {
    let backend = backend();
    commit_all(
        &backend,
        &[
            Mutation::insert("FOO", row(1, "a")),
            Mutation::insert("FOO", row(2, "b")),
        ],
    )
    .unwrap();

    let err = commit_all(
        &backend,
        &[
            Mutation::delete("FOO", KeySet::key(Key::single(1))),
            Mutation::update("FOO", row(2, "z")),
            Mutation::insert("FOO", row(2, "dup")),
        ],
    )
    .unwrap_err();

    assert_eq!(err.class, ErrorClass::AlreadyExists);
    assert_eq!(backend.get("FOO", &Key::single(1)), Some(row(1, "a")));
    assert_eq!(backend.get("FOO", &Key::single(2)), Some(row(2, "b")));
    assert_eq!(backend.tombstone_count("FOO"), 0);
}

#[test]
fn tombstones_are_pruned_once_no_attempt_can_see_them() {
    let backend = backend();
    commit_all(
        &backend,
        &(1..=10)
            .map(|id| Mutation::insert("FOO", row(id, "x")))
            .collect::<Vec<_>>(),
    )
    .unwrap();

    commit_all(&backend, &[Mutation::delete("FOO", KeySet::All)]).unwrap();
    assert_eq!(backend.tombstone_count("FOO"), 10);

    commit_all(&backend, &[Mutation::insert("FOO", row(11, "y"))]).unwrap();
    assert_eq!(backend.tombstone_count("FOO"), 0);
}

#[test]
fn open_attempt_keeps_the_tombstones_it_depends_on() {
    let backend = backend();
    commit_all(&backend, &[Mutation::insert("FOO", row(1, "a"))]).unwrap();

    let mut invocations = 0;
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            invocations += 1;
            let rows = ctx.read("FOO", &KeySet::key(Key::single(1)))?;

            if invocations == 1 {
                assert_eq!(rows.len(), 1);
                // Delete our read key, then commit again to the same table.
                commit_all(&backend, &[Mutation::delete("FOO", KeySet::key(Key::single(1)))])?;
                commit_all(&backend, &[Mutation::insert("FOO", row(2, "b"))])?;
                assert_eq!(backend.tombstone_count("FOO"), 1);
            } else {
                assert!(rows.is_empty());
            }

            ctx.buffer(Mutation::insert_or_update("FOO", row(3, "c")))?;
            Ok(WorkOutcome::Commit)
        })
        .unwrap();

    assert_eq!(invocations, 2);
    assert_eq!(backend.tombstone_count("FOO"), 0);
}
