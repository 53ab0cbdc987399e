use super::*;
use crate::{
    config::BackendConfig,
    db::{
        backend::{Catalog, MemoryBackend, WorkOutcome},
        codec::DEFAULT_MAX_MUTATION_BYTES,
    },
    error::ErrorClass,
};

fn store() -> RecoveryStore {
    RecoveryStore::new("XA_RECOVERY", MutationCodec::new(DEFAULT_MAX_MUTATION_BYTES))
}

fn backend_with_store(store: &RecoveryStore) -> MemoryBackend {
    let backend = MemoryBackend::new(BackendConfig::default());
    store.ensure_table(&backend).unwrap();
    backend
}

fn sample_mutations() -> Vec<Mutation> {
    vec![
        Mutation::insert("FOO", ColumnValues::new().with("ID", 1).with("NAME", "a")),
        Mutation::update("FOO", ColumnValues::new().with("ID", 2).with("NAME", "b")),
        Mutation::delete("FOO", KeySet::key(Key::single(3))),
    ]
}

fn stage(backend: &MemoryBackend, store: &RecoveryStore, xid_key: &str, mutations: &[Mutation]) {
    let inserts = store.encode_records(xid_key, mutations).unwrap();
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            for insert in &inserts {
                ctx.buffer(insert.clone())?;
            }
            Ok(WorkOutcome::Commit)
        })
        .unwrap();
}

fn load(
    backend: &MemoryBackend,
    store: &RecoveryStore,
    xid_key: &str,
) -> Result<Vec<RecoveryRecord>, InternalError> {
    let mut loaded = Vec::new();
    backend.run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
        loaded = store.load(ctx, xid_key)?;
        Ok(WorkOutcome::Rollback)
    })?;

    Ok(loaded)
}

#[test]
fn ensure_table_is_idempotent() {
    let store = store();
    let backend = backend_with_store(&store);
    store.ensure_table(&backend).unwrap();

    let schema = backend.table("XA_RECOVERY").unwrap();
    assert_eq!(schema.primary_key(), [XID_KEY_COLUMN, SEQUENCE_COLUMN]);
}

#[test]
fn records_load_in_buffer_order() {
    let store = store();
    let backend = backend_with_store(&store);
    let mutations = sample_mutations();
    stage(&backend, &store, "0.eA.YQ", &mutations);

    let records = load(&backend, &store, "0.eA.YQ").unwrap();

    assert_eq!(
        records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        records.into_iter().map(|r| r.mutation).collect::<Vec<_>>(),
        mutations
    );
}

#[test]
fn load_is_scoped_to_one_xid() {
    let store = store();
    let backend = backend_with_store(&store);
    let mutations = sample_mutations();
    stage(&backend, &store, "0.eA.YQ", &mutations[..1]);
    stage(&backend, &store, "0.eA.Yg", &mutations[1..]);

    assert_eq!(load(&backend, &store, "0.eA.YQ").unwrap().len(), 1);
    assert_eq!(load(&backend, &store, "0.eA.Yg").unwrap().len(), 2);
    assert!(load(&backend, &store, "0.eA").unwrap().is_empty());
}

#[test]
fn delete_records_removes_only_loaded_rows() {
    let store = store();
    let backend = backend_with_store(&store);
    stage(&backend, &store, "a", &sample_mutations());
    stage(&backend, &store, "b", &sample_mutations());

    let records = load(&backend, &store, "a").unwrap();
    let deletes = store.delete_records(&records);
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            for delete in &deletes {
                ctx.buffer(delete.clone())?;
            }
            Ok(WorkOutcome::Commit)
        })
        .unwrap();

    assert!(load(&backend, &store, "a").unwrap().is_empty());
    assert_eq!(load(&backend, &store, "b").unwrap().len(), 3);
}

#[test]
fn pending_keys_are_distinct_and_sorted() {
    let store = store();
    let backend = backend_with_store(&store);
    stage(&backend, &store, "b", &sample_mutations());
    stage(&backend, &store, "a", &sample_mutations());

    let mut pending = Vec::new();
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            pending = store.pending_xid_keys(ctx)?;
            Ok(WorkOutcome::Rollback)
        })
        .unwrap();

    assert_eq!(pending, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn sequence_gap_is_an_inconsistency() {
    let store = store();
    let backend = backend_with_store(&store);
    stage(&backend, &store, "x", &sample_mutations());

    let middle = Mutation::delete("XA_RECOVERY", KeySet::key(record_key("x", 1)));
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            ctx.buffer(middle.clone())?;
            Ok(WorkOutcome::Commit)
        })
        .unwrap();

    let err = load(&backend, &store, "x").unwrap_err();
    assert_eq!(err.class, ErrorClass::RecoveryInconsistency);
}

#[test]
fn undecodable_record_is_corruption() {
    let store = store();
    let backend = backend_with_store(&store);
    let bogus = Mutation::insert(
        "XA_RECOVERY",
        ColumnValues::new()
            .with(XID_KEY_COLUMN, "x")
            .with(SEQUENCE_COLUMN, 0_i64)
            .with(MUTATION_COLUMN, "v1:!!!"),
    );
    backend
        .run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            ctx.buffer(bogus.clone())?;
            Ok(WorkOutcome::Commit)
        })
        .unwrap();

    let err = load(&backend, &store, "x").unwrap_err();
    assert_eq!(err.class, ErrorClass::Corruption);
}
