#![allow(dead_code)]

use std::sync::Arc;
use xabridge::prelude::*;

pub const ACCOUNTS: &str = "ACCOUNTS";

/// Backend with an `ACCOUNTS(BANK, ID, BALANCE)` table keyed on `(BANK, ID)`.
pub fn backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new(BackendConfig::default()));
    let schema = TableSchema::try_new(ACCOUNTS, ["BANK", "ID", "BALANCE"], ["BANK", "ID"]).unwrap();
    backend.create_table_if_missing(&schema).unwrap();

    backend
}

pub fn manual_driver(backend: &Arc<MemoryBackend>) -> Driver {
    xabridge::open(backend.clone(), "autocommit = false").unwrap()
}

pub fn account(bank: &str, id: i64, balance: i64) -> Mutation {
    Mutation::insert(
        ACCOUNTS,
        ColumnValues::new()
            .with("BANK", bank)
            .with("ID", id)
            .with("BALANCE", balance),
    )
}

pub fn balance(backend: &MemoryBackend, bank: &str, id: i64) -> Option<Value> {
    let key = Key::new(vec![Value::from(bank), Value::Int(id)]);

    backend
        .get(ACCOUNTS, &key)
        .and_then(|row| row.get("BALANCE").cloned())
}

pub fn xid(global: &str, branch: &str) -> Xid {
    Xid::try_new(
        0x4242,
        global.as_bytes().to_vec(),
        branch.as_bytes().to_vec(),
    )
    .unwrap()
}
