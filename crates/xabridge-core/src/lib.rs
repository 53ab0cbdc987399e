//! Core runtime for xabridge: mutation values, the statement translator,
//! transaction workers, the recovery store and the XA-style bridge.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod obs;
pub mod serialize;
pub mod types;
pub mod value;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, workers, stores, or serializers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            mutation::{ColumnValues, Key, KeyRange, KeySet, Mutation, MutationKind},
            xid::Xid,
        },
        types::Timestamp,
        value::Value,
    };
}
