//! ## Crate layout
//! - `core`: mutation values, statement translation, workers, recovery, and the bridge.
//! - `error`: the public error type with a stable kind + origin taxonomy.
//!
//! Downstream users depend on **xabridge** only. The `prelude` module holds
//! the vocabulary needed to open a driver and run transactions.

pub use xabridge_core as core;

pub mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a driver from a TOML configuration document.
pub fn open(
    backend: std::sync::Arc<dyn core::db::Backend>,
    config_toml: &str,
) -> Result<core::db::Driver, Error> {
    let config = core::config::DriverConfig::from_toml_str(config_toml)
        .map_err(core::error::InternalError::from)?;

    Ok(core::db::Driver::new(backend, config)?)
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        config::{BackendConfig, DriverConfig},
        db::{
            Backend, Catalog, Connection, Driver, ExecuteOutcome, MemoryBackend, TableSchema,
            XaVote,
            sql::{CompareOp, Delete, Expr, Insert, Parameters, Select, Statement, Update},
        },
        prelude::*,
    };
    pub use crate::error::{Error, ErrorKind};
}
