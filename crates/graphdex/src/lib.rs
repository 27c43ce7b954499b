//! ## Crate layout
//! - `core`: runtime registry, write coordinator, query router, engines.
//! - `error`: the public error type with a stable kind + origin taxonomy.
//!
//! The `prelude` module mirrors the runtime surface used by application
//! persistence layers.

pub use graphdex_core as core;

pub mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        core::{
            db::{Db, Hits, IndexRef},
            id::RecordId,
            model::{
                entity::{EntityDef, FieldDef, IndexSpec},
                index::{IndexDescriptor, IndexKind, IndexLevel},
            },
            store::{EntityRecord, IndexEngine, MemoryEngine},
            value::{FieldKind, Value},
        },
        error::Error,
    };
}
