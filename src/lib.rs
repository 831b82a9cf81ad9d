pub mod binding;
pub mod clienv;
pub mod dynamic;
pub mod error;
pub mod identity;
pub mod legacy;
pub mod lifecycle;

pub use error::{AdapterError, Result};
pub use identity::{AdapterIdentity, AdapterRecord, BackendKind, DeleteTarget};
pub use lifecycle::{Orchestrator, RebootFlag};
