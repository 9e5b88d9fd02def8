//! In-process storage backend. Selectable from settings for running without
//! MySQL, and the substrate for the service-level tests. Transactions are
//! accepted but not honored — each repo call applies immediately.

mod repo_tx_memory;
mod repos;
mod store;

pub use repo_tx_memory::*;
pub use repos::*;
pub use store::*;
