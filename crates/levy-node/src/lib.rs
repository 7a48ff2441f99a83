//! Levy node: persistent storage, configuration, and the [`Node`] that ties
//! the ledger, aggregator, gate, and tax engine to a record store.

pub mod config;
pub mod node;
pub mod storage;

pub use config::{init_logging, NodeConfig};
pub use node::Node;
pub use storage::RocksStore;
