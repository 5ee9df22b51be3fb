//! pagepool: a federated buffer pool over a block-oriented disk
//! manager.
//!
//! See [`buffer`] for the cache itself, [`disk`] for the storage
//! contract and backends, and [`page`] for page identity and buffers.

pub mod buffer;
pub mod disk;
pub mod page;
