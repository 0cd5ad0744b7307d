//! Persistent JSON key-value store mirrored in memory.
//! - `KeyValueStore` owns the mirror and the connect/load/write lifecycle.
//! - `KvBackend` is the storage seam; `SeaOrmBackend` talks to PostgreSQL.
//! - `ConnectRetry` drives the bounded fixed-delay connect.

pub mod errors;
pub mod backend;
pub mod connect;
pub mod kv_store;

pub use backend::{KvBackend, SeaOrmBackend};
pub use connect::{ConnectRetry, ConnectState};
pub use errors::ServiceError;
pub use kv_store::{KeyValueStore, Mirror};
