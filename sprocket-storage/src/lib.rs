//! Object store facade for Sprocket
//!
//! A job reads its task package and input from a blob store and writes its
//! outcome back. [`ObjectStore`] is the contract every backend meets for one
//! bucket; [`StoreProvider`] hands out a store per bucket.
//!
//! Backends:
//! - [`MemoryBackend`]: process-local, used by tests and dry runs
//! - [`FileSystemBackend`]: one directory per bucket
//! - [`RedisBackend`]: one Redis server, keys namespaced by bucket
//!   (feature `redis`, on by default)

pub mod error;
pub mod filesystem;
pub mod memory;
pub mod provider;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;

pub use error::{is_transient_io, StorageError, StorageResult};
pub use filesystem::{FileSystemBackend, FileSystemStore};
pub use memory::{MemoryBackend, MemoryStore};
pub use provider::Storage;
#[cfg(feature = "redis")]
pub use redis::{RedisBackend, RedisStore};
pub use store::{ByteRange, ObjectReader, ObjectStore, StoreProvider};
