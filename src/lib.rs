// An in-memory, multi-version key store backed by a lock-free ordered
// skiplist index, with snapshot isolation and background reclamation of
// obsolete versions.

pub mod concurrent;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod item;
pub mod persistence;
pub mod snapshot;

pub use config::Config;
pub use engine::Engine;
pub use error::{DbError, Result};
pub use item::Item;
pub use snapshot::Snapshot;
