//! # partosync storage
//!
//! Record store trait and implementations for partosync.
//!
//! Stores are **opaque record stores**: they hold bytes keyed by a 16-byte
//! record key plus a handful of named metadata entries. They never look
//! inside the bytes; the sync core owns the envelope format.
//!
//! ## Design Principles
//!
//! - Every read-modify-write of a single record is atomic ([`RecordStore::transact`])
//! - Writes to different records never block each other on a record lock
//! - There is no physical delete; tombstones are ordinary writes
//! - Stores must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral storage
//! - [`FileStore`] - Durable append-only frame log with crash recovery
//!
//! ## Example
//!
//! ```rust
//! use partosync_storage::{InMemoryStore, RecordStore, StorageError, Write};
//!
//! let store = InMemoryStore::new();
//! let key = [7u8; 16];
//! store
//!     .transact(&key, |current| {
//!         assert!(current.is_none());
//!         Ok::<_, StorageError>((Write::Put(b"hello".to_vec()), ()))
//!     })
//!     .unwrap();
//! assert_eq!(store.get(&key).unwrap(), Some(b"hello".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod file;
mod frame;
mod locks;
mod memory;
mod store;

pub use config::StoreConfig;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use frame::{compute_crc32, Frame, FrameKind, FRAME_MAGIC, FRAME_VERSION};
pub use memory::InMemoryStore;
pub use store::{RecordKey, RecordStore, Write};
