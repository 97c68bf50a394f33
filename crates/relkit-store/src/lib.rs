//! # relkit-store — Object Storage for Release Sets and Markers
//!
//! The pipeline talks to storage only through [`ObjectStore`]. Backends:
//!
//! - [`FsObjectStore`]: a directory tree, used by the CLI (point
//!   `store_root` at a shared mount).
//! - [`MemoryObjectStore`]: a locked map, used by tests.

pub mod error;
pub mod fs;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use store::{validate_key, CasOutcome, ObjectStore, PutOutcome};
