//! Resource and file system abstraction for wsconf
//!
//! Provides URI resources, pluggable per-scheme storage providers with change
//! notifications, and safe atomic writes for local files.

pub mod checksum;
pub mod disk;
pub mod error;
pub mod io;
pub mod memory;
pub mod provider;
pub mod resource;
pub mod service;

pub use disk::DiskFileSystem;
pub use error::{Error, Result};
pub use memory::InMemoryFileSystem;
pub use provider::{FileChange, FileChangeKind, FileSystemProvider};
pub use resource::{Resource, ResourceIdentity};
pub use service::FileService;
