//! Shared test fixtures for the wsconf workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`registry`]: a registry with one key of every scope
//! - [`workspace`]: [`TestWorkspace`], an in-memory file system plus service builder
//! - [`disk`]: [`TempWorkspace`], the same on a real temporary directory
//! - [`events`]: [`Recorder`], collects events fired by a service

pub mod disk;
pub mod events;
pub mod registry;
pub mod workspace;

pub use disk::TempWorkspace;
pub use events::Recorder;
pub use registry::standard_registry;
pub use workspace::TestWorkspace;
