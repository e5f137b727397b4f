//! Command implementations for wsconf-cli

pub mod folders;
pub mod read;
pub mod write;

pub use folders::run_folders;
pub use read::{run_get, run_inspect, run_keys};
pub use write::{run_set, run_unset};
