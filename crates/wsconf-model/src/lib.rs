//! Configuration model types for wsconf.
//!
//! This crate provides configuration scopes and targets, the key registry,
//! immutable per-source configuration models with language overrides, the
//! settings parser, and a small synchronous event emitter.

pub mod error;
pub mod event;
pub mod model;
pub mod parser;
pub mod registry;
pub mod scope;
pub mod target;

pub use error::{Error, Result};
pub use event::{Emitter, Subscription};
pub use model::{ConfigurationModel, ConfigurationModelData, OverrideSection, deep_merge_value, layer_override};
pub use parser::{ConfigurationModelParser, is_override_key, override_identifiers_from_key, parse_jsonc};
pub use registry::{ConfigurationRegistry, PropertySchema, RegistryChange, RegistrySnapshot};
pub use scope::ConfigurationScope;
pub use target::ConfigurationTarget;
