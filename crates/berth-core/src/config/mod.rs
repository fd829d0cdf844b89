//! Project configuration
//!
//! berth.toml is read twice: once into the typed [`ProjectConfig`] and once
//! into an untyped [`ConfigTree`] that variable `config_path` lookups walk.

pub mod parser;
pub mod schema;
pub mod store;
pub mod tree;

pub use parser::{ProjectDocument, parse_berth_toml, parse_berth_toml_str};
pub use schema::{
    AddonDeclaration, AppDeclaration, AttachmentSpec, DistributionSection, ProjectConfig,
    ProjectSection, PublicKeyConfig, RunnerSection,
};
pub use store::{CONFIG_FILE, ConfigStore};
pub use tree::{ConfigTree, Lookup};
