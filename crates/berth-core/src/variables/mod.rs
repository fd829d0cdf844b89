//! Variable resolution for addon instances.

pub mod generate;
pub mod resolver;
pub mod runtime;

pub use generate::{MIN_SECRET_LENGTH, generate_secret};
pub use resolver::{Export, ResolvedVariable, ResolvedVariables, VariableResolver, substitute};
pub use runtime::{RuntimeFacts, container_name};
