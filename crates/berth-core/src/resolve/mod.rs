//! Dependency resolution: requested instances in, ordered deployment plan out.

pub mod graph;
pub mod plan;

pub use graph::DependencyResolver;
pub use plan::{DeploymentPlan, PlannedInstance};
