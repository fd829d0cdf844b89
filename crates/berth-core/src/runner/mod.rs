//! Runner label routing and the host-side project guard.

pub mod guard;
pub mod labels;

pub use guard::{DEFAULT_MARKER_PATH, ProjectMarker};
pub use labels::{LabelRouter, MULTI_PROJECT, ORCHESTRATION_ROLE, RunnerLabelSet, SELF_HOSTED};
