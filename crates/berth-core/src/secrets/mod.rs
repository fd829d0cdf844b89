//! Secret merge engine: three prioritized layers into one flat bundle.

pub mod layer;
pub mod merge;
pub mod sources;
pub mod store;

pub use layer::{SecretLayer, SecretStack, SecretTier};
pub use merge::{MergedBundle, MergedEntry, merge_layers};
pub use sources::SecretSources;
pub use store::{GeneratedSecretStore, GeneratedValue};
