//! Filesystem primitives shared across features.

pub mod atomic;
pub mod lock;
pub mod state_dir;

pub use atomic::{read_json_or_default, write_json_atomic};
pub use lock::FileLock;
pub use state_dir::{default_state_root, project_key, project_state_dir};
