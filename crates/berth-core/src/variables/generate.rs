//! Random secret generation.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

/// Minimum length of any generated secret
pub const MIN_SECRET_LENGTH: usize = 32;

/// Generate an alphanumeric secret of [`MIN_SECRET_LENGTH`] characters
pub fn generate_secret() -> String {
    generate_secret_with_length(MIN_SECRET_LENGTH)
}

/// Generate an alphanumeric secret; lengths below the minimum are raised to it
pub fn generate_secret_with_length(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length.max(MIN_SECRET_LENGTH))
        .map(char::from)
        .collect()
}
