//! Guest access codes.

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of a guest access code.
pub const ACCESS_CODE_LEN: usize = 12;

/// Generate a random alphanumeric access code for a guest purchase.
#[must_use]
pub fn generate_access_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_CODE_LEN)
        .map(char::from)
        .collect()
}
