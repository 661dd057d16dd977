//! Public identifier and trust token generation
//!
//! Public ids are `<prefix>_<10 base62 chars>`. The prefix tells the entity
//! type apart; callers must not rely on the length.

use crate::error::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Prefix for session public ids
pub const SESSION_PREFIX: &str = "s";

/// Prefix for connection public ids
pub const CONNECTION_PREFIX: &str = "sc";

/// Number of random characters after the prefix
const ID_RANDOM_LEN: usize = 10;

/// Size of a trust-on-first-use token in bytes
pub const TOFU_TOKEN_LEN: usize = 20;

/// Generate a new public id with the given type prefix
pub fn new_public_id(prefix: &str) -> Result<String> {
    if prefix.is_empty() || prefix.contains('_') {
        return Err(Error::invalid("new public id", "missing or malformed prefix"));
    }
    let suffix: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(ID_RANDOM_LEN)
        .map(char::from)
        .collect();
    Ok(format!("{}_{}", prefix, suffix))
}

/// Generate a new session public id
pub fn new_session_id() -> Result<String> {
    new_public_id(SESSION_PREFIX)
}

/// Generate a new connection public id
pub fn new_connection_id() -> Result<String> {
    new_public_id(CONNECTION_PREFIX)
}

/// Generate a random trust-on-first-use token
pub fn new_tofu_token() -> Vec<u8> {
    let mut token = vec![0u8; TOFU_TOKEN_LEN];
    OsRng.fill_bytes(&mut token);
    token
}

/// Return the type prefix of a public id, if it has one
pub fn prefix_of(public_id: &str) -> Option<&str> {
    public_id
        .split_once('_')
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
}
