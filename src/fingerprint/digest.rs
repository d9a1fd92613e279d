use sha2::{Digest, Sha256};

use super::registry::ComponentRegistry;

/// Joins component values in the digest preimage.
pub const DIGEST_SEPARATOR: &str = ",";

/// SHA-256 over the comma-joined values (absent as empty), as 64 uppercase
/// hex digits. Names are not hashed, only their order matters.
pub fn digest(registry: &ComponentRegistry) -> String {
    let preimage = registry
        .digest_input()
        .into_iter()
        .map(|value| value.unwrap_or(""))
        .collect::<Vec<_>>()
        .join(DIGEST_SEPARATOR);

    hex::encode_upper(Sha256::digest(preimage.as_bytes()))
}
