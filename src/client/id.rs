//! Anonymous client identifiers

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const FIDES: &[u8] = b"fides";
pub const FIDESCTL_API: &[u8] = b"fidesctl-api";
pub const FIDESCTL_CLI: &[u8] = b"fidesctl-cli";
pub const FIDESOPS: &[u8] = b"fidesops";

/// Fresh anonymous id for an installation of `product`.
///
/// SHA-256 over a random UUID, a random salt and the product tag. None of
/// the inputs are kept, so the id cannot be traced back to the machine.
pub fn generate_client_id(product: &[u8]) -> String {
    let salt = Uuid::new_v4();

    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(salt.as_bytes());
    hasher.update(product);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validation::check_not_identifiable;

    #[test]
    fn test_client_id_shape() {
        let id = generate_client_id(FIDESCTL_CLI);
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(check_not_identifiable(&id).is_ok());
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(generate_client_id(FIDES), generate_client_id(FIDES));
    }
}
