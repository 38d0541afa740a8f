use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::Validate;

/// Length of a hex-encoded SHA-256 digest, matching the `CHAR(64)` column.
pub const IDENTITY_HASH_LENGTH: usize = 64;

/// Maps an external identity id to the opaque key users are de-duplicated on.
pub fn hash_external_identity(external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(external_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Profile returned by the identity provider after a successful token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, JsonSchema)]
pub struct ExternalIdentityProfile {
    #[validate(length(min = 1, max = 128))]
    pub external_id: String,
    pub display_name: String,
    #[validate(url)]
    pub picture_uri: String,
    pub locale: String,
}

impl ExternalIdentityProfile {
    pub fn identity_hash(&self) -> String {
        hash_external_identity(&self.external_id)
    }

    /// Snapshot stored on the user row, overwritten on every re-provisioning.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.display_name,
            "picture": self.picture_uri,
            "locale": self.locale,
        })
    }
}
