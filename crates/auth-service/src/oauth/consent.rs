//! Anti-forgery tokens for the consent form
//!
//! The consent page embeds an HMAC-SHA256 over the end-user id and the
//! `/authorize` URI it posts back to. `POST /authorize` only acts on a
//! decision carrying a matching token, so a cross-site form cannot approve
//! a grant on the user's behalf.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Form field carrying the token.
pub const FIELD: &str = "consent_token";

#[derive(Clone)]
pub struct ConsentKey {
    mac: HmacSha256,
}

impl ConsentKey {
    /// Use the configured secret, or a random key (pending consent pages
    /// won't survive restarts).
    pub fn new(secret: Option<&str>) -> Result<Self, InvalidLength> {
        let key = match secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                tracing::info!("No consent_secret configured, using a random key");
                rand::random::<[u8; 32]>().to_vec()
            }
        };
        Ok(Self {
            mac: HmacSha256::new_from_slice(&key)?,
        })
    }

    fn mac(&self, user_id: i64, uri: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(user_id.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(uri.as_bytes());
        mac
    }

    pub fn sign(&self, user_id: i64, uri: &str) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(user_id, uri).finalize().into_bytes())
    }

    /// Constant-time check of a submitted token.
    pub fn verify(&self, user_id: i64, uri: &str, token: &str) -> bool {
        match URL_SAFE_NO_PAD.decode(token) {
            Ok(tag) => self.mac(user_id, uri).verify_slice(&tag).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "/authorize?response_type=code&client_id=ops";

    #[test]
    fn test_token_is_bound_to_user_and_request() {
        let key = ConsentKey::new(Some("secret")).unwrap();
        let token = key.sign(1, URI);
        assert!(key.verify(1, URI, &token));
        assert!(!key.verify(2, URI, &token));
        assert!(!key.verify(1, "/authorize?response_type=token&client_id=ops", &token));
        assert!(!key.verify(1, URI, "not base64!"));
        assert!(!key.verify(1, URI, ""));
    }

    #[test]
    fn test_random_keys_differ() {
        let a = ConsentKey::new(None).unwrap();
        let b = ConsentKey::new(None).unwrap();
        assert!(!b.verify(1, URI, &a.sign(1, URI)));
    }
}
