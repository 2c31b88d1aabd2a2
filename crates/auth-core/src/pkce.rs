//! Proof Key for Code Exchange (RFC 7636).

use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::code::INVALID_CODE;
use crate::error::OAuth2Error;
use crate::models::{AuthorizationCode, Client};
use crate::request::OAuth2Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    Plain,
    S256,
}

impl ChallengeMethod {
    pub const SUPPORTED: [&'static str; 2] = ["plain", "S256"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeMethod::Plain => "plain",
            ChallengeMethod::S256 => "S256",
        }
    }

    /// Derive the challenge the verifier should match.
    fn derive(&self, verifier: &str) -> String {
        match self {
            ChallengeMethod::Plain => verifier.to_string(),
            ChallengeMethod::S256 => create_s256_code_challenge(verifier),
        }
    }
}

impl FromStr for ChallengeMethod {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(ChallengeMethod::Plain),
            "S256" => Ok(ChallengeMethod::S256),
            _ => Err(OAuth2Error::invalid_request("Unsupported \"code_challenge_method\"")),
        }
    }
}

pub fn create_s256_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// `[A-Za-z0-9-._~]{43,128}`
fn is_valid_challenge_string(value: &str) -> bool {
    (43..=128).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// PKCE checks attached to the authorization code grant.
#[derive(Debug, Clone, Copy)]
pub struct CodeChallenge {
    /// Public clients must send a challenge
    pub required: bool,
}

impl CodeChallenge {
    pub fn validate_authorization_request(
        &self,
        client: &Client,
        request: &OAuth2Request,
    ) -> Result<(), OAuth2Error> {
        let Some(challenge) = request.code_challenge() else {
            if self.required && client.is_public() {
                return Err(OAuth2Error::invalid_request("Missing \"code_challenge\""));
            }
            if request.code_challenge_method().is_some() {
                return Err(OAuth2Error::invalid_request("Missing \"code_challenge\""));
            }
            return Ok(());
        };

        if !is_valid_challenge_string(challenge) {
            return Err(OAuth2Error::invalid_request("Invalid \"code_challenge\""));
        }
        if let Some(method) = request.code_challenge_method() {
            method.parse::<ChallengeMethod>()?;
        }
        Ok(())
    }

    /// Check the presented verifier against the challenge stored with `code`.
    pub fn verify_code_verifier(
        &self,
        code: &AuthorizationCode,
        request: &OAuth2Request,
    ) -> Result<(), OAuth2Error> {
        let verifier = request.code_verifier();
        let Some(challenge) = code.code_challenge.as_deref() else {
            if verifier.is_some() {
                return Err(OAuth2Error::invalid_request("Missing \"code_challenge\""));
            }
            return Ok(());
        };

        let Some(verifier) = verifier else {
            return Err(OAuth2Error::invalid_request("Missing \"code_verifier\""));
        };
        if !is_valid_challenge_string(verifier) {
            return Err(OAuth2Error::invalid_request("Invalid \"code_verifier\""));
        }

        // Codes without a stored method default to plain (RFC 7636 §4.3).
        let method = code
            .code_challenge_method
            .as_deref()
            .unwrap_or("plain")
            .parse::<ChallengeMethod>()
            .map_err(|_| OAuth2Error::invalid_grant(INVALID_CODE))?;

        let expected = method.derive(verifier);
        if bool::from(expected.as_bytes().ct_eq(challenge.as_bytes())) {
            Ok(())
        } else {
            tracing::warn!("PKCE verification failed for client {}", code.client_id);
            Err(OAuth2Error::invalid_grant(INVALID_CODE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    fn code_with(challenge: Option<&str>, method: Option<&str>) -> AuthorizationCode {
        AuthorizationCode {
            code_challenge: challenge.map(str::to_string),
            code_challenge_method: method.map(str::to_string),
            ..testing::authorization_code("c1")
        }
    }

    fn token_request(verifier: Option<&str>) -> OAuth2Request {
        let req = OAuth2Request::new("POST", "/token");
        match verifier {
            Some(v) => req.with_form([("code_verifier", v)]),
            None => req,
        }
    }

    #[test]
    fn test_s256_known_vector() {
        // RFC 7636 appendix B
        assert_eq!(
            create_s256_code_challenge(VERIFIER),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_s256_verifier_match_and_mismatch() {
        let pkce = CodeChallenge { required: false };
        let code = code_with(Some(&create_s256_code_challenge(VERIFIER)), Some("S256"));
        assert!(pkce.verify_code_verifier(&code, &token_request(Some(VERIFIER))).is_ok());

        let other = "x".repeat(43);
        let err = pkce.verify_code_verifier(&code, &token_request(Some(&other))).unwrap_err();
        assert_eq!(err, OAuth2Error::invalid_grant(INVALID_CODE));
    }

    #[test]
    fn test_plain_is_default_method() {
        let pkce = CodeChallenge { required: false };
        let code = code_with(Some(VERIFIER), None);
        assert!(pkce.verify_code_verifier(&code, &token_request(Some(VERIFIER))).is_ok());
    }

    #[test]
    fn test_missing_verifier_is_invalid_request() {
        let pkce = CodeChallenge { required: false };
        let code = code_with(Some(VERIFIER), Some("plain"));
        let err = pkce.verify_code_verifier(&code, &token_request(None)).unwrap_err();
        assert_eq!(err.error_code(), "invalid_request");
    }

    #[test]
    fn test_required_only_for_public_clients() {
        let pkce = CodeChallenge { required: true };
        let req = OAuth2Request::new("GET", "/authorize?response_type=code");
        assert!(pkce
            .validate_authorization_request(&testing::public_client(), &req)
            .is_err());
        assert!(pkce
            .validate_authorization_request(&testing::confidential_client(), &req)
            .is_ok());
    }

    #[test]
    fn test_challenge_format_and_method_checked() {
        let pkce = CodeChallenge { required: false };
        let client = testing::confidential_client();

        let short = OAuth2Request::new("GET", "/authorize?code_challenge=abc");
        assert!(pkce.validate_authorization_request(&client, &short).is_err());

        let bad_method = OAuth2Request::new(
            "GET",
            format!("/authorize?code_challenge={}&code_challenge_method=S512", VERIFIER),
        );
        assert!(pkce.validate_authorization_request(&client, &bad_method).is_err());

        let good = OAuth2Request::new(
            "GET",
            format!("/authorize?code_challenge={}&code_challenge_method=S256", VERIFIER),
        );
        assert!(pkce.validate_authorization_request(&client, &good).is_ok());
    }
}
