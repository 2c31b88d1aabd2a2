//! Authorization code issuance, redemption and single-use consumption.

use crate::error::OAuth2Error;
use crate::models::{AuthorizationCode, Client, User};
use crate::store::Session;
use crate::token::generate_token;

/// Default code lifetime in seconds.
pub const DEFAULT_CODE_LIFETIME: i64 = 300;

const CODE_LENGTH: usize = 48;

/// The one description used for every code failure.
pub const INVALID_CODE: &str = "Invalid \"code\" in request.";

/// What the authorization step binds into a new code.
#[derive(Debug, Clone, Default)]
pub struct CodeRequest<'a> {
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub nonce: Option<&'a str>,
    pub code_challenge: Option<&'a str>,
    pub code_challenge_method: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct CodeEngine {
    lifetime: i64,
}

impl Default for CodeEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LIFETIME)
    }
}

impl CodeEngine {
    pub fn new(lifetime: i64) -> Self {
        Self { lifetime }
    }

    /// Oldest issued-at that is still valid at `now`.
    pub fn not_before(&self, now: i64) -> i64 {
        now.saturating_sub(self.lifetime)
    }

    /// Whether `nonce` is already bound to a live code.
    pub fn exists_nonce(
        &self,
        session: &dyn Session,
        now: i64,
        nonce: &str,
    ) -> Result<bool, OAuth2Error> {
        Ok(session.exists_nonce(nonce, self.not_before(now))?)
    }

    pub fn issue(
        &self,
        session: &mut dyn Session,
        now: i64,
        client: &Client,
        user: &User,
        req: CodeRequest<'_>,
    ) -> Result<String, OAuth2Error> {
        if let Some(nonce) = req.nonce
            && self.exists_nonce(session, now, nonce)?
        {
            tracing::warn!("Nonce replay rejected for client {}", client.client_id);
            return Err(OAuth2Error::invalid_request("Replay attack"));
        }

        let code = generate_token(CODE_LENGTH);
        session.save_code(AuthorizationCode {
            code: code.clone(),
            client_id: client.client_id.clone(),
            user_id: user.id,
            redirect_uri: req.redirect_uri.to_string(),
            scope: req.scope.to_string(),
            nonce: req.nonce.map(str::to_string),
            code_challenge: req.code_challenge.map(str::to_string),
            code_challenge_method: req.code_challenge_method.map(str::to_string),
            auth_time: now,
        })?;
        tracing::info!("Issued authorization code for client {}", client.client_id);
        Ok(code)
    }

    /// Look up a live code bound to `client`.
    pub fn redeem(
        &self,
        session: &dyn Session,
        now: i64,
        code: &str,
        client: &Client,
    ) -> Result<AuthorizationCode, OAuth2Error> {
        match session.find_code(code, &client.client_id, self.not_before(now))? {
            Some(found) if !found.is_expired(now, self.lifetime) => Ok(found),
            _ => {
                tracing::warn!("Rejected authorization code for client {}", client.client_id);
                Err(OAuth2Error::invalid_grant(INVALID_CODE))
            }
        }
    }

    /// Delete a redeemed code. Fails if another redemption got there first.
    pub fn consume(
        &self,
        session: &mut dyn Session,
        code: &AuthorizationCode,
    ) -> Result<(), OAuth2Error> {
        if session.delete_code(&code.code)? {
            Ok(())
        } else {
            tracing::warn!("Authorization code already consumed for client {}", code.client_id);
            Err(OAuth2Error::invalid_grant(INVALID_CODE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{read_only, transaction};
    use crate::testing;

    fn issue(store: &crate::MemoryStore, now: i64, nonce: Option<&str>) -> Result<String, OAuth2Error> {
        let engine = CodeEngine::default();
        let client = testing::confidential_client();
        transaction(store, |s| {
            engine.issue(
                s,
                now,
                &client,
                &testing::user(),
                CodeRequest {
                    redirect_uri: "https://example.com/",
                    scope: "profile",
                    nonce,
                    ..Default::default()
                },
            )
        })
    }

    #[test]
    fn test_redeem_then_consume_once() {
        let store = testing::store();
        let engine = CodeEngine::default();
        let client = testing::confidential_client();
        let code = issue(&store, testing::NOW, None).unwrap();

        transaction(&store, |s| {
            let found = engine.redeem(s, testing::NOW, &code, &client)?;
            assert_eq!(found.user_id, 1);
            engine.consume(s, &found)
        })
        .unwrap();

        let err = read_only(&store, |s| engine.redeem(s, testing::NOW, &code, &client)).unwrap_err();
        assert_eq!(err, OAuth2Error::invalid_grant(INVALID_CODE));
    }

    #[test]
    fn test_code_expires_after_lifetime() {
        let store = testing::store();
        let engine = CodeEngine::default();
        let client = testing::confidential_client();
        let code = issue(&store, testing::NOW, None).unwrap();

        let at_limit = read_only(&store, |s| engine.redeem(s, testing::NOW + 300, &code, &client));
        assert!(at_limit.is_ok());
        let after = read_only(&store, |s| engine.redeem(s, testing::NOW + 301, &code, &client));
        assert_eq!(after.unwrap_err(), OAuth2Error::invalid_grant(INVALID_CODE));
    }

    #[test]
    fn test_code_bound_to_client() {
        let store = testing::store();
        let engine = CodeEngine::default();
        let code = issue(&store, testing::NOW, None).unwrap();
        let other = testing::public_client();
        let err = read_only(&store, |s| engine.redeem(s, testing::NOW, &code, &other)).unwrap_err();
        assert_eq!(err, OAuth2Error::invalid_grant(INVALID_CODE));
    }

    #[test]
    fn test_second_consume_in_same_session_fails() {
        let store = testing::store();
        let engine = CodeEngine::default();
        let client = testing::confidential_client();
        let code = issue(&store, testing::NOW, None).unwrap();

        let result = transaction(&store, |s| {
            let found = engine.redeem(s, testing::NOW, &code, &client)?;
            engine.consume(s, &found)?;
            engine.consume(s, &found)
        });
        assert!(result.is_err());
        // The failed transaction rolled back, so the code is still redeemable.
        assert!(read_only(&store, |s| engine.redeem(s, testing::NOW, &code, &client)).is_ok());
    }

    #[test]
    fn test_nonce_replay_rejected_until_expiry() {
        let store = testing::store();
        issue(&store, testing::NOW, Some("n-1")).unwrap();

        let err = issue(&store, testing::NOW + 10, Some("n-1")).unwrap_err();
        assert_eq!(err, OAuth2Error::invalid_request("Replay attack"));

        assert!(issue(&store, testing::NOW + 301, Some("n-1")).is_ok());
    }
}
