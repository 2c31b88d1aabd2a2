//! Transactional persistence contract for users, clients, tokens and codes.
//!
//! Every operation runs inside a [`Session`]. Writes only become durable when
//! the session is committed; dropping a session without committing rolls all
//! of its writes back. Grant handlers open exactly one session per state
//! transition so that code consumption, token revocation and token creation
//! commit together or not at all.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{AuthorizationCode, Client, Token, User};

/// A persistence backend that hands out transaction scopes.
///
/// Implementations must isolate concurrent sessions strongly enough that a
/// code deleted by one committed session is never observed by another
/// session that starts afterwards, and that two sessions can never both
/// delete the same code.
pub trait Store: Send + Sync {
    /// Open a transaction scope.
    fn begin(&self) -> Result<Box<dyn Session + '_>, StoreError>;
}

/// One transaction scope.
pub trait Session {
    fn find_user(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    fn find_token_by_access(&self, access_token: &str) -> Result<Option<Token>, StoreError>;

    fn find_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>, StoreError>;

    /// Look up a code bound to `client_id`.
    ///
    /// Codes issued before `not_before` are expired and reported as absent,
    /// so callers cannot distinguish "unknown" from "expired".
    fn find_code(
        &self,
        code: &str,
        client_id: &str,
        not_before: i64,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Whether any code issued at or after `not_before` carries `nonce`, for any client.
    fn exists_nonce(&self, nonce: &str, not_before: i64) -> Result<bool, StoreError>;

    fn save_user(&mut self, user: User) -> Result<User, StoreError>;

    fn save_client(&mut self, client: Client) -> Result<Client, StoreError>;

    fn save_token(&mut self, token: Token) -> Result<Token, StoreError>;

    fn save_code(&mut self, code: AuthorizationCode) -> Result<AuthorizationCode, StoreError>;

    /// Delete a code. Returns `false` if it was already gone.
    fn delete_code(&mut self, code: &str) -> Result<bool, StoreError>;

    /// Mark a token revoked. Returns `false` if no such token exists.
    fn revoke_token(&mut self, access_token: &str) -> Result<bool, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Run `f` in a session that is never committed.
pub fn read_only<T, E>(
    store: &dyn Store,
    f: impl FnOnce(&dyn Session) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    let session = store.begin()?;
    f(session.as_ref())
}

/// Run `f` in a session that commits when `f` succeeds and rolls back otherwise.
pub fn transaction<T, E>(
    store: &dyn Store,
    f: impl FnOnce(&mut dyn Session) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    let mut session = store.begin()?;
    let value = f(session.as_mut())?;
    session.commit()?;
    Ok(value)
}
