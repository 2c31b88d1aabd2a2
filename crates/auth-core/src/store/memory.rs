//! In-memory store with optional JSON snapshots for users, clients and tokens.
//!
//! A single mutex serializes sessions, which gives every session full
//! isolation. Writes are applied in place and recorded in an undo log that is
//! replayed when a session is dropped without committing. Authorization codes
//! are short-lived and never written to disk.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{de::DeserializeOwned, Serialize};

use super::{Session, Store};
use crate::error::StoreError;
use crate::models::{AuthorizationCode, Client, Token, User};

pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Directory holding users.json, clients.json and tokens.json
    snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<i64, User>,
    clients: HashMap<String, Client>,
    /// Maps access token -> token
    tokens: HashMap<String, Token>,
    /// Maps code -> pending authorization code
    codes: HashMap<String, AuthorizationCode>,
}

enum Undo {
    User(i64, Option<User>),
    Client(String, Option<Client>),
    Token(String, Option<Token>),
    Code(String, Option<AuthorizationCode>),
}

impl MemoryStore {
    /// A store that lives only as long as the process.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            snapshot_dir: None,
        }
    }

    /// A store backed by JSON files in `dir`, loading any existing snapshot.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut tables = Tables::default();
        for user in load_list::<User>(&dir.join("users.json"))? {
            tables.users.insert(user.id, user);
        }
        for client in load_list::<Client>(&dir.join("clients.json"))? {
            tables.clients.insert(client.client_id.clone(), client);
        }
        for token in load_list::<Token>(&dir.join("tokens.json"))? {
            tables.tokens.insert(token.access_token.clone(), token);
        }
        tracing::info!(
            "Loaded {} users, {} clients, {} tokens from {:?}",
            tables.users.len(),
            tables.clients.len(),
            tables.tokens.len(),
            dir
        );

        Ok(Self {
            tables: Mutex::new(tables),
            snapshot_dir: Some(dir),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn begin(&self) -> Result<Box<dyn Session + '_>, StoreError> {
        let tables = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(Box::new(MemorySession {
            tables,
            snapshot_dir: self.snapshot_dir.as_deref(),
            undo: Vec::new(),
            committed: false,
        }))
    }
}

struct MemorySession<'a> {
    tables: MutexGuard<'a, Tables>,
    snapshot_dir: Option<&'a Path>,
    undo: Vec<Undo>,
    committed: bool,
}

impl MemorySession<'_> {
    fn rollback(&mut self) {
        let tables = &mut *self.tables;
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::User(key, previous) => restore(&mut tables.users, key, previous),
                Undo::Client(key, previous) => restore(&mut tables.clients, key, previous),
                Undo::Token(key, previous) => restore(&mut tables.tokens, key, previous),
                Undo::Code(key, previous) => restore(&mut tables.codes, key, previous),
            }
        }
    }

    fn touches_snapshot(&self) -> bool {
        self.undo.iter().any(|entry| !matches!(entry, Undo::Code(..)))
    }

    fn write_snapshot(&self, dir: &Path) -> Result<(), StoreError> {
        let mut users: Vec<&User> = self.tables.users.values().collect();
        users.sort_by_key(|u| u.id);
        save_list(&dir.join("users.json"), &users)?;

        let mut clients: Vec<&Client> = self.tables.clients.values().collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        save_list(&dir.join("clients.json"), &clients)?;

        let mut tokens: Vec<&Token> = self.tables.tokens.values().collect();
        tokens.sort_by(|a, b| {
            a.issued_at
                .cmp(&b.issued_at)
                .then_with(|| a.access_token.cmp(&b.access_token))
        });
        save_list(&dir.join("tokens.json"), &tokens)?;
        Ok(())
    }
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.undo.is_empty() {
            tracing::debug!("Rolling back {} uncommitted writes", self.undo.len());
            self.rollback();
        }
    }
}

impl Session for MemorySession<'_> {
    fn find_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables.users.get(&user_id).cloned())
    }

    fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.tables.clients.get(client_id).cloned())
    }

    fn find_token_by_access(&self, access_token: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tables.tokens.get(access_token).cloned())
    }

    fn find_token_by_refresh(&self, refresh_token: &str) -> Result<Option<Token>, StoreError> {
        Ok(self
            .tables
            .tokens
            .values()
            .find(|t| t.refresh_token.as_deref() == Some(refresh_token))
            .cloned())
    }

    fn find_code(
        &self,
        code: &str,
        client_id: &str,
        not_before: i64,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self
            .tables
            .codes
            .get(code)
            .filter(|c| c.client_id == client_id && c.auth_time >= not_before)
            .cloned())
    }

    fn exists_nonce(&self, nonce: &str, not_before: i64) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .codes
            .values()
            .any(|c| c.nonce.as_deref() == Some(nonce) && c.auth_time >= not_before))
    }

    fn save_user(&mut self, user: User) -> Result<User, StoreError> {
        let previous = self.tables.users.insert(user.id, user.clone());
        self.undo.push(Undo::User(user.id, previous));
        Ok(user)
    }

    fn save_client(&mut self, client: Client) -> Result<Client, StoreError> {
        let previous = self
            .tables
            .clients
            .insert(client.client_id.clone(), client.clone());
        self.undo.push(Undo::Client(client.client_id.clone(), previous));
        Ok(client)
    }

    fn save_token(&mut self, token: Token) -> Result<Token, StoreError> {
        if self.tables.tokens.contains_key(&token.access_token) {
            return Err(StoreError::Conflict("access token already exists".to_string()));
        }
        if let Some(refresh) = &token.refresh_token
            && self.find_token_by_refresh(refresh)?.is_some()
        {
            return Err(StoreError::Conflict("refresh token already exists".to_string()));
        }
        self.tables
            .tokens
            .insert(token.access_token.clone(), token.clone());
        self.undo.push(Undo::Token(token.access_token.clone(), None));
        Ok(token)
    }

    fn save_code(&mut self, code: AuthorizationCode) -> Result<AuthorizationCode, StoreError> {
        if self.tables.codes.contains_key(&code.code) {
            return Err(StoreError::Conflict("authorization code already exists".to_string()));
        }
        self.tables.codes.insert(code.code.clone(), code.clone());
        self.undo.push(Undo::Code(code.code.clone(), None));
        Ok(code)
    }

    fn delete_code(&mut self, code: &str) -> Result<bool, StoreError> {
        match self.tables.codes.remove(code) {
            Some(previous) => {
                self.undo.push(Undo::Code(code.to_string(), Some(previous)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn revoke_token(&mut self, access_token: &str) -> Result<bool, StoreError> {
        let Some(token) = self.tables.tokens.get_mut(access_token) else {
            return Ok(false);
        };
        let previous = token.clone();
        token.revoked = true;
        self.undo
            .push(Undo::Token(access_token.to_string(), Some(previous)));
        Ok(true)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(dir) = self.snapshot_dir
            && self.touches_snapshot()
        {
            // On failure the session drops uncommitted and rolls back.
            self.write_snapshot(dir)?;
        }
        self.committed = true;
        Ok(())
    }
}

fn restore<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

fn load_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn save_list<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(items)?;
    std::fs::write(path, content)?;
    Ok(())
}
