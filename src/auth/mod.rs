//! Token authentication.
//!
//! The rest of the crate only sees the [`Authenticator`] capability: turn a
//! bearer token into a user id, or issue a token for a user.

mod middleware;
mod token;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use middleware::{AuthError, RequireUser};
pub use token::{TOKEN_PREFIX, TokenGenerator, parse_token};

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Token;

const MAX_ISSUE_RETRIES: u32 = 3;

pub trait Authenticator: Send + Sync {
    /// Returns the id of the user owning `token`.
    fn verify_token(&self, token: &str) -> Result<String>;

    /// Issues a new non-expiring token for the user.
    fn issue_token(&self, user_id: &str) -> Result<String>;
}

/// [`Authenticator`] backed by the `tokens` table.
pub struct StoreAuthenticator {
    store: Arc<dyn Store>,
    generator: TokenGenerator,
}

impl StoreAuthenticator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            generator: TokenGenerator::new(),
        }
    }

    pub fn issue_token_expiring(
        &self,
        user_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        if self.store.get_user(user_id)?.is_none() {
            return Err(Error::NotFound("user"));
        }

        for _ in 0..MAX_ISSUE_RETRIES {
            let (raw_token, lookup, hash) = self.generator.generate()?;
            let token = Token {
                id: Uuid::new_v4().to_string(),
                token_hash: hash,
                token_lookup: lookup,
                user_id: user_id.to_string(),
                created_at: Utc::now(),
                expires_at,
                last_used_at: None,
            };

            match self.store.create_token(&token) {
                Ok(()) => return Ok(raw_token),
                Err(Error::TokenLookupCollision) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::TokenLookupCollision)
    }
}

impl Authenticator for StoreAuthenticator {
    fn verify_token(&self, raw_token: &str) -> Result<String> {
        let (lookup, _secret) = parse_token(raw_token)?;

        let token = self
            .store
            .get_token_by_lookup(&lookup)?
            .ok_or(Error::Unauthorized)?;

        if !self.generator.verify(raw_token, &token.token_hash)? {
            return Err(Error::Unauthorized);
        }

        if token.expires_at.is_some_and(|expires_at| expires_at < Utc::now()) {
            return Err(Error::TokenExpired);
        }

        if let Err(e) = self.store.update_token_last_used(&token.id) {
            tracing::warn!("Failed to update token last_used_at: {e}");
        }

        Ok(token.user_id)
    }

    fn issue_token(&self, user_id: &str) -> Result<String> {
        self.issue_token_expiring(user_id, None)
    }
}
