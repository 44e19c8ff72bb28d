//! Access boundary: who is calling and which books they may stream.

pub mod middleware;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::infra::config::TokenGrant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub can_download: bool,
    /// Books this user may access. `None` means the whole library.
    pub books: Option<HashSet<String>>,
}

impl AuthenticatedUser {
    pub fn can_access_book(&self, book_id: &str) -> bool {
        self.books
            .as_ref()
            .is_none_or(|books| books.contains(book_id))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication required")]
    MissingToken,
    #[error("invalid access token")]
    InvalidToken,
}

#[async_trait]
pub trait AccessVerifier: Send + Sync {
    async fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// Verifier backed by the tokens listed in the configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    users: HashMap<String, AuthenticatedUser>,
}

impl StaticTokenVerifier {
    pub fn new<'a>(grants: impl IntoIterator<Item = &'a TokenGrant>) -> Self {
        let users = grants
            .into_iter()
            .filter(|grant| !grant.token.is_empty())
            .map(|grant| {
                (
                    grant.token.clone(),
                    AuthenticatedUser {
                        id: grant.user_id.clone(),
                        can_download: grant.can_download,
                        books: grant.books.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl AccessVerifier for StaticTokenVerifier {
    async fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        self.users
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
