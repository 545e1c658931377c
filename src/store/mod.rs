use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

/// Credential record in the backing store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never exposed in JSON
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Input for creating a credential record. The password is already hashed
/// by the time it reaches the store.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Email,
    Username,
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityField::Email => write!(f, "email"),
            IdentityField::Username => write!(f, "username"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already registered")]
    Duplicate(IdentityField),
    #[error("storage unavailable")]
    Unavailable(anyhow::Error),
}

/// Storage capability for credential records. Implementations must make
/// `create` atomic with respect to concurrent creates for the same email or
/// username: uniqueness is enforced inside the engine, not by callers
/// checking first.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new record. A uniqueness violation yields
    /// [`StoreError::Duplicate`] and persists nothing.
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Look up by email. The email is compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Look up by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
}
