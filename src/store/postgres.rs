use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{CredentialStore, IdentityField, NewUser, StoreError, User};

/// Postgres-backed credential store. Uniqueness of email and username is
/// carried by the unique indexes in the `users` migration, so the insert is
/// atomic under concurrent registrations for the same identity.
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(&new_user.username)
        .bind(new_user.email.to_lowercase())
        .bind(&new_user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_err)?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Unavailable(e.into()))?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| StoreError::Unavailable(e.into()))?;
        Ok(user)
    }
}

/// 23505 is Postgres `unique_violation`; the constraint name says which
/// identifying field collided.
fn map_insert_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            let field = if db_err.constraint().is_some_and(|c| c.contains("username")) {
                IdentityField::Username
            } else {
                IdentityField::Email
            };
            return StoreError::Duplicate(field);
        }
    }
    StoreError::Unavailable(e.into())
}
