use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{CredentialStore, IdentityField, NewUser, StoreError, User};

/// Ephemeral in-process credential store. The mutex is held across the
/// uniqueness check and the insert, which gives `create` the same atomicity
/// guarantee the Postgres backend gets from its unique indexes. Selected via
/// `STORE_BACKEND=memory`; everything vanishes on restart.
#[derive(Default)]
pub struct MemStore {
    users: Mutex<Vec<User>>,
}

impl MemStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<User>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow::anyhow!("credential store lock poisoned")))
    }
}

#[async_trait]
impl CredentialStore for MemStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let email = new_user.email.to_lowercase();
        let mut users = self.lock()?;

        if users.iter().any(|u| u.email == email) {
            return Err(StoreError::Duplicate(IdentityField::Email));
        }
        if users.iter().any(|u| u.username == new_user.username) {
            return Err(StoreError::Duplicate(IdentityField::Username));
        }

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email,
            password_hash: new_user.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_lowercase();
        let users = self.lock()?;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.lock()?;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }
}
