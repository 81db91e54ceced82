//! The credential store. Password checks happen behind [`Authenticator`];
//! everything after a successful check lives in `services::auth`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::PgPool;

use crate::models::user::User;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` for unknown users, wrong passwords and inactive accounts alike.
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<Option<User>>;

    async fn find_active(&self, user_id: i64) -> anyhow::Result<Option<User>>;
}

pub struct PgAuthenticator {
    pool: PgPool,
}

impl PgAuthenticator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the user or reset its password and staff flag.
    pub async fn upsert_user(
        &self,
        username: &str,
        password: &str,
        is_staff: bool,
    ) -> anyhow::Result<User> {
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash, is_staff)
             VALUES ($1, $2, $3)
             ON CONFLICT (username) DO UPDATE
             SET password_hash = EXCLUDED.password_hash,
                 is_staff = EXCLUDED.is_staff,
                 is_active = TRUE
             RETURNING *",
        )
        .bind(username)
        .bind(hash)
        .bind(is_staff)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl Authenticator for PgAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 AND is_active = TRUE",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let Some(user) = user else {
            return Ok(None);
        };
        let valid = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
        Ok(valid.then_some(user))
    }

    async fn find_active(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND is_active = TRUE",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

/// Process-local credential store for development and tests.
pub struct MemoryAuthenticator {
    users: RwLock<Vec<User>>,
    hash_cost: u32,
}

impl MemoryAuthenticator {
    pub fn new(hash_cost: u32) -> Self {
        Self {
            users: RwLock::new(Vec::new()),
            hash_cost,
        }
    }

    pub fn add_user(&self, username: &str, password: &str, is_staff: bool) -> anyhow::Result<User> {
        let password_hash = bcrypt::hash(password, self.hash_cost)?;
        let mut users = self.users.write();
        if users.iter().any(|u| u.username == username) {
            anyhow::bail!("User already exists: {username}");
        }
        let user = User {
            id: users.len() as i64 + 1,
            username: username.to_string(),
            password_hash,
            is_staff,
            is_active: true,
            date_joined: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    pub fn set_active(&self, user_id: i64, is_active: bool) {
        if let Some(user) = self.users.write().iter_mut().find(|u| u.id == user_id) {
            user.is_active = is_active;
        }
    }
}

#[async_trait]
impl Authenticator for MemoryAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<Option<User>> {
        let user = self
            .users
            .read()
            .iter()
            .find(|u| u.username == username && u.is_active)
            .cloned();
        Ok(user.filter(|u| bcrypt::verify(password, &u.password_hash).unwrap_or(false)))
    }

    async fn find_active(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|u| u.id == user_id && u.is_active)
            .cloned())
    }
}
