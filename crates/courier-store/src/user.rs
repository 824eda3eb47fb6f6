//! User records and the user store seam.

use crate::StoreError;
use async_trait::async_trait;
use bcrypt::{hash, DEFAULT_COST};
use courier_protocol::{events::UserProfile, UserId};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// A registered user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Registered email address (unique).
    pub email: String,
    /// Bcrypt hash of the password. Never leaves the store layer.
    pub password_hash: String,
    /// First name, once the profile is set up.
    pub first_name: Option<String>,
    /// Last name, once the profile is set up.
    pub last_name: Option<String>,
    /// Display color chosen during profile setup.
    pub avatar_color: Option<String>,
    /// Whether the user completed profile setup.
    pub profile_complete: bool,
}

impl User {
    /// The sanitized projection embedded in wire payloads.
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar_color: self.avatar_color.clone(),
            profile_complete: self.profile_complete,
        }
    }
}

/// Check a plaintext password against a user's stored hash.
///
/// # Errors
///
/// Returns an error if the stored hash is malformed.
pub fn verify_password(user: &User, password: &str) -> Result<bool, StoreError> {
    Ok(bcrypt::verify(password, &user.password_hash)?)
}

/// Profile fields applied by `update_profile`.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub avatar_color: Option<String>,
}

/// The user record store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Register a new user. The password is hashed here; plaintext is never
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEmail` if the email is taken.
    async fn create(&self, email: &str, password: &str) -> Result<User, StoreError>;

    /// Look up a user by identifier.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Look up a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Case-insensitive substring search over names and email.
    async fn search(&self, term: &str) -> Result<Vec<User>, StoreError>;

    /// All registered users.
    async fn all(&self) -> Result<Vec<User>, StoreError>;

    /// Apply profile setup fields. Marks the profile complete.
    ///
    /// Returns `None` if the user does not exist.
    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError>;
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    first_name: Option<String>,
    last_name: Option<String>,
    avatar_color: Option<String>,
    profile_complete: bool,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StoreError::Corrupt(format!("user id {}: {e}", row.id)))?;
        Ok(User {
            id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar_color: row.avatar_color,
            profile_complete: row.profile_complete,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, avatar_color, profile_complete";

/// SQLite-backed user store.
#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let id = Uuid::new_v4();
        let password_hash = hash(password, DEFAULT_COST)?;

        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, profile_complete) VALUES (?, ?, ?, 0)",
        )
        .bind(id.to_string())
        .bind(email)
        .bind(&password_hash)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                return Err(StoreError::DuplicateEmail);
            }
            return Err(e.into());
        }

        debug!(user = %id, "User created");
        Ok(User {
            id,
            email: email.to_string(),
            password_hash,
            first_name: None,
            last_name: None,
            avatar_color: None,
            profile_complete: false,
        })
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    async fn search(&self, term: &str) -> Result<Vec<User>, StoreError> {
        let pattern = format!("%{term}%");
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE email LIKE ? OR first_name LIKE ? OR last_name LIKE ?"
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn all(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query(
            "UPDATE users
             SET first_name = ?, last_name = ?,
                 avatar_color = COALESCE(?, avatar_color),
                 profile_complete = 1
             WHERE id = ?",
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(update.avatar_color.as_deref())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    #[tokio::test]
    async fn test_create_and_find() {
        let store = SqliteUserStore::new(test_pool().await);

        let user = store.create("alice@example.com", "hunter2").await.unwrap();
        assert!(!user.profile_complete);
        assert_ne!(user.password_hash, "hunter2");

        let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");

        let by_email = store.find_by_email("alice@example.com").await.unwrap();
        assert!(by_email.is_some());
        assert!(store.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = SqliteUserStore::new(test_pool().await);

        store.create("alice@example.com", "pw-one").await.unwrap();
        match store.create("alice@example.com", "pw-two").await {
            Err(StoreError::DuplicateEmail) => {}
            other => panic!("Expected DuplicateEmail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_password_verification() {
        let store = SqliteUserStore::new(test_pool().await);
        let user = store.create("alice@example.com", "hunter2").await.unwrap();

        assert!(verify_password(&user, "hunter2").unwrap());
        assert!(!verify_password(&user, "wrong").unwrap());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let store = SqliteUserStore::new(test_pool().await);
        let user = store.create("alice@example.com", "hunter2").await.unwrap();

        let updated = store
            .update_profile(
                user.id,
                ProfileUpdate {
                    first_name: "Alice".to_string(),
                    last_name: "Liddell".to_string(),
                    avatar_color: Some("#7c3aed".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(updated.profile_complete);
        assert_eq!(updated.first_name.as_deref(), Some("Alice"));
        assert_eq!(updated.avatar_color.as_deref(), Some("#7c3aed"));

        let missing = store
            .update_profile(
                Uuid::new_v4(),
                ProfileUpdate {
                    first_name: "No".to_string(),
                    last_name: "One".to_string(),
                    avatar_color: None,
                },
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_search() {
        let store = SqliteUserStore::new(test_pool().await);
        let alice = store.create("alice@example.com", "pw").await.unwrap();
        store.create("bob@example.com", "pw").await.unwrap();

        store
            .update_profile(
                alice.id,
                ProfileUpdate {
                    first_name: "Alice".to_string(),
                    last_name: "Liddell".to_string(),
                    avatar_color: None,
                },
            )
            .await
            .unwrap();

        let by_email = store.search("alice@").await.unwrap();
        assert_eq!(by_email.len(), 1);

        let by_name = store.search("Liddell").await.unwrap();
        assert_eq!(by_name.len(), 1);

        assert_eq!(store.all().await.unwrap().len(), 2);
    }
}
