use crate::models::user::User;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("User not found")]
    NotFound,
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Email already exists")]
    DuplicateEmail,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Editable profile columns; the picture is the already-stored filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChanges {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub picture: String,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> RepositoryResult<User>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;
    async fn update_profile(&self, id: i64, changes: ProfileChanges) -> RepositoryResult<User>;
    async fn count_users(&self) -> RepositoryResult<i64>;
    async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<User>>;
}

const USER_COLUMNS: &str =
    "id, full_name, username, email, picture, password_hash, bio, created_at";

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

/// Maps UNIQUE violations on `users` to the column that caused them.
fn classify_write_error(err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            if message.contains("users.username") {
                return RepositoryError::DuplicateUsername;
            }
            if message.contains("users.email") {
                return RepositoryError::DuplicateEmail;
            }
        }
    }
    RepositoryError::Database(err)
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, new_user: NewUser) -> RepositoryResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (full_name, username, email, password_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(&new_user.full_name)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn update_profile(&self, id: i64, changes: ProfileChanges) -> RepositoryResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET full_name = ?, username = ?, email = ?, bio = ?, picture = ?
            WHERE id = ?
            "#,
        )
        .bind(&changes.full_name)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.bio)
        .bind(&changes.picture)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    async fn count_users(&self) -> RepositoryResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<User>> {
        let limit = limit.unwrap_or(100);
        let offset = offset.unwrap_or(0);

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}
