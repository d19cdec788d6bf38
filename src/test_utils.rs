pub mod test_helpers {
    use crate::{
        config::{session::SessionConfig, AppConfig},
        routes,
        services::FsPictureStore,
        AppState,
    };
    use axum::Router;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use std::{io::Cursor, path::Path, sync::Arc};
    use tower_sessions_sqlx_store::SqliteStore;

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Insert a test user with hashed password
    pub async fn insert_test_user(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<i64, sqlx::Error> {
        use argon2::{
            password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
            Argon2,
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                sqlx::Error::Configuration(format!("Password hashing failed: {}", e).into())
            })?
            .to_string();

        let result = sqlx::query(
            "INSERT INTO users (full_name, username, email, password_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(format!("Test {}", username))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Point a user at a picture file without going through an upload.
    pub async fn set_picture(
        pool: &SqlitePool,
        user_id: i64,
        picture: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET picture = ? WHERE id = ?")
            .bind(picture)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn picture_of(pool: &SqlitePool, user_id: i64) -> Result<String, sqlx::Error> {
        sqlx::query_scalar("SELECT picture FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    pub async fn count_users(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
    }

    /// Encoded single-colour image of the given size.
    pub fn sample_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 90, 160])));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, format)
            .expect("encoding an in-memory test image cannot fail");
        out.into_inner()
    }

    /// Application state over `pool` with pictures stored in `picture_dir`.
    pub fn test_state(pool: SqlitePool, picture_dir: &Path) -> AppState {
        let config = AppConfig::with_paths(":memory:", picture_dir);
        AppState::new(config, pool, Arc::new(FsPictureStore::new(picture_dir)))
    }

    /// The full router, sessions included, backed by `pool`.
    pub async fn test_app(pool: SqlitePool, picture_dir: &Path) -> Result<Router, sqlx::Error> {
        let session_store = SqliteStore::new(pool.clone());
        session_store.migrate().await?;
        let session_layer = SessionConfig::from_env().create_layer(session_store);

        Ok(routes::build_router(
            test_state(pool, picture_dir),
            session_layer,
        ))
    }
}
