use chrono::NaiveDateTime;
use sqlx::FromRow;

/// Picture filename meaning "no custom picture uploaded".
pub const DEFAULT_PICTURE: &str = "default.jpg";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub picture: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn has_custom_picture(&self) -> bool {
        self.picture != DEFAULT_PICTURE
    }

    /// Public URL of the user's picture, relative to the site root.
    pub fn picture_url(&self) -> String {
        format!("/pictures/{}", self.picture)
    }
}
