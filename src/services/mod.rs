pub mod auth_service;
pub mod picture_service;
pub mod user_service;

pub use auth_service::AuthService;
pub use picture_service::{FsPictureStore, PictureService, PictureStore};
pub use user_service::UserService;
