pub mod user;

pub use user::{User, DEFAULT_PICTURE};
