pub mod handlers;
pub mod session;

pub use session::{current_user, SessionUser};
