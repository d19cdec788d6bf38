pub mod dashboard_handlers;
pub mod home_handlers;
pub mod profile_handlers;

pub use dashboard_handlers::dashboard_handler;
pub use home_handlers::home_handler;
pub use profile_handlers::{profile_page, update_profile_handler};
