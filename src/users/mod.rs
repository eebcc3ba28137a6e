// Users module - account lifecycle, login, verification, and CRUD

pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod validators;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use models::{AuthService, ForceUpdate, User, UserRole, UserStatus};
pub use routes::routes;
pub use services::UserService;
