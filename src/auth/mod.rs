// Auth module - token service, access gate, and resource ownership checks

pub mod extractors;
pub mod gate;
pub mod models;
pub mod ownership;
pub mod token;


// Re-export commonly used types
pub use models::{AccessPolicy, AuthedUser, Claims, ResourceOwner, ResourceRole};
pub use token::TokenService;
