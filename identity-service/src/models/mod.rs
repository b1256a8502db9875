pub mod client_profile;
pub mod identity_mapping;
pub mod user;

pub use client_profile::ClientProfile;
pub use identity_mapping::IdentityMapping;
pub use user::{AccountStatus, User, UserResponse, UserRole};
