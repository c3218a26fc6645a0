//! Tenant-namespace models, request payloads and provider identities

pub mod catalog;
pub mod identity;
pub mod stock;

pub use catalog::*;
pub use identity::UserProfile;
pub use stock::*;
