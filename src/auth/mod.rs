pub mod authentication;
pub mod authenticator;
pub mod permissions;
pub mod user;

pub use authentication::*;
pub use authenticator::*;
pub use permissions::*;
pub use user::*;
