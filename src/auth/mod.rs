pub mod gateway;

pub use gateway::{AuthError, AuthGateway};
