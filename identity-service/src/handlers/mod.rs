pub mod auth;
pub mod platform;
pub mod tenant;
pub mod user;
