pub mod attendance;
pub mod auth;
pub mod core;
pub mod documents;
pub mod roster;
