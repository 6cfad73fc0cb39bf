pub mod auth;
pub mod requests;
