pub mod auth;
pub mod school;
