pub mod auth;
pub mod child;
pub mod enrollment;
pub mod payment;
pub mod qr;
pub mod school;
pub mod user;
