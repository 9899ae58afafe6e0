pub mod capture;
pub mod handlers;
pub mod interactions;
