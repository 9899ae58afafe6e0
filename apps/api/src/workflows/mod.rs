pub mod condition;
pub mod email;
pub mod engine;
pub mod handlers;
pub mod steps;
