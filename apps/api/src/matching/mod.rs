pub mod handlers;
pub mod preferences;
pub mod recommend;
