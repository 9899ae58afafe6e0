pub mod agent;
pub mod booking;
pub mod campaign;
pub mod lead;
pub mod property;
pub mod workflow;
