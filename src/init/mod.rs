pub mod agent;
pub mod args;
pub mod wait;
