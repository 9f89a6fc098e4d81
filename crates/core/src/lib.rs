pub mod config;
pub mod error;
pub mod features;
pub mod gateway;
pub mod interpret;
pub mod memory;
pub mod prompt;
pub mod studio;
pub mod types;
