pub mod agent;
pub mod cache;
pub mod errors;
pub mod json_validator;
pub mod models;
pub mod observation;
pub mod providers;
pub mod tool;
