pub mod address;
pub mod classifier;
pub mod errors;
pub mod models;
