pub mod models;
pub mod presence;
