mod handler;
mod model;

pub use handler::{online_users, update_location};
