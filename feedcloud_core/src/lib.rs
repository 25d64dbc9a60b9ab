pub mod auth;
pub mod database;
pub mod error;
pub mod logging;
pub mod model;
pub mod schema;
pub mod settings;
pub mod view;

pub use database::{Database, DatabasePool};
pub use error::*;
pub use settings::Settings;
