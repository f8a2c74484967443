mod app;
pub mod auth;
pub mod backend;
pub mod models;
pub mod plugin;
pub mod settings;
pub mod tracker;
pub mod tracking;
pub mod utils;

pub use app::{launch, ActivityApp};
pub use utils::init_logging;
