mod env;
mod error;
mod model;
mod service;
mod store;

pub use env::*;
pub use error::*;
pub use model::*;
pub use service::*;
pub use store::{default_path, write_starter};
