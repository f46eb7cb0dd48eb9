mod application;
pub mod data;
mod prompt;
mod runtime_config;
mod tree_view;

pub use application::{Application, ApplicationError};
pub use runtime_config::RuntimeConfig;
