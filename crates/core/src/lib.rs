pub mod config;
pub mod entity;
pub mod error;
pub mod sample;

pub use config::{load_dotenv, EngineConfig, PercentagePolicy};
pub use entity::*;
pub use error::*;
pub use sample::*;
