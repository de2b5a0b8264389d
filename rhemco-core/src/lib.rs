pub mod buffer;
pub mod config;
pub mod extension;
pub mod grid;
pub mod instance;
pub mod options;
pub mod physics;
pub mod species;
pub mod state;
pub mod utils;

pub mod errors;
