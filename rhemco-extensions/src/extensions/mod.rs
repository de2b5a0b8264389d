mod custom;

pub use custom::{Custom, CustomData, CustomParameters};
