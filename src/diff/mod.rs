pub mod engine;

pub use engine::{DiffEngine, LiveResults};
