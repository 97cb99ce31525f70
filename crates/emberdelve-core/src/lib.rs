mod engine;
mod grid;
mod rng;

pub use crate::engine::*;
pub use crate::grid::*;
pub use crate::rng::*;
