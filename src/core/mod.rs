//! Core primitives.
//!
//! Randomness for board generation and dice. Seedable so games can be
//! reproduced in tests.

pub mod rng;

// Re-export core types
pub use rng::{Dice, RandomSource, XorShiftRng};
