//! CLI command implementations.

pub mod elect;
pub mod score;
pub mod simulate;
