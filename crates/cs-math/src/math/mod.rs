//! Core math modules.

pub mod linalg;
pub mod matrix;
pub mod stable;
pub mod stats;
