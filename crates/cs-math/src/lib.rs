//! claimscope math utilities.

pub mod math;

pub use math::linalg::{symmetric_eigen, Cholesky, LinalgError, SymmetricEigen};
pub use math::matrix::{Matrix, ShapeError};
pub use math::stable::*;
pub use math::stats::*;
