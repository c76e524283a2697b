// Numerical primitives consumed by the production engine: dense solves on
// nalgebra, adaptive quadrature and a least-squares optimizer.

pub mod linalg;
pub mod optimize;
pub mod quadrature;

pub use linalg::{invert, max_asymmetry, mul_vec, symmetrize, Matrix};
pub use optimize::{levenberg_marquardt, LmOptions, LmReport, Termination};
pub use quadrature::{integrate, Quadrature, QuadratureOptions};
