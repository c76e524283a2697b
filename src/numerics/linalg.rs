//! Small dense systems on top of `nalgebra`: threshold Jacobians, normal
//! equations and bordered Hessians, never larger than a few dozen rows.

use nalgebra::{DMatrix, DVector, Dyn, LU};

pub type Matrix = DMatrix<f64>;

/// LU factorization, or `None` when a pivot is negligible next to the
/// largest entry.
fn factorize(a: &Matrix) -> Option<LU<f64, Dyn, Dyn>> {
    if !a.is_square() || a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let tiny = f64::EPSILON * a.amax() * a.nrows().max(1) as f64;
    let lu = a.clone().lu();
    let pivots_ok = lu.u().diagonal().iter().all(|d| d.abs() > tiny && *d != 0.0);
    pivots_ok.then_some(lu)
}

/// Solves `A x = b`. Returns `None` when `A` is singular to working precision.
pub fn solve(a: &Matrix, b: &[f64]) -> Option<Vec<f64>> {
    if b.len() != a.nrows() {
        return None;
    }
    let x = factorize(a)?.solve(&DVector::from_column_slice(b))?;
    x.iter().all(|v| v.is_finite()).then(|| x.as_slice().to_vec())
}

/// Inverse of a square matrix, or `None` when singular.
pub fn invert(a: &Matrix) -> Option<Matrix> {
    let inverse = factorize(a)?.try_inverse()?;
    inverse.iter().all(|v| v.is_finite()).then_some(inverse)
}

/// `A x` for a plain slice.
pub fn mul_vec(a: &Matrix, v: &[f64]) -> Vec<f64> {
    (a * DVector::from_column_slice(v)).as_slice().to_vec()
}

/// Replaces a square matrix with `(A + Aᵀ) / 2`.
pub fn symmetrize(a: &mut Matrix) {
    let mirrored = (&*a + a.transpose()) * 0.5;
    *a = mirrored;
}

/// Largest `|A_ij - A_ji|` over off-diagonal pairs, skipping NaN entries.
pub fn max_asymmetry(a: &Matrix) -> f64 {
    let mut worst = 0.0_f64;
    for i in 0..a.nrows() {
        for j in (i + 1)..a.ncols() {
            let d = (a[(i, j)] - a[(j, i)]).abs();
            if d.is_finite() {
                worst = worst.max(d);
            }
        }
    }
    worst
}

/// Serde adapter writing a matrix as a list of rows.
pub mod rows {
    use super::Matrix;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &Matrix, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<Vec<f64>> = m
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Matrix, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        let n_cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != n_cols) {
            return Err(D::Error::custom("matrix rows differ in length"));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Ok(Matrix::from_row_slice(rows.len(), n_cols, &flat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_solve_needs_pivoting() {
        let a = Matrix::from_row_slice(2, 2, &[0.0, 2.0, 3.0, 1.0]);
        let x = solve(&a, &[4.0, 5.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-14);
        assert!((x[1] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let a = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(invert(&a).is_none());
        assert!(solve(&a, &[1.0, 2.0]).is_none());
        assert!(invert(&Matrix::zeros(3, 3)).is_none());
    }

    #[test]
    fn test_bordered_matrix_with_zero_corner() {
        // Zero leading entry is typical of bordered Hessians.
        let a = Matrix::from_row_slice(3, 3, &[0.0, 1.0, 2.0, 1.0, -2.0, 1.0, 2.0, 1.0, -0.5]);
        let inv = invert(&a).unwrap();
        let prod = &inv * &a;
        assert!((prod - Matrix::identity(3, 3)).amax() < 1e-12);
    }

    #[test]
    fn test_symmetrize() {
        let mut a = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 1.0]);
        assert_eq!(max_asymmetry(&a), 2.0);
        symmetrize(&mut a);
        assert_eq!(a[(0, 1)], 3.0);
        assert_eq!(max_asymmetry(&a), 0.0);
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapped {
        #[serde(with = "rows")]
        m: Matrix,
    }

    #[test]
    fn test_serde_as_rows() {
        let w = Wrapped {
            m: Matrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"m":[[1.0,2.0],[3.0,4.0]]}"#);
        let back: Wrapped = serde_json::from_str(&json).unwrap();
        assert_eq!(back.m, w.m);

        assert!(serde_json::from_str::<Wrapped>(r#"{"m":[[1.0],[2.0,3.0]]}"#).is_err());
    }
}
