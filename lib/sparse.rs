//! Small helpers over [`nalgebra_sparse`] matrices.
//!
//! Block operators are stored in compressed sparse row form; rotations and
//! reduced density matrices are dense. Conversions and products between the
//! two come from [`nalgebra_sparse`] itself.

use nalgebra as na;
use nalgebra_sparse::{ CooMatrix, CsrMatrix };
use rustc_hash::FxHashMap;

/// Create an `n × n` sparse identity.
pub fn eye(n: usize) -> CsrMatrix<f64> { CsrMatrix::identity(n) }

/// Create an `n × n` sparse matrix with no stored entries.
pub fn zeros(n: usize) -> CsrMatrix<f64> { CsrMatrix::zeros(n, n) }

/// Create a sparse matrix from `(row, col, value)` triplets, summing
/// duplicates.
///
/// # Panics
/// Panics if any triplet is out of bounds.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I)
    -> CsrMatrix<f64>
where I: IntoIterator<Item = (usize, usize, f64)>
{
    let mut coo = CooMatrix::new(nrows, ncols);
    triplets.into_iter()
        .for_each(|(i, j, v)| { coo.push(i, j, v); });
    CsrMatrix::from(&coo)
}

/// Compute `rot · mat · rotᵀ`, the change of basis of a block operator, and
/// return it in sparse form.
///
/// # Panics
/// Panics if `rot` does not have as many columns as `mat` has rows.
pub fn rotate(mat: &CsrMatrix<f64>, rot: &na::DMatrix<f64>) -> CsrMatrix<f64> {
    let tmp: na::DMatrix<f64> = mat * &rot.transpose();
    CsrMatrix::from(&(rot * tmp))
}

/// Return the largest `|a_ij − a_ji|` over the entries of a square matrix.
pub fn max_asymmetry(mat: &CsrMatrix<f64>) -> f64 {
    let mut acc: FxHashMap<(usize, usize), f64> = FxHashMap::default();
    for (i, j, v) in mat.triplet_iter() {
        *acc.entry((i, j)).or_insert(0.0) += *v;
        *acc.entry((j, i)).or_insert(0.0) -= *v;
    }
    acc.values().fold(0.0, |m, d| f64::max(m, d.abs()))
}
