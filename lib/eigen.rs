//! Lowest eigenpair of a real symmetric sparse matrix.
//!
//! Matrices up to [`SolverConfig::dense_threshold`] are expanded and
//! diagonalized with [`nalgebra::SymmetricEigen`]. Larger ones go through a
//! restarted Lanczos iteration with full reorthogonalization:
//!
//! ```text
//!   x₀ (seeded random) ──► K_m(H, x₀) ──► T_m = Vᵀ H V ──► (θ, y) lowest
//!        ▲                                                      │
//!        └──────────── restart with x = V y ◄── residual > tol ─┘
//! ```
//!
//! The returned vector is normalized, with its largest-magnitude component
//! made positive so that repeated runs give the same sign.

use nalgebra as na;
use nalgebra_sparse::CsrMatrix;
use rand::{ rngs::StdRng, Rng, SeedableRng };
use thiserror::Error;
use crate::config::SolverConfig;

#[derive(Clone, Debug, Error)]
pub enum EigenError {
    /// Returned when the matrix has no rows.
    #[error("error in eigensolver: empty matrix")]
    EmptyMatrix,

    /// Returned when the matrix is not square.
    #[error("error in eigensolver: matrix is not square ({nrows}×{ncols})")]
    NotSquare { nrows: usize, ncols: usize },

    /// Returned when the Krylov dimension is too small to make progress.
    #[error("error in eigensolver: Krylov dimension must be at least 2, got {0}")]
    KrylovDim(usize),

    /// Returned when the iteration fails to reach the requested tolerance.
    #[error("error in eigensolver: no convergence after {restarts} restarts (residual {residual:.3e})")]
    NoConvergence { restarts: usize, residual: f64 },
}
use EigenError::*;
pub type EigenResult<T> = Result<T, EigenError>;

// Krylov vectors below this norm signal an invariant subspace
const BREAKDOWN: f64 = 1e-14;

/// Lowest eigenvalue and its normalized eigenvector.
#[derive(Clone, Debug)]
pub struct GroundState {
    pub energy: f64,
    pub vector: na::DVector<f64>,
}

/// Compute the lowest (smallest algebraic) eigenpair of the symmetric matrix
/// `h`.
pub fn ground_state(h: &CsrMatrix<f64>, config: &SolverConfig)
    -> EigenResult<GroundState>
{
    if h.nrows() != h.ncols() {
        return Err(NotSquare { nrows: h.nrows(), ncols: h.ncols() });
    }
    if h.nrows() == 0 { return Err(EmptyMatrix); }
    let (energy, mut vector)
        = if h.nrows() <= config.dense_threshold {
            dense_lowest(&na::DMatrix::<f64>::from(h))
        } else {
            lanczos_lowest(h, config)?
        };
    fix_sign(&mut vector);
    Ok(GroundState { energy, vector })
}

fn dense_lowest(h: &na::DMatrix<f64>) -> (f64, na::DVector<f64>) {
    let eig = h.clone().symmetric_eigen();
    let k = eig.eigenvalues.imin();
    (eig.eigenvalues[k], eig.eigenvectors.column(k).into_owned())
}

fn fix_sign(x: &mut na::DVector<f64>) {
    let k = x.iamax();
    if x[k] < 0.0 { x.neg_mut(); }
}

fn lanczos_lowest(h: &CsrMatrix<f64>, config: &SolverConfig)
    -> EigenResult<(f64, na::DVector<f64>)>
{
    let n = h.nrows();
    let m = config.krylov_dim.min(n);
    if m < 2 { return Err(KrylovDim(config.krylov_dim)); }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut x: na::DVector<f64>
        = na::DVector::from_fn(n, |_, _| rng.gen::<f64>() - 0.5);
    x.normalize_mut();

    let mut residual = f64::INFINITY;
    for restart in 0..=config.max_restarts {
        let mut basis: Vec<na::DVector<f64>> = vec![x.clone()];
        let mut alpha: Vec<f64> = Vec::with_capacity(m);
        let mut beta: Vec<f64> = Vec::with_capacity(m);
        for k in 0..m {
            let mut w: na::DVector<f64> = h * &basis[k];
            alpha.push(basis[k].dot(&w));
            // two passes of classical Gram-Schmidt
            for _ in 0..2 {
                for v in basis.iter() {
                    let c = v.dot(&w);
                    w.axpy(-c, v, 1.0);
                }
            }
            let b = w.norm();
            if k + 1 == m || b < BREAKDOWN { break; }
            beta.push(b);
            basis.push(&w / b);
        }

        let size = alpha.len();
        let t = na::DMatrix::from_fn(size, size, |i, j| {
            if i == j {
                alpha[i]
            } else if i == j + 1 {
                beta[j]
            } else if j == i + 1 {
                beta[i]
            } else {
                0.0
            }
        });
        let (theta, y) = dense_lowest(&t);
        x = basis.iter()
            .zip(y.iter())
            .fold(na::DVector::zeros(n), |acc, (v, yk)| acc + v * *yk);
        x.normalize_mut();

        let mut w: na::DVector<f64> = h * &x;
        w.axpy(-theta, &x, 1.0);
        residual = w.norm();
        if residual <= config.tol * theta.abs().max(1.0) {
            log::trace!(
                "lanczos converged after {} restarts (dim {}, residual {:.3e})",
                restart, n, residual,
            );
            return Ok((theta, x));
        }
    }
    Err(NoConvergence { restarts: config.max_restarts, residual })
}
