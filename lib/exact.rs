//! Exact diagonalization of short chains in the full product basis.
//!
//! Used as a reference for the block-renormalized results; the cost is
//! exponential in the number of sites, so this is only meant for chains of a
//! dozen sites or so.

use nalgebra_sparse::{ CooMatrix, CsrMatrix };
use crate::{
    config::SolverConfig,
    eigen::{ self, EigenResult },
    model::{ LatticeModel, Op },
};

// action of a single-site operator on a product state: site 0 is the most
// significant bit, and a set bit is a down spin
fn apply(op: Op, site: usize, n: usize, state: usize) -> Option<(usize, f64)> {
    let bit = 1 << (n - 1 - site);
    let down = state & bit != 0;
    match op {
        Op::Sz => Some((state, if down { -0.5 } else { 0.5 })),
        Op::Sp => down.then_some((state & !bit, 1.0)),
        Op::Sm => (!down).then_some((state | bit, 1.0)),
    }
}

/// Hamiltonian of the first `n` sites of `model` in the `2^n`-dimensional
/// product basis, ordered like nested Kronecker products of single sites.
pub fn hamiltonian<M>(model: &M, n: usize) -> CsrMatrix<f64>
where M: LatticeModel + ?Sized
{
    let dim = 1 << n;
    let terms = model.terms(n);
    let mut coo: CooMatrix<f64> = CooMatrix::new(dim, dim);
    for col in 0..dim {
        for t in terms.iter() {
            let image
                = apply(t.jop, t.jsite, n, col)
                .and_then(|(s, a)| {
                    apply(t.iop, t.isite, n, s).map(|(row, b)| (row, a * b))
                });
            if let Some((row, amp)) = image {
                coo.push(row, col, t.coeff * amp);
            }
        }
    }
    CsrMatrix::from(&coo)
}

/// Lowest eigenvalue of [`hamiltonian`].
pub fn ground_energy<M>(model: &M, n: usize) -> EigenResult<f64>
where M: LatticeModel + ?Sized
{
    let h = hamiltonian(model, n);
    eigen::ground_state(&h, &SolverConfig::default()).map(|gs| gs.energy)
}
