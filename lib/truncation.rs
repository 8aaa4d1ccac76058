//! Reduced-density-matrix truncation of an enlarged system/environment pair.
//!
//! Given the superblock ground state `∣ψ⟩` on a targeted [`KronBlocks`]
//! basis, each segment `(l, r)` of the vector is reshaped into the
//! `n_l × n_r` matrix Ψ (row-major by the right index), and the reduced
//! density matrices of both halves are assembled sector by sector,
//!
//! ```text
//!   ρ_L[l] = Σ_r Ψ Ψᵀ        ρ_R[r] = Σ_l Ψᵀ Ψ
//! ```
//!
//! Every sector block is diagonalized and the `m` eigenvectors with the largest
//! eigenvalues are kept, grouped by sector. Equal eigenvalues are ranked by the
//! first superblock segment their sector appears in. The kept eigenvectors,
//! transposed, form the rows of the rotation that maps the enlarged basis onto
//! the truncated one.

use std::collections::BTreeMap;
use nalgebra as na;
use thiserror::Error;
use crate::{
    comm::{ CommError, Communicator },
    kron::KronBlocks,
    qn::{ QnError, QuantumNumbers },
};

#[derive(Clone, Debug, Error)]
pub enum TruncError {
    /// Returned when the pairing carries no sector structure.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Returned when zero states are requested.
    #[error("error in truncation: number of kept states must be at least 1")]
    ZeroStates,

    /// Returned when the vector does not match the pairing.
    #[error("error in truncation: vector has length {len}, expected {expected}")]
    VectorLength { len: usize, expected: usize },

    #[error("quantum number error: {0}")]
    QnError(#[from] QnError),

    #[error("communication error: {0}")]
    CommError(#[from] CommError),
}
use TruncError::*;
pub type TruncResult<T> = Result<T, TruncError>;

/// One eigenpair of a reduced density matrix sector block.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EigenRecord {
    /// Eigenvalue.
    pub eigval: f64,
    /// Superblock segment in which the sector first appears.
    pub seq_idx: usize,
    /// Position within its sector block, by decreasing eigenvalue.
    pub eps_idx: usize,
    /// Sector of the enlarged block.
    pub blk_idx: usize,
}

/// Truncation of one enlarged block.
#[derive(Clone, Debug)]
pub struct Truncation {
    /// Rotation with one row per kept state and one column per state of the
    /// enlarged block.
    pub rot_t: na::DMatrix<f64>,
    /// Sector index of the kept states.
    pub qn: QuantumNumbers,
    /// Discarded weight, `1 - Σ λ` over the kept eigenvalues.
    pub trunc_err: f64,
    /// Von Neumann entropy of the full reduced density matrix.
    pub entropy: f64,
    /// `(sector value, eigenvalue)` of each kept state, in row order.
    pub spectrum: Vec<(f64, f64)>,
}

impl Truncation {
    /// Number of kept states.
    pub fn num_states(&self) -> usize { self.rot_t.nrows() }
}

/// Truncations of both halves of a superblock.
#[derive(Clone, Debug)]
pub struct TruncationPair {
    pub left: Truncation,
    pub right: Truncation,
}

/// Compute the truncations of both halves of the superblock state `gsv`,
/// keeping at most `mstates` states on each side.
///
/// The computation is done on the root rank of `comm` and its outcome,
/// success or error, is broadcast to every rank.
pub fn get_truncation<C>(
    comm: &C,
    kron: &KronBlocks,
    gsv: &na::DVector<f64>,
    mstates: usize,
) -> TruncResult<TruncationPair>
where C: Communicator
{
    let local = comm.is_root().then(|| compute_truncation(kron, gsv, mstates));
    comm.broadcast(local)?
}

fn compute_truncation(kron: &KronBlocks, gsv: &na::DVector<f64>, mstates: usize)
    -> TruncResult<TruncationPair>
{
    if !kron.is_restricted() {
        return Err(Unsupported(
            "truncation requires a quantum number-restricted superblock"
        ));
    }
    if mstates == 0 { return Err(ZeroStates); }
    if gsv.len() != kron.num_states() {
        return Err(VectorLength { len: gsv.len(), expected: kron.num_states() });
    }

    let lqn = kron.left_qn();
    let rqn = kron.right_qn();
    let mut rho_l: BTreeMap<usize, na::DMatrix<f64>> = BTreeMap::new();
    let mut rho_r: BTreeMap<usize, na::DMatrix<f64>> = BTreeMap::new();
    // (segment, sector) at the first segment each sector appears in
    let mut first_l: Vec<(usize, usize)> = Vec::new();
    let mut first_r: Vec<(usize, usize)> = Vec::new();
    for (k, kb) in kron.blocks().iter().enumerate() {
        let nl = lqn.sizes()[kb.left];
        let nr = rqn.sizes()[kb.right];
        let seg = kron.segment(k);
        let psi = na::DMatrix::from_row_slice(nl, nr, &gsv.as_slice()[seg]);
        let psi_t = psi.transpose();
        *rho_l.entry(kb.left)
            .or_insert_with(|| {
                first_l.push((k, kb.left));
                na::DMatrix::zeros(nl, nl)
            })
            += &psi * &psi_t;
        *rho_r.entry(kb.right)
            .or_insert_with(|| {
                first_r.push((k, kb.right));
                na::DMatrix::zeros(nr, nr)
            })
            += &psi_t * &psi;
    }
    let left = truncate_side(rho_l, &first_l, lqn, mstates)?;
    let right = truncate_side(rho_r, &first_r, rqn, mstates)?;
    Ok(TruncationPair { left, right })
}

fn truncate_side(
    mut rho: BTreeMap<usize, na::DMatrix<f64>>,
    first: &[(usize, usize)],
    qn: &QuantumNumbers,
    mstates: usize,
) -> TruncResult<Truncation>
{
    // eigenvectors of each sector block, columns ordered by decreasing
    // eigenvalue
    let mut vecs: BTreeMap<usize, na::DMatrix<f64>> = BTreeMap::new();
    let mut records: Vec<EigenRecord> = Vec::new();
    for &(seq_idx, blk_idx) in first.iter() {
        let Some(mat) = rho.remove(&blk_idx) else { continue; };
        let eig = mat.symmetric_eigen();
        let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
        for (eps_idx, &k) in order.iter().enumerate() {
            records.push(EigenRecord {
                eigval: eig.eigenvalues[k],
                seq_idx,
                eps_idx,
                blk_idx,
            });
        }
        let sorted = eig.eigenvectors.select_columns(order.iter());
        vecs.insert(blk_idx, sorted);
    }

    let entropy: f64
        = records.iter()
        .filter(|rec| rec.eigval > 0.0)
        .map(|rec| -rec.eigval * rec.eigval.ln())
        .sum();

    // equal eigenvalues keep segment order
    records.sort_by(|a, b| {
        b.eigval.total_cmp(&a.eigval)
            .then(a.seq_idx.cmp(&b.seq_idx))
            .then(a.eps_idx.cmp(&b.eps_idx))
    });
    records.truncate(mstates);
    records.sort_by_key(|rec| rec.blk_idx);

    let dim = qn.num_states();
    let mut rot_t: na::DMatrix<f64> = na::DMatrix::zeros(records.len(), dim);
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for (row, rec) in records.iter().enumerate() {
        let offset = qn.offset(rec.blk_idx)?;
        let col = vecs[&rec.blk_idx].column(rec.eps_idx);
        rot_t.view_mut((row, offset), (1, col.len())).tr_copy_from(&col);
        *counts.entry(rec.blk_idx).or_insert(0) += 1;
    }

    let kept: f64 = records.iter().map(|rec| rec.eigval.max(0.0)).sum();
    let spectrum: Vec<(f64, f64)>
        = records.iter()
        .map(|rec| (qn.list()[rec.blk_idx], rec.eigval))
        .collect();
    let (list, sizes): (Vec<f64>, Vec<usize>)
        = counts.into_iter()
        .map(|(blk, count)| (qn.list()[blk], count))
        .unzip();
    Ok(Truncation {
        rot_t,
        qn: QuantumNumbers::new(list, sizes)?,
        trunc_err: 1.0 - kept,
        entropy,
        spectrum,
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        block::Block,
        comm::SelfComm,
        config::SolverConfig,
        eigen,
        kron::{ self, KronBlocks },
        model::{ Heisenberg, LatticeModel },
    };
    use super::*;

    // enlarged 2-site system and environment of a 4-site chain with the
    // superblock ground state
    fn four_site_state() -> (KronBlocks, na::DVector<f64>) {
        let model = Heisenberg::new(4);
        let site = Block::single_site();
        let enl = kron::kron_eye(&site, &site, &model.terms(2)).unwrap();
        let (kb, h) = kron::superblock(&enl, &enl, &model.terms(4), &[0.0]).unwrap();
        let gs = eigen::ground_state(&h, &SolverConfig::default()).unwrap();
        (kb, gs.vector)
    }

    #[test]
    fn lossless_and_monotonic() {
        let (kb, v) = four_site_state();
        let errs: Vec<f64>
            = (1..=4)
            .map(|m| get_truncation(&SelfComm, &kb, &v, m).unwrap().left.trunc_err)
            .collect();
        assert!(errs.windows(2).all(|w| w[1] <= w[0] + 1e-14));
        assert!(errs[3].abs() < 1e-12);
    }

    #[test]
    fn rotation_rows_orthonormal() {
        let (kb, v) = four_site_state();
        for m in 1..=4 {
            let pair = get_truncation(&SelfComm, &kb, &v, m).unwrap();
            for trunc in [&pair.left, &pair.right] {
                let r = &trunc.rot_t;
                assert_eq!(r.nrows(), m);
                assert_eq!(r.ncols(), 4);
                assert_eq!(trunc.qn.num_states(), m);
                let rrt = r * r.transpose();
                let err = (rrt - na::DMatrix::<f64>::identity(m, m)).abs().max();
                assert!(err < 1e-12);
            }
        }
    }

    #[test]
    fn kept_states_grouped_by_sector() {
        let (kb, v) = four_site_state();
        let pair = get_truncation(&SelfComm, &kb, &v, 3).unwrap();
        let qn = &pair.left.qn;
        let values: Vec<f64> = pair.left.spectrum.iter().map(|(q, _)| *q).collect();
        assert_eq!(values, qn.state_values());
        // kept sector values appear in the enlarged block's order
        let parent = kb.left_qn().list();
        let pos: Vec<usize>
            = qn.list().iter()
            .map(|q| parent.iter().position(|p| p == q).unwrap())
            .collect();
        assert!(pos.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn repeated_truncation_is_identical() {
        let (kb, v) = four_site_state();
        let a = get_truncation(&SelfComm, &kb, &v, 2).unwrap();
        let b = get_truncation(&SelfComm, &kb, &v, 2).unwrap();
        assert_eq!(a.left.rot_t, b.left.rot_t);
        assert_eq!(a.right.qn, b.right.qn);
        assert_eq!(a.left.trunc_err, b.left.trunc_err);
    }

    #[test]
    fn product_state_has_no_entanglement() {
        let site = Block::single_site();
        let kb = KronBlocks::superblock(site.qn(), site.qn(), &[0.0]).unwrap();
        // ∣↑↓⟩
        let v = na::dvector![1.0, 0.0];
        let pair = get_truncation(&SelfComm, &kb, &v, 1).unwrap();
        assert!(pair.left.entropy.abs() < 1e-14);
        assert!(pair.left.trunc_err.abs() < 1e-14);
        assert_eq!(pair.left.qn.list(), &[0.5]);
        assert_eq!(pair.right.qn.list(), &[-0.5]);
    }

    #[test]
    fn singlet_entropy() {
        let site = Block::single_site();
        let kb = KronBlocks::superblock(site.qn(), site.qn(), &[0.0]).unwrap();
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let v = na::dvector![s, -s];
        let pair = get_truncation(&SelfComm, &kb, &v, 1).unwrap();
        assert!((pair.left.entropy - 2.0_f64.ln()).abs() < 1e-12);
        assert!((pair.left.trunc_err - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ties_follow_segment_order() {
        // segments are (↑, ↓) then (↓, ↑); all four eigenvalues are 1/2
        let site = Block::single_site();
        let kb = KronBlocks::superblock(site.qn(), site.qn(), &[0.0]).unwrap();
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let v = na::dvector![s, s];
        let pair = get_truncation(&SelfComm, &kb, &v, 1).unwrap();
        assert_eq!(pair.left.qn.list(), &[0.5]);
        assert_eq!(pair.right.qn.list(), &[-0.5]);
        assert_eq!(pair.left.rot_t.abs(), na::dmatrix![1.0, 0.0]);
        assert_eq!(pair.right.rot_t.abs(), na::dmatrix![0.0, 1.0]);
    }

    #[test]
    fn rejects_bad_input() {
        let site = Block::single_site();
        let kb = KronBlocks::unrestricted(site.qn(), site.qn());
        let v = na::DVector::from_element(4, 0.5);
        assert!(matches!(
            get_truncation(&SelfComm, &kb, &v, 2),
            Err(Unsupported(_)),
        ));
        let (kb, v) = four_site_state();
        assert!(matches!(get_truncation(&SelfComm, &kb, &v, 0), Err(ZeroStates)));
        let short = na::DVector::zeros(3);
        assert!(matches!(
            get_truncation(&SelfComm, &kb, &short, 2),
            Err(VectorLength { len: 3, expected: 6 }),
        ));
    }
}
