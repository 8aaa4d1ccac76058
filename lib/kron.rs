//! Quantum number-aware Kronecker products of block operators.
//!
//! Joining a left block (sectors *l*) and a right block (sectors *r*) gives a
//! product basis made of one segment per sector pair `(l, r)`, with combined
//! quantum number *q*<sub>*l*</sub> + *q*<sub>*r*</sub>. [`KronBlocks`]
//! enumerates the pairs that are kept and assigns each a contiguous segment:
//!
//! ```text
//!  segment:  (l0, r2)        (l1, r1)             (l2, r0)
//!           [0 .. n_l0·n_r2)[ .. + n_l1·n_r1)    [ .. + n_l2·n_r0)
//! ```
//!
//! Inside a segment, the product state `∣l_i⟩∣r_j⟩` sits at position
//! `i · n_r + j`. Sums of Kronecker products `Σ a · L ⊗ R` are then assembled
//! sub-block by sub-block, touching only sector pairs that are kept.
//!
//! Two kinds of pairings are used:
//! - [`KronBlocks::unrestricted`] keeps every pair, ordered by decreasing
//!   combined quantum number, and is used to enlarge a block by one site
//!   ([`kron_eye`]);
//! - [`KronBlocks::superblock`] keeps only the pairs whose combined quantum
//!   number is in a target set, and is used to build the superblock
//!   Hamiltonian ([`superblock`]).

use std::{ borrow::Cow, collections::BTreeMap, ops::Range };
use itertools::Itertools;
use nalgebra_sparse::{ CooMatrix, CsrMatrix };
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    block::{ Block, BlockError },
    model::Term,
    qn::{ qn_eq, QnError, QuantumNumbers },
};

#[derive(Clone, Debug, Error)]
pub enum KronError {
    /// Returned when a superblock is requested without any target sectors.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Returned when an operator does not match the dimension of its side.
    #[error("error in kron sum: {side} operator has shape {nrows}×{ncols}, expected {dim}×{dim}")]
    DimensionMismatch {
        side: &'static str,
        nrows: usize,
        ncols: usize,
        dim: usize,
    },

    /// Returned when a term refers to a site outside of the lattice it was
    /// requested for.
    #[error("error in term list: term `{term}` is out of range for {nsites} sites")]
    TermOutOfRange { term: Term, nsites: usize },

    /// Returned when a term cannot be represented with boundary-site
    /// operators.
    #[error("error in term list: term `{term}` {reason}")]
    UnsupportedTerm { term: Term, reason: &'static str },

    /// Returned when the block added during enlargement is not a single site.
    #[error("error in enlargement: added block must have 1 site, got {0}")]
    AddedSiteCount(usize),

    #[error("block error: {0}")]
    BlockError(#[from] BlockError),

    #[error("quantum number error: {0}")]
    QnError(#[from] QnError),
}
use KronError::*;
pub type KronResult<T> = Result<T, KronError>;

/// One kept pair of left and right sectors.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KronBlock {
    /// Sector index in the left block.
    pub left: usize,
    /// Sector index in the right block.
    pub right: usize,
    /// Combined quantum number.
    pub qn: f64,
    /// Offset of the segment in the product basis.
    pub offset: usize,
}

/// Which combined quantum numbers a pairing keeps.
#[derive(Clone, Debug, PartialEq)]
pub enum Sectors {
    /// All pairs.
    Unrestricted,
    /// Only pairs whose combined value is in the list.
    Targeted(Vec<f64>),
}

/// Index of the sector pairs forming a product basis, with their segments.
#[derive(Clone, Debug)]
pub struct KronBlocks {
    left: QuantumNumbers,
    right: QuantumNumbers,
    sectors: Sectors,
    blocks: Vec<KronBlock>,
    num_states: usize,
    lookup: FxHashMap<(usize, usize), usize>,
}

impl KronBlocks {
    fn from_pairs<I>(
        left: &QuantumNumbers,
        right: &QuantumNumbers,
        sectors: Sectors,
        pairs: I,
    ) -> Self
    where I: IntoIterator<Item = (usize, usize, f64)>
    {
        let mut offset: usize = 0;
        let blocks: Vec<KronBlock>
            = pairs.into_iter()
            .map(|(l, r, qn)| {
                let kb = KronBlock { left: l, right: r, qn, offset };
                offset += left.sizes()[l] * right.sizes()[r];
                kb
            })
            .collect();
        let lookup: FxHashMap<(usize, usize), usize>
            = blocks.iter().enumerate()
            .map(|(k, kb)| ((kb.left, kb.right), k))
            .collect();
        Self {
            left: left.clone(),
            right: right.clone(),
            sectors,
            blocks,
            num_states: offset,
            lookup,
        }
    }

    fn all_pairs<'a>(left: &'a QuantumNumbers, right: &'a QuantumNumbers)
        -> impl Iterator<Item = (usize, usize, f64)> + 'a
    {
        (0..left.num_sectors())
            .cartesian_product(0..right.num_sectors())
            .map(move |(l, r)| (l, r, left.list()[l] + right.list()[r]))
    }

    /// Keep every sector pair, stably sorted by decreasing combined quantum
    /// number so that equal values form consecutive segments.
    pub fn unrestricted(left: &QuantumNumbers, right: &QuantumNumbers) -> Self {
        let mut pairs: Vec<(usize, usize, f64)>
            = Self::all_pairs(left, right).collect();
        pairs.sort_by(|a, b| b.2.total_cmp(&a.2));
        Self::from_pairs(left, right, Sectors::Unrestricted, pairs)
    }

    /// Keep only sector pairs whose combined quantum number is in `targets`,
    /// in enumeration order.
    ///
    /// Fails with [`KronError::Unsupported`] if `targets` is empty; the
    /// truncation step relies on the sector structure.
    pub fn superblock(
        left: &QuantumNumbers,
        right: &QuantumNumbers,
        targets: &[f64],
    ) -> KronResult<Self>
    {
        if targets.is_empty() {
            return Err(Unsupported(
                "superblock requires at least one target quantum number"
            ));
        }
        let pairs
            = Self::all_pairs(left, right)
            .filter(|(_, _, q)| targets.iter().any(|t| qn_eq(*t, *q)));
        Ok(Self::from_pairs(
            left, right, Sectors::Targeted(targets.to_vec()), pairs))
    }

    /// Sector index of the left block.
    pub fn left_qn(&self) -> &QuantumNumbers { &self.left }

    /// Sector index of the right block.
    pub fn right_qn(&self) -> &QuantumNumbers { &self.right }

    /// The kept combined quantum numbers.
    pub fn sectors(&self) -> &Sectors { &self.sectors }

    /// Return `true` if only targeted combined quantum numbers are kept.
    pub fn is_restricted(&self) -> bool {
        matches!(self.sectors, Sectors::Targeted(_))
    }

    /// All kept sector pairs, in basis order.
    pub fn blocks(&self) -> &[KronBlock] { &self.blocks }

    /// Number of kept sector pairs.
    pub fn len(&self) -> usize { self.blocks.len() }

    /// Return `true` if no sector pairs are kept.
    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }

    /// Dimension of the product basis.
    pub fn num_states(&self) -> usize { self.num_states }

    /// Range of product-basis states occupied by the `k`-th pair.
    ///
    /// # Panics
    /// Panics if `k` is out of bounds.
    pub fn segment(&self, k: usize) -> Range<usize> {
        let kb = &self.blocks[k];
        let len = self.left.sizes()[kb.left] * self.right.sizes()[kb.right];
        kb.offset .. kb.offset + len
    }

    /// Find the position of the pair `(left, right)`, if it is kept.
    pub fn find(&self, left: usize, right: usize) -> Option<usize> {
        self.lookup.get(&(left, right)).copied()
    }

    /// Fuse consecutive pairs with equal combined quantum number into single
    /// sectors.
    ///
    /// Fails if equal values are not consecutive, which cannot happen for an
    /// [unrestricted][Self::unrestricted] pairing.
    pub fn fused_qn(&self) -> KronResult<QuantumNumbers> {
        let mut list: Vec<f64> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        for kb in self.blocks.iter() {
            let size = self.left.sizes()[kb.left] * self.right.sizes()[kb.right];
            match (list.last(), sizes.last_mut()) {
                (Some(q), Some(s)) if qn_eq(*q, kb.qn) => { *s += size; },
                _ => { list.push(kb.qn); sizes.push(size); },
            }
        }
        Ok(QuantumNumbers::new(list, sizes)?)
    }

    /// Assemble `Σ_t a_t · L_t ⊗ R_t` on the kept product basis.
    ///
    /// Contributions whose row pair is not kept are dropped, so for a targeted
    /// pairing the result is the sum restricted to the target sectors.
    pub fn kron_sum(&self, terms: &[KronTerm<'_>]) -> KronResult<CsrMatrix<f64>> {
        let n = self.num_states;
        let mut coo: CooMatrix<f64> = CooMatrix::new(n, n);
        for term in terms.iter() {
            if term.coeff == 0.0 { continue; }
            let lsplit = SectorSplit::new(&term.left, &self.left, "left")?;
            let rsplit = SectorSplit::new(&term.right, &self.right, "right")?;
            for col in self.blocks.iter() {
                let ncol_r = self.right.sizes()[col.right];
                let subblocks
                    = lsplit.col(col.left).iter()
                    .cartesian_product(rsplit.col(col.right).iter());
                for ((rl, tl), (rr, tr)) in subblocks {
                    let Some(krow) = self.find(*rl, *rr) else { continue; };
                    let row = &self.blocks[krow];
                    let nrow_r = self.right.sizes()[row.right];
                    for (&(il, jl, vl), &(ir, jr, vr))
                        in tl.iter().cartesian_product(tr.iter())
                    {
                        coo.push(
                            row.offset + il * nrow_r + ir,
                            col.offset + jl * ncol_r + jr,
                            term.coeff * vl * vr,
                        );
                    }
                }
            }
        }
        Ok(CsrMatrix::from(&coo))
    }
}

/// One factor of a Kronecker product.
#[derive(Copy, Clone, Debug)]
pub enum Factor<'a> {
    /// The identity on the factor's side.
    Eye,
    /// An explicit operator.
    Op(&'a CsrMatrix<f64>),
}

/// A weighted Kronecker product `coeff · left ⊗ right`.
#[derive(Copy, Clone, Debug)]
pub struct KronTerm<'a> {
    pub coeff: f64,
    pub left: Factor<'a>,
    pub right: Factor<'a>,
}

impl<'a> KronTerm<'a> {
    pub fn new(coeff: f64, left: Factor<'a>, right: Factor<'a>) -> Self {
        Self { coeff, left, right }
    }
}

// local triplets of an operator grouped into sector sub-blocks; `by_col[c]`
// holds `(row sector, entries)` for every non-empty sub-block in column sector
// `c`
struct SectorSplit {
    by_col: Vec<Vec<(usize, Vec<(usize, usize, f64)>)>>,
}

impl SectorSplit {
    fn new(factor: &Factor<'_>, qn: &QuantumNumbers, side: &'static str)
        -> KronResult<Self>
    {
        let nsec = qn.num_sectors();
        match factor {
            Factor::Eye => {
                let by_col: Vec<Vec<(usize, Vec<(usize, usize, f64)>)>>
                    = qn.sizes().iter().enumerate()
                    .map(|(s, size)| {
                        let diag: Vec<(usize, usize, f64)>
                            = (0..*size).map(|i| (i, i, 1.0)).collect();
                        vec![(s, diag)]
                    })
                    .collect();
                Ok(Self { by_col })
            },
            Factor::Op(mat) => {
                let dim = qn.num_states();
                if mat.nrows() != dim || mat.ncols() != dim {
                    return Err(DimensionMismatch {
                        side, nrows: mat.nrows(), ncols: mat.ncols(), dim,
                    });
                }
                let state_sector: Vec<usize>
                    = qn.sizes().iter().enumerate()
                    .flat_map(|(s, size)| std::iter::repeat(s).take(*size))
                    .collect();
                let offsets = qn.offsets();
                let mut blocks: BTreeMap<(usize, usize), Vec<(usize, usize, f64)>>
                    = BTreeMap::new();
                for (i, j, v) in mat.triplet_iter() {
                    let (si, sj) = (state_sector[i], state_sector[j]);
                    blocks.entry((sj, si))
                        .or_default()
                        .push((i - offsets[si], j - offsets[sj], *v));
                }
                let mut by_col: Vec<Vec<(usize, Vec<(usize, usize, f64)>)>>
                    = vec![Vec::new(); nsec];
                blocks.into_iter()
                    .for_each(|((sj, si), trips)| { by_col[sj].push((si, trips)); });
                Ok(Self { by_col })
            },
        }
    }

    fn col(&self, c: usize) -> &[(usize, Vec<(usize, usize, f64)>)] {
        &self.by_col[c]
    }
}

fn check_term(term: &Term, nsites: usize) -> KronResult<()> {
    if term.isite >= nsites || term.jsite >= nsites {
        return Err(TermOutOfRange { term: *term, nsites });
    }
    if term.isite == term.jsite {
        return Err(UnsupportedTerm {
            term: *term,
            reason: "acts twice on the same site",
        });
    }
    Ok(())
}

/// Enlarge `block` by the single site `site`.
///
/// `terms` must be the model's term list for `block.num_sites() + 1` sites.
/// The new Hamiltonian is `H ⊗ I + I ⊗ H_site` plus every term coupling the
/// block's boundary site to the added one; terms entirely within the block are
/// already contained in its Hamiltonian. The boundary operators of the result
/// are those of the added site.
///
/// Fails if `site` is not a single site, if a term lies outside of the
/// enlarged lattice, or if a term couples the added site to any site other
/// than the block's boundary.
pub fn kron_eye(block: &Block, site: &Block, terms: &[Term]) -> KronResult<Block> {
    if site.num_sites() != 1 {
        return Err(AddedSiteCount(site.num_sites()));
    }
    let nsites = block.num_sites() + 1;
    let boundary = block.num_sites() - 1;
    let added = block.num_sites();

    let mut couplings: Vec<(f64, Cow<'_, CsrMatrix<f64>>, Cow<'_, CsrMatrix<f64>>)>
        = Vec::new();
    for term in terms.iter() {
        check_term(term, nsites)?;
        let t = term.ordered();
        if t.jsite != added { continue; }
        if t.isite != boundary {
            return Err(UnsupportedTerm {
                term: *term,
                reason: "couples the added site to a site behind the block boundary",
            });
        }
        couplings.push((t.coeff, block.op(t.iop), site.op(t.jop)));
    }

    let kb = KronBlocks::unrestricted(block.qn(), site.qn());
    let mut hterms: Vec<KronTerm<'_>> = vec![
        KronTerm::new(1.0, Factor::Op(block.h()), Factor::Eye),
        KronTerm::new(1.0, Factor::Eye, Factor::Op(site.h())),
    ];
    hterms.extend(
        couplings.iter()
            .map(|(a, l, r)| KronTerm::new(*a, Factor::Op(l), Factor::Op(r)))
    );
    let h = kb.kron_sum(&hterms)?;
    let sz = kb.kron_sum(&[KronTerm::new(1.0, Factor::Eye, Factor::Op(site.sz()))])?;
    let sp = kb.kron_sum(&[KronTerm::new(1.0, Factor::Eye, Factor::Op(site.sp()))])?;
    let qn = kb.fused_qn()?;
    Ok(Block::new(nsites, qn, h, sz, sp)?)
}

/// The environment half of a superblock.
///
/// When system and environment are the same block, enlargement is done once
/// and both halves of the superblock refer to the same enlarged block.
#[derive(Clone, Debug)]
pub enum EnvSide {
    /// An independently enlarged environment block.
    Distinct(Block),
    /// The environment is the enlarged system block itself.
    SelfJoin,
}

impl EnvSide {
    /// Return the enlarged environment block, given the enlarged system block.
    pub fn resolve<'a>(&'a self, sys: &'a Block) -> &'a Block {
        match self {
            Self::Distinct(env) => env,
            Self::SelfJoin => sys,
        }
    }

    /// Return `true` for a self-joined superblock.
    pub fn is_self_join(&self) -> bool { matches!(self, Self::SelfJoin) }
}

/// Build the superblock Hamiltonian of two enlarged blocks, restricted to the
/// sectors whose total quantum number is in `targets`.
///
/// `terms` must be the model's term list for
/// `sys.num_sites() + env.num_sites()` sites. Sites `0 .. n_sys` belong to the
/// system and the rest to the (reflected) environment, so that the two
/// boundary sites are `n_sys - 1` and `n_sys`. Terms across the cut must couple
/// exactly these two sites.
pub fn superblock(sys: &Block, env: &Block, terms: &[Term], targets: &[f64])
    -> KronResult<(KronBlocks, CsrMatrix<f64>)>
{
    let nsys = sys.num_sites();
    let nsites = nsys + env.num_sites();
    let kb = KronBlocks::superblock(sys.qn(), env.qn(), targets)?;

    let mut couplings: Vec<(f64, Cow<'_, CsrMatrix<f64>>, Cow<'_, CsrMatrix<f64>>)>
        = Vec::new();
    for term in terms.iter() {
        check_term(term, nsites)?;
        let t = term.ordered();
        if t.jsite < nsys || t.isite >= nsys { continue; }
        if t.isite != nsys - 1 || t.jsite != nsys {
            return Err(UnsupportedTerm {
                term: *term,
                reason: "couples system and environment away from their boundary sites",
            });
        }
        couplings.push((t.coeff, sys.op(t.iop), env.op(t.jop)));
    }

    let mut hterms: Vec<KronTerm<'_>> = vec![
        KronTerm::new(1.0, Factor::Op(sys.h()), Factor::Eye),
        KronTerm::new(1.0, Factor::Eye, Factor::Op(env.h())),
    ];
    hterms.extend(
        couplings.iter()
            .map(|(a, l, r)| KronTerm::new(*a, Factor::Op(l), Factor::Op(r)))
    );
    let h = kb.kron_sum(&hterms)?;
    Ok((kb, h))
}
