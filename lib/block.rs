//! Operator representation of a contiguous span of lattice sites.
//!
//! A [`Block`] holds the Hamiltonian of all its sites together with the spin
//! operators of its free boundary site (the one that will be coupled to the
//! next site added during enlargement), all expressed in a basis grouped by
//! total *S*<sup>*z*</sup> as recorded in its [`QuantumNumbers`].

use std::borrow::Cow;
use nalgebra as na;
use nalgebra_sparse::CsrMatrix;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use crate::{
    model::Op,
    qn::{ QnError, QuantumNumbers },
    sparse,
};

#[derive(Clone, Debug, Error)]
pub enum BlockError {
    /// Returned when an operator's shape does not match the block's basis.
    #[error("error in block operator: {op} has shape {nrows}×{ncols}, expected {dim}×{dim}")]
    OperatorShape { op: &'static str, nrows: usize, ncols: usize, dim: usize },

    /// Returned when a rotation matrix does not match the enlarged basis or the
    /// new quantum numbers.
    #[error("error in block rotation: rotation has shape {nrows}×{ncols}, expected {rows}×{cols}")]
    RotationShape { nrows: usize, ncols: usize, rows: usize, cols: usize },

    /// Returned when a block is created with zero sites.
    #[error("error in block creation: blocks must have at least one site")]
    NoSites,

    #[error("quantum number error: {0}")]
    QnError(#[from] QnError),
}
use BlockError::*;
pub type BlockResult<T> = Result<T, BlockError>;

/// Operators and sector index of a block of `num_sites` sites.
#[derive(Clone, Debug)]
pub struct Block {
    num_sites: usize,
    qn: QuantumNumbers,
    // full Hamiltonian of the block
    h: CsrMatrix<f64>,
    // Sz and S+ of the boundary site
    sz: CsrMatrix<f64>,
    sp: CsrMatrix<f64>,
}

fn check_shape(op: &'static str, mat: &CsrMatrix<f64>, dim: usize)
    -> BlockResult<()>
{
    if mat.nrows() != dim || mat.ncols() != dim {
        Err(OperatorShape { op, nrows: mat.nrows(), ncols: mat.ncols(), dim })
    } else {
        Ok(())
    }
}

impl Block {
    /// Create a new block, checking that all operators are square with the
    /// dimension given by `qn`.
    pub fn new(
        num_sites: usize,
        qn: QuantumNumbers,
        h: CsrMatrix<f64>,
        sz: CsrMatrix<f64>,
        sp: CsrMatrix<f64>,
    ) -> BlockResult<Self>
    {
        if num_sites == 0 { return Err(NoSites); }
        let dim = qn.num_states();
        check_shape("H", &h, dim)?;
        check_shape("Sz", &sz, dim)?;
        check_shape("Sp", &sp, dim)?;
        Ok(Self { num_sites, qn, h, sz, sp })
    }

    /// A single spin-1/2 site in the basis `{ ∣↑⟩, ∣↓⟩ }`, with sectors
    /// `+1/2` and `-1/2`.
    pub fn single_site() -> Self {
        let qn = QuantumNumbers::new(vec![0.5, -0.5], vec![1, 1])
            .expect("single-site sectors are valid");
        let h = sparse::zeros(2);
        let sz = sparse::from_triplets(2, 2, [(0, 0, 0.5), (1, 1, -0.5)]);
        let sp = sparse::from_triplets(2, 2, [(0, 1, 1.0)]);
        Self { num_sites: 1, qn, h, sz, sp }
    }

    /// Number of lattice sites represented.
    pub fn num_sites(&self) -> usize { self.num_sites }

    /// Number of basis states.
    pub fn dim(&self) -> usize { self.qn.num_states() }

    /// Sector index of the basis.
    pub fn qn(&self) -> &QuantumNumbers { &self.qn }

    /// Block Hamiltonian.
    pub fn h(&self) -> &CsrMatrix<f64> { &self.h }

    /// *S*<sup>*z*</sup> on the boundary site.
    pub fn sz(&self) -> &CsrMatrix<f64> { &self.sz }

    /// *S*<sup>+</sup> on the boundary site.
    pub fn sp(&self) -> &CsrMatrix<f64> { &self.sp }

    /// *S*<sup>−</sup> on the boundary site, computed as the transpose of
    /// *S*<sup>+</sup>.
    pub fn sm(&self) -> CsrMatrix<f64> { self.sp.transpose() }

    /// Look up a boundary-site operator by label.
    pub fn op(&self, op: Op) -> Cow<'_, CsrMatrix<f64>> {
        match op {
            Op::Sz => Cow::Borrowed(&self.sz),
            Op::Sp => Cow::Borrowed(&self.sp),
            Op::Sm => Cow::Owned(self.sm()),
        }
    }

    /// Replace the Hamiltonian, dropping the old one.
    pub fn set_h(&mut self, h: CsrMatrix<f64>) -> BlockResult<&mut Self> {
        check_shape("H", &h, self.dim())?;
        self.h = h;
        Ok(self)
    }

    /// Replace the boundary *S*<sup>*z*</sup>, dropping the old one.
    pub fn set_sz(&mut self, sz: CsrMatrix<f64>) -> BlockResult<&mut Self> {
        check_shape("Sz", &sz, self.dim())?;
        self.sz = sz;
        Ok(self)
    }

    /// Replace the boundary *S*<sup>+</sup>, dropping the old one.
    pub fn set_sp(&mut self, sp: CsrMatrix<f64>) -> BlockResult<&mut Self> {
        check_shape("Sp", &sp, self.dim())?;
        self.sp = sp;
        Ok(self)
    }

    /// Rotate all operators into the basis given by the rows of `rot_t`,
    /// whose sectors are `qn`.
    ///
    /// Each operator *O* becomes *R O R*<sup>T</sup>, where *R* = `rot_t` has
    /// one row per retained state. Fails without modifying the block if
    /// `rot_t` does not have `qn.num_states()` rows and `self.dim()` columns.
    pub fn rotate(&mut self, rot_t: &na::DMatrix<f64>, qn: QuantumNumbers)
        -> BlockResult<&mut Self>
    {
        let rows = qn.num_states();
        let cols = self.dim();
        if rot_t.nrows() != rows || rot_t.ncols() != cols {
            return Err(RotationShape {
                nrows: rot_t.nrows(), ncols: rot_t.ncols(), rows, cols,
            });
        }
        let h = sparse::rotate(&self.h, rot_t);
        let sz = sparse::rotate(&self.sz, rot_t);
        let sp = sparse::rotate(&self.sp, rot_t);
        self.qn = qn;
        self.set_h(h)?.set_sz(sz)?.set_sp(sp)
    }
}

/// Serializable form of a [`Block`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredBlock {
    pub num_sites: usize,
    pub qn: QuantumNumbers,
    pub h: CsrMatrix<f64>,
    pub sz: CsrMatrix<f64>,
    pub sp: CsrMatrix<f64>,
}

impl From<&Block> for StoredBlock {
    fn from(block: &Block) -> Self {
        Self {
            num_sites: block.num_sites,
            qn: block.qn.clone(),
            h: block.h.clone(),
            sz: block.sz.clone(),
            sp: block.sp.clone(),
        }
    }
}

impl TryFrom<StoredBlock> for Block {
    type Error = BlockError;

    fn try_from(stored: StoredBlock) -> BlockResult<Self> {
        let StoredBlock { num_sites, qn, h, sz, sp } = stored;
        Block::new(num_sites, qn, h, sz, sp)
    }
}
