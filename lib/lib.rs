//! Block-growth density-matrix renormalization group (DMRG) for spin-1/2
//! chains.
//!
//! A chain of *N* sites is described through operator representations of
//! contiguous blocks of sites. Blocks are grown one site at a time
//! ([`kron::kron_eye`]), joined pairwise into a superblock restricted to the
//! target total-*S*<sup>*z*</sup> sectors ([`kron::superblock`]), and truncated
//! back to at most *M* states using the reduced density matrix of the
//! superblock ground state ([`truncation::get_truncation`]).
//! [`BlockContainer`] owns the blocks and sequences these steps into a warmup
//! followed by any number of sweeps.
//!
//! ```text
//!  warmup:   ●─●      ●─●─●─●      ●─●─●─●─●─●  ...  (N/2 sites per side)
//!  sweep:    ●─●─●─●─●─●│●─●  ──►  ●─●│●─●─●─●─●─●  ──►  back to center
//! ```

pub mod qn;
pub mod sparse;
pub mod model;
pub mod block;
pub mod kron;
pub mod eigen;
pub mod truncation;
pub mod comm;
pub mod storage;
pub mod config;
pub mod container;
pub mod exact;

pub use block::Block;
pub use comm::{ Communicator, SelfComm, ThreadComm };
pub use config::{ DmrgConfig, SolverConfig };
pub use container::{
    BlockContainer,
    DmrgError,
    DmrgResult,
    StepIndices,
    StepRecord,
    StepTimings,
};
pub use model::{ Heisenberg, LatticeModel, Op, Term };
pub use qn::QuantumNumbers;
