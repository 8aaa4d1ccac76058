//! Lattice models, described as lists of weighted two-site operator products.
//!
//! The engine never looks at a Hamiltonian directly. Instead, a
//! [`LatticeModel`] returns for any number of sites *n* the list of [`Term`]s
//! making up the open-chain Hamiltonian on those *n* sites,
//!
//! ```text
//! H(n) = Σ_t a_t · O_t(i_t) O'_t(j_t)
//! ```
//!
//! and the enlargement and superblock routines pick out the terms that they
//! need.

use std::fmt;
use serde::{ Deserialize, Serialize };

/// Single-site spin-1/2 operator labels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// *S*<sup>*z*</sup>
    Sz,
    /// *S*<sup>+</sup>
    Sp,
    /// *S*<sup>−</sup>
    Sm,
}

impl Op {
    /// Change in the *S*<sup>*z*</sup> quantum number effected by the
    /// operator.
    pub fn shift(self) -> f64 {
        match self {
            Self::Sz => 0.0,
            Self::Sp => 1.0,
            Self::Sm => -1.0,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sz => write!(f, "Sz"),
            Self::Sp => write!(f, "Sp"),
            Self::Sm => write!(f, "Sm"),
        }
    }
}

/// A single product `coeff · iop(isite) jop(jsite)` of two operators acting on
/// two distinct sites.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub coeff: f64,
    pub iop: Op,
    pub isite: usize,
    pub jop: Op,
    pub jsite: usize,
}

impl Term {
    /// Return the term with its two factors ordered so that `isite < jsite`.
    pub fn ordered(self) -> Self {
        if self.isite <= self.jsite {
            self
        } else {
            Self {
                coeff: self.coeff,
                iop: self.jop,
                isite: self.jsite,
                jop: self.iop,
                jsite: self.isite,
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f, "{:.4} {}({}) {}({})",
            self.coeff, self.iop, self.isite, self.jop, self.jsite,
        )
    }
}

/// Describes a one-dimensional lattice Hamiltonian with reflection symmetry.
pub trait LatticeModel {
    /// Total number of sites in the target lattice.
    fn num_sites(&self) -> usize;

    /// Preferred size of the exactly-built environment cluster.
    ///
    /// The warmup builds blocks exactly up to this size (rounded up to an even
    /// number) and then only forms superblocks whose total length is a
    /// multiple of it.
    fn num_env_sites(&self) -> usize;

    /// Terms of the open-chain Hamiltonian on `n` sites.
    fn terms(&self, n: usize) -> Vec<Term>;
}

/// Spin-1/2 XXZ Heisenberg chain with open boundaries,
///
/// ```text
/// H = Σ_i J/2 (S+_i S-_{i+1} + S-_i S+_{i+1}) + Jz Sz_i Sz_{i+1}
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heisenberg {
    pub nsites: usize,
    pub j: f64,
    pub jz: f64,
}

impl Heisenberg {
    /// Isotropic chain with unit coupling.
    pub fn new(nsites: usize) -> Self { Self { nsites, j: 1.0, jz: 1.0 } }

    /// Anisotropic chain.
    pub fn xxz(nsites: usize, j: f64, jz: f64) -> Self { Self { nsites, j, jz } }
}

impl LatticeModel for Heisenberg {
    fn num_sites(&self) -> usize { self.nsites }

    fn num_env_sites(&self) -> usize { 1 }

    fn terms(&self, n: usize) -> Vec<Term> {
        (0..n.saturating_sub(1))
            .flat_map(|i| {
                [
                    Term { coeff: self.jz, iop: Op::Sz, isite: i, jop: Op::Sz, jsite: i + 1 },
                    Term { coeff: 0.5 * self.j, iop: Op::Sp, isite: i, jop: Op::Sm, jsite: i + 1 },
                    Term { coeff: 0.5 * self.j, iop: Op::Sm, isite: i, jop: Op::Sp, jsite: i + 1 },
                ]
            })
            .filter(|t| t.coeff != 0.0)
            .collect()
    }
}
