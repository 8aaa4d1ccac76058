//! Ordered index of conserved-quantity sectors over a block basis.
//!
//! A [`QuantumNumbers`] records, for a basis that is grouped by the value of a
//! conserved quantity (here total *S*<sup>*z*</sup>), the value of each
//! sector and how many basis states it spans. Sectors are contiguous, so the
//! index also carries cumulative offsets:
//!
//! ```text
//!  state:   0   1   2 | 3   4   5   6 | 7
//!  value:     +1      |       0       | -1
//!  offset:  0           3               7   8
//! ```

use std::fmt;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

/// Tolerance used when comparing two sector values.
pub const QN_TOL: f64 = 1e-9;

/// Return `true` if two sector values are equal up to [`QN_TOL`].
#[inline]
pub fn qn_eq(a: f64, b: f64) -> bool { (a - b).abs() < QN_TOL }

#[derive(Clone, Debug, Error, PartialEq)]
pub enum QnError {
    /// Returned when the list of values and the list of sizes have different
    /// lengths.
    #[error("error in quantum number creation: {values} values but {sizes} sizes")]
    LengthMismatch { values: usize, sizes: usize },

    /// Returned when the same sector value appears twice.
    #[error("error in quantum number creation: duplicate sector value {0}")]
    DuplicateValue(f64),

    /// Returned when a sector is given zero states.
    #[error("error in quantum number creation: sector {0} has zero size")]
    EmptySector(f64),

    /// Returned when a sector index is out of bounds.
    #[error("sector index {idx} out of bounds for {len} sectors")]
    SectorOutOfBounds { idx: usize, len: usize },
}
use QnError::*;
pub type QnResult<T> = Result<T, QnError>;

/// Ordered `(value, size)` pairs with derived cumulative offsets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredQn", into = "StoredQn")]
pub struct QuantumNumbers {
    list: Vec<f64>,
    sizes: Vec<usize>,
    // length list.len() + 1, starts at 0
    offsets: Vec<usize>,
}

impl QuantumNumbers {
    /// Create a new index from sector values and sizes.
    ///
    /// Fails if the two lists differ in length, if any value is repeated, or if
    /// any size is zero.
    pub fn new(list: Vec<f64>, sizes: Vec<usize>) -> QnResult<Self> {
        if list.len() != sizes.len() {
            return Err(LengthMismatch { values: list.len(), sizes: sizes.len() });
        }
        for (k, qk) in list.iter().enumerate() {
            if list[..k].iter().any(|qj| qn_eq(*qj, *qk)) {
                return Err(DuplicateValue(*qk));
            }
        }
        if let Some(k) = sizes.iter().position(|s| *s == 0) {
            return Err(EmptySector(list[k]));
        }
        let offsets: Vec<usize>
            = std::iter::once(0)
            .chain(
                sizes.iter()
                    .scan(0, |acc, s| { *acc += *s; Some(*acc) })
            )
            .collect();
        Ok(Self { list, sizes, offsets })
    }

    /// Sector values, in basis order.
    pub fn list(&self) -> &[f64] { &self.list }

    /// Number of states in each sector.
    pub fn sizes(&self) -> &[usize] { &self.sizes }

    /// Cumulative offsets; has one more element than there are sectors.
    pub fn offsets(&self) -> &[usize] { &self.offsets }

    /// Number of sectors.
    pub fn num_sectors(&self) -> usize { self.list.len() }

    /// Total number of basis states.
    pub fn num_states(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Value of the `k`-th sector.
    pub fn value(&self, k: usize) -> QnResult<f64> {
        self.list.get(k).copied()
            .ok_or(SectorOutOfBounds { idx: k, len: self.list.len() })
    }

    /// Size of the `k`-th sector.
    pub fn size(&self, k: usize) -> QnResult<usize> {
        self.sizes.get(k).copied()
            .ok_or(SectorOutOfBounds { idx: k, len: self.list.len() })
    }

    /// Offset of the first state of the `k`-th sector.
    pub fn offset(&self, k: usize) -> QnResult<usize> {
        if k < self.list.len() {
            Ok(self.offsets[k])
        } else {
            Err(SectorOutOfBounds { idx: k, len: self.list.len() })
        }
    }

    /// Find the index of the sector holding value `q`, if any.
    pub fn sector_index(&self, q: f64) -> Option<usize> {
        self.list.iter().position(|qk| qn_eq(*qk, q))
    }

    /// Find the sector containing basis state `state`, if it is in range.
    pub fn sector_of_state(&self, state: usize) -> Option<usize> {
        if state >= self.num_states() { return None; }
        Some(self.offsets.partition_point(|off| *off <= state) - 1)
    }

    /// Iterate over `(value, size, offset)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (f64, usize, usize)> + '_ {
        self.list.iter()
            .zip(&self.sizes)
            .zip(&self.offsets)
            .map(|((q, s), o)| (*q, *s, *o))
    }

    /// Expand into one value per basis state.
    pub fn state_values(&self) -> Vec<f64> {
        self.iter()
            .flat_map(|(q, s, _)| std::iter::repeat(q).take(s))
            .collect()
    }
}

impl fmt::Display for QuantumNumbers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        let n = self.list.len();
        for (k, (q, s, _)) in self.iter().enumerate() {
            write!(f, "{q:+}: {s}")?;
            if k < n - 1 { write!(f, ", ")?; }
        }
        write!(f, " }}")
    }
}

// on-disk form; offsets are re-derived on load
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredQn {
    list: Vec<f64>,
    sizes: Vec<usize>,
}

impl From<QuantumNumbers> for StoredQn {
    fn from(qn: QuantumNumbers) -> Self {
        Self { list: qn.list, sizes: qn.sizes }
    }
}

impl TryFrom<StoredQn> for QuantumNumbers {
    type Error = QnError;

    fn try_from(stored: StoredQn) -> QnResult<Self> {
        Self::new(stored.list, stored.sizes)
    }
}
