//! Run parameters for the block container and the ground-state solver.

use std::path::PathBuf;
use serde::{ Deserialize, Serialize };

/// Parameters of the iterative ground-state solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Relative residual tolerance of a converged Ritz pair.
    pub tol: f64,
    /// Maximum Krylov subspace dimension per restart.
    pub krylov_dim: usize,
    /// Maximum number of restarts before giving up.
    pub max_restarts: usize,
    /// Matrices with at most this dimension are diagonalized densely.
    pub dense_threshold: usize,
    /// Seed for the random start vector.
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tol: 1e-10,
            krylov_dim: 80,
            max_restarts: 100,
            dense_threshold: 256,
            seed: 0x5eed,
        }
    }
}

/// Parameters of a [`BlockContainer`][crate::container::BlockContainer].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmrgConfig {
    /// Number of states kept per block by a warmup or sweep that does not name
    /// one.
    pub max_states: usize,
    /// Smallest environment block reached at the turning points of a sweep.
    pub min_block: usize,
    /// Log per-step progress at `info` instead of `debug`.
    pub verbose: bool,
    /// Use the total-*S*<sup>*z*</sup> sector structure. Only `true` is
    /// supported.
    pub symmetry: bool,
    /// Keep only the blocks in use in memory, paging the others out to this
    /// directory.
    pub save_dir: Option<PathBuf>,
    /// Total *S*<sup>*z*</sup> sectors of the superblock ground state.
    pub targets: Vec<f64>,
    pub solver: SolverConfig,
}

impl Default for DmrgConfig {
    fn default() -> Self {
        Self {
            max_states: 16,
            min_block: 1,
            verbose: false,
            symmetry: true,
            save_dir: None,
            targets: vec![0.0],
            solver: SolverConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: DmrgConfig
            = serde_json::from_str(r#"{"max_states": 32, "solver": {"tol": 1e-8}}"#)
            .unwrap();
        assert_eq!(config.max_states, 32);
        assert_eq!(config.solver.tol, 1e-8);
        assert_eq!(config.solver.krylov_dim, 80);
        assert_eq!(config.targets, vec![0.0]);
        assert!(config.symmetry);
    }
}
