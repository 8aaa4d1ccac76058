//! Block array and warmup/sweep scheduling of renormalization steps.
//!
//! The lattice is reflection-symmetric, so a single array of blocks serves as
//! both system and environment: slot `k` holds the renormalized block of
//! `k + 1` sites. A renormalization step reads two slots, enlarges each block
//! by one site, joins them into a superblock, finds its ground state and
//! writes the two truncated blocks back:
//!
//! ```text
//!   slot insys ──► kron_eye ─┐                            ┌─► rotate ──► slot outsys
//!                            ├─► superblock ─► ground ─► truncation
//!   slot inenv ──► kron_eye ─┘                            └─► rotate ──► slot outenv
//! ```
//!
//! The warmup grows the array from a single site up to half of the chain; each
//! sweep then moves the cut to the right edge and back to the middle. With a
//! storage directory configured, only the slots used by the current step are
//! kept in memory.

use std::{ collections::BTreeSet, time::Instant };
use log::Level;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use crate::{
    block::{ Block, BlockError },
    comm::{ CommError, Communicator, SelfComm },
    config::DmrgConfig,
    eigen::{ self, EigenError },
    kron::{ self, EnvSide, KronError },
    model::LatticeModel,
    qn::QnError,
    storage::{ BlockStorage, DirStorage, StorageError },
    truncation::{ self, TruncError, TruncationPair },
};

#[derive(Debug, Error)]
pub enum DmrgError {
    /// Returned when the lattice does not have an even number of at least two
    /// sites.
    #[error("error in container creation: number of sites must be even and at least 2, got {0}")]
    InvalidNumSites(usize),

    /// Returned when the smallest environment block of a sweep is out of
    /// range.
    #[error("error in sweep: minimum block size {min_block} is invalid for {nsites} sites")]
    InvalidMinBlock { min_block: usize, nsites: usize },

    /// Returned when zero states are requested.
    #[error("error in renormalization: number of kept states must be at least 1")]
    InvalidMaxStates,

    /// Returned when the warmup is run a second time.
    #[error("error in warmup: warmup has already been performed")]
    AlreadyWarmedUp,

    /// Returned when sweeping before the warmup.
    #[error("error in sweep: warmup has not been performed")]
    NotWarmedUp,

    /// Returned when a step needs a block that was never built.
    #[error("error in block access: block {0} has not been initialized")]
    UninitializedBlock(usize),

    /// Returned when a block is accessed by reference while paged out.
    #[error("error in block access: block {0} is not resident in memory")]
    BlockNotResident(usize),

    /// Returned when the warmup schedule produces an impossible environment
    /// size.
    #[error("error in warmup: environment size {env} is invalid with {ninit} initialized blocks")]
    InvalidEnvSites { ninit: usize, env: isize },

    /// Returned when the exactly-built environment cluster is longer than half
    /// of a chain that spans more than one cluster.
    #[error("error in warmup: cluster of {cluster} sites does not fit in half of {nsites} sites")]
    WarmupIncomplete { cluster: usize, nsites: usize },

    /// Returned when a step joins a block with itself but names two different
    /// output slots.
    #[error("error in renormalization: self-join of block {insys} must write a single slot, got ({outsys}, {outenv})")]
    SelfJoinOutputs { insys: usize, outsys: usize, outenv: usize },

    /// Returned for requests outside of what the engine implements.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Returned on non-root ranks when an operation performed by the root
    /// failed.
    #[error("error on root rank: {0}")]
    RootFailed(String),

    #[error("quantum number error: {0}")]
    QnError(#[from] QnError),

    #[error("block error: {0}")]
    BlockError(#[from] BlockError),

    #[error("kron error: {0}")]
    KronError(#[from] KronError),

    #[error("eigensolver error: {0}")]
    EigenError(#[from] EigenError),

    #[error("truncation error: {0}")]
    TruncError(#[from] TruncError),

    #[error("communication error: {0}")]
    CommError(#[from] CommError),

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),
}
use DmrgError::*;
pub type DmrgResult<T> = Result<T, DmrgError>;

/// Slots read and written by one renormalization step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepIndices {
    pub insys: usize,
    pub inenv: usize,
    pub outsys: usize,
    pub outenv: usize,
}

impl StepIndices {
    pub fn new(insys: usize, inenv: usize, outsys: usize, outenv: usize) -> Self {
        Self { insys, inenv, outsys, outenv }
    }

    /// Return `true` if system and environment are the same block.
    pub fn is_self_join(&self) -> bool { self.insys == self.inenv }
}

/// Wall-clock seconds spent in each stage of a step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTimings {
    pub enlarge: f64,
    pub kron: f64,
    pub diag: f64,
    pub trunc: f64,
    pub rotate: f64,
}

impl StepTimings {
    pub fn total(&self) -> f64 {
        self.enlarge + self.kron + self.diag + self.trunc + self.rotate
    }
}

/// Outcome of one renormalization step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub indices: StepIndices,
    /// Sites in the enlarged system block.
    pub num_sites_sys: usize,
    /// Sites in the enlarged environment block.
    pub num_sites_env: usize,
    /// Sites in the superblock.
    pub num_sites: usize,
    /// Superblock ground-state energy.
    pub energy: f64,
    pub energy_per_site: f64,
    pub trunc_err_left: f64,
    pub trunc_err_right: f64,
    pub num_states_left: usize,
    pub num_states_right: usize,
    /// Entanglement entropy across the cut.
    pub entropy: f64,
    pub timings: StepTimings,
}

#[derive(Clone, Debug)]
enum Slot {
    Empty,
    Resident(Block),
    // written to storage and dropped from memory
    Evicted,
}

/// Owner of all renormalized blocks of a chain and driver of the
/// renormalization steps.
///
/// All ranks of the communicator must drive their containers through the same
/// sequence of calls.
#[derive(Debug)]
pub struct BlockContainer<M, C = SelfComm>
where
    M: LatticeModel,
    C: Communicator,
{
    model: M,
    config: DmrgConfig,
    comm: C,
    num_sites: usize,
    site: Block,
    slots: Vec<Slot>,
    storage: Option<DirStorage>,
    warmed_up: bool,
    steps: Vec<StepRecord>,
}

impl<M> BlockContainer<M, SelfComm>
where M: LatticeModel
{
    /// Create a new container for a single process.
    pub fn new(model: M, config: DmrgConfig) -> DmrgResult<Self> {
        Self::with_comm(model, config, SelfComm)
    }
}

impl<M, C> BlockContainer<M, C>
where
    M: LatticeModel,
    C: Communicator,
{
    /// Create a new container whose steps are coordinated over `comm`.
    ///
    /// Fails if the model's number of sites is odd or less than 2, if the
    /// configuration disables the quantum number structure, or if a storage
    /// directory is configured but does not exist.
    pub fn with_comm(model: M, config: DmrgConfig, comm: C) -> DmrgResult<Self> {
        let num_sites = model.num_sites();
        if num_sites < 2 || num_sites % 2 == 1 {
            return Err(InvalidNumSites(num_sites));
        }
        if !config.symmetry {
            return Err(Unsupported(
                "calculations without quantum number sectors are not implemented"
            ));
        }
        if config.max_states == 0 { return Err(InvalidMaxStates); }
        if config.min_block == 0 {
            return Err(InvalidMinBlock { min_block: 0, nsites: num_sites });
        }
        let storage
            = config.save_dir.as_ref()
            .map(DirStorage::new)
            .transpose()?;
        let container = Self {
            model,
            config,
            comm,
            num_sites,
            site: Block::single_site(),
            slots: vec![Slot::Empty; num_sites - 1],
            storage,
            warmed_up: false,
            steps: Vec::new(),
        };
        if let Some(storage) = container.storage.clone() {
            let nslots = container.slots.len();
            container.on_root(|| storage.prepare(nslots))?;
        }
        Ok(container)
    }

    /// Number of sites in the full chain.
    pub fn num_sites(&self) -> usize { self.num_sites }

    pub fn config(&self) -> &DmrgConfig { &self.config }

    pub fn model(&self) -> &M { &self.model }

    pub fn comm(&self) -> &C { &self.comm }

    /// Return `true` once [`warmup`][Self::warmup] has completed.
    pub fn is_warmed_up(&self) -> bool { self.warmed_up }

    /// Number of slots holding a block, in memory or in storage.
    pub fn num_initialized(&self) -> usize {
        self.slots.iter().filter(|s| !matches!(s, Slot::Empty)).count()
    }

    /// Records of all steps performed so far, in order.
    pub fn steps(&self) -> &[StepRecord] { &self.steps }

    /// Energy of the most recent step.
    pub fn last_energy(&self) -> Option<f64> {
        self.steps.last().map(|rec| rec.energy)
    }

    /// Borrow the block in slot `idx`.
    ///
    /// Fails if the slot is empty or paged out.
    pub fn sys_block(&self, idx: usize) -> DmrgResult<&Block> {
        match self.slots.get(idx) {
            Some(Slot::Resident(block)) => Ok(block),
            Some(Slot::Evicted) => Err(BlockNotResident(idx)),
            Some(Slot::Empty) | None => Err(UninitializedBlock(idx)),
        }
    }

    /// Get a copy of the block in slot `idx`, reading it from storage if it is
    /// paged out.
    pub fn retrieve(&self, idx: usize) -> DmrgResult<Block> {
        match self.slots.get(idx) {
            Some(Slot::Resident(block)) => Ok(block.clone()),
            Some(Slot::Evicted) => self.load(idx),
            Some(Slot::Empty) | None => Err(UninitializedBlock(idx)),
        }
    }

    fn log_level(&self) -> Level {
        if self.config.verbose { Level::Info } else { Level::Debug }
    }

    // run `f` on the root only, then fail on every rank if it failed
    fn on_root<F, E>(&self, f: F) -> DmrgResult<()>
    where
        F: FnOnce() -> Result<(), E>,
        E: Into<DmrgError>,
    {
        if self.comm.is_root() {
            let res: DmrgResult<()> = f().map_err(Into::into);
            let msg = res.as_ref().err().map(|err| err.to_string());
            self.comm.broadcast(Some(msg))?;
            res
        } else {
            match self.comm.broadcast::<Option<String>>(None)? {
                None => Ok(()),
                Some(msg) => Err(RootFailed(msg)),
            }
        }
    }

    fn load(&self, idx: usize) -> DmrgResult<Block> {
        match &self.storage {
            Some(storage) => Ok(storage.load(idx)?),
            None => Err(BlockNotResident(idx)),
        }
    }

    fn put(&mut self, idx: usize, block: Block) -> DmrgResult<()> {
        let slot = self.slots.get_mut(idx).ok_or(UninitializedBlock(idx))?;
        *slot = Slot::Resident(block);
        Ok(())
    }

    /// Make exactly the blocks in `active` resident, paging every other block
    /// out to storage.
    ///
    /// Without storage, only checks that the blocks in `active` exist.
    fn ensure_active(&mut self, active: &[usize]) -> DmrgResult<()> {
        let active: BTreeSet<usize> = active.iter().copied().collect();
        if let Some(&idx) = active.iter().find(|&&idx| {
            matches!(self.slots.get(idx), Some(Slot::Empty) | None)
        }) {
            return Err(UninitializedBlock(idx));
        }
        let Some(storage) = self.storage.clone() else { return Ok(()); };

        let evict: Vec<usize>
            = self.slots.iter().enumerate()
            .filter(|(idx, slot)| {
                !active.contains(idx) && matches!(slot, Slot::Resident(_))
            })
            .map(|(idx, _)| idx)
            .collect();
        let slots = &self.slots;
        self.on_root(|| {
            for &idx in evict.iter() {
                if let Slot::Resident(block) = &slots[idx] {
                    log::trace!("saving block {} ({} sites)", idx, block.num_sites());
                    storage.save(idx, block)?;
                }
            }
            Ok::<(), StorageError>(())
        })?;
        evict.iter().for_each(|&idx| { self.slots[idx] = Slot::Evicted; });
        self.comm.barrier();

        for idx in active.into_iter() {
            if matches!(self.slots[idx], Slot::Evicted) {
                log::trace!("loading block {}", idx);
                let block = storage.load(idx)?;
                self.slots[idx] = Slot::Resident(block);
            }
        }
        // no rank may overwrite files until all have finished reading
        self.comm.barrier();
        Ok(())
    }

    /// Grow the block array from a single site up to half of the chain,
    /// keeping at most `mstates` states per block (the configured
    /// `max_states` if `None`).
    ///
    /// Blocks are built exactly while they are smaller than the model's
    /// environment cluster (rounded up to an even number of sites). After
    /// that, every step joins the newest block with an environment chosen
    /// so that the superblock length is a multiple of the cluster size.
    ///
    /// A chain no longer than one cluster is built exactly up to its half;
    /// a longer chain must fit the cluster in its half.
    pub fn warmup(&mut self, mstates: Option<usize>) -> DmrgResult<()> {
        if self.warmed_up { return Err(AlreadyWarmedUp); }
        let mstates = mstates.unwrap_or(self.config.max_states);
        if mstates == 0 { return Err(InvalidMaxStates); }
        let half = self.num_sites / 2;
        let cluster = match self.model.num_env_sites() {
            0 => { return Err(InvalidEnvSites { ninit: 0, env: 0 }); },
            c if c % 2 == 1 => 2 * c,
            c => c,
        };
        if cluster > half && self.num_sites > cluster {
            return Err(WarmupIncomplete { cluster, nsites: self.num_sites });
        }
        log::log!(
            self.log_level(),
            "warmup: {} sites, cluster of {} sites, {} states",
            self.num_sites, cluster, mstates,
        );

        self.put(0, self.site.clone())?;
        let mut ninit: usize = 1;
        while ninit < cluster.min(half) {
            self.ensure_active(&[ninit - 1])?;
            let terms = self.model.terms(ninit + 1);
            let enl = kron::kron_eye(self.sys_block(ninit - 1)?, &self.site, &terms)?;
            log::log!(
                self.log_level(),
                "warmup: exact block {} ({} states)",
                ninit, enl.dim(),
            );
            self.put(ninit, enl)?;
            ninit += 1;
        }

        let c = cluster as isize;
        while ninit < half {
            let n = ninit as isize;
            let full = ((n + 2) / c + 1) * c;
            let mut env = full - n - 2;
            env += ((n - env) / c) * c;
            if env < 1 || env > n {
                return Err(InvalidEnvSites { ninit, env });
            }
            let env = env as usize;
            self.single_step(StepIndices::new(ninit - 1, env - 1, ninit, env), mstates)?;
            ninit += 1;
        }
        self.warmed_up = true;
        Ok(())
    }

    /// Perform one sweep, keeping at most `mstates` states per block: first
    /// moving the cut from the center to the right until the environment has
    /// `min_block` sites before enlargement, then back to the center.
    ///
    /// `mstates` and `min_block` default to the configured values; `min_block`
    /// must leave at least one block of growth on each side of the center.
    pub fn sweep(&mut self, mstates: Option<usize>, min_block: Option<usize>)
        -> DmrgResult<()>
    {
        if !self.warmed_up { return Err(NotWarmedUp); }
        let mstates = mstates.unwrap_or(self.config.max_states);
        if mstates == 0 { return Err(InvalidMaxStates); }
        let n = self.num_sites;
        let min_block = min_block.unwrap_or(self.config.min_block);
        if min_block == 0 || min_block + 1 > (n / 2).max(2) {
            return Err(InvalidMinBlock { min_block, nsites: n });
        }
        log::log!(
            self.log_level(),
            "sweep: {} states, minimum block {}",
            mstates, min_block,
        );
        for i in n / 2 .. n.saturating_sub(min_block + 2) {
            self.single_step(StepIndices::new(i - 1, n - i - 3, i, n - i - 2), mstates)?;
        }
        for i in min_block .. n / 2 {
            self.single_step(StepIndices::new(n - i - 3, i - 1, n - i - 2, i), mstates)?;
        }
        Ok(())
    }

    /// Perform a single renormalization step, keeping at most `mstates`
    /// states in each new block.
    ///
    /// When `insys == inenv`, the superblock is the enlarged block joined with
    /// its own reflection and `outsys` must equal `outenv`.
    pub fn single_step(&mut self, indices: StepIndices, mstates: usize)
        -> DmrgResult<()>
    {
        if mstates == 0 { return Err(InvalidMaxStates); }
        let StepIndices { insys, inenv, outsys, outenv } = indices;
        if indices.is_self_join() && outsys != outenv {
            return Err(SelfJoinOutputs { insys, outsys, outenv });
        }
        if outsys >= self.slots.len() { return Err(UninitializedBlock(outsys)); }
        if outenv >= self.slots.len() { return Err(UninitializedBlock(outenv)); }
        self.ensure_active(&[insys, inenv])?;
        let mut timings = StepTimings::default();

        let t0 = Instant::now();
        let sys = self.sys_block(insys)?;
        let sys_enl = kron::kron_eye(sys, &self.site, &self.model.terms(sys.num_sites() + 1))?;
        let env_side
            = if indices.is_self_join() {
                EnvSide::SelfJoin
            } else {
                let env = self.sys_block(inenv)?;
                let terms = self.model.terms(env.num_sites() + 1);
                EnvSide::Distinct(kron::kron_eye(env, &self.site, &terms)?)
            };
        let env_enl = env_side.resolve(&sys_enl);
        let num_sites_sys = sys_enl.num_sites();
        let num_sites_env = env_enl.num_sites();
        timings.enlarge = t0.elapsed().as_secs_f64();

        let t0 = Instant::now();
        let nsites = num_sites_sys + num_sites_env;
        let (kb, h)
            = kron::superblock(
                &sys_enl, env_enl, &self.model.terms(nsites), &self.config.targets)?;
        timings.kron = t0.elapsed().as_secs_f64();

        let t0 = Instant::now();
        let gs = eigen::ground_state(&h, &self.config.solver)?;
        timings.diag = t0.elapsed().as_secs_f64();

        let t0 = Instant::now();
        let trunc = truncation::get_truncation(&self.comm, &kb, &gs.vector, mstates)?;
        timings.trunc = t0.elapsed().as_secs_f64();

        let t0 = Instant::now();
        let TruncationPair { left, right } = trunc;
        let mut new_sys = sys_enl;
        new_sys.rotate(&left.rot_t, left.qn.clone())?;
        let new_env
            = match env_side {
                EnvSide::SelfJoin => None,
                EnvSide::Distinct(mut env) => {
                    env.rotate(&right.rot_t, right.qn.clone())?;
                    Some(env)
                },
            };
        timings.rotate = t0.elapsed().as_secs_f64();

        let record = StepRecord {
            indices,
            num_sites_sys,
            num_sites_env,
            num_sites: nsites,
            energy: gs.energy,
            energy_per_site: gs.energy / nsites as f64,
            trunc_err_left: left.trunc_err,
            trunc_err_right: right.trunc_err,
            num_states_left: left.num_states(),
            num_states_right: right.num_states(),
            entropy: left.entropy,
            timings,
        };
        log::log!(
            self.log_level(),
            "step ({}, {}) -> ({}, {}): {} + {} sites, {} states, E = {:.12}, E/N = {:.12}, \
            trunc err = ({:.3e}, {:.3e}), {:.3}s",
            insys, inenv, outsys, outenv,
            record.num_sites_sys, record.num_sites_env, kb.num_states(),
            record.energy, record.energy_per_site,
            record.trunc_err_left, record.trunc_err_right,
            timings.total(),
        );

        self.put(outsys, new_sys)?;
        if let Some(env) = new_env { self.put(outenv, env)?; }
        self.steps.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{ exact, model::{ Heisenberg, Term } };
    use super::*;

    fn config(max_states: usize) -> DmrgConfig {
        DmrgConfig { max_states, ..DmrgConfig::default() }
    }

    // Heisenberg couplings with a chosen environment cluster
    struct Clustered {
        chain: Heisenberg,
        cluster: usize,
    }

    impl LatticeModel for Clustered {
        fn num_sites(&self) -> usize { self.chain.num_sites() }

        fn num_env_sites(&self) -> usize { self.cluster }

        fn terms(&self, n: usize) -> Vec<Term> { self.chain.terms(n) }
    }

    #[test]
    fn rejects_bad_setup() {
        assert!(matches!(
            BlockContainer::new(Heisenberg::new(5), config(4)),
            Err(InvalidNumSites(5)),
        ));
        assert!(matches!(
            BlockContainer::new(Heisenberg::new(0), config(4)),
            Err(InvalidNumSites(0)),
        ));
        let no_symm = DmrgConfig { symmetry: false, ..DmrgConfig::default() };
        assert!(matches!(
            BlockContainer::new(Heisenberg::new(4), no_symm),
            Err(Unsupported(_)),
        ));
        let tmp = tempfile::tempdir().unwrap();
        let missing = DmrgConfig {
            save_dir: Some(tmp.path().join("missing")),
            ..DmrgConfig::default()
        };
        assert!(matches!(
            BlockContainer::new(Heisenberg::new(4), missing),
            Err(DmrgError::StorageError(crate::storage::StorageError::MissingDir(_))),
        ));
    }

    #[test]
    fn warmup_once_then_sweep() {
        let mut dmrg = BlockContainer::new(Heisenberg::new(8), config(8)).unwrap();
        assert!(matches!(dmrg.sweep(Some(8), None), Err(NotWarmedUp)));
        dmrg.warmup(Some(8)).unwrap();
        assert!(dmrg.is_warmed_up());
        assert_eq!(dmrg.num_initialized(), 4);
        assert!(matches!(dmrg.warmup(Some(8)), Err(AlreadyWarmedUp)));
        assert!(matches!(dmrg.sweep(Some(8), Some(0)), Err(InvalidMinBlock { .. })));
        assert!(matches!(dmrg.sweep(Some(8), Some(4)), Err(InvalidMinBlock { .. })));
        assert!(matches!(dmrg.sweep(Some(0), None), Err(InvalidMaxStates)));
        dmrg.sweep(Some(8), None).unwrap();
    }

    #[test]
    fn warmup_blocks_grow_by_one_site() {
        let mut dmrg = BlockContainer::new(Heisenberg::new(10), config(6)).unwrap();
        dmrg.warmup(Some(6)).unwrap();
        for k in 0..5 {
            let block = dmrg.sys_block(k).unwrap();
            assert_eq!(block.num_sites(), k + 1);
            assert!(block.dim() <= 6);
        }
        assert!(matches!(dmrg.sys_block(5), Err(UninitializedBlock(5))));
        // every warmup step of the Heisenberg chain is a self-join
        assert!(dmrg.steps().iter().all(|rec| rec.indices.is_self_join()));
    }

    #[test]
    fn warmup_with_four_site_cluster() {
        let chain = Heisenberg::new(12);
        let model = Clustered { chain, cluster: 4 };
        let mut dmrg = BlockContainer::new(model, config(16)).unwrap();
        dmrg.warmup(None).unwrap();
        assert_eq!(dmrg.num_initialized(), 6);
        let visited: Vec<(StepIndices, usize)>
            = dmrg.steps().iter()
            .map(|rec| (rec.indices, rec.num_sites))
            .collect();
        assert_eq!(
            visited,
            vec![(StepIndices::new(3, 1, 4, 2), 8), (StepIndices::new(4, 4, 5, 5), 12)],
        );
        for k in 0..6 {
            assert_eq!(dmrg.sys_block(k).unwrap().num_sites(), k + 1);
        }
        // exact blocks of 4 and 2 sites, each enlarged by one
        let e8 = exact::ground_energy(&Heisenberg::new(8), 8).unwrap();
        assert!((dmrg.steps()[0].energy - e8).abs() < 1e-9);

        dmrg.sweep(None, None).unwrap();
        let e = dmrg.last_energy().unwrap();
        let e12 = exact::ground_energy(&chain, 12).unwrap();
        assert!(e >= e12 - 1e-9);
        assert!((e - e12).abs() < 1e-2);
    }

    #[test]
    fn cluster_must_fit_in_half_chain() {
        let model = Clustered { chain: Heisenberg::new(6), cluster: 4 };
        let mut dmrg = BlockContainer::new(model, config(8)).unwrap();
        assert!(matches!(
            dmrg.warmup(None),
            Err(WarmupIncomplete { cluster: 4, nsites: 6 }),
        ));
        assert!(!dmrg.is_warmed_up());
        assert_eq!(dmrg.num_initialized(), 0);

        // a chain of a single cluster is built exactly
        let model = Clustered { chain: Heisenberg::new(4), cluster: 4 };
        let mut dmrg = BlockContainer::new(model, config(8)).unwrap();
        dmrg.warmup(None).unwrap();
        assert_eq!(dmrg.num_initialized(), 2);
        assert!(dmrg.steps().is_empty());

        // odd clusters are doubled
        let model = Clustered { chain: Heisenberg::new(12), cluster: 3 };
        let mut dmrg = BlockContainer::new(model, config(8)).unwrap();
        dmrg.warmup(None).unwrap();
        assert_eq!(dmrg.num_initialized(), 6);
        assert!(dmrg.steps().is_empty());

        let model = Clustered { chain: Heisenberg::new(8), cluster: 0 };
        let mut dmrg = BlockContainer::new(model, config(8)).unwrap();
        assert!(matches!(dmrg.warmup(None), Err(InvalidEnvSites { .. })));
    }

    #[test]
    fn state_count_defaults_to_config() {
        let mut implicit = BlockContainer::new(Heisenberg::new(10), config(4)).unwrap();
        implicit.warmup(None).unwrap();
        implicit.sweep(None, None).unwrap();
        let mut explicit = BlockContainer::new(Heisenberg::new(10), config(16)).unwrap();
        explicit.warmup(Some(4)).unwrap();
        explicit.sweep(Some(4), None).unwrap();

        assert!(implicit.steps().iter().all(|rec| rec.num_states_left <= 4));
        assert!(implicit.steps().iter().any(|rec| rec.num_states_left == 4));
        let energies = |dmrg: &BlockContainer<Heisenberg>| -> Vec<f64> {
            dmrg.steps().iter().map(|rec| rec.energy).collect()
        };
        assert_eq!(energies(&implicit), energies(&explicit));
    }

    #[test]
    fn two_site_chain() {
        let mut dmrg = BlockContainer::new(Heisenberg::new(2), config(4)).unwrap();
        dmrg.warmup(Some(4)).unwrap();
        assert_eq!(dmrg.num_initialized(), 1);
        assert!(dmrg.steps().is_empty());
        dmrg.sweep(Some(4), None).unwrap();
        assert!(dmrg.steps().is_empty());
    }

    #[test]
    fn lossless_six_sites() {
        let model = Heisenberg::new(6);
        let mut dmrg = BlockContainer::new(model, config(8)).unwrap();
        dmrg.warmup(Some(8)).unwrap();
        let rec = dmrg.steps().last().unwrap();
        assert_eq!(rec.num_sites, 6);
        assert!(rec.trunc_err_left.abs() < 1e-12);
        let e_exact = exact::ground_energy(&model, 6).unwrap();
        assert!((rec.energy - e_exact).abs() < 1e-10);
    }

    #[test]
    fn explicit_step_requires_blocks() {
        let mut dmrg = BlockContainer::new(Heisenberg::new(8), config(4)).unwrap();
        assert!(matches!(
            dmrg.single_step(StepIndices::new(0, 0, 1, 1), 4),
            Err(UninitializedBlock(0)),
        ));
        assert!(matches!(
            dmrg.single_step(StepIndices::new(0, 0, 9, 9), 4),
            Err(UninitializedBlock(9)),
        ));
    }

    #[test]
    fn self_join_writes_one_slot() {
        let mut dmrg = BlockContainer::new(Heisenberg::new(8), config(4)).unwrap();
        dmrg.warmup(None).unwrap();
        let nsteps = dmrg.steps().len();
        assert!(matches!(
            dmrg.single_step(StepIndices::new(1, 1, 2, 3), 4),
            Err(SelfJoinOutputs { insys: 1, outsys: 2, outenv: 3 }),
        ));
        assert_eq!(dmrg.steps().len(), nsteps);
        dmrg.single_step(StepIndices::new(1, 1, 2, 2), 4).unwrap();
        assert_eq!(dmrg.steps().len(), nsteps + 1);
    }

    #[test]
    fn paging_keeps_only_active_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = DmrgConfig {
            save_dir: Some(tmp.path().to_path_buf()),
            ..config(8)
        };
        let mut dmrg = BlockContainer::new(Heisenberg::new(8), cfg).unwrap();
        assert!(tmp.path().join("Sys_000000000").is_dir());
        dmrg.warmup(Some(8)).unwrap();
        // last warmup step read block 2 and wrote block 3
        assert!(dmrg.sys_block(2).is_ok());
        assert!(dmrg.sys_block(3).is_ok());
        assert!(matches!(dmrg.sys_block(0), Err(BlockNotResident(0))));
        let b0 = dmrg.retrieve(0).unwrap();
        assert_eq!(b0.num_sites(), 1);
        assert!(tmp.path().join("Sys_000000001").join("block.json").is_file());
    }
}
