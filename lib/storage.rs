//! On-disk paging of blocks.
//!
//! Long chains with large bases do not fit in memory all at once, so blocks
//! that are not part of the current step can be written out and read back
//! later. [`DirStorage`] keeps one sub-directory per block under a root
//! directory:
//!
//! ```text
//!   <root>/Sys_000000000/block.json
//!   <root>/Sys_000000001/block.json
//!   ...
//! ```

use std::{
    fs,
    io::{ self, BufReader, BufWriter, Write },
    path::{ Path, PathBuf },
};
use thiserror::Error;
use crate::block::{ Block, BlockError, StoredBlock };

#[derive(Debug, Error)]
pub enum StorageError {
    /// Returned when the storage root does not exist or is not a directory.
    #[error("error in storage: {0:?} is not an existing directory")]
    MissingDir(PathBuf),

    /// Returned on a failed filesystem operation.
    #[error("error in storage: I/O error at {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// Returned when a stored block cannot be (de)serialized.
    #[error("error in storage: malformed block file {path:?}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },

    #[error("block error: {0}")]
    BlockError(#[from] BlockError),
}
use StorageError::*;
pub type StorageResult<T> = Result<T, StorageError>;

/// Somewhere blocks can be written to and read back from by index.
pub trait BlockStorage {
    /// Store `block` under `idx`, replacing any earlier one.
    fn save(&self, idx: usize, block: &Block) -> StorageResult<()>;

    /// Read the block stored under `idx`.
    fn load(&self, idx: usize) -> StorageResult<Block>;
}

/// Block storage in a directory tree.
#[derive(Clone, Debug)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    const PREFIX: &'static str = "Sys";
    const FILE: &'static str = "block.json";

    /// Open storage rooted at `dir`, which must already exist.
    pub fn new<P>(dir: P) -> StorageResult<Self>
    where P: AsRef<Path>
    {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() { return Err(MissingDir(root)); }
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path { &self.root }

    /// Directory holding block `idx`.
    pub fn block_dir(&self, idx: usize) -> PathBuf {
        self.root.join(format!("{}_{:09}", Self::PREFIX, idx))
    }

    /// Create the directories of blocks `0 .. count`.
    pub fn prepare(&self, count: usize) -> StorageResult<()> {
        for idx in 0..count {
            let path = self.block_dir(idx);
            fs::create_dir_all(&path)
                .map_err(|source| Io { path, source })?;
        }
        Ok(())
    }
}

impl BlockStorage for DirStorage {
    fn save(&self, idx: usize, block: &Block) -> StorageResult<()> {
        let dir = self.block_dir(idx);
        fs::create_dir_all(&dir)
            .map_err(|source| Io { path: dir.clone(), source })?;
        let path = dir.join(Self::FILE);
        let file = fs::File::create(&path)
            .map_err(|source| Io { path: path.clone(), source })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &StoredBlock::from(block))
            .map_err(|source| Json { path: path.clone(), source })?;
        writer.flush()
            .map_err(|source| Io { path, source })?;
        Ok(())
    }

    fn load(&self, idx: usize) -> StorageResult<Block> {
        let path = self.block_dir(idx).join(Self::FILE);
        let file = fs::File::open(&path)
            .map_err(|source| Io { path: path.clone(), source })?;
        let stored: StoredBlock
            = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| Json { path, source })?;
        Ok(Block::try_from(stored)?)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra as na;
    use crate::{ kron, model::{ Heisenberg, LatticeModel } };
    use super::*;

    #[test]
    fn block_dir_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DirStorage::new(tmp.path()).unwrap();
        assert_eq!(storage.block_dir(12), tmp.path().join("Sys_000000012"));
        storage.prepare(3).unwrap();
        assert!(tmp.path().join("Sys_000000002").is_dir());
        assert!(!tmp.path().join("Sys_000000003").exists());
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DirStorage::new(tmp.path()).unwrap();
        let site = Block::single_site();
        let block = kron::kron_eye(&site, &site, &Heisenberg::new(2).terms(2)).unwrap();
        storage.save(1, &block).unwrap();
        let back = storage.load(1).unwrap();
        assert_eq!(back.num_sites(), 2);
        assert_eq!(back.qn(), block.qn());
        assert_eq!(na::DMatrix::<f64>::from(back.h()), na::DMatrix::<f64>::from(block.h()));
        assert_eq!(na::DMatrix::<f64>::from(back.sp()), na::DMatrix::<f64>::from(block.sp()));
    }

    #[test]
    fn missing_things() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("nope");
        assert!(matches!(DirStorage::new(&gone), Err(MissingDir(_))));
        let storage = DirStorage::new(tmp.path()).unwrap();
        assert!(matches!(storage.load(0), Err(Io { .. })));
    }

    #[test]
    fn corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DirStorage::new(tmp.path()).unwrap();
        storage.prepare(1).unwrap();
        let path = storage.block_dir(0).join("block.json");
        fs::write(path, "{ not json").unwrap();
        assert!(matches!(storage.load(0), Err(Json { .. })));
    }
}
