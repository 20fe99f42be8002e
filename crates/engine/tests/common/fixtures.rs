//! Test tree generators for mirror tests
//!
//! Trees are generated at runtime from a seed, so every run builds the
//! same layout and content.

use engine::{SyncOptions, SyncPair, StabilityConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use replica_core::{hash_file, scan};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generated tree sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSize {
    /// 40 files, 8 directories
    Small,
    /// 300 files, 30 directories
    Medium,
}

impl TreeSize {
    pub fn file_count(&self) -> usize {
        match self {
            TreeSize::Small => 40,
            TreeSize::Medium => 300,
        }
    }

    pub fn dir_count(&self) -> usize {
        match self {
            TreeSize::Small => 8,
            TreeSize::Medium => 30,
        }
    }
}

/// Shape of a generated tree
#[derive(Debug, Clone)]
pub struct TreeTemplate {
    pub size: TreeSize,
    pub max_depth: usize,
    pub max_file_size: usize,
    pub seed: u64,
}

impl TreeTemplate {
    pub fn new(size: TreeSize, seed: u64) -> Self {
        Self {
            size,
            max_depth: 4,
            max_file_size: 4096,
            seed,
        }
    }

    /// Populate `root` with directories and files
    pub fn generate(&self, root: &Path) -> Vec<PathBuf> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut dirs = vec![PathBuf::new()];

        for i in 0..self.size.dir_count() {
            let parent = dirs[rng.gen_range(0..dirs.len())].clone();
            if parent.components().count() >= self.max_depth {
                continue;
            }
            let dir = parent.join(format!("dir{i}"));
            fs::create_dir_all(root.join(&dir)).unwrap();
            dirs.push(dir);
        }

        let mut files = Vec::new();
        for i in 0..self.size.file_count() {
            let dir = &dirs[rng.gen_range(0..dirs.len())];
            let file = dir.join(format!("file{i}.dat"));
            let len = rng.gen_range(0..=self.max_file_size);
            let content: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            fs::write(root.join(&file), content).unwrap();
            files.push(file);
        }

        files
    }
}

/// Source and replica roots with automatic cleanup
pub struct TestPair {
    pub source: PathBuf,
    pub replica: PathBuf,
    _temp_dir: TempDir,
}

impl TestPair {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("replica");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&replica).unwrap();
        Self {
            source,
            replica,
            _temp_dir: temp_dir,
        }
    }

    pub fn pair(&self) -> SyncPair {
        self.pair_with(fast_options())
    }

    pub fn pair_with(&self, options: SyncOptions) -> SyncPair {
        SyncPair::new(&self.source, &self.replica, options)
    }

    pub fn write_source(&self, rel: &str, content: &[u8]) {
        write_file(&self.source.join(rel), content);
    }

    pub fn write_replica(&self, rel: &str, content: &[u8]) {
        write_file(&self.replica.join(rel), content);
    }
}

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Options with no quiet period, so fresh test files copy immediately
pub fn fast_options() -> SyncOptions {
    SyncOptions {
        stability: StabilityConfig {
            poll_interval_ms: 10,
            quiet_period_ms: 0,
            max_wait_secs: 2,
        },
        ..SyncOptions::default()
    }
}

/// Assert both trees hold the same paths and the same file content
pub fn assert_mirrored(source: &Path, replica: &Path) {
    let src = scan(source).unwrap();
    let dst = scan(replica).unwrap();

    assert_eq!(src.dirs, dst.dirs, "directory sets differ");
    assert_eq!(src.files, dst.files, "file sets differ");

    for rel in &src.files {
        assert_eq!(
            hash_file(&rel.under(source)).unwrap(),
            hash_file(&rel.under(replica)).unwrap(),
            "content differs for {rel}"
        );
    }
}
