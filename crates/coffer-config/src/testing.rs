//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary blob root
//! - A temporary entry database directory
//! - A project directory for config files and input files
//!
//! # Usage
//!
//! ```ignore
//! use coffer_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     // env.blob_root, env.db_path, env.project_root are all isolated
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, ENV_DB, ENV_KEY_FILE, ENV_OWNER, ENV_ROOT};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Isolated blob root directory (exists)
    pub blob_root: PathBuf,
    /// Isolated entry database directory (not created)
    pub db_path: PathBuf,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Owner id for this test
    pub owner_id: i64,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        // Create directory structure
        let project_root = root.join("project");
        let blob_root = root.join("blobs");
        let db_path = root.join("entries.lmdb");

        std::fs::create_dir_all(&project_root)?;
        std::fs::create_dir_all(&blob_root)?;

        Ok(Self {
            _temp_dir: temp_dir,
            blob_root,
            db_path,
            project_root,
            owner_id: i64::from(test_id) + 1,
            test_id,
        })
    }

    /// Config pointing at this environment's paths
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.storage.root = self.blob_root.clone();
        cfg.storage.db = self.db_path.clone();
        cfg.owner.id = self.owner_id;
        cfg
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write `.coffer/config.toml` under the project root
    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        self.create_file(".coffer/config.toml", contents.as_bytes())
    }

    /// Environment variables selecting this environment, for spawning the
    /// `coffer` binary.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let cfg = self.config();
        let mut vars = vec![
            (ENV_ROOT.to_string(), cfg.storage.root.display().to_string()),
            (ENV_DB.to_string(), cfg.storage.db.display().to_string()),
            (ENV_OWNER.to_string(), cfg.owner.id.to_string()),
        ];
        if let Some(key_file) = cfg.owner.key_file {
            vars.push((ENV_KEY_FILE.to_string(), key_file.display().to_string()));
        }
        vars
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
