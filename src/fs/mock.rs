// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One recorded filesystem call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    RemoveDirAll(PathBuf),
    CreateDirAll(PathBuf),
}

#[derive(Debug, Default)]
struct MockState {
    dirs: BTreeSet<PathBuf>,
    ops: Vec<FsOp>,
    fail_on: Option<PathBuf>,
}

/// In-memory filesystem that records every call, for ordering assertions.
///
/// Clones share state, so a test can keep one handle while the runtime owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call touching `path` fail.
    pub fn fail_on(&self, path: impl AsRef<Path>) {
        self.state.lock().unwrap().fail_on = Some(path.as_ref().to_path_buf());
    }

    /// Calls recorded so far, in order.
    pub fn ops(&self) -> Vec<FsOp> {
        self.state.lock().unwrap().ops.clone()
    }

    fn check(state: &MockState, path: &Path) -> Result<()> {
        match &state.fail_on {
            Some(bad) if bad == path => Err(anyhow!("mock failure for {:?}", path)),
            _ => Ok(()),
        }
    }
}

impl FileSystem for MockFileSystem {
    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, path)?;
        state.ops.push(FsOp::RemoveDirAll(path.to_path_buf()));
        state.dirs.retain(|d| !d.starts_with(path));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, path)?;
        state.ops.push(FsOp::CreateDirAll(path.to_path_buf()));
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }
}
