//! Probe loader and run capability
//!
//! The orchestrator only sees these traits: a loader opens a container by path, the
//! container is loaded once and hands out probe handles, and a probe handle runs on a
//! given processor for a number of repetitions.

pub mod affinity;
mod native;

#[cfg(test)]
pub mod mock;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::models::SlotResult;

pub use native::NativeLoader;

/// Shared handle to an executable probe
pub type ProbeHandle = Arc<dyn Probe>;

/// Shared handle to a loaded container
pub type ContainerHandle = Arc<dyn ProbeObject>;

/// Container open and load errors
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open probe container {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid probe container {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("failed to load probe container {}: {reason}", path.display())]
    Verification { path: PathBuf, reason: String },
}

/// Failure of the run call itself, as opposed to a probe returning non-zero
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("probe run failed with status {status}: {message}")]
pub struct RunError {
    /// Negative status code
    pub status: i32,
    pub message: String,
}

impl RunError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status: status.checked_abs().map_or(i32::MIN, |s| -s),
            message: message.into(),
        }
    }

    /// Convert an OS error into a negative errno status
    pub fn from_io(err: &io::Error) -> Self {
        let errno = err.raw_os_error().unwrap_or(libc::EINVAL);
        Self::new(errno, err.to_string())
    }
}

/// Parameters of one run call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunRequest {
    /// Processor to pin to; `None` runs wherever the caller already is
    pub cpu: Option<usize>,
    /// Internal repetitions
    pub repeat: u32,
    /// Repetitions timed together
    pub batch_size: u32,
}

impl RunRequest {
    pub fn pinned(cpu: usize, repeat: u32, batch_size: u32) -> Self {
        Self {
            cpu: Some(cpu),
            repeat,
            batch_size,
        }
    }

    pub fn unpinned(repeat: u32, batch_size: u32) -> Self {
        Self {
            cpu: None,
            repeat,
            batch_size,
        }
    }
}

/// An executable probe
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    /// Run the probe `request.repeat` times and report the average duration and the
    /// return code of the last repetition.
    fn run(&self, request: &RunRequest) -> Result<SlotResult, RunError>;
}

/// An opened probe container
pub trait ProbeObject: Send + Sync {
    fn path(&self) -> &Path;

    /// Verify and compile the container's probes
    fn load(&mut self) -> Result<(), LoadError>;

    /// Find a probe by name; only loaded containers return probes
    fn find_probe(&self, name: &str) -> Option<ProbeHandle>;
}

/// Opens probe containers
pub trait ProbeLoader {
    fn open(&self, path: &Path, category: Option<&str>)
        -> Result<Box<dyn ProbeObject>, LoadError>;
}
