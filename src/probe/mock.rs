//! In-memory loader for tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{LoadError, Probe, ProbeHandle, ProbeLoader, ProbeObject, RunError, RunRequest};
use crate::models::SlotResult;

/// Probe that records its calls and returns scripted results
pub struct MockProbe {
    name: String,
    duration_ns: u64,
    return_codes: HashMap<usize, i32>,
    run_errors: HashMap<usize, i32>,
    calls: Mutex<Vec<RunRequest>>,
}

impl MockProbe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration_ns: 100,
            return_codes: HashMap::new(),
            run_errors: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(name: &str) -> ProbeHandle {
        Arc::new(Self::new(name))
    }

    pub fn with_duration(mut self, duration_ns: u64) -> Self {
        self.duration_ns = duration_ns;
        self
    }

    /// Return `code` when run on `cpu`
    pub fn returning_on(mut self, cpu: usize, code: i32) -> Self {
        self.return_codes.insert(cpu, code);
        self
    }

    /// Fail the run call with `status` on `cpu`
    pub fn failing_on(mut self, cpu: usize, status: i32) -> Self {
        self.run_errors.insert(cpu, status);
        self
    }

    pub fn calls(&self) -> Vec<RunRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_cpus(&self) -> Vec<Option<usize>> {
        let mut cpus: Vec<_> = self.calls().iter().map(|c| c.cpu).collect();
        cpus.sort();
        cpus
    }
}

impl Probe for MockProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, request: &RunRequest) -> Result<SlotResult, RunError> {
        self.calls.lock().unwrap().push(*request);
        let cpu = request.cpu.unwrap_or(usize::MAX);
        if let Some(status) = self.run_errors.get(&cpu) {
            return Err(RunError::new(*status, "scripted failure"));
        }
        let code = self.return_codes.get(&cpu).copied().unwrap_or(0);
        let duration = self.duration_ns + request.cpu.unwrap_or(0) as u64;
        Ok(SlotResult::new(duration, code))
    }
}

struct MockObject {
    path: PathBuf,
    probes: HashMap<String, Arc<MockProbe>>,
    loaded: bool,
    loads: Arc<AtomicUsize>,
}

impl ProbeObject for MockObject {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) -> Result<(), LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded = true;
        Ok(())
    }

    fn find_probe(&self, name: &str) -> Option<ProbeHandle> {
        if !self.loaded {
            return None;
        }
        self.probes
            .get(name)
            .map(|probe| Arc::clone(probe) as ProbeHandle)
    }
}

/// Loader over a fixed set of in-memory containers, counting opens and loads
#[derive(Default)]
pub struct MockLoader {
    containers: HashMap<PathBuf, Vec<Arc<MockProbe>>>,
    opens: AtomicUsize,
    loads: Arc<AtomicUsize>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(mut self, path: &str, probes: Vec<Arc<MockProbe>>) -> Self {
        self.containers.insert(PathBuf::from(path), probes);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ProbeLoader for MockLoader {
    fn open(
        &self,
        path: &Path,
        _category: Option<&str>,
    ) -> Result<Box<dyn ProbeObject>, LoadError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let probes = self
            .containers
            .get(path)
            .ok_or_else(|| LoadError::Open {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;

        Ok(Box::new(MockObject {
            path: path.to_path_buf(),
            probes: probes
                .iter()
                .map(|p| (p.name().to_string(), Arc::clone(p)))
                .collect(),
            loaded: false,
            loads: Arc::clone(&self.loads),
        }))
    }
}
