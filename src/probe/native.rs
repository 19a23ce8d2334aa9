//! In-process probe runtime
//!
//! A container is a YAML manifest declaring shared tables and the probes that operate on
//! them. Opening parses the manifest; loading verifies it and compiles each probe into a
//! handle that shares the container's tables.

use rand::Rng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::hint::black_box;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::affinity;
use super::{LoadError, Probe, ProbeHandle, ProbeLoader, ProbeObject, RunError, RunRequest};
use crate::models::SlotResult;

/// Category given to probes when neither the manifest nor the test names one
const DEFAULT_CATEGORY: &str = "generic";

/// Busy-loop length of a `spin` probe without explicit iterations
const DEFAULT_SPIN_ITERATIONS: u32 = 1000;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tables: Vec<TableSpec>,
    probes: Vec<ProbeSpec>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableSpec {
    name: String,
    kind: TableKind,
    max_entries: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TableKind {
    Hash,
    Array,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeSpec {
    name: String,
    action: ActionKind,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    iterations: Option<u32>,
    #[serde(default)]
    return_code: i32,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ActionKind {
    Noop,
    Spin,
    Populate,
    Lookup,
    Update,
}

impl ActionKind {
    fn uses_table(self) -> bool {
        matches!(
            self,
            ActionKind::Populate | ActionKind::Lookup | ActionKind::Update
        )
    }
}

/// Container-scoped state shared by every probe of a container
#[derive(Debug)]
struct Table {
    max_entries: u32,
    /// Next key for `populate`
    cursor: AtomicU32,
    store: Store,
}

#[derive(Debug)]
enum Store {
    Hash(Mutex<HashMap<u32, u32>>),
    Array(Vec<AtomicU32>),
}

impl Table {
    fn new(spec: &TableSpec) -> Self {
        let store = match spec.kind {
            TableKind::Hash => Store::Hash(Mutex::new(HashMap::new())),
            TableKind::Array => Store::Array(
                (0..spec.max_entries).map(|_| AtomicU32::new(0)).collect(),
            ),
        };
        Self {
            max_entries: spec.max_entries,
            cursor: AtomicU32::new(0),
            store,
        }
    }

    /// Insert the next sequential key; a full table is left unchanged
    fn populate(&self) -> i32 {
        let next = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |key| {
                (key < self.max_entries).then_some(key + 1)
            });
        if let Ok(key) = next {
            self.update(key, key);
        }
        0
    }

    fn lookup(&self, key: u32) -> i32 {
        let found = match &self.store {
            Store::Hash(entries) => entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&key),
            Store::Array(values) => values.get(key as usize).is_some(),
        };
        if found {
            0
        } else {
            1
        }
    }

    fn update(&self, key: u32, value: u32) -> i32 {
        match &self.store {
            Store::Hash(entries) => {
                let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
                if entries.len() >= self.max_entries as usize && !entries.contains_key(&key) {
                    return 1;
                }
                entries.insert(key, value);
                0
            }
            Store::Array(values) => match values.get(key as usize) {
                Some(slot) => {
                    slot.store(value, Ordering::Relaxed);
                    0
                }
                None => 1,
            },
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        match &self.store {
            Store::Hash(entries) => entries.lock().unwrap().len(),
            Store::Array(values) => values.len(),
        }
    }
}

#[derive(Debug)]
enum Operation {
    Noop,
    Spin(u32),
    Populate(Arc<Table>),
    Lookup(Arc<Table>),
    Update(Arc<Table>),
}

/// Compiled probe bound to its container's tables
#[derive(Debug)]
struct NativeProbe {
    name: String,
    category: String,
    operation: Operation,
    return_code: i32,
}

impl NativeProbe {
    fn invoke(&self, rng: &mut impl Rng) -> i32 {
        let rc = match &self.operation {
            Operation::Noop => 0,
            Operation::Spin(iterations) => {
                let mut acc = 0u64;
                for i in 0..*iterations {
                    acc = black_box(acc.wrapping_add(i as u64));
                }
                black_box(acc);
                0
            }
            Operation::Populate(table) => table.populate(),
            Operation::Lookup(table) => table.lookup(rng.random_range(0..table.max_entries)),
            Operation::Update(table) => {
                let key = rng.random_range(0..table.max_entries);
                table.update(key, key)
            }
        };
        if rc != 0 {
            rc
        } else {
            self.return_code
        }
    }
}

impl Probe for NativeProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, request: &RunRequest) -> Result<SlotResult, RunError> {
        if let Some(cpu) = request.cpu {
            affinity::pin_current_thread(cpu).map_err(|e| RunError::from_io(&e))?;
        }

        let mut rng = rand::rng();
        let batch_size = request.batch_size.max(1);
        let mut remaining = request.repeat;
        let mut elapsed = Duration::ZERO;
        let mut return_code = 0;

        while remaining > 0 {
            let batch = remaining.min(batch_size);
            let start = Instant::now();
            for _ in 0..batch {
                return_code = black_box(self.invoke(&mut rng));
            }
            elapsed += start.elapsed();
            remaining -= batch;
        }

        let duration_ns = if request.repeat == 0 {
            0
        } else {
            (elapsed.as_nanos() / u128::from(request.repeat)) as u64
        };

        debug!(
            probe = %self.name,
            category = %self.category,
            cpu = ?request.cpu,
            repeat = request.repeat,
            duration_ns,
            return_code,
            "probe run finished"
        );

        Ok(SlotResult::new(duration_ns, return_code))
    }
}

/// Opened manifest, compiled on `load`
struct NativeObject {
    path: PathBuf,
    manifest: Manifest,
    requested_category: Option<String>,
    probes: HashMap<String, ProbeHandle>,
}

impl NativeObject {
    fn verification_error(&self, reason: impl Into<String>) -> LoadError {
        LoadError::Verification {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn compile_tables(&self) -> Result<HashMap<String, Arc<Table>>, LoadError> {
        let mut tables = HashMap::new();
        for spec in &self.manifest.tables {
            if spec.max_entries == 0 {
                return Err(self.verification_error(format!(
                    "table {} must have max_entries > 0",
                    spec.name
                )));
            }
            if tables
                .insert(spec.name.clone(), Arc::new(Table::new(spec)))
                .is_some()
            {
                return Err(self.verification_error(format!("duplicate table {}", spec.name)));
            }
        }
        Ok(tables)
    }

    fn probe_category(&self, spec: &ProbeSpec) -> Result<String, LoadError> {
        let declared = spec.category.as_ref().or(self.manifest.category.as_ref());
        match (declared, self.requested_category.as_ref()) {
            (Some(declared), Some(requested)) if declared != requested => {
                Err(self.verification_error(format!(
                    "probe {} has category {declared}, test requires {requested}",
                    spec.name
                )))
            }
            (Some(category), _) | (None, Some(category)) => Ok(category.clone()),
            (None, None) => Ok(DEFAULT_CATEGORY.to_string()),
        }
    }

    fn compile_probe(
        &self,
        spec: &ProbeSpec,
        tables: &HashMap<String, Arc<Table>>,
    ) -> Result<NativeProbe, LoadError> {
        let table = match (&spec.table, spec.action.uses_table()) {
            (Some(name), true) => Some(tables.get(name).cloned().ok_or_else(|| {
                self.verification_error(format!(
                    "probe {} references unknown table {name}",
                    spec.name
                ))
            })?),
            (None, true) => {
                return Err(self.verification_error(format!(
                    "probe {} action {:?} requires a table",
                    spec.name, spec.action
                )))
            }
            (Some(_), false) => {
                return Err(self.verification_error(format!(
                    "probe {} action {:?} does not take a table",
                    spec.name, spec.action
                )))
            }
            (None, false) => None,
        };

        let operation = match (spec.action, table) {
            (ActionKind::Noop, _) => Operation::Noop,
            (ActionKind::Spin, _) => {
                Operation::Spin(spec.iterations.unwrap_or(DEFAULT_SPIN_ITERATIONS))
            }
            (ActionKind::Populate, Some(table)) => Operation::Populate(table),
            (ActionKind::Lookup, Some(table)) => Operation::Lookup(table),
            (ActionKind::Update, Some(table)) => Operation::Update(table),
            (action, None) => {
                return Err(self.verification_error(format!(
                    "probe {} action {action:?} requires a table",
                    spec.name
                )))
            }
        };

        Ok(NativeProbe {
            name: spec.name.clone(),
            category: self.probe_category(spec)?,
            operation,
            return_code: spec.return_code,
        })
    }
}

impl ProbeObject for NativeObject {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) -> Result<(), LoadError> {
        let tables = self.compile_tables()?;

        let mut seen = HashSet::new();
        let mut probes: HashMap<String, ProbeHandle> = HashMap::new();
        for spec in &self.manifest.probes {
            if !seen.insert(spec.name.as_str()) {
                return Err(self.verification_error(format!("duplicate probe {}", spec.name)));
            }
            let probe = self.compile_probe(spec, &tables)?;
            probes.insert(spec.name.clone(), Arc::new(probe));
        }

        debug!(
            path = %self.path.display(),
            tables = tables.len(),
            probes = probes.len(),
            "probe container loaded"
        );
        self.probes = probes;
        Ok(())
    }

    fn find_probe(&self, name: &str) -> Option<ProbeHandle> {
        self.probes.get(name).cloned()
    }
}

/// Loader for manifest containers
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ProbeLoader for NativeLoader {
    fn open(
        &self,
        path: &Path,
        category: Option<&str>,
    ) -> Result<Box<dyn ProbeObject>, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest =
            serde_yaml::from_str(&content).map_err(|e| LoadError::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(NativeObject {
            path: path.to_path_buf(),
            manifest,
            requested_category: category.map(str::to_string),
            probes: HashMap::new(),
        }))
    }
}
