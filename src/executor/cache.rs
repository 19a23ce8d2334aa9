//! Loaded container cache
//!
//! Each distinct container path is opened and loaded once per run; every later test that
//! names the same path shares the handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::probe::{ContainerHandle, LoadError, ProbeLoader};

/// Memoizes loaded containers by path for the lifetime of a run
pub struct ObjectCache<L> {
    loader: L,
    objects: HashMap<PathBuf, ContainerHandle>,
}

impl<L: ProbeLoader> ObjectCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            objects: HashMap::new(),
        }
    }

    /// Return the container for `path`, opening and loading it on first use.
    ///
    /// The category only applies to the first load of a path.
    pub fn get_or_load(
        &mut self,
        path: &Path,
        category: Option<&str>,
    ) -> Result<ContainerHandle, LoadError> {
        if let Some(object) = self.objects.get(path) {
            debug!("Reusing loaded container {}", path.display());
            return Ok(Arc::clone(object));
        }

        info!("Loading probe container {}", path.display());
        let mut object = self.loader.open(path, category)?;
        object.load()?;

        let handle: ContainerHandle = Arc::from(object);
        self.objects.insert(path.to_path_buf(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of loaded containers
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[cfg(test)]
    pub fn loader(&self) -> &L {
        &self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::{MockLoader, MockProbe};

    fn loader() -> MockLoader {
        MockLoader::new()
            .with_container("a.o", vec![Arc::new(MockProbe::new("x"))])
            .with_container("b.o", vec![Arc::new(MockProbe::new("y"))])
    }

    #[test]
    fn test_same_path_loads_once() {
        let mut cache = ObjectCache::new(loader());

        let first = cache.get_or_load(Path::new("a.o"), None).unwrap();
        let second = cache.get_or_load(Path::new("a.o"), Some("xdp")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.loader().open_count(), 1);
        assert_eq!(cache.loader().load_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_paths_load_separately() {
        let mut cache = ObjectCache::new(loader());

        let a = cache.get_or_load(Path::new("a.o"), None).unwrap();
        let b = cache.get_or_load(Path::new("b.o"), None).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.loader().load_count(), 2);
        assert!(a.find_probe("x").is_some());
        assert!(b.find_probe("x").is_none());
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let mut cache = ObjectCache::new(loader());

        assert!(cache.get_or_load(Path::new("missing.o"), None).is_err());
        assert!(cache.get_or_load(Path::new("missing.o"), None).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.loader().open_count(), 2);
    }
}
