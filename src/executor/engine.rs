//! Per-slot execution engine
//!
//! Spawns one OS thread per bound slot, pinned through the probe's run call, and waits
//! for all of them. Each worker owns exactly one element of the result array.

use std::io;
use std::thread;
use thiserror::Error;
use tracing::debug;

use crate::models::{SlotMap, SlotResult};
use crate::probe::{Probe, RunRequest};

/// Execution engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn worker for CPU {slot}: {source}")]
    Spawn {
        slot: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker for CPU {slot} panicked")]
    WorkerPanicked { slot: usize },
}

/// Timed phase settings shared by every slot of a test
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub repeat_count: u32,
    pub batch_size: u32,
}

/// Run every bound slot concurrently and return results indexed by slot.
///
/// Unbound slots spawn no worker and stay `None`. There is no timeout: a probe that never
/// returns blocks the join.
pub fn execute(
    slots: &SlotMap,
    settings: ExecutionSettings,
) -> Result<Vec<Option<SlotResult>>, EngineError> {
    let mut results: Vec<Option<SlotResult>> = vec![None; slots.len()];

    thread::scope(|scope| {
        let mut workers = Vec::with_capacity(slots.bound_count());
        let mut outcome = Ok(());

        for (slot, (binding, result)) in slots.iter().zip(results.iter_mut()).enumerate() {
            let Some(probe) = binding.probe() else {
                continue;
            };

            let spawned = thread::Builder::new()
                .name(format!("cpu-{slot}"))
                .spawn_scoped(scope, move || {
                    *result = Some(run_slot(probe.as_ref(), slot, settings));
                });

            match spawned {
                Ok(handle) => workers.push((slot, handle)),
                Err(source) => {
                    outcome = Err(EngineError::Spawn { slot, source });
                    break;
                }
            }
        }

        debug!("Spawned {} workers", workers.len());

        for (slot, handle) in workers {
            if handle.join().is_err() && outcome.is_ok() {
                outcome = Err(EngineError::WorkerPanicked { slot });
            }
        }
        outcome
    })?;

    Ok(results)
}

fn run_slot(probe: &dyn Probe, slot: usize, settings: ExecutionSettings) -> SlotResult {
    let request = RunRequest::pinned(slot, settings.repeat_count, settings.batch_size);
    match probe.run(&request) {
        Ok(result) => {
            debug!("{} on CPU {}: {}", probe.name(), slot, result);
            result
        }
        Err(e) => {
            debug!("Run of {} on CPU {} failed: {}", probe.name(), slot, e);
            SlotResult::new(0, e.status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::MockProbe;
    use crate::probe::{ProbeHandle, RunError};
    use std::sync::Arc;

    const SETTINGS: ExecutionSettings = ExecutionSettings {
        repeat_count: 100,
        batch_size: 64,
    };

    struct PanickingProbe;

    impl Probe for PanickingProbe {
        fn name(&self) -> &str {
            "panics"
        }

        fn run(&self, _request: &RunRequest) -> Result<SlotResult, RunError> {
            panic!("probe exploded");
        }
    }

    #[test]
    fn test_one_worker_per_bound_slot() {
        let probe = Arc::new(MockProbe::new("x"));
        let mut slots = SlotMap::new(4);
        for slot in 0..4 {
            slots.bind(slot, Arc::clone(&probe) as ProbeHandle);
        }

        let results = execute(&slots, SETTINGS).unwrap();

        assert_eq!(probe.calls().len(), 4);
        assert_eq!(
            probe.called_cpus(),
            vec![Some(0), Some(1), Some(2), Some(3)]
        );
        assert!(probe.calls().iter().all(|c| c.repeat == 100 && c.batch_size == 64));
        assert!(results.iter().all(|r| r.is_some()));
    }

    #[test]
    fn test_unbound_slots_have_no_result() {
        let probe = Arc::new(MockProbe::new("x").with_duration(50));
        let mut slots = SlotMap::new(3);
        slots.bind(1, Arc::clone(&probe) as ProbeHandle);

        let results = execute(&slots, SETTINGS).unwrap();

        assert_eq!(results, vec![None, Some(SlotResult::new(51, 0)), None]);
        assert_eq!(probe.called_cpus(), vec![Some(1)]);
    }

    #[test]
    fn test_results_stay_in_their_slot() {
        let x = Arc::new(MockProbe::new("x").with_duration(1000).returning_on(0, 7));
        let y = Arc::new(MockProbe::new("y").with_duration(2000));
        let mut slots = SlotMap::new(2);
        slots.bind(0, x as ProbeHandle);
        slots.bind(1, y as ProbeHandle);

        let results = execute(&slots, SETTINGS).unwrap();

        assert_eq!(results[0], Some(SlotResult::new(1000, 7)));
        assert_eq!(results[1], Some(SlotResult::new(2001, 0)));
    }

    #[test]
    fn test_run_error_recorded_as_return_code() {
        let probe = Arc::new(MockProbe::new("x").failing_on(1, 22));
        let mut slots = SlotMap::new(2);
        slots.bind(0, Arc::clone(&probe) as ProbeHandle);
        slots.bind(1, Arc::clone(&probe) as ProbeHandle);

        let results = execute(&slots, SETTINGS).unwrap();

        assert_eq!(results[0].unwrap().return_code, 0);
        assert_eq!(results[1], Some(SlotResult::new(0, -22)));
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let mut slots = SlotMap::new(2);
        slots.bind(0, MockProbe::handle("fine"));
        slots.bind(1, Arc::new(PanickingProbe) as ProbeHandle);

        let err = execute(&slots, SETTINGS).unwrap_err();
        assert!(matches!(err, EngineError::WorkerPanicked { slot: 1 }));
    }

    #[test]
    fn test_empty_map() {
        let results = execute(&SlotMap::new(0), SETTINGS).unwrap();
        assert!(results.is_empty());
    }
}
