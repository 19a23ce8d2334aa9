//! Preparation phase
//!
//! Runs a warm-up probe once, repeating internally, so container tables reach a steady
//! state before the timed phase starts.

use thiserror::Error;
use tracing::{info, warn};

use crate::models::{Preparation, SlotResult};
use crate::probe::{ProbeObject, RunRequest};

/// Preparation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreparationError {
    #[error("preparation probe {probe} not found in container {container}")]
    ProbeNotFound { probe: String, container: String },

    #[error("preparation probe {probe} returned non-zero {return_code} in test {test}")]
    Failed {
        test: String,
        probe: String,
        return_code: i32,
    },
}

/// Run the preparation probe with a single unpinned call.
///
/// A failing run call is reported as its negative status in the outcome.
pub fn prepare(
    container: &dyn ProbeObject,
    preparation: &Preparation,
    batch_size: u32,
) -> Result<SlotResult, PreparationError> {
    let probe = container.find_probe(&preparation.probe).ok_or_else(|| {
        PreparationError::ProbeNotFound {
            probe: preparation.probe.clone(),
            container: container.path().display().to_string(),
        }
    })?;

    info!(
        "Preparing with {} ({} iterations)",
        preparation.probe, preparation.repeat_count
    );

    let request = RunRequest::unpinned(preparation.repeat_count, batch_size);
    let outcome = probe
        .run(&request)
        .unwrap_or_else(|e| SlotResult::new(0, e.status));
    Ok(outcome)
}

/// Apply the failure policy to a preparation outcome
pub fn check_preparation(
    test: &str,
    preparation: &Preparation,
    outcome: &SlotResult,
    ignore_failures: bool,
) -> Result<(), PreparationError> {
    if outcome.is_success() {
        return Ok(());
    }

    let err = PreparationError::Failed {
        test: test.to_string(),
        probe: preparation.probe.clone(),
        return_code: outcome.return_code,
    };
    if ignore_failures {
        warn!("{}", err);
        Ok(())
    } else {
        Err(err)
    }
}
