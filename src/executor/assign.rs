//! CPU assignment resolution
//!
//! Turns a test's ordered assignment directives into a dense slot map.

use thiserror::Error;
use tracing::debug;

use crate::models::{AssignmentDirective, ProbeAssignment, SlotMap};
use crate::probe::ProbeHandle;

/// Assignment errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("probe {probe} not found in container")]
    ProbeNotFound { probe: String },

    #[error("invalid CPU {slot} for probe {probe}: only {processor_count} processors")]
    InvalidSlot {
        probe: String,
        slot: usize,
        processor_count: usize,
    },
}

/// Resolve `assignment` into a slot map of `processor_count` slots.
///
/// Directives apply in declaration order and later bindings overwrite earlier ones.
/// `Remaining` only fills slots that are unassigned when it is reached.
pub fn resolve<F>(
    assignment: &[ProbeAssignment],
    lookup: F,
    processor_count: usize,
) -> Result<SlotMap, AssignmentError>
where
    F: Fn(&str) -> Option<ProbeHandle>,
{
    let mut slots = SlotMap::new(processor_count);

    for entry in assignment {
        let probe = lookup(&entry.probe).ok_or_else(|| AssignmentError::ProbeNotFound {
            probe: entry.probe.clone(),
        })?;

        match &entry.directive {
            AssignmentDirective::Slot(slot) => {
                check_slot(&entry.probe, *slot, processor_count)?;
                slots.bind(*slot, probe);
            }
            AssignmentDirective::SlotList(list) => {
                for &slot in list {
                    check_slot(&entry.probe, slot, processor_count)?;
                    slots.bind(slot, probe.clone());
                }
            }
            AssignmentDirective::All => {
                for slot in 0..processor_count {
                    slots.bind(slot, probe.clone());
                }
            }
            AssignmentDirective::Remaining => {
                let unassigned: Vec<usize> = (0..processor_count)
                    .filter(|&slot| slots.probe(slot).is_none())
                    .collect();
                for slot in unassigned {
                    slots.bind(slot, probe.clone());
                }
            }
        }
        debug!("Assigned {}", entry);
    }

    Ok(slots)
}

fn check_slot(probe: &str, slot: usize, processor_count: usize) -> Result<(), AssignmentError> {
    if slot >= processor_count {
        return Err(AssignmentError::InvalidSlot {
            probe: probe.to_string(),
            slot,
            processor_count,
        });
    }
    Ok(())
}
