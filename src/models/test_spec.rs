//! Test specification models
//!
//! Defines benchmark tests, their preparation phase and CPU assignment directives.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Batch size used when neither the test nor the command line sets one
pub const DEFAULT_BATCH_SIZE: u32 = 64;

/// A single benchmark test as declared in the configuration file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique test name, used for filtering and reporting
    pub name: String,

    /// Path of the probe container holding every probe this test references
    #[serde(alias = "elf_file")]
    pub container_path: String,

    /// Repetitions per slot for the timed phase
    #[serde(alias = "iteration_count")]
    pub repeat_count: u32,

    /// Only run on this platform
    #[serde(default, alias = "platform", skip_serializing_if = "Option::is_none")]
    pub platform_filter: Option<String>,

    /// Category applied to the container's probes at load time
    #[serde(default, alias = "program_type", skip_serializing_if = "Option::is_none")]
    pub probe_category: Option<String>,

    /// Invocations per timed batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,

    /// Warm-up probe run once before the timed phase
    #[serde(
        default,
        alias = "map_state_preparation",
        skip_serializing_if = "Option::is_none"
    )]
    pub preparation: Option<Preparation>,

    /// Probe to CPU assignment, in declaration order
    #[serde(
        alias = "program_cpu_assignment",
        deserialize_with = "deserialize_assignment",
        serialize_with = "serialize_assignment"
    )]
    pub assignment: Vec<ProbeAssignment>,
}

impl TestSpec {
    /// Create a test with no optional settings
    #[cfg(test)]
    pub fn new(
        name: impl Into<String>,
        container_path: impl Into<String>,
        repeat_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            container_path: container_path.into(),
            repeat_count,
            platform_filter: None,
            probe_category: None,
            batch_size: None,
            preparation: None,
            assignment: Vec::new(),
        }
    }

    /// Append an assignment directive
    #[cfg(test)]
    pub fn assign(mut self, probe: impl Into<String>, directive: AssignmentDirective) -> Self {
        self.assignment.push(ProbeAssignment::new(probe, directive));
        self
    }

    /// Set the preparation phase
    #[cfg(test)]
    pub fn with_preparation(mut self, probe: impl Into<String>, repeat_count: u32) -> Self {
        self.preparation = Some(Preparation {
            probe: probe.into(),
            repeat_count,
        });
        self
    }

    /// Restrict the test to one platform
    #[cfg(test)]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform_filter = Some(platform.into());
        self
    }

    /// Batch size for this test, before any command-line override
    pub fn batch_size_or_default(&self) -> u32 {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

/// Warm-up phase settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preparation {
    /// Probe to run
    #[serde(alias = "program")]
    pub probe: String,

    /// Internal repetitions of the single preparation call
    #[serde(alias = "iteration_count")]
    pub repeat_count: u32,
}

/// One entry of a test's assignment sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeAssignment {
    pub probe: String,
    pub directive: AssignmentDirective,
}

impl ProbeAssignment {
    #[cfg(test)]
    pub fn new(probe: impl Into<String>, directive: AssignmentDirective) -> Self {
        Self {
            probe: probe.into(),
            directive,
        }
    }
}

impl fmt::Display for ProbeAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.probe, self.directive)
    }
}

/// Where a probe runs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssignmentDirective {
    /// A single slot
    Slot(usize),
    /// Each listed slot, in order
    SlotList(Vec<usize>),
    /// Every slot, overwriting earlier bindings
    All,
    /// Every slot still unassigned when this directive is processed
    Remaining,
}

impl fmt::Display for AssignmentDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentDirective::Slot(slot) => write!(f, "{slot}"),
            AssignmentDirective::SlotList(slots) => {
                let slots: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", slots.join(", "))
            }
            AssignmentDirective::All => write!(f, "all"),
            AssignmentDirective::Remaining => write!(f, "remaining"),
        }
    }
}

impl Serialize for AssignmentDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AssignmentDirective::Slot(slot) => serializer.serialize_u64(*slot as u64),
            AssignmentDirective::SlotList(slots) => slots.serialize(serializer),
            AssignmentDirective::All => serializer.serialize_str("all"),
            AssignmentDirective::Remaining => serializer.serialize_str("remaining"),
        }
    }
}

impl<'de> Deserialize<'de> for AssignmentDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DirectiveVisitor)
    }
}

struct DirectiveVisitor;

impl<'de> Visitor<'de> for DirectiveVisitor {
    type Value = AssignmentDirective;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a slot index, a list of slot indices, `all`, `remaining` or `unassigned`")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(AssignmentDirective::Slot(slot_index(v)?))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        if v < 0 {
            return Err(E::custom(format!("slot index must be non-negative, got {v}")));
        }
        self.visit_u64(v as u64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        match v.trim() {
            "all" => Ok(AssignmentDirective::All),
            "remaining" | "unassigned" => Ok(AssignmentDirective::Remaining),
            other => other
                .parse::<u64>()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
                .and_then(|slot| Ok(AssignmentDirective::Slot(slot_index(slot)?))),
        }
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut slots = Vec::new();
        while let Some(slot) = seq.next_element::<i64>()? {
            if slot < 0 {
                return Err(de::Error::custom(format!(
                    "slot index must be non-negative, got {slot}"
                )));
            }
            slots.push(slot_index(slot as u64)?);
        }
        Ok(AssignmentDirective::SlotList(slots))
    }
}

fn slot_index<E: de::Error>(v: u64) -> Result<usize, E> {
    usize::try_from(v).map_err(|_| E::custom(format!("slot index {v} is out of range")))
}

/// Reads the assignment mapping as an ordered sequence; a `HashMap` would lose the
/// declaration order that `remaining` depends on.
fn deserialize_assignment<'de, D>(deserializer: D) -> Result<Vec<ProbeAssignment>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AssignmentVisitor;

    impl<'de> Visitor<'de> for AssignmentVisitor {
        type Value = Vec<ProbeAssignment>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of probe names to CPU assignments")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut assignment = Vec::new();
            while let Some((probe, directive)) =
                map.next_entry::<String, AssignmentDirective>()?
            {
                assignment.push(ProbeAssignment { probe, directive });
            }
            Ok(assignment)
        }
    }

    deserializer.deserialize_map(AssignmentVisitor)
}

fn serialize_assignment<S: Serializer>(
    assignment: &[ProbeAssignment],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;

    let mut map = serializer.serialize_map(Some(assignment.len()))?;
    for entry in assignment {
        map.serialize_entry(&entry.probe, &entry.directive)?;
    }
    map.end()
}
