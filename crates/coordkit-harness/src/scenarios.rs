//! Scenario set loading and management.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::structured_log::Primitive;

/// Schema version accepted by [`ScenarioSet::from_json`].
pub const SCENARIO_SET_VERSION: &str = "v1";

/// Workload shape a case runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Producers and consumers over a bounded slot channel.
    Handoff,
    /// Workers competing for a small pool of named resources.
    PoolContention,
    /// Start-signal and done-signal latches around a worker group.
    LatchStartGate,
    /// Successive waves through a barrier with a counting action.
    BarrierWaves,
    /// Coordinator hands a phaser over to workers, who leave when done.
    PhaserRounds,
    /// Producer and consumer trading a buffer back and forth.
    ExchangerSwap,
    /// Counting semaphore bounding a critical section.
    SemaphoreThrottle,
    /// Workers register with a phaser while earlier ones are already
    /// arriving, then wait for the phase they were admitted to.
    PhaserLateJoin,
    /// Writer appends to a guarded list; readers block on a condition until
    /// the list reaches the length they want.
    RwPublish,
    /// Workers draw numbers from a counter held behind one lock.
    SharedCounter,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 10] = [
        ScenarioKind::Handoff,
        ScenarioKind::PoolContention,
        ScenarioKind::LatchStartGate,
        ScenarioKind::BarrierWaves,
        ScenarioKind::PhaserRounds,
        ScenarioKind::ExchangerSwap,
        ScenarioKind::SemaphoreThrottle,
        ScenarioKind::PhaserLateJoin,
        ScenarioKind::RwPublish,
        ScenarioKind::SharedCounter,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handoff => "handoff",
            Self::PoolContention => "pool_contention",
            Self::LatchStartGate => "latch_start_gate",
            Self::BarrierWaves => "barrier_waves",
            Self::PhaserRounds => "phaser_rounds",
            Self::ExchangerSwap => "exchanger_swap",
            Self::SemaphoreThrottle => "semaphore_throttle",
            Self::PhaserLateJoin => "phaser_late_join",
            Self::RwPublish => "rw_publish",
            Self::SharedCounter => "shared_counter",
        }
    }

    /// Primitive under test.
    #[must_use]
    pub const fn primitive(self) -> Primitive {
        match self {
            Self::Handoff => Primitive::SlotChannel,
            Self::PoolContention => Primitive::ResourcePool,
            Self::LatchStartGate => Primitive::Latch,
            Self::BarrierWaves => Primitive::CyclicBarrier,
            Self::PhaserRounds => Primitive::Phaser,
            Self::ExchangerSwap => Primitive::Exchanger,
            Self::SemaphoreThrottle => Primitive::Semaphore,
            Self::PhaserLateJoin => Primitive::Phaser,
            Self::RwPublish | Self::SharedCounter => Primitive::Monitor,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_resources() -> usize {
    1
}

/// A single scenario case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioCase {
    /// Case identifier, unique within a set.
    pub id: String,
    pub kind: ScenarioKind,
    #[serde(default)]
    pub description: String,
    /// Thread count: producers (and consumers), pool workers, latch workers,
    /// barrier parties, phaser workers, semaphore workers, list readers or
    /// counter workers. Exchanger cases always use two threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Slot capacity, pool size, semaphore permits, or exchanged buffer size.
    /// Unused by the other kinds.
    #[serde(default = "default_resources")]
    pub resources: usize,
    /// Per-case rounds; the campaign setting applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
}

impl ScenarioCase {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ScenarioKind, workers: usize, resources: usize) -> Self {
        Self {
            id: id.into(),
            kind,
            description: String::new(),
            workers,
            resources,
            rounds: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    /// Check parameters a workload cannot run with.
    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |reason: &str| HarnessError::InvalidScenario {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if self.resources == 0 {
            return Err(invalid("resources must be at least 1"));
        }
        if self.rounds == Some(0) {
            return Err(invalid("rounds must be at least 1 when given"));
        }
        Ok(())
    }
}

/// A versioned collection of scenario cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSet {
    /// Schema version.
    pub version: String,
    /// Suite name, used as the default campaign name.
    pub suite: String,
    pub cases: Vec<ScenarioCase>,
}

impl ScenarioSet {
    /// Load and validate a scenario set from JSON.
    pub fn from_json(json: &str) -> HarnessResult<Self> {
        let set: Self = serde_json::from_str(json)?;
        set.validate()?;
        Ok(set)
    }

    /// Serialize scenario set to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load scenario set from a file path.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|err| HarnessError::io(path, err))?;
        Self::from_json(&content)
    }

    /// Check version, ids and per-case parameters.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.version != SCENARIO_SET_VERSION {
            return Err(HarnessError::UnsupportedVersion {
                found: self.version.clone(),
                expected: SCENARIO_SET_VERSION,
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        for case in &self.cases {
            case.validate()?;
            if !seen.insert(case.id.as_str()) {
                return Err(HarnessError::InvalidScenario {
                    id: case.id.clone(),
                    reason: "duplicate id".to_string(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ScenarioCase> {
        self.cases.iter().find(|case| case.id == id)
    }

    /// Keep only the named cases, in the order given.
    pub fn select(&self, ids: &[String]) -> HarnessResult<Self> {
        let cases = ids
            .iter()
            .map(|id| {
                self.find(id)
                    .cloned()
                    .ok_or_else(|| HarnessError::UnknownScenario(id.clone()))
            })
            .collect::<HarnessResult<Vec<_>>>()?;
        Ok(Self {
            version: self.version.clone(),
            suite: self.suite.clone(),
            cases,
        })
    }

    /// Built-in set: one case per kind, sized for a quick run.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            version: SCENARIO_SET_VERSION.to_string(),
            suite: "coordkit-default".to_string(),
            cases: vec![
                ScenarioCase::new("handoff-single-pair", ScenarioKind::Handoff, 1, 1)
                    .with_description("one producer, one consumer, single slot; FIFO"),
                ScenarioCase::new("handoff-4x4-ring", ScenarioKind::Handoff, 4, 3)
                    .with_description("four producers and four consumers over a 3-slot ring"),
                ScenarioCase::new("pool-10-workers-5-items", ScenarioKind::PoolContention, 10, 5)
                    .with_description("ten workers share Item0..Item4"),
                ScenarioCase::new("latch-start-gate", ScenarioKind::LatchStartGate, 3, 1)
                    .with_description("start signal releases workers, done signal waits for all"),
                ScenarioCase::new("barrier-5-parties", ScenarioKind::BarrierWaves, 5, 1)
                    .with_description("five parties, action counts waves"),
                ScenarioCase::new("phaser-3-workers", ScenarioKind::PhaserRounds, 3, 1)
                    .with_description("coordinator registers workers then deregisters"),
                ScenarioCase::new("exchanger-buffer-swap", ScenarioKind::ExchangerSwap, 2, 8)
                    .with_description("producer fills, consumer drains, buffers swap"),
                ScenarioCase::new("semaphore-3-of-8", ScenarioKind::SemaphoreThrottle, 8, 3)
                    .with_description("eight workers, three permits"),
                ScenarioCase::new("phaser-late-join-6", ScenarioKind::PhaserLateJoin, 6, 1)
                    .with_description("six workers register one by one while others arrive"),
                ScenarioCase::new("rw-publish-3-readers", ScenarioKind::RwPublish, 3, 1)
                    .with_description("one writer, three readers waiting on list length"),
                ScenarioCase::new("shared-counter-8", ScenarioKind::SharedCounter, 8, 1)
                    .with_description("eight workers draw from one guarded counter"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_is_valid_and_covers_every_kind() {
        let set = ScenarioSet::builtin();
        set.validate().expect("builtin set validates");
        for kind in ScenarioKind::ALL {
            assert!(
                set.cases.iter().any(|case| case.kind == kind),
                "no builtin case for {}",
                kind.as_str()
            );
        }
    }

    #[test]
    fn parses_minimal_case_with_defaults() {
        let set = ScenarioSet::from_json(
            r#"{"version":"v1","suite":"tiny","cases":[{"id":"h","kind":"handoff"}]}"#,
        )
        .expect("valid set");
        let case = &set.cases[0];
        assert_eq!(case.workers, 4);
        assert_eq!(case.resources, 1);
        assert_eq!(case.rounds, None);
        assert_eq!(case.kind.primitive(), Primitive::SlotChannel);
    }

    #[test]
    fn rejects_wrong_version() {
        let err = ScenarioSet::from_json(r#"{"version":"v9","suite":"s","cases":[]}"#)
            .expect_err("version is checked");
        assert!(matches!(err, HarnessError::UnsupportedVersion { .. }));
    }

    #[test]
    fn rejects_duplicate_ids_and_zero_workers() {
        let dup = r#"{"version":"v1","suite":"s","cases":[
            {"id":"a","kind":"latch_start_gate"},{"id":"a","kind":"phaser_rounds"}]}"#;
        assert!(matches!(
            ScenarioSet::from_json(dup),
            Err(HarnessError::InvalidScenario { .. })
        ));
        let zero = r#"{"version":"v1","suite":"s","cases":[{"id":"z","kind":"barrier_waves","workers":0}]}"#;
        assert!(matches!(
            ScenarioSet::from_json(zero),
            Err(HarnessError::InvalidScenario { .. })
        ));
    }

    #[test]
    fn select_keeps_requested_order() {
        let set = ScenarioSet::builtin();
        let picked = set
            .select(&["semaphore-3-of-8".to_string(), "latch-start-gate".to_string()])
            .expect("known ids");
        let ids: Vec<&str> = picked.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["semaphore-3-of-8", "latch-start-gate"]);
        assert!(matches!(
            set.select(&["nope".to_string()]),
            Err(HarnessError::UnknownScenario(_))
        ));
    }
}
