//! Machine-readable stress campaign report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ENV_HOLD_MAX_MS, ENV_PROFILE, ENV_ROUNDS, ENV_SEED, HarnessConfig};
use crate::runner::ScenarioResult;
use crate::structured_log::now_utc;

pub const REPORT_SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failure marker -> number of cases that failed with it.
    pub failures_by_marker: BTreeMap<String, usize>,
    /// Primitive name -> number of failed cases exercising it.
    pub failures_by_primitive: BTreeMap<String, usize>,
}

/// Everything needed to rerun the campaign with the same knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayControls {
    pub env: BTreeMap<String, String>,
    /// CLI invocation; limited to the failed cases when any failed.
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub schema_version: String,
    pub campaign: String,
    pub run_id: String,
    pub suite: String,
    pub generated_utc: String,
    pub config: HarnessConfig,
    pub summary: ReportSummary,
    pub replay: ReplayControls,
    pub results: Vec<ScenarioResult>,
}

impl StressReport {
    #[must_use]
    pub fn new(
        campaign: impl Into<String>,
        run_id: impl Into<String>,
        suite: impl Into<String>,
        config: &HarnessConfig,
        results: Vec<ScenarioResult>,
    ) -> Self {
        let mut summary = ReportSummary {
            total: results.len(),
            passed: 0,
            failed: 0,
            failures_by_marker: BTreeMap::new(),
            failures_by_primitive: BTreeMap::new(),
        };
        for result in &results {
            if result.passed() {
                summary.passed += 1;
                continue;
            }
            summary.failed += 1;
            let marker = result.failure_marker.as_deref().unwrap_or("unknown");
            *summary
                .failures_by_marker
                .entry(marker.to_string())
                .or_default() += 1;
            *summary
                .failures_by_primitive
                .entry(result.primitive.as_str().to_string())
                .or_default() += 1;
        }
        let replay = replay_controls(config, &results);
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            campaign: campaign.into(),
            run_id: run_id.into(),
            suite: suite.into(),
            generated_utc: now_utc(),
            config: config.clone(),
            summary,
            replay,
            results,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn replay_controls(config: &HarnessConfig, results: &[ScenarioResult]) -> ReplayControls {
    let env = BTreeMap::from([
        (ENV_PROFILE.to_string(), config.profile.as_str().to_string()),
        (ENV_SEED.to_string(), format!("{:#x}", config.seed)),
        (ENV_ROUNDS.to_string(), config.rounds.to_string()),
        (ENV_HOLD_MAX_MS.to_string(), config.hold_max_ms.to_string()),
    ]);
    let mut command = format!(
        "harness run --profile {} --seed {:#x} --rounds {} --hold-max-ms {}",
        config.profile.as_str(),
        config.seed,
        config.rounds,
        config.hold_max_ms
    );
    for failed in results.iter().filter(|r| !r.passed()) {
        command.push_str(" --only ");
        command.push_str(&failed.scenario_id);
    }
    ReplayControls { env, command }
}
