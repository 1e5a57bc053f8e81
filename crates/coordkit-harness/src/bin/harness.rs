//! CLI entrypoint for the coordkit stress harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use coordkit_harness::config::parse_u64_loose;
use coordkit_harness::structured_log::{
    ArtifactIndex, LogEmitter, sha256_hex, validate_log_file,
};
use coordkit_harness::{HarnessConfig, ScenarioRunner, ScenarioSet, StressProfile, StressReport};

/// Stress tooling for coordkit primitives.
#[derive(Debug, Parser)]
#[command(name = "coordkit-harness")]
#[command(about = "Multi-threaded stress scenarios for coordkit primitives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scenario set and write log, report and artifact index.
    Run {
        /// Scenario set JSON (built-in set when omitted).
        #[arg(long)]
        scenarios: Option<PathBuf>,
        /// Run only these case ids (repeatable).
        #[arg(long = "only")]
        only: Vec<String>,
        /// Stress profile (`quick` or `soak`); overrides COORDKIT_PROFILE.
        #[arg(long)]
        profile: Option<String>,
        /// Root seed (decimal or 0x...); overrides COORDKIT_STRESS_SEED.
        #[arg(long)]
        seed: Option<String>,
        /// Rounds per scenario; overrides COORDKIT_STRESS_ROUNDS.
        #[arg(long)]
        rounds: Option<u32>,
        /// Maximum random hold in milliseconds; overrides COORDKIT_HOLD_MAX_MS.
        #[arg(long)]
        hold_max_ms: Option<u64>,
        /// Campaign name (defaults to the suite name).
        #[arg(long)]
        campaign: Option<String>,
        /// Run identifier stamped into trace ids.
        #[arg(long, default_value = "run-001")]
        run_id: String,
        /// Output directory for trace.jsonl, report.json and artifact_index.json.
        #[arg(long, default_value = "target/coordkit-stress")]
        out_dir: PathBuf,
    },
    /// List the cases of a scenario set.
    List {
        /// Scenario set JSON (built-in set when omitted).
        #[arg(long)]
        scenarios: Option<PathBuf>,
    },
    /// Validate a structured JSONL log file.
    ValidateLog {
        /// Log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn load_set(path: Option<&PathBuf>) -> Result<ScenarioSet, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => ScenarioSet::from_file(path)?,
        None => ScenarioSet::builtin(),
    })
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            scenarios,
            only,
            profile,
            seed,
            rounds,
            hold_max_ms,
            campaign,
            run_id,
            out_dir,
        } => {
            let mut config = HarnessConfig::from_env();
            if let Some(profile) = profile {
                let profile = StressProfile::from_str_loose(&profile);
                config = HarnessConfig {
                    seed: config.seed,
                    ..HarnessConfig::for_profile(profile)
                };
            }
            if let Some(seed) = seed {
                config.seed = parse_u64_loose(&seed)
                    .ok_or_else(|| format!("invalid --seed value '{seed}'"))?;
            }
            if let Some(rounds) = rounds.filter(|r| *r > 0) {
                config.rounds = rounds;
            }
            if let Some(hold) = hold_max_ms {
                config.hold_max_ms = hold;
            }

            let mut set = load_set(scenarios.as_ref())?;
            if !only.is_empty() {
                set = set.select(&only)?;
            }
            let campaign = campaign.unwrap_or_else(|| set.suite.clone());

            std::fs::create_dir_all(&out_dir)?;
            let trace_path = out_dir.join("trace.jsonl");
            let report_path = out_dir.join("report.json");
            let index_path = out_dir.join("artifact_index.json");

            eprintln!(
                "Running {} scenario(s) [{} profile, seed {:#x}, {} rounds]",
                set.cases.len(),
                config.profile.as_str(),
                config.seed,
                config.rounds
            );
            let mut emitter = LogEmitter::to_file(&trace_path, &campaign, &run_id)?;
            let runner = ScenarioRunner::new(&campaign, config.clone());
            let results = runner.run(&set, &mut emitter)?;
            drop(emitter);

            for result in &results {
                let status = if result.passed() { "PASS" } else { "FAIL" };
                let marker = result.failure_marker.as_deref().unwrap_or("");
                eprintln!("  [{status}] {} {marker}", result.scenario_id);
            }

            let report = StressReport::new(&campaign, &run_id, &set.suite, &config, results);
            let report_json = report.to_json()?;
            std::fs::write(&report_path, &report_json)?;

            let mut index = ArtifactIndex::new(&run_id, &campaign);
            index.add_file(&trace_path, "log")?;
            index.add(
                report_path.display().to_string(),
                "report",
                sha256_hex(report_json.as_bytes()),
            );
            std::fs::write(&index_path, index.to_json()?)?;

            eprintln!(
                "{} passed, {} failed; report at {}",
                report.summary.passed,
                report.summary.failed,
                report_path.display()
            );
            if !report.all_passed() {
                eprintln!("Replay: {}", report.replay.command);
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::List { scenarios } => {
            let set = load_set(scenarios.as_ref())?;
            println!("{} ({} cases)", set.suite, set.cases.len());
            for case in &set.cases {
                println!(
                    "  {:<28} {:<20} workers={} resources={} {}",
                    case.id,
                    case.kind.as_str(),
                    case.workers,
                    case.resources,
                    case.description
                );
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            if errors.is_empty() {
                println!("{}: {lines} line(s), valid", log.display());
            } else {
                for error in &errors {
                    eprintln!("{error}");
                }
                eprintln!(
                    "{}: {lines} line(s), {} error(s)",
                    log.display(),
                    errors.len()
                );
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
