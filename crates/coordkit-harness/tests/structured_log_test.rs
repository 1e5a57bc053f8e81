//! Integration test: structured log emission and validation through files.

use std::io::Write;

use coordkit_harness::structured_log::{
    LogEmitter, LogEntry, LogLevel, Outcome, Primitive, validate_log_file,
};

fn scratch_file(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("coordkit-{name}-{}.jsonl", std::process::id()))
}

#[test]
fn emitted_file_validates_line_by_line() {
    let path = scratch_file("emitted");
    {
        let mut emitter = LogEmitter::to_file(&path, "logs", "run-1").expect("create log");
        emitter.emit(LogLevel::Info, "campaign_start").expect("emit");
        emitter
            .emit_entry(
                LogEntry::new("", LogLevel::Error, "scenario_result")
                    .with_scenario("pool-a", Primitive::ResourcePool)
                    .with_outcome(Outcome::Fail)
                    .with_failure_marker("pool_oversubscribed"),
            )
            .expect("emit entry");
        emitter.flush().expect("flush");
    }
    let (lines, errors) = validate_log_file(&path).expect("read log");
    assert_eq!(lines, 2);
    assert!(errors.is_empty(), "{errors:?}");

    let content = std::fs::read_to_string(&path).expect("read log");
    let second: serde_json::Value =
        serde_json::from_str(content.lines().nth(1).expect("two lines")).expect("json");
    assert_eq!(second["trace_id"], "logs::run-1::002");
    assert_eq!(second["campaign"], "logs");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn invalid_rows_are_reported_with_line_numbers() {
    let path = scratch_file("invalid");
    {
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(
            file,
            r#"{{"timestamp":"t","trace_id":"a::b::001","level":"info","event":"ok"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"timestamp":"t","trace_id":"a::b::002","level":"info","event":"scenario_result","outcome":"fail"}}"#
        )
        .unwrap();
    }
    let (lines, errors) = validate_log_file(&path).expect("read log");
    assert_eq!(lines, 2);
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|e| e.line_number == 3));
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert!(fields.contains(&"scenario_id"));
    assert!(fields.contains(&"failure_marker"));
    let _ = std::fs::remove_file(&path);
}
