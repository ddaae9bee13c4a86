//! calibration-report: compare a triage run's priority distribution with the
//! configured targets.
//!
//! Usage:
//!   calibration-report <results.jsonl>                   # print per-level deltas, exit 0
//!   calibration-report <results.jsonl> --config cfg.toml # targets from a config file
//!   calibration-report <results.jsonl> -q                # quiet: exit 0 if within tolerance, 1 if not
//!
//! Reads triage-engine output. Error lines and the summary line are skipped.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use triage_engine::calibration::{compare, CalibrationReport, CalibrationSample};
use triage_engine::Config;

fn load_samples(path: &str) -> (Vec<CalibrationSample>, usize) {
    let contents = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("calibration-report: cannot read {}: {}", path, e);
        process::exit(2);
    });
    let mut samples = Vec::new();
    let mut skipped = 0;
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<CalibrationSample>(line) {
            Ok(s) => samples.push(s),
            Err(_) => skipped += 1,
        }
    }
    (samples, skipped)
}

fn load_config(path: Option<&String>) -> Config {
    match path {
        Some(p) => Config::load(Path::new(p)).unwrap_or_else(|e| {
            eprintln!("calibration-report: invalid config {}: {}", p, e);
            process::exit(2);
        }),
        None => Config::default(),
    }
}

fn print_report(report: &CalibrationReport, skipped: usize) {
    println!("{} tickets ({} non-outcome lines skipped)", report.total, skipped);
    for level in &report.levels {
        println!(
            "{} {:>5} observed {:>6.1}%  target {:>5.1}%  delta {:>+6.1}{}",
            if level.within_tolerance { " " } else { "!" },
            level.priority.as_str(),
            level.observed * 100.0,
            level.target * 100.0,
            level.delta * 100.0,
            if level.within_tolerance { "" } else { "  (outside tolerance)" },
        );
    }
    match report.accuracy {
        Some(acc) => println!(
            "accuracy {:.1}% over {} labelled (over-escalated {}, under-escalated {})",
            acc * 100.0,
            report.labelled,
            report.over_escalated,
            report.under_escalated
        ),
        None => println!("no labelled tickets"),
    }
}

/// Only quiet mode reports tolerance through the exit code.
fn exit_code(within_tolerance: bool, quiet: bool) -> i32 {
    if quiet && !within_tolerance {
        1
    } else {
        0
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let quiet = args.iter().any(|a| a == "-q" || a == "--quiet");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1));
    let files: Vec<_> = args
        .iter()
        .enumerate()
        .filter(|(i, a)| {
            !a.starts_with('-') && args.get(i.wrapping_sub(1)).map_or(true, |prev| prev != "--config")
        })
        .map(|(_, a)| a)
        .collect();

    if files.len() != 1 {
        eprintln!("Usage: calibration-report <results.jsonl> [--config FILE] [-q|--quiet]");
        eprintln!("  -q  Quiet: only exit code (0=within tolerance, 1=outside)");
        process::exit(2);
    }

    let config = load_config(config_path);
    let (samples, skipped) = load_samples(files[0]);
    let report = compare(&samples, &config.calibration.priority);

    if !quiet {
        print_report(&report, skipped);
    }

    process::exit(exit_code(report.within_tolerance(), quiet));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_mode_signals_drift() {
        assert_eq!(exit_code(false, true), 1);
        assert_eq!(exit_code(true, true), 0);
    }

    #[test]
    fn report_mode_always_succeeds() {
        assert_eq!(exit_code(false, false), 0);
        assert_eq!(exit_code(true, false), 0);
    }
}
