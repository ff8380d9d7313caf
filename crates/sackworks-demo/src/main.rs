//! Runs every level to completion, prints what ended up in the bins and
//! what the tracker believes, and verifies determinism.
//!
//! Usage: `sackworks-demo [LEVELS_DIR]`. Without a directory the bundled
//! levels are used. Set `RUST_LOG=debug` for per-ball tracing.

use std::path::Path;
use std::process::ExitCode;

use sackworks_data::{bundled_levels, load_levels_dir};
use sackworks_demo::{DEFAULT_TICK_LIMIT, RunReport, run_checked};

fn main() -> ExitCode {
    env_logger::init();

    let levels = match std::env::args().nth(1) {
        Some(dir) => load_levels_dir(Path::new(&dir)),
        None => bundled_levels(),
    };
    let levels = match levels {
        Ok(levels) => levels,
        Err(e) => {
            eprintln!("failed to load levels: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("=== Sackworks ===");
    println!("Levels: {}\n", levels.len());

    for level in &levels {
        println!("--- {} ---", level.name);
        match run_checked(level, DEFAULT_TICK_LIMIT) {
            Ok(report) => print_report(&report),
            Err(e) => {
                println!("    FAIL: {e}");
                return ExitCode::FAILURE;
            }
        }
        println!();
    }

    println!("All {} levels passed.", levels.len());
    ExitCode::SUCCESS
}

fn print_report(report: &RunReport) {
    println!(
        "    Drained after {} ticks ({} steps), state hash = {:#018x}",
        report.ticks, report.steps, report.state_hash
    );
    for bin in &report.bins {
        let contents: Vec<&str> = bin
            .results
            .iter()
            .map(|r| r.as_deref().unwrap_or("?"))
            .collect();
        println!("      [{:>10}] {}", bin.name, contents.join(" "));
    }

    println!("    Beliefs:");
    for (source, bucketed) in report.posterior.sources.iter().zip(&report.bucketed.sources) {
        let parts: Vec<String> = source
            .alternatives
            .iter()
            .zip(bucketed)
            .map(|((label, _), pct)| format!("{label} {pct}%"))
            .collect();
        println!("      {:>12}: {}", source.name, parts.join(", "));
    }
    let truth: Vec<String> = report
        .truth
        .iter()
        .map(|(source, label)| format!("{source}={label}"))
        .collect();
    println!("    Actually: {}", truth.join(", "));
    println!("    Determinism: PASS (hashes match)");
}
