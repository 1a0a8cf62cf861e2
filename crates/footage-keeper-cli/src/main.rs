mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use footage_keeper_core::report::{folder_rows, folder_table};
use footage_keeper_core::{CommandDetector, ObjectDetector, RetentionConfig, RetentionEngine, RunReport};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match footage_keeper_core::load_configuration(args.config.as_deref()) {
        Ok(config) => config.with_overrides(args.dry_run, args.force_reevaluation),
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let outcome = match &args.command {
        Some(Commands::Run) => run_retention(&config, &args),
        Some(Commands::Plan) => run_plan(&config, &args),
        Some(Commands::Pending) => run_pending(&config),
        Some(Commands::Sizes) => run_sizes(&config),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(true)
        }
        Some(Commands::ClearCache { yes }) => run_clear_cache(&config, *yes),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(true)
        }
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the run completed but failed too many removals.
fn run_retention(config: &RetentionConfig, args: &Cli) -> Result<bool> {
    let engine = RetentionEngine::new(config.clone())?;
    let reporter = CliReporter::new();

    let detector = config
        .detector_command
        .as_deref()
        .and_then(CommandDetector::from_command_line);
    if detector.is_none() {
        warn!("No detector_command configured; pending videos stay unanalysed and protected");
    }

    let report = engine
        .run(&reporter, detector.as_ref().map(|d| d as &dyn ObjectDetector))
        .context("Retention run failed")?;

    print_report(&report);
    export_report(&report, args)?;

    if report.exceeds_failure_threshold() {
        error!(
            "{} of {} removals failed, above the {} failure ratio",
            report.execution.failed_count(),
            report.execution.attempted_count(),
            report.max_failure_ratio
        );
        return Ok(false);
    }
    Ok(true)
}

fn run_plan(config: &RetentionConfig, args: &Cli) -> Result<bool> {
    let mut config = config.clone();
    config.dry_run = true;
    let engine = RetentionEngine::new(config)?;
    let reporter = CliReporter::new();

    let report = engine.run(&reporter, None).context("Planning failed")?;
    for outcome in &report.execution.outcomes {
        println!(
            "{} {} [{}] {}",
            "would delete".yellow(),
            outcome.candidate.path.display(),
            outcome.candidate.reason,
            outcome.candidate.phase
        );
    }
    print_report(&report);
    export_report(&report, args)?;
    Ok(true)
}

fn run_pending(config: &RetentionConfig) -> Result<bool> {
    let engine = RetentionEngine::new(config.clone())?;
    let discovery = engine.discover()?;
    let pending = engine.pending_files(&discovery.folders);
    for video in &pending {
        println!("{}", video.display());
    }
    info!("{} videos need analysis", format!("{}", pending.len()).cyan());
    Ok(true)
}

fn run_sizes(config: &RetentionConfig) -> Result<bool> {
    let engine = RetentionEngine::new(config.clone())?;
    let reporter = CliReporter::new();
    let plan = engine.plan(&reporter).context("Sizing failed")?;

    println!("{}", folder_table(folder_rows(&plan.classification, &plan.folder_plans)));
    for (path, err) in &plan.measurement.failures {
        println!("{} {}: {}", "unsized".red(), path.display(), err);
    }
    Ok(true)
}

fn run_clear_cache(config: &RetentionConfig, yes: bool) -> Result<bool> {
    if !yes {
        let confirmed = prompt_confirm(
            "Remove every folder size cache artifact? Sizes will be recomputed on the next run.",
            Some(false),
        )?;
        if !confirmed {
            return Ok(true);
        }
    }
    let engine = RetentionEngine::new(config.clone())?;
    let removed = engine.clear_cache()?;
    if config.dry_run {
        println!("{} cache artifacts would be removed", removed);
    } else {
        println!("{} cache artifacts removed", removed);
    }
    Ok(true)
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", report.to_table());

    if report.execution.failed_count() > 0 {
        info!(
            "{} removals failed",
            format!("{}", report.execution.failed_count()).red()
        );
    }
    if report.free_space_buffer_violated() {
        info!("{}", "Expected free space is below the configured buffer".red());
    }
    info!(
        "{} released in {}",
        format!("{}", report.bytes_released()).green(),
        format!("{:.2}s", report.duration.as_secs_f64()).green(),
    );
}

fn export_report(report: &RunReport, args: &Cli) -> Result<()> {
    if let Some(path) = args.report_csv.as_deref() {
        report
            .write_outcomes_csv(path)
            .with_context(|| format!("Cannot write {}", path.display()))?;
        info!("Removal outcomes written to {}", path.display());
    }
    if let Some(path) = args.history_csv.as_deref() {
        append_history(report, path)?;
    }
    Ok(())
}

fn append_history(report: &RunReport, path: &Path) -> Result<()> {
    report
        .append_history_csv(path)
        .with_context(|| format!("Cannot append to {}", path.display()))?;
    info!("Run summary appended to {}", path.display());
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
