mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

use engine::builtin::register_builtin_plugins;
use engine::config::{EngineSettings, load_settings};
use engine::render::process::{format_failure_marker, format_stats_marker};
use engine::{
    AppServices, BatchReport, CommandLineArgs, PluginManager, RenderLaunch, SessionRegistry,
};

use crate::cli::Args;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn settings_for(args: &Args) -> Result<EngineSettings> {
    let mut settings = match &args.config {
        Some(path) => EngineSettings::from_file(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => load_settings(),
    };
    // Children must not spawn renderers of their own.
    if !args.separate_process {
        settings.renderer_executable = None;
    } else if settings.renderer_executable.is_none() {
        settings.renderer_executable = Some(
            std::env::current_exe().context("locating the renderer executable")?,
        );
    }
    Ok(settings)
}

fn wait_for(launch: RenderLaunch) -> engine::Result<BatchReport> {
    match launch {
        RenderLaunch::Finished(report) => Ok(report),
        RenderLaunch::Running(mut handle) => loop {
            if let Some(report) = handle.try_report() {
                return Ok(report.clone());
            }
            if handle.is_finished() {
                return handle.wait();
            }
            debug!("Waiting for render batch");
            thread::sleep(POLL_INTERVAL);
        },
    }
}

fn report_markers(report: &BatchReport) {
    for item in &report.items {
        match &item.result {
            Ok(Some(stats)) => eprintln!("{}", format_stats_marker(&item.writer, stats)),
            Ok(None) => {}
            Err(e) => eprintln!(
                "{}",
                format_failure_marker(&item.writer, e.frame(), &e.to_string())
            ),
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    let settings = settings_for(args)?;
    let plugins = Arc::new(PluginManager::new());
    register_builtin_plugins(&plugins);

    let registry = SessionRegistry::new();
    let mut app = registry.new_instance(AppServices::headless(plugins, settings))?;

    let command_line = CommandLineArgs {
        project: args.project.clone(),
        writers: args.writers.clone(),
        collect_stats: args.stats,
        block: !args.no_block,
        separate_process: args.separate_process,
        output_dir: args.output_dir.clone(),
    };
    let outcome = app
        .load_from_command_line(&command_line)
        .and_then(wait_for);
    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            let writer = args.writers.first().map_or("-", |w| w.name.as_str());
            eprintln!("{}", format_failure_marker(writer, None, &e.to_string()));
            app.close_project()?;
            return Err(e.into());
        }
    };

    report_markers(&report);
    info!(
        "{} writer(s) rendered, {} failed",
        report.succeeded().len(),
        report.failures().len()
    );
    app.close_project()?;
    Ok(report.is_success())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbosity);
    debug!("Command-line args: {:?}", args);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
