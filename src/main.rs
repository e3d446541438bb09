mod agent;
mod catalog;
mod cli;
mod facts;
mod hooks;
mod logging;
mod paths;
mod platform;
mod report;
mod resource;
mod settings;
mod state;
mod ui;
mod users;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, RunArgs};
use declarative::RunReport;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use agent::{Agent, RunOptions};
use catalog::Catalog;
use settings::{Settings, TimeoutSetting};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet)?;

    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => paths::settings_file(&paths::config_dir()?),
    };

    match cli.command {
        Command::Run(args) => run(&settings_path, args, cli.quiet),
        Command::Settings => show_settings(&settings_path),
        Command::Report => show_report(&settings_path),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "stagehand", &mut io::stdout());
            Ok(())
        }
    }
}

fn run(settings_path: &Path, args: RunArgs, quiet: bool) -> Result<()> {
    let settings = with_overrides(Settings::load(settings_path)?, &args);
    settings.validate().context("Invalid settings")?;

    let mut agent = Agent::from_settings(settings)?;
    let catalog = args
        .catalog
        .as_deref()
        .map(|path| Catalog::from_file(path, agent.context()))
        .transpose()?;

    let report = agent.run(RunOptions { catalog })?;

    if !quiet {
        match report.status() {
            "failed" => ui::error(&format!("Run finished with failures for {}", report.host)),
            status => ui::success(&format!("Run finished: {status}")),
        }
    }
    if args.detailed_exitcodes {
        let code = detailed_exit_code(&report);
        if code != 0 {
            std::process::exit(code);
        }
    }
    Ok(())
}

/// Command-line values win over the settings file
fn with_overrides(mut settings: Settings, args: &RunArgs) -> Settings {
    if let Some(server) = &args.server {
        settings.server = server.clone();
    }
    if let Some(certname) = &args.certname {
        settings.certname = certname.clone();
    }
    if let Some(timeout) = &args.timeout {
        settings.configtimeout = TimeoutSetting::Text(timeout.clone());
    }
    if args.no_cache_fallback {
        settings.usecacheonfailure = false;
    }
    settings.summarize |= args.summarize;
    settings.trace |= args.trace;
    settings
}

/// 2 when something changed, 4 when something failed, 6 for both
fn detailed_exit_code(report: &RunReport) -> i32 {
    let summary = report.apply_summary();
    let mut code = 0;
    if summary.changed > 0 {
        code |= 2;
    }
    if summary.failed > 0 {
        code |= 4;
    }
    code
}

fn show_settings(settings_path: &Path) -> Result<()> {
    let settings = Settings::load(settings_path)?;
    let state_dir = settings.state_dir()?;

    ui::header("Settings");
    ui::kv("Settings file", &settings_path.display().to_string());
    ui::kv("State directory", &state_dir.display().to_string());
    ui::kv("Catalog cache", &paths::catalog_cache_dir(&state_dir).display().to_string());
    println!();
    print!("{}", settings.to_toml()?);
    Ok(())
}

fn show_report(settings_path: &Path) -> Result<()> {
    let settings = Settings::load(settings_path)?;
    let reports: PathBuf = paths::reports_dir(&settings.state_dir()?);

    let Some(path) = report::latest(&reports, &settings.certname)? else {
        ui::dim(&format!("No reports stored for {}", settings.certname));
        return Ok(());
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let report: RunReport = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse report: {}", path.display()))?;
    report::print_summary(&report);
    Ok(())
}
