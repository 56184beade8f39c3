//! Unattended console login CLI.
//!
//! Reads credentials from the environment, drives a headless Chromium through
//! the provider sign-in and OAuth authorization, verifies the session,
//! persists the cookie artifact, and performs the keepalive visits.
//!
//! Usage:
//!   $ GH_USERNAME=... GH_PAT=... cargo run --bin autologin -- run
//!   $ CHROME_BIN=/path/to/chrome autologin run --show-browser --debug
//!
//! Exit code 0 means the session was verified; any fatal condition (missing
//! credentials, UI contract violated, second-factor challenge, still on the
//! sign-in page, engine fault) exits 1.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use autologin::chromium::ChromiumDriver;
use autologin::config::RunConfig;
use autologin::driver::{LaunchOptions, PageDriver};
use autologin::logging::{LogLevel, RunLogger};
use autologin::orchestrator::LoginOrchestrator;
use clap::{Args, Parser, Subcommand};
use log::warn;

#[derive(Parser)]
#[command(
    name = "autologin",
    author,
    version,
    about = "Unattended delegated-login keeper for the target console"
)]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full login, verification, and keepalive sequence.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Override the console base URL.
    #[arg(long)]
    console_url: Option<String>,

    /// Override where the cookie artifact is written.
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Override the checkpoint screenshot directory.
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    show_browser: bool,

    /// Announce every checkpoint screenshot.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_env_logger();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => match run(args, cli.verbose).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("{err:?}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(args: RunArgs, verbose: u8) -> Result<()> {
    // Credentials are validated here, before any browser is launched.
    let mut config = RunConfig::from_env().context("configuration error")?;
    if let Some(url) = args.console_url {
        config.console_url = url.trim_end_matches('/').to_string();
    }
    if let Some(path) = args.cookie_file {
        config.cookie_file = path;
    }
    if let Some(dir) = args.screenshot_dir {
        config.screenshot_dir = dir;
    }
    if args.show_browser {
        config.headless = false;
    }
    if args.debug {
        config.debug = true;
    }

    let logger = RunLogger::new(if verbose > 0 || config.debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    logger.info(
        format!(
            "Starting login run as {} (token {})",
            config.credentials.identity,
            config.credentials.masked_secret()
        ),
        None,
    );

    let launch = LaunchOptions {
        headless: config.headless,
        chrome_executable: config.chrome_executable.clone(),
        ..LaunchOptions::default()
    };
    let driver = ChromiumDriver::launch(&launch)
        .await
        .context("failed to launch browser")?;

    let mut orchestrator = LoginOrchestrator::new(&config, logger);
    let outcome = orchestrator.run(&driver).await;

    // The browser is released on every path, success or failure.
    if let Err(err) = driver.close().await {
        warn!("browser shutdown failed: {err}");
    }

    let summary = outcome.context("login run failed")?;
    log::info!(
        "Session verified at {} ({} cookies saved, {} keepalive visits)",
        summary.final_url,
        summary.cookies_saved,
        summary.keepalive_visits
    );
    Ok(())
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
