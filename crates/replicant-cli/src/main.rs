//! `replicant` – interactive shell for the replicant action engine.
//!
//! This binary:
//!
//! 1. Loads `~/.replicant/config.toml`, writing the defaults on first run.
//! 2. Boots a [`Session`](replicant_runtime::Session) with one replicant in
//!    the in-process simulator.
//! 3. Drops the user into a REPL with one slash-command per action
//!    (`/move_by`, `/reach_for`, `/grasp`, …) plus `/status`, `/spawn`,
//!    `/collision`, `/schema` and `/help`.
//! 4. Intercepts **Ctrl-C** to cancel the running action and exit safely.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

fn main() {
    // RUST_LOG filters; REPLICANT_LOG_FORMAT=json switches to JSON lines and
    // OTEL_EXPORTER_OTLP_ENDPOINT enables span export.  User-facing output
    // still goes through println!.
    let _telemetry = replicant_runtime::init_tracing("replicant-cli");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – cancelling and shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not cancel running actions");
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let shell = match repl::Shell::boot(&cfg) {
        Ok(shell) => shell,
        Err(e) => {
            println!("{}: {}", "Failed to start the simulator".red(), e);
            std::process::exit(1);
        }
    };
    println!(
        "  Simulator ready: {} m room, {} fps, replicant {} at the origin.",
        (cfg.room_half_extent * 2.0).to_string().yellow(),
        cfg.target_framerate.to_string().yellow(),
        repl::AGENT
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(shell, shutdown);
}

/// Write the default config and tell the user where it lives.
fn first_run() -> config::Config {
    let mut cfg = config::Config::default();
    config::apply_env_overrides(&mut cfg);
    println!();
    println!("  No configuration found; writing defaults.");
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___           ___         __  "#.bold().cyan());
    println!("{}", r#"  / _ \___ ___  / (_)______ / /_ "#.bold().cyan());
    println!("{}", r#" / , _/ -_) _ \/ / / __/ _ `/ __/"#.bold().cyan());
    println!("{}", r#"/_/|_|\__/ .__/_/_/\__/\_,_/\__/ "#.bold().cyan());
    println!("{}", r#"        /_/                      "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Replicant".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Humanoid action engine shell");
    println!();
}
