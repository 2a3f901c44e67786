//! `simbridge` – command line entry point for the simulator bridge.
//!
//! 1. Loads `~/.simbridge/config.toml`, writing the defaults on first run.
//! 2. Binds one session with the hover policy and a frame-logging image sink.
//! 3. Waits for the simulator, runs until either channel terminates or
//!    **Ctrl-C** requests a stop, then prints the session report.

mod config;

use std::process::ExitCode;

use colored::Colorize;
use simbridge_policy::{FrameLogSink, HoverPolicy};
use simbridge_runtime::{LogFormat, Session, init_tracing};
use simbridge_types::{SessionReport, Termination};
use tracing::{error, warn};

fn main() -> ExitCode {
    // Tracing first: the OTLP provider must exist before the runtime does.
    let _otel_guard = init_tracing("simbridge");

    print_banner();

    let cfg = load_or_create_config();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build Tokio runtime");
            println!("{}: {}", "Runtime error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let session = match runtime.block_on(Session::bind(
        cfg.bridge.clone(),
        HoverPolicy::new(cfg.hover_level),
        FrameLogSink::new(cfg.log_every_frames),
    )) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "session setup failed");
            println!("{}: {}", "Setup error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "  Listening: telemetry {}  camera {}  →  motors {}:{}",
        format!("udp/{}", cfg.bridge.telemetry_port).bold(),
        format!("tcp/{}", cfg.bridge.image_port).bold(),
        cfg.bridge.host,
        cfg.bridge.motor_port
    );
    println!("  {}\n", "Start the simulator now.".cyan());

    let handle = session.handle();
    if let Err(e) = ctrlc::set_handler(move || {
        if handle.stop() {
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping session …".yellow().bold());
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the session can only end on its own");
    }

    let report = runtime.block_on(session.start());

    if LogFormat::from_env() == LogFormat::Json {
        match serde_json::to_string(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!(error = %e, "failed to serialise session report");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    if is_failure(&report) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn load_or_create_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

/// A transport error on either channel makes the process exit non-zero.
fn is_failure(report: &SessionReport) -> bool {
    matches!(
        report.telemetry.termination,
        Some(Termination::TransportError(_))
    ) || matches!(report.image.termination, Some(Termination::TransportError(_)))
}

fn describe(termination: &Option<Termination>) -> String {
    match termination {
        Some(Termination::Sentinel) => "simulator finished".green().to_string(),
        Some(Termination::Timeout) => "timed out".yellow().to_string(),
        Some(Termination::PeerClosed) => "simulator disconnected".yellow().to_string(),
        Some(Termination::Stopped) => "stopped".yellow().to_string(),
        Some(Termination::TransportError(e)) => format!("transport error: {e}").red().to_string(),
        None => "still running".dimmed().to_string(),
    }
}

fn print_report(report: &SessionReport) {
    let elapsed = report.ended_at - report.started_at;
    println!();
    println!("{}", "  Session report".bold().cyan());
    println!("  {:<12} {}", "id", report.id.to_string().dimmed());
    println!(
        "  {:<12} {:.3} s",
        "duration",
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    println!(
        "  {:<12} {} packets, {} commands, {} malformed, {} send failures – {}",
        "telemetry",
        report.telemetry.packets_received,
        report.telemetry.commands_sent,
        report.telemetry.malformed_discarded,
        report.telemetry.send_failures,
        describe(&report.telemetry.termination)
    );
    println!(
        "  {:<12} {} frames, {} bytes – {}",
        "camera",
        report.image.frames_delivered,
        report.image.bytes_received,
        describe(&report.image.termination)
    );
    println!();
}

fn print_banner() {
    println!();
    println!("{}", r#"   _____ _           ____       _     __         "#.bold().cyan());
    println!("{}", r#"  / ___/(_)___ ___  / __ )_____(_)___/ /___ ____ "#.bold().cyan());
    println!("{}", r#"  \__ \/ / __ `__ \/ __  / ___/ / __  / __ `/ _ \"#.bold().cyan());
    println!("{}", r#" ___/ / / / / / / / /_/ / /  / / /_/ / /_/ /  __/"#.bold().cyan());
    println!("{}", r#"/____/_/_/ /_/ /_/_____/_/  /_/\__,_/\__, /\___/ "#.bold().cyan());
    println!("{}", r#"                                    /____/       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "SimBridge".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Flight simulator ↔ controller bridge");
    println!();
}
