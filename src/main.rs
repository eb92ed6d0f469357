//! plotembed - Line-driven host for an embedded plotting tool
//!
//! Stands in for the GUI: the window to embed into is given on the command
//! line, and each line typed on stdin acts as the launch/send trigger.
//!
//! Host commands:
//! - `:launch` - Start the tool
//! - `:attached` - Report that the tool's window was plugged in
//! - `:status` - Print the controller status
//! - `:stop` - Terminate the tool
//! - `:quit` - Stop and exit
//!
//! Any other line goes through the single trigger: it launches when nothing is
//! running and is sent to the tool otherwise.

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use plotembed_rs::{
    config::{AppConfig, LaunchProfile},
    surface::{StaticSurface, WindowHandle},
    ControllerEvent, EmbeddingController,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// UI frame interval
const FRAME: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "plotembed")]
#[command(about = "Embed an interactive plotting tool into a host window", long_about = None)]
struct Cli {
    /// Native id of the window to embed into (hex `0x...` or decimal)
    #[arg(short, long, env = "PLOTEMBED_WINDOW")]
    window_id: String,

    /// Launch profile (TOML); defaults to the saved config
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Override the program to launch
    #[arg(long)]
    program: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref())?;

    tracing::info!("Starting plotembed");

    let mut config = AppConfig::load_or_default();
    if let Some(path) = &cli.profile {
        config.launch = LaunchProfile::from_toml_file(path)
            .with_context(|| format!("loading profile {}", path.display()))?;
    }
    if let Some(program) = cli.program {
        config.launch.program = program;
    }

    let handle = WindowHandle::parse_token(&cli.window_id)?;
    let mut controller = EmbeddingController::new(Box::new(StaticSurface(handle.id())), config);
    println!("[{}] type a line or :launch", controller.trigger_label());

    // Stdin blocks, so it gets its own thread; the loop below plays the UI thread
    let (line_tx, line_rx) = unbounded::<String>();
    std::thread::Builder::new()
        .name("plotembed-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("spawning stdin reader")?;

    loop {
        match line_rx.recv_timeout(FRAME) {
            Ok(line) => {
                if !handle_line(&mut controller, line.trim_end()) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for event in controller.poll_events() {
            print_event(&event);
        }
    }

    tracing::info!("Shutting down...");
    controller.stop();
    for event in controller.poll_events() {
        print_event(&event);
    }

    Ok(())
}

/// Returns false when the host should exit
fn handle_line(controller: &mut EmbeddingController, line: &str) -> bool {
    let result = match line {
        ":quit" => return false,
        ":launch" => controller.on_launch_triggered(),
        ":stop" => {
            controller.stop();
            Ok(())
        }
        ":attached" => {
            controller.on_foreign_window_attached();
            Ok(())
        }
        ":status" => {
            println!("{}", controller.status());
            Ok(())
        }
        text => controller.on_trigger(text).map(|_| ()),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
    }
    true
}

fn print_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::StateChanged { to, .. } => println!("-- {}", to),
        ControllerEvent::Launched { session_id, pid } => {
            println!("-- session {} started (pid {})", session_id, pid)
        }
        ControllerEvent::Attached { session_id } => println!("-- session {} attached", session_id),
        ControllerEvent::AttachmentTimeout { waited, .. } => {
            println!("-- window not attached after {:?}, commands are still queued", waited)
        }
        ControllerEvent::Output { stream, text } => print!("[{}] {}", stream, text),
        ControllerEvent::Diagnostic(message) => eprintln!("warning: {}", message),
        ControllerEvent::Exited {
            status,
            undelivered,
            ..
        } => {
            match status {
                Some(status) => println!("-- exited: {}", status),
                None => println!("-- exited"),
            }
            if !undelivered.is_empty() {
                println!("-- {} command(s) not delivered", undelivered.len());
            }
        }
        ControllerEvent::Failed {
            error, undelivered, ..
        } => {
            eprintln!("error: {}", error);
            for command in undelivered {
                eprintln!("   not delivered: {}", command);
            }
        }
    }
}

fn init_logging(
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plotembed_rs=debug"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .context("log file path has no file name")?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}
