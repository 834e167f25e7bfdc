use crate::canvas::Geometry;
use crate::config::{Modality, Settings};
use crate::error::{Error, Result};
use crate::input::forward_keys;
use crate::logging;
use crate::mirror::{run_mirror, MirrorOptions};
use crate::store::CanvasRole;
use crate::supervisor::{Launcher, Supervisor};
use crate::view::{TerminalSession, TerminalView, MIRROR_GLYPH, WRITER_GLYPH};
use crate::writer::{run_writer, WriterOptions};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crossterm::tty::IsTty;
use log::{error, info, warn};
use std::io;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "shared-canvas", version, about = "A marker drawn on a canvas shared between processes")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch a writer and a mirror and stop both when either exits.
    Supervise {
        #[command(subcommand)]
        session: Session,
    },
    /// Move the marker. Normally started by `supervise`.
    Writer {
        #[command(subcommand)]
        modality: Modality,
    },
    /// Follow the marker. Normally started by `supervise`.
    Mirror,
}

#[derive(Debug, Subcommand)]
pub enum Session {
    #[command(flatten)]
    Run(Modality),
    /// Ask for a modality, run it, repeat until `quit`.
    Interactive,
}

/// Runs the selected role and returns the process exit code.
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    let settings = &cli.settings;
    let code = match cli.command {
        Commands::Supervise { session } => runtime.block_on(supervise(settings, session)),
        Commands::Writer { modality } => Ok(worker_exit(
            "writer",
            settings,
            runtime.block_on(writer(settings, modality)),
        )),
        Commands::Mirror => Ok(worker_exit(
            "mirror",
            settings,
            runtime.block_on(mirror(settings)),
        )),
    };
    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_timeout(Duration::from_millis(100));
    code
}

fn worker_exit(role: &str, settings: &Settings, result: Result<()>) -> i32 {
    match result {
        Ok(()) => {
            info!("{role} finished");
            0
        }
        Err(e) => {
            error!("{role} failed: {e}");
            eprintln!("{role} failed: {e}");
            let code = e.exit_code();
            info!(
                "{role} exit code {code}, log in {}",
                settings.log_dir.display()
            );
            code
        }
    }
}

fn start_logging(role: &str, settings: &Settings, echo: bool) -> Result<()> {
    logging::init(role, &settings.log_dir, settings.log_level, echo)
        .map(|path| info!("{role} logging to {}", path.display()))
        .map_err(|e| {
            Error::io(
                "starting logger",
                io::Error::new(io::ErrorKind::Other, format!("{e:#}")),
            )
        })
}

/// Keep the status line under the grid even on short terminals.
fn status_row() -> u16 {
    let grid_rows = Geometry::STANDARD.rows() as u16;
    TerminalSession::rows().saturating_sub(1).max(grid_rows)
}

async fn writer(settings: &Settings, modality: Modality) -> Result<()> {
    start_logging("writer", settings, false)?;
    let options = WriterOptions {
        geometry: Geometry::STANDARD,
        resources: settings.resources(CanvasRole::Creator),
        snapshot_path: settings.snapshot.clone(),
    };

    let _session = TerminalSession::start().map_err(|e| Error::io("preparing terminal", e))?;
    let view = TerminalView::new(io::stdout(), WRITER_GLYPH, status_row());
    let (keys, commands) = mpsc::channel(64);
    tokio::spawn(async move {
        if let Err(e) = forward_keys(tokio::io::stdin(), keys).await {
            warn!("keyboard input failed: {e}");
        }
    });
    run_writer(options, modality.peer_source(), view, commands).await
}

async fn mirror(settings: &Settings) -> Result<()> {
    start_logging("mirror", settings, false)?;
    let options = MirrorOptions {
        geometry: Geometry::STANDARD,
        resources: settings.resources(CanvasRole::Attacher),
        refresh: settings.refresh(),
    };

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| Error::io("installing signal handler", e))?;
    let _session = TerminalSession::start().map_err(|e| Error::io("preparing terminal", e))?;
    let view = TerminalView::new(io::stdout(), MIRROR_GLYPH, status_row());
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    };
    run_mirror(options, view, shutdown).await
}

async fn supervise(settings: &Settings, session: Session) -> anyhow::Result<i32> {
    logging::init("supervisor", &settings.log_dir, settings.log_level, true)?;
    let launcher = Launcher::current(settings)?;
    // Two full screen workers cannot share one terminal.
    if launcher.shares_terminal() && io::stdout().is_tty() {
        bail!("both workers would draw on this terminal; pass --terminal, e.g. --terminal \"xterm -e\"");
    }
    let supervisor = Supervisor::new(launcher, settings.resources(CanvasRole::Creator));

    match session {
        Session::Run(modality) => {
            let report = supervisor.run_session(&modality).await?;
            println!("{report}");
            Ok(report.class.code())
        }
        Session::Interactive => {
            let stdin = io::stdin();
            let reports = supervisor
                .run_interactive(stdin.lock(), &mut io::stdout())
                .await?;
            info!("interactive supervisor ran {} sessions", reports.len());
            Ok(0)
        }
    }
}

#[cfg(test)]
mod test {
    use crate::cli::{Cli, Commands, Session};
    use crate::config::Modality;
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_go_anywhere() {
        let cli = Cli::try_parse_from([
            "shared-canvas",
            "--canvas-name",
            "/c",
            "writer",
            "client",
            "--port",
            "9000",
            "--snapshot",
            "shot.bmp",
        ])
        .unwrap();
        assert_eq!(cli.settings.canvas_name, "/c");
        assert_eq!(cli.settings.snapshot, PathBuf::from("shot.bmp"));
        match cli.command {
            Commands::Writer { modality } => assert_eq!(
                modality,
                Modality::Client {
                    host: "localhost".to_string(),
                    port: 9000
                }
            ),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn supervise_accepts_modalities_and_interactive() {
        let cli = Cli::try_parse_from(["shared-canvas", "supervise", "server", "--port", "4242"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Supervise {
                session: Session::Run(Modality::Server { port: 4242 })
            }
        ));
        let cli = Cli::try_parse_from(["shared-canvas", "supervise", "interactive"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Supervise {
                session: Session::Interactive
            }
        ));
    }

    #[test]
    fn low_ports_are_a_usage_error() {
        assert!(Cli::try_parse_from(["shared-canvas", "writer", "server", "--port", "80"]).is_err());
    }

    #[test]
    fn worker_args_parse_back() {
        let cli = Cli::try_parse_from(["shared-canvas", "--log-level", "debug", "mirror"]).unwrap();
        let mut args = vec!["shared-canvas".to_string()];
        args.extend(cli.settings.worker_args());
        args.push("mirror".to_string());
        let again = Cli::try_parse_from(args).unwrap();
        assert_eq!(again.settings.log_level, cli.settings.log_level);
        assert_eq!(again.settings.canvas_name, cli.settings.canvas_name);
    }
}
