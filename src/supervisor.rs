use crate::config::{Choice, Modality, Settings};
use crate::error::ExitClass;
use crate::mutex::NamedMutex;
use crate::store::SharedResources;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fmt;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    Writer,
    Mirror,
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Worker::Writer => write!(f, "writer"),
            Worker::Mirror => write!(f, "mirror"),
        }
    }
}

/// Outcome of one session: which worker went first and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub first_exit: Worker,
    pub class: ExitClass,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first_exit, self.class.describe())
    }
}

/// Builds the worker command lines.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    prefix: Vec<String>,
    global_args: Vec<String>,
}

impl Launcher {
    /// `prefix` is split on whitespace and put in front of the program, e.g. `xterm -e`.
    pub fn new(program: impl Into<PathBuf>, prefix: Option<&str>, global_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix: prefix
                .map(|p| p.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            global_args,
        }
    }

    /// Relaunches this executable with the given settings.
    pub fn current(settings: &Settings) -> Result<Self> {
        let program = std::env::current_exe().context("locating own executable")?;
        Ok(Self::new(
            program,
            Some(settings.terminal.as_str()),
            settings.worker_args(),
        ))
    }

    /// Without a terminal prefix both workers inherit the supervisor's terminal.
    pub fn shares_terminal(&self) -> bool {
        self.prefix.is_empty()
    }

    pub fn command(&self, worker: Worker, modality: &Modality) -> Command {
        let mut command = match self.prefix.split_first() {
            Some((launcher, rest)) => {
                let mut command = Command::new(launcher);
                command.args(rest).arg(&self.program);
                command
            }
            None => Command::new(&self.program),
        };
        command.args(&self.global_args);
        match worker {
            Worker::Writer => {
                command.arg("writer").args(modality.worker_args());
            }
            Worker::Mirror => {
                command.arg("mirror").stdin(Stdio::null());
            }
        }
        command.kill_on_drop(true);
        command
    }
}

/// Starts both workers, waits for the first one to exit and kills the other.
pub async fn supervise(mut writer: Command, mut mirror: Command) -> Result<SessionReport> {
    let mut writer = writer.spawn().context("launching writer")?;
    let mut mirror = match mirror.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("mirror failed to launch, stopping writer");
            let _ = writer.start_kill();
            let _ = writer.wait().await;
            return Err(e).context("launching mirror");
        }
    };
    info!(
        "launched writer (pid {:?}) and mirror (pid {:?})",
        writer.id(),
        mirror.id()
    );

    let (first_exit, status) = tokio::select! {
        status = writer.wait() => (Worker::Writer, status),
        status = mirror.wait() => (Worker::Mirror, status),
    };
    let status = status.with_context(|| format!("waiting for {first_exit}"))?;
    info!("{first_exit} exited with {status}");

    let other = match first_exit {
        Worker::Writer => &mut mirror,
        Worker::Mirror => &mut writer,
    };
    if let Err(e) = other.start_kill() {
        debug!("kill after {first_exit} exit: {e}");
    }
    let other_status = other.wait().await.context("waiting for second worker")?;
    debug!("second worker ended with {other_status}");

    let class = ExitClass::from_status(status);
    Ok(SessionReport { first_exit, class })
}

pub struct Supervisor {
    launcher: Launcher,
    resources: SharedResources,
}

impl Supervisor {
    pub fn new(launcher: Launcher, resources: SharedResources) -> Self {
        Self {
            launcher,
            resources,
        }
    }

    /// One writer/mirror pair. The mutex is created before anything is launched, and both
    /// global names are removed once the workers are gone.
    pub async fn run_session(&self, modality: &Modality) -> Result<SessionReport> {
        let mutex = NamedMutex::create(&self.resources.mutex_name)
            .with_context(|| format!("creating mutex {}", self.resources.mutex_name))?;
        mutex.close().context("closing mutex handle")?;
        info!("session starting in {modality:?} mode");

        let outcome = supervise(
            self.launcher.command(Worker::Writer, modality),
            self.launcher.command(Worker::Mirror, modality),
        )
        .await;
        let reclaim = self
            .resources
            .reclaim()
            .context("removing shared canvas names");

        let report = outcome?;
        reclaim?;
        info!("session over: {report}");
        Ok(report)
    }

    /// Prompts for a modality, runs it, and repeats until `quit` or end of input.
    pub async fn run_interactive<R: BufRead, W: Write>(
        &self,
        mut input: R,
        output: &mut W,
    ) -> Result<Vec<SessionReport>> {
        let mut reports = Vec::new();
        loop {
            write!(
                output,
                "mode (local | server <port> | client <host> <port> | quit)> "
            )?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line).context("reading prompt answer")? == 0 {
                return Ok(reports);
            }
            match Choice::parse(&line) {
                Ok(Choice::Quit) => return Ok(reports),
                Ok(Choice::Run(modality)) => {
                    let report = self.run_session(&modality).await?;
                    writeln!(output, "{report}")?;
                    reports.push(report);
                }
                Err(message) => writeln!(output, "{message}")?,
            }
        }
    }
}
