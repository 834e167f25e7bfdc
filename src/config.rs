use crate::link::PeerSource;
use crate::snapshot::DEFAULT_SNAPSHOT_PATH;
use crate::store::{CanvasRole, SharedResources, DEFAULT_CANVAS_NAME, DEFAULT_MUTEX_NAME};
use clap::{Args, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

pub const MIN_PORT: u16 = 1024;

/// Opens each worker in a window of the desktop's default terminal emulator.
pub const DEFAULT_TERMINAL: &str = "x-terminal-emulator -e";

/// Options shared by every role. The supervisor forwards them to the workers it launches.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Shared memory object holding the canvas.
    #[arg(long, global = true, default_value = DEFAULT_CANVAS_NAME, env = "SHARED_CANVAS_SHM")]
    pub canvas_name: String,

    /// Named semaphore guarding the canvas.
    #[arg(long, global = true, default_value = DEFAULT_MUTEX_NAME, env = "SHARED_CANVAS_SEM")]
    pub mutex_name: String,

    /// Directory for the per-role log files.
    #[arg(long, global = true, default_value = "log", env = "SHARED_CANVAS_LOG_DIR")]
    pub log_dir: PathBuf,

    #[arg(long, global = true, default_value = "info", env = "SHARED_CANVAS_LOG")]
    pub log_level: LevelFilter,

    /// Where a save writes the bitmap.
    #[arg(long, global = true, default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,

    /// Mirror refresh interval in milliseconds.
    #[arg(long, global = true, default_value_t = 20)]
    pub refresh_ms: u64,

    /// Command prefix used to open each worker in its own terminal, e.g. "konsole -e". An
    /// empty value runs both workers on the supervisor's stdio.
    #[arg(long, global = true, default_value = DEFAULT_TERMINAL, env = "SHARED_CANVAS_TERMINAL")]
    pub terminal: String,
}

impl Settings {
    pub fn resources(&self, role: CanvasRole) -> SharedResources {
        SharedResources::new(&self.canvas_name, &self.mutex_name, role)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(1))
    }

    /// Command line flags reproducing these settings in a worker. The terminal prefix only
    /// matters to the supervisor and is left out.
    pub fn worker_args(&self) -> Vec<String> {
        vec![
            "--canvas-name".to_string(),
            self.canvas_name.clone(),
            "--mutex-name".to_string(),
            self.mutex_name.clone(),
            "--log-dir".to_string(),
            self.log_dir.display().to_string(),
            "--log-level".to_string(),
            self.log_level.to_string(),
            "--snapshot".to_string(),
            self.snapshot.display().to_string(),
            "--refresh-ms".to_string(),
            self.refresh_ms.to_string(),
        ]
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas_name: DEFAULT_CANVAS_NAME.to_string(),
            mutex_name: DEFAULT_MUTEX_NAME.to_string(),
            log_dir: PathBuf::from("log"),
            log_level: LevelFilter::Info,
            snapshot: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            refresh_ms: 20,
            terminal: DEFAULT_TERMINAL.to_string(),
        }
    }
}

/// How the writer talks to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Modality {
    /// Keyboard input only.
    Local,
    /// Accept one peer and apply the moves it sends.
    Server {
        #[arg(long, value_parser = parse_port)]
        port: u16,
    },
    /// Connect to a server and send it every move.
    Client {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, value_parser = parse_port)]
        port: u16,
    },
}

impl Modality {
    pub fn peer_source(&self) -> Option<PeerSource> {
        match self {
            Modality::Local => None,
            Modality::Server { port } => Some(PeerSource::Listen(*port)),
            Modality::Client { host, port } => Some(PeerSource::Dial {
                host: host.clone(),
                port: *port,
            }),
        }
    }

    /// Subcommand and flags selecting this modality in a worker.
    pub fn worker_args(&self) -> Vec<String> {
        match self {
            Modality::Local => vec!["local".to_string()],
            Modality::Server { port } => {
                vec!["server".to_string(), "--port".to_string(), port.to_string()]
            }
            Modality::Client { host, port } => vec![
                "client".to_string(),
                "--host".to_string(),
                host.clone(),
                "--port".to_string(),
                port.to_string(),
            ],
        }
    }
}

pub fn parse_port(text: &str) -> Result<u16, String> {
    let port: u16 = text
        .trim()
        .parse()
        .map_err(|_| format!("`{text}` is not a port number"))?;
    if port < MIN_PORT {
        return Err(format!("port must be between {MIN_PORT} and 65535"));
    }
    Ok(port)
}

/// One answer at the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Run(Modality),
    Quit,
}

impl Choice {
    /// Accepts `local`, `server <port>`, `client <host> <port>`, `quit`.
    pub fn parse(line: &str) -> Result<Choice, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["local"] => Ok(Choice::Run(Modality::Local)),
            ["server", port] => Ok(Choice::Run(Modality::Server {
                port: parse_port(port)?,
            })),
            ["client", host, port] => Ok(Choice::Run(Modality::Client {
                host: host.to_string(),
                port: parse_port(port)?,
            })),
            ["quit"] | ["exit"] => Ok(Choice::Quit),
            _ => Err("expected `local`, `server <port>`, `client <host> <port>` or `quit`".into()),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::config::{parse_port, Choice, Modality, Settings};
    use crate::link::LinkRole;

    #[test]
    fn ports_below_1024_are_rejected() {
        assert_eq!(parse_port("9000"), Ok(9000));
        assert_eq!(parse_port("1024"), Ok(1024));
        assert_eq!(parse_port("65535"), Ok(65535));
        assert!(parse_port("1023").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("http").is_err());
    }

    #[test]
    fn parses_prompt_answers() {
        assert_eq!(Choice::parse("local"), Ok(Choice::Run(Modality::Local)));
        assert_eq!(
            Choice::parse("  server 9000 "),
            Ok(Choice::Run(Modality::Server { port: 9000 }))
        );
        assert_eq!(
            Choice::parse("client localhost 9000"),
            Ok(Choice::Run(Modality::Client {
                host: "localhost".to_string(),
                port: 9000
            }))
        );
        assert_eq!(Choice::parse("quit"), Ok(Choice::Quit));
        assert!(Choice::parse("server 80").is_err());
        assert!(Choice::parse("client localhost").is_err());
        assert!(Choice::parse("").is_err());
    }

    #[test]
    fn modality_selects_peer() {
        assert!(Modality::Local.peer_source().is_none());
        let server = Modality::Server { port: 9000 }.peer_source().unwrap();
        assert_eq!(server.role(), LinkRole::Server);
        let client = Modality::Client {
            host: "localhost".to_string(),
            port: 9000,
        };
        assert_eq!(client.peer_source().unwrap().role(), LinkRole::Client);
        assert_eq!(
            client.worker_args().join(" "),
            "client --host localhost --port 9000"
        );
    }

    #[test]
    fn worker_args_round_trip_the_settings() {
        let settings = Settings {
            canvas_name: "/canvas_x".to_string(),
            terminal: "xterm -e".to_string(),
            ..Settings::default()
        };
        let args = settings.worker_args();
        assert!(args.windows(2).any(|w| w == ["--canvas-name", "/canvas_x"]));
        assert!(args.windows(2).any(|w| w == ["--log-level", "INFO"]));
        assert!(!args.iter().any(|a| a.contains("xterm")));
    }
}
