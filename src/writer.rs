use crate::canvas::{Geometry, GridPos, Raster, Surface};
use crate::error::{Error, Result};
use crate::input::Command;
use crate::link::{LinkRole, LinkSender, PeerSource};
use crate::protocol::EventCode;
use crate::snapshot;
use crate::store::{CanvasRole, CanvasStore, SharedResources};
use crate::view::TerminalView;
use log::{debug, info, warn};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

pub struct WriterOptions {
    pub geometry: Geometry,
    pub resources: SharedResources,
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    AwaitingPeer,
    Running,
    Cleanup,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Server,
    Client,
}

impl From<LinkRole> for Mode {
    fn from(role: LinkRole) -> Self {
        match role {
            LinkRole::Server => Mode::Server,
            LinkRole::Client => Mode::Client,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

enum Event {
    Command(Command, Origin),
    Unknown(EventCode),
    LocalClosed,
    PeerClosed,
}

/// Owns the marker position. Every change goes to the local surface and view first and to the
/// shared canvas second.
pub struct Writer<W: Write> {
    mode: Mode,
    phase: Phase,
    geometry: Geometry,
    position: GridPos,
    surface: Surface,
    view: TerminalView<W>,
    store: CanvasStore,
    link: Option<LinkSender>,
    remote: Option<mpsc::Receiver<Result<EventCode>>>,
    snapshot_path: PathBuf,
}

impl<W: Write> Writer<W> {
    /// Allocates the local surface, attaches the canvas and publishes the marker at the centre.
    pub fn initialize(options: WriterOptions, mode: Mode, view: TerminalView<W>) -> Result<Self> {
        info!("writer initializing in {mode:?} mode");
        let geometry = options.geometry;
        let surface = Surface::new(geometry)?;
        let resources = options.resources.with_role(CanvasRole::Creator);
        let store = CanvasStore::open(&resources, geometry)?;

        let mut writer = Self {
            mode,
            phase: Phase::Initializing,
            geometry,
            position: geometry.center(),
            surface,
            view,
            store,
            link: None,
            remote: None,
            snapshot_path: options.snapshot_path,
        };
        if let Err(e) = writer.render_local().and_then(|_| writer.publish()) {
            let _ = writer.store.close();
            return Err(e);
        }
        Ok(writer)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn position(&self) -> GridPos {
        self.position
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn view(&self) -> &TerminalView<W> {
        &self.view
    }

    fn enter(&mut self, phase: Phase) {
        info!("writer {:?} -> {phase:?}", self.phase);
        self.phase = phase;
    }

    /// Blocks until the single peer is there.
    pub async fn await_peer(&mut self, source: PeerSource) -> Result<()> {
        self.enter(Phase::AwaitingPeer);
        let link = source.establish().await?;
        info!("linked with {}", link.peer());
        let (sender, events) = link.split();
        self.link = Some(sender);
        self.remote = Some(events);
        Ok(())
    }

    /// Serves local and remote events in arrival order until a quit, the end of local input,
    /// or the peer hanging up.
    pub async fn run(&mut self, input: &mut mpsc::Receiver<Command>) -> Result<()> {
        self.enter(Phase::Running);
        loop {
            let event = tokio::select! {
                command = input.recv() => match command {
                    Some(command) => Event::Command(command, Origin::Local),
                    None => Event::LocalClosed,
                },
                code = next_remote(&mut self.remote) => match code {
                    Some(Ok(code)) => match code.command() {
                        Some(command) => Event::Command(command, Origin::Remote),
                        None => Event::Unknown(code),
                    },
                    Some(Err(e)) => return Err(e),
                    None => Event::PeerClosed,
                },
            };

            match event {
                Event::Command(command, origin) => {
                    if self.handle(command, origin).await? == Flow::Stop {
                        return Ok(());
                    }
                }
                Event::Unknown(code) => debug!("ignoring unknown event {code:?}"),
                Event::LocalClosed => {
                    info!("local input closed");
                    return Ok(());
                }
                Event::PeerClosed => {
                    info!("peer hung up");
                    self.remote = None;
                    return Ok(());
                }
            }
        }
    }

    /// Applies one command. Remote commands are never sent back. Local moves reach the peer
    /// only from a client, local saves from either end.
    pub async fn handle(&mut self, command: Command, origin: Origin) -> Result<Flow> {
        let local = origin == Origin::Local;
        match command {
            Command::Quit => return Ok(Flow::Stop),
            Command::Move(_) if origin == Origin::Local && self.mode == Mode::Server => {
                debug!("server takes its moves from the peer, ignoring {command:?}");
            }
            Command::Move(direction) => {
                self.position = self.position.step(direction, &self.geometry);
                debug!("{origin:?} move {direction:?} to {:?}", self.position);
                self.view.clear_status();
                self.render_local()?;
                if local && self.mode == Mode::Client {
                    self.transmit(command).await?;
                }
                self.publish()?;
            }
            Command::Save => {
                self.save_snapshot()?;
                if local && self.mode != Mode::Local {
                    self.transmit(command).await?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn render_local(&mut self) -> Result<()> {
        self.surface.erase();
        self.surface.draw_marker(self.position);
        self.view
            .render(Some(self.position))
            .map_err(|e| Error::io("rendering view", e))
    }

    /// Replaces whatever is on the shared canvas with the marker at the current position.
    fn publish(&mut self) -> Result<()> {
        let mut canvas = self.store.lock()?;
        canvas.erase();
        canvas.draw_marker(self.position);
        canvas.release()
    }

    async fn transmit(&mut self, command: Command) -> Result<()> {
        if let (Some(link), Some(code)) = (self.link.as_mut(), EventCode::for_command(command)) {
            link.send(code).await?;
        }
        Ok(())
    }

    /// A failed save is shown to the user but does not stop the writer.
    fn save_snapshot(&mut self) -> Result<()> {
        match snapshot::save(&self.surface, &self.snapshot_path) {
            Ok(()) => {
                self.view.set_status("Image saved successfully!");
            }
            Err(e) => {
                warn!("saving {} failed: {e:#}", self.snapshot_path.display());
                self.view.set_status(format!("Saving image failed: {e}"));
            }
        }
        self.view
            .render(Some(self.position))
            .map_err(|e| Error::io("rendering view", e))
    }

    /// Releases everything, reporting the first failure.
    pub async fn finish(mut self) -> Result<()> {
        self.enter(Phase::Cleanup);
        let view = self.view.clear().map_err(|e| Error::io("clearing view", e));
        let store = self.store.close();
        let link = match self.link.take() {
            Some(link) => link.close().await,
            None => Ok(()),
        };
        info!("writer {:?} -> {:?}", Phase::Cleanup, Phase::Terminated);
        store.and(link).and(view)
    }
}

async fn next_remote(
    remote: &mut Option<mpsc::Receiver<Result<EventCode>>>,
) -> Option<Result<EventCode>> {
    match remote {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Whole writer lifecycle. The first error wins, cleanup always runs once the canvas is
/// attached.
pub async fn run_writer<W: Write>(
    options: WriterOptions,
    peer: Option<PeerSource>,
    view: TerminalView<W>,
    mut input: mpsc::Receiver<Command>,
) -> Result<()> {
    let mode = peer.as_ref().map_or(Mode::Local, |p| p.role().into());
    let mut writer = Writer::initialize(options, mode, view)?;
    let outcome = drive(&mut writer, peer, &mut input).await;
    let cleanup = writer.finish().await;
    outcome.and(cleanup)
}

async fn drive<W: Write>(
    writer: &mut Writer<W>,
    peer: Option<PeerSource>,
    input: &mut mpsc::Receiver<Command>,
) -> Result<()> {
    if let Some(peer) = peer {
        writer.await_peer(peer).await?;
    }
    writer.run(input).await
}
