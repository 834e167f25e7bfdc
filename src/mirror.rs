use crate::canvas::{Geometry, GridPos, Raster, Surface};
use crate::detect::find_marker;
use crate::error::{Error, Result};
use crate::store::{CanvasRole, CanvasStore, SharedResources};
use crate::view::TerminalView;
use log::{debug, info};
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

pub struct MirrorOptions {
    pub geometry: Geometry,
    pub resources: SharedResources,
    pub refresh: Duration,
}

/// Periodically copies the shared canvas into a local surface and shows where the marker is.
pub struct Mirror<W: Write> {
    surface: Surface,
    store: CanvasStore,
    view: TerminalView<W>,
    refresh: Duration,
    last: Option<Option<GridPos>>,
}

impl<W: Write> Mirror<W> {
    pub fn attach(options: MirrorOptions, view: TerminalView<W>) -> Result<Self> {
        let surface = Surface::new(options.geometry)?;
        let resources = options.resources.with_role(CanvasRole::Attacher);
        let store = CanvasStore::open(&resources, options.geometry)?;
        info!("mirror attached to {}", resources.canvas_name);
        Ok(Self {
            surface,
            store,
            view,
            refresh: options.refresh,
            last: None,
        })
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn view(&self) -> &TerminalView<W> {
        &self.view
    }

    /// One refresh cycle. The view is only redrawn when the detected position changes.
    pub fn refresh(&mut self) -> Result<Option<GridPos>> {
        {
            let canvas = self.store.lock()?;
            self.surface.erase();
            self.surface.copy_from(&canvas);
            canvas.release()?;
        }
        let found = find_marker(&self.surface);
        if self.last != Some(found) {
            debug!("marker now at {found:?}");
            self.view
                .render(found)
                .map_err(|e| Error::io("rendering view", e))?;
            self.last = Some(found);
        }
        Ok(found)
    }

    /// Refreshes on every tick until `shutdown` resolves or a refresh fails.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<()> {
        let mut ticks = interval(self.refresh);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("mirror asked to stop");
                    return Ok(());
                }
                _ = ticks.tick() => {
                    self.refresh()?;
                }
            }
        }
    }

    pub fn finish(mut self) -> Result<()> {
        let view = self.view.clear().map_err(|e| Error::io("clearing view", e));
        self.store.close().and(view)
    }
}

pub async fn run_mirror<W: Write, F: Future<Output = ()>>(
    options: MirrorOptions,
    view: TerminalView<W>,
    shutdown: F,
) -> Result<()> {
    let mut mirror = Mirror::attach(options, view)?;
    let outcome = mirror.run(shutdown).await;
    let cleanup = mirror.finish();
    outcome.and(cleanup)
}
