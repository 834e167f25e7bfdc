use crate::canvas::{Geometry, Pixel, Raster};
use crate::error::Result;
use crate::mutex::{self, MutexGuard, NamedMutex};
use crate::shm::{self, ShmRegion};
use log::debug;

pub const DEFAULT_CANVAS_NAME: &str = "/SHARED_IMAGE";
pub const DEFAULT_MUTEX_NAME: &str = "/sem_SHARED_IMAGE";

/// Who initialises the canvas content. Both roles open the region create-if-missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasRole {
    /// Draws the initial marker; the writer.
    Creator,
    /// Only reads; the mirror.
    Attacher,
}

/// Names of the global objects shared by a writer/mirror pair, plus who owns what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedResources {
    pub canvas_name: String,
    pub mutex_name: String,
    pub role: CanvasRole,
    /// Remove the canvas name when this process is done with it.
    pub unlink_on_close: bool,
}

impl SharedResources {
    pub fn new(canvas_name: &str, mutex_name: &str, role: CanvasRole) -> Self {
        Self {
            canvas_name: canvas_name.to_string(),
            mutex_name: mutex_name.to_string(),
            role,
            unlink_on_close: true,
        }
    }

    pub fn with_role(&self, role: CanvasRole) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }

    /// Removes both global names. Used by the supervisor once its workers are gone.
    pub fn reclaim(&self) -> Result<()> {
        let canvas = shm::unlink(&self.canvas_name);
        mutex::unlink(&self.mutex_name)?;
        canvas
    }
}

impl Default for SharedResources {
    fn default() -> Self {
        Self::new(DEFAULT_CANVAS_NAME, DEFAULT_MUTEX_NAME, CanvasRole::Creator)
    }
}

/// The shared canvas together with the mutex guarding it. The pixels are only reachable
/// through [CanvasStore::lock].
pub struct CanvasStore {
    region: ShmRegion,
    mutex: NamedMutex,
    geometry: Geometry,
    resources: SharedResources,
}

impl CanvasStore {
    pub fn open(resources: &SharedResources, geometry: Geometry) -> Result<Self> {
        let region = ShmRegion::open(&resources.canvas_name, geometry.byte_len())?;
        let mutex = match NamedMutex::open(&resources.mutex_name) {
            Ok(mutex) => mutex,
            Err(e) => {
                let _ = region.close(resources.unlink_on_close);
                return Err(e);
            }
        };
        debug!(
            "attached canvas {} as {:?}",
            resources.canvas_name, resources.role
        );
        Ok(Self {
            region,
            mutex,
            geometry,
            resources: resources.clone(),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn role(&self) -> CanvasRole {
        self.resources.role
    }

    /// Blocks until the canvas is ours. Release the guard before any other blocking work.
    pub fn lock(&mut self) -> Result<CanvasGuard<'_>> {
        let lock = self.mutex.acquire()?;
        // SAFETY: the region holds `geometry.byte_len()` bytes, `Pixel` is four `u8`s so any
        // address is aligned, and the mutex keeps other processes out while the slice lives.
        let pixels = unsafe {
            std::slice::from_raw_parts_mut(
                self.region.as_ptr().cast::<Pixel>(),
                self.geometry.pixel_count(),
            )
        };
        Ok(CanvasGuard {
            pixels,
            geometry: self.geometry,
            lock,
        })
    }

    /// Unmaps the canvas, unlinks it if configured to, and closes the mutex handle.
    pub fn close(self) -> Result<()> {
        let region = self.region.close(self.resources.unlink_on_close);
        let mutex = self.mutex.close();
        region.and(mutex)
    }
}

/// Exclusive access to the shared pixels.
pub struct CanvasGuard<'a> {
    pixels: &'a mut [Pixel],
    geometry: Geometry,
    lock: MutexGuard<'a>,
}

impl CanvasGuard<'_> {
    pub fn release(self) -> Result<()> {
        self.lock.release()
    }
}

impl Raster for CanvasGuard<'_> {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn pixels(&self) -> &[Pixel] {
        self.pixels
    }

    fn pixels_mut(&mut self) -> &mut [Pixel] {
        self.pixels
    }
}

#[cfg(test)]
mod test {
    use crate::canvas::{blob_count, Geometry, GridPos, Raster, Surface};
    use crate::store::{CanvasRole, CanvasStore, SharedResources};

    const SMALL: Geometry = Geometry {
        width: 16,
        height: 10,
        scale: 5,
        radius: 4,
    };

    fn resources(name: &str) -> SharedResources {
        let id = std::process::id();
        SharedResources::new(
            &format!("/shared_canvas_test_{id}_{name}"),
            &format!("/shared_canvas_test_{id}_{name}_sem"),
            CanvasRole::Creator,
        )
    }

    #[test]
    fn writes_are_visible_to_another_attachment() {
        let resources = resources("store_visible");
        let mut writer = CanvasStore::open(&resources, SMALL).unwrap();
        let mut reader =
            CanvasStore::open(&resources.with_role(CanvasRole::Attacher), SMALL).unwrap();

        let mut guard = writer.lock().unwrap();
        guard.erase();
        guard.draw_marker(GridPos::new(2, 1));
        guard.release().unwrap();

        let mut copy = Surface::new(SMALL).unwrap();
        let guard = reader.lock().unwrap();
        copy.copy_from(&guard);
        guard.release().unwrap();

        assert_eq!(blob_count(&copy), 1);
        assert!(!copy.pixel(10, 5).is_background());

        reader.close().unwrap();
        writer.close().unwrap();
        resources.reclaim().unwrap();
    }

    #[test]
    fn guard_holds_the_mutex() {
        let resources = resources("store_guard");
        let mut store = CanvasStore::open(&resources, SMALL).unwrap();
        let other = crate::mutex::NamedMutex::open(&resources.mutex_name).unwrap();

        let guard = store.lock().unwrap();
        assert!(other.try_acquire().unwrap().is_none());
        guard.release().unwrap();
        assert!(other.try_acquire().unwrap().is_some());

        other.close().unwrap();
        store.close().unwrap();
        resources.reclaim().unwrap();
    }

    #[test]
    fn reclaim_tolerates_missing_names() {
        let resources = resources("store_reclaim");
        resources.reclaim().unwrap();
    }
}
