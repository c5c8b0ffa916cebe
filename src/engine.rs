//! The per-frame driver.
//!
//! [`Engine`] ties the render core together. Every call to [`Engine::frame`]
//! runs the same steps:
//!
//! 1. Update scene objects and cameras
//! 2. Collect the scene's requests into the scheduler
//! 3. Execute the frame (auxiliary queue, then main queue)
//! 4. Age the resource cache and redraw progress, every `tick_duration_millis`
//! 5. Apply finished asset loads
//!
//! All mutation of the cache and the progress tracker happens in steps 4 and 5,
//! after the frame has been rendered.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use instant::Duration;

use crate::{
    backend::GpuBackend,
    bounds::attach_camera,
    cache::ResourceCache,
    camera::ViewCamera,
    config::EngineConfig,
    error::{RenderError, Result},
    loader::{AssetDecoder, AssetLoader, AssetTransport},
    progress::LoadProgressTracker,
    scene::{ObjectId, Scene, SceneObject},
    scheduler::{FrameStats, RenderScheduler},
};

/// Initialises `env_logger`. Safe to call more than once.
pub fn init_logging() {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }
}

/// What happened during one [`Engine::frame`].
#[derive(Debug, Default)]
pub struct FrameReport {
    pub stats: FrameStats,
    /// Requests the scheduler refused at submission.
    pub rejected: Vec<RenderError>,
    /// Set when the backend aborted the frame.
    pub backend_error: Option<RenderError>,
    pub load_failures: Vec<RenderError>,
    /// Whether the cache and tracker were ticked this frame.
    pub ticked: bool,
}

impl FrameReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.backend_error.is_none() && self.load_failures.is_empty()
    }
}

pub struct Engine<B: GpuBackend, D: AssetDecoder> {
    config: EngineConfig,
    scheduler: RenderScheduler<B>,
    scene: Scene,
    cameras: Vec<Rc<RefCell<dyn ViewCamera>>>,
    cache: ResourceCache<String, D::Output>,
    tracker: LoadProgressTracker,
    loader: AssetLoader<D>,
    time_since_tick: Duration,
}

impl<B: GpuBackend, D: AssetDecoder> Engine<B, D> {
    pub fn new(
        config: EngineConfig,
        backend: B,
        transport: Arc<dyn AssetTransport>,
        decoder: D,
    ) -> anyhow::Result<Self> {
        let mut scheduler = RenderScheduler::new(backend);
        scheduler.set_surface_clear(Some(config.clear_colour));
        let loader = AssetLoader::new(transport, decoder, config.loader_worker_threads)?;
        Ok(Self {
            scheduler,
            scene: Scene::new(),
            cameras: Vec::new(),
            cache: ResourceCache::new(config.default_ttl),
            tracker: LoadProgressTracker::new(config.progress_redraw_interval),
            loader,
            time_since_tick: Duration::ZERO,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Changes the configuration at runtime.
    ///
    /// `loader_worker_threads` only takes effect for a new engine.
    pub fn configure(&mut self, f: impl FnOnce(&mut EngineConfig)) {
        f(&mut self.config);
        self.scheduler
            .set_surface_clear(Some(self.config.clear_colour));
        self.cache.set_default_ttl(self.config.default_ttl);
        self.tracker
            .set_redraw_interval(self.config.progress_redraw_interval);
    }

    pub fn scheduler(&self) -> &RenderScheduler<B> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut RenderScheduler<B> {
        &mut self.scheduler
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.scheduler.backend_mut()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn cache(&self) -> &ResourceCache<String, D::Output> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResourceCache<String, D::Output> {
        &mut self.cache
    }

    pub fn tracker(&self) -> &LoadProgressTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut LoadProgressTracker {
        &mut self.tracker
    }

    pub fn loader(&self) -> &AssetLoader<D> {
        &self.loader
    }

    pub fn add_object(&mut self, object: Box<dyn SceneObject>) -> Result<ObjectId> {
        self.scene.add(object)
    }

    /// Removes the object. Its resources are destroyed once no queued
    /// request refers to them anymore.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        self.scene.remove(id, &mut self.scheduler)
    }

    /// Fits `camera` to the scene bounds now and whenever they change, and
    /// updates it every frame.
    pub fn add_camera<C: ViewCamera + 'static>(&mut self, camera: Rc<RefCell<C>>) {
        attach_camera(self.scene.broadcaster(), &camera);
        self.cameras.push(camera);
    }

    /// Starts loading `id` unless it is cached or already loading.
    pub fn load(&mut self, id: &str) -> bool {
        if self.cache.contains(&id.to_owned()) {
            return false;
        }
        self.loader.request(id, &mut self.tracker)
    }

    pub fn cancel_load(&mut self, id: &str) -> bool {
        self.loader.cancel(id, &mut self.tracker)
    }

    /// Cached asset under `id`. Refreshes its TTL.
    pub fn asset(&mut self, id: &str) -> Option<&D::Output> {
        self.cache.get(&id.to_owned())
    }

    pub fn frame(&mut self, dt: Duration) -> FrameReport {
        let mut report = FrameReport::default();

        self.scene.update(dt);
        for camera in &self.cameras {
            camera.borrow_mut().update(dt);
        }

        report.rejected = self.scene.submit_to(&mut self.scheduler);
        match self.scheduler.run_frame() {
            Ok(stats) => report.stats = stats,
            Err(err) => report.backend_error = Some(err),
        }

        self.time_since_tick += dt;
        if self.time_since_tick >= Duration::from_millis(self.config.tick_duration_millis) {
            let elapsed = self.time_since_tick;
            let evicted = self.cache.tick(elapsed);
            if evicted > 0 {
                log::debug!("evicted {} cached assets", evicted);
            }
            self.tracker.tick(elapsed);
            self.time_since_tick = Duration::ZERO;
            report.ticked = true;
        }

        report.load_failures = self.loader.poll(&mut self.cache, &mut self.tracker);
        report
    }

    /// Tears everything down. The engine renders nothing afterwards.
    pub fn dispose(&mut self) {
        for camera in self.cameras.drain(..) {
            camera.borrow_mut().dispose();
        }
        self.loader.cancel_all(&mut self.tracker);
        self.scene.dispose(&mut self.scheduler);
        self.scheduler.dispose();
        self.cache.dispose();
    }
}
