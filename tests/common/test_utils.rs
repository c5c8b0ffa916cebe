#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    rc::Rc,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use flow_viewer::{
    backend::{
        BackendError, BufferHandle, BufferUsage, FramebufferHandle, GpuBackend, ProgramHandle,
        ResourceId, TextureHandle,
    },
    cache::{Disposable, ResourceCache},
    data_structures::aabb::Aabb,
    error::{RenderError, Result},
    loader::{AssetDecoder, AssetLoader, AssetTransport, ProgressSink},
    progress::{LoadProgressTracker, ProgressPresenter, ProgressState},
    render::{BatchKey, BatchRequest, Render, RenderState, UniformValue, VertexAttribute},
    scene::SceneObject,
    scheduler::ReleaseResources,
};
use futures::future::BoxFuture;
use instant::{Duration, Instant};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Every call a [`RecordingBackend`] received, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Create(ResourceId),
    Destroy(ResourceId),
    BindState(RenderState),
    BindProgram(ProgramHandle),
    SetUniform(String, UniformValue),
    BindAttribute {
        buffer: BufferHandle,
        location: u32,
        name: String,
    },
    BindIndex(BufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    Clear(wgpu::Color),
    Draw { start: u32, count: u32 },
    Copy(TextureHandle),
}

/// Headless backend that records commands instead of issuing them.
pub struct RecordingBackend {
    pub commands: Vec<Command>,
    live: HashSet<ResourceId>,
    attributes: HashMap<String, u32>,
    next_handle: u32,
    /// Number of successful draws after which `draw` fails.
    pub fail_draw_after: Option<usize>,
    /// Maximum number of live textures.
    pub texture_budget: Option<usize>,
    draws: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        let attributes = [("a_position", 0), ("a_normal", 1), ("a_uv", 2)]
            .into_iter()
            .map(|(name, location)| (name.to_string(), location))
            .collect();
        Self {
            commands: Vec::new(),
            live: HashSet::new(),
            attributes,
            next_handle: 1,
            fail_draw_after: None,
            texture_budget: None,
            draws: 0,
        }
    }

    fn next(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn track(&mut self, resource: ResourceId) {
        self.live.insert(resource);
        self.commands.push(Command::Create(resource));
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Commands other than resource creation and destruction.
    pub fn frame_commands(&self) -> Vec<Command> {
        self.commands
            .iter()
            .filter(|c| !matches!(c, Command::Create(_) | Command::Destroy(_)))
            .cloned()
            .collect()
    }

    pub fn draws(&self) -> Vec<(u32, u32)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw { start, count } => Some((*start, *count)),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<ResourceId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Destroy(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.commands.clear();
    }
}

impl GpuBackend for RecordingBackend {
    fn create_buffer(&mut self, _: BufferUsage, _: &[u8]) -> std::result::Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.next());
        self.track(handle.into());
        Ok(handle)
    }

    fn create_texture(&mut self, width: u32, height: u32) -> std::result::Result<TextureHandle, BackendError> {
        if let Some(budget) = self.texture_budget {
            let textures = self
                .live
                .iter()
                .filter(|r| matches!(r, ResourceId::Texture(_)))
                .count();
            if textures >= budget {
                return Err(BackendError::OutOfMemory {
                    kind: "texture",
                    reason: format!("cannot allocate {}x{}", width, height),
                });
            }
        }
        let handle = TextureHandle(self.next());
        self.track(handle.into());
        Ok(handle)
    }

    fn create_framebuffer(
        &mut self,
        colour: TextureHandle,
    ) -> std::result::Result<FramebufferHandle, BackendError> {
        if !self.is_live(colour.into()) {
            return Err(BackendError::InvalidHandle(colour.into()));
        }
        let handle = FramebufferHandle(self.next());
        self.track(handle.into());
        Ok(handle)
    }

    fn create_program(&mut self, _: &str, _: &str) -> std::result::Result<ProgramHandle, BackendError> {
        let handle = ProgramHandle(self.next());
        self.track(handle.into());
        Ok(handle)
    }

    fn destroy(&mut self, resource: ResourceId) {
        self.live.remove(&resource);
        self.commands.push(Command::Destroy(resource));
    }

    fn is_live(&self, resource: ResourceId) -> bool {
        self.live.contains(&resource)
    }

    fn bind_render_state(&mut self, state: &RenderState) -> std::result::Result<(), BackendError> {
        self.commands.push(Command::BindState(*state));
        Ok(())
    }

    fn bind_program(&mut self, program: ProgramHandle) -> std::result::Result<(), BackendError> {
        self.commands.push(Command::BindProgram(program));
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: &UniformValue) -> std::result::Result<(), BackendError> {
        self.commands
            .push(Command::SetUniform(name.to_string(), value.clone()));
        Ok(())
    }

    fn resolve_attrib_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    fn bind_vertex_attribute(
        &mut self,
        buffer: BufferHandle,
        location: u32,
        attribute: &VertexAttribute,
    ) -> std::result::Result<(), BackendError> {
        self.commands.push(Command::BindAttribute {
            buffer,
            location,
            name: attribute.name.clone(),
        });
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle) -> std::result::Result<(), BackendError> {
        self.commands.push(Command::BindIndex(buffer));
        Ok(())
    }

    fn bind_framebuffer(
        &mut self,
        target: Option<FramebufferHandle>,
    ) -> std::result::Result<(), BackendError> {
        self.commands.push(Command::BindFramebuffer(target));
        Ok(())
    }

    fn clear_frame(&mut self, colour: wgpu::Color) -> std::result::Result<(), BackendError> {
        self.commands.push(Command::Clear(colour));
        Ok(())
    }

    fn draw(&mut self, start: u32, count: u32) -> std::result::Result<(), BackendError> {
        if self.fail_draw_after.is_some_and(|limit| self.draws >= limit) {
            return Err(BackendError::Device("device lost".to_string()));
        }
        self.draws += 1;
        self.commands.push(Command::Draw { start, count });
        Ok(())
    }

    fn copy_frame_to_texture(
        &mut self,
        dst: TextureHandle,
        _: u32,
        _: u32,
        _: u32,
        _: u32,
    ) -> std::result::Result<(), BackendError> {
        self.commands.push(Command::Copy(dst));
        Ok(())
    }
}

/// Handles of a drawable mesh living in a [`RecordingBackend`].
#[derive(Clone, Copy, Debug)]
pub struct MeshHandles {
    pub program: ProgramHandle,
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
}

pub fn create_mesh(backend: &mut RecordingBackend) -> MeshHandles {
    MeshHandles {
        program: backend.create_program("vs", "fs").unwrap(),
        vertices: backend.create_buffer(BufferUsage::Vertex, &[0; 32]).unwrap(),
        indices: backend.create_buffer(BufferUsage::Index, &[0; 12]).unwrap(),
    }
}

pub fn position_attributes() -> Vec<VertexAttribute> {
    vec![VertexAttribute::new("a_position", 3, 12, 0)]
}

/// A drawing request for `mesh` whose draw range start tags it in the log.
pub fn draw_request(key: BatchKey, sequence: u32, mesh: &MeshHandles, tag: u32) -> BatchRequest {
    BatchRequest::builder(key, sequence)
        .program(mesh.program)
        .vertices(mesh.vertices, position_attributes())
        .indices(mesh.indices)
        .draw(tag, 3)
        .build()
        .unwrap()
}

/// Cache value that counts how often it was disposed.
#[derive(Debug)]
pub struct Counted {
    pub name: String,
    pub bytes: Vec<u8>,
    disposals: Arc<AtomicUsize>,
}

impl Counted {
    pub fn new(name: &str, disposals: &Arc<AtomicUsize>) -> Self {
        Self {
            name: name.to_string(),
            bytes: Vec::new(),
            disposals: Arc::clone(disposals),
        }
    }
}

impl Disposable for Counted {
    fn dispose(&mut self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn disposals(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Serves assets from memory.
///
/// Every fetch reports `0.5` before completing. Ids listed in `stalled`
/// report progress and then never complete.
#[derive(Default)]
pub struct MemoryTransport {
    assets: Mutex<HashMap<String, Vec<u8>>>,
    stalled: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(self, id: &str, bytes: &[u8]) -> Self {
        if let Ok(mut assets) = self.assets.lock() {
            assets.insert(id.to_string(), bytes.to_vec());
        }
        self
    }

    pub fn with_stalled(self, id: &str) -> Self {
        if let Ok(mut stalled) = self.stalled.lock() {
            stalled.insert(id.to_string());
        }
        self
    }
}

impl AssetTransport for MemoryTransport {
    fn fetch(&self, id: String, progress: ProgressSink) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let bytes = self.assets.lock().unwrap().get(&id).cloned();
        let stalled = self.stalled.lock().unwrap().contains(&id);
        Box::pin(async move {
            progress.report(0.5);
            if stalled {
                futures::future::pending::<()>().await;
            }
            bytes.ok_or_else(|| anyhow::anyhow!("no asset named '{}'", id))
        })
    }
}

/// Wraps fetched bytes in a [`Counted`]; the payload `b"corrupt"` fails.
pub struct CountingDecoder {
    pub disposals: Arc<AtomicUsize>,
}

impl AssetDecoder for CountingDecoder {
    type Output = Counted;

    fn decode(&self, id: &str, bytes: &[u8]) -> anyhow::Result<Counted> {
        if bytes == b"corrupt" {
            anyhow::bail!("corrupt payload");
        }
        let mut value = Counted::new(id, &self.disposals);
        value.bytes = bytes.to_vec();
        Ok(value)
    }
}

/// Polls `loader` until `done` holds, collecting failures. Panics after 5s.
pub fn poll_until<D, F>(
    loader: &mut AssetLoader<D>,
    cache: &mut ResourceCache<String, D::Output>,
    tracker: &mut LoadProgressTracker,
    mut done: F,
) -> Vec<RenderError>
where
    D: AssetDecoder,
    F: FnMut(&AssetLoader<D>, &LoadProgressTracker) -> bool,
{
    let started = Instant::now();
    let mut failures = Vec::new();
    loop {
        failures.extend(loader.poll(cache, tracker));
        if done(loader, tracker) {
            return failures;
        }
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "loader did not settle in time"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PresenterCall {
    Show,
    Redraw(Option<String>, ProgressState),
    Hide,
}

/// Presenter that logs its calls into a shared vector.
pub struct RecordingPresenter {
    pub calls: Rc<RefCell<Vec<PresenterCall>>>,
}

impl ProgressPresenter for RecordingPresenter {
    fn show(&mut self) {
        self.calls.borrow_mut().push(PresenterCall::Show);
    }

    fn redraw(&mut self, label: Option<&str>, state: ProgressState) {
        self.calls
            .borrow_mut()
            .push(PresenterCall::Redraw(label.map(str::to_string), state));
    }

    fn hide(&mut self) {
        self.calls.borrow_mut().push(PresenterCall::Hide);
    }
}

/// Scene object with fixed bounds that emits whatever `render` builds.
pub struct TestObject {
    pub bounds: Aabb,
    pub resources: Vec<ResourceId>,
    pub updates: Rc<Cell<u32>>,
    pub disposed: Rc<Cell<bool>>,
    render: Box<dyn Fn() -> Result<Render>>,
}

impl TestObject {
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            resources: Vec::new(),
            updates: Rc::new(Cell::new(0)),
            disposed: Rc::new(Cell::new(false)),
            render: Box::new(|| Ok(Render::None)),
        }
    }

    pub fn rendering<F>(mut self, render: F) -> Self
    where
        F: Fn() -> Result<Render> + 'static,
    {
        self.render = Box::new(render);
        self
    }

    pub fn owning(mut self, resources: Vec<ResourceId>) -> Self {
        self.resources = resources;
        self
    }
}

impl SceneObject for TestObject {
    fn update(&mut self, _: Duration) {
        self.updates.set(self.updates.get() + 1);
    }

    fn draw(&self) -> Result<Render> {
        (self.render)()
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn dispose(&mut self, releaser: &mut dyn ReleaseResources) {
        self.disposed.set(true);
        for resource in self.resources.drain(..) {
            releaser.release(resource);
        }
    }
}

pub fn unit_box_at(x: f32, y: f32, z: f32) -> Aabb {
    Aabb::around(
        cgmath::Point3::new(x, y, z),
        cgmath::Vector3::new(0.5, 0.5, 0.5),
    )
}
