//! Scene objects and their container.
//!
//! A [`Scene`] owns every [`SceneObject`] that is currently rendered. Adding or
//! removing an object is a composition change and recomputes the scene bounds
//! through the shared [`SceneBoundsBroadcaster`]; moving an object is not, so
//! code that moves objects calls [`Scene::refresh_bounds`] when the cameras
//! should follow.
//!
//! Each frame the scene asks every object for its [`Render`] and submits the
//! resulting requests to the [`RenderScheduler`].

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use instant::Duration;

use crate::{
    backend::{BufferHandle, GpuBackend, ProgramHandle},
    bounds::SceneBoundsBroadcaster,
    data_structures::{aabb::Aabb, instance::Instance},
    error::{RenderError, Result},
    lifecycle::Lifecycle,
    render::{BatchKey, BatchRequest, Render, RenderState, VertexAttribute},
    scheduler::{ReleaseResources, RenderScheduler},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

/// Something that lives in the scene and can be drawn.
pub trait SceneObject {
    /// Called once per frame before drawing.
    fn update(&mut self, _dt: Duration) {}

    /// Requests for this frame. Called after `update`.
    fn draw(&self) -> Result<Render>;

    /// World-space bounds.
    fn bounds(&self) -> Aabb;

    /// Hands every backend resource the object owns to `releaser`.
    fn dispose(&mut self, releaser: &mut dyn ReleaseResources);
}

pub struct Scene {
    objects: BTreeMap<ObjectId, Box<dyn SceneObject>>,
    broadcaster: Rc<RefCell<SceneBoundsBroadcaster>>,
    next_id: u32,
    state: Lifecycle,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_broadcaster(Rc::new(RefCell::new(SceneBoundsBroadcaster::new())))
    }

    pub fn with_broadcaster(broadcaster: Rc<RefCell<SceneBoundsBroadcaster>>) -> Self {
        Self {
            objects: BTreeMap::new(),
            broadcaster,
            next_id: 0,
            state: Lifecycle::Active,
        }
    }

    /// The broadcaster cameras subscribe to.
    pub fn broadcaster(&self) -> &Rc<RefCell<SceneBoundsBroadcaster>> {
        &self.broadcaster
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.broadcaster.borrow().bounds()
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&dyn SceneObject> {
        self.objects.get(&id).map(|object| object.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut (dyn SceneObject + 'static)> {
        self.objects.get_mut(&id).map(|object| object.as_mut())
    }

    /// Adds `object` and recomputes the scene bounds.
    pub fn add(&mut self, object: Box<dyn SceneObject>) -> Result<ObjectId> {
        if !self.state.is_active() {
            return Err(RenderError::Disposed { component: "scene" });
        }
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, object);
        log::debug!("added scene object {:?}", id);
        self.refresh_bounds();
        Ok(id)
    }

    /// Removes the object, releases its resources through `releaser` and
    /// recomputes the scene bounds. Returns `false` for unknown ids.
    pub fn remove(&mut self, id: ObjectId, releaser: &mut dyn ReleaseResources) -> bool {
        let Some(mut object) = self.objects.remove(&id) else {
            return false;
        };
        object.dispose(releaser);
        log::debug!("removed scene object {:?}", id);
        self.refresh_bounds();
        true
    }

    /// Recomputes the union of all object bounds and notifies subscribers if
    /// it changed.
    pub fn refresh_bounds(&self) -> bool {
        let boxes: Vec<Aabb> = self.objects.values().map(|object| object.bounds()).collect();
        match self.broadcaster.try_borrow_mut() {
            Ok(mut broadcaster) => broadcaster.recompute(boxes),
            Err(_) => {
                log::warn!("scene bounds are being broadcast; recompute skipped");
                false
            }
        }
    }

    pub fn update(&mut self, dt: Duration) {
        if !self.state.is_active() {
            return;
        }
        for object in self.objects.values_mut() {
            object.update(dt);
        }
    }

    /// Submits every object's requests.
    ///
    /// Each object's requests are queued all-or-nothing. A rejected object
    /// does not stop the others; all errors are returned.
    pub fn submit_to<B: GpuBackend>(&self, scheduler: &mut RenderScheduler<B>) -> Vec<RenderError> {
        let mut errors = Vec::new();
        if !self.state.is_active() {
            return errors;
        }
        for (id, object) in &self.objects {
            let render = match object.draw() {
                Ok(render) => render,
                Err(err) => {
                    log::warn!("scene object {:?} failed to draw: {}", id, err);
                    errors.push(err);
                    continue;
                }
            };
            let mut auxiliary = Vec::new();
            let mut main = Vec::new();
            render.flatten(&mut auxiliary, &mut main);
            if let Err(err) = scheduler.submit_batch(auxiliary, main) {
                log::warn!("scene object {:?} skipped this frame: {}", id, err);
                errors.push(err);
            }
        }
        errors
    }

    /// Disposes every object. The scene is empty and inert afterwards.
    pub fn dispose(&mut self, releaser: &mut dyn ReleaseResources) {
        if !self.state.begin_dispose() {
            return;
        }
        let objects = std::mem::take(&mut self.objects);
        let count = objects.len();
        for (_, mut object) in objects {
            object.dispose(releaser);
        }
        self.refresh_bounds();
        self.state.finish_dispose();
        log::info!("scene disposed with {} objects", count);
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

/// An indexed mesh drawn with one program.
///
/// Owns its buffers and program; they are released when the object is
/// disposed.
pub struct MeshObject {
    pub key: BatchKey,
    pub instance: Instance,
    pub state: RenderState,
    program: ProgramHandle,
    vertices: BufferHandle,
    indices: BufferHandle,
    attributes: Vec<VertexAttribute>,
    index_count: u32,
    local_bounds: Aabb,
    disposed: bool,
}

impl MeshObject {
    pub fn new(
        key: BatchKey,
        program: ProgramHandle,
        vertices: BufferHandle,
        attributes: Vec<VertexAttribute>,
        indices: BufferHandle,
        index_count: u32,
        local_bounds: Aabb,
    ) -> Self {
        Self {
            key,
            instance: Instance::new(),
            state: RenderState::default(),
            program,
            vertices,
            indices,
            attributes,
            index_count,
            local_bounds,
            disposed: false,
        }
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instance = instance;
        self
    }

    pub fn with_state(mut self, state: RenderState) -> Self {
        self.state = state;
        self
    }

    pub fn local_bounds(&self) -> &Aabb {
        &self.local_bounds
    }
}

impl SceneObject for MeshObject {
    fn draw(&self) -> Result<Render> {
        if self.disposed {
            return Ok(Render::None);
        }
        let request = BatchRequest::builder(self.key, 0)
            .state(self.state)
            .program(self.program)
            .vertices(self.vertices, self.attributes.clone())
            .indices(self.indices)
            .uniform("u_model", self.instance.to_matrix())
            .draw(0, self.index_count)
            .build()?;
        Ok(Render::Main(request))
    }

    fn bounds(&self) -> Aabb {
        self.instance.transform_bounds(&self.local_bounds)
    }

    fn dispose(&mut self, releaser: &mut dyn ReleaseResources) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        releaser.release(self.vertices.into());
        releaser.release(self.indices.into());
        releaser.release(self.program.into());
    }
}
