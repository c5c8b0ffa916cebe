//! Frame scheduling of batch requests.
//!
//! The [`RenderScheduler`] collects the requests scene objects submit during
//! a frame and replays them against its [`GpuBackend`] in [`run_frame`].
//!
//! # Ordering
//!
//! 1. The auxiliary queue runs to completion before the first main request.
//!    Anything a main request samples that was produced by a compositing pass
//!    of the same frame is therefore fully written when it is read, no matter
//!    in which order the two were submitted.
//! 2. Inside a queue, requests sharing a [`BatchKey`] form a group and run in
//!    ascending `sequence` order. Groups are never interleaved.
//! 3. Auxiliary groups keep the order in which their first request arrived.
//!    Main groups are batched: opaque groups before blended ones, then by
//!    program and render state to save rebinds.
//!
//! Queues are emptied at the end of every frame, also when the frame is
//! aborted by a backend error; no request outlives the frame it was submitted
//! in.
//!
//! [`run_frame`]: RenderScheduler::run_frame

use std::{collections::HashMap, mem};

use crate::{
    backend::{FramebufferHandle, GpuBackend, ProgramHandle, ResourceId},
    error::{RenderError, Result},
    lifecycle::Lifecycle,
    render::{BatchKey, BatchRequest, RenderState},
};

/// Anything that can take a backend resource off an owner's hands.
///
/// Scene objects release their GPU resources through this on disposal so the
/// destroy can wait until in-flight requests referencing them have run.
pub trait ReleaseResources {
    fn release(&mut self, resource: ResourceId);
}

/// Counters of one executed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub auxiliary: usize,
    pub main: usize,
    pub state_binds: usize,
    pub program_binds: usize,
    pub released: usize,
}

/// What the backend currently has bound, to skip redundant binds.
#[derive(Default)]
struct Bound {
    state: Option<RenderState>,
    program: Option<ProgramHandle>,
    target: Option<Option<FramebufferHandle>>,
}

pub struct RenderScheduler<B: GpuBackend> {
    backend: B,
    auxiliary: Vec<BatchRequest>,
    main: Vec<BatchRequest>,
    pending_release: Vec<ResourceId>,
    surface_clear: Option<wgpu::Color>,
    frame: u64,
    state: Lifecycle,
}

impl<B: GpuBackend> RenderScheduler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            auxiliary: Vec::new(),
            main: Vec::new(),
            pending_release: Vec::new(),
            surface_clear: None,
            frame: 0,
            state: Lifecycle::Active,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access for resource creation. Do not destroy resources through
    /// this while requests are queued; use [`ReleaseResources::release`].
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn queued_auxiliary(&self) -> usize {
        self.auxiliary.len()
    }

    pub fn queued_main(&self) -> usize {
        self.main.len()
    }

    pub fn pending_releases(&self) -> usize {
        self.pending_release.len()
    }

    /// Clears the default surface to `colour` before the main queue runs.
    pub fn set_surface_clear(&mut self, colour: Option<wgpu::Color>) {
        self.surface_clear = colour;
    }

    /// Queues a request that contributes to the visible frame.
    pub fn submit_main(&mut self, request: BatchRequest) -> Result<()> {
        self.validate(&request)?;
        self.main.push(request);
        Ok(())
    }

    /// Queues a request whose output is read by main requests of this frame.
    pub fn submit_auxiliary(&mut self, request: BatchRequest) -> Result<()> {
        self.validate(&request)?;
        self.auxiliary.push(request);
        Ok(())
    }

    /// Queues a producer/consumer set as one unit.
    ///
    /// Every request is validated first; if any is rejected nothing is
    /// queued, so a main request never runs without its auxiliary inputs.
    pub fn submit_batch(
        &mut self,
        auxiliary: Vec<BatchRequest>,
        main: Vec<BatchRequest>,
    ) -> Result<()> {
        for request in auxiliary.iter().chain(&main) {
            self.validate(request)?;
        }
        self.auxiliary.extend(auxiliary);
        self.main.extend(main);
        Ok(())
    }

    fn validate(&self, request: &BatchRequest) -> Result<()> {
        if !self.state.is_active() {
            return Err(RenderError::Disposed {
                component: "render scheduler",
            });
        }
        for resource in request.resources() {
            if !self.backend.is_live(resource) || self.pending_release.contains(&resource) {
                return Err(RenderError::dead_resource(request.label(), resource));
            }
        }
        Ok(())
    }

    /// Executes everything submitted since the last frame.
    ///
    /// A backend error stops execution, drops the remaining requests of both
    /// queues and is returned; deferred releases are flushed either way.
    pub fn run_frame(&mut self) -> Result<FrameStats> {
        if !self.state.is_active() {
            return Ok(FrameStats::default());
        }
        let auxiliary = order_auxiliary(mem::take(&mut self.auxiliary));
        let main = order_main(mem::take(&mut self.main));
        let mut stats = FrameStats {
            frame: self.frame,
            ..Default::default()
        };
        log::debug!(
            "frame {}: {} auxiliary, {} main requests",
            self.frame,
            auxiliary.len(),
            main.len()
        );

        let result = self.execute_queues(auxiliary, main, &mut stats);
        stats.released = self.flush_releases();
        self.frame += 1;

        match result {
            Ok(()) => Ok(stats),
            Err(err) => {
                log::error!("frame {} aborted: {}", stats.frame, err);
                Err(err)
            }
        }
    }

    fn execute_queues(
        &mut self,
        auxiliary: Vec<BatchRequest>,
        main: Vec<BatchRequest>,
        stats: &mut FrameStats,
    ) -> Result<()> {
        let mut bound = Bound::default();
        for request in auxiliary {
            self.execute(request, &mut bound, stats)?;
            stats.auxiliary += 1;
        }
        if let Some(colour) = self.surface_clear {
            self.backend.bind_framebuffer(None)?;
            self.backend.clear_frame(colour)?;
            bound.target = Some(None);
        }
        for request in main {
            self.execute(request, &mut bound, stats)?;
            stats.main += 1;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        mut request: BatchRequest,
        bound: &mut Bound,
        stats: &mut FrameStats,
    ) -> Result<()> {
        if let Some(hook) = request.take_hook() {
            hook(&mut self.backend)?;
            // the hook may have rebound anything
            *bound = Bound::default();
        }

        let state = *request.state();
        if bound.state != Some(state) {
            self.backend.bind_render_state(&state)?;
            bound.state = Some(state);
            stats.state_binds += 1;
        }

        if let Some(program) = request.program() {
            if bound.program != Some(program) {
                self.backend.bind_program(program)?;
                bound.program = Some(program);
                stats.program_binds += 1;
            }
            for (name, value) in request.uniforms() {
                self.backend.set_uniform(name, value)?;
            }
            if let Some(vertex) = request.vertex() {
                for attribute in &vertex.attributes {
                    match self.backend.resolve_attrib_location(&attribute.name) {
                        Some(location) => {
                            self.backend
                                .bind_vertex_attribute(vertex.buffer, location, attribute)?
                        }
                        None => log::warn!(
                            "attribute '{}' of {} is not used by {:?}",
                            attribute.name,
                            request.label(),
                            program
                        ),
                    }
                }
            }
            if let Some(index) = request.index() {
                self.backend.bind_index_buffer(index)?;
            }
        }

        let target = request.target();
        if bound.target != Some(target) {
            self.backend.bind_framebuffer(target)?;
            bound.target = Some(target);
        }
        if let Some(colour) = request.clear() {
            self.backend.clear_frame(colour)?;
        }
        let range = request.range();
        if range.count > 0 {
            self.backend.draw(range.start, range.count)?;
        }
        if let Some(capture) = request.capture() {
            self.backend.copy_frame_to_texture(
                capture.texture,
                capture.x,
                capture.y,
                capture.width,
                capture.height,
            )?;
        }
        Ok(())
    }

    fn flush_releases(&mut self) -> usize {
        let released = self.pending_release.len();
        for resource in self.pending_release.drain(..) {
            self.backend.destroy(resource);
        }
        released
    }

    /// Drops all queued requests and destroys everything pending release.
    /// Later submissions fail with [`RenderError::Disposed`].
    pub fn dispose(&mut self) {
        if !self.state.begin_dispose() {
            return;
        }
        self.auxiliary.clear();
        self.main.clear();
        self.flush_releases();
        self.state.finish_dispose();
        log::info!("render scheduler disposed after {} frames", self.frame);
    }
}

impl<B: GpuBackend> ReleaseResources for RenderScheduler<B> {
    /// Destroys `resource` now if nothing is queued, otherwise after the
    /// current frame's queues have been drained.
    fn release(&mut self, resource: ResourceId) {
        if self.auxiliary.is_empty() && self.main.is_empty() {
            self.backend.destroy(resource);
        } else if !self.pending_release.contains(&resource) {
            self.pending_release.push(resource);
        }
    }
}

/// Groups requests by key in first-submission order, each group sorted by
/// sequence.
fn group(requests: Vec<BatchRequest>) -> Vec<Vec<BatchRequest>> {
    let mut groups: Vec<Vec<BatchRequest>> = Vec::new();
    let mut index: HashMap<BatchKey, usize> = HashMap::new();
    for request in requests {
        match index.get(&request.key()) {
            Some(&i) => groups[i].push(request),
            None => {
                index.insert(request.key(), groups.len());
                groups.push(vec![request]);
            }
        }
    }
    for group in groups.iter_mut() {
        group.sort_by_key(BatchRequest::sequence);
        if group
            .windows(2)
            .any(|pair| pair[0].sequence() == pair[1].sequence())
        {
            log::warn!(
                "duplicate sequence numbers in group {:?}; submission order decides",
                group[0].key()
            );
        }
    }
    groups
}

fn order_auxiliary(requests: Vec<BatchRequest>) -> Vec<BatchRequest> {
    group(requests).into_iter().flatten().collect()
}

fn order_main(requests: Vec<BatchRequest>) -> Vec<BatchRequest> {
    let mut groups = group(requests);
    groups.sort_by_key(|group| {
        let head = &group[0];
        (
            head.state().blend.is_blended(),
            head.program(),
            head.state().sort_key(),
        )
    });
    groups.into_iter().flatten().collect()
}
