//! Batch requests and render composition.
//!
//! A [`BatchRequest`] describes one GPU operation: which render state and
//! program to bind, which buffers and uniforms feed it, where the output goes
//! and which index range is drawn. Requests are assembled with
//! [`BatchRequestBuilder`] and are read-only afterwards; the scheduler takes
//! them by value, so neither the producing object nor the backend can touch a
//! request between submission and execution.
//!
//! Scene objects hand their requests to the engine wrapped in a [`Render`],
//! which says whether a request belongs to the auxiliary (compositing) queue or
//! the main queue.
//!
//! # Key types
//!
//! - [`BatchKey`] groups requests whose relative order matters
//! - [`RenderState`] is the fixed-function state of a request
//! - [`Render`] is the tree of submissions a scene object returns per frame

use std::{collections::BTreeMap, fmt};

use crate::{
    backend::{
        BackendError, BufferHandle, FramebufferHandle, GpuBackend, ProgramHandle, ResourceId,
        TextureHandle,
    },
    error::RenderError,
};

/// Identifies a chain of requests that must run in `sequence` order.
///
/// Requests with the same key are never reordered relative to each other,
/// e.g. the clear, paint and composite passes of one character's skin texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    pub identifier: u32,
    pub owner_id: u32,
    pub subtype: u32,
}

impl BatchKey {
    pub fn new(identifier: u32, owner_id: u32, subtype: u32) -> Self {
        Self {
            identifier,
            owner_id,
            subtype,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Additive,
    Premultiplied,
}

impl BlendMode {
    pub fn is_blended(self) -> bool {
        !matches!(self, BlendMode::Opaque)
    }

    /// Blend state a wgpu pipeline for this mode is created with.
    pub fn to_wgpu(self) -> wgpu::BlendState {
        match self {
            BlendMode::Opaque => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Premultiplied => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        }
    }
}

/// Fixed-function state bound before a request draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderState {
    pub blend: BlendMode,
    pub cull_enabled: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub colour_mask: wgpu::ColorWrites,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            blend: BlendMode::Opaque,
            cull_enabled: true,
            depth_test: true,
            depth_write: true,
            colour_mask: wgpu::ColorWrites::ALL,
        }
    }
}

impl RenderState {
    /// State used by compositing passes: no depth, no culling.
    pub fn overlay(blend: BlendMode) -> Self {
        Self {
            blend,
            cull_enabled: false,
            depth_test: false,
            depth_write: false,
            colour_mask: wgpu::ColorWrites::ALL,
        }
    }

    pub fn cull_mode(&self) -> Option<wgpu::Face> {
        self.cull_enabled.then_some(wgpu::Face::Back)
    }

    pub fn depth_compare(&self) -> wgpu::CompareFunction {
        if self.depth_test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        }
    }

    pub(crate) fn sort_key(&self) -> (BlendMode, bool, bool, bool, u32) {
        (
            self.blend,
            self.cull_enabled,
            self.depth_test,
            self.depth_write,
            self.colour_mask.bits(),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
    /// A texture bound to a sampler unit.
    Texture { unit: u32, texture: TextureHandle },
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<cgmath::Matrix4<f32>> for UniformValue {
    fn from(value: cgmath::Matrix4<f32>) -> Self {
        UniformValue::Mat4(value.into())
    }
}

/// A named attribute inside an interleaved vertex buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: String,
    pub components: u32,
    pub stride: u32,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn new(name: impl Into<String>, components: u32, stride: u32, offset: u32) -> Self {
        Self {
            name: name.into(),
            components,
            stride,
            offset,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexSource {
    pub buffer: BufferHandle,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawRange {
    pub start: u32,
    pub count: u32,
}

/// Region of the bound target copied into a texture after the draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureCapture {
    pub texture: TextureHandle,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub type PreDrawHook = Box<dyn FnOnce(&mut dyn GpuBackend) -> Result<(), BackendError>>;

/// One GPU operation. Built with [`BatchRequestBuilder`].
pub struct BatchRequest {
    key: BatchKey,
    sequence: u32,
    state: RenderState,
    program: Option<ProgramHandle>,
    vertex: Option<VertexSource>,
    index: Option<BufferHandle>,
    uniforms: BTreeMap<String, UniformValue>,
    target: Option<FramebufferHandle>,
    capture: Option<TextureCapture>,
    clear: Option<wgpu::Color>,
    hook: Option<PreDrawHook>,
    range: DrawRange,
}

impl BatchRequest {
    pub fn builder(key: BatchKey, sequence: u32) -> BatchRequestBuilder {
        BatchRequestBuilder::new(key, sequence)
    }

    pub fn key(&self) -> BatchKey {
        self.key
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn vertex(&self) -> Option<&VertexSource> {
        self.vertex.as_ref()
    }

    pub fn index(&self) -> Option<BufferHandle> {
        self.index
    }

    pub fn uniforms(&self) -> &BTreeMap<String, UniformValue> {
        &self.uniforms
    }

    pub fn target(&self) -> Option<FramebufferHandle> {
        self.target
    }

    pub fn capture(&self) -> Option<TextureCapture> {
        self.capture
    }

    pub fn clear(&self) -> Option<wgpu::Color> {
        self.clear
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    pub fn range(&self) -> DrawRange {
        self.range
    }

    /// Short name used in logs and validation errors.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}#{}",
            self.key.identifier, self.key.owner_id, self.key.subtype, self.sequence
        )
    }

    /// Every backend resource this request reads or writes.
    pub fn resources(&self) -> Vec<ResourceId> {
        let mut resources = Vec::new();
        if let Some(program) = self.program {
            resources.push(program.into());
        }
        if let Some(vertex) = &self.vertex {
            resources.push(vertex.buffer.into());
        }
        if let Some(index) = self.index {
            resources.push(index.into());
        }
        for value in self.uniforms.values() {
            if let UniformValue::Texture { texture, .. } = value {
                resources.push((*texture).into());
            }
        }
        if let Some(target) = self.target {
            resources.push(target.into());
        }
        if let Some(capture) = self.capture {
            resources.push(capture.texture.into());
        }
        resources
    }

    pub(crate) fn take_hook(&mut self) -> Option<PreDrawHook> {
        self.hook.take()
    }
}

impl fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRequest")
            .field("key", &self.key)
            .field("sequence", &self.sequence)
            .field("state", &self.state)
            .field("program", &self.program)
            .field("target", &self.target)
            .field("range", &self.range)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Accumulates the parts of a [`BatchRequest`].
pub struct BatchRequestBuilder {
    request: BatchRequest,
}

impl BatchRequestBuilder {
    pub fn new(key: BatchKey, sequence: u32) -> Self {
        Self {
            request: BatchRequest {
                key,
                sequence,
                state: RenderState::default(),
                program: None,
                vertex: None,
                index: None,
                uniforms: BTreeMap::new(),
                target: None,
                capture: None,
                clear: None,
                hook: None,
                range: DrawRange::default(),
            },
        }
    }

    pub fn state(mut self, state: RenderState) -> Self {
        self.request.state = state;
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.request.state.blend = blend;
        self
    }

    pub fn program(mut self, program: ProgramHandle) -> Self {
        self.request.program = Some(program);
        self
    }

    pub fn vertices(mut self, buffer: BufferHandle, attributes: Vec<VertexAttribute>) -> Self {
        self.request.vertex = Some(VertexSource { buffer, attributes });
        self
    }

    pub fn indices(mut self, buffer: BufferHandle) -> Self {
        self.request.index = Some(buffer);
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.request.uniforms.insert(name.into(), value.into());
        self
    }

    pub fn target(mut self, framebuffer: FramebufferHandle) -> Self {
        self.request.target = Some(framebuffer);
        self
    }

    pub fn capture(mut self, capture: TextureCapture) -> Self {
        self.request.capture = Some(capture);
        self
    }

    pub fn clear(mut self, colour: wgpu::Color) -> Self {
        self.request.clear = Some(colour);
        self
    }

    pub fn pre_draw<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut dyn GpuBackend) -> Result<(), BackendError> + 'static,
    {
        self.request.hook = Some(Box::new(hook));
        self
    }

    pub fn draw(mut self, start: u32, count: u32) -> Self {
        self.request.range = DrawRange { start, count };
        self
    }

    /// Checks the request is complete and freezes it.
    ///
    /// Whether the referenced resources are still alive is checked later, at
    /// submission.
    pub fn build(self) -> Result<BatchRequest, RenderError> {
        let request = self.request;
        let draws = request.range.count > 0;
        if draws {
            if request.program.is_none() {
                return Err(RenderError::invalid(request.label(), "draw without a program"));
            }
            if request.vertex.is_none() {
                return Err(RenderError::invalid(request.label(), "draw without vertices"));
            }
            if request.index.is_none() {
                return Err(RenderError::invalid(request.label(), "draw without indices"));
            }
        }
        if request.program.is_none() && !request.uniforms.is_empty() {
            return Err(RenderError::invalid(
                request.label(),
                "uniforms set without a program",
            ));
        }
        if let Some(vertex) = &request.vertex {
            if vertex.attributes.is_empty() {
                return Err(RenderError::invalid(
                    request.label(),
                    "vertex buffer without attributes",
                ));
            }
        }
        if !draws && request.clear.is_none() && request.hook.is_none() && request.capture.is_none()
        {
            return Err(RenderError::invalid(request.label(), "request does nothing"));
        }
        Ok(request)
    }
}

/// How a scene object wants to be rendered this frame.
///
/// - `None` renders nothing
/// - `Main` contributes to the visible frame
/// - `Auxiliary` produces an intermediate artifact (e.g. a composited texture)
///   that main requests of the same frame read
/// - `Composed` is any combination of the above
#[derive(Debug, Default)]
pub enum Render {
    #[default]
    None,
    Main(BatchRequest),
    Auxiliary(BatchRequest),
    Composed(Vec<Render>),
}

impl Render {
    /// Splits the tree into auxiliary and main requests, keeping their order.
    pub(crate) fn flatten(self, auxiliary: &mut Vec<BatchRequest>, main: &mut Vec<BatchRequest>) {
        match self {
            Render::None => (),
            Render::Main(request) => main.push(request),
            Render::Auxiliary(request) => auxiliary.push(request),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.flatten(auxiliary, main)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Render::None => 0,
            Render::Main(_) | Render::Auxiliary(_) => 1,
            Render::Composed(renders) => renders.iter().map(Render::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<BatchRequest> for Render {
    fn from(request: BatchRequest) -> Self {
        Render::Main(request)
    }
}

impl From<Vec<Render>> for Render {
    fn from(renders: Vec<Render>) -> Self {
        Render::Composed(renders)
    }
}
