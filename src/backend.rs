//! The GPU backend seam.
//!
//! The render core never talks to a graphics API directly. Everything it needs
//! is expressed through [`GpuBackend`]; any implementation (a wgpu device, a
//! WebGL context, a headless recorder for tests) can drive the scheduler.
//!
//! Resources are addressed through small copyable handles issued by the
//! backend. A handle stays valid until it is passed to [`GpuBackend::destroy`];
//! [`GpuBackend::is_live`] is what submission-time validation asks.

use thiserror::Error;

use crate::render::{RenderState, UniformValue, VertexAttribute};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

/// Any backend resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    Framebuffer(FramebufferHandle),
    Program(ProgramHandle),
}

impl From<BufferHandle> for ResourceId {
    fn from(handle: BufferHandle) -> Self {
        ResourceId::Buffer(handle)
    }
}

impl From<TextureHandle> for ResourceId {
    fn from(handle: TextureHandle) -> Self {
        ResourceId::Texture(handle)
    }
}

impl From<FramebufferHandle> for ResourceId {
    fn from(handle: FramebufferHandle) -> Self {
        ResourceId::Framebuffer(handle)
    }
}

impl From<ProgramHandle> for ResourceId {
    fn from(handle: ProgramHandle) -> Self {
        ResourceId::Program(handle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Allocation failed. Reported as [`RenderError::ResourceExhausted`](crate::error::RenderError).
    #[error("out of {kind} memory: {reason}")]
    OutOfMemory { kind: &'static str, reason: String },

    /// A handle was used after it was destroyed.
    #[error("invalid handle {0:?}")]
    InvalidHandle(ResourceId),

    /// Anything else the device reports.
    #[error("device error: {0}")]
    Device(String),
}

/// Capability set the render core consumes.
///
/// Binding calls are issued in the order the scheduler executes requests; an
/// implementation may record them, translate them to a command encoder, or
/// forward them to an immediate-mode API.
pub trait GpuBackend {
    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> Result<BufferHandle, BackendError>;

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureHandle, BackendError>;

    /// Creates a framebuffer that renders into `colour`.
    fn create_framebuffer(&mut self, colour: TextureHandle) -> Result<FramebufferHandle, BackendError>;

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle, BackendError>;

    fn destroy(&mut self, resource: ResourceId);

    fn is_live(&self, resource: ResourceId) -> bool;

    fn bind_render_state(&mut self, state: &RenderState) -> Result<(), BackendError>;

    fn bind_program(&mut self, program: ProgramHandle) -> Result<(), BackendError>;

    fn set_uniform(&mut self, name: &str, value: &UniformValue) -> Result<(), BackendError>;

    /// Location of a vertex attribute in the currently bound program.
    fn resolve_attrib_location(&self, name: &str) -> Option<u32>;

    fn bind_vertex_attribute(
        &mut self,
        buffer: BufferHandle,
        location: u32,
        attribute: &VertexAttribute,
    ) -> Result<(), BackendError>;

    fn bind_index_buffer(&mut self, buffer: BufferHandle) -> Result<(), BackendError>;

    /// Binds an off-screen target, or the default surface for `None`.
    fn bind_framebuffer(&mut self, target: Option<FramebufferHandle>) -> Result<(), BackendError>;

    fn clear_frame(&mut self, colour: wgpu::Color) -> Result<(), BackendError>;

    /// Indexed draw over `[start, start + count)`.
    fn draw(&mut self, start: u32, count: u32) -> Result<(), BackendError>;

    /// Copies a region of the bound target into `dst`.
    fn copy_frame_to_texture(
        &mut self,
        dst: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError>;
}
