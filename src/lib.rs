//! flow-viewer
//!
//! Render core of an embeddable 3D viewer. Scene objects describe their GPU
//! work as batch requests; a scheduler replays them against a pluggable
//! backend in a fixed order, cameras follow the scene bounds and assets are
//! loaded in the background into a time-to-live cache.
//!
//! High-level modules
//! - `backend`: the GPU backend trait and resource handles
//! - `bounds`: scene bounds and the cameras subscribed to them
//! - `cache`: TTL cache for decoded assets and derived data
//! - `camera`: camera variants, projection and uniforms
//! - `config`: engine configuration
//! - `data_structures`: bounding boxes and transforms
//! - `engine`: the per-frame driver tying everything together
//! - `error`: error types
//! - `lifecycle`: active/disposing/disposed state shared by components
//! - `loader`: background asset fetching and decoding
//! - `progress`: aggregate load progress
//! - `render`: batch requests and render composition
//! - `scene`: scene objects and their container
//! - `scheduler`: frame ordering and execution of batch requests
//!

pub mod backend;
pub mod bounds;
pub mod cache;
pub mod camera;
pub mod config;
pub mod data_structures;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod progress;
pub mod render;
pub mod scene;
pub mod scheduler;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu::Color;

pub use error::{RenderError, Result};
