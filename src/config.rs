//! Engine configuration.

use instant::Duration;

/// Runtime knobs of the engine.
///
/// Defaults are usable as is; change them through
/// [`Engine::configure`](crate::engine::Engine::configure) or before handing
/// the config to [`Engine::new`](crate::engine::Engine::new).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// TTL given to cache entries on `store` and restored on every `get`.
    pub default_ttl: Duration,
    /// Colour the default surface is cleared to before the main queue runs.
    pub clear_colour: wgpu::Color,
    /// How often a visible progress presenter is redrawn.
    pub progress_redraw_interval: Duration,
    /// Minimum time between cache/tracker sweeps. `0` sweeps every frame.
    pub tick_duration_millis: u64,
    /// Worker threads of the runtime that drives asset loads.
    pub loader_worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
            clear_colour: wgpu::Color::BLACK,
            progress_redraw_interval: Duration::from_millis(100),
            tick_duration_millis: 0,
            loader_worker_threads: 2,
        }
    }
}
