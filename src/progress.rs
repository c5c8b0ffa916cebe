//! Aggregated load progress.
//!
//! [`LoadProgressTracker`] folds the progress of every in-flight item into one
//! signal for a progress display:
//!
//! - `Idle` when nothing is tracked,
//! - `Indeterminate` while any item still reports exactly `0.0` (just started,
//!   size unknown),
//! - `Determinate(mean)` otherwise.
//!
//! Every `begin_item` must be matched by an `end_item`, on success and on
//! failure alike; the tracker only returns to idle once its item set is empty.

use std::collections::HashMap;

use instant::Duration;

/// Aggregate state reported to presentation layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProgressState {
    Idle,
    Indeterminate,
    Determinate(f32),
}

/// Something that draws the tracker, e.g. a loading bar.
///
/// `show` and `hide` bracket one loading session; `redraw` is called
/// periodically while it is visible.
pub trait ProgressPresenter {
    fn show(&mut self);
    fn redraw(&mut self, label: Option<&str>, state: ProgressState);
    fn hide(&mut self);
}

pub struct LoadProgressTracker {
    items: HashMap<String, f32>,
    label: Option<String>,
    presenter: Option<Box<dyn ProgressPresenter>>,
    drawing: bool,
    redraw_interval: Duration,
    since_redraw: Duration,
}

impl LoadProgressTracker {
    pub fn new(redraw_interval: Duration) -> Self {
        Self {
            items: HashMap::new(),
            label: None,
            presenter: None,
            drawing: false,
            redraw_interval,
            since_redraw: Duration::ZERO,
        }
    }

    /// Attaches a presenter. If loads are already running it is shown at once.
    pub fn with_presenter(mut self, presenter: Box<dyn ProgressPresenter>) -> Self {
        self.presenter = Some(presenter);
        if !self.items.is_empty() {
            self.start_drawing();
        }
        self
    }

    /// Starts tracking `id` at progress `0.0`, which makes the tracker
    /// indeterminate until the item reports something else.
    pub fn begin_item(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.items.is_empty() {
            log::debug!("progress tracker active");
        }
        self.items.insert(id, 0.0);
        self.start_drawing();
    }

    /// Stores the latest progress of a tracked item, clamped to `[0, 1]`.
    ///
    /// Updates for items that were never begun (or already ended) are ignored.
    pub fn update_item(&mut self, id: &str, progress: f32) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        match self.items.get_mut(id) {
            Some(stored) => *stored = progress,
            None => log::warn!("progress update for untracked item '{}'", id),
        }
    }

    /// Stops tracking `id`. Removing the last item resets the tracker.
    pub fn end_item(&mut self, id: &str) {
        if self.items.remove(id).is_none() {
            log::warn!("end of untracked item '{}'", id);
        }
        if self.items.is_empty() {
            self.reset();
        }
    }

    /// Sets the label of the running operation.
    ///
    /// The first label wins: while one is set, later calls are ignored so a
    /// load that starts late cannot replace what is on screen. It is cleared
    /// on reset.
    pub fn set_operation_label(&mut self, label: impl Into<String>) {
        if self.label.is_none() {
            self.label = Some(label.into());
        }
    }

    pub fn set_redraw_interval(&mut self, interval: Duration) {
        self.redraw_interval = interval;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_idle(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn tracked(&self) -> usize {
        self.items.len()
    }

    pub fn item_progress(&self, id: &str) -> Option<f32> {
        self.items.get(id).copied()
    }

    pub fn state(&self) -> ProgressState {
        if self.items.is_empty() {
            return ProgressState::Idle;
        }
        if self.items.values().any(|&p| p == 0.0) {
            return ProgressState::Indeterminate;
        }
        let sum: f32 = self.items.values().sum();
        ProgressState::Determinate(sum / self.items.len() as f32)
    }

    /// Mean progress, `None` while idle or indeterminate.
    pub fn progress(&self) -> Option<f32> {
        match self.state() {
            ProgressState::Determinate(p) => Some(p),
            _ => None,
        }
    }

    /// Advances the redraw timer and redraws the presenter when it is due.
    pub fn tick(&mut self, dt: Duration) {
        if !self.drawing {
            return;
        }
        self.since_redraw += dt;
        if self.since_redraw < self.redraw_interval {
            return;
        }
        self.since_redraw = Duration::ZERO;
        let state = self.state();
        if let Some(presenter) = self.presenter.as_mut() {
            presenter.redraw(self.label.as_deref(), state);
        }
    }

    fn start_drawing(&mut self) {
        if self.drawing {
            return;
        }
        if let Some(presenter) = self.presenter.as_mut() {
            presenter.show();
            self.drawing = true;
            self.since_redraw = Duration::ZERO;
        }
    }

    fn reset(&mut self) {
        self.items.clear();
        self.label = None;
        self.since_redraw = Duration::ZERO;
        if self.drawing {
            if let Some(presenter) = self.presenter.as_mut() {
                presenter.hide();
            }
            self.drawing = false;
        }
        log::debug!("progress tracker idle");
    }
}
