//! Background asset loading.
//!
//! Loads run on a tokio runtime owned by the [`AssetLoader`]. A load fetches
//! bytes through an [`AssetTransport`], decodes them with an [`AssetDecoder`]
//! and reports back over channels. Nothing a load produces touches the cache
//! or the progress tracker until [`AssetLoader::poll`] applies it, which the
//! engine does once per frame after rendering.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use tokio::{
    runtime::Runtime,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};

use crate::{
    cache::{Disposable, ResourceCache},
    error::RenderError,
    progress::LoadProgressTracker,
};

/// Reports fetch progress of one asset in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct ProgressSink {
    id: String,
    ticket: u64,
    tx: UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn report(&self, progress: f32) {
        // the loader is gone or the load was cancelled; nobody is listening
        let _ = self.tx.send(ProgressEvent {
            ticket: self.ticket,
            progress,
        });
    }
}

/// Fetches raw asset bytes, e.g. from disk or over the network.
pub trait AssetTransport: Send + Sync + 'static {
    fn fetch(&self, id: String, progress: ProgressSink) -> BoxFuture<'static, anyhow::Result<Vec<u8>>>;
}

/// Turns fetched bytes into a cacheable value. Runs on a loader thread.
pub trait AssetDecoder: Send + Sync + 'static {
    type Output: Disposable + Send + 'static;

    fn decode(&self, id: &str, bytes: &[u8]) -> anyhow::Result<Self::Output>;
}

/// RGBA8 pixels of a decoded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Disposable for DecodedImage {}

/// Decodes PNG and JPEG images.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageDecoder;

impl AssetDecoder for ImageDecoder {
    type Output = DecodedImage;

    fn decode(&self, id: &str, bytes: &[u8]) -> anyhow::Result<DecodedImage> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| anyhow::anyhow!("cannot decode image '{}': {}", id, e))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DecodedImage {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

#[derive(Debug)]
struct ProgressEvent {
    ticket: u64,
    progress: f32,
}

enum Outcome<T> {
    Loaded(T),
    Failed(String),
}

struct Completion<T> {
    ticket: u64,
    outcome: Outcome<T>,
}

struct InFlight {
    id: String,
    handle: JoinHandle<()>,
}

pub struct AssetLoader<D: AssetDecoder> {
    runtime: Runtime,
    transport: Arc<dyn AssetTransport>,
    decoder: Arc<D>,
    progress_tx: UnboundedSender<ProgressEvent>,
    progress_rx: UnboundedReceiver<ProgressEvent>,
    done_tx: UnboundedSender<Completion<D::Output>>,
    done_rx: UnboundedReceiver<Completion<D::Output>>,
    in_flight: HashMap<u64, InFlight>,
    next_ticket: u64,
}

impl<D: AssetDecoder> AssetLoader<D> {
    pub fn new(
        transport: Arc<dyn AssetTransport>,
        decoder: D,
        worker_threads: usize,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("asset-loader")
            .enable_all()
            .build()?;
        let (progress_tx, progress_rx) = unbounded_channel();
        let (done_tx, done_rx) = unbounded_channel();
        Ok(Self {
            runtime,
            transport,
            decoder: Arc::new(decoder),
            progress_tx,
            progress_rx,
            done_tx,
            done_rx,
            in_flight: HashMap::new(),
            next_ticket: 0,
        })
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.ticket_of(id).is_some()
    }

    /// Starts loading `id` and begins tracking it.
    ///
    /// Returns `false` if `id` is already being loaded.
    pub fn request(&mut self, id: impl Into<String>, tracker: &mut LoadProgressTracker) -> bool {
        let id = id.into();
        if self.is_loading(&id) {
            log::debug!("asset '{}' is already loading", id);
            return false;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        tracker.begin_item(id.clone());

        let sink = ProgressSink {
            id: id.clone(),
            ticket,
            tx: self.progress_tx.clone(),
        };
        let transport = Arc::clone(&self.transport);
        let decoder = Arc::clone(&self.decoder);
        let done = self.done_tx.clone();
        let task_id = id.clone();
        let handle = self.runtime.spawn(async move {
            let outcome = match transport.fetch(task_id.clone(), sink).await {
                Ok(bytes) => match decoder.decode(&task_id, &bytes) {
                    Ok(value) => Outcome::Loaded(value),
                    Err(e) => Outcome::Failed(format!("{e:#}")),
                },
                Err(e) => Outcome::Failed(format!("{e:#}")),
            };
            let _ = done.send(Completion { ticket, outcome });
        });
        log::debug!("loading asset '{}'", id);
        self.in_flight.insert(ticket, InFlight { id, handle });
        true
    }

    /// Aborts the load of `id` and stops tracking it. A result that arrives
    /// later is discarded.
    pub fn cancel(&mut self, id: &str, tracker: &mut LoadProgressTracker) -> bool {
        let Some(ticket) = self.ticket_of(id) else {
            return false;
        };
        if let Some(load) = self.in_flight.remove(&ticket) {
            load.handle.abort();
            tracker.end_item(&load.id);
            log::debug!("cancelled asset '{}'", load.id);
        }
        true
    }

    /// Cancels every in-flight load and ends its tracked item.
    pub fn cancel_all(&mut self, tracker: &mut LoadProgressTracker) -> usize {
        let count = self.in_flight.len();
        for (_, load) in self.in_flight.drain() {
            load.handle.abort();
            tracker.end_item(&load.id);
        }
        if count > 0 {
            log::debug!("cancelled {} in-flight assets", count);
        }
        count
    }

    /// Applies everything the loads reported since the last poll.
    ///
    /// Progress goes to `tracker`, finished assets into `cache`. Failed loads
    /// are ended in the tracker and returned.
    pub fn poll(
        &mut self,
        cache: &mut ResourceCache<String, D::Output>,
        tracker: &mut LoadProgressTracker,
    ) -> Vec<RenderError> {
        while let Ok(event) = self.progress_rx.try_recv() {
            if let Some(load) = self.in_flight.get(&event.ticket) {
                tracker.update_item(&load.id, event.progress);
            }
        }

        let mut failures = Vec::new();
        while let Ok(completion) = self.done_rx.try_recv() {
            let Some(load) = self.in_flight.remove(&completion.ticket) else {
                if let Outcome::Loaded(mut value) = completion.outcome {
                    value.dispose();
                }
                continue;
            };
            match completion.outcome {
                Outcome::Loaded(value) => {
                    log::info!("loaded asset '{}'", load.id);
                    tracker.end_item(&load.id);
                    cache.store(load.id, value);
                }
                Outcome::Failed(reason) => {
                    log::error!("failed to load asset '{}': {}", load.id, reason);
                    tracker.end_item(&load.id);
                    failures.push(RenderError::LoadFailure { id: load.id, reason });
                }
            }
        }
        failures
    }

    fn ticket_of(&self, id: &str) -> Option<u64> {
        self.in_flight
            .iter()
            .find(|(_, load)| load.id == id)
            .map(|(ticket, _)| *ticket)
    }
}

impl<D: AssetDecoder> Drop for AssetLoader<D> {
    fn drop(&mut self) {
        for (_, load) in self.in_flight.drain() {
            load.handle.abort();
        }
    }
}
