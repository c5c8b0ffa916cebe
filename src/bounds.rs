//! Scene bounds and their subscribers.
//!
//! The [`SceneBoundsBroadcaster`] keeps the union of the bounds of all active
//! scene objects. It is recomputed from scratch when the scene composition
//! changes (or when asked to), never patched incrementally and never every
//! frame. When the result differs from the previous one, subscribers are
//! notified synchronously, so a camera has re-framed itself before the code
//! that changed the scene continues.
//!
//! Subscribers are held weakly. A subscriber that goes away without
//! unsubscribing is pruned with a warning instead of being called.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::{camera::ViewCamera, data_structures::aabb::Aabb};

/// Receives bounds changes. `None` means the scene is empty.
pub trait BoundsSubscriber {
    fn on_bounds_changed(&mut self, bounds: Option<&Aabb>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct SceneBoundsBroadcaster {
    bounds: Option<Aabb>,
    subscribers: Vec<(SubscriptionId, Weak<RefCell<dyn BoundsSubscriber>>)>,
    next_id: u64,
}

impl SceneBoundsBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current union of all object bounds; `None` while the scene is empty.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscribe<S>(&mut self, subscriber: &Rc<RefCell<S>>) -> SubscriptionId
    where
        S: BoundsSubscriber + 'static,
    {
        let subscriber: Rc<RefCell<dyn BoundsSubscriber>> = subscriber.clone();
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Rc::downgrade(&subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        before != self.subscribers.len()
    }

    /// Replaces the bounds with the union of `boxes`.
    ///
    /// Returns `true` and notifies subscribers if the result changed.
    pub fn recompute<I>(&mut self, boxes: I) -> bool
    where
        I: IntoIterator<Item = Aabb>,
    {
        let bounds = Aabb::union_all(boxes);
        if bounds == self.bounds {
            return false;
        }
        log::debug!("scene bounds changed: {:?}", bounds);
        self.bounds = bounds;
        self.notify();
        true
    }

    fn notify(&mut self) {
        let before = self.subscribers.len();
        self.subscribers
            .retain(|(_, subscriber)| subscriber.strong_count() > 0);
        if self.subscribers.len() != before {
            log::warn!(
                "{} bounds subscriber(s) were dropped without unsubscribing",
                before - self.subscribers.len()
            );
        }
        let live: Vec<_> = self
            .subscribers
            .iter()
            .filter_map(|(_, subscriber)| subscriber.upgrade())
            .collect();
        for subscriber in live {
            match subscriber.try_borrow_mut() {
                Ok(mut subscriber) => subscriber.on_bounds_changed(self.bounds.as_ref()),
                Err(_) => log::warn!("bounds subscriber is busy; skipping notification"),
            }
        }
    }
}

/// A live subscription, owned by the subscriber so it can cancel it on
/// disposal.
#[derive(Debug)]
pub struct BoundsSubscription {
    broadcaster: Weak<RefCell<SceneBoundsBroadcaster>>,
    id: SubscriptionId,
}

impl BoundsSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unsubscribes. Returns `false` if the broadcaster is gone or the
    /// subscription was already removed.
    pub fn cancel(self) -> bool {
        let Some(broadcaster) = self.broadcaster.upgrade() else {
            return false;
        };
        match broadcaster.try_borrow_mut() {
            Ok(mut broadcaster) => broadcaster.unsubscribe(self.id),
            Err(_) => {
                log::warn!("cannot unsubscribe {:?} while bounds are being broadcast", self.id);
                false
            }
        }
    }
}

/// Subscribes `camera` to `broadcaster`, hands it the subscription and fits it
/// to the current bounds if there are any.
pub fn attach_camera<C>(broadcaster: &Rc<RefCell<SceneBoundsBroadcaster>>, camera: &Rc<RefCell<C>>)
where
    C: ViewCamera + 'static,
{
    let (id, bounds) = {
        let mut broadcaster = broadcaster.borrow_mut();
        (broadcaster.subscribe(camera), broadcaster.bounds())
    };
    let subscription = BoundsSubscription {
        broadcaster: Rc::downgrade(broadcaster),
        id,
    };
    let mut camera = camera.borrow_mut();
    camera.attach(subscription);
    if let Some(bounds) = bounds {
        camera.on_bounds_changed(Some(&bounds));
    }
}
