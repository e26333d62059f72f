//! Bounded replay history with multi-listener fan-out.
//!
//! One lock guards both the history ring and the listener list, so a
//! publish never interleaves with a registration: a listener added while
//! messages are flowing sees every message exactly once, either through
//! replay or through live delivery.
//!
//! Each listener has a high-water-mark (the newest timestamp it has been
//! handed). Replay on registration only delivers buffered messages newer
//! than that mark, so re-registering under the same [`ListenerId`] catches
//! up on what was missed without repeating what was seen.
//!
//! The lock is reentrant. A listener that calls back into the registry from
//! its own thread does not deadlock: removals are queued and applied once
//! the current delivery round finishes, every other call is logged and
//! skipped.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use signal_core::constants::DEFAULT_REPLAY_CAPACITY;
use signal_core::{DomainMessage, ListenerId};
use tracing::{debug, error, warn};

/// Error a listener may return; logged and otherwise ignored.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives delivered messages.
///
/// Called with the registry lock held, so implementations should return
/// quickly. Removing a listener from inside a callback takes effect after
/// the current delivery round.
pub trait MessageListener: Send + Sync {
    /// Handle one message.
    fn on_message(&self, message: &DomainMessage) -> Result<(), ListenerError>;
}

impl<F> MessageListener for F
where
    F: Fn(&DomainMessage) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_message(&self, message: &DomainMessage) -> Result<(), ListenerError> {
        self(message)
    }
}

struct Registered {
    id: ListenerId,
    listener: Arc<dyn MessageListener>,
}

#[derive(Default)]
struct Inner {
    history: VecDeque<DomainMessage>,
    listeners: Vec<Registered>,
    marks: HashMap<ListenerId, i64>,
}

/// Replay buffer plus listener registry.
pub struct ReplayRegistry {
    capacity: usize,
    inner: ReentrantMutex<RefCell<Inner>>,
    deferred_removals: Mutex<Vec<ListenerId>>,
}

impl Default for ReplayRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }
}

impl std::fmt::Debug for ReplayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.lock();
        let mut d = f.debug_struct("ReplayRegistry");
        let _ = d.field("capacity", &self.capacity);
        if let Ok(inner) = guard.try_borrow() {
            let _ = d
                .field("buffered", &inner.history.len())
                .field("listeners", &inner.listeners.len());
        }
        d.finish_non_exhaustive()
    }
}

impl ReplayRegistry {
    /// Create a registry keeping at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: ReentrantMutex::new(RefCell::new(Inner {
                history: VecDeque::with_capacity(capacity),
                ..Inner::default()
            })),
            deferred_removals: Mutex::new(Vec::new()),
        }
    }

    /// Run `f` with exclusive access, or log and return `None` when called
    /// from inside a listener callback.
    fn with_inner<R>(&self, op: &'static str, f: impl FnOnce(&mut Inner) -> R) -> Option<R> {
        let guard = self.inner.lock();
        let Ok(mut inner) = guard.try_borrow_mut() else {
            error!(op, "registry called from inside a listener callback; ignored");
            return None;
        };
        Some(f(&mut *inner))
    }

    /// Run `f` with shared access; `R::default()` inside a callback.
    fn read<R: Default>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        let guard = self.inner.lock();
        match guard.try_borrow() {
            Ok(inner) => f(&*inner),
            Err(_) => R::default(),
        }
    }

    /// Drop listeners whose removal was requested during delivery.
    fn apply_deferred_removals(&self, inner: &mut Inner) {
        let pending = std::mem::take(&mut *self.deferred_removals.lock());
        for id in pending {
            inner.listeners.retain(|r| r.id != id);
            debug!(listener = %id, "listener removed after delivery");
        }
    }

    /// Append `message` to the history and deliver it to every listener in
    /// registration order. Returns the number of listeners that accepted it.
    pub fn publish(&self, message: DomainMessage) -> usize {
        let capacity = self.capacity;
        self.with_inner("publish", |inner| {
            if inner.history.len() == capacity {
                let _ = inner.history.pop_front();
            }
            inner.history.push_back(message);
            let Some(message) = inner.history.back() else {
                return 0;
            };

            let timestamp = message.timestamp();
            let mut accepted = 0;
            for reg in &inner.listeners {
                if deliver(&reg.id, reg.listener.as_ref(), message) {
                    accepted += 1;
                }
                raise_mark(&mut inner.marks, &reg.id, timestamp);
            }
            debug!(kind = message.kind(), timestamp, accepted, "published message");
            self.apply_deferred_removals(inner);
            accepted
        })
        .unwrap_or(0)
    }

    /// Register `listener` under a fresh handle and replay the whole history.
    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) -> ListenerId {
        let id = ListenerId::new();
        let _ = self.add_listener_with_id(id.clone(), listener);
        id
    }

    /// Register `listener` under `id`, replacing any callback already
    /// registered with that id, then replay buffered messages newer than the
    /// id's high-water-mark. Returns the number of messages replayed.
    pub fn add_listener_with_id(&self, id: ListenerId, listener: Arc<dyn MessageListener>) -> usize {
        self.with_inner("add_listener", |inner| {
            match inner.listeners.iter_mut().find(|r| r.id == id) {
                Some(existing) => existing.listener = Arc::clone(&listener),
                None => inner.listeners.push(Registered {
                    id: id.clone(),
                    listener: Arc::clone(&listener),
                }),
            }

            let mark = inner.marks.get(&id).copied();
            let mut replayed = 0;
            for message in &inner.history {
                let timestamp = message.timestamp();
                if mark.is_some_and(|m| timestamp <= m) {
                    continue;
                }
                let _ = deliver(&id, listener.as_ref(), message);
                raise_mark(&mut inner.marks, &id, timestamp);
                replayed += 1;
            }
            debug!(listener = %id, replayed, "listener registered");
            self.apply_deferred_removals(inner);
            replayed
        })
        .unwrap_or(0)
    }

    /// Stop delivering to `id`. Its high-water-mark is kept so a later
    /// re-registration only replays what it missed.
    ///
    /// Called from inside a listener callback, the removal is queued until
    /// the current delivery round ends and `true` is returned.
    pub fn remove_listener(&self, id: &ListenerId) -> bool {
        let guard = self.inner.lock();
        let Ok(mut inner) = guard.try_borrow_mut() else {
            self.deferred_removals.lock().push(id.clone());
            debug!(listener = %id, "listener removal deferred");
            return true;
        };
        let before = inner.listeners.len();
        inner.listeners.retain(|r| &r.id != id);
        let removed = inner.listeners.len() != before;
        if removed {
            debug!(listener = %id, "listener removed");
        }
        removed
    }

    /// Remove every listener and forget all high-water-marks and history.
    pub fn reset(&self) {
        let _ = self.with_inner("reset", |inner| {
            inner.listeners.clear();
            inner.marks.clear();
            inner.history.clear();
        });
        self.deferred_removals.lock().clear();
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.read(|inner| inner.listeners.len())
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &ListenerId) -> bool {
        self.read(|inner| inner.listeners.iter().any(|r| &r.id == id))
    }

    /// Number of buffered messages.
    pub fn buffered(&self) -> usize {
        self.read(|inner| inner.history.len())
    }

    /// Maximum number of buffered messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the history, oldest first.
    pub fn snapshot(&self) -> Vec<DomainMessage> {
        self.read(|inner| inner.history.iter().cloned().collect())
    }

    /// Newest timestamp handed to `id`, if any.
    pub fn high_water_mark(&self, id: &ListenerId) -> Option<i64> {
        self.read(|inner| inner.marks.get(id).copied())
    }
}

fn raise_mark(marks: &mut HashMap<ListenerId, i64>, id: &ListenerId, timestamp: i64) {
    let _ = marks
        .entry(id.clone())
        .and_modify(|m| *m = (*m).max(timestamp))
        .or_insert(timestamp);
}

/// Invoke one listener, isolating errors and panics.
fn deliver(id: &ListenerId, listener: &dyn MessageListener, message: &DomainMessage) -> bool {
    match catch_unwind(AssertUnwindSafe(|| listener.on_message(message))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(listener = %id, timestamp = message.timestamp(), error = %e, "listener failed");
            false
        }
        Err(_) => {
            error!(listener = %id, timestamp = message.timestamp(), "listener panicked");
            false
        }
    }
}
