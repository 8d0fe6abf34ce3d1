//! Subscriber notification registry
//!
//! A [`Registry`] is a typed publish/subscribe list. Publishers call
//! [`Registry::run`] with a payload and every registered subscriber is invoked
//! synchronously, in registration order. Two features make it suitable for
//! broadcasting session state:
//!
//! - **Replay-last.** The most recent payload is cached. A subscriber that is
//!   added after a `run` is immediately invoked with it, unless it asks to
//!   ignore previous calls.
//! - **One-shot subscribers.** Subscribers added with `once` are invoked a
//!   single time (a replay counts) and then removed.
//!
//! # Re-entrancy
//!
//! No lock is held while callbacks execute, so a callback may call `run`,
//! `add`, `remove` or `cleanup` on the same registry.
//!
//! - A pass iterates the subscriber list as it was when the pass started.
//! - Removal is mark-then-sweep: a subscriber is flagged first and dropped from
//!   the list afterwards, so removals never shift or skip other subscribers of
//!   a pass that is still running.
//! - A payload becomes the replay value when its pass starts. A subscriber
//!   that joins during a pass is therefore replayed with the in-flight payload,
//!   and a finished outer pass never overwrites the payload of a nested pass
//!   that started after it.
//!
//! # Example
//!
//! ```rust
//! use gatehouse_core::registry::{Registry, SubscribeOptions};
//! use std::sync::{Arc, Mutex};
//!
//! let registry = Registry::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! registry.run("A", None);
//!
//! let sink = seen.clone();
//! registry.add(move |payload: &&str| sink.lock().unwrap().push(*payload), SubscribeOptions::default());
//! registry.run("B", None);
//!
//! assert_eq!(*seen.lock().unwrap(), vec!["A", "B"]);
//! ```
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// Options for [`Registry::add`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Run the subscriber a single time, then unsubscribe it.
    pub once: bool,
    /// Do not replay the payload of a `run` that happened before this subscriber was added.
    pub ignore_previous_calls: bool,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            ignore_previous_calls: false,
        }
    }

    pub fn ignore_previous_calls(mut self) -> Self {
        self.ignore_previous_calls = true;
        self
    }
}

/// What a side effect gets to see about the subscriber it runs for.
pub struct SubscriberMeta<'a> {
    pub id: SubscriberId,
    pub once: bool,
    /// The handle passed to [`Registry::add_with_context`], if any.
    pub context: Option<&'a (dyn Any + Send + Sync)>,
}

/// Runs right before each subscriber's own callback during a pass.
pub type SideEffect<T> = Arc<dyn Fn(&SubscriberMeta<'_>, &T) + Send + Sync>;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: SubscriberId,
    once: bool,
    callback: Callback<T>,
    context: Option<Arc<dyn Any + Send + Sync>>,
    deleted: AtomicBool,
}

impl<T> Subscriber<T> {
    fn meta(&self) -> SubscriberMeta<'_> {
        SubscriberMeta {
            id: self.id,
            once: self.once,
            context: self.context.as_deref(),
        }
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

struct PreviousCall<T> {
    payload: Arc<T>,
    side_effect: Option<SideEffect<T>>,
}

impl<T> Clone for PreviousCall<T> {
    fn clone(&self) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            side_effect: self.side_effect.clone(),
        }
    }
}

struct State<T> {
    subscribers: Vec<Arc<Subscriber<T>>>,
    previous: Option<PreviousCall<T>>,
    next_id: u64,
}

/// A typed subscriber list with replay-last and one-shot semantics.
pub struct Registry<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                subscribers: Vec::new(),
                previous: None,
                next_id: 0,
            }),
        }
    }

    /// Register a subscriber.
    ///
    /// If a previous `run` happened and `ignore_previous_calls` is not set, the
    /// subscriber is invoked right away with the cached payload. With `once`
    /// set, that replay is the subscriber's only invocation.
    pub fn add<F>(&self, callback: F, options: SubscribeOptions) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(Box::new(callback), options, None)
    }

    /// Register a subscriber that carries a caller-supplied handle.
    ///
    /// Side effects passed to [`Registry::run`] can reach the handle through
    /// [`SubscriberMeta::context`].
    pub fn add_with_context<F>(
        &self,
        callback: F,
        options: SubscribeOptions,
        context: Arc<dyn Any + Send + Sync>,
    ) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(Box::new(callback), options, Some(context))
    }

    fn insert(
        &self,
        callback: Callback<T>,
        options: SubscribeOptions,
        context: Option<Arc<dyn Any + Send + Sync>>,
    ) -> SubscriberId {
        let (subscriber, replay) = {
            let mut state = self.state();
            state.next_id += 1;
            let subscriber = Arc::new(Subscriber {
                id: SubscriberId(state.next_id),
                once: options.once,
                callback,
                context,
                deleted: AtomicBool::new(false),
            });
            state.subscribers.push(Arc::clone(&subscriber));

            let replay = if options.ignore_previous_calls {
                None
            } else {
                state.previous.clone()
            };
            (subscriber, replay)
        };

        if let Some(previous) = replay {
            Self::invoke(&subscriber, &previous.payload, previous.side_effect.as_ref());
            if subscriber.is_deleted() {
                self.sweep();
            }
        }

        subscriber.id
    }

    /// Invoke every registered subscriber with `payload`.
    ///
    /// `side_effect`, when given, runs immediately before each subscriber's
    /// callback. It is cached with the payload and runs again for replays.
    pub fn run(&self, payload: T, side_effect: Option<SideEffect<T>>) {
        let payload = Arc::new(payload);
        let subscribers = {
            let mut state = self.state();
            state.previous = Some(PreviousCall {
                payload: Arc::clone(&payload),
                side_effect: side_effect.clone(),
            });
            state.subscribers.clone()
        };

        for subscriber in &subscribers {
            Self::invoke(subscriber, &payload, side_effect.as_ref());
        }

        self.sweep();
    }

    /// Unsubscribe a single subscriber. Returns `false` if it was not registered.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let found = {
            let state = self.state();
            state
                .subscribers
                .iter()
                .find(|s| s.id == id)
                .map(|s| !s.deleted.swap(true, Ordering::AcqRel))
                .unwrap_or(false)
        };
        if found {
            self.sweep();
        }
        found
    }

    /// Drop every subscriber and forget the cached payload.
    pub fn cleanup(&self) {
        let mut state = self.state();
        for subscriber in &state.subscribers {
            subscriber.deleted.store(true, Ordering::Release);
        }
        state.subscribers.clear();
        state.previous = None;
        tracing::debug!("Registry cleaned up");
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.state()
            .subscribers
            .iter()
            .filter(|s| !s.is_deleted())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a payload is cached for replay.
    pub fn has_previous(&self) -> bool {
        self.state().previous.is_some()
    }

    fn invoke(subscriber: &Subscriber<T>, payload: &T, side_effect: Option<&SideEffect<T>>) {
        if subscriber.is_deleted() {
            return;
        }
        // Claim the single invocation up front so a nested pass cannot run it again.
        if subscriber.once && subscriber.deleted.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(effect) = side_effect {
            effect(&subscriber.meta(), payload);
        }
        (subscriber.callback)(payload);
    }

    fn sweep(&self) {
        let mut state = self.state();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| !s.is_deleted());
        let swept = before - state.subscribers.len();
        if swept > 0 {
            tracing::debug!(swept, remaining = state.subscribers.len(), "Swept subscribers");
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
