//! The observable property cache primitive.
//!
//! A [`PropertySlot`] holds the last-known value of a single OS attribute.
//! It is generic over the value type `T` and holds its delegate as
//! `Arc<dyn PropertyDelegate<T>>`; the slot itself only owns the
//! concurrency discipline (request serialization, cache protection,
//! change-event emission) below — it never talks to the accessibility
//! facade directly.
//!
//! Optionality ("T vs T-or-absent") is not a separate type-class here:
//! callers that need an absent value simply instantiate `T = Option<U>`
//! (e.g. `Application.main_window: PropertySlot<Option<Window<A>>>`). `T`
//! only needs `Clone + PartialEq` either way, so the machinery below is
//! agnostic to which case it's in, without needing the extra trait.
pub mod delegate;

pub use delegate::PropertyDelegate;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{trace, warn};

use crate::error::{Error, Result};

/// Invoked with `(old, new, external)` whenever a slot's cached value
/// changes. Owners (window/application delegates) wrap this to translate
/// the raw value change into a typed event on [`crate::state::State`]'s bus.
/// The slot itself does no thread marshalling: the owner is responsible
/// for ensuring this runs on the main coordination thread.
pub type ChangeListener<T> = Arc<dyn Fn(T, T, bool) + Send + Sync>;

/// Invoked once, when the delegate reports `Error::InvalidObject` — the
/// slot's owner (a window or application) should mark itself invalid.
pub type InvalidationSink = Arc<dyn Fn() + Send + Sync>;

/// An observable cache of one OS attribute's value.
///
/// See the module docs for the contract. `name` is purely for `tracing`
/// output; it plays no role in equality or identity.
pub struct PropertySlot<T> {
    name: &'static str,
    delegate: Arc<dyn PropertyDelegate<T>>,
    cache: SyncMutex<Option<T>>,
    request: AsyncMutex<()>,
    init: OnceCell<()>,
    on_change: SyncMutex<Option<ChangeListener<T>>>,
    on_invalid: SyncMutex<Option<InvalidationSink>>,
    invalid: AtomicBool,
}

impl<T> PropertySlot<T>
where
    T: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    pub fn new(name: &'static str, delegate: impl PropertyDelegate<T> + 'static) -> Self {
        Self {
            name,
            delegate: Arc::new(delegate),
            cache: SyncMutex::new(None),
            request: AsyncMutex::new(()),
            init: OnceCell::new(),
            on_change: SyncMutex::new(None),
            on_invalid: SyncMutex::new(None),
            invalid: AtomicBool::new(false),
        }
    }

    /// Register the handler that translates raw value changes into a typed
    /// event. Replaces any previously registered handler.
    pub fn on_change(&self, listener: ChangeListener<T>) {
        *self.on_change.lock() = Some(listener);
    }

    /// Register the handler invoked the first time this slot observes
    /// `Error::InvalidObject`.
    pub fn on_invalidate(&self, sink: InvalidationSink) {
        *self.on_invalid.lock() = Some(sink);
    }

    /// The last-known cached value. `None` before initialization has
    /// resolved; callers must await [`Self::initialized`] first.
    pub fn value(&self) -> Option<T> {
        self.cache.lock().clone()
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }

    /// Resolves once the first value has been stored, or once an
    /// initialization failure has been turned into owner invalidation.
    /// All other operations implicitly await this first.
    pub async fn initialized(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| async {
                let _guard = self.request.lock().await;
                trace!(slot = self.name, "initializing property slot");
                match self.delegate.initialize().await {
                    Ok(value) => {
                        *self.cache.lock() = Some(value);
                        Ok(())
                    }
                    Err(Error::MissingValue) => {
                        // A missing required attribute during initialization
                        // fails the slot itself, not just this read.
                        self.mark_invalid();
                        Err(Error::InvalidObject("required attribute missing".into()))
                    }
                    Err(e @ Error::InvalidObject(_)) => {
                        self.mark_invalid();
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map(|_| ())
    }

    /// Issue a background read, update the cache, and emit a change event
    /// (`external = true`) if the fresh value differs from what was cached.
    pub async fn refresh(&self) -> Result<T> {
        self.initialized().await?;
        let _guard = self.request.lock().await;
        let old = self.cache.lock().clone();
        match self.delegate.read().await {
            Ok(new) => {
                *self.cache.lock() = Some(new.clone());
                if let Some(old) = old {
                    if old != new {
                        self.emit(old, new.clone(), true);
                    }
                }
                Ok(new)
            }
            Err(e @ Error::InvalidObject(_)) => {
                self.mark_invalid();
                Err(e)
            }
            Err(e) => {
                warn!(slot = self.name, error = %e, "refresh failed; cached value retained");
                Err(e)
            }
        }
    }

    /// Write `requested`, yielding the value the OS actually holds
    /// afterwards (which may differ). Emits a change event iff the
    /// post-write value differs from the pre-write value, marked
    /// `external = true` iff it also differs from `requested`
    ///. Delegates that never support writing reject this
    /// with `Error::IllegalValue` (see [`PropertyDelegate::write`]'s
    /// default).
    pub async fn set(&self, requested: T) -> Result<T> {
        self.initialized().await?;
        let _guard = self.request.lock().await;
        let old = self
            .cache
            .lock()
            .clone()
            .expect("initialized() resolved without a cached value");
        match self.delegate.write(requested.clone()).await {
            Ok(actual) => {
                *self.cache.lock() = Some(actual.clone());
                if actual != old {
                    let external = actual != requested;
                    self.emit(old, actual.clone(), external);
                }
                Ok(actual)
            }
            Err(e @ Error::InvalidObject(_)) => {
                self.mark_invalid();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn mark_invalid(&self) {
        if !self.invalid.swap(true, Ordering::SeqCst) {
            if let Some(sink) = self.on_invalid.lock().clone() {
                sink();
            }
        }
    }

    fn emit(&self, old: T, new: T, external: bool) {
        if let Some(listener) = self.on_change.lock().clone() {
            listener(old, new, external);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct CountingDelegate {
        reads: AtomicU32,
        values: SyncMutex<Vec<Result<i64>>>,
    }

    #[async_trait]
    impl PropertyDelegate<i64> for CountingDelegate {
        async fn initialize(&self) -> Result<i64> {
            self.read().await
        }

        async fn read(&self) -> Result<i64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut values = self.values.lock();
            if values.is_empty() {
                Ok(0)
            } else {
                values.remove(0)
            }
        }

        async fn write(&self, _value: i64) -> Result<i64> {
            self.read().await
        }
    }

    #[tokio::test]
    async fn refresh_twice_with_no_change_emits_at_most_one_event() {
        let slot = PropertySlot::new(
            "test",
            CountingDelegate {
                reads: AtomicU32::new(0),
                values: SyncMutex::new(vec![Ok(5), Ok(5)]),
            },
        );
        let events = Arc::new(SyncMutex::new(Vec::new()));
        let events2 = events.clone();
        slot.on_change(Arc::new(move |old, new, ext| {
            events2.lock().push((old, new, ext));
        }));

        slot.initialized().await.unwrap();
        slot.refresh().await.unwrap();
        slot.refresh().await.unwrap();

        assert!(events.lock().len() <= 1);
    }

    #[tokio::test]
    async fn set_then_set_same_value_emits_exactly_one_event() {
        let slot = PropertySlot::new(
            "test",
            CountingDelegate {
                reads: AtomicU32::new(0),
                values: SyncMutex::new(vec![Ok(0), Ok(7), Ok(7)]),
            },
        );
        let events = Arc::new(SyncMutex::new(Vec::new()));
        let events2 = events.clone();
        slot.on_change(Arc::new(move |old, new, ext| {
            events2.lock().push((old, new, ext));
        }));

        slot.initialized().await.unwrap();
        slot.set(7).await.unwrap();
        slot.set(7).await.unwrap();

        assert_eq!(events.lock().len(), 1);
    }

    #[tokio::test]
    async fn missing_value_during_initialization_marks_invalid() {
        struct Missing;
        #[async_trait]
        impl PropertyDelegate<i64> for Missing {
            async fn initialize(&self) -> Result<i64> {
                Err(Error::MissingValue)
            }
            async fn read(&self) -> Result<i64> {
                Err(Error::MissingValue)
            }
        }

        let slot = PropertySlot::new("test", Missing);
        let invalidated = Arc::new(AtomicBool::new(false));
        let invalidated2 = invalidated.clone();
        slot.on_invalidate(Arc::new(move || invalidated2.store(true, Ordering::SeqCst)));

        let err = slot.initialized().await.unwrap_err();
        assert!(matches!(err, Error::InvalidObject(_)));
        assert!(slot.is_invalid());
        assert!(invalidated.load(Ordering::SeqCst));
    }
}
