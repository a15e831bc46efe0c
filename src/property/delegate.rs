//! Accessibility delegate adapters: the glue between one
//! [`PropertySlot`](super::PropertySlot) and one attribute of one
//! [`Element`].
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::accessibility::{AttrName, AttrValue, Element};
use crate::error::{Error, Result};

/// What a [`PropertySlot`](super::PropertySlot) asks of its delegate:
/// produce a fresh value of `T`, either as part of batch initialization or
/// a standalone refresh, and (for writable properties) perform a write.
///
/// Trait objects (`Arc<dyn PropertyDelegate<T>>`) are used rather than a
/// generic slot parameter so that `Window`/`Application` can hold a
/// homogeneous set of slots without one type parameter per attribute.
#[async_trait]
pub trait PropertyDelegate<T>: Send + Sync {
    /// Consume the owner's shared, batch-fetched attribute dictionary (or
    /// perform a one-off read, for delegates with no batch to share) and
    /// produce this slot's initial value. The owner issues one
    /// multi-attribute read per object, not one per slot.
    async fn initialize(&self) -> Result<T>;

    /// Issue a standalone background read, bypassing any shared promise.
    async fn read(&self) -> Result<T>;

    /// Write `value`, then read it back, returning what the OS actually
    /// holds afterwards. The default rejects the write; delegates built
    /// with [`AttributeDelegate::writable`] override it.
    async fn write(&self, _value: T) -> Result<T> {
        Err(Error::IllegalValue)
    }
}

/// A batch of attributes fetched once per owner (window or application) and
/// shared by every [`AttributeDelegate`] built on top of it, so the OS is
/// contacted once per object rather than once per attribute.
pub type SharedAttrs<E> = Arc<OnceCell<HashMap<AttrName, Option<AttrValue<E>>>>>;

/// Run `f` (a blocking accessibility call) on the shared background pool,
/// bounded by `timeout`. Every accessibility round trip in this crate
/// funnels through here so that none of it ever blocks the main
/// coordination thread and none of it can hang it indefinitely either.
pub async fn run_blocking<F, R>(timeout: Duration, f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(joined) => {
            joined.unwrap_or_else(|e| Err(Error::TransientFailure(format!("worker task panicked: {e}"))))
        }
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

type DecodeFn<E, T> = Arc<dyn Fn(Option<AttrValue<E>>) -> Result<T> + Send + Sync>;
type EncodeFn<E, T> = Arc<dyn Fn(T) -> AttrValue<E> + Send + Sync>;

/// Adapts one scalar/object attribute of one [`Element`] to the
/// [`PropertyDelegate`] interface, decoding the facade's untyped
/// [`AttrValue`] into `T` and (if built via [`Self::writable`]) encoding
/// `T` back for a write.
///
/// `nil`/absent is surfaced to `decode` as `None`; `decode` is responsible
/// for turning that into either a legitimate "absent" value (when
/// `T = Option<U>`) or `Error::MissingValue` (when the attribute is
/// mandatory).
pub struct AttributeDelegate<E: Element, T> {
    element: E,
    name: AttrName,
    shared: Option<(SharedAttrs<E>, &'static [AttrName])>,
    decode: DecodeFn<E, T>,
    encode: Option<EncodeFn<E, T>>,
    request_timeout: Duration,
}

impl<E: Element, T: Send + Sync + 'static> AttributeDelegate<E, T> {
    /// A read-only delegate for `name`, fetching its value out of `shared`
    /// (a dictionary batch-read once for the whole owner) at
    /// initialization time and re-reading `name` alone on every refresh.
    /// Every round trip issued through this delegate is bounded by
    /// `request_timeout`.
    pub fn new(
        element: E,
        name: AttrName,
        shared: SharedAttrs<E>,
        batch_names: &'static [AttrName],
        request_timeout: Duration,
        decode: impl Fn(Option<AttrValue<E>>) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            element,
            name,
            shared: Some((shared, batch_names)),
            decode: Arc::new(decode),
            encode: None,
            request_timeout,
        }
    }

    /// A delegate with no batch to share, used by singleton probes (e.g.
    /// the space observer) that read exactly one attribute on their own.
    pub fn standalone(
        element: E,
        name: AttrName,
        request_timeout: Duration,
        decode: impl Fn(Option<AttrValue<E>>) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            element,
            name,
            shared: None,
            decode: Arc::new(decode),
            encode: None,
            request_timeout,
        }
    }

    /// Make this delegate writable by supplying an encoder for `T ->
    /// AttrValue`.
    pub fn writable(mut self, encode: impl Fn(T) -> AttrValue<E> + Send + Sync + 'static) -> Self {
        self.encode = Some(Arc::new(encode));
        self
    }

    async fn read_raw(&self) -> Result<Option<AttrValue<E>>> {
        let element = self.element.clone();
        let name = self.name;
        run_blocking(self.request_timeout, move || element.attribute(name)).await
    }
}

#[async_trait]
impl<E: Element, T: Clone + Send + Sync + 'static> PropertyDelegate<T> for AttributeDelegate<E, T> {
    async fn initialize(&self) -> Result<T> {
        let raw = match &self.shared {
            Some((shared, names)) => {
                let element = self.element.clone();
                let names = *names;
                let timeout = self.request_timeout;
                let map = shared
                    .get_or_try_init(|| async move {
                        run_blocking(timeout, move || element.get_multiple_attributes(names)).await
                    })
                    .await?;
                map.get(&self.name).cloned().flatten()
            }
            None => self.read_raw().await?,
        };
        (self.decode)(raw)
    }

    async fn read(&self) -> Result<T> {
        let raw = self.read_raw().await?;
        (self.decode)(raw)
    }

    async fn write(&self, value: T) -> Result<T> {
        let Some(encode) = self.encode.clone() else {
            return Err(Error::IllegalValue);
        };
        let encoded = encode(value);
        let element = self.element.clone();
        let name = self.name;
        let raw = run_blocking(self.request_timeout, move || {
            element.set_attribute(name, encoded)?;
            element.attribute(name)
        })
        .await?;
        (self.decode)(raw)
    }
}
