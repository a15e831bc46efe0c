//! Window lifecycle: the property slots for one window,
//! wired to its per-element accessibility notifications.
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::accessibility::{attr, notification, Accessibility, AttrName, AttrValue, Element};
use crate::application::{Application, ApplicationInner};
use crate::error::{Error, Result};
use crate::geometry::{to_accessibility_space, to_client_space, Point, Rect, Size};
use crate::ids::WindowKey;
use crate::property::delegate::{run_blocking, PropertyDelegate, SharedAttrs};
use crate::property::PropertySlot;
use crate::state::{Event, StateInner};

const BATCH_ATTRS: &[AttrName] = &[
    attr::SUBROLE,
    attr::ROLE,
    attr::POSITION,
    attr::SIZE,
    attr::TITLE,
    attr::MINIMIZED,
    attr::FULLSCREEN,
];

/// A public handle onto one OS window. Strongly retains its owning
/// [`Application`] (which strongly retains [`crate::state::State`]):
/// public handles retain their parent transitively.
pub struct Window<A: Accessibility> {
    pub(crate) application: Application<A>,
    pub(crate) inner: Arc<WindowInner<A>>,
}

impl<A: Accessibility> Clone for Window<A> {
    fn clone(&self) -> Self {
        Self {
            application: self.application.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<A: Accessibility> PartialEq for Window<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
impl<A: Accessibility> Eq for Window<A> {}

impl<A: Accessibility> fmt::Debug for Window<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("key", &self.inner.key)
            .field("valid", &self.is_valid())
            .finish()
    }
}

pub(crate) struct WindowInner<A: Accessibility> {
    pub(crate) key: WindowKey,
    pub(crate) element: A::Element,
    pub(crate) application: Weak<ApplicationInner<A>>,
    observer: Arc<A::Observer>,
    frame: PropertySlot<Rect>,
    title: PropertySlot<String>,
    minimized: PropertySlot<bool>,
    fullscreen: PropertySlot<bool>,
    valid: AtomicBool,
}

impl<A: Accessibility> Window<A> {
    pub fn application(&self) -> Application<A> {
        self.application.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::SeqCst)
    }

    pub fn frame(&self) -> Option<Rect> {
        self.inner.frame.value()
    }

    pub fn position(&self) -> Option<Point> {
        self.frame().map(|r| r.origin)
    }

    pub fn size(&self) -> Option<Size> {
        self.frame().map(|r| r.size)
    }

    pub fn title(&self) -> Option<String> {
        self.inner.title.value()
    }

    pub fn is_minimized(&self) -> Option<bool> {
        self.inner.minimized.value()
    }

    pub fn is_fullscreen(&self) -> Option<bool> {
        self.inner.fullscreen.value()
    }

    /// The screen whose frame contains this window's origin, if any.
    pub fn screen(&self) -> Option<crate::screen::Screen> {
        let origin = self.position()?;
        self.application
            .state()
            .screens()
            .into_iter()
            .find(|s| {
                let r = s.frame;
                origin.x >= r.origin.x
                    && origin.x <= r.origin.x + r.size.w
                    && origin.y >= r.origin.y
                    && origin.y <= r.origin.y + r.size.h
            })
    }

    pub async fn set_frame(&self, frame: Rect) -> Result<Rect> {
        if !self.is_valid() {
            return Err(Error::InvalidObject("window no longer exists".into()));
        }
        self.inner.frame.set(frame).await
    }

    pub async fn set_minimized(&self, minimized: bool) -> Result<bool> {
        if !self.is_valid() {
            return Err(Error::InvalidObject("window no longer exists".into()));
        }
        self.inner.minimized.set(minimized).await
    }

    pub async fn refresh_frame(&self) -> Result<Rect> {
        self.inner.frame.refresh().await
    }

    /// Attempt to construct and initialize a window delegate for `element`,
    /// owned by `application`. Subscribes per-window notifications first;
    /// if the subrole filter rejects the window those subscriptions are
    /// unwound and `Error::Ignored` is returned.
    pub(crate) async fn spawn(application: Application<A>, element: A::Element) -> Result<Window<A>> {
        let key = application.inner.windows.lock().insert_with_key(|_| None);
        let observer = application.inner.observer.clone();

        for name in [
            notification::MOVED,
            notification::RESIZED,
            notification::TITLE_CHANGED,
            notification::MINIATURIZED,
            notification::DEMINIATURIZED,
            notification::UI_ELEMENT_DESTROYED,
        ] {
            if let Err(e) = observer.add_notification(&element, name) {
                warn!(?key, %e, "failed to subscribe window notification");
            }
        }

        let request_timeout = application.state().request_timeout();
        let shared: SharedAttrs<A::Element> = Arc::new(tokio::sync::OnceCell::new());
        let dict = {
            let element = element.clone();
            run_blocking(request_timeout, move || element.get_multiple_attributes(BATCH_ATTRS)).await?
        };
        shared.set(dict.clone()).ok();

        let subrole = dict.get(&attr::SUBROLE).cloned().flatten();
        if let Some(AttrValue::String(s)) = &subrole {
            if s == "AXUnknown" {
                for name in [
                    notification::MOVED,
                    notification::RESIZED,
                    notification::TITLE_CHANGED,
                    notification::MINIATURIZED,
                    notification::DEMINIATURIZED,
                    notification::UI_ELEMENT_DESTROYED,
                ] {
                    let _ = observer.remove_notification(&element, name);
                }
                application.inner.windows.lock().remove(key);
                return Err(Error::Ignored);
            }
        }

        let state = Arc::downgrade(&application.state().inner);
        let frame = PropertySlot::new(
            "window.frame",
            FrameDelegate {
                element: element.clone(),
                shared: shared.clone(),
                state: state.clone(),
            },
        );
        let title = PropertySlot::new(
            "window.title",
            crate::property::delegate::AttributeDelegate::new(
                element.clone(),
                attr::TITLE,
                shared.clone(),
                BATCH_ATTRS,
                request_timeout,
                |raw| match raw {
                    Some(AttrValue::String(s)) => Ok(s),
                    None => Err(Error::MissingValue),
                    _ => Err(Error::MissingValue),
                },
            ),
        );
        let minimized = PropertySlot::new(
            "window.minimized",
            crate::property::delegate::AttributeDelegate::new(
                element.clone(),
                attr::MINIMIZED,
                shared.clone(),
                BATCH_ATTRS,
                request_timeout,
                |raw| match raw {
                    Some(AttrValue::Bool(b)) => Ok(b),
                    None => Ok(false),
                    _ => Err(Error::MissingValue),
                },
            )
            .writable(AttrValue::Bool),
        );
        let fullscreen = PropertySlot::new(
            "window.fullscreen",
            crate::property::delegate::AttributeDelegate::new(
                element.clone(),
                attr::FULLSCREEN,
                shared.clone(),
                BATCH_ATTRS,
                request_timeout,
                |raw| match raw {
                    Some(AttrValue::Bool(b)) => Ok(b),
                    None => Ok(false),
                    _ => Err(Error::MissingValue),
                },
            ),
        );

        let inner = Arc::new(WindowInner {
            key,
            element,
            application: Arc::downgrade(&application.inner),
            observer,
            frame,
            title,
            minimized,
            fullscreen,
            valid: AtomicBool::new(true),
        });

        tokio::try_join!(
            inner.frame.initialized(),
            inner.title.initialized(),
            inner.minimized.initialized(),
            inner.fullscreen.initialized(),
        )?;

        let window = Window { application: application.clone(), inner };
        window.wire_events();

        if let Some(slot) = application.inner.windows.lock().get_mut(key) {
            *slot = Some(window.inner.clone());
        }

        debug!(?key, "window initialized");
        Ok(window)
    }

    fn wire_events(&self) {
        let bus_window = self.clone();
        self.inner.frame.on_change(Arc::new(move |old, new, external| {
            bus_window
                .application
                .state()
                .bus()
                .emit(Event::WindowFrameChanged { window: bus_window.clone(), old, new, external });
        }));

        let bus_window = self.clone();
        self.inner.title.on_change(Arc::new(move |old, new, external| {
            bus_window
                .application
                .state()
                .bus()
                .emit(Event::WindowTitleChanged { window: bus_window.clone(), old, new, external });
        }));

        let bus_window = self.clone();
        self.inner.minimized.on_change(Arc::new(move |old, new, external| {
            bus_window
                .application
                .state()
                .bus()
                .emit(Event::WindowMinimizedChanged { window: bus_window.clone(), old, new, external });
        }));

        for slot_invalidate in [
            invalidate_hook(self.clone(), "frame"),
            invalidate_hook(self.clone(), "title"),
            invalidate_hook(self.clone(), "minimized"),
            invalidate_hook(self.clone(), "fullscreen"),
        ] {
            slot_invalidate();
        }
    }

    pub(crate) fn mark_invalid(&self) {
        self.inner.valid.store(false, Ordering::SeqCst);
    }

    /// Dispatch a routed notification for this window to the slot that
    /// owns it.
    pub(crate) fn handle_notification(&self, name: crate::accessibility::NotificationName) {
        let window = self.clone();
        tokio::spawn(async move {
            match name.0 {
                n if n == notification::MOVED.0 => {
                    let _ = window.inner.frame.refresh().await;
                }
                n if n == notification::RESIZED.0 => {
                    // Resized refreshes both size/frame and fullscreen,
                    // since the OS reports a fullscreen toggle as a resize
                    // of the same window.
                    let _ = window.inner.frame.refresh().await;
                    let _ = window.inner.fullscreen.refresh().await;
                }
                n if n == notification::TITLE_CHANGED.0 => {
                    let _ = window.inner.title.refresh().await;
                }
                n if n == notification::MINIATURIZED.0 => {
                    let _ = window.inner.minimized.refresh().await;
                }
                n if n == notification::DEMINIATURIZED.0 => {
                    let _ = window.inner.minimized.refresh().await;
                }
                _ => trace!(name = name.0, "unhandled window notification"),
            }
        });
    }
}

/// Registers the invalidation sink for `field` on `window`, bound to the
/// owning application's invalidation path. Returns a thunk rather than
/// doing the registration directly so callers can build a small uniform
/// list in [`Window::wire_events`].
fn invalidate_hook<A: Accessibility>(window: Window<A>, field: &'static str) -> impl FnOnce() {
    move || {
        let sink: crate::property::InvalidationSink = Arc::new(move || {
            trace!(field, "window property reported invalid object");
            window.mark_invalid();
        });
        match field {
            "frame" => window.inner.frame.on_invalidate(sink),
            "title" => window.inner.title.on_invalidate(sink),
            "minimized" => window.inner.minimized.on_invalidate(sink),
            "fullscreen" => window.inner.fullscreen.on_invalidate(sink),
            _ => unreachable!(),
        }
    }
}

/// Reads `AXPosition` + `AXSize` together and converts between
/// accessibility space (origin top-left, y downward) and client space
/// (origin bottom-left, y upward relative to the union of all screens).
struct FrameDelegate<A: Accessibility> {
    element: A::Element,
    shared: SharedAttrs<A::Element>,
    state: Weak<StateInner<A>>,
}

impl<A: Accessibility> FrameDelegate<A> {
    fn global_max_y(&self) -> f64 {
        self.state.upgrade().map(|s| s.global_max_y()).unwrap_or(0.0)
    }

    fn request_timeout(&self) -> std::time::Duration {
        self.state
            .upgrade()
            .map(|s| s.request_timeout())
            .unwrap_or_else(|| crate::config::Config::default().request_timeout)
    }

    fn decode(&self, dict: &HashMap<AttrName, Option<AttrValue<A::Element>>>) -> Result<Rect> {
        let point = match dict.get(&attr::POSITION).cloned().flatten() {
            Some(AttrValue::Point(p)) => p,
            _ => return Err(Error::MissingValue),
        };
        let size = match dict.get(&attr::SIZE).cloned().flatten() {
            Some(AttrValue::Size(s)) => s,
            _ => return Err(Error::MissingValue),
        };
        Ok(to_client_space(Rect::from_parts(point, size), self.global_max_y()))
    }
}

#[async_trait]
impl<A: Accessibility> PropertyDelegate<Rect> for FrameDelegate<A> {
    async fn initialize(&self) -> Result<Rect> {
        let element = self.element.clone();
        let timeout = self.request_timeout();
        let map = self
            .shared
            .get_or_try_init(|| async move { run_blocking(timeout, move || element.get_multiple_attributes(BATCH_ATTRS)).await })
            .await?;
        self.decode(map)
    }

    async fn read(&self) -> Result<Rect> {
        let element = self.element.clone();
        let dict = run_blocking(self.request_timeout(), move || {
            element.get_multiple_attributes(&[attr::POSITION, attr::SIZE])
        })
        .await?;
        self.decode(&dict)
    }

    async fn write(&self, value: Rect) -> Result<Rect> {
        let ax_space = to_accessibility_space(value, self.global_max_y());
        let element = self.element.clone();
        let dict = run_blocking(self.request_timeout(), move || {
            element.set_attribute(attr::POSITION, AttrValue::Point(ax_space.origin))?;
            element.set_attribute(attr::SIZE, AttrValue::Size(ax_space.size))?;
            element.get_multiple_attributes(&[attr::POSITION, attr::SIZE])
        })
        .await?;
        self.decode(&dict)
    }
}
