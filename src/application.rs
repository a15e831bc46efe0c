//! Application lifecycle: the window-set for one running
//! process, reconciled against main/focused window identity.
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use slotmap::SlotMap;
use tracing::{debug, trace, warn};

use crate::accessibility::{attr, notification, Accessibility, AttrValue, Element, NotificationName};
use crate::error::{Error, Result};
use crate::ids::{Pid, WindowKey};
use crate::property::delegate::{run_blocking, AttributeDelegate, PropertyDelegate, SharedAttrs};
use crate::property::PropertySlot;
use crate::state::{Event, State, StateInner};
use crate::window::{Window, WindowInner};

const APP_BATCH_ATTRS: &[crate::accessibility::AttrName] =
    &[attr::MAIN_WINDOW, attr::FOCUSED_WINDOW, attr::HIDDEN];

/// What to do with a not-yet-known window element once it stops being
/// unknown, either because `window-created` fires for it or because it
/// turns out to have been destroyed first.
enum Deferred {
    RefreshMainWindow,
    RefreshFocusedWindow,
    Replay(NotificationName),
}

/// A public handle onto one running application. Strongly retains
/// [`State`].
pub struct Application<A: Accessibility> {
    pub(crate) state: State<A>,
    pub(crate) inner: Arc<ApplicationInner<A>>,
}

impl<A: Accessibility> Clone for Application<A> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone(), inner: self.inner.clone() }
    }
}
impl<A: Accessibility> PartialEq for Application<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
impl<A: Accessibility> Eq for Application<A> {}

impl<A: Accessibility> fmt::Debug for Application<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("pid", &self.inner.pid)
            .field("bundle_id", &self.inner.bundle_id)
            .finish()
    }
}

pub(crate) struct ApplicationInner<A: Accessibility> {
    pub(crate) pid: Pid,
    bundle_id: Option<String>,
    localized_name: Option<String>,
    pub(crate) element: A::Element,
    pub(crate) observer: Arc<A::Observer>,
    pub(crate) state: Weak<StateInner<A>>,
    pub(crate) windows: parking_lot::Mutex<SlotMap<WindowKey, Option<Arc<WindowInner<A>>>>>,
    element_index: parking_lot::Mutex<HashMap<A::Element, WindowKey>>,
    deferred: parking_lot::Mutex<HashMap<A::Element, Vec<Deferred>>>,
    main_window: PropertySlot<Option<WindowKey>>,
    focused_window: PropertySlot<Option<WindowKey>>,
    hidden: PropertySlot<bool>,
    valid: AtomicBool,
}

impl<A: Accessibility> Application<A> {
    pub fn pid(&self) -> Pid {
        self.inner.pid
    }

    pub fn bundle_id(&self) -> Option<&str> {
        self.inner.bundle_id.as_deref()
    }

    pub fn localized_name(&self) -> Option<&str> {
        self.inner.localized_name.as_deref()
    }

    pub fn is_hidden(&self) -> Option<bool> {
        self.inner.hidden.value()
    }

    /// Derived, not cached.
    pub fn is_frontmost(&self) -> bool {
        self.state.frontmost_application().as_ref() == Some(self)
    }

    pub fn known_windows(&self) -> Vec<Window<A>> {
        self.inner
            .windows
            .lock()
            .values()
            .filter_map(|w| w.clone())
            .map(|inner| Window { application: self.clone(), inner })
            .collect()
    }

    pub fn main_window(&self) -> Option<Window<A>> {
        self.resolve(self.inner.main_window.value().flatten())
    }

    pub fn focused_window(&self) -> Option<Window<A>> {
        self.resolve(self.inner.focused_window.value().flatten())
    }

    fn resolve(&self, key: Option<WindowKey>) -> Option<Window<A>> {
        let key = key?;
        let inner = self.inner.windows.lock().get(key).cloned().flatten()?;
        Some(Window { application: self.clone(), inner })
    }

    pub(crate) fn state(&self) -> State<A> {
        self.state.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::SeqCst)
    }

    /// Write the main-window-owning application's window: the *window's*
    /// element gets `AXMain = true`, not the application's `AXMainWindow`
    /// attribute, and the OS is relied on to mirror that back
    /// synchronously. Routed through the slot's `set()` so the resulting
    /// change is classified against the requested key rather than emitted
    /// as an unconditional external change.
    pub async fn set_main_window(&self, window: &Window<A>) -> Result<()> {
        if !window.is_valid() {
            return Err(Error::InvalidObject("window no longer exists".into()));
        }
        self.inner.main_window.set(Some(window.inner.key)).await?;
        Ok(())
    }

    /// Construct and initialize an application delegate for `pid`/`element`,
    /// without the State-level retry wrapper.
    pub(crate) async fn initialize(
        state: State<A>,
        pid: Pid,
        element: A::Element,
        bundle_id: Option<String>,
        localized_name: Option<String>,
    ) -> Result<Application<A>> {
        let observer = Arc::new(state.accessibility().new_observer(
            pid,
            {
                let state = state.clone();
                Box::new(move |el, name| state.dispatch_application_notification(pid, el, name))
            },
        )?);

        for name in [
            notification::WINDOW_CREATED,
            notification::MAIN_WINDOW_CHANGED,
            notification::FOCUSED_WINDOW_CHANGED,
            notification::APPLICATION_SHOWN,
            notification::APPLICATION_HIDDEN,
        ] {
            if let Err(e) = observer.add_notification(&element, name) {
                warn!(pid, %e, "failed to subscribe application notification");
            }
        }

        let request_timeout = state.request_timeout();
        let shared: SharedAttrs<A::Element> = Arc::new(tokio::sync::OnceCell::new());
        let state_weak = Arc::downgrade(&state.inner);

        let main_window = PropertySlot::new(
            "application.main_window",
            WindowRefDelegate {
                element: element.clone(),
                name: attr::MAIN_WINDOW,
                shared: shared.clone(),
                state: state_weak.clone(),
                pid,
                request_timeout,
            },
        );
        let focused_window = PropertySlot::new(
            "application.focused_window",
            WindowRefDelegate {
                element: element.clone(),
                name: attr::FOCUSED_WINDOW,
                shared: shared.clone(),
                state: state_weak.clone(),
                pid,
                request_timeout,
            },
        );
        let hidden = PropertySlot::new(
            "application.hidden",
            AttributeDelegate::new(
                element.clone(),
                attr::HIDDEN,
                shared.clone(),
                APP_BATCH_ATTRS,
                request_timeout,
                |raw| match raw {
                    Some(AttrValue::Bool(b)) => Ok(b),
                    None => Ok(false),
                    _ => Err(Error::MissingValue),
                },
            ),
        );

        let inner = Arc::new(ApplicationInner {
            pid,
            bundle_id,
            localized_name,
            element: element.clone(),
            observer,
            state: state_weak,
            windows: parking_lot::Mutex::new(SlotMap::with_key()),
            element_index: parking_lot::Mutex::new(HashMap::new()),
            deferred: parking_lot::Mutex::new(HashMap::new()),
            main_window,
            focused_window,
            hidden,
            valid: AtomicBool::new(true),
        });

        let application = Application { state: state.clone(), inner: inner.clone() };

        application.wire_events();

        let existing: Vec<A::Element> = {
            let element = element.clone();
            run_blocking(request_timeout, move || Ok(element.array_attribute(attr::WINDOWS).unwrap_or_default())).await?
        };

        let window_tasks = existing.into_iter().map(|el| {
            let application = application.clone();
            tokio::spawn(async move {
                match Window::spawn(application.clone(), el.clone()).await {
                    Ok(window) => {
                        application.inner.element_index.lock().insert(el, window.inner.key);
                        Some(window)
                    }
                    Err(Error::Ignored) => None,
                    Err(e) => {
                        warn!(pid, %e, "dropping window that failed to initialize");
                        None
                    }
                }
            })
        });

        // Windows are created for each element in parallel, with individual
        // failures logged rather than failing the app.
        let _windows: Vec<Option<Window<A>>> = futures::future::join_all(window_tasks)
            .await
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();

        tokio::try_join!(
            inner.main_window.initialized(),
            inner.focused_window.initialized(),
            inner.hidden.initialized(),
        )?;

        debug!(pid, "application initialized");
        Ok(application)
    }

    fn wire_events(&self) {
        let app = self.clone();
        self.inner.main_window.on_change(Arc::new(move |old, new, external| {
            let app = app.clone();
            app.state.bus().emit(Event::ApplicationMainWindowChanged {
                application: app.clone(),
                old: app.resolve(old),
                new: app.resolve(new),
                external,
            });
        }));

        let app = self.clone();
        self.inner.focused_window.on_change(Arc::new(move |old, new, external| {
            let app = app.clone();
            app.state.bus().emit(Event::ApplicationFocusedWindowChanged {
                application: app.clone(),
                old: app.resolve(old),
                new: app.resolve(new),
                external,
            });
        }));

        let app = self.clone();
        self.inner.hidden.on_change(Arc::new(move |old, new, external| {
            app.state.bus().emit(Event::ApplicationIsHiddenChanged {
                application: app.clone(),
                old,
                new,
                external,
            });
        }));

        let app = self.clone();
        let sink: crate::property::InvalidationSink = Arc::new(move || app.mark_invalid());
        self.inner.main_window.on_invalidate(sink.clone());
        self.inner.focused_window.on_invalidate(sink.clone());
        self.inner.hidden.on_invalidate(sink);
    }

    fn mark_invalid(&self) {
        self.inner.valid.store(false, Ordering::SeqCst);
    }

    /// Entry point for every notification the application's observer
    /// delivers, routed here by [`State::dispatch_application_notification`].
    pub(crate) async fn handle_notification(&self, element: A::Element, name: NotificationName) {
        match name.0 {
            n if n == notification::WINDOW_CREATED.0 => self.handle_window_created(element).await,
            n if n == notification::MAIN_WINDOW_CHANGED.0 => {
                self.handle_main_or_focused_changed(element, true).await
            }
            n if n == notification::FOCUSED_WINDOW_CHANGED.0 => {
                self.handle_main_or_focused_changed(element, false).await
            }
            n if n == notification::APPLICATION_SHOWN.0 || n == notification::APPLICATION_HIDDEN.0 => {
                let _ = self.inner.hidden.refresh().await;
            }
            n if n == notification::UI_ELEMENT_DESTROYED.0 => self.handle_window_destroyed(element).await,
            _ => {
                if let Some(window) = self.known_window_for(&element) {
                    window.handle_notification(name);
                } else {
                    self.inner
                        .deferred
                        .lock()
                        .entry(element)
                        .or_default()
                        .push(Deferred::Replay(name));
                }
            }
        }
    }

    /// Re-enumerate this application's windows from scratch, spawning a
    /// delegate for any element not already known. Driven by the space
    /// observer after a space change, since the window set visible on the
    /// new space may differ from what was last observed. Windows that disappeared are left to the ordinary
    /// `element-destroyed` notification rather than being reconciled here.
    pub(crate) async fn rediscover_windows(&self) {
        let element = self.inner.element.clone();
        let request_timeout = self.state.request_timeout();
        let existing = match run_blocking(request_timeout, move || Ok(element.array_attribute(attr::WINDOWS).unwrap_or_default())).await
        {
            Ok(els) => els,
            Err(e) => {
                warn!(pid = self.inner.pid, %e, "failed to re-enumerate windows after space change");
                return;
            }
        };
        for element in existing {
            if self.inner.element_index.lock().contains_key(&element) {
                continue;
            }
            self.handle_window_created(element).await;
        }
    }

    fn known_window_for(&self, element: &A::Element) -> Option<Window<A>> {
        let key = *self.inner.element_index.lock().get(element)?;
        self.resolve(Some(key))
    }

    async fn handle_window_created(&self, element: A::Element) {
        if self.inner.element_index.lock().contains_key(&element) {
            return; // idempotent on element equality
        }

        match Window::spawn(self.clone(), element.clone()).await {
            Ok(window) => {
                self.inner.element_index.lock().insert(element.clone(), window.inner.key);
                self.state.bus().emit(Event::WindowCreated(window.clone()));

                let deferred = self.inner.deferred.lock().remove(&element).unwrap_or_default();
                for item in deferred {
                    match item {
                        Deferred::RefreshMainWindow => {
                            let _ = self.inner.main_window.refresh().await;
                        }
                        Deferred::RefreshFocusedWindow => {
                            let _ = self.inner.focused_window.refresh().await;
                        }
                        Deferred::Replay(name) => window.handle_notification(name),
                    }
                }
            }
            Err(Error::Ignored) => {}
            Err(e) => warn!(pid = self.inner.pid, %e, "window-created but initialization failed"),
        }
    }

    async fn handle_window_destroyed(&self, element: A::Element) {
        let key = self.inner.element_index.lock().remove(&element);
        self.inner.deferred.lock().remove(&element);

        let Some(key) = key else { return };
        let removed = self.inner.windows.lock().remove(key).flatten();
        if let Some(inner) = removed {
            let window = Window { application: self.clone(), inner };
            window.mark_invalid();
            self.state.bus().emit(Event::WindowDestroyed(window));
        }
    }

    async fn handle_main_or_focused_changed(&self, element: A::Element, is_main: bool) {
        let refresh = |app: &Self| {
            let app = app.clone();
            async move {
                if is_main {
                    let _ = app.inner.main_window.refresh().await;
                } else {
                    let _ = app.inner.focused_window.refresh().await;
                }
            }
        };

        if element == self.inner.element {
            refresh(self).await;
            return;
        }
        if self.inner.element_index.lock().contains_key(&element) {
            refresh(self).await;
            return;
        }

        self.inner.deferred.lock().entry(element.clone()).or_default().push(if is_main {
            Deferred::RefreshMainWindow
        } else {
            Deferred::RefreshFocusedWindow
        });

        // Probe the element's role in the background: some hosts deliver a
        // distinct object that nonetheless claims to be the application
        //, and a window can be destroyed while this is
        // in flight.
        let app = self.clone();
        let request_timeout = self.state.request_timeout();
        tokio::spawn(async move {
            let probe = element.clone();
            let role = run_blocking(request_timeout, move || probe.attribute(attr::ROLE)).await;
            let drop_and_refresh = match role {
                Ok(Some(AttrValue::String(r))) if r == "AXApplication" => true,
                Err(Error::InvalidObject(_)) => true,
                _ => false,
            };
            if drop_and_refresh {
                app.inner.deferred.lock().remove(&element);
                refresh(&app).await;
            }
        });
    }
}

/// Resolves `AXMainWindow`/`AXFocusedWindow` (an object-valued attribute)
/// down to a [`WindowKey`] already present in the owning application's
/// window-set. An element the application doesn't yet know about decodes
/// to `None` rather than an error: the runtime notification handler is
/// what drives the deferred re-resolution once the window is created.
struct WindowRefDelegate<A: Accessibility> {
    element: A::Element,
    name: crate::accessibility::AttrName,
    shared: SharedAttrs<A::Element>,
    state: Weak<StateInner<A>>,
    pid: Pid,
    request_timeout: std::time::Duration,
}

impl<A: Accessibility> WindowRefDelegate<A> {
    fn decode(&self, raw: Option<AttrValue<A::Element>>) -> Option<WindowKey> {
        let AttrValue::Element(el) = raw? else { return None };
        let state = self.state.upgrade()?;
        let app = state.application(self.pid)?;
        let key = *app.inner.element_index.lock().get(&el)?;
        Some(key)
    }
}

#[async_trait]
impl<A: Accessibility> PropertyDelegate<Option<WindowKey>> for WindowRefDelegate<A> {
    async fn initialize(&self) -> Result<Option<WindowKey>> {
        let element = self.element.clone();
        let timeout = self.request_timeout;
        let map = self
            .shared
            .get_or_try_init(|| async move { run_blocking(timeout, move || element.get_multiple_attributes(APP_BATCH_ATTRS)).await })
            .await?;
        Ok(self.decode(map.get(&self.name).cloned().flatten()))
    }

    async fn read(&self) -> Result<Option<WindowKey>> {
        let element = self.element.clone();
        let name = self.name;
        let raw = run_blocking(self.request_timeout, move || element.attribute(name)).await?;
        Ok(self.decode(raw))
    }

    /// Only `AXMainWindow` is writable: the write lands on the *target
    /// window's* `AXMain` attribute, not on this delegate's own element,
    /// then reads `AXMainWindow` back off the application to confirm what
    /// the OS actually adopted.
    async fn write(&self, value: Option<WindowKey>) -> Result<Option<WindowKey>> {
        if self.name != attr::MAIN_WINDOW {
            return Err(Error::IllegalValue);
        }
        let key = value.ok_or(Error::IllegalValue)?;
        let state = self.state.upgrade().ok_or(Error::IllegalValue)?;
        let app = state.application(self.pid).ok_or(Error::IllegalValue)?;
        let target = app
            .inner
            .windows
            .lock()
            .get(key)
            .cloned()
            .flatten()
            .ok_or(Error::IllegalValue)?;
        let target_element = target.element.clone();
        run_blocking(self.request_timeout, move || {
            target_element.set_attribute(attr::MAIN, AttrValue::Bool(true))
        })
        .await?;
        self.read().await
    }
}
