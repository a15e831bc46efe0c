//! State root and event bus.
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tracing::{debug, info, warn};

use crate::accessibility::{Accessibility, NotificationName};
use crate::application::Application;
use crate::config::Config;
use crate::error::Result;
use crate::ids::{Pid, SpaceId};
use crate::property::delegate::PropertyDelegate;
use crate::property::PropertySlot;
use crate::screen::{diff_screens, global_max_y, Screen};
use crate::space::SpaceObserver;
use crate::window::Window;

/// Every event this crate emits. One enum rather than one
/// type per variant plus a `TypeId`-keyed bus: subscribers pattern-match on the variant they care about,
/// which keeps [`State::on`] a single method instead of one per event
/// name, at the cost of callers filtering their own variant out of the
/// match.
#[derive(Clone)]
pub enum Event<A: Accessibility> {
    FrontmostApplicationChanged {
        old: Option<Application<A>>,
        new: Option<Application<A>>,
        external: bool,
    },
    ApplicationLaunched(Application<A>),
    ApplicationTerminated(Application<A>),
    ApplicationIsHiddenChanged {
        application: Application<A>,
        old: bool,
        new: bool,
        external: bool,
    },
    ApplicationMainWindowChanged {
        application: Application<A>,
        old: Option<Window<A>>,
        new: Option<Window<A>>,
        external: bool,
    },
    ApplicationFocusedWindowChanged {
        application: Application<A>,
        old: Option<Window<A>>,
        new: Option<Window<A>>,
        external: bool,
    },
    WindowCreated(Window<A>),
    WindowDestroyed(Window<A>),
    WindowFrameChanged {
        window: Window<A>,
        old: crate::geometry::Rect,
        new: crate::geometry::Rect,
        external: bool,
    },
    WindowTitleChanged {
        window: Window<A>,
        old: String,
        new: String,
        external: bool,
    },
    WindowMinimizedChanged {
        window: Window<A>,
        old: bool,
        new: bool,
        external: bool,
    },
    ScreenLayoutChanged(crate::screen::ScreenDiff),
    SpaceWillChange(Vec<SpaceId>),
    SpaceDidChange(Vec<SpaceId>),
}

type Handler<A> = Arc<dyn Fn(&Event<A>) + Send + Sync>;

/// Publishes every [`Event`] to its subscribers. Emission is strictly
/// synchronous, in subscription order, and asserted to happen on the main
/// coordination thread — the thread that called
/// [`crate::initialize`].
pub struct EventBus<A: Accessibility> {
    main_thread: std::thread::ThreadId,
    handlers: SyncMutex<Vec<Handler<A>>>,
}

impl<A: Accessibility> EventBus<A> {
    fn new() -> Self {
        Self {
            main_thread: std::thread::current().id(),
            handlers: SyncMutex::new(Vec::new()),
        }
    }

    pub fn on(&self, handler: impl Fn(&Event<A>) + Send + Sync + 'static) {
        self.handlers.lock().push(Arc::new(handler));
    }

    /// Emit `event` to every currently-subscribed handler. The handler
    /// list is snapshotted before dispatch so that a handler which
    /// subscribes during delivery does not receive the in-flight event.
    pub fn emit(&self, event: Event<A>) {
        assert_eq!(
            std::thread::current().id(),
            self.main_thread,
            "events must be emitted on the main coordination thread"
        );
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(&event);
        }
    }
}

/// The root of the observable window-state model. Cheaply `Clone`able; all
/// clones share the same underlying arena.
pub struct State<A: Accessibility> {
    pub(crate) inner: Arc<StateInner<A>>,
}

impl<A: Accessibility> Clone for State<A> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

pub(crate) struct StateInner<A: Accessibility> {
    accessibility: A,
    bus: EventBus<A>,
    applications: SyncMutex<HashMap<Pid, Application<A>>>,
    screens: SyncMutex<Vec<Screen>>,
    space_ids: SyncMutex<HashMap<crate::ids::ScreenId, SpaceId>>,
    space: SpaceObserver<A>,
    /// Bumped on every active-space-change notification; a `space-did-change`
    /// is only emitted if this still matches the generation it started with,
    /// which is how a superseding space change suppresses a stale one.
    space_generation: std::sync::atomic::AtomicU64,
    frontmost: PropertySlot<Option<Pid>>,
    config: Config,
}

impl<A: Accessibility> StateInner<A> {
    /// Mirrors [`State::application`], usable from a delegate that only
    /// holds a `Weak<StateInner<A>>` back-reference (e.g.
    /// [`crate::application::WindowRefDelegate`]) rather than a full
    /// [`State`] handle.
    pub(crate) fn application(&self, pid: Pid) -> Option<Application<A>> {
        self.applications.lock().get(&pid).cloned()
    }

    /// Mirrors [`State::global_max_y`] for the same reason.
    pub(crate) fn global_max_y(&self) -> f64 {
        global_max_y(&self.screens.lock())
    }

    /// Mirrors [`State::request_timeout`] for the same reason.
    pub(crate) fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}

impl<A: Accessibility> State<A> {
    pub fn running_applications(&self) -> Vec<Application<A>> {
        self.inner.applications.lock().values().cloned().collect()
    }

    pub fn known_windows(&self) -> Vec<Window<A>> {
        self.running_applications()
            .iter()
            .flat_map(Application::known_windows)
            .collect()
    }

    pub fn screens(&self) -> Vec<Screen> {
        self.inner.screens.lock().clone()
    }

    pub fn current_space_ids(&self) -> Vec<SpaceId> {
        let screens = self.screens();
        let ids = self.inner.space_ids.lock();
        screens.iter().filter_map(|s| ids.get(&s.id).copied()).collect()
    }

    pub fn frontmost_application(&self) -> Option<Application<A>> {
        let pid = self.inner.frontmost.value().flatten()?;
        self.inner.applications.lock().get(&pid).cloned()
    }

    pub async fn activate_frontmost(&self, pid: Pid) -> Result<Option<Pid>> {
        self.inner.frontmost.set(Some(pid)).await
    }

    /// An opaque snapshot of the space-probe set that can be handed back to
    /// [`crate::initialize_with_recovery_blob`] on a later run so internal
    /// space ids survive a process restart.
    #[cfg(feature = "serde")]
    pub fn recovery_blob(&self) -> Vec<u8> {
        self.inner.space.to_recovery_blob().encode()
    }

    pub fn on(&self, handler: impl Fn(&Event<A>) + Send + Sync + 'static) {
        self.inner.bus.on(handler);
    }

    pub(crate) fn bus(&self) -> &EventBus<A> {
        &self.inner.bus
    }

    pub(crate) fn accessibility(&self) -> &A {
        &self.inner.accessibility
    }

    /// The budget a single accessibility round trip is allowed before it is
    /// reported as [`crate::error::Error::Timeout`].
    pub(crate) fn request_timeout(&self) -> std::time::Duration {
        self.inner.config.request_timeout
    }

    pub(crate) fn application(&self, pid: Pid) -> Option<Application<A>> {
        self.inner.applications.lock().get(&pid).cloned()
    }

    pub(crate) fn global_max_y(&self) -> f64 {
        global_max_y(&self.screens())
    }

    /// Routes a notification delivered on an application's observer to
    /// that application's handler. Dropped silently if the pid is no
    /// longer known (the application may have just terminated).
    pub(crate) fn dispatch_application_notification(&self, pid: Pid, element: A::Element, name: NotificationName) {
        let Some(application) = self.application(pid) else { return };
        tokio::spawn(async move { application.handle_notification(element, name).await });
    }

    /// Enumerate running applications, create+initialize a delegate for
    /// each (retrying individually up to `config.application_init_retries`
    /// times), and build the initial screen and space-id lists
    ///. `recovery_blob`, if given, restores the
    /// space-probe set from an earlier run rather than starting fresh.
    pub(crate) async fn bootstrap(
        accessibility: A,
        config: Config,
        #[cfg(feature = "serde")] recovery_blob: Option<&[u8]>,
    ) -> Result<State<A>> {
        let screens = accessibility.screens();

        #[cfg(feature = "serde")]
        let space = match recovery_blob {
            Some(bytes) if config.persist_space_probes => {
                let blob = crate::space::RecoveryBlob::decode(bytes)?;
                SpaceObserver::restore(accessibility.clone(), &blob)?
            }
            _ => SpaceObserver::new(accessibility.clone()),
        };
        #[cfg(not(feature = "serde"))]
        let space = SpaceObserver::new(accessibility.clone());

        let inner = Arc::new(StateInner {
            bus: EventBus::new(),
            applications: SyncMutex::new(HashMap::new()),
            screens: SyncMutex::new(screens.clone()),
            space_ids: SyncMutex::new(HashMap::new()),
            space,
            space_generation: std::sync::atomic::AtomicU64::new(0),
            frontmost: PropertySlot::new(
                "state.frontmost_application",
                FrontmostDelegate { accessibility: accessibility.clone() },
            ),
            accessibility,
            config,
        });
        let state = State { inner };
        state.wire_events();

        let apps = state.accessibility().enumerate_application_elements();
        for (pid, element) in apps {
            state.spawn_application_with_retry(pid, element).await;
        }

        state.inner.frontmost.initialized().await?;

        state.inner.space.ensure_probes(&screens)?;
        let ids = state.inner.space.recompute(&screens)?;
        *state.inner.space_ids.lock() = ids.into_iter().collect();

        state.wire_os_callbacks();

        info!(count = state.running_applications().len(), "state initialized");
        Ok(state)
    }

    /// Wire change events that the arena-internal machinery (property
    /// slots, application/window delegates) doesn't already emit on its own
    /// — currently just `frontmost-application-changed`, since that slot's
    /// owner is `State` itself rather than an `Application`/`Window`.
    fn wire_events(&self) {
        let state = self.clone();
        self.inner.frontmost.on_change(Arc::new(move |old, new, external| {
            let resolve = |pid: Option<Pid>| pid.and_then(|p| state.application(p));
            state.bus().emit(Event::FrontmostApplicationChanged {
                old: resolve(old),
                new: resolve(new),
                external,
            });
        }));
    }

    /// Register this `State` against every external OS collaborator:
    /// application launch/terminate, screen reconfiguration, and
    /// active-space-change. Each callback is invoked off the main
    /// coordination thread by the backend, so handlers that mutate state or
    /// emit events hop back onto it via `tokio::spawn` on the runtime the
    /// caller of [`crate::initialize`] is driving.
    fn wire_os_callbacks(&self) {
        let state = self.clone();
        self.accessibility().on_application_launched(Box::new(move |pid, element| {
            let state = state.clone();
            tokio::spawn(async move { state.handle_application_launched(pid, element).await });
        }));

        let state = self.clone();
        self.accessibility().on_application_terminated(Box::new(move |pid| {
            state.handle_application_terminated(pid);
        }));

        let state = self.clone();
        self.accessibility().on_screen_layout_changed(Box::new(move |screens| {
            state.handle_screen_layout_changed(screens);
        }));

        let state = self.clone();
        self.accessibility().on_active_space_changed(Box::new(move || {
            let state = state.clone();
            tokio::spawn(async move { state.handle_active_space_changed().await });
        }));
    }

    pub(crate) async fn spawn_application_with_retry(&self, pid: Pid, element: A::Element) {
        let (bundle_id, localized_name) = self.accessibility().application_metadata(pid);
        let attempts = self.inner.config.application_init_retries + 1;
        for attempt in 1..=attempts {
            match Application::initialize(
                self.clone(),
                pid,
                element.clone(),
                bundle_id.clone(),
                localized_name.clone(),
            )
            .await
            {
                Ok(application) => {
                    self.inner.applications.lock().insert(pid, application);
                    return;
                }
                Err(e) if attempt < attempts => {
                    warn!(pid, attempt, %e, "application initialization failed, retrying");
                }
                Err(e) => {
                    warn!(pid, %e, "application initialization failed after all retries; dropping");
                }
            }
        }
    }

    /// Application-launched handler.
    pub(crate) async fn handle_application_launched(&self, pid: Pid, element: A::Element) {
        self.spawn_application_with_retry(pid, element).await;
        if let Some(application) = self.application(pid) {
            self.bus().emit(Event::ApplicationLaunched(application));
        }
        let _ = self.inner.frontmost.refresh().await;
    }

    /// Application-termination handler. The handle
    /// constructed from the cached delegate remains usable in the event
    /// payload even though the application is no longer tracked.
    pub(crate) fn handle_application_terminated(&self, pid: Pid) {
        let Some(application) = self.inner.applications.lock().remove(&pid) else { return };
        self.bus().emit(Event::ApplicationTerminated(application));
    }

    /// Screen-layout-changed handler: recompute the diff against the
    /// cached list and replace it. A probe is minted for
    /// any newly added screen so it has a space id available without
    /// waiting for the next active-space-change.
    pub(crate) fn handle_screen_layout_changed(&self, new_screens: Vec<Screen>) {
        let old_screens = { std::mem::replace(&mut *self.inner.screens.lock(), new_screens.clone()) };
        let diff = diff_screens(&old_screens, &new_screens);
        if !diff.is_empty() {
            self.bus().emit(Event::ScreenLayoutChanged(diff));
        }

        if let Err(e) = self.inner.space.ensure_probes(&new_screens) {
            warn!(%e, "failed to create space probe for new screen");
            return;
        }
        match self.inner.space.recompute(&new_screens) {
            Ok(ids) => *self.inner.space_ids.lock() = ids.into_iter().collect(),
            Err(e) => warn!(%e, "failed to recompute space ids after screen layout change"),
        }
    }

    /// Active-space-change handler. Computes the
    /// new per-screen space ids, emits `space-will-change`, has every
    /// application re-enumerate its windows, then emits `space-did-change`
    /// with the same ids — unless a second active-space-change started and
    /// finished while the re-enumeration was in flight, in which case this
    /// one is stale and is dropped silently.
    pub(crate) async fn handle_active_space_changed(&self) {
        let my_generation = self.inner.space_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let screens = self.screens();
        let ids: Vec<SpaceId> = match self.inner.space.recompute(&screens) {
            Ok(pairs) => pairs.iter().map(|(_, id)| *id).collect(),
            Err(e) => {
                warn!(%e, "failed to recompute space ids on active-space-change");
                return;
            }
        };
        let by_screen: HashMap<_, _> = screens.iter().map(|s| s.id).zip(ids.iter().copied()).collect();

        self.bus().emit(Event::SpaceWillChange(ids.clone()));

        let applications = self.running_applications();
        futures::future::join_all(applications.iter().map(Application::rediscover_windows)).await;

        if self.inner.space_generation.load(Ordering::SeqCst) != my_generation {
            debug!("space change superseded during window re-enumeration; dropping stale did-change");
            return;
        }

        *self.inner.space_ids.lock() = by_screen;
        self.bus().emit(Event::SpaceDidChange(ids));
    }
}

/// Reads the OS application observer's frontmost pid and looks it up
/// through `applications-by-pid`. Writing activates the
/// process; the OS may silently refuse if it has since exited, in which
/// case a later external change reconciles the slot.
struct FrontmostDelegate<A: Accessibility> {
    accessibility: A,
}

#[async_trait::async_trait]
impl<A: Accessibility> PropertyDelegate<Option<Pid>> for FrontmostDelegate<A> {
    async fn initialize(&self) -> Result<Option<Pid>> {
        self.read().await
    }

    async fn read(&self) -> Result<Option<Pid>> {
        Ok(self.accessibility.frontmost_pid())
    }

    async fn write(&self, value: Option<Pid>) -> Result<Option<Pid>> {
        if let Some(pid) = value {
            self.accessibility.activate(pid);
        }
        self.read().await
    }
}
