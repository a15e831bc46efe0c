//! In-memory accessibility facade used throughout the test suite.
//!
//! Driving the real macOS Accessibility API from CI is not viable (it needs
//! a logged-in session with the Accessibility permission granted to the test
//! runner), so every test in this crate is written against `MockAccessibility`
//! instead. Tests drive it explicitly: create an application, create a
//! window on it, then call `fire_notification` to simulate the OS telling us
//! about it.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use parking_lot::Mutex as PLMutex;

use super::{attr, notification, Accessibility, AttrName, AttrValue, Element, NotificationCallback, NotificationName, Observer};
use crate::error::{Error, Result};
use crate::ids::{Pid, ScreenId};
use crate::screen::Screen;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ElementState {
    pid: Pid,
    attrs: HashMap<AttrName, AttrValue<MockElement>>,
    /// Queue of errors to return on the *next* call to `attribute`/
    /// `set_attribute`, consumed in order. Lets a test inject exactly one
    /// timeout or transient failure without permanently breaking the
    /// element.
    fail_next: Vec<Error>,
    /// Once set, every read/write on this element fails with
    /// `Error::InvalidObject` permanently, mirroring the OS tearing down
    /// the underlying UI object.
    invalid: bool,
}

/// A handle to one fake UI object. Cheaply `Clone`able; equality is by
/// identity (two clones of the same element compare equal, two separately
/// created elements never do, even with identical attributes) — exactly the
/// semantics `AXUIElement` has for `CFEqual`.
#[derive(Debug, Clone)]
pub struct MockElement {
    id: u64,
    inner: Arc<Mutex<ElementState>>,
}

impl PartialEq for MockElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for MockElement {}
impl std::hash::Hash for MockElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl MockElement {
    fn new(pid: Pid) -> Self {
        Self {
            id: NEXT_ELEMENT_ID.fetch_add(1, Ordering::SeqCst),
            inner: Arc::new(Mutex::new(ElementState {
                pid,
                attrs: HashMap::new(),
                fail_next: Vec::new(),
                invalid: false,
            })),
        }
    }

    /// Directly overwrite an attribute, bypassing the OS write path. This is
    /// how tests simulate an *external* change (the OS silently snapping a
    /// requested position, or a third party moving a window).
    pub fn poke(&self, name: AttrName, value: AttrValue<MockElement>) {
        self.inner.lock().unwrap().attrs.insert(name, value);
    }

    /// Queue `err` to be returned by exactly the next `attribute`,
    /// `array_attribute` or `set_attribute` call on this element.
    pub fn queue_error(&self, err: Error) {
        self.inner.lock().unwrap().fail_next.push(err);
    }

    /// Permanently mark this element as gone, as if its window/application
    /// had been destroyed by the OS.
    pub fn invalidate(&self) {
        self.inner.lock().unwrap().invalid = true;
    }

    fn take_queued_error(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.invalid {
            return Err(Error::InvalidObject("element marked invalid in mock".into()));
        }
        if !guard.fail_next.is_empty() {
            return Err(guard.fail_next.remove(0));
        }
        Ok(())
    }
}

impl Element for MockElement {
    fn pid(&self) -> Result<Pid> {
        self.take_queued_error()?;
        Ok(self.inner.lock().unwrap().pid)
    }

    fn attribute(&self, name: AttrName) -> Result<Option<AttrValue<Self>>> {
        self.take_queued_error()?;
        Ok(self.inner.lock().unwrap().attrs.get(&name).cloned())
    }

    fn array_attribute(&self, name: AttrName) -> Result<Vec<Self>> {
        self.take_queued_error()?;
        match self.inner.lock().unwrap().attrs.get(&name) {
            Some(AttrValue::ElementList(v)) => Ok(v.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn get_multiple_attributes(
        &self,
        names: &[AttrName],
    ) -> Result<HashMap<AttrName, Option<AttrValue<Self>>>> {
        self.take_queued_error()?;
        let guard = self.inner.lock().unwrap();
        Ok(names
            .iter()
            .map(|n| (*n, guard.attrs.get(n).cloned()))
            .collect())
    }

    fn set_attribute(&self, name: AttrName, value: AttrValue<Self>) -> Result<()> {
        self.take_queued_error()?;
        self.inner.lock().unwrap().attrs.insert(name, value);
        Ok(())
    }
}

/// A no-op [`Observer`] that just records which (element, notification)
/// pairs are currently subscribed, so tests can assert subscribe/unsubscribe
/// behavior (e.g. the subrole filter unwinding its subscriptions).
pub struct MockObserver {
    pid: Pid,
    subscriptions: PLMutex<Vec<(MockElement, NotificationName)>>,
}

impl MockObserver {
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl Observer<MockElement> for MockObserver {
    fn add_notification(&self, element: &MockElement, name: NotificationName) -> Result<()> {
        self.subscriptions.lock().push((element.clone(), name));
        Ok(())
    }

    fn remove_notification(&self, element: &MockElement, name: NotificationName) -> Result<()> {
        self.subscriptions
            .lock()
            .retain(|(e, n)| !(e == element && n.0 == name.0));
        Ok(())
    }
}

type SharedCallback = Arc<dyn Fn(MockElement, NotificationName) + Send + Sync>;
type LaunchCallback = Arc<dyn Fn(Pid, MockElement) + Send + Sync>;
type TerminateCallback = Arc<dyn Fn(Pid) + Send + Sync>;
type ScreenLayoutCallback = Arc<dyn Fn(Vec<Screen>) + Send + Sync>;
type SpaceChangeCallback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    apps: HashMap<Pid, MockElement>,
    metadata: HashMap<Pid, (Option<String>, Option<String>)>,
    callbacks: HashMap<Pid, Vec<SharedCallback>>,
    next_native_id: u32,
    probe_screens: HashMap<u32, ScreenId>,
    visible_native_ids: Vec<u32>,
    screens: Vec<Screen>,
    frontmost_pid: Option<Pid>,
    launch_cbs: Vec<LaunchCallback>,
    terminate_cbs: Vec<TerminateCallback>,
    screen_layout_cbs: Vec<ScreenLayoutCallback>,
    space_change_cbs: Vec<SpaceChangeCallback>,
}

/// The shared, test-driven fake of the whole accessibility facade.
#[derive(Clone)]
pub struct MockAccessibility {
    inner: Arc<PLMutex<Inner>>,
}

impl Default for MockAccessibility {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAccessibility {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PLMutex::new(Inner {
                apps: HashMap::new(),
                metadata: HashMap::new(),
                callbacks: HashMap::new(),
                next_native_id: 1,
                probe_screens: HashMap::new(),
                visible_native_ids: Vec::new(),
                screens: Vec::new(),
                frontmost_pid: None,
                launch_cbs: Vec::new(),
                terminate_cbs: Vec::new(),
                screen_layout_cbs: Vec::new(),
                space_change_cbs: Vec::new(),
            })),
        }
    }

    /// Register a new running application and return its root element.
    /// Does *not* fire the application-launched callback — this is how
    /// tests seed the applications [`State::bootstrap`] enumerates at
    /// startup. Use [`Self::launch_application`] to simulate a process
    /// starting up after `State` already exists.
    pub fn add_application(&self, pid: Pid) -> MockElement {
        let el = MockElement::new(pid);
        el.poke(attr::WINDOWS, AttrValue::ElementList(Vec::new()));
        self.inner.lock().apps.insert(pid, el.clone());
        el
    }

    /// Register a new running application and fire every registered
    /// application-launched callback, simulating a process that starts up
    /// while `State` is already live.
    pub fn launch_application(&self, pid: Pid) -> MockElement {
        let el = self.add_application(pid);
        let callbacks = self.inner.lock().launch_cbs.clone();
        for cb in callbacks {
            cb(pid, el.clone());
        }
        el
    }

    /// Remove `pid` and fire every registered application-terminated
    /// callback.
    pub fn terminate_application(&self, pid: Pid) {
        self.inner.lock().apps.remove(&pid);
        let callbacks = self.inner.lock().terminate_cbs.clone();
        for cb in callbacks {
            cb(pid);
        }
    }

    /// Set the screen layout `State` will enumerate and replay on the next
    /// [`Self::fire_screen_layout_changed`].
    pub fn set_screens(&self, screens: Vec<Screen>) {
        self.inner.lock().screens = screens;
    }

    /// Update the screen layout and fire every registered
    /// screen-layout-changed callback.
    pub fn fire_screen_layout_changed(&self, screens: Vec<Screen>) {
        self.inner.lock().screens = screens.clone();
        let callbacks = self.inner.lock().screen_layout_cbs.clone();
        for cb in callbacks {
            cb(screens.clone());
        }
    }

    pub fn set_frontmost_pid(&self, pid: Option<Pid>) {
        self.inner.lock().frontmost_pid = pid;
    }

    /// Fire every registered active-space-change callback, simulating the
    /// OS reporting that the user switched to a different virtual desktop.
    /// Callers should update [`Self::set_visible_native_window_ids`] first.
    pub fn fire_active_space_changed(&self) {
        let callbacks = self.inner.lock().space_change_cbs.clone();
        for cb in callbacks {
            cb();
        }
    }

    /// Append a new window element to `pid`'s `AXWindows` attribute and
    /// return it. Does *not* fire `AXWindowCreated` — call
    /// [`Self::fire_notification`] explicitly, matching the two-step
    /// "OS creates, then later notifies" reality this is modelling.
    pub fn add_window(
        &self,
        pid: Pid,
        title: &str,
        frame: crate::geometry::Rect,
        subrole: Option<&str>,
    ) -> MockElement {
        let win = MockElement::new(pid);
        win.poke(attr::TITLE, AttrValue::String(title.to_string()));
        win.poke(attr::POSITION, AttrValue::Point(frame.origin));
        win.poke(attr::SIZE, AttrValue::Size(frame.size));
        win.poke(attr::MINIMIZED, AttrValue::Bool(false));
        win.poke(attr::FULLSCREEN, AttrValue::Bool(false));
        win.poke(attr::ROLE, AttrValue::String("AXWindow".into()));
        if let Some(sr) = subrole {
            win.poke(attr::SUBROLE, AttrValue::String(sr.to_string()));
        }

        let apps = self.inner.lock();
        if let Some(app) = apps.apps.get(&pid).cloned() {
            drop(apps);
            let mut windows = match app.attribute(attr::WINDOWS).unwrap() {
                Some(AttrValue::ElementList(v)) => v,
                _ => Vec::new(),
            };
            windows.push(win.clone());
            app.poke(attr::WINDOWS, AttrValue::ElementList(windows));
        }
        win
    }

    /// Simulate the OS delivering `name` for `element` on `pid`'s observer.
    pub fn fire_notification(&self, pid: Pid, element: MockElement, name: NotificationName) {
        let callbacks = self.inner.lock().callbacks.get(&pid).cloned().unwrap_or_default();
        for cb in callbacks {
            cb(element.clone(), name);
        }
    }

    pub fn set_visible_native_window_ids(&self, ids: Vec<u32>) {
        self.inner.lock().visible_native_ids = ids;
    }

    pub fn set_probe_screen(&self, native_id: u32, screen: ScreenId) {
        self.inner.lock().probe_screens.insert(native_id, screen);
    }

    /// Set the `(bundle_id, localized_name)` pair [`Accessibility::
    /// application_metadata`] reports for `pid`. Unset pids report
    /// `(None, None)`.
    pub fn set_application_metadata(&self, pid: Pid, bundle_id: Option<&str>, localized_name: Option<&str>) {
        self.inner.lock().metadata.insert(
            pid,
            (bundle_id.map(String::from), localized_name.map(String::from)),
        );
    }
}

impl Accessibility for MockAccessibility {
    type Element = MockElement;
    type Observer = MockObserver;

    fn enumerate_application_elements(&self) -> Vec<(Pid, MockElement)> {
        self.inner
            .lock()
            .apps
            .iter()
            .map(|(pid, el)| (*pid, el.clone()))
            .collect()
    }

    fn element_for_pid(&self, pid: Pid) -> Result<MockElement> {
        self.inner
            .lock()
            .apps
            .get(&pid)
            .cloned()
            .ok_or(Error::UnknownApplication(pid))
    }

    fn new_observer(
        &self,
        pid: Pid,
        callback: NotificationCallback<MockElement>,
    ) -> Result<MockObserver> {
        let callback: SharedCallback = Arc::from(callback);
        self.inner.lock().callbacks.entry(pid).or_default().push(callback);
        Ok(MockObserver {
            pid,
            subscriptions: PLMutex::new(Vec::new()),
        })
    }

    fn create_probe_window(&self) -> Result<u32> {
        let mut guard = self.inner.lock();
        let id = guard.next_native_id;
        guard.next_native_id += 1;
        Ok(id)
    }

    fn visible_native_window_ids(&self) -> Result<Vec<u32>> {
        Ok(self.inner.lock().visible_native_ids.clone())
    }

    fn native_window_screen(&self, native_id: u32) -> Result<ScreenId> {
        self.inner
            .lock()
            .probe_screens
            .get(&native_id)
            .copied()
            .ok_or_else(|| Error::TransientFailure(format!("no screen recorded for probe {native_id}")))
    }

    fn screens(&self) -> Vec<Screen> {
        self.inner.lock().screens.clone()
    }

    fn frontmost_pid(&self) -> Option<Pid> {
        self.inner.lock().frontmost_pid
    }

    fn application_metadata(&self, pid: Pid) -> (Option<String>, Option<String>) {
        self.inner.lock().metadata.get(&pid).cloned().unwrap_or_default()
    }

    fn activate(&self, pid: Pid) {
        let mut inner = self.inner.lock();
        if inner.apps.contains_key(&pid) {
            inner.frontmost_pid = Some(pid);
        }
    }

    fn on_application_launched(&self, callback: Box<dyn Fn(Pid, MockElement) + Send + Sync>) {
        self.inner.lock().launch_cbs.push(Arc::from(callback));
    }

    fn on_application_terminated(&self, callback: Box<dyn Fn(Pid) + Send + Sync>) {
        self.inner.lock().terminate_cbs.push(Arc::from(callback));
    }

    fn on_screen_layout_changed(&self, callback: Box<dyn Fn(Vec<Screen>) + Send + Sync>) {
        self.inner.lock().screen_layout_cbs.push(Arc::from(callback));
    }

    fn on_active_space_changed(&self, callback: Box<dyn Fn() + Send + Sync>) {
        self.inner.lock().space_change_cbs.push(Arc::from(callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::notification::WINDOW_CREATED;

    #[test]
    fn element_identity_is_by_construction_not_attributes() {
        let ax = MockAccessibility::new();
        let app = ax.add_application(100);
        let w1 = ax.add_window(100, "same title", crate::geometry::Rect::new(0.0, 0.0, 1.0, 1.0), None);
        let w2 = ax.add_window(100, "same title", crate::geometry::Rect::new(0.0, 0.0, 1.0, 1.0), None);
        assert_ne!(w1, w2);
        assert_eq!(app.pid().unwrap(), 100);
    }

    #[test]
    fn fire_notification_invokes_all_registered_callbacks() {
        let ax = MockAccessibility::new();
        ax.add_application(7);
        let seen = Arc::new(Mutex::new(0));
        let seen2 = seen.clone();
        let _observer = ax
            .new_observer(
                7,
                Box::new(move |_el, name| {
                    assert_eq!(name.0, WINDOW_CREATED.0);
                    *seen2.lock().unwrap() += 1;
                }),
            )
            .unwrap();
        let win = ax.add_window(7, "t", crate::geometry::Rect::default(), None);
        ax.fire_notification(7, win, WINDOW_CREATED);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
