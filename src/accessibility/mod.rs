//! The low-level accessibility facade.
//!
//! This facade — opaque element handles, attribute get/set, notification
//! subscription — is treated as an external collaborator whose own
//! correctness is out of scope here. What *is* in scope is the trait
//! boundary the rest of the crate is built against, so that the property
//! cache, window/application lifecycle and space tracking can be exercised
//! deterministically under [`mock`] without ever touching the real OS
//! accessibility server: a single trait the pure coordination logic is
//! generic over, with one concrete implementation per backend.
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::Result;
use crate::geometry::{Point, Size};
use crate::ids::Pid;

pub mod mock;

#[cfg(all(target_os = "macos", feature = "macos-backend"))]
pub mod backend;

/// The name of an accessibility attribute, e.g. `AXTitle`. Kept as a thin
/// newtype over a static string rather than an enum so that backends and
/// tests can address attributes this crate's core does not otherwise know
/// about (extensions, future attributes) without a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrName(pub &'static str);

/// The name of an accessibility notification, e.g. `AXWindowCreated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationName(pub &'static str);

pub mod attr {
    use super::AttrName;

    pub const POSITION: AttrName = AttrName("AXPosition");
    pub const SIZE: AttrName = AttrName("AXSize");
    pub const TITLE: AttrName = AttrName("AXTitle");
    pub const MINIMIZED: AttrName = AttrName("AXMinimized");
    pub const FULLSCREEN: AttrName = AttrName("AXFullScreen");
    pub const SUBROLE: AttrName = AttrName("AXSubrole");
    pub const ROLE: AttrName = AttrName("AXRole");
    pub const MAIN_WINDOW: AttrName = AttrName("AXMainWindow");
    pub const FOCUSED_WINDOW: AttrName = AttrName("AXFocusedWindow");
    pub const HIDDEN: AttrName = AttrName("AXHidden");
    pub const MAIN: AttrName = AttrName("AXMain");
    pub const WINDOWS: AttrName = AttrName("AXWindows");
}

pub mod notification {
    use super::NotificationName;

    pub const WINDOW_CREATED: NotificationName = NotificationName("AXWindowCreated");
    pub const UI_ELEMENT_DESTROYED: NotificationName = NotificationName("AXUIElementDestroyed");
    pub const MAIN_WINDOW_CHANGED: NotificationName = NotificationName("AXMainWindowChanged");
    pub const FOCUSED_WINDOW_CHANGED: NotificationName =
        NotificationName("AXFocusedWindowChanged");
    pub const MOVED: NotificationName = NotificationName("AXMoved");
    pub const RESIZED: NotificationName = NotificationName("AXResized");
    pub const TITLE_CHANGED: NotificationName = NotificationName("AXTitleChanged");
    pub const MINIATURIZED: NotificationName = NotificationName("AXWindowMiniaturized");
    pub const DEMINIATURIZED: NotificationName = NotificationName("AXWindowDeminiaturized");
    pub const APPLICATION_ACTIVATED: NotificationName = NotificationName("AXApplicationActivated");
    pub const APPLICATION_DEACTIVATED: NotificationName =
        NotificationName("AXApplicationDeactivated");
    pub const APPLICATION_SHOWN: NotificationName = NotificationName("AXApplicationShown");
    pub const APPLICATION_HIDDEN: NotificationName = NotificationName("AXApplicationHidden");
}

/// A dynamically-typed attribute value. The facade is untyped by design —
/// `element.attribute(name)` yields a value-or-absent — and the per-property
/// delegate adapters (`crate::property::delegate`) are what narrow this back
/// down to a concrete `T`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue<E> {
    Bool(bool),
    String(String),
    Point(Point),
    Size(Size),
    Element(E),
    ElementList(Vec<E>),
}

/// An opaque handle to one UI object (an application or a window) exposed
/// by the accessibility facade.
pub trait Element: Clone + PartialEq + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// The owning process of this element.
    fn pid(&self) -> Result<Pid>;

    /// Read a single scalar/object-valued attribute. `Ok(None)` distinguishes
    /// "present and nil" from a true read failure.
    fn attribute(&self, name: AttrName) -> Result<Option<AttrValue<Self>>>;

    /// Read an array-valued attribute (e.g. `AXWindows`).
    fn array_attribute(&self, name: AttrName) -> Result<Vec<Self>>;

    /// Batch-read several attributes in a single cross-process round trip.
    /// Used by window/application initialization to contact the OS once per
    /// object rather than once per attribute.
    fn get_multiple_attributes(
        &self,
        names: &[AttrName],
    ) -> Result<HashMap<AttrName, Option<AttrValue<Self>>>>;

    /// Write a single attribute.
    fn set_attribute(&self, name: AttrName, value: AttrValue<Self>) -> Result<()>;
}

/// A per-process subscription to accessibility notifications. One
/// `Observer` is created per running application,
/// and is also reused by the space observer's probe windows, which live on
/// this process rather than any application's.
pub trait Observer<E: Element>: Send + Sync + 'static {
    fn add_notification(&self, element: &E, name: NotificationName) -> Result<()>;
    fn remove_notification(&self, element: &E, name: NotificationName) -> Result<()>;
}

/// The callback invoked by an [`Observer`] when a subscribed notification
/// fires. Always invoked off the main coordination thread by the backend;
/// `winstate` is responsible for marshalling it back.
pub type NotificationCallback<E> = Box<dyn Fn(E, NotificationName) + Send + Sync>;

/// The root accessibility facade: enumerate applications, resolve an
/// element for a pid, and mint observers. Also fronts the handful of
/// OS-level collaborators that aren't per-element accessibility calls (the
/// application observer, the screen enumerator, the space tracker) — kept
/// on the same trait rather than three more, since every backend implements
/// all of them together in practice.
pub trait Accessibility: Clone + Send + Sync + 'static {
    type Element: Element;
    type Observer: Observer<Self::Element>;

    /// All currently running applications exposing an accessibility
    /// element, as reported by the OS application observer.
    fn enumerate_application_elements(&self) -> Vec<(Pid, Self::Element)>;

    /// Resolve the top-level accessibility element for a known pid.
    fn element_for_pid(&self, pid: Pid) -> Result<Self::Element>;

    /// Install a notification observer for `pid`, routing every fired
    /// notification through `callback`.
    fn new_observer(
        &self,
        pid: Pid,
        callback: NotificationCallback<Self::Element>,
    ) -> Result<Self::Observer>;

    /// Create an invisible, click-through, borderless native window pinned
    /// to whichever space is currently active, for use as a space probe
    ///. Returns the native window id the OS assigns it.
    fn create_probe_window(&self) -> Result<u32>;

    /// The OS-assigned ids of every window currently visible on the active
    /// space, across all screens.
    fn visible_native_window_ids(&self) -> Result<Vec<u32>>;

    /// The id of whichever physical screen a probe window (named by its
    /// native window id) currently sits on.
    fn native_window_screen(&self, native_id: u32) -> Result<crate::ids::ScreenId>;

    /// The current list of native screens.
    fn screens(&self) -> Vec<crate::screen::Screen>;

    /// The pid the OS application observer currently reports as
    /// frontmost, if any.
    fn frontmost_pid(&self) -> Option<Pid>;

    /// `(bundle_id, localized_name)` for `pid`, read from the OS
    /// application-observer's running-application record rather than the
    /// accessibility element. Read once
    /// at application-delegate construction time; both fields are treated
    /// as immutable for the lifetime of the process.
    fn application_metadata(&self, pid: Pid) -> (Option<String>, Option<String>);

    /// Ask the OS to activate `pid`. May be silently refused if the
    /// process has since exited.
    fn activate(&self, pid: Pid);

    /// Register for application-launched notifications.
    fn on_application_launched(&self, callback: Box<dyn Fn(Pid, Self::Element) + Send + Sync>);

    /// Register for application-terminated notifications.
    fn on_application_terminated(&self, callback: Box<dyn Fn(Pid) + Send + Sync>);

    /// Register for screen-reconfiguration notifications.
    fn on_screen_layout_changed(&self, callback: Box<dyn Fn(Vec<crate::screen::Screen>) + Send + Sync>);

    /// Register for the OS's active-space-change notification.
    fn on_active_space_changed(&self, callback: Box<dyn Fn() + Send + Sync>);
}
