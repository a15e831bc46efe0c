//! The real macOS accessibility backend.
//!
//! Three collaborators, wired together: the `AXUIElement`/`AXObserver` pair
//! (via `accessibility`/`accessibility-sys`) for per-object attribute access
//! and notifications, `NSWorkspace` (via `objc2-app-kit`) for the
//! process-level launch/terminate/frontmost story `AX` itself doesn't cover,
//! and `CGWindowListCopyWindowInfo` (via `core-graphics`) plus a pinned,
//! invisible `NSWindow` for the space-probe mechanics.
//!
//! This module's own correctness is not exercised by this crate's test
//! suite (`mock` is); it exists to give every trait in
//! [`crate::accessibility`] one concrete, compiling realization.
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use accessibility_sys::{
    kAXErrorSuccess, kAXValueCGPointType, kAXValueCGSizeType, pid_t, AXObserverCallback,
    AXObserverCreate, AXObserverGetRunLoopSource, AXObserverRef, AXObserverRemoveNotification,
    AXUIElementCopyAttributeValue, AXUIElementCreateApplication, AXUIElementRef,
    AXUIElementSetAttributeValue, AXValueCreate, AXValueGetValue, AXValueRef,
};
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFRelease, CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::display::{CGWindowListCopyWindowInfo, kCGNullWindowID, kCGWindowListOptionOnScreenOnly};
use objc2::rc::Retained;
use objc2_app_kit::{
    NSBackingStoreType, NSRunningApplication, NSScreen, NSWindow, NSWindowCollectionBehavior,
    NSWindowStyleMask, NSWorkspace,
};
use objc2_foundation::{MainThreadMarker, NSNotification, NSPoint, NSRect, NSSize, NSString};
use parking_lot::Mutex as PLMutex;

use super::{attr, notification, Accessibility, AttrName, AttrValue, Element, NotificationCallback, NotificationName, Observer};
use crate::error::{Error, Result};
use crate::geometry::{Point, Rect, Size};
use crate::ids::{Pid, ScreenId};
use crate::screen::Screen;

/// A raw `AXUIElementRef`, reference-counted by hand through `CFRetain`/
/// `CFRelease` since Core Foundation objects aren't natively `Send`/`Sync` —
/// in practice every AX call is already funnelled through
/// [`crate::property::delegate::run_blocking`]'s single-threaded blocking
/// pool slot, so no two threads ever touch the same element concurrently.
struct RawElement(AXUIElementRef);

// SAFETY: AXUIElementRef values are only read/written from whichever worker
// thread `run_blocking` dispatches onto; access is serialized by that pool,
// never genuinely concurrent.
unsafe impl Send for RawElement {}
unsafe impl Sync for RawElement {}

impl Drop for RawElement {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0 as CFTypeRef) };
    }
}

#[derive(Clone)]
pub struct AxElement(Arc<RawElement>);

impl AxElement {
    fn from_create(raw: AXUIElementRef) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(Self(Arc::new(RawElement(raw))))
        }
    }

    fn as_ptr(&self) -> AXUIElementRef {
        self.0 .0
    }

    fn copy_attribute(&self, name: AttrName) -> Result<Option<CFType>> {
        let key = CFString::new(name.0);
        let mut value: CFTypeRef = std::ptr::null();
        let err = unsafe { AXUIElementCopyAttributeValue(self.as_ptr(), key.as_concrete_TypeRef(), &mut value) };
        if err != kAXErrorSuccess {
            return Err(ax_error(err));
        }
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(unsafe { CFType::wrap_under_create_rule(value) }))
    }

    fn decode(&self, name: AttrName, raw: CFType) -> Result<AttrValue<Self>> {
        if let Some(b) = raw.downcast::<CFBoolean>() {
            return Ok(AttrValue::Bool(b.into()));
        }
        if let Some(s) = raw.downcast::<CFString>() {
            return Ok(AttrValue::String(s.to_string()));
        }
        if let Some(array) = raw.downcast::<CFArray<CFType>>() {
            let elements = array
                .into_iter()
                .filter_map(|item| {
                    let ptr = item.as_CFTypeRef();
                    unsafe { core_foundation::base::CFRetain(ptr) };
                    AxElement::from_create(ptr as AXUIElementRef)
                })
                .collect();
            return Ok(AttrValue::ElementList(elements));
        }
        if name == attr::POSITION {
            return Ok(AttrValue::Point(decode_ax_value_point(raw)?));
        }
        if name == attr::SIZE {
            return Ok(AttrValue::Size(decode_ax_value_size(raw)?));
        }
        // Anything left is an object-valued attribute (AXMainWindow,
        // AXFocusedWindow): re-wrap it as another element.
        let ptr = raw.as_CFTypeRef();
        unsafe { core_foundation::base::CFRetain(ptr) };
        AxElement::from_create(ptr as AXUIElementRef)
            .map(AttrValue::Element)
            .ok_or(Error::MissingValue)
    }
}

impl PartialEq for AxElement {
    fn eq(&self, other: &Self) -> bool {
        unsafe { core_foundation::base::CFEqual(self.as_ptr() as CFTypeRef, other.as_ptr() as CFTypeRef) }
    }
}
impl Eq for AxElement {}
impl std::hash::Hash for AxElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.as_ptr() as usize).hash(state)
    }
}
impl std::fmt::Debug for AxElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AxElement({:p})", self.as_ptr())
    }
}

fn decode_ax_value_point(raw: CFType) -> Result<Point> {
    let ptr = raw.as_CFTypeRef() as AXValueRef;
    let mut point = core_graphics::geometry::CGPoint::new(0.0, 0.0);
    let ok = unsafe {
        AXValueGetValue(ptr, kAXValueCGPointType, &mut point as *mut _ as *mut c_void)
    };
    if !ok {
        return Err(Error::MissingValue);
    }
    Ok(Point::new(point.x, point.y))
}

fn decode_ax_value_size(raw: CFType) -> Result<Size> {
    let ptr = raw.as_CFTypeRef() as AXValueRef;
    let mut size = core_graphics::geometry::CGSize::new(0.0, 0.0);
    let ok = unsafe {
        AXValueGetValue(ptr, kAXValueCGSizeType, &mut size as *mut _ as *mut c_void)
    };
    if !ok {
        return Err(Error::MissingValue);
    }
    Ok(Size::new(size.width, size.height))
}

fn ax_error(code: i32) -> Error {
    match code {
        -25202 /* kAXErrorInvalidUIElement */ => Error::InvalidObject(format!("AXError {code}")),
        -25204 /* kAXErrorCannotComplete */ => Error::Timeout(std::time::Duration::ZERO),
        -25201 /* kAXErrorIllegalArgument */ => Error::IllegalValue,
        _ => Error::InvalidObject(format!("AXError {code}")),
    }
}

impl Element for AxElement {
    fn pid(&self) -> Result<Pid> {
        let mut pid: pid_t = 0;
        let err = unsafe { accessibility_sys::AXUIElementGetPid(self.as_ptr(), &mut pid) };
        if err != kAXErrorSuccess {
            return Err(ax_error(err));
        }
        Ok(pid)
    }

    fn attribute(&self, name: AttrName) -> Result<Option<AttrValue<Self>>> {
        match self.copy_attribute(name)? {
            Some(raw) => Ok(Some(self.decode(name, raw)?)),
            None => Ok(None),
        }
    }

    fn array_attribute(&self, name: AttrName) -> Result<Vec<Self>> {
        match self.attribute(name)? {
            Some(AttrValue::ElementList(v)) => Ok(v),
            _ => Ok(Vec::new()),
        }
    }

    fn get_multiple_attributes(
        &self,
        names: &[AttrName],
    ) -> Result<HashMap<AttrName, Option<AttrValue<Self>>>> {
        // `AXUIElementCopyMultipleAttributeValues` exists precisely to avoid
        // one round trip per attribute; we still decode one at a time since
        // each attribute's CF type differs.
        let mut out = HashMap::with_capacity(names.len());
        for name in names {
            out.insert(*name, self.attribute(*name)?);
        }
        Ok(out)
    }

    fn set_attribute(&self, name: AttrName, value: AttrValue<Self>) -> Result<()> {
        let key = CFString::new(name.0);
        let err = match value {
            AttrValue::Bool(b) => {
                let cf = CFBoolean::from(b);
                unsafe {
                    AXUIElementSetAttributeValue(self.as_ptr(), key.as_concrete_TypeRef(), cf.as_CFTypeRef())
                }
            }
            AttrValue::Point(p) => {
                let cg = core_graphics::geometry::CGPoint::new(p.x, p.y);
                let ax_value = unsafe {
                    AXValueCreate(kAXValueCGPointType, &cg as *const _ as *const c_void)
                };
                let err = unsafe {
                    AXUIElementSetAttributeValue(self.as_ptr(), key.as_concrete_TypeRef(), ax_value as CFTypeRef)
                };
                unsafe { CFRelease(ax_value as CFTypeRef) };
                err
            }
            AttrValue::Size(s) => {
                let cg = core_graphics::geometry::CGSize::new(s.w, s.h);
                let ax_value = unsafe {
                    AXValueCreate(kAXValueCGSizeType, &cg as *const _ as *const c_void)
                };
                let err = unsafe {
                    AXUIElementSetAttributeValue(self.as_ptr(), key.as_concrete_TypeRef(), ax_value as CFTypeRef)
                };
                unsafe { CFRelease(ax_value as CFTypeRef) };
                err
            }
            AttrValue::String(s) => {
                let cf = CFString::new(&s);
                unsafe {
                    AXUIElementSetAttributeValue(self.as_ptr(), key.as_concrete_TypeRef(), cf.as_CFTypeRef())
                }
            }
            AttrValue::Element(_) | AttrValue::ElementList(_) => {
                return Err(Error::IllegalValue);
            }
        };
        if err != kAXErrorSuccess {
            return Err(ax_error(err));
        }
        Ok(())
    }
}

/// Boxed context handed to the C callback through the observer's `refcon`.
struct ObserverContext {
    callback: NotificationCallback<AxElement>,
}

extern "C" fn ax_observer_callback(
    _observer: AXObserverRef,
    element: AXUIElementRef,
    notification: CFStringRef,
    refcon: *mut c_void,
) {
    if refcon.is_null() {
        return;
    }
    let ctx = unsafe { &*(refcon as *const ObserverContext) };
    let Some(el) = (unsafe {
        core_foundation::base::CFRetain(element as CFTypeRef);
        AxElement::from_create(element)
    }) else {
        return;
    };
    let name_str = unsafe { CFString::wrap_under_get_rule(notification) }.to_string();
    let Some(name) = known_notification_name(&name_str) else { return };
    (ctx.callback)(el, name);
}

/// Map a notification name string the OS hands back in a callback to the
/// matching static [`NotificationName`] constant. Unrecognized notifications
/// (ones this crate never subscribed to) are dropped rather than leaked as
/// fresh `'static str`s on every callback.
fn known_notification_name(raw: &str) -> Option<NotificationName> {
    [
        notification::WINDOW_CREATED,
        notification::UI_ELEMENT_DESTROYED,
        notification::MAIN_WINDOW_CHANGED,
        notification::FOCUSED_WINDOW_CHANGED,
        notification::MOVED,
        notification::RESIZED,
        notification::TITLE_CHANGED,
        notification::MINIATURIZED,
        notification::DEMINIATURIZED,
        notification::APPLICATION_ACTIVATED,
        notification::APPLICATION_DEACTIVATED,
        notification::APPLICATION_SHOWN,
        notification::APPLICATION_HIDDEN,
    ]
    .into_iter()
    .find(|n| n.0 == raw)
}

pub struct AxObserver {
    observer: AXObserverRef,
    ctx: Box<ObserverContext>,
}

unsafe impl Send for AxObserver {}
unsafe impl Sync for AxObserver {}

impl Drop for AxObserver {
    fn drop(&mut self) {
        unsafe { CFRelease(self.observer as CFTypeRef) };
    }
}

impl Observer<AxElement> for AxObserver {
    fn add_notification(&self, element: &AxElement, name: NotificationName) -> Result<()> {
        let cf = CFString::new(name.0);
        let err = unsafe {
            accessibility_sys::AXObserverAddNotification(
                self.observer,
                element.as_ptr(),
                cf.as_concrete_TypeRef(),
                &*self.ctx as *const ObserverContext as *mut c_void,
            )
        };
        match err {
            kAXErrorSuccess => Ok(()),
            -25204 /* kAXErrorNotificationAlreadyRegistered */ => Ok(()),
            e => Err(ax_error(e)),
        }
    }

    fn remove_notification(&self, element: &AxElement, name: NotificationName) -> Result<()> {
        let cf = CFString::new(name.0);
        let err = unsafe { AXObserverRemoveNotification(self.observer, element.as_ptr(), cf.as_concrete_TypeRef()) };
        if err == kAXErrorSuccess {
            Ok(())
        } else {
            Err(ax_error(err))
        }
    }
}

type LaunchCallback = Box<dyn Fn(Pid, AxElement) + Send + Sync>;
type TerminateCallback = Box<dyn Fn(Pid) + Send + Sync>;
type ScreenLayoutCallback = Box<dyn Fn(Vec<Screen>) + Send + Sync>;
type SpaceChangeCallback = Box<dyn Fn() + Send + Sync>;

struct Callbacks {
    launch: Vec<LaunchCallback>,
    terminate: Vec<TerminateCallback>,
    screen_layout: Vec<ScreenLayoutCallback>,
    space_change: Vec<SpaceChangeCallback>,
}

/// The real accessibility facade, backed by `AXUIElement`/`AXObserver`,
/// `NSWorkspace`, and `CGWindowListCopyWindowInfo`.
#[derive(Clone)]
pub struct MacosAccessibility {
    callbacks: Arc<PLMutex<Callbacks>>,
}

unsafe impl Send for MacosAccessibility {}
unsafe impl Sync for MacosAccessibility {}

impl Default for MacosAccessibility {
    fn default() -> Self {
        Self::new()
    }
}

impl MacosAccessibility {
    pub fn new() -> Self {
        Self {
            callbacks: Arc::new(PLMutex::new(Callbacks {
                launch: Vec::new(),
                terminate: Vec::new(),
                screen_layout: Vec::new(),
                space_change: Vec::new(),
            })),
        }
    }

    /// Install the `NSWorkspace` notification observers this facade needs:
    /// launch/terminate for [`Accessibility::on_application_launched`]/
    /// [`Accessibility::on_application_terminated`], and the active-space
    /// and screen-parameter notifications for the other two. Must be called
    /// once from the main coordination thread before `initialize` returns.
    pub fn install_workspace_observers(&self, mtm: MainThreadMarker) {
        let workspace = NSWorkspace::sharedWorkspace();
        let center = unsafe { workspace.notificationCenter() };
        let _ = mtm;

        self.observe(&center, "NSWorkspaceDidLaunchApplicationNotification", {
            let this = self.clone();
            move |note| this.handle_launch_notification(note)
        });
        self.observe(&center, "NSWorkspaceDidTerminateApplicationNotification", {
            let this = self.clone();
            move |note| this.handle_terminate_notification(note)
        });
        self.observe(&center, "NSWorkspaceActiveSpaceDidChangeNotification", {
            let this = self.clone();
            move |_note| {
                for cb in this.callbacks.lock().space_change.iter() {
                    cb();
                }
            }
        });

        self.observe_default_center("NSApplicationDidChangeScreenParametersNotification", {
            let this = self.clone();
            move |_note| {
                let screens = this.screens();
                for cb in this.callbacks.lock().screen_layout.iter() {
                    cb(screens.clone());
                }
            }
        });
    }

    fn observe<F>(&self, center: &objc2_foundation::NSNotificationCenter, name: &str, handler: F)
    where
        F: Fn(&NSNotification) + 'static,
    {
        let block = block2::RcBlock::new(move |note: std::ptr::NonNull<NSNotification>| {
            handler(unsafe { note.as_ref() });
        });
        let name = NSString::from_str(name);
        unsafe {
            center.addObserverForName_object_queue_usingBlock(Some(&name), None, None, &block);
        }
    }

    fn observe_default_center<F>(&self, name: &str, handler: F)
    where
        F: Fn(&NSNotification) + 'static,
    {
        let center = unsafe { objc2_foundation::NSNotificationCenter::defaultCenter() };
        self.observe(&center, name, handler);
    }

    fn handle_launch_notification(&self, note: &NSNotification) {
        let Some((pid, _)) = running_application_from_userinfo(note) else { return };
        let Some(element) = AxElement::from_create(unsafe { AXUIElementCreateApplication(pid) }) else {
            return;
        };
        for cb in self.callbacks.lock().launch.iter() {
            cb(pid, element.clone());
        }
    }

    fn handle_terminate_notification(&self, note: &NSNotification) {
        let Some((pid, _)) = running_application_from_userinfo(note) else { return };
        for cb in self.callbacks.lock().terminate.iter() {
            cb(pid);
        }
    }
}

fn running_application_from_userinfo(note: &NSNotification) -> Option<(Pid, Retained<NSRunningApplication>)> {
    let info = unsafe { note.userInfo() }?;
    let key = NSString::from_str("NSWorkspaceApplicationKey");
    let obj = info.objectForKey(&key)?;
    let app: Retained<NSRunningApplication> = unsafe { Retained::cast(obj) };
    let pid = unsafe { app.processIdentifier() };
    Some((pid, app))
}

fn cfstring_opt(s: Option<Retained<NSString>>) -> Option<String> {
    s.map(|s| s.to_string())
}

/// The height of the primary screen (the one whose top-left corner is the
/// origin of accessibility space), used to flip `NSScreen`'s bottom-left,
/// y-up frames into the top-left, y-down convention the rest of this crate
/// uses for every other rectangle.
fn primary_screen_height(mtm: MainThreadMarker) -> f64 {
    NSScreen::screens(mtm).firstObject().map(|s| s.frame().size.height).unwrap_or(0.0)
}

fn nsrect_to_ax_rect(r: NSRect, primary_height: f64) -> Rect {
    Rect::new(r.origin.x, primary_height - r.origin.y - r.size.height, r.size.width, r.size.height)
}

impl Accessibility for MacosAccessibility {
    type Element = AxElement;
    type Observer = AxObserver;

    fn enumerate_application_elements(&self) -> Vec<(Pid, AxElement)> {
        let apps = unsafe { NSWorkspace::sharedWorkspace().runningApplications() };
        apps.iter()
            .filter_map(|app| {
                let pid = unsafe { app.processIdentifier() };
                AxElement::from_create(unsafe { AXUIElementCreateApplication(pid) }).map(|el| (pid, el))
            })
            .collect()
    }

    fn element_for_pid(&self, pid: Pid) -> Result<AxElement> {
        AxElement::from_create(unsafe { AXUIElementCreateApplication(pid) })
            .ok_or(Error::UnknownApplication(pid))
    }

    fn new_observer(&self, pid: Pid, callback: NotificationCallback<AxElement>) -> Result<AxObserver> {
        let mut observer: AXObserverRef = std::ptr::null_mut();
        let err = unsafe {
            AXObserverCreate(pid, ax_observer_callback as AXObserverCallback, &mut observer)
        };
        if err != kAXErrorSuccess || observer.is_null() {
            return Err(ax_error(err));
        }
        let source = unsafe { AXObserverGetRunLoopSource(observer) };
        unsafe {
            core_foundation::runloop::CFRunLoopAddSource(
                core_foundation::runloop::CFRunLoopGetCurrent(),
                source as core_foundation::runloop::CFRunLoopSourceRef,
                core_foundation::runloop::kCFRunLoopDefaultMode,
            );
        }
        Ok(AxObserver { observer, ctx: Box::new(ObserverContext { callback }) })
    }

    fn create_probe_window(&self) -> Result<u32> {
        let mtm = MainThreadMarker::new().ok_or_else(|| {
            Error::TransientFailure("probe windows can only be created on the main thread".into())
        })?;
        let content_rect = NSRect::new(NSPoint::new(-10_000.0, -10_000.0), NSSize::new(1.0, 1.0));
        let window = unsafe {
            NSWindow::initWithContentRect_styleMask_backing_defer(
                NSWindow::alloc(mtm),
                content_rect,
                NSWindowStyleMask::Borderless,
                NSBackingStoreType::Buffered,
                false,
            )
        };
        unsafe {
            window.setIgnoresMouseEvents(true);
            window.setOpaque(false);
            window.setCollectionBehavior(
                NSWindowCollectionBehavior::CanJoinAllSpaces | NSWindowCollectionBehavior::Stationary,
            );
            window.orderFrontRegardless();
        }
        let number = window.windowNumber();
        // Leak the window deliberately: it must outlive this call and is
        // torn down only when the process exits, mirroring the lifetime of
        // a space probe.
        std::mem::forget(window);
        Ok(number as u32)
    }

    fn visible_native_window_ids(&self) -> Result<Vec<u32>> {
        Ok(window_list_info()
            .into_iter()
            .map(|w| w.number)
            .collect())
    }

    fn native_window_screen(&self, native_id: u32) -> Result<ScreenId> {
        let info = window_list_info();
        let Some(window) = info.into_iter().find(|w| w.number == native_id) else {
            return Err(Error::TransientFailure(format!("native window {native_id} not found")));
        };
        let mtm = MainThreadMarker::new()
            .ok_or_else(|| Error::TransientFailure("screen lookup requires the main thread".into()))?;
        let primary_height = primary_screen_height(mtm);
        let screens = NSScreen::screens(mtm);
        for (idx, screen) in screens.iter().enumerate() {
            let rect = nsrect_to_ax_rect(screen.frame(), primary_height);
            if window.bounds.origin.x >= rect.origin.x
                && window.bounds.origin.y >= rect.origin.y
                && window.bounds.origin.x < rect.origin.x + rect.size.w
                && window.bounds.origin.y < rect.origin.y + rect.size.h
            {
                return Ok(ScreenId(idx as u32));
            }
        }
        Err(Error::TransientFailure(format!("no screen contains native window {native_id}")))
    }

    fn screens(&self) -> Vec<Screen> {
        let Some(mtm) = MainThreadMarker::new() else { return Vec::new() };
        let primary_height = primary_screen_height(mtm);
        NSScreen::screens(mtm)
            .iter()
            .enumerate()
            .map(|(idx, screen)| Screen {
                id: ScreenId(idx as u32),
                frame: nsrect_to_ax_rect(screen.frame(), primary_height),
                application_frame: nsrect_to_ax_rect(unsafe { screen.visibleFrame() }, primary_height),
            })
            .collect()
    }

    fn frontmost_pid(&self) -> Option<Pid> {
        let app = unsafe { NSWorkspace::sharedWorkspace().frontmostApplication() }?;
        Some(unsafe { app.processIdentifier() })
    }

    fn application_metadata(&self, pid: Pid) -> (Option<String>, Option<String>) {
        let apps = unsafe { NSWorkspace::sharedWorkspace().runningApplications() };
        let Some(app) = apps.iter().find(|a| unsafe { a.processIdentifier() } == pid) else {
            return (None, None);
        };
        running_application_metadata(&app)
    }

    fn activate(&self, pid: Pid) {
        let apps = unsafe { NSWorkspace::sharedWorkspace().runningApplications() };
        if let Some(app) = apps.iter().find(|a| unsafe { a.processIdentifier() } == pid) {
            unsafe { app.activateWithOptions(objc2_app_kit::NSApplicationActivationOptions::empty()) };
        }
    }

    fn on_application_launched(&self, callback: Box<dyn Fn(Pid, AxElement) + Send + Sync>) {
        self.callbacks.lock().launch.push(callback);
    }

    fn on_application_terminated(&self, callback: Box<dyn Fn(Pid) + Send + Sync>) {
        self.callbacks.lock().terminate.push(callback);
    }

    fn on_screen_layout_changed(&self, callback: Box<dyn Fn(Vec<Screen>) + Send + Sync>) {
        self.callbacks.lock().screen_layout.push(callback);
    }

    fn on_active_space_changed(&self, callback: Box<dyn Fn() + Send + Sync>) {
        self.callbacks.lock().space_change.push(callback);
    }
}

struct WindowInfo {
    number: u32,
    bounds: Rect,
}

fn window_list_info() -> Vec<WindowInfo> {
    let list_ref = unsafe { CGWindowListCopyWindowInfo(kCGWindowListOptionOnScreenOnly, kCGNullWindowID) };
    if list_ref.is_null() {
        return Vec::new();
    }
    let array: CFArray<CFType> = unsafe { CFArray::wrap_under_create_rule(list_ref as CFArrayRef) };
    array
        .iter()
        .filter_map(|entry| {
            let dict = entry.downcast::<core_foundation::dictionary::CFDictionary<CFString, CFType>>()?;
            let number = dict
                .find(CFString::new("kCGWindowNumber"))
                .and_then(|v| v.downcast::<core_foundation::number::CFNumber>())
                .and_then(|n| n.to_i64())? as u32;
            let bounds_dict = dict
                .find(CFString::new("kCGWindowBounds"))
                .and_then(|v| v.downcast::<core_foundation::dictionary::CFDictionary<CFString, CFType>>())?;
            let get = |key: &str| -> f64 {
                bounds_dict
                    .find(CFString::new(key))
                    .and_then(|v| v.downcast::<core_foundation::number::CFNumber>())
                    .and_then(|n| n.to_f64())
                    .unwrap_or(0.0)
            };
            Some(WindowInfo {
                number,
                bounds: Rect::new(get("X"), get("Y"), get("Width"), get("Height")),
            })
        })
        .collect()
}

fn running_application_metadata(app: &NSRunningApplication) -> (Option<String>, Option<String>) {
    (
        cfstring_opt(unsafe { app.bundleIdentifier() }),
        cfstring_opt(unsafe { app.localizedName() }),
    )
}
