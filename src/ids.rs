//! Stable identities for every entity in the data model: processes, windows,
//! screens and space probes.
use slotmap::new_key_type;

/// A process id, as handed out by the OS application observer.
pub type Pid = i32;

new_key_type! {
    /// Internal key for a window inside its owning application's arena.
    ///
    /// Stable for the lifetime of the window; never reused while the
    /// `Application` that minted it is alive (`slotmap` generational keys
    /// make stale lookups fail rather than aliasing a new window).
    pub struct WindowKey;
}

/// A stable display identifier, as handed out by the OS screen enumerator.
/// Opaque beyond equality and ordering (used only to key a `HashMap` and to
/// give deterministic tie-breaking order in the screen diff).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScreenId(pub u32);

new_key_type! {
    /// Internal monotonic id for a space probe window.
    /// Distinct from `SpaceId`: a probe's key never changes, while the
    /// *space* it is currently reporting as visible is read off the probe.
    pub struct ProbeKey;
}

/// The internal id of a virtual desktop ("space"), correlated via probe
/// visibility. Two screens showing the same desktop never happens in
/// practice (spaces are per-screen in the OS model this targets), but the id
/// itself carries no assumption about that — it is just "whichever probe is
/// currently visible".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceId(pub(crate) ProbeKey);
