//! Space tracking.
//!
//! Virtual desktops aren't directly enumerated by the accessibility API, so
//! this module infers them: one invisible, click-through probe window is
//! pinned per screen, and whichever probes the OS reports visible after a
//! space change tells us which internal space id is now current on each
//! screen. [`crate::state::State`] owns exactly one [`SpaceObserver`] and
//! drives it from the OS's active-space-change notification.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use slotmap::SlotMap;
use tracing::debug;

use crate::accessibility::Accessibility;
use crate::error::Result;
use crate::ids::{ProbeKey, ScreenId, SpaceId};
use crate::screen::Screen;

struct Probe {
    native_id: u32,
    screen: ScreenId,
    /// The monotonic internal id: assigned in creation order and used to
    /// break ties when more than one probe on a screen is reported visible
    /// at once. Distinct from the `ProbeKey` slotmap key, which is stable
    /// but not guaranteed monotonic once probes are removed and slots
    /// reused.
    ordinal: u64,
}

/// Maintains the probe-window set used to infer the currently visible space
/// on each screen.
pub(crate) struct SpaceObserver<A: Accessibility> {
    accessibility: A,
    probes: Mutex<SlotMap<ProbeKey, Probe>>,
    native_index: Mutex<HashMap<u32, ProbeKey>>,
    next_ordinal: AtomicU64,
}

impl<A: Accessibility> SpaceObserver<A> {
    pub(crate) fn new(accessibility: A) -> Self {
        Self {
            accessibility,
            probes: Mutex::new(SlotMap::with_key()),
            native_index: Mutex::new(HashMap::new()),
            next_ordinal: AtomicU64::new(0),
        }
    }

    /// Rebuild a probe set from a previously saved [`RecoveryBlob`], reusing
    /// its ordinals so ids assigned before the restart keep meaning relative
    /// to ids minted after it.
    #[cfg(feature = "serde")]
    pub(crate) fn restore(accessibility: A, blob: &RecoveryBlob) -> Result<Self> {
        let observer = Self {
            accessibility,
            probes: Mutex::new(SlotMap::with_key()),
            native_index: Mutex::new(HashMap::new()),
            next_ordinal: AtomicU64::new(blob.next_ordinal),
        };
        for &(ordinal, screen) in &blob.probes {
            observer.create_probe_with_ordinal(ScreenId(screen), ordinal)?;
        }
        Ok(observer)
    }

    #[cfg(feature = "serde")]
    pub(crate) fn to_recovery_blob(&self) -> RecoveryBlob {
        let probes = self
            .probes
            .lock()
            .values()
            .map(|p| (p.ordinal, p.screen.0))
            .collect();
        RecoveryBlob {
            next_ordinal: self.next_ordinal.load(Ordering::SeqCst),
            probes,
        }
    }

    /// Create one probe for every screen that doesn't already have a live
    /// one.
    pub(crate) fn ensure_probes(&self, screens: &[Screen]) -> Result<()> {
        let have: std::collections::HashSet<ScreenId> =
            self.probes.lock().values().map(|p| p.screen).collect();
        for screen in screens {
            if !have.contains(&screen.id) {
                self.create_probe(screen.id)?;
            }
        }
        Ok(())
    }

    fn create_probe(&self, screen: ScreenId) -> Result<ProbeKey> {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        self.create_probe_with_ordinal(screen, ordinal)
    }

    fn create_probe_with_ordinal(&self, screen: ScreenId, ordinal: u64) -> Result<ProbeKey> {
        let native_id = self.accessibility.create_probe_window()?;
        let key = self.probes.lock().insert(Probe { native_id, screen, ordinal });
        self.native_index.lock().insert(native_id, key);
        debug!(native_id, ordinal, screen = screen.0, "created space probe");
        Ok(key)
    }

    /// Recompute each screen's current space id:
    /// intersect the OS's visible-window-id list with the probe map, bucket
    /// survivors by their live screen, and for each screen pick the
    /// lowest-ordinal visible probe — creating a fresh probe for any screen
    /// that has none.
    pub(crate) fn recompute(&self, screens: &[Screen]) -> Result<Vec<(ScreenId, SpaceId)>> {
        let visible_ids = self.accessibility.visible_native_window_ids()?;
        let visible_keys: Vec<ProbeKey> = {
            let index = self.native_index.lock();
            visible_ids.iter().filter_map(|id| index.get(id).copied()).collect()
        };

        let mut by_screen: HashMap<ScreenId, Vec<(u64, ProbeKey)>> = HashMap::new();
        {
            let probes = self.probes.lock();
            for key in visible_keys {
                if let Some(probe) = probes.get(key) {
                    let live_screen = self
                        .accessibility
                        .native_window_screen(probe.native_id)
                        .unwrap_or(probe.screen);
                    by_screen.entry(live_screen).or_default().push((probe.ordinal, key));
                }
            }
        }

        let mut result = Vec::with_capacity(screens.len());
        for screen in screens {
            let chosen = by_screen.get_mut(&screen.id).and_then(|candidates| {
                candidates.sort_by_key(|(ordinal, _)| *ordinal);
                candidates.first().map(|(_, key)| *key)
            });
            let key = match chosen {
                Some(key) => key,
                None => self.create_probe(screen.id)?,
            };
            result.push((screen.id, SpaceId(key)));
        }
        Ok(result)
    }
}

/// An opaque, versioned encoding of the probe set's `{ordinal, screen}`
/// assignments plus the next ordinal to hand out, produced by
/// [`SpaceObserver::to_recovery_blob`] and consumed only by
/// [`SpaceObserver::restore`]. The probe
/// windows themselves cannot survive a process restart — only the mapping
/// from internal id to screen does, so returning spaces are recognized by
/// the same id they had before.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecoveryBlob {
    next_ordinal: u64,
    probes: Vec<(u64, u32)>,
}

#[cfg(feature = "serde")]
impl RecoveryBlob {
    const VERSION: u8 = 1;

    /// Encode into the opaque byte string clients may persist between runs.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![Self::VERSION];
        bincode::serialize_into(&mut out, self).expect("RecoveryBlob fields are all plain data");
        out
    }

    /// Decode a blob produced by [`Self::encode`]. Fails closed: a
    /// corrupt or foreign-versioned blob is reported rather than guessed at.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let [version, rest @ ..] = bytes else {
            return Err(crate::error::Error::TransientFailure("empty recovery blob".into()));
        };
        if *version != Self::VERSION {
            return Err(crate::error::Error::TransientFailure(format!(
                "unsupported recovery blob version {version}"
            )));
        }
        bincode::deserialize(rest)
            .map_err(|e| crate::error::Error::TransientFailure(format!("corrupt recovery blob: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::mock::MockAccessibility;
    use crate::geometry::Rect;

    fn screen(id: u32) -> Screen {
        Screen {
            id: ScreenId(id),
            frame: Rect::new(0.0, 0.0, 1920.0, 1080.0),
            application_frame: Rect::new(0.0, 22.0, 1920.0, 1058.0),
        }
    }

    #[test]
    fn ensure_probes_creates_one_per_screen() {
        let ax = MockAccessibility::new();
        let observer = SpaceObserver::new(ax.clone());
        let screens = vec![screen(1), screen(2)];
        observer.ensure_probes(&screens).unwrap();
        assert_eq!(observer.probes.lock().len(), 2);
    }

    #[test]
    fn recompute_picks_lowest_ordinal_visible_probe_per_screen() {
        let ax = MockAccessibility::new();
        let observer = SpaceObserver::new(ax.clone());
        let screens = vec![screen(1), screen(2)];
        observer.ensure_probes(&screens).unwrap();

        // Native ids 1 and 2 were minted in that order above, for screens 1
        // and 2 respectively; record where the mock says they live.
        ax.set_probe_screen(1, ScreenId(1));
        ax.set_probe_screen(2, ScreenId(2));
        ax.set_visible_native_window_ids(vec![1, 2]);

        let ids = observer.recompute(&screens).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].0, ScreenId(1));
        assert_eq!(ids[1].0, ScreenId(2));
    }

    #[test]
    fn recompute_creates_a_new_probe_for_a_screen_with_no_visible_probe() {
        let ax = MockAccessibility::new();
        let observer = SpaceObserver::new(ax.clone());
        let screens = vec![screen(1)];
        observer.ensure_probes(&screens).unwrap();
        // No native ids reported visible at all.
        ax.set_visible_native_window_ids(vec![]);

        let ids = observer.recompute(&screens).unwrap();
        assert_eq!(ids.len(), 1);
        // A second probe must have been minted for screen 1.
        assert_eq!(observer.probes.lock().len(), 2);
    }
}
