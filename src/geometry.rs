//! Geometry primitives shared by windows and screens.
//!
//! Coordinates are `f64` (the accessibility API reports window frames as
//! `CGFloat`) and may legitimately be negative once more than one screen is
//! involved.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An x,y coordinate pair.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A width,height pair.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

impl Size {
    pub fn new(w: f64, h: f64) -> Self {
        Self { w, h }
    }
}

impl From<(f64, f64)> for Size {
    fn from((w, h): (f64, f64)) -> Self {
        Self { w, h }
    }
}

/// An absolute, axis-aligned rectangle: position of the top-left corner plus
/// extent. The coordinate convention (which corner "top-left" is, and which
/// way y grows) is a property of *who produced the Rect*, not of the type
/// itself — see [`to_client_space`] for the one conversion this crate needs.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(w, h),
        }
    }

    pub fn from_parts(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.h
    }
}

/// Invert the vertical axis of a rectangle reported in accessibility
/// convention (origin top-left, y grows downward) into the client-visible
/// convention (origin bottom-left, y grows upward relative to the union of
/// all screens). `global_max_y` is the value returned by
/// [`crate::screen::global_max_y`] at the moment of the read, and is the
/// inversion constant for the flip.
pub fn to_client_space(r: Rect, global_max_y: f64) -> Rect {
    Rect {
        origin: Point::new(r.origin.x, global_max_y - r.origin.y - r.size.h),
        size: r.size,
    }
}

/// The inverse of [`to_client_space`]; used when translating a client-issued
/// `set(position)` back into accessibility coordinates before writing it.
pub fn to_accessibility_space(r: Rect, global_max_y: f64) -> Rect {
    // The transform is its own inverse.
    to_client_space(r, global_max_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    #[test]
    fn axis_inversion_is_its_own_inverse() {
        let r = Rect::new(10.0, 20.0, 100.0, 50.0);
        let global_max_y = 1080.0;
        let round_tripped = to_accessibility_space(to_client_space(r, global_max_y), global_max_y);
        assert_eq!(round_tripped, r);
    }

    #[test]
    fn inversion_matches_worked_example() {
        // A screen 0..1080 tall; a window at accessibility y=0 (top of the
        // screen) with height 100 should map to client y = 1080 - 0 - 100 = 980,
        // i.e. near the top when measured from the bottom-left origin.
        let r = Rect::new(0.0, 0.0, 200.0, 100.0);
        let out = to_client_space(r, 1080.0);
        assert_eq!(out.origin.y, 980.0);
    }

    /// A finite, reasonably-bounded `Rect`: `Arbitrary`'s default `f64` impl
    /// happily generates `NaN`/`inf`, which would make the round-trip
    /// property below vacuously fail equality for reasons that have nothing
    /// to do with [`to_client_space`]/[`to_accessibility_space`].
    #[derive(Debug, Clone, Copy)]
    struct FiniteRect(Rect);

    impl Arbitrary for FiniteRect {
        fn arbitrary(g: &mut Gen) -> Self {
            let coord = |g: &mut Gen| (i32::arbitrary(g) % 10_000) as f64;
            let extent = |g: &mut Gen| (u16::arbitrary(g) % 4_000) as f64;
            FiniteRect(Rect::new(coord(g), coord(g), extent(g), extent(g)))
        }
    }

    /// The coordinate flip must round-trip for any finite rectangle and any
    /// global-max-y, not just the worked examples above.
    #[quickcheck]
    fn coordinate_flip_round_trips(r: FiniteRect, global_max_y: u16) -> bool {
        let global_max_y = global_max_y as f64;
        let out = to_accessibility_space(to_client_space(r.0, global_max_y), global_max_y);
        out == r.0
    }

    /// Flipping twice through the same convention is a no-op, independent of
    /// which direction you start from (the transform is its own inverse).
    #[quickcheck]
    fn double_flip_is_identity(r: FiniteRect, global_max_y: u16) -> bool {
        let global_max_y = global_max_y as f64;
        to_client_space(to_client_space(r.0, global_max_y), global_max_y) == r.0
    }
}
