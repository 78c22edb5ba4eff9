// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-element boundary actions.

use std::fmt;

/// The saturation rule applied to an out-of-range destination element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundAction {
    /// Pass the value through unchanged.
    None,
    /// Drop this element's message entirely.
    Mute,
    /// Saturate to the nearest bound.
    Clamp,
    /// Reflect back into range.
    Fold,
    /// Modulo into range.
    Wrap,
}

impl BoundAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BoundAction::None => "none",
            BoundAction::Mute => "mute",
            BoundAction::Clamp => "clamp",
            BoundAction::Fold => "fold",
            BoundAction::Wrap => "wrap",
        }
    }

    pub fn parse(s: &str) -> Option<BoundAction> {
        match s {
            "none" => Some(BoundAction::None),
            "mute" => Some(BoundAction::Mute),
            "clamp" => Some(BoundAction::Clamp),
            "fold" => Some(BoundAction::Fold),
            "wrap" => Some(BoundAction::Wrap),
            _ => None,
        }
    }
}

impl fmt::Display for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `action` to `x` within `[min, max)`. `None` means the element
/// (and therefore the whole sample, per the caller's all-or-nothing mute
/// rule) is muted.
///
/// `fold` is a triangle wave reflecting at `min` and `max`: letting
/// `R = max - min` and `d = (x - min) mod 2R`, `fold(x) = min + (R - |d - R|)`,
/// which is the identity on `[min, max)` and reflects symmetrically
/// outside it. `wrap` is a plain modulo into `[min, max)`.
pub fn apply(action: BoundAction, x: f64, min: f64, max: f64) -> Option<f64> {
    if min >= max || !min.is_finite() || !max.is_finite() {
        return Some(x);
    }
    match action {
        BoundAction::None => Some(x),
        BoundAction::Mute => {
            if x < min || x >= max {
                None
            } else {
                Some(x)
            }
        }
        BoundAction::Clamp => Some(x.clamp(min, max)),
        BoundAction::Fold => {
            let r = max - min;
            let period = 2.0 * r;
            let shifted = rem_euclid(x - min, period);
            Some(min + (r - (shifted - r).abs()))
        }
        BoundAction::Wrap => {
            let r = max - min;
            Some(min + rem_euclid(x - min, r))
        }
    }
}

fn rem_euclid(x: f64, m: f64) -> f64 {
    let r = x % m;
    if r < 0.0 {
        r + m
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_saturates_to_bounds() {
        assert_eq!(apply(BoundAction::Clamp, 150.0, 0.0, 100.0), Some(100.0));
        assert_eq!(apply(BoundAction::Clamp, -10.0, 0.0, 100.0), Some(0.0));
        assert_eq!(apply(BoundAction::Clamp, 50.0, 0.0, 100.0), Some(50.0));
    }

    #[test]
    fn mute_drops_out_of_range() {
        assert_eq!(apply(BoundAction::Mute, 150.0, 0.0, 100.0), None);
        assert_eq!(apply(BoundAction::Mute, 50.0, 0.0, 100.0), Some(50.0));
    }

    #[test]
    fn wrap_modulos_into_range() {
        assert_eq!(apply(BoundAction::Wrap, 110.0, 0.0, 100.0), Some(10.0));
        assert_eq!(apply(BoundAction::Wrap, -10.0, 0.0, 100.0), Some(90.0));
    }

    #[test]
    fn fold_reflects_back_into_range() {
        assert_eq!(apply(BoundAction::Fold, 110.0, 0.0, 100.0), Some(90.0));
        assert_eq!(apply(BoundAction::Fold, -10.0, 0.0, 100.0), Some(10.0));
        assert_eq!(apply(BoundAction::Fold, 50.0, 0.0, 100.0), Some(50.0));
    }

    #[test]
    fn fold_is_identity_within_range() {
        assert_eq!(apply(BoundAction::Fold, 25.0, 0.0, 100.0), Some(25.0));
        assert_eq!(apply(BoundAction::Fold, 0.0, 0.0, 100.0), Some(0.0));
    }

    #[test]
    fn none_passes_through() {
        assert_eq!(apply(BoundAction::None, 9999.0, 0.0, 100.0), Some(9999.0));
    }
}
