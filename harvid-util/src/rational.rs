//! Frame-rate rational arithmetic and the drop-frame heuristic, centralised
//! here rather than scattered across the decoder per the design notes: the
//! 29.97 fps comparison is brittle and should live in exactly one place.

use serde::Serialize;

/// A frame rate (or any other stream rate) expressed as `num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "rational with zero denominator");
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn invert(&self) -> Self {
        Rational::new(self.den, self.num)
    }

    /// True for the two rates that represent NTSC drop-frame timing:
    /// 29.97 fps and its `30000/1001` exact form.
    pub fn is_drop_frame(&self) -> bool {
        const DROP_29_97: f64 = 29.97;
        const EPS: f64 = 1e-2;
        (self.num, self.den) == (30000, 1001) || (self.as_f64() - DROP_29_97).abs() < EPS
    }

    /// Whether this rate falls in the plausible real-world frame rate band;
    /// declared rates outside `[4, 100]` fps are untrustworthy and callers
    /// should fall back to the stream time base instead.
    pub fn is_plausible_frame_rate(&self) -> bool {
        (4.0..=100.0).contains(&self.as_f64())
    }

    /// Resolve the frame rate to use: prefer `declared` when it is plausible,
    /// otherwise fall back to the inverse of the stream time base.
    pub fn resolve(declared: Option<Rational>, time_base: Rational) -> Rational {
        match declared {
            Some(r) if r.num > 0 && r.den > 0 && r.is_plausible_frame_rate() => r,
            _ => time_base.invert(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_frame_exact() {
        assert!(Rational::new(30000, 1001).is_drop_frame());
    }

    #[test]
    fn test_drop_frame_approx() {
        assert!(Rational::new(2997, 100).is_drop_frame());
    }

    #[test]
    fn test_not_drop_frame() {
        assert!(!Rational::new(25, 1).is_drop_frame());
        assert!(!Rational::new(30, 1).is_drop_frame());
    }

    #[test]
    fn test_resolve_prefers_declared() {
        let declared = Rational::new(25, 1);
        let tb = Rational::new(1, 90000);
        assert_eq!(Rational::resolve(Some(declared), tb), declared);
    }

    #[test]
    fn test_resolve_falls_back_when_implausible() {
        let declared = Rational::new(1, 1000); // 0.001 fps, not plausible
        let tb = Rational::new(1, 25);
        assert_eq!(Rational::resolve(Some(declared), tb), Rational::new(25, 1));
    }

    #[test]
    fn test_resolve_falls_back_when_missing() {
        let tb = Rational::new(1, 24);
        assert_eq!(Rational::resolve(None, tb), Rational::new(24, 1));
    }
}
