//! Easing curves applied to keyframe segments

use serde::{Deserialize, Serialize};

/// Easing function mapping linear progress in [0, 1] to eased progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum Easing {
    /// No easing
    #[default]
    Linear,
    /// Quadratic ease in
    QuadIn,
    /// Quadratic ease out
    QuadOut,
    /// Quadratic ease in and out
    QuadInOut,
    /// Cubic ease in
    CubicIn,
    /// Cubic ease out
    CubicOut,
    /// Cubic ease in and out
    CubicInOut,
    /// Hold the start value until the segment ends
    Step,
    /// CSS-style cubic bezier through (0,0), (x1,y1), (x2,y2), (1,1)
    CubicBezier(f64, f64, f64, f64),
}

impl Easing {
    /// Apply to a progress value; input is clamped to [0, 1]
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => t * (2.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => {
                let t = t - 1.0;
                t * t * t + 1.0
            }
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::Step => {
                if t >= 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Easing::CubicBezier(x1, y1, x2, y2) => cubic_bezier(x1, y1, x2, y2, t),
        }
    }
}

fn bezier_component(a1: f64, a2: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * t * a1 + 3.0 * u * t * t * a2 + t * t * t
}

fn bezier_slope(a1: f64, a2: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * a1 + 6.0 * u * t * (a2 - a1) + 3.0 * t * t * (1.0 - a2)
}

fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64, x: f64) -> f64 {
    if x <= 0.0 || x >= 1.0 {
        return x;
    }
    // x(t) is monotonic for x1, x2 in [0, 1]
    let (x1, x2) = (x1.clamp(0.0, 1.0), x2.clamp(0.0, 1.0));

    // Newton first, bisection if the slope flattens out
    let mut t = x;
    for _ in 0..8 {
        let error = bezier_component(x1, x2, t) - x;
        if error.abs() < 1e-7 {
            return bezier_component(y1, y2, t);
        }
        let slope = bezier_slope(x1, x2, t);
        if slope.abs() < 1e-6 {
            break;
        }
        t -= error / slope;
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    t = x;
    for _ in 0..64 {
        let value = bezier_component(x1, x2, t);
        if (value - x).abs() < 1e-7 {
            break;
        }
        if value < x {
            lo = t;
        } else {
            hi = t;
        }
        t = (lo + hi) / 2.0;
    }
    bezier_component(y1, y2, t)
}
