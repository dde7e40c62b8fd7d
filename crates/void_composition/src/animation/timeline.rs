//! Keyframe timelines
//!
//! A [`Timeline`] maps time elapsed since an animation started to a value.
//! Keyframes are placed at normalized progress positions within one
//! iteration; the timeline repeats for a finite number of iterations or
//! forever.

use super::easing::Easing;
use crate::geometry::Vector2;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Kind of an animated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Scalar,
    Vector2,
}

/// Animated property value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnimationValue {
    Scalar(f64),
    Vector2(Vector2),
}

impl AnimationValue {
    /// Kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Vector2(_) => ValueKind::Vector2,
        }
    }

    /// Scalar payload, if this is a scalar
    pub fn as_scalar(&self) -> Option<f64> {
        match *self {
            Self::Scalar(v) => Some(v),
            Self::Vector2(_) => None,
        }
    }

    /// Vector payload, if this is a vector
    pub fn as_vector2(&self) -> Option<Vector2> {
        match *self {
            Self::Vector2(v) => Some(v),
            Self::Scalar(_) => None,
        }
    }

    /// Interpolate towards `to`
    ///
    /// Values of different kinds do not interpolate: `to` is returned once
    /// `t` reaches 1, `self` before that.
    pub fn lerp(&self, to: &Self, t: f64) -> Self {
        match (*self, *to) {
            (Self::Scalar(a), Self::Scalar(b)) => Self::Scalar(a + (b - a) * t),
            (Self::Vector2(a), Self::Vector2(b)) => Self::Vector2(a.lerp(b, t)),
            _ if t >= 1.0 => *to,
            _ => *self,
        }
    }
}

impl From<f64> for AnimationValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vector2> for AnimationValue {
    fn from(value: Vector2) -> Self {
        Self::Vector2(value)
    }
}

/// A value at a progress position within one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Position within the iteration, in [0, 1]
    pub progress: f64,
    /// Value at this position
    pub value: AnimationValue,
    /// Easing for the segment ending at this keyframe (linear if unset)
    pub easing: Option<Easing>,
}

impl Keyframe {
    /// Create a keyframe with linear easing
    pub fn new(progress: f64, value: impl Into<AnimationValue>) -> Self {
        Self {
            progress,
            value: value.into(),
            easing: None,
        }
    }

    /// Set the easing for the segment ending at this keyframe
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }
}

/// How many times a timeline plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationCount {
    Count(u32),
    Forever,
}

impl Default for IterationCount {
    fn default() -> Self {
        Self::Count(1)
    }
}

/// Invalid timeline definition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("timeline has no keyframes")]
    Empty,

    #[error("keyframe {index} progress {progress} is outside [0, 1]")]
    ProgressOutOfRange { index: usize, progress: f64 },

    #[error("keyframe {index} progress decreases")]
    DecreasingProgress { index: usize },

    #[error("keyframe {index} is {found:?}, expected {expected:?}")]
    MixedValueKinds {
        index: usize,
        expected: ValueKind,
        found: ValueKind,
    },
}

/// Result of evaluating a timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub value: AnimationValue,
    /// Set once all iterations have played
    pub completed: bool,
}

#[derive(Deserialize)]
struct RawTimeline {
    keyframes: Vec<Keyframe>,
    duration: Duration,
    iterations: IterationCount,
}

/// Validated keyframe timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeline")]
pub struct Timeline {
    keyframes: Vec<Keyframe>,
    duration: Duration,
    iterations: IterationCount,
}

impl TryFrom<RawTimeline> for Timeline {
    type Error = TimelineError;

    fn try_from(raw: RawTimeline) -> Result<Self, Self::Error> {
        Timeline::new(raw.keyframes, raw.duration, raw.iterations)
    }
}

impl Timeline {
    /// Create a timeline
    ///
    /// Keyframes must be non-empty, within [0, 1], non-decreasing in
    /// progress and all of one value kind.
    pub fn new(
        keyframes: Vec<Keyframe>,
        duration: Duration,
        iterations: IterationCount,
    ) -> Result<Self, TimelineError> {
        let first = keyframes.first().ok_or(TimelineError::Empty)?;
        let expected = first.value.kind();

        let mut previous = 0.0;
        for (index, keyframe) in keyframes.iter().enumerate() {
            if !(0.0..=1.0).contains(&keyframe.progress) {
                return Err(TimelineError::ProgressOutOfRange {
                    index,
                    progress: keyframe.progress,
                });
            }
            if keyframe.progress < previous {
                return Err(TimelineError::DecreasingProgress { index });
            }
            if keyframe.value.kind() != expected {
                return Err(TimelineError::MixedValueKinds {
                    index,
                    expected,
                    found: keyframe.value.kind(),
                });
            }
            previous = keyframe.progress;
        }

        Ok(Self {
            keyframes,
            duration,
            iterations,
        })
    }

    /// Two-keyframe timeline from `from` to `to`, played once
    pub fn between(
        from: impl Into<AnimationValue>,
        to: impl Into<AnimationValue>,
        duration: Duration,
        easing: Option<Easing>,
    ) -> Result<Self, TimelineError> {
        let mut end = Keyframe::new(1.0, to);
        end.easing = easing;
        Self::new(vec![Keyframe::new(0.0, from), end], duration, IterationCount::Count(1))
    }

    /// Keyframes in progress order
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Duration of one iteration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Iteration policy
    pub fn iterations(&self) -> IterationCount {
        self.iterations
    }

    /// Kind of the animated value
    pub fn value_kind(&self) -> ValueKind {
        self.last_value().kind()
    }

    /// Total play time, `None` when repeating forever
    pub fn total_duration(&self) -> Option<Duration> {
        match self.iterations {
            IterationCount::Count(count) => Some(self.duration.saturating_mul(count)),
            IterationCount::Forever => None,
        }
    }

    fn last_value(&self) -> AnimationValue {
        // Construction guarantees at least one keyframe
        self.keyframes[self.keyframes.len() - 1].value
    }

    /// Evaluate at `elapsed` time since the animation started
    pub fn evaluate(&self, elapsed: Duration) -> Evaluation {
        let forever = self.iterations == IterationCount::Forever;
        if self.duration.is_zero() {
            return Evaluation {
                value: self.last_value(),
                completed: !forever,
            };
        }

        let duration = self.duration.as_nanos();
        let elapsed = elapsed.as_nanos();
        if let IterationCount::Count(count) = self.iterations {
            if elapsed >= duration * u128::from(count) {
                return Evaluation {
                    value: self.last_value(),
                    completed: true,
                };
            }
        }

        let progress = ((elapsed % duration) as f64 / duration as f64).clamp(0.0, 1.0);
        Evaluation {
            value: self.sample(progress),
            completed: false,
        }
    }

    /// Value at a progress position within one iteration
    pub fn sample(&self, progress: f64) -> AnimationValue {
        let next = self.keyframes.partition_point(|k| k.progress <= progress);
        if next == 0 {
            return self.keyframes[0].value;
        }
        if next == self.keyframes.len() {
            return self.last_value();
        }

        let from = &self.keyframes[next - 1];
        let to = &self.keyframes[next];
        let span = to.progress - from.progress;
        let local = if span > 0.0 {
            (progress - from.progress) / span
        } else {
            1.0
        };
        let eased = to.easing.unwrap_or_default().apply(local);
        from.value.lerp(&to.value, eased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn ramp(iterations: IterationCount) -> Timeline {
        Timeline::new(
            vec![Keyframe::new(0.0, 0.0), Keyframe::new(1.0, 100.0)],
            ms(1000),
            iterations,
        )
        .unwrap()
    }

    fn scalar(evaluation: Evaluation) -> f64 {
        evaluation.value.as_scalar().unwrap()
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            Timeline::new(vec![], ms(100), IterationCount::Forever),
            Err(TimelineError::Empty)
        );
        assert_eq!(
            Timeline::new(
                vec![Keyframe::new(0.5, 1.0), Keyframe::new(0.2, 2.0)],
                ms(100),
                IterationCount::Forever
            ),
            Err(TimelineError::DecreasingProgress { index: 1 })
        );
        assert!(matches!(
            Timeline::new(vec![Keyframe::new(1.5, 1.0)], ms(100), IterationCount::Forever),
            Err(TimelineError::ProgressOutOfRange { index: 0, .. })
        ));
        assert!(matches!(
            Timeline::new(
                vec![Keyframe::new(0.0, 1.0), Keyframe::new(1.0, Vector2::ZERO)],
                ms(100),
                IterationCount::Forever
            ),
            Err(TimelineError::MixedValueKinds { index: 1, .. })
        ));
    }

    #[test]
    fn test_linear_interpolation() {
        let timeline = ramp(IterationCount::Count(1));
        assert_eq!(scalar(timeline.evaluate(ms(0))), 0.0);
        assert_eq!(scalar(timeline.evaluate(ms(250))), 25.0);
        assert_eq!(scalar(timeline.evaluate(ms(500))), 50.0);
        assert!(!timeline.evaluate(ms(999)).completed);
    }

    #[test]
    fn test_finite_count_completes_with_last_value() {
        let timeline = ramp(IterationCount::Count(2));
        let mid_second = timeline.evaluate(ms(1500));
        assert_eq!(scalar(mid_second), 50.0);
        assert!(!mid_second.completed);

        for elapsed in [2000, 2001, 10_000] {
            let done = timeline.evaluate(ms(elapsed));
            assert_eq!(scalar(done), 100.0);
            assert!(done.completed);
        }
    }

    #[test]
    fn test_forever_is_periodic() {
        let timeline = ramp(IterationCount::Forever);
        for elapsed in [0, 130, 499, 870] {
            for period in [1, 3, 250] {
                assert_eq!(
                    timeline.evaluate(ms(elapsed + 1000 * period)),
                    timeline.evaluate(ms(elapsed))
                );
            }
        }
        assert!(!timeline.evaluate(ms(1_000_000)).completed);
    }

    #[test]
    fn test_zero_duration() {
        let once = Timeline::new(
            vec![Keyframe::new(0.0, 1.0), Keyframe::new(1.0, 5.0)],
            Duration::ZERO,
            IterationCount::Count(3),
        )
        .unwrap();
        let evaluation = once.evaluate(ms(0));
        assert_eq!(scalar(evaluation), 5.0);
        assert!(evaluation.completed);

        let forever = Timeline::new(once.keyframes().to_vec(), Duration::ZERO, IterationCount::Forever).unwrap();
        assert!(!forever.evaluate(ms(10)).completed);
    }

    #[test]
    fn test_holds_outside_keyframe_range() {
        let timeline = Timeline::new(
            vec![Keyframe::new(0.25, 10.0), Keyframe::new(0.75, 20.0)],
            ms(1000),
            IterationCount::Count(1),
        )
        .unwrap();
        assert_eq!(scalar(timeline.evaluate(ms(100))), 10.0);
        assert_eq!(scalar(timeline.evaluate(ms(500))), 15.0);
        assert_eq!(scalar(timeline.evaluate(ms(900))), 20.0);
    }

    #[test]
    fn test_destination_easing_applies_to_segment() {
        let timeline = Timeline::new(
            vec![
                Keyframe::new(0.0, 0.0),
                Keyframe::new(0.5, 10.0).with_easing(Easing::QuadIn),
                Keyframe::new(1.0, 20.0),
            ],
            ms(1000),
            IterationCount::Count(1),
        )
        .unwrap();
        // First segment eased, second linear
        assert_eq!(scalar(timeline.evaluate(ms(250))), 2.5);
        assert_eq!(scalar(timeline.evaluate(ms(750))), 15.0);
    }

    #[test]
    fn test_coincident_keyframes_jump() {
        let timeline = Timeline::new(
            vec![
                Keyframe::new(0.0, 0.0),
                Keyframe::new(0.5, 1.0),
                Keyframe::new(0.5, 5.0),
                Keyframe::new(1.0, 5.0),
            ],
            ms(1000),
            IterationCount::Count(1),
        )
        .unwrap();
        assert!((scalar(timeline.evaluate(ms(499))) - 0.998).abs() < 1e-9);
        assert_eq!(scalar(timeline.evaluate(ms(500))), 5.0);
    }

    #[test]
    fn test_vector_timeline() {
        let timeline = Timeline::between(
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, -10.0),
            ms(200),
            None,
        )
        .unwrap();
        assert_eq!(timeline.value_kind(), ValueKind::Vector2);
        assert_eq!(
            timeline.evaluate(ms(100)).value,
            AnimationValue::Vector2(Vector2::new(5.0, -5.0))
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let valid = ramp(IterationCount::Count(1));
        let json = serde_json::to_string(&valid).unwrap();
        assert_eq!(serde_json::from_str::<Timeline>(&json).unwrap(), valid);

        let invalid = json.replace("\"progress\":1.0", "\"progress\":-1.0");
        assert!(serde_json::from_str::<Timeline>(&invalid).is_err());
    }
}
