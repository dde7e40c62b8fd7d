//! Page transitions built from visual animations

use crate::animation::{AnimatedProperty, Easing, Timeline};
use crate::client::Visual;
use crate::error::CompositionResult;
use std::sync::Arc;
use std::time::Duration;

/// Fades one visual out while fading another in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossFade {
    pub duration: Duration,
    pub easing: Option<Easing>,
}

impl CrossFade {
    pub fn new(duration: Duration) -> Self {
        Self { duration, easing: None }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }

    /// Start the transition; either side may be absent
    ///
    /// `to` is made visible at opacity 0 and fades in, `from` fades out from
    /// its current opacity. Both animations start with the next commit.
    pub fn start(&self, from: Option<&Arc<Visual>>, to: Option<&Arc<Visual>>) -> CompositionResult<CrossFadeHandle> {
        if let Some(to) = to {
            to.set_opacity(0.0)?;
            to.set_visible(true)?;
            let fade_in = Timeline::between(0.0, 1.0, self.duration, self.easing)?;
            to.start_animation(AnimatedProperty::Opacity, fade_in)?;
        }
        if let Some(from) = from {
            let fade_out = Timeline::between(from.opacity(), 0.0, self.duration, self.easing)?;
            from.start_animation(AnimatedProperty::Opacity, fade_out)?;
        }

        log::debug!("Cross-fade started over {:?}", self.duration);
        Ok(CrossFadeHandle {
            from: from.cloned(),
            to: to.cloned(),
            duration: self.duration,
        })
    }
}

/// A started cross-fade
#[derive(Debug)]
pub struct CrossFadeHandle {
    from: Option<Arc<Visual>>,
    to: Option<Arc<Visual>>,
    duration: Duration,
}

impl CrossFadeHandle {
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Settle the final state once the fade has run
    ///
    /// Hides `from` with its opacity restored and leaves `to` fully opaque.
    pub fn finish(self) -> CompositionResult<()> {
        if let Some(from) = &self.from {
            from.set_visible(false)?;
            from.stop_animation(AnimatedProperty::Opacity)?;
        }
        if let Some(to) = &self.to {
            to.set_opacity(1.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_finish_client_state() {
        let from = Visual::new();
        let to = Visual::new();
        to.set_visible(false).unwrap();

        let handle = CrossFade::new(Duration::from_millis(200))
            .start(Some(&from), Some(&to))
            .unwrap();
        assert!(to.is_visible());
        assert_eq!(to.opacity(), 0.0);
        assert!(from.is_animating(AnimatedProperty::Opacity));
        assert!(to.is_animating(AnimatedProperty::Opacity));

        handle.finish().unwrap();
        assert!(!from.is_visible());
        assert!(!from.is_animating(AnimatedProperty::Opacity));
        assert_eq!(from.opacity(), 1.0);
        assert_eq!(to.opacity(), 1.0);
        assert!(!to.is_animating(AnimatedProperty::Opacity));
    }

    #[test]
    fn test_one_sided_transition() {
        let to = Visual::new();
        let handle = CrossFade::new(Duration::ZERO).start(None, Some(&to)).unwrap();
        assert_eq!(handle.duration(), Duration::ZERO);
        handle.finish().unwrap();
        assert_eq!(to.opacity(), 1.0);
    }
}
