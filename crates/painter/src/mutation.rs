//! Effects that play out over time.
//!
//! Time here is abstract: the scheduler converts wall-clock time into these units according to
//! the playback speed. A [`Mutation`] is advanced by some amount of time and answers with the
//! patch to apply and whatever part of the time it didn't need.

use std::fmt;

use painter_script::Value;

use crate::state::{AppState, KeyFrame, StatePatch};

type Update = Box<dyn FnMut(f64, &KeyFrame) -> StatePatch>;

/// An effect with a fixed duration.
///
/// The update function gets the fraction of the duration that has elapsed and the key frame,
/// which is the state as it was when the animation first advanced.
pub struct Animation {
    duration: f64,
    elapsed: f64,
    key: Option<KeyFrame>,
    update: Update,
}

impl fmt::Debug for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Animation")
            .field("duration", &self.duration)
            .field("elapsed", &self.elapsed)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Animation {
    /// # Panics
    ///
    /// Panics if `duration` is negative or NaN.
    pub fn new(duration: f64, update: impl FnMut(f64, &KeyFrame) -> StatePatch + 'static) -> Animation {
        assert!(duration >= 0.0, "animation duration must be non-negative, got {duration}");
        Animation {
            duration,
            elapsed: 0.0,
            key: None,
            update: Box::new(update),
        }
    }

    /// An animation that changes nothing and just takes time.
    pub fn wait(duration: f64) -> Animation {
        Animation::new(duration, |_, _| StatePatch::default())
    }

    /// An animation that takes no time at all.
    pub fn change(mut update: impl FnMut(&KeyFrame) -> StatePatch + 'static) -> Animation {
        Animation::new(0.0, move |_, key| update(key))
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed == self.duration
    }

    fn ratio(&self) -> f64 {
        if self.duration == 0.0 {
            1.0
        } else {
            self.elapsed / self.duration
        }
    }

    fn calculate(&mut self, state: &AppState) -> StatePatch {
        let key = self.key.get_or_insert_with(|| state.key_frame());
        let ratio = if self.duration == 0.0 {
            1.0
        } else {
            self.elapsed / self.duration
        };
        (self.update)(ratio, key)
    }

    /// Moves time forward by `delta`, returning the patch for the new elapsed time and the
    /// part of `delta` that went past the end.
    pub fn advance(&mut self, delta: f64, state: &AppState) -> (StatePatch, f64) {
        self.elapsed += delta.max(0.0);
        let leftover = (self.elapsed - self.duration).max(0.0);
        self.elapsed = self.elapsed.min(self.duration);
        log::trace!("animation at {:.3} ({leftover} left over)", self.ratio());
        (self.calculate(state), leftover)
    }

    /// The final patch, if the animation has run its full duration.
    pub fn complete(&mut self, state: &AppState) -> Option<StatePatch> {
        if self.is_complete() {
            Some(self.calculate(state))
        } else {
            None
        }
    }

    /// Skips to the end.
    pub fn finish(&mut self, state: &AppState) -> StatePatch {
        self.elapsed = self.duration;
        self.calculate(state)
    }
}

/// An effect that waits on the host instead of on time: currently only a question for the user.
#[derive(Clone, Debug, PartialEq)]
pub struct AsyncMutation {
    pub question: String,
    /// The answer when the user gives none, which also decides what type the answer has.
    pub default: Value,
}

impl AsyncMutation {
    pub fn new(question: impl Into<String>, default: Value) -> AsyncMutation {
        AsyncMutation {
            question: question.into(),
            default,
        }
    }

    /// Converts the user's answer into a script value shaped like the default.
    pub fn resolve(&self, input: Option<&str>) -> Value {
        let input = match input {
            Some(s) if !s.is_empty() => s,
            _ => return self.default.clone(),
        };
        match self.default {
            Value::Num(_) => Value::from(input).to_number().into(),
            Value::Bool(_) => Value::Bool(true),
            _ => Value::from(input),
        }
    }
}

#[derive(Debug)]
pub enum Mutation {
    Animation(Animation),
    Async(AsyncMutation),
}

impl From<Animation> for Mutation {
    fn from(a: Animation) -> Self {
        Mutation::Animation(a)
    }
}

impl From<AsyncMutation> for Mutation {
    fn from(a: AsyncMutation) -> Self {
        Mutation::Async(a)
    }
}

impl Mutation {
    pub fn wait(duration: f64) -> Mutation {
        Animation::wait(duration).into()
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Mutation::Async(_))
    }

    /// Async mutations don't consume time, so advancing one is a no-op.
    pub fn advance(&mut self, delta: f64, state: &AppState) -> (StatePatch, f64) {
        match self {
            Mutation::Animation(a) => a.advance(delta, state),
            Mutation::Async(_) => (StatePatch::default(), 0.0),
        }
    }

    pub fn complete(&mut self, state: &AppState) -> Option<StatePatch> {
        match self {
            Mutation::Animation(a) => a.complete(state),
            Mutation::Async(_) => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Mutation::Animation(a) => a.is_complete(),
            Mutation::Async(_) => false,
        }
    }

    /// Advances through whatever time remains and returns the final patch.
    pub fn finish(&mut self, state: &AppState) -> Option<StatePatch> {
        match self {
            Mutation::Animation(a) => Some(a.finish(state)),
            Mutation::Async(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Point;

    use super::*;

    fn slide(duration: f64) -> Animation {
        Animation::new(duration, |ratio, key| StatePatch {
            position: Some(key.position + (0.0, 10.0 * ratio)),
            ..StatePatch::default()
        })
    }

    #[test]
    fn leftover_time() {
        let state = AppState::new();
        let mut a = slide(4.0);
        let (patch, leftover) = a.advance(3.0, &state);
        assert_eq!(patch.position, Some(Point::new(0.0, 7.5)));
        assert_eq!(leftover, 0.0);
        assert!(a.complete(&state).is_none());

        let (patch, leftover) = a.advance(3.0, &state);
        assert_eq!(patch.position, Some(Point::new(0.0, 10.0)));
        assert_eq!(leftover, 2.0);
        assert_eq!(a.complete(&state), Some(patch));
    }

    #[test]
    fn key_frame_is_captured_once() {
        let mut state = AppState::new();
        let mut a = slide(2.0);
        let (patch, _) = a.advance(1.0, &state);
        state.apply(patch);
        let (patch, _) = a.advance(1.0, &state);
        assert_eq!(patch.position, Some(Point::new(0.0, 10.0)));
    }

    #[test]
    fn advancing_by_nothing() {
        let state = AppState::new();
        let mut a = slide(2.0);
        let (first, _) = a.advance(1.0, &state);
        let (again, leftover) = a.advance(0.0, &state);
        assert_eq!(first, again);
        assert_eq!(leftover, 0.0);
        assert_eq!(a.elapsed(), 1.0);
    }

    #[test]
    fn changes_complete_immediately() {
        let state = AppState::new();
        let mut c = Animation::change(|_| StatePatch {
            speed: Some(50.0),
            ..StatePatch::default()
        });
        let (patch, leftover) = c.advance(0.5, &state);
        assert_eq!(patch.speed, Some(50.0));
        assert_eq!(leftover, 0.5);
        assert!(c.complete(&state).is_some());
    }

    #[test]
    fn finish_skips_to_the_end() {
        let state = AppState::new();
        let mut m = Mutation::from(slide(100.0));
        m.advance(1.0, &state);
        let patch = m.finish(&state).unwrap();
        assert_eq!(patch.position, Some(Point::new(0.0, 10.0)));
        assert!(m.is_complete());
    }

    #[test]
    #[should_panic]
    fn negative_durations_are_rejected() {
        Animation::wait(-1.0);
    }

    #[test]
    fn async_mutations_ignore_time() {
        let state = AppState::new();
        let mut m = Mutation::from(AsyncMutation::new("?", Value::Num(1.0)));
        assert_eq!(m.advance(10.0, &state), (StatePatch::default(), 0.0));
        assert!(m.complete(&state).is_none());
        assert!(!m.is_complete());
    }

    #[test]
    fn answers_follow_the_default() {
        let num = AsyncMutation::new("how many?", Value::Num(3.0));
        assert_eq!(num.resolve(Some("12")), Value::Num(12.0));
        assert!(num.resolve(Some("lots")).to_number().is_nan());
        assert_eq!(num.resolve(None), Value::Num(3.0));
        assert_eq!(num.resolve(Some("")), Value::Num(3.0));

        let flag = AsyncMutation::new("ok?", Value::Bool(false));
        assert_eq!(flag.resolve(Some("no")), Value::Bool(true));
        assert_eq!(flag.resolve(None), Value::Bool(false));

        let text = AsyncMutation::new("name?", Value::Undefined);
        assert_eq!(text.resolve(Some("ada")), Value::from("ada"));
        assert_eq!(text.resolve(None), Value::Undefined);
    }
}
