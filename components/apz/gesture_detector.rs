/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Recognizes taps, long taps and pinches in a stream of touch events.
//!
//! The detector never touches the controller directly. It returns the gestures it
//! recognized and the timers it wants armed; the controller handles the gestures and
//! posts the timers through its content controller. A timer that fires after it was
//! cancelled is recognized by its token and ignored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use apz_traits::{
    InputData, MultiTouchInput, MultiTouchType, PinchGestureInput, PinchGestureType,
    ScreenPoint, SingleTouchData, TapGestureInput, TapGestureType,
};
use keyboard_types::Modifiers;
use log::{debug, trace};
use smallvec::SmallVec;

use crate::prefs::ApzPrefs;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum GestureState {
    None,
    /// One finger is down and has not moved far.
    FirstSingleTouchDown,
    /// Like `FirstSingleTouchDown`, but too long has passed for a lift to be a tap.
    FirstSingleTouchMaxTapDown,
    /// A tap happened; a second one may follow to make a double tap.
    FirstSingleTouchUp,
    SecondSingleTouchDown,
    LongTouchDown,
    /// Several fingers are down but have not moved enough to pinch.
    MultiTouchDown,
    Pinch,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GestureTimeout {
    LongTap,
    /// Ends the window in which a lift counts as a tap, or in which a second tap makes
    /// a double tap.
    MaxTap,
}

/// A timer the detector wants armed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TimeoutRequest {
    pub kind: GestureTimeout,
    pub token: u64,
    pub delay: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct GestureOutput {
    /// The detector consumed the event; it should not drive panning.
    pub consumed: bool,
    pub gestures: Vec<InputData>,
    pub timeouts: Vec<TimeoutRequest>,
}

pub(crate) struct GestureDetector {
    prefs: Arc<ApzPrefs>,
    state: GestureState,
    touches: SmallVec<[SingleTouchData; 2]>,
    touch_start_point: ScreenPoint,
    last_touch_time: Option<Instant>,
    last_modifiers: Modifiers,
    initial_span: f32,
    previous_span: f32,
    next_token: u64,
    long_tap_token: Option<u64>,
    max_tap_token: Option<u64>,
}

impl GestureDetector {
    pub(crate) fn new(prefs: Arc<ApzPrefs>) -> Self {
        Self {
            prefs,
            state: GestureState::None,
            touches: SmallVec::new(),
            touch_start_point: ScreenPoint::origin(),
            last_touch_time: None,
            last_modifiers: Modifiers::empty(),
            initial_span: 0.0,
            previous_span: 0.0,
            next_token: 0,
            long_tap_token: None,
            max_tap_token: None,
        }
    }

    pub(crate) fn touch_count(&self) -> usize {
        self.touches.len()
    }

    fn set_state(&mut self, state: GestureState) {
        if self.state != state {
            trace!("Gesture state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn arm(&mut self, kind: GestureTimeout, delay: Duration, output: &mut GestureOutput) {
        self.next_token += 1;
        let token = self.next_token;
        match kind {
            GestureTimeout::LongTap => self.long_tap_token = Some(token),
            GestureTimeout::MaxTap => self.max_tap_token = Some(token),
        }
        output.timeouts.push(TimeoutRequest { kind, token, delay });
    }

    fn cancel_timeouts(&mut self) {
        self.long_tap_token = None;
        self.max_tap_token = None;
    }

    fn tap(&self, kind: TapGestureType, output: &mut GestureOutput) {
        let time = self.last_touch_time.unwrap_or_else(Instant::now);
        output.gestures.push(InputData::TapGesture(TapGestureInput {
            kind,
            point: self.touch_start_point,
            time,
            modifiers: self.last_modifiers,
        }));
    }

    fn pinch(&self, kind: PinchGestureType, current_span: f32, output: &mut GestureOutput) {
        let time = self.last_touch_time.unwrap_or_else(Instant::now);
        output.gestures.push(InputData::PinchGesture(PinchGestureInput {
            kind,
            focus_point: self.focus_point(),
            current_span,
            previous_span: self.previous_span,
            time,
            modifiers: self.last_modifiers,
        }));
    }

    fn current_span(&self) -> f32 {
        match (self.touches.first(), self.touches.get(1)) {
            (Some(first), Some(second)) => (first.point - second.point).length(),
            _ => 0.0,
        }
    }

    fn focus_point(&self) -> ScreenPoint {
        match (self.touches.first(), self.touches.get(1)) {
            (Some(first), Some(second)) => first.point.lerp(second.point, 0.5),
            (Some(first), None) => first.point,
            _ => self.touch_start_point,
        }
    }

    pub(crate) fn handle_touch(&mut self, event: &MultiTouchInput) -> GestureOutput {
        let mut output = GestureOutput::default();
        self.last_touch_time = Some(event.time);
        self.last_modifiers = event.modifiers;

        match event.kind {
            MultiTouchType::Start => {
                for touch in &event.touches {
                    self.touches.retain(|existing| existing.id != touch.id);
                    self.touches.push(*touch);
                }
                if self.touches.len() == 1 {
                    self.single_touch_start(&mut output);
                } else {
                    self.multi_touch_start();
                    output.consumed = true;
                }
            },
            MultiTouchType::Move => {
                for touch in &event.touches {
                    match self.touches.iter_mut().find(|existing| existing.id == touch.id) {
                        Some(existing) => existing.point = touch.point,
                        None => debug!("Ignoring move of unknown touch {:?}", touch.id),
                    }
                }
                self.touch_move(&mut output);
            },
            MultiTouchType::End => {
                let mut removed = false;
                for touch in &event.touches {
                    let before = self.touches.len();
                    self.touches.retain(|existing| existing.id != touch.id);
                    if self.touches.len() == before {
                        debug!("Ignoring end of unknown touch {:?}", touch.id);
                    } else {
                        removed = true;
                    }
                }
                if removed {
                    self.touch_end(&mut output);
                }
            },
            MultiTouchType::Cancel => {
                self.touches.clear();
                self.cancel_timeouts();
                self.set_state(GestureState::None);
            },
        }
        output
    }

    fn single_touch_start(&mut self, output: &mut GestureOutput) {
        self.touch_start_point = self.touches[0].point;
        match self.state {
            GestureState::None => {
                self.set_state(GestureState::FirstSingleTouchDown);
                self.arm(GestureTimeout::LongTap, self.prefs.long_tap_delay(), output);
                self.arm(GestureTimeout::MaxTap, self.prefs.max_tap_time(), output);
            },
            GestureState::FirstSingleTouchUp => {
                self.set_state(GestureState::SecondSingleTouchDown);
            },
            state => {
                debug!("Unexpected single touch start in {:?}", state);
                self.cancel_timeouts();
                self.set_state(GestureState::None);
            },
        }
    }

    fn multi_touch_start(&mut self) {
        match self.state {
            GestureState::MultiTouchDown | GestureState::Pinch => {},
            _ => {
                self.cancel_timeouts();
                self.set_state(GestureState::MultiTouchDown);
            },
        }
        self.initial_span = self.current_span();
        self.previous_span = self.initial_span;
    }

    fn move_distance_is_large(&self) -> bool {
        match self.touches.first() {
            Some(touch) => {
                (touch.point - self.touch_start_point).length() > self.prefs.touch_start_tolerance
            },
            None => false,
        }
    }

    fn touch_move(&mut self, output: &mut GestureOutput) {
        match self.state {
            GestureState::FirstSingleTouchDown |
            GestureState::FirstSingleTouchMaxTapDown |
            GestureState::LongTouchDown => {
                if self.move_distance_is_large() {
                    self.cancel_timeouts();
                    self.set_state(GestureState::None);
                }
            },
            GestureState::SecondSingleTouchDown => {
                self.cancel_timeouts();
                self.set_state(GestureState::None);
            },
            GestureState::MultiTouchDown => {
                if self.touches.len() < 2 {
                    return;
                }
                let current_span = self.current_span();
                if (current_span - self.initial_span).abs() > self.prefs.pinch_start_threshold {
                    self.previous_span = current_span;
                    self.pinch(PinchGestureType::Start, current_span, output);
                    self.set_state(GestureState::Pinch);
                }
                output.consumed = true;
            },
            GestureState::Pinch => {
                if self.touches.len() < 2 {
                    return;
                }
                let current_span = self.current_span();
                self.pinch(PinchGestureType::Scale, current_span, output);
                self.previous_span = current_span;
                output.consumed = true;
            },
            GestureState::None | GestureState::FirstSingleTouchUp => {},
        }
    }

    fn touch_end(&mut self, output: &mut GestureOutput) {
        match self.state {
            GestureState::FirstSingleTouchDown => {
                self.long_tap_token = None;
                self.tap(TapGestureType::SingleTapUp, output);
                self.set_state(GestureState::FirstSingleTouchUp);
                self.arm(GestureTimeout::MaxTap, self.prefs.max_tap_time(), output);
            },
            GestureState::FirstSingleTouchMaxTapDown => {
                self.cancel_timeouts();
                self.set_state(GestureState::None);
                self.tap(TapGestureType::SingleTapConfirmed, output);
            },
            GestureState::SecondSingleTouchDown => {
                self.cancel_timeouts();
                self.set_state(GestureState::None);
                self.tap(TapGestureType::DoubleTap, output);
            },
            GestureState::LongTouchDown => {
                self.set_state(GestureState::None);
                self.tap(TapGestureType::LongTapUp, output);
            },
            GestureState::MultiTouchDown => {
                if self.touches.len() < 2 {
                    self.set_state(GestureState::None);
                }
                output.consumed = true;
            },
            GestureState::Pinch => {
                if self.touches.len() < 2 {
                    self.set_state(GestureState::None);
                    let span = self.previous_span;
                    self.pinch(PinchGestureType::End, span, output);
                }
                output.consumed = true;
            },
            GestureState::None | GestureState::FirstSingleTouchUp => {},
        }
    }

    /// Handles a timer armed earlier. Stale timers are ignored.
    pub(crate) fn handle_timeout(&mut self, kind: GestureTimeout, token: u64) -> GestureOutput {
        let mut output = GestureOutput::default();
        let current = match kind {
            GestureTimeout::LongTap => &mut self.long_tap_token,
            GestureTimeout::MaxTap => &mut self.max_tap_token,
        };
        if *current != Some(token) {
            trace!("Ignoring stale {:?} timeout", kind);
            return output;
        }
        *current = None;

        match (kind, self.state) {
            (GestureTimeout::LongTap, GestureState::FirstSingleTouchDown) |
            (GestureTimeout::LongTap, GestureState::FirstSingleTouchMaxTapDown) => {
                self.max_tap_token = None;
                self.set_state(GestureState::LongTouchDown);
                self.tap(TapGestureType::LongTap, &mut output);
            },
            (GestureTimeout::MaxTap, GestureState::FirstSingleTouchDown) => {
                self.set_state(GestureState::FirstSingleTouchMaxTapDown);
            },
            (GestureTimeout::MaxTap, GestureState::FirstSingleTouchUp) |
            (GestureTimeout::MaxTap, GestureState::SecondSingleTouchDown) => {
                self.set_state(GestureState::None);
                self.tap(TapGestureType::SingleTapConfirmed, &mut output);
            },
            (kind, state) => trace!("{:?} timeout has nothing to do in {:?}", kind, state),
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(kind: MultiTouchType, time: Instant, touches: &[(i32, f32, f32)]) -> MultiTouchInput {
        let mut event = MultiTouchInput::new(kind, time, Modifiers::empty());
        for &(id, x, y) in touches {
            event = event.with_touch(id, ScreenPoint::new(x, y));
        }
        event
    }

    fn tap_kinds(output: &GestureOutput) -> Vec<TapGestureType> {
        output
            .gestures
            .iter()
            .filter_map(|gesture| match gesture {
                InputData::TapGesture(tap) => Some(tap.kind),
                _ => None,
            })
            .collect()
    }

    fn detector() -> GestureDetector {
        GestureDetector::new(Arc::new(ApzPrefs::default()))
    }

    #[test]
    fn quick_lift_is_a_single_tap_confirmed_by_timeout() {
        let now = Instant::now();
        let mut detector = detector();
        let output = detector.handle_touch(&touch(MultiTouchType::Start, now, &[(0, 10.0, 10.0)]));
        assert_eq!(output.timeouts.len(), 2);

        let output = detector.handle_touch(&touch(MultiTouchType::End, now, &[(0, 10.0, 10.0)]));
        assert_eq!(tap_kinds(&output), vec![TapGestureType::SingleTapUp]);
        let max_tap = output.timeouts[0];
        assert_eq!(max_tap.kind, GestureTimeout::MaxTap);

        let output = detector.handle_timeout(GestureTimeout::MaxTap, max_tap.token);
        assert_eq!(tap_kinds(&output), vec![TapGestureType::SingleTapConfirmed]);
    }

    #[test]
    fn two_quick_taps_make_a_double_tap() {
        let now = Instant::now();
        let mut detector = detector();
        detector.handle_touch(&touch(MultiTouchType::Start, now, &[(0, 10.0, 10.0)]));
        let first_up = detector.handle_touch(&touch(MultiTouchType::End, now, &[(0, 10.0, 10.0)]));
        detector.handle_touch(&touch(MultiTouchType::Start, now, &[(1, 11.0, 10.0)]));
        let output = detector.handle_touch(&touch(MultiTouchType::End, now, &[(1, 11.0, 10.0)]));
        assert_eq!(tap_kinds(&output), vec![TapGestureType::DoubleTap]);

        // The double tap window closing later does nothing.
        let output = detector.handle_timeout(GestureTimeout::MaxTap, first_up.timeouts[0].token);
        assert!(output.gestures.is_empty());
    }

    #[test]
    fn holding_still_is_a_long_tap() {
        let now = Instant::now();
        let mut detector = detector();
        let output = detector.handle_touch(&touch(MultiTouchType::Start, now, &[(0, 10.0, 10.0)]));
        let long_tap = output.timeouts[0];
        assert_eq!(long_tap.kind, GestureTimeout::LongTap);
        let output = detector.handle_timeout(GestureTimeout::LongTap, long_tap.token);
        assert_eq!(tap_kinds(&output), vec![TapGestureType::LongTap]);
        let output = detector.handle_touch(&touch(MultiTouchType::End, now, &[(0, 10.0, 10.0)]));
        assert_eq!(tap_kinds(&output), vec![TapGestureType::LongTapUp]);
    }

    #[test]
    fn moving_cancels_taps() {
        let now = Instant::now();
        let mut detector = detector();
        let output = detector.handle_touch(&touch(MultiTouchType::Start, now, &[(0, 10.0, 50.0)]));
        detector.handle_touch(&touch(MultiTouchType::Move, now, &[(0, 10.0, 10.0)]));
        let end = touch(MultiTouchType::End, now, &[(0, 10.0, 10.0)]);
        assert!(detector.handle_touch(&end).gestures.is_empty());
        let late = detector.handle_timeout(GestureTimeout::LongTap, output.timeouts[0].token);
        assert!(late.gestures.is_empty());
    }

    #[test]
    fn spreading_two_fingers_pinches() {
        let now = Instant::now();
        let mut detector = detector();
        detector.handle_touch(&touch(MultiTouchType::Start, now, &[(0, 100.0, 100.0)]));
        detector.handle_touch(&touch(MultiTouchType::Start, now, &[(1, 200.0, 100.0)]));

        let small = touch(MultiTouchType::Move, now, &[(0, 90.0, 100.0), (1, 210.0, 100.0)]);
        let output = detector.handle_touch(&small);
        assert!(output.gestures.is_empty());
        assert_ne!(detector.state, GestureState::Pinch);

        let large = touch(MultiTouchType::Move, now, &[(0, 50.0, 100.0), (1, 250.0, 100.0)]);
        let output = detector.handle_touch(&large);
        assert!(output.consumed);
        assert_eq!(detector.state, GestureState::Pinch);
        match &output.gestures[..] {
            [InputData::PinchGesture(pinch)] => {
                assert_eq!(pinch.kind, PinchGestureType::Start);
                assert_eq!(pinch.current_span, 200.0);
                assert_eq!(pinch.focus_point, ScreenPoint::new(150.0, 100.0));
            },
            other => panic!("Unexpected gestures {:?}", other),
        }

        let output = detector.handle_touch(&touch(MultiTouchType::End, now, &[(1, 250.0, 100.0)]));
        match &output.gestures[..] {
            [InputData::PinchGesture(pinch)] => assert_eq!(pinch.kind, PinchGestureType::End),
            other => panic!("Unexpected gestures {:?}", other),
        }
        assert_ne!(detector.state, GestureState::Pinch);
    }

    #[test]
    fn unknown_touch_ids_are_ignored() {
        let now = Instant::now();
        let mut detector = detector();
        detector.handle_touch(&touch(MultiTouchType::Start, now, &[(0, 10.0, 10.0)]));
        let output = detector.handle_touch(&touch(MultiTouchType::End, now, &[(7, 10.0, 10.0)]));
        assert!(output.gestures.is_empty());
        assert_eq!(detector.touch_count(), 1);
    }
}
