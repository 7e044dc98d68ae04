/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-axis kinematics: touch tracking, velocity, overscroll and the fling and spring
//! models.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use apz_traits::{CSSPoint, FrameMetrics};

use crate::prefs::ApzPrefs;

/// Displacements smaller than this are treated as zero.
pub(crate) const COORDINATE_EPSILON: f32 = 0.01;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum AxisKind {
    X,
    Y,
}

impl AxisKind {
    pub(crate) fn css_coord(self, point: CSSPoint) -> f32 {
        match self {
            AxisKind::X => point.x,
            AxisKind::Y => point.y,
        }
    }

    fn composition_length(self, metrics: &FrameMetrics) -> f32 {
        let size = metrics.composited_size();
        match self {
            AxisKind::X => size.width,
            AxisKind::Y => size.height,
        }
    }

    fn page_start(self, metrics: &FrameMetrics) -> f32 {
        self.css_coord(metrics.scrollable_rect.origin)
    }

    fn page_length(self, metrics: &FrameMetrics) -> f32 {
        match self {
            AxisKind::X => metrics.scrollable_rect.size.width,
            AxisKind::Y => metrics.scrollable_rect.size.height,
        }
    }
}

fn millis(duration: Duration) -> f32 {
    duration.as_secs_f32() * 1000.0
}

pub(crate) struct Axis {
    kind: AxisKind,
    prefs: Arc<ApzPrefs>,
    /// Last touch position on this axis, in screen pixels.
    pos: f32,
    start_pos: f32,
    pos_time: Option<Instant>,
    /// Screen pixels per millisecond. Positive values increase the scroll offset.
    velocity: f32,
    axis_locked: bool,
    /// CSS pixels past the edge of the scroll range. Positive past the end.
    overscroll: f32,
    velocity_queue: VecDeque<f32>,
}

impl Axis {
    pub(crate) fn new(kind: AxisKind, prefs: Arc<ApzPrefs>) -> Self {
        Self {
            kind,
            prefs,
            pos: 0.0,
            start_pos: 0.0,
            pos_time: None,
            velocity: 0.0,
            axis_locked: false,
            overscroll: 0.0,
            velocity_queue: VecDeque::new(),
        }
    }

    pub(crate) fn kind(&self) -> AxisKind {
        self.kind
    }

    pub(crate) fn start_touch(&mut self, pos: f32, time: Instant) {
        self.pos = pos;
        self.start_pos = pos;
        self.pos_time = Some(time);
        self.axis_locked = false;
        self.velocity = 0.0;
        self.velocity_queue.clear();
    }

    pub(crate) fn update_with_touch_at_device_point(&mut self, pos: f32, time: Instant) {
        let elapsed = match self.pos_time {
            Some(previous) => millis(time.saturating_duration_since(previous)),
            None => 0.0,
        };
        if elapsed <= 0.0 {
            self.pos = pos;
            return;
        }

        let mut velocity = if self.axis_locked {
            0.0
        } else {
            (self.pos - pos) / elapsed
        };
        if let Some(max_velocity) = self.prefs.max_velocity {
            velocity = velocity.clamp(-max_velocity, max_velocity);
        }
        self.velocity = velocity;
        self.pos = pos;
        self.pos_time = Some(time);

        self.velocity_queue.push_back(velocity);
        while self.velocity_queue.len() > self.prefs.max_velocity_queue_size {
            self.velocity_queue.pop_front();
        }
    }

    pub(crate) fn end_touch(&mut self) {
        self.axis_locked = false;
        if !self.velocity_queue.is_empty() {
            self.velocity =
                self.velocity_queue.iter().sum::<f32>() / self.velocity_queue.len() as f32;
            self.velocity_queue.clear();
        }
    }

    pub(crate) fn cancel_touch(&mut self) {
        self.axis_locked = false;
        self.velocity = 0.0;
        self.velocity_queue.clear();
    }

    pub(crate) fn pos(&self) -> f32 {
        self.pos
    }

    pub(crate) fn pan_distance_to(&self, pos: f32) -> f32 {
        (pos - self.start_pos).abs()
    }

    pub(crate) fn set_axis_locked(&mut self, locked: bool) {
        self.axis_locked = locked;
    }

    pub(crate) fn velocity(&self) -> f32 {
        self.velocity
    }

    pub(crate) fn set_velocity(&mut self, velocity: f32) {
        self.velocity = velocity;
    }

    pub(crate) fn overscroll(&self) -> f32 {
        self.overscroll
    }

    pub(crate) fn is_overscrolled(&self) -> bool {
        self.overscroll != 0.0
    }

    pub(crate) fn clear_overscroll(&mut self) {
        self.overscroll = 0.0;
    }

    pub(crate) fn overscroll_by(&mut self, amount: f32) {
        self.overscroll += amount;
    }

    pub(crate) fn can_scroll(&self, metrics: &FrameMetrics) -> bool {
        self.kind.page_length(metrics) - self.kind.composition_length(metrics) > COORDINATE_EPSILON
    }

    /// How far past the scroll range moving by `displacement` would take us.
    fn displacement_will_overscroll_amount(
        &self,
        metrics: &FrameMetrics,
        displacement: f32,
    ) -> f32 {
        let origin = self.kind.css_coord(metrics.scroll_offset);
        let min = self.kind.page_start(metrics);
        let max = min +
            (self.kind.page_length(metrics) - self.kind.composition_length(metrics)).max(0.0);
        let target = origin + displacement;
        if target < min {
            target - min
        } else if target > max {
            target - max
        } else {
            0.0
        }
    }

    /// Splits `displacement` (CSS pixels) into the part that can be scrolled and the
    /// part that would overscroll. Existing overscroll in the opposite direction is
    /// consumed first.
    pub(crate) fn adjust_displacement(
        &mut self,
        metrics: &FrameMetrics,
        displacement: f32,
    ) -> (f32, f32) {
        if self.axis_locked {
            return (0.0, 0.0);
        }

        let mut displacement = displacement;
        let consumed = if self.overscroll > 0.0 && displacement < 0.0 {
            self.overscroll.min(-displacement)
        } else if self.overscroll < 0.0 && displacement > 0.0 {
            self.overscroll.max(-displacement)
        } else {
            0.0
        };
        self.overscroll -= consumed;
        displacement += consumed;

        let excess = self.displacement_will_overscroll_amount(metrics, displacement);
        (displacement - excess, excess)
    }

    /// Applies friction for `delta` of fling. Returns false once the fling has slowed
    /// down enough to stop.
    pub(crate) fn fling_apply_friction_or_cancel(&mut self, delta: Duration) -> bool {
        if self.velocity.abs() <= self.prefs.fling_stopped_threshold {
            self.velocity = 0.0;
            return false;
        }
        self.velocity *= (1.0 - self.prefs.fling_friction).powf(millis(delta));
        true
    }

    /// Advances the snap-back spring by `delta`. Returns false once the overscroll is
    /// gone.
    pub(crate) fn sample_snap_back(&mut self, delta: Duration, zoom: f32) -> bool {
        let dt = millis(delta);
        let previous = self.overscroll;
        if previous == 0.0 && self.velocity == 0.0 {
            return false;
        }

        let zoom = if zoom > 0.0 { zoom } else { 1.0 };
        let mut velocity = self.velocity / zoom;
        let force = -self.prefs.overscroll_spring_stiffness * self.overscroll -
            self.prefs.overscroll_spring_friction * velocity;
        velocity += force * dt;
        self.overscroll += velocity * dt;
        self.velocity = velocity * zoom;

        let crossed = previous != 0.0 && previous.signum() != self.overscroll.signum();
        let settled = self.overscroll.abs() < self.prefs.overscroll_stop_distance_threshold &&
            velocity.abs() < self.prefs.overscroll_stop_velocity_threshold;
        if crossed || settled {
            self.overscroll = 0.0;
            self.velocity = 0.0;
            return false;
        }
        true
    }
}
