/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The animations a controller can run between input events: flings, overscroll
//! snap-back, animated zooms and smooth wheel scrolls.

use std::time::Duration;

use apz_traits::{CSSPoint, CSSToScreenScale, CSSVector, FrameMetrics, ScreenVector};
use euclid::Scale;
use log::trace;

use crate::axis::{Axis, AxisKind, COORDINATE_EPSILON};
use crate::prefs::ApzPrefs;

/// The parts of a controller an animation may change while it is sampled.
pub(crate) struct AnimationTarget<'a> {
    pub metrics: &'a mut FrameMetrics,
    pub x: &'a mut Axis,
    pub y: &'a mut Axis,
}

/// Work an animation asks for that has to run after the controller's monitor has been
/// released, because it calls into other controllers or the tree manager.
#[derive(Debug, PartialEq)]
pub(crate) enum DeferredTask {
    /// A fling hit the edge of the scroll range with this much velocity left.
    HandoffFling(ScreenVector),
}

pub(crate) enum PanZoomAnimation {
    Fling,
    Overscroll(OverscrollAnimation),
    Zoom(ZoomAnimation),
    WheelScroll(WheelScrollAnimation),
}

impl PanZoomAnimation {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            PanZoomAnimation::Fling => "fling",
            PanZoomAnimation::Overscroll(_) => "overscroll",
            PanZoomAnimation::Zoom(_) => "zoom",
            PanZoomAnimation::WheelScroll(_) => "wheel scroll",
        }
    }

    /// How often content should be asked to repaint while this animation runs.
    pub(crate) fn repaint_interval(&self, prefs: &ApzPrefs) -> Option<Duration> {
        match self {
            PanZoomAnimation::Fling | PanZoomAnimation::WheelScroll(_) => {
                Some(prefs.fling_repaint_interval())
            },
            PanZoomAnimation::Overscroll(animation) if animation.is_flinging() => {
                Some(prefs.fling_repaint_interval())
            },
            PanZoomAnimation::Overscroll(_) | PanZoomAnimation::Zoom(_) => None,
        }
    }

    /// Advances the animation by `delta`. Returns false once it has finished.
    pub(crate) fn sample(
        &mut self,
        target: AnimationTarget<'_>,
        delta: Duration,
        deferred: &mut Vec<DeferredTask>,
    ) -> bool {
        match self {
            PanZoomAnimation::Fling => sample_fling(target, delta, deferred),
            PanZoomAnimation::Overscroll(animation) => animation.sample(target, delta),
            PanZoomAnimation::Zoom(animation) => animation.sample(target.metrics, delta),
            PanZoomAnimation::WheelScroll(animation) => animation.sample(target.metrics, delta),
        }
    }
}

fn sample_fling(
    target: AnimationTarget<'_>,
    delta: Duration,
    deferred: &mut Vec<DeferredTask>,
) -> bool {
    let AnimationTarget { metrics, x, y } = target;
    let continue_x = x.fling_apply_friction_or_cancel(delta);
    let continue_y = y.fling_apply_friction_or_cancel(delta);
    if !continue_x && !continue_y {
        return false;
    }

    let zoom = metrics.zoom.get();
    let elapsed = delta.as_secs_f32() * 1000.0;
    let (allowed_x, overscroll_x) = x.adjust_displacement(metrics, x.velocity() * elapsed / zoom);
    let (allowed_y, overscroll_y) = y.adjust_displacement(metrics, y.velocity() * elapsed / zoom);
    metrics.scroll_by(CSSVector::new(allowed_x, allowed_y));

    let hit_x = overscroll_x.abs() > COORDINATE_EPSILON;
    let hit_y = overscroll_y.abs() > COORDINATE_EPSILON;
    if !hit_x && !hit_y {
        return true;
    }

    let mut handoff = ScreenVector::zero();
    if hit_x {
        handoff.x = x.velocity();
        x.set_velocity(0.0);
    }
    if hit_y {
        handoff.y = y.velocity();
        y.set_velocity(0.0);
    }
    trace!("Fling hit the edge, handing off {:?}", handoff);
    deferred.push(DeferredTask::HandoffFling(handoff));
    x.velocity() != 0.0 || y.velocity() != 0.0
}

/// Springs overscrolled axes back to the edge. An axis that is not overscrolled keeps
/// flinging with whatever velocity it has, and starts springing once it hits an edge.
pub(crate) struct OverscrollAnimation {
    spring_x: bool,
    spring_y: bool,
}

impl OverscrollAnimation {
    pub(crate) fn new(spring_x: bool, spring_y: bool) -> Self {
        Self { spring_x, spring_y }
    }

    /// Springs back both axes, with nothing left to fling.
    pub(crate) fn snap_back() -> Self {
        Self::new(true, true)
    }

    fn is_flinging(&self) -> bool {
        !self.spring_x || !self.spring_y
    }

    fn sample(&mut self, target: AnimationTarget<'_>, delta: Duration) -> bool {
        let AnimationTarget { metrics, x, y } = target;
        let continue_x = sample_overscroll_axis(&mut self.spring_x, x, metrics, delta);
        let continue_y = sample_overscroll_axis(&mut self.spring_y, y, metrics, delta);
        continue_x || continue_y
    }
}

fn sample_overscroll_axis(
    spring: &mut bool,
    axis: &mut Axis,
    metrics: &mut FrameMetrics,
    delta: Duration,
) -> bool {
    let zoom = metrics.zoom.get();
    if *spring {
        return axis.sample_snap_back(delta, zoom);
    }
    if !axis.fling_apply_friction_or_cancel(delta) {
        return false;
    }

    let elapsed = delta.as_secs_f32() * 1000.0;
    let (allowed, excess) = axis.adjust_displacement(metrics, axis.velocity() * elapsed / zoom);
    metrics.scroll_by(match axis.kind() {
        AxisKind::X => CSSVector::new(allowed, 0.0),
        AxisKind::Y => CSSVector::new(0.0, allowed),
    });
    if excess.abs() > COORDINATE_EPSILON {
        trace!("{:?} fling ran into the edge while overscrolled", axis.kind());
        *spring = true;
    }
    true
}

/// The timing function `cubic-bezier(0.25, 0.1, 0.25, 1.0)`, also known as `ease`.
pub(crate) fn ease(progress: f32) -> f32 {
    const X1: f32 = 0.25;
    const Y1: f32 = 0.1;
    const X2: f32 = 0.25;
    const Y2: f32 = 1.0;

    fn bezier(p1: f32, p2: f32, s: f32) -> f32 {
        let inverse = 1.0 - s;
        3.0 * inverse * inverse * s * p1 + 3.0 * inverse * s * s * p2 + s * s * s
    }

    let progress = progress.clamp(0.0, 1.0);
    // Bisection on x(s), which is monotonic for control points inside [0, 1].
    let (mut low, mut high) = (0.0f32, 1.0f32);
    let mut s = progress;
    for _ in 0..32 {
        let x = bezier(X1, X2, s);
        if (x - progress).abs() < 1e-5 {
            break;
        }
        if x < progress {
            low = s;
        } else {
            high = s;
        }
        s = (low + high) / 2.0;
    }
    bezier(Y1, Y2, s)
}

fn progress(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / duration.as_secs_f32()).min(1.0)
}

/// Animates zoom and scroll offset together towards a target.
pub(crate) struct ZoomAnimation {
    start_offset: CSSPoint,
    start_zoom: CSSToScreenScale,
    end_offset: CSSPoint,
    end_zoom: CSSToScreenScale,
    duration: Duration,
    elapsed: Duration,
}

impl ZoomAnimation {
    pub(crate) fn new(
        start_offset: CSSPoint,
        start_zoom: CSSToScreenScale,
        end_offset: CSSPoint,
        end_zoom: CSSToScreenScale,
        duration: Duration,
    ) -> Self {
        Self {
            start_offset,
            start_zoom,
            end_offset,
            end_zoom,
            duration,
            elapsed: Duration::ZERO,
        }
    }

    fn sample(&mut self, metrics: &mut FrameMetrics, delta: Duration) -> bool {
        self.elapsed += delta;
        if self.elapsed >= self.duration {
            metrics.zoom = self.end_zoom;
            metrics.scroll_offset = self.end_offset;
            return false;
        }

        let t = ease(progress(self.elapsed, self.duration));
        // Interpolating 1/zoom keeps the visible area changing linearly.
        let inverse_zoom = (1.0 - t) / self.start_zoom.get() + t / self.end_zoom.get();
        metrics.zoom = Scale::new(1.0 / inverse_zoom);
        metrics.scroll_offset = self.start_offset.lerp(self.end_offset, t);
        true
    }
}

/// Eases the scroll offset towards a destination that further wheel events can move.
pub(crate) struct WheelScrollAnimation {
    start_offset: CSSPoint,
    destination: CSSPoint,
    duration: Duration,
    elapsed: Duration,
}

impl WheelScrollAnimation {
    pub(crate) fn new(start_offset: CSSPoint, destination: CSSPoint, duration: Duration) -> Self {
        Self {
            start_offset,
            destination,
            duration,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn destination(&self) -> CSSPoint {
        self.destination
    }

    /// Restarts the animation from `current` towards a new destination.
    pub(crate) fn retarget(&mut self, current: CSSPoint, destination: CSSPoint) {
        self.start_offset = current;
        self.destination = destination;
        self.elapsed = Duration::ZERO;
    }

    fn sample(&mut self, metrics: &mut FrameMetrics, delta: Duration) -> bool {
        self.elapsed += delta;
        let t = ease(progress(self.elapsed, self.duration));
        let offset = self.start_offset.lerp(self.destination, t);
        metrics.scroll_offset = metrics.clamp_scroll_offset(offset);
        self.elapsed < self.duration
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use apz_traits::{CSSRect, ParentLayerRect};
    use euclid::{Point2D, Size2D};

    use super::*;

    fn metrics() -> FrameMetrics {
        FrameMetrics {
            composition_bounds: ParentLayerRect::new(
                Point2D::origin(),
                Size2D::new(100.0, 100.0),
            ),
            scrollable_rect: CSSRect::new(Point2D::origin(), Size2D::new(100.0, 1000.0)),
            scroll_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn ease_is_monotonic_with_fixed_ends() {
        assert!(ease(0.0).abs() < 1e-3);
        assert!((ease(1.0) - 1.0).abs() < 1e-3);
        let mut previous = 0.0;
        for step in 1..=20 {
            let value = ease(step as f32 / 20.0);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn fling_hands_off_at_the_edge() {
        let prefs = Arc::new(ApzPrefs::default());
        let mut metrics = metrics();
        metrics.scroll_offset = CSSPoint::new(0.0, 895.0);
        let mut x = Axis::new(AxisKind::X, prefs.clone());
        let mut y = Axis::new(AxisKind::Y, prefs);
        y.set_velocity(2.0);

        let mut deferred = Vec::new();
        let mut animation = PanZoomAnimation::Fling;
        let running = animation.sample(
            AnimationTarget {
                metrics: &mut metrics,
                x: &mut x,
                y: &mut y,
            },
            Duration::from_millis(16),
            &mut deferred,
        );
        assert!(!running);
        assert_eq!(metrics.scroll_offset.y, 900.0);
        assert_eq!(deferred.len(), 1);
        match deferred[0] {
            DeferredTask::HandoffFling(velocity) => {
                assert_eq!(velocity.x, 0.0);
                assert!(velocity.y > 0.0);
            },
        }
    }

    #[test]
    fn free_axis_keeps_flinging_while_the_other_springs_back() {
        let prefs = Arc::new(ApzPrefs::default());
        let mut metrics = metrics();
        metrics.scrollable_rect = CSSRect::new(Point2D::origin(), Size2D::new(5000.0, 1000.0));
        metrics.scroll_offset = CSSPoint::new(100.0, 900.0);
        let mut x = Axis::new(AxisKind::X, prefs.clone());
        let mut y = Axis::new(AxisKind::Y, prefs);
        x.set_velocity(2.0);
        y.set_velocity(2.0);

        let mut animation = PanZoomAnimation::Overscroll(OverscrollAnimation::new(false, true));
        let mut deferred = Vec::new();
        assert!(animation.sample(
            AnimationTarget {
                metrics: &mut metrics,
                x: &mut x,
                y: &mut y,
            },
            Duration::from_millis(16),
            &mut deferred,
        ));
        assert!(metrics.scroll_offset.x > 100.0);
        assert_eq!(metrics.scroll_offset.y, 900.0);
        assert!(y.is_overscrolled());
        assert!(x.velocity() > 0.0);
        assert!(!x.is_overscrolled());
        assert!(deferred.is_empty());
    }

    #[test]
    fn zoom_animation_lands_on_target() {
        let mut metrics = metrics();
        let mut animation = ZoomAnimation::new(
            CSSPoint::origin(),
            Scale::new(1.0),
            CSSPoint::new(10.0, 20.0),
            Scale::new(2.0),
            Duration::from_millis(250),
        );
        assert!(animation.sample(&mut metrics, Duration::from_millis(100)));
        assert!(metrics.zoom.get() > 1.0 && metrics.zoom.get() < 2.0);
        assert!(!animation.sample(&mut metrics, Duration::from_millis(200)));
        assert_eq!(metrics.zoom.get(), 2.0);
        assert_eq!(metrics.scroll_offset, CSSPoint::new(10.0, 20.0));
    }

    #[test]
    fn wheel_scroll_is_clamped_and_retargetable() {
        let mut metrics = metrics();
        let mut animation = WheelScrollAnimation::new(
            CSSPoint::origin(),
            CSSPoint::new(0.0, 100.0),
            Duration::from_millis(150),
        );
        assert!(animation.sample(&mut metrics, Duration::from_millis(50)));
        let midway = metrics.scroll_offset;
        animation.retarget(midway, CSSPoint::new(0.0, 5000.0));
        assert!(!animation.sample(&mut metrics, Duration::from_millis(150)));
        assert_eq!(metrics.scroll_offset, CSSPoint::new(0.0, 900.0));
    }
}
