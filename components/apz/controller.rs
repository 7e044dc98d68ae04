/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The asynchronous pan-zoom controller: one per scrollable frame.
//!
//! A controller turns input events into changes of its frame's scroll offset and zoom,
//! runs the animations that follow a gesture, and keeps content informed through its
//! [`ContentController`]. The compositor samples the resulting transform once per frame.
//!
//! All mutable state lives behind a single monitor. The monitor is always the innermost
//! lock: a controller never calls into the tree manager or another controller while
//! holding it. Content controllers may be called with the monitor held, since they must
//! never call back synchronously.

use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use apz_traits::{
    ApzStateChange, CSSPoint, CSSRect, CSSSize, CSSVector, ContentController, EventStatus,
    FrameMetrics, InputData, LayersId, MultiTouchInput, MultiTouchType, PanGestureInput,
    PanGestureType, PinchGestureInput, PinchGestureType, ScreenPoint, ScreenVector,
    ScrollDeltaType, ScrollMode, ScrollWheelInput, ScrollableLayerGuid, TapGestureInput,
    TapGestureType, TouchBehaviorFlags, ViewTransform, ZoomConstraints, transform_point,
};
use euclid::default::Transform3D;
use euclid::{Point2D, Scale, Size2D};
use keyboard_types::Modifiers;
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::animation::{
    AnimationTarget, DeferredTask, OverscrollAnimation, PanZoomAnimation, WheelScrollAnimation,
    ZoomAnimation,
};
use crate::axis::{Axis, AxisKind, COORDINATE_EPSILON};
use crate::context::ApzContext;
use crate::gesture_detector::{GestureDetector, GestureOutput, GestureTimeout};
use crate::prefs::ApzPrefs;
use crate::task_throttler::TaskThrottler;
use crate::touch_block::{ContentResponse, TouchBlockId, TouchBlockQueue};
use crate::tree_manager::ApzcTreeManager;

/// Paint duration assumed for display port skewing when measured durations are not used.
const DEFAULT_PAINT_DURATION_MS: f32 = 50.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PanZoomState {
    Nothing,
    Fling,
    /// A finger is down but has not moved far enough to pan.
    Touching,
    Panning,
    PanningLockedX,
    PanningLockedY,
    Pinching,
    AnimatingZoom,
    OverscrollAnimation,
    WheelScroll,
}

impl PanZoomState {
    pub fn is_panning(self) -> bool {
        matches!(
            self,
            PanZoomState::Panning | PanZoomState::PanningLockedX | PanZoomState::PanningLockedY
        )
    }

    /// Whether the async transform may be changing in this state.
    pub fn is_transforming(self) -> bool {
        !matches!(self, PanZoomState::Nothing | PanZoomState::Touching)
    }
}

/// What the compositor gets back from sampling a controller for a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampledTransform {
    pub transform: ViewTransform,
    /// The current scroll offset in screen pixels.
    pub scroll_offset: ScreenPoint,
    /// Whether an animation is still running and the compositor should keep sampling.
    pub animating: bool,
}

struct ApzcState {
    state: PanZoomState,
    /// The metrics the controller works on.
    metrics: FrameMetrics,
    /// The metrics of the last paint content sent us.
    last_content_paint_metrics: FrameMetrics,
    /// The last metrics handed to the paint throttler.
    last_paint_request_metrics: FrameMetrics,
    /// The metrics of the last repaint request that actually went to content.
    last_dispatched_paint_metrics: FrameMetrics,
    zoom_constraints: ZoomConstraints,
    x: Axis,
    y: Axis,
    animation: Option<PanZoomAnimation>,
    last_sample_time: Option<Instant>,
    paint_throttler: TaskThrottler<FrameMetrics>,
    touch_blocks: TouchBlockQueue,
    gestures: GestureDetector,
    /// Touch behaviors allowed for the block currently being handled. `None` when
    /// touch-action is not in use.
    touch_behaviors: Option<TouchBehaviorFlags>,
    /// Pinch focus of the last scale event, relative to the composition bounds.
    last_zoom_focus: ScreenPoint,
    single_tap_in_block: bool,
    destroyed: bool,
}

impl ApzcState {
    fn new(prefs: &Arc<ApzPrefs>) -> Self {
        Self {
            state: PanZoomState::Nothing,
            metrics: FrameMetrics::default(),
            last_content_paint_metrics: FrameMetrics::default(),
            last_paint_request_metrics: FrameMetrics::default(),
            last_dispatched_paint_metrics: FrameMetrics::default(),
            zoom_constraints: ZoomConstraints::default(),
            x: Axis::new(AxisKind::X, prefs.clone()),
            y: Axis::new(AxisKind::Y, prefs.clone()),
            animation: None,
            last_sample_time: None,
            paint_throttler: TaskThrottler::new(
                prefs.paint_timeout(),
                prefs.num_paint_duration_samples,
            ),
            touch_blocks: TouchBlockQueue::default(),
            gestures: GestureDetector::new(prefs.clone()),
            touch_behaviors: None,
            last_zoom_focus: ScreenPoint::origin(),
            single_tap_in_block: false,
            destroyed: false,
        }
    }

    fn is_overscrolled(&self) -> bool {
        self.x.is_overscrolled() || self.y.is_overscrolled()
    }

    fn velocity(&self) -> ScreenVector {
        ScreenVector::new(self.x.velocity(), self.y.velocity())
    }

    fn can_scroll(&self) -> bool {
        self.x.can_scroll(&self.metrics) || self.y.can_scroll(&self.metrics)
    }

    fn start_touch(&mut self, point: ScreenPoint, time: Instant) {
        self.x.start_touch(point.x, time);
        self.y.start_touch(point.y, time);
    }

    fn zero_velocity(&mut self) {
        self.x.set_velocity(0.0);
        self.y.set_velocity(0.0);
    }

    /// The zoom range actually available: never so far out that the page no longer
    /// fills the composition bounds.
    fn zoom_bounds(&self) -> (f32, f32) {
        let bounds = self.metrics.composition_bounds.size;
        let page = self.metrics.scrollable_rect.size;
        let mut min_zoom = self.zoom_constraints.min_zoom.get();
        if page.width > 0.0 && page.height > 0.0 {
            min_zoom = min_zoom.max((bounds.width / page.width).max(bounds.height / page.height));
        }
        let max_zoom = self.zoom_constraints.max_zoom.get();
        (min_zoom.min(max_zoom), max_zoom)
    }

    fn current_async_transform(&self) -> ViewTransform {
        let painted = &self.last_content_paint_metrics;
        let painted_offset = if painted.is_scrollable() {
            painted.scroll_offset
        } else {
            CSSPoint::origin()
        };
        let zoom = self.metrics.zoom.get();
        let painted_zoom = painted.zoom.get();
        let scale = if painted_zoom > 0.0 {
            zoom / painted_zoom
        } else {
            1.0
        };
        let scrolled = self.metrics.scroll_offset - painted_offset;
        ViewTransform {
            translation: ScreenVector::new(
                -(scrolled.x + self.x.overscroll()) * zoom,
                -(scrolled.y + self.y.overscroll()) * zoom,
            ),
            scale,
        }
    }

    fn scroll_offset_in_screen(&self) -> ScreenPoint {
        let zoom = self.metrics.zoom.get();
        ScreenPoint::new(
            self.metrics.scroll_offset.x * zoom,
            self.metrics.scroll_offset.y * zoom,
        )
    }
}

/// Scrolling and zooming divide by the zoom, so it has to be a positive number.
fn checked_zoom(metrics: FrameMetrics) -> FrameMetrics {
    if !metrics.has_valid_zoom() {
        warn!(
            "Frame {} has zoom {}, using the minimum",
            metrics.scroll_id,
            metrics.zoom.get()
        );
    }
    metrics.with_valid_zoom()
}

/// Whether touch-action lets a gesture do `behavior`. No flags means touch-action is
/// not in play.
fn allows(behaviors: Option<TouchBehaviorFlags>, behavior: TouchBehaviorFlags) -> bool {
    behaviors.is_none_or(|behaviors| behaviors.contains(behavior))
}

pub struct AsyncPanZoomController {
    layers_id: LayersId,
    context: ApzContext,
    self_handle: Weak<AsyncPanZoomController>,
    tree_manager: Mutex<Weak<ApzcTreeManager>>,
    content_controller: RwLock<Option<Arc<dyn ContentController>>>,
    monitor: Mutex<ApzcState>,
}

impl fmt::Debug for AsyncPanZoomController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // May be formatted with the monitor held, so never block on it.
        match self.monitor.try_lock() {
            Some(state) => write!(f, "AsyncPanZoomController{}", self.guid_locked(&state)),
            None => write!(f, "AsyncPanZoomController(layers {})", self.layers_id),
        }
    }
}

impl AsyncPanZoomController {
    pub fn new(
        layers_id: LayersId,
        context: ApzContext,
        tree_manager: Weak<ApzcTreeManager>,
        content_controller: Option<Arc<dyn ContentController>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_handle| Self {
            layers_id,
            monitor: Mutex::new(ApzcState::new(&context.prefs)),
            context,
            self_handle: self_handle.clone(),
            tree_manager: Mutex::new(tree_manager),
            content_controller: RwLock::new(content_controller),
        })
    }

    pub fn layers_id(&self) -> LayersId {
        self.layers_id
    }

    pub fn guid(&self) -> ScrollableLayerGuid {
        ScrollableLayerGuid::from_metrics(self.layers_id, &self.monitor.lock().metrics)
    }

    pub fn state(&self) -> PanZoomState {
        self.monitor.lock().state
    }

    pub fn frame_metrics(&self) -> FrameMetrics {
        self.monitor.lock().metrics.clone()
    }

    /// Replaces the metrics outright, as if content had just painted them.
    pub fn set_frame_metrics(&self, metrics: FrameMetrics) {
        let metrics = checked_zoom(metrics);
        let mut state = self.monitor.lock();
        state.last_content_paint_metrics = metrics.clone();
        state.last_dispatched_paint_metrics = metrics.clone();
        state.metrics = metrics;
    }

    pub fn zoom_constraints(&self) -> ZoomConstraints {
        self.monitor.lock().zoom_constraints
    }

    pub fn update_zoom_constraints(&self, constraints: ZoomConstraints) {
        let constraints = constraints.sanitized();
        debug!("{:?} updating zoom constraints to {:?}", self, constraints);
        self.monitor.lock().zoom_constraints = constraints;
    }

    pub fn is_overscrolled(&self) -> bool {
        self.monitor.lock().is_overscrolled()
    }

    /// Current velocity in screen pixels per millisecond.
    pub fn velocity(&self) -> ScreenVector {
        self.monitor.lock().velocity()
    }

    pub fn is_destroyed(&self) -> bool {
        self.monitor.lock().destroyed
    }

    pub fn current_async_transform(&self) -> ViewTransform {
        self.monitor.lock().current_async_transform()
    }

    /// The transform from what content last painted to what we last asked it to paint.
    pub fn transform_to_last_dispatched_paint(&self) -> Transform3D<f32> {
        let state = self.monitor.lock();
        let painted = &state.last_content_paint_metrics;
        let dispatched = &state.last_dispatched_paint_metrics;
        let zoom = painted.zoom.get();
        let scroll_change = (painted.scroll_offset - dispatched.scroll_offset) * zoom;
        let dispatched_zoom = dispatched.zoom.get();
        let zoom_change = if dispatched_zoom > 0.0 {
            zoom / dispatched_zoom
        } else {
            1.0
        };
        Transform3D::translation(scroll_change.x, scroll_change.y, 0.0)
            .then(&Transform3D::scale(zoom_change, zoom_change, 1.0))
    }

    pub(crate) fn set_content_controller(&self, controller: Option<Arc<dyn ContentController>>) {
        *self.content_controller.write() = controller;
    }

    fn content_controller(&self) -> Option<Arc<dyn ContentController>> {
        self.content_controller.read().clone()
    }

    fn tree_manager(&self) -> Option<Arc<ApzcTreeManager>> {
        self.tree_manager.lock().upgrade()
    }

    fn guid_locked(&self, state: &ApzcState) -> ScrollableLayerGuid {
        ScrollableLayerGuid::from_metrics(self.layers_id, &state.metrics)
    }

    /// Detaches the controller from its tree manager and content controller. Timers
    /// that fire afterwards find nothing to do.
    pub(crate) fn destroy(&self) {
        debug!("Destroying {:?}", self);
        *self.content_controller.write() = None;
        *self.tree_manager.lock() = Weak::new();
        let mut state = self.monitor.lock();
        state.animation = None;
        state.touch_blocks.clear();
        state.destroyed = true;
    }

    fn notify(&self, guid: ScrollableLayerGuid, change: ApzStateChange, arg: i32) {
        if let Some(controller) = self.content_controller() {
            controller.notify_apz_state_change(guid, change, arg);
        }
    }

    /// Runs `callback` on this controller after `delay`, if it is still alive then.
    fn post_delayed(
        &self,
        delay: Duration,
        callback: impl FnOnce(&AsyncPanZoomController) + Send + 'static,
    ) {
        let Some(controller) = self.content_controller() else {
            return;
        };
        let handle = self.self_handle.clone();
        controller.post_delayed_task(
            Box::new(move || {
                if let Some(apzc) = handle.upgrade() {
                    callback(&apzc);
                }
            }),
            delay,
        );
    }

    fn set_state(&self, state: &mut ApzcState, new_state: PanZoomState) {
        let old_state = std::mem::replace(&mut state.state, new_state);
        if old_state == new_state {
            return;
        }
        trace!("{:?} -> {:?}", old_state, new_state);
        if old_state.is_transforming() != new_state.is_transforming() {
            let change = if new_state.is_transforming() {
                ApzStateChange::TransformBegin
            } else {
                ApzStateChange::TransformEnd
            };
            self.notify(self.guid_locked(state), change, 0);
        }
    }

    fn start_animation(
        &self,
        state: &mut ApzcState,
        animation: PanZoomAnimation,
        new_state: PanZoomState,
    ) {
        trace!("Starting {} animation", animation.name());
        state.animation = Some(animation);
        // An animation started while sampling carries on from the frame being sampled.
        let now = self.context.now();
        state.last_sample_time = Some(state.last_sample_time.map_or(now, |last| last.max(now)));
        self.set_state(state, new_state);
    }

    /// Stops whatever animation is running and resets the controller to idle.
    pub fn cancel_animation(&self) {
        let mut state = self.monitor.lock();
        self.cancel_animation_locked(&mut state);
    }

    fn cancel_animation_locked(&self, state: &mut ApzcState) {
        if let Some(animation) = state.animation.take() {
            trace!("Cancelling {} animation", animation.name());
        }
        state.zero_velocity();
        self.set_state(state, PanZoomState::Nothing);
        // Nothing else will relieve the overscroll once the animation is gone.
        if state.is_overscrolled() {
            state.x.clear_overscroll();
            state.y.clear_overscroll();
            self.request_content_repaint(state);
        }
    }

    fn request_content_repaint(&self, state: &mut ApzcState) {
        let metrics = state.metrics.clone();
        let velocity = state.velocity();
        self.request_content_repaint_for(state, metrics, velocity);
    }

    fn request_content_repaint_for(
        &self,
        state: &mut ApzcState,
        mut metrics: FrameMetrics,
        velocity: ScreenVector,
    ) {
        metrics.display_port = calculate_pending_display_port(
            &self.context.prefs,
            &metrics,
            velocity,
            state.paint_throttler.average_duration(),
        );
        metrics.scroll_offset_updated = false;

        let last = &state.last_paint_request_metrics;
        if fuzzy_equal_rects(last.display_port, metrics.display_port) &&
            fuzzy_equal_points(last.scroll_offset, metrics.scroll_offset) &&
            last.zoom == metrics.zoom &&
            last.composition_bounds == metrics.composition_bounds
        {
            trace!("Skipping repaint request, nothing changed");
            return;
        }

        state.last_paint_request_metrics = metrics.clone();
        if let Some(metrics) = state.paint_throttler.post_task(metrics, self.context.now()) {
            self.dispatch_repaint_request(state, metrics);
        }
    }

    fn dispatch_repaint_request(&self, state: &mut ApzcState, metrics: FrameMetrics) {
        let Some(controller) = self.content_controller() else {
            return;
        };
        debug!(
            "{} requesting repaint at {:?} zoom {}",
            self.guid_locked(state),
            metrics.scroll_offset,
            metrics.zoom.get()
        );
        state.last_dispatched_paint_metrics = metrics.clone();
        controller.request_content_repaint(metrics);
    }

    /// Takes in the metrics of a layers update from content.
    pub fn notify_layers_updated(&self, layer_metrics: &FrameMetrics, is_first_paint: bool) {
        let layer_metrics = &checked_zoom(layer_metrics.clone());
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        let now = self.context.now();

        state.last_content_paint_metrics = layer_metrics.clone();
        if let Some(metrics) = state.paint_throttler.task_complete(now) {
            self.dispatch_repaint_request(state, metrics);
        }

        let scroll_offset_updated = layer_metrics.scroll_offset_updated &&
            layer_metrics.scroll_generation != state.metrics.scroll_generation;

        if is_first_paint || state.metrics.is_default() {
            debug!("{} taking first paint metrics", self.guid_locked(state));
            state.paint_throttler.clear_history();
            state.x.cancel_touch();
            state.y.cancel_touch();
            self.cancel_animation_locked(state);
            state.metrics = layer_metrics.clone();
            state.metrics.scroll_offset_updated = false;
            state.last_dispatched_paint_metrics = layer_metrics.clone();
        } else {
            let metrics = &mut state.metrics;
            let bounds_width_changed = (metrics.composition_bounds.size.width -
                layer_metrics.composition_bounds.size.width)
                .abs() >
                COORDINATE_EPSILON;
            if bounds_width_changed ||
                metrics.dev_pixels_per_css_pixel != layer_metrics.dev_pixels_per_css_pixel
            {
                // Content relaid out for a new viewport, so its zoom wins over ours.
                metrics.zoom = layer_metrics.zoom;
                metrics.dev_pixels_per_css_pixel = layer_metrics.dev_pixels_per_css_pixel;
            }
            metrics.composition_bounds = layer_metrics.composition_bounds;
            metrics.scrollable_rect = layer_metrics.scrollable_rect;
            metrics.may_have_touch_listeners = layer_metrics.may_have_touch_listeners;
            metrics.is_root = layer_metrics.is_root;
            metrics.pres_shell_id = layer_metrics.pres_shell_id;

            if scroll_offset_updated {
                debug!(
                    "Content moved the scroll offset from {:?} to {:?}",
                    metrics.scroll_offset, layer_metrics.scroll_offset
                );
                metrics.scroll_offset = layer_metrics.scroll_offset;
                metrics.scroll_generation = layer_metrics.scroll_generation;
                state.last_dispatched_paint_metrics = layer_metrics.clone();
            }
        }

        if scroll_offset_updated {
            if let Some(controller) = self.content_controller() {
                controller.acknowledge_scroll_update(
                    layer_metrics.scroll_id,
                    layer_metrics.scroll_generation,
                );
            }
        }
    }

    /// Advances any running animation to `sample_time` and returns the transform to
    /// composite with. Sampling twice with the same time does not advance anything.
    pub fn sample_content_transform_for_frame(&self, sample_time: Instant) -> SampledTransform {
        let mut deferred = Vec::new();
        let (transform, scroll_offset) = {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            self.update_animation(state, sample_time, &mut deferred);
            (state.current_async_transform(), state.scroll_offset_in_screen())
        };

        let handed_off = !deferred.is_empty();
        for task in deferred {
            match task {
                DeferredTask::HandoffFling(velocity) => self.handle_fling_overscroll(velocity),
            }
        }
        if handed_off {
            self.finish_handed_off_fling();
        }

        SampledTransform {
            transform,
            scroll_offset,
            animating: self.monitor.lock().animation.is_some(),
        }
    }

    fn update_animation(
        &self,
        state: &mut ApzcState,
        sample_time: Instant,
        deferred: &mut Vec<DeferredTask>,
    ) {
        // Frames are sampled in order; a time already sampled advances nothing.
        if state.last_sample_time.is_some_and(|last| sample_time <= last) {
            return;
        }
        let delta = state
            .last_sample_time
            .map_or(Duration::ZERO, |last| sample_time - last);
        state.last_sample_time = Some(sample_time);

        if let Some(metrics) = state.paint_throttler.check_timeout(sample_time) {
            self.dispatch_repaint_request(state, metrics);
        }

        let Some(mut animation) = state.animation.take() else {
            return;
        };
        let running = animation.sample(
            AnimationTarget {
                metrics: &mut state.metrics,
                x: &mut state.x,
                y: &mut state.y,
            },
            delta,
            deferred,
        );

        if running {
            let interval = animation.repaint_interval(&self.context.prefs);
            state.animation = Some(animation);
            if interval.is_some_and(|interval| {
                state.paint_throttler.time_since_last_request(sample_time) > interval
            }) {
                self.request_content_repaint(state);
            }
        } else if !deferred.is_empty() {
            // The state is settled once the handoff has run.
            trace!("{} animation finished at an edge", animation.name());
        } else {
            trace!("{} animation finished", animation.name());
            self.set_state(state, PanZoomState::Nothing);
            self.request_content_repaint(state);
        }
    }

    /// Velocity left over from a fling that hit an edge: give it to an ancestor, or
    /// turn it into overscroll here.
    fn handle_fling_overscroll(&self, velocity: ScreenVector) {
        if let Some(tree_manager) = self.tree_manager() {
            if tree_manager.handoff_fling(self, velocity) {
                return;
            }
        }
        if !self.context.prefs.overscroll_enabled {
            return;
        }

        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        if !matches!(state.state, PanZoomState::Nothing | PanZoomState::Fling) {
            return;
        }
        // Only the axes that hit the edge spring; the others keep their fling velocity.
        let spring_x = velocity.x != 0.0 && state.x.can_scroll(&state.metrics);
        let spring_y = velocity.y != 0.0 && state.y.can_scroll(&state.metrics);
        if !spring_x && !spring_y {
            return;
        }
        if spring_x {
            state.x.set_velocity(velocity.x);
        }
        if spring_y {
            state.y.set_velocity(velocity.y);
        }
        self.start_animation(
            state,
            PanZoomAnimation::Overscroll(OverscrollAnimation::new(
                spring_x || state.x.is_overscrolled(),
                spring_y || state.y.is_overscrolled(),
            )),
            PanZoomState::OverscrollAnimation,
        );
    }

    /// Ends a fling that finished by running into an edge, once its leftover velocity
    /// has been handed off and nothing else picked it up.
    fn finish_handed_off_fling(&self) {
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        if state.state == PanZoomState::Fling && state.animation.is_none() {
            self.set_state(state, PanZoomState::Nothing);
            self.request_content_repaint(state);
        }
    }

    /// Continues a fling handed off by a descendant. Returns false if there is nothing
    /// this controller can scroll in that direction.
    pub(crate) fn take_over_fling(&self, velocity: ScreenVector) -> bool {
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        let take_x = velocity.x != 0.0 && state.x.can_scroll(&state.metrics);
        let take_y = velocity.y != 0.0 && state.y.can_scroll(&state.metrics);
        if !take_x && !take_y {
            return false;
        }
        if take_x {
            state.x.set_velocity(state.x.velocity() + velocity.x);
        }
        if take_y {
            state.y.set_velocity(state.y.velocity() + velocity.y);
        }
        debug!("{} taking over fling {:?}", self.guid_locked(state), velocity);
        self.start_animation(state, PanZoomAnimation::Fling, PanZoomState::Fling);
        self.request_content_repaint(state);
        true
    }

    /// Starts springing back if overscrolled. Returns whether it did.
    pub(crate) fn snap_back_if_overscrolled(&self) -> bool {
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        if !state.is_overscrolled() || state.state == PanZoomState::OverscrollAnimation {
            return false;
        }
        state.zero_velocity();
        self.start_animation(
            state,
            PanZoomAnimation::Overscroll(OverscrollAnimation::snap_back()),
            PanZoomState::OverscrollAnimation,
        );
        true
    }
}

// Input handling.
impl AsyncPanZoomController {
    /// Handles an event already transformed into this controller's screen space.
    pub fn receive_input_event(&self, event: &InputData) -> EventStatus {
        if self.monitor.lock().destroyed {
            return EventStatus::Ignored;
        }
        match event {
            InputData::MultiTouch(touch) => self.receive_touch(touch),
            InputData::PanGesture(pan) => self.handle_pan_gesture(pan),
            InputData::PinchGesture(pinch) => self.handle_pinch(pinch, None),
            InputData::TapGesture(tap) => self.handle_tap(tap, None),
            InputData::ScrollWheel(wheel) => self.handle_scroll_wheel(wheel),
        }
    }

    fn receive_touch(&self, event: &MultiTouchInput) -> EventStatus {
        let mut timeout = None;
        {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            if event.kind == MultiTouchType::Start && state.touch_blocks.needs_new_block() {
                if state.touch_blocks.is_empty() && state.animation.is_some() {
                    self.cancel_animation_locked(state);
                }
                let needs_content_response = state.metrics.may_have_touch_listeners;
                let needs_allowed_behaviors = self.context.prefs.touch_action_enabled;
                let id = state
                    .touch_blocks
                    .start_block(needs_content_response, needs_allowed_behaviors);
                if needs_content_response || needs_allowed_behaviors {
                    timeout = Some(id);
                }
            }
            if !state.touch_blocks.add_event(event.clone()) {
                return EventStatus::Ignored;
            }
        }

        if let Some(id) = timeout {
            self.post_delayed(self.context.prefs.content_response_timeout(), move |apzc| {
                apzc.content_response_timed_out(id)
            });
        }
        self.process_touch_queue()
    }

    /// Handles every queued touch event whose block is ready. Returns the status of the
    /// last one handled, or `WaitingForContent` if events are still held back.
    fn process_touch_queue(&self) -> EventStatus {
        let mut status = EventStatus::Ignored;
        loop {
            let ready = {
                let mut state = self.monitor.lock();
                let ready = state.touch_blocks.next_ready_event();
                if let Some(ready) = &ready {
                    state.touch_behaviors = ready.allowed_behaviors;
                }
                ready
            };
            let Some(ready) = ready else {
                break;
            };
            status = if ready.prevented {
                trace!("Dropping {:?} touch prevented by content", ready.event.kind);
                EventStatus::Ignored
            } else {
                self.handle_touch_event(&ready.event)
            };
        }

        if self.monitor.lock().touch_blocks.has_pending_events() {
            EventStatus::WaitingForContent
        } else {
            status
        }
    }

    fn content_response_timed_out(&self, id: TouchBlockId) {
        if self.monitor.lock().touch_blocks.time_out(id) {
            self.process_touch_queue();
        }
    }

    /// Content's answer to whether it prevented the default action of the oldest touch
    /// block still waiting for one.
    pub fn content_received_touch(&self, prevent_default: bool) {
        {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            match state.touch_blocks.content_received(prevent_default) {
                ContentResponse::Applied => {},
                ContentResponse::Late if prevent_default => {
                    debug!("Content prevented a touch block that already went ahead");
                    state.x.cancel_touch();
                    state.y.cancel_touch();
                    self.cancel_animation_locked(state);
                },
                ContentResponse::Late => {},
                ContentResponse::Unmatched => {
                    warn!("Content response without a touch block waiting for it");
                },
            }
        }
        self.process_touch_queue();
    }

    pub fn set_allowed_touch_behavior(&self, behaviors: TouchBehaviorFlags) {
        if !self.monitor.lock().touch_blocks.set_allowed_behaviors(behaviors) {
            debug!("No touch block took allowed behaviors {:?}", behaviors);
        }
        self.process_touch_queue();
    }

    fn handle_touch_event(&self, event: &MultiTouchInput) -> EventStatus {
        let (output, behaviors, block_ended) = {
            let mut state = self.monitor.lock();
            let output = state.gestures.handle_touch(event);
            let block_ended = matches!(event.kind, MultiTouchType::End | MultiTouchType::Cancel) &&
                state.gestures.touch_count() == 0;
            (output, state.touch_behaviors, block_ended)
        };
        let consumed = output.consumed;
        self.handle_gesture_output(output, behaviors);

        let status = if consumed {
            EventStatus::Consumed
        } else {
            match event.kind {
                MultiTouchType::Start => self.on_touch_start(event),
                MultiTouchType::Move => self.on_touch_move(event),
                MultiTouchType::End => self.on_touch_end(),
                MultiTouchType::Cancel => self.on_touch_cancel(),
            }
        };

        if block_ended {
            let (guid, tapped) = {
                let mut state = self.monitor.lock();
                // Allowed behaviors belong to the block; later input is not bound by them.
                state.touch_behaviors = None;
                let tapped = std::mem::take(&mut state.single_tap_in_block);
                (self.guid_locked(&state), tapped)
            };
            self.notify(guid, ApzStateChange::EndTouch, tapped as i32);
        }
        status
    }

    /// Handles gestures recognized from a touch block whose allowed touch behaviors
    /// were `behaviors`.
    fn handle_gesture_output(
        &self,
        output: GestureOutput,
        behaviors: Option<TouchBehaviorFlags>,
    ) {
        for timeout in output.timeouts {
            let (kind, token) = (timeout.kind, timeout.token);
            self.post_delayed(timeout.delay, move |apzc| {
                apzc.handle_gesture_timeout(kind, token, behaviors)
            });
        }
        for gesture in output.gestures {
            match gesture {
                InputData::TapGesture(tap) => {
                    self.handle_tap(&tap, behaviors);
                },
                InputData::PinchGesture(pinch) => {
                    self.handle_pinch(&pinch, behaviors);
                },
                other => warn!("Unexpected synthesized gesture {:?}", other),
            }
        }
    }

    fn handle_gesture_timeout(
        &self,
        kind: GestureTimeout,
        token: u64,
        behaviors: Option<TouchBehaviorFlags>,
    ) {
        let output = self.monitor.lock().gestures.handle_timeout(kind, token);
        self.handle_gesture_output(output, behaviors);
    }

    fn on_touch_start(&self, event: &MultiTouchInput) -> EventStatus {
        let Some(touch) = event.touches.first() else {
            return EventStatus::Ignored;
        };
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        match state.state {
            PanZoomState::Fling |
            PanZoomState::AnimatingZoom |
            PanZoomState::OverscrollAnimation |
            PanZoomState::WheelScroll => self.cancel_animation_locked(state),
            PanZoomState::Nothing => {},
            other => {
                debug!("Ignoring touch start while {:?}", other);
                return EventStatus::Consumed;
            },
        }

        state.start_touch(touch.point, event.time);
        self.set_state(state, PanZoomState::Touching);
        let can_scroll = state.can_scroll();
        self.notify(
            self.guid_locked(state),
            ApzStateChange::StartTouch,
            can_scroll as i32,
        );
        EventStatus::Consumed
    }

    fn on_touch_move(&self, event: &MultiTouchInput) -> EventStatus {
        let Some(touch) = event.touches.first() else {
            return EventStatus::Ignored;
        };
        let point = touch.point;
        {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            match state.state {
                PanZoomState::Touching => {
                    let distance = state
                        .x
                        .pan_distance_to(point.x)
                        .hypot(state.y.pan_distance_to(point.y));
                    if distance < self.context.prefs.touch_start_tolerance {
                        return EventStatus::Ignored;
                    }
                    self.start_panning(state, point);
                    if !state.state.is_panning() {
                        return EventStatus::Ignored;
                    }
                    self.notify(self.guid_locked(state), ApzStateChange::StartPanning, 0);
                },
                current if current.is_panning() => {},
                _ => return EventStatus::Ignored,
            }
        }
        self.track_touch(point, event.time);
        EventStatus::Consumed
    }

    fn start_panning(&self, state: &mut ApzcState, point: ScreenPoint) {
        let dx = state.x.pan_distance_to(point.x);
        let dy = state.y.pan_distance_to(point.y);
        let angle = dy.atan2(dx);
        match state.touch_behaviors {
            Some(behaviors) => self.start_panning_with_touch_action(state, angle, behaviors),
            None => self.start_panning_locked_by_angle(state, angle),
        }
    }

    /// `angle` is between the gesture and the horizontal, in `[0, π/2]`.
    fn start_panning_locked_by_angle(&self, state: &mut ApzcState, angle: f32) {
        let lock_angle = self.context.prefs.axis_lock_angle;
        if !state.x.can_scroll(&state.metrics) || !state.y.can_scroll(&state.metrics) {
            self.set_state(state, PanZoomState::Panning);
        } else if angle < lock_angle {
            state.y.set_axis_locked(true);
            self.set_state(state, PanZoomState::PanningLockedX);
        } else if angle > FRAC_PI_2 - lock_angle {
            state.x.set_axis_locked(true);
            self.set_state(state, PanZoomState::PanningLockedY);
        } else {
            self.set_state(state, PanZoomState::Panning);
        }
    }

    fn start_panning_with_touch_action(
        &self,
        state: &mut ApzcState,
        angle: f32,
        behaviors: TouchBehaviorFlags,
    ) {
        let direct_angle = self.context.prefs.allowed_direct_pan_angle;
        let horizontal = behaviors.contains(TouchBehaviorFlags::HORIZONTAL_PAN);
        let vertical = behaviors.contains(TouchBehaviorFlags::VERTICAL_PAN);
        if horizontal && vertical {
            self.start_panning_locked_by_angle(state, angle);
        } else if horizontal && angle < direct_angle {
            state.y.set_axis_locked(true);
            self.set_state(state, PanZoomState::PanningLockedX);
        } else if vertical && angle > FRAC_PI_2 - direct_angle {
            state.x.set_axis_locked(true);
            self.set_state(state, PanZoomState::PanningLockedY);
        } else {
            trace!("Touch behaviors {:?} do not allow this pan", behaviors);
            self.set_state(state, PanZoomState::Nothing);
        }
    }

    fn track_touch(&self, point: ScreenPoint, time: Instant) {
        let previous = {
            let mut state = self.monitor.lock();
            let previous = ScreenPoint::new(state.x.pos(), state.y.pos());
            state.x.update_with_touch_at_device_point(point.x, time);
            state.y.update_with_touch_at_device_point(point.y, time);
            previous
        };
        self.call_dispatch_scroll(previous, point, 0);
    }

    fn call_dispatch_scroll(&self, start: ScreenPoint, end: ScreenPoint, index: usize) -> bool {
        match self.tree_manager() {
            Some(tree_manager) => tree_manager.dispatch_scroll(self, start, end, index),
            None => index == 0 && self.attempt_scroll(start, end, index),
        }
    }

    /// Scrolls by the displacement from `start` to `end`, which are in this controller's
    /// screen space. Whatever cannot be scrolled goes to the next controller of the
    /// handoff chain, and is finally turned into overscroll. Returns false only if
    /// nothing took the displacement.
    pub(crate) fn attempt_scroll(
        &self,
        start: ScreenPoint,
        end: ScreenPoint,
        index: usize,
    ) -> bool {
        let excess = {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            let zoom = state.metrics.zoom.get();
            let displacement = (start - end) / zoom;
            let (allowed_x, excess_x) = state.x.adjust_displacement(&state.metrics, displacement.x);
            let (allowed_y, excess_y) = state.y.adjust_displacement(&state.metrics, displacement.y);
            if allowed_x != 0.0 || allowed_y != 0.0 {
                state.metrics.scroll_by(CSSVector::new(allowed_x, allowed_y));
                let since_last = state
                    .paint_throttler
                    .time_since_last_request(self.context.now());
                if since_last > self.context.prefs.pan_repaint_interval() {
                    self.request_content_repaint(state);
                }
            }
            ScreenVector::new(excess_x * zoom, excess_y * zoom)
        };

        if excess.x.abs() <= COORDINATE_EPSILON && excess.y.abs() <= COORDINATE_EPSILON {
            return true;
        }
        // Pretend the finger moved only by the excess, and see if anyone wants it.
        if self.call_dispatch_scroll(end + excess, end, index + 1) {
            return true;
        }
        self.overscroll_by(excess)
    }

    /// Turns a screen displacement into overscroll on the axes that can scroll.
    pub(crate) fn overscroll_by(&self, overscroll: ScreenVector) -> bool {
        if !self.context.prefs.overscroll_enabled {
            return false;
        }
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        let zoom = state.metrics.zoom.get();
        let can_x = state.x.can_scroll(&state.metrics);
        let can_y = state.y.can_scroll(&state.metrics);
        if can_x {
            state.x.overscroll_by(overscroll.x / zoom);
        }
        if can_y {
            state.y.overscroll_by(overscroll.y / zoom);
        }
        can_x || can_y
    }

    fn on_touch_end(&self) -> EventStatus {
        {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            match state.state {
                PanZoomState::Touching => {
                    state.zero_velocity();
                    self.set_state(state, PanZoomState::Nothing);
                    return EventStatus::Ignored;
                },
                current if current.is_panning() => {
                    state.x.end_touch();
                    state.y.end_touch();
                    let velocity = state.velocity();
                    if state.is_overscrolled() {
                        state.zero_velocity();
                        self.start_animation(
                            state,
                            PanZoomAnimation::Overscroll(OverscrollAnimation::snap_back()),
                            PanZoomState::OverscrollAnimation,
                        );
                    } else if velocity.length() >= self.context.prefs.fling_min_velocity_threshold {
                        debug!("Starting fling at {:?}", velocity);
                        self.start_animation(state, PanZoomAnimation::Fling, PanZoomState::Fling);
                    } else {
                        state.zero_velocity();
                        self.set_state(state, PanZoomState::Nothing);
                    }
                    self.request_content_repaint(state);
                },
                PanZoomState::Pinching => {
                    self.set_state(state, PanZoomState::Nothing);
                    return EventStatus::Ignored;
                },
                _ => return EventStatus::Ignored,
            }
        }
        self.snap_back_handoff_chain();
        EventStatus::Consumed
    }

    fn on_touch_cancel(&self) -> EventStatus {
        {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            state.x.cancel_touch();
            state.y.cancel_touch();
            if state.state.is_panning() ||
                matches!(state.state, PanZoomState::Touching | PanZoomState::Pinching)
            {
                self.set_state(state, PanZoomState::Nothing);
            }
        }
        self.snap_back_handoff_chain();
        EventStatus::Consumed
    }

    /// Lets every controller the gesture overscrolled spring back.
    fn snap_back_handoff_chain(&self) {
        match self.tree_manager() {
            Some(tree_manager) => tree_manager.snap_back_overscrolled(self),
            None => {
                self.snap_back_if_overscrolled();
            },
        }
    }

    fn handle_pan_gesture(&self, event: &PanGestureInput) -> EventStatus {
        match event.kind {
            PanGestureType::MayStart => {
                let mut guard = self.monitor.lock();
                let state = &mut *guard;
                if state.animation.is_some() {
                    self.cancel_animation_locked(state);
                }
                state.start_touch(event.pan_start_point, event.time);
                EventStatus::Consumed
            },
            PanGestureType::Cancelled => {
                let mut guard = self.monitor.lock();
                let state = &mut *guard;
                state.x.cancel_touch();
                state.y.cancel_touch();
                if state.state.is_panning() {
                    self.set_state(state, PanZoomState::Nothing);
                }
                EventStatus::Consumed
            },
            PanGestureType::Start | PanGestureType::MomentumStart => {
                {
                    let mut guard = self.monitor.lock();
                    let state = &mut *guard;
                    if state.animation.is_some() {
                        self.cancel_animation_locked(state);
                    }
                    state.start_touch(event.pan_start_point, event.time);
                    let angle = event.displacement.y.abs().atan2(event.displacement.x.abs());
                    self.start_panning_locked_by_angle(state, angle);
                }
                self.on_pan(event)
            },
            PanGestureType::Pan | PanGestureType::MomentumPan => self.on_pan(event),
            PanGestureType::End | PanGestureType::MomentumEnd => self.on_pan_end(),
        }
    }

    fn on_pan(&self, event: &PanGestureInput) -> EventStatus {
        {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            if !state.state.is_panning() {
                if state.animation.is_some() {
                    self.cancel_animation_locked(state);
                }
                state.start_touch(event.pan_start_point, event.time);
                self.set_state(state, PanZoomState::Panning);
            }
            // The axes track the pan like a finger dragging the content.
            let x = state.x.pos() + event.displacement.x;
            let y = state.y.pos() + event.displacement.y;
            state.x.update_with_touch_at_device_point(x, event.time);
            state.y.update_with_touch_at_device_point(y, event.time);
        }
        let start = event.pan_start_point;
        self.call_dispatch_scroll(start, start + event.displacement, 0);
        EventStatus::Consumed
    }

    fn on_pan_end(&self) -> EventStatus {
        {
            let mut guard = self.monitor.lock();
            let state = &mut *guard;
            state.x.end_touch();
            state.y.end_touch();
            state.zero_velocity();
            if state.state.is_panning() {
                self.set_state(state, PanZoomState::Nothing);
            }
            self.request_content_repaint(state);
        }
        self.snap_back_handoff_chain();
        EventStatus::Consumed
    }

    /// `behaviors` are the allowed touch behaviors of the touch block the pinch was
    /// recognized from, if it came from one.
    fn handle_pinch(
        &self,
        event: &PinchGestureInput,
        behaviors: Option<TouchBehaviorFlags>,
    ) -> EventStatus {
        if !allows(behaviors, TouchBehaviorFlags::PINCH_ZOOM) {
            trace!("Pinch zoom is not an allowed touch behavior");
            return EventStatus::Ignored;
        }
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        match event.kind {
            PinchGestureType::Start => self.on_scale_begin(state, event),
            PinchGestureType::Scale => self.on_scale(state, event),
            PinchGestureType::End => {
                if state.state == PanZoomState::Pinching {
                    self.set_state(state, PanZoomState::Nothing);
                    self.request_content_repaint(state);
                }
                EventStatus::Consumed
            },
        }
    }

    fn relative_to_composition(state: &ApzcState, point: ScreenPoint) -> ScreenPoint {
        let origin = state.metrics.composition_bounds.origin;
        ScreenPoint::new(point.x - origin.x, point.y - origin.y)
    }

    fn on_scale_begin(&self, state: &mut ApzcState, event: &PinchGestureInput) -> EventStatus {
        if !state.zoom_constraints.allow_zoom {
            return EventStatus::Consumed;
        }
        if state.animation.is_some() {
            self.cancel_animation_locked(state);
        }
        state.zero_velocity();
        state.last_zoom_focus = Self::relative_to_composition(state, event.focus_point);
        self.set_state(state, PanZoomState::Pinching);
        EventStatus::Consumed
    }

    fn on_scale(&self, state: &mut ApzcState, event: &PinchGestureInput) -> EventStatus {
        if state.state != PanZoomState::Pinching {
            return EventStatus::Consumed;
        }
        if event.previous_span.abs() <= COORDINATE_EPSILON ||
            event.current_span.abs() <= COORDINATE_EPSILON
        {
            return EventStatus::Consumed;
        }

        let ratio = event.current_span / event.previous_span;
        let zoom = state.metrics.zoom.get();
        let focus = Self::relative_to_composition(state, event.focus_point);
        let css_focus = CSSPoint::new(focus.x / zoom, focus.y / zoom);

        // Moving the focus pans, but a pinch never overscrolls.
        let focus_change = CSSVector::new(
            (state.last_zoom_focus.x - focus.x) / zoom,
            (state.last_zoom_focus.y - focus.y) / zoom,
        );
        let panned = state.metrics.scroll_offset + focus_change;
        state.metrics.scroll_offset = state.metrics.clamp_scroll_offset(panned);

        let (min_zoom, max_zoom) = state.zoom_bounds();
        let new_zoom = (zoom * ratio).clamp(min_zoom, max_zoom);
        if new_zoom != zoom {
            // Keep the CSS point under the focus where it is on screen.
            let scale = new_zoom / zoom;
            let offset = state.metrics.scroll_offset;
            state.metrics.zoom = Scale::new(new_zoom);
            state.metrics.scroll_offset = state.metrics.clamp_scroll_offset(CSSPoint::new(
                offset.x + css_focus.x - css_focus.x / scale,
                offset.y + css_focus.y - css_focus.y / scale,
            ));
        }
        state.last_zoom_focus = focus;
        EventStatus::Consumed
    }

    fn handle_tap(
        &self,
        event: &TapGestureInput,
        behaviors: Option<TouchBehaviorFlags>,
    ) -> EventStatus {
        let Some(controller) = self.content_controller() else {
            return EventStatus::Ignored;
        };
        let (guid, double_tap_allowed) = {
            let state = self.monitor.lock();
            let allowed = state.zoom_constraints.allow_double_tap_zoom &&
                allows(behaviors, TouchBehaviorFlags::DOUBLE_TAP_ZOOM);
            (self.guid_locked(&state), allowed)
        };
        let point = self.convert_to_content(event.point);
        let modifiers = event.modifiers;

        match event.kind {
            TapGestureType::LongTap => {
                controller.handle_long_tap(point, modifiers, guid);
                EventStatus::Consumed
            },
            TapGestureType::LongTapUp => {
                controller.handle_long_tap_up(point, modifiers, guid);
                EventStatus::Consumed
            },
            // Without double tap zooming there is no point waiting to confirm a tap.
            TapGestureType::SingleTapUp if !double_tap_allowed => {
                self.generate_single_tap(controller, point, modifiers, guid)
            },
            TapGestureType::SingleTapConfirmed if double_tap_allowed => {
                self.generate_single_tap(controller, point, modifiers, guid)
            },
            TapGestureType::SingleTapUp | TapGestureType::SingleTapConfirmed => {
                EventStatus::Ignored
            },
            TapGestureType::DoubleTap => {
                if double_tap_allowed {
                    controller.handle_double_tap(point, modifiers, guid);
                }
                EventStatus::Consumed
            },
        }
    }

    fn generate_single_tap(
        &self,
        controller: Arc<dyn ContentController>,
        point: CSSPoint,
        modifiers: Modifiers,
        guid: ScrollableLayerGuid,
    ) -> EventStatus {
        self.monitor.lock().single_tap_in_block = true;
        // Goes through the task queue so that the end of the touch block is seen first.
        let target = controller.clone();
        controller.post_delayed_task(
            Box::new(move || target.handle_single_tap(point, modifiers, guid)),
            Duration::ZERO,
        );
        EventStatus::Consumed
    }

    /// Converts a point in this controller's screen space to CSS pixels of its content.
    fn convert_to_content(&self, point: ScreenPoint) -> CSSPoint {
        let point = match self.tree_manager() {
            Some(tree_manager) => {
                let (_, to_content) = tree_manager.get_input_transforms(self);
                transform_point(&to_content, point)
            },
            None => point,
        };
        let state = self.monitor.lock();
        let relative = Self::relative_to_composition(&state, point);
        let zoom = state.metrics.zoom.get();
        CSSPoint::new(relative.x / zoom, relative.y / zoom)
    }

    fn handle_scroll_wheel(&self, event: &ScrollWheelInput) -> EventStatus {
        let prefs = &self.context.prefs;
        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        let zoom = state.metrics.zoom.get();
        let delta = match event.delta_type {
            ScrollDeltaType::Line => CSSVector::new(
                event.delta_x * prefs.line_scroll_amount / zoom,
                event.delta_y * prefs.line_scroll_amount / zoom,
            ),
            ScrollDeltaType::Page => {
                let page: CSSSize = state.metrics.composited_size();
                CSSVector::new(event.delta_x * page.width, event.delta_y * page.height)
            },
            ScrollDeltaType::Pixel => CSSVector::new(event.delta_x / zoom, event.delta_y / zoom),
        };

        let scroll_x = delta.x != 0.0 && state.x.can_scroll(&state.metrics);
        let scroll_y = delta.y != 0.0 && state.y.can_scroll(&state.metrics);
        if !scroll_x && !scroll_y {
            return EventStatus::Ignored;
        }

        if event.scroll_mode == ScrollMode::Instant || !prefs.smooth_scroll_enabled {
            if state.animation.is_some() {
                self.cancel_animation_locked(state);
            }
            let destination = state.metrics.scroll_offset + delta;
            state.metrics.scroll_offset = state.metrics.clamp_scroll_offset(destination);
            self.request_content_repaint(state);
            return EventStatus::Consumed;
        }

        if let Some(PanZoomAnimation::WheelScroll(animation)) = &mut state.animation {
            let destination = state
                .metrics
                .clamp_scroll_offset(animation.destination() + delta);
            animation.retarget(state.metrics.scroll_offset, destination);
            return EventStatus::Consumed;
        }

        if state.animation.is_some() {
            self.cancel_animation_locked(state);
        }
        let start = state.metrics.scroll_offset;
        let destination = state.metrics.clamp_scroll_offset(start + delta);
        self.start_animation(
            state,
            PanZoomAnimation::WheelScroll(WheelScrollAnimation::new(
                start,
                destination,
                prefs.wheel_scroll_duration(),
            )),
            PanZoomState::WheelScroll,
        );
        EventStatus::Consumed
    }

    /// Animates the zoom and scroll offset so that `rect` fills the composition bounds
    /// as well as the zoom constraints allow. An empty rect zooms out as far as possible.
    pub fn zoom_to_rect(&self, rect: CSSRect) {
        let finite = [rect.origin.x, rect.origin.y, rect.size.width, rect.size.height]
            .iter()
            .all(|value| value.is_finite());
        if !finite {
            warn!("Ignoring zoom to non-finite rect {:?}", rect);
            return;
        }

        let mut guard = self.monitor.lock();
        let state = &mut *guard;
        let bounds = state.metrics.composition_bounds.size;
        let page = state.metrics.scrollable_rect;
        let current_zoom = state.metrics.zoom.get();
        let (min_zoom, max_zoom) = state.zoom_bounds();

        let fit = |rect: &CSSRect| {
            (bounds.width / rect.size.width).min(bounds.height / rect.size.height)
        };
        let mut rect = rect.intersection(&page).unwrap_or_else(CSSRect::zero);
        let mut target_zoom = if rect.is_empty() { 0.0 } else { fit(&rect) };

        // Zooming in further at the maximum, or out further at the minimum, toggles
        // back to showing the whole page width.
        if rect.is_empty() ||
            (current_zoom == max_zoom && target_zoom >= max_zoom) ||
            (current_zoom == min_zoom && target_zoom <= min_zoom)
        {
            let composited = state.metrics.composited_size();
            let new_height = if composited.width > 0.0 {
                page.size.width * (composited.height / composited.width)
            } else {
                page.size.height
            };
            let dh = composited.height - new_height;
            let whole_width = CSSRect::new(
                Point2D::new(0.0, state.metrics.scroll_offset.y + dh / 2.0),
                Size2D::new(page.size.width, new_height),
            );
            rect = whole_width.intersection(&page).unwrap_or(page);
            target_zoom = if rect.is_empty() { min_zoom } else { fit(&rect) };
        }
        let target_zoom = target_zoom.clamp(min_zoom, max_zoom);

        let mut end_metrics = state.metrics.clone();
        end_metrics.zoom = Scale::new(target_zoom);
        let size_after_zoom = end_metrics.composited_size();
        if rect.origin.y + size_after_zoom.height > page.size.height {
            rect.origin.y = (page.size.height - size_after_zoom.height).max(0.0);
        }
        if rect.origin.x + size_after_zoom.width > page.size.width {
            rect.origin.x = (page.size.width - size_after_zoom.width).max(0.0);
        }
        end_metrics.scroll_offset = rect.origin;

        debug!(
            "Zooming to {:?} at zoom {} (from {})",
            rect.origin, target_zoom, current_zoom
        );
        let animation = ZoomAnimation::new(
            state.metrics.scroll_offset,
            state.metrics.zoom,
            end_metrics.scroll_offset,
            end_metrics.zoom,
            self.context.prefs.zoom_animation_duration(),
        );
        if state.animation.is_some() {
            self.cancel_animation_locked(state);
        }
        self.start_animation(
            state,
            PanZoomAnimation::Zoom(animation),
            PanZoomState::AnimatingZoom,
        );
        // Ask for the end state right away so it is painted before the animation ends.
        self.request_content_repaint_for(state, end_metrics, ScreenVector::zero());
    }
}

/// The area content should paint around the viewport: larger than what is visible,
/// and pushed in the direction of travel. Returned relative to the scroll offset.
fn calculate_pending_display_port(
    prefs: &ApzPrefs,
    metrics: &FrameMetrics,
    velocity: ScreenVector,
    paint_duration: Duration,
) -> CSSRect {
    let zoom = metrics.zoom.get();
    if zoom <= 0.0 {
        return CSSRect::zero();
    }
    let velocity = CSSVector::new(velocity.x / zoom, velocity.y / zoom);
    let composited = metrics.composited_size();

    let x_multiplier = if velocity.x.abs() < prefs.min_skate_speed {
        prefs.x_stationary_size_multiplier
    } else {
        prefs.x_skate_size_multiplier
    };
    let y_multiplier = if velocity.y.abs() < prefs.min_skate_speed {
        prefs.y_stationary_size_multiplier
    } else {
        prefs.y_skate_size_multiplier
    };
    let size = CSSSize::new(composited.width * x_multiplier, composited.height * y_multiplier);

    let estimated_paint_ms = if prefs.use_paint_duration {
        paint_duration.as_secs_f32() * 1000.0
    } else {
        DEFAULT_PAINT_DURATION_MS
    };
    let skew = velocity * estimated_paint_ms * prefs.velocity_bias;
    let centering = CSSVector::new(
        (composited.width - size.width) / 2.0,
        (composited.height - size.height) / 2.0,
    );
    let display_port = CSSRect::new(metrics.scroll_offset + skew + centering, size);

    // Nothing outside the page is worth painting.
    let page = CSSRect::new(
        metrics.scrollable_rect.origin,
        metrics.scrollable_rect.size.max(composited),
    );
    force_inside(display_port, page).translate(-metrics.scroll_offset.to_vector())
}

/// Moves and shrinks `rect` as little as possible to fit it inside `bounds`.
fn force_inside(rect: CSSRect, bounds: CSSRect) -> CSSRect {
    let width = rect.size.width.min(bounds.size.width);
    let height = rect.size.height.min(bounds.size.height);
    let x = rect.origin.x.max(bounds.origin.x).min(bounds.max_x() - width);
    let y = rect.origin.y.max(bounds.origin.y).min(bounds.max_y() - height);
    CSSRect::new(Point2D::new(x, y), Size2D::new(width, height))
}

fn fuzzy_equal_points(a: CSSPoint, b: CSSPoint) -> bool {
    (a.x - b.x).abs() <= COORDINATE_EPSILON && (a.y - b.y).abs() <= COORDINATE_EPSILON
}

fn fuzzy_equal_rects(a: CSSRect, b: CSSRect) -> bool {
    fuzzy_equal_points(a.origin, b.origin) &&
        (a.size.width - b.size.width).abs() <= COORDINATE_EPSILON &&
        (a.size.height - b.size.height).abs() <= COORDINATE_EPSILON
}
