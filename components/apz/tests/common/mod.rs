/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use apz::{ApzContext, ApzPrefs, FrameClock, ManualFrameClock};
use apz_traits::{
    ApzStateChange, ApzTask, CSSPoint, CSSRect, ContentController, FrameMetrics, InputData,
    LayerRect, MultiTouchInput, MultiTouchType, ParentLayerRect, ScreenPoint,
    ScrollableLayerGuid, ViewId,
};
use euclid::{Point2D, Size2D};
use keyboard_types::Modifiers;
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tap {
    Single(CSSPoint),
    Double(CSSPoint),
    Long(CSSPoint),
    LongUp(CSSPoint),
}

/// Records everything the controllers tell content. Delayed tasks only run when a test
/// calls [`MockContentController::run_delayed_tasks`].
pub struct MockContentController {
    clock: Arc<ManualFrameClock>,
    pub repaints: Mutex<Vec<FrameMetrics>>,
    pub taps: Mutex<Vec<Tap>>,
    pub state_changes: Mutex<Vec<(ScrollableLayerGuid, ApzStateChange, i32)>>,
    pub scroll_acks: Mutex<Vec<(ViewId, u32)>>,
    delayed_tasks: Mutex<Vec<(Instant, ApzTask)>>,
}

impl MockContentController {
    pub fn new(clock: Arc<ManualFrameClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            repaints: Mutex::new(Vec::new()),
            taps: Mutex::new(Vec::new()),
            state_changes: Mutex::new(Vec::new()),
            scroll_acks: Mutex::new(Vec::new()),
            delayed_tasks: Mutex::new(Vec::new()),
        })
    }

    /// Runs the tasks due at `now`, including any they post that are also due.
    pub fn run_delayed_tasks(&self, now: Instant) -> usize {
        let mut ran = 0;
        loop {
            let due: Vec<_> = {
                let mut tasks = self.delayed_tasks.lock();
                let (due, pending) = tasks.drain(..).partition(|(deadline, _)| *deadline <= now);
                *tasks = pending;
                due
            };
            if due.is_empty() {
                return ran;
            }
            for (_, task) in due {
                task();
                ran += 1;
            }
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.delayed_tasks.lock().len()
    }

    pub fn changes(&self) -> Vec<ApzStateChange> {
        self.state_changes
            .lock()
            .iter()
            .map(|(_, change, _)| *change)
            .collect()
    }
}

impl ContentController for MockContentController {
    fn request_content_repaint(&self, metrics: FrameMetrics) {
        self.repaints.lock().push(metrics);
    }

    fn acknowledge_scroll_update(&self, scroll_id: ViewId, scroll_generation: u32) {
        self.scroll_acks.lock().push((scroll_id, scroll_generation));
    }

    fn handle_single_tap(&self, point: CSSPoint, _: Modifiers, _: ScrollableLayerGuid) {
        self.taps.lock().push(Tap::Single(point));
    }

    fn handle_double_tap(&self, point: CSSPoint, _: Modifiers, _: ScrollableLayerGuid) {
        self.taps.lock().push(Tap::Double(point));
    }

    fn handle_long_tap(&self, point: CSSPoint, _: Modifiers, _: ScrollableLayerGuid) {
        self.taps.lock().push(Tap::Long(point));
    }

    fn handle_long_tap_up(&self, point: CSSPoint, _: Modifiers, _: ScrollableLayerGuid) {
        self.taps.lock().push(Tap::LongUp(point));
    }

    fn notify_apz_state_change(&self, guid: ScrollableLayerGuid, change: ApzStateChange, arg: i32) {
        self.state_changes.lock().push((guid, change, arg));
    }

    fn post_delayed_task(&self, task: ApzTask, delay: Duration) {
        let deadline = self.clock.now() + delay;
        self.delayed_tasks.lock().push((deadline, task));
    }
}

pub struct Harness {
    pub start: Instant,
    pub clock: Arc<ManualFrameClock>,
    pub context: ApzContext,
    pub content: Arc<MockContentController>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_prefs(ApzPrefs::default())
    }

    pub fn with_prefs(prefs: ApzPrefs) -> Self {
        let start = Instant::now();
        let clock = Arc::new(ManualFrameClock::new(start));
        let context = ApzContext::new(prefs, clock.clone());
        let content = MockContentController::new(clock.clone());
        Self {
            start,
            clock,
            context,
            content,
        }
    }

    pub fn at(&self, ms: u64) -> Instant {
        self.start + Duration::from_millis(ms)
    }

    /// Moves the clock to `ms` and runs whatever became due.
    pub fn advance_to(&self, ms: u64) -> usize {
        let now = self.at(ms);
        self.clock.set(now);
        self.content.run_delayed_tasks(now)
    }

    pub fn content_controller(&self) -> Arc<dyn ContentController> {
        self.content.clone()
    }
}

pub fn metrics(scroll_id: ViewId, composition: (f32, f32), scrollable: (f32, f32)) -> FrameMetrics {
    FrameMetrics {
        composition_bounds: ParentLayerRect::new(
            Point2D::origin(),
            Size2D::new(composition.0, composition.1),
        ),
        scrollable_rect: CSSRect::new(Point2D::origin(), Size2D::new(scrollable.0, scrollable.1)),
        scroll_id,
        ..Default::default()
    }
}

pub fn layer_rect(x: f32, y: f32, width: f32, height: f32) -> LayerRect {
    LayerRect::new(Point2D::new(x, y), Size2D::new(width, height))
}

pub fn point(x: f32, y: f32) -> ScreenPoint {
    ScreenPoint::new(x, y)
}

pub fn touch(kind: MultiTouchType, time: Instant, at: ScreenPoint) -> InputData {
    InputData::MultiTouch(MultiTouchInput::new(kind, time, Modifiers::empty()).with_touch(0, at))
}
