/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! The interface to the `apz` crate.
//!
//! These are the types that cross the boundary between the asynchronous pan/zoom
//! engine, which runs on the compositor thread, and its collaborators: the platform
//! input layer that produces [`InputData`], the compositor that hands over layer tree
//! snapshots, and content, which is reached through a [`ContentController`].

pub mod frame_metrics;
pub mod input;
pub mod layers;

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use euclid::{Point2D, Rect, Scale, Size2D, Vector2D};
use keyboard_types::Modifiers;
use serde::{Deserialize, Serialize};

pub use crate::frame_metrics::{FrameMetrics, ViewTransform, ZoomConstraints};
pub use crate::input::{
    InputData, MultiTouchInput, MultiTouchType, PanGestureInput, PanGestureType,
    PinchGestureInput, PinchGestureType, ScrollDeltaType, ScrollMode, ScrollWheelInput,
    SingleTouchData, TapGestureInput, TapGestureType, TouchId, transform_point,
    transform_vector,
};
pub use crate::layers::LayerNode;

/// One CSS "px" in the coordinate system of the page content.
#[derive(Clone, Copy, Debug)]
pub enum CSSPixel {}

/// Pixels of a painted layer, as rasterized by content at the zoom it last painted at.
#[derive(Clone, Copy, Debug)]
pub enum LayerPixel {}

/// Pixels in the coordinate space of a layer's parent, used for composition bounds.
#[derive(Clone, Copy, Debug)]
pub enum ParentLayerPixel {}

/// Pixels on the screen, after all transforms have been applied.
#[derive(Clone, Copy, Debug)]
pub enum ScreenPixel {}

pub type CSSPoint = Point2D<f32, CSSPixel>;
pub type CSSVector = Vector2D<f32, CSSPixel>;
pub type CSSSize = Size2D<f32, CSSPixel>;
pub type CSSRect = Rect<f32, CSSPixel>;
pub type LayerRect = Rect<f32, LayerPixel>;
pub type ParentLayerRect = Rect<f32, ParentLayerPixel>;
pub type ScreenPoint = Point2D<f32, ScreenPixel>;
pub type ScreenVector = Vector2D<f32, ScreenPixel>;
pub type CSSToScreenScale = Scale<f32, CSSPixel, ScreenPixel>;

/// Identifies the layer tree (and therefore the content process) a layer belongs to.
pub type LayersId = u64;

/// Identifies a scroll frame within a presentation shell.
pub type ViewId = u64;

/// A scroll id that does not belong to any scrollable frame.
pub const NULL_SCROLL_ID: ViewId = 0;

/// A value triple that uniquely identifies a scrollable frame across process boundaries.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ScrollableLayerGuid {
    pub layers_id: LayersId,
    pub pres_shell_id: u32,
    pub scroll_id: ViewId,
}

impl ScrollableLayerGuid {
    pub fn new(layers_id: LayersId, pres_shell_id: u32, scroll_id: ViewId) -> Self {
        Self {
            layers_id,
            pres_shell_id,
            scroll_id,
        }
    }

    pub fn from_metrics(layers_id: LayersId, metrics: &FrameMetrics) -> Self {
        Self::new(layers_id, metrics.pres_shell_id, metrics.scroll_id)
    }
}

impl fmt::Display for ScrollableLayerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.layers_id, self.pres_shell_id, self.scroll_id
        )
    }
}

bitflags! {
    /// The gestures that content's `touch-action` allows for a touch block.
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub struct TouchBehaviorFlags: u8 {
        const HORIZONTAL_PAN = 1 << 0;
        const VERTICAL_PAN = 1 << 1;
        const PINCH_ZOOM = 1 << 2;
        const DOUBLE_TAP_ZOOM = 1 << 3;
    }
}

impl TouchBehaviorFlags {
    pub const NONE: Self = Self::empty();
}

/// What async pan/zoom did with an input event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventStatus {
    /// The event was not used. Content should handle it as usual.
    Ignored,
    /// The event was used for panning, zooming or gesture detection. Content must not
    /// perform any default action for it.
    Consumed,
    /// The event was queued until content says whether it prevents the default action
    /// for the input block. Content should dispatch it to script.
    WaitingForContent,
}

/// Lifecycle notifications sent to content about what the controller is doing.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ApzStateChange {
    /// The controller started transforming content (panning, flinging, zooming).
    TransformBegin,
    /// The controller went back to a resting state.
    TransformEnd,
    /// A touch block started. The argument is 1 if the target can scroll.
    StartTouch,
    /// A touch block turned into a pan.
    StartPanning,
    /// A touch block ended. The argument is 1 if a single tap was delivered.
    EndTouch,
}

/// A task handed to [`ContentController::post_delayed_task`] or
/// [`ContentController::dispatch_to_repaint_thread`].
pub type ApzTask = Box<dyn FnOnce() + Send>;

/// The capability through which async pan/zoom talks to content.
///
/// Every method is a one-way notification. Implementations must not call back into
/// the controller synchronously from any of these methods, and must not run tasks
/// passed to [`Self::post_delayed_task`] before returning.
pub trait ContentController: Send + Sync {
    /// Asks content to repaint with the given metrics, including the display port.
    fn request_content_repaint(&self, metrics: FrameMetrics);

    /// Acknowledges a content-initiated scroll offset update.
    fn acknowledge_scroll_update(&self, _scroll_id: ViewId, _scroll_generation: u32) {}

    fn handle_single_tap(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid);

    fn handle_double_tap(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid);

    fn handle_long_tap(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid);

    fn handle_long_tap_up(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid);

    fn notify_apz_state_change(
        &self,
        _guid: ScrollableLayerGuid,
        _change: ApzStateChange,
        _arg: i32,
    ) {
    }

    /// Runs `task` on the controller thread after `delay`.
    fn post_delayed_task(&self, task: ApzTask, delay: Duration);

    fn is_repaint_thread(&self) -> bool {
        true
    }

    fn dispatch_to_repaint_thread(&self, task: ApzTask) {
        self.post_delayed_task(task, Duration::ZERO);
    }
}
