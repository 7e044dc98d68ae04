/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The input events async pan/zoom consumes. Platform code converts native events
//! into these before handing them to the tree manager.

use std::time::Instant;

use euclid::default::Transform3D;
use euclid::{Point2D, Vector2D};
use keyboard_types::Modifiers;
use log::warn;
use smallvec::SmallVec;

use crate::{ScreenPoint, ScreenVector};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TouchId(pub i32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SingleTouchData {
    pub id: TouchId,
    pub point: ScreenPoint,
}

impl SingleTouchData {
    pub fn new(id: i32, point: ScreenPoint) -> Self {
        Self {
            id: TouchId(id),
            point,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MultiTouchType {
    Start,
    Move,
    End,
    Cancel,
}

/// A touch event. `Start` and `End` list only the touches that changed; `Move` lists
/// every touch that is currently down.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiTouchInput {
    pub kind: MultiTouchType,
    pub touches: SmallVec<[SingleTouchData; 2]>,
    pub time: Instant,
    pub modifiers: Modifiers,
}

impl MultiTouchInput {
    pub fn new(kind: MultiTouchType, time: Instant, modifiers: Modifiers) -> Self {
        Self {
            kind,
            touches: SmallVec::new(),
            time,
            modifiers,
        }
    }

    pub fn with_touch(mut self, id: i32, point: ScreenPoint) -> Self {
        self.touches.push(SingleTouchData::new(id, point));
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PanGestureType {
    /// A pan might start. Animations are stopped but nothing moves yet.
    MayStart,
    /// The pan announced by `MayStart` will not happen.
    Cancelled,
    Start,
    Pan,
    End,
    MomentumStart,
    MomentumPan,
    MomentumEnd,
}

/// A trackpad pan. Content moves with `displacement`, so the scroll offset changes by
/// its negation.
#[derive(Clone, Debug, PartialEq)]
pub struct PanGestureInput {
    pub kind: PanGestureType,
    pub pan_start_point: ScreenPoint,
    pub displacement: ScreenVector,
    pub time: Instant,
    pub modifiers: Modifiers,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinchGestureType {
    Start,
    Scale,
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PinchGestureInput {
    pub kind: PinchGestureType,
    pub focus_point: ScreenPoint,
    pub current_span: f32,
    pub previous_span: f32,
    pub time: Instant,
    pub modifiers: Modifiers,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TapGestureType {
    LongTap,
    LongTapUp,
    SingleTapUp,
    SingleTapConfirmed,
    DoubleTap,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TapGestureInput {
    pub kind: TapGestureType,
    pub point: ScreenPoint,
    pub time: Instant,
    pub modifiers: Modifiers,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScrollDeltaType {
    Line,
    Page,
    Pixel,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScrollMode {
    Instant,
    Smooth,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScrollWheelInput {
    pub delta_type: ScrollDeltaType,
    pub scroll_mode: ScrollMode,
    pub origin: ScreenPoint,
    pub delta_x: f32,
    pub delta_y: f32,
    pub time: Instant,
    pub modifiers: Modifiers,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputData {
    MultiTouch(MultiTouchInput),
    PanGesture(PanGestureInput),
    PinchGesture(PinchGestureInput),
    TapGesture(TapGestureInput),
    ScrollWheel(ScrollWheelInput),
}

impl InputData {
    pub fn time(&self) -> Instant {
        match self {
            InputData::MultiTouch(input) => input.time,
            InputData::PanGesture(input) => input.time,
            InputData::PinchGesture(input) => input.time,
            InputData::TapGesture(input) => input.time,
            InputData::ScrollWheel(input) => input.time,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            InputData::MultiTouch(input) => input.modifiers,
            InputData::PanGesture(input) => input.modifiers,
            InputData::PinchGesture(input) => input.modifiers,
            InputData::TapGesture(input) => input.modifiers,
            InputData::ScrollWheel(input) => input.modifiers,
        }
    }

    /// The point used to find the target of this event.
    pub fn hit_test_point(&self) -> Option<ScreenPoint> {
        match self {
            InputData::MultiTouch(input) => input.touches.first().map(|touch| touch.point),
            InputData::PanGesture(input) => Some(input.pan_start_point),
            InputData::PinchGesture(input) => Some(input.focus_point),
            InputData::TapGesture(input) => Some(input.point),
            InputData::ScrollWheel(input) => Some(input.origin),
        }
    }

    /// Moves every point of this event through `transform`. Points the transform cannot
    /// project are left alone.
    pub fn transform(&mut self, transform: &Transform3D<f32>) {
        match self {
            InputData::MultiTouch(input) => {
                for touch in input.touches.iter_mut() {
                    touch.point = transform_point(transform, touch.point);
                }
            },
            InputData::PanGesture(input) => {
                let start = input.pan_start_point;
                let end = start + input.displacement;
                input.pan_start_point = transform_point(transform, start);
                input.displacement = transform_point(transform, end) - input.pan_start_point;
            },
            InputData::PinchGesture(input) => {
                input.focus_point = transform_point(transform, input.focus_point);
            },
            InputData::TapGesture(input) => {
                input.point = transform_point(transform, input.point);
            },
            InputData::ScrollWheel(input) => {
                input.origin = transform_point(transform, input.origin);
            },
        }
    }
}

/// Applies an untyped transform to a screen point.
pub fn transform_point(transform: &Transform3D<f32>, point: ScreenPoint) -> ScreenPoint {
    match transform.transform_point2d(point.to_untyped()) {
        Some(result) => Point2D::from_untyped(result),
        None => {
            warn!("Could not project {:?} through {:?}", point, transform);
            point
        },
    }
}

/// Applies an untyped transform to a screen vector anchored at `anchor`.
pub fn transform_vector(
    transform: &Transform3D<f32>,
    anchor: ScreenPoint,
    vector: ScreenVector,
) -> ScreenVector {
    let start = transform_point(transform, anchor);
    let end = transform_point(transform, anchor + vector);
    Vector2D::new(end.x - start.x, end.y - start.y)
}
