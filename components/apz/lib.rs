/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! Asynchronous pan/zoom.
//!
//! The compositor hands every layer tree it receives to an [`ApzcTreeManager`], which
//! keeps one [`AsyncPanZoomController`] per scrollable frame, routes input to them and
//! samples their transforms once per composite. Content is kept informed through the
//! [`apz_traits::ContentController`] each controller was given.

mod animation;
mod axis;
pub mod channel;
pub mod context;
pub mod controller;
mod gesture_detector;
pub mod handoff;
pub mod prefs;
pub mod task_throttler;
mod touch_block;
pub mod tree_manager;

pub use crate::channel::{
    ApzMessage, ApzProxy, ApzReceiver, ChannelContentController, ContentMessage, apz_channel,
};
pub use crate::context::{ApzContext, FrameClock, ManualFrameClock, SystemFrameClock};
pub use crate::controller::{AsyncPanZoomController, PanZoomState, SampledTransform};
pub use crate::handoff::OverscrollHandoffChain;
pub use crate::prefs::{ApzPrefs, PrefsError};
pub use crate::task_throttler::TaskThrottler;
pub use crate::tree_manager::{ApzcTreeManager, InputEventResult};
