/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Channels between the compositor thread, which owns the tree manager, and content.

use std::sync::Arc;
use std::time::{Duration, Instant};

use apz_traits::{
    ApzStateChange, ApzTask, CSSPoint, CSSRect, ContentController, FrameMetrics,
    ScrollableLayerGuid, TouchBehaviorFlags, ViewId, ZoomConstraints,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use keyboard_types::Modifiers;
use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::context::FrameClock;

/// Messages from content to the tree manager.
#[derive(Clone, Debug, Deserialize, IntoStaticStr, PartialEq, Serialize)]
pub enum ApzMessage {
    /// Script has handled the touch events of the current block, and either prevented
    /// or allowed their default action.
    ContentReceivedTouch {
        guid: ScrollableLayerGuid,
        prevent_default: bool,
    },
    /// The `touch-action` of the element the current touch block started on.
    SetAllowedTouchBehavior {
        guid: ScrollableLayerGuid,
        behaviors: TouchBehaviorFlags,
    },
    UpdateZoomConstraints {
        guid: ScrollableLayerGuid,
        constraints: ZoomConstraints,
    },
    /// Animates so that the given rect fills the viewport, for example after a double tap.
    ZoomToRect {
        guid: ScrollableLayerGuid,
        rect: CSSRect,
    },
    CancelAnimation { guid: ScrollableLayerGuid },
}

/// Sends messages to the tree manager.
#[derive(Clone)]
pub struct ApzProxy {
    pub sender: Sender<ApzMessage>,
}

impl ApzProxy {
    pub fn send(&self, msg: ApzMessage) {
        if let Err(err) = self.sender.send(msg) {
            warn!("Failed to send APZ message ({:?}).", err);
        }
    }
}

/// The port that the tree manager receives messages on.
pub struct ApzReceiver {
    pub receiver: Receiver<ApzMessage>,
}

impl ApzReceiver {
    pub fn try_recv(&self) -> Option<ApzMessage> {
        self.receiver.try_recv().ok()
    }
}

pub fn apz_channel() -> (ApzProxy, ApzReceiver) {
    let (sender, receiver) = unbounded();
    (ApzProxy { sender }, ApzReceiver { receiver })
}

/// Notifications from the controllers to content.
#[derive(Clone, Debug, Deserialize, IntoStaticStr, PartialEq, Serialize)]
pub enum ContentMessage {
    RequestContentRepaint(FrameMetrics),
    AcknowledgeScrollUpdate {
        scroll_id: ViewId,
        scroll_generation: u32,
    },
    SingleTap(CSSPoint, Modifiers, ScrollableLayerGuid),
    DoubleTap(CSSPoint, Modifiers, ScrollableLayerGuid),
    LongTap(CSSPoint, Modifiers, ScrollableLayerGuid),
    LongTapUp(CSSPoint, Modifiers, ScrollableLayerGuid),
    StateChange(ScrollableLayerGuid, ApzStateChange, i32),
}

struct DelayedTask {
    deadline: Instant,
    task: ApzTask,
}

/// A [`ContentController`] that forwards every notification over a channel.
///
/// Delayed tasks stay with the controller and are run by whoever owns the compositor
/// loop, through [`ChannelContentController::run_delayed_tasks`].
pub struct ChannelContentController {
    sender: Sender<ContentMessage>,
    clock: Arc<dyn FrameClock>,
    delayed_tasks: Mutex<Vec<DelayedTask>>,
}

impl ChannelContentController {
    pub fn new(sender: Sender<ContentMessage>, clock: Arc<dyn FrameClock>) -> Self {
        Self {
            sender,
            clock,
            delayed_tasks: Mutex::new(Vec::new()),
        }
    }

    fn send(&self, msg: ContentMessage) {
        if let Err(err) = self.sender.send(msg) {
            warn!("Failed to send content message ({:?}).", err);
        }
    }

    /// Runs every task that is due at `now`, in deadline order. Returns how many ran.
    pub fn run_delayed_tasks(&self, now: Instant) -> usize {
        let mut due = {
            let mut tasks = self.delayed_tasks.lock();
            let (due, pending): (Vec<_>, Vec<_>) =
                tasks.drain(..).partition(|task| task.deadline <= now);
            *tasks = pending;
            due
        };
        due.sort_by_key(|task| task.deadline);
        let count = due.len();
        // Tasks may post more tasks, so none of them run under the lock.
        for task in due {
            (task.task)();
        }
        count
    }

    /// When the next delayed task is due, if there is one.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.delayed_tasks
            .lock()
            .iter()
            .map(|task| task.deadline)
            .min()
    }
}

impl ContentController for ChannelContentController {
    fn request_content_repaint(&self, metrics: FrameMetrics) {
        self.send(ContentMessage::RequestContentRepaint(metrics));
    }

    fn acknowledge_scroll_update(&self, scroll_id: ViewId, scroll_generation: u32) {
        self.send(ContentMessage::AcknowledgeScrollUpdate {
            scroll_id,
            scroll_generation,
        });
    }

    fn handle_single_tap(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid) {
        self.send(ContentMessage::SingleTap(point, modifiers, guid));
    }

    fn handle_double_tap(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid) {
        self.send(ContentMessage::DoubleTap(point, modifiers, guid));
    }

    fn handle_long_tap(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid) {
        self.send(ContentMessage::LongTap(point, modifiers, guid));
    }

    fn handle_long_tap_up(&self, point: CSSPoint, modifiers: Modifiers, guid: ScrollableLayerGuid) {
        self.send(ContentMessage::LongTapUp(point, modifiers, guid));
    }

    fn notify_apz_state_change(&self, guid: ScrollableLayerGuid, change: ApzStateChange, arg: i32) {
        self.send(ContentMessage::StateChange(guid, change, arg));
    }

    fn post_delayed_task(&self, task: ApzTask, delay: Duration) {
        let deadline = self.clock.now() + delay;
        self.delayed_tasks.lock().push(DelayedTask { deadline, task });
    }
}
