/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Touch blocks: the touch events from a first finger going down to the last finger
//! lifting. Events of a block are held back until content has said whether it wants
//! to prevent the default action, and, with touch-action enabled, which behaviors it
//! allows.

use std::collections::VecDeque;

use apz_traits::{MultiTouchInput, MultiTouchType, TouchBehaviorFlags};
use log::{debug, trace};

pub(crate) type TouchBlockId = u64;

struct TouchBlock {
    id: TouchBlockId,
    needs_content_response: bool,
    needs_allowed_behaviors: bool,
    prevent_default: Option<bool>,
    allowed_behaviors: Option<TouchBehaviorFlags>,
    timed_out: bool,
    active_touches: usize,
    ended: bool,
    pending: VecDeque<MultiTouchInput>,
}

impl TouchBlock {
    fn is_ready(&self) -> bool {
        let answered = !self.needs_content_response || self.prevent_default.is_some();
        let behaviors_known = !self.needs_allowed_behaviors || self.allowed_behaviors.is_some();
        self.timed_out || (answered && behaviors_known)
    }

    fn awaits_content_response(&self) -> bool {
        self.needs_content_response && self.prevent_default.is_none()
    }
}

/// A touch event whose block is ready to be handled.
pub(crate) struct ReadyTouch {
    pub event: MultiTouchInput,
    pub prevented: bool,
    pub allowed_behaviors: Option<TouchBehaviorFlags>,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) enum ContentResponse {
    /// The response was recorded for a block that was still waiting for it.
    Applied,
    /// The response belongs to a block that already went ahead without it.
    Late,
    /// No block was waiting for a response.
    Unmatched,
}

#[derive(Default)]
pub(crate) struct TouchBlockQueue {
    blocks: VecDeque<TouchBlock>,
    next_id: TouchBlockId,
    /// Blocks that timed out and were retired before content answered them.
    retired_without_response: usize,
    retired_without_behaviors: usize,
}

impl TouchBlockQueue {
    /// Whether the next touch start begins a new block.
    pub(crate) fn needs_new_block(&self) -> bool {
        self.blocks.back().is_none_or(|block| block.ended)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub(crate) fn start_block(
        &mut self,
        needs_content_response: bool,
        needs_allowed_behaviors: bool,
    ) -> TouchBlockId {
        self.next_id += 1;
        let id = self.next_id;
        trace!(
            "Starting touch block {} (content response: {}, behaviors: {})",
            id, needs_content_response, needs_allowed_behaviors
        );
        self.blocks.push_back(TouchBlock {
            id,
            needs_content_response,
            needs_allowed_behaviors,
            prevent_default: None,
            allowed_behaviors: None,
            timed_out: false,
            active_touches: 0,
            ended: false,
            pending: VecDeque::new(),
        });
        id
    }

    /// Adds an event to the newest block. Returns false if there is no open block for it.
    pub(crate) fn add_event(&mut self, event: MultiTouchInput) -> bool {
        let Some(block) = self.blocks.back_mut().filter(|block| !block.ended) else {
            debug!("Dropping {:?} touch outside of any touch block", event.kind);
            return false;
        };
        match event.kind {
            MultiTouchType::Start => block.active_touches += event.touches.len(),
            MultiTouchType::Move => {},
            MultiTouchType::End => {
                block.active_touches = block.active_touches.saturating_sub(event.touches.len());
                block.ended = block.active_touches == 0;
            },
            MultiTouchType::Cancel => {
                block.active_touches = 0;
                block.ended = true;
            },
        }
        block.pending.push_back(event);
        true
    }

    pub(crate) fn content_received(&mut self, prevent_default: bool) -> ContentResponse {
        if self.retired_without_response > 0 {
            self.retired_without_response -= 1;
            return ContentResponse::Late;
        }
        let Some(block) = self
            .blocks
            .iter_mut()
            .find(|block| block.awaits_content_response())
        else {
            return ContentResponse::Unmatched;
        };
        block.prevent_default = Some(prevent_default);
        if block.timed_out {
            // Whatever was pending was already handled by default.
            ContentResponse::Late
        } else {
            ContentResponse::Applied
        }
    }

    pub(crate) fn set_allowed_behaviors(&mut self, behaviors: TouchBehaviorFlags) -> bool {
        if self.retired_without_behaviors > 0 {
            self.retired_without_behaviors -= 1;
            return false;
        }
        match self
            .blocks
            .iter_mut()
            .find(|block| block.allowed_behaviors.is_none())
        {
            Some(block) => {
                block.allowed_behaviors = Some(behaviors);
                true
            },
            None => false,
        }
    }

    /// Lets a block go ahead without its missing responses. Returns false if the block
    /// is gone or did not need to wait.
    pub(crate) fn time_out(&mut self, id: TouchBlockId) -> bool {
        match self.blocks.iter_mut().find(|block| block.id == id) {
            Some(block) if !block.is_ready() => {
                debug!("Touch block {} timed out waiting for content", id);
                block.timed_out = true;
                true
            },
            _ => false,
        }
    }

    /// Takes the next event that can be handled, retiring finished blocks on the way.
    pub(crate) fn next_ready_event(&mut self) -> Option<ReadyTouch> {
        loop {
            let front = self.blocks.front_mut()?;
            if !front.is_ready() {
                return None;
            }
            if let Some(event) = front.pending.pop_front() {
                return Some(ReadyTouch {
                    event,
                    prevented: front.prevent_default == Some(true),
                    allowed_behaviors: front.allowed_behaviors,
                });
            }
            if !front.ended {
                return None;
            }
            let block = self.blocks.pop_front()?;
            if block.timed_out && block.awaits_content_response() {
                self.retired_without_response += 1;
            }
            if block.timed_out && block.needs_allowed_behaviors && block.allowed_behaviors.is_none()
            {
                self.retired_without_behaviors += 1;
            }
            trace!("Retired touch block {}", block.id);
        }
    }

    pub(crate) fn has_pending_events(&self) -> bool {
        self.blocks.iter().any(|block| !block.pending.is_empty())
    }

    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
        self.retired_without_response = 0;
        self.retired_without_behaviors = 0;
    }
}
