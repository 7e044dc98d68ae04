/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::debug;

/// Paces a stream of requests so that at most one of them is outstanding at a time.
///
/// A task handed to [`TaskThrottler::post_task`] is returned to the caller, which must
/// dispatch it, when nothing else is outstanding. Otherwise it is queued, replacing any
/// task queued before it, until the outstanding task completes. If the outstanding task
/// takes longer than `timeout` it is assumed lost and the next task goes out without
/// waiting for it.
///
/// Completions are not matched against the task they belong to: a completion always
/// completes whatever is outstanding at the time it arrives.
///
/// The throttler does no locking and must only be used from one thread at a time.
pub struct TaskThrottler<T> {
    outstanding: bool,
    queued_task: Option<T>,
    start_time: Option<Instant>,
    timeout: Duration,
    durations: VecDeque<Duration>,
    max_durations: usize,
}

impl<T> TaskThrottler<T> {
    pub fn new(timeout: Duration, max_durations: usize) -> Self {
        Self {
            outstanding: false,
            queued_task: None,
            start_time: None,
            timeout,
            durations: VecDeque::with_capacity(max_durations),
            max_durations: max_durations.max(1),
        }
    }

    /// Posts `task`. Returns it back if it should be dispatched right away.
    #[must_use]
    pub fn post_task(&mut self, task: T, now: Instant) -> Option<T> {
        if self.outstanding {
            if self.queued_task.take().is_some() {
                debug!("Superseding a queued task");
            }
            if self.time_since_last_request(now) < self.timeout {
                self.queued_task = Some(task);
                return None;
            }
            debug!("Outstanding task timed out, assuming it was lost");
        }
        self.start_time = Some(now);
        self.outstanding = true;
        Some(task)
    }

    /// Marks the outstanding task as done. Returns the queued task, if there is one; it
    /// is now outstanding and must be dispatched.
    #[must_use]
    pub fn task_complete(&mut self, now: Instant) -> Option<T> {
        if !self.outstanding {
            return None;
        }
        let duration = self.time_since_last_request(now);
        if self.durations.len() == self.max_durations {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);

        match self.queued_task.take() {
            Some(task) => {
                self.start_time = Some(now);
                Some(task)
            },
            None => {
                self.outstanding = false;
                None
            },
        }
    }

    /// Promotes the queued task if the outstanding one has been waiting longer than the
    /// timeout. The returned task is now outstanding and must be dispatched.
    #[must_use]
    pub fn check_timeout(&mut self, now: Instant) -> Option<T> {
        if !self.outstanding || self.time_since_last_request(now) < self.timeout {
            return None;
        }
        let task = self.queued_task.take()?;
        debug!("Outstanding task timed out, promoting the queued task");
        self.start_time = Some(now);
        Some(task)
    }

    pub fn cancel_pending_task(&mut self) {
        self.queued_task = None;
    }

    /// The mean time the last few tasks took to complete.
    pub fn average_duration(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        self.durations.iter().sum::<Duration>() / self.durations.len() as u32
    }

    /// Time since the last task went out, or `Duration::MAX` if none ever did.
    pub fn time_since_last_request(&self, now: Instant) -> Duration {
        match self.start_time {
            Some(start_time) => now.saturating_duration_since(start_time),
            None => Duration::MAX,
        }
    }

    pub fn clear_history(&mut self) {
        self.durations.clear();
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }
}
