/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::prefs::ApzPrefs;

/// The source of "now" for everything that is not driven by an input timestamp or a
/// composite timestamp.
pub trait FrameClock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default)]
pub struct SystemFrameClock;

impl FrameClock for SystemFrameClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Used by tests and by input replays.
pub struct ManualFrameClock {
    now: Mutex<Instant>,
}

impl ManualFrameClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Instant) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) -> Instant {
        let mut now = self.now.lock();
        *now += by;
        *now
    }
}

impl FrameClock for ManualFrameClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// State shared by every controller of one compositor session.
#[derive(Clone)]
pub struct ApzContext {
    pub prefs: Arc<ApzPrefs>,
    pub clock: Arc<dyn FrameClock>,
}

impl ApzContext {
    pub fn new(prefs: ApzPrefs, clock: Arc<dyn FrameClock>) -> Self {
        Self {
            prefs: Arc::new(prefs),
            clock,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl Default for ApzContext {
    fn default() -> Self {
        Self::new(ApzPrefs::default(), Arc::new(SystemFrameClock))
    }
}
