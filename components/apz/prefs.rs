/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tuning values for async pan/zoom. These can be read from a JSON preferences file;
//! any value that is missing keeps its default.

use std::f32::consts::PI;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ApzPrefs {
    /// Distance in screen pixels a touch has to travel before it becomes a pan.
    pub touch_start_tolerance: f32,
    /// Pans within this angle (radians) of an axis are locked to that axis.
    pub axis_lock_angle: f32,
    /// When touch-action allows a single pan direction, pans within this angle of it
    /// are still accepted.
    pub allowed_direct_pan_angle: f32,
    /// Fraction of velocity lost per millisecond of fling.
    pub fling_friction: f32,
    /// Flings stop once velocity drops below this, in screen pixels per millisecond.
    pub fling_stopped_threshold: f32,
    /// Lift-offs slower than this do not fling.
    pub fling_min_velocity_threshold: f32,
    pub fling_repaint_interval_ms: u64,
    /// Upper bound on the velocity a pan can reach.
    pub max_velocity: Option<f32>,
    /// How many of the last movement samples are averaged into the release velocity.
    pub max_velocity_queue_size: usize,
    pub pan_repaint_interval_ms: u64,
    /// How long a touch block waits for content before it proceeds without an answer.
    pub content_response_timeout_ms: u64,
    /// How long a repaint request may stay outstanding before it is assumed lost.
    pub paint_timeout_ms: u64,
    pub num_paint_duration_samples: usize,
    /// Wait for content to report its allowed touch behaviors before panning.
    pub touch_action_enabled: bool,
    pub overscroll_enabled: bool,
    pub overscroll_spring_stiffness: f32,
    pub overscroll_spring_friction: f32,
    pub overscroll_stop_distance_threshold: f32,
    pub overscroll_stop_velocity_threshold: f32,
    pub zoom_animation_duration_ms: u64,
    pub smooth_scroll_enabled: bool,
    pub wheel_scroll_duration_ms: u64,
    /// Pixels scrolled for one line of wheel delta.
    pub line_scroll_amount: f32,
    pub max_tap_time_ms: u64,
    pub long_tap_delay_ms: u64,
    /// Span change in screen pixels before two touches turn into a pinch.
    pub pinch_start_threshold: f32,
    pub x_skate_size_multiplier: f32,
    pub y_skate_size_multiplier: f32,
    pub x_stationary_size_multiplier: f32,
    pub y_stationary_size_multiplier: f32,
    pub min_skate_speed: f32,
    pub velocity_bias: f32,
    pub use_paint_duration: bool,
}

impl Default for ApzPrefs {
    fn default() -> Self {
        Self {
            touch_start_tolerance: 10.0,
            axis_lock_angle: PI / 6.0,
            allowed_direct_pan_angle: PI / 3.0,
            fling_friction: 0.002,
            fling_stopped_threshold: 0.01,
            fling_min_velocity_threshold: 0.5,
            fling_repaint_interval_ms: 75,
            max_velocity: None,
            max_velocity_queue_size: 5,
            pan_repaint_interval_ms: 250,
            content_response_timeout_ms: 300,
            paint_timeout_ms: 100,
            num_paint_duration_samples: 3,
            touch_action_enabled: false,
            overscroll_enabled: true,
            overscroll_spring_stiffness: 0.001,
            overscroll_spring_friction: 0.015,
            overscroll_stop_distance_threshold: 5.0,
            overscroll_stop_velocity_threshold: 0.01,
            zoom_animation_duration_ms: 250,
            smooth_scroll_enabled: true,
            wheel_scroll_duration_ms: 150,
            line_scroll_amount: 48.0,
            max_tap_time_ms: 300,
            long_tap_delay_ms: 500,
            pinch_start_threshold: 35.0,
            x_skate_size_multiplier: 1.5,
            y_skate_size_multiplier: 2.5,
            x_stationary_size_multiplier: 3.0,
            y_stationary_size_multiplier: 3.5,
            min_skate_speed: 1.0,
            velocity_bias: 1.0,
            use_paint_duration: true,
        }
    }
}

#[derive(Debug)]
pub enum PrefsError {
    Parse(serde_json::Error),
    Invalid { name: &'static str, reason: String },
}

impl fmt::Display for PrefsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefsError::Parse(error) => write!(f, "Could not parse APZ preferences: {}", error),
            PrefsError::Invalid { name, reason } => {
                write!(f, "Invalid APZ preference `{}`: {}", name, reason)
            },
        }
    }
}

impl std::error::Error for PrefsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrefsError::Parse(error) => Some(error),
            PrefsError::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for PrefsError {
    fn from(error: serde_json::Error) -> Self {
        PrefsError::Parse(error)
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> PrefsError {
    PrefsError::Invalid {
        name,
        reason: reason.into(),
    }
}

impl ApzPrefs {
    pub fn from_json(json: &str) -> Result<Self, PrefsError> {
        let prefs: ApzPrefs = serde_json::from_str(json)?;
        prefs.validate()?;
        Ok(prefs)
    }

    pub fn validate(&self) -> Result<(), PrefsError> {
        if !(0.0..1.0).contains(&self.fling_friction) {
            return Err(invalid("fling_friction", "must be in [0, 1)"));
        }
        let non_negative = [
            ("touch_start_tolerance", self.touch_start_tolerance),
            ("fling_stopped_threshold", self.fling_stopped_threshold),
            (
                "fling_min_velocity_threshold",
                self.fling_min_velocity_threshold,
            ),
            ("overscroll_spring_stiffness", self.overscroll_spring_stiffness),
            ("overscroll_spring_friction", self.overscroll_spring_friction),
            ("line_scroll_amount", self.line_scroll_amount),
            ("pinch_start_threshold", self.pinch_start_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, format!("{} is not a non-negative number", value)));
            }
        }
        for (name, angle) in [
            ("axis_lock_angle", self.axis_lock_angle),
            ("allowed_direct_pan_angle", self.allowed_direct_pan_angle),
        ] {
            if !(0.0..=PI / 2.0).contains(&angle) {
                return Err(invalid(name, "must be between 0 and pi/2"));
            }
        }
        if let Some(max_velocity) = self.max_velocity {
            if max_velocity <= 0.0 {
                return Err(invalid("max_velocity", "must be positive"));
            }
        }
        if self.max_velocity_queue_size == 0 {
            return Err(invalid("max_velocity_queue_size", "must be at least 1"));
        }
        if self.num_paint_duration_samples == 0 {
            return Err(invalid("num_paint_duration_samples", "must be at least 1"));
        }
        Ok(())
    }

    pub fn fling_repaint_interval(&self) -> Duration {
        Duration::from_millis(self.fling_repaint_interval_ms)
    }

    pub fn pan_repaint_interval(&self) -> Duration {
        Duration::from_millis(self.pan_repaint_interval_ms)
    }

    pub fn content_response_timeout(&self) -> Duration {
        Duration::from_millis(self.content_response_timeout_ms)
    }

    pub fn paint_timeout(&self) -> Duration {
        Duration::from_millis(self.paint_timeout_ms)
    }

    pub fn zoom_animation_duration(&self) -> Duration {
        Duration::from_millis(self.zoom_animation_duration_ms)
    }

    pub fn wheel_scroll_duration(&self) -> Duration {
        Duration::from_millis(self.wheel_scroll_duration_ms)
    }

    pub fn max_tap_time(&self) -> Duration {
        Duration::from_millis(self.max_tap_time_ms)
    }

    pub fn long_tap_delay(&self) -> Duration {
        Duration::from_millis(self.long_tap_delay_ms)
    }
}
