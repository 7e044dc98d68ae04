/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::default::Transform3D;
use euclid::{Scale, Size2D};
use serde::{Deserialize, Serialize};

use crate::{
    CSSPoint, CSSRect, CSSSize, CSSToScreenScale, CSSVector, NULL_SCROLL_ID, ParentLayerRect,
    ScreenVector, ViewId,
};

/// The smallest zoom any frame may be set to, whatever its constraints say.
pub const MIN_ZOOM: f32 = 0.125;

/// The largest zoom any frame may be set to, whatever its constraints say.
pub const MAX_ZOOM: f32 = 8.0;

/// The state of one scrollable frame: its viewport, its content size, its scroll
/// position and its zoom.
///
/// This is always handed around by value. The copy owned by a controller is only ever
/// mutated under that controller's monitor.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FrameMetrics {
    /// The area of the parent layer this frame is composited into.
    pub composition_bounds: ParentLayerRect,
    /// The area that can be scrolled to, in CSS pixels.
    pub scrollable_rect: CSSRect,
    /// The top-left corner of the visible part of `scrollable_rect`.
    pub scroll_offset: CSSPoint,
    /// The area content is asked to paint, relative to `scroll_offset`.
    pub display_port: CSSRect,
    pub zoom: CSSToScreenScale,
    pub dev_pixels_per_css_pixel: f32,
    pub scroll_id: ViewId,
    pub pres_shell_id: u32,
    pub is_root: bool,
    pub may_have_touch_listeners: bool,
    /// Set by content when it moved the scroll offset itself, for example from script.
    pub scroll_offset_updated: bool,
    pub scroll_generation: u32,
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self {
            composition_bounds: ParentLayerRect::zero(),
            scrollable_rect: CSSRect::zero(),
            scroll_offset: CSSPoint::origin(),
            display_port: CSSRect::zero(),
            zoom: Scale::new(1.0),
            dev_pixels_per_css_pixel: 1.0,
            scroll_id: NULL_SCROLL_ID,
            pres_shell_id: 0,
            is_root: false,
            may_have_touch_listeners: false,
            scroll_offset_updated: false,
            scroll_generation: 0,
        }
    }
}

impl FrameMetrics {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_scrollable(&self) -> bool {
        self.scroll_id != NULL_SCROLL_ID
    }

    /// The size of the composition bounds, measured in CSS pixels at the current zoom.
    pub fn composited_size(&self) -> CSSSize {
        let size = self.composition_bounds.size;
        let zoom = self.zoom.get();
        if zoom <= 0.0 {
            return CSSSize::zero();
        }
        Size2D::new(size.width / zoom, size.height / zoom)
    }

    /// The range the scroll offset may take: origin at the scrollable rect origin and
    /// size equal to how far the viewport can travel along each axis.
    pub fn scroll_range(&self) -> CSSRect {
        let composited = self.composited_size();
        CSSRect::new(
            self.scrollable_rect.origin,
            Size2D::new(
                (self.scrollable_rect.size.width - composited.width).max(0.0),
                (self.scrollable_rect.size.height - composited.height).max(0.0),
            ),
        )
    }

    pub fn clamp_scroll_offset(&self, offset: CSSPoint) -> CSSPoint {
        let range = self.scroll_range();
        CSSPoint::new(
            offset.x.max(range.min_x()).min(range.max_x()),
            offset.y.max(range.min_y()).min(range.max_y()),
        )
    }

    pub fn scroll_by(&mut self, delta: CSSVector) {
        self.scroll_offset += delta;
    }

    /// Whether the zoom is one the controllers can divide by.
    pub fn has_valid_zoom(&self) -> bool {
        let zoom = self.zoom.get();
        zoom.is_finite() && zoom > 0.0
    }

    /// Replaces a zoom that is zero, negative or not finite with [`MIN_ZOOM`].
    pub fn with_valid_zoom(mut self) -> Self {
        if !self.has_valid_zoom() {
            self.zoom = Scale::new(MIN_ZOOM);
        }
        self
    }
}

/// The constraints content places on user zooming, usually from a viewport meta tag.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ZoomConstraints {
    pub allow_zoom: bool,
    pub allow_double_tap_zoom: bool,
    pub min_zoom: CSSToScreenScale,
    pub max_zoom: CSSToScreenScale,
}

impl Default for ZoomConstraints {
    fn default() -> Self {
        Self {
            allow_zoom: true,
            allow_double_tap_zoom: true,
            min_zoom: Scale::new(MIN_ZOOM),
            max_zoom: Scale::new(MAX_ZOOM),
        }
    }
}

impl ZoomConstraints {
    /// Brings both bounds into `[MIN_ZOOM, MAX_ZOOM]` and makes sure the range is not
    /// inverted.
    pub fn sanitized(self) -> Self {
        let min_zoom = self.min_zoom.get().clamp(MIN_ZOOM, MAX_ZOOM);
        let max_zoom = self.max_zoom.get().clamp(MIN_ZOOM, MAX_ZOOM).max(min_zoom);
        Self {
            min_zoom: Scale::new(min_zoom),
            max_zoom: Scale::new(max_zoom),
            ..self
        }
    }
}

/// The async part of the transform the compositor applies to a scrollable layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub translation: ScreenVector,
    pub scale: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            translation: ScreenVector::zero(),
            scale: 1.0,
        }
    }
}

impl ViewTransform {
    pub fn is_identity(&self) -> bool {
        self.translation == ScreenVector::zero() && self.scale == 1.0
    }

    pub fn to_transform(&self) -> Transform3D<f32> {
        Transform3D::scale(self.scale, self.scale, 1.0).then(&Transform3D::translation(
            self.translation.x,
            self.translation.y,
            0.0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> FrameMetrics {
        FrameMetrics {
            composition_bounds: ParentLayerRect::new(
                euclid::Point2D::origin(),
                Size2D::new(100.0, 100.0),
            ),
            scrollable_rect: CSSRect::new(CSSPoint::origin(), Size2D::new(100.0, 1000.0)),
            scroll_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn scroll_range_accounts_for_zoom() {
        let mut metrics = metrics();
        assert_eq!(metrics.scroll_range().size, Size2D::new(0.0, 900.0));
        metrics.zoom = Scale::new(2.0);
        assert_eq!(metrics.scroll_range().size, Size2D::new(50.0, 950.0));
    }

    #[test]
    fn clamp_scroll_offset_stays_in_range() {
        let metrics = metrics();
        let clamped = metrics.clamp_scroll_offset(CSSPoint::new(-5.0, 2000.0));
        assert_eq!(clamped, CSSPoint::new(0.0, 900.0));
    }

    #[test]
    fn degenerate_zoom_is_replaced() {
        let mut metrics = metrics();
        assert_eq!(metrics.clone().with_valid_zoom(), metrics);
        metrics.zoom = Scale::new(0.0);
        assert_eq!(metrics.clone().with_valid_zoom().zoom.get(), MIN_ZOOM);
        metrics.zoom = Scale::new(f32::NAN);
        assert_eq!(metrics.with_valid_zoom().zoom.get(), MIN_ZOOM);
    }

    #[test]
    fn inverted_zoom_constraints_are_fixed() {
        let constraints = ZoomConstraints {
            min_zoom: Scale::new(4.0),
            max_zoom: Scale::new(2.0),
            ..Default::default()
        }
        .sanitized();
        assert_eq!(constraints.min_zoom.get(), 4.0);
        assert_eq!(constraints.max_zoom.get(), 4.0);

        let constraints = ZoomConstraints {
            min_zoom: Scale::new(0.01),
            max_zoom: Scale::new(100.0),
            ..Default::default()
        }
        .sanitized();
        assert_eq!(constraints.min_zoom.get(), MIN_ZOOM);
        assert_eq!(constraints.max_zoom.get(), MAX_ZOOM);
    }
}
