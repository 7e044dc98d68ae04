/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::default::Transform3D;

use crate::{FrameMetrics, LayerRect, LayersId};

/// A snapshot of one layer of the composited layer tree, as the compositor hands it to
/// the tree manager after a paint.
#[derive(Clone, Debug)]
pub struct LayerNode {
    /// Present if this layer scrolls.
    pub metrics: Option<FrameMetrics>,
    /// Maps points in this layer's space to its parent's space.
    pub transform: Transform3D<f32>,
    /// The part of the layer that is visible and hit-testable, in layer space.
    pub visible_region: LayerRect,
    /// Set on the root layer of a subtree painted by a different content process.
    pub layers_id: Option<LayersId>,
    /// Children in paint order, back to front.
    pub children: Vec<LayerNode>,
}

impl LayerNode {
    pub fn new(visible_region: LayerRect) -> Self {
        Self {
            metrics: None,
            transform: Transform3D::identity(),
            visible_region,
            layers_id: None,
            children: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: FrameMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_transform(mut self, transform: Transform3D<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_layers_id(mut self, layers_id: LayersId) -> Self {
        self.layers_id = Some(layers_id);
        self
    }

    pub fn with_child(mut self, child: LayerNode) -> Self {
        self.children.push(child);
        self
    }
}
