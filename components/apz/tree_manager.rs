/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Keeps one controller per scrollable layer and routes input to them.
//!
//! The tree manager mirrors the layer tree as an arena of hit-testing nodes and is the
//! only owner of the controllers. Everything else, including the controllers themselves
//! and handoff chains, holds weak handles. The tree lock may be held while taking a
//! controller's monitor, never the other way around.

use std::sync::{Arc, Weak};
use std::time::Instant;

use apz_traits::{
    CSSPoint, CSSRect, ContentController, EventStatus, FrameMetrics, InputData, LayerNode,
    LayerRect, LayersId, MultiTouchType, PanGestureType, PinchGestureType, ScreenPoint,
    ScreenVector, ScrollableLayerGuid, TouchBehaviorFlags, ViewId, ZoomConstraints,
    transform_point, transform_vector,
};
use euclid::Point2D;
use euclid::default::{Point2D as UntypedPoint, Transform3D};
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::channel::{ApzMessage, ApzReceiver};
use crate::context::ApzContext;
use crate::controller::{AsyncPanZoomController, PanZoomState, SampledTransform};
use crate::handoff::OverscrollHandoffChain;

/// The outcome of routing one input event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputEventResult {
    pub status: EventStatus,
    /// The controller that handled the event, if any did.
    pub target_guid: Option<ScrollableLayerGuid>,
}

impl InputEventResult {
    fn ignored() -> Self {
        Self {
            status: EventStatus::Ignored,
            target_guid: None,
        }
    }
}

type ApzcKey = (LayersId, ViewId);

struct HitTestingNode {
    apzc: Option<Arc<AsyncPanZoomController>>,
    parent: Option<usize>,
    /// Back to front.
    children: Vec<usize>,
    /// From this layer's space to its parent's.
    transform: Transform3D<f32>,
    visible_region: LayerRect,
}

/// The controller an input block is routed to.
struct InputBlockTarget {
    apzc: Arc<AsyncPanZoomController>,
    /// Taken when the block starts, so that every event of the block reaches the
    /// controller in the same space.
    to_apzc: Transform3D<f32>,
}

#[derive(Default)]
struct ApzcTree {
    /// The root, if any, is at index 0.
    nodes: Vec<HitTestingNode>,
    apzcs: FxHashMap<ApzcKey, usize>,
    input_target: Option<InputBlockTarget>,
    active_touches: usize,
    handoff_chain: Option<OverscrollHandoffChain>,
}

fn invert(transform: &Transform3D<f32>) -> Transform3D<f32> {
    transform.inverse().unwrap_or_else(|| {
        warn!("Treating singular transform {:?} as identity", transform);
        Transform3D::identity()
    })
}

impl ApzcTree {
    fn node_of(&self, apzc: &AsyncPanZoomController) -> Option<usize> {
        self.nodes.iter().position(|node| {
            node.apzc
                .as_ref()
                .is_some_and(|candidate| std::ptr::eq(Arc::as_ptr(candidate), apzc))
        })
    }

    fn nearest_apzc_node(&self, index: usize) -> Option<usize> {
        let mut current = Some(index);
        while let Some(index) = current {
            let node = &self.nodes[index];
            if node.apzc.is_some() {
                return Some(index);
            }
            current = node.parent;
        }
        None
    }

    fn apzc_at(&self, index: usize) -> Option<Arc<AsyncPanZoomController>> {
        self.nodes.get(index).and_then(|node| node.apzc.clone())
    }

    /// The node of the controller that should handle input at `point`.
    fn hit_test(&self, point: ScreenPoint) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }
        let hit = self.hit_test_node(0, point.to_untyped())?;
        self.nearest_apzc_node(hit)
    }

    /// Returns the front-most node under `point`, given in the parent's space.
    fn hit_test_node(&self, index: usize, point: UntypedPoint<f32>) -> Option<usize> {
        let node = &self.nodes[index];
        let point = node.transform.inverse()?.transform_point2d(point)?;
        // Children are drawn with this layer's async transform applied.
        let point_for_children = match &node.apzc {
            Some(apzc) => apzc
                .current_async_transform()
                .to_transform()
                .inverse()?
                .transform_point2d(point)?,
            None => point,
        };
        for &child in node.children.iter().rev() {
            if let Some(hit) = self.hit_test_node(child, point_for_children) {
                return Some(hit);
            }
        }
        node.visible_region
            .contains(Point2D::from_untyped(point))
            .then_some(index)
    }

    fn common_ancestor(&self, first: usize, second: usize) -> Option<usize> {
        let mut ancestors = SmallVec::<[usize; 8]>::new();
        let mut current = Some(first);
        while let Some(index) = current {
            ancestors.push(index);
            current = self.nodes[index].parent;
        }
        let mut current = Some(second);
        while let Some(index) = current {
            if ancestors.contains(&index) {
                return Some(index);
            }
            current = self.nodes[index].parent;
        }
        None
    }

    /// The transforms from screen space to the target's space, and from the target's
    /// space to the space content is about to paint in.
    ///
    /// Going in, every layer transform is undone, along with the async transforms of
    /// the controllers above the target. Going out, the target's async transform is
    /// undone and then every layer transform is reapplied, along with what each
    /// controller last asked content to paint.
    fn input_transforms(&self, target: usize) -> (Transform3D<f32>, Transform3D<f32>) {
        let mut path = SmallVec::<[usize; 8]>::new();
        let mut current = Some(target);
        while let Some(index) = current {
            path.push(index);
            current = self.nodes[index].parent;
        }

        let mut to_apzc = Transform3D::identity();
        for &index in path.iter().rev() {
            let node = &self.nodes[index];
            to_apzc = to_apzc.then(&invert(&node.transform));
            if index == target {
                continue;
            }
            if let Some(apzc) = &node.apzc {
                let async_transform = apzc.current_async_transform().to_transform();
                to_apzc = to_apzc.then(&invert(&async_transform));
            }
        }

        let mut to_content = Transform3D::identity();
        for &index in path.iter() {
            let node = &self.nodes[index];
            if let Some(apzc) = &node.apzc {
                if index == target {
                    let async_transform = apzc.current_async_transform().to_transform();
                    to_content = to_content.then(&invert(&async_transform));
                }
                to_content = to_content.then(&apzc.transform_to_last_dispatched_paint());
            }
            to_content = to_content.then(&node.transform);
        }
        (to_apzc, to_content)
    }

    /// The target and its scrollable ancestors, innermost first.
    fn build_handoff_chain(&self, target: usize) -> OverscrollHandoffChain {
        let mut chain = Vec::new();
        let mut current = Some(target);
        while let Some(index) = current {
            let node = &self.nodes[index];
            if let Some(apzc) = &node.apzc {
                if !chain.iter().any(|entry: &Weak<_>| entry.as_ptr() == Arc::as_ptr(apzc)) {
                    chain.push(Arc::downgrade(apzc));
                }
            }
            current = node.parent;
        }
        OverscrollHandoffChain::new(chain)
    }

    /// The chain of the current gesture if `apzc` is part of it, or else a fresh one
    /// starting at `apzc`.
    fn chain_for(&self, apzc: &AsyncPanZoomController) -> OverscrollHandoffChain {
        match &self.handoff_chain {
            Some(chain) if chain.contains(apzc) => chain.clone(),
            _ => self
                .node_of(apzc)
                .map(|index| self.build_handoff_chain(index))
                .unwrap_or_default(),
        }
    }

    fn start_input_block(&mut self, target: usize) -> Option<Arc<AsyncPanZoomController>> {
        let apzc = self.apzc_at(target)?;
        let (to_apzc, _) = self.input_transforms(target);
        self.handoff_chain = Some(self.build_handoff_chain(target));
        self.input_target = Some(InputBlockTarget {
            apzc: apzc.clone(),
            to_apzc,
        });
        Some(apzc)
    }

    fn current_target(&self) -> Option<(Arc<AsyncPanZoomController>, Transform3D<f32>)> {
        self.input_target
            .as_ref()
            .map(|target| (target.apzc.clone(), target.to_apzc))
    }
}

/// Builds the arena for a new layer tree, reusing the controllers of the old one.
struct TreeBuilder<'a> {
    manager: &'a ApzcTreeManager,
    controllers: &'a FxHashMap<LayersId, Arc<dyn ContentController>>,
    old_apzcs: FxHashMap<ApzcKey, Arc<AsyncPanZoomController>>,
    nodes: Vec<HitTestingNode>,
    apzcs: FxHashMap<ApzcKey, usize>,
    is_first_paint: bool,
    first_paint_layers_id: LayersId,
}

impl TreeBuilder<'_> {
    fn visit(
        &mut self,
        layer: &LayerNode,
        parent: Option<usize>,
        layers_id: LayersId,
        controller: Option<Arc<dyn ContentController>>,
    ) -> usize {
        let layers_id = layer.layers_id.unwrap_or(layers_id);
        let controller = self.controllers.get(&layers_id).cloned().or(controller);
        let index = self.nodes.len();
        let apzc = layer
            .metrics
            .as_ref()
            .filter(|metrics| metrics.is_scrollable())
            .map(|metrics| self.apzc_for(layers_id, metrics, controller.clone(), index));

        self.nodes.push(HitTestingNode {
            apzc,
            parent,
            children: Vec::with_capacity(layer.children.len()),
            transform: layer.transform,
            visible_region: layer.visible_region,
        });
        for child in &layer.children {
            let child = self.visit(child, Some(index), layers_id, controller.clone());
            self.nodes[index].children.push(child);
        }
        index
    }

    fn apzc_for(
        &mut self,
        layers_id: LayersId,
        metrics: &FrameMetrics,
        controller: Option<Arc<dyn ContentController>>,
        index: usize,
    ) -> Arc<AsyncPanZoomController> {
        let key = (layers_id, metrics.scroll_id);
        // Several layers may belong to one scroll frame; they share its controller.
        if let Some(apzc) = self
            .apzcs
            .get(&key)
            .and_then(|&existing| self.nodes[existing].apzc.clone())
        {
            return apzc;
        }

        let apzc = match self.old_apzcs.remove(&key) {
            Some(apzc) => {
                apzc.set_content_controller(controller);
                apzc
            },
            None => {
                debug!("Creating controller for scroll frame {:?}", key);
                AsyncPanZoomController::new(
                    layers_id,
                    self.manager.context.clone(),
                    self.manager.self_handle.clone(),
                    controller,
                )
            },
        };
        apzc.notify_layers_updated(
            metrics,
            self.is_first_paint && layers_id == self.first_paint_layers_id,
        );
        self.apzcs.insert(key, index);
        apzc
    }
}

pub struct ApzcTreeManager {
    context: ApzContext,
    self_handle: Weak<ApzcTreeManager>,
    tree: Mutex<ApzcTree>,
    content_controllers: RwLock<FxHashMap<LayersId, Arc<dyn ContentController>>>,
}

impl ApzcTreeManager {
    pub fn new(context: ApzContext) -> Arc<Self> {
        Arc::new_cyclic(|self_handle| Self {
            context,
            self_handle: self_handle.clone(),
            tree: Mutex::new(ApzcTree::default()),
            content_controllers: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn context(&self) -> &ApzContext {
        &self.context
    }

    /// Sets the content controller for the controllers of `layers_id`, and of any
    /// layer tree nested in it without a controller of its own.
    pub fn register_content_controller(
        &self,
        layers_id: LayersId,
        controller: Arc<dyn ContentController>,
    ) {
        self.content_controllers
            .write()
            .insert(layers_id, controller.clone());
        let tree = self.tree.lock();
        for node in &tree.nodes {
            if let Some(apzc) = node.apzc.as_ref().filter(|apzc| apzc.layers_id() == layers_id) {
                apzc.set_content_controller(Some(controller.clone()));
            }
        }
    }

    /// Rebuilds the controller tree from a new layer tree. Controllers are matched to
    /// scroll frames by layers id and scroll id; those whose frame is gone are destroyed.
    pub fn update_pan_zoom_controller_tree(
        &self,
        root: Option<&LayerNode>,
        is_first_paint: bool,
        first_paint_layers_id: LayersId,
        paint_sequence: u32,
    ) {
        trace!("Updating controller tree for paint {}", paint_sequence);
        let controllers = self.content_controllers.read().clone();
        let mut tree = self.tree.lock();

        let old_apzcs: FxHashMap<_, _> = tree
            .apzcs
            .iter()
            .filter_map(|(&key, &index)| Some((key, tree.apzc_at(index)?)))
            .collect();
        let mut builder = TreeBuilder {
            manager: self,
            controllers: &controllers,
            old_apzcs,
            nodes: Vec::new(),
            apzcs: FxHashMap::default(),
            is_first_paint,
            first_paint_layers_id,
        };
        if let Some(root) = root {
            let root_layers_id = root.layers_id.unwrap_or_default();
            let root_controller = controllers.get(&root_layers_id).cloned();
            builder.visit(root, None, root_layers_id, root_controller);
        }

        let TreeBuilder {
            old_apzcs,
            nodes,
            apzcs,
            ..
        } = builder;
        tree.nodes = nodes;
        tree.apzcs = apzcs;

        for (key, apzc) in old_apzcs {
            debug!("Scroll frame {:?} is gone", key);
            if tree
                .input_target
                .as_ref()
                .is_some_and(|target| Arc::ptr_eq(&target.apzc, &apzc))
            {
                tree.input_target = None;
                tree.active_touches = 0;
            }
            if tree
                .handoff_chain
                .as_ref()
                .is_some_and(|chain| chain.contains(&apzc))
            {
                tree.handoff_chain = None;
            }
            apzc.destroy();
        }
    }

    /// Destroys every controller.
    pub fn clear_tree(&self) {
        self.update_pan_zoom_controller_tree(None, false, 0, 0);
    }

    /// The controller under `point`, with the transform from screen space to its space
    /// and from its space to the space content is about to paint in.
    pub fn get_target_apzc(
        &self,
        point: ScreenPoint,
    ) -> Option<(Arc<AsyncPanZoomController>, Transform3D<f32>, Transform3D<f32>)> {
        let tree = self.tree.lock();
        let index = tree.hit_test(point)?;
        let apzc = tree.apzc_at(index)?;
        let (to_apzc, to_content) = tree.input_transforms(index);
        Some((apzc, to_apzc, to_content))
    }

    pub fn get_target_apzc_by_guid(
        &self,
        guid: &ScrollableLayerGuid,
    ) -> Option<Arc<AsyncPanZoomController>> {
        let tree = self.tree.lock();
        let index = *tree.apzcs.get(&(guid.layers_id, guid.scroll_id))?;
        tree.apzc_at(index)
    }

    /// See [`ApzcTree::input_transforms`]. Identity for a controller not in the tree.
    pub fn get_input_transforms(
        &self,
        apzc: &AsyncPanZoomController,
    ) -> (Transform3D<f32>, Transform3D<f32>) {
        let tree = self.tree.lock();
        match tree.node_of(apzc) {
            Some(index) => tree.input_transforms(index),
            None => (Transform3D::identity(), Transform3D::identity()),
        }
    }

    /// Makes `apzc` and its scrollable ancestors the handoff chain of the current gesture.
    pub fn build_overscroll_handoff_chain(
        &self,
        apzc: &AsyncPanZoomController,
    ) -> OverscrollHandoffChain {
        let mut tree = self.tree.lock();
        let chain = tree
            .node_of(apzc)
            .map(|index| tree.build_handoff_chain(index))
            .unwrap_or_default();
        tree.handoff_chain = Some(chain.clone());
        chain
    }

    pub fn clear_overscroll_handoff_chain(&self) {
        self.tree.lock().handoff_chain = None;
    }

    /// Routes an event to the controller it targets. The event is rewritten in place
    /// into the coordinates content should use for it.
    pub fn receive_input_event(&self, event: &mut InputData) -> InputEventResult {
        match &*event {
            InputData::MultiTouch(touch) => {
                let kind = touch.kind;
                let count = touch.touches.len();
                let points: SmallVec<[ScreenPoint; 2]> =
                    touch.touches.iter().map(|touch| touch.point).collect();
                let result = match self.touch_block_target(kind, &points) {
                    Some((apzc, to_apzc)) => self.deliver(&apzc, &to_apzc, event),
                    None => InputEventResult::ignored(),
                };
                self.end_touches(kind, count);
                result
            },
            InputData::PanGesture(pan) => {
                let starts = matches!(pan.kind, PanGestureType::MayStart | PanGestureType::Start);
                let ends = matches!(
                    pan.kind,
                    PanGestureType::Cancelled | PanGestureType::End | PanGestureType::MomentumEnd
                );
                self.route_gesture_block(pan.pan_start_point, starts, ends, event)
            },
            InputData::PinchGesture(pinch) => {
                let starts = pinch.kind == PinchGestureType::Start;
                let ends = pinch.kind == PinchGestureType::End;
                self.route_gesture_block(pinch.focus_point, starts, ends, event)
            },
            InputData::TapGesture(_) | InputData::ScrollWheel(_) => {
                let Some(point) = event.hit_test_point() else {
                    return InputEventResult::ignored();
                };
                match self.get_target_apzc(point) {
                    Some((apzc, to_apzc, _)) => self.deliver(&apzc, &to_apzc, event),
                    None => InputEventResult::ignored(),
                }
            },
        }
    }

    fn deliver(
        &self,
        apzc: &Arc<AsyncPanZoomController>,
        to_apzc: &Transform3D<f32>,
        event: &mut InputData,
    ) -> InputEventResult {
        let mut local = event.clone();
        local.transform(to_apzc);
        let status = apzc.receive_input_event(&local);

        let (to_apzc, to_content) = self.get_input_transforms(apzc);
        event.transform(&to_apzc.then(&to_content));
        InputEventResult {
            status,
            target_guid: Some(apzc.guid()),
        }
    }

    /// The target of the touch block `kind` belongs to, picking one if the block starts.
    fn touch_block_target(
        &self,
        kind: MultiTouchType,
        points: &[ScreenPoint],
    ) -> Option<(Arc<AsyncPanZoomController>, Transform3D<f32>)> {
        let mut interrupted = Vec::new();
        let target = {
            let mut tree = self.tree.lock();
            if kind == MultiTouchType::Start {
                if tree.active_touches == 0 {
                    let hit = points
                        .iter()
                        .filter_map(|&point| tree.hit_test(point))
                        .reduce(|first, second| {
                            tree.common_ancestor(first, second).unwrap_or(first)
                        })
                        .and_then(|index| tree.nearest_apzc_node(index));
                    tree.input_target = None;
                    if let Some(apzc) = hit.and_then(|index| tree.start_input_block(index)) {
                        // A new touch stops whatever the rest of the chain is animating.
                        if let Some(chain) = &tree.handoff_chain {
                            interrupted = chain.after(&apzc);
                        }
                    }
                }
                tree.active_touches += points.len();
            }
            tree.current_target()
        };

        for apzc in interrupted {
            if matches!(
                apzc.state(),
                PanZoomState::Fling |
                    PanZoomState::OverscrollAnimation |
                    PanZoomState::WheelScroll |
                    PanZoomState::AnimatingZoom
            ) {
                apzc.cancel_animation();
            }
        }
        target
    }

    fn end_touches(&self, kind: MultiTouchType, count: usize) {
        let mut tree = self.tree.lock();
        match kind {
            MultiTouchType::End => {
                tree.active_touches = tree.active_touches.saturating_sub(count);
            },
            MultiTouchType::Cancel => tree.active_touches = 0,
            MultiTouchType::Start | MultiTouchType::Move => return,
        }
        if tree.active_touches == 0 {
            tree.input_target = None;
        }
    }

    fn route_gesture_block(
        &self,
        point: ScreenPoint,
        starts: bool,
        ends: bool,
        event: &mut InputData,
    ) -> InputEventResult {
        let target = {
            let mut tree = self.tree.lock();
            if starts || tree.input_target.is_none() {
                tree.input_target = None;
                if let Some(index) = tree.hit_test(point) {
                    tree.start_input_block(index);
                }
            }
            tree.current_target()
        };
        let result = match target {
            Some((apzc, to_apzc)) => self.deliver(&apzc, &to_apzc, event),
            None => InputEventResult::ignored(),
        };
        if ends {
            self.tree.lock().input_target = None;
        }
        result
    }

    /// Hands the displacement from `start` to `end`, in `previous`'s space, to the
    /// controller at `index` of the handoff chain.
    pub(crate) fn dispatch_scroll(
        &self,
        previous: &AsyncPanZoomController,
        start: ScreenPoint,
        end: ScreenPoint,
        index: usize,
    ) -> bool {
        let (next, start, end) = {
            let tree = self.tree.lock();
            let chain = tree.chain_for(previous);
            if chain.is_empty() {
                drop(tree);
                return index == 0 && previous.attempt_scroll(start, end, index);
            }
            let Some(next) = chain.get(index) else {
                return false;
            };
            if std::ptr::eq(Arc::as_ptr(&next), previous) {
                (next, start, end)
            } else {
                let from_previous = tree
                    .node_of(previous)
                    .map(|node| invert(&tree.input_transforms(node).0))
                    .unwrap_or_else(Transform3D::identity);
                let to_next = tree
                    .node_of(&next)
                    .map(|node| tree.input_transforms(node).0)
                    .unwrap_or_else(Transform3D::identity);
                let transform = from_previous.then(&to_next);
                (
                    next,
                    transform_point(&transform, start),
                    transform_point(&transform, end),
                )
            }
        };
        trace!("Dispatching scroll {:?} -> {:?} to chain index {}", start, end, index);
        next.attempt_scroll(start, end, index)
    }

    /// Offers the velocity left over from `previous`'s fling to the rest of its chain.
    /// Returns whether anyone took it.
    pub(crate) fn handoff_fling(
        &self,
        previous: &AsyncPanZoomController,
        velocity: ScreenVector,
    ) -> bool {
        let candidates: Vec<_> = {
            let tree = self.tree.lock();
            let Some(node) = tree.node_of(previous) else {
                return false;
            };
            let from_previous = invert(&tree.input_transforms(node).0);
            tree.build_handoff_chain(node)
                .after(previous)
                .into_iter()
                .map(|next| {
                    let to_next = tree
                        .node_of(&next)
                        .map(|node| tree.input_transforms(node).0)
                        .unwrap_or_else(Transform3D::identity);
                    let transform = from_previous.then(&to_next);
                    let velocity = transform_vector(&transform, ScreenPoint::origin(), velocity);
                    (next, velocity)
                })
                .collect()
        };
        candidates
            .into_iter()
            .any(|(apzc, velocity)| apzc.take_over_fling(velocity))
    }

    /// Lets every overscrolled controller of `previous`'s chain spring back.
    pub(crate) fn snap_back_overscrolled(&self, previous: &AsyncPanZoomController) {
        let chain = self.tree.lock().chain_for(previous);
        if chain.is_empty() {
            previous.snap_back_if_overscrolled();
            return;
        }
        for apzc in chain.controllers() {
            apzc.snap_back_if_overscrolled();
        }
    }

    /// Samples every controller for the frame composited at `sample_time`.
    pub fn sample_content_transforms(
        &self,
        sample_time: Instant,
    ) -> Vec<(ScrollableLayerGuid, SampledTransform)> {
        let apzcs: Vec<_> = {
            let tree = self.tree.lock();
            tree.apzcs
                .values()
                .filter_map(|&index| tree.apzc_at(index))
                .collect()
        };
        apzcs
            .into_iter()
            .map(|apzc| {
                let sampled = apzc.sample_content_transform_for_frame(sample_time);
                (apzc.guid(), sampled)
            })
            .collect()
    }

    /// Converts a screen point to CSS pixels of the content under it.
    pub fn transform_coordinate_to_content(&self, point: ScreenPoint) -> Option<CSSPoint> {
        let (apzc, to_apzc, to_content) = self.get_target_apzc(point)?;
        let point = transform_point(&to_apzc.then(&to_content), point);
        let metrics = apzc.frame_metrics();
        let origin = metrics.composition_bounds.origin;
        let zoom = metrics.zoom.get();
        Some(CSSPoint::new(
            (point.x - origin.x) / zoom,
            (point.y - origin.y) / zoom,
        ))
    }

    fn with_apzc(
        &self,
        guid: &ScrollableLayerGuid,
        callback: impl FnOnce(&AsyncPanZoomController),
    ) {
        match self.get_target_apzc_by_guid(guid) {
            Some(apzc) => callback(&apzc),
            None => debug!("No controller for {}", guid),
        }
    }

    pub fn content_received_touch(&self, guid: &ScrollableLayerGuid, prevent_default: bool) {
        self.with_apzc(guid, |apzc| apzc.content_received_touch(prevent_default));
    }

    pub fn set_allowed_touch_behavior(
        &self,
        guid: &ScrollableLayerGuid,
        behaviors: TouchBehaviorFlags,
    ) {
        self.with_apzc(guid, |apzc| apzc.set_allowed_touch_behavior(behaviors));
    }

    pub fn update_zoom_constraints(
        &self,
        guid: &ScrollableLayerGuid,
        constraints: ZoomConstraints,
    ) {
        self.with_apzc(guid, |apzc| apzc.update_zoom_constraints(constraints));
    }

    pub fn zoom_to_rect(&self, guid: &ScrollableLayerGuid, rect: CSSRect) {
        self.with_apzc(guid, |apzc| apzc.zoom_to_rect(rect));
    }

    pub fn cancel_animation(&self, guid: &ScrollableLayerGuid) {
        self.with_apzc(guid, |apzc| apzc.cancel_animation());
    }

    pub fn handle_message(&self, message: ApzMessage) {
        trace!("Handling {}", <&'static str>::from(&message));
        match message {
            ApzMessage::ContentReceivedTouch {
                guid,
                prevent_default,
            } => self.content_received_touch(&guid, prevent_default),
            ApzMessage::SetAllowedTouchBehavior { guid, behaviors } => {
                self.set_allowed_touch_behavior(&guid, behaviors)
            },
            ApzMessage::UpdateZoomConstraints { guid, constraints } => {
                self.update_zoom_constraints(&guid, constraints)
            },
            ApzMessage::ZoomToRect { guid, rect } => self.zoom_to_rect(&guid, rect),
            ApzMessage::CancelAnimation { guid } => self.cancel_animation(&guid),
        }
    }

    /// Handles every message waiting on `receiver` without blocking. Returns how many
    /// there were.
    pub fn process_messages(&self, receiver: &ApzReceiver) -> usize {
        let mut handled = 0;
        while let Some(message) = receiver.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }
}
