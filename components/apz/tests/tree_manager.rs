/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use std::sync::Arc;

use apz::{ApzMessage, ApzcTreeManager, AsyncPanZoomController, PanZoomState, apz_channel};
use apz_traits::{
    CSSPoint, EventStatus, InputData, LayerNode, MultiTouchType, ScreenPoint, ScrollDeltaType,
    ScrollMode, ScrollWheelInput, ScrollableLayerGuid, ViewId, ZoomConstraints, transform_point,
};
use euclid::Scale;
use euclid::default::Transform3D;
use keyboard_types::Modifiers;

use crate::common::{Harness, MockContentController, layer_rect, metrics, point, touch};

fn manager(harness: &Harness) -> Arc<ApzcTreeManager> {
    let manager = ApzcTreeManager::new(harness.context.clone());
    manager.register_content_controller(0, harness.content_controller());
    manager
}

fn scroll_layer(scroll_id: ViewId, width: f32, height: f32, scrollable: (f32, f32)) -> LayerNode {
    LayerNode::new(layer_rect(0.0, 0.0, width, height))
        .with_metrics(metrics(scroll_id, (width, height), scrollable))
}

fn guid(scroll_id: ViewId) -> ScrollableLayerGuid {
    ScrollableLayerGuid::new(0, 0, scroll_id)
}

fn target_at(manager: &ApzcTreeManager, at: ScreenPoint) -> Option<ViewId> {
    manager
        .get_target_apzc(at)
        .map(|(apzc, _, _)| apzc.guid().scroll_id)
}

fn apzc(manager: &ApzcTreeManager, scroll_id: ViewId) -> Arc<AsyncPanZoomController> {
    manager
        .get_target_apzc_by_guid(&guid(scroll_id))
        .expect("no controller for scroll id")
}

fn assert_near(actual: ScreenPoint, expected: ScreenPoint) {
    assert!(
        (actual - expected).length() < 0.001,
        "{:?} != {:?}",
        actual,
        expected
    );
}

/// A page that scrolls vertically, with a shorter scrollable box over its top half.
fn page_with_box(box_transform: Transform3D<f32>) -> LayerNode {
    scroll_layer(1, 100.0, 100.0, (100.0, 1000.0))
        .with_child(scroll_layer(2, 100.0, 50.0, (100.0, 80.0)).with_transform(box_transform))
}

#[test]
fn front_most_layer_wins_the_hit_test() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let root = scroll_layer(1, 100.0, 100.0, (100.0, 1000.0))
        .with_child(scroll_layer(2, 100.0, 100.0, (100.0, 500.0)))
        .with_child(scroll_layer(3, 50.0, 50.0, (50.0, 500.0)));
    manager.update_pan_zoom_controller_tree(Some(&root), true, 0, 1);

    assert_eq!(target_at(&manager, point(10.0, 10.0)), Some(3));
    assert_eq!(target_at(&manager, point(70.0, 70.0)), Some(2));
    assert_eq!(target_at(&manager, point(150.0, 10.0)), None);
}

#[test]
fn overlapping_corner_goes_to_the_later_sibling() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let root = scroll_layer(1, 100.0, 100.0, (100.0, 1000.0))
        .with_child(scroll_layer(2, 60.0, 60.0, (60.0, 500.0)))
        .with_child(
            scroll_layer(3, 60.0, 60.0, (60.0, 500.0))
                .with_transform(Transform3D::translation(40.0, 40.0, 0.0)),
        );
    manager.update_pan_zoom_controller_tree(Some(&root), true, 0, 1);

    assert_eq!(target_at(&manager, point(50.0, 50.0)), Some(3));
    assert_eq!(target_at(&manager, point(59.0, 59.0)), Some(3));
    assert_eq!(target_at(&manager, point(90.0, 90.0)), Some(3));
    assert_eq!(target_at(&manager, point(10.0, 10.0)), Some(2));
    assert_eq!(target_at(&manager, point(50.0, 20.0)), Some(2));
    assert_eq!(target_at(&manager, point(90.0, 10.0)), Some(1));
}

#[test]
fn layer_that_does_not_scroll_hands_hits_to_its_scrollable_ancestor() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let root = page_with_box(Transform3D::identity())
        .with_child(LayerNode::new(layer_rect(0.0, 0.0, 100.0, 100.0)));
    manager.update_pan_zoom_controller_tree(Some(&root), true, 0, 1);

    assert_eq!(target_at(&manager, point(10.0, 10.0)), Some(1));
}

#[test]
fn controllers_follow_their_scroll_frames_across_updates() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::identity());
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);
    let root = apzc(&manager, 1);
    let scroll_box = apzc(&manager, 2);

    manager.update_pan_zoom_controller_tree(Some(&tree), false, 0, 2);
    assert!(Arc::ptr_eq(&root, &apzc(&manager, 1)));
    assert!(Arc::ptr_eq(&scroll_box, &apzc(&manager, 2)));

    let without_box = scroll_layer(1, 100.0, 100.0, (100.0, 1000.0));
    manager.update_pan_zoom_controller_tree(Some(&without_box), false, 0, 3);
    assert!(manager.get_target_apzc_by_guid(&guid(2)).is_none());
    assert!(scroll_box.is_destroyed());
    assert!(!root.is_destroyed());
    assert!(Arc::ptr_eq(&root, &apzc(&manager, 1)));

    manager.clear_tree();
    assert!(root.is_destroyed());
    assert_eq!(target_at(&manager, point(10.0, 10.0)), None);
}

#[test]
fn nested_layer_trees_use_their_own_content_controller() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let nested_content = MockContentController::new(harness.clock.clone());
    manager.register_content_controller(7, nested_content.clone());

    let tree = scroll_layer(1, 100.0, 100.0, (100.0, 1000.0)).with_child(
        LayerNode::new(layer_rect(0.0, 0.0, 100.0, 50.0))
            .with_layers_id(7)
            .with_child(scroll_layer(2, 100.0, 50.0, (100.0, 80.0))),
    );
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 7, 1);

    let nested = manager
        .get_target_apzc_by_guid(&ScrollableLayerGuid::new(7, 0, 2))
        .expect("nested controller");
    assert_eq!(nested.layers_id(), 7);
    assert!(manager.get_target_apzc_by_guid(&guid(2)).is_none());

    let mut event = touch(MultiTouchType::Start, harness.at(0), point(10.0, 10.0));
    manager.receive_input_event(&mut event);
    assert!(!nested_content.state_changes.lock().is_empty());
    assert!(harness.content.state_changes.lock().is_empty());
}

#[test]
fn handoff_chain_runs_from_the_target_to_the_root() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::identity());
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);
    let root = apzc(&manager, 1);
    let scroll_box = apzc(&manager, 2);

    let chain = manager.build_overscroll_handoff_chain(&scroll_box);
    assert_eq!(chain.len(), 2);
    assert!(chain.get(0).is_some_and(|first| Arc::ptr_eq(&first, &scroll_box)));
    assert!(chain.get(1).is_some_and(|second| Arc::ptr_eq(&second, &root)));
    assert_eq!(chain.index_of(&root), Some(1));
    manager.clear_overscroll_handoff_chain();
}

#[test]
fn scroll_the_target_cannot_absorb_goes_to_its_ancestor() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::identity());
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);

    let events = [
        touch(MultiTouchType::Start, harness.at(0), point(10.0, 40.0)),
        touch(MultiTouchType::Move, harness.at(10), point(10.0, 20.0)),
        touch(MultiTouchType::Move, harness.at(20), point(10.0, 0.0)),
    ];
    for mut event in events {
        let result = manager.receive_input_event(&mut event);
        assert_eq!(result.status, EventStatus::Consumed);
        assert_eq!(result.target_guid, Some(guid(2)));
    }

    let offset = |scroll_id| apzc(&manager, scroll_id).frame_metrics().scroll_offset;
    assert_eq!(offset(2), CSSPoint::new(0.0, 30.0));
    assert_eq!(offset(1), CSSPoint::new(0.0, 10.0));
}

#[test]
fn input_transforms_undo_layer_and_async_transforms() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::translation(0.0, 50.0, 0.0));
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);

    let mut wheel = InputData::ScrollWheel(ScrollWheelInput {
        delta_type: ScrollDeltaType::Pixel,
        scroll_mode: ScrollMode::Instant,
        origin: point(10.0, 10.0),
        delta_x: 0.0,
        delta_y: 20.0,
        time: harness.at(0),
        modifiers: Modifiers::empty(),
    });
    let result = manager.receive_input_event(&mut wheel);
    assert_eq!(result.target_guid, Some(guid(1)));
    let root_offset = apzc(&manager, 1).frame_metrics().scroll_offset;
    assert_eq!(root_offset, CSSPoint::new(0.0, 20.0));

    // The box moved up with the page, so it is now under this point.
    let (target, to_apzc, to_content) = manager
        .get_target_apzc(point(10.0, 60.0))
        .expect("hit the box");
    assert_eq!(target.guid(), guid(2));
    assert_near(transform_point(&to_apzc, point(10.0, 60.0)), point(10.0, 30.0));
    // Content has been asked to paint the page scrolled, so the point is where it
    // will be in the next paint.
    assert_near(
        transform_point(&to_apzc.then(&to_content), point(10.0, 60.0)),
        point(10.0, 60.0),
    );
}

#[test]
fn new_touch_stops_the_flinging_ancestor() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::identity());
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);
    let root = apzc(&manager, 1);

    for (ms, y, kind) in [
        (0, 90.0, MultiTouchType::Start),
        (10, 75.0, MultiTouchType::Move),
        (20, 60.0, MultiTouchType::Move),
    ] {
        manager.receive_input_event(&mut touch(kind, harness.at(ms), point(10.0, y)));
    }
    harness.clock.set(harness.at(30));
    let mut lifted = touch(MultiTouchType::End, harness.at(30), point(10.0, 60.0));
    manager.receive_input_event(&mut lifted);
    assert_eq!(root.state(), PanZoomState::Fling);

    let mut event = touch(MultiTouchType::Start, harness.at(40), point(10.0, 10.0));
    let result = manager.receive_input_event(&mut event);
    assert_eq!(result.target_guid, Some(guid(2)));
    assert_eq!(root.state(), PanZoomState::Nothing);
}

#[test]
fn fling_that_reaches_the_edge_continues_on_the_ancestor() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::identity());
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);
    let root = apzc(&manager, 1);
    let scroll_box = apzc(&manager, 2);

    for (ms, y, kind) in [
        (0, 48.0, MultiTouchType::Start),
        (10, 38.0, MultiTouchType::Move),
        (20, 28.0, MultiTouchType::Move),
    ] {
        manager.receive_input_event(&mut touch(kind, harness.at(ms), point(10.0, y)));
    }
    harness.clock.set(harness.at(30));
    let mut lifted = touch(MultiTouchType::End, harness.at(30), point(10.0, 28.0));
    manager.receive_input_event(&mut lifted);
    assert_eq!(scroll_box.state(), PanZoomState::Fling);
    assert_eq!(scroll_box.frame_metrics().scroll_offset, CSSPoint::new(0.0, 20.0));

    manager.sample_content_transforms(harness.at(46));
    assert_eq!(scroll_box.state(), PanZoomState::Nothing);
    assert_eq!(scroll_box.frame_metrics().scroll_offset, CSSPoint::new(0.0, 30.0));
    assert!(!scroll_box.is_overscrolled());
    assert_eq!(root.state(), PanZoomState::Fling);
    assert!(root.velocity().y > 0.0);

    manager.sample_content_transforms(harness.at(62));
    let root_offset = root.frame_metrics().scroll_offset.y;
    assert!(root_offset > 0.0);
    manager.sample_content_transforms(harness.at(78));
    assert!(root.frame_metrics().scroll_offset.y > root_offset);
    assert_eq!(scroll_box.state(), PanZoomState::Nothing);
}

#[test]
fn messages_reach_their_controllers() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::identity());
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);
    let (proxy, receiver) = apz_channel();

    proxy.send(ApzMessage::UpdateZoomConstraints {
        guid: guid(1),
        constraints: ZoomConstraints {
            allow_zoom: false,
            ..Default::default()
        },
    });
    proxy.send(ApzMessage::CancelAnimation { guid: guid(2) });
    proxy.send(ApzMessage::ContentReceivedTouch {
        guid: guid(42),
        prevent_default: true,
    });

    assert_eq!(manager.process_messages(&receiver), 3);
    assert!(!apzc(&manager, 1).zoom_constraints().allow_zoom);
    assert!(apzc(&manager, 2).zoom_constraints().allow_zoom);
    assert_eq!(manager.process_messages(&receiver), 0);
}

#[test]
fn every_controller_is_sampled() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let tree = page_with_box(Transform3D::identity());
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);

    let mut sampled: Vec<_> = manager
        .sample_content_transforms(harness.at(16))
        .into_iter()
        .map(|(guid, sampled)| (guid.scroll_id, sampled.animating))
        .collect();
    sampled.sort();
    assert_eq!(sampled, vec![(1, false), (2, false)]);
}

#[test]
fn screen_points_convert_to_content_pixels() {
    let harness = Harness::new();
    let manager = manager(&harness);
    let mut zoomed = metrics(1, (100.0, 100.0), (1000.0, 1000.0));
    zoomed.zoom = Scale::new(2.0);
    let tree = LayerNode::new(layer_rect(0.0, 0.0, 100.0, 100.0)).with_metrics(zoomed);
    manager.update_pan_zoom_controller_tree(Some(&tree), true, 0, 1);

    assert_eq!(
        manager.transform_coordinate_to_content(point(20.0, 40.0)),
        Some(CSSPoint::new(10.0, 20.0))
    );
    assert_eq!(manager.transform_coordinate_to_content(point(500.0, 500.0)), None);
}
