/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::{Arc, Weak};

use crate::controller::AsyncPanZoomController;

/// The controllers that may take over motion a gesture's target cannot absorb, starting
/// with the target itself and followed by its scrollable ancestors, innermost first.
///
/// The chain only holds weak handles: a controller removed by a tree update simply
/// drops out of it.
#[derive(Clone, Default)]
pub struct OverscrollHandoffChain {
    chain: Vec<Weak<AsyncPanZoomController>>,
}

impl OverscrollHandoffChain {
    pub(crate) fn new(chain: Vec<Weak<AsyncPanZoomController>>) -> Self {
        Self { chain }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// The controller at `index`, if it is still alive.
    pub fn get(&self, index: usize) -> Option<Arc<AsyncPanZoomController>> {
        self.chain.get(index).and_then(Weak::upgrade)
    }

    pub fn index_of(&self, apzc: &AsyncPanZoomController) -> Option<usize> {
        self.chain
            .iter()
            .position(|entry| std::ptr::eq(entry.as_ptr(), apzc))
    }

    /// The live controllers of the chain, in handoff order.
    pub fn controllers(&self) -> impl Iterator<Item = Arc<AsyncPanZoomController>> + '_ {
        self.chain.iter().filter_map(Weak::upgrade)
    }

    /// The live controllers that come after `apzc`.
    pub(crate) fn after(&self, apzc: &AsyncPanZoomController) -> Vec<Arc<AsyncPanZoomController>> {
        let start = self.index_of(apzc).map_or(self.chain.len(), |index| index + 1);
        self.chain[start..].iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn contains(&self, apzc: &AsyncPanZoomController) -> bool {
        self.index_of(apzc).is_some()
    }
}
