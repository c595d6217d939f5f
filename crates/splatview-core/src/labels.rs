//! Screen-space POI labels
//!
//! The engine decides where labels go and whether they show; drawing them
//! is up to whatever implements `LabelRenderer`.

use glam::Vec2;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u64);

pub trait LabelRenderer {
    /// Create a hidden label.
    fn create(&mut self, text: &str) -> LabelId;
    /// Move a label to pixel coordinates, origin top-left.
    fn place(&mut self, id: LabelId, screen: Vec2);
    fn set_visible(&mut self, id: LabelId, visible: bool);
    fn remove(&mut self, id: LabelId);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub screen: Vec2,
    pub visible: bool,
}

/// Retained set of labels that a UI layer paints every frame
#[derive(Debug, Clone, Default)]
pub struct LabelBoard {
    next_id: u64,
    labels: BTreeMap<LabelId, Label>,
}

impl LabelBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: LabelId) -> Option<&Label> {
        self.labels.get(&id)
    }

    /// Labels in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &Label)> {
        self.labels.iter().map(|(id, label)| (*id, label))
    }

    pub fn visible(&self) -> impl Iterator<Item = &Label> {
        self.labels.values().filter(|l| l.visible)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl LabelRenderer for LabelBoard {
    fn create(&mut self, text: &str) -> LabelId {
        let id = LabelId(self.next_id);
        self.next_id += 1;
        self.labels.insert(
            id,
            Label {
                text: text.to_string(),
                screen: Vec2::ZERO,
                visible: false,
            },
        );
        id
    }

    fn place(&mut self, id: LabelId, screen: Vec2) {
        if let Some(label) = self.labels.get_mut(&id) {
            label.screen = screen;
        }
    }

    fn set_visible(&mut self, id: LabelId, visible: bool) {
        if let Some(label) = self.labels.get_mut(&id) {
            label.visible = visible;
        }
    }

    fn remove(&mut self, id: LabelId) {
        self.labels.remove(&id);
    }
}
