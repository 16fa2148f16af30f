use crate::state::Stroke;

/// Full copies of the stroke list, one per completed drag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    snapshots: Vec<Vec<Stroke>>,
}

impl History {
    pub fn push(&mut self, snapshot: Vec<Stroke>) {
        self.snapshots.push(snapshot);
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> &[Vec<Stroke>] {
        &self.snapshots
    }

    /// Drops the newest snapshot and returns the stroke list to restore:
    /// the snapshot before it, or an empty canvas if it was the only one.
    ///
    /// Returns `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Vec<Stroke>> {
        self.snapshots.pop()?;
        Some(self.snapshots.last().cloned().unwrap_or_default())
    }
}
