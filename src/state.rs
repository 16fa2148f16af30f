use egui::{ColorImage, Pos2, Vec2};
use std::sync::Arc;

use crate::history::History;

// 工具类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tool {
    #[default]
    Pencil, // 铅笔
    Eraser, // 橡皮擦
}

// 已完成的笔画
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub tool: Tool,
    pub points: Vec<Pos2>,
}

// 正在绘制的笔画，只在拖动期间存在
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeBuilder {
    tool: Tool,
    points: Vec<Pos2>,
}

impl StrokeBuilder {
    pub fn new(tool: Tool, start: Pos2) -> Self {
        Self {
            tool,
            points: vec![start],
        }
    }

    pub fn push(&mut self, pos: Pos2) {
        self.points.push(pos);
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn points(&self) -> &[Pos2] {
        &self.points
    }

    pub fn finish(self) -> Stroke {
        Stroke {
            tool: self.tool,
            points: self.points,
        }
    }
}

/// A borrowed view of one stroke, committed or still being drawn.
#[derive(Clone, Copy, Debug)]
pub struct StrokeView<'a> {
    pub tool: Tool,
    pub points: &'a [Pos2],
}

// 已解码的背景图片
#[derive(Clone)]
pub struct BackgroundImage {
    /// Load generation the image was decoded for.
    pub generation: u64,
    pub file_name: String,
    pub image: Arc<ColorImage>,
}

impl std::fmt::Debug for BackgroundImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundImage")
            .field("generation", &self.generation)
            .field("file_name", &self.file_name)
            .field("size", &self.image.size)
            .finish()
    }
}

/// Everything the drawing surface owns. Each event handler is a plain
/// transition on this struct so it can be driven without a window.
#[derive(Debug, Default)]
pub struct CanvasState {
    pub tool: Tool,
    strokes: Vec<Stroke>,
    active: Option<StrokeBuilder>,
    history: History,
    file_name: Option<String>,
    background: Option<BackgroundImage>,
    surface_size: Vec2,
}

impl CanvasState {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            ..Default::default()
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn active_stroke(&self) -> Option<&StrokeBuilder> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Committed strokes in drawing order, followed by the one in progress.
    pub fn visible_strokes(&self) -> impl Iterator<Item = StrokeView<'_>> {
        self.strokes
            .iter()
            .map(|stroke| StrokeView {
                tool: stroke.tool,
                points: &stroke.points,
            })
            .chain(self.active.iter().map(|active| StrokeView {
                tool: active.tool(),
                points: active.points(),
            }))
    }

    pub fn visible_stroke_count(&self) -> usize {
        self.strokes.len() + usize::from(self.active.is_some())
    }

    pub fn pointer_down(&mut self, pos: Pos2) {
        // A second press without a release leaves the earlier stroke on the
        // canvas without recording a snapshot for it.
        if let Some(previous) = self.active.take() {
            log::debug!("pointer pressed again mid-stroke, keeping previous stroke");
            self.strokes.push(previous.finish());
        }
        self.active = Some(StrokeBuilder::new(self.tool, pos));
    }

    pub fn pointer_move(&mut self, pos: Pos2) {
        if let Some(active) = self.active.as_mut() {
            active.push(pos);
        }
    }

    /// Ends the drag and records a snapshot. A release without a drag still
    /// records one, so a stray release adds a step for undo to consume.
    pub fn pointer_up(&mut self) {
        if let Some(active) = self.active.take() {
            self.strokes.push(active.finish());
        }
        self.history.push(self.strokes.clone());
    }

    pub fn undo(&mut self) {
        if self.history.is_empty() {
            return;
        }
        self.active = None;
        if let Some(restored) = self.history.undo() {
            log::debug!(
                "undo: {} strokes restored, {} snapshots left",
                restored.len(),
                self.history.len()
            );
            self.strokes = restored;
        }
    }

    pub fn clear(&mut self) {
        log::debug!("clearing {} strokes", self.strokes.len());
        self.active = None;
        self.strokes.clear();
        self.history.clear();
    }

    pub fn surface_size(&self) -> Vec2 {
        self.surface_size
    }

    /// Tracks the size of the container. Returns `true` when it changed.
    pub fn resize(&mut self, size: Vec2) -> bool {
        if self.surface_size == size {
            return false;
        }
        log::debug!("surface resized from {:?} to {size:?}", self.surface_size);
        self.surface_size = size;
        true
    }

    /// Name of the accepted background file, set as soon as the drop is
    /// accepted and before decoding finishes.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn set_file(&mut self, name: String) {
        self.file_name = Some(name);
    }

    pub fn background(&self) -> Option<&BackgroundImage> {
        self.background.as_ref()
    }

    pub fn set_background(&mut self, background: BackgroundImage) {
        self.background = Some(background);
    }

    pub fn remove_background(&mut self) {
        self.file_name = None;
        self.background = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    fn draw(state: &mut CanvasState, points: &[Pos2]) {
        let mut iter = points.iter().copied();
        if let Some(first) = iter.next() {
            state.pointer_down(first);
        }
        for pos in iter {
            state.pointer_move(pos);
        }
        state.pointer_up();
    }

    #[test]
    fn drawing_without_release_keeps_one_stroke_and_no_history() {
        let mut state = CanvasState::default();
        state.pointer_down(pos2(0.0, 0.0));
        for i in 1..6 {
            state.pointer_move(pos2(i as f32, i as f32));
        }

        assert_eq!(state.visible_stroke_count(), 1);
        let strokes: Vec<_> = state.visible_strokes().collect();
        assert_eq!(strokes.first().map(|s| s.points.len()), Some(6));
        assert!(state.history().is_empty());
    }

    #[test]
    fn release_snapshots_current_strokes() {
        let mut state = CanvasState::default();
        draw(&mut state, &[pos2(0.0, 0.0), pos2(5.0, 5.0)]);
        draw(&mut state, &[pos2(10.0, 0.0), pos2(15.0, 5.0)]);

        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history().snapshots().last().map(Vec::as_slice), Some(state.strokes()));
    }

    #[test]
    fn stray_move_is_ignored() {
        let mut state = CanvasState::default();
        state.pointer_move(pos2(3.0, 3.0));

        assert_eq!(state.visible_stroke_count(), 0);
        assert!(state.history().is_empty());
    }

    #[test]
    fn stray_release_still_records_a_snapshot() {
        let mut state = CanvasState::default();
        draw(&mut state, &[pos2(0.0, 0.0), pos2(5.0, 5.0)]);
        let first = state.strokes().to_vec();

        state.pointer_up();
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.strokes(), first.as_slice());

        state.undo();

        assert_eq!(state.strokes(), first.as_slice());
        assert_eq!(state.history().snapshots(), &[first]);
    }

    #[test]
    fn strokes_remember_the_tool_they_were_drawn_with() {
        let mut state = CanvasState::new(Tool::Eraser);
        draw(&mut state, &[pos2(0.0, 0.0), pos2(1.0, 1.0)]);
        state.tool = Tool::Pencil;
        draw(&mut state, &[pos2(0.0, 0.0), pos2(1.0, 1.0)]);

        let tools: Vec<_> = state.strokes().iter().map(|s| s.tool).collect();
        assert_eq!(tools, vec![Tool::Eraser, Tool::Pencil]);
    }

    #[test]
    fn second_press_without_release_keeps_earlier_stroke() {
        let mut state = CanvasState::default();
        state.pointer_down(pos2(0.0, 0.0));
        state.pointer_move(pos2(1.0, 0.0));
        state.pointer_down(pos2(10.0, 10.0));
        state.pointer_up();

        assert_eq!(state.strokes().len(), 2);
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history().snapshots().first().map(Vec::len), Some(2));
    }

    #[test]
    fn undo_on_empty_history_is_a_no_op() {
        let mut state = CanvasState::default();
        state.pointer_down(pos2(0.0, 0.0));
        state.pointer_move(pos2(1.0, 1.0));

        state.undo();

        assert!(state.is_drawing());
        assert_eq!(state.visible_stroke_count(), 1);
        assert_eq!(state.active_stroke().map(|s| s.points().len()), Some(2));
        assert!(state.history().is_empty());
    }

    #[test]
    fn undo_with_single_snapshot_clears_everything() {
        let mut state = CanvasState::default();
        state.pointer_down(pos2(0.0, 0.0));
        state.pointer_down(pos2(5.0, 5.0));
        state.pointer_down(pos2(9.0, 9.0));
        state.pointer_up();
        assert_eq!(state.strokes().len(), 3);
        assert_eq!(state.history().len(), 1);

        state.undo();

        assert!(state.strokes().is_empty());
        assert!(state.history().is_empty());
    }

    #[test]
    fn undo_with_two_snapshots_restores_the_first() {
        let mut state = CanvasState::default();
        draw(&mut state, &[pos2(0.0, 0.0), pos2(5.0, 5.0)]);
        let first = state.strokes().to_vec();
        draw(&mut state, &[pos2(10.0, 0.0), pos2(15.0, 5.0)]);

        state.undo();

        assert_eq!(state.strokes(), first.as_slice());
        assert_eq!(state.history().snapshots(), &[first]);
    }

    #[test]
    fn undo_mid_drag_drops_the_unfinished_stroke() {
        let mut state = CanvasState::default();
        draw(&mut state, &[pos2(0.0, 0.0), pos2(5.0, 5.0)]);
        draw(&mut state, &[pos2(1.0, 0.0), pos2(6.0, 5.0)]);
        state.pointer_down(pos2(20.0, 20.0));

        state.undo();

        assert!(!state.is_drawing());
        assert_eq!(state.strokes().len(), 1);
    }

    #[test]
    fn clear_empties_strokes_and_history() {
        let mut state = CanvasState::default();
        draw(&mut state, &[pos2(0.0, 0.0), pos2(5.0, 5.0)]);
        draw(&mut state, &[pos2(1.0, 0.0), pos2(6.0, 5.0)]);
        state.pointer_down(pos2(2.0, 2.0));

        state.clear();

        assert_eq!(state.visible_stroke_count(), 0);
        assert!(state.history().is_empty());

        state.clear();
        assert_eq!(state.visible_stroke_count(), 0);
    }

    #[test]
    fn resize_reports_changes_only() {
        let mut state = CanvasState::default();
        assert!(state.resize(egui::vec2(800.0, 400.0)));
        assert!(!state.resize(egui::vec2(800.0, 400.0)));
        assert!(state.resize(egui::vec2(1024.0, 768.0)));
        assert_eq!(state.surface_size(), egui::vec2(1024.0, 768.0));
    }

    #[test]
    fn removing_background_keeps_strokes() {
        let mut state = CanvasState::default();
        draw(&mut state, &[pos2(0.0, 0.0), pos2(5.0, 5.0)]);
        state.set_file("photo.png".to_owned());
        state.set_background(BackgroundImage {
            generation: 1,
            file_name: "photo.png".to_owned(),
            image: Arc::new(ColorImage::from_rgba_unmultiplied([2, 2], &[255; 16])),
        });

        state.remove_background();

        assert!(state.background().is_none());
        assert!(state.file_name().is_none());
        assert_eq!(state.strokes().len(), 1);
        assert_eq!(state.history().len(), 1);
    }
}
