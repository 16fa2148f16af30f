use crate::state::Tool;

pub const DEFAULT_PENCIL_WIDTH: f32 = 5.0;
pub const DEFAULT_ERASER_WIDTH: f32 = 20.0;

/// Brush preferences for the current session. Nothing here outlives the
/// process.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub pencil_width: f32,
    pub eraser_width: f32,
    pub stroke_smoothing: bool, // 笔迹平滑
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pencil_width: DEFAULT_PENCIL_WIDTH,
            eraser_width: DEFAULT_ERASER_WIDTH,
            stroke_smoothing: true,
        }
    }
}

impl Settings {
    pub fn width_for(&self, tool: Tool) -> f32 {
        match tool {
            Tool::Pencil => self.pencil_width,
            Tool::Eraser => self.eraser_width,
        }
    }
}
