#![warn(clippy::all, rust_2018_idioms)]

//! A freehand drawing canvas: pencil and eraser strokes over an optional
//! background image dropped onto the window, with undo and clear.

mod app;
pub mod background;
pub mod history;
pub mod settings;
pub mod state;
pub mod utils;

pub use app::App;
