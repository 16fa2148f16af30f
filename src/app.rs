use crate::background::{BackgroundLoader, DroppedImage};
use crate::settings::Settings;
use crate::state::{CanvasState, Tool};
use crate::utils::{AppUtils, SURFACE_COLOR};
use egui::{Color32, Pos2, Rect, Stroke, TextureHandle, TextureOptions};

pub struct App {
    state: CanvasState,
    settings: Settings,
    loader: BackgroundLoader,
    background_texture: Option<(u64, TextureHandle)>, // 按加载代数缓存的纹理
    alert: Option<String>,                            // 拒绝文件时的提示
    files_hovered: bool,                              // 是否有文件悬停在窗口上
}

impl Default for App {
    fn default() -> Self {
        Self {
            state: CanvasState::new(Tool::default()),
            settings: Settings::default(),
            loader: BackgroundLoader::default(),
            background_texture: None,
            alert: None,
            files_hovered: false,
        }
    }
}

impl App {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        Self {
            loader: BackgroundLoader::new(&cc.egui_ctx),
            ..Default::default()
        }
    }

    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CanvasState {
        &mut self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The rejection notice currently blocking the canvas, if any.
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn is_loading_background(&self) -> bool {
        self.loader.is_loading()
    }

    /// Only the first file of a drop is looked at.
    pub fn handle_dropped_files(&mut self, files: &[egui::DroppedFile]) {
        let Some(file) = files.first() else {
            return;
        };
        if files.len() > 1 {
            log::debug!("{} files dropped, using the first", files.len());
        }
        let Some(image) = DroppedImage::from_dropped_file(file) else {
            log::warn!("dropped file {:?} has neither contents nor a path", file.name);
            return;
        };

        let name = image.name.clone();
        match self.loader.load(image) {
            Ok(_) => self.state.set_file(name),
            Err(err) => {
                log::warn!("rejected dropped file: {err}");
                self.alert = Some(err.to_string());
            }
        }
    }

    /// Forgets the dropped file and its background, cancelling a decode that
    /// is still running.
    pub fn delete_file(&mut self) {
        self.loader.cancel();
        self.state.remove_background();
        self.background_texture = None;
    }

    pub fn poll_background(&mut self) {
        if let Some(background) = self.loader.poll() {
            self.state.set_background(background);
        }
    }

    /// Blocks until the pending background load resolves. Returns whether a
    /// new background was installed.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn wait_for_background(&mut self, timeout: std::time::Duration) -> bool {
        match self.loader.wait(timeout) {
            Some(background) => {
                self.state.set_background(background);
                true
            }
            None => false,
        }
    }

    /// Runs one frame of the UI without needing an `eframe::Frame`.
    pub fn ui(&mut self, ctx: &egui::Context) {
        self.poll_background();

        let (dropped, hovered) = ctx.input(|i| {
            (
                i.raw.dropped_files.clone(),
                !i.raw.hovered_files.is_empty(),
            )
        });
        self.files_hovered = hovered;
        if !dropped.is_empty() {
            self.handle_dropped_files(&dropped);
        }

        // Toolbar window
        let content_rect = ctx.available_rect();
        let margin = 20.0;

        egui::Window::new("Sketchpad")
            .resizable(false)
            .pivot(egui::Align2::CENTER_BOTTOM)
            .default_pos([content_rect.center().x, content_rect.max.y - margin])
            .show(ctx, |ui| {
                self.render_toolbar(ui);
            });

        // Main canvas area
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.render_canvas(ui);
            });

        self.render_alert(ctx);
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui(ctx);
    }
}

impl App {
    fn render_toolbar(&mut self, ui: &mut egui::Ui) {
        // Tool selection
        ui.horizontal(|ui| {
            ui.label("Tool:");
            ui.selectable_value(&mut self.state.tool, Tool::Pencil, "Pencil");
            ui.selectable_value(&mut self.state.tool, Tool::Eraser, "Eraser");

            ui.separator();

            if ui
                .add_enabled(!self.state.history().is_empty(), egui::Button::new("Undo"))
                .clicked()
            {
                self.state.undo();
            }
            if ui.button("Clear all").clicked() {
                self.state.clear();
            }
        });

        ui.separator();

        self.render_drop_zone(ui);

        ui.collapsing("Settings", |ui| {
            ui.horizontal(|ui| {
                ui.label("Pencil width:");
                ui.add(egui::Slider::new(&mut self.settings.pencil_width, 1.0..=30.0));
            });
            ui.horizontal(|ui| {
                ui.label("Eraser width:");
                ui.add(egui::Slider::new(&mut self.settings.eraser_width, 5.0..=80.0));
            });
            ui.checkbox(&mut self.settings.stroke_smoothing, "Smooth strokes");
        });
    }

    fn render_drop_zone(&mut self, ui: &mut egui::Ui) {
        let border = if self.files_hovered {
            ui.visuals().selection.stroke.color
        } else {
            ui.visuals().widgets.noninteractive.bg_stroke.color
        };

        let mut delete = false;
        egui::Frame::group(ui.style())
            .stroke(Stroke::new(1.0, border))
            .show(ui, |ui| {
                ui.set_min_width(240.0);
                match self.state.file_name() {
                    Some(name) => {
                        ui.horizontal(|ui| {
                            ui.label(name);
                            if self.loader.is_loading() {
                                ui.spinner();
                            }
                            delete = ui.button("Delete").clicked();
                        });
                    }
                    None => {
                        ui.label("Drop a JPEG or PNG image here");
                    }
                }
            });

        if delete {
            self.delete_file();
        }
    }

    fn render_canvas(&mut self, ui: &mut egui::Ui) {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
        self.state.resize(rect.size());

        // Handle mouse input
        if self.alert.is_none() {
            let to_surface = |pos: Pos2| (pos - rect.min).to_pos2();

            if response.drag_started() {
                let origin = ui
                    .input(|i| i.pointer.press_origin())
                    .or(response.interact_pointer_pos());
                if let Some(pos) = origin {
                    self.state.pointer_down(to_surface(pos));
                }
            }
            if response.dragged() && response.drag_delta() != egui::Vec2::ZERO {
                if let Some(pos) = response.interact_pointer_pos() {
                    self.state.pointer_move(to_surface(pos));
                }
            }
            // A press without movement is a stroke with a single point.
            if response.clicked() {
                if let Some(pos) = response.interact_pointer_pos() {
                    self.state.pointer_down(to_surface(pos));
                    self.state.pointer_up();
                }
            }
        }
        // A drag that began before a notice opened still has to end.
        if response.drag_stopped() {
            self.state.pointer_up();
        }

        let background = self.background_texture_id(ui.ctx());
        let painter = ui.painter_at(rect);

        // Draw background
        painter.rect_filled(rect, 0.0, SURFACE_COLOR);
        if let Some(texture) = background {
            painter.image(
                texture,
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        // Draw strokes, oldest first
        for stroke in self.state.visible_strokes() {
            AppUtils::paint_stroke(&painter, stroke, &self.settings, rect);
        }

        if self.state.tool == Tool::Eraser {
            if let Some(pos) = response.hover_pos() {
                AppUtils::draw_size_preview(&painter, pos, self.settings.eraser_width);
            }
        }
    }

    /// Uploads the decoded background once per load generation.
    fn background_texture_id(&mut self, ctx: &egui::Context) -> Option<egui::TextureId> {
        let Some(background) = self.state.background() else {
            self.background_texture = None;
            return None;
        };

        match &self.background_texture {
            Some((generation, handle)) if *generation == background.generation => {
                Some(handle.id())
            }
            _ => {
                let handle = ctx.load_texture(
                    format!("background-{}", background.generation),
                    (*background.image).clone(),
                    TextureOptions::LINEAR,
                );
                let id = handle.id();
                self.background_texture = Some((background.generation, handle));
                Some(id)
            }
        }
    }

    fn render_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.alert.clone() else {
            return;
        };

        let modal = egui::Modal::new(egui::Id::new("rejected_file")).show(ctx, |ui| {
            ui.heading("Unsupported file");
            ui.label(message);
            ui.add_space(8.0);
            ui.button("OK").clicked()
        });

        if modal.inner || modal.should_close() {
            self.dismiss_alert();
        }
    }
}
