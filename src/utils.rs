use egui::epaint::Mesh;
use egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2};

use crate::settings::Settings;
use crate::state::{StrokeView, Tool};

// 画布底色
pub const SURFACE_COLOR: Color32 = Color32::WHITE;
pub const PENCIL_COLOR: Color32 = Color32::BLACK;

const DISC_SEGMENTS: usize = 16;
const SMOOTHING_ITERATIONS: usize = 2;

pub struct AppUtils;

impl AppUtils {
    // 笔画平滑算法 - Chaikin 切角，保留首尾点
    pub fn apply_stroke_smoothing(points: &[Pos2]) -> Vec<Pos2> {
        if points.len() < 3 {
            return points.to_vec();
        }

        let mut smoothed = points.to_vec();
        for _ in 0..SMOOTHING_ITERATIONS {
            let mut next = Vec::with_capacity(smoothed.len() * 2);
            next.extend(smoothed.first().copied());

            for pair in smoothed.windows(2) {
                let &[p0, p1] = pair else { continue };
                next.push(p0.lerp(p1, 0.25));
                next.push(p0.lerp(p1, 0.75));
            }

            next.extend(smoothed.last().copied());
            smoothed = next;
        }
        smoothed
    }

    /// Triangulates a polyline of the given width with round joins and caps.
    ///
    /// Fewer than two points yield an empty mesh.
    pub fn stroke_mesh(points: &[Pos2], width: f32, color: Color32) -> Mesh {
        let mut mesh = Mesh::default();
        if points.len() < 2 {
            return mesh;
        }
        let radius = width / 2.0;

        for pair in points.windows(2) {
            let &[a, b] = pair else { continue };
            let along = b - a;
            if along.length_sq() < 1e-6 {
                continue;
            }
            let normal = along.normalized().rot90() * radius;
            let base = Self::push(&mut mesh, color, a + normal);
            Self::push(&mut mesh, color, a - normal);
            Self::push(&mut mesh, color, b - normal);
            Self::push(&mut mesh, color, b + normal);
            mesh.add_triangle(base, base + 1, base + 2);
            mesh.add_triangle(base, base + 2, base + 3);
        }

        for &center in points {
            Self::add_disc(&mut mesh, color, center, radius);
        }
        mesh
    }

    fn add_disc(mesh: &mut Mesh, color: Color32, center: Pos2, radius: f32) {
        let center_idx = Self::push(mesh, color, center);
        for i in 0..DISC_SEGMENTS {
            let angle = std::f32::consts::TAU * i as f32 / DISC_SEGMENTS as f32;
            Self::push(mesh, color, center + Vec2::angled(angle) * radius);
        }
        for i in 0..DISC_SEGMENTS as u32 {
            let current = center_idx + 1 + i;
            let next = center_idx + 1 + (i + 1) % DISC_SEGMENTS as u32;
            mesh.add_triangle(center_idx, current, next);
        }
    }

    fn push(mesh: &mut Mesh, color: Color32, pos: Pos2) -> u32 {
        let idx = mesh.vertices.len() as u32;
        mesh.colored_vertex(pos, color);
        idx
    }

    /// Geometry for one stroke on a surface whose top-left corner is at
    /// `surface.min`. Stroke points are in surface coordinates.
    ///
    /// The eraser paints the blank surface colour over everything beneath it,
    /// ink and background image alike.
    pub fn stroke_geometry(stroke: StrokeView<'_>, settings: &Settings, surface: Rect) -> Mesh {
        let points = if settings.stroke_smoothing {
            Self::apply_stroke_smoothing(stroke.points)
        } else {
            stroke.points.to_vec()
        };
        let color = match stroke.tool {
            Tool::Pencil => PENCIL_COLOR,
            Tool::Eraser => SURFACE_COLOR,
        };

        let mut mesh = Self::stroke_mesh(&points, settings.width_for(stroke.tool), color);
        mesh.translate(surface.min.to_vec2());
        mesh
    }

    pub fn paint_stroke(painter: &Painter, stroke: StrokeView<'_>, settings: &Settings, surface: Rect) {
        let mesh = Self::stroke_geometry(stroke, settings, surface);
        if !mesh.is_empty() {
            painter.add(egui::Shape::Mesh(mesh.into()));
        }
    }

    // 橡皮擦光标预览
    pub fn draw_size_preview(painter: &Painter, pos: Pos2, size: f32) {
        const SIZE_PREVIEW_BORDER_WIDTH: f32 = 1.0;
        painter.circle_stroke(
            pos,
            size / 2.0,
            Stroke::new(SIZE_PREVIEW_BORDER_WIDTH, Color32::DARK_GRAY),
        );
    }
}
