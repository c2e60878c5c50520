use std::collections::HashMap;

use kurbo::{Affine, BezPath, Circle, Point, Rect, RoundedRect, Shape as _};

use crate::{
    capture::{BACKGROUND_RGB, CAPTURE_PIXEL_RATIO},
    error::LifelineResult,
    layout::{
        ACTOR_BOX_HEIGHT, ACTOR_BOX_WIDTH, ACTOR_Y, ARROW_INSET, MessageShape, SELF_LOOP_HEIGHT,
        SELF_LOOP_WIDTH, SceneLayout, StepMarkerState, layout_scene,
    },
    model::Diagram,
    session::PlaybackMode,
    surface::{CaptureSurface, FrameRgba},
};

/// Scene units to logical pixels, before the content scale and the capture
/// pixel ratio are applied.
const UNITS_TO_PX: f64 = 56.0;

// Straight-alpha RGBA palette.
const COLOR_BACKGROUND: [u8; 4] = [BACKGROUND_RGB[0], BACKGROUND_RGB[1], BACKGROUND_RGB[2], 255];
// Faint enough that blended grid lines stay below the capture classifier's
// color tolerance and edge threshold, including where two lines cross and
// blend twice.
const COLOR_GRID: [u8; 4] = [56, 189, 248, 3];
const COLOR_ACTOR_BOX: [u8; 4] = [30, 58, 138, 255];
const COLOR_ACTOR_BOX_ACTIVE: [u8; 4] = [37, 99, 235, 255];
const COLOR_ACTOR_LABEL: [u8; 4] = [226, 232, 240, 255];
const COLOR_LIFELINE: [u8; 4] = [71, 85, 105, 153];
const COLOR_LIFELINE_ACTIVE: [u8; 4] = [56, 189, 248, 230];
const COLOR_ARROW: [u8; 4] = [147, 197, 253, 255];
const COLOR_ARROW_ACTIVE: [u8; 4] = [103, 232, 249, 255];
const COLOR_ARROW_GLOW: [u8; 4] = [56, 189, 248, 50];
const COLOR_ARROW_GLOW_ACTIVE: [u8; 4] = [34, 211, 238, 90];
const COLOR_PILL_BG: [u8; 4] = [15, 23, 42, 166];
const COLOR_PILL_TEXT: [u8; 4] = [203, 213, 225, 255];
const COLOR_PILL_TEXT_ACTIVE: [u8; 4] = [226, 248, 255, 255];
const COLOR_MARKER_DONE: [u8; 4] = [59, 130, 246, 255];
const COLOR_MARKER_CURRENT: [u8; 4] = [34, 211, 238, 255];
const COLOR_MARKER_PENDING: [u8; 4] = [30, 41, 59, 255];

const LIFELINE_HALF_WIDTH: f64 = 0.035;
const ARROW_HALF_WIDTH: f64 = 0.03;
const ARROW_GLOW_HALF_WIDTH: f64 = 0.09;
const ARROW_HEAD_LENGTH: f64 = 0.4;
const ARROW_HEAD_HALF_WIDTH: f64 = 0.15;

/// RGBA8 brush color carried through Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Interactive chrome insets around the canvas. The capture layout override
/// zeroes them so exports see the full, unclipped scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChromeInsets {
    pub left: f64,
    pub right: f64,
}

impl Default for ChromeInsets {
    fn default() -> Self {
        Self {
            left: 320.0,
            right: 280.0,
        }
    }
}

/// Canvas configuration for the scene renderer.
#[derive(Clone, Debug)]
pub struct SceneOptions {
    /// Logical canvas size; the rasterized frame is this times
    /// `pixel_ratio`.
    pub width: u32,
    pub height: u32,
    /// Pixel density multiplier applied when rasterizing.
    pub pixel_ratio: f64,
    pub chrome: ChromeInsets,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 960,
            pixel_ratio: CAPTURE_PIXEL_RATIO,
            chrome: ChromeInsets::default(),
        }
    }
}

/// CPU rendering surface for a diagram: paints actors, lifelines, messages,
/// and the step-indicator overlay for a given playback position.
///
/// Implements [`CaptureSurface`]; capture rasterization omits
/// export-excluded elements (the overlay) and honors the temporary layout
/// expansion the export controller applies.
pub struct SceneRenderer {
    diagram: Diagram,
    mode: PlaybackMode,
    step: i32,
    opts: SceneOptions,
    expanded: bool,
    text: TextShaper,
    font_cache: HashMap<(u64, u32), vello_cpu::peniko::FontData>,
}

impl SceneRenderer {
    pub fn new(diagram: Diagram, opts: SceneOptions) -> Self {
        Self {
            diagram,
            mode: PlaybackMode::Static,
            step: -1,
            opts,
            expanded: false,
            text: TextShaper::new(),
            font_cache: HashMap::new(),
        }
    }

    pub fn set_diagram(&mut self, diagram: Diagram) {
        self.diagram = diagram;
    }

    /// Render the interactive view, overlay included.
    pub fn render_preview(&mut self) -> LifelineResult<Option<FrameRgba>> {
        self.render(true)
    }

    fn render(&mut self, include_excluded: bool) -> LifelineResult<Option<FrameRgba>> {
        let ratio = self.opts.pixel_ratio;
        let pw = (f64::from(self.opts.width) * ratio).round() as i64;
        let ph = (f64::from(self.opts.height) * ratio).round() as i64;
        // vello_cpu pixmaps are u16-sized; anything outside that range means
        // no drawing context can be produced for this capture.
        let (Ok(w16), Ok(h16)) = (u16::try_from(pw), u16::try_from(ph)) else {
            return Ok(None);
        };
        if w16 == 0 || h16 == 0 {
            return Ok(None);
        }

        let layout = layout_scene(&self.diagram, self.mode, self.step);
        let to_px = self.world_transform(&layout, pw as f64, ph as f64, ratio);

        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        clear_pixmap(&mut pixmap, premul_rgba8(COLOR_BACKGROUND));
        let mut ctx = vello_cpu::RenderContext::new(w16, h16);

        // Opaque scene background underneath everything else.
        ctx.set_transform(affine_to_cpu(Affine::IDENTITY));
        ctx.set_paint(color(COLOR_BACKGROUND));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, pw as f64, ph as f64));

        self.draw_grid(&mut ctx, pw as f64, ph as f64, ratio);
        self.draw_lifelines(&mut ctx, &layout, to_px);
        self.draw_messages(&mut ctx, &layout, to_px, ratio);
        self.draw_actor_boxes(&mut ctx, &layout, to_px, ratio);
        if include_excluded {
            self.draw_overlay(&mut ctx, &layout, pw as f64, ph as f64, ratio);
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        Ok(Some(FrameRgba {
            width: pw as u32,
            height: ph as u32,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        }))
    }

    /// World (scene units, y up) to pixel (y down) mapping. Interactive
    /// chrome shifts the visible center unless the capture expansion is in
    /// effect.
    fn world_transform(&self, layout: &SceneLayout, pw: f64, ph: f64, ratio: f64) -> Affine {
        let s = UNITS_TO_PX * layout.content_scale * ratio;
        let world_cx = (layout.bounds.x0 + layout.bounds.x1) / 2.0;
        let world_cy = (layout.bounds.y0 + layout.bounds.y1) / 2.0;

        let center_x = if self.expanded {
            pw / 2.0
        } else {
            let left = self.opts.chrome.left * ratio;
            let right = self.opts.chrome.right * ratio;
            left + (pw - left - right) / 2.0
        };

        Affine::translate((center_x, ph / 2.0))
            * Affine::scale_non_uniform(s, -s)
            * Affine::translate((-world_cx, -world_cy))
    }

    fn draw_grid(&self, ctx: &mut vello_cpu::RenderContext, pw: f64, ph: f64, ratio: f64) {
        let spacing = 40.0 * ratio;
        let width = 1.0 * ratio;

        ctx.set_transform(affine_to_cpu(Affine::IDENTITY));
        ctx.set_paint(color(COLOR_GRID));

        let mut x = spacing;
        while x < pw {
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(x, 0.0, x + width, ph));
            x += spacing;
        }
        let mut y = spacing;
        while y < ph {
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, y, pw, y + width));
            y += spacing;
        }
    }

    fn draw_lifelines(
        &self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &SceneLayout,
        to_px: Affine,
    ) {
        for actor in &layout.actors {
            let rect = Rect::new(
                actor.x - LIFELINE_HALF_WIDTH,
                layout.lifeline_bottom,
                actor.x + LIFELINE_HALF_WIDTH,
                ACTOR_Y - ACTOR_BOX_HEIGHT / 2.0,
            );
            let paint = if actor.active {
                COLOR_LIFELINE_ACTIVE
            } else {
                COLOR_LIFELINE
            };
            fill_world_rect(ctx, to_px, rect, paint);
        }
    }

    fn draw_actor_boxes(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &SceneLayout,
        to_px: Affine,
        ratio: f64,
    ) {
        for actor in &layout.actors {
            let rect = Rect::new(
                actor.x - ACTOR_BOX_WIDTH / 2.0,
                ACTOR_Y - ACTOR_BOX_HEIGHT / 2.0,
                actor.x + ACTOR_BOX_WIDTH / 2.0,
                ACTOR_Y + ACTOR_BOX_HEIGHT / 2.0,
            );
            let path = RoundedRect::from_rect(rect, 0.08).to_path(0.01);
            let paint = if actor.active {
                COLOR_ACTOR_BOX_ACTIVE
            } else {
                COLOR_ACTOR_BOX
            };
            fill_world_path(ctx, to_px, &path, paint);

            let anchor = to_px * Point::new(actor.x, ACTOR_Y);
            self.draw_centered_text(ctx, &actor.label, anchor, 12.0 * ratio, COLOR_ACTOR_LABEL);
        }
    }

    fn draw_messages(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &SceneLayout,
        to_px: Affine,
        ratio: f64,
    ) {
        for msg in &layout.messages {
            if !msg.visible {
                continue;
            }
            if msg.self_loop {
                self.draw_self_loop(ctx, msg, to_px, ratio);
            } else {
                self.draw_arrow(ctx, msg, to_px, ratio);
            }
        }
    }

    fn draw_arrow(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        msg: &MessageShape,
        to_px: Affine,
        ratio: f64,
    ) {
        let dir = if msg.target_x >= msg.source_x { 1.0 } else { -1.0 };
        let line_end = msg.target_x - ARROW_INSET * dir;
        let (x0, x1) = if msg.source_x <= line_end {
            (msg.source_x, line_end)
        } else {
            (line_end, msg.source_x)
        };

        let glow = Rect::new(
            x0,
            msg.y - ARROW_GLOW_HALF_WIDTH,
            x1,
            msg.y + ARROW_GLOW_HALF_WIDTH,
        );
        fill_world_rect(
            ctx,
            to_px,
            glow,
            if msg.active {
                COLOR_ARROW_GLOW_ACTIVE
            } else {
                COLOR_ARROW_GLOW
            },
        );

        let paint = if msg.active { COLOR_ARROW_ACTIVE } else { COLOR_ARROW };
        if msg.active {
            // The active message reads as a dashed, animated beam.
            draw_dashed_segment(ctx, to_px, x0, x1, msg.y, ARROW_HALF_WIDTH, paint);
        } else {
            let line = Rect::new(x0, msg.y - ARROW_HALF_WIDTH, x1, msg.y + ARROW_HALF_WIDTH);
            fill_world_rect(ctx, to_px, line, paint);
        }

        // Arrowhead apex lands exactly on the target lifeline.
        let mut head = BezPath::new();
        head.move_to((msg.target_x, msg.y));
        head.line_to((
            msg.target_x - ARROW_HEAD_LENGTH * dir,
            msg.y + ARROW_HEAD_HALF_WIDTH,
        ));
        head.line_to((
            msg.target_x - ARROW_HEAD_LENGTH * dir,
            msg.y - ARROW_HEAD_HALF_WIDTH,
        ));
        head.close_path();
        fill_world_path(ctx, to_px, &head, paint);

        let center = to_px * Point::new((msg.source_x + msg.target_x) / 2.0, msg.y + 0.3);
        self.draw_label_pill(ctx, &msg.label, center, msg.active, ratio);
    }

    fn draw_self_loop(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        msg: &MessageShape,
        to_px: Affine,
        ratio: f64,
    ) {
        let x = msg.source_x;
        let y = msg.y;
        let paint = if msg.active { COLOR_ARROW_ACTIVE } else { COLOR_ARROW };

        // Rectangular loop: out to the right, down, and back to the
        // lifeline.
        let top = Rect::new(
            x,
            y - ARROW_HALF_WIDTH,
            x + SELF_LOOP_WIDTH,
            y + ARROW_HALF_WIDTH,
        );
        let side = Rect::new(
            x + SELF_LOOP_WIDTH - ARROW_HALF_WIDTH * 2.0,
            y - SELF_LOOP_HEIGHT,
            x + SELF_LOOP_WIDTH,
            y,
        );
        let bottom = Rect::new(
            x + ARROW_INSET,
            y - SELF_LOOP_HEIGHT - ARROW_HALF_WIDTH,
            x + SELF_LOOP_WIDTH,
            y - SELF_LOOP_HEIGHT + ARROW_HALF_WIDTH,
        );
        fill_world_rect(ctx, to_px, top, paint);
        fill_world_rect(ctx, to_px, side, paint);
        fill_world_rect(ctx, to_px, bottom, paint);

        let mut head = BezPath::new();
        head.move_to((x, y - SELF_LOOP_HEIGHT));
        head.line_to((
            x + ARROW_HEAD_LENGTH,
            y - SELF_LOOP_HEIGHT + ARROW_HEAD_HALF_WIDTH,
        ));
        head.line_to((
            x + ARROW_HEAD_LENGTH,
            y - SELF_LOOP_HEIGHT - ARROW_HEAD_HALF_WIDTH,
        ));
        head.close_path();
        fill_world_path(ctx, to_px, &head, paint);

        let center = to_px * Point::new(x + SELF_LOOP_WIDTH, y - SELF_LOOP_HEIGHT / 2.0);
        self.draw_label_pill(ctx, &msg.label, center, msg.active, ratio);
    }

    /// The step-indicator row pinned to the bottom edge of the viewport.
    fn draw_overlay(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &SceneLayout,
        pw: f64,
        ph: f64,
        ratio: f64,
    ) {
        let spacing = 40.0 * ratio;
        let radius = 14.0 * ratio;
        let y = ph - 48.0 * ratio;
        let count = layout.overlay.len();
        let start_x = pw / 2.0 - (count.saturating_sub(1)) as f64 * spacing / 2.0;

        ctx.set_transform(affine_to_cpu(Affine::IDENTITY));
        for marker in &layout.overlay {
            debug_assert!(marker.export_exclude);
            let center = Point::new(start_x + marker.index as f64 * spacing, y);
            let circle = Circle::new(center, radius).to_path(0.1);
            let paint = match marker.state {
                StepMarkerState::Done => COLOR_MARKER_DONE,
                StepMarkerState::Current => COLOR_MARKER_CURRENT,
                StepMarkerState::Pending => COLOR_MARKER_PENDING,
            };
            ctx.set_paint(color(paint));
            ctx.fill_path(&bezpath_to_cpu(&circle));
        }
    }

    fn draw_label_pill(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        label: &str,
        center: Point,
        active: bool,
        ratio: f64,
    ) {
        let text_color = if active {
            COLOR_PILL_TEXT_ACTIVE
        } else {
            COLOR_PILL_TEXT
        };
        let size = 11.0 * ratio;

        let Some(layout) = self.text.shape(label, size as f32, brush(text_color)) else {
            return;
        };
        let (tw, th) = (f64::from(layout.width()), f64::from(layout.height()));

        let pad_x = 8.0 * ratio;
        let pad_y = 3.0 * ratio;
        let pill = Rect::new(
            center.x - tw / 2.0 - pad_x,
            center.y - th / 2.0 - pad_y,
            center.x + tw / 2.0 + pad_x,
            center.y + th / 2.0 + pad_y,
        );
        let path = RoundedRect::from_rect(pill, pill.height() / 2.0).to_path(0.1);
        ctx.set_transform(affine_to_cpu(Affine::IDENTITY));
        ctx.set_paint(color(COLOR_PILL_BG));
        ctx.fill_path(&bezpath_to_cpu(&path));

        let origin = Point::new(center.x - tw / 2.0, center.y - th / 2.0);
        self.draw_text_layout(ctx, &layout, origin);
    }

    fn draw_centered_text(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        text: &str,
        center: Point,
        size_px: f64,
        rgba: [u8; 4],
    ) {
        let Some(layout) = self.text.shape(text, size_px as f32, brush(rgba)) else {
            return;
        };
        let origin = Point::new(
            center.x - f64::from(layout.width()) / 2.0,
            center.y - f64::from(layout.height()) / 2.0,
        );
        self.draw_text_layout(ctx, &layout, origin);
    }

    fn draw_text_layout(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &parley::Layout<TextBrushRgba8>,
        origin: Point,
    ) {
        ctx.set_transform(affine_to_cpu(Affine::translate((origin.x, origin.y))));

        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let b = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(b.r, b.g, b.b, b.a));

                let font = run.run().font();
                let font_data = self.font_cache.get(&(font.data.id(), font.index));
                let font_data = match font_data {
                    Some(f) => f.clone(),
                    None => {
                        let f = vello_cpu::peniko::FontData::new(
                            vello_cpu::peniko::Blob::from(font.data.as_ref().to_vec()),
                            font.index,
                        );
                        self.font_cache
                            .insert((font.data.id(), font.index), f.clone());
                        f
                    }
                };

                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font_data)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
}

impl CaptureSurface for SceneRenderer {
    fn set_view(&mut self, mode: PlaybackMode, step: i32) {
        self.mode = mode;
        self.step = step;
    }

    fn expand_layout(&mut self) {
        self.expanded = true;
    }

    fn restore_layout(&mut self) {
        self.expanded = false;
    }

    // `settle` keeps the default no-op: rendering happens synchronously at
    // rasterize time, so there is nothing to wait for.

    fn rasterize(&mut self) -> LifelineResult<Option<FrameRgba>> {
        self.render(false)
    }
}

/// Stateful helper building Parley layouts against the system font
/// collection. A host without any usable system font yields layouts with no
/// glyph runs; the scene then renders shapes only.
struct TextShaper {
    font_cx: parley::FontContext,
    layout_cx: parley::LayoutContext<TextBrushRgba8>,
}

impl TextShaper {
    fn new() -> Self {
        Self {
            font_cx: parley::FontContext::default(),
            layout_cx: parley::LayoutContext::new(),
        }
    }

    fn shape(
        &mut self,
        text: &str,
        size_px: f32,
        brush: TextBrushRgba8,
    ) -> Option<parley::Layout<TextBrushRgba8>> {
        if text.is_empty() || !size_px.is_finite() || size_px <= 0.0 {
            return None;
        }

        let mut builder = self
            .layout_cx
            .ranged_builder(&mut self.font_cx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Borrowed(
                "system-ui, sans-serif",
            )),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        Some(layout)
    }
}

fn brush(rgba: [u8; 4]) -> TextBrushRgba8 {
    TextBrushRgba8 {
        r: rgba[0],
        g: rgba[1],
        b: rgba[2],
        a: rgba[3],
    }
}

fn color(rgba: [u8; 4]) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn fill_world_rect(
    ctx: &mut vello_cpu::RenderContext,
    to_px: Affine,
    rect: Rect,
    rgba: [u8; 4],
) {
    ctx.set_transform(affine_to_cpu(to_px));
    ctx.set_paint(color(rgba));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(rect.x0, rect.y0, rect.x1, rect.y1));
}

fn fill_world_path(
    ctx: &mut vello_cpu::RenderContext,
    to_px: Affine,
    path: &BezPath,
    rgba: [u8; 4],
) {
    ctx.set_transform(affine_to_cpu(to_px));
    ctx.set_paint(color(rgba));
    ctx.fill_path(&bezpath_to_cpu(path));
}

fn draw_dashed_segment(
    ctx: &mut vello_cpu::RenderContext,
    to_px: Affine,
    x0: f64,
    x1: f64,
    y: f64,
    half_width: f64,
    rgba: [u8; 4],
) {
    const DASH: f64 = 0.35;
    const GAP: f64 = 0.25;

    let mut x = x0;
    while x < x1 {
        let end = (x + DASH).min(x1);
        fill_world_rect(
            ctx,
            to_px,
            Rect::new(x, y - half_width, end, y + half_width),
            rgba,
        );
        x = end + GAP;
    }
}

fn premul_rgba8(rgba: [u8; 4]) -> [u8; 4] {
    let [r, g, b, a] = rgba;
    let af = u16::from(a) + 1;
    let premul = |c: u8| -> u8 { ((u16::from(c) * af) >> 8) as u8 };
    [premul(r), premul(g), premul(b), a]
}

fn clear_pixmap(pixmap: &mut vello_cpu::Pixmap, rgba: [u8; 4]) {
    let data = pixmap.data_as_u8_slice_mut();
    for px in data.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}
