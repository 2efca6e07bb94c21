// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-call sequencing: sync, negotiate, then forward or emulate.

use kurbo::{Affine, BezPath, Ellipse, Line, Point, Rect, Shape};
use peniko::{Fill, ImageData};

use crate::config::PainterConfig;
use crate::engine::{ImageConversionFlags, PaintEngine, PolygonMode, TextItem};
use crate::features::{EmulationSpecifier, PaintEngineFeatures};
use crate::session::{Session, SessionMode};
use crate::state::PainterState;
use crate::style::{BackgroundMode, Brush, Pen};
use crate::transform::TransformType;

/// Which parts of the state a path operation paints with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PathOp {
    Fill,
    Stroke,
    FillAndStroke,
}

impl PathOp {
    pub(crate) fn fills(self) -> bool {
        matches!(self, Self::Fill | Self::FillAndStroke)
    }

    pub(crate) fn strokes(self) -> bool {
        matches!(self, Self::Stroke | Self::FillAndStroke)
    }
}

/// A geometric primitive as issued by the façade.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Primitive<'p> {
    Path(&'p BezPath, Fill),
    Rects(&'p [Rect]),
    Lines(&'p [Line]),
    Points(&'p [Point]),
    Polygon(&'p [Point], PolygonMode),
    Ellipse(Rect),
}

impl Primitive<'_> {
    fn forward(self, engine: &mut dyn PaintEngine) {
        match self {
            Self::Path(path, fill) => engine.draw_path(path, fill),
            Self::Rects(rects) => engine.draw_rects(rects),
            Self::Lines(lines) => engine.draw_lines(lines),
            Self::Points(points) => engine.draw_points(points),
            Self::Polygon(points, mode) => engine.draw_polygon(points, mode),
            Self::Ellipse(rect) => engine.draw_ellipse(rect),
        }
    }

    fn op(self) -> PathOp {
        match self {
            Self::Lines(_) | Self::Polygon(_, PolygonMode::Polyline) => PathOp::Stroke,
            Self::Points(_) => PathOp::Fill,
            _ => PathOp::FillAndStroke,
        }
    }

    /// The primitive as a path. Points become pen-sized squares.
    fn to_path(self, pen: &Pen, tolerance: f64) -> (BezPath, Fill) {
        match self {
            Self::Path(path, fill) => (path.clone(), fill),
            Self::Rects(rects) => {
                let mut path = BezPath::new();
                for rect in rects {
                    path.extend(rect.path_elements(tolerance));
                }
                (path, Fill::NonZero)
            }
            Self::Lines(lines) => {
                let mut path = BezPath::new();
                for line in lines {
                    path.move_to(line.p0);
                    path.line_to(line.p1);
                }
                (path, Fill::NonZero)
            }
            Self::Points(points) => {
                let half = pen.effective_width() / 2.0;
                let mut path = BezPath::new();
                for p in points {
                    let square = Rect::new(p.x - half, p.y - half, p.x + half, p.y + half);
                    path.extend(square.path_elements(tolerance));
                }
                (path, Fill::NonZero)
            }
            Self::Polygon(points, mode) => {
                let mut path = BezPath::new();
                if let Some((first, rest)) = points.split_first() {
                    path.move_to(*first);
                    for p in rest {
                        path.line_to(*p);
                    }
                    if mode != PolygonMode::Polyline {
                        path.close_path();
                    }
                }
                (path, mode.fill_rule())
            }
            Self::Ellipse(rect) => (Ellipse::from_rect(rect).to_path(tolerance), Fill::NonZero),
        }
    }
}

/// Everything one draw call needs: the session, its engine and the config.
///
/// Emulation passes re-enter the pipeline through this context rather than
/// through the façade, so the session and device are borrowed exactly once
/// per call.
pub(crate) struct DrawContext<'a> {
    pub(crate) session: &'a mut Session,
    pub(crate) engine: &'a mut dyn PaintEngine,
    pub(crate) config: &'a PainterConfig,
}

impl DrawContext<'_> {
    pub(crate) fn state(&self) -> &PainterState {
        self.session.state()
    }

    pub(crate) fn state_mut(&mut self) -> &mut PainterState {
        self.session.state_mut()
    }

    pub(crate) fn features(&self) -> PaintEngineFeatures {
        self.engine.features()
    }

    pub(crate) fn sync(&mut self) -> EmulationSpecifier {
        self.session.sync(&mut *self.engine)
    }

    /// Runs `f` between a save and a restore of the session state.
    pub(crate) fn with_saved(&mut self, f: impl FnOnce(&mut Self)) {
        self.session.stack.save();
        f(self);
        self.session.stack.restore();
    }

    /// Returns `true` if the current clip lets nothing through.
    fn clipped_out(&self) -> bool {
        if self.session.device_clip.is_empty() {
            tracing::trace!("primitive clipped out");
            return true;
        }
        false
    }

    /// Decides between direct forwarding and emulation.
    ///
    /// Emulating sessions always draw directly.
    pub(crate) fn needs_emulation(&self, spec: EmulationSpecifier) -> bool {
        let wanted = !spec.is_direct() || self.config.force_offscreen_fallback;
        if !wanted {
            return false;
        }
        if self.session.mode == SessionMode::Emulating {
            tracing::trace!(?spec, "nested painter draws directly");
            return false;
        }
        true
    }

    pub(crate) fn draw_primitive(&mut self, primitive: Primitive<'_>) {
        let spec = self.sync();
        if self.clipped_out() {
            return;
        }
        if !self.needs_emulation(spec) {
            primitive.forward(&mut *self.engine);
            return;
        }
        let tolerance = self.config.path_tolerance;
        let (path, fill) = primitive.to_path(self.state().pen(), tolerance);
        if let Primitive::Points(_) = primitive {
            let pen = self.state().pen().clone();
            if !pen.is_visible() {
                return;
            }
            self.with_saved(|cx| {
                let state = cx.state_mut();
                state.set_brush(pen.brush().clone());
                state.set_pen(Pen::none());
                cx.draw_path(&path, fill, PathOp::Fill);
            });
            return;
        }
        self.draw_helper(&path, fill, primitive.op());
    }

    /// The path pipeline used by emulation passes.
    pub(crate) fn draw_path(&mut self, path: &BezPath, fill: Fill, op: PathOp) {
        let spec = self.sync();
        if self.clipped_out() {
            return;
        }
        if self.needs_emulation(spec) {
            self.draw_helper(path, fill, op);
        } else {
            self.engine.draw_path(path, fill);
        }
    }

    pub(crate) fn draw_text(&mut self, origin: Point, item: &TextItem, is_static: bool) {
        if self.state().background_mode() == BackgroundMode::Opaque {
            let bounds = item.bounds + origin.to_vec2();
            let background = self.state().background().clone();
            self.with_saved(|cx| {
                let state = cx.state_mut();
                state.set_background_mode(BackgroundMode::Transparent);
                state.set_pen(Pen::none());
                state.set_brush(background);
                cx.draw_primitive(Primitive::Rects(&[bounds]));
            });
            self.with_saved(|cx| {
                cx.state_mut()
                    .set_background_mode(BackgroundMode::Transparent);
                cx.draw_glyphs(origin, item, is_static);
            });
            return;
        }
        self.draw_glyphs(origin, item, is_static);
    }

    fn draw_glyphs(&mut self, origin: Point, item: &TextItem, is_static: bool) {
        let spec = self.sync();
        if self.clipped_out() || !self.state().pen().is_visible() {
            return;
        }
        if !self.needs_emulation(spec) {
            if is_static {
                self.engine.draw_static_text_item(origin, item);
            } else {
                self.engine.draw_text_item(origin, item);
            }
            return;
        }
        let outline = Affine::translate(origin.to_vec2()) * item.outline.clone();
        let pen_brush = self.state().pen().brush().clone();
        self.with_saved(|cx| {
            let state = cx.state_mut();
            state.set_brush(pen_brush);
            state.set_pen(Pen::none());
            cx.draw_path(&outline, Fill::NonZero, PathOp::Fill);
        });
    }

    /// Draws the `source` part of `image` into `target`.
    ///
    /// Images the engine cannot transform, or cannot draw with the current
    /// opacity, become a texture-brush rectangle and take the path pipeline.
    pub(crate) fn draw_image(
        &mut self,
        target: Rect,
        image: &ImageData,
        source: Rect,
        flags: ImageConversionFlags,
        is_pixmap: bool,
    ) {
        self.sync();
        if self.clipped_out() || target.area() == 0.0 || source.area() == 0.0 {
            return;
        }
        let features = self.features();
        let state = self.state();
        let complex = state.transforms().transform_type() > TransformType::Translate
            && !features.contains(PaintEngineFeatures::PIXMAP_TRANSFORM);
        let translucent =
            state.opacity() < 1.0 && !features.contains(PaintEngineFeatures::CONSTANT_OPACITY);
        let emulate = self.session.mode == SessionMode::Direct
            && (complex || translucent || self.config.force_offscreen_fallback);
        if !emulate {
            if is_pixmap {
                self.engine.draw_pixmap(target, image, source);
            } else {
                self.engine.draw_image(target, image, source, flags);
            }
            return;
        }

        let image_to_target = Affine::translate(target.origin().to_vec2())
            * Affine::scale_non_uniform(
                target.width() / source.width(),
                target.height() / source.height(),
            )
            * Affine::translate(-source.origin().to_vec2());
        let brush = Brush::texture(image.clone()).with_transform(image_to_target);
        tracing::trace!("image drawn as a texture brush");
        self.with_saved(|cx| {
            let state = cx.state_mut();
            state.set_pen(Pen::none());
            state.set_brush(brush);
            state.set_brush_origin(Point::ORIGIN);
            cx.draw_primitive(Primitive::Rects(&[target]));
        });
    }
}
