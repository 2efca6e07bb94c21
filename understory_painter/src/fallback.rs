// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Emulation of primitives the engine cannot render.
//!
//! [`DrawContext::draw_helper`] tries, in order:
//!
//! 1. a gradient remap, when a device- or object-relative gradient is the only
//!    problem and the engine can transform brushes;
//! 2. a two-pass decomposition for opaque backgrounds;
//! 3. offscreen compositing: the primitive is drawn by a nested painter into a
//!    transparent raster image covering its device bounds, and the image is
//!    blitted back at identity.
//!
//! Nested painters run in an emulating session and never fall back again.

use kurbo::{Affine, BezPath, Rect, Shape, StrokeOpts};
use peniko::Fill;

use crate::dispatch::{DrawContext, PathOp};
use crate::engine::ImageConversionFlags;
use crate::features::{EmulationSpecifier, PaintEngineFeatures};
use crate::painter::Painter;
use crate::session::SessionMode;
use crate::style::{BackgroundMode, Brush, GradientCoordinateMode, Pen, PenStyle};

/// Rewrites device- and object-relative gradients as logical gradients.
///
/// `device_rect` is in device pixels and `device_transform` maps logical to
/// device pixels; `object` is the logical bounding box of the primitive.
/// Returns `None` when a stretch-to-device gradient meets a singular
/// transform.
pub(crate) fn brush_to_user_space(
    brush: &Brush,
    device_rect: Rect,
    device_transform: Affine,
    object: Rect,
) -> Option<Brush> {
    match brush.gradient_mode() {
        Some(GradientCoordinateMode::StretchToDevice) => {
            let inverse = crate::transform::invert(device_transform)?;
            let remapped = brush.to_user_space(device_rect, object);
            let transform = inverse * remapped.transform();
            Some(remapped.with_transform(transform))
        }
        Some(mode) if mode.is_object_relative() => Some(brush.to_user_space(device_rect, object)),
        _ => Some(brush.clone()),
    }
}

impl DrawContext<'_> {
    /// Emulates `path` according to the current emulation specifier.
    pub(crate) fn draw_helper(&mut self, path: &BezPath, fill: Fill, op: PathOp) {
        let spec = self.session.spec;
        if spec.intersects(EmulationSpecifier::COMPOSITION) {
            tracing::debug!(?spec, "composition mode cannot be emulated; primitive skipped");
            return;
        }

        let only_gradient_remap = !spec.is_direct()
            && spec.difference(EmulationSpecifier::GRADIENT_REMAP).is_empty()
            && !self.config.force_offscreen_fallback;
        if only_gradient_remap && self.features().contains(PaintEngineFeatures::PATTERN_TRANSFORM)
        {
            self.draw_remapped_gradients(path, fill);
            return;
        }

        if spec.contains(EmulationSpecifier::OPAQUE_BACKGROUND) {
            self.draw_opaque_background(path, fill, op);
            return;
        }

        self.draw_offscreen(path, fill, op);
    }

    fn draw_remapped_gradients(&mut self, path: &BezPath, fill: Fill) {
        let device_rect = self.session.metrics.device_rect();
        let device_transform = self.state().transforms().device_transform();
        let object = path.bounding_box();
        let state = self.state();
        let pen_brush =
            brush_to_user_space(state.pen().brush(), device_rect, device_transform, object);
        let brush = brush_to_user_space(state.brush(), device_rect, device_transform, object);
        let (Some(pen_brush), Some(brush)) = (pen_brush, brush) else {
            tracing::trace!("gradient remap under a singular transform; primitive skipped");
            return;
        };
        tracing::trace!("gradients remapped to user space");
        let pen = state.pen().clone().with_brush(pen_brush);
        self.with_saved(|cx| {
            let state = cx.state_mut();
            state.set_pen(pen);
            state.set_brush(brush);
            cx.sync();
            cx.engine.draw_path(path, fill);
        });
    }

    fn draw_opaque_background(&mut self, path: &BezPath, fill: Fill, op: PathOp) {
        let state = self.state();
        let background = state.background().clone();
        let pen = state.pen().clone();
        let fills = op.fills() && state.brush().is_visible();
        let strokes = op.strokes() && pen.is_visible();
        tracing::trace!(fills, strokes, "opaque background drawn in two passes");

        self.with_saved(|cx| {
            cx.state_mut()
                .set_background_mode(BackgroundMode::Transparent);
            if fills {
                let background = background.clone();
                cx.with_saved(|cx| {
                    let state = cx.state_mut();
                    state.set_pen(Pen::none());
                    state.set_brush(background);
                    cx.draw_path(path, fill, PathOp::Fill);
                });
                cx.with_saved(|cx| {
                    cx.state_mut().set_pen(Pen::none());
                    cx.draw_path(path, fill, PathOp::Fill);
                });
            }
            if strokes {
                let background_pen = pen
                    .clone()
                    .with_brush(background)
                    .with_style(PenStyle::Solid);
                cx.with_saved(|cx| {
                    let state = cx.state_mut();
                    state.set_brush(Brush::none());
                    state.set_pen(background_pen);
                    cx.draw_path(path, fill, PathOp::Stroke);
                });
                cx.with_saved(|cx| {
                    cx.state_mut().set_brush(Brush::none());
                    cx.draw_path(path, fill, PathOp::Stroke);
                });
            }
        });
    }

    /// Device-space bounds of `path` as painted with `op`, stroke included.
    ///
    /// Stroke bounds come from the stroke outline, so caps and joins reaching
    /// past the path's own bounds are covered under every transform.
    fn device_bounds(&self, path: &BezPath, op: PathOp) -> Rect {
        let state = self.state();
        let matrix = state.transforms().device_transform();
        let device_path = matrix * path.clone();
        let bounds = device_path.bounding_box();
        let pen = state.pen();
        if !(op.strokes() && pen.is_visible()) {
            return bounds;
        }
        let stroke = pen.to_stroke();
        let opts = StrokeOpts::default();
        let tolerance = self.config.path_tolerance;
        let outline = matrix * kurbo::stroke(path.iter(), &stroke, &opts, tolerance);
        let bounds = bounds.union(outline.bounding_box());
        if !pen.is_cosmetic() {
            return bounds;
        }
        // Engines may stroke cosmetic pens at their width in device pixels.
        let device_outline = kurbo::stroke(device_path.iter(), &stroke, &opts, tolerance);
        bounds.union(device_outline.bounding_box())
    }

    fn draw_offscreen(&mut self, path: &BezPath, fill: Fill, op: PathOp) {
        let mut area = self
            .device_bounds(path, op)
            .intersect(self.session.paintable_rect());
        if let Some(clip) = self.session.device_clip.bounding_rect() {
            area = area.intersect(clip);
        }
        let area = area.expand();
        if area.width() <= 0.0 || area.height() <= 0.0 {
            tracing::trace!("zero-area fallback; nothing to draw");
            return;
        }
        let max = f64::from(self.config.max_offscreen_dimension);
        if area.width() > max || area.height() > max {
            tracing::debug!(?area, "fallback area exceeds the maximum offscreen size; skipped");
            return;
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "area is integral, positive and bounded by max_offscreen_dimension"
        )]
        let (width, height) = (area.width() as u32, area.height() as u32);
        let Some(offscreen) = self.engine.create_offscreen(width, height) else {
            tracing::debug!(width, height, "engine has no offscreen surface; skipped");
            return;
        };

        let state = self.state();
        let matrix = state.transforms().device_transform();
        let device_rect = self.session.metrics.device_rect();
        let object = path.bounding_box();
        let (Some(pen_brush), Some(brush)) = (
            brush_to_user_space(state.pen().brush(), device_rect, matrix, object),
            brush_to_user_space(state.brush(), device_rect, matrix, object),
        ) else {
            tracing::trace!("fallback under a singular transform; primitive skipped");
            return;
        };
        let pen = state.pen().clone().with_brush(pen_brush);
        let redirection = Affine::translate(-area.origin().to_vec2()) * matrix;

        let mut nested = Painter::with_config(self.config.for_nested());
        if let Err(err) =
            nested.begin_with(offscreen.clone(), SessionMode::Emulating, redirection)
        {
            tracing::debug!(%err, "offscreen painter failed to begin; skipped");
            return;
        }
        nested.set_pen(pen);
        nested.set_brush(brush);
        nested.set_brush_origin(state.brush_origin());
        nested.set_background(state.background().clone());
        nested.set_background_mode(state.background_mode());
        nested.set_opacity(state.opacity());
        nested.set_render_hints(state.render_hints());
        nested.set_font(state.font().clone());
        match op {
            PathOp::Fill => nested.set_pen(Pen::none()),
            PathOp::Stroke => nested.set_brush(Brush::none()),
            PathOp::FillAndStroke => {}
        }
        nested.draw_path_with_fill(path, fill);
        nested.end();
        let Some(image) = offscreen.borrow_mut().grab_image() else {
            tracing::debug!("offscreen surface cannot be read back; skipped");
            return;
        };

        let source = Rect::new(0.0, 0.0, area.width(), area.height());
        self.with_saved(|cx| {
            let state = cx.state_mut();
            let transforms = state.transforms_mut();
            transforms.set_world_enabled(false);
            transforms.set_view_enabled(false);
            transforms.set_redirection(Affine::IDENTITY);
            transforms.set_device_pixel_ratio(1.0);
            state.set_opacity(1.0);
            cx.sync();
            cx.engine.draw_image(
                area,
                &image,
                source,
                ImageConversionFlags::ORDERED_DITHER | ImageConversionFlags::ORDERED_ALPHA_DITHER,
            );
        });
        tracing::trace!(?area, "primitive composited through an offscreen image");
    }
}
