// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The painter façade.

use alloc::rc::Rc;
use alloc::sync::Arc;
use core::cell::RefMut;

use kurbo::{Affine, BezPath, Line, Point, Rect, Vec2};
use peniko::{Fill, ImageData};

use crate::clip::{ClipOperation, ClipShape};
use crate::config::PainterConfig;
use crate::dispatch::{DrawContext, Primitive};
use crate::engine::{DeviceRef, ImageConversionFlags, PolygonMode, TextItem};
use crate::error::{BeginError, UsageError};
use crate::features::EmulationSpecifier;
use crate::negotiate;
use crate::region::Region;
use crate::session::{self, Attachment, Session, SessionMode};
use crate::style::{BackgroundMode, Brush, CompositionMode, Font, Pen, RenderHints};
use crate::transform::preserves_rects;

/// Draws on a [`PaintDevice`](crate::PaintDevice) through its engine.
///
/// A painter is inactive until [`begin`](Self::begin) succeeds and becomes
/// inactive again on [`end`](Self::end) or drop. Calls that need an active
/// painter are no-ops on an inactive one, apart from a warning on the
/// `tracing` channel; getters then return defaults.
///
/// State changes are lazy: they are recorded in the painter state and handed
/// to the engine on the next draw call.
#[derive(Debug, Default)]
pub struct Painter {
    attachment: Option<Attachment>,
    config: PainterConfig,
}

impl Drop for Painter {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            session::detach(attachment);
        }
    }
}

impl Painter {
    /// An inactive painter with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An inactive painter with `config`.
    #[must_use]
    pub fn with_config(config: PainterConfig) -> Self {
        Self {
            attachment: None,
            config,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PainterConfig {
        &self.config
    }

    /// Replaces the configuration. Takes effect from the next call.
    pub fn set_config(&mut self, config: PainterConfig) {
        self.config = config;
    }

    /// Starts painting on `device`.
    ///
    /// If another painter is already painting on a device that allows
    /// sharing, this painter joins its session: it sees and changes the same
    /// state, and [`end`](Self::end) puts that state back as it was found.
    pub fn begin(&mut self, device: DeviceRef) -> Result<(), BeginError> {
        self.begin_with(device, SessionMode::Direct, Affine::IDENTITY)
    }

    pub(crate) fn begin_with(
        &mut self,
        device: DeviceRef,
        mode: SessionMode,
        redirection: Affine,
    ) -> Result<(), BeginError> {
        if self.attachment.is_some() {
            UsageError::AlreadyActive.report();
            return Err(BeginError::AlreadyActive);
        }
        match session::begin_session(device, &self.config, mode, redirection) {
            Ok(attachment) => {
                self.attachment = Some(attachment);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = ?err, "begin failed: {err}");
                Err(err)
            }
        }
    }

    /// Stops painting. Returns `false` if the painter was not active.
    pub fn end(&mut self) -> bool {
        let Some(attachment) = self.attachment.take() else {
            UsageError::NotActive.report();
            return false;
        };
        session::detach(attachment);
        true
    }

    /// Returns `true` between a successful begin and the matching end.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.attachment.is_some()
    }

    /// The device being painted on.
    #[must_use]
    pub fn device(&self) -> Option<DeviceRef> {
        self.attachment
            .as_ref()
            .and_then(|a| a.session.try_borrow().ok().map(|s| Rc::clone(&s.device)))
    }

    fn session(&self) -> Option<RefMut<'_, Session>> {
        let Some(attachment) = &self.attachment else {
            UsageError::NotActive.report();
            return None;
        };
        let Ok(session) = attachment.session.try_borrow_mut() else {
            UsageError::DeviceBusy.report();
            return None;
        };
        if let Err(err) = session.thread.check() {
            err.report();
            return None;
        }
        Some(session)
    }

    fn read<R: Default>(&self, f: impl FnOnce(&Session) -> R) -> R {
        self.session().map(|s| f(&s)).unwrap_or_default()
    }

    fn write(&mut self, f: impl FnOnce(&mut Session)) {
        if let Some(mut session) = self.session() {
            f(&mut session);
        }
    }

    fn draw<R>(&self, f: impl FnOnce(&mut DrawContext<'_>) -> R) -> Option<R> {
        let mut session = self.session()?;
        let device = Rc::clone(&session.device);
        let Ok(mut dev) = device.try_borrow_mut() else {
            UsageError::DeviceBusy.report();
            return None;
        };
        let Some(engine) = dev.paint_engine() else {
            tracing::debug!("device lost its paint engine");
            return None;
        };
        let mut cx = DrawContext {
            session: &mut session,
            engine,
            config: &self.config,
        };
        Some(f(&mut cx))
    }

    // --- state stack ---

    /// Pushes a copy of the current state.
    pub fn save(&mut self) {
        self.write(|s| s.stack.save());
    }

    /// Pops the state pushed by the matching [`save`](Self::save).
    ///
    /// Without a matching save nothing changes and one warning is emitted.
    pub fn restore(&mut self) {
        let Some(floor) = self.attachment.as_ref().map(|a| a.floor) else {
            UsageError::NotActive.report();
            return;
        };
        self.write(|s| {
            if s.stack.depth() <= floor || !s.stack.restore() {
                UsageError::UnbalancedRestore.report();
            }
        });
    }

    /// Number of saves not yet restored by this painter.
    #[must_use]
    pub fn save_depth(&self) -> usize {
        let floor = self.attachment.as_ref().map_or(0, |a| a.floor);
        self.read(|s| s.stack.depth().saturating_sub(floor))
    }

    // --- transforms ---

    /// Replaces the world transform, or with `combine` applies `transform`
    /// before the current one.
    pub fn set_world_transform(&mut self, transform: Affine, combine: bool) {
        self.write(|s| {
            s.state_mut()
                .transforms_mut()
                .set_world_transform(transform, combine);
        });
    }

    /// The world transform.
    #[must_use]
    pub fn world_transform(&self) -> Affine {
        self.read(|s| s.state().transforms().world_transform())
    }

    /// Enables or disables the world transform without forgetting it.
    pub fn set_world_matrix_enabled(&mut self, enabled: bool) {
        self.write(|s| s.state_mut().transforms_mut().set_world_enabled(enabled));
    }

    /// Whether the world transform is applied.
    #[must_use]
    pub fn world_matrix_enabled(&self) -> bool {
        self.read(|s| s.state().transforms().world_enabled())
    }

    /// Translates the coordinate system.
    pub fn translate(&mut self, offset: Vec2) {
        self.write(|s| s.state_mut().transforms_mut().translate(offset));
    }

    /// Scales the coordinate system.
    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.write(|s| s.state_mut().transforms_mut().scale(sx, sy));
    }

    /// Rotates the coordinate system clockwise by `radians`.
    pub fn rotate(&mut self, radians: f64) {
        self.write(|s| s.state_mut().transforms_mut().rotate(radians));
    }

    /// Shears the coordinate system.
    pub fn shear(&mut self, sh: f64, sv: f64) {
        self.write(|s| s.state_mut().transforms_mut().shear(sh, sv));
    }

    /// Resets world transform, window and viewport.
    pub fn reset_transform(&mut self) {
        self.write(|s| {
            let logical = s.metrics.logical_rect();
            s.state_mut().transforms_mut().reset(logical);
        });
    }

    /// Sets the logical window mapped onto the viewport.
    pub fn set_window(&mut self, window: Rect) {
        self.write(|s| s.state_mut().transforms_mut().set_window(window));
    }

    /// The window.
    #[must_use]
    pub fn window(&self) -> Rect {
        self.read(|s| s.state().transforms().window())
    }

    /// Sets the viewport the window is mapped onto.
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.write(|s| s.state_mut().transforms_mut().set_viewport(viewport));
    }

    /// The viewport.
    #[must_use]
    pub fn viewport(&self) -> Rect {
        self.read(|s| s.state().transforms().viewport())
    }

    /// Enables or disables the window-viewport mapping.
    pub fn set_view_transform_enabled(&mut self, enabled: bool) {
        self.write(|s| s.state_mut().transforms_mut().set_view_enabled(enabled));
    }

    /// Whether the window-viewport mapping is applied.
    #[must_use]
    pub fn view_transform_enabled(&self) -> bool {
        self.read(|s| s.state().transforms().view_enabled())
    }

    /// World transform followed by the window-viewport mapping.
    #[must_use]
    pub fn combined_transform(&self) -> Affine {
        self.read(|s| s.state().transforms().combined_transform())
    }

    /// Logical coordinates to device pixels.
    #[must_use]
    pub fn device_transform(&self) -> Affine {
        self.read(|s| s.state().transforms().device_transform())
    }

    // --- clipping ---

    fn push_clip(&mut self, shape: ClipShape, operation: ClipOperation) {
        self.write(|s| s.state_mut().push_clip(shape, operation));
    }

    /// Clips to a rectangle with fractional coordinates.
    pub fn set_clip_rect(&mut self, rect: Rect, operation: ClipOperation) {
        self.push_clip(ClipShape::RectF(rect), operation);
    }

    /// Clips to a pixel rectangle; `rect` is rounded to integers.
    pub fn set_clip_pixel_rect(&mut self, rect: Rect, operation: ClipOperation) {
        self.push_clip(ClipShape::pixel_rect(rect), operation);
    }

    /// Clips to a region.
    pub fn set_clip_region(&mut self, region: Region, operation: ClipOperation) {
        self.push_clip(ClipShape::Region(Arc::new(region)), operation);
    }

    /// Clips to a path.
    pub fn set_clip_path(&mut self, path: BezPath, fill: Fill, operation: ClipOperation) {
        self.push_clip(ClipShape::Path(Arc::new(path), fill), operation);
    }

    /// Enables or disables clipping.
    ///
    /// Enabling is refused, with a warning, when no clip has been set or the
    /// last clip operation was [`ClipOperation::NoClip`].
    pub fn set_clipping(&mut self, enabled: bool) {
        self.write(|s| {
            if !s.state_mut().set_clipping(enabled) {
                UsageError::ClippingWithoutClip.report();
            }
        });
    }

    /// Whether clipping is enabled.
    #[must_use]
    pub fn has_clipping(&self) -> bool {
        self.read(|s| s.state().clip_enabled())
    }

    /// The clip in logical coordinates; empty when clipping is off.
    ///
    /// Path clips are rasterized within the paintable device area: on the
    /// device pixel grid when the transform keeps rectangles axis-aligned, on
    /// the logical pixel grid otherwise. A non-invertible transform gives an
    /// empty region.
    #[must_use]
    pub fn clip_region(&self) -> Region {
        let tolerance = self.config.path_tolerance;
        self.read(|s| {
            let state = s.state();
            if !state.clip_enabled() {
                return Region::new();
            }
            let Some(inverse) = state.transforms().inverse() else {
                return Region::new();
            };
            let resolved = state.clip_log().resolve(inverse);
            match resolved.region() {
                Some(region) if resolved.paths().is_empty() => region.clone(),
                None if resolved.paths().is_empty() => Region::new(),
                _ if preserves_rects(inverse) => {
                    // Rasterize on the device grid, where the scan is bounded
                    // by the paintable rect whatever the scale.
                    state
                        .clip_log()
                        .resolve(Affine::IDENTITY)
                        .to_region(tolerance, s.paintable_rect())
                        .transformed(inverse)
                        .unwrap_or_default()
                }
                _ => {
                    let bounds = inverse.transform_rect_bbox(s.paintable_rect());
                    resolved.to_region(tolerance, bounds)
                }
            }
        })
    }

    /// The clip in logical coordinates as a path; empty when clipping is off.
    #[must_use]
    pub fn clip_path(&self) -> BezPath {
        let tolerance = self.config.path_tolerance;
        self.read(|s| {
            let state = s.state();
            if !state.clip_enabled() {
                return BezPath::new();
            }
            let Some(inverse) = state.transforms().inverse() else {
                return BezPath::new();
            };
            let bounds = inverse.transform_rect_bbox(s.paintable_rect());
            state
                .clip_log()
                .resolve(inverse)
                .to_path(tolerance, bounds)
        })
    }

    /// A rectangle containing the clip, in logical coordinates.
    ///
    /// The bound is not tight for rotated or path clips. Returns
    /// [`Rect::ZERO`] when clipping is off or the clip is empty.
    #[must_use]
    pub fn clip_bounding_rect(&self) -> Rect {
        self.read(|s| {
            let state = s.state();
            if !state.clip_enabled() {
                return Rect::ZERO;
            }
            state
                .transforms()
                .inverse()
                .and_then(|inverse| state.clip_log().bounding_rect(inverse))
                .unwrap_or(Rect::ZERO)
        })
    }

    // --- style ---

    /// Sets the stroke pen.
    pub fn set_pen(&mut self, pen: Pen) {
        self.write(|s| s.state_mut().set_pen(pen));
    }

    /// The stroke pen.
    #[must_use]
    pub fn pen(&self) -> Pen {
        self.read(|s| s.state().pen().clone())
    }

    /// Sets the fill brush.
    pub fn set_brush(&mut self, brush: Brush) {
        self.write(|s| s.state_mut().set_brush(brush));
    }

    /// The fill brush.
    #[must_use]
    pub fn brush(&self) -> Brush {
        self.read(|s| s.state().brush().clone())
    }

    /// Sets the logical origin of pattern and texture brushes.
    pub fn set_brush_origin(&mut self, origin: Point) {
        self.write(|s| s.state_mut().set_brush_origin(origin));
    }

    /// The brush origin.
    #[must_use]
    pub fn brush_origin(&self) -> Point {
        self.read(|s| s.state().brush_origin())
    }

    /// Sets the background brush.
    pub fn set_background(&mut self, brush: Brush) {
        self.write(|s| s.state_mut().set_background(brush));
    }

    /// The background brush.
    #[must_use]
    pub fn background(&self) -> Brush {
        self.read(|s| s.state().background().clone())
    }

    /// Sets the background mode.
    pub fn set_background_mode(&mut self, mode: BackgroundMode) {
        self.write(|s| s.state_mut().set_background_mode(mode));
    }

    /// The background mode.
    #[must_use]
    pub fn background_mode(&self) -> BackgroundMode {
        self.read(|s| s.state().background_mode())
    }

    /// Sets the font.
    pub fn set_font(&mut self, font: Font) {
        self.write(|s| s.state_mut().set_font(font));
    }

    /// The font.
    #[must_use]
    pub fn font(&self) -> Font {
        self.read(|s| s.state().font().clone())
    }

    /// Sets the constant opacity, clamped to `0.0..=1.0`.
    pub fn set_opacity(&mut self, opacity: f64) {
        self.write(|s| s.state_mut().set_opacity(opacity));
    }

    /// The constant opacity.
    #[must_use]
    pub fn opacity(&self) -> f64 {
        self.session().map_or(1.0, |s| s.state().opacity())
    }

    /// Sets the composition mode.
    ///
    /// Modes the engine cannot render are refused with a warning: offscreen
    /// compositing cannot emulate them.
    pub fn set_composition_mode(&mut self, mode: CompositionMode) {
        let accepted = self.draw(|cx| {
            let supported = mode
                .required_feature()
                .is_none_or(|feature| cx.features().contains(feature));
            if supported {
                cx.state_mut().set_composition_mode(mode);
            }
            supported
        });
        if accepted == Some(false) {
            UsageError::UnsupportedCompositionMode(mode).report();
        }
    }

    /// The composition mode.
    #[must_use]
    pub fn composition_mode(&self) -> CompositionMode {
        self.read(|s| s.state().composition_mode())
    }

    /// Turns one render hint on or off.
    pub fn set_render_hint(&mut self, hint: RenderHints, on: bool) {
        self.write(|s| {
            let mut hints = s.state().render_hints();
            hints.set(hint, on);
            s.state_mut().set_render_hints(hints);
        });
    }

    /// Replaces all render hints.
    pub fn set_render_hints(&mut self, hints: RenderHints) {
        self.write(|s| s.state_mut().set_render_hints(hints));
    }

    /// The render hints.
    #[must_use]
    pub fn render_hints(&self) -> RenderHints {
        self.read(|s| s.state().render_hints())
    }

    /// What the engine would have to have emulated for the current state.
    #[must_use]
    pub fn emulation_specifier(&self) -> EmulationSpecifier {
        self.draw(|cx| negotiate::emulation_specifier(cx.state(), cx.features()))
            .unwrap_or_default()
    }

    // --- drawing ---

    /// Fills `path` (non-zero) with the brush and strokes it with the pen.
    pub fn draw_path(&mut self, path: &BezPath) {
        self.draw_path_with_fill(path, Fill::NonZero);
    }

    /// Fills `path` with the brush under `fill` and strokes it with the pen.
    pub fn draw_path_with_fill(&mut self, path: &BezPath, fill: Fill) {
        self.draw(|cx| cx.draw_primitive(Primitive::Path(path, fill)));
    }

    /// Fills `path` with `brush`, without stroking.
    pub fn fill_path(&mut self, path: &BezPath, fill: Fill, brush: Brush) {
        self.draw(|cx| {
            cx.with_saved(|cx| {
                let state = cx.state_mut();
                state.set_pen(Pen::none());
                state.set_brush(brush);
                cx.draw_primitive(Primitive::Path(path, fill));
            });
        });
    }

    /// Strokes `path` with `pen`, without filling.
    pub fn stroke_path(&mut self, path: &BezPath, pen: Pen) {
        self.draw(|cx| {
            cx.with_saved(|cx| {
                let state = cx.state_mut();
                state.set_brush(Brush::none());
                state.set_pen(pen);
                cx.draw_primitive(Primitive::Path(path, Fill::NonZero));
            });
        });
    }

    /// Draws a rectangle.
    pub fn draw_rect(&mut self, rect: Rect) {
        self.draw_rects(&[rect]);
    }

    /// Draws rectangles.
    pub fn draw_rects(&mut self, rects: &[Rect]) {
        self.draw(|cx| cx.draw_primitive(Primitive::Rects(rects)));
    }

    /// Fills a rectangle with `brush`, without stroking.
    pub fn fill_rect(&mut self, rect: Rect, brush: Brush) {
        self.draw(|cx| {
            cx.with_saved(|cx| {
                let state = cx.state_mut();
                state.set_pen(Pen::none());
                state.set_brush(brush);
                cx.draw_primitive(Primitive::Rects(&[rect]));
            });
        });
    }

    /// Fills a rectangle with the background brush.
    pub fn erase_rect(&mut self, rect: Rect) {
        let background = self.background();
        self.fill_rect(rect, background);
    }

    /// Draws the ellipse inscribed in `rect`.
    pub fn draw_ellipse(&mut self, rect: Rect) {
        self.draw(|cx| cx.draw_primitive(Primitive::Ellipse(rect)));
    }

    /// Strokes a line.
    pub fn draw_line(&mut self, line: Line) {
        self.draw_lines(&[line]);
    }

    /// Strokes lines.
    pub fn draw_lines(&mut self, lines: &[Line]) {
        self.draw(|cx| cx.draw_primitive(Primitive::Lines(lines)));
    }

    /// Draws a point with the pen.
    pub fn draw_point(&mut self, point: Point) {
        self.draw_points(&[point]);
    }

    /// Draws points with the pen.
    pub fn draw_points(&mut self, points: &[Point]) {
        self.draw(|cx| cx.draw_primitive(Primitive::Points(points)));
    }

    /// Draws a closed polygon.
    pub fn draw_polygon(&mut self, points: &[Point], mode: PolygonMode) {
        if mode == PolygonMode::Polyline {
            self.draw_polyline(points);
            return;
        }
        self.draw(|cx| cx.draw_primitive(Primitive::Polygon(points, mode)));
    }

    /// Strokes an open polyline.
    pub fn draw_polyline(&mut self, points: &[Point]) {
        self.draw(|cx| {
            cx.with_saved(|cx| {
                cx.state_mut().set_brush(Brush::none());
                cx.draw_primitive(Primitive::Polygon(points, PolygonMode::Polyline));
            });
        });
    }

    /// Draws the whole of `image` into `target`.
    pub fn draw_image(&mut self, target: Rect, image: &ImageData) {
        let source = Rect::new(0.0, 0.0, f64::from(image.width), f64::from(image.height));
        self.draw_image_rect(target, image, source, ImageConversionFlags::empty());
    }

    /// Draws the `source` part of `image`, in image pixels, into `target`.
    pub fn draw_image_rect(
        &mut self,
        target: Rect,
        image: &ImageData,
        source: Rect,
        flags: ImageConversionFlags,
    ) {
        self.draw(|cx| cx.draw_image(target, image, source, flags, false));
    }

    /// Draws a device-native image.
    pub fn draw_pixmap(&mut self, target: Rect, image: &ImageData, source: Rect) {
        self.draw(|cx| cx.draw_image(target, image, source, ImageConversionFlags::empty(), true));
    }

    /// Draws a text run at `origin` with the pen.
    pub fn draw_text(&mut self, origin: Point, item: &TextItem) {
        self.draw(|cx| cx.draw_text(origin, item, false));
    }

    /// Draws a text run whose layout does not change between frames.
    pub fn draw_static_text(&mut self, origin: Point, item: &TextItem) {
        self.draw(|cx| cx.draw_text(origin, item, true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DeviceMetrics, PaintDevice, PaintEngine, PainterSlot, StateSnapshot};
    use crate::features::PaintEngineFeatures;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use kurbo::Shape;
    use peniko::color::palette::css;

    #[derive(Debug, Default)]
    struct TestEngine {
        features: PaintEngineFeatures,
        active: bool,
        begins: u32,
        ends: u32,
        releases: u32,
        paths: Vec<Affine>,
        transform: Affine,
    }

    impl PaintEngine for TestEngine {
        fn features(&self) -> PaintEngineFeatures {
            self.features
        }

        fn begin(&mut self, _: &DeviceMetrics) -> bool {
            self.active = true;
            self.begins += 1;
            true
        }

        fn end(&mut self) -> bool {
            self.active = false;
            self.ends += 1;
            true
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn update_state(&mut self, state: &StateSnapshot<'_>) {
            self.transform = state.transform();
        }

        fn draw_path(&mut self, _: &BezPath, _: Fill) {
            self.paths.push(self.transform);
        }

        fn draw_image(&mut self, _: Rect, _: &ImageData, _: Rect, _: ImageConversionFlags) {}

        fn draw_text_item(&mut self, _: Point, _: &TextItem) {}

        fn release_cached_resources(&mut self) {
            self.releases += 1;
        }
    }

    #[derive(Debug)]
    struct TestDevice {
        metrics: DeviceMetrics,
        engine: TestEngine,
        slot: PainterSlot,
    }

    impl PaintDevice for TestDevice {
        fn metrics(&self) -> DeviceMetrics {
            self.metrics
        }

        fn paint_engine(&mut self) -> Option<&mut dyn PaintEngine> {
            Some(&mut self.engine)
        }

        fn painter_slot(&mut self) -> Option<&mut PainterSlot> {
            Some(&mut self.slot)
        }
    }

    fn device(width: u32, height: u32) -> (Rc<RefCell<TestDevice>>, DeviceRef) {
        let device = Rc::new(RefCell::new(TestDevice {
            metrics: DeviceMetrics::new(width, height),
            engine: TestEngine {
                features: PaintEngineFeatures::all(),
                ..TestEngine::default()
            },
            slot: PainterSlot::default(),
        }));
        let shared: DeviceRef = device.clone();
        (device, shared)
    }

    #[test]
    fn begin_and_end_drive_the_engine() {
        let (dev, shared) = device(10, 10);
        let mut painter = Painter::new();
        assert!(painter.begin(shared).is_ok());
        assert!(painter.is_active());
        assert!(dev.borrow().engine.active);
        assert!(painter.end());
        assert!(!painter.is_active());
        assert!(!painter.end(), "second end reports inactive");
        let engine = &dev.borrow().engine;
        assert_eq!((engine.begins, engine.ends, engine.releases), (1, 1, 1));
    }

    #[test]
    fn failed_begin_leaves_painter_inactive() {
        let (dev, shared) = device(0, 10);
        let mut painter = Painter::new();
        assert_eq!(
            painter.begin(shared),
            Err(BeginError::DegenerateDevice {
                width: 0,
                height: 10
            })
        );
        assert!(!painter.is_active());
        assert_eq!(dev.borrow().engine.begins, 0);
        assert!(!dev.borrow_mut().slot.is_occupied());
    }

    #[test]
    fn painter_leaving_a_borrowed_session_still_counts() {
        let (dev, shared) = device(10, 10);
        let mut first = Painter::new();
        first.begin(shared.clone()).unwrap();
        let mut second = Painter::new();
        second.begin(shared).unwrap();
        let session = Rc::clone(&second.attachment.as_ref().unwrap().session);
        let held = session.borrow();
        assert!(second.end());
        drop(held);

        assert!(first.end());
        assert!(!dev.borrow_mut().slot.is_occupied());
        let engine = &dev.borrow().engine;
        assert_eq!((engine.begins, engine.ends), (1, 1));
    }

    #[test]
    fn inactive_painter_ignores_calls() {
        let mut painter = Painter::new();
        painter.set_opacity(0.5);
        painter.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        painter.restore();
        assert_eq!(painter.opacity(), 1.0);
        assert_eq!(painter.save_depth(), 0);
    }

    #[test]
    fn unbalanced_restore_changes_nothing() {
        let (_dev, shared) = device(10, 10);
        let mut painter = Painter::new();
        painter.begin(shared).unwrap();
        painter.set_opacity(0.5);
        painter.restore();
        assert_eq!(painter.opacity(), 0.5);
        painter.save();
        painter.set_opacity(0.25);
        painter.restore();
        assert_eq!(painter.opacity(), 0.5);
        assert_eq!(painter.save_depth(), 0);
    }

    #[test]
    fn engine_sees_device_transform_lazily() {
        let (dev, shared) = device(10, 10);
        let mut painter = Painter::new();
        painter.begin(shared).unwrap();
        painter.translate(Vec2::new(2.0, 3.0));
        assert!(dev.borrow().engine.paths.is_empty());
        painter.draw_path(&Rect::new(0.0, 0.0, 1.0, 1.0).to_path(0.1));
        assert_eq!(
            dev.borrow().engine.paths,
            [Affine::translate((2.0, 3.0))]
        );
    }

    #[test]
    fn second_painter_shares_and_restores_state() {
        let (dev, shared) = device(10, 10);
        let mut first = Painter::new();
        first.begin(shared.clone()).unwrap();
        first.set_pen(Pen::solid(css::RED, 2.0));

        let mut second = Painter::new();
        second.begin(shared).unwrap();
        assert_eq!(second.pen(), Pen::solid(css::RED, 2.0));
        second.set_pen(Pen::solid(css::BLUE, 1.0));
        assert_eq!(first.pen(), Pen::solid(css::BLUE, 1.0));

        second.restore();
        assert_eq!(second.pen(), Pen::solid(css::BLUE, 1.0), "cannot restore below attach");

        assert!(second.end());
        assert_eq!(first.pen(), Pen::solid(css::RED, 2.0));
        assert_eq!(dev.borrow().engine.ends, 0);
        assert!(first.end());
        assert_eq!(dev.borrow().engine.ends, 1);
    }

    #[test]
    fn dropping_an_active_painter_ends_it() {
        let (dev, shared) = device(10, 10);
        {
            let mut painter = Painter::new();
            painter.begin(shared).unwrap();
        }
        assert_eq!(dev.borrow().engine.ends, 1);
    }

    #[test]
    fn clipping_needs_a_clip() {
        let (_dev, shared) = device(10, 10);
        let mut painter = Painter::new();
        painter.begin(shared).unwrap();
        painter.set_clipping(true);
        assert!(!painter.has_clipping());
        painter.set_clip_rect(Rect::new(0.0, 0.0, 4.0, 4.0), ClipOperation::ReplaceClip);
        painter.set_clipping(false);
        painter.set_clipping(true);
        assert!(painter.has_clipping());
    }

    #[test]
    fn clip_queries_are_logical() {
        let (_dev, shared) = device(100, 100);
        let mut painter = Painter::new();
        painter.begin(shared).unwrap();
        painter.set_clip_pixel_rect(Rect::new(10.0, 10.0, 30.0, 30.0), ClipOperation::ReplaceClip);
        painter.translate(Vec2::new(10.0, 0.0));
        assert_eq!(painter.clip_bounding_rect(), Rect::new(0.0, 10.0, 20.0, 30.0));
        assert_eq!(
            painter.clip_region(),
            Region::from_rect(Rect::new(0.0, 10.0, 20.0, 30.0))
        );
        painter.scale(0.0, 1.0);
        assert!(painter.clip_region().is_empty(), "singular transform has no logical clip");
    }

    #[test]
    fn path_clip_region_is_scanned_at_device_resolution() {
        let (_dev, shared) = device(100, 100);
        let mut painter = Painter::new();
        painter.begin(shared).unwrap();
        let circle = kurbo::Circle::new((50.0, 50.0), 40.0).to_path(0.1);
        painter.set_clip_path(circle, Fill::NonZero, ClipOperation::ReplaceClip);
        painter.scale(1e-4, 1e-4);

        let region = painter.clip_region();
        assert!(region.rects().len() <= 100, "one band per device row at most");
        let bounds = region.bounding_rect();
        for (got, want) in [
            (bounds.x0, 1e5),
            (bounds.y0, 1e5),
            (bounds.x1, 9e5),
            (bounds.y1, 9e5),
        ] {
            assert!((got - want).abs() < 1e-3, "{bounds:?}");
        }
    }

    #[test]
    fn unsupported_composition_mode_is_refused() {
        let (dev, shared) = device(10, 10);
        dev.borrow_mut().engine.features = PaintEngineFeatures::empty();
        let mut painter = Painter::new();
        painter.begin(shared).unwrap();
        painter.set_composition_mode(CompositionMode::Xor);
        assert_eq!(painter.composition_mode(), CompositionMode::SourceOver);
    }
}
