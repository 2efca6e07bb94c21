// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_painter_vello_cpu --heading-base-level=0

//! Vello CPU–backed paint device for `understory_painter`.
//!
//! [`VelloCpuDevice`] is a raster image whose [`VelloCpuPaintEngine`] draws
//! with the sparse-strips [`vello_cpu::RenderContext`]. The engine renders
//! transforms, gradients, pattern and texture brushes, constant opacity and
//! blend modes natively; the feature set it advertises can be narrowed with
//! [`VelloCpuDevice::with_features`] to exercise the painter's emulation on
//! real pixels.
//!
//! The device clip is applied as a stack of clip layers rebuilt whenever the
//! clip changes. Opacity and non-default composition modes wrap each
//! primitive in its own layer.

#![no_std]

extern crate alloc;

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use kurbo::{Affine, BezPath, Point, Rect, Shape};
use peniko::{
    BlendMode, Blob, Extend, Fill, ImageAlphaType, ImageData, ImageFormat, ImageQuality,
    ImageSampler,
};
use understory_painter::{
    Brush, BrushKind, DeviceMetrics, DeviceRef, DirtyFlags, ImageConversionFlags,
    PaintDevice, PaintEngine, PaintEngineFeatures, PainterSlot, Pen, RenderHints, ResolvedClip,
    StateSnapshot, TextItem,
};
use vello_cpu::kurbo::Affine as CpuAffine;
use vello_cpu::{
    Image as CpuImage, ImageSource, Pixmap, RenderContext, RenderMode, RenderSettings,
};

const CLIP_TOLERANCE: f64 = 0.1;

fn affine_to_cpu(xf: Affine) -> CpuAffine {
    CpuAffine::new(xf.as_coeffs())
}

fn render_settings() -> RenderSettings {
    RenderSettings {
        render_mode: RenderMode::OptimizeSpeed,
        ..RenderSettings::default()
    }
}

/// Sets `brush` as the current paint. Returns `false` if it paints nothing.
///
/// `transform` is the current logical-to-device transform; pattern brushes
/// stay aligned to the device unless `hints` ask otherwise.
fn apply_paint(
    ctx: &mut RenderContext,
    brush: &Brush,
    origin: Point,
    transform: Affine,
    hints: RenderHints,
) -> bool {
    let repeat = ImageSampler {
        x_extend: Extend::Repeat,
        y_extend: Extend::Repeat,
        quality: ImageQuality::Low,
        ..ImageSampler::default()
    };
    let pattern_transform = |brush: &Brush| {
        let logical = Affine::translate(origin.to_vec2()) * brush.transform();
        if hints.contains(RenderHints::NON_COSMETIC_BRUSH_PATTERNS) {
            return logical;
        }
        let device_origin = transform * origin;
        match understory_painter::invert(transform) {
            Some(inverse) => {
                inverse * Affine::translate(device_origin.to_vec2()) * brush.transform()
            }
            None => logical,
        }
    };
    match brush.kind() {
        BrushKind::None => return false,
        BrushKind::Solid(color) => {
            ctx.set_paint(*color);
            ctx.set_paint_transform(CpuAffine::IDENTITY);
        }
        BrushKind::Pattern { pattern, color } => {
            let tile = pattern.to_image(*color);
            ctx.set_paint(CpuImage {
                image: ImageSource::from_peniko_image_data(&tile),
                sampler: repeat,
            });
            ctx.set_paint_transform(affine_to_cpu(pattern_transform(brush)));
        }
        BrushKind::Gradient { gradient, .. } => {
            ctx.set_paint((**gradient).clone());
            ctx.set_paint_transform(affine_to_cpu(brush.transform()));
        }
        BrushKind::Texture(image) => {
            ctx.set_paint(CpuImage {
                image: ImageSource::from_peniko_image_data(image),
                sampler: repeat,
            });
            ctx.set_paint_transform(affine_to_cpu(pattern_transform(brush)));
        }
    }
    true
}

/// The features [`VelloCpuPaintEngine`] renders natively.
pub const NATIVE_FEATURES: PaintEngineFeatures = PaintEngineFeatures::PRIMITIVE_TRANSFORM
    .union(PaintEngineFeatures::PATTERN_TRANSFORM)
    .union(PaintEngineFeatures::PIXMAP_TRANSFORM)
    .union(PaintEngineFeatures::PATTERN_BRUSH)
    .union(PaintEngineFeatures::LINEAR_GRADIENT_FILL)
    .union(PaintEngineFeatures::RADIAL_GRADIENT_FILL)
    .union(PaintEngineFeatures::CONICAL_GRADIENT_FILL)
    .union(PaintEngineFeatures::ALPHA_BLEND)
    .union(PaintEngineFeatures::PORTER_DUFF)
    .union(PaintEngineFeatures::PAINTER_PATHS)
    .union(PaintEngineFeatures::ANTIALIASING)
    .union(PaintEngineFeatures::BRUSH_STROKE)
    .union(PaintEngineFeatures::CONSTANT_OPACITY)
    .union(PaintEngineFeatures::MASKED_BRUSH)
    .union(PaintEngineFeatures::BLEND_MODES);

/// Paint engine drawing into a `vello_cpu` render context.
pub struct VelloCpuPaintEngine {
    ctx: RenderContext,
    width: u16,
    height: u16,
    features: PaintEngineFeatures,
    active: bool,

    transform: Affine,
    pen: Pen,
    brush: Brush,
    brush_origin: Point,
    opacity: f32,
    blend: Option<BlendMode>,
    hints: RenderHints,
    /// Clip layers currently pushed for the device clip.
    clip_layers: usize,
}

impl fmt::Debug for VelloCpuPaintEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VelloCpuPaintEngine")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("features", &self.features)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl VelloCpuPaintEngine {
    /// An engine for a `width` by `height` pixel image.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            ctx: RenderContext::new_with(width, height, render_settings()),
            width,
            height,
            features: NATIVE_FEATURES,
            active: false,
            transform: Affine::IDENTITY,
            pen: Pen::default(),
            brush: Brush::none(),
            brush_origin: Point::ORIGIN,
            opacity: 1.0,
            blend: None,
            hints: RenderHints::default(),
            clip_layers: 0,
        }
    }

    /// Narrows or widens the advertised features.
    pub fn set_features(&mut self, features: PaintEngineFeatures) {
        self.features = features;
    }

    /// Renders everything drawn so far into premultiplied RGBA8 bytes.
    #[must_use]
    pub fn render_rgba8(&mut self) -> Vec<u8> {
        let mut pixmap = Pixmap::new(self.width, self.height);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);
        let mut bytes = Vec::with_capacity(pixmap.data().len() * 4);
        for p in pixmap.data() {
            bytes.extend_from_slice(&[p.r, p.g, p.b, p.a]);
        }
        bytes
    }

    /// Discards everything drawn so far.
    pub fn clear(&mut self) {
        self.ctx.reset();
        self.clip_layers = 0;
    }

    fn pop_clip_layers(&mut self) {
        for _ in 0..self.clip_layers {
            self.ctx.pop_layer();
        }
        self.clip_layers = 0;
    }

    fn push_clip_layers(&mut self, clip: &ResolvedClip) {
        self.pop_clip_layers();
        if clip.is_unclipped() {
            return;
        }
        self.ctx.set_transform(CpuAffine::IDENTITY);
        if let Some(region) = clip.region() {
            self.ctx.set_fill_rule(Fill::NonZero);
            self.ctx.push_clip_layer(&region.to_path());
            self.clip_layers += 1;
        }
        for (path, fill) in clip.paths() {
            self.ctx.set_fill_rule(*fill);
            self.ctx.push_clip_layer(path);
            self.clip_layers += 1;
        }
        tracing::trace!(layers = self.clip_layers, "device clip rebuilt");
    }

    /// Wraps the next primitive in a layer for opacity and blending.
    fn push_composite_layer(&mut self) -> bool {
        let blend = self
            .blend
            .filter(|mode| *mode != BlendMode::default());
        let opacity = (self.opacity < 1.0).then_some(self.opacity);
        if blend.is_none() && opacity.is_none() {
            return false;
        }
        self.ctx.push_layer(None, blend, opacity, None, None);
        true
    }

    fn fill(&mut self, path: &BezPath, fill: Fill) {
        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_fill_rule(fill);
        if apply_paint(
            &mut self.ctx,
            &self.brush,
            self.brush_origin,
            self.transform,
            self.hints,
        ) {
            self.ctx.fill_path(path);
        }
    }

    fn stroke(&mut self, path: &BezPath) {
        if !self.pen.is_visible() {
            return;
        }
        let stroke = self.pen.to_stroke();
        if self.pen.is_cosmetic() {
            // Width is in device pixels: stroke the device-space path.
            let device_path = self.transform * path.clone();
            let brush = match self.pen.brush().kind() {
                BrushKind::Gradient { .. } => {
                    let xf = self.transform * self.pen.brush().transform();
                    self.pen.brush().clone().with_transform(xf)
                }
                _ => self.pen.brush().clone(),
            };
            self.ctx.set_transform(CpuAffine::IDENTITY);
            if apply_paint(
                &mut self.ctx,
                &brush,
                self.transform * self.brush_origin,
                Affine::IDENTITY,
                self.hints,
            ) {
                self.ctx.set_stroke(stroke);
                self.ctx.stroke_path(&device_path);
            }
            return;
        }
        self.ctx.set_transform(affine_to_cpu(self.transform));
        if apply_paint(
            &mut self.ctx,
            self.pen.brush(),
            self.brush_origin,
            self.transform,
            self.hints,
        ) {
            self.ctx.set_stroke(stroke);
            self.ctx.stroke_path(path);
        }
    }
}

impl PaintEngine for VelloCpuPaintEngine {
    fn features(&self) -> PaintEngineFeatures {
        self.features
    }

    fn begin(&mut self, metrics: &DeviceMetrics) -> bool {
        if metrics.width != u32::from(self.width) || metrics.height != u32::from(self.height) {
            return false;
        }
        self.active = true;
        true
    }

    fn end(&mut self) -> bool {
        self.pop_clip_layers();
        self.active = false;
        true
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn update_state(&mut self, state: &StateSnapshot<'_>) {
        if let Some(pen) = state.pen() {
            self.pen = pen.clone();
        }
        if let Some(brush) = state.brush() {
            self.brush = brush.clone();
        }
        if let Some(origin) = state.brush_origin() {
            self.brush_origin = origin;
        }
        if let Some(opacity) = state.opacity() {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "opacity is clamped to 0..=1"
            )]
            let opacity = opacity as f32;
            self.opacity = opacity;
        }
        if let Some(hints) = state.render_hints() {
            self.hints = hints;
        }
        self.transform = state.transform();
        self.blend = state.composition_mode().to_blend_mode();
        if state.dirty().intersects(DirtyFlags::DEVICE_CLIP) {
            self.push_clip_layers(state.clip());
        }
    }

    fn draw_path(&mut self, path: &BezPath, fill: Fill) {
        let layer = self.push_composite_layer();
        if self.brush.is_visible() {
            self.fill(path, fill);
        }
        self.stroke(path);
        if layer {
            self.ctx.pop_layer();
        }
    }

    fn draw_image(
        &mut self,
        target: Rect,
        image: &ImageData,
        source: Rect,
        _flags: ImageConversionFlags,
    ) {
        if source.width() == 0.0 || source.height() == 0.0 {
            return;
        }
        let layer = self.push_composite_layer();
        let local = Affine::translate(target.origin().to_vec2())
            * Affine::scale_non_uniform(
                target.width() / source.width(),
                target.height() / source.height(),
            )
            * Affine::translate(-source.origin().to_vec2());
        let quality = if self.hints.contains(RenderHints::SMOOTH_PIXMAP_TRANSFORM) {
            ImageQuality::Medium
        } else {
            ImageQuality::Low
        };

        // Clip to the target in the current transform.
        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_fill_rule(Fill::NonZero);
        self.ctx.push_clip_layer(&target.to_path(CLIP_TOLERANCE));

        self.ctx.set_transform(affine_to_cpu(self.transform * local));
        self.ctx.set_paint_transform(CpuAffine::IDENTITY);
        self.ctx.set_paint(CpuImage {
            image: ImageSource::from_peniko_image_data(image),
            sampler: ImageSampler {
                quality,
                ..ImageSampler::default()
            },
        });
        let rect = Rect::new(0.0, 0.0, f64::from(image.width), f64::from(image.height));
        self.ctx.fill_rect(&rect);

        self.ctx.pop_layer(); // pop clip
        if layer {
            self.ctx.pop_layer();
        }
    }

    fn draw_text_item(&mut self, origin: Point, item: &TextItem) {
        if !self.pen.is_visible() {
            return;
        }
        let layer = self.push_composite_layer();
        let outline = Affine::translate(origin.to_vec2()) * item.outline.clone();
        self.ctx.set_transform(affine_to_cpu(self.transform));
        self.ctx.set_fill_rule(Fill::NonZero);
        if apply_paint(
            &mut self.ctx,
            self.pen.brush(),
            self.brush_origin,
            self.transform,
            self.hints,
        ) {
            self.ctx.fill_path(&outline);
        }
        if layer {
            self.ctx.pop_layer();
        }
    }

    fn create_offscreen(&self, width: u32, height: u32) -> Option<DeviceRef> {
        let width = u16::try_from(width).ok()?;
        let height = u16::try_from(height).ok()?;
        Some(Rc::new(RefCell::new(VelloCpuDevice::new(width, height))))
    }

    fn release_cached_resources(&mut self) {
        self.pen = Pen::default();
        self.brush = Brush::none();
    }
}

/// A raster image painted by a [`VelloCpuPaintEngine`].
#[derive(Debug)]
pub struct VelloCpuDevice {
    engine: VelloCpuPaintEngine,
    device_pixel_ratio: f64,
    slot: PainterSlot,
}

impl VelloCpuDevice {
    /// A transparent image of `width` by `height` pixels.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            engine: VelloCpuPaintEngine::new(width, height),
            device_pixel_ratio: 1.0,
            slot: PainterSlot::default(),
        }
    }

    /// Sets the features the engine advertises.
    #[must_use]
    pub fn with_features(mut self, features: PaintEngineFeatures) -> Self {
        self.engine.set_features(features);
        self
    }

    /// Sets the device pixel ratio.
    #[must_use]
    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    /// The engine.
    pub fn engine_mut(&mut self) -> &mut VelloCpuPaintEngine {
        &mut self.engine
    }

    /// Premultiplied RGBA8 pixels, row by row.
    #[must_use]
    pub fn pixels(&mut self) -> Vec<u8> {
        self.engine.render_rgba8()
    }
}

impl PaintDevice for VelloCpuDevice {
    fn metrics(&self) -> DeviceMetrics {
        DeviceMetrics {
            width: u32::from(self.engine.width),
            height: u32::from(self.engine.height),
            device_pixel_ratio: self.device_pixel_ratio,
        }
    }

    fn paint_engine(&mut self) -> Option<&mut dyn PaintEngine> {
        Some(&mut self.engine)
    }

    fn painter_slot(&mut self) -> Option<&mut PainterSlot> {
        Some(&mut self.slot)
    }

    fn grab_image(&mut self) -> Option<ImageData> {
        let bytes = self.engine.render_rgba8();
        Some(ImageData {
            data: Blob::from(bytes),
            format: ImageFormat::Rgba8,
            alpha_type: ImageAlphaType::AlphaPremultiplied,
            width: u32::from(self.engine.width),
            height: u32::from(self.engine.height),
        })
    }
}
