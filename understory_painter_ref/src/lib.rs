// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_painter_ref --heading-base-level=0

//! Understory Painter Reference Engine.
//!
//! This crate provides [`RecordingDevice`], a [`PaintDevice`] whose
//! [`RecordingEngine`] logs every lifecycle call, state sync and primitive it
//! receives, together with the engine state at that moment.
//!
//! It is intended for tests and debugging that want to assert on what the
//! painter hands to an engine:
//! - It does **not** rasterize; offscreen images read back as transparent.
//! - Its advertised features are configurable, so tests can force the
//!   painter to negotiate and emulate.
//! - Offscreen devices it creates for fallback compositing are kept, so
//!   the primitives drawn by nested painters can be inspected too.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use kurbo::{Affine, BezPath, Line, Point, Rect, Vec2};
use peniko::{Blob, Fill, ImageAlphaType, ImageData, ImageFormat};
use understory_painter::{
    BackgroundMode, Brush, CompositionMode, DeviceKind, DeviceMetrics, DeviceRef, DirtyFlags,
    ImageConversionFlags, PaintDevice, PaintEngine, PaintEngineFeatures, PainterSlot, Pen,
    PolygonMode, RenderHints, ResolvedClip, StateSnapshot, TextItem,
};

/// The engine-side copy of the painter state.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineState {
    /// Logical to device transform.
    pub transform: Affine,
    /// Current pen.
    pub pen: Pen,
    /// Current brush.
    pub brush: Brush,
    /// Brush origin in logical coordinates.
    pub brush_origin: Point,
    /// Background brush.
    pub background: Brush,
    /// Background mode.
    pub background_mode: BackgroundMode,
    /// Constant opacity.
    pub opacity: f64,
    /// Composition mode.
    pub composition_mode: CompositionMode,
    /// Render hints.
    pub render_hints: RenderHints,
    /// Whether clipping is enabled.
    pub clip_enabled: bool,
    /// Device-space clip.
    pub clip: ResolvedClip,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            pen: Pen::default(),
            brush: Brush::none(),
            brush_origin: Point::ORIGIN,
            background: Brush::none(),
            background_mode: BackgroundMode::Transparent,
            opacity: 1.0,
            composition_mode: CompositionMode::SourceOver,
            render_hints: RenderHints::default(),
            clip_enabled: false,
            clip: ResolvedClip::unclipped(),
        }
    }
}

/// A primitive as received by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    /// [`PaintEngine::draw_path`].
    Path {
        /// The path, in logical coordinates.
        path: BezPath,
        /// Fill rule.
        fill: Fill,
    },
    /// [`PaintEngine::draw_rects`].
    Rects(Vec<Rect>),
    /// [`PaintEngine::draw_lines`].
    Lines(Vec<Line>),
    /// [`PaintEngine::draw_points`].
    Points(Vec<Point>),
    /// [`PaintEngine::draw_polygon`].
    Polygon {
        /// Vertices.
        points: Vec<Point>,
        /// How the vertices are interpreted.
        mode: PolygonMode,
    },
    /// [`PaintEngine::draw_ellipse`].
    Ellipse(Rect),
    /// [`PaintEngine::draw_image`] and [`PaintEngine::draw_pixmap`].
    Image {
        /// Target rectangle.
        target: Rect,
        /// Source rectangle in image pixels.
        source: Rect,
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Conversion hints; empty for pixmaps.
        flags: ImageConversionFlags,
        /// Whether the image came through [`PaintEngine::draw_pixmap`].
        pixmap: bool,
    },
    /// [`PaintEngine::draw_text_item`] and
    /// [`PaintEngine::draw_static_text_item`].
    Text {
        /// Run origin.
        origin: Point,
        /// The characters.
        text: String,
        /// Whether the run came through the static entry point.
        is_static: bool,
    },
}

/// Event recorded by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The engine began a session.
    Begin(DeviceMetrics),
    /// A state sync and the state after applying it.
    State {
        /// Fields the painter reported as changed.
        dirty: DirtyFlags,
        /// Engine state after the sync.
        state: EngineState,
    },
    /// A primitive and the state it was drawn with.
    Draw {
        /// The primitive.
        op: DrawOp,
        /// Engine state at the time of drawing.
        state: EngineState,
    },
    /// Session caches were released.
    ReleaseCaches,
    /// The engine ended its session.
    End,
}

/// A paint engine that records what it is asked to do.
#[derive(Debug)]
pub struct RecordingEngine {
    features: PaintEngineFeatures,
    active: bool,
    system_rect: Option<Rect>,
    events: Vec<Event>,
    state: EngineState,
    offscreens: RefCell<Vec<Rc<RefCell<RecordingDevice>>>>,
}

impl RecordingEngine {
    /// An inactive engine advertising `features`.
    #[must_use]
    pub fn new(features: PaintEngineFeatures) -> Self {
        Self {
            features,
            active: false,
            system_rect: None,
            events: Vec::new(),
            state: EngineState::default(),
            offscreens: RefCell::new(Vec::new()),
        }
    }

    /// Changes the advertised features.
    pub fn set_features(&mut self, features: PaintEngineFeatures) {
        self.features = features;
    }

    /// Restricts painting to `rect`, in device pixels.
    pub fn set_system_rect(&mut self, rect: Option<Rect>) {
        self.system_rect = rect;
    }

    /// Returns a slice of recorded events.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The primitives received so far, in order.
    pub fn draws(&self) -> impl Iterator<Item = &DrawOp> {
        self.events.iter().filter_map(|event| match event {
            Event::Draw { op, .. } => Some(op),
            _ => None,
        })
    }

    /// The current engine state.
    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Offscreen devices created for fallback compositing, oldest first.
    #[must_use]
    pub fn offscreens(&self) -> Vec<Rc<RefCell<RecordingDevice>>> {
        self.offscreens.borrow().clone()
    }

    /// Clears recorded events and forgets offscreen devices.
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.offscreens.borrow_mut().clear();
    }

    fn record(&mut self, op: DrawOp) {
        self.events.push(Event::Draw {
            op,
            state: self.state.clone(),
        });
    }
}

impl PaintEngine for RecordingEngine {
    fn features(&self) -> PaintEngineFeatures {
        self.features
    }

    fn begin(&mut self, metrics: &DeviceMetrics) -> bool {
        self.active = true;
        self.state = EngineState::default();
        self.events.push(Event::Begin(*metrics));
        true
    }

    fn end(&mut self) -> bool {
        self.active = false;
        self.events.push(Event::End);
        true
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn system_rect(&self) -> Option<Rect> {
        self.system_rect
    }

    fn update_state(&mut self, snapshot: &StateSnapshot<'_>) {
        let state = &mut self.state;
        if let Some(pen) = snapshot.pen() {
            state.pen = pen.clone();
        }
        if let Some(brush) = snapshot.brush() {
            state.brush = brush.clone();
        }
        if let Some(origin) = snapshot.brush_origin() {
            state.brush_origin = origin;
        }
        if let Some(background) = snapshot.background() {
            state.background = background.clone();
        }
        if let Some(mode) = snapshot.background_mode() {
            state.background_mode = mode;
        }
        if let Some(opacity) = snapshot.opacity() {
            state.opacity = opacity;
        }
        if let Some(hints) = snapshot.render_hints() {
            state.render_hints = hints;
        }
        if let Some(enabled) = snapshot.clip_enabled() {
            state.clip_enabled = enabled;
        }
        state.transform = snapshot.transform();
        state.composition_mode = snapshot.composition_mode();
        state.clip = snapshot.clip().clone();
        self.events.push(Event::State {
            dirty: snapshot.dirty(),
            state: self.state.clone(),
        });
    }

    fn draw_path(&mut self, path: &BezPath, fill: Fill) {
        self.record(DrawOp::Path {
            path: path.clone(),
            fill,
        });
    }

    fn draw_rects(&mut self, rects: &[Rect]) {
        self.record(DrawOp::Rects(rects.to_vec()));
    }

    fn draw_lines(&mut self, lines: &[Line]) {
        self.record(DrawOp::Lines(lines.to_vec()));
    }

    fn draw_points(&mut self, points: &[Point]) {
        self.record(DrawOp::Points(points.to_vec()));
    }

    fn draw_polygon(&mut self, points: &[Point], mode: PolygonMode) {
        self.record(DrawOp::Polygon {
            points: points.to_vec(),
            mode,
        });
    }

    fn draw_ellipse(&mut self, rect: Rect) {
        self.record(DrawOp::Ellipse(rect));
    }

    fn draw_image(
        &mut self,
        target: Rect,
        image: &ImageData,
        source: Rect,
        flags: ImageConversionFlags,
    ) {
        self.record(DrawOp::Image {
            target,
            source,
            width: image.width,
            height: image.height,
            flags,
            pixmap: false,
        });
    }

    fn draw_pixmap(&mut self, target: Rect, image: &ImageData, source: Rect) {
        self.record(DrawOp::Image {
            target,
            source,
            width: image.width,
            height: image.height,
            flags: ImageConversionFlags::empty(),
            pixmap: true,
        });
    }

    fn draw_text_item(&mut self, origin: Point, item: &TextItem) {
        self.record(DrawOp::Text {
            origin,
            text: item.text.clone(),
            is_static: false,
        });
    }

    fn draw_static_text_item(&mut self, origin: Point, item: &TextItem) {
        self.record(DrawOp::Text {
            origin,
            text: item.text.clone(),
            is_static: true,
        });
    }

    fn create_offscreen(&self, width: u32, height: u32) -> Option<DeviceRef> {
        let device = Rc::new(RefCell::new(RecordingDevice::new(width, height)));
        self.offscreens.borrow_mut().push(Rc::clone(&device));
        Some(device)
    }

    fn release_cached_resources(&mut self) {
        self.events.push(Event::ReleaseCaches);
    }
}

/// A paint device backed by a [`RecordingEngine`].
///
/// The device offers a [`PainterSlot`], so several painters may share it.
#[derive(Debug)]
pub struct RecordingDevice {
    metrics: DeviceMetrics,
    kind: DeviceKind,
    redirection_offset: Vec2,
    engine: RecordingEngine,
    slot: PainterSlot,
    #[cfg(feature = "std")]
    owner: Option<std::thread::ThreadId>,
}

impl RecordingDevice {
    /// A device of `width` by `height` pixels whose engine supports everything.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            metrics: DeviceMetrics::new(width, height),
            kind: DeviceKind::Recording,
            redirection_offset: Vec2::ZERO,
            engine: RecordingEngine::new(PaintEngineFeatures::all()),
            slot: PainterSlot::default(),
            #[cfg(feature = "std")]
            owner: None,
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
        self.metrics.device_pixel_ratio = ratio;
        self
    }

    /// Sets the device kind.
    #[must_use]
    pub fn with_kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the offset of this device inside its redirection target.
    #[must_use]
    pub fn with_redirection_offset(mut self, offset: Vec2) -> Self {
        self.redirection_offset = offset;
        self
    }

    /// Marks the device as owned by `thread`.
    #[cfg(feature = "std")]
    #[must_use]
    pub fn with_owner_thread(mut self, thread: std::thread::ThreadId) -> Self {
        self.owner = Some(thread);
        self
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &RecordingEngine {
        &self.engine
    }

    /// The engine, mutably.
    pub fn engine_mut(&mut self) -> &mut RecordingEngine {
        &mut self.engine
    }
}

impl PaintDevice for RecordingDevice {
    fn metrics(&self) -> DeviceMetrics {
        self.metrics
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn paint_engine(&mut self) -> Option<&mut dyn PaintEngine> {
        Some(&mut self.engine)
    }

    fn redirection_offset(&self) -> Vec2 {
        self.redirection_offset
    }

    fn painter_slot(&mut self) -> Option<&mut PainterSlot> {
        Some(&mut self.slot)
    }

    #[cfg(feature = "std")]
    fn owner_thread(&self) -> Option<std::thread::ThreadId> {
        self.owner
    }

    fn grab_image(&mut self) -> Option<ImageData> {
        let pixels = usize::try_from(self.metrics.width)
            .ok()?
            .checked_mul(usize::try_from(self.metrics.height).ok()?)?;
        Some(ImageData {
            data: Blob::from(vec![0_u8; pixels * 4]),
            format: ImageFormat::Rgba8,
            alpha_type: ImageAlphaType::AlphaPremultiplied,
            width: self.metrics.width,
            height: self.metrics.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css;
    use understory_painter::{ClipOperation, Painter};

    fn device(width: u32, height: u32) -> Rc<RefCell<RecordingDevice>> {
        Rc::new(RefCell::new(RecordingDevice::new(width, height)))
    }

    #[test]
    fn state_reaches_the_engine_before_the_primitive() {
        let dev = device(20, 20);
        let mut painter = Painter::new();
        painter.begin(dev.clone()).unwrap();
        painter.set_brush(Brush::solid(css::RED));
        assert_eq!(dev.borrow().engine().events().len(), 1, "only begin so far");

        painter.draw_rect(Rect::new(1.0, 1.0, 5.0, 5.0));
        let dev = dev.borrow();
        let events = dev.engine().events();
        assert!(matches!(events[1], Event::State { .. }));
        let Event::Draw { op, state } = &events[2] else {
            panic!("expected a draw after the sync");
        };
        assert_eq!(op, &DrawOp::Rects(vec![Rect::new(1.0, 1.0, 5.0, 5.0)]));
        assert_eq!(state.brush, Brush::solid(css::RED));
    }

    #[test]
    fn unchanged_state_is_not_synced_again() {
        let dev = device(20, 20);
        let mut painter = Painter::new();
        painter.begin(dev.clone()).unwrap();
        painter.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        painter.draw_rect(Rect::new(2.0, 0.0, 3.0, 1.0));
        let syncs = dev
            .borrow()
            .engine()
            .events()
            .iter()
            .filter(|e| matches!(e, Event::State { .. }))
            .count();
        assert_eq!(syncs, 1);
    }

    #[test]
    fn caches_are_released_before_end() {
        let dev = device(4, 4);
        let mut painter = Painter::new();
        painter.begin(dev.clone()).unwrap();
        painter.end();
        let dev = dev.borrow();
        let events = dev.engine().events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], Event::ReleaseCaches);
        assert_eq!(events[2], Event::End);
    }

    #[test]
    fn clip_is_handed_over_in_device_space() {
        let dev = Rc::new(RefCell::new(
            RecordingDevice::new(40, 40).with_device_pixel_ratio(2.0),
        ));
        let mut painter = Painter::new();
        painter.begin(dev.clone()).unwrap();
        painter.set_clip_pixel_rect(Rect::new(1.0, 2.0, 5.0, 6.0), ClipOperation::ReplaceClip);
        painter.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let dev = dev.borrow();
        let clip = &dev.engine().state().clip;
        assert_eq!(
            clip.region().map(|r| r.bounding_rect()),
            Some(Rect::new(2.0, 4.0, 10.0, 12.0))
        );
        assert!(dev.engine().state().clip_enabled);
    }

    #[test]
    fn grabbed_offscreen_image_is_transparent() {
        let mut dev = RecordingDevice::new(3, 2);
        let image = dev.grab_image().unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert!(image.data.data().iter().all(|b| *b == 0));
    }
}
