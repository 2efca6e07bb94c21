// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The paint device and paint engine interfaces.
//!
//! A [`PaintDevice`] is a surface; it owns the [`PaintEngine`] that draws on
//! it. The painter talks to engines through one flat trait: a feature query,
//! lifecycle calls, a state sync that receives an immutable
//! [`StateSnapshot`], and drawing entry points. Most entry points have
//! defaults built on [`PaintEngine::draw_path`], so a minimal engine only
//! implements paths, images and text.

use alloc::rc::{Rc, Weak};
use alloc::string::String;
use core::cell::RefCell;
use core::fmt;

use bitflags::bitflags;
use kurbo::{Affine, BezPath, Ellipse, Line, Point, Rect, Shape, Vec2};
use peniko::{Fill, ImageData};

use crate::clip::ResolvedClip;
use crate::dirty::DirtyFlags;
use crate::features::PaintEngineFeatures;
use crate::session::Session;
use crate::state::PainterState;
use crate::style::{BackgroundMode, Brush, CompositionMode, Font, Pen, RenderHints};

/// A shared handle to a paint device.
///
/// Painters keep the device alive for the duration of a session; several
/// painters may hold the same device at once when they share a session.
pub type DeviceRef = Rc<RefCell<dyn PaintDevice>>;

/// Size and resolution of a device.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DeviceMetrics {
    /// Width in device pixels.
    pub width: u32,
    /// Height in device pixels.
    pub height: u32,
    /// Device pixels per logical pixel.
    pub device_pixel_ratio: f64,
}

impl DeviceMetrics {
    /// Metrics for a device with a pixel ratio of one.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio: 1.0,
        }
    }

    /// The device extent in device pixels.
    #[must_use]
    pub fn device_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    /// The device extent in logical pixels.
    #[must_use]
    pub fn logical_rect(&self) -> Rect {
        let ratio = if self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        Rect::new(
            0.0,
            0.0,
            f64::from(self.width) / ratio,
            f64::from(self.height) / ratio,
        )
    }
}

/// What kind of surface a device is.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// An in-memory raster image.
    #[default]
    Image,
    /// An on-screen surface owned by a window-system thread.
    Widget,
    /// A command recorder.
    Recording,
    /// A printer page.
    Printer,
}

impl DeviceKind {
    /// Returns `true` if painting must happen on the thread that owns the device.
    #[must_use]
    pub const fn has_thread_affinity(self) -> bool {
        matches!(self, Self::Widget)
    }
}

bitflags! {
    /// Hints on how an image is converted when it is drawn.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ImageConversionFlags: u32 {
        /// Dither colors with an ordered pattern when reducing depth.
        const ORDERED_DITHER = 1 << 0;
        /// Dither alpha with an ordered pattern when reducing depth.
        const ORDERED_ALPHA_DITHER = 1 << 1;
        /// Do not scan the image for full opacity.
        const NO_OPAQUE_DETECTION = 1 << 2;
        /// Only use formats the device handles without conversion.
        const NO_FORMAT_CONVERSION = 1 << 3;
    }
}

/// How a polygon's points are interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    /// Closed, filled with the even-odd rule.
    #[default]
    OddEven,
    /// Closed, filled with the non-zero rule.
    Winding,
    /// Open, never filled.
    Polyline,
    /// Closed and known to be convex.
    Convex,
}

impl PolygonMode {
    /// The fill rule used for closed polygons.
    #[must_use]
    pub const fn fill_rule(self) -> Fill {
        match self {
            Self::OddEven => Fill::EvenOdd,
            Self::Winding | Self::Polyline | Self::Convex => Fill::NonZero,
        }
    }
}

/// A run of pre-shaped text.
///
/// Shaping happens before the painter: an item carries its glyph outlines in
/// logical coordinates relative to the run origin, plus the logical bounds
/// used for opaque backgrounds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextItem {
    /// Union of the glyph outlines.
    pub outline: BezPath,
    /// Logical bounds of the run, relative to the origin.
    pub bounds: Rect,
    /// The characters, for engines that record text.
    pub text: String,
}

/// The engine's view of a painter state during a sync.
///
/// Fields the painter did not change since the previous sync are reported as
/// `None`. The device transform, the device-space clip and the composition
/// mode are always present.
#[derive(Clone, Copy)]
pub struct StateSnapshot<'a> {
    dirty: DirtyFlags,
    state: &'a PainterState,
    clip: &'a ResolvedClip,
}

impl fmt::Debug for StateSnapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSnapshot")
            .field("dirty", &self.dirty)
            .field("transform", &self.transform())
            .finish_non_exhaustive()
    }
}

impl<'a> StateSnapshot<'a> {
    pub(crate) fn new(dirty: DirtyFlags, state: &'a PainterState, clip: &'a ResolvedClip) -> Self {
        Self { dirty, state, clip }
    }

    fn field<T>(&self, flag: DirtyFlags, value: T) -> Option<T> {
        self.dirty.contains(flag).then_some(value)
    }

    /// Fields changed since the previous sync.
    #[must_use]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// The pen, if changed.
    #[must_use]
    pub fn pen(&self) -> Option<&'a Pen> {
        self.field(DirtyFlags::PEN, self.state.pen())
    }

    /// The brush, if changed.
    #[must_use]
    pub fn brush(&self) -> Option<&'a Brush> {
        self.field(DirtyFlags::BRUSH, self.state.brush())
    }

    /// The brush origin in logical coordinates, if changed.
    #[must_use]
    pub fn brush_origin(&self) -> Option<Point> {
        self.field(DirtyFlags::BRUSH_ORIGIN, self.state.brush_origin())
    }

    /// The background brush, if changed.
    #[must_use]
    pub fn background(&self) -> Option<&'a Brush> {
        self.field(DirtyFlags::BACKGROUND, self.state.background())
    }

    /// The background mode, if changed.
    #[must_use]
    pub fn background_mode(&self) -> Option<BackgroundMode> {
        self.field(DirtyFlags::BACKGROUND_MODE, self.state.background_mode())
    }

    /// The font, if changed.
    #[must_use]
    pub fn font(&self) -> Option<&'a Font> {
        self.field(DirtyFlags::FONT, self.state.font())
    }

    /// The constant opacity, if changed.
    #[must_use]
    pub fn opacity(&self) -> Option<f64> {
        self.field(DirtyFlags::OPACITY, self.state.opacity())
    }

    /// The render hints, if changed.
    #[must_use]
    pub fn render_hints(&self) -> Option<RenderHints> {
        self.field(DirtyFlags::HINTS, self.state.render_hints())
    }

    /// Whether clipping is enabled, if changed.
    #[must_use]
    pub fn clip_enabled(&self) -> Option<bool> {
        self.field(DirtyFlags::CLIP_ENABLED, self.state.clip_enabled())
    }

    /// Logical to device pixels.
    #[must_use]
    pub fn transform(&self) -> Affine {
        self.state.transforms().device_transform()
    }

    /// The effective clip in device pixels, system clip included.
    #[must_use]
    pub fn clip(&self) -> &'a ResolvedClip {
        self.clip
    }

    /// The composition mode.
    #[must_use]
    pub fn composition_mode(&self) -> CompositionMode {
        self.state.composition_mode()
    }
}

/// Where a device records the session painting on it.
///
/// A device that hands out a slot lets a second painter attach to the session
/// already active on it instead of being refused.
#[derive(Default)]
pub struct PainterSlot {
    session: Option<Weak<RefCell<Session>>>,
}

impl fmt::Debug for PainterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PainterSlot")
            .field("occupied", &self.is_occupied())
            .finish()
    }
}

impl PainterSlot {
    /// Returns `true` while a session is painting on the device.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.session().is_some()
    }

    pub(crate) fn session(&self) -> Option<Rc<RefCell<Session>>> {
        self.session.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set(&mut self, session: &Rc<RefCell<Session>>) {
        self.session = Some(Rc::downgrade(session));
    }

    pub(crate) fn clear(&mut self) {
        self.session = None;
    }
}

/// A surface a painter can draw on.
pub trait PaintDevice {
    /// Size and pixel ratio of the device.
    fn metrics(&self) -> DeviceMetrics;

    /// The kind of surface.
    fn kind(&self) -> DeviceKind {
        DeviceKind::Image
    }

    /// The engine that draws on this device.
    fn paint_engine(&mut self) -> Option<&mut dyn PaintEngine>;

    /// Offset of this device inside the surface it is redirected to, in
    /// logical pixels.
    fn redirection_offset(&self) -> Vec2 {
        Vec2::ZERO
    }

    /// The session slot, for devices that allow painters to share a session.
    fn painter_slot(&mut self) -> Option<&mut PainterSlot> {
        None
    }

    /// The thread that owns the surface, for devices with thread affinity.
    #[cfg(feature = "std")]
    fn owner_thread(&self) -> Option<std::thread::ThreadId> {
        None
    }

    /// Reads back the device contents as premultiplied RGBA8.
    fn grab_image(&mut self) -> Option<ImageData> {
        None
    }
}

/// A backend that turns painter commands into output for one device.
///
/// Engines receive primitives in logical coordinates and map them with the
/// transform of the last [`update_state`](Self::update_state). Features not
/// advertised by [`features`](Self::features) are emulated by the painter
/// before any draw call reaches the engine.
pub trait PaintEngine {
    /// What the engine renders natively.
    fn features(&self) -> PaintEngineFeatures;

    /// Starts a session on a device of the given size.
    ///
    /// Returning `false` makes the painter's begin fail.
    fn begin(&mut self, metrics: &DeviceMetrics) -> bool;

    /// Ends the session.
    fn end(&mut self) -> bool;

    /// Returns `true` between a successful [`begin`](Self::begin) and [`end`](Self::end).
    fn is_active(&self) -> bool;

    /// The device area the engine may paint, in device pixels, before
    /// [`coordinate_offset`](Self::coordinate_offset) is applied.
    fn system_rect(&self) -> Option<Rect> {
        None
    }

    /// Offset of the system rect origin on the device.
    fn coordinate_offset(&self) -> Vec2 {
        Vec2::ZERO
    }

    /// Applies the changed parts of the painter state.
    fn update_state(&mut self, state: &StateSnapshot<'_>);

    /// Fills `path` with the brush, then strokes it with the pen.
    fn draw_path(&mut self, path: &BezPath, fill: Fill);

    /// Draws each rectangle as a path.
    fn draw_rects(&mut self, rects: &[Rect]) {
        for rect in rects {
            self.draw_path(&rect.to_path(0.1), Fill::NonZero);
        }
    }

    /// Strokes each line with the pen.
    fn draw_lines(&mut self, lines: &[Line]) {
        let mut path = BezPath::new();
        for line in lines {
            path.move_to(line.p0);
            path.line_to(line.p1);
        }
        self.draw_path(&path, Fill::NonZero);
    }

    /// Draws each point as a zero-length stroke.
    fn draw_points(&mut self, points: &[Point]) {
        let mut path = BezPath::new();
        for p in points {
            path.move_to(*p);
            path.line_to(*p);
        }
        self.draw_path(&path, Fill::NonZero);
    }

    /// Draws a polygon. [`PolygonMode::Polyline`] leaves the outline open.
    fn draw_polygon(&mut self, points: &[Point], mode: PolygonMode) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let mut path = BezPath::new();
        path.move_to(*first);
        for p in rest {
            path.line_to(*p);
        }
        if mode != PolygonMode::Polyline {
            path.close_path();
        }
        self.draw_path(&path, mode.fill_rule());
    }

    /// Draws the ellipse inscribed in `rect`.
    fn draw_ellipse(&mut self, rect: Rect) {
        self.draw_path(&Ellipse::from_rect(rect).to_path(0.1), Fill::NonZero);
    }

    /// Draws the `source` part of `image`, in image pixels, into `target`.
    fn draw_image(
        &mut self,
        target: Rect,
        image: &ImageData,
        source: Rect,
        flags: ImageConversionFlags,
    );

    /// Draws a device-native image. Defaults to [`draw_image`](Self::draw_image).
    fn draw_pixmap(&mut self, target: Rect, image: &ImageData, source: Rect) {
        self.draw_image(target, image, source, ImageConversionFlags::empty());
    }

    /// Draws a text run at `origin` with the pen.
    fn draw_text_item(&mut self, origin: Point, item: &TextItem);

    /// Draws a text run whose layout is known not to change.
    fn draw_static_text_item(&mut self, origin: Point, item: &TextItem) {
        self.draw_text_item(origin, item);
    }

    /// Creates a transparent raster device to composite emulated primitives in.
    ///
    /// Offscreen devices must support every feature the painter may need, so
    /// that drawing on them never requires emulation.
    fn create_offscreen(&self, width: u32, height: u32) -> Option<DeviceRef> {
        let _ = (width, height);
        None
    }

    /// Drops caches (gradients, patterns, glyphs) tied to the ending session.
    ///
    /// Called once, before [`end`](Self::end), when the last painter sharing
    /// the session ends.
    fn release_cached_resources(&mut self) {}
}
