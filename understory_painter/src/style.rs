// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pens, brushes and the other value types carried by the painter state.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use kurbo::{Affine, Cap, Join, Rect, Stroke};
use peniko::{
    BlendMode, Blob, Color, Compose, Gradient, GradientKind, ImageAlphaType, ImageData,
    ImageFormat, Mix,
};
use smallvec::SmallVec;

use crate::features::PaintEngineFeatures;

/// How gradient coordinates are interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum GradientCoordinateMode {
    /// Coordinates are in the logical space of the painter.
    #[default]
    Logical,
    /// Coordinates are relative to the paint device: `(0, 0)` is the top-left
    /// and `(1, 1)` the bottom-right corner of the device.
    StretchToDevice,
    /// Coordinates are relative to the bounding box of the painted object. The
    /// brush transform is applied after the mapping.
    ObjectBounding,
    /// Coordinates are relative to the bounding box of the painted object. The
    /// brush transform is applied before the mapping.
    Object,
}

impl GradientCoordinateMode {
    /// Returns `true` for both object-relative modes.
    #[must_use]
    pub const fn is_object_relative(self) -> bool {
        matches!(self, Self::ObjectBounding | Self::Object)
    }
}

/// The 8x8 stipple patterns available to [`Brush::pattern`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BrushPattern {
    /// 94% coverage.
    Dense1,
    /// 88% coverage.
    Dense2,
    /// 63% coverage.
    Dense3,
    /// 50% coverage.
    Dense4,
    /// 37% coverage.
    Dense5,
    /// 12% coverage.
    Dense6,
    /// 6% coverage.
    Dense7,
    /// Horizontal lines.
    Horizontal,
    /// Vertical lines.
    Vertical,
    /// Horizontal and vertical lines.
    Cross,
    /// Lines rising from bottom-left to top-right.
    BackwardDiagonal,
    /// Lines falling from top-left to bottom-right.
    ForwardDiagonal,
    /// Both diagonals.
    DiagonalCross,
}

impl BrushPattern {
    /// Side length of the pattern tile in pixels.
    pub const TILE: u32 = 8;

    /// Returns `true` if the tile pixel at `(x, y)` is painted.
    ///
    /// Coordinates wrap at [`Self::TILE`].
    #[must_use]
    pub fn covers(self, x: u32, y: u32) -> bool {
        let (x, y) = (x % Self::TILE, y % Self::TILE);
        match self {
            Self::Dense1 => ordered_threshold(x, y) < 60,
            Self::Dense2 => ordered_threshold(x, y) < 56,
            Self::Dense3 => ordered_threshold(x, y) < 40,
            Self::Dense4 => ordered_threshold(x, y) < 32,
            Self::Dense5 => ordered_threshold(x, y) < 24,
            Self::Dense6 => ordered_threshold(x, y) < 8,
            Self::Dense7 => ordered_threshold(x, y) < 4,
            Self::Horizontal => y % 4 == 0,
            Self::Vertical => x % 4 == 0,
            Self::Cross => x % 4 == 0 || y % 4 == 0,
            Self::BackwardDiagonal => (x + y) % 4 == 0,
            Self::ForwardDiagonal => (x + Self::TILE - y) % 4 == 0,
            Self::DiagonalCross => (x + y) % 4 == 0 || (x + Self::TILE - y) % 4 == 0,
        }
    }

    /// Renders one tile as a straight-alpha RGBA8 image: `color` where the
    /// pattern is set, transparent elsewhere.
    #[must_use]
    pub fn to_image(self, color: Color) -> ImageData {
        let rgba = color.to_rgba8();
        let side = Self::TILE as usize;
        let mut pixels = Vec::with_capacity(side * side * 4);
        for y in 0..Self::TILE {
            for x in 0..Self::TILE {
                if self.covers(x, y) {
                    pixels.extend_from_slice(&[rgba.r, rgba.g, rgba.b, rgba.a]);
                } else {
                    pixels.extend_from_slice(&[0, 0, 0, 0]);
                }
            }
        }
        ImageData {
            data: Blob::from(pixels),
            format: ImageFormat::Rgba8,
            alpha_type: ImageAlphaType::Alpha,
            width: Self::TILE,
            height: Self::TILE,
        }
    }
}

/// Rank of `(x, y)` in an 8x8 ordered-dither matrix, in `0..64`.
fn ordered_threshold(x: u32, y: u32) -> u32 {
    let mut rank = 0;
    let xy = x ^ y;
    for bit in (0..3).rev() {
        rank = (rank << 2) | (((xy >> bit) & 1) << 1) | ((y >> bit) & 1);
    }
    // Reverse the interleaved bits so neighbouring ranks are spread out.
    let mut reversed = 0;
    for i in 0..6 {
        reversed |= ((rank >> i) & 1) << (5 - i);
    }
    reversed
}

/// What a brush paints with.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum BrushKind {
    /// Paints nothing.
    #[default]
    None,
    /// A single color.
    Solid(Color),
    /// A stipple pattern in a color; unset pattern pixels are transparent.
    Pattern {
        /// The stipple.
        pattern: BrushPattern,
        /// Color of the set pixels.
        color: Color,
    },
    /// A linear, radial or conical gradient.
    Gradient {
        /// The gradient geometry and stops.
        gradient: Arc<Gradient>,
        /// How the gradient geometry is interpreted.
        mode: GradientCoordinateMode,
    },
    /// A repeating image.
    Texture(ImageData),
}

/// Coarse classification of a brush, as used by capability negotiation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BrushStyle {
    /// [`BrushKind::None`].
    NoBrush,
    /// [`BrushKind::Solid`].
    Solid,
    /// [`BrushKind::Pattern`].
    Pattern,
    /// A linear gradient.
    LinearGradient,
    /// A radial gradient.
    RadialGradient,
    /// A conical (sweep) gradient.
    ConicalGradient,
    /// [`BrushKind::Texture`].
    Texture,
}

/// A fill description with its own transform.
///
/// Cloning is cheap: gradient stops and texture pixels are shared, so a saved
/// painter state keeps its brushes as immutable snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Brush {
    kind: BrushKind,
    transform: Affine,
}

impl Brush {
    /// A brush that paints nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A solid color brush.
    #[must_use]
    pub fn solid(color: Color) -> Self {
        Self::from_kind(BrushKind::Solid(color))
    }

    /// A stipple pattern brush.
    #[must_use]
    pub fn pattern(pattern: BrushPattern, color: Color) -> Self {
        Self::from_kind(BrushKind::Pattern { pattern, color })
    }

    /// A gradient brush in logical coordinates.
    #[must_use]
    pub fn gradient(gradient: Gradient) -> Self {
        Self::gradient_with_mode(gradient, GradientCoordinateMode::Logical)
    }

    /// A gradient brush with an explicit coordinate mode.
    #[must_use]
    pub fn gradient_with_mode(gradient: Gradient, mode: GradientCoordinateMode) -> Self {
        Self::from_kind(BrushKind::Gradient {
            gradient: Arc::new(gradient),
            mode,
        })
    }

    /// A repeating image brush.
    #[must_use]
    pub fn texture(image: ImageData) -> Self {
        Self::from_kind(BrushKind::Texture(image))
    }

    /// Wraps a kind with an identity transform.
    #[must_use]
    pub fn from_kind(kind: BrushKind) -> Self {
        Self {
            kind,
            transform: Affine::IDENTITY,
        }
    }

    /// Returns this brush with `transform` as its brush-space transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    /// The payload of the brush.
    #[must_use]
    pub fn kind(&self) -> &BrushKind {
        &self.kind
    }

    /// Brush space to user space.
    #[must_use]
    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Coarse style of this brush.
    #[must_use]
    pub fn style(&self) -> BrushStyle {
        match &self.kind {
            BrushKind::None => BrushStyle::NoBrush,
            BrushKind::Solid(_) => BrushStyle::Solid,
            BrushKind::Pattern { .. } => BrushStyle::Pattern,
            BrushKind::Gradient { gradient, .. } => match gradient.kind {
                GradientKind::Linear(_) => BrushStyle::LinearGradient,
                GradientKind::Radial(_) => BrushStyle::RadialGradient,
                GradientKind::Sweep(_) => BrushStyle::ConicalGradient,
            },
            BrushKind::Texture(_) => BrushStyle::Texture,
        }
    }

    /// Returns `true` unless this is [`BrushKind::None`].
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !matches!(self.kind, BrushKind::None)
    }

    /// The color of a solid or pattern brush.
    #[must_use]
    pub fn color(&self) -> Option<Color> {
        match &self.kind {
            BrushKind::Solid(color) | BrushKind::Pattern { color, .. } => Some(*color),
            _ => None,
        }
    }

    /// Returns `true` for a solid or pattern brush whose color is not fully opaque.
    #[must_use]
    pub fn is_translucent(&self) -> bool {
        self.color().is_some_and(|c| c.components[3] < 1.0)
    }

    /// Returns `true` for stipple patterns and textures.
    #[must_use]
    pub fn is_patterned(&self) -> bool {
        matches!(
            self.kind,
            BrushKind::Pattern { .. } | BrushKind::Texture(_)
        )
    }

    /// Returns `true` for a texture with at least one non-opaque pixel.
    #[must_use]
    pub fn has_texture_alpha(&self) -> bool {
        match &self.kind {
            BrushKind::Texture(image) => image.data.data().chunks_exact(4).any(|px| px[3] != 255),
            _ => false,
        }
    }

    /// Returns `true` if every pixel this brush paints is fully opaque.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        match &self.kind {
            BrushKind::None | BrushKind::Pattern { .. } => false,
            BrushKind::Solid(color) => color.components[3] >= 1.0,
            BrushKind::Gradient { gradient, .. } => gradient
                .stops
                .iter()
                .all(|stop| stop.color.components[3] >= 1.0),
            BrushKind::Texture(_) => !self.has_texture_alpha(),
        }
    }

    /// The gradient coordinate mode, for gradient brushes.
    #[must_use]
    pub fn gradient_mode(&self) -> Option<GradientCoordinateMode> {
        match &self.kind {
            BrushKind::Gradient { mode, .. } => Some(*mode),
            _ => None,
        }
    }

    /// Rewrites a device- or object-relative gradient into an equivalent
    /// logical-mode gradient.
    ///
    /// `device` is the device rectangle in device pixels and is used for
    /// [`GradientCoordinateMode::StretchToDevice`]. The resulting brush then
    /// lives in device space; callers painting in logical space premultiply
    /// its transform by the inverse device transform. `object` is the logical
    /// bounding box of the painted shape and is used for the object-relative
    /// modes. Brushes that are not gradients, or already logical, are returned
    /// unchanged.
    #[must_use]
    pub fn to_user_space(&self, device: Rect, object: Rect) -> Self {
        let BrushKind::Gradient { gradient, mode } = &self.kind else {
            return self.clone();
        };
        let target = match mode {
            GradientCoordinateMode::Logical => return self.clone(),
            GradientCoordinateMode::StretchToDevice => device,
            GradientCoordinateMode::ObjectBounding | GradientCoordinateMode::Object => object,
        };
        let gradient_to_user = Affine::new([
            target.width(),
            0.0,
            0.0,
            target.height(),
            target.x0,
            target.y0,
        ]);
        let transform = if *mode == GradientCoordinateMode::Object {
            gradient_to_user * self.transform
        } else {
            self.transform * gradient_to_user
        };
        Self {
            kind: BrushKind::Gradient {
                gradient: gradient.clone(),
                mode: GradientCoordinateMode::Logical,
            },
            transform,
        }
    }
}

impl From<Color> for Brush {
    fn from(color: Color) -> Self {
        Self::solid(color)
    }
}

/// Dash style of a pen.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PenStyle {
    /// No stroke at all.
    NoPen,
    /// A continuous line.
    #[default]
    Solid,
    /// Dashes of four widths separated by two.
    Dash,
    /// Dots of one width separated by two.
    Dot,
    /// Alternating dash and dot.
    DashDot,
    /// A dash followed by two dots.
    DashDotDot,
    /// The pen's own dash pattern.
    Custom,
}

impl PenStyle {
    fn dash_units(self) -> &'static [f64] {
        match self {
            Self::NoPen | Self::Solid | Self::Custom => &[],
            Self::Dash => &[4.0, 2.0],
            Self::Dot => &[1.0, 2.0],
            Self::DashDot => &[4.0, 2.0, 1.0, 2.0],
            Self::DashDotDot => &[4.0, 2.0, 1.0, 2.0, 1.0, 2.0],
        }
    }
}

/// Stroke description: a brush plus stroke geometry.
///
/// A width of zero, or an explicit cosmetic flag, makes the pen cosmetic: its
/// width is measured in device pixels and does not scale with the transform.
#[derive(Clone, Debug, PartialEq)]
pub struct Pen {
    brush: Brush,
    width: f64,
    style: PenStyle,
    cap: Cap,
    join: Join,
    miter_limit: f64,
    dash_pattern: SmallVec<[f64; 6]>,
    dash_offset: f64,
    cosmetic: bool,
}

impl Default for Pen {
    fn default() -> Self {
        Self::solid(Color::BLACK, 1.0)
    }
}

impl Pen {
    /// A solid pen stroking with `brush`.
    #[must_use]
    pub fn new(brush: impl Into<Brush>, width: f64) -> Self {
        Self {
            brush: brush.into(),
            width: width.max(0.0),
            style: PenStyle::Solid,
            cap: Cap::Square,
            join: Join::Bevel,
            miter_limit: 2.0,
            dash_pattern: SmallVec::new(),
            dash_offset: 0.0,
            cosmetic: false,
        }
    }

    /// A solid pen in a single color.
    #[must_use]
    pub fn solid(color: Color, width: f64) -> Self {
        Self::new(Brush::solid(color), width)
    }

    /// A pen that strokes nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_style(PenStyle::NoPen)
    }

    /// Sets the dash style.
    #[must_use]
    pub fn with_style(mut self, style: PenStyle) -> Self {
        self.style = style;
        self
    }

    /// Sets the cap used at both ends of open subpaths.
    #[must_use]
    pub fn with_cap(mut self, cap: Cap) -> Self {
        self.cap = cap;
        self
    }

    /// Sets the join style.
    #[must_use]
    pub fn with_join(mut self, join: Join) -> Self {
        self.join = join;
        self
    }

    /// Sets the miter limit, in units of the pen width.
    #[must_use]
    pub fn with_miter_limit(mut self, limit: f64) -> Self {
        self.miter_limit = limit;
        self
    }

    /// Sets a custom dash pattern in units of the pen width and switches the
    /// style to [`PenStyle::Custom`].
    #[must_use]
    pub fn with_dash_pattern(mut self, pattern: &[f64], offset: f64) -> Self {
        self.dash_pattern = pattern.iter().copied().collect();
        self.dash_offset = offset;
        self.style = PenStyle::Custom;
        self
    }

    /// Marks the pen cosmetic.
    #[must_use]
    pub fn with_cosmetic(mut self, cosmetic: bool) -> Self {
        self.cosmetic = cosmetic;
        self
    }

    /// Replaces the stroke brush.
    #[must_use]
    pub fn with_brush(mut self, brush: impl Into<Brush>) -> Self {
        self.brush = brush.into();
        self
    }

    /// The brush the stroke is painted with.
    #[must_use]
    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    /// The nominal width; zero for a hairline.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The dash style.
    #[must_use]
    pub fn style(&self) -> PenStyle {
        self.style
    }

    /// The cap style.
    #[must_use]
    pub fn cap(&self) -> Cap {
        self.cap
    }

    /// The join style.
    #[must_use]
    pub fn join(&self) -> Join {
        self.join
    }

    /// The miter limit.
    #[must_use]
    pub fn miter_limit(&self) -> f64 {
        self.miter_limit
    }

    /// Returns `true` if this pen strokes anything.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.style != PenStyle::NoPen && self.brush.is_visible()
    }

    /// Returns `true` if the stroke brush is a solid color.
    #[must_use]
    pub fn is_solid(&self) -> bool {
        matches!(self.brush.kind(), BrushKind::Solid(_))
    }

    /// Returns `true` if the width is measured in device pixels.
    #[must_use]
    pub fn is_cosmetic(&self) -> bool {
        self.cosmetic || self.width == 0.0
    }

    /// Width actually stroked: hairlines are one unit wide.
    #[must_use]
    pub fn effective_width(&self) -> f64 {
        if self.width > 0.0 { self.width } else { 1.0 }
    }

    /// Builds the kurbo stroke style for this pen.
    ///
    /// Dash lengths are scaled by the effective width.
    #[must_use]
    pub fn to_stroke(&self) -> Stroke {
        let width = self.effective_width();
        let stroke = Stroke::new(width)
            .with_caps(self.cap)
            .with_join(self.join)
            .with_miter_limit(self.miter_limit);
        let units: &[f64] = if self.style == PenStyle::Custom {
            &self.dash_pattern
        } else {
            self.style.dash_units()
        };
        if units.is_empty() {
            stroke
        } else {
            stroke.with_dashes(self.dash_offset * width, units.iter().map(|d| d * width))
        }
    }
}

/// How the background brush is used behind patterned and translucent primitives.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BackgroundMode {
    /// Nothing is painted behind primitives.
    #[default]
    Transparent,
    /// The background brush is painted behind each primitive.
    Opaque,
}

/// How source pixels are combined with the destination.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[expect(missing_docs, reason = "Variant names follow the standard operator names.")]
pub enum CompositionMode {
    #[default]
    SourceOver,
    DestinationOver,
    Clear,
    Source,
    Destination,
    SourceIn,
    DestinationIn,
    SourceOut,
    DestinationOut,
    SourceAtop,
    DestinationAtop,
    Xor,
    Plus,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    SourceOrDestination,
    SourceAndDestination,
    SourceXorDestination,
    NotSourceAndNotDestination,
    NotSourceOrNotDestination,
    NotSourceXorDestination,
    NotSource,
    NotSourceAndDestination,
    SourceAndNotDestination,
    NotSourceOrDestination,
    SourceOrNotDestination,
    ClearDestination,
    SetDestination,
    NotDestination,
}

/// Which family a [`CompositionMode`] belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompositionClass {
    /// The default source-over mode; every engine supports it.
    SourceOver,
    /// Porter-Duff operators.
    PorterDuff,
    /// Separable blend modes.
    Blend,
    /// Bitwise raster operations.
    RasterOp,
}

impl CompositionMode {
    /// The family this mode belongs to.
    #[must_use]
    pub const fn class(self) -> CompositionClass {
        use CompositionMode::*;
        match self {
            SourceOver => CompositionClass::SourceOver,
            DestinationOver | Clear | Source | Destination | SourceIn | DestinationIn
            | SourceOut | DestinationOut | SourceAtop | DestinationAtop | Xor => {
                CompositionClass::PorterDuff
            }
            Plus | Multiply | Screen | Overlay | Darken | Lighten | ColorDodge | ColorBurn
            | HardLight | SoftLight | Difference | Exclusion => CompositionClass::Blend,
            _ => CompositionClass::RasterOp,
        }
    }

    /// The engine feature required to render this mode, if any.
    #[must_use]
    pub const fn required_feature(self) -> Option<PaintEngineFeatures> {
        match self.class() {
            CompositionClass::SourceOver => None,
            CompositionClass::PorterDuff => Some(PaintEngineFeatures::PORTER_DUFF),
            CompositionClass::Blend => Some(PaintEngineFeatures::BLEND_MODES),
            CompositionClass::RasterOp => Some(PaintEngineFeatures::RASTER_OP_MODES),
        }
    }

    /// The equivalent `peniko` blend mode; `None` for raster operations.
    #[must_use]
    pub fn to_blend_mode(self) -> Option<BlendMode> {
        use CompositionMode::*;
        let compose = |c: Compose| Some(BlendMode::new(Mix::Normal, c));
        let mix = |m: Mix| Some(BlendMode::new(m, Compose::SrcOver));
        match self {
            SourceOver => compose(Compose::SrcOver),
            DestinationOver => compose(Compose::DestOver),
            Clear => compose(Compose::Clear),
            Source => compose(Compose::Copy),
            Destination => compose(Compose::Dest),
            SourceIn => compose(Compose::SrcIn),
            DestinationIn => compose(Compose::DestIn),
            SourceOut => compose(Compose::SrcOut),
            DestinationOut => compose(Compose::DestOut),
            SourceAtop => compose(Compose::SrcAtop),
            DestinationAtop => compose(Compose::DestAtop),
            Xor => compose(Compose::Xor),
            Plus => compose(Compose::Plus),
            Multiply => mix(Mix::Multiply),
            Screen => mix(Mix::Screen),
            Overlay => mix(Mix::Overlay),
            Darken => mix(Mix::Darken),
            Lighten => mix(Mix::Lighten),
            ColorDodge => mix(Mix::ColorDodge),
            ColorBurn => mix(Mix::ColorBurn),
            HardLight => mix(Mix::HardLight),
            SoftLight => mix(Mix::SoftLight),
            Difference => mix(Mix::Difference),
            Exclusion => mix(Mix::Exclusion),
            _ => None,
        }
    }
}

bitflags! {
    /// Quality hints forwarded to the engine.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct RenderHints: u32 {
        /// Anti-alias primitive edges.
        const ANTIALIASING = 1 << 0;
        /// Anti-alias text.
        const TEXT_ANTIALIASING = 1 << 1;
        /// Filter images when they are scaled or rotated.
        const SMOOTH_PIXMAP_TRANSFORM = 1 << 2;
        /// Prefer lossless image paths, e.g. in recording engines.
        const LOSSLESS_IMAGE_RENDERING = 1 << 3;
        /// Pattern brushes follow the painter transform instead of staying
        /// device-aligned.
        const NON_COSMETIC_BRUSH_PATTERNS = 1 << 4;
    }
}

impl Default for RenderHints {
    fn default() -> Self {
        Self::TEXT_ANTIALIASING
    }
}

/// Font selection carried by the painter state.
///
/// Shaping is out of scope for the painter: text reaches it already shaped as
/// a [`TextItem`](crate::TextItem). The font is forwarded to engines that
/// record text (for example to embed it in a document).
#[derive(Clone, Debug, PartialEq)]
pub struct Font {
    /// Family name.
    pub family: String,
    /// Size in logical pixels.
    pub pixel_size: f64,
    /// CSS-style weight, 100..=900.
    pub weight: u16,
    /// Italic or oblique.
    pub italic: bool,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: String::from("sans-serif"),
            pixel_size: 12.0,
            weight: 400,
            italic: false,
        }
    }
}
