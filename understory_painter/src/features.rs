// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine feature sets and the emulation specifier.
//!
//! A [`PaintEngine`](crate::PaintEngine) advertises what it can render
//! natively as a [`PaintEngineFeatures`] bitset. The painter crosses that set
//! with its current state and produces an [`EmulationSpecifier`]: the bits
//! that remain set are the aspects of the pending primitive the engine cannot
//! express, and which the painter must emulate.

use bitflags::bitflags;

bitflags! {
    /// Capabilities a paint engine supports natively.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PaintEngineFeatures: u32 {
        /// Primitives can be drawn under a non-identity transform.
        const PRIMITIVE_TRANSFORM = 1 << 0;
        /// Pattern and texture brushes can be transformed.
        const PATTERN_TRANSFORM = 1 << 1;
        /// Images can be drawn under a transform that is more than a translation.
        const PIXMAP_TRANSFORM = 1 << 2;
        /// Stipple pattern and texture brushes.
        const PATTERN_BRUSH = 1 << 3;
        /// Linear gradient fills.
        const LINEAR_GRADIENT_FILL = 1 << 4;
        /// Radial gradient fills.
        const RADIAL_GRADIENT_FILL = 1 << 5;
        /// Conical (sweep) gradient fills.
        const CONICAL_GRADIENT_FILL = 1 << 6;
        /// Translucent pens and brushes are blended with the destination.
        const ALPHA_BLEND = 1 << 7;
        /// Porter-Duff composition modes other than source-over.
        const PORTER_DUFF = 1 << 8;
        /// Arbitrary paths.
        const PAINTER_PATHS = 1 << 9;
        /// Anti-aliased edges.
        const ANTIALIASING = 1 << 10;
        /// Pens whose brush is not a solid color.
        const BRUSH_STROKE = 1 << 11;
        /// A constant opacity applied to every primitive.
        const CONSTANT_OPACITY = 1 << 12;
        /// Texture brushes with an alpha channel used as a mask.
        const MASKED_BRUSH = 1 << 13;
        /// Projective transforms.
        const PERSPECTIVE_TRANSFORM = 1 << 14;
        /// Separable blend modes (multiply, screen, ...).
        const BLEND_MODES = 1 << 15;
        /// Gradients expressed relative to the bounding box of the painted object.
        const OBJECT_BOUNDING_MODE_GRADIENTS = 1 << 16;
        /// Bitwise raster operations.
        const RASTER_OP_MODES = 1 << 17;
    }
}

bitflags! {
    /// The aspects of the pending primitive that the active engine cannot render.
    ///
    /// The low bits mirror [`PaintEngineFeatures`]. Two further bits live outside
    /// the feature bitmask and are never satisfied by an engine:
    /// [`GRADIENT_STRETCH_TO_DEVICE`](Self::GRADIENT_STRETCH_TO_DEVICE) and
    /// [`OPAQUE_BACKGROUND`](Self::OPAQUE_BACKGROUND).
    ///
    /// An empty specifier means the primitive can be forwarded to the engine as is.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EmulationSpecifier: u32 {
        /// See [`PaintEngineFeatures::PRIMITIVE_TRANSFORM`].
        const PRIMITIVE_TRANSFORM = PaintEngineFeatures::PRIMITIVE_TRANSFORM.bits();
        /// See [`PaintEngineFeatures::PATTERN_TRANSFORM`].
        const PATTERN_TRANSFORM = PaintEngineFeatures::PATTERN_TRANSFORM.bits();
        /// See [`PaintEngineFeatures::PIXMAP_TRANSFORM`].
        const PIXMAP_TRANSFORM = PaintEngineFeatures::PIXMAP_TRANSFORM.bits();
        /// See [`PaintEngineFeatures::PATTERN_BRUSH`].
        const PATTERN_BRUSH = PaintEngineFeatures::PATTERN_BRUSH.bits();
        /// See [`PaintEngineFeatures::LINEAR_GRADIENT_FILL`].
        const LINEAR_GRADIENT_FILL = PaintEngineFeatures::LINEAR_GRADIENT_FILL.bits();
        /// See [`PaintEngineFeatures::RADIAL_GRADIENT_FILL`].
        const RADIAL_GRADIENT_FILL = PaintEngineFeatures::RADIAL_GRADIENT_FILL.bits();
        /// See [`PaintEngineFeatures::CONICAL_GRADIENT_FILL`].
        const CONICAL_GRADIENT_FILL = PaintEngineFeatures::CONICAL_GRADIENT_FILL.bits();
        /// See [`PaintEngineFeatures::ALPHA_BLEND`].
        const ALPHA_BLEND = PaintEngineFeatures::ALPHA_BLEND.bits();
        /// See [`PaintEngineFeatures::PORTER_DUFF`].
        const PORTER_DUFF = PaintEngineFeatures::PORTER_DUFF.bits();
        /// See [`PaintEngineFeatures::PAINTER_PATHS`].
        const PAINTER_PATHS = PaintEngineFeatures::PAINTER_PATHS.bits();
        /// See [`PaintEngineFeatures::ANTIALIASING`].
        const ANTIALIASING = PaintEngineFeatures::ANTIALIASING.bits();
        /// See [`PaintEngineFeatures::BRUSH_STROKE`].
        const BRUSH_STROKE = PaintEngineFeatures::BRUSH_STROKE.bits();
        /// See [`PaintEngineFeatures::CONSTANT_OPACITY`].
        const CONSTANT_OPACITY = PaintEngineFeatures::CONSTANT_OPACITY.bits();
        /// See [`PaintEngineFeatures::MASKED_BRUSH`].
        const MASKED_BRUSH = PaintEngineFeatures::MASKED_BRUSH.bits();
        /// See [`PaintEngineFeatures::PERSPECTIVE_TRANSFORM`].
        const PERSPECTIVE_TRANSFORM = PaintEngineFeatures::PERSPECTIVE_TRANSFORM.bits();
        /// See [`PaintEngineFeatures::BLEND_MODES`].
        const BLEND_MODES = PaintEngineFeatures::BLEND_MODES.bits();
        /// See [`PaintEngineFeatures::OBJECT_BOUNDING_MODE_GRADIENTS`].
        const OBJECT_BOUNDING_MODE_GRADIENTS =
            PaintEngineFeatures::OBJECT_BOUNDING_MODE_GRADIENTS.bits();
        /// See [`PaintEngineFeatures::RASTER_OP_MODES`].
        const RASTER_OP_MODES = PaintEngineFeatures::RASTER_OP_MODES.bits();

        /// A gradient in the pen or brush is expressed relative to the device.
        const GRADIENT_STRETCH_TO_DEVICE = 1 << 28;
        /// The background mode is opaque and the pen or brush is not.
        const OPAQUE_BACKGROUND = 1 << 30;
    }
}

impl EmulationSpecifier {
    /// Bits that only a gradient remap can resolve.
    pub const GRADIENT_REMAP: Self =
        Self::GRADIENT_STRETCH_TO_DEVICE.union(Self::OBJECT_BOUNDING_MODE_GRADIENTS);

    /// Bits that offscreen compositing cannot emulate: the blit goes through the
    /// same composition mode as the original primitive.
    pub const COMPOSITION: Self = Self::PORTER_DUFF
        .union(Self::BLEND_MODES)
        .union(Self::RASTER_OP_MODES);

    /// Returns the specifier bit that corresponds to an engine feature.
    #[must_use]
    pub const fn from_feature(feature: PaintEngineFeatures) -> Self {
        Self::from_bits_truncate(feature.bits())
    }

    /// Sets the bit for `feature` when `needed` is true and `features` lacks it.
    pub(crate) fn require(
        &mut self,
        needed: bool,
        feature: PaintEngineFeatures,
        features: PaintEngineFeatures,
    ) {
        if needed && !features.contains(feature) {
            *self |= Self::from_feature(feature);
        }
    }

    /// Returns `true` when the primitive can be forwarded to the engine as is.
    #[must_use]
    pub const fn is_direct(self) -> bool {
        self.is_empty()
    }
}
