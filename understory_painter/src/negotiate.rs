// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capability negotiation: what the engine cannot do for the current state.

use kurbo::Affine;

use crate::dirty::DirtyFlags;
use crate::features::{EmulationSpecifier, PaintEngineFeatures};
use crate::state::PainterState;
use crate::style::{BackgroundMode, Brush, BrushStyle, GradientCoordinateMode, PenStyle};

/// Computes the emulation specifier of `state` against `features`.
///
/// Every rule is checked independently and OR'd into the result. The result
/// only depends on the two arguments.
#[must_use]
pub fn emulation_specifier(
    state: &PainterState,
    features: PaintEngineFeatures,
) -> EmulationSpecifier {
    use PaintEngineFeatures as F;

    let mut spec = EmulationSpecifier::empty();
    let pen = state.pen();
    let stroking = pen.is_visible();
    let filling = state.brush().is_visible();
    let device = state.transforms().device_transform();

    spec.require(stroking && !pen.is_solid(), F::BRUSH_STROKE, features);

    let brushes = [
        stroking.then(|| pen.brush()),
        filling.then(|| state.brush()),
    ];
    for brush in brushes.into_iter().flatten() {
        spec |= brush_specifier(brush, device, features);
    }

    spec.require(device != Affine::IDENTITY, F::PRIMITIVE_TRANSFORM, features);
    spec.require(state.opacity() < 1.0, F::CONSTANT_OPACITY, features);

    if let Some(feature) = state.composition_mode().required_feature() {
        spec.require(true, feature, features);
    }

    if state.background_mode() == BackgroundMode::Opaque {
        let see_through = |b: &Brush| b.is_translucent() || b.is_patterned();
        let pen_shows_background =
            stroking && (see_through(pen.brush()) || pen.style() != PenStyle::Solid);
        let brush_shows_background = filling && see_through(state.brush());
        if pen_shows_background || brush_shows_background {
            spec |= EmulationSpecifier::OPAQUE_BACKGROUND;
        }
    }

    spec
}

fn brush_specifier(
    brush: &Brush,
    device: Affine,
    features: PaintEngineFeatures,
) -> EmulationSpecifier {
    use PaintEngineFeatures as F;

    let mut spec = EmulationSpecifier::empty();
    let style = brush.style();
    let gradient = matches!(
        style,
        BrushStyle::LinearGradient | BrushStyle::RadialGradient | BrushStyle::ConicalGradient
    );

    let alpha = brush.is_translucent() || (gradient && !brush.is_opaque());
    spec.require(alpha, F::ALPHA_BLEND, features);

    spec.require(
        style == BrushStyle::LinearGradient,
        F::LINEAR_GRADIENT_FILL,
        features,
    );
    spec.require(
        style == BrushStyle::RadialGradient,
        F::RADIAL_GRADIENT_FILL,
        features,
    );
    spec.require(
        style == BrushStyle::ConicalGradient,
        F::CONICAL_GRADIENT_FILL,
        features,
    );

    let patterned = brush.is_patterned();
    spec.require(patterned, F::PATTERN_BRUSH, features);
    spec.require(
        patterned && (device != Affine::IDENTITY || brush.transform() != Affine::IDENTITY),
        F::PATTERN_TRANSFORM,
        features,
    );
    spec.require(brush.has_texture_alpha(), F::MASKED_BRUSH, features);

    match brush.gradient_mode() {
        Some(GradientCoordinateMode::StretchToDevice) => {
            spec |= EmulationSpecifier::GRADIENT_STRETCH_TO_DEVICE;
        }
        Some(mode) if mode.is_object_relative() => {
            spec.require(true, F::OBJECT_BOUNDING_MODE_GRADIENTS, features);
        }
        _ => {}
    }
    spec
}

/// Caches the emulation specifier between draws.
///
/// The specifier is recomputed when the engine features differ from the
/// cached ones or when a field in [`DirtyFlags::EMULATION`] changed; otherwise
/// the cached value is returned. Both paths give the same result as
/// [`emulation_specifier`].
#[derive(Clone, Debug, Default)]
pub struct Negotiator {
    cached: Option<(PaintEngineFeatures, EmulationSpecifier)>,
}

impl Negotiator {
    /// A negotiator with nothing cached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The specifier for `state`, given the fields changed since the last call.
    pub fn update(
        &mut self,
        state: &PainterState,
        features: PaintEngineFeatures,
        dirty: DirtyFlags,
    ) -> EmulationSpecifier {
        match self.cached {
            Some((cached_features, spec))
                if cached_features == features && !dirty.intersects(DirtyFlags::EMULATION) =>
            {
                spec
            }
            _ => {
                let spec = emulation_specifier(state, features);
                tracing::trace!(?spec, "emulation specifier recomputed");
                self.cached = Some((features, spec));
                spec
            }
        }
    }

    /// The last computed specifier, if any.
    #[must_use]
    pub fn cached(&self) -> Option<EmulationSpecifier> {
        self.cached.map(|(_, spec)| spec)
    }

    /// Forgets the cached specifier.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
