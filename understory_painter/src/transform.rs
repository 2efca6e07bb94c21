// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Composition of the logical-to-device transform.
//!
//! The device transform is built from four factors, applied to a logical point
//! in this order:
//!
//! 1. the world transform (if enabled),
//! 2. the window-to-viewport mapping (if enabled),
//! 3. the redirection transform (nested or offset rendering),
//! 4. the device pixel ratio scale.
//!
//! In `kurbo` notation that is `dpr * redirection * view * world`.
//!
//! The composed matrix and its inverse are computed lazily and cached; any
//! mutation of a factor invalidates both.

use core::cell::Cell;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::{Affine, Rect, Vec2};

/// Classification of an affine transform, ordered by complexity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformType {
    /// The identity.
    Identity,
    /// A pure translation.
    Translate,
    /// Axis-aligned scaling, possibly with translation.
    Scale,
    /// Rotation with uniform scaling.
    Rotate,
    /// Anything else.
    Shear,
}

impl TransformType {
    /// Classifies `xf`.
    #[must_use]
    pub fn of(xf: Affine) -> Self {
        let [a, b, c, d, e, f] = xf.as_coeffs();
        if b == 0.0 && c == 0.0 {
            if a == 1.0 && d == 1.0 {
                if e == 0.0 && f == 0.0 {
                    Self::Identity
                } else {
                    Self::Translate
                }
            } else {
                Self::Scale
            }
        } else {
            let tolerance = 1e-9 * (a.abs() + b.abs() + c.abs() + d.abs()).max(1.0);
            let orthogonal = (a * c + b * d).abs() <= tolerance;
            let same_length = ((a * a + b * b) - (c * c + d * d)).abs() <= tolerance;
            if orthogonal && same_length {
                Self::Rotate
            } else {
                Self::Shear
            }
        }
    }
}

/// Returns `true` if `xf` maps axis-aligned rectangles to axis-aligned rectangles.
#[must_use]
pub fn preserves_rects(xf: Affine) -> bool {
    let [a, b, c, d, _, _] = xf.as_coeffs();
    (b == 0.0 && c == 0.0) || (a == 0.0 && d == 0.0)
}

/// Inverts `xf`, or returns `None` if it is singular or not finite.
#[must_use]
pub fn invert(xf: Affine) -> Option<Affine> {
    let det = xf.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inverse = xf.inverse();
    inverse.is_finite().then_some(inverse)
}

#[derive(Copy, Clone, Debug, Default)]
enum InverseCache {
    #[default]
    Stale,
    Valid(Affine),
    Singular,
}

#[derive(Copy, Clone, Debug, Default)]
struct MatrixCache {
    matrix: Option<Affine>,
    inverse: InverseCache,
}

/// The transform factors of a painter state and their cached composition.
#[derive(Clone, Debug)]
pub struct TransformStack {
    world: Affine,
    world_enabled: bool,
    window: Rect,
    viewport: Rect,
    view_enabled: bool,
    redirection: Affine,
    device_pixel_ratio: f64,
    cache: Cell<MatrixCache>,
}

impl PartialEq for TransformStack {
    fn eq(&self, other: &Self) -> bool {
        self.world == other.world
            && self.world_enabled == other.world_enabled
            && self.window == other.window
            && self.viewport == other.viewport
            && self.view_enabled == other.view_enabled
            && self.redirection == other.redirection
            && self.device_pixel_ratio == other.device_pixel_ratio
    }
}

impl TransformStack {
    /// Creates the transforms for a device whose logical extent is `logical`.
    ///
    /// Window and viewport both start out as `logical`, so the view mapping
    /// is the identity until one of them changes.
    #[must_use]
    pub fn new(logical: Rect, device_pixel_ratio: f64) -> Self {
        Self {
            world: Affine::IDENTITY,
            world_enabled: false,
            window: logical,
            viewport: logical,
            view_enabled: false,
            redirection: Affine::IDENTITY,
            device_pixel_ratio,
            cache: Cell::new(MatrixCache::default()),
        }
    }

    fn invalidate(&mut self) {
        self.cache.set(MatrixCache::default());
    }

    /// The world transform, whether or not it is enabled.
    #[must_use]
    pub fn world_transform(&self) -> Affine {
        self.world
    }

    /// Whether the world transform participates in the device transform.
    #[must_use]
    pub fn world_enabled(&self) -> bool {
        self.world_enabled
    }

    /// Enables or disables the world transform.
    pub fn set_world_enabled(&mut self, enabled: bool) {
        self.world_enabled = enabled;
        self.invalidate();
    }

    /// Replaces the world transform, or combines `m` with it.
    ///
    /// When combining, `m` is applied to logical coordinates before the existing
    /// world transform: `world = world * m`. This is the same order as
    /// [`translate`](Self::translate) and friends.
    pub fn set_world_transform(&mut self, m: Affine, combine: bool) {
        self.world = if combine { self.world * m } else { m };
        self.world_enabled = true;
        self.invalidate();
    }

    /// Translates the world transform.
    pub fn translate(&mut self, offset: Vec2) {
        self.set_world_transform(Affine::translate(offset), true);
    }

    /// Scales the world transform.
    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.set_world_transform(Affine::scale_non_uniform(sx, sy), true);
    }

    /// Rotates the world transform by `radians`.
    pub fn rotate(&mut self, radians: f64) {
        self.set_world_transform(Affine::rotate(radians), true);
    }

    /// Shears the world transform.
    pub fn shear(&mut self, sh: f64, sv: f64) {
        self.set_world_transform(Affine::skew(sh, sv), true);
    }

    /// Resets world and view transforms.
    ///
    /// Window and viewport are reset to `logical`.
    pub fn reset(&mut self, logical: Rect) {
        self.world = Affine::IDENTITY;
        self.world_enabled = false;
        self.window = logical;
        self.viewport = logical;
        self.view_enabled = false;
        self.invalidate();
    }

    /// The logical window.
    #[must_use]
    pub fn window(&self) -> Rect {
        self.window
    }

    /// Sets the window and enables the view transform.
    pub fn set_window(&mut self, window: Rect) {
        self.window = window;
        self.view_enabled = true;
        self.invalidate();
    }

    /// The device viewport.
    #[must_use]
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Sets the viewport and enables the view transform.
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
        self.view_enabled = true;
        self.invalidate();
    }

    /// Whether the window-to-viewport mapping participates in the device transform.
    #[must_use]
    pub fn view_enabled(&self) -> bool {
        self.view_enabled
    }

    /// Enables or disables the window-to-viewport mapping.
    pub fn set_view_enabled(&mut self, enabled: bool) {
        self.view_enabled = enabled;
        self.invalidate();
    }

    /// The window-to-viewport mapping.
    ///
    /// A window with zero area cannot be mapped; the mapping is the identity then.
    #[must_use]
    pub fn view_transform(&self) -> Affine {
        if !self.view_enabled || self.window.width() == 0.0 || self.window.height() == 0.0 {
            return Affine::IDENTITY;
        }
        let (win, vp) = (self.window, self.viewport);
        Affine::translate(vp.origin().to_vec2())
            * Affine::scale_non_uniform(vp.width() / win.width(), vp.height() / win.height())
            * Affine::translate(-win.origin().to_vec2())
    }

    /// The redirection transform.
    #[must_use]
    pub fn redirection(&self) -> Affine {
        self.redirection
    }

    /// Sets the redirection transform.
    pub fn set_redirection(&mut self, redirection: Affine) {
        self.redirection = redirection;
        self.invalidate();
    }

    /// Device pixels per logical pixel.
    #[must_use]
    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    /// Sets the device pixel ratio.
    pub fn set_device_pixel_ratio(&mut self, ratio: f64) {
        self.device_pixel_ratio = ratio;
        self.invalidate();
    }

    /// World and view transforms combined, without redirection or pixel ratio.
    #[must_use]
    pub fn combined_transform(&self) -> Affine {
        let world = if self.world_enabled {
            self.world
        } else {
            Affine::IDENTITY
        };
        self.view_transform() * world
    }

    /// The composed logical-to-device transform.
    #[must_use]
    pub fn device_transform(&self) -> Affine {
        let mut cache = self.cache.get();
        if let Some(matrix) = cache.matrix {
            return matrix;
        }
        let matrix = Affine::scale(self.device_pixel_ratio)
            * self.redirection
            * self.combined_transform();
        cache.matrix = Some(matrix);
        self.cache.set(cache);
        matrix
    }

    /// Inverse of [`device_transform`](Self::device_transform), or `None` if it
    /// is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Affine> {
        match self.cache.get().inverse {
            InverseCache::Valid(inv) => return Some(inv),
            InverseCache::Singular => return None,
            InverseCache::Stale => {}
        }
        let result = invert(self.device_transform());
        let mut cache = self.cache.get();
        cache.inverse = match result {
            Some(inv) => InverseCache::Valid(inv),
            None => InverseCache::Singular,
        };
        self.cache.set(cache);
        result
    }

    /// Classification of the device transform.
    #[must_use]
    pub fn transform_type(&self) -> TransformType {
        TransformType::of(self.device_transform())
    }
}
