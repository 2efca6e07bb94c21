// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty flags: which parts of the painter state changed since the last engine sync.

use bitflags::bitflags;

bitflags! {
    /// A set of painter state fields.
    ///
    /// The painter keeps two accumulators of this type inside each
    /// [`PainterState`](crate::PainterState): the fields changed since the last
    /// engine sync, and the fields changed within the current save scope. Engines
    /// only ever see an immutable copy, inside a
    /// [`StateSnapshot`](crate::StateSnapshot).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u32 {
        /// The pen.
        const PEN = 1 << 0;
        /// The brush.
        const BRUSH = 1 << 1;
        /// The brush origin.
        const BRUSH_ORIGIN = 1 << 2;
        /// The font.
        const FONT = 1 << 3;
        /// The background brush.
        const BACKGROUND = 1 << 4;
        /// The background mode.
        const BACKGROUND_MODE = 1 << 5;
        /// The composed device transform.
        const TRANSFORM = 1 << 6;
        /// Whether clipping is enabled.
        const CLIP_ENABLED = 1 << 7;
        /// The clip log.
        const CLIP = 1 << 8;
        /// Render hints.
        const HINTS = 1 << 9;
        /// The composition mode.
        const COMPOSITION_MODE = 1 << 10;
        /// The constant opacity.
        const OPACITY = 1 << 11;
    }
}

impl DirtyFlags {
    /// Fields whose change requires the emulation specifier to be recomputed.
    pub const EMULATION: Self = Self::PEN
        .union(Self::BRUSH)
        .union(Self::HINTS)
        .union(Self::OPACITY)
        .union(Self::BACKGROUND_MODE)
        .union(Self::TRANSFORM)
        .union(Self::COMPOSITION_MODE);

    /// Fields that change the device-space clip.
    pub const DEVICE_CLIP: Self = Self::CLIP.union(Self::CLIP_ENABLED);
}
