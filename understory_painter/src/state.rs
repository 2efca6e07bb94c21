// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painter state and the save/restore stack.

use alloc::vec::Vec;

use kurbo::{Point, Rect};

use crate::clip::{ClipEntry, ClipLog, ClipOperation, ClipShape};
use crate::dirty::DirtyFlags;
use crate::style::{BackgroundMode, Brush, CompositionMode, Font, Pen, RenderHints};
use crate::transform::TransformStack;

/// The drawing configuration of a painter.
///
/// A state is a value: [`StateStack::save`] pushes a full copy, and pens,
/// brushes and clip payloads share their heavy parts, so saved states stay
/// immutable snapshots however the current state is mutated afterwards.
///
/// Besides the drawing fields, a state carries two [`DirtyFlags`]
/// accumulators: `dirty` (changed since the engine last saw the state) and
/// `changes` (changed since the enclosing save). They are bookkeeping and do
/// not take part in equality.
#[derive(Clone, Debug)]
pub struct PainterState {
    pen: Pen,
    brush: Brush,
    brush_origin: Point,
    background: Brush,
    background_mode: BackgroundMode,
    font: Font,
    opacity: f64,
    composition_mode: CompositionMode,
    render_hints: RenderHints,
    transforms: TransformStack,
    clip_enabled: bool,
    clip_log: ClipLog,
    dirty: DirtyFlags,
    changes: DirtyFlags,
}

impl PartialEq for PainterState {
    fn eq(&self, other: &Self) -> bool {
        self.pen == other.pen
            && self.brush == other.brush
            && self.brush_origin == other.brush_origin
            && self.background == other.background
            && self.background_mode == other.background_mode
            && self.font == other.font
            && self.opacity == other.opacity
            && self.composition_mode == other.composition_mode
            && self.render_hints == other.render_hints
            && self.transforms == other.transforms
            && self.clip_enabled == other.clip_enabled
            && self.clip_log == other.clip_log
    }
}

impl PainterState {
    /// The initial state for a device whose logical extent is `logical`.
    ///
    /// Everything is dirty, so the first engine sync carries every field.
    #[must_use]
    pub fn new(logical: Rect, device_pixel_ratio: f64) -> Self {
        Self {
            pen: Pen::default(),
            brush: Brush::none(),
            brush_origin: Point::ORIGIN,
            background: Brush::solid(peniko::color::palette::css::WHITE),
            background_mode: BackgroundMode::Transparent,
            font: Font::default(),
            opacity: 1.0,
            composition_mode: CompositionMode::SourceOver,
            render_hints: RenderHints::default(),
            transforms: TransformStack::new(logical, device_pixel_ratio),
            clip_enabled: false,
            clip_log: ClipLog::new(),
            dirty: DirtyFlags::all(),
            changes: DirtyFlags::empty(),
        }
    }

    fn mark(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
        self.changes |= flags;
    }

    /// The stroke pen.
    #[must_use]
    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    /// The fill brush.
    #[must_use]
    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    /// Logical origin of pattern and texture brushes.
    #[must_use]
    pub fn brush_origin(&self) -> Point {
        self.brush_origin
    }

    /// The background brush.
    #[must_use]
    pub fn background(&self) -> &Brush {
        &self.background
    }

    /// The background mode.
    #[must_use]
    pub fn background_mode(&self) -> BackgroundMode {
        self.background_mode
    }

    /// The font.
    #[must_use]
    pub fn font(&self) -> &Font {
        &self.font
    }

    /// The constant opacity, in `0.0..=1.0`.
    #[must_use]
    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// The composition mode.
    #[must_use]
    pub fn composition_mode(&self) -> CompositionMode {
        self.composition_mode
    }

    /// The render hints.
    #[must_use]
    pub fn render_hints(&self) -> RenderHints {
        self.render_hints
    }

    /// The transform factors.
    #[must_use]
    pub fn transforms(&self) -> &TransformStack {
        &self.transforms
    }

    /// Whether the clip log is applied.
    #[must_use]
    pub fn clip_enabled(&self) -> bool {
        self.clip_enabled
    }

    /// The clip log.
    #[must_use]
    pub fn clip_log(&self) -> &ClipLog {
        &self.clip_log
    }

    /// Fields changed since the last engine sync.
    #[must_use]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Fields changed since the enclosing save.
    #[must_use]
    pub fn changes(&self) -> DirtyFlags {
        self.changes
    }

    pub(crate) fn take_dirty(&mut self) -> DirtyFlags {
        core::mem::take(&mut self.dirty)
    }

    pub(crate) fn set_pen(&mut self, pen: Pen) {
        self.pen = pen;
        self.mark(DirtyFlags::PEN);
    }

    pub(crate) fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
        self.mark(DirtyFlags::BRUSH);
    }

    pub(crate) fn set_brush_origin(&mut self, origin: Point) {
        self.brush_origin = origin;
        self.mark(DirtyFlags::BRUSH_ORIGIN);
    }

    pub(crate) fn set_background(&mut self, brush: Brush) {
        self.background = brush;
        self.mark(DirtyFlags::BACKGROUND);
    }

    pub(crate) fn set_background_mode(&mut self, mode: BackgroundMode) {
        self.background_mode = mode;
        self.mark(DirtyFlags::BACKGROUND_MODE);
    }

    pub(crate) fn set_font(&mut self, font: Font) {
        self.font = font;
        self.mark(DirtyFlags::FONT);
    }

    pub(crate) fn set_opacity(&mut self, opacity: f64) {
        self.opacity = if opacity.is_nan() {
            1.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
        self.mark(DirtyFlags::OPACITY);
    }

    pub(crate) fn set_composition_mode(&mut self, mode: CompositionMode) {
        self.composition_mode = mode;
        self.mark(DirtyFlags::COMPOSITION_MODE);
    }

    pub(crate) fn set_render_hints(&mut self, hints: RenderHints) {
        self.render_hints = hints;
        self.mark(DirtyFlags::HINTS);
    }

    /// Mutable access to the transform factors; marks the transform dirty.
    pub(crate) fn transforms_mut(&mut self) -> &mut TransformStack {
        self.mark(DirtyFlags::TRANSFORM);
        &mut self.transforms
    }

    /// Records a clip issued under the current device transform.
    ///
    /// Intersecting while clipping is disabled replaces the clip: a disabled
    /// clip behaves as if there were none.
    pub(crate) fn push_clip(&mut self, shape: ClipShape, operation: ClipOperation) {
        let operation = if operation == ClipOperation::IntersectClip && !self.clip_enabled {
            ClipOperation::ReplaceClip
        } else {
            operation
        };
        self.clip_enabled = operation != ClipOperation::NoClip;
        self.clip_log.push(ClipEntry {
            shape,
            operation,
            transform: self.transforms.device_transform(),
        });
        self.mark(DirtyFlags::DEVICE_CLIP);
    }

    /// Enables or disables the recorded clip.
    ///
    /// Enabling needs a clip to enable: it fails when the log is empty or
    /// ends in [`ClipOperation::NoClip`], and the state is left untouched.
    pub(crate) fn set_clipping(&mut self, enabled: bool) -> bool {
        if enabled
            && matches!(
                self.clip_log.last_operation(),
                None | Some(ClipOperation::NoClip)
            )
        {
            return false;
        }
        if self.clip_enabled != enabled {
            self.clip_enabled = enabled;
            self.mark(DirtyFlags::CLIP_ENABLED);
        }
        true
    }
}

/// The current painter state plus the states saved above it.
#[derive(Clone, Debug)]
pub struct StateStack {
    current: PainterState,
    saved: Vec<PainterState>,
}

impl StateStack {
    /// A stack holding only `initial`.
    #[must_use]
    pub fn new(initial: PainterState) -> Self {
        Self {
            current: initial,
            saved: Vec::new(),
        }
    }

    /// The current state.
    #[must_use]
    pub fn current(&self) -> &PainterState {
        &self.current
    }

    pub(crate) fn current_mut(&mut self) -> &mut PainterState {
        &mut self.current
    }

    /// Number of saved states.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Pushes a copy of the current state.
    pub fn save(&mut self) {
        self.saved.push(self.current.clone());
        self.current.changes = DirtyFlags::empty();
    }

    /// Pops the most recently saved state back into place.
    ///
    /// Every field changed within the closing scope is marked dirty, so the
    /// engine is brought back in sync with the restored values. Returns
    /// `false`, changing nothing, when there is no saved state.
    pub fn restore(&mut self) -> bool {
        let Some(mut previous) = self.saved.pop() else {
            return false;
        };
        previous.dirty = self.current.dirty | self.current.changes;
        self.current = previous;
        true
    }
}
