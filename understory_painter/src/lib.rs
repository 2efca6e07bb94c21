// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_painter --heading-base-level=0

//! Understory Painter: a device-independent 2D painter core.
//!
//! A [`Painter`] issues drawing commands in logical coordinates against a
//! [`PaintDevice`]. The device owns a [`PaintEngine`] that turns commands
//! into output: pixels, a recording, a print stream. Engines advertise what
//! they render natively with [`PaintEngineFeatures`]; everything else is
//! emulated by the painter before the engine sees it.
//!
//! # Core concepts
//!
//! - **Painter state**: pen, brush, background, font, opacity, composition
//!   mode, render hints, the [`TransformStack`] and the [`ClipLog`], held in a
//!   [`StateStack`] with save and restore. Changes are tracked as
//!   [`DirtyFlags`] and handed to the engine lazily, as an immutable
//!   [`StateSnapshot`], right before the next primitive.
//! - **Transforms**: the device transform is the device pixel ratio, then the
//!   redirection offset, then the window-viewport mapping, then the world
//!   transform. Its inverse is cached.
//! - **Clipping**: clip operations are appended to a log; each entry keeps the
//!   device transform that was current when it was recorded, so later
//!   transform changes never move an existing clip.
//! - **Negotiation**: [`emulation_specifier`] maps a state and an engine's
//!   features to the set of things that must be emulated. [`Negotiator`]
//!   caches the result across draw calls until a relevant field changes.
//! - **Fallback**: an unsupported primitive takes the cheapest route that
//!   works: remapping a gradient to user space, splitting an opaque
//!   background into two passes, or drawing into an offscreen image with a
//!   nested painter and blitting the result back.
//!
//! # Diagnostics
//!
//! Misuse of the painter is never fatal. Drawing on an inactive painter, an
//! unbalanced `restore`, enabling clipping without a clip: each becomes a
//! no-op and reports one [`UsageError`] on the `tracing` warning channel.
//! Decisions of the fallback path are traced at `debug` and `trace` level.
//!
//! Only [`Painter::begin`] returns an error, a [`BeginError`].
//!
//! # Sharing a device
//!
//! Devices that expose a [`PainterSlot`] let several painters paint at once.
//! The second painter to begin joins the first one's session: both see the
//! same state, and each leaves it as it found it when it ends.
//!
//! This crate is `no_std` and uses `alloc`. The `std` feature adds the
//! thread affinity check for devices that must be painted from one thread.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod clip;
mod config;
mod dirty;
mod dispatch;
mod engine;
mod error;
mod fallback;
mod features;
mod negotiate;
mod painter;
mod region;
mod session;
mod state;
mod style;
mod thread_check;
mod transform;

pub use clip::{ClipEntry, ClipLog, ClipOperation, ClipShape, ResolvedClip};
pub use config::PainterConfig;
pub use dirty::DirtyFlags;
pub use engine::{
    DeviceKind, DeviceMetrics, DeviceRef, ImageConversionFlags, PaintDevice, PaintEngine,
    PainterSlot, PolygonMode, StateSnapshot, TextItem,
};
pub use error::{BeginError, UsageError};
pub use features::{EmulationSpecifier, PaintEngineFeatures};
pub use negotiate::{Negotiator, emulation_specifier};
pub use painter::Painter;
pub use region::Region;
pub use state::{PainterState, StateStack};
pub use style::{
    BackgroundMode, Brush, BrushKind, BrushPattern, BrushStyle, CompositionClass,
    CompositionMode, Font, GradientCoordinateMode, Pen, PenStyle, RenderHints,
};
pub use transform::{TransformStack, TransformType, invert, preserves_rects};

pub use kurbo;
pub use peniko;
