// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Usage diagnostics and begin failures.

use crate::style::CompositionMode;

/// A misuse of the painter.
///
/// Usage errors never abort and are never returned from drawing calls: the
/// offending call becomes a no-op and the error is reported once on the
/// `tracing` warning channel.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// A call that needs an active painter was made on an inactive one.
    #[error("painter not active")]
    NotActive,
    /// `begin` was called on a painter that is already active.
    #[error("painter already active; call end() first")]
    AlreadyActive,
    /// `restore` was called with no matching `save`.
    #[error("unbalanced restore: no saved state")]
    UnbalancedRestore,
    /// The painter ended with saved states left on the stack.
    #[error("painter ended with {0} saved state(s) not restored")]
    UnbalancedSave(usize),
    /// Clipping was enabled while there is no clip to enable.
    #[error("clipping cannot be enabled without a clip")]
    ClippingWithoutClip,
    /// The engine cannot render the requested composition mode.
    #[error("composition mode {0:?} is not supported by the paint engine")]
    UnsupportedCompositionMode(CompositionMode),
    /// The painter was used from a thread that does not own its device.
    #[error("painter used outside the thread that owns its device")]
    WrongThread,
    /// The device or the session is borrowed elsewhere.
    #[error("paint device is busy")]
    DeviceBusy,
}

impl UsageError {
    /// Emits the diagnostic.
    pub(crate) fn report(&self) {
        tracing::warn!(error = ?self, "{self}");
    }
}

/// Why [`Painter::begin`](crate::Painter::begin) failed.
///
/// A failed begin releases everything it had acquired; the painter stays
/// inactive.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BeginError {
    /// The painter is already active.
    #[error("painter already active")]
    AlreadyActive,
    /// The device has no paint engine.
    #[error("paint device has no paint engine")]
    NoEngine,
    /// The device has a zero width or height.
    #[error("paint device has a degenerate size {width}x{height}")]
    DegenerateDevice {
        /// Width in device pixels.
        width: u32,
        /// Height in device pixels.
        height: u32,
    },
    /// The device exceeds the configured maximum dimension.
    #[error("paint device size {width}x{height} exceeds the maximum of {max}")]
    TooLarge {
        /// Width in device pixels.
        width: u32,
        /// Height in device pixels.
        height: u32,
        /// The configured limit.
        max: u32,
    },
    /// The device pixel ratio is not a finite positive number.
    #[error("paint device has an invalid device pixel ratio")]
    InvalidPixelRatio,
    /// The device or its engine is in use by an unrelated painter.
    #[error("paint device is busy")]
    DeviceBusy,
    /// The engine refused to begin.
    #[error("paint engine failed to begin")]
    EngineRefused,
    /// The device must be painted from the thread that owns it.
    #[error("paint device is owned by another thread")]
    WrongThread,
}
