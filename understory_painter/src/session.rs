// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painting sessions and the painters attached to them.
//!
//! A session is the shared half of an active painter: the device, the state
//! stack and the negotiation cache. The first painter to begin on a device
//! creates the session; later painters beginning on the same device (when the
//! device offers a [`PainterSlot`](crate::PainterSlot)) attach to it instead
//! and share its state stack. Attaching saves the shared state and detaching
//! restores it, so each attached painter leaves the state as it found it. The
//! engine is ended when the last painter detaches.

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use kurbo::{Affine, Rect};

use crate::clip::ResolvedClip;
use crate::config::PainterConfig;
use crate::dirty::DirtyFlags;
use crate::engine::{DeviceMetrics, DeviceRef, PaintEngine, StateSnapshot};
use crate::error::{BeginError, UsageError};
use crate::features::EmulationSpecifier;
use crate::negotiate::Negotiator;
use crate::region::Region;
use crate::state::{PainterState, StateStack};
use crate::thread_check::ThreadGuard;

/// Whether a session may fall back to offscreen compositing.
///
/// Sessions created by the fallback compositor itself are `Emulating` and
/// always draw directly, which bounds the fallback to one level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SessionMode {
    Direct,
    Emulating,
}

pub(crate) struct Session {
    pub(crate) device: DeviceRef,
    pub(crate) stack: StateStack,
    pub(crate) negotiator: Negotiator,
    pub(crate) spec: EmulationSpecifier,
    pub(crate) mode: SessionMode,
    pub(crate) metrics: DeviceMetrics,
    /// Paintable device area in device pixels, if the engine restricts it.
    pub(crate) system_clip: Option<Rect>,
    /// The resolved device-space clip, system clip included.
    pub(crate) device_clip: ResolvedClip,
    pub(crate) thread: ThreadGuard,
    /// Attached painters. Kept outside the session borrow so a painter can
    /// always leave.
    painters: Rc<Cell<usize>>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("metrics", &self.metrics)
            .field("painters", &self.painters.get())
            .field("depth", &self.stack.depth())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn state(&self) -> &PainterState {
        self.stack.current()
    }

    pub(crate) fn state_mut(&mut self) -> &mut PainterState {
        self.stack.current_mut()
    }

    /// Negotiates against `engine` and hands it the fields changed since the
    /// last sync.
    pub(crate) fn sync(&mut self, engine: &mut dyn PaintEngine) -> EmulationSpecifier {
        let dirty = self.stack.current().dirty();
        self.spec = self
            .negotiator
            .update(self.stack.current(), engine.features(), dirty);
        if dirty.is_empty() {
            return self.spec;
        }
        if dirty.intersects(DirtyFlags::DEVICE_CLIP) {
            self.refresh_device_clip();
        }
        let dirty = self.stack.current_mut().take_dirty();
        engine.update_state(&StateSnapshot::new(
            dirty,
            self.stack.current(),
            &self.device_clip,
        ));
        self.spec
    }

    fn refresh_device_clip(&mut self) {
        let state = self.stack.current();
        let mut clip = if state.clip_enabled() {
            state.clip_log().resolve(Affine::IDENTITY)
        } else {
            ResolvedClip::unclipped()
        };
        if let Some(system) = self.system_clip {
            clip.intersect_region(&Region::from_rect(system));
        }
        self.device_clip = clip;
    }

    /// The device area primitives can reach, in device pixels.
    pub(crate) fn paintable_rect(&self) -> Rect {
        self.system_clip
            .unwrap_or_else(|| self.metrics.device_rect())
    }
}

/// One painter's membership in a session.
#[derive(Debug)]
pub(crate) struct Attachment {
    pub(crate) session: Rc<RefCell<Session>>,
    painters: Rc<Cell<usize>>,
    /// Stack depth to unwind to on detach.
    base_depth: usize,
    /// Depth this painter's own `restore` may not go below.
    pub(crate) floor: usize,
}

/// Starts painting on `device`, creating a session or joining the one active
/// on it.
///
/// Nothing is allocated until every check has passed; on `Err` the device and
/// its engine are as they were.
pub(crate) fn begin_session(
    device: DeviceRef,
    config: &PainterConfig,
    mode: SessionMode,
    redirection: Affine,
) -> Result<Attachment, BeginError> {
    let mut dev = device.try_borrow_mut().map_err(|_| BeginError::DeviceBusy)?;

    let thread = ThreadGuard::for_device(&*dev, config.check_thread_affinity);
    thread.check().map_err(|_| BeginError::WrongThread)?;

    if let Some(shared) = dev.painter_slot().and_then(|slot| slot.session()) {
        drop(dev);
        return attach(shared);
    }

    let metrics = dev.metrics();
    let (width, height) = (metrics.width, metrics.height);
    if width == 0 || height == 0 {
        return Err(BeginError::DegenerateDevice { width, height });
    }
    let ratio = metrics.device_pixel_ratio;
    if !(ratio.is_finite() && ratio > 0.0) {
        tracing::debug!(ratio, "rejecting device pixel ratio");
        return Err(BeginError::InvalidPixelRatio);
    }
    let max = config.max_offscreen_dimension;
    if width > max || height > max {
        return Err(BeginError::TooLarge { width, height, max });
    }
    let offset = dev.redirection_offset();

    let engine = dev.paint_engine().ok_or(BeginError::NoEngine)?;
    if engine.is_active() {
        return Err(BeginError::DeviceBusy);
    }
    if !engine.begin(&metrics) {
        return Err(BeginError::EngineRefused);
    }
    let system_clip = engine
        .system_rect()
        .map(|rect| rect + engine.coordinate_offset());

    let mut state = PainterState::new(metrics.logical_rect(), metrics.device_pixel_ratio);
    state
        .transforms_mut()
        .set_redirection(Affine::translate(-offset) * redirection);

    let painters = Rc::new(Cell::new(1));
    let session = Rc::new(RefCell::new(Session {
        device: Rc::clone(&device),
        stack: StateStack::new(state),
        negotiator: Negotiator::new(),
        spec: EmulationSpecifier::empty(),
        mode,
        metrics,
        system_clip,
        device_clip: ResolvedClip::unclipped(),
        thread,
        painters: Rc::clone(&painters),
    }));
    if let Some(slot) = dev.painter_slot() {
        slot.set(&session);
    }
    tracing::debug!(?metrics, ?mode, "painting session started");
    Ok(Attachment {
        session,
        painters,
        base_depth: 0,
        floor: 0,
    })
}

fn attach(shared: Rc<RefCell<Session>>) -> Result<Attachment, BeginError> {
    let (base_depth, painters) = {
        let mut session = shared
            .try_borrow_mut()
            .map_err(|_| BeginError::DeviceBusy)?;
        session.thread.check().map_err(|_| BeginError::WrongThread)?;
        session.painters.set(session.painters.get() + 1);
        let depth = session.stack.depth();
        session.stack.save();
        (depth, Rc::clone(&session.painters))
    };
    tracing::debug!(painters = painters.get(), "painter attached to shared session");
    Ok(Attachment {
        session: shared,
        painters,
        base_depth,
        floor: base_depth + 1,
    })
}

/// Leaves the session, restoring the state found on attach. The last painter
/// to leave ends the engine.
pub(crate) fn detach(attachment: Attachment) {
    let Attachment {
        session: shared,
        painters,
        base_depth,
        floor,
    } = attachment;
    let remaining = painters.get().saturating_sub(1);
    painters.set(remaining);
    let Ok(mut session) = shared.try_borrow_mut() else {
        // The saves this painter left open stay on the shared stack; the
        // painter still counts as gone.
        tracing::warn!(remaining, "painter detached while its session was borrowed");
        UsageError::DeviceBusy.report();
        return;
    };
    let depth = session.stack.depth();
    if depth > floor {
        UsageError::UnbalancedSave(depth - floor).report();
    }
    while session.stack.depth() > base_depth && session.stack.restore() {}
    if remaining > 0 {
        tracing::debug!(painters = remaining, "painter detached");
        return;
    }

    let device = Rc::clone(&session.device);
    drop(session);
    let Ok(mut dev) = device.try_borrow_mut() else {
        UsageError::DeviceBusy.report();
        return;
    };
    if let Some(engine) = dev.paint_engine() {
        engine.release_cached_resources();
        if !engine.end() {
            tracing::debug!("paint engine reported failure on end");
        }
    }
    if let Some(slot) = dev.painter_slot() {
        slot.clear();
    }
    tracing::debug!("painting session ended");
}
