// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Development-only tests for `understory_painter`.
//!
//! The integration tests in `tests/` check painter properties against two
//! engines: the recording engine from `understory_painter_ref`, which shows
//! what the painter hands to an engine, and the `vello_cpu` engine, which
//! shows what ends up in the pixels.
//!
//! ## Run tests
//!
//! - `cargo test -p understory_painter_tests`

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kurbo::Point;
use peniko::{Color, ColorStop, Gradient, GradientKind, LinearGradientPosition};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use understory_painter::{DeviceRef, PaintEngineFeatures, Painter, PainterConfig};
use understory_painter_ref::RecordingDevice;
use understory_painter_vello_cpu::VelloCpuDevice;

/// A `tracing` layer counting the warnings emitted by the painter crates.
#[derive(Clone, Debug, Default)]
pub struct WarningCounter {
    count: Arc<AtomicUsize>,
}

impl WarningCounter {
    /// Warnings seen so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::WARN && meta.target().starts_with("understory_painter") {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Runs `f` and returns its result with the number of painter warnings it
/// emitted on the current thread.
pub fn count_warnings<R>(f: impl FnOnce() -> R) -> (R, usize) {
    let counter = WarningCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, counter.count())
}

/// Wraps a recording device for painting, returning the typed handle
/// alongside the one painters take.
pub fn share(device: RecordingDevice) -> (Rc<RefCell<RecordingDevice>>, DeviceRef) {
    let device = Rc::new(RefCell::new(device));
    let shared: DeviceRef = device.clone();
    (device, shared)
}

/// Paints on a fresh recording device with all features and returns it.
pub fn record(width: u32, height: u32, paint: impl FnOnce(&mut Painter)) -> RecordingDevice {
    record_with(RecordingDevice::new(width, height), PainterConfig::default(), paint)
}

/// Paints on `device` with a painter configured by `config` and returns the
/// device once the painter has ended.
pub fn record_with(
    device: RecordingDevice,
    config: PainterConfig,
    paint: impl FnOnce(&mut Painter),
) -> RecordingDevice {
    let (device, shared) = share(device);
    let mut painter = Painter::with_config(config);
    painter
        .begin(shared)
        .expect("recording devices of a valid size begin");
    paint(&mut painter);
    painter.end();
    drop(painter);
    Rc::try_unwrap(device)
        .expect("the painter released the device")
        .into_inner()
}

/// Paints on a transparent `vello_cpu` image advertising `features` and
/// returns its premultiplied RGBA8 pixels.
pub fn render(
    width: u16,
    height: u16,
    features: PaintEngineFeatures,
    config: PainterConfig,
    paint: impl FnOnce(&mut Painter),
) -> Vec<u8> {
    let device = Rc::new(RefCell::new(
        VelloCpuDevice::new(width, height).with_features(features),
    ));
    let shared: DeviceRef = device.clone();
    let mut painter = Painter::with_config(config);
    painter
        .begin(shared)
        .expect("vello_cpu devices of a valid size begin");
    paint(&mut painter);
    painter.end();
    drop(painter);
    device.borrow_mut().pixels()
}

/// The largest difference between corresponding channels of two images of
/// the same size.
pub fn max_channel_difference(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len(), "images differ in size");
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}

/// The RGBA8 pixel at `(x, y)` of an image `width` pixels wide.
pub fn pixel(bytes: &[u8], width: usize, x: usize, y: usize) -> [u8; 4] {
    let i = (y * width + x) * 4;
    [bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]
}

/// A two-stop linear gradient from `start` to `end`.
pub fn linear_gradient(start: Point, end: Point, from: Color, to: Color) -> Gradient {
    let stops = [ColorStop::from((0.0, from)), ColorStop::from((1.0, to))];
    Gradient {
        kind: GradientKind::Linear(LinearGradientPosition::new(start, end)),
        stops: stops.as_slice().into(),
        ..Gradient::default()
    }
}
