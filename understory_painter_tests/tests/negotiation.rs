// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capability negotiation seen through a painter.

use std::cell::RefCell;
use std::rc::Rc;

use kurbo::{Point, Rect};
use peniko::color::palette::css;
use rstest::rstest;
use understory_painter::{
    BackgroundMode, Brush, BrushPattern, CompositionMode, EmulationSpecifier,
    GradientCoordinateMode, PaintEngineFeatures, Painter, Pen, PenStyle,
};
use understory_painter_ref::{DrawOp, RecordingDevice};
use understory_painter_tests::{linear_gradient, share};
use understory_painter_vello_cpu::NATIVE_FEATURES;

#[derive(Copy, Clone, Debug)]
enum Scene {
    Default,
    TranslucentBrush,
    RotatedPattern,
    GradientPen,
    HalfOpacity,
    Multiply,
    OpaqueBackgroundDash,
    StretchGradient,
    ObjectGradient,
    Everything,
}

impl Scene {
    fn apply(self, p: &mut Painter) {
        let gradient = || linear_gradient(Point::ZERO, Point::new(1.0, 0.0), css::RED, css::BLUE);
        match self {
            Self::Default => {}
            Self::TranslucentBrush => p.set_brush(Brush::solid(css::RED.with_alpha(0.5))),
            Self::RotatedPattern => {
                p.rotate(0.5);
                p.set_brush(Brush::pattern(BrushPattern::Dense3, css::BLACK));
            }
            Self::GradientPen => p.set_pen(Pen::new(Brush::gradient(gradient()), 2.0)),
            Self::HalfOpacity => p.set_opacity(0.5),
            Self::Multiply => p.set_composition_mode(CompositionMode::Multiply),
            Self::OpaqueBackgroundDash => {
                p.set_background_mode(BackgroundMode::Opaque);
                p.set_pen(Pen::solid(css::BLACK, 1.0).with_style(PenStyle::Dot));
            }
            Self::StretchGradient => p.set_brush(Brush::gradient_with_mode(
                gradient(),
                GradientCoordinateMode::StretchToDevice,
            )),
            Self::ObjectGradient => p.set_brush(Brush::gradient_with_mode(
                gradient(),
                GradientCoordinateMode::ObjectBounding,
            )),
            Self::Everything => {
                for scene in [
                    Self::TranslucentBrush,
                    Self::GradientPen,
                    Self::HalfOpacity,
                    Self::Multiply,
                    Self::OpaqueBackgroundDash,
                ] {
                    scene.apply(p);
                }
                p.rotate(0.25);
            }
        }
    }
}

/// A painter on an all-features recording device, set up for `scene`.
fn painter_for(scene: Scene) -> (Rc<RefCell<RecordingDevice>>, Painter) {
    let (device, shared) = share(RecordingDevice::new(64, 64));
    let mut painter = Painter::new();
    painter.begin(shared).expect("recording device begins");
    scene.apply(&mut painter);
    (device, painter)
}

fn specifier_with(
    device: &RefCell<RecordingDevice>,
    painter: &Painter,
    features: PaintEngineFeatures,
) -> EmulationSpecifier {
    device.borrow_mut().engine_mut().set_features(features);
    painter.emulation_specifier()
}

#[rstest]
fn more_features_never_need_more_emulation(
    #[values(
        Scene::Default,
        Scene::TranslucentBrush,
        Scene::RotatedPattern,
        Scene::GradientPen,
        Scene::HalfOpacity,
        Scene::Multiply,
        Scene::OpaqueBackgroundDash,
        Scene::StretchGradient,
        Scene::ObjectGradient,
        Scene::Everything
    )]
    scene: Scene,
    #[values(PaintEngineFeatures::empty(), NATIVE_FEATURES, PaintEngineFeatures::all())]
    base: PaintEngineFeatures,
) {
    let (device, painter) = painter_for(scene);
    for feature in PaintEngineFeatures::all().iter() {
        let fewer = specifier_with(&device, &painter, base.difference(feature));
        let more = specifier_with(&device, &painter, base.union(feature));
        assert!(
            fewer.contains(more),
            "{scene:?}: adding {feature:?} to {base:?} grew {fewer:?} to {more:?}"
        );
    }
}

#[rstest]
fn supported_features_are_never_emulated(
    #[values(
        Scene::TranslucentBrush,
        Scene::RotatedPattern,
        Scene::GradientPen,
        Scene::HalfOpacity,
        Scene::Everything
    )]
    scene: Scene,
    #[values(
        PaintEngineFeatures::empty(),
        PaintEngineFeatures::ALPHA_BLEND | PaintEngineFeatures::PRIMITIVE_TRANSFORM,
        NATIVE_FEATURES
    )]
    features: PaintEngineFeatures,
) {
    let (device, painter) = painter_for(scene);
    let spec = specifier_with(&device, &painter, features);
    let supported = EmulationSpecifier::from_bits_truncate(features.bits());
    assert!(
        spec.intersection(supported).is_empty(),
        "{scene:?} emulates supported features: {spec:?}"
    );
}

#[test]
fn device_relative_gradients_are_emulated_even_with_every_feature() {
    let (device, painter) = painter_for(Scene::StretchGradient);
    assert_eq!(
        specifier_with(&device, &painter, PaintEngineFeatures::all()),
        EmulationSpecifier::GRADIENT_STRETCH_TO_DEVICE
    );
}

#[test]
fn default_state_is_direct_on_the_weakest_engine() {
    let (device, painter) = painter_for(Scene::Default);
    assert!(specifier_with(&device, &painter, PaintEngineFeatures::empty()).is_direct());
}

#[test]
fn cached_negotiation_follows_engine_features() {
    let (device, mut painter) = painter_for(Scene::TranslucentBrush);
    painter.set_pen(Pen::none());
    let rect = Rect::new(4.0, 4.0, 12.0, 12.0);

    painter.draw_rect(rect);
    device
        .borrow_mut()
        .engine_mut()
        .set_features(PaintEngineFeatures::all().difference(PaintEngineFeatures::ALPHA_BLEND));
    painter.draw_rect(rect);
    device
        .borrow_mut()
        .engine_mut()
        .set_features(PaintEngineFeatures::all());
    painter.draw_rect(rect);
    painter.end();

    let device = device.borrow();
    let draws: Vec<_> = device.engine().draws().collect();
    assert_eq!(draws.len(), 3, "each rectangle reaches the engine once");
    assert!(matches!(draws[0], DrawOp::Rects(_)), "direct: {:?}", draws[0]);
    assert!(
        matches!(draws[1], DrawOp::Image { target, .. } if *target == rect),
        "composited: {:?}",
        draws[1]
    );
    assert!(matches!(draws[2], DrawOp::Rects(_)), "direct again: {:?}", draws[2]);
}
