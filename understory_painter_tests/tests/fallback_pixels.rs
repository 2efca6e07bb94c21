// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel output of emulated primitives on the `vello_cpu` engine.
//!
//! Emulation must not be visible: a primitive drawn through the fallback path
//! has to match the same primitive drawn natively, up to rounding in the
//! extra compositing step.

use kurbo::{BezPath, Line, Point, Rect, Shape, Vec2};
use peniko::color::palette::css;
use rstest::rstest;
use understory_painter::{
    BackgroundMode, Brush, BrushPattern, ClipOperation, GradientCoordinateMode,
    PaintEngineFeatures, Painter, PainterConfig, Pen, TextItem,
};
use understory_painter_tests::{linear_gradient, max_channel_difference, pixel, render};
use understory_painter_vello_cpu::NATIVE_FEATURES;

const WIDTH: u16 = 48;
const HEIGHT: u16 = 40;

/// Largest per-channel difference accepted between a native and an
/// offscreen-composited rendering.
const COMPOSITE_TOLERANCE: u8 = 3;

#[derive(Copy, Clone, Debug)]
enum Scene {
    TranslucentEllipse,
    RotatedTranslucentStroke,
    ClippedTranslucentFill,
    HalfOpacity,
    GradientPenOverBackground,
    SquareCappedDiagonal,
}

impl Scene {
    fn paint(self, p: &mut Painter) {
        // An opaque backdrop, so blending onto existing pixels is covered.
        p.fill_rect(Rect::new(0.0, 0.0, 24.0, 40.0), Brush::solid(css::STEEL_BLUE));
        match self {
            Self::TranslucentEllipse => {
                p.set_pen(Pen::none());
                p.set_brush(Brush::solid(css::ORANGE.with_alpha(0.6)));
                p.draw_ellipse(Rect::new(6.0, 5.0, 40.0, 33.0));
            }
            Self::RotatedTranslucentStroke => {
                p.translate(Vec2::new(24.0, 20.0));
                p.rotate(0.6);
                p.set_pen(Pen::solid(css::CRIMSON.with_alpha(0.7), 3.0));
                p.draw_rect(Rect::new(-12.0, -8.0, 12.0, 8.0));
            }
            Self::ClippedTranslucentFill => {
                p.set_clip_rect(Rect::new(10.0, 8.0, 30.0, 30.0), ClipOperation::ReplaceClip);
                p.set_pen(Pen::none());
                p.set_brush(Brush::solid(css::LIME.with_alpha(0.5)));
                let mut triangle = BezPath::new();
                triangle.move_to((4.0, 36.0));
                triangle.line_to((24.0, 2.0));
                triangle.line_to((44.0, 36.0));
                triangle.close_path();
                p.draw_path(&triangle);
            }
            Self::HalfOpacity => {
                p.set_opacity(0.5);
                p.set_pen(Pen::solid(css::BLACK, 2.0));
                p.set_brush(Brush::solid(css::GOLD));
                p.draw_rect(Rect::new(8.0, 8.0, 36.0, 28.0));
            }
            Self::GradientPenOverBackground => {
                let gradient = linear_gradient(
                    Point::new(4.0, 0.0),
                    Point::new(44.0, 0.0),
                    css::RED,
                    css::BLUE,
                );
                p.set_pen(Pen::new(Brush::gradient(gradient), 4.0));
                p.draw_line(Line::new((4.0, 20.0), (44.0, 20.0)));
            }
            Self::SquareCappedDiagonal => {
                p.set_pen(Pen::solid(css::CRIMSON.with_alpha(0.7), 8.0));
                p.draw_line(Line::new((12.0, 10.0), (34.0, 28.0)));
            }
        }
    }
}

#[rstest]
#[case::translucent_ellipse(Scene::TranslucentEllipse, PaintEngineFeatures::ALPHA_BLEND)]
#[case::rotated_stroke(Scene::RotatedTranslucentStroke, PaintEngineFeatures::ALPHA_BLEND)]
#[case::clipped_fill(Scene::ClippedTranslucentFill, PaintEngineFeatures::ALPHA_BLEND)]
#[case::half_opacity(Scene::HalfOpacity, PaintEngineFeatures::CONSTANT_OPACITY)]
#[case::gradient_pen(Scene::GradientPenOverBackground, PaintEngineFeatures::BRUSH_STROKE)]
#[case::square_caps(Scene::SquareCappedDiagonal, PaintEngineFeatures::ALPHA_BLEND)]
fn emulated_primitives_match_native_rendering(
    #[case] scene: Scene,
    #[case] missing: PaintEngineFeatures,
) {
    let native = render(WIDTH, HEIGHT, NATIVE_FEATURES, PainterConfig::default(), |p| {
        scene.paint(p);
    });
    let emulated = render(
        WIDTH,
        HEIGHT,
        NATIVE_FEATURES.difference(missing),
        PainterConfig::default(),
        |p| scene.paint(p),
    );
    let diff = max_channel_difference(&native, &emulated);
    assert!(
        diff <= COMPOSITE_TOLERANCE,
        "{scene:?} without {missing:?} differs by {diff}"
    );
}

#[rstest]
fn forced_offscreen_compositing_matches_native_rendering(
    #[values(
        Scene::TranslucentEllipse,
        Scene::RotatedTranslucentStroke,
        Scene::ClippedTranslucentFill,
        Scene::HalfOpacity,
        Scene::SquareCappedDiagonal
    )]
    scene: Scene,
) {
    let native = render(WIDTH, HEIGHT, NATIVE_FEATURES, PainterConfig::default(), |p| {
        scene.paint(p);
    });
    let forced = PainterConfig {
        force_offscreen_fallback: true,
        ..PainterConfig::default()
    };
    let composited = render(WIDTH, HEIGHT, NATIVE_FEATURES, forced, |p| scene.paint(p));
    let diff = max_channel_difference(&native, &composited);
    assert!(diff <= COMPOSITE_TOLERANCE, "{scene:?} differs by {diff}");
}

#[test]
fn device_gradient_matches_its_logical_equivalent() {
    let stretched = render(32, 16, NATIVE_FEATURES, PainterConfig::default(), |p| {
        let gradient = linear_gradient(Point::ZERO, Point::new(1.0, 0.0), css::RED, css::BLUE);
        p.fill_rect(
            Rect::new(0.0, 0.0, 32.0, 16.0),
            Brush::gradient_with_mode(gradient, GradientCoordinateMode::StretchToDevice),
        );
    });
    let logical = render(32, 16, NATIVE_FEATURES, PainterConfig::default(), |p| {
        let gradient = linear_gradient(Point::ZERO, Point::new(32.0, 0.0), css::RED, css::BLUE);
        p.fill_rect(Rect::new(0.0, 0.0, 32.0, 16.0), Brush::gradient(gradient));
    });
    let diff = max_channel_difference(&stretched, &logical);
    assert!(diff <= 2, "stretched gradient differs by {diff}");
}

#[test]
fn empty_clip_leaves_the_device_untouched() {
    let pixels = render(16, 16, NATIVE_FEATURES, PainterConfig::default(), |p| {
        p.set_clip_rect(Rect::new(4.0, 4.0, 4.0, 12.0), ClipOperation::ReplaceClip);
        p.fill_rect(Rect::new(0.0, 0.0, 16.0, 16.0), Brush::solid(css::RED));
        p.set_brush(Brush::solid(css::RED.with_alpha(0.5)));
        p.draw_ellipse(Rect::new(0.0, 0.0, 16.0, 16.0));
    });
    assert!(pixels.iter().all(|&c| c == 0), "nothing was painted");
}

#[test]
fn opaque_background_text_draws_box_then_glyphs() {
    let item = TextItem {
        outline: Rect::new(2.0, -6.0, 6.0, -2.0).to_path(0.1),
        bounds: Rect::new(0.0, -8.0, 10.0, 0.0),
        text: String::from("x"),
    };
    let pixels = render(20, 20, NATIVE_FEATURES, PainterConfig::default(), |p| {
        p.set_pen(Pen::solid(css::RED, 1.0));
        p.set_background(Brush::solid(css::BLUE));
        p.set_background_mode(BackgroundMode::Opaque);
        p.draw_text(Point::new(4.0, 12.0), &item);
    });
    let at = |x, y| pixel(&pixels, 20, x, y);
    assert_eq!(at(5, 5), [0, 0, 255, 255], "background box");
    assert_eq!(at(13, 11), [0, 0, 255, 255], "background box corner");
    assert_eq!(at(8, 8), [255, 0, 0, 255], "glyph");
    assert_eq!(at(1, 1), [0, 0, 0, 0], "outside the text bounds");
    assert_eq!(at(15, 15), [0, 0, 0, 0], "outside the text bounds");
}

#[test]
fn opaque_background_shows_through_pattern_gaps() {
    let pixels = render(16, 16, NATIVE_FEATURES, PainterConfig::default(), |p| {
        p.set_pen(Pen::none());
        p.set_brush(Brush::pattern(BrushPattern::Dense4, css::BLACK));
        p.set_background(Brush::solid(css::YELLOW));
        p.set_background_mode(BackgroundMode::Opaque);
        p.draw_rect(Rect::new(0.0, 0.0, 16.0, 16.0));
    });
    let mut black = 0;
    let mut yellow = 0;
    for px in pixels.chunks_exact(4) {
        match px {
            [0, 0, 0, 255] => black += 1,
            [255, 255, 0, 255] => yellow += 1,
            other => panic!("unexpected pixel {other:?}"),
        }
    }
    assert_eq!(black, 128, "half of every tile is set");
    assert_eq!(yellow, 128);
}

#[test]
fn transparent_background_leaves_pattern_gaps_empty() {
    let pixels = render(16, 16, NATIVE_FEATURES, PainterConfig::default(), |p| {
        p.set_pen(Pen::none());
        p.set_brush(Brush::pattern(BrushPattern::Dense4, css::BLACK));
        p.set_background(Brush::solid(css::YELLOW));
        p.draw_rect(Rect::new(0.0, 0.0, 16.0, 16.0));
    });
    let empty = pixels.chunks_exact(4).filter(|px| px[3] == 0).count();
    assert_eq!(empty, 128);
}
