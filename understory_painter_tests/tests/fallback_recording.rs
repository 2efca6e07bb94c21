// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! What the fallback compositor hands to the engine, observed with the
//! recording engine.

use kurbo::{Affine, BezPath, Line, Point, Rect, Shape, Vec2};
use peniko::color::palette::css;
use peniko::{Blob, ImageAlphaType, ImageData, ImageFormat};
use rstest::rstest;
use understory_painter::{
    BackgroundMode, BeginError, Brush, BrushPattern, BrushStyle, ClipOperation,
    GradientCoordinateMode, ImageConversionFlags, PaintEngineFeatures, Painter, PainterConfig,
    Pen, PenStyle, TextItem,
};
use understory_painter_ref::{DrawOp, EngineState, Event, RecordingDevice};
use understory_painter_tests::{count_warnings, linear_gradient, record, record_with, share};

fn without(feature: PaintEngineFeatures) -> RecordingDevice {
    RecordingDevice::new(100, 100).with_features(PaintEngineFeatures::all().difference(feature))
}

fn draws_with_state(device: &RecordingDevice) -> Vec<(DrawOp, EngineState)> {
    device
        .engine()
        .events()
        .iter()
        .filter_map(|event| match event {
            Event::Draw { op, state } => Some((op.clone(), state.clone())),
            _ => None,
        })
        .collect()
}

fn translucent_red() -> Brush {
    Brush::solid(css::RED.with_alpha(0.5))
}

fn assert_affine_near(a: Affine, b: Affine) {
    let (ca, cb) = (a.as_coeffs(), b.as_coeffs());
    for (x, y) in ca.iter().zip(cb) {
        assert!((x - y).abs() < 1e-9, "transforms differ: {a:?} vs {b:?}");
    }
}

fn opaque_image(width: u32, height: u32) -> ImageData {
    let len = usize::try_from(width * height * 4).expect("small test image");
    ImageData {
        data: Blob::from(vec![255_u8; len]),
        format: ImageFormat::Rgba8,
        alpha_type: ImageAlphaType::Alpha,
        width,
        height,
    }
}

#[test]
fn unsupported_primitive_is_composited_through_an_offscreen_image() {
    let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
    let device = record_with(
        without(PaintEngineFeatures::ALPHA_BLEND),
        PainterConfig::default(),
        |p| p.fill_rect(rect, translucent_red()),
    );

    let draws = draws_with_state(&device);
    assert_eq!(draws.len(), 1, "only the blit reaches the device: {draws:?}");
    let (op, state) = &draws[0];
    assert_eq!(
        op,
        &DrawOp::Image {
            target: rect,
            source: Rect::new(0.0, 0.0, 10.0, 10.0),
            width: 10,
            height: 10,
            flags: ImageConversionFlags::ORDERED_DITHER
                | ImageConversionFlags::ORDERED_ALPHA_DITHER,
            pixmap: false,
        }
    );
    assert_eq!(state.transform, Affine::IDENTITY);
    assert_eq!(state.opacity, 1.0);

    let offscreens = device.engine().offscreens();
    assert_eq!(offscreens.len(), 1);
    let nested = offscreens[0].borrow();
    let nested_draws = draws_with_state(&nested);
    assert_eq!(nested_draws.len(), 1, "{nested_draws:?}");
    let (op, state) = &nested_draws[0];
    assert!(matches!(op, DrawOp::Path { .. }), "{op:?}");
    assert_eq!(state.transform, Affine::translate((-10.0, -10.0)));
    assert_eq!(state.brush, translucent_red());
    assert!(!state.pen.is_visible(), "fills are drawn without the pen");
}

#[test]
fn offscreen_painter_draws_under_the_redirected_transform() {
    let device = record_with(
        without(PaintEngineFeatures::ALPHA_BLEND),
        PainterConfig::default(),
        |p| {
            p.translate(Vec2::new(5.0, 5.0));
            p.scale(2.0, 2.0);
            p.fill_rect(Rect::new(0.0, 0.0, 5.0, 5.0), translucent_red());
        },
    );
    let draws: Vec<_> = device.engine().draws().cloned().collect();
    assert!(
        matches!(
            &draws[..],
            [DrawOp::Image { target, .. }] if *target == Rect::new(5.0, 5.0, 15.0, 15.0)
        ),
        "{draws:?}"
    );
    let offscreens = device.engine().offscreens();
    let nested = offscreens[0].borrow();
    let state = nested.engine().state();
    assert_affine_near(state.transform, Affine::scale(2.0));
}

#[test]
fn offscreen_area_is_limited_by_the_clip() {
    let device = record_with(
        without(PaintEngineFeatures::ALPHA_BLEND),
        PainterConfig::default(),
        |p| {
            p.set_clip_rect(Rect::new(0.0, 0.0, 15.0, 15.0), ClipOperation::ReplaceClip);
            p.fill_rect(Rect::new(10.0, 10.0, 20.0, 20.0), translucent_red());
        },
    );
    let draws: Vec<_> = device.engine().draws().cloned().collect();
    assert!(
        matches!(
            &draws[..],
            [DrawOp::Image { target, width: 5, height: 5, .. }]
                if *target == Rect::new(10.0, 10.0, 15.0, 15.0)
        ),
        "{draws:?}"
    );
}

#[test]
fn square_caps_extend_the_offscreen_area() {
    let device = record_with(
        without(PaintEngineFeatures::ALPHA_BLEND),
        PainterConfig::default(),
        |p| {
            p.set_pen(Pen::solid(css::CRIMSON.with_alpha(0.7), 10.0));
            p.draw_line(Line::new((12.0, 12.0), (40.0, 40.0)));
        },
    );
    // The cap corners reach 5 * sqrt(2) past each end along both axes.
    let draws: Vec<_> = device.engine().draws().cloned().collect();
    assert!(
        matches!(
            &draws[..],
            [DrawOp::Image { target, width: 44, height: 44, .. }]
                if *target == Rect::new(4.0, 4.0, 48.0, 48.0)
        ),
        "{draws:?}"
    );
}

#[test]
fn zero_area_fallback_draws_and_allocates_nothing() {
    let device = record_with(
        without(PaintEngineFeatures::ALPHA_BLEND),
        PainterConfig::default(),
        |p| {
            p.fill_rect(Rect::new(200.0, 200.0, 210.0, 210.0), translucent_red());
            p.fill_rect(Rect::new(10.0, 10.0, 10.0, 40.0), translucent_red());
        },
    );
    assert_eq!(device.engine().draws().count(), 0);
    assert!(device.engine().offscreens().is_empty());
}

#[test]
fn nested_painters_never_fall_back_again() {
    let config = PainterConfig {
        force_offscreen_fallback: true,
        ..PainterConfig::default()
    };
    let device = record_with(RecordingDevice::new(50, 50), config, |p| {
        p.set_pen(Pen::none());
        p.set_brush(translucent_red());
        p.draw_ellipse(Rect::new(5.0, 5.0, 25.0, 15.0));
    });

    let draws: Vec<_> = device.engine().draws().cloned().collect();
    assert!(matches!(&draws[..], [DrawOp::Image { .. }]), "{draws:?}");
    let offscreens = device.engine().offscreens();
    assert_eq!(offscreens.len(), 1, "one level of offscreen compositing");
    let nested = offscreens[0].borrow();
    assert!(nested.engine().offscreens().is_empty());
    assert_eq!(nested.engine().draws().count(), 1);
}

#[test]
fn device_gradient_is_remapped_without_an_offscreen() {
    let gradient = linear_gradient(Point::ZERO, Point::new(1.0, 0.0), css::RED, css::BLUE);
    let device = record_with(
        RecordingDevice::new(40, 20),
        PainterConfig::default(),
        |p| {
            p.translate(Vec2::new(10.0, 0.0));
            p.fill_rect(
                Rect::new(0.0, 0.0, 10.0, 10.0),
                Brush::gradient_with_mode(gradient, GradientCoordinateMode::StretchToDevice),
            );
        },
    );
    assert!(device.engine().offscreens().is_empty());
    let draws = draws_with_state(&device);
    let [(DrawOp::Path { .. }, state)] = &draws[..] else {
        panic!("expected one remapped path, got {draws:?}");
    };
    assert_eq!(
        state.brush.gradient_mode(),
        Some(GradientCoordinateMode::Logical)
    );
    assert_affine_near(
        state.brush.transform(),
        Affine::new([40.0, 0.0, 0.0, 20.0, -10.0, 0.0]),
    );
}

#[test]
fn device_gradient_spans_device_pixels_on_hidpi() {
    let gradient = linear_gradient(Point::ZERO, Point::new(1.0, 0.0), css::RED, css::BLUE);
    let device = record_with(
        RecordingDevice::new(40, 20).with_device_pixel_ratio(2.0),
        PainterConfig::default(),
        |p| {
            p.fill_rect(
                Rect::new(0.0, 0.0, 10.0, 10.0),
                Brush::gradient_with_mode(gradient, GradientCoordinateMode::StretchToDevice),
            );
        },
    );
    let draws = draws_with_state(&device);
    let [(DrawOp::Path { .. }, state)] = &draws[..] else {
        panic!("expected one remapped path, got {draws:?}");
    };
    // 40x20 device pixels are 20x10 logical units.
    assert_affine_near(
        state.brush.transform(),
        Affine::new([20.0, 0.0, 0.0, 10.0, 0.0, 0.0]),
    );
}

#[test]
fn opaque_background_fills_in_two_passes() {
    let pattern = Brush::pattern(BrushPattern::Dense4, css::BLACK);
    let device = record(40, 40, |p| {
        p.set_pen(Pen::none());
        p.set_brush(pattern.clone());
        p.set_background(Brush::solid(css::YELLOW));
        p.set_background_mode(BackgroundMode::Opaque);
        p.draw_rect(Rect::new(4.0, 4.0, 20.0, 20.0));
    });

    let draws = draws_with_state(&device);
    assert_eq!(draws.len(), 2, "{draws:?}");
    let (first, second) = (&draws[0].1, &draws[1].1);
    assert_eq!(first.brush, Brush::solid(css::YELLOW));
    assert_eq!(second.brush, pattern);
    for (op, state) in &draws {
        assert!(matches!(op, DrawOp::Path { .. }), "{op:?}");
        assert_eq!(state.background_mode, BackgroundMode::Transparent);
        assert!(!state.pen.is_visible(), "fill passes do not stroke");
    }
    assert!(device.engine().offscreens().is_empty());
}

#[test]
fn opaque_background_strokes_dashes_over_a_solid_line() {
    let dashed = Pen::solid(css::BLACK, 2.0).with_style(PenStyle::Dash);
    let device = record(40, 40, |p| {
        p.set_pen(dashed.clone());
        p.set_background(Brush::solid(css::YELLOW));
        p.set_background_mode(BackgroundMode::Opaque);
        p.draw_line(Line::new((2.0, 20.0), (38.0, 20.0)));
    });

    let draws = draws_with_state(&device);
    assert_eq!(draws.len(), 2, "{draws:?}");
    let (first, second) = (&draws[0].1.pen, &draws[1].1.pen);
    assert_eq!(first.style(), PenStyle::Solid);
    assert_eq!(first.brush(), &Brush::solid(css::YELLOW));
    assert_eq!(first.width(), 2.0);
    assert_eq!(second, &dashed);
}

#[test]
fn opaque_background_text_draws_bounds_then_glyphs() {
    let item = TextItem {
        outline: Rect::new(0.0, -8.0, 6.0, 0.0).to_path(0.1),
        bounds: Rect::new(0.0, -10.0, 20.0, 2.0),
        text: String::from("hi"),
    };
    let device = record(60, 40, |p| {
        p.set_pen(Pen::solid(css::RED, 1.0));
        p.set_background(Brush::solid(css::BLUE));
        p.set_background_mode(BackgroundMode::Opaque);
        p.draw_text(Point::new(5.0, 20.0), &item);
        p.draw_static_text(Point::new(5.0, 35.0), &item);
    });

    let draws = draws_with_state(&device);
    assert_eq!(draws.len(), 4, "{draws:?}");

    let (background, state) = &draws[0];
    assert_eq!(
        background,
        &DrawOp::Rects(vec![Rect::new(5.0, 10.0, 25.0, 22.0)])
    );
    assert_eq!(state.brush, Brush::solid(css::BLUE));
    assert!(!state.pen.is_visible(), "the background box is not outlined");

    let (glyphs, state) = &draws[1];
    assert_eq!(
        glyphs,
        &DrawOp::Text {
            origin: Point::new(5.0, 20.0),
            text: String::from("hi"),
            is_static: false,
        }
    );
    assert_eq!(state.pen, Pen::solid(css::RED, 1.0));
    assert_eq!(state.background_mode, BackgroundMode::Transparent);

    assert!(
        matches!(&draws[3].0, DrawOp::Text { is_static: true, .. }),
        "{:?}",
        draws[3].0
    );
}

#[test]
fn transformed_image_becomes_a_textured_rectangle() {
    let image = opaque_image(4, 4);
    let target = Rect::new(0.0, 0.0, 10.0, 10.0);
    let device = record_with(
        without(PaintEngineFeatures::PIXMAP_TRANSFORM),
        PainterConfig::default(),
        |p| {
            p.draw_image(target, &image);
            p.rotate(0.3);
            p.draw_image(target, &image);
        },
    );

    let draws = draws_with_state(&device);
    assert_eq!(draws.len(), 2, "{draws:?}");
    assert!(
        matches!(&draws[0].0, DrawOp::Image { width: 4, height: 4, pixmap: false, .. }),
        "untransformed images are drawn directly: {:?}",
        draws[0].0
    );
    let (op, state) = &draws[1];
    assert_eq!(op, &DrawOp::Rects(vec![target]));
    assert_eq!(state.brush.style(), BrushStyle::Texture);
    assert_affine_near(state.brush.transform(), Affine::scale(2.5));
    assert!(!state.pen.is_visible(), "textured rectangles are not outlined");
}

#[test]
fn pixmaps_keep_their_entry_point() {
    let image = opaque_image(2, 2);
    let device = record(20, 20, |p| {
        p.draw_pixmap(Rect::new(1.0, 1.0, 3.0, 3.0), &image, Rect::new(0.0, 0.0, 2.0, 2.0));
    });
    assert!(
        matches!(
            device.engine().draws().next(),
            Some(DrawOp::Image { pixmap: true, .. })
        ),
        "pixmaps reach the pixmap entry point"
    );
}

#[test]
fn points_fall_back_as_pen_sized_squares() {
    let device = record_with(
        without(PaintEngineFeatures::BRUSH_STROKE),
        PainterConfig::default(),
        |p| {
            let gradient = linear_gradient(Point::ZERO, Point::new(10.0, 0.0), css::RED, css::BLUE);
            p.set_pen(Pen::new(Brush::gradient(gradient), 4.0));
            p.draw_point(Point::new(10.0, 10.0));
        },
    );
    let draws = draws_with_state(&device);
    let [(DrawOp::Path { path, .. }, state)] = &draws[..] else {
        panic!("expected one square, got {draws:?}");
    };
    assert_eq!(path.bounding_box(), Rect::new(8.0, 8.0, 12.0, 12.0));
    assert_eq!(state.brush.style(), BrushStyle::LinearGradient);
    assert!(!state.pen.is_visible(), "squares are filled with the pen brush");
}

#[test]
fn failed_begin_rolls_back() {
    let config = PainterConfig {
        max_offscreen_dimension: 50,
        ..PainterConfig::default()
    };
    let (device, shared) = share(RecordingDevice::new(100, 100));
    let mut painter = Painter::with_config(config);
    assert_eq!(
        painter.begin(shared.clone()),
        Err(BeginError::TooLarge {
            width: 100,
            height: 100,
            max: 50
        })
    );
    assert!(!painter.is_active());
    assert!(device.borrow().engine().events().is_empty());

    let mut painter = Painter::new();
    assert!(painter.begin(shared).is_ok(), "the device is free again");
    assert!(painter.end());
}

#[test]
fn degenerate_device_cannot_begin() {
    let (device, shared) = share(RecordingDevice::new(0, 0));
    let mut painter = Painter::new();
    assert_eq!(
        painter.begin(shared),
        Err(BeginError::DegenerateDevice {
            width: 0,
            height: 0
        })
    );
    assert!(device.borrow().engine().events().is_empty());
}

#[rstest]
fn invalid_pixel_ratio_cannot_begin(
    #[values(0.0, -2.0, f64::NAN, f64::INFINITY)] ratio: f64,
) {
    let (device, shared) = share(RecordingDevice::new(10, 10).with_device_pixel_ratio(ratio));
    let mut painter = Painter::new();
    assert_eq!(painter.begin(shared), Err(BeginError::InvalidPixelRatio));
    assert!(!painter.is_active());
    assert!(device.borrow().engine().events().is_empty());
}

#[test]
fn beginning_twice_is_refused_with_a_warning() {
    let (_device, shared) = share(RecordingDevice::new(10, 10));
    let (result, warnings) = count_warnings(|| {
        let mut painter = Painter::new();
        painter.begin(shared.clone()).expect("first begin succeeds");
        let second = painter.begin(shared.clone());
        assert!(painter.is_active(), "the first session is untouched");
        second
    });
    assert_eq!(result, Err(BeginError::AlreadyActive));
    assert_eq!(warnings, 1);
}

#[test]
fn painters_sharing_a_device_drive_the_engine_once() {
    let (device, shared) = share(RecordingDevice::new(20, 20));
    let mut first = Painter::new();
    first.begin(shared.clone()).expect("first painter begins");
    let mut second = Painter::new();
    second.begin(shared).expect("second painter joins");
    second.draw_rect(Rect::new(1.0, 1.0, 5.0, 5.0));
    assert!(second.end());
    first.draw_rect(Rect::new(1.0, 1.0, 5.0, 5.0));
    assert!(first.end());

    let device = device.borrow();
    let events = device.engine().events();
    let begins = events.iter().filter(|e| matches!(e, Event::Begin(_))).count();
    let ends = events.iter().filter(|e| matches!(e, Event::End)).count();
    assert_eq!((begins, ends), (1, 1));
    assert_eq!(device.engine().draws().count(), 2);
}

#[cfg(debug_assertions)]
#[test]
fn widget_devices_are_painted_from_their_thread() {
    let other = std::thread::spawn(|| std::thread::current().id())
        .join()
        .expect("thread ran");
    let device = RecordingDevice::new(10, 10)
        .with_kind(understory_painter::DeviceKind::Widget)
        .with_owner_thread(other);
    let (_device, shared) = share(device);
    let mut painter = Painter::new();
    assert_eq!(painter.begin(shared.clone()), Err(BeginError::WrongThread));

    let unchecked = PainterConfig {
        check_thread_affinity: false,
        ..PainterConfig::default()
    };
    let mut painter = Painter::with_config(unchecked);
    assert!(painter.begin(shared).is_ok(), "the check can be turned off");
}

#[test]
fn clipping_to_a_path_reaches_the_engine_in_device_space() {
    let mut path = BezPath::new();
    path.move_to((0.0, 0.0));
    path.line_to((10.0, 0.0));
    path.line_to((0.0, 10.0));
    path.close_path();
    let device = record_with(
        RecordingDevice::new(40, 40).with_device_pixel_ratio(2.0),
        PainterConfig::default(),
        |p| {
            p.set_clip_path(path, peniko::Fill::NonZero, ClipOperation::ReplaceClip);
            p.draw_rect(Rect::new(0.0, 0.0, 5.0, 5.0));
        },
    );
    let clip = &device.engine().state().clip;
    assert_eq!(clip.paths().len(), 1);
    assert_eq!(
        clip.paths()[0].0.bounding_box(),
        Rect::new(0.0, 0.0, 20.0, 20.0)
    );
}
