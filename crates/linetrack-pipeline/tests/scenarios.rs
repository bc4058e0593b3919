#![allow(clippy::unwrap_used)]

//! End-to-end behavior of the full pipeline on synthetic camera frames.

use linetrack_pipeline::{
    AngleRange, BgrImage, Frame, GrayImage, LinePipeline, PipelineConfig, PipelineError,
    desaturate,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Black 640x480 camera frame with a white horizontal line 100 px long
/// (columns 100..200) and 24 px thick (rows 200..224).
fn horizontal_line_frame() -> Frame {
    Frame::Bgr(BgrImage::from_fn(WIDTH, HEIGHT, |x, y| {
        if (100..200).contains(&x) && (200..224).contains(&y) {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    }))
}

/// White band along the 45 degree diagonal, cut off at x = 150 and x = 450.
fn diagonal_band_frame() -> Frame {
    Frame::Bgr(BgrImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let offset = i64::from(y) - i64::from(x);
        if (150..450).contains(&x) && offset.abs() < 24 {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    }))
}

fn is_horizontal(angle: f64) -> bool {
    let folded = angle.rem_euclid(180.0);
    folded < 3.0 || folded > 177.0
}

#[test]
fn horizontal_line_survives_default_filter() {
    let mut pipeline = LinePipeline::new(PipelineConfig::default());
    let lines = pipeline.process(&horizontal_line_frame()).unwrap().clone();

    assert!(!lines.is_empty(), "expected the line to be detected");
    for line in &lines {
        assert!(line.length() >= PipelineConfig::DEFAULT_MIN_LENGTH);
        assert!(is_horizontal(line.angle()), "angle {}", line.angle());
        // 100 px at quarter scale, plus the edge's corner pixels.
        assert!((line.length() - 25.0).abs() <= 1.5, "length {}", line.length());
    }
}

#[test]
fn endpoints_reflect_quarter_scale() {
    let config = PipelineConfig::default();
    let mut pipeline = LinePipeline::new(config.clone());
    let lines = pipeline.process(&horizontal_line_frame()).unwrap().clone();

    for line in &lines {
        // Resized space: the line spans columns 25..50 of a 160x120 image.
        assert!((line.x1 - 24.5).abs() <= 1.5, "x1 {}", line.x1);
        assert!((line.x2 - 49.5).abs() <= 1.5, "x2 {}", line.x2);
        assert!((49.0..57.0).contains(&line.y1), "y1 {}", line.y1);
    }

    let frame_lines = config.to_frame_coordinates(&lines).unwrap();
    assert_eq!(frame_lines.len(), lines.len());
    for line in &frame_lines {
        assert!((line.x1 - 99.5).abs() <= 6.0, "x1 {}", line.x1);
        assert!((line.x2 - 199.5).abs() <= 6.0, "x2 {}", line.x2);
        assert!((195.0..230.0).contains(&line.y1), "y1 {}", line.y1);
        assert!((line.length() - 100.0).abs() <= 6.0, "length {}", line.length());
    }
}

#[test]
fn long_min_length_excludes_the_line() {
    let config = PipelineConfig {
        min_length: 200.0,
        ..PipelineConfig::default()
    };
    let mut pipeline = LinePipeline::new(config);
    let lines = pipeline.process(&horizontal_line_frame()).unwrap();
    assert!(lines.is_empty());
    assert!(!pipeline.detected().unwrap().is_empty());
}

#[test]
fn config_loaded_from_json_applies() {
    let config: PipelineConfig = serde_json::from_str(r#"{ "min_length": 200.0 }"#).unwrap();
    assert!((config.scale_x - PipelineConfig::DEFAULT_SCALE).abs() < f64::EPSILON);
    let mut pipeline = LinePipeline::new(config);
    assert!(pipeline.process(&horizontal_line_frame()).unwrap().is_empty());
}

#[test]
fn black_frame_yields_nothing() {
    let black = Frame::Bgr(BgrImage::new(WIDTH, HEIGHT));
    let mut pipeline = LinePipeline::default();
    assert!(pipeline.process(&black).unwrap().is_empty());
    assert!(pipeline.detected().unwrap().is_empty());
    assert!(pipeline.eroded().unwrap().as_bytes().iter().all(|&v| v == 0));
}

#[test]
fn gray_desaturate_is_an_independent_copy() {
    let original = GrayImage::from_fn(32, 24, |x, y| image::Luma([u8::try_from((x * 7 + y) % 256).unwrap()]));
    let frame = Frame::Gray(original.clone());

    let mut copy = desaturate(&frame);
    assert_eq!(copy, original);
    copy.put_pixel(3, 3, image::Luma([0]));
    copy.put_pixel(4, 4, image::Luma([255]));
    assert_eq!(frame, Frame::Gray(original));
}

#[test]
fn angle_range_selects_diagonal_line() {
    let frame = diagonal_band_frame();

    let along = PipelineConfig {
        angle_range: AngleRange::new(30.0, 60.0).unwrap(),
        ..PipelineConfig::default()
    };
    let mut pipeline = LinePipeline::new(along);
    let kept = pipeline.process(&frame).unwrap().clone();
    assert!(!kept.is_empty(), "detected: {:?}", pipeline.detected());
    for line in &kept {
        assert!((line.angle() - 45.0).abs() < 3.0, "angle {}", line.angle());
    }

    let across = PipelineConfig {
        angle_range: AngleRange::new(120.0, 150.0).unwrap(),
        ..PipelineConfig::default()
    };
    let mut pipeline = LinePipeline::new(across);
    assert!(pipeline.process(&frame).unwrap().is_empty());
}

#[test]
fn reversed_range_gives_same_result() {
    // [210, 240] is [30, 60] shifted by a half turn.
    let frame = diagonal_band_frame();
    let run = |range: AngleRange| {
        let config = PipelineConfig {
            angle_range: range,
            ..PipelineConfig::default()
        };
        LinePipeline::new(config).process(&frame).unwrap().clone()
    };
    assert_eq!(
        run(AngleRange::new(30.0, 60.0).unwrap()),
        run(AngleRange::new(210.0, 240.0).unwrap())
    );
}

#[test]
fn gray_and_color_frames_agree() {
    let color = horizontal_line_frame();
    let gray = Frame::Gray(desaturate(&color));
    let mut a = LinePipeline::default();
    let mut b = LinePipeline::default();
    assert_eq!(a.process(&color).unwrap(), b.process(&gray).unwrap());
}

#[test]
fn raw_camera_buffer_round_trip() {
    let Frame::Bgr(img) = horizontal_line_frame() else {
        unreachable!()
    };
    let frame = Frame::from_raw(WIDTH, HEIGHT, 3, img.into_raw()).unwrap();
    let mut pipeline = LinePipeline::default();
    assert!(!pipeline.process(&frame).unwrap().is_empty());

    let bad = Frame::from_raw(WIDTH, HEIGHT, 2, vec![0; 10]);
    assert!(matches!(bad, Err(PipelineError::InvalidArgument(_))));
}
