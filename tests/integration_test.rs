use docprep::params::ParameterBag;
use docprep::preprocessing::steps::clahe::apply_clahe;
use docprep::preprocessing::steps::deskew::deskew;
use docprep::preprocessing::steps::levels::levels_and_gamma_8u;
use docprep::preprocessing::steps::punch_holes::{
    remove_punch_holes, PunchHoleOptions, PunchShape, PunchSpec,
};
use docprep::preprocessing::steps::retinex::{homomorphic_retinex, RetinexOptions};
use docprep::preprocessing::steps::threshold::{binarize, BinarizeMethod, BinarizeParameters};
use docprep::{
    create_processor, CancellationToken, CommandKind, ProcessingError, ProcessorEvent,
    ProcessorKind, SaveFormat,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

fn bag(value: Value) -> ParameterBag {
    value.as_object().cloned().unwrap()
}

fn is_binary(image: &GrayImage) -> bool {
    image.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
}

/// A white page with a dark text block rotated by a few degrees
fn skewed_page() -> DynamicImage {
    let angle = 5f32.to_radians();
    let (cx, cy) = (100.0f32, 70.0f32);
    DynamicImage::ImageLuma8(GrayImage::from_fn(200, 140, |x, y| {
        let (dx, dy) = (x as f32 - cx, y as f32 - cy);
        let u = dx * angle.cos() + dy * angle.sin();
        let v = -dx * angle.sin() + dy * angle.cos();
        let inside = u.abs() < 60.0 && v.abs() < 25.0 && (v as i32).rem_euclid(6) < 3;
        Luma([if inside { 20 } else { 250 }])
    }))
}

#[test]
fn test_threshold_on_flat_gray() {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([128])));
    let out = binarize(&img, &BinarizeParameters::default()).unwrap();
    let DynamicImage::ImageLuma8(gray) = out else {
        panic!("expected a single-channel result");
    };
    assert_eq!(gray.dimensions(), (10, 10));
    assert!(is_binary(&gray));
}

#[test]
fn test_sauvola_on_flat_color() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([200, 200, 200])));
    let params = BinarizeParameters {
        method: BinarizeMethod::Sauvola,
        ..Default::default()
    };
    let out = binarize(&img, &params).unwrap();
    assert!(matches!(out, DynamicImage::ImageLuma8(_)));
    assert_eq!((out.width(), out.height()), (10, 10));
}

#[test]
fn test_sauvola_single_pixel_even_window() {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([200])));
    let params = BinarizeParameters {
        method: BinarizeMethod::Sauvola,
        sauvola_window_size: 2,
        ..Default::default()
    };
    let out = binarize(&img, &params).unwrap();
    assert_eq!((out.width(), out.height()), (1, 1));
    assert!(matches!(out, DynamicImage::ImageLuma8(_)));
}

#[test]
fn test_retinex_on_flat_color() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([180, 180, 180])));
    let out = homomorphic_retinex(&CancellationToken::new(), &img, &RetinexOptions::default())
        .unwrap();
    let DynamicImage::ImageLuma8(gray) = out else {
        panic!("expected a single-channel result");
    };
    assert_eq!(gray.dimensions(), (16, 16));
    let min = gray.pixels().map(|p| p.0[0]).min().unwrap();
    let max = gray.pixels().map(|p| p.0[0]).max().unwrap();
    assert_eq!(min, max);
}

/// White page with one black 20x10 hole near the top-left corner
fn page_with_rect_hole() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(80, 60, |x, y| {
        if (10..30).contains(&x) && (5..15).contains(&y) {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    }))
}

fn rect_hole_spec() -> [PunchSpec; 1] {
    [PunchSpec {
        shape: PunchShape::Rect {
            width: 20,
            height: 10,
        },
        density: 1.0,
        size_tolerance: 0.2,
    }]
}

#[test]
fn test_rect_punch_hole_is_repainted() {
    let img = page_with_rect_hole();
    let specs = rect_hole_spec();
    let out = remove_punch_holes(
        &CancellationToken::new(),
        Some(&img),
        &specs,
        &PunchHoleOptions::default(),
    )
    .unwrap()
    .unwrap();

    let DynamicImage::ImageRgb8(rgb) = out.as_ref() else {
        panic!("expected an RGB result");
    };
    assert_eq!(rgb.dimensions(), (80, 60));
    let center = rgb.get_pixel(20, 10);
    assert!(center.0.iter().all(|&c| c > 200), "hole still dark: {center:?}");
}

#[test]
fn test_pre_cancelled_punch_hole_removal_keeps_input() {
    let img = page_with_rect_hole();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = remove_punch_holes(
        &cancel,
        Some(&img),
        &rect_hole_spec(),
        &PunchHoleOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ProcessingError::Cancelled));
    assert_eq!(img, page_with_rect_hole());

    // the same call without cancellation does find the hole
    let out = remove_punch_holes(
        &CancellationToken::new(),
        Some(&img),
        &rect_hole_spec(),
        &PunchHoleOptions::default(),
    )
    .unwrap()
    .unwrap();
    assert_ne!(out.as_ref(), &img);
}

/// Run `step` many times on the same input and require identical results
fn assert_stable<F>(name: &str, step: F)
where
    F: Fn() -> DynamicImage,
{
    let first = step();
    for round in 1..30 {
        assert!(step() == first, "{name} changed on round {round}");
    }
}

#[test]
fn test_steps_are_repeatable() {
    let page = skewed_page();
    let gray = DynamicImage::ImageLuma8(page.to_luma8());
    let color = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
        Rgb([(x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8])
    }));
    let holed = page_with_rect_hole();
    let cancel = CancellationToken::new();
    let sauvola = BinarizeParameters {
        method: BinarizeMethod::Sauvola,
        ..Default::default()
    };

    assert_stable("sauvola", || binarize(&page, &sauvola).unwrap());
    assert_stable("clahe", || apply_clahe(&cancel, &color).unwrap());
    assert_stable("retinex", || {
        homomorphic_retinex(&cancel, &color, &RetinexOptions::default()).unwrap()
    });
    assert_stable("levels", || {
        levels_and_gamma_8u(&gray, &cancel, 1.0, 99.0).unwrap()
    });
    assert_stable("deskew", || deskew(&page).unwrap());
    assert_stable("punch holes", || {
        remove_punch_holes(&cancel, Some(&holed), &rect_hole_spec(), &PunchHoleOptions::default())
            .unwrap()
            .unwrap()
            .into_owned()
    });
}

#[test]
fn test_repeated_commands_do_not_accumulate_state() {
    let page = skewed_page();
    for kind in [ProcessorKind::Vision, ProcessorKind::Classic] {
        let mut processor = create_processor(kind).unwrap();
        let events = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&events);
        processor.subscribe(Box::new(move |_: &ProcessorEvent| {
            *sink.lock().unwrap() += 1
        }));

        // reload and rerun: same input, same output every time
        let mut first = None;
        for round in 0..30 {
            processor.load_image(page.clone()).unwrap();
            processor
                .apply_command(CommandKind::Deskew, &ParameterBag::new())
                .unwrap();
            let current = processor.current_image().unwrap().clone();
            match &first {
                None => first = Some(current),
                Some(expected) => assert!(&current == expected, "{kind} round {round}"),
            }
            assert_eq!(*events.lock().unwrap(), 2 * (round + 1));
        }

        // thresholding a bilevel image again leaves it as it is
        processor
            .apply_command(CommandKind::Binarize, &ParameterBag::new())
            .unwrap();
        let bilevel = processor.current_image().unwrap().clone();
        for _ in 0..30 {
            processor
                .apply_command(CommandKind::Binarize, &ParameterBag::new())
                .unwrap();
            assert!(processor.current_image() == Some(&bilevel), "{kind}");
        }
        assert_eq!(*events.lock().unwrap(), 2 * 30 + 31);
    }
}

#[test]
fn test_clahe_with_cancelled_token() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([40, 90, 140])));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = apply_clahe(&cancel, &img).unwrap_err();
    assert!(matches!(err, ProcessingError::Cancelled));
}

#[test]
fn test_processor_publishes_one_event_per_call() {
    let mut processor = create_processor(ProcessorKind::Vision).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    processor.subscribe(Box::new(move |event: &ProcessorEvent| {
        sink.lock().unwrap().push(event.clone())
    }));

    assert!(processor.load(b"not an image").is_err());
    let page = skewed_page();
    let mut png = Vec::new();
    page.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    processor.load(&png).unwrap();
    processor
        .apply_command(CommandKind::Deskew, &ParameterBag::new())
        .unwrap();
    processor
        .apply_command(
            CommandKind::ChannelsCorrection,
            &bag(json!({"mode": "bogus"})),
        )
        .unwrap_err();

    let events = events.lock().unwrap();
    let kinds: Vec<bool> = events
        .iter()
        .map(|e| matches!(e, ProcessorEvent::ImageUpdated(_)))
        .collect();
    assert_eq!(kinds, vec![false, true, true, false]);

    let ProcessorEvent::ImageUpdated(latest) = &events[2] else {
        panic!("expected an update");
    };
    let decoded = image::load_from_memory(latest).unwrap();
    assert_eq!(Some(&decoded), processor.current_image());
}

#[test]
fn test_backends_share_commands_and_differ_in_coverage() {
    let page = skewed_page();
    for kind in [ProcessorKind::Vision, ProcessorKind::Classic] {
        let mut processor = create_processor(kind).unwrap();
        processor.load_image(page.clone()).unwrap();
        for command in [CommandKind::Deskew, CommandKind::Binarize, CommandKind::Despeckle] {
            processor
                .apply_command(command, &ParameterBag::new())
                .unwrap_or_else(|e| panic!("{kind} {command}: {e}"));
        }
        let gray = processor.current_image().unwrap().to_luma8();
        assert!(is_binary(&gray), "{kind} result is not bilevel");
    }

    let mut classic = create_processor(ProcessorKind::Classic).unwrap();
    classic.load_image(page).unwrap();
    let err = classic
        .apply_command(CommandKind::ChannelsCorrection, &ParameterBag::new())
        .unwrap_err();
    assert!(matches!(err, ProcessingError::Unsupported(_)));
}

#[test]
fn test_stream_for_saving_formats() {
    let mut processor = create_processor(ProcessorKind::Vision).unwrap();
    processor.load_image(skewed_page()).unwrap();
    for format in [SaveFormat::Png, SaveFormat::Jpeg, SaveFormat::Tiff, SaveFormat::Bmp] {
        let bytes = processor.stream_for_saving(format, 90).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 140));
    }
}

fn write_page(dir: &Path) -> std::path::PathBuf {
    let input = dir.join("page.png");
    skewed_page().save(&input).unwrap();
    input
}

#[test]
fn test_cli_runs_commands_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_page(dir.path());
    let output = dir.path().join("clean.png");

    let result = Command::new(env!("CARGO_BIN_EXE_docprep"))
        .arg(&input)
        .args(["-o"])
        .arg(&output)
        .args(["-c", "deskew", "-c", "binarize", "--param", "method=sauvola"])
        .arg("--report")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run docprep");
    assert!(
        result.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let written = image::open(&output).unwrap();
    assert!(is_binary(&written.to_luma8()));

    let report: Value = serde_json::from_slice(&result.stdout).unwrap();
    assert_eq!(report["backend"], "vision");
    assert_eq!(report["steps"].as_array().unwrap().len(), 2);
    assert_eq!(report["steps"][1]["name"], "Binarize");
    assert_eq!(report["width"], written.width());
}

#[test]
fn test_cli_reads_params_file_and_format() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_page(dir.path());
    let params = dir.path().join("params.json");
    fs::write(&params, r#"{"mode": "levels", "black_pct": 2, "white_pct": 98}"#).unwrap();
    let output = dir.path().join("out.bin");

    let status = Command::new(env!("CARGO_BIN_EXE_docprep"))
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .args(["--command", "channels-correction", "--params"])
        .arg(&params)
        .env("DOCPREP_FORMAT", "bmp")
        .env("RUST_LOG", "warn")
        .status()
        .expect("failed to run docprep");
    assert!(status.success());

    let bytes = fs::read(&output).unwrap();
    assert_eq!(
        image::guess_format(&bytes).unwrap(),
        image::ImageFormat::Bmp
    );
}

#[test]
fn test_cli_rejects_unknown_command() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_page(dir.path());
    let output = dir.path().join("never.png");

    let status = Command::new(env!("CARGO_BIN_EXE_docprep"))
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(["-c", "sharpen"])
        .env("RUST_LOG", "error")
        .status()
        .expect("failed to run docprep");
    assert!(!status.success());
    assert!(!output.exists());
}
