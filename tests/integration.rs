use std::cell::{Cell, RefCell};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{GrayImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use transparent_cutout::{
    bounding_box, encode_png, BatchEvent, BorderKeySegmenter, CutoutEngine, Error,
    ProcessOptions, SegmentError,
};

fn passthrough(bytes: &[u8]) -> Result<Vec<u8>, SegmentError> {
    Ok(bytes.to_vec())
}

#[allow(clippy::cast_possible_truncation)]
fn write_photo(path: &Path, w: u32, h: u32) {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 7) as u8, (y * 11) as u8, 128])
    })
    .save_with_format(path, ImageFormat::Png)
    .unwrap();
}

fn subject_on_white(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        if (2..6).contains(&x) && (1..4).contains(&y) {
            Rgb([30, 60, 200])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

/// Run `f` with warnings and errors captured into the returned buffer.
fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, LogBuffer) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs)
}

fn output_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn batch_isolates_a_corrupt_item() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    write_photo(&input.path().join("a.png"), 16, 12);
    fs::write(input.path().join("b.jpg"), b"definitely not a jpeg").unwrap();
    write_photo(&input.path().join("c.png"), 9, 9);
    fs::write(input.path().join("notes.txt"), b"ignore me").unwrap();

    let calls = Cell::new(0);
    let segmenter = |bytes: &[u8]| -> Result<Vec<u8>, SegmentError> {
        calls.set(calls.get() + 1);
        Ok(bytes.to_vec())
    };
    let engine = CutoutEngine::new(segmenter, ProcessOptions::default()).unwrap();

    let started = RefCell::new(Vec::new());
    let seen = RefCell::new(Vec::new());
    let summary = engine
        .process_directory(input.path(), output.path(), |event| match event {
            BatchEvent::Started { total } => started.borrow_mut().push(total),
            BatchEvent::Finished {
                index,
                total,
                result,
            } => seen.borrow_mut().push((index, total, result.file_name())),
        })
        .unwrap();

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(calls.get(), 2);
    assert_eq!(started.into_inner(), vec![3]);

    let failures: Vec<_> = summary.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].file_name(), "b.jpg");
    let message = failures[0].error.as_ref().unwrap().to_string();
    assert!(message.contains("b.jpg"), "{message}");

    assert_eq!(
        seen.into_inner(),
        vec![
            (0, 3, "a.png".to_string()),
            (1, 3, "b.jpg".to_string()),
            (2, 3, "c.png".to_string()),
        ]
    );
    assert_eq!(
        output_names(output.path()),
        vec!["a_transparent.png", "c_transparent.png"]
    );
}

#[test]
fn failed_item_is_warned_about_exactly_once() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    write_photo(&input.path().join("a.png"), 6, 6);
    fs::write(input.path().join("b.jpg"), b"truncated").unwrap();
    write_photo(&input.path().join("c.png"), 6, 6);

    let engine = CutoutEngine::new(passthrough, ProcessOptions::default()).unwrap();
    let (summary, logs) = capture_warnings(|| {
        engine
            .process_directory(input.path(), output.path(), |_| {})
            .unwrap()
    });
    assert_eq!(summary.failed(), 1);

    let lines = logs.lines();
    let warnings: Vec<_> = lines.iter().filter(|l| l.contains("WARN")).collect();
    assert_eq!(warnings.len(), 1, "{lines:#?}");
    assert!(warnings[0].contains("b.jpg"), "{}", warnings[0]);
    assert!(!lines.iter().any(|l| l.contains("a.png") || l.contains("c.png")));
}

#[test]
fn empty_input_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    let output_root = tempfile::tempdir().unwrap();
    let output = output_root.path().join("out");
    fs::write(input.path().join("readme.md"), b"# nothing here").unwrap();

    let engine = CutoutEngine::new(passthrough, ProcessOptions::default()).unwrap();
    let summary = engine
        .process_directory(input.path(), &output, |event| {
            panic!("no event expected for an empty folder, got {event:?}");
        })
        .unwrap();

    assert_eq!(summary.total(), 0);
    assert!(!output.exists());
}

#[test]
fn missing_input_directory_is_created() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input");

    let engine = CutoutEngine::new(passthrough, ProcessOptions::default()).unwrap();
    let summary = engine
        .process_directory(&input, &root.path().join("output"), |_| {})
        .unwrap();

    assert!(input.is_dir());
    assert_eq!(summary.total(), 0);
}

#[test]
fn uppercase_extension_maps_to_lowercase_png_name() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(8, 8, Rgb([90, 90, 90]))
        .save_with_format(input.path().join("photo.JPG"), ImageFormat::Jpeg)
        .unwrap();

    let engine = CutoutEngine::new(passthrough, ProcessOptions::default()).unwrap();
    let summary = engine
        .process_directory(input.path(), output.path(), |_| {})
        .unwrap();

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(output_names(output.path()), vec!["photo_transparent.png"]);
}

#[test]
fn output_is_rgba_png_with_source_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("shot.png");
    subject_on_white(20, 10).save(&src).unwrap();
    let dst = dir.path().join("nested").join("shot_transparent.png");

    let engine = CutoutEngine::new(BorderKeySegmenter::default(), ProcessOptions::default())
        .unwrap();
    engine.process_image(&src, &dst).unwrap();

    let out = image::open(&dst).unwrap();
    assert_eq!(out.color(), image::ColorType::Rgba8);
    let out = out.into_rgba8();
    assert_eq!(out.dimensions(), (20, 10));
    assert_eq!(out.get_pixel(15, 8)[3], 0);
    assert_eq!(out.get_pixel(3, 2)[3], 255);
}

#[test]
fn center_flag_moves_subject_to_middle() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("shot.png");
    subject_on_white(20, 10).save(&src).unwrap();
    let dst = dir.path().join("shot_transparent.png");

    let opts = ProcessOptions {
        center: true,
        ..ProcessOptions::default()
    };
    let engine = CutoutEngine::new(BorderKeySegmenter::default(), opts).unwrap();
    engine.process_image(&src, &dst).unwrap();

    let out = image::open(&dst).unwrap().into_rgba8();
    let bbox = bounding_box(&out).unwrap();
    // 4x3 subject on a 20x10 canvas
    assert_eq!((bbox.x_min, bbox.x_max), (8, 11));
    assert_eq!((bbox.y_min, bbox.y_max), (3, 5));
}

#[test]
fn segmentation_failure_is_reported_with_path_and_cause() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("cat.png");
    write_photo(&src, 5, 5);
    let dst = dir.path().join("cat_transparent.png");

    let failing = |_: &[u8]| -> Result<Vec<u8>, SegmentError> { Err("model offline".into()) };
    let engine = CutoutEngine::new(failing, ProcessOptions::default()).unwrap();
    let err = engine.process_image(&src, &dst).unwrap_err();

    let Error::File { path, source } = &err else {
        panic!("expected a file error, got {err}");
    };
    assert_eq!(path, &src);
    assert!(matches!(**source, Error::Segmentation(_)));
    assert!(err.to_string().contains("model offline"));
    assert!(!dst.exists());
}

#[test]
fn resized_segmentation_output_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("dog.png");
    write_photo(&src, 12, 8);

    let shrink = |_: &[u8]| -> Result<Vec<u8>, SegmentError> {
        Ok(encode_png(&RgbaImage::from_pixel(6, 4, Rgba([1, 2, 3, 255])))?)
    };
    let engine = CutoutEngine::new(shrink, ProcessOptions::default()).unwrap();
    let err = engine
        .process_image(&src, &dir.path().join("dog_transparent.png"))
        .unwrap_err();

    let Error::File { source, .. } = err else {
        panic!("expected a file error");
    };
    assert!(matches!(
        *source,
        Error::DimensionMismatch {
            width: 12,
            height: 8,
            actual_width: 6,
            actual_height: 4
        }
    ));
}

#[test]
fn grayscale_segmentation_output_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("owl.png");
    write_photo(&src, 4, 4);

    let gray = |_: &[u8]| -> Result<Vec<u8>, SegmentError> {
        let mut buf = std::io::Cursor::new(Vec::new());
        GrayImage::new(4, 4).write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    };
    let engine = CutoutEngine::new(gray, ProcessOptions::default()).unwrap();
    let err = engine
        .process_image(&src, &dir.path().join("owl_transparent.png"))
        .unwrap_err();

    let Error::File { source, .. } = err else {
        panic!("expected a file error");
    };
    assert!(matches!(*source, Error::UnsupportedChannels(1)));
}

#[test]
fn invalid_options_are_rejected_up_front() {
    let mut opts = ProcessOptions::default();
    opts.sharpen.sigma = -1.0;
    assert!(matches!(
        CutoutEngine::new(passthrough, opts),
        Err(Error::InvalidOptions(_))
    ));
}

#[test]
fn directories_with_image_extensions_are_skipped() {
    let input = tempfile::tempdir().unwrap();
    fs::create_dir(input.path().join("album.png")).unwrap();
    write_photo(&input.path().join("real.png"), 3, 3);

    let (inputs, logs) = capture_warnings(|| transparent_cutout::collect_inputs(input.path()));
    let inputs: Vec<PathBuf> = inputs.unwrap();
    assert_eq!(inputs, vec![input.path().join("real.png")]);

    let lines = logs.lines();
    assert_eq!(lines.len(), 1, "{lines:#?}");
    assert!(lines[0].contains("album.png"));
}
