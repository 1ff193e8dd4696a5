//! End-to-end integration tests for edgequake-imgbatch.
//!
//! Everything runs offline: images are generated in memory, URL sources
//! are served by a local mockito server, and background removal uses an
//! in-process segmenter.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use edgequake_imgbatch::{
    build_archive, parse_table, process, process_batch, process_stream, process_sync,
    process_to_archive, BatchConfig, BatchProgressCallback, ImageExtension, ItemError,
    NamedItem, Segmenter, TableFormat,
};
use futures::StreamExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zip::ZipArchive;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness (shown with `--nocapture`).
/// `RUST_LOG` overrides the default `warn` filter.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn png_bytes(img: RgbaImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 120, 40])))
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

fn decode(bytes: &[u8]) -> DynamicImage {
    image::load_from_memory(bytes).expect("output should decode")
}

fn archive_names(bytes: Vec<u8>) -> Vec<String> {
    let zip = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    names
}

/// Keeps the left half of every image, clears the right half.
struct LeftHalf;

#[async_trait]
impl Segmenter for LeftHalf {
    async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage, ItemError> {
        let mut out = image.to_rgba8();
        let half = out.width() / 2;
        for (x, _, p) in out.enumerate_pixels_mut() {
            if x >= half {
                p[3] = 0;
            }
        }
        Ok(out)
    }
}

/// Fails on everything.
struct Broken;

#[async_trait]
impl Segmenter for Broken {
    async fn segment(&self, _image: &DynamicImage) -> Result<RgbaImage, ItemError> {
        Err(ItemError::SegmentationFailed {
            detail: "model unavailable".into(),
        })
    }
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
    finished_with: AtomicUsize,
}

impl BatchProgressCallback for Counting {
    fn on_item_start(&self, _index: usize, _total: usize, _name: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_complete(&self, _index: usize, _total: usize, _name: &str, _bytes: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_skipped(&self, _index: usize, _total: usize, _name: &str, _error: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _total: usize, success_count: usize) {
        self.finished_with.store(success_count, Ordering::SeqCst);
    }
}

// ── Resize-only flow ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_upload_resized_and_archived() {
    init_tracing();
    let items = vec![NamedItem::blob("cat", jpeg_bytes(320, 200))];
    let out = process(items, &BatchConfig::default()).await.unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].file_name(), "cat.jpeg");
    let img = decode(&out[0].image.bytes);
    assert_eq!((img.width(), img.height()), (1024, 1024));
    assert_eq!(
        image::guess_format(&out[0].image.bytes).unwrap(),
        ImageFormat::Jpeg
    );

    let archive = build_archive(&out).unwrap();
    assert_eq!(archive_names(archive), vec!["cat.jpeg"]);
}

#[tokio::test]
async fn test_all_undecodable_gives_empty_archive() {
    init_tracing();
    let items = vec![NamedItem::blob("junk", b"definitely not an image".to_vec())];
    let out = process(items, &BatchConfig::default()).await.unwrap();
    assert!(out.is_empty());
    assert!(archive_names(build_archive(&out).unwrap()).is_empty());
}

#[tokio::test]
async fn test_failures_are_dropped_and_order_kept() {
    init_tracing();
    let items = vec![
        NamedItem::blob("a", jpeg_bytes(10, 10)),
        NamedItem::blob("b", b"broken".to_vec()),
        NamedItem::blob("c", png_bytes(RgbaImage::from_pixel(7, 3, Rgba([1, 2, 3, 255])))),
        NamedItem::blob("d", Vec::new()),
        NamedItem::blob("e", jpeg_bytes(2000, 50)),
    ];
    let config = BatchConfig::builder().concurrency(4).build().unwrap();
    let out = process_batch(items, &config).await.unwrap();

    let names: Vec<&str> = out.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c", "e"]);
    assert_eq!(out.stats.total_items, 5);
    assert_eq!(out.stats.processed_items, 3);
    assert_eq!(out.stats.skipped_items, 2);
    assert!(out
        .items
        .iter()
        .all(|i| i.image.extension == ImageExtension::Jpeg));
}

#[tokio::test]
async fn test_progress_callbacks_fire_once_per_item() {
    init_tracing();
    let cb = Arc::new(Counting::default());
    let config = BatchConfig::builder()
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let items = vec![
        NamedItem::blob("ok", jpeg_bytes(4, 4)),
        NamedItem::blob("bad", b"x".to_vec()),
    ];
    process_batch(items, &config).await.unwrap();

    assert_eq!(cb.started.load(Ordering::SeqCst), 2);
    assert_eq!(cb.completed.load(Ordering::SeqCst), 1);
    assert_eq!(cb.skipped.load(Ordering::SeqCst), 1);
    assert_eq!(cb.finished_with.load(Ordering::SeqCst), 1);
}

// ── Background removal & compositing ─────────────────────────────────────────

#[tokio::test]
async fn test_remove_background_yields_png_cutout() {
    init_tracing();
    let config = BatchConfig::builder()
        .remove_background(true)
        .segmenter(Arc::new(LeftHalf))
        .build()
        .unwrap();
    let src = png_bytes(RgbaImage::from_pixel(40, 20, Rgba([10, 200, 30, 255])));
    let out = process(vec![NamedItem::blob("shoe", src)], &config)
        .await
        .unwrap();

    assert_eq!(out[0].file_name(), "shoe.png");
    let img = decode(&out[0].image.bytes).to_rgba8();
    // cut-out keeps the source size
    assert_eq!(img.dimensions(), (40, 20));
    assert_eq!(img.get_pixel(5, 5)[3], 255);
    assert_eq!(img.get_pixel(35, 5)[3], 0);
}

#[tokio::test]
async fn test_segmentation_failure_skips_item() {
    init_tracing();
    let config = BatchConfig::builder()
        .remove_background(true)
        .segmenter(Arc::new(Broken))
        .build()
        .unwrap();
    let out = process_batch(vec![NamedItem::blob("x", jpeg_bytes(8, 8))], &config)
        .await
        .unwrap();
    assert!(out.items.is_empty());
    assert!(matches!(
        out.skipped[0].error,
        ItemError::SegmentationFailed { .. }
    ));
}

#[tokio::test]
async fn test_composite_centres_resized_foreground() {
    init_tracing();
    let background = png_bytes(RgbaImage::from_pixel(50, 80, Rgba([0, 0, 255, 255])));
    let foreground = png_bytes(RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255])));

    let config = BatchConfig::builder()
        .background_image(background)
        .resize_foreground(true)
        .build()
        .unwrap();
    let out = process(vec![NamedItem::blob("p", foreground)], &config)
        .await
        .unwrap();

    assert_eq!(out[0].file_name(), "p.png");
    let img = decode(&out[0].image.bytes).to_rgba8();
    assert_eq!(img.dimensions(), (1024, 1024));

    // The resize stage stretches 100x100 to a 1024x1024 JPEG first; that is
    // then scaled to 632x632 and centred at (196, 196).
    let is_red = |p: &Rgba<u8>| p[0] > 200 && p[1] < 60 && p[2] < 60;
    assert_eq!(img.get_pixel(10, 10), &Rgba([0, 0, 255, 255]));
    assert!(is_red(img.get_pixel(512, 512)));
    assert!(is_red(img.get_pixel(200, 200)));
    assert!(is_red(img.get_pixel(823, 823)));
    assert_eq!(img.get_pixel(190, 512), &Rgba([0, 0, 255, 255]));
    assert_eq!(img.get_pixel(834, 512), &Rgba([0, 0, 255, 255]));
}

#[tokio::test]
async fn test_cutout_on_background_shows_background_through_holes() {
    init_tracing();
    let background = png_bytes(RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255])));
    let config = BatchConfig::builder()
        .remove_background(true)
        .segmenter(Arc::new(LeftHalf))
        .background_image(background)
        .build()
        .unwrap();
    let src = png_bytes(RgbaImage::from_pixel(1024, 1024, Rgba([255, 255, 255, 255])));
    let out = process(vec![NamedItem::blob("mug", src)], &config)
        .await
        .unwrap();

    let img = decode(&out[0].image.bytes).to_rgba8();
    assert_eq!(img.get_pixel(100, 500), &Rgba([255, 255, 255, 255]));
    assert_eq!(img.get_pixel(900, 500), &Rgba([0, 255, 0, 255]));
}

// ── URL sources ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_url_sources_with_one_broken_link() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("GET", "/cat.jpg")
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body(jpeg_bytes(64, 48))
        .create_async()
        .await;
    let _gone = server
        .mock("GET", "/gone.jpg")
        .with_status(404)
        .create_async()
        .await;

    let items = vec![
        NamedItem::url("cat", format!("{}/cat.jpg", server.url())),
        NamedItem::url("gone", format!("{}/gone.jpg", server.url())),
    ];
    let out = process_batch(items, &BatchConfig::default()).await.unwrap();

    assert_eq!(out.items.len(), 1);
    assert_eq!(out.items[0].file_name(), "cat.jpeg");
    assert_eq!(out.skipped[0].name, "gone");
    assert!(matches!(
        out.skipped[0].error,
        ItemError::FetchFailure { .. }
    ));
}

#[tokio::test]
async fn test_csv_table_drives_batch() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let _a = server
        .mock("GET", "/a.png")
        .with_status(200)
        .with_body(png_bytes(RgbaImage::from_pixel(3, 3, Rgba([9, 9, 9, 255]))))
        .create_async()
        .await;

    let csv = format!(
        "name,links\nfirst,{url}/a.png\nskipped,\nsecond,{url}/a.png\n",
        url = server.url()
    );
    let items = parse_table(csv.as_bytes(), TableFormat::Csv).unwrap();
    assert_eq!(items.len(), 2);

    let out = process(items, &BatchConfig::default()).await.unwrap();
    let names: Vec<String> = out.iter().map(|i| i.file_name()).collect();
    assert_eq!(names, vec!["first.jpeg", "second.jpeg"]);
}

// ── Other entry points ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_process_to_archive_writes_zip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("all_images.zip");
    let items = vec![
        NamedItem::blob("one", jpeg_bytes(16, 16)),
        NamedItem::blob("two", jpeg_bytes(16, 16)),
        NamedItem::blob("bad", b"??".to_vec()),
    ];

    let stats = process_to_archive(items, &path, &BatchConfig::default())
        .await
        .unwrap();
    assert_eq!(stats.processed_items, 2);

    let mut zip = ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(zip.len(), 2);
    let mut entry = zip.by_name("two.jpeg").unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    assert_eq!(decode(&bytes).width(), 1024);
}

#[tokio::test]
async fn test_stream_matches_eager_results() {
    init_tracing();
    let items = vec![
        NamedItem::blob("a", jpeg_bytes(5, 5)),
        NamedItem::blob("b", b"nope".to_vec()),
    ];
    let config = BatchConfig::default();

    let streamed: Vec<_> = process_stream(items.clone(), &config)
        .unwrap()
        .collect()
        .await;
    let eager = process_batch(items, &config).await.unwrap();

    assert_eq!(streamed.len(), 2);
    assert_eq!(streamed[0].as_ref().unwrap(), &eager.items[0]);
    assert_eq!(streamed[1].as_ref().unwrap_err(), &eager.skipped[0]);
}

#[test]
fn test_process_sync_outside_runtime() {
    init_tracing();
    let out = process_sync(
        vec![NamedItem::blob("sync", jpeg_bytes(12, 12))],
        &BatchConfig::default(),
    )
    .unwrap();
    assert_eq!(out.items[0].file_name(), "sync.jpeg");
}
