//! Loading a dropped image file as the canvas background.
//!
//! Decoding happens off the UI path. Every load gets a generation number and
//! a cancellation token; a newer drop cancels the older load, and results for
//! anything but the latest generation are thrown away when polled.

use anyhow::{Context as _, bail};
use egui::ColorImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::state::BackgroundImage;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";

pub fn is_accepted_mime(mime: &str) -> bool {
    mime == MIME_JPEG || mime == MIME_PNG
}

/// Uses the MIME type the platform reported, or guesses one from the file
/// extension when it reported none (native drops carry only a path).
pub fn resolve_mime(reported: &str, file_name: &str) -> String {
    if !reported.is_empty() {
        return reported.to_owned();
    }
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" => MIME_PNG.to_owned(),
        "jpg" | "jpeg" => MIME_JPEG.to_owned(),
        _ => String::new(),
    }
}

#[derive(Clone, Debug)]
pub enum FileSource {
    /// Contents delivered with the drop (web).
    Bytes(Arc<[u8]>),
    /// Only a path on disk (native).
    Path(PathBuf),
}

impl FileSource {
    fn read(&self) -> anyhow::Result<Arc<[u8]>> {
        match self {
            Self::Bytes(bytes) => Ok(Arc::clone(bytes)),
            Self::Path(path) => std::fs::read(path)
                .map(Arc::from)
                .with_context(|| format!("failed to read {}", path.display())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DroppedImage {
    pub name: String,
    pub mime: String,
    pub source: FileSource,
}

impl DroppedImage {
    /// Returns `None` if the drop carried neither bytes nor a path.
    pub fn from_dropped_file(file: &egui::DroppedFile) -> Option<Self> {
        let name = if file.name.is_empty() {
            file.path
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            file.name.clone()
        };

        let source = match (&file.bytes, &file.path) {
            (Some(bytes), _) => FileSource::Bytes(Arc::clone(bytes)),
            (None, Some(path)) => FileSource::Path(path.clone()),
            (None, None) => return None,
        };

        Some(Self {
            mime: resolve_mime(&file.mime, &name),
            name,
            source,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct PendingLoad {
    generation: u64,
    cancel: CancelToken,
}

struct Decoded {
    generation: u64,
    file_name: String,
    image: anyhow::Result<ColorImage>,
}

pub struct BackgroundLoader {
    next_generation: u64,
    pending: Option<PendingLoad>,
    tx: Sender<Decoded>,
    rx: Receiver<Decoded>,
    repaint: Option<egui::Context>,
}

impl Default for BackgroundLoader {
    fn default() -> Self {
        let (tx, rx) = channel();
        Self {
            next_generation: 0,
            pending: None,
            tx,
            rx,
            repaint: None,
        }
    }
}

impl BackgroundLoader {
    /// A loader that wakes `ctx` up once a decode finishes.
    pub fn new(ctx: &egui::Context) -> Self {
        let mut loader = Self::default();
        loader.repaint = Some(ctx.clone());
        loader
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts decoding `file`, superseding any load still in flight.
    ///
    /// # Errors
    /// Fails without touching the current load when the file is not a JPEG
    /// or PNG image.
    pub fn load(&mut self, file: DroppedImage) -> anyhow::Result<u64> {
        if !is_accepted_mime(&file.mime) {
            let shown = if file.mime.is_empty() {
                "unknown"
            } else {
                file.mime.as_str()
            };
            bail!("Only JPEG or PNG images can be used ({} is {shown}).", file.name);
        }

        self.cancel();
        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancelToken::default();
        self.pending = Some(PendingLoad {
            generation,
            cancel: cancel.clone(),
        });

        log::info!("decoding {} ({}) as generation {generation}", file.name, file.mime);
        spawn_decode(
            generation,
            file,
            cancel,
            self.tx.clone(),
            self.repaint.clone(),
        );
        Ok(generation)
    }

    /// Cancels the load in flight, if any. Its result will be ignored.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            log::debug!("cancelling background generation {}", pending.generation);
            pending.cancel.cancel();
        }
    }

    /// Collects finished decodes; returns the image to install, if the
    /// latest load has completed successfully.
    pub fn poll(&mut self) -> Option<BackgroundImage> {
        let mut installed = None;
        while let Ok(decoded) = self.rx.try_recv() {
            if let Some(image) = self.accept(decoded) {
                installed = Some(image);
            }
        }
        installed
    }

    /// Blocks until the current load resolves or `timeout` passes.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn wait(&mut self, timeout: std::time::Duration) -> Option<BackgroundImage> {
        let deadline = std::time::Instant::now() + timeout;
        while self.pending.is_some() {
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            let decoded = self.rx.recv_timeout(remaining).ok()?;
            if let Some(image) = self.accept(decoded) {
                return Some(image);
            }
        }
        None
    }

    fn accept(&mut self, decoded: Decoded) -> Option<BackgroundImage> {
        let current = self.pending.as_ref().map(|p| p.generation);
        if current != Some(decoded.generation) {
            log::debug!(
                "discarding stale background generation {}",
                decoded.generation
            );
            return None;
        }
        self.pending = None;

        match decoded.image {
            Ok(image) => {
                log::debug!(
                    "background generation {} ready: {}x{}",
                    decoded.generation,
                    image.size[0],
                    image.size[1]
                );
                Some(BackgroundImage {
                    generation: decoded.generation,
                    file_name: decoded.file_name,
                    image: Arc::new(image),
                })
            }
            Err(err) => {
                log::warn!("could not load background {}: {err:#}", decoded.file_name);
                None
            }
        }
    }
}

impl Drop for BackgroundLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn read_and_decode(source: &FileSource) -> anyhow::Result<ColorImage> {
    let bytes = source.read()?;
    let img = image::load_from_memory(&bytes)
        .context("failed to decode image")?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(ColorImage::from_rgba_unmultiplied(
        [width as usize, height as usize],
        &img,
    ))
}

fn run_decode(
    generation: u64,
    file: DroppedImage,
    cancel: &CancelToken,
    tx: &Sender<Decoded>,
    repaint: Option<&egui::Context>,
) {
    if cancel.is_cancelled() {
        return;
    }
    let image = read_and_decode(&file.source);
    if cancel.is_cancelled() {
        log::debug!("background generation {generation} cancelled during decode");
        return;
    }
    // The receiver is gone once the loader has been dropped.
    if tx
        .send(Decoded {
            generation,
            file_name: file.name,
            image,
        })
        .is_ok()
    {
        if let Some(ctx) = repaint {
            ctx.request_repaint();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_decode(
    generation: u64,
    file: DroppedImage,
    cancel: CancelToken,
    tx: Sender<Decoded>,
    repaint: Option<egui::Context>,
) {
    let spawned = std::thread::Builder::new()
        .name(format!("background-decode-{generation}"))
        .spawn(move || run_decode(generation, file, &cancel, &tx, repaint.as_ref()));
    if let Err(err) = spawned {
        log::error!("failed to start background decode: {err}");
    }
}

#[cfg(target_arch = "wasm32")]
fn spawn_decode(
    generation: u64,
    file: DroppedImage,
    cancel: CancelToken,
    tx: Sender<Decoded>,
    repaint: Option<egui::Context>,
) {
    wasm_bindgen_futures::spawn_local(async move {
        run_decode(generation, file, &cancel, &tx, repaint.as_ref());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn encoded(format: image::ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn dropped(name: &str, mime: &str, bytes: Vec<u8>) -> DroppedImage {
        DroppedImage {
            name: name.to_owned(),
            mime: mime.to_owned(),
            source: FileSource::Bytes(bytes.into()),
        }
    }

    #[test]
    fn mime_falls_back_to_extension() {
        assert_eq!(resolve_mime("", "Photo.JPG"), MIME_JPEG);
        assert_eq!(resolve_mime("", "scan.jpeg"), MIME_JPEG);
        assert_eq!(resolve_mime("", "sketch.png"), MIME_PNG);
        assert_eq!(resolve_mime("", "anim.gif"), "");
        assert_eq!(resolve_mime("image/gif", "renamed.png"), "image/gif");
    }

    #[test]
    fn gif_is_rejected_without_starting_a_load() {
        let mut loader = BackgroundLoader::default();
        let err = loader
            .load(dropped("anim.gif", "image/gif", vec![0; 8]))
            .unwrap_err();

        assert!(err.to_string().contains("image/gif"));
        assert!(!loader.is_loading());
        assert!(loader.poll().is_none());
    }

    #[test]
    fn png_decodes_into_background() {
        let mut loader = BackgroundLoader::default();
        let bytes = encoded(image::ImageFormat::Png, 3, 2);
        let generation = loader.load(dropped("a.png", MIME_PNG, bytes)).unwrap();

        let background = loader.wait(TIMEOUT).unwrap();
        assert_eq!(background.generation, generation);
        assert_eq!(background.file_name, "a.png");
        assert_eq!(background.image.size, [3, 2]);
        assert!(!loader.is_loading());
    }

    #[test]
    fn newer_drop_wins_over_older_one() {
        let mut loader = BackgroundLoader::default();
        loader
            .load(dropped("a.png", MIME_PNG, encoded(image::ImageFormat::Png, 2, 2)))
            .unwrap();
        loader
            .load(dropped("b.jpg", MIME_JPEG, encoded(image::ImageFormat::Jpeg, 5, 4)))
            .unwrap();

        let background = loader.wait(TIMEOUT).unwrap();
        assert_eq!(background.file_name, "b.jpg");
        assert_eq!(background.image.size, [5, 4]);

        // give the superseded decode time to finish and make sure it is ignored
        std::thread::sleep(Duration::from_millis(50));
        assert!(loader.poll().is_none());
    }

    #[test]
    fn corrupt_file_never_produces_a_background() {
        let mut loader = BackgroundLoader::default();
        loader
            .load(dropped("broken.png", MIME_PNG, b"not a png".to_vec()))
            .unwrap();

        assert!(loader.wait(TIMEOUT).is_none());
        assert!(!loader.is_loading());
    }

    #[test]
    fn cancelled_load_is_ignored() {
        let mut loader = BackgroundLoader::default();
        loader
            .load(dropped("a.png", MIME_PNG, encoded(image::ImageFormat::Png, 2, 2)))
            .unwrap();
        loader.cancel();

        assert!(!loader.is_loading());
        std::thread::sleep(Duration::from_millis(50));
        assert!(loader.poll().is_none());
    }

    #[test]
    fn native_drop_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("sketchpad-bg-{}.png", std::process::id()));
        std::fs::write(&path, encoded(image::ImageFormat::Png, 4, 4)).unwrap();
        let file = egui::DroppedFile {
            path: Some(path.clone()),
            ..Default::default()
        };

        let image = DroppedImage::from_dropped_file(&file).unwrap();
        assert_eq!(image.mime, MIME_PNG);

        let mut loader = BackgroundLoader::default();
        loader.load(image).unwrap();
        let background = loader.wait(TIMEOUT).unwrap();
        assert_eq!(background.image.size, [4, 4]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn loader_tied_to_a_context_decodes_and_cancels_on_drop() {
        let ctx = egui::Context::default();
        let mut loader = BackgroundLoader::new(&ctx);
        loader
            .load(dropped("a.png", MIME_PNG, encoded(image::ImageFormat::Png, 2, 3)))
            .unwrap();
        let background = loader.wait(TIMEOUT).unwrap();
        assert_eq!(background.image.size, [2, 3]);

        let mut loader = BackgroundLoader::new(&ctx);
        loader
            .load(dropped("b.png", MIME_PNG, encoded(image::ImageFormat::Png, 2, 2)))
            .unwrap();
        drop(loader);
    }

    #[test]
    fn drop_without_payload_is_skipped() {
        let file = egui::DroppedFile {
            name: "ghost.png".to_owned(),
            ..Default::default()
        };
        assert!(DroppedImage::from_dropped_file(&file).is_none());
    }
}
