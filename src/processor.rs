use crate::cancel::CancellationToken;
use crate::command::{Command, CommandKind};
use crate::error::{ProcessingError, Result};
use crate::params::ParameterBag;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::{debug, warn};

/// Notification published after every mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    /// The current image changed; PNG-encoded
    ImageUpdated(Vec<u8>),
    ErrorOccurred(String),
}

pub type Observer = Box<dyn Fn(&ProcessorEvent) + Send>;

/// Output container for [`DocumentProcessor::stream_for_saving`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Tiff,
    Bmp,
}

impl SaveFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
        }
    }
}

/// Capability surface shared by every processing backend.
///
/// A processor owns a current image. Each mutating call (`load`,
/// `load_image`, `apply_command`) publishes exactly one event to the
/// subscribed observers: `ImageUpdated` on success, `ErrorOccurred` on
/// failure.
pub trait DocumentProcessor: Send {
    /// Returns the backend identifier (e.g., "vision", "classic")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the backend
    fn description(&self) -> &'static str;

    /// Commands this backend can execute
    fn supported_commands(&self) -> &'static [CommandKind];

    /// Decode `bytes` and make the result the current image
    fn load(&mut self, bytes: &[u8]) -> Result<()>;

    /// Replace the current image
    fn load_image(&mut self, image: DynamicImage) -> Result<()>;

    /// Run `kind` with `parameters` against the current image
    fn apply_command(&mut self, kind: CommandKind, parameters: &ParameterBag) -> Result<()>;

    /// Encode the current image for saving
    fn stream_for_saving(&self, format: SaveFormat, compression: u8) -> Result<Vec<u8>>;

    fn current_image(&self) -> Option<&DynamicImage>;

    fn subscribe(&mut self, observer: Observer);

    /// Token observed by long-running commands of this processor
    fn cancellation_token(&self) -> CancellationToken;

    /// Install a fresh token for later commands; the old one stays cancelled.
    fn renew_cancellation(&mut self) -> CancellationToken;
}

/// Current image, observers and cancellation shared by the backends
#[derive(Default)]
pub struct ProcessorState {
    image: Option<DynamicImage>,
    observers: Vec<Observer>,
    cancel: CancellationToken,
}

impl ProcessorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        self.image.as_ref()
    }

    /// The current image, or `InvalidArgument` when nothing is loaded
    pub fn require_image(&self) -> Result<&DynamicImage> {
        self.image
            .as_ref()
            .ok_or_else(|| ProcessingError::InvalidArgument("no image loaded".to_string()))
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn renew_cancellation(&mut self) -> CancellationToken {
        self.cancel = CancellationToken::new();
        self.cancel.clone()
    }

    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    /// Decode and publish `bytes`; failures are published as well as returned.
    pub fn load(&mut self, bytes: &[u8]) -> Result<()> {
        match image::load_from_memory(bytes) {
            Ok(image) => self.publish(image),
            Err(e) => Err(self.fail(ProcessingError::Decoding(e.to_string()))),
        }
    }

    /// Settle a command outcome: publish the new image or the error.
    pub fn settle(&mut self, outcome: Result<DynamicImage>) -> Result<()> {
        match outcome {
            Ok(image) => self.publish(image),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Make `image` current and notify observers with its PNG encoding.
    pub fn publish(&mut self, image: DynamicImage) -> Result<()> {
        let png = match encode(&image, SaveFormat::Png, 50) {
            Ok(png) => png,
            Err(e) => return Err(self.fail(e)),
        };
        debug!(
            width = image.width(),
            height = image.height(),
            bytes = png.len(),
            "Image updated"
        );
        self.image = Some(image);
        self.notify(&ProcessorEvent::ImageUpdated(png));
        Ok(())
    }

    /// Notify observers of `error` and hand it back for propagation.
    pub fn fail(&mut self, error: ProcessingError) -> ProcessingError {
        if error.is_cancelled() {
            debug!("Command cancelled");
        } else {
            warn!(code = error.code(), %error, "Command failed");
        }
        self.notify(&ProcessorEvent::ErrorOccurred(error.to_string()));
        error
    }

    fn notify(&self, event: &ProcessorEvent) {
        for observer in &self.observers {
            observer(event);
        }
    }
}

/// Build the typed command and fail early when the backend lacks it
pub fn prepare_command(
    supported: &[CommandKind],
    backend: &str,
    kind: CommandKind,
    parameters: &ParameterBag,
) -> Result<Command> {
    if !supported.contains(&kind) {
        return Err(ProcessingError::Unsupported(format!(
            "{kind} is not available in the {backend} backend"
        )));
    }
    Command::from_parameters(kind, parameters)
}

/// Encode `image` in `format`.
///
/// `compression` runs 0-100: for PNG it picks the fast, default or best
/// deflate level; for JPEG it is the quality. Other formats ignore it.
pub fn encode(image: &DynamicImage, format: SaveFormat, compression: u8) -> Result<Vec<u8>> {
    let compression = compression.min(100);
    let mut buf = Vec::new();
    let result = match format {
        SaveFormat::Png => {
            let level = match compression {
                0..=33 => CompressionType::Fast,
                34..=66 => CompressionType::Default,
                _ => CompressionType::Best,
            };
            let encoder = PngEncoder::new_with_quality(&mut buf, level, FilterType::Adaptive);
            image.write_with_encoder(encoder)
        }
        SaveFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, compression.max(1));
            if image.color().has_alpha() {
                DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
            } else {
                image.write_with_encoder(encoder)
            }
        }
        SaveFormat::Tiff => image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Tiff),
        SaveFormat::Bmp => image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp),
    };
    result.map_err(|e| ProcessingError::Encoding(format!("{}: {e}", format.as_str())))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};

    fn recording_state() -> (ProcessorState, Arc<Mutex<Vec<ProcessorEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut state = ProcessorState::new();
        state.subscribe(Box::new(move |event: &ProcessorEvent| {
            sink.lock().unwrap().push(event.clone())
        }));
        (state, events)
    }

    #[test]
    fn test_save_format_parsing() {
        assert_eq!(SaveFormat::from_str("JPG"), Some(SaveFormat::Jpeg));
        assert_eq!(SaveFormat::from_str("tif"), Some(SaveFormat::Tiff));
        assert_eq!(SaveFormat::from_str("webp"), None);
        assert_eq!(
            SaveFormat::from_path(std::path::Path::new("out/page.bmp")),
            Some(SaveFormat::Bmp)
        );
    }

    #[test]
    fn test_encode_round_trips_every_format() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(7, 5, Rgba([10, 200, 30, 255])));
        for format in [SaveFormat::Png, SaveFormat::Jpeg, SaveFormat::Tiff, SaveFormat::Bmp] {
            let bytes = encode(&img, format, 80).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (7, 5), "{format:?}");
        }
    }

    #[test]
    fn test_png_compression_levels_are_lossless() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(32, 32, |x, y| {
            Luma([(x * 7 + y * 3) as u8])
        }));
        for compression in [0, 50, 100] {
            let bytes = encode(&img, SaveFormat::Png, compression).unwrap();
            assert_eq!(image::load_from_memory(&bytes).unwrap(), img);
        }
    }

    #[test]
    fn test_publish_emits_one_update() {
        let (mut state, events) = recording_state();
        state
            .publish(DynamicImage::ImageLuma8(GrayImage::new(3, 3)))
            .unwrap();
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let ProcessorEvent::ImageUpdated(png) = &events[0] else {
            panic!("expected an update");
        };
        assert_eq!(image::load_from_memory(png).unwrap().width(), 3);
    }

    #[test]
    fn test_failed_load_emits_one_error() {
        let (mut state, events) = recording_state();
        let err = state.load(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ProcessingError::Decoding(_)));
        assert!(state.image().is_none());
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProcessorEvent::ErrorOccurred(_)));
    }

    #[test]
    fn test_require_image_without_load() {
        let state = ProcessorState::new();
        assert!(matches!(
            state.require_image(),
            Err(ProcessingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unsupported_command_is_rejected() {
        let err = prepare_command(
            &[CommandKind::Deskew],
            "test",
            CommandKind::Binarize,
            &ParameterBag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessingError::Unsupported(_)));
    }
}
