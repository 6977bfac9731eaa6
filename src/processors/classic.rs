//! Lightweight backend built on stock imageproc primitives
//!
//! Covers the everyday cleanup commands with simpler algorithms: projection
//! profile deskew, Otsu or box-mean thresholding and median despeckle.

use crate::cancel::CancellationToken;
use crate::command::{Command, CommandKind};
use crate::error::{ProcessingError, Result};
use crate::params::ParameterBag;
use crate::preprocessing::channels;
use crate::preprocessing::steps::denoise::despeckle;
use crate::preprocessing::steps::projection::deskew_projection;
use crate::preprocessing::steps::threshold::{effective_window, BinarizeMethod, BinarizeParameters};
use crate::processor::{
    encode, prepare_command, DocumentProcessor, Observer, ProcessorState, SaveFormat,
};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::box_filter;
use tracing::{debug, info, instrument};

const COMMANDS: &[CommandKind] = &[
    CommandKind::Deskew,
    CommandKind::Binarize,
    CommandKind::Despeckle,
];

#[derive(Default)]
pub struct ClassicProcessor {
    state: ProcessorState,
}

impl ClassicProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, kind: CommandKind, parameters: &ParameterBag) -> Result<DynamicImage> {
        let image = self.state.require_image()?;
        let command = prepare_command(COMMANDS, self.name(), kind, parameters)?;
        self.state.cancel_token().check()?;
        info!(command = %kind, "Applying command");
        match command {
            Command::Deskew => deskew_projection(image),
            Command::Binarize(params) => binarize_classic(image, &params),
            Command::Despeckle { radius } => despeckle(image, radius),
            other => Err(ProcessingError::Unsupported(other.kind().to_string())),
        }
    }
}

/// Otsu for global thresholding, box mean minus offset for adaptive
fn binarize_classic(image: &DynamicImage, params: &BinarizeParameters) -> Result<DynamicImage> {
    channels::ensure_not_empty(image, "binarize")?;
    let gray = channels::to_gray(image)?;

    let out = match params.method {
        BinarizeMethod::Threshold => {
            let level = otsu_level(&gray);
            debug!(level, "Otsu threshold");
            GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
                Luma([if gray.get_pixel(x, y).0[0] > level { 255 } else { 0 }])
            })
        }
        BinarizeMethod::Adaptive => {
            let window = effective_window(params.block_size, gray.width(), gray.height());
            let radius = window / 2;
            let mean = box_filter(&gray, radius, radius);
            GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
                let local = mean.get_pixel(x, y).0[0] as f64 - params.adaptive_offset;
                Luma([if gray.get_pixel(x, y).0[0] as f64 > local { 255 } else { 0 }])
            })
        }
        BinarizeMethod::Sauvola => {
            return Err(ProcessingError::Unsupported(
                "Sauvola binarization is not available in the classic backend".to_string(),
            ))
        }
    };
    Ok(DynamicImage::ImageLuma8(out))
}

impl DocumentProcessor for ClassicProcessor {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn description(&self) -> &'static str {
        "Classic imageproc pipeline: projection deskew, Otsu/mean thresholds, median despeckle"
    }

    fn supported_commands(&self) -> &'static [CommandKind] {
        COMMANDS
    }

    #[instrument(skip(self, bytes), fields(backend = "classic", len = bytes.len()))]
    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        self.state.load(bytes)
    }

    fn load_image(&mut self, image: DynamicImage) -> Result<()> {
        self.state.publish(image)
    }

    #[instrument(skip(self, parameters), fields(backend = "classic"))]
    fn apply_command(&mut self, kind: CommandKind, parameters: &ParameterBag) -> Result<()> {
        let outcome = self.run(kind, parameters);
        self.state.settle(outcome)
    }

    fn stream_for_saving(&self, format: SaveFormat, compression: u8) -> Result<Vec<u8>> {
        encode(self.state.require_image()?, format, compression)
    }

    fn current_image(&self) -> Option<&DynamicImage> {
        self.state.image()
    }

    fn subscribe(&mut self, observer: Observer) {
        self.state.subscribe(observer);
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.state.cancel_token()
    }

    fn renew_cancellation(&mut self) -> CancellationToken {
        self.state.renew_cancellation()
    }
}
