//! Full-featured backend running the complete preprocessing core

use crate::cancel::CancellationToken;
use crate::command::{ChannelsCorrection, Command, CommandKind};
use crate::error::{ProcessingError, Result};
use crate::params::ParameterBag;
use crate::preprocessing::channels;
use crate::preprocessing::steps::{
    borders::remove_borders, clahe::apply_clahe, crop::smart_crop, denoise::despeckle,
    deskew::deskew, dots::remove_dots, levels::levels_and_gamma_8u_with, lines::remove_lines,
    punch_holes::remove_punch_holes, retinex::homomorphic_retinex, threshold::binarize,
};
use crate::processor::{
    encode, prepare_command, DocumentProcessor, Observer, ProcessorState, SaveFormat,
};
use image::DynamicImage;
use std::borrow::Cow;
use tracing::{info, instrument};

const COMMANDS: &[CommandKind] = &CommandKind::ALL;

#[derive(Default)]
pub struct VisionProcessor {
    state: ProcessorState,
}

impl VisionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, kind: CommandKind, parameters: &ParameterBag) -> Result<DynamicImage> {
        let image = self.state.require_image()?;
        let command = prepare_command(COMMANDS, self.name(), kind, parameters)?;
        info!(
            command = %kind,
            width = image.width(),
            height = image.height(),
            "Applying command"
        );
        execute(&command, image, &self.state.cancel_token())
    }
}

fn execute(
    command: &Command,
    image: &DynamicImage,
    cancel: &CancellationToken,
) -> Result<DynamicImage> {
    match command {
        Command::Deskew => deskew(image),
        Command::Binarize(params) => binarize(image, params),
        Command::BordersRemove(options) => remove_borders(image, options),
        Command::Despeckle { radius } => despeckle(image, *radius),
        Command::SmartCrop { margin } => smart_crop(image, *margin),
        Command::LinesRemove(options) => remove_lines(image, options),
        Command::DotsRemove { max_size } => remove_dots(image, *max_size),
        Command::PunchHolesRemove { specs, options } => {
            remove_punch_holes(cancel, Some(image), specs, options)?
                .map(Cow::into_owned)
                .ok_or_else(|| ProcessingError::InvalidArgument("no image loaded".to_string()))
        }
        Command::ChannelsCorrection(ChannelsCorrection::Clahe) => apply_clahe(cancel, image),
        Command::ChannelsCorrection(ChannelsCorrection::Retinex(options)) => {
            homomorphic_retinex(cancel, image, options)
        }
        Command::ChannelsCorrection(ChannelsCorrection::Levels {
            black_pct,
            white_pct,
            gamma,
        }) => {
            // Levels work on a single channel; color pages are reduced first
            let gray = DynamicImage::ImageLuma8(channels::to_gray(image)?);
            levels_and_gamma_8u_with(&gray, cancel, *black_pct, *white_pct, *gamma)
        }
    }
}

impl DocumentProcessor for VisionProcessor {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn description(&self) -> &'static str {
        "Full preprocessing core: CLAHE/retinex/levels, Sauvola, blob deskew, punch-hole inpainting"
    }

    fn supported_commands(&self) -> &'static [CommandKind] {
        COMMANDS
    }

    #[instrument(skip(self, bytes), fields(backend = "vision", len = bytes.len()))]
    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        self.state.load(bytes)
    }

    fn load_image(&mut self, image: DynamicImage) -> Result<()> {
        self.state.publish(image)
    }

    #[instrument(skip(self, parameters), fields(backend = "vision"))]
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
