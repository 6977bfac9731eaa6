//! Typed commands built from loosely-typed parameter bags

use crate::error::{ProcessingError, Result};
use crate::params::{
    get_bool_or_default, get_f64_or_default, get_u32_or_default, try_get_f64, try_get_string,
    ParameterBag,
};
use crate::preprocessing::steps::borders::BorderOptions;
use crate::preprocessing::steps::denoise::MAX_DESPECKLE_RADIUS;
use crate::preprocessing::steps::levels::DEFAULT_GAMMA;
use crate::preprocessing::steps::lines::LineOptions;
use crate::preprocessing::steps::punch_holes::{
    PunchHoleOptions, PunchShape, PunchSpec, MAX_TEMPLATE_SIDE,
};
use crate::preprocessing::steps::retinex::{validate_sigma, RetinexOptions, RetinexOutput};
use crate::preprocessing::steps::threshold::{BinarizeMethod, BinarizeParameters};
use serde_json::Value;
use std::fmt;

/// Operations an orchestrator can dispatch against the current image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Deskew,
    Binarize,
    BordersRemove,
    Despeckle,
    SmartCrop,
    LinesRemove,
    DotsRemove,
    PunchHolesRemove,
    ChannelsCorrection,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        CommandKind::Deskew,
        CommandKind::Binarize,
        CommandKind::BordersRemove,
        CommandKind::Despeckle,
        CommandKind::SmartCrop,
        CommandKind::LinesRemove,
        CommandKind::DotsRemove,
        CommandKind::PunchHolesRemove,
        CommandKind::ChannelsCorrection,
    ];

    /// Parse a command name, ignoring case, `-` and `_`.
    pub fn from_str(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == key)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deskew => "Deskew",
            Self::Binarize => "Binarize",
            Self::BordersRemove => "BordersRemove",
            Self::Despeckle => "Despeckle",
            Self::SmartCrop => "SmartCrop",
            Self::LinesRemove => "LinesRemove",
            Self::DotsRemove => "DotsRemove",
            Self::PunchHolesRemove => "PunchHolesRemove",
            Self::ChannelsCorrection => "ChannelsCorrection",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enhancer selected by a channels correction
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelsCorrection {
    Clahe,
    Retinex(RetinexOptions),
    Levels {
        black_pct: f64,
        white_pct: f64,
        gamma: f64,
    },
}

/// A command with its validated configuration
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Deskew,
    Binarize(BinarizeParameters),
    BordersRemove(BorderOptions),
    Despeckle { radius: u32 },
    SmartCrop { margin: u32 },
    LinesRemove(LineOptions),
    DotsRemove { max_size: u32 },
    PunchHolesRemove {
        specs: Vec<PunchSpec>,
        options: PunchHoleOptions,
    },
    ChannelsCorrection(ChannelsCorrection),
}

impl Command {
    /// Build the typed command for `kind`, filling absent parameters with
    /// defaults. Present but meaningless values are rejected.
    pub fn from_parameters(kind: CommandKind, bag: &ParameterBag) -> Result<Command> {
        let command = match kind {
            CommandKind::Deskew => Command::Deskew,
            CommandKind::Binarize => Command::Binarize(binarize_parameters(bag)?),
            CommandKind::BordersRemove => {
                let defaults = BorderOptions::default();
                Command::BordersRemove(BorderOptions {
                    dark_fraction: get_f64_or_default(bag, "dark_fraction", defaults.dark_fraction),
                    max_fraction: get_f64_or_default(bag, "max_fraction", defaults.max_fraction),
                })
            }
            CommandKind::Despeckle => Command::Despeckle {
                radius: bounded_u32(bag, "radius", 1, MAX_DESPECKLE_RADIUS)?,
            },
            CommandKind::SmartCrop => Command::SmartCrop {
                margin: get_u32_or_default(bag, "margin", 10),
            },
            CommandKind::LinesRemove => {
                let defaults = LineOptions::default();
                Command::LinesRemove(LineOptions {
                    min_length: get_u32_or_default(bag, "min_length", defaults.min_length),
                    horizontal: get_bool_or_default(bag, "horizontal", defaults.horizontal),
                    vertical: get_bool_or_default(bag, "vertical", defaults.vertical),
                })
            }
            CommandKind::DotsRemove => Command::DotsRemove {
                max_size: get_u32_or_default(bag, "max_size", 3),
            },
            CommandKind::PunchHolesRemove => Command::PunchHolesRemove {
                specs: punch_specs(bag)?,
                options: punch_options(bag),
            },
            CommandKind::ChannelsCorrection => {
                Command::ChannelsCorrection(channels_correction(bag)?)
            }
        };
        Ok(command)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Deskew => CommandKind::Deskew,
            Command::Binarize(_) => CommandKind::Binarize,
            Command::BordersRemove(_) => CommandKind::BordersRemove,
            Command::Despeckle { .. } => CommandKind::Despeckle,
            Command::SmartCrop { .. } => CommandKind::SmartCrop,
            Command::LinesRemove(_) => CommandKind::LinesRemove,
            Command::DotsRemove { .. } => CommandKind::DotsRemove,
            Command::PunchHolesRemove { .. } => CommandKind::PunchHolesRemove,
            Command::ChannelsCorrection(_) => CommandKind::ChannelsCorrection,
        }
    }
}

fn invalid(key: &str, value: impl fmt::Display) -> ProcessingError {
    ProcessingError::InvalidArgument(format!("unrecognized value '{value}' for '{key}'"))
}

/// `bag[key]` as an integer no larger than `max`; absent or unreadable values
/// fall back to `default`
fn bounded_u32(bag: &ParameterBag, key: &str, default: u32, max: u32) -> Result<u32> {
    match try_get_f64(bag, key) {
        None => Ok(default),
        Some(value) if (0.0..=max as f64).contains(&value) => Ok(value.round() as u32),
        Some(value) => Err(ProcessingError::InvalidArgument(format!(
            "'{key}' must be between 0 and {max}, got {value}"
        ))),
    }
}

fn binarize_parameters(bag: &ParameterBag) -> Result<BinarizeParameters> {
    let defaults = BinarizeParameters::default();
    let method = match try_get_string(bag, "method") {
        Some(name) => BinarizeMethod::from_str(&name).ok_or_else(|| invalid("method", &name))?,
        None => defaults.method,
    };
    Ok(BinarizeParameters {
        method,
        threshold_factor: get_f64_or_default(bag, "threshold_factor", defaults.threshold_factor),
        threshold_percentile: try_get_f64(bag, "threshold_percentile"),
        block_size: get_u32_or_default(bag, "block_size", defaults.block_size),
        adaptive_offset: get_f64_or_default(bag, "adaptive_offset", defaults.adaptive_offset),
        sauvola_window_size: get_u32_or_default(
            bag,
            "sauvola_window_size",
            defaults.sauvola_window_size,
        ),
        k: get_f64_or_default(bag, "k", defaults.k),
    })
}

fn punch_options(bag: &ParameterBag) -> PunchHoleOptions {
    let defaults = PunchHoleOptions::default();
    PunchHoleOptions {
        roundness: get_f64_or_default(bag, "roundness", defaults.roundness),
        fill_ratio: get_f64_or_default(bag, "fill_ratio", defaults.fill_ratio),
        offset_top: get_u32_or_default(bag, "offset_top", defaults.offset_top),
        offset_bottom: get_u32_or_default(bag, "offset_bottom", defaults.offset_bottom),
        offset_left: get_u32_or_default(bag, "offset_left", defaults.offset_left),
        offset_right: get_u32_or_default(bag, "offset_right", defaults.offset_right),
    }
}

/// Specs come either as a `specs` array of objects or as flat keys
/// (`shape`, `diameter`, `width`, ...) describing a single template.
fn punch_specs(bag: &ParameterBag) -> Result<Vec<PunchSpec>> {
    match bag.get("specs") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(spec) => punch_spec(spec),
                other => Err(invalid("specs", other)),
            })
            .collect(),
        Some(Value::Null) | None if bag.contains_key("shape") => Ok(vec![punch_spec(bag)?]),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(invalid("specs", other)),
    }
}

fn punch_spec(bag: &ParameterBag) -> Result<PunchSpec> {
    let shape_name = try_get_string(bag, "shape").unwrap_or_else(|| "circle".to_string());
    let required = |key: &str| match bounded_u32(bag, key, 0, MAX_TEMPLATE_SIDE)? {
        0 => Err(ProcessingError::InvalidArgument(format!(
            "punch hole '{key}' is required"
        ))),
        size => Ok(size),
    };
    let shape = match shape_name.to_lowercase().as_str() {
        "circle" => PunchShape::Circle {
            diameter: required("diameter")?,
        },
        "rect" | "rectangle" => PunchShape::Rect {
            width: required("width")?,
            height: required("height")?,
        },
        _ => return Err(invalid("shape", &shape_name)),
    };
    Ok(PunchSpec {
        shape,
        density: get_f64_or_default(bag, "density", 1.0),
        size_tolerance: get_f64_or_default(bag, "size_tolerance", 0.2),
    })
}

fn channels_correction(bag: &ParameterBag) -> Result<ChannelsCorrection> {
    let mode = try_get_string(bag, "mode").unwrap_or_else(|| "clahe".to_string());
    let correction = match mode.to_lowercase().as_str() {
        "clahe" => ChannelsCorrection::Clahe,
        "retinex" => {
            let defaults = RetinexOptions::default();
            let output_mode = match try_get_string(bag, "output_mode") {
                Some(name) => {
                    RetinexOutput::from_str(&name).ok_or_else(|| invalid("output_mode", &name))?
                }
                None => defaults.output_mode,
            };
            let f32_or =
                |key: &str, default: f32| get_f64_or_default(bag, key, default as f64) as f32;
            let sigma = f32_or("sigma", defaults.sigma);
            validate_sigma(sigma)?;
            ChannelsCorrection::Retinex(RetinexOptions {
                output_mode,
                use_lab_l: get_bool_or_default(bag, "use_lab_l", defaults.use_lab_l),
                robust_normalize: get_bool_or_default(
                    bag,
                    "robust_normalize",
                    defaults.robust_normalize,
                ),
                sigma,
                gamma_low: f32_or("gamma_low", defaults.gamma_low),
                gamma_high: f32_or("gamma_high", defaults.gamma_high),
                low_pct: f32_or("low_pct", defaults.low_pct),
                high_pct: f32_or("high_pct", defaults.high_pct),
            })
        }
        "levels" => ChannelsCorrection::Levels {
            black_pct: get_f64_or_default(bag, "black_pct", 1.0),
            white_pct: get_f64_or_default(bag, "white_pct", 99.0),
            gamma: get_f64_or_default(bag, "gamma", DEFAULT_GAMMA),
        },
        _ => return Err(invalid("mode", &mode)),
    };
    Ok(correction)
}
