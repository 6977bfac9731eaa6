//! Document image preprocessing
//!
//! Binarization, contrast and illumination enhancement, deskew and punch-hole
//! removal for scanned pages, exposed both as plain functions
//! ([`preprocessing::steps`]) and through command-driven processing backends
//! ([`processors`]).

pub mod cancel;
pub mod command;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod preprocessing;
pub mod processor;
pub mod processors;

pub use cancel::CancellationToken;
pub use command::{Command, CommandKind};
pub use error::{ProcessingError, Result};
pub use params::ParameterBag;
pub use pipeline::{Pipeline, PipelineReport, StepTiming};
pub use processor::{DocumentProcessor, ProcessorEvent, SaveFormat};
pub use processors::{create_processor, ProcessorKind};
