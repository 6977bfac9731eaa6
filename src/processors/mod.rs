//! Processing backends
//!
//! Backends are conditionally compiled based on feature flags and created
//! through [`create_processor`].

#[cfg(feature = "backend-vision")]
pub mod vision;

#[cfg(feature = "backend-classic")]
pub mod classic;

use crate::command::CommandKind;
use crate::error::{ProcessingError, Result};
use crate::processor::DocumentProcessor;
use std::fmt;

/// Backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessorKind {
    /// Full pixel-processing core
    #[default]
    Vision,
    /// Lighter backend built on stock imageproc primitives
    Classic,
}

impl ProcessorKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vision" => Some(Self::Vision),
            "classic" => Some(Self::Classic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Classic => "classic",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about an available backend
#[derive(Debug, Clone)]
pub struct ProcessorInfo {
    pub kind: ProcessorKind,
    pub description: &'static str,
    pub commands: &'static [CommandKind],
}

/// Create a fresh processor of `kind`.
///
/// Fails with `Unsupported` when the backend was compiled out.
pub fn create_processor(kind: ProcessorKind) -> Result<Box<dyn DocumentProcessor>> {
    match kind {
        #[cfg(feature = "backend-vision")]
        ProcessorKind::Vision => Ok(Box::new(vision::VisionProcessor::new())),

        #[cfg(feature = "backend-classic")]
        ProcessorKind::Classic => Ok(Box::new(classic::ClassicProcessor::new())),

        #[allow(unreachable_patterns)]
        other => Err(ProcessingError::Unsupported(format!(
            "processor '{other}' is not available. Build with --features backend-{other}"
        ))),
    }
}

/// Backends compiled into this build
pub fn available_processors() -> Vec<ProcessorInfo> {
    [ProcessorKind::Vision, ProcessorKind::Classic]
        .into_iter()
        .filter_map(|kind| create_processor(kind).ok().map(|p| (kind, p)))
        .map(|(kind, processor)| ProcessorInfo {
            kind,
            description: processor.description(),
            commands: processor.supported_commands(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(ProcessorKind::from_str("Vision"), Some(ProcessorKind::Vision));
        assert_eq!(ProcessorKind::from_str("classic"), Some(ProcessorKind::Classic));
        assert_eq!(ProcessorKind::from_str("sdk"), None);
    }

    #[cfg(all(feature = "backend-vision", feature = "backend-classic"))]
    #[test]
    fn test_factory_creates_each_backend() {
        for kind in [ProcessorKind::Vision, ProcessorKind::Classic] {
            let processor = create_processor(kind).unwrap();
            assert_eq!(processor.name(), kind.as_str());
            assert!(processor.current_image().is_none());
        }
        assert_eq!(available_processors().len(), 2);
    }
}
