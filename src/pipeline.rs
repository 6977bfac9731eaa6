use crate::command::CommandKind;
use crate::error::Result;
use crate::params::ParameterBag;
use crate::processor::DocumentProcessor;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// One command with its parameters
#[derive(Debug, Clone)]
pub struct PipelineStep {
    pub kind: CommandKind,
    pub parameters: ParameterBag,
}

/// Timing information for a single step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of a pipeline run including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Backend that ran the steps
    pub backend: String,
    /// Total processing time in milliseconds
    pub total_time_ms: u64,
    /// Dimensions of the final image
    pub width: u32,
    pub height: u32,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

/// Ordered commands applied to a processor's current image
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: CommandKind, parameters: ParameterBag) -> &mut Self {
        self.steps.push(PipelineStep { kind, parameters });
        self
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Apply every step in order, stopping at the first failure
    pub fn run(&self, processor: &mut dyn DocumentProcessor) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut timings = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let step_start = Instant::now();
            processor.apply_command(step.kind, &step.parameters)?;
            timings.push(StepTiming {
                name: step.kind.to_string(),
                time_ms: step_start.elapsed().as_millis() as u64,
            });
        }

        let (width, height) = processor
            .current_image()
            .map(|image| (image.width(), image.height()))
            .unwrap_or_default();
        let report = PipelineReport {
            backend: processor.name().to_string(),
            total_time_ms: start.elapsed().as_millis() as u64,
            width,
            height,
            steps: timings,
        };
        info!(
            backend = %report.backend,
            steps = report.steps.len(),
            total_ms = report.total_time_ms,
            "Pipeline finished"
        );
        Ok(report)
    }
}
