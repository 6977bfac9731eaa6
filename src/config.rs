use crate::Args;
use std::path::PathBuf;

/// Run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub commands: Vec<String>,
    pub assignments: Vec<String>,
    pub params_file: Option<PathBuf>,
    pub backend: String,
    pub format: Option<String>,
    pub compression: u8,
    pub report: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            input: args.input,
            output: args.output,
            commands: args.command,
            assignments: args.param,
            params_file: args.params,
            backend: args.backend,
            format: args.format,
            compression: args.compression.min(100),
            report: args.report,
        }
    }
}
