//! CLI command implementations

pub mod download;
pub mod error;
pub mod sequences;

pub use download::{Cli, Commands, DownloadArgs};
pub use error::CliError;
pub use sequences::SequencesCommand;
