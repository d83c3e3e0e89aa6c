//! CLI surface and the async entrypoint shared by `main` and tests.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{debug, error};

use crate::config::UploadTarget;
use crate::upload::{self, HttpEndpoint, SingleOutcome};
use crate::{clip, source};

/// Upload a file to file.io and print the download link. Supports stdin.
#[derive(Parser, Debug)]
#[clap(
    name = "fileio",
    version,
    about = "Upload a file to file.io and print the download link. Supports stdin."
)]
pub struct Cli {
    /// set the expiration time for the uploaded file
    #[clap(short = 'e', long, value_name = "E")]
    pub expires: Option<String>,

    /// specify or override the filename
    #[clap(short = 'n', long)]
    pub name: Option<String>,

    /// hide the progress bar
    #[clap(short, long)]
    pub quiet: bool,

    /// copy the URL to your clipboard
    #[clap(short, long)]
    pub clip: bool,

    /// create a TAR archive from the specified file or directory
    #[clap(short = 't', long, value_name = "PATH", conflicts_with = "file")]
    pub tar: Option<PathBuf>,

    /// filter the TAR archive through gzip (only with -t, --tar)
    #[clap(short = 'z', long, requires = "tar")]
    pub gzip: bool,

    /// print the server response
    #[clap(short, long)]
    pub verbose: bool,

    /// upload the file N times
    #[clap(short = 'N', long, default_value_t = 1)]
    pub upload_times: usize,

    /// the file to upload
    pub file: Option<PathBuf>,
}

/// How an invocation ended, mapped to an exit code in `main`.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Nothing to upload and stdin is a terminal: usage was printed.
    NoInput,
    /// The user interrupted a single-attempt upload.
    Aborted,
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("failed to resolve path {}", path.display()))
}

fn default_filename(file: Option<&Path>, tar: Option<&Path>, gzip: bool) -> String {
    let basename = |path: &Path| {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
    };
    if let Some(path) = file {
        return basename(path).unwrap_or_else(|| "file".to_string());
    }
    if let Some(path) = tar {
        let stem = basename(path).unwrap_or_else(|| "archive".to_string());
        let ext = if gzip { ".tgz" } else { ".tar" };
        return format!("{stem}{ext}");
    }
    "file".to_string()
}

/// Async CLI logic entrypoint, extracted for integration tests and `main`.
pub async fn run(cli: Cli) -> Result<Outcome> {
    debug!(?cli, "parsed arguments");

    if cli.file.is_none() && cli.tar.is_none() && std::io::stdin().is_terminal() {
        // Nothing to read and nobody piping: print usage, not an error.
        println!("{}", Cli::command().render_usage());
        return Ok(Outcome::NoInput);
    }

    let file = cli.file.as_deref().map(absolute).transpose()?;
    let tar = cli.tar.as_deref().map(absolute).transpose()?;

    let filename = cli
        .name
        .clone()
        .unwrap_or_else(|| default_filename(file.as_deref(), tar.as_deref(), cli.gzip));

    let target = UploadTarget::from_env(cli.expires.clone());
    let endpoint = HttpEndpoint::new(target)?;

    // The byte source is resolved exactly once, however many attempts run.
    let source = source::resolve(file.as_deref(), tar.as_deref(), cli.gzip).await?;

    if cli.upload_times > 1 {
        let responses =
            upload::multi_upload(&endpoint, source, &filename, cli.upload_times).await?;
        let links = responses
            .iter()
            .map(|r| r.link.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if cli.verbose {
            let raws: Vec<&serde_json::Value> = responses.iter().map(|r| &r.raw).collect();
            println!("{}", serde_json::to_string_pretty(&raws)?);
        } else {
            println!("{links}");
        }
        if cli.clip {
            if let Err(e) = clip::copy(&links) {
                error!(error = %e, "failed to copy links to clipboard");
            }
        }
        return Ok(Outcome::Success);
    }

    match upload::single_upload(&endpoint, source, &filename, cli.quiet).await? {
        SingleOutcome::Aborted => Ok(Outcome::Aborted),
        SingleOutcome::Completed(response) => {
            if cli.verbose {
                eprintln!("{}", serde_json::to_string_pretty(&response.raw)?);
            }
            if cli.clip {
                match clip::copy(&response.link) {
                    Ok(()) => println!("{} (copied to clipboard)", response.link),
                    Err(e) => {
                        error!(error = %e, "failed to copy link to clipboard");
                        println!("{}", response.link);
                    }
                }
            } else {
                println!("{}", response.link);
            }
            Ok(Outcome::Success)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn verify_cli_surface() {
        Cli::command().debug_assert();
    }

    #[test]
    fn file_and_tar_conflict_is_a_usage_error() {
        let err = Cli::try_parse_from(["fileio", "-t", "/tmp/dir", "/tmp/file"])
            .expect_err("conflicting options must be rejected");
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn gzip_requires_tar() {
        let err = Cli::try_parse_from(["fileio", "-z", "/tmp/file"])
            .expect_err("gzip without tar must be rejected");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn upload_times_defaults_to_one() {
        let cli = Cli::try_parse_from(["fileio", "/tmp/file"]).expect("valid invocation");
        assert_eq!(cli.upload_times, 1);
        assert!(!cli.quiet);
    }

    #[test]
    fn filename_defaults_follow_the_input_kind() {
        assert_eq!(
            default_filename(Some(Path::new("/a/b/report.pdf")), None, false),
            "report.pdf"
        );
        assert_eq!(
            default_filename(None, Some(Path::new("/a/b/photos")), false),
            "photos.tar"
        );
        assert_eq!(
            default_filename(None, Some(Path::new("/a/b/photos")), true),
            "photos.tgz"
        );
        assert_eq!(default_filename(None, None, false), "file");
    }
}
