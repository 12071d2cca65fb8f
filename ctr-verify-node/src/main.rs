//! CTR Verify - command line verifier
//!
//! Reads charge transparency records from disk, verifies every signed
//! measurement and prints the outcome as JSON on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Verify one or more exports (partial records are merged)
//! ctr-verify verify session.json meter.pem
//!
//! # German messages, parsers one after another
//! ctr-verify verify --messages de.json --sequential export.xml
//!
//! # Check a release descriptor against the shipped files
//! ctr-verify verify-release --descriptor release.json app.zip app.zip.sig
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ctr_adapter_vendors::{
    verify_release, CancellationToken, FileBuffer, ReleaseDescriptor, VerificationOutcome,
    Verifier, VerifierConfig,
};
use ctr_core::CatalogLocalizer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Charge transparency record verifier
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify charge transparency records
    Verify {
        /// Input files; archives need a host with archive support
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// JSON message catalog (key -> template)
        #[arg(short, long)]
        messages: Option<PathBuf>,

        /// Run candidate parsers one after another
        #[arg(long)]
        sequential: bool,

        /// Upper bound on archive expansion passes
        #[arg(long, default_value = "8")]
        max_archive_passes: usize,

        /// Skip public key attestation checks
        #[arg(long)]
        no_key_attestation: bool,
    },

    /// Verify a signed release descriptor and its files
    VerifyRelease {
        /// Release descriptor (JSON)
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Released files, matched by file name
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Verify {
            files,
            messages,
            sequential,
            max_archive_passes,
            no_key_attestation,
        } => {
            let mut config = VerifierConfig::new().with_max_archive_passes(max_archive_passes);
            if sequential {
                config = config.sequential();
            }
            if no_key_attestation {
                config = config.without_key_attestation();
            }

            let mut verifier = Verifier::new(config);
            if let Some(path) = messages {
                let catalog = CatalogLocalizer::from_json(&tokio::fs::read_to_string(&path).await?)?;
                info!("Loaded {} message(s) from {}", catalog.len(), path.display());
                verifier = verifier.with_localizer(Arc::new(catalog));
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling verification");
                    on_interrupt.cancel();
                }
            });

            let outcome = verifier.verify_files(read_files(&files).await?, Some(&cancel)).await?;
            if let VerificationOutcome::Record(ctr) = &outcome {
                let valid = ctr
                    .charging_sessions
                    .iter()
                    .filter(|s| s.verification_result.as_ref().is_some_and(|r| r.status.is_valid()))
                    .count();
                info!("{} of {} session(s) valid", valid, ctr.charging_sessions.len());
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::VerifyRelease { descriptor, files } => {
            let descriptor: ReleaseDescriptor =
                serde_json::from_str(&tokio::fs::read_to_string(&descriptor).await?)?;
            let report = verify_release(&descriptor, &read_files(&files).await?)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid() {
                warn!("Release {} failed verification", report.version);
                std::process::exit(1);
            }
            info!("Release {} verified", report.version);
        }
    }

    Ok(())
}

async fn read_files(paths: &[PathBuf]) -> std::io::Result<Vec<FileBuffer>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await?;
        files.push(FileBuffer::new(file_name(path), bytes));
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_basename() {
        assert_eq!(file_name(Path::new("/tmp/exports/session.json")), "session.json");
        assert_eq!(file_name(Path::new("meter.pem")), "meter.pem");
    }

    #[tokio::test]
    async fn test_read_files_keeps_order_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("b.json");
        let second = dir.path().join("a.pem");
        std::fs::write(&first, b"{}").unwrap();
        std::fs::write(&second, b"-----BEGIN PUBLIC KEY-----").unwrap();

        let files = read_files(&[first, second]).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "b.json");
        assert_eq!(files[1].name, "a.pem");
        assert_eq!(files[0].bytes, b"{}".to_vec());
    }

    #[tokio::test]
    async fn test_read_files_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_files(&[dir.path().join("absent.json")]).await.is_err());
    }
}
