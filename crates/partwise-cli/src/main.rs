#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use partwise_loader::{DatasetError, DatasetLoader};
use partwise_model::{parse_parts_manifest, DatasetRequest, ValidationError};
use partwise_split::{scan_and_split, ScanOptions, DEFAULT_MAX_MB};
use partwise_store::{HttpBackend, LocalFsBackend, PartStoreBackend};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum ExitCode {
    Success = 0,
    Validation = 3,
    DependencyFailure = 4,
}

#[derive(Parser)]
#[command(name = "partwise")]
#[command(about = "Split oversized CSV datasets for static hosting and verify they load back")]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory tree and split every CSV over the size limit,
    /// writing a parts manifest next to each split file.
    Split {
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MAX_MB)]
        max_mb: u64,
        #[arg(long, default_value_t = false)]
        remove_original: bool,
    },
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },
    /// Resolve a dataset through the runtime loader (direct file or parts
    /// manifest) and report what came back.
    Fetch {
        #[arg(long)]
        path: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, conflicts_with = "root")]
        base_url: Option<String>,
        #[arg(long)]
        cache_key_suffix: Option<String>,
    },
}

#[derive(Subcommand)]
enum ManifestCommand {
    /// Check that a manifest file declares a usable, non-empty parts list.
    Validate { path: PathBuf },
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Split {
            ref root,
            max_mb,
            remove_original,
        } => run_split(root, max_mb, remove_original, cli.json),
        Commands::Manifest {
            command: ManifestCommand::Validate { ref path },
        } => run_validate(path, cli.json),
        Commands::Fetch {
            ref path,
            ref root,
            ref base_url,
            ref cache_key_suffix,
        } => run_fetch(path, root, base_url.as_deref(), cache_key_suffix.as_deref(), cli.json).await,
    };
    ProcessExitCode::from(code as u8)
}

fn run_split(root: &PathBuf, max_mb: u64, remove_original: bool, as_json: bool) -> ExitCode {
    let options = ScanOptions {
        max_bytes: max_mb * 1024 * 1024,
        remove_original,
    };
    match scan_and_split(root, &options) {
        Ok(report) => {
            if as_json {
                println!(
                    "{}",
                    json!({
                        "root": root.display().to_string(),
                        "split_files": report.split_files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                        "manifests_written": report.manifests_written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                        "nested_parts_normalized": report.nested_parts_normalized,
                        "stale_manifests_removed": report.stale_manifests_removed,
                    })
                );
            } else {
                println!(
                    "split {} file(s), wrote {} manifest(s), normalized {} nested group(s), removed {} stale manifest(s)",
                    report.split_files.len(),
                    report.manifests_written.len(),
                    report.nested_parts_normalized,
                    report.stale_manifests_removed,
                );
            }
            ExitCode::Success
        }
        Err(e) => {
            error!("split scan failed: {e}");
            ExitCode::DependencyFailure
        }
    }
}

fn run_validate(path: &PathBuf, as_json: bool) -> ExitCode {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("cannot read {}: {e}", path.display());
            return ExitCode::DependencyFailure;
        }
    };
    match parse_parts_manifest(&bytes) {
        Ok(manifest) => {
            if as_json {
                println!(
                    "{}",
                    json!({
                        "path": path.display().to_string(),
                        "valid": true,
                        "base": manifest.base,
                        "parts": manifest.parts,
                    })
                );
            } else {
                println!(
                    "{}: valid, {} part(s)",
                    path.display(),
                    manifest.parts.len()
                );
            }
            ExitCode::Success
        }
        Err(ValidationError(reason)) => {
            if as_json {
                println!(
                    "{}",
                    json!({
                        "path": path.display().to_string(),
                        "valid": false,
                        "reason": reason,
                    })
                );
            } else {
                eprintln!("{}: invalid manifest: {reason}", path.display());
            }
            ExitCode::Validation
        }
    }
}

async fn run_fetch(
    path: &str,
    root: &PathBuf,
    base_url: Option<&str>,
    cache_key_suffix: Option<&str>,
    as_json: bool,
) -> ExitCode {
    let store: Arc<dyn PartStoreBackend> = match base_url {
        Some(url) => Arc::new(HttpBackend::new(url.to_string())),
        None => Arc::new(LocalFsBackend::new(root.clone())),
    };
    let loader = DatasetLoader::new(store);

    let mut request = match DatasetRequest::new(path) {
        Ok(request) => request,
        Err(ValidationError(reason)) => {
            error!("invalid dataset path: {reason}");
            return ExitCode::Validation;
        }
    };
    if let Some(suffix) = cache_key_suffix {
        request = request.with_cache_key_suffix(suffix);
    }

    let raw_rows = |_headers: &csv::StringRecord,
                    row: &csv::StringRecord|
     -> Result<Vec<String>, ValidationError> {
        Ok(row.iter().map(str::to_string).collect())
    };
    match loader.load(&request, &raw_rows).await {
        Ok(rows) => {
            if as_json {
                println!(
                    "{}",
                    json!({
                        "path": path,
                        "cache_key": request.cache_key().as_str(),
                        "backend": loader.backend_tag(),
                        "rows": rows.len(),
                    })
                );
            } else {
                println!(
                    "{path}: {} row(s) via {} backend",
                    rows.len(),
                    loader.backend_tag()
                );
            }
            ExitCode::Success
        }
        Err(DatasetError(reason)) => {
            error!("fetch failed: {reason}");
            ExitCode::DependencyFailure
        }
    }
}
