use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::Config;
use crate::domain::catalog::LayerData;
use crate::ingest::IngestRequest;
use crate::storage::schema::tables::ALL_TABLES;
use crate::storage::{blobs, catalog, db, fs};
use crate::worker::{UploadResponse, WorkerPool};

#[derive(Parser)]
#[command(name = "mandarin")]
#[command(version = "0.1")]
#[command(about = "Music upload ingestion and catalog")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "mandarin.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show catalog row counts
    Status,
    /// Upload files, or every music file under the given directories
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Store the files without creating albums, songs or people
        #[arg(long)]
        no_generate: bool,

        /// Uploader id recorded on newly stored files
        #[arg(long)]
        uploader: Option<i64>,

        /// Name of the created layers
        #[arg(long, default_value = "Default")]
        layer_name: String,

        /// Delete each source file once it has been ingested
        #[arg(long)]
        delete_original: bool,

        /// Follow symbolic links while scanning directories
        #[arg(long)]
        follow_symlinks: bool,
    },
}

#[derive(Serialize)]
struct IngestLine {
    path: String,
    #[serde(flatten)]
    response: UploadResponse,
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Config::load(&cli.config.to_string_lossy())?;

    match cli.command {
        Commands::Status => {
            let conn = db::open(&cfg.database)?;
            for table in ALL_TABLES {
                println!("{table:>20}: {}", catalog::count_rows(&conn, table)?);
            }
            let orphans = catalog::orphaned_layers(&conn)?;
            if !orphans.is_empty() {
                println!("{} layers belong to no song:", orphans.len());
                for layer in &orphans {
                    let path = blobs::get_file(&conn, layer.file)?
                        .map(|file| file.path.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    println!("    - layer {} ({}) of {path}", layer.id, layer.name);
                }
            }
        }

        Commands::Ingest {
            paths,
            no_generate,
            uploader,
            layer_name,
            delete_original,
            follow_symlinks,
        } => {
            let uploads = fs::collect_uploads(&paths, follow_symlinks)?;
            log::info!("found {} files to ingest", uploads.len());

            let pool = WorkerPool::start(&cfg)?;
            let in_flight = pool.workers();
            let wait = cfg.worker.wait_timeout();
            pool.submit_bounded(
                uploads,
                in_flight,
                |path| -> anyhow::Result<IngestRequest> {
                    let bytes = std::fs::read(path)
                        .with_context(|| format!("Failed to read {}", path.to_string_lossy()))?;
                    let filename = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();

                    Ok(IngestRequest {
                        bytes,
                        original_filename: filename,
                        uploader,
                        generate_entries: !no_generate,
                        layer: LayerData {
                            name: layer_name.clone(),
                            ..Default::default()
                        },
                    })
                },
                |path, job| {
                    let response = job.respond(wait);
                    if delete_original && matches!(response, UploadResponse::Created { .. }) {
                        std::fs::remove_file(&path).with_context(|| {
                            format!("Failed to delete {}", path.to_string_lossy())
                        })?;
                    }
                    let line = IngestLine {
                        path: path.to_string_lossy().into_owned(),
                        response,
                    };
                    println!("{}", serde_json::to_string(&line)?);
                    Ok(())
                },
            )?;
            pool.shutdown();
        }
    }
    Ok(())
}
