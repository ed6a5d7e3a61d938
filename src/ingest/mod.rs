//! Runs one upload through tag stripping, content storage and catalog
//! resolution as a single serializable transaction.

use std::{io::Cursor, thread, time::Duration};

use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::{
    config::Config,
    domain::{
        catalog::{AlbumId, FileId, LayerData, LayerId, RoleNames, SongId},
        metadata::ParsedMetadata,
    },
    storage::{blobs::ContentStore, catalog, error::StorageError},
    tags::{self, AudioStream},
};

pub mod error;

pub use error::IngestError;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(25);

/// One uploaded file together with how it should be cataloged.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub bytes: Vec<u8>,
    pub original_filename: String,
    pub uploader: Option<i64>,
    /// Resolve the tags into albums, songs and people. When off, the layer is
    /// created unattached.
    pub generate_entries: bool,
    pub layer: LayerData,
}

impl IngestRequest {
    pub fn new(bytes: Vec<u8>, original_filename: impl Into<String>) -> Self {
        Self {
            bytes,
            original_filename: original_filename.into(),
            uploader: None,
            generate_entries: true,
            layer: LayerData::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub file_id: FileId,
    pub layer_id: LayerId,
    pub song_id: Option<SongId>,
    pub album_id: Option<AlbumId>,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    store: ContentStore,
    roles: RoleNames,
    max_attempts: u32,
    backoff: Duration,
}

impl Ingestor {
    pub fn new(store: ContentStore, roles: RoleNames) -> Self {
        Self {
            store,
            roles,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ContentStore::new(&config.storage.root), config.roles.clone())
            .with_retry(config.worker.max_attempts, config.worker.retry_backoff())
    }

    /// At least one attempt is always made.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Ingests one upload.
    ///
    /// Tags are stripped once up front; the transactional part is retried
    /// from scratch whenever it loses a race with another ingestion, waiting
    /// a little longer after each attempt.
    pub fn ingest(
        &self,
        conn: &mut Connection,
        request: IngestRequest,
    ) -> Result<IngestOutcome, IngestError> {
        let IngestRequest {
            bytes,
            original_filename,
            uploader,
            generate_entries,
            layer,
        } = request;

        let mut stream: AudioStream = Cursor::new(bytes);
        let metadata = tags::extract_and_strip(&mut stream, &original_filename)?;
        let metadata = generate_entries.then_some(metadata);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.try_ingest(
                conn,
                &mut stream,
                &original_filename,
                uploader,
                metadata.as_ref(),
                &layer,
            );
            match result {
                Ok(outcome) => {
                    info!(
                        "{original_filename} ingested as file {} layer {}",
                        outcome.file_id, outcome.layer_id
                    );
                    return Ok(outcome);
                }
                Err(err) if err.is_conflict() && attempt < self.max_attempts => {
                    let wait = self.backoff * attempt;
                    warn!(
                        "{original_filename}: attempt {attempt}/{} conflicted, retrying in {wait:?}: {err}",
                        self.max_attempts
                    );
                    thread::sleep(wait);
                }
                Err(err) if err.is_conflict() => {
                    warn!("{original_filename}: giving up after {attempt} conflicting attempts");
                    return Err(IngestError::SerializationConflict { attempts: attempt });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn try_ingest(
        &self,
        conn: &mut Connection,
        stream: &mut AudioStream,
        original_filename: &str,
        uploader: Option<i64>,
        metadata: Option<&ParsedMetadata>,
        layer: &LayerData,
    ) -> Result<IngestOutcome, StorageError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let file = self.store.store(&tx, stream, original_filename, uploader)?;
        let resolution = match metadata {
            Some(metadata) => Some(catalog::resolve_song(&tx, metadata, &self.roles)?),
            None => None,
        };
        let song = resolution.as_ref().map(|r| r.song.id);
        let layer = catalog::attach_layer(&tx, file.id, song, layer)?;

        tx.commit()?;

        Ok(IngestOutcome {
            file_id: file.id,
            layer_id: layer.id,
            song_id: song,
            album_id: resolution.and_then(|r| r.album).map(|a| a.id),
        })
    }
}
