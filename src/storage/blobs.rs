//! Content-addressable storage of uploaded audio.
//!
//! A file lives at `<root>/<hex hash>.<ext>`, so identical stripped content
//! always lands at the identical path and is written at most once.

use std::{
    fs::File,
    io::{Read, Seek},
    path::{Path, PathBuf},
};

use log::{debug, error, info};
use rusqlite::{Connection, OptionalExtension, params};
use tempfile::NamedTempFile;

use crate::{
    domain::{
        catalog::{FileId, StoredFile},
        hash::ContentHash,
    },
    storage::{
        error::StorageError,
        schema::{columns::*, tables::*},
    },
};

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where content with `hash` uploaded as `original_filename` is kept.
    pub fn destination(&self, hash: &ContentHash, original_filename: &str) -> PathBuf {
        match extension(original_filename) {
            Some(ext) => self.root.join(format!("{}.{ext}", hash.to_hex())),
            None => self.root.join(hash.to_hex()),
        }
    }

    /// Stores the (already tag-stripped) stream, or returns the file that
    /// already holds the same content.
    pub fn store<S: Read + Seek>(
        &self,
        conn: &Connection,
        stream: &mut S,
        original_filename: &str,
        uploader: Option<i64>,
    ) -> Result<StoredFile, StorageError> {
        stream.rewind()?;
        let hash = ContentHash::from_reader(stream)?;
        stream.rewind()?;

        let path = self.destination(&hash, original_filename);

        if let Some(existing) = find_file_by_path(conn, &path)? {
            debug!("{original_filename} deduplicated to file {}", existing.id);
            return Ok(existing);
        }

        if path.exists() {
            // left behind by a transaction that did not commit
            let found = ContentHash::from_reader(&mut File::open(&path)?)?;
            if found != hash {
                error!(
                    "hash collision at {}: expected {hash}, found {found}",
                    path.to_string_lossy()
                );
                return Err(StorageError::HashCollision {
                    path,
                    expected: hash,
                    found,
                });
            }
            debug!("reusing bytes already at {}", path.to_string_lossy());
        } else {
            write_atomically(&path, stream)?;
            info!("stored {original_filename} at {}", path.to_string_lossy());
        }

        let (mime_type, mime_subtype) = guess_mime(original_filename);
        conn.execute(
            &format!(
                "INSERT INTO {FILES} ({PATH}, {MIME_TYPE}, {MIME_SUBTYPE}, {UPLOADER_ID}) \
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![path.to_string_lossy(), mime_type, mime_subtype, uploader],
        )?;

        Ok(StoredFile {
            id: conn.last_insert_rowid(),
            path,
            mime_type,
            mime_subtype,
            uploader,
        })
    }
}

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Writes next to the destination and renames into place, so a reader never
/// sees a partial file and racing writers of the same content are harmless.
fn write_atomically<S: Read>(path: &Path, stream: &mut S) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    std::io::copy(stream, &mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Fs(e.error))?;
    Ok(())
}

/// MIME type and subtype guessed from the original extension.
pub fn guess_mime(original_filename: &str) -> (Option<String>, Option<String>) {
    let Some(ext) = extension(original_filename) else {
        return (None, None);
    };
    if let Some((type_, subtype)) = audio_mime_override(&ext) {
        return (Some(type_.to_string()), Some(subtype.to_string()));
    }
    match mime_guess::from_ext(&ext).first() {
        Some(mime) => (
            Some(mime.type_().as_str().to_string()),
            Some(mime.subtype().as_str().to_string()),
        ),
        None => (None, None),
    }
}

/// Extensions where the generic guess is not what players expect.
fn audio_mime_override(ext: &str) -> Option<(&'static str, &'static str)> {
    match ext {
        "m4a" => Some(("audio", "x-m4a")),
        "flac" => Some(("audio", "flac")),
        "opus" => Some(("audio", "ogg")),
        _ => None,
    }
}

fn file_from_row(row: &rusqlite::Row) -> rusqlite::Result<StoredFile> {
    Ok(StoredFile {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        mime_type: row.get(2)?,
        mime_subtype: row.get(3)?,
        uploader: row.get(4)?,
    })
}

pub fn find_file_by_path(
    conn: &Connection,
    path: &Path,
) -> Result<Option<StoredFile>, StorageError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ID}, {PATH}, {MIME_TYPE}, {MIME_SUBTYPE}, {UPLOADER_ID} \
                 FROM {FILES} WHERE {PATH} = ?1"
            ),
            params![path.to_string_lossy()],
            file_from_row,
        )
        .optional()?)
}

pub fn get_file(conn: &Connection, id: FileId) -> Result<Option<StoredFile>, StorageError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ID}, {PATH}, {MIME_TYPE}, {MIME_SUBTYPE}, {UPLOADER_ID} \
                 FROM {FILES} WHERE {ID} = ?1"
            ),
            params![id],
            file_from_row,
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Cursor};

    use tempfile::tempdir;

    use super::*;
    use crate::testing::{count, memory_db};

    #[test]
    fn destination_depends_only_on_content_and_extension() {
        let store = ContentStore::new("/music");
        let hash = ContentHash::from_bytes(b"brownian noise");

        let a = store.destination(&hash, "upload one.mp3");
        let b = store.destination(&hash, "/elsewhere/another name.MP3");
        let c = store.destination(&hash, "same.flac");

        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from(format!("/music/{}.mp3", hash.to_hex())));
        assert_ne!(a, c);
        assert_eq!(
            store.destination(&hash, "no_extension"),
            PathBuf::from(format!("/music/{}", hash.to_hex()))
        );
    }

    #[test]
    fn storing_identical_content_twice_reuses_the_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ContentStore::new(dir.path().join("music"));
        let conn = memory_db()?;

        let first = store.store(&conn, &mut Cursor::new(b"same bytes".to_vec()), "a.ogg", Some(7))?;
        let second =
            store.store(&conn, &mut Cursor::new(b"same bytes".to_vec()), "b.ogg", Some(9))?;

        assert_eq!(first, second);
        assert_eq!(second.uploader, Some(7));
        assert_eq!(count(&conn, FILES)?, 1);
        assert_eq!(fs::read_dir(store.root())?.count(), 1);
        assert_eq!(fs::read(&first.path)?, b"same bytes");
        Ok(())
    }

    #[test]
    fn different_content_gets_different_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ContentStore::new(dir.path());
        let conn = memory_db()?;

        let a = store.store(&conn, &mut Cursor::new(b"one".to_vec()), "a.mp3", None)?;
        let b = store.store(&conn, &mut Cursor::new(b"two".to_vec()), "a.mp3", None)?;

        assert_ne!(a.id, b.id);
        assert_ne!(a.path, b.path);
        assert_eq!(a.mime_type.as_deref(), Some("audio"));
        assert_eq!(a.mime_subtype.as_deref(), Some("mpeg"));
        Ok(())
    }

    #[test]
    fn leftover_bytes_without_a_row_are_adopted() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ContentStore::new(dir.path());
        let conn = memory_db()?;

        let path = store.destination(&ContentHash::from_bytes(b"orphan"), "x.wav");
        fs::write(&path, b"orphan")?;

        let file = store.store(&conn, &mut Cursor::new(b"orphan".to_vec()), "x.wav", None)?;

        assert_eq!(file.path, path);
        assert_eq!(get_file(&conn, file.id)?, Some(file));
        Ok(())
    }

    #[test]
    fn mismatching_bytes_at_destination_is_a_collision() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ContentStore::new(dir.path());
        let conn = memory_db()?;

        let path = store.destination(&ContentHash::from_bytes(b"expected"), "x.wav");
        fs::write(&path, b"something else entirely")?;

        let err = store
            .store(&conn, &mut Cursor::new(b"expected".to_vec()), "x.wav", None)
            .unwrap_err();

        assert!(matches!(err, StorageError::HashCollision { .. }));
        assert_eq!(count(&conn, FILES)?, 0);
        assert_eq!(fs::read(&path)?, b"something else entirely");
        Ok(())
    }

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(
            guess_mime("track.m4a"),
            (Some("audio".to_string()), Some("x-m4a".to_string()))
        );
        assert_eq!(guess_mime("track.WAV").0.as_deref(), Some("audio"));
        assert_eq!(guess_mime("track"), (None, None));
    }
}
