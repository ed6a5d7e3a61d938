//! Turns parsed metadata into catalog rows, reusing what already exists.
//!
//! Every function takes a plain `&Connection`; the ingestion coordinator
//! passes its open transaction so all reads and writes share one snapshot.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    domain::{
        catalog::{
            Album, AlbumId, FileId, Genre, Layer, LayerData, Person, PersonId, Role,
            RoleId, RoleKind, RoleNames, Song, SongId,
        },
        metadata::ParsedMetadata,
    },
    storage::{
        error::StorageError,
        schema::{columns::*, tables::*},
    },
};

/// How a named entity's natural key compares names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCase {
    Sensitive,
    Insensitive,
}

/// Rows identified by a unique name: people, roles and genres.
pub trait NaturalKeyed: Sized {
    const TABLE: &'static str;
    const CASE: KeyCase;

    fn from_parts(id: i64, name: String, description: String) -> Self;

    fn natural_key(name: &str) -> String {
        match Self::CASE {
            KeyCase::Sensitive => name.to_string(),
            KeyCase::Insensitive => name.to_lowercase(),
        }
    }
}

impl NaturalKeyed for Person {
    const TABLE: &'static str = PEOPLE;
    const CASE: KeyCase = KeyCase::Insensitive;

    fn from_parts(id: i64, name: String, description: String) -> Self {
        Person {
            id,
            name,
            description,
        }
    }
}

impl NaturalKeyed for Role {
    const TABLE: &'static str = ROLES;
    const CASE: KeyCase = KeyCase::Sensitive;

    fn from_parts(id: i64, name: String, description: String) -> Self {
        Role {
            id,
            name,
            description,
        }
    }
}

impl NaturalKeyed for Genre {
    const TABLE: &'static str = GENRES;
    const CASE: KeyCase = KeyCase::Sensitive;

    fn from_parts(id: i64, name: String, description: String) -> Self {
        Genre {
            id,
            name,
            description,
        }
    }
}

pub fn find_by_name<T: NaturalKeyed>(
    conn: &Connection,
    name: &str,
) -> Result<Option<T>, StorageError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ID}, {NAME}, {DESCRIPTION} FROM {} WHERE {NAME_KEY} = ?1",
                T::TABLE
            ),
            params![T::natural_key(name)],
            |row| Ok(T::from_parts(row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?)
}

/// Returns the row whose natural key matches `name`, inserting it if absent.
pub fn resolve_or_create<T: NaturalKeyed>(
    conn: &Connection,
    name: &str,
) -> Result<T, StorageError> {
    if let Some(found) = find_by_name::<T>(conn, name)? {
        return Ok(found);
    }

    conn.execute(
        &format!(
            "INSERT INTO {} ({NAME}, {NAME_KEY}, {DESCRIPTION}) VALUES (?1, ?2, '')",
            T::TABLE
        ),
        params![name, T::natural_key(name)],
    )?;
    debug!("created {} row {name:?}", T::TABLE);
    Ok(T::from_parts(conn.last_insert_rowid(), name.to_string(), String::new()))
}

/// Role ids for each [`RoleKind`], looked up once per ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRoles {
    pub artist: RoleId,
    pub composer: RoleId,
    pub performer: RoleId,
}

impl ResolvedRoles {
    pub fn resolve(conn: &Connection, names: &RoleNames) -> Result<Self, StorageError> {
        Ok(Self {
            artist: resolve_or_create::<Role>(conn, names.name(RoleKind::Artist))?.id,
            composer: resolve_or_create::<Role>(conn, names.name(RoleKind::Composer))?.id,
            performer: resolve_or_create::<Role>(conn, names.name(RoleKind::Performer))?.id,
        })
    }

    pub fn get(&self, kind: RoleKind) -> RoleId {
        match kind {
            RoleKind::Artist => self.artist,
            RoleKind::Composer => self.composer,
            RoleKind::Performer => self.performer,
        }
    }
}

/// What an involvement or genre link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Album(AlbumId),
    Song(SongId),
}

impl Subject {
    fn table_and_column(&self) -> (&'static str, &'static str, i64) {
        match *self {
            Subject::Album(id) => (ALBUM_INVOLVEMENTS, ALBUM_ID, id),
            Subject::Song(id) => (SONG_INVOLVEMENTS, SONG_ID, id),
        }
    }

    fn genre_table_and_column(&self) -> (&'static str, &'static str, i64) {
        match *self {
            Subject::Album(id) => (ALBUM_GENRES, ALBUM_ID, id),
            Subject::Song(id) => (SONG_GENRES, SONG_ID, id),
        }
    }
}

pub fn involve(
    conn: &Connection,
    subject: Subject,
    role: RoleId,
    people: &[PersonId],
) -> Result<(), StorageError> {
    let (table, column, id) = subject.table_and_column();
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {table} ({PERSON_ID}, {ROLE_ID}, {column}) VALUES (?1, ?2, ?3)"
    ))?;
    for person in people {
        stmt.execute(params![person, role, id])?;
    }
    Ok(())
}

/// People holding `role` on `subject`.
pub fn involved_people(
    conn: &Connection,
    subject: Subject,
    role: RoleId,
) -> Result<BTreeSet<PersonId>, StorageError> {
    let (table, column, id) = subject.table_and_column();
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERSON_ID} FROM {table} WHERE {column} = ?1 AND {ROLE_ID} = ?2"
    ))?;
    let people = stmt
        .query_map(params![id, role], |row| row.get(0))?
        .collect::<Result<BTreeSet<PersonId>, _>>()?;
    Ok(people)
}

fn album_from_row(row: &rusqlite::Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
    })
}

fn song_from_row(row: &rusqlite::Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        lyrics: row.get(3)?,
        disc: row.get(4)?,
        track: row.get(5)?,
        year: row.get(6)?,
        album: row.get(7)?,
    })
}

const SONG_COLUMNS: &str = "id, title, description, lyrics, disc, track, year, album_id";

/// Earliest-created album with this exact title and exactly these artists.
pub fn find_album(
    conn: &Connection,
    title: &str,
    artists: &BTreeSet<PersonId>,
    artist_role: RoleId,
) -> Result<Option<Album>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ID}, {TITLE}, {DESCRIPTION} FROM {ALBUMS} WHERE {TITLE} = ?1 ORDER BY {ID}"
    ))?;
    let candidates = stmt
        .query_map(params![title], album_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for album in candidates {
        if involved_people(conn, Subject::Album(album.id), artist_role)? == *artists {
            return Ok(Some(album));
        }
    }
    Ok(None)
}

/// Earliest-created song with this exact title, exactly these artists and
/// the same parent album (or likewise no album).
pub fn find_song(
    conn: &Connection,
    title: &str,
    album: Option<AlbumId>,
    artists: &BTreeSet<PersonId>,
    artist_role: RoleId,
) -> Result<Option<Song>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SONG_COLUMNS} FROM {SONGS} WHERE {TITLE} = ?1 AND {ALBUM_ID} IS ?2 ORDER BY {ID}"
    ))?;
    let candidates = stmt
        .query_map(params![title, album], song_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for song in candidates {
        if involved_people(conn, Subject::Song(song.id), artist_role)? == *artists {
            return Ok(Some(song));
        }
    }
    Ok(None)
}

pub fn get_album(conn: &Connection, id: AlbumId) -> Result<Option<Album>, StorageError> {
    Ok(conn
        .query_row(
            &format!("SELECT {ID}, {TITLE}, {DESCRIPTION} FROM {ALBUMS} WHERE {ID} = ?1"),
            params![id],
            album_from_row,
        )
        .optional()?)
}

pub fn get_song(conn: &Connection, id: SongId) -> Result<Option<Song>, StorageError> {
    Ok(conn
        .query_row(
            &format!("SELECT {SONG_COLUMNS} FROM {SONGS} WHERE {ID} = ?1"),
            params![id],
            song_from_row,
        )
        .optional()?)
}

pub fn tag_genre(conn: &Connection, subject: Subject, genre: &Genre) -> Result<(), StorageError> {
    let (table, column, id) = subject.genre_table_and_column();
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} ({column}, {GENRE_ID}) VALUES (?1, ?2)"),
        params![id, genre.id],
    )?;
    Ok(())
}

#[cfg(test)]
pub fn genres(conn: &Connection, subject: Subject) -> Result<Vec<Genre>, StorageError> {
    let (table, column, id) = subject.genre_table_and_column();
    let mut stmt = conn.prepare(&format!(
        "SELECT g.{ID}, g.{NAME}, g.{DESCRIPTION} FROM {GENRES} g \
         JOIN {table} link ON link.{GENRE_ID} = g.{ID} \
         WHERE link.{column} = ?1 ORDER BY g.{ID}"
    ))?;
    let genres = stmt
        .query_map(params![id], |row| {
            Ok(Genre {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(genres)
}

/// Where an ingestion's layer ended up in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub album: Option<Album>,
    pub song: Song,
    pub created_album: bool,
    pub created_song: bool,
}

/// Finds or creates the song `metadata` describes, with its album, people,
/// roles and genre.
///
/// A reused song keeps its own fields; the incoming metadata is discarded.
pub fn resolve_song(
    conn: &Connection,
    metadata: &ParsedMetadata,
    role_names: &RoleNames,
) -> Result<Resolution, StorageError> {
    let roles = ResolvedRoles::resolve(conn, role_names)?;

    let mut people: HashMap<String, PersonId> = HashMap::new();
    for name in metadata.people() {
        let person = resolve_or_create::<Person>(conn, name)?;
        people.insert(name.to_string(), person.id);
    }
    let ids = |names: &[String]| -> Vec<PersonId> {
        let mut ids: Vec<PersonId> = names.iter().filter_map(|n| people.get(n)).copied().collect();
        ids.dedup();
        ids
    };

    let genre = match &metadata.song.genre {
        Some(name) => Some(resolve_or_create::<Genre>(conn, name)?),
        None => None,
    };

    let (album, created_album) = match &metadata.album.title {
        Some(title) => {
            let artists = ids(&metadata.album.artists);
            let artist_set: BTreeSet<PersonId> = artists.iter().copied().collect();
            match find_album(conn, title, &artist_set, roles.artist)? {
                Some(album) => {
                    debug!("reusing album {} {:?}", album.id, album.title);
                    (Some(album), false)
                }
                None => {
                    let album = create_album(conn, title)?;
                    involve(conn, Subject::Album(album.id), roles.artist, &artists)?;
                    if let Some(genre) = &genre {
                        tag_genre(conn, Subject::Album(album.id), genre)?;
                    }
                    info!("created album {} {:?}", album.id, album.title);
                    (Some(album), true)
                }
            }
        }
        None => (None, false),
    };
    let album_id = album.as_ref().map(|a| a.id);

    let title = metadata.song.title.clone().unwrap_or_default();
    let song_artists = ids(&metadata.song.artists);
    let song_artist_set: BTreeSet<PersonId> = song_artists.iter().copied().collect();

    if let Some(song) = find_song(conn, &title, album_id, &song_artist_set, roles.artist)? {
        debug!("reusing song {} {:?}", song.id, song.title);
        return Ok(Resolution {
            album,
            song,
            created_album,
            created_song: false,
        });
    }

    let song = create_song(conn, &title, metadata, album_id)?;
    let subject = Subject::Song(song.id);
    involve(conn, subject, roles.get(RoleKind::Artist), &song_artists)?;
    involve(conn, subject, roles.get(RoleKind::Composer), &ids(&metadata.song.composers))?;
    involve(conn, subject, roles.get(RoleKind::Performer), &ids(&metadata.song.performers))?;
    if let Some(genre) = &genre {
        tag_genre(conn, subject, genre)?;
    }
    info!("created song {} {:?}", song.id, song.title);

    Ok(Resolution {
        album,
        song,
        created_album,
        created_song: true,
    })
}

fn create_album(conn: &Connection, title: &str) -> Result<Album, StorageError> {
    conn.execute(
        &format!("INSERT INTO {ALBUMS} ({TITLE}) VALUES (?1)"),
        params![title],
    )?;
    Ok(Album {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        description: String::new(),
    })
}

fn create_song(
    conn: &Connection,
    title: &str,
    metadata: &ParsedMetadata,
    album: Option<AlbumId>,
) -> Result<Song, StorageError> {
    let tags = &metadata.song;
    conn.execute(
        &format!(
            "INSERT INTO {SONGS} ({TITLE}, disc, track, year, {ALBUM_ID}) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![title, tags.disc, tags.track, tags.year, album],
    )?;
    Ok(Song {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        description: String::new(),
        lyrics: String::new(),
        disc: tags.disc,
        track: tags.track,
        year: tags.year,
        album,
    })
}

/// Creates a layer for `file`, attached to `song` when there is one.
pub fn attach_layer(
    conn: &Connection,
    file: FileId,
    song: Option<SongId>,
    data: &LayerData,
) -> Result<Layer, StorageError> {
    conn.execute(
        &format!(
            "INSERT INTO {LAYERS} ({NAME}, {DESCRIPTION}, {SONG_ID}, {FILE_ID}) \
             VALUES (?1, ?2, ?3, ?4)"
        ),
        params![data.name, data.description, song, file],
    )?;
    Ok(Layer {
        id: conn.last_insert_rowid(),
        name: data.name.clone(),
        description: data.description.clone(),
        song,
        file,
    })
}

fn layer_from_row(row: &rusqlite::Row) -> rusqlite::Result<Layer> {
    Ok(Layer {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        song: row.get(3)?,
        file: row.get(4)?,
    })
}

#[cfg(test)]
pub fn get_layer(
    conn: &Connection,
    id: crate::domain::catalog::LayerId,
) -> Result<Option<Layer>, StorageError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ID}, {NAME}, {DESCRIPTION}, {SONG_ID}, {FILE_ID} \
                 FROM {LAYERS} WHERE {ID} = ?1"
            ),
            params![id],
            layer_from_row,
        )
        .optional()?)
}

/// Layers not belonging to any song, oldest first.
pub fn orphaned_layers(conn: &Connection) -> Result<Vec<Layer>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ID}, {NAME}, {DESCRIPTION}, {SONG_ID}, {FILE_ID} FROM {LAYERS} \
         WHERE {SONG_ID} IS NULL ORDER BY {ID}"
    ))?;
    let layers = stmt
        .query_map([], layer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layers)
}

/// Deletes a song and its involvements; its layers and files stay.
pub fn delete_song(conn: &Connection, id: SongId) -> Result<bool, StorageError> {
    let deleted = conn.execute(&format!("DELETE FROM {SONGS} WHERE {ID} = ?1"), params![id])?;
    Ok(deleted > 0)
}

/// Deletes an album and its involvements; its songs lose their album.
pub fn delete_album(conn: &Connection, id: AlbumId) -> Result<bool, StorageError> {
    let deleted = conn.execute(&format!("DELETE FROM {ALBUMS} WHERE {ID} = ?1"), params![id])?;
    Ok(deleted > 0)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, StorageError> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?)
}
