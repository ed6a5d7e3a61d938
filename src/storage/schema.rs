use rusqlite::Connection;

pub mod tables {
    pub const FILES: &str = "files";
    pub const PEOPLE: &str = "people";
    pub const ROLES: &str = "roles";
    pub const GENRES: &str = "genres";
    pub const ALBUMS: &str = "albums";
    pub const SONGS: &str = "songs";
    pub const ALBUM_INVOLVEMENTS: &str = "album_involvements";
    pub const SONG_INVOLVEMENTS: &str = "song_involvements";
    pub const ALBUM_GENRES: &str = "album_genres";
    pub const SONG_GENRES: &str = "song_genres";
    pub const LAYERS: &str = "layers";

    pub const ALL_TABLES: &[&str] = &[
        FILES,
        PEOPLE,
        ROLES,
        GENRES,
        ALBUMS,
        SONGS,
        ALBUM_INVOLVEMENTS,
        SONG_INVOLVEMENTS,
        ALBUM_GENRES,
        SONG_GENRES,
        LAYERS,
    ];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const PATH: &str = "path";
    pub const MIME_TYPE: &str = "mime_type";
    pub const MIME_SUBTYPE: &str = "mime_subtype";
    pub const UPLOADER_ID: &str = "uploader_id";
    pub const NAME: &str = "name";
    /// Natural key of named entities, unique per table.
    pub const NAME_KEY: &str = "name_key";
    pub const DESCRIPTION: &str = "description";
    pub const TITLE: &str = "title";
    pub const ALBUM_ID: &str = "album_id";
    pub const SONG_ID: &str = "song_id";
    pub const PERSON_ID: &str = "person_id";
    pub const ROLE_ID: &str = "role_id";
    pub const GENRE_ID: &str = "genre_id";
    pub const FILE_ID: &str = "file_id";
}

pub use columns::*;
pub use tables::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    mime_type TEXT,
    mime_subtype TEXT,
    uploader_id INTEGER
);

CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS genres (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS albums_title ON albums (title);

CREATE TABLE IF NOT EXISTS songs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    lyrics TEXT NOT NULL DEFAULT '',
    disc INTEGER,
    track INTEGER,
    year INTEGER,
    album_id INTEGER REFERENCES albums (id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS songs_title ON songs (title);

CREATE TABLE IF NOT EXISTS album_involvements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id INTEGER NOT NULL REFERENCES people (id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
    album_id INTEGER NOT NULL REFERENCES albums (id) ON DELETE CASCADE,
    UNIQUE (person_id, role_id, album_id)
);

CREATE TABLE IF NOT EXISTS song_involvements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id INTEGER NOT NULL REFERENCES people (id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
    song_id INTEGER NOT NULL REFERENCES songs (id) ON DELETE CASCADE,
    UNIQUE (person_id, role_id, song_id)
);

CREATE TABLE IF NOT EXISTS album_genres (
    album_id INTEGER NOT NULL REFERENCES albums (id) ON DELETE CASCADE,
    genre_id INTEGER NOT NULL REFERENCES genres (id) ON DELETE CASCADE,
    PRIMARY KEY (album_id, genre_id)
);

CREATE TABLE IF NOT EXISTS song_genres (
    song_id INTEGER NOT NULL REFERENCES songs (id) ON DELETE CASCADE,
    genre_id INTEGER NOT NULL REFERENCES genres (id) ON DELETE CASCADE,
    PRIMARY KEY (song_id, genre_id)
);

CREATE TABLE IF NOT EXISTS layers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT 'Default',
    description TEXT NOT NULL DEFAULT '',
    song_id INTEGER REFERENCES songs (id) ON DELETE SET NULL,
    file_id INTEGER NOT NULL REFERENCES files (id)
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
