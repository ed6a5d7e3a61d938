use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub type FileId = i64;
pub type PersonId = i64;
pub type RoleId = i64;
pub type GenreId = i64;
pub type AlbumId = i64;
pub type SongId = i64;
pub type LayerId = i64;

/// An uploaded audio file, kept at a content-derived path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: FileId,
    pub path: PathBuf,
    pub mime_type: Option<String>,
    pub mime_subtype: Option<String>,
    pub uploader: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub description: String,
    pub lyrics: String,
    pub disc: Option<i64>,
    pub track: Option<i64>,
    pub year: Option<i64>,
    pub album: Option<AlbumId>,
}

/// One rendition of a song. `song` is `None` for unattached layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub description: String,
    pub song: Option<SongId>,
    pub file: FileId,
}

/// Caller-supplied fields of a new layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerData {
    pub name: String,
    pub description: String,
}

impl Default for LayerData {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            description: String::new(),
        }
    }
}

/// What a role means to auto-generation. The stored role name comes from
/// [`RoleNames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Artist,
    Composer,
    Performer,
}

/// Deployment-specific names of the roles auto-generation assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleNames {
    pub artist: String,
    pub composer: String,
    pub performer: String,
}

impl RoleNames {
    pub fn name(&self, kind: RoleKind) -> &str {
        match kind {
            RoleKind::Artist => &self.artist,
            RoleKind::Composer => &self.composer,
            RoleKind::Performer => &self.performer,
        }
    }
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            artist: "Artist".to_string(),
            composer: "Composer".to_string(),
            performer: "Performer".to_string(),
        }
    }
}
