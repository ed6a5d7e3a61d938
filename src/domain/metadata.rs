//! Metadata read out of an uploaded file's embedded tags.

use std::collections::BTreeMap;

use log::debug;

/// The tag fields the catalog cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagField {
    Title,
    Album,
    Artist,
    AlbumArtist,
    Composer,
    Performer,
    Genre,
    Date,
    DiscNumber,
    TrackNumber,
}

impl TagField {
    pub const ALL: &[TagField] = &[
        TagField::Title,
        TagField::Album,
        TagField::Artist,
        TagField::AlbumArtist,
        TagField::Composer,
        TagField::Performer,
        TagField::Genre,
        TagField::Date,
        TagField::DiscNumber,
        TagField::TrackNumber,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TagField::Title => "title",
            TagField::Album => "album",
            TagField::Artist => "artist",
            TagField::AlbumArtist => "albumartist",
            TagField::Composer => "composer",
            TagField::Performer => "performer",
            TagField::Genre => "genre",
            TagField::Date => "date",
            TagField::DiscNumber => "discnumber",
            TagField::TrackNumber => "tracknumber",
        }
    }
}

/// Raw tag values as found in the file, possibly several per field.
pub type TagMap = BTreeMap<TagField, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumTags {
    pub title: Option<String>,
    pub artists: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongTags {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    pub disc: Option<i64>,
    pub track: Option<i64>,
    pub artists: Vec<String>,
    pub composers: Vec<String>,
    pub performers: Vec<String>,
}

/// Sanitized metadata for one upload. Never stored as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMetadata {
    pub album: AlbumTags,
    pub song: SongTags,
}

impl ParsedMetadata {
    pub fn from_tags(tags: &TagMap) -> Self {
        let artists = multi_string(tags, TagField::Artist);

        let mut album_artists = multi_string(tags, TagField::AlbumArtist);
        if album_artists.is_empty() {
            debug!("No album artist, falling back to track artists");
            album_artists = artists.clone();
        }

        Self {
            album: AlbumTags {
                title: single_string(tags, TagField::Album),
                artists: album_artists,
            },
            song: SongTags {
                title: single_string(tags, TagField::Title),
                genre: single_string(tags, TagField::Genre),
                year: single_integer(tags, TagField::Date),
                disc: single_integer(tags, TagField::DiscNumber),
                track: single_integer(tags, TagField::TrackNumber),
                artists,
                composers: multi_string(tags, TagField::Composer),
                performers: multi_string(tags, TagField::Performer),
            },
        }
    }

    /// Every distinct person name mentioned anywhere, in order of appearance.
    pub fn people(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let all = self
            .album
            .artists
            .iter()
            .chain(&self.song.artists)
            .chain(&self.song.composers)
            .chain(&self.song.performers);
        for name in all {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

/// First value of a field, trimmed. Empty values count as missing.
pub fn single_string(tags: &TagMap, field: TagField) -> Option<String> {
    let values = tags.get(&field)?;
    if values.len() > 1 {
        debug!(
            "Multiple values for {}, keeping the first and discarding the rest",
            field.name()
        );
    }
    let value = values.first()?.trim();
    if value.is_empty() {
        debug!("Tag {} is empty", field.name());
        return None;
    }
    Some(value.to_string())
}

/// First value of a field read as an integer from its leading digits,
/// so `"2020-05-01"` gives 2020 and `"3/12"` gives 3.
pub fn single_integer(tags: &TagMap, field: TagField) -> Option<i64> {
    let value = single_string(tags, field)?;
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse() {
        Ok(number) => Some(number),
        Err(_) => {
            debug!("Couldn't read {value:?} as an integer for {}", field.name());
            None
        }
    }
}

/// All values of a field, each split on `/` and trimmed.
pub fn multi_string(tags: &TagMap, field: TagField) -> Vec<String> {
    let Some(values) = tags.get(&field) else {
        return Vec::new();
    };
    values
        .iter()
        .flat_map(|value| value.split('/'))
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(TagField, &str)]) -> TagMap {
        let mut map = TagMap::new();
        for (field, value) in pairs {
            map.entry(*field).or_default().push(value.to_string());
        }
        map
    }

    #[test]
    fn parses_scenario_tags() {
        let parsed = ParsedMetadata::from_tags(&tags(&[
            (TagField::Album, "Noise"),
            (TagField::Title, "Brownian"),
            (TagField::Artist, "Chaos"),
            (TagField::TrackNumber, "1"),
            (TagField::Genre, "Random"),
            (TagField::Date, "2020"),
        ]));

        assert_eq!(parsed.album.title.as_deref(), Some("Noise"));
        assert_eq!(parsed.album.artists, vec!["Chaos"]);
        assert_eq!(parsed.song.title.as_deref(), Some("Brownian"));
        assert_eq!(parsed.song.track, Some(1));
        assert_eq!(parsed.song.year, Some(2020));
        assert_eq!(parsed.song.disc, None);
        assert_eq!(parsed.song.genre.as_deref(), Some("Random"));
        assert_eq!(parsed.song.artists, vec!["Chaos"]);
    }

    #[test]
    fn multi_valued_fields_split_on_slash_and_trim() {
        let map = tags(&[
            (TagField::Artist, " Daft Punk / Pharrell Williams"),
            (TagField::Artist, "Nile Rodgers"),
            (TagField::Composer, "A//B/ "),
        ]);

        assert_eq!(
            multi_string(&map, TagField::Artist),
            vec!["Daft Punk", "Pharrell Williams", "Nile Rodgers"]
        );
        assert_eq!(multi_string(&map, TagField::Composer), vec!["A", "B"]);
        assert!(multi_string(&map, TagField::Performer).is_empty());
    }

    #[test]
    fn integers_are_lenient() {
        let map = tags(&[
            (TagField::Date, "2001-03-12"),
            (TagField::TrackNumber, "3/12"),
            (TagField::DiscNumber, "one"),
        ]);

        assert_eq!(single_integer(&map, TagField::Date), Some(2001));
        assert_eq!(single_integer(&map, TagField::TrackNumber), Some(3));
        assert_eq!(single_integer(&map, TagField::DiscNumber), None);
        assert_eq!(single_integer(&map, TagField::Title), None);
    }

    #[test]
    fn missing_and_blank_tags_are_not_errors() {
        let parsed = ParsedMetadata::from_tags(&tags(&[(TagField::Album, "   ")]));
        assert_eq!(parsed, ParsedMetadata::default());
    }

    #[test]
    fn explicit_album_artist_wins_over_track_artists() {
        let parsed = ParsedMetadata::from_tags(&tags(&[
            (TagField::Artist, "Guest"),
            (TagField::AlbumArtist, "Various Artists"),
        ]));

        assert_eq!(parsed.album.artists, vec!["Various Artists"]);
        assert_eq!(parsed.song.artists, vec!["Guest"]);
    }

    #[test]
    fn people_are_listed_once() {
        let parsed = ParsedMetadata::from_tags(&tags(&[
            (TagField::Artist, "Chaos/Order"),
            (TagField::Composer, "Order"),
            (TagField::Performer, "Entropy"),
        ]));

        assert_eq!(parsed.people(), vec!["Chaos", "Order", "Entropy"]);
    }
}
