use std::io::{Cursor, Seek};

use lofty::{
    config::{ParseOptions, WriteOptions},
    error::{ErrorKind, LoftyError},
    file::{FileType, TaggedFile, TaggedFileExt},
    probe::Probe,
    tag::{ItemKey, Tag, TagExt, TagType},
};
use log::debug;

use crate::{
    domain::metadata::{TagField, TagMap},
    tags::{AudioStream, TagFormat, error::TagError, flac},
};

/// Tag access for one container type recognised by lofty.
#[derive(Debug, Clone)]
pub struct LoftyContainer {
    file_type: FileType,
    filename: String,
}

impl LoftyContainer {
    pub fn new(file_type: FileType, filename: &str) -> Self {
        Self {
            file_type,
            filename: filename.to_string(),
        }
    }

    fn read(&self, stream: &mut AudioStream) -> Result<TaggedFile, TagError> {
        stream.rewind()?;
        let tagged = Probe::with_file_type(&mut *stream, self.file_type)
            .options(ParseOptions::new().read_properties(false))
            .read()
            .map_err(|e| self.error(e))?;
        stream.rewind()?;
        Ok(tagged)
    }

    /// Tag types currently embedded in the stream.
    pub fn tag_types(&self, stream: &mut AudioStream) -> Result<Vec<TagType>, TagError> {
        let tagged = self.read(stream)?;
        Ok(tagged.tags().iter().map(Tag::tag_type).collect())
    }

    fn error(&self, source: LoftyError) -> TagError {
        match source.kind() {
            ErrorKind::UnknownFormat => TagError::UnsupportedFormat {
                filename: self.filename.clone(),
            },
            _ => TagError::Malformed {
                filename: self.filename.clone(),
                source,
            },
        }
    }
}

fn item_keys(field: TagField) -> Vec<ItemKey> {
    match field {
        TagField::Title => vec![ItemKey::TrackTitle],
        TagField::Album => vec![ItemKey::AlbumTitle],
        TagField::Artist => vec![ItemKey::TrackArtist],
        TagField::AlbumArtist => vec![ItemKey::AlbumArtist],
        TagField::Composer => vec![ItemKey::Composer],
        TagField::Performer => vec![ItemKey::Performer],
        TagField::Genre => vec![ItemKey::Genre],
        TagField::Date => vec![ItemKey::RecordingDate, ItemKey::Year],
        TagField::DiscNumber => vec![ItemKey::DiscNumber],
        TagField::TrackNumber => vec![ItemKey::TrackNumber],
    }
}

fn field_values(tag: &Tag, field: TagField) -> Vec<String> {
    let mut values = Vec::new();
    for key in item_keys(field) {
        values.extend(tag.get_strings(&key).map(str::to_string));
        if !values.is_empty() {
            break;
        }
    }
    values
}

impl TagFormat for LoftyContainer {
    fn name(&self) -> String {
        format!("{:?}", self.file_type)
    }

    fn extract(&self, stream: &mut AudioStream) -> Result<TagMap, TagError> {
        let tagged = self.read(stream)?;

        // primary tag first, the others only fill in what it lacks
        let primary = tagged.primary_tag();
        let ordered = primary.into_iter().chain(
            tagged
                .tags()
                .iter()
                .filter(|tag| Some(tag.tag_type()) != primary.map(Tag::tag_type)),
        );
        let tags: Vec<&Tag> = ordered.collect();

        let mut map = TagMap::new();
        for field in TagField::ALL {
            for tag in &tags {
                let values = field_values(tag, *field);
                if !values.is_empty() {
                    debug!("{}: read {} = {:?}", self.filename, field.name(), values);
                    map.insert(*field, values);
                    break;
                }
            }
        }
        Ok(map)
    }

    fn strip(&self, stream: &mut AudioStream) -> Result<(), TagError> {
        for tag_type in self.tag_types(stream)? {
            debug!("{}: removing {:?} tag", self.filename, tag_type);
            stream.rewind()?;
            // writing an empty tag removes it; lofty pads by default
            Tag::new(tag_type)
                .save_to(stream, WriteOptions::new().preferred_padding(0))
                .map_err(|e| self.error(e))?;
        }

        if self.file_type == FileType::Flac {
            let stripped =
                flac::strip_metadata(stream.get_ref()).map_err(|reason| TagError::Corrupt {
                    filename: self.filename.clone(),
                    reason,
                })?;
            *stream = Cursor::new(stripped);
        }
        stream.rewind()?;
        Ok(())
    }
}
