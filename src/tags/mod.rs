//! Reads embedded tags out of uploaded audio and strips them.
//!
//! Stripping is destructive and must happen exactly once per upload, before
//! hashing: stored bytes never keep uploader-supplied metadata, and two
//! uploads of the same audio with different tags hash identically.

use std::{
    io::{Cursor, Seek},
    path::Path,
};

use lofty::{file::FileType, probe::Probe};
use log::debug;

use crate::domain::metadata::{ParsedMetadata, TagMap};

pub mod container;
pub mod error;
pub mod flac;

pub use container::LoftyContainer;
pub use error::TagError;

/// An upload held in memory while its tags are processed.
pub type AudioStream = Cursor<Vec<u8>>;

/// Tag access for one container format.
pub trait TagFormat {
    fn name(&self) -> String;

    /// Reads the known fields without modifying the stream.
    fn extract(&self, stream: &mut AudioStream) -> Result<TagMap, TagError>;

    /// Removes every embedded tag, leaving the stream rewound.
    fn strip(&self, stream: &mut AudioStream) -> Result<(), TagError>;
}

/// Picks the format by sniffing the content, then by the original extension.
pub fn select_format(
    stream: &mut AudioStream,
    filename: &str,
) -> Result<Box<dyn TagFormat>, TagError> {
    stream.rewind()?;
    let sniffed = Probe::new(&mut *stream).guess_file_type()?.file_type();
    stream.rewind()?;

    let file_type = sniffed.or_else(|| {
        Path::new(filename)
            .extension()
            .and_then(FileType::from_ext)
    });

    match file_type {
        Some(file_type) => {
            debug!("{filename}: handling as {file_type:?}");
            Ok(Box::new(LoftyContainer::new(file_type, filename)))
        }
        None => Err(TagError::UnsupportedFormat {
            filename: filename.to_string(),
        }),
    }
}

/// Parses the tags of `stream` and strips them in place.
pub fn extract_and_strip(
    stream: &mut AudioStream,
    filename: &str,
) -> Result<ParsedMetadata, TagError> {
    let format = select_format(stream, filename)?;
    let tags = format.extract(stream)?;
    format.strip(stream)?;
    debug!(
        "{filename}: stripped {} tag fields from {} stream",
        tags.len(),
        format.name()
    );
    Ok(ParsedMetadata::from_tags(&tags))
}

#[cfg(test)]
mod tests {
    use lofty::tag::{ItemKey, TagType};

    use super::*;
    use crate::{
        domain::metadata::TagField,
        testing::{self, FlacBlock},
    };

    #[test]
    fn extracts_scenario_tags_from_wav() -> anyhow::Result<()> {
        let bytes = testing::tagged_wav(1, &testing::scenario_tags())?;
        let mut stream = Cursor::new(bytes);

        let parsed = extract_and_strip(&mut stream, "noise.wav")?;

        assert_eq!(parsed.album.title.as_deref(), Some("Noise"));
        assert_eq!(parsed.song.title.as_deref(), Some("Brownian"));
        assert_eq!(parsed.song.artists, vec!["Chaos"]);
        assert_eq!(parsed.song.track, Some(1));
        assert_eq!(parsed.song.year, Some(2020));
        assert_eq!(parsed.song.genre.as_deref(), Some("Random"));
        assert_eq!(parsed.song.disc, None);
        Ok(())
    }

    #[test]
    fn stripped_stream_has_no_tags_left() -> anyhow::Result<()> {
        let bytes = testing::tagged_wav(2, &testing::scenario_tags())?;
        let mut stream = Cursor::new(bytes);
        let format = LoftyContainer::new(FileType::Wav, "noise.wav");

        assert!(!format.tag_types(&mut stream)?.is_empty());

        format.strip(&mut stream)?;

        assert!(format.tag_types(&mut stream)?.is_empty());
        assert!(format.extract(&mut stream)?.is_empty());
        assert_eq!(stream.position(), 0);
        Ok(())
    }

    #[test]
    fn stripping_removes_differences_in_tags() -> anyhow::Result<()> {
        let mut first = Cursor::new(testing::tagged_wav(
            3,
            &[(ItemKey::TrackTitle, "Uploaded by alice")],
        )?);
        let mut second = Cursor::new(testing::tagged_wav(
            3,
            &[(ItemKey::TrackTitle, "Uploaded by bob"), (ItemKey::Genre, "Noise")],
        )?);
        assert_ne!(first.get_ref(), second.get_ref());

        extract_and_strip(&mut first, "a.wav")?;
        extract_and_strip(&mut second, "b.wav")?;

        assert_eq!(first.get_ref(), second.get_ref());
        Ok(())
    }

    #[test]
    fn flac_strips_to_the_same_bytes_whatever_the_padding() -> anyhow::Result<()> {
        let variants = [
            testing::flac_stream(
                1,
                &[
                    FlacBlock::Comments(&[("TITLE", "Uploaded by alice")]),
                    FlacBlock::Padding(100),
                ],
            ),
            testing::flac_stream(
                1,
                &[
                    FlacBlock::Comments(&[("TITLE", "Uploaded by bob"), ("GENRE", "Noise")]),
                    FlacBlock::Padding(4000),
                ],
            ),
            testing::flac_stream(1, &[FlacBlock::Comments(&[("ARTIST", "Chaos")])]),
        ];
        let bare = testing::flac_stream(1, &[]);
        let format = LoftyContainer::new(FileType::Flac, "noise.flac");

        let mut first = Cursor::new(variants[0].clone());
        let parsed = extract_and_strip(&mut first, "noise.flac")?;
        assert_eq!(parsed.song.title.as_deref(), Some("Uploaded by alice"));

        for (i, variant) in variants.into_iter().enumerate() {
            let mut stream = Cursor::new(variant);
            extract_and_strip(&mut stream, "noise.flac")?;

            assert_eq!(stream.get_ref(), &bare, "variant {i}");
            assert!(format.extract(&mut stream)?.is_empty(), "variant {i}");
        }
        Ok(())
    }

    #[test]
    fn mp3_strips_id3v2_and_id3v1_whatever_the_padding() -> anyhow::Result<()> {
        let audio = testing::mpeg_frames(5);
        let alice = testing::with_tag(
            audio.clone(),
            TagType::Id3v2,
            &[(ItemKey::TrackTitle, "Uploaded by alice")],
            0,
        )?;
        let bob = testing::with_tag(
            testing::with_tag(
                audio.clone(),
                TagType::Id3v2,
                &[(ItemKey::TrackTitle, "Uploaded by bob"), (ItemKey::Genre, "Noise")],
                4000,
            )?,
            TagType::Id3v1,
            &[(ItemKey::TrackTitle, "bob")],
            0,
        )?;
        assert_ne!(alice.len(), bob.len());

        let mut alice = Cursor::new(alice);
        let mut bob = Cursor::new(bob);
        let parsed = extract_and_strip(&mut alice, "a.mp3")?;
        extract_and_strip(&mut bob, "b.mp3")?;

        assert_eq!(parsed.song.title.as_deref(), Some("Uploaded by alice"));
        assert_eq!(alice.get_ref(), &audio);
        assert_eq!(bob.get_ref(), &audio);
        let format = LoftyContainer::new(FileType::Mpeg, "a.mp3");
        assert!(format.extract(&mut alice)?.is_empty());
        Ok(())
    }

    #[test]
    fn wav_strips_to_the_same_bytes_whatever_the_padding() -> anyhow::Result<()> {
        let audio = testing::silent_wav(6)?;
        let mut small = Cursor::new(testing::with_tag(
            audio.clone(),
            TagType::Id3v2,
            &[(ItemKey::TrackTitle, "a")],
            0,
        )?);
        let mut large = Cursor::new(testing::with_tag(
            audio,
            TagType::Id3v2,
            &[(ItemKey::TrackTitle, "b"), (ItemKey::Genre, "Noise")],
            4000,
        )?);

        extract_and_strip(&mut small, "a.wav")?;
        extract_and_strip(&mut large, "b.wav")?;

        assert_eq!(small.get_ref(), large.get_ref());
        Ok(())
    }

    #[test]
    fn truncated_flac_is_rejected() {
        let mut bytes = testing::flac_stream(7, &[FlacBlock::Padding(64)]);
        bytes.truncate(30);

        let err = extract_and_strip(&mut Cursor::new(bytes), "cut.flac").unwrap_err();

        assert!(matches!(
            err,
            TagError::Malformed { .. } | TagError::Corrupt { .. }
        ));
    }

    #[test]
    fn untagged_file_extracts_nothing() -> anyhow::Result<()> {
        let mut stream = Cursor::new(testing::silent_wav(4)?);
        let format = select_format(&mut stream, "plain.wav")?;

        let tags = format.extract(&mut stream)?;

        assert!(tags.get(&TagField::Title).is_none());
        assert!(tags.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_container_is_unsupported() {
        let mut stream = Cursor::new(b"definitely not audio, just text".to_vec());

        let err = extract_and_strip(&mut stream, "notes.txt").unwrap_err();

        assert!(matches!(err, TagError::UnsupportedFormat { .. }));
    }
}
