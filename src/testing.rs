//! Fixtures shared by the unit tests.

use std::io::{Cursor, Seek};

use lofty::{
    config::WriteOptions,
    tag::{ItemKey, Tag, TagExt, TagType},
};
use rusqlite::Connection;

use crate::storage::schema;

/// A tiny mono PCM WAV. Different seeds give different audio.
pub fn silent_wav(seed: i16) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for i in 0..256i16 {
            writer.write_sample(seed.wrapping_mul(31).wrapping_add(i))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// [`silent_wav`] with an ID3v2 tag holding `items`.
pub fn tagged_wav(seed: i16, items: &[(ItemKey, &str)]) -> anyhow::Result<Vec<u8>> {
    with_tag(silent_wav(seed)?, TagType::Id3v2, items, 1024)
}

/// Writes a tag of `tag_type` holding `items` onto `audio` through lofty.
pub fn with_tag(
    audio: Vec<u8>,
    tag_type: TagType,
    items: &[(ItemKey, &str)],
    padding: u32,
) -> anyhow::Result<Vec<u8>> {
    let mut cursor = Cursor::new(audio);

    let mut tag = Tag::new(tag_type);
    for (key, value) in items {
        tag.insert_text(key.clone(), value.to_string());
    }
    cursor.rewind()?;
    tag.save_to(&mut cursor, WriteOptions::new().preferred_padding(padding))?;

    Ok(cursor.into_inner())
}

/// A few silent MPEG-1 Layer III frames (128 kbit/s, 44.1 kHz), no tags.
pub fn mpeg_frames(seed: u8) -> Vec<u8> {
    const FRAME_LEN: usize = 417;
    let mut bytes = Vec::with_capacity(FRAME_LEN * 4);
    for _ in 0..4 {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..4].copy_from_slice(&[0xff, 0xfb, 0x90, 0x64]);
        frame[FRAME_LEN - 1] = seed;
        bytes.extend_from_slice(&frame);
    }
    bytes
}

/// Metadata blocks for [`flac_stream`], after the STREAMINFO block.
pub enum FlacBlock<'a> {
    Comments(&'a [(&'a str, &'a str)]),
    Padding(usize),
    SeekTable,
}

/// A hand-assembled FLAC stream: STREAMINFO, `blocks`, then fake frames.
pub fn flac_stream(seed: u8, blocks: &[FlacBlock]) -> Vec<u8> {
    let mut streaminfo = Vec::with_capacity(34);
    streaminfo.extend_from_slice(&4096u16.to_be_bytes());
    streaminfo.extend_from_slice(&4096u16.to_be_bytes());
    streaminfo.extend_from_slice(&[0; 6]);
    // 44100 Hz, 2 channels, 16 bits, 44100 samples
    let packed: u64 = (44100 << 44) | (1 << 41) | (15 << 36) | 44100;
    streaminfo.extend_from_slice(&packed.to_be_bytes());
    streaminfo.extend_from_slice(&[0; 16]);

    let mut encoded: Vec<(u8, Vec<u8>)> = vec![(0, streaminfo)];
    for block in blocks {
        encoded.push(match block {
            FlacBlock::Comments(comments) => {
                let mut data = Vec::new();
                let vendor = b"mandarin tests";
                data.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
                data.extend_from_slice(vendor);
                data.extend_from_slice(&(comments.len() as u32).to_le_bytes());
                for (key, value) in comments.iter() {
                    let comment = format!("{key}={value}");
                    data.extend_from_slice(&(comment.len() as u32).to_le_bytes());
                    data.extend_from_slice(comment.as_bytes());
                }
                (4, data)
            }
            FlacBlock::Padding(len) => (1, vec![0; *len]),
            FlacBlock::SeekTable => {
                // one placeholder seek point
                let mut data = vec![0xff; 8];
                data.extend_from_slice(&[0; 10]);
                (3, data)
            }
        });
    }

    let mut bytes = b"fLaC".to_vec();
    let last = encoded.len() - 1;
    for (i, (block_type, data)) in encoded.into_iter().enumerate() {
        let flag = if i == last { 0x80 } else { 0 };
        bytes.push(block_type | flag);
        bytes.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
        bytes.extend_from_slice(&data);
    }
    for i in 0..64u8 {
        bytes.extend_from_slice(&[0xff, 0xf8, i, seed]);
    }
    bytes
}

/// `{album: Noise, title: Brownian, artist: Chaos, track: 1, genre: Random, date: 2020}`
pub fn scenario_tags() -> Vec<(ItemKey, &'static str)> {
    vec![
        (ItemKey::AlbumTitle, "Noise"),
        (ItemKey::TrackTitle, "Brownian"),
        (ItemKey::TrackArtist, "Chaos"),
        (ItemKey::TrackNumber, "1"),
        (ItemKey::Genre, "Random"),
        (ItemKey::RecordingDate, "2020"),
    ]
}

pub fn memory_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", true)?;
    schema::init(&conn)?;
    Ok(conn)
}

pub fn count(conn: &Connection, table: &str) -> anyhow::Result<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?)
}
