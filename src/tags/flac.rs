//! FLAC metadata normalisation.
//!
//! Removing tags through lofty keeps (or adds) a PADDING block, so two copies
//! of the same audio could still differ byte-wise. After the tags are gone the
//! metadata section is rebuilt from the blocks that describe the audio alone.

use log::debug;

const MARKER: &[u8; 4] = b"fLaC";
const ID3V2_MARKER: &[u8; 3] = b"ID3";

const LAST_BLOCK: u8 = 0x80;
const BLOCK_TYPE: u8 = 0x7f;

const STREAMINFO: u8 = 0;
const SEEKTABLE: u8 = 3;
const CUESHEET: u8 = 5;

/// Blocks kept by [`strip_metadata`]; padding, application data, comments,
/// pictures and unknown blocks are dropped.
fn describes_audio(block_type: u8) -> bool {
    matches!(block_type, STREAMINFO | SEEKTABLE | CUESHEET)
}

/// Size of a leading ID3v2 tag, header and footer included.
fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 10 || &bytes[..3] != ID3V2_MARKER {
        return None;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(b & 0x7f));
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}

/// Rewrites a FLAC stream keeping only STREAMINFO, SEEKTABLE and CUESHEET
/// blocks, followed by the untouched audio frames.
pub fn strip_metadata(bytes: &[u8]) -> Result<Vec<u8>, &'static str> {
    let start = id3v2_len(bytes).unwrap_or(0);
    let body = bytes.get(start..).ok_or("truncated ID3v2 tag")?;
    if body.get(..4) != Some(MARKER.as_slice()) {
        return Err("missing fLaC marker");
    }

    let mut kept: Vec<&[u8]> = Vec::new();
    let mut pos = 4;
    loop {
        let header = body.get(pos..pos + 4).ok_or("truncated block header")?;
        let block_type = header[0] & BLOCK_TYPE;
        let len = (usize::from(header[1]) << 16)
            | (usize::from(header[2]) << 8)
            | usize::from(header[3]);
        let block = body.get(pos..pos + 4 + len).ok_or("truncated metadata block")?;

        if kept.is_empty() && block_type != STREAMINFO {
            return Err("first block is not STREAMINFO");
        }
        if describes_audio(block_type) {
            kept.push(block);
        } else {
            debug!("dropping FLAC metadata block of type {block_type} ({len} bytes)");
        }

        pos += 4 + len;
        if header[0] & LAST_BLOCK != 0 {
            break;
        }
    }

    let mut out = Vec::with_capacity(body.len());
    out.extend_from_slice(MARKER);
    let last = kept.len() - 1;
    for (i, block) in kept.into_iter().enumerate() {
        let flags = if i == last { LAST_BLOCK } else { 0 };
        out.push((block[0] & BLOCK_TYPE) | flags);
        out.extend_from_slice(&block[1..]);
    }
    out.extend_from_slice(&body[pos..]);
    Ok(out)
}
