//! 🫁 codec.rs — gzip in, gzip out, and a sniff test in between.
//!
//! Fragments are *usually* gzipped. Usually. Somebody, somewhere, will upload a plain
//! text file into the log bucket, so decoding sniffs the magic bytes instead of trusting
//! the `.gz` suffix. Bundles are always gzipped, exactly once, at flush time.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

// -- 🔮 RFC 1952: every gzip member starts with 0x1f 0x8b. every. single. one.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 🔍 Does this look like gzip?
pub(crate) fn is_gzip(raw: &[u8]) -> bool {
    raw.starts_with(&GZIP_MAGIC)
}

/// 📥 Decode an object's stored bytes into its content.
///
/// Gzip payloads are fully inflated, including concatenated multi-member streams
/// (`cat a.gz b.gz > c.gz` is a valid gzip file, and log shippers love doing it).
/// Anything else passes through untouched.
pub(crate) fn decode(raw: Vec<u8>) -> Result<Vec<u8>> {
    if !is_gzip(&raw) {
        return Ok(raw);
    }
    // -- 📏 guess 4x expansion; text logs usually do better, the Vec will cope either way
    let mut content = Vec::with_capacity(raw.len().saturating_mul(4));
    MultiGzDecoder::new(raw.as_slice())
        .read_to_end(&mut content)
        .context("💀 gzip stream is corrupt or truncated")?;
    Ok(content)
}

/// 📤 Gzip a frozen bundle.
pub(crate) fn encode(content: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(content.len() / 4), Compression::default());
    encoder
        .write_all(content)
        .context("💀 failed to feed the gzip encoder")?;
    encoder.finish().context("💀 failed to finish the gzip stream")
}
