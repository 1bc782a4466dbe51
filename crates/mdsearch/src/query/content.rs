//! Case-insensitive file content matching for backends without a text index.
//!
//! Reads the file in fixed-size chunks, decodes each chunk as UTF-8 (lossily),
//! lowercases it with Unicode rules and runs a Rabin-Karp search from
//! `memchr`. The last `needle chars - 1` characters of each chunk are carried
//! into the next one so matches that straddle a boundary are still found,
//! along with any multi-byte sequence cut off by the read.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use memchr::arch::all::rabinkarp;

use crate::cancel::CancellationToken;

/// Bytes read per chunk, not counting the carried overlap.
pub const CONTENT_BUFFER_BYTES: usize = 64 * 1024;

/// Files larger than this are never scanned.
pub const MAX_CONTENT_BYTES: u64 = 32 * 1024 * 1024;

const MAX_UTF8_WIDTH: usize = 4;

/// Searches file contents for `needle`, ignoring case.
///
/// Unreadable files, oversized files and an empty needle count as a miss.
/// Returns `None` only when `token` was cancelled mid-scan.
pub fn file_content_matches(
    path: &Path,
    needle: &str,
    token: &CancellationToken,
) -> Option<bool> {
    token.is_cancelled()?;

    if needle.is_empty() {
        return Some(false);
    }

    let Ok(mut file) = File::open(path) else {
        return Some(false);
    };
    match file.metadata() {
        Ok(metadata) if metadata.is_file() && metadata.len() <= MAX_CONTENT_BYTES => {}
        _ => return Some(false),
    }

    let needle = needle.to_lowercase();
    // Lowercasing never merges characters, so a match spans at most this many
    // source characters.
    let overlap_chars = needle.chars().count().saturating_sub(1);
    let max_carry = overlap_chars * MAX_UTF8_WIDTH + MAX_UTF8_WIDTH - 1;
    let finder = rabinkarp::Finder::new(needle.as_bytes());

    let mut buffer = vec![0u8; CONTENT_BUFFER_BYTES + max_carry];
    let mut carry_len = 0usize;

    loop {
        token.is_cancelled()?;

        let Ok(read) = file.read(&mut buffer[carry_len..]) else {
            return Some(false);
        };
        if read == 0 {
            break;
        }

        let chunk_len = carry_len + read;
        let complete = complete_prefix_len(&buffer[..chunk_len]);
        let folded = String::from_utf8_lossy(&buffer[..complete]).to_lowercase();
        if finder.find(folded.as_bytes(), needle.as_bytes()).is_some() {
            return Some(true);
        }

        let keep_from = overlap_start(&buffer[..complete], overlap_chars);
        buffer.copy_within(keep_from..chunk_len, 0);
        carry_len = chunk_len - keep_from;
    }

    Some(false)
}

/// Length of `bytes` without a trailing, truncated UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(MAX_UTF8_WIDTH - 1) {
        let byte = bytes[bytes.len() - back];
        if is_continuation(byte) {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back {
            bytes.len() - back
        } else {
            bytes.len()
        };
    }
    bytes.len()
}

/// Byte offset where the last `chars` characters of `bytes` begin.
fn overlap_start(bytes: &[u8], chars: usize) -> usize {
    let floor = bytes.len().saturating_sub(chars * MAX_UTF8_WIDTH);
    let mut start = bytes.len();
    let mut seen = 0;
    while seen < chars && start > floor {
        start -= 1;
        if !is_continuation(bytes[start]) {
            seen += 1;
        }
    }
    start
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}
