//! Content sniffing for downloaded artifacts.
//!
//! Expired or redirected release links tend to answer with an HTML page and
//! a 200 status, so an artifact is only trusted once its leading bytes have
//! been looked at.

use std::{fs::File, io::Read, path::Path};

use crate::error::Result;

const SNIFF_LEN: usize = 512;
const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Text,
    Hdf5,
    Binary,
}

impl ContentKind {
    pub fn mime(self) -> &'static str {
        match self {
            ContentKind::Html => "text/html",
            ContentKind::Text => "text/plain",
            ContentKind::Hdf5 => "application/x-hdf5",
            ContentKind::Binary => "application/octet-stream",
        }
    }
}

pub fn sniff_file(path: &Path) -> Result<ContentKind> {
    let mut f = File::open(path)?;
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    f.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut buf)?;
    Ok(sniff_bytes(&buf))
}

pub fn sniff_bytes(bytes: &[u8]) -> ContentKind {
    if bytes.starts_with(HDF5_MAGIC) {
        return ContentKind::Hdf5;
    }
    if bytes.is_empty() || bytes.contains(&0) {
        return ContentKind::Binary;
    }

    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let Ok(text) = std::str::from_utf8(body) else {
        // Truncated multi-byte sequence at the sniff boundary is still text.
        return match std::str::from_utf8(&body[..body.len().saturating_sub(3)]) {
            Ok(t) => classify_text(t),
            Err(_) => ContentKind::Binary,
        };
    };
    classify_text(text)
}

fn classify_text(text: &str) -> ContentKind {
    let head = text.trim_start().to_ascii_lowercase();
    let html_openers = ["<!doctype html", "<html", "<head", "<body", "<title"];
    if html_openers.iter().any(|p| head.starts_with(p)) {
        return ContentKind::Html;
    }
    if head.starts_with("<?xml") && head.contains("<html") {
        return ContentKind::Html;
    }
    if head.chars().all(|c| !c.is_control() || c.is_ascii_whitespace()) {
        return ContentKind::Text;
    }
    ContentKind::Binary
}
