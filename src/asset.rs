use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::fingerprint;
use crate::provenance::ProvenanceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => f.write_str("image"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    /// Accepts `image` / `video` as well as MIME types such as `image/jpeg`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split('/').next() {
            Some("image") => Ok(MediaKind::Image),
            Some("video") => Ok(MediaKind::Video),
            _ => Err(format!("unsupported media kind: {}", s)),
        }
    }
}

/// Container format sniffed from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
    Mp4,
    Matroska,
    Avi,
}

impl ContainerFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ContainerFormat::Jpeg);
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ContainerFormat::Png);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(ContainerFormat::Gif);
        }
        if bytes.starts_with(b"BM") && bytes.len() >= 14 {
            return Some(ContainerFormat::Bmp);
        }
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" {
            match &bytes[8..12] {
                b"WEBP" => return Some(ContainerFormat::Webp),
                b"AVI " => return Some(ContainerFormat::Avi),
                _ => {}
            }
        }
        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            return Some(ContainerFormat::Mp4);
        }
        if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            return Some(ContainerFormat::Matroska);
        }
        None
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            ContainerFormat::Jpeg
            | ContainerFormat::Png
            | ContainerFormat::Gif
            | ContainerFormat::Bmp
            | ContainerFormat::Webp => MediaKind::Image,
            ContainerFormat::Mp4 | ContainerFormat::Matroska | ContainerFormat::Avi => {
                MediaKind::Video
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "jpg",
            ContainerFormat::Png => "png",
            ContainerFormat::Gif => "gif",
            ContainerFormat::Bmp => "bmp",
            ContainerFormat::Webp => "webp",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Matroska => "mkv",
            ContainerFormat::Avi => "avi",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "image/jpeg",
            ContainerFormat::Png => "image/png",
            ContainerFormat::Gif => "image/gif",
            ContainerFormat::Bmp => "image/bmp",
            ContainerFormat::Webp => "image/webp",
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Matroska => "video/x-matroska",
            ContainerFormat::Avi => "video/x-msvideo",
        }
    }
}

/// Final path component of a client-supplied name; `None` for empty, `.`,
/// `..` and other names that do not denote a file.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw.trim()).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Immutable media asset under verification.
///
/// **Identity**: the SHA-256 content digest, computed once on construction.
/// Bytes are shared behind an `Arc` so every probe reads the same buffer
/// without copying it.
#[derive(Debug, Clone)]
pub struct Asset {
    bytes: Arc<[u8]>,
    kind: MediaKind,
    digest: String,
    name: Option<String>,
    sidecar: Option<ProvenanceRecord>,
}

impl Asset {
    pub fn new(bytes: impl Into<Arc<[u8]>>, kind: MediaKind) -> Self {
        let bytes = bytes.into();
        let digest = fingerprint::content_digest(&bytes);
        Self {
            bytes,
            kind,
            digest,
            name: None,
            sidecar: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a provenance sidecar delivered next to the asset.
    pub fn with_sidecar(mut self, record: ProvenanceRecord) -> Self {
        self.sidecar = Some(record);
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn sidecar(&self) -> Option<&ProvenanceRecord> {
        self.sidecar.as_ref()
    }

    pub fn format(&self) -> Option<ContainerFormat> {
        ContainerFormat::sniff(&self.bytes)
    }

    /// Name to use when the asset leaves the process (uploads, artifacts).
    /// Only the final path component of a supplied name is ever used.
    pub fn file_name(&self) -> String {
        match (self.name.as_deref().and_then(sanitize_file_name), self.format()) {
            (Some(name), _) => name,
            (None, Some(format)) => format!("{}.{}", &self.digest[..16], format.extension()),
            (None, None) => format!("{}.bin", &self.digest[..16]),
        }
    }
}
