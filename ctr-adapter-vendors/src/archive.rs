//! Input files and archive expansion
//!
//! The verifier never unpacks anything itself. Archives and PDF
//! attachments are handed to an [`ArchiveExpander`] supplied by the host;
//! expanded entries are fed back through detection until a pass expands
//! nothing or the pass limit is reached.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::VerifierError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A named, fully read input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBuffer {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileBuffer {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Content as UTF-8 with a leading BOM removed
    pub fn text(&self) -> Option<&str> {
        let bytes = self.bytes.strip_prefix(UTF8_BOM).unwrap_or(&self.bytes);
        std::str::from_utf8(bytes).ok()
    }
}

/// Containers recognised by their magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Gzip,
    Bzip2,
    Tar,
    Pdf,
}

/// Sniff container magic bytes
pub fn sniff_archive(bytes: &[u8]) -> Option<ArchiveKind> {
    match bytes {
        [0x50, 0x4B, 0x03, 0x04, ..] | [0x50, 0x4B, 0x05, 0x06, ..] | [0x50, 0x4B, 0x07, 0x08, ..] => {
            Some(ArchiveKind::Zip)
        }
        [0x1F, 0x8B, ..] => Some(ArchiveKind::Gzip),
        [b'B', b'Z', b'h', ..] => Some(ArchiveKind::Bzip2),
        [b'%', b'P', b'D', b'F', b'-', ..] => Some(ArchiveKind::Pdf),
        _ if bytes.len() > 262 && &bytes[257..262] == b"ustar" => Some(ArchiveKind::Tar),
        _ => None,
    }
}

/// Host-side unpacking of archives and PDF attachments
#[async_trait]
pub trait ArchiveExpander: Send + Sync {
    async fn expand(&self, file: &FileBuffer, kind: ArchiveKind) -> Result<Vec<FileBuffer>, VerifierError>;
}

/// Expander for hosts without archive support: every archive fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchiveExpander;

#[async_trait]
impl ArchiveExpander for NoArchiveExpander {
    async fn expand(&self, file: &FileBuffer, kind: ArchiveKind) -> Result<Vec<FileBuffer>, VerifierError> {
        Err(VerifierError::Archive {
            name: file.name.clone(),
            reason: format!("no expander for {:?}", kind),
        })
    }
}

/// Result of the expansion loop
#[derive(Debug, Default)]
pub struct Expansion {
    /// Plain files, plus archives left over when the pass limit was hit
    pub files: Vec<FileBuffer>,
    /// Archives the expander rejected
    pub failures: Vec<(String, VerifierError)>,
    pub passes: usize,
}

/// Expand archives until a pass expands nothing, at most `max_passes` times
pub async fn expand_archives(
    files: Vec<FileBuffer>,
    expander: &dyn ArchiveExpander,
    max_passes: usize,
) -> Expansion {
    let mut expansion = Expansion {
        files,
        ..Default::default()
    };

    while expansion.passes < max_passes {
        let (archives, plain): (Vec<_>, Vec<_>) = std::mem::take(&mut expansion.files)
            .into_iter()
            .partition(|f| sniff_archive(&f.bytes).is_some());
        expansion.files = plain;
        if archives.is_empty() {
            break;
        }
        expansion.passes += 1;

        let mut expanded = 0;
        for archive in archives {
            let Some(kind) = sniff_archive(&archive.bytes) else {
                continue;
            };
            match expander.expand(&archive, kind).await {
                Ok(entries) => {
                    debug!(
                        "Archive: {} ({:?}) -> {} entries",
                        archive.name,
                        kind,
                        entries.len()
                    );
                    expanded += entries.len();
                    expansion.files.extend(entries);
                }
                Err(e) => {
                    warn!("Archive: {}", e);
                    expansion.failures.push((archive.name, e));
                }
            }
        }
        if expanded == 0 {
            break;
        }
    }
    expansion
}
