use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

const FALLBACK_FILE_NAME: &str = "document.pdf";

/// Where a score's PDF comes from.
///
/// Cloning is cheap: buffers share one allocation, so the viewer only ever
/// holds a reference to the caller's bytes.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentReference {
    /// A file picked or dropped by the user.
    Buffer { bytes: Arc<[u8]>, name: String },
    /// A stored document reachable by location (URL or local path).
    Url { location: String },
}

impl DocumentReference {
    pub fn buffer(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Buffer { bytes: bytes.into(), name: name.into() }
    }

    pub fn url(location: impl Into<String>) -> Self {
        Self::Url { location: location.into() }
    }

    /// Read a local file into a buffer reference named after the file.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::buffer(name, bytes))
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer { .. })
    }

    /// Identity check used to decide whether a reopen or a thumbnail request
    /// is for the document already shown.
    ///
    /// Buffers are the same source only when they share the allocation, two
    /// uploads of identical bytes are distinct documents.
    pub fn same_source(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Url { location: a }, Self::Url { location: b }) => a == b,
            (Self::Buffer { bytes: a, name: na }, Self::Buffer { bytes: b, name: nb }) => {
                Arc::ptr_eq(a, b) && na == nb
            }
            _ => false,
        }
    }

    /// File name used when the document is saved.
    ///
    /// Buffers keep their own name; otherwise the title is used, then
    /// `document.pdf`. A `.pdf` extension is appended when missing.
    pub fn file_name(&self, title: Option<&str>) -> String {
        let own_name = match self {
            Self::Buffer { name, .. } => Some(name.as_str()),
            Self::Url { .. } => None,
        };

        let base = [own_name, title]
            .into_iter()
            .flatten()
            .map(sanitize_file_name)
            .find(|candidate| !candidate.is_empty())
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_owned());

        if base.to_ascii_lowercase().ends_with(".pdf") {
            base
        } else {
            format!("{base}.pdf")
        }
    }

    pub fn describe(&self) -> SourceDescription {
        match self {
            Self::Buffer { bytes, name } => {
                SourceDescription::Buffer { name: name.clone(), size: bytes.len() }
            }
            Self::Url { location } => SourceDescription::Url { location: location.clone() },
        }
    }
}

impl fmt::Debug for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer { bytes, name } => f
                .debug_struct("Buffer")
                .field("name", name)
                .field("len", &bytes.len())
                .finish(),
            Self::Url { location } => f.debug_struct("Url").field("location", location).finish(),
        }
    }
}

/// Serializable summary of a [`DocumentReference`] without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescription {
    Buffer { name: String, size: usize },
    Url { location: String },
}

fn sanitize_file_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_share_identity_only_through_clones() {
        let original = DocumentReference::buffer("etude.pdf", vec![1_u8, 2, 3]);
        let clone = original.clone();
        let copy = DocumentReference::buffer("etude.pdf", vec![1_u8, 2, 3]);

        assert!(original.same_source(&clone));
        assert!(!original.same_source(&copy));
    }

    #[test]
    fn urls_compare_by_location() {
        let a = DocumentReference::url("https://cdn.example/a.pdf");
        assert!(a.same_source(&DocumentReference::url("https://cdn.example/a.pdf")));
        assert!(!a.same_source(&DocumentReference::url("https://cdn.example/b.pdf")));
        assert!(!a.same_source(&DocumentReference::buffer("a.pdf", vec![0_u8])));
    }

    #[test]
    fn file_name_prefers_buffer_name_then_title() {
        let buffer = DocumentReference::buffer("Nocturne Op. 9.pdf", vec![0_u8]);
        assert_eq!(buffer.file_name(Some("ignored")), "Nocturne Op. 9.pdf");

        let url = DocumentReference::url("https://cdn.example/x");
        assert_eq!(url.file_name(Some("Gymnopedie No. 1")), "Gymnopedie No. 1.pdf");
        assert_eq!(url.file_name(Some("  ")), "document.pdf");
        assert_eq!(url.file_name(None), "document.pdf");
    }

    #[test]
    fn file_name_strips_path_separators() {
        let url = DocumentReference::url("x");
        assert_eq!(url.file_name(Some("Bach/Busoni: Chaconne")), "Bach_Busoni_ Chaconne.pdf");
        assert_eq!(url.file_name(Some("SCORE.PDF")), "SCORE.PDF");
    }

    #[test]
    fn from_file_names_buffer_after_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("prelude.pdf");
        fs::write(&path, b"%PDF-1.7").unwrap();

        let reference = DocumentReference::from_file(&path).unwrap();
        assert_eq!(
            reference.describe(),
            SourceDescription::Buffer { name: "prelude.pdf".into(), size: 8 }
        );
    }
}
