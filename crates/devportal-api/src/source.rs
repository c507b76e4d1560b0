// Upload sources
//
// A `FileItem` describes one part of a multipart upload: its name, content
// type and length are known up front, the bytes are only read when the
// encoder reaches that part. `FileSource` is the capability seam between
// raw filesystem paths and managed handles.

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncSeekExt};

use crate::error::Error;

/// MIME type advertised for certificate uploads.
pub const CERTIFICATE_CONTENT_TYPE: &str = "application/x-x509-ca-cert";

/// MIME type advertised for everything else.
pub const OPAQUE_CONTENT_TYPE: &str = "application/octet-stream";

/// Reader handed to the encoder for a single part.
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// How a source reaches its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Opened from a filesystem path at write time.
    RawPath,
    /// A handle the caller already holds (brokered by the host runtime).
    ManagedHandle,
    /// Bytes already in memory.
    Memory,
}

/// A lazily opened byte source for one upload part.
///
/// `open` is called once, when the encoder starts writing the part; the
/// returned reader is dropped as soon as the part is complete or the upload
/// is abandoned.
pub trait FileSource: Send + Sync + fmt::Debug {
    fn kind(&self) -> SourceKind;

    fn open(&self) -> BoxFuture<'_, io::Result<SourceReader>>;
}

/// Source backed by a filesystem path.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
}

impl PathSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for PathSource {
    fn kind(&self) -> SourceKind {
        SourceKind::RawPath
    }

    fn open(&self) -> BoxFuture<'_, io::Result<SourceReader>> {
        Box::pin(async move {
            let file = tokio::fs::File::open(&self.path).await?;
            Ok(Box::new(file) as SourceReader)
        })
    }
}

/// Source backed by an already-open file handle.
///
/// The handle is cloned at open time and rewound, so the same item can be
/// described before the upload and streamed from the start.
///
/// The clone shares the OS file offset with the original handle and with
/// any other clone the caller keeps. Opening this source seeks that shared
/// offset back to 0 and reading advances it, so a caller still holding the
/// file must not read from it or rely on its position while an upload is
/// running, and should seek explicitly afterwards.
#[derive(Debug)]
pub struct HandleSource {
    file: std::fs::File,
}

impl HandleSource {
    pub fn new(file: std::fs::File) -> Self {
        Self { file }
    }
}

impl FileSource for HandleSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ManagedHandle
    }

    fn open(&self) -> BoxFuture<'_, io::Result<SourceReader>> {
        Box::pin(async move {
            let mut file = tokio::fs::File::from_std(self.file.try_clone()?);
            file.seek(SeekFrom::Start(0)).await?;
            Ok(Box::new(file) as SourceReader)
        })
    }
}

/// Source backed by an in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Bytes,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl FileSource for MemorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }

    fn open(&self) -> BoxFuture<'_, io::Result<SourceReader>> {
        let cursor = io::Cursor::new(self.bytes.clone());
        Box::pin(async move { Ok(Box::new(cursor) as SourceReader) })
    }
}

// ── FileItem ────────────────────────────────────────────────────────

/// One file in a multipart upload.
#[derive(Debug)]
pub struct FileItem {
    name: String,
    content_type: &'static str,
    len: u64,
    source: Box<dyn FileSource>,
}

impl FileItem {
    /// Describe an arbitrary source. The content type is inferred from `name`.
    pub fn new(name: impl Into<String>, len: u64, source: impl FileSource + 'static) -> Self {
        let name = name.into();
        Self {
            content_type: content_type_for(&name),
            name,
            len,
            source: Box::new(source),
        }
    }

    /// Describe a file on disk. Only its metadata is read here; the file
    /// itself is opened when the encoder reaches it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let name = file_name(path)?;
        let len = tokio::fs::metadata(path).await?.len();
        Ok(Self::new(name, len, PathSource::new(path)))
    }

    /// Describe a file the caller already holds open.
    pub fn from_handle(name: impl Into<String>, file: std::fs::File) -> Result<Self, Error> {
        let len = file.metadata()?.len();
        Ok(Self::new(name, len, HandleSource::new(file)))
    }

    /// Describe an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        Self::new(name, len, MemorySource::new(bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Declared length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub(crate) fn source(&self) -> &dyn FileSource {
        self.source.as_ref()
    }
}

/// Content type advertised for a part, inferred from the file extension.
pub fn content_type_for(name: &str) -> &'static str {
    let is_certificate = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("cer"));
    if is_certificate {
        CERTIFICATE_CONTENT_TYPE
    } else {
        OPAQUE_CONTENT_TYPE
    }
}

fn file_name(path: &Path) -> Result<String, Error> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path has no file name: {}", path.display()),
            ))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn certificate_extension_is_case_insensitive() {
        assert_eq!(content_type_for("device.cer"), CERTIFICATE_CONTENT_TYPE);
        assert_eq!(content_type_for("DEVICE.CER"), CERTIFICATE_CONTENT_TYPE);
        assert_eq!(content_type_for("map.bin"), OPAQUE_CONTENT_TYPE);
        assert_eq!(content_type_for("cer"), OPAQUE_CONTENT_TYPE);
        assert_eq!(content_type_for("archive.cer.zip"), OPAQUE_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn path_item_reads_metadata_without_opening() {
        let mut tmp = tempfile::Builder::new().suffix(".cer").tempfile().unwrap();
        tmp.write_all(b"-----BEGIN CERTIFICATE-----").unwrap();

        let item = FileItem::from_path(tmp.path()).await.unwrap();

        assert_eq!(item.len(), 27);
        assert_eq!(item.kind(), SourceKind::RawPath);
        assert_eq!(item.content_type(), CERTIFICATE_CONTENT_TYPE);
        assert!(item.name().ends_with(".cer"));
    }

    #[tokio::test]
    async fn missing_path_fails_up_front() {
        let result = FileItem::from_path("/nonexistent/devportal/upload.bin").await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn handle_source_rewinds_before_reading() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"anchor-data").unwrap();

        let item = FileItem::from_handle("anchors.bin", tmp).unwrap();
        assert_eq!(item.len(), 11);
        assert_eq!(item.kind(), SourceKind::ManagedHandle);

        let mut buf = Vec::new();
        item.source().open().await.unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"anchor-data");
    }

    #[tokio::test]
    async fn memory_source_can_be_opened_repeatedly() {
        let item = FileItem::from_bytes("a.bin", &b"0123456789"[..]);

        for _ in 0..2 {
            let mut buf = Vec::new();
            item.source().open().await.unwrap().read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf.len(), 10);
        }
    }

    #[tokio::test]
    async fn handle_source_moves_the_shared_offset() {
        use std::io::{Seek, SeekFrom};

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"anchor-data").unwrap();
        let mut caller = file.try_clone().unwrap();
        caller.seek(SeekFrom::Start(6)).unwrap();

        let source = HandleSource::new(file);
        let mut buf = Vec::new();
        source.open().await.unwrap().read_to_end(&mut buf).await.unwrap();

        assert_eq!(buf, b"anchor-data");
        assert_eq!(caller.stream_position().unwrap(), 11);
    }
}
