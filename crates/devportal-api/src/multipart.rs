// Streaming multipart/form-data encoder
//
// Produces the exact body the portal's upload endpoints parse:
//
//   --<boundary>\r\n
//   Content-Disposition: form-data; name="<name>"; filename="<name>"\r\n
//   Content-Type: <type>\r\n
//   \r\n
//   <file bytes>\r\n
//   ...
//   --<boundary>--\r\n
//
// The boundary is never quoted in the Content-Type header; the portal's
// parser does not accept the quoted form.

use bytes::Bytes;
use futures_util::{Stream, StreamExt, pin_mut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::Error;
use crate::source::FileItem;

/// Read size used when copying a source into the body.
const CHUNK_SIZE: usize = 64 * 1024;

const NEWLINE: &[u8] = b"\r\n";

/// Called with the running byte count after each file has been written.
pub type ProgressFn = Box<dyn FnMut(u64) + Send>;

/// Encoder for one multipart upload request.
///
/// Each encoder gets its own boundary and is consumed by the write, so a
/// boundary is never reused across requests.
#[derive(Debug)]
pub struct MultipartEncoder {
    boundary: String,
    items: Vec<FileItem>,
}

impl MultipartEncoder {
    /// Create an encoder with a fresh random boundary.
    pub fn new(items: Vec<FileItem>) -> Self {
        Self::with_boundary(Uuid::new_v4().to_string(), items)
    }

    /// Create an encoder with a caller-chosen boundary.
    pub fn with_boundary(boundary: impl Into<String>, items: Vec<FileItem>) -> Self {
        Self {
            boundary: boundary.into(),
            items,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn items(&self) -> &[FileItem] {
        &self.items
    }

    /// Value for the request's `Content-Type` header (boundary unquoted).
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact number of bytes [`write_to`](Self::write_to) will produce.
    pub fn compute_length(&self) -> u64 {
        let separator = byte_len(delimiter(&self.boundary).len());
        let newline = byte_len(NEWLINE.len());

        let parts: u64 = self
            .items
            .iter()
            .map(|item| {
                let header = byte_len(part_header(item).len());
                separator + header + item.len() + newline
            })
            .sum();

        parts + byte_len(closing_delimiter(&self.boundary).len())
    }

    /// Stream the body into `sink`, one file at a time.
    ///
    /// Returns the number of bytes written.
    pub async fn write_to<W>(self, sink: &mut W, progress: Option<ProgressFn>) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin,
    {
        let stream = self.into_stream(progress);
        pin_mut!(stream);

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += byte_len(chunk.len());
        }
        sink.flush().await?;
        Ok(written)
    }

    /// The body as a stream of chunks, suitable for a streamed HTTP body.
    ///
    /// Sources are opened when their part starts and dropped when it ends;
    /// dropping the stream mid-upload releases the open source.
    pub fn into_stream(
        self,
        mut progress: Option<ProgressFn>,
    ) -> impl Stream<Item = Result<Bytes, Error>> + Send + 'static {
        let Self { boundary, items } = self;

        async_stream::try_stream! {
            let separator = Bytes::from(delimiter(&boundary));
            let mut written = 0u64;

            for item in items {
                let header = Bytes::from(part_header(&item));
                written += byte_len(separator.len()) + byte_len(header.len());
                yield separator.clone();
                yield header;

                debug!(name = item.name(), len = item.len(), "streaming upload part");
                let reader = item.source().open().await?;
                let mut chunks = ReaderStream::with_capacity(reader, CHUNK_SIZE);
                let mut copied = 0u64;
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    copied += byte_len(chunk.len());
                    ensure_length(&item, copied, false)?;
                    yield chunk;
                }
                drop(chunks);
                ensure_length(&item, copied, true)?;

                written += copied + byte_len(NEWLINE.len());
                yield Bytes::from_static(NEWLINE);

                trace!(written, "upload part complete");
                if let Some(report) = progress.as_mut() {
                    report(written);
                }
            }

            yield Bytes::from(closing_delimiter(&boundary));
        }
    }
}

fn delimiter(boundary: &str) -> String {
    format!("--{boundary}\r\n")
}

fn closing_delimiter(boundary: &str) -> String {
    format!("--{boundary}--\r\n")
}

fn part_header(item: &FileItem) -> String {
    format!(
        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n",
        name = item.name(),
        content_type = item.content_type(),
    )
}

/// A source may never exceed its declared length, and must match it exactly
/// once exhausted.
fn ensure_length(item: &FileItem, copied: u64, exhausted: bool) -> Result<(), Error> {
    let mismatch = if exhausted {
        copied != item.len()
    } else {
        copied > item.len()
    };
    if mismatch {
        return Err(Error::SourceLengthMismatch {
            name: item.name().to_owned(),
            declared: item.len(),
            actual: copied,
        });
    }
    Ok(())
}

fn byte_len(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}
