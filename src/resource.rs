use std::future::{self, Future};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::ContentRange;
use axum_extra::TypedHeader;
use bytes::Bytes;
use mime_guess::Mime;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tracing::{debug, warn};

use crate::conditional::{evaluate, Evaluation, RequestContext, Validators};
use crate::digest::compute_tag;
use crate::response::RangedResponse;
use crate::stream::{RangedStream, IO_BUFFER_SIZE};
use crate::RangeError;

/// Something that can hand out independent, seekable handles to the same bytes.
///
/// Every call to [`ByteSource::open`] must return a handle with its own
/// cursor, so concurrent responses never share a read position.
pub trait ByteSource: Send + Sync + 'static {
    type Body: AsyncRead + AsyncSeek + Unpin + Send + 'static;

    fn open(&self) -> impl Future<Output = io::Result<Self::Body>> + Send;
}

/// A file on disk, reopened for every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    type Body = tokio::fs::File;

    fn open(&self) -> impl Future<Output = io::Result<tokio::fs::File>> + Send {
        let path = self.path.clone();
        async move { tokio::fs::File::open(path).await }
    }
}

impl ByteSource for Bytes {
    type Body = io::Cursor<Bytes>;

    fn open(&self) -> impl Future<Output = io::Result<io::Cursor<Bytes>>> + Send {
        future::ready(Ok(io::Cursor::new(self.clone())))
    }
}

/// An immutable resource served with range and conditional request support.
///
/// Built once, then shared by every request for it.
#[derive(Debug, Clone)]
pub struct Resource<S> {
    source: S,
    byte_size: u64,
    etag: String,
    etag_header: HeaderValue,
    last_modified: SystemTime,
    content_type: Option<Mime>,
    chunk_size: usize,
}

impl<S: ByteSource> Resource<S> {
    /// Construct a [`Resource`] with every validator supplied manually.
    pub fn new(source: S, byte_size: u64, etag: impl Into<String>, last_modified: SystemTime) -> Result<Self, RangeError> {
        let etag = etag.into();
        let etag_header = validate(byte_size, &etag)?;
        Ok(Resource {
            source,
            byte_size,
            etag,
            etag_header,
            last_modified,
            content_type: None,
            chunk_size: IO_BUFFER_SIZE,
        })
    }

    /// Start building a [`Resource`], computing whatever is not supplied.
    pub fn builder(source: S) -> ResourceBuilder<S> {
        ResourceBuilder {
            source,
            byte_size: None,
            etag: None,
            last_modified: None,
            content_type: None,
            chunk_size: IO_BUFFER_SIZE,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The total size of the resource in bytes, never zero.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// The identity tag, sent as `ETag` and matched against `If-Range`.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub(crate) fn etag_header(&self) -> &HeaderValue {
        &self.etag_header
    }

    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    /// Decides status and range for `request` without touching the source.
    pub fn evaluate(&self, request: &RequestContext) -> Result<Evaluation, RangeError> {
        evaluate(request, Validators {
            size: self.byte_size,
            etag: &self.etag,
            last_modified: self.last_modified,
        })
    }

    /// Evaluates `request` and builds the response for it. A source handle is
    /// only opened when the response carries a body.
    pub async fn respond(&self, request: &RequestContext) -> Result<RangedResponse<S::Body>, RangeError> {
        let evaluation = self.evaluate(request)?;

        let stream = if evaluation.status.is_success() {
            let body = self.source.open().await?;
            Some(RangedStream::new(body, evaluation.range.start, evaluation.range.len(), self.chunk_size))
        } else {
            None
        };

        Ok(RangedResponse::new(evaluation, self, stream))
    }

    /// Like [`Resource::respond`], with errors already turned into responses:
    /// 416 with `Content-Range: bytes */{size}` for unsatisfiable ranges and
    /// 500 when the source cannot be opened.
    pub async fn serve(&self, request: &RequestContext) -> Response {
        match self.respond(request).await {
            Ok(response) => response.into_response(),
            Err(err) if err.is_unsatisfiable() => {
                debug!(%err, "range not satisfiable");
                let content_range = ContentRange::unsatisfied_bytes(self.byte_size);
                (err.status(), TypedHeader(content_range)).into_response()
            }
            Err(err) => {
                warn!(%err, "failed to serve resource");
                err.into_response()
            }
        }
    }
}

impl Resource<FileSource> {
    /// Reads size and modification time from file metadata, guesses the
    /// content type from the extension and hashes the content for its tag.
    pub async fn file(path: impl Into<PathBuf>) -> Result<Self, RangeError> {
        let source = FileSource::new(path);
        let metadata = tokio::fs::metadata(source.path()).await?;
        let content_type = mime_guess::from_path(source.path()).first();

        let mut builder = Resource::builder(source).size(metadata.len());
        if let Ok(modified) = metadata.modified() {
            builder = builder.last_modified(modified);
        }
        if let Some(content_type) = content_type {
            builder = builder.content_type(content_type);
        }
        builder.build().await
    }
}

fn validate(byte_size: u64, etag: &str) -> Result<HeaderValue, RangeError> {
    if byte_size == 0 {
        return Err(RangeError::EmptyResource);
    }
    HeaderValue::from_str(etag).map_err(|_| RangeError::InvalidIdentityTag(etag.to_string()))
}

/// Builder for [`Resource`], see [`Resource::builder`].
#[derive(Debug)]
pub struct ResourceBuilder<S> {
    source: S,
    byte_size: Option<u64>,
    etag: Option<String>,
    last_modified: Option<SystemTime>,
    content_type: Option<Mime>,
    chunk_size: usize,
}

impl<S: ByteSource> ResourceBuilder<S> {
    /// Known size in bytes. Otherwise found by seeking to the end of the source.
    pub fn size(mut self, byte_size: u64) -> Self {
        self.byte_size = Some(byte_size);
        self
    }

    /// Known identity tag. Otherwise a SHA-256 tag is computed from the content.
    pub fn etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Known modification time. Otherwise the time [`ResourceBuilder::build`] runs.
    pub fn last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn content_type(mut self, content_type: Mime) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Maximum number of bytes per streamed body chunk.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn build(self) -> Result<Resource<S>, RangeError> {
        let byte_size = match self.byte_size {
            Some(byte_size) => byte_size,
            None => {
                let mut body = self.source.open().await?;
                body.seek(io::SeekFrom::End(0)).await?
            }
        };

        let etag = match self.etag {
            Some(etag) => etag,
            None => {
                let mut body = self.source.open().await?;
                compute_tag(&mut body).await?
            }
        };

        let etag_header = validate(byte_size, &etag)?;
        let last_modified = self.last_modified.unwrap_or_else(SystemTime::now);
        debug!(byte_size, %etag, "registered resource");

        Ok(Resource {
            source: self.source,
            byte_size,
            etag,
            etag_header,
            last_modified,
            content_type: self.content_type,
            chunk_size: self.chunk_size,
        })
    }
}
