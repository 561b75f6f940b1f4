use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, ContentType, HeaderMapExt, LastModified};

use crate::conditional::Evaluation;
use crate::resource::{ByteSource, Resource};
use crate::stream::RangedStream;
use crate::RangeBody;

/// Data type containing the computed status, headers and body of a range
/// response. Implements [`IntoResponse`].
///
/// Every response carries `Accept-Ranges`, `ETag`, `Last-Modified` and a
/// `Content-Length` equal to the length of the selected range. That includes
/// 304, which has no body. 206 adds `Content-Range`.
#[derive(Debug)]
pub struct RangedResponse<B> {
    status: StatusCode,
    headers: HeaderMap,
    stream: Option<RangedStream<B>>,
}

impl<B> RangedResponse<B> {
    pub(crate) fn new<S: ByteSource>(
        evaluation: Evaluation,
        resource: &Resource<S>,
        stream: Option<RangedStream<B>>,
    ) -> Self {
        let Evaluation { status, range } = evaluation;

        let mut headers = HeaderMap::new();
        headers.typed_insert(AcceptRanges::bytes());
        headers.insert(header::ETAG, resource.etag_header().clone());
        headers.typed_insert(LastModified::from(resource.last_modified()));
        headers.typed_insert(ContentLength(range.len()));

        if status == StatusCode::PARTIAL_CONTENT {
            let content_range = ContentRange::bytes(range.start..=range.end, resource.byte_size())
                .expect("evaluated range always lies within the resource");
            headers.typed_insert(content_range);
        }

        if stream.is_some() {
            if let Some(content_type) = resource.content_type() {
                headers.typed_insert(ContentType::from(content_type.clone()));
            }
        }

        RangedResponse { status, headers, stream }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body stream, absent for 304.
    pub fn into_stream(self) -> Option<RangedStream<B>> {
        self.stream
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Option<RangedStream<B>>) {
        (self.status, self.headers, self.stream)
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        match self.stream {
            Some(stream) => (self.status, self.headers, stream).into_response(),
            None => (self.status, self.headers).into_response(),
        }
    }
}
