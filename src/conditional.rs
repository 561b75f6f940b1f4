use std::convert::Infallible;
use std::iter;
use std::time::SystemTime;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum_extra::headers::{Header, IfUnmodifiedSince};
use tracing::{debug, warn};

use crate::range::{merge_ranges, parse_range_header, ByteRange};
use crate::RangeError;

/// The parts of an incoming request that decide what a range response looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: Method,
    pub range: Option<String>,
    pub if_range: Option<String>,
    pub if_unmodified_since: Option<String>,
}

impl RequestContext {
    /// A request without any range or conditional headers.
    pub fn new(method: Method) -> Self {
        RequestContext {
            method,
            range: None,
            if_range: None,
            if_unmodified_since: None,
        }
    }

    pub fn from_parts(method: &Method, headers: &HeaderMap) -> Self {
        RequestContext {
            method: method.clone(),
            range: header_string(headers, header::RANGE),
            if_range: header_string(headers, header::IF_RANGE),
            if_unmodified_since: header_string(headers, header::IF_UNMODIFIED_SINCE),
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_if_range(mut self, if_range: impl Into<String>) -> Self {
        self.if_range = Some(if_range.into());
        self
    }

    pub fn with_if_unmodified_since(mut self, date: impl Into<String>) -> Self {
        self.if_unmodified_since = Some(date.into());
        self
    }

    fn unmodified_since(&self) -> Option<SystemTime> {
        let raw = self.if_unmodified_since.as_deref()?;
        let value = HeaderValue::from_str(raw).ok()?;
        match IfUnmodifiedSince::decode(&mut iter::once(&value)) {
            Ok(date) => Some(date.into()),
            Err(_) => {
                warn!(header = raw, "ignoring unparseable If-Unmodified-Since");
                None
            }
        }
    }
}

// non-UTF-8 bytes are kept lossily so a garbage Range header still fails parsing
fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::from_parts(&parts.method, &parts.headers))
    }
}

/// Outcome of [`evaluate`]: the status to answer with and the one range it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub status: StatusCode,
    pub range: ByteRange,
}

/// Validators of the resource a request is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Validators<'a> {
    pub size: u64,
    pub etag: &'a str,
    pub last_modified: SystemTime,
}

/// Decides status and range for `request`. Rules apply in this order:
///
/// 1. methods other than GET ignore `Range` and get the whole resource with 200;
/// 2. the `Range` header is parsed and merged, malformed headers fail;
/// 3. a merged set equal to the whole resource is 200, anything else 206;
/// 4. a `Range` with an `If-Range` that differs from the identity tag falls
///    back to the whole resource with 200;
/// 5. more than one disjoint range fails, multipart is not supported;
/// 6. an `If-Unmodified-Since` strictly before the last modification turns
///    the status into 304, whatever was decided above.
pub fn evaluate(request: &RequestContext, resource: Validators<'_>) -> Result<Evaluation, RangeError> {
    if resource.size == 0 {
        return Err(RangeError::EmptyResource);
    }
    let full = ByteRange::full(resource.size);

    let (mut status, ranges) = if request.method != Method::GET {
        debug!(method = %request.method, "range headers ignored for non-GET request");
        (StatusCode::OK, vec![full])
    } else {
        let merged = merge_ranges(parse_range_header(request.range.as_deref(), resource.size)?);
        let status = if merged.is_full(resource.size) {
            StatusCode::OK
        } else {
            StatusCode::PARTIAL_CONTENT
        };

        match (&request.range, &request.if_range) {
            (Some(_), Some(if_range)) if if_range != resource.etag => {
                debug!(%if_range, "If-Range does not match, serving full resource");
                (StatusCode::OK, vec![full])
            }
            _ => (status, merged.into_vec()),
        }
    };

    let range = match ranges.as_slice() {
        [range] => *range,
        _ => {
            warn!(count = ranges.len(), "rejecting multi-range request");
            return Err(RangeError::UnsupportedMultiRange(ranges.len()));
        }
    };

    if let Some(since) = request.unmodified_since() {
        if since < resource.last_modified {
            debug!("resource modified after If-Unmodified-Since");
            status = StatusCode::NOT_MODIFIED;
        }
    }

    debug!(%status, %range, "evaluated range request");
    Ok(Evaluation { status, range })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use assert_matches::assert_matches;
    use axum::http::Request;
    use axum_extra::headers::{HeaderMapExt, LastModified};

    use super::*;

    const ETAG: &str = "\"sha256:abc\"";

    fn last_modified() -> SystemTime {
        UNIX_EPOCH + Duration::new(1_700_000_000, 250_000_000)
    }

    fn validators() -> Validators<'static> {
        Validators { size: 500, etag: ETAG, last_modified: last_modified() }
    }

    fn get(range: &str) -> RequestContext {
        RequestContext::new(Method::GET).with_range(range)
    }

    fn http_date(time: SystemTime) -> String {
        let mut headers = HeaderMap::new();
        headers.typed_insert(LastModified::from(time));
        headers[header::LAST_MODIFIED].to_str().unwrap().to_string()
    }

    #[test]
    fn test_no_range_is_full() {
        let eval = evaluate(&RequestContext::new(Method::GET), validators()).unwrap();
        assert_eq!(Evaluation { status: StatusCode::OK, range: ByteRange::new(0, 499) }, eval);
    }

    #[test]
    fn test_single_range_is_partial() {
        let eval = evaluate(&get("bytes=100-199"), validators()).unwrap();
        assert_eq!(Evaluation { status: StatusCode::PARTIAL_CONTENT, range: ByteRange::new(100, 199) }, eval);
    }

    #[test]
    fn test_range_covering_everything_is_ok() {
        for header in ["bytes=0-", "bytes=0-499", "bytes=0-999", "bytes=-500", "bytes=0-99,100-499"] {
            let eval = evaluate(&get(header), validators()).unwrap();
            assert_eq!(StatusCode::OK, eval.status, "{header}");
            assert_eq!(ByteRange::new(0, 499), eval.range);
        }
    }

    #[test]
    fn test_post_ignores_range() {
        let request = RequestContext::new(Method::POST).with_range("bytes=39-50");
        let eval = evaluate(&request, validators()).unwrap();
        assert_eq!(Evaluation { status: StatusCode::OK, range: ByteRange::new(0, 499) }, eval);

        // even a malformed one
        let request = RequestContext::new(Method::HEAD).with_range("bytes=oops");
        assert_eq!(StatusCode::OK, evaluate(&request, validators()).unwrap().status);
    }

    #[test]
    fn test_mismatched_if_range_serves_everything() {
        let request = get("bytes=10-100").with_if_range("mismatched etag");
        let eval = evaluate(&request, validators()).unwrap();
        assert_eq!(Evaluation { status: StatusCode::OK, range: ByteRange::new(0, 499) }, eval);
    }

    #[test]
    fn test_matching_if_range_serves_partial() {
        let request = get("bytes=10-100").with_if_range(ETAG);
        let eval = evaluate(&request, validators()).unwrap();
        assert_eq!(Evaluation { status: StatusCode::PARTIAL_CONTENT, range: ByteRange::new(10, 100) }, eval);
    }

    #[test]
    fn test_if_range_without_range_is_ignored() {
        let request = RequestContext::new(Method::GET).with_if_range("something else");
        assert_eq!(StatusCode::OK, evaluate(&request, validators()).unwrap().status);
    }

    #[test]
    fn test_mismatched_if_range_hides_multi_range() {
        let request = get("bytes=0-99,101-199").with_if_range("stale");
        let eval = evaluate(&request, validators()).unwrap();
        assert_eq!(StatusCode::OK, eval.status);
        assert_eq!(ByteRange::new(0, 499), eval.range);
    }

    #[test]
    fn test_malformed_range_fails_before_if_range() {
        let request = get("bytes=200-100").with_if_range("stale");
        assert_matches!(evaluate(&request, validators()), Err(RangeError::MalformedRangeHeader(_)));
    }

    #[test]
    fn test_multi_range_is_rejected() {
        assert_matches!(evaluate(&get("bytes=0-99,101-199"), validators()), Err(RangeError::UnsupportedMultiRange(2)));
        assert_matches!(evaluate(&get("bytes=0-0,-1"), validators()), Err(RangeError::UnsupportedMultiRange(2)));
    }

    #[test]
    fn test_adjacent_ranges_are_merged() {
        let eval = evaluate(&get("bytes=0-99,100-199"), validators()).unwrap();
        assert_eq!(Evaluation { status: StatusCode::PARTIAL_CONTENT, range: ByteRange::new(0, 199) }, eval);
    }

    #[test]
    fn test_if_unmodified_since_own_last_modified() {
        let request = RequestContext::new(Method::GET).with_if_unmodified_since(http_date(last_modified()));
        assert_eq!(StatusCode::NOT_MODIFIED, evaluate(&request, validators()).unwrap().status);
    }

    #[test]
    fn test_if_unmodified_since_overrides_partial() {
        let request = get("bytes=0-9").with_if_unmodified_since("Sun, 06 Nov 1994 08:49:37 GMT");
        let eval = evaluate(&request, validators()).unwrap();
        assert_eq!(Evaluation { status: StatusCode::NOT_MODIFIED, range: ByteRange::new(0, 9) }, eval);
    }

    #[test]
    fn test_if_unmodified_since_applies_to_post() {
        let request = RequestContext::new(Method::POST).with_if_unmodified_since("Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(StatusCode::NOT_MODIFIED, evaluate(&request, validators()).unwrap().status);
    }

    #[test]
    fn test_if_unmodified_since_later_date() {
        let later = last_modified() + Duration::from_secs(60);
        let request = get("bytes=0-9").with_if_unmodified_since(http_date(later));
        assert_eq!(StatusCode::PARTIAL_CONTENT, evaluate(&request, validators()).unwrap().status);
    }

    #[test]
    fn test_unparseable_if_unmodified_since_is_ignored() {
        let request = RequestContext::new(Method::GET).with_if_unmodified_since("yesterday-ish");
        assert_eq!(StatusCode::OK, evaluate(&request, validators()).unwrap().status);
    }

    #[test]
    fn test_multi_range_rejected_before_if_unmodified_since() {
        let request = get("bytes=0-9,20-29").with_if_unmodified_since("Sun, 06 Nov 1994 08:49:37 GMT");
        assert_matches!(evaluate(&request, validators()), Err(RangeError::UnsupportedMultiRange(2)));
    }

    #[test]
    fn test_empty_resource() {
        let validators = Validators { size: 0, ..validators() };
        assert_matches!(evaluate(&RequestContext::new(Method::GET), validators), Err(RangeError::EmptyResource));
    }

    #[test]
    fn test_from_parts() {
        let request = Request::builder()
            .method(Method::GET)
            .header("Range", "bytes=0-9")
            .header("If-Range", ETAG)
            .header("If-Unmodified-Since", "Sun, 06 Nov 1994 08:49:37 GMT")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();

        let context = RequestContext::from_parts(&parts.method, &parts.headers);
        let expected = get("bytes=0-9")
            .with_if_range(ETAG)
            .with_if_unmodified_since("Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(expected, context);
    }

    #[tokio::test]
    async fn test_extractor() {
        let request = Request::builder()
            .method(Method::POST)
            .header("Range", "bytes=1-")
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();

        let context = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(RequestContext::new(Method::POST).with_range("bytes=1-"), context);
    }
}
