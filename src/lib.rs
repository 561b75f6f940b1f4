//! # axum-range-request
//!
//! RFC 7233 range requests for static resources in [`axum`][1].
//!
//! A [`Resource`] describes immutable content: its size, an identity tag, a
//! modification time and a [`ByteSource`] that opens independent seekable
//! handles to it. For every request, [`Resource::serve`] decides between a
//! full body (200), a single range (206), not modified (304) or range not
//! satisfiable (416), and streams the selected bytes without buffering them.
//!
//! Requests resolving to more than one disjoint range are rejected with 416,
//! multipart/byteranges bodies are never produced.
//!
//! [`AsyncSeekStart`] is a trait defined by this crate which only allows
//! seeking from the start of a file. It is automatically implemented for any
//! type implementing [`AsyncSeek`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use axum::extract::State;
//! use axum::response::Response;
//! use axum::routing::get;
//!
//! use axum_range_request::{FileSource, RequestContext, Resource};
//!
//! async fn file(State(resource): State<Arc<Resource<FileSource>>>, request: RequestContext) -> Response {
//!     resource.serve(&request).await
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let resource = Resource::file("test/fixture.txt").await.unwrap();
//!
//!     // build our application with a single route
//!     let _app: Router = Router::new()
//!         .route("/", get(file).post(file))
//!         .with_state(Arc::new(resource));
//!
//!     // run it with hyper on localhost:3000
//!     #[cfg(feature = "run_server_in_example")]
//!     axum::serve(tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap(), _app)
//!        .await
//!        .unwrap();
//! }
//! ```
//!
//! [1]: https://docs.rs/axum

mod conditional;
mod digest;
mod error;
mod range;
mod resource;
mod response;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek};

pub use conditional::{evaluate, Evaluation, RequestContext, Validators};
pub use digest::{compute_tag, TAG_CHUNK_SIZE};
pub use error::RangeError;
pub use range::{merge_ranges, parse_range_header, ByteRange, RangeSet};
pub use resource::{ByteSource, FileSource, Resource, ResourceBuilder};
pub use response::RangedResponse;
pub use stream::{RangedStream, IO_BUFFER_SIZE};

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] that a [`RangedStream`] can serve a range from.
pub trait RangeBody: AsyncRead + AsyncSeekStart {}

impl<T: AsyncRead + AsyncSeekStart> RangeBody for T {}
