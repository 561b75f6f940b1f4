use std::pin::Pin;
use std::task::{Context, Poll};
use std::{fmt, io, mem};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::ReadBuf;
use tracing::trace;

use crate::RangeBody;

/// Default number of bytes read from the source per chunk.
pub const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body stream over one byte range of a source. Implements
/// [`Stream`], [`Body`], and [`IntoResponse`].
///
/// The stream owns its source handle, which is released as soon as the
/// stream is dropped, whether or not it was read to the end.
#[pin_project]
pub struct RangedStream<B> {
    state: StreamState,
    remaining: u64,
    chunk_size: usize,
    #[pin]
    body: B,
}

impl<B: RangeBody + Send + 'static> RangedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64, chunk_size: usize) -> Self {
        RangedStream {
            state: StreamState::Seek { start },
            remaining: length,
            chunk_size: chunk_size.max(1),
            body,
        }
    }
}

impl<B> fmt::Debug for RangedStream<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("remaining", &self.remaining)
            .finish()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking,
    Reading { buffer: BytesMut },
    Done,
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            match this.state {
                StreamState::Seek { start } => {
                    let start = *start;
                    if let Err(e) = this.body.as_mut().start_seek(start) {
                        *this.state = StreamState::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    *this.state = StreamState::Seeking;
                }

                StreamState::Seeking => {
                    match this.body.as_mut().poll_complete(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            *this.state = StreamState::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Ready(Ok(())) => {
                            let buffer = allocate_buffer(*this.chunk_size);
                            *this.state = StreamState::Reading { buffer };
                        }
                    }
                }

                StreamState::Reading { buffer } => {
                    if *this.remaining == 0 {
                        *this.state = StreamState::Done;
                        continue;
                    }

                    let uninit = buffer.spare_capacity_mut();

                    // read at most the smaller of the buffer size and the
                    // number of bytes remaining in the range
                    let nbytes = std::cmp::min(
                        uninit.len(),
                        usize::try_from(*this.remaining).unwrap_or(usize::MAX),
                    );

                    let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

                    let filled = match this.body.as_mut().poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            *this.state = StreamState::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Ready(Ok(())) => read_buf.filled().len(),
                    };

                    if filled == 0 {
                        let missing = *this.remaining;
                        *this.state = StreamState::Done;
                        return Poll::Ready(Some(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("source ended with {missing} bytes of the range unread"),
                        ))));
                    }

                    // SAFETY: poll_read has filled the buffer with `filled`
                    // additional bytes. `buffer.len` should always be 0 here,
                    // but include it for rigorous correctness
                    unsafe { buffer.set_len(buffer.len() + filled); }

                    let chunk = mem::replace(buffer, allocate_buffer(*this.chunk_size));

                    // filled <= nbytes <= remaining, so this cannot underflow
                    *this.remaining -= filled as u64;
                    trace!(len = filled, remaining = *this.remaining, "streamed chunk");

                    return Poll::Ready(Some(Ok(chunk.freeze())));
                }

                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

fn allocate_buffer(chunk_size: usize) -> BytesMut {
    BytesMut::with_capacity(chunk_size)
}
