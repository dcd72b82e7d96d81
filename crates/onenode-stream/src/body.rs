//! Response body streams and exclusive readers.
//!
//! A [`ResponseBody`] owns a type-erased stream of byte chunks. Chunks are
//! pulled through a [`BodyReader`], which holds `&mut ResponseBody` for its
//! whole lifetime: at most one reader exists per body, and it is released
//! when dropped, whatever path the consumer leaves by.

use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use hyper::body::{Body as _, Incoming};
use tracing::trace;

use crate::StreamError;

/// A type-erased, fallible async stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Body of a live response.
pub struct ResponseBody {
    stream: ByteStream,
    exhausted: bool,
}

impl ResponseBody {
    /// Wrap an arbitrary chunk stream.
    pub fn from_stream(
        stream: impl Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    ) -> Self {
        Self {
            stream: Box::pin(stream),
            exhausted: false,
        }
    }

    pub(crate) fn from_incoming(incoming: Incoming) -> Self {
        Self::from_stream(IncomingStream(incoming))
    }

    /// Take the exclusive reader for this body.
    pub fn reader(&mut self) -> BodyReader<'_> {
        trace!("body reader acquired");
        BodyReader { body: self }
    }

    /// Whether the underlying stream has signalled its end.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Read the rest of the body into one buffer.
    pub async fn into_bytes(mut self) -> Result<Bytes, StreamError> {
        let mut buf = BytesMut::new();
        let mut reader = self.reader();
        while let Some(chunk) = reader.read().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

/// Exclusive read access to a [`ResponseBody`].
pub struct BodyReader<'a> {
    body: &'a mut ResponseBody,
}

impl BodyReader<'_> {
    /// Pull the next chunk. `Ok(None)` once the stream is exhausted.
    ///
    /// Empty chunks are skipped. An error leaves the body readable; whether
    /// later reads yield data depends on the underlying stream.
    pub async fn read(&mut self) -> Result<Option<Bytes>, StreamError> {
        loop {
            if self.body.exhausted {
                return Ok(None);
            }
            let next = poll_fn(|cx| self.body.stream.as_mut().poll_next(cx)).await;
            match next {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => return Ok(Some(chunk)),
                Some(Err(e)) => return Err(e),
                None => {
                    self.body.exhausted = true;
                    return Ok(None);
                }
            }
        }
    }
}

impl Drop for BodyReader<'_> {
    fn drop(&mut self) {
        trace!(exhausted = self.body.exhausted, "body reader released");
    }
}

/// Adapts a hyper body to a chunk stream, dropping trailer frames.
struct IncomingStream(Incoming);

impl Stream for IncomingStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match ready!(Pin::new(&mut this.0).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        return Poll::Ready(Some(Ok(data)));
                    }
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(StreamError::Body(e.to_string())))),
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: Vec<Result<&'static str, &'static str>>) -> ResponseBody {
        let items: Vec<_> = parts
            .into_iter()
            .map(|p| match p {
                Ok(s) => Ok(Bytes::from_static(s.as_bytes())),
                Err(e) => Err(StreamError::Body(e.to_string())),
            })
            .collect();
        ResponseBody::from_stream(futures_util::stream::iter(items))
    }

    #[tokio::test]
    async fn reader_yields_chunks_in_order() {
        let mut body = chunks(vec![Ok("one"), Ok("two")]);
        let mut reader = body.reader();
        assert_eq!(reader.read().await.unwrap().unwrap(), "one");
        assert_eq!(reader.read().await.unwrap().unwrap(), "two");
        assert!(reader.read().await.unwrap().is_none());
        drop(reader);
        assert!(body.is_exhausted());
    }

    #[tokio::test]
    async fn reader_skips_empty_chunks() {
        let mut body = chunks(vec![Ok(""), Ok("x"), Ok("")]);
        let mut reader = body.reader();
        assert_eq!(reader.read().await.unwrap().unwrap(), "x");
        assert!(reader.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausted_body_stays_exhausted() {
        let mut body = chunks(vec![Ok("x")]);
        body.reader().read().await.unwrap();
        assert!(body.reader().read().await.unwrap().is_none());
        assert!(body.reader().read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn body_is_readable_after_error() {
        let mut body = chunks(vec![Ok("a"), Err("reset"), Ok("b")]);
        {
            let mut reader = body.reader();
            reader.read().await.unwrap();
            assert!(matches!(reader.read().await, Err(StreamError::Body(_))));
        }
        let mut reader = body.reader();
        assert_eq!(reader.read().await.unwrap().unwrap(), "b");
    }

    #[tokio::test]
    async fn into_bytes_concatenates() {
        let body = chunks(vec![Ok("hello, "), Ok("world")]);
        assert_eq!(body.into_bytes().await.unwrap(), "hello, world");
    }
}
