use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

/// Error returned by [`read_limited`].
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    /// The body exceeded the limit. Reading stopped at the first chunk crossing it.
    #[error("body exceeds {limit} bytes")]
    Overflow {
        /// The limit in bytes.
        limit: usize,
    },
    /// The body could not be read from the connection.
    #[error("failed to read request body")]
    Read(#[source] axum::Error),
}

/// Reads a request body into memory, up to `limit` bytes.
///
/// Bodies of exactly `limit` bytes are accepted. The body is consumed as a stream, so no more than
/// `limit` bytes plus one chunk are ever buffered.
pub async fn read_limited(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Read)?;

        if buf.len() + chunk.len() > limit {
            return Err(BodyError::Overflow { limit });
        }

        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn chunked(chunks: &[&'static [u8]]) -> Body {
        let chunks = chunks
            .iter()
            .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c)))
            .collect::<Vec<_>>();

        Body::from_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_exact_limit() {
        let bytes = read_limited(chunked(&[b"abc", b"de"]), 5).await.unwrap();
        assert_eq!(bytes.as_ref(), b"abcde");
    }

    #[tokio::test]
    async fn test_overflow() {
        let result = read_limited(chunked(&[b"abc", b"def"]), 5).await;
        assert!(matches!(result, Err(BodyError::Overflow { limit: 5 })));
    }

    #[tokio::test]
    async fn test_empty() {
        let bytes = read_limited(Body::empty(), 5).await.unwrap();
        assert!(bytes.is_empty());
    }
}
