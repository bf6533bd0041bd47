use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::storage::{ContentStream, StorageError};

/// Counts the bytes actually flowing through `stream` and fails it with
/// `LimitExceeded` on the chunk that crosses `limit`.
///
/// The declared size of a request is never trusted on its own; this is the
/// check that decides.
pub fn limit_stream<'a, S>(stream: S, limit: u64) -> ContentStream<'a>
where
    S: Stream<Item = Result<Bytes, StorageError>> + Send + 'a,
{
    // (bytes seen, stream already failed)
    stream
        .scan((0u64, false), move |(consumed, failed), chunk| {
            if *failed {
                return futures::future::ready(None);
            }
            let item = chunk.and_then(|chunk| {
                *consumed += chunk.len() as u64;
                if *consumed > limit {
                    Err(StorageError::LimitExceeded { limit })
                } else {
                    Ok(chunk)
                }
            });
            *failed = item.is_err();
            futures::future::ready(Some(item))
        })
        .boxed()
}

/// Whether a declared `Content-Length` already rules the upload out.
pub fn declared_too_large(declared: Option<u64>, limit: u64) -> bool {
    declared.is_some_and(|size| size > limit)
}
