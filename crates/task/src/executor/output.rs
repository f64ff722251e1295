//! Fan-out of the child's output to the caller and the cache
//!
//! One reader pulls chunks off the child's pipe and hands each one to two
//! sinks over bounded channels. The channels apply backpressure, so memory
//! stays bounded by their depth no matter how much the command prints.

use bytes::{Bytes, BytesMut};
use runcached_cache::EntryWriter;
use runcached_core::{Error, Result};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 16 * 1024;
const CHANNEL_DEPTH: usize = 16;

/// What the fan-out delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanOutReport {
    /// Bytes read from the child
    pub bytes: u64,
    /// The caller's output stopped accepting data before the child finished
    pub caller_closed: bool,
}

/// Copy everything `source` produces to `out` and into `entry`
///
/// Returns once `source` hits end of file and both sinks have drained. The
/// caller's output going away does not stop the copy into the cache.
pub async fn fan_out<R, W>(source: R, out: &mut W, entry: &mut EntryWriter) -> Result<FanOutReport>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let (caller_tx, mut caller_rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);
    let (cache_tx, mut cache_rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);

    let read = async move {
        let mut source = source;
        let mut buffer = BytesMut::with_capacity(CHUNK_SIZE);
        let mut bytes = 0u64;
        loop {
            buffer.reserve(CHUNK_SIZE);
            let n = source.read_buf(&mut buffer).await?;
            if n == 0 {
                break;
            }
            bytes += n as u64;
            let chunk = buffer.split().freeze();
            // A sink that gave up has dropped its receiver; keep draining
            let _ = caller_tx.send(chunk.clone()).await;
            let _ = cache_tx.send(chunk).await;
        }
        Ok::<u64, io::Error>(bytes)
    };

    let to_caller = async move {
        while let Some(chunk) = caller_rx.recv().await {
            let written = match out.write_all(&chunk).await {
                Ok(()) => out.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    tracing::warn!("Failed to write command output: {}", e);
                }
                return true;
            }
        }
        false
    };

    let to_cache = async move {
        while let Some(chunk) = cache_rx.recv().await {
            entry.write_chunk(&chunk).await?;
        }
        Ok::<(), Error>(())
    };

    let (read, caller_closed, cached) = tokio::join!(read, to_caller, to_cache);
    cached?;
    let bytes = read.map_err(|e| Error::file_system("<command output>", "read", e))?;

    Ok(FanOutReport {
        bytes,
        caller_closed,
    })
}
