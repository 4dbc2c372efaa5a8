//! Generic streaming pipeline driver.
//!
//! [`drive`] connects one source, an ordered list of transforms, and one sink:
//!
//! ```text
//! source -> transform1 -> ... -> transformN -> sink
//! ```
//!
//! Data moves in 64KB chunks. Backpressure is cooperative: the driver awaits
//! the sink before reading the next chunk, so a slow consumer suspends the
//! whole pipeline and nothing buffers more than one chunk plus the transform
//! tails. The first error from any stage is the only outcome the caller sees;
//! all handles are released through `Drop` on every exit path, including
//! cancellation of the driving future.

use crate::error::VaultFsError;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Chunk size for pipeline reads (64KB)
/// Bounds per-operation memory regardless of file size
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A streaming byte transform stage.
///
/// Stages consume chunks in order and may hold back a bounded tail (for block
/// alignment) between calls; [`Transform::finish`] flushes that tail at
/// end-of-stream.
pub trait Transform: Send {
    /// Feed one chunk of input, appending any produced output to `out`.
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), VaultFsError>;

    /// Signal clean end-of-stream, appending any final output to `out`.
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), VaultFsError>;
}

/// Byte counts observed by a completed pipeline run.
///
/// `bytes_in` counts what was read from the source, `bytes_out` what was
/// written to the sink; the two differ when a transform changes the length
/// (e.g. cipher padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Drive the pipeline to completion.
///
/// Completes only when the source reached EOF, every transform finished
/// cleanly, and the sink was flushed. Fails on the first stage error.
pub async fn drive<R, W>(
    source: &mut R,
    transforms: &mut [Box<dyn Transform>],
    sink: &mut W,
) -> Result<PipelineOutcome, VaultFsError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut bytes_in = 0u64;
    let mut bytes_out = 0u64;

    loop {
        let n = source.read(&mut buffer).await?;
        if n == 0 {
            break; // EOF
        }
        bytes_in += n as u64;

        let chunk = apply_transforms(transforms, 0, &buffer[..n])?;
        bytes_out += write_to_sink(sink, &chunk).await?;
    }

    // Finish stages in order; each tail still flows through the stages after it.
    for i in 0..transforms.len() {
        let mut tail = Vec::new();
        transforms[i].finish(&mut tail)?;
        let tail = apply_transforms(transforms, i + 1, &tail)?;
        bytes_out += write_to_sink(sink, &tail).await?;
    }

    sink.flush().await.map_err(map_sink_error)?;

    Ok(PipelineOutcome {
        bytes_in,
        bytes_out,
    })
}

/// Drive the pipeline under a wall-clock budget.
///
/// If the budget elapses before clean completion, the driving future is
/// cancelled at its next suspension point (dropping every stage) and the
/// caller gets [`VaultFsError::Timeout`].
pub async fn drive_with_timeout<R, W>(
    source: &mut R,
    transforms: &mut [Box<dyn Transform>],
    sink: &mut W,
    limit: Duration,
) -> Result<PipelineOutcome, VaultFsError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(limit, drive(source, transforms, sink)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(VaultFsError::Timeout { limit }),
    }
}

/// Run `input` through `transforms[from..]`, returning the final output.
fn apply_transforms(
    transforms: &mut [Box<dyn Transform>],
    from: usize,
    input: &[u8],
) -> Result<Vec<u8>, VaultFsError> {
    let mut current = input.to_vec();
    for transform in &mut transforms[from..] {
        let mut next = Vec::with_capacity(current.len());
        transform.update(&current, &mut next)?;
        current = next;
    }
    Ok(current)
}

async fn write_to_sink<W>(sink: &mut W, data: &[u8]) -> Result<u64, VaultFsError>
where
    W: AsyncWrite + Unpin,
{
    if data.is_empty() {
        return Ok(0);
    }
    sink.write_all(data).await.map_err(map_sink_error)?;
    Ok(data.len() as u64)
}

/// A sink failing because the consumer went away is a distinct outcome from
/// a filesystem fault.
fn map_sink_error(err: std::io::Error) -> VaultFsError {
    match err.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::WriteZero => VaultFsError::SinkClosed,
        _ => VaultFsError::Io(err),
    }
}
