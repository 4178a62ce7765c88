use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ACK, PayloadDigest, TransferDescriptor, TransferReport};
use crate::config::TRANSFER_CHUNK;
use crate::error::RemoteError;

/// Source role: writes one file to a receiver running `scp -qt <dir>`.
///
/// Writes the header, exactly `descriptor.size` bytes read from `payload`,
/// and a single end-of-file byte, then shuts `remote_in` down. No
/// acknowledgements are read back; the caller judges success from the
/// receiver's exit status. A payload shorter than the declared size is a
/// [`RemoteError::Transfer`]; bytes beyond it are never read.
pub async fn send_file<R, W>(
    mut payload: R,
    remote_in: &mut W,
    descriptor: &TransferDescriptor,
) -> Result<TransferReport, RemoteError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let header = descriptor.header_line();
    debug!("sending file header {}", header.trim_end());
    remote_in.write_all(header.as_bytes()).await?;

    let progress = descriptor.progress();
    let mut digest = PayloadDigest::default();
    let mut remaining = descriptor.size;
    let mut buf = vec![0u8; TRANSFER_CHUNK];

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = payload.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(RemoteError::Transfer(format!(
                "local source ended after {} of {} bytes for {}",
                descriptor.size - remaining,
                descriptor.size,
                descriptor.name
            )));
        }
        remote_in.write_all(&buf[..n]).await?;
        digest.update(&buf[..n]);
        progress.advance(n as u64);
        remaining -= n as u64;
    }

    remote_in.write_all(&[ACK]).await?;
    remote_in.flush().await?;
    remote_in.shutdown().await?;

    Ok(digest.finish(descriptor.clone()))
}
