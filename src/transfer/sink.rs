use log::{debug, trace};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::{ACK, FATAL, FILE_HEADER, PayloadDigest, TransferDescriptor, TransferReport, WARNING};
use crate::config::TRANSFER_CHUNK;
use crate::error::RemoteError;

/// Position of the sink in the receive handshake.
#[derive(Debug)]
pub enum SinkState {
    /// Prime the sender with an ack, then read one action byte.
    AwaitAction,
    /// A `C` was read; the rest of the header line follows.
    AwaitHeader,
    /// Header acknowledged; the payload is being copied.
    Streaming(TransferDescriptor),
    /// Payload copied and acknowledged.
    Done(TransferReport),
}

/// Sink role: receives one file from a sender running `scp -f <path>`.
///
/// `remote_out` carries what the sender writes, acknowledgements go to
/// `remote_in` and the payload is copied into `destination`. Exactly the
/// declared number of payload bytes is read, so trailing bytes on the stream
/// are left untouched. A stream that ends early fails with
/// [`RemoteError::Transfer`] before the final ack is sent.
pub async fn receive_file<R, W, D>(
    remote_out: R,
    remote_in: &mut W,
    destination: &mut D,
) -> Result<TransferReport, RemoteError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(remote_out);
    let mut state = SinkState::AwaitAction;

    loop {
        trace!("sink state {state:?}");
        state = match state {
            SinkState::AwaitAction => {
                send_ack(remote_in).await?;
                next_action(&mut reader).await?;
                SinkState::AwaitHeader
            }
            SinkState::AwaitHeader => {
                let descriptor = read_header(&mut reader).await?;
                debug!("receiving {descriptor}");
                send_ack(remote_in).await?;
                SinkState::Streaming(descriptor)
            }
            SinkState::Streaming(descriptor) => {
                let report = copy_payload(&mut reader, destination, descriptor).await?;
                send_ack(remote_in).await?;
                SinkState::Done(report)
            }
            SinkState::Done(report) => return Ok(report),
        };
    }
}

async fn send_ack<W: AsyncWrite + Unpin>(remote_in: &mut W) -> Result<(), RemoteError> {
    remote_in.write_all(&[ACK]).await?;
    remote_in.flush().await?;
    Ok(())
}

/// Reads action bytes until a file header starts. Plain acks are skipped.
async fn next_action<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<(), RemoteError> {
    loop {
        let mut action = [0u8; 1];
        if reader.read(&mut action).await? == 0 {
            return Err(RemoteError::Protocol(
                "sender closed the stream before any file header".to_string(),
            ));
        }
        match action[0] {
            ACK => trace!("sender acked"),
            WARNING | FATAL => {
                let mut line = Vec::new();
                reader.read_until(b'\n', &mut line).await?;
                let message = String::from_utf8_lossy(&line).trim_end().to_string();
                return Err(RemoteError::Protocol(if message.is_empty() {
                    "sender reported an error without a message".to_string()
                } else {
                    format!("sender reported: {message}")
                }));
            }
            FILE_HEADER => return Ok(()),
            other => {
                return Err(RemoteError::Protocol(format!(
                    "unexpected action byte 0x{other:02x}"
                )));
            }
        }
    }
}

async fn read_header<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<TransferDescriptor, RemoteError> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;
    if line.last() != Some(&b'\n') {
        return Err(RemoteError::Protocol(
            "stream ended inside the file header".to_string(),
        ));
    }
    let text = String::from_utf8(line)
        .map_err(|_| RemoteError::Protocol("file header is not valid UTF-8".to_string()))?;
    TransferDescriptor::parse_header(&text)
}

async fn copy_payload<R, D>(
    reader: &mut BufReader<R>,
    destination: &mut D,
    descriptor: TransferDescriptor,
) -> Result<TransferReport, RemoteError>
where
    R: AsyncRead + Unpin,
    D: AsyncWrite + Unpin,
{
    let progress = descriptor.progress();
    let mut digest = PayloadDigest::default();
    let mut remaining = descriptor.size;
    let mut buf = vec![0u8; TRANSFER_CHUNK];

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(RemoteError::Transfer(format!(
                "stream closed after {} of {} bytes of {}",
                descriptor.size - remaining,
                descriptor.size,
                descriptor.name
            )));
        }
        destination.write_all(&buf[..n]).await?;
        digest.update(&buf[..n]);
        progress.advance(n as u64);
        remaining -= n as u64;
    }
    destination.flush().await?;

    Ok(digest.finish(descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leading_acks_are_skipped() {
        let wire: &[u8] = b"\x00\x00C0644 3 abc\nxyz";
        let mut acks = Vec::new();
        let mut out = Vec::new();

        let report = receive_file(wire, &mut acks, &mut out).await.expect("receive");

        assert_eq!(out, b"xyz");
        assert_eq!(report.descriptor.name, "abc");
        assert_eq!(acks, vec![ACK, ACK, ACK]);
    }

    #[tokio::test]
    async fn unexpected_action_is_a_protocol_error() {
        let wire: &[u8] = b"T1 0 1 0\n";
        let mut acks = Vec::new();
        let mut out = Vec::new();

        let err = receive_file(wire, &mut acks, &mut out)
            .await
            .expect_err("T is not handled");

        assert!(matches!(err, RemoteError::Protocol(ref m) if m.contains("0x54")));
        assert_eq!(acks, vec![ACK]);
    }

    #[tokio::test]
    async fn header_cut_short_is_a_protocol_error() {
        let wire: &[u8] = b"C0644 10";
        let mut acks = Vec::new();
        let mut out = Vec::new();

        let err = receive_file(wire, &mut acks, &mut out)
            .await
            .expect_err("no newline");
        assert!(matches!(err, RemoteError::Protocol(_)));
    }
}
