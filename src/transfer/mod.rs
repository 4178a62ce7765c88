//! The legacy scp wire protocol, single file in each direction.
//!
//! Both roles work on plain byte streams so they can run over an SSH channel
//! or, in tests, over an in-process pipe:
//!
//! - [`send_file`] is the source role used for uploads against `scp -qt <dir>`.
//! - [`receive_file`] is the sink role used for downloads from `scp -f <path>`.
//!
//! Wire format:
//!
//! ```text
//! C<4-digit octal mode> <decimal length> <base name>\n   file header
//! <length bytes of payload>
//! \x00                                                     ack / end of file
//! \x01<message>\n  or  \x02<message>\n                     error report
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use sha2::{Digest, Sha256};

use crate::error::RemoteError;

pub use sink::{SinkState, receive_file};
pub use source::send_file;

mod sink;
mod source;

/// Acknowledgement byte, also used as the end-of-file marker.
pub const ACK: u8 = 0x00;
/// Warning reported by the remote sender.
pub const WARNING: u8 = 0x01;
/// Fatal error reported by the remote sender.
pub const FATAL: u8 = 0x02;
/// Leading byte of a file header.
pub const FILE_HEADER: u8 = b'C';

/// Byte counter shared between a transfer and anyone observing it.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    total: u64,
    moved: Arc<AtomicU64>,
}

impl TransferProgress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            moved: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Declared payload length.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes moved so far.
    pub fn moved(&self) -> u64 {
        self.moved.load(Ordering::Relaxed)
    }

    /// Completion in percent; an empty payload counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.moved() as f64 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.moved() >= self.total
    }

    pub(crate) fn advance(&self, n: u64) {
        let moved = self.moved.fetch_add(n, Ordering::Relaxed) + n;
        trace!("transfer progress {moved}/{} bytes", self.total);
    }
}

/// A file being moved: mode, length, remote base name and progress.
#[derive(Debug, Clone)]
pub struct TransferDescriptor {
    pub mode: u32,
    pub size: u64,
    pub name: String,
    progress: TransferProgress,
}

impl TransferDescriptor {
    pub fn new(mode: u32, size: u64, name: impl Into<String>) -> Self {
        Self {
            mode,
            size,
            name: name.into(),
            progress: TransferProgress::new(size),
        }
    }

    /// Handle that can be polled from another task while the transfer runs.
    pub fn progress(&self) -> TransferProgress {
        self.progress.clone()
    }

    /// The file header line, including its trailing newline.
    pub fn header_line(&self) -> String {
        format!("C{:04o} {} {}\n", self.mode & 0o7777, self.size, self.name)
    }

    /// Parses the part of a header line that follows the leading `C`.
    pub fn parse_header(rest: &str) -> Result<Self, RemoteError> {
        let rest = rest.trim_end_matches(['\n', '\r']);
        let mut parts = rest.splitn(3, ' ');
        let (Some(mode), Some(size), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(RemoteError::Protocol(format!(
                "malformed file header: C{rest}"
            )));
        };

        let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| RemoteError::Protocol(format!("invalid file mode: {mode}")))?;
        let size = size
            .parse::<u64>()
            .map_err(|_| RemoteError::Protocol(format!("invalid file length: {size}")))?;
        if name.is_empty() || name.contains('/') {
            return Err(RemoteError::Protocol(format!("invalid file name: {name:?}")));
        }

        Ok(Self::new(mode, size, name))
    }
}

impl fmt::Display for TransferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:04o}, {} bytes)", self.name, self.mode, self.size)
    }
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub descriptor: TransferDescriptor,
    /// Payload bytes moved; equals `descriptor.size` on success.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the payload.
    pub sha256: String,
}

/// Running SHA-256 over a payload, paired with its byte count.
#[derive(Default)]
pub(crate) struct PayloadDigest {
    hasher: Sha256,
    bytes: u64,
}

impl PayloadDigest {
    pub(crate) fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    pub(crate) fn finish(self, descriptor: TransferDescriptor) -> TransferReport {
        let sha256 = format!("{:x}", self.hasher.finalize());
        debug!("transfer of {descriptor} finished, sha256 {sha256}");
        TransferReport {
            descriptor,
            bytes: self.bytes,
            sha256,
        }
    }
}

/// Splits a remote POSIX path into its directory and base name.
pub fn split_remote_path(path: &str) -> Result<(String, String), RemoteError> {
    let trimmed = path.trim_end_matches('/');
    let (dir, name) = match trimmed.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => (".", trimmed),
    };
    if name.is_empty() || name == "." || name == ".." {
        return Err(RemoteError::Config(format!(
            "remote path has no file name: {path:?}"
        )));
    }
    Ok((dir.to_string(), name.to_string()))
}

/// Quotes `arg` for a POSIX shell unless it only holds safe characters.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%=,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
