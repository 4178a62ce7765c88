use super::*;

use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::channel::exit_result;

/// Which remote stream a drained line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Reads `reader` line by line until EOF and hands each line to the
/// formatter, stdout lines as normal lines and stderr lines as error lines.
///
/// Trailing `\r\n` is stripped and invalid UTF-8 is replaced. A final line
/// without a newline is still emitted. A read error is reported through
/// `error_line` and ends the drain.
pub async fn drain_lines<R>(
    reader: R,
    stream: StreamKind,
    prefix: String,
    formatter: Arc<dyn Formatter>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                match stream {
                    StreamKind::Stdout => formatter.normal_line(&prefix, line),
                    StreamKind::Stderr => formatter.error_line(&prefix, line),
                }
            }
            Err(e) => {
                formatter.error_line(&prefix, &format!("failed to read {stream:?}: {e}"));
                break;
            }
        }
    }
    trace!("{prefix} {stream:?} drained");
}

impl RemoteHost {
    /// Runs `command` and streams its output through the formatter.
    ///
    /// The formatter sees a header, every stdout and stderr line, and a
    /// footer, in that order; lines of one stream keep their order. A
    /// non-zero exit is returned as [`RemoteError::Command`] after the
    /// footer has reported it.
    pub async fn execute(&self, command: &str) -> Result<(), RemoteError> {
        let formatter = Arc::clone(self.ctx.formatter());
        formatter.header(command);
        let started = Instant::now();

        let result = self.execute_streamed(command, &formatter).await;

        formatter.footer(started.elapsed(), result.as_ref().err());
        result
    }

    async fn execute_streamed(
        &self,
        command: &str,
        formatter: &Arc<dyn Formatter>,
    ) -> Result<(), RemoteError> {
        let mut session = self.new_session().await?;
        session.exec(command).await?;

        let prefix = self.prefix();
        let (mut stdout, stdout_rx) = tokio::io::duplex(config::PIPE_CAPACITY);
        let (mut stderr, stderr_rx) = tokio::io::duplex(config::PIPE_CAPACITY);

        let mut drains = JoinSet::new();
        drains.spawn(drain_lines(
            stdout_rx,
            StreamKind::Stdout,
            prefix.clone(),
            Arc::clone(formatter),
        ));
        drains.spawn(drain_lines(
            stderr_rx,
            StreamKind::Stderr,
            prefix,
            Arc::clone(formatter),
        ));

        let pumped = session
            .pump(&mut stdout, Some(&mut stderr), self.ctx.cancellation_token())
            .await;
        drop(stdout);
        drop(stderr);

        while let Some(joined) = drains.join_next().await {
            joined?;
        }

        exit_result(&self.label(), command, pumped?).map(|_| ())
    }

    /// Runs `command` and returns its combined stdout and stderr, trimmed.
    ///
    /// Nothing is sent to the formatter.
    pub async fn capture(&self, command: &str) -> Result<String, RemoteError> {
        let mut session = self.new_session().await?;
        session.exec(command).await?;

        let mut output = Vec::new();
        let pumped = session
            .pump(&mut output, None, self.ctx.cancellation_token())
            .await;
        exit_result(&self.label(), command, pumped?)?;

        Ok(String::from_utf8_lossy(&output).trim().to_string())
    }

    /// Like [`RemoteHost::execute`], but terminates the process with exit
    /// code 1 when the command fails.
    pub async fn must_execute(&self, command: &str) {
        if let Err(e) = self.execute(command).await {
            error!("{} `{command}` failed, exiting: {e}", self.prefix());
            std::process::exit(1);
        }
    }
}
