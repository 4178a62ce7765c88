use super::*;

use std::future::Future;

type Sink<'a> = &'a mut (dyn AsyncWrite + Unpin + Send);

/// Where [`pump_messages`] reads channel traffic from.
pub(super) trait MessageSource: Send {
    /// Next message, or `None` once the channel is gone.
    fn next_message(&mut self) -> impl Future<Output = Option<ChannelMsg>> + Send;

    /// Asks the server to close the channel.
    fn close(&mut self) -> impl Future<Output = Result<(), russh::Error>> + Send;
}

impl MessageSource for Channel<Msg> {
    async fn next_message(&mut self) -> Option<ChannelMsg> {
        self.wait().await
    }

    async fn close(&mut self) -> Result<(), russh::Error> {
        Channel::close(self).await
    }
}

/// One channel on a host's transport, running at most one remote command.
///
/// Obtained from [`RemoteHost::new_session`]. Every failure path of
/// [`Session::exec`], [`Session::request_pty`] and [`Session::pump`] closes
/// the channel before returning.
///
/// ```no_run
/// # async fn run(host: &hostkit::session::RemoteHost) -> Result<(), hostkit::error::RemoteError> {
/// let mut session = host.new_session().await?;
/// session.exec("uname -a").await?;
/// let mut output = Vec::new();
/// let exit = session
///     .pump(&mut output, None, host.context().cancellation_token())
///     .await?;
/// println!("{exit}: {}", String::from_utf8_lossy(&output));
/// # Ok(())
/// # }
/// ```
pub struct Session {
    channel: Channel<Msg>,
    target: String,
}

impl Session {
    pub(super) async fn open(transport: &Transport, target: &str) -> Result<Self, RemoteError> {
        let channel = transport.open_session(target).await?;
        trace!("{target} opened channel {:?}", channel.id());
        Ok(Self {
            channel,
            target: target.to_string(),
        })
    }

    /// Requests a pseudo-terminal with echo turned off.
    pub async fn request_pty(&self) -> Result<(), RemoteError> {
        let modes = [
            (russh::Pty::ECHO, 0),
            (russh::Pty::TTY_OP_ISPEED, config::PTY_BAUD),
            (russh::Pty::TTY_OP_OSPEED, config::PTY_BAUD),
        ];
        let requested = self
            .channel
            .request_pty(
                false,
                config::PTY_TERM,
                config::PTY_COLUMNS,
                config::PTY_ROWS,
                0,
                0,
                &modes,
            )
            .await;
        if let Err(e) = requested {
            self.close().await;
            return Err(self.refused(format!("pty request failed: {e}")));
        }
        Ok(())
    }

    /// Starts `command`. The server's reply is picked up by [`Session::pump`];
    /// a refusal arrives there as a failure message.
    pub async fn exec(&self, command: &str) -> Result<(), RemoteError> {
        debug!("{} exec {command:?}", self.target);
        if let Err(e) = self.channel.exec(true, command).await {
            self.close().await;
            return Err(self.refused(format!("cannot start command: {e}")));
        }
        Ok(())
    }

    /// Writer for the remote process's stdin. Shutting it down sends EOF.
    pub fn writer(&self) -> Box<dyn AsyncWrite + Unpin + Send> {
        Box::new(self.channel.make_writer())
    }

    /// Routes channel traffic into `stdout` and `stderr` until the channel
    /// closes, then shuts both sinks down. Stderr goes to `stdout` when no
    /// separate sink is given. A sink that stops accepting writes is logged
    /// and skipped; the channel is still drained to the end.
    pub async fn pump(
        &mut self,
        stdout: Sink<'_>,
        stderr: Option<Sink<'_>>,
        cancel: &CancellationToken,
    ) -> Result<ExitReport, RemoteError> {
        pump_messages(&mut self.channel, &self.target, stdout, stderr, cancel).await
    }

    /// Closes the channel. Closing twice is harmless.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close().await {
            trace!("{} channel already closed: {e}", self.target);
        }
    }

    /// `user@address:port` of the host this channel belongs to.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn refused(&self, reason: String) -> RemoteError {
        RemoteError::Session {
            target: self.target.clone(),
            reason,
        }
    }
}

/// The channel pump. Only `Close` or the end of `source` end it normally;
/// on cancellation or a refused request the channel is closed and an error
/// returned.
pub(super) async fn pump_messages<S: MessageSource>(
    source: &mut S,
    target: &str,
    stdout: Sink<'_>,
    mut stderr: Option<Sink<'_>>,
    cancel: &CancellationToken,
) -> Result<ExitReport, RemoteError> {
    let mut exit = ExitReport::default();
    let mut stdout_open = true;
    let mut stderr_open = true;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            msg = source.next_message() => Some(msg),
        };
        let Some(msg) = next else {
            debug!("{target} cancelled, closing channel");
            close_source(source, target).await;
            return Err(RemoteError::Cancelled(target.to_string()));
        };

        match msg {
            Some(ChannelMsg::Data { data }) => {
                forward(target, "stdout", &mut *stdout, &mut stdout_open, &data).await;
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext != 1 {
                    trace!("{target} ignoring extended data type {ext}");
                    continue;
                }
                match stderr.as_deref_mut() {
                    Some(sink) => forward(target, "stderr", sink, &mut stderr_open, &data).await,
                    None => {
                        forward(target, "stdout", &mut *stdout, &mut stdout_open, &data).await
                    }
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                trace!("{target} exit status {exit_status}");
                exit.status = Some(exit_status);
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                trace!("{target} exit signal {signal_name:?}");
                exit.signal = Some(format!("{signal_name:?}"));
            }
            Some(ChannelMsg::Failure) => {
                close_source(source, target).await;
                return Err(RemoteError::Session {
                    target: target.to_string(),
                    reason: "request refused by server".to_string(),
                });
            }
            Some(ChannelMsg::Eof) => trace!("{target} remote eof"),
            Some(ChannelMsg::Close) | None => break,
            Some(other) => trace!("{target} ignoring {other:?}"),
        }
    }

    close_sink(target, stdout).await;
    if let Some(sink) = stderr {
        close_sink(target, sink).await;
    }
    Ok(exit)
}

async fn close_source<S: MessageSource>(source: &mut S, target: &str) {
    if let Err(e) = source.close().await {
        trace!("{target} channel already closed: {e}");
    }
}

async fn forward(target: &str, stream: &str, sink: Sink<'_>, open: &mut bool, data: &[u8]) {
    if !*open {
        return;
    }
    if let Err(e) = sink.write_all(data).await {
        warn!("{target} dropping {stream} output: {e}");
        *open = false;
    }
}

async fn close_sink(target: &str, sink: Sink<'_>) {
    if let Err(e) = sink.shutdown().await {
        trace!("{target} sink shutdown: {e}");
    }
}

/// Turns the exit report of `command` into a result.
///
/// Status 0 is success. Any other status, or a signal, is a command failure.
/// A channel that closed without reporting either lost its transport.
pub(super) fn exit_result(
    target: &str,
    command: &str,
    exit: ExitReport,
) -> Result<ExitReport, RemoteError> {
    match (&exit.status, &exit.signal) {
        (Some(0), _) => Ok(exit),
        (None, None) => Err(RemoteError::Connectivity {
            target: target.to_string(),
            reason: format!("channel closed before `{command}` reported an exit status"),
        }),
        _ => Err(RemoteError::Command {
            target: target.to_string(),
            command: command.to_string(),
            exit,
        }),
    }
}

/// Exit rule for scp runs. scp exits with 1 on some servers after a complete
/// transfer, so status 1 is accepted here and nowhere else. Anything else,
/// including no status at all, is a transfer failure carrying scp's stderr.
pub(super) fn transfer_exit(
    target: &str,
    command: &str,
    exit: &ExitReport,
    remote_err: &[u8],
) -> Result<(), RemoteError> {
    match exit.status {
        Some(0) => Ok(()),
        Some(1) => {
            debug!("{target} `{command}` exited with status 1");
            Ok(())
        }
        _ => {
            let stderr = String::from_utf8_lossy(remote_err);
            let stderr = stderr.trim();
            Err(RemoteError::Transfer(if stderr.is_empty() {
                format!("`{command}` on {target} ended with {exit}")
            } else {
                format!("`{command}` on {target} ended with {exit}: {stderr}")
            }))
        }
    }
}
