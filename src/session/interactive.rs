use super::*;

use crate::prompt::{PromptResponder, automate};

use super::channel::exit_result;

impl RemoteHost {
    /// Runs `command` on a pty and answers prompts as they appear.
    ///
    /// `pattern_responses` is an ordered list of `(regex, response)` pairs.
    /// Whenever the output line seen so far matches a pattern, the response
    /// of the first matching pair is sent followed by a newline; this happens
    /// as soon as the prompt text arrives, without waiting for a line end.
    /// Output lines go to the formatter as normal lines. The call returns
    /// after the remote command exited and the channel closed.
    pub async fn execute_interactively<I, P, R>(
        &self,
        command: &str,
        pattern_responses: I,
    ) -> Result<(), RemoteError>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let responder = PromptResponder::new(pattern_responses)?;
        let formatter = Arc::clone(self.ctx.formatter());
        formatter.header(command);
        let started = Instant::now();

        let result = self.interact(command, &responder, formatter.as_ref()).await;

        formatter.footer(started.elapsed(), result.as_ref().err());
        result
    }

    async fn interact(
        &self,
        command: &str,
        responder: &PromptResponder,
        formatter: &dyn Formatter,
    ) -> Result<(), RemoteError> {
        let mut session = self.new_session().await?;
        session.request_pty().await?;
        session.exec(command).await?;
        trace!(
            "{} answering {} prompt pattern(s)",
            self.label(),
            responder.len()
        );

        let prefix = self.prefix();
        let input = session.writer();
        let (output, output_rx) = tokio::io::duplex(config::PIPE_CAPACITY);
        let cancel = self.ctx.cancellation_token();

        let pumping = async {
            let mut output = output;
            session.pump(&mut output, None, cancel).await
        };
        let automation = automate(output_rx, input, responder, formatter, &prefix);
        let (pumped, automated) = tokio::join!(pumping, automation);

        if let Err(e) = automated {
            formatter.error_line(&prefix, &format!("failed to read pty output: {e}"));
        }
        exit_result(&self.label(), command, pumped?).map(|_| ())
    }
}
