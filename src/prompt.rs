//! Prompt detection and scripted responses for pty sessions.
//!
//! A [`PromptResponder`] holds an ordered list of `(pattern, response)` pairs.
//! [`automate`] reads the combined output of a pty byte by byte, emits every
//! completed line through a [`Formatter`], and after each byte checks the
//! current (possibly unterminated) line against the patterns. Many prompts
//! such as `Password: ` never end with a newline, so a reply may be written
//! long before the line is complete.

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use regex::RegexSet;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RemoteError;
use crate::formatter::Formatter;

/// Terminal noise removed from lines before they are emitted: CSI and OSC
/// escape sequences anywhere, carriage-return or backspace runs at the start.
pub static TERMINAL_NOISE: Lazy<regex::Regex> = Lazy::new(|| {
    match regex::Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07|^[\r\u{8}]+") {
        Ok(re) => re,
        Err(err) => panic!("invalid TERMINAL_NOISE regex: {err}"),
    }
});

/// Ordered prompt patterns with the text to send when each one matches.
#[derive(Debug, Clone)]
pub struct PromptResponder {
    patterns: RegexSet,
    responses: Vec<String>,
}

impl PromptResponder {
    /// Compiles `pairs` of `(regex, response)`.
    ///
    /// When several patterns match the same text, the one listed first wins.
    pub fn new<I, P, R>(pairs: I) -> Result<Self, RemoteError>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let mut sources = Vec::new();
        let mut responses = Vec::new();
        for (pattern, response) in pairs {
            sources.push(pattern.as_ref().to_string());
            responses.push(response.into());
        }
        let patterns = RegexSet::new(&sources)?;
        Ok(Self {
            patterns,
            responses,
        })
    }

    /// A responder that never answers.
    pub fn empty() -> Self {
        Self {
            patterns: RegexSet::empty(),
            responses: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Pattern sources in configuration order.
    pub fn patterns(&self) -> &[String] {
        self.patterns.patterns()
    }

    /// Returns the response of the first pattern matching `text`.
    pub fn respond(&self, text: &str) -> Option<&str> {
        trace!("Checking prompt patterns against '{:?}'", text);
        self.patterns
            .matches(text)
            .iter()
            .next()
            .and_then(|idx| self.responses.get(idx))
            .map(String::as_str)
    }
}

/// Result of feeding one byte to a [`PromptAutomaton`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Fed {
    /// A line that was completed by this byte.
    pub line: Option<String>,
    /// Text to write to the remote input, without the trailing newline.
    pub reply: Option<String>,
}

/// Line accumulator that checks for prompts after every byte.
///
/// Once a pattern fired, later checks on the same line only look at text
/// received after that point, so one prompt produces one reply while a
/// second prompt on the same line is still answered.
#[derive(Debug)]
pub struct PromptAutomaton<'a> {
    responder: &'a PromptResponder,
    line: Vec<u8>,
    answered: usize,
}

impl<'a> PromptAutomaton<'a> {
    pub fn new(responder: &'a PromptResponder) -> Self {
        Self {
            responder,
            line: Vec::new(),
            answered: 0,
        }
    }

    pub fn feed(&mut self, byte: u8) -> Fed {
        if byte == b'\n' {
            return Fed {
                line: Some(self.take_line()),
                reply: None,
            };
        }

        self.line.push(byte);
        if self.responder.is_empty() {
            return Fed::default();
        }
        let pending = String::from_utf8_lossy(&self.line[self.answered..]);
        match self.responder.respond(&pending) {
            Some(reply) => {
                self.answered = self.line.len();
                Fed {
                    line: None,
                    reply: Some(reply.to_string()),
                }
            }
            None => Fed::default(),
        }
    }

    /// Returns the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.line.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let raw = String::from_utf8_lossy(&self.line);
        let line = clean_line(raw.trim_end_matches('\r'));
        self.line.clear();
        self.answered = 0;
        line
    }
}

fn clean_line(line: &str) -> String {
    TERMINAL_NOISE.replace_all(line, "").into_owned()
}

/// Drives a [`PromptAutomaton`] over a pty output stream until EOF.
///
/// Completed lines go to `formatter.normal_line`; replies are written to
/// `input` followed by a newline. A failed write is logged and reading
/// continues, since the remote side may still produce output. Read errors
/// end the loop and are returned.
pub async fn automate<R, W>(
    mut output: R,
    mut input: W,
    responder: &PromptResponder,
    formatter: &dyn Formatter,
    prefix: &str,
) -> Result<(), RemoteError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut automaton = PromptAutomaton::new(responder);
    let mut buf = [0u8; 1024];
    let mut input_open = true;

    loop {
        let n = output.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            let fed = automaton.feed(byte);
            if let Some(line) = fed.line {
                formatter.normal_line(prefix, &line);
            }
            if let Some(reply) = fed.reply {
                if !input_open {
                    debug!("{prefix} prompt matched after remote input closed");
                    continue;
                }
                debug!("{prefix} prompt matched, sending scripted response");
                let written = async {
                    input.write_all(reply.as_bytes()).await?;
                    input.write_all(b"\n").await?;
                    input.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!("{prefix} failed to write prompt response: {e}");
                    input_open = false;
                }
            }
        }
    }

    if let Some(rest) = automaton.finish() {
        formatter.normal_line(prefix, &rest);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(automaton: &mut PromptAutomaton<'_>, text: &str) -> Vec<Fed> {
        text.bytes().map(|b| automaton.feed(b)).collect()
    }

    #[test]
    fn first_configured_pattern_wins() {
        let responder = PromptResponder::new(vec![
            (r"(?i)password:", "first"),
            (r"word:", "second"),
        ])
        .expect("compile");
        assert_eq!(responder.respond("Password:"), Some("first"));
        assert_eq!(responder.respond("nothing"), None);
        assert_eq!(responder.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = PromptResponder::new(vec![("(unclosed", "x")]).expect_err("bad regex");
        assert!(matches!(err, RemoteError::Pattern(_)));
    }

    #[test]
    fn reply_fires_mid_line_exactly_once() {
        let responder = PromptResponder::new(vec![("login:", "admin")]).expect("compile");
        let mut automaton = PromptAutomaton::new(&responder);

        let fed = feed_all(&mut automaton, "login: ");
        let replies: Vec<_> = fed.iter().filter_map(|f| f.reply.clone()).collect();
        assert_eq!(replies, vec!["admin".to_string()]);
        assert!(fed.iter().all(|f| f.line.is_none()));

        let fed = automaton.feed(b'\n');
        assert_eq!(fed.line.as_deref(), Some("login: "));
    }

    #[test]
    fn second_prompt_on_same_line_is_answered() {
        let responder = PromptResponder::new(vec![("\\? $", "yes")]).expect("compile");
        let mut automaton = PromptAutomaton::new(&responder);

        let replies = feed_all(&mut automaton, "continue? sure? ")
            .into_iter()
            .filter_map(|f| f.reply)
            .count();
        assert_eq!(replies, 2);
    }

    #[test]
    fn lines_lose_carriage_returns_and_escapes() {
        let responder = PromptResponder::empty();
        let mut automaton = PromptAutomaton::new(&responder);
        let lines: Vec<_> = feed_all(&mut automaton, "\r\x1b[1mbold\x1b[0m text\r\n")
            .into_iter()
            .filter_map(|f| f.line)
            .collect();
        assert_eq!(lines, vec!["bold text".to_string()]);
        assert_eq!(automaton.finish(), None);
    }
}
