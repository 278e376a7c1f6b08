//! Wire-protocol pieces shared between the server and test clients.
//!
//! The protocol is plain text, one message per line. Lines are terminated
//! by CR, LF, or CRLF, whichever the client's telnet implementation emits.
//! The only inbound token with protocol meaning is [`SIGNAL_TOKEN`].

/// The one input with protocol significance: a line holding a single space.
pub const SIGNAL_TOKEN: &str = " ";

/// Number of countdown labels sent before the signaling window opens.
pub const COUNTDOWN_STEPS: u32 = 3;

/// Sent once on accept, before the client enters the matchmaking queue.
pub const GREETING: &str = "Hello! Let me find you an opponent";

/// Sent to both clients when a session is created.
pub const PAIRED: &str = "Opponent found. Press space when you see the number 3";

/// Clean win: this client signaled first after the window opened.
pub const WIN: &str = "You pressed space first and won";

/// Clean loss: the opponent signaled first.
pub const LOSE: &str = "You were too slow and lost";

/// Forfeit win: the opponent signaled early or dropped the connection.
pub const FORFEIT_WIN: &str = "Your opponent slipped up and you won";

/// Forfeit loss: this client signaled early or dropped the connection.
pub const FORFEIT_LOSE: &str = "You jumped the gun and lost";

/// Sent to both clients when the signaling window expires unanswered.
pub const DRAW: &str = "I got tired of waiting for you. It's a draw";

/// Optional reply to input that is not the signal token.
pub const DIAGNOSTIC: &str = "I only understand the space character (' ')";

/// Optional farewell sent right before the server closes the socket.
pub const FAREWELL: &str = "Bye!";

/// Label broadcast for one countdown step (1-based).
pub fn countdown_label(step: u32) -> String {
    step.to_string()
}

/// Incremental line splitter over raw socket bytes.
///
/// Telnet clients disagree on line endings, so a line ends at the first
/// CR, LF, or CRLF. A CRLF pair may arrive split across two reads; the
/// CR already produced a line, so the stray LF at the start of the next
/// chunk is swallowed instead of yielding an empty line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    swallow_lf: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes received from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        let mut data = data;
        if self.swallow_lf && !data.is_empty() {
            self.swallow_lf = false;
            if data[0] == b'\n' {
                data = &data[1..];
            }
        }
        self.buf.extend_from_slice(data);
    }

    /// Removes and returns the next complete line, without its terminator.
    ///
    /// Non-UTF-8 bytes are replaced rather than rejected; the state
    /// machine downstream ignores anything that is not the signal token.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n' || b == b'\r')?;
        let terminator = self.buf[pos];
        let line = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
        self.buf.drain(..=pos);
        if terminator == b'\r' {
            if self.buf.first() == Some(&b'\n') {
                self.buf.remove(0);
            } else if self.buf.is_empty() {
                self.swallow_lf = true;
            }
        }
        Some(line)
    }

    /// Number of buffered bytes not yet terminated into a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut LineBuffer) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = buffer.next_line() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_lf_terminated_lines() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"one\ntwo\n");
        assert_eq!(drain(&mut buffer), vec!["one", "two"]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_crlf_terminated_lines() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"one\r\ntwo\r\n");
        assert_eq!(drain(&mut buffer), vec!["one", "two"]);
    }

    #[test]
    fn test_lone_cr_terminates_immediately() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"one\r");
        assert_eq!(buffer.next_line(), Some("one".to_string()));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"one\r");
        assert_eq!(buffer.next_line(), Some("one".to_string()));
        buffer.extend(b"\ntwo\n");
        assert_eq!(drain(&mut buffer), vec!["two"]);
    }

    #[test]
    fn test_cr_followed_by_content_not_swallowed() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"one\r");
        assert_eq!(buffer.next_line(), Some("one".to_string()));
        buffer.extend(b"two\n");
        assert_eq!(drain(&mut buffer), vec!["two"]);
    }

    #[test]
    fn test_partial_line_held_back() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"hal");
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.pending(), 3);
        buffer.extend(b"f\n");
        assert_eq!(buffer.next_line(), Some("half".to_string()));
    }

    #[test]
    fn test_empty_lines_preserved() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"\n\n");
        assert_eq!(drain(&mut buffer), vec!["", ""]);
    }

    #[test]
    fn test_signal_token_line() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b" \r\n");
        assert_eq!(buffer.next_line().as_deref(), Some(SIGNAL_TOKEN));
    }

    #[test]
    fn test_mixed_terminators_in_one_chunk() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"a\rb\nc\r\nd\n");
        assert_eq!(drain(&mut buffer), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::new();
        buffer.extend(&[0xff, 0xfe, b'\n']);
        let line = buffer.next_line().unwrap();
        assert!(!line.is_empty());
        assert_ne!(line, SIGNAL_TOKEN);
    }

    #[test]
    fn test_countdown_labels() {
        assert_eq!(countdown_label(1), "1");
        assert_eq!(countdown_label(COUNTDOWN_STEPS), "3");
    }
}
