//! AMI frame codec for TCP transport
//!
//! AMI frames are blocks of `Key: Value` lines terminated by a blank line
//! (CRLF CRLF). `Response: Follows` frames additionally carry raw command
//! output terminated by an explicit `--END COMMAND--` marker. The decoder
//! buffers partial reads and never drops or reorders bytes across read
//! boundaries.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::message::{Action, Message};

/// Maximum frame size (1 MB). Command output is the largest payload the
/// switch produces and stays well under this.
const MAX_FRAME_SIZE: usize = 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const COMMAND_TERMINATOR: &[u8] = b"--END COMMAND--";
const FOLLOWS_PREFIX: &[u8] = b"response: follows";

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Codec for outbound `Action`s (encoding) and inbound `Message`s
/// (decoding). The correlation identifier is supplied alongside the action
/// at encode time; the codec itself is stateless.
pub struct AmiCodec;

impl AmiCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmiCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// True when the buffer opens with a `Response: Follows` frame, which ends
/// at the command terminator instead of the first blank line.
fn frame_is_follows(src: &[u8]) -> bool {
    src.len() >= FOLLOWS_PREFIX.len() && src[..FOLLOWS_PREFIX.len()].eq_ignore_ascii_case(FOLLOWS_PREFIX)
}

/// True for lines of the `Key: Value` shape: a non-indented token of
/// header characters followed by a colon.
fn looks_like_header(line: &str) -> bool {
    match line.split_once(':') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }
        None => false,
    }
}

fn parse_frame(bytes: &[u8], follows: bool) -> Message {
    let text = String::from_utf8_lossy(bytes);
    let mut msg = Message::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut in_body = false;

    for raw_line in text.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

        if in_body {
            body_lines.push(line);
            continue;
        }

        if line.is_empty() {
            continue;
        }

        if looks_like_header(line) {
            // split_once cannot fail here; looks_like_header found the colon
            if let Some((key, value)) = line.split_once(':') {
                msg.push_header(key.trim(), value.trim());
            }
        } else if follows {
            // Headers are over; the rest of the frame is command output,
            // even if later lines happen to look header-shaped.
            in_body = true;
            body_lines.push(line);
        } else {
            warn!(line = %line, "Skipping malformed header line");
        }
    }

    if follows {
        let mut body = body_lines.join("\n");
        if !body.ends_with('\n') {
            body.push('\n');
        }
        msg.set_body(body);
    }

    msg
}

impl Decoder for AmiCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Skip blank lines between frames (including the one trailing a
            // command terminator).
            while src.starts_with(b"\r\n") {
                src.advance(2);
            }

            if src.is_empty() {
                return Ok(None);
            }

            // Greeting banner: a lone line with no colon ahead of the first
            // frame ("Asterisk Call Manager/5.0.1").
            if let Some(pos) = find(src, b"\r\n") {
                let line = &src[..pos];
                if !line.is_empty() && !line.contains(&b':') {
                    let banner = String::from_utf8_lossy(line).into_owned();
                    src.advance(pos + 2);
                    debug!(banner = %banner, "Skipping server greeting");
                    continue;
                }
            }

            let follows = frame_is_follows(src);
            let (frame_end, consume) = if follows {
                match find(src, COMMAND_TERMINATOR) {
                    Some(pos) => (pos, pos + COMMAND_TERMINATOR.len()),
                    None => return self.need_more(src),
                }
            } else {
                match find(src, HEADER_TERMINATOR) {
                    Some(pos) => (pos, pos + HEADER_TERMINATOR.len()),
                    None => return self.need_more(src),
                }
            };

            let frame = src.split_to(frame_end);
            src.advance(consume - frame_end);

            return Ok(Some(parse_frame(&frame, follows)));
        }
    }
}

impl AmiCodec {
    /// No complete frame yet: either fail on a runaway frame or ask for
    /// more bytes.
    fn need_more(&self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        if src.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: src.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        src.reserve(1);
        Ok(None)
    }
}

/// CR/LF inside a value would break framing; fold them to spaces.
fn sanitize(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

impl<'a> Encoder<(u64, &'a Action)> for AmiCodec {
    type Error = CodecError;

    fn encode(&mut self, item: (u64, &'a Action), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (action_id, action) = item;

        let mut out = String::new();
        out.push_str("Action: ");
        out.push_str(&sanitize(action.verb()));
        out.push_str("\r\nActionID: ");
        out.push_str(&action_id.to_string());
        out.push_str("\r\n");
        for (key, value) in action.params() {
            out.push_str(&sanitize(key));
            out.push_str(": ");
            out.push_str(&sanitize(value));
            out.push_str("\r\n");
        }
        out.push_str("\r\n");

        dst.reserve(out.len());
        dst.put_slice(out.as_bytes());
        Ok(())
    }
}
