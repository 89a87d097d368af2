//! # Inbound data deframer
//!
//! Socket data is forwarded by the modem as `+IPD,<id>,<len>:<payload>` (multiplexed mode) or
//! `+IPD,<len>:<payload>` (single mode) in the middle of the regular text stream. The payload is
//! binary and may contain any protocol-special bytes.
//!
//! Receiving is done in two phases:
//! 1. The header is searched byte by byte by [HeaderParser], bounded by the total timeout.
//! 2. The payload is read directly from the stream into the caller's buffer, bounded by a separate
//!    payload timeout.
//!
//! ## Example
//!
//! ````
//! # use esp8266_at::adapter::Adapter;
//! # use esp8266_at::example::{ExampleSerial, ExampleTimer};
//! let mut serial = ExampleSerial::default();
//! serial.inject(b"\r\n+IPD,2,5:hello");
//!
//! let mut adapter: Adapter<_, _, 1_000_000, 256, 256> = Adapter::new(serial, ExampleTimer::default());
//!
//! let mut buffer = [0x0; 16];
//! let frame = adapter.receive_frame(&mut buffer, 1_000, 3_000).unwrap();
//! assert_eq!(5, frame.len());
//! assert_eq!(2, frame.link().unwrap().get());
//! assert_eq!(b"hello", &buffer[..frame.len()]);
//! ````
use crate::adapter::{serial_error, Adapter, CommandError, Error};
use crate::responses::FRAME_MARKER;
use crate::session::LinkId;
use embedded_io::{Read, ReadReady, Write};
use fugit_timer::Timer;
use log::{debug, trace, warn};

/// Max. number of digits of the link ID and length fields
const MAX_DIGITS: u8 = 10;

/// Max. length of the remote address suffix (`,<ip>,<port>`) reported by newer firmware
const MAX_REMOTE_INFO: usize = 64;

/// Invalid frame header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramingError {
    /// Header contains an empty or non-numeric field or is too long
    Malformed,

    /// Link ID is outside of [0, 4]
    InvalidLinkId(u32),

    /// Declared payload length is zero
    InvalidLength,
}

/// Parsed frame header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Link ID, only present in multiplexed mode
    pub link: Option<LinkId>,

    /// Declared payload length
    pub length: usize,
}

/// Header parser state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    /// Searching the `+IPD,` marker. Number of marker bytes matched so far.
    Marker(usize),

    /// Reading the first field, either the link ID or the length
    First { value: u32, digits: u8 },

    /// Reading the length following the link ID
    Second { link: LinkId, value: u32, digits: u8 },

    /// Skipping the remote address until the colon
    RemoteInfo { header: FrameHeader, skipped: usize },
}

/// Incremental parser of `+IPD,[<id>,]<len>:` headers
///
/// Bytes preceding the marker are ignored. A header error is fatal for the frame, the parser needs
/// to be [reset](Self::reset) before it is used again.
#[derive(Clone, Debug)]
pub struct HeaderParser {
    state: State,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    pub fn new() -> Self {
        Self { state: State::Marker(0) }
    }

    pub fn reset(&mut self) {
        self.state = State::Marker(0);
    }

    /// Returns true if the marker was found and the parser is inside a header
    pub fn in_header(&self) -> bool {
        !matches!(self.state, State::Marker(_))
    }

    /// Feeds a single byte. Returns the header once the terminating colon was consumed.
    pub fn push(&mut self, byte: u8) -> Result<Option<FrameHeader>, FramingError> {
        match self.state {
            State::Marker(matched) => {
                self.state = State::Marker(match_marker(matched, byte));

                if self.state == State::Marker(FRAME_MARKER.len()) {
                    self.state = State::First { value: 0, digits: 0 };
                }
                Ok(None)
            }
            State::First { value, digits } => match byte {
                b',' => {
                    let link = link_id(value, digits)?;
                    self.state = State::Second {
                        link,
                        value: 0,
                        digits: 0,
                    };
                    Ok(None)
                }
                b':' => Ok(Some(FrameHeader {
                    link: None,
                    length: length(value, digits)?,
                })),
                _ => {
                    let (value, digits) = append_digit(value, digits, byte)?;
                    self.state = State::First { value, digits };
                    Ok(None)
                }
            },
            State::Second { link, value, digits } => match byte {
                b':' => Ok(Some(FrameHeader {
                    link: Some(link),
                    length: length(value, digits)?,
                })),
                b',' => {
                    self.state = State::RemoteInfo {
                        header: FrameHeader {
                            link: Some(link),
                            length: length(value, digits)?,
                        },
                        skipped: 0,
                    };
                    Ok(None)
                }
                _ => {
                    let (value, digits) = append_digit(value, digits, byte)?;
                    self.state = State::Second { link, value, digits };
                    Ok(None)
                }
            },
            State::RemoteInfo { header, skipped } => {
                if byte == b':' {
                    return Ok(Some(header));
                }

                if skipped >= MAX_REMOTE_INFO {
                    return Err(FramingError::Malformed);
                }

                self.state = State::RemoteInfo {
                    header,
                    skipped: skipped + 1,
                };
                Ok(None)
            }
        }
    }
}

/// Returns the new number of matched marker bytes
fn match_marker(matched: usize, byte: u8) -> usize {
    if byte == FRAME_MARKER[matched] {
        return matched + 1;
    }

    // Marker start does not recur inside the marker
    if byte == FRAME_MARKER[0] {
        return 1;
    }

    0
}

fn append_digit(value: u32, digits: u8, byte: u8) -> Result<(u32, u8), FramingError> {
    if !byte.is_ascii_digit() || digits >= MAX_DIGITS {
        return Err(FramingError::Malformed);
    }

    let value = value
        .checked_mul(10)
        .and_then(|value| value.checked_add((byte - b'0') as u32))
        .ok_or(FramingError::Malformed)?;

    Ok((value, digits + 1))
}

fn link_id(value: u32, digits: u8) -> Result<LinkId, FramingError> {
    if digits == 0 {
        return Err(FramingError::Malformed);
    }

    u8::try_from(value)
        .ok()
        .and_then(LinkId::new)
        .ok_or(FramingError::InvalidLinkId(value))
}

fn length(value: u32, digits: u8) -> Result<usize, FramingError> {
    if digits == 0 {
        return Err(FramingError::Malformed);
    }

    if value == 0 {
        return Err(FramingError::InvalidLength);
    }

    usize::try_from(value).map_err(|_| FramingError::Malformed)
}

/// Received frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Bytes written to the buffer
    written: usize,

    /// Payload length announced by the header
    declared: usize,

    /// Link the frame was received on, only present in multiplexed mode
    link: Option<LinkId>,

    /// False if the frame belongs to another link and the payload was discarded
    delivered: bool,
}

impl Frame {
    pub(crate) fn new(written: usize, header: FrameHeader) -> Self {
        Self {
            written,
            declared: header.length,
            link: header.link,
            delivered: true,
        }
    }

    /// Frame which belongs to another link. Payload was discarded.
    pub(crate) fn skipped(header: FrameHeader) -> Self {
        Self {
            written: 0,
            declared: header.length,
            link: header.link,
            delivered: false,
        }
    }

    /// Number of bytes written to the buffer
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Payload length announced by the modem
    pub fn declared_len(&self) -> usize {
        self.declared
    }

    /// Link ID of the frame, None in single connection mode
    pub fn link(&self) -> Option<LinkId> {
        self.link
    }

    /// False if the frame was received on another link than requested, s. [Adapter::receive_data]
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// True if the payload did not fit in the buffer and the remainder was discarded
    pub fn is_truncated(&self) -> bool {
        self.delivered && self.declared > self.written
    }

    /// Returns the written length, or [Error::Truncated] if the payload did not fit in the buffer
    pub fn complete(self) -> Result<usize, Error> {
        if self.is_truncated() {
            return Err(Error::Truncated {
                declared: self.declared,
                written: self.written,
            });
        }

        Ok(self.written)
    }
}

impl<S: Read + Write + ReadReady, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    Adapter<S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    /// Waits for the next inbound frame and copies its payload to the given buffer.
    ///
    /// `total_timeout_ms` bounds the wait for the header, `payload_timeout_ms` bounds the payload read
    /// once the header was received. If the payload is longer than the buffer, the buffer is filled
    /// and the rest of the payload is discarded, s. [Frame::is_truncated].
    ///
    /// Errors:
    /// * [Error::ReceiveFailed] with [CommandError::Timeout] if no header was received in time
    /// * [Error::Framing] if the header is invalid, no bytes are returned in this case
    /// * [Error::IncompleteFrame] if the payload did not arrive in time
    pub fn receive_frame(&mut self, buffer: &mut [u8], total_timeout_ms: u32, payload_timeout_ms: u32) -> Result<Frame, Error> {
        self.receive_frame_for(None, buffer, total_timeout_ms, payload_timeout_ms)
    }

    /// Receives the next frame. If `link` is given, frames of other links (or without link ID) are
    /// discarded completely and returned as [skipped](Frame::is_delivered).
    pub(crate) fn receive_frame_for(
        &mut self,
        link: Option<LinkId>,
        buffer: &mut [u8],
        total_timeout_ms: u32,
        payload_timeout_ms: u32,
    ) -> Result<Frame, Error> {
        let header = self.receive_header(total_timeout_ms)?;
        trace!("Frame header: link={:?} length={}", header.link.map(|link| link.get()), header.length);

        self.start_deadline(payload_timeout_ms).map_err(Error::ReceiveFailed)?;

        if link.is_some() && header.link != link {
            let discarded = self.discard_payload(header.length)?;
            debug!(
                "Skipped frame of link {:?}, {} of {} bytes discarded",
                header.link.map(|link| link.get()),
                discarded,
                header.length
            );
            return Ok(Frame::skipped(header));
        }

        let expected = header.length.min(buffer.len());

        let (received, _) = self.read_payload(&mut buffer[..expected])?;
        if received < expected {
            debug!("Frame incomplete: {} of {} bytes", received, header.length);
            return Err(Error::IncompleteFrame {
                declared: header.length,
                received,
            });
        }

        if header.length > expected {
            let discarded = self.discard_payload(header.length - expected)?;
            debug!(
                "Frame truncated: {} of {} bytes delivered, {} discarded",
                expected, header.length, discarded
            );
        }

        Ok(Frame::new(expected, header))
    }

    /// Phase 1: Searches the next valid header
    fn receive_header(&mut self, timeout_ms: u32) -> Result<FrameHeader, Error> {
        let mut parser = HeaderParser::new();
        self.start_deadline(timeout_ms).map_err(Error::ReceiveFailed)?;

        loop {
            if let Some(byte) = self.poll_byte().map_err(Error::ReceiveFailed)? {
                match parser.push(byte) {
                    Ok(Some(header)) => return Ok(header),
                    Ok(None) => {}
                    Err(error) => {
                        warn!("Dropping frame due to invalid header: {:?}", error);
                        return Err(Error::Framing(error));
                    }
                }
            }

            if self.deadline_elapsed().map_err(Error::ReceiveFailed)? {
                return Err(Error::ReceiveFailed(CommandError::Timeout));
            }
        }
    }

    /// Phase 2: Reads raw bytes until the buffer is full or the deadline elapsed.
    /// Returns the number of bytes read and true if the deadline elapsed.
    fn read_payload(&mut self, buffer: &mut [u8]) -> Result<(usize, bool), Error> {
        let mut position = 0;

        while position < buffer.len() {
            if self.serial.read_ready().map_err(|e| Error::ReceiveFailed(serial_error(e)))? {
                let count = self
                    .serial
                    .read(&mut buffer[position..])
                    .map_err(|e| Error::ReceiveFailed(serial_error(e)))?;

                if count > 0 {
                    position += count;
                    continue;
                }
            }

            // One-shot timers report the expiry just once
            if self.deadline_elapsed().map_err(Error::ReceiveFailed)? {
                return Ok((position, true));
            }
        }

        Ok((position, false))
    }

    /// Discards payload bytes, bounded by the running deadline.
    /// Returns the number of bytes discarded.
    fn discard_payload(&mut self, length: usize) -> Result<usize, Error> {
        let mut scratch = [0x0; 32];
        let mut discarded = 0;

        while discarded < length {
            let chunk = (length - discarded).min(scratch.len());
            let (count, elapsed) = self.read_payload(&mut scratch[..chunk])?;
            discarded += count;

            if elapsed {
                break;
            }
        }

        Ok(discarded)
    }
}
