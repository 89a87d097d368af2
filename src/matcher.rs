//! # Response matcher
//!
//! Command responses are matched by accumulating the inbound bytes until one of the expected tokens
//! shows up. As every byte is checked right after it got appended, a token can only become
//! present at the end of the accumulated response. So a suffix comparison per token is sufficient.
//!
//! ## Example
//!
//! ````
//! # use esp8266_at::adapter::Adapter;
//! # use esp8266_at::example::{ExampleSerial, ExampleTimer};
//! let mut serial = ExampleSerial::default();
//! serial.expect(b"AT+CWMODE?\r\n", b"AT+CWMODE?\r\r\n+CWMODE:1\r\n\r\nOK\r\n");
//!
//! let mut adapter: Adapter<_, _, 1_000_000, 256, 256> = Adapter::new(serial, ExampleTimer::default());
//! adapter.send_raw(b"AT+CWMODE?\r\n").unwrap();
//!
//! let mode = adapter.extract_between("OK", "+CWMODE:", "\r\n\r\nOK", 1_000).unwrap();
//! assert_eq!("1", mode);
//! ````
use crate::adapter::{serial_error, Adapter, CommandError, Error};
use crate::commands::AtCommand;
use crate::responses::{ERROR, OK};
use embedded_io::{Read, ReadReady, Write};
use fugit_timer::Timer;
use heapless::Vec;
use log::{trace, warn};

/// Pending response, i.e. bytes received since the current wait was started
pub(crate) struct ResponseBuffer<const CAPACITY: usize> {
    bytes: Vec<u8, CAPACITY>,

    /// True if bytes got dropped due to an overflow since last clear
    overflowed: bool,
}

impl<const CAPACITY: usize> ResponseBuffer<CAPACITY> {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            overflowed: false,
        }
    }

    /// Appends a byte. If the buffer is full, the older half is dropped, so at least the newest
    /// CAPACITY / 2 bytes are retained.
    pub fn push(&mut self, byte: u8) {
        if CAPACITY == 0 {
            return;
        }

        if self.bytes.is_full() {
            if !self.overflowed {
                warn!("Response exceeds buffer of {} bytes, dropping oldest bytes", CAPACITY);
                self.overflowed = true;
            }
            self.compact();
        }

        // Space is guaranteed by the compaction above
        let _ = self.bytes.push(byte);
    }

    /// Moves the newer half to the front
    fn compact(&mut self) {
        let keep = CAPACITY / 2;
        let length = self.bytes.len();

        self.bytes.copy_within(length - keep.., 0);
        self.bytes.truncate(keep);
    }

    /// Returns true if the response ends with the given token
    pub fn ends_with(&self, token: &str) -> bool {
        self.bytes.ends_with(token.as_bytes())
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.overflowed = false;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the text strictly between the first occurrence of `begin` and the first occurrence of `end`
    pub fn between(&self, begin: &str, end: &str) -> Result<&str, CommandError> {
        let start = find(&self.bytes, begin.as_bytes()).ok_or(CommandError::Parse)? + begin.len();
        let stop = find(&self.bytes, end.as_bytes()).ok_or(CommandError::Parse)?;

        if stop < start {
            return Err(CommandError::Parse);
        }

        core::str::from_utf8(&self.bytes[start..stop]).map_err(|_| CommandError::Parse)
    }
}

/// Returns the index of the first occurrence of needle
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }

    haystack.windows(needle.len()).position(|window| window == needle)
}

impl<S: Read + Write + ReadReady, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    Adapter<S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    /// Blocks until one of the given tokens is received and returns the matched token.
    ///
    /// The tokens are checked in the given order, so the first listed token wins if several tokens
    /// complete with the same byte. Returns [CommandError::Timeout] if none of the tokens was received
    /// before the timeout elapsed. Nothing is written, issuing the command is up to the caller.
    pub fn await_token<'a>(&mut self, tokens: &[&'a str], timeout_ms: u32) -> Result<&'a str, Error> {
        Ok(self.wait_for(tokens, timeout_ms)?)
    }

    /// Waits for `confirmation` and returns the text between `begin` and `end` of the response.
    ///
    /// Returns [CommandError::Parse] if any of the markers is missing or `end` is located before the
    /// end of `begin`.
    pub fn extract_between(&mut self, confirmation: &str, begin: &str, end: &str, timeout_ms: u32) -> Result<&str, Error> {
        self.wait_for(&[confirmation], timeout_ms)?;
        Ok(self.pending.between(begin, end)?)
    }

    /// Reads until the given delimiter and returns the line without the delimiter.
    /// NUL bytes are dropped.
    pub fn read_line_until(&mut self, delimiter: u8, timeout_ms: u32) -> Result<&str, Error> {
        self.pending.clear();
        self.start_deadline(timeout_ms)?;

        loop {
            match self.poll_byte()? {
                Some(byte) if byte == delimiter => break,
                Some(0x0) | None => {}
                Some(byte) => self.pending.push(byte),
            }

            if self.deadline_elapsed()? {
                self.pending.clear();
                return Err(Error::Command(CommandError::Timeout));
            }
        }

        Ok(core::str::from_utf8(self.pending.as_bytes()).map_err(|_| CommandError::Parse)?)
    }

    /// Discards stale input and writes the given bytes unmodified
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        Ok(self.write_command(bytes)?)
    }

    /// Sends the given command and returns the text between `begin` and `end` of its response
    pub(crate) fn send_query<Cmd: AtCommand>(&mut self, command: Cmd, begin: &str, end: &str) -> Result<&str, Error> {
        let timeout = command.timeout_ms(&self.config);

        match self.query(&command, begin, end, timeout) {
            Ok(range) => Ok(range),
            Err(error) => Err(command.command_error(error)),
        }
    }

    fn query<Cmd: AtCommand>(&mut self, command: &Cmd, begin: &str, end: &str, timeout: u32) -> Result<&str, CommandError> {
        let line = command.encode()?;
        self.write_command(line.as_bytes())?;

        if self.wait_for(&[OK, ERROR], timeout)? == ERROR {
            return Err(CommandError::Rejected);
        }

        self.pending.between(begin, end)
    }

    /// Matching loop of [Self::await_token]. The accumulated response is kept until the next wait,
    /// so that it can be inspected after a match.
    pub(crate) fn wait_for<'a>(&mut self, tokens: &[&'a str], timeout_ms: u32) -> Result<&'a str, CommandError> {
        self.pending.clear();
        self.start_deadline(timeout_ms)?;

        loop {
            if let Some(byte) = self.poll_byte()? {
                if byte != 0x0 {
                    self.pending.push(byte);

                    if let Some(token) = tokens.iter().find(|token| self.pending.ends_with(token)) {
                        trace!("Matched token \"{}\"", token);
                        return Ok(*token);
                    }
                }
            }

            if self.deadline_elapsed()? {
                trace!("No token matched within {} ms", timeout_ms);
                self.pending.clear();
                return Err(CommandError::Timeout);
            }
        }
    }

    /// Discards all bytes which are available without blocking
    pub(crate) fn flush_input(&mut self) -> Result<(), CommandError> {
        let mut buffer = [0x0; 32];
        let mut discarded = 0;

        while self.serial.read_ready().map_err(serial_error)? {
            match self.serial.read(&mut buffer).map_err(serial_error)? {
                0 => break,
                count => discarded += count,
            }
        }

        if discarded > 0 {
            trace!("Discarded {} stale bytes", discarded);
        }

        Ok(())
    }
}
