//! # Modem adapter
//!
//! [Adapter] owns the serial stream, the timer used for all deadlines, the pending response buffer
//! and the connection session. Every operation takes `&mut self`, so at most one command/response
//! exchange is in flight at any time.
//!
//! The stream may be borrowed by passing `&mut Uart`, as [embedded_io] implements its traits for
//! mutable references.
use crate::commands::AtCommand;
use crate::config::Config;
use crate::frame::FramingError;
use crate::matcher::ResponseBuffer;
use crate::session::{ConnectionMode, Session};
use embedded_io::{ErrorKind, Read, ReadReady, Write};
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use log::{debug, trace};

/// Central client for the modem
///
/// TX_SIZE: Chunk size in bytes when sending data by [TcpClientStack](embedded_nal::TcpClientStack).
/// The ESP8266 accepts max. 2048 bytes per transmission. Must not be zero, which is checked at compile time.
///
/// RX_SIZE: Capacity of the pending response buffer. Needs to hold the longest multi line response
/// which should be extracted, e.g. the access point list.
pub struct Adapter<
    S: Read + Write + ReadReady,
    T: Timer<TIMER_HZ>,
    const TIMER_HZ: u32,
    const TX_SIZE: usize,
    const RX_SIZE: usize,
> {
    /// Serial stream to the modem
    pub(crate) serial: S,

    /// Timer used for timeout measurement
    pub(crate) timer: T,

    /// Timeouts
    pub(crate) config: Config,

    /// Bytes received since the current wait started
    pub(crate) pending: ResponseBuffer<RX_SIZE>,

    /// Connection mode and link states
    pub(crate) session: Session,
}

/// Low level failure of a single command/response exchange
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Deadline elapsed without any of the expected tokens
    Timeout,

    /// Modem explicitly refused the command (e.g. ERROR, FAIL)
    Rejected,

    /// Response did not have the expected structure
    Parse,

    /// Encoded command does not fit in the command line buffer
    Overflow,

    /// Upstream serial error
    Serial(ErrorKind),

    /// Upstream timer error
    Timer,
}

/// Errors of the adapter operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Generic command exchange failed (liveness check, informational queries)
    Command(CommandError),

    /// Reset command (RST) failed
    RestartFailed(CommandError),

    /// Modem did not respond after restart within the configured attempts
    ModemUnresponsive,

    /// Querying or setting the WIFI mode failed
    WifiModeError(CommandError),

    /// Modem reported a WIFI mode which is not known
    UnknownWifiMode,

    /// Joining the access point failed
    JoinFailed(CommandError),

    /// Disconnecting from the access point failed
    LeaveFailed(CommandError),

    /// Configuring the soft access point failed
    SoftApFailed(CommandError),

    /// Obtaining the local addresses failed
    AddressError(CommandError),

    /// Given SSID is longer then the max. size of 32 chars
    InvalidSsidLength,

    /// Given password is longer then the max. size of 64 chars
    InvalidPasswordLength,

    /// Error while sending CIPMUX command for changing the connection mode
    MultiplexingFailed(CommandError),

    /// Connect command (CIPSTART) failed
    ConnectFailed(CommandError),

    /// Preparing the transmission failed (CIPSEND command)
    TransmissionStartFailed(CommandError),

    /// Transmission of data failed
    SendFailed(CommandError),

    /// Close command (CIPCLOSE) failed
    CloseFailed(CommandError),

    /// Starting or stopping the TCP server failed
    ServerFailed(CommandError),

    /// Server timeout is out of range [0, 7200]
    InvalidServerTimeout,

    /// No frame header was received or the stream failed while waiting for it
    ReceiveFailed(CommandError),

    /// Received frame header is invalid. Frame got dropped.
    Framing(FramingError),

    /// Payload of a frame did not arrive completely in time
    IncompleteFrame {
        /// Payload length announced by the header
        declared: usize,
        /// Bytes received until the deadline elapsed
        received: usize,
    },

    /// Received frame did not fit in the given buffer, the remaining bytes got discarded
    Truncated {
        /// Payload length announced by the header
        declared: usize,
        /// Bytes written to the buffer
        written: usize,
    },

    /// Link does not match the current connection mode, e.g. a link ID was given in single mode
    ModeMismatch,

    /// No socket available, since the maximum number is in use.
    NoSocketAvailable,

    /// Unable to send data if socket is not connected
    SocketUnconnected,
}

impl From<CommandError> for Error {
    fn from(error: CommandError) -> Self {
        Error::Command(error)
    }
}

impl From<FramingError> for Error {
    fn from(error: FramingError) -> Self {
        Error::Framing(error)
    }
}

impl<S: Read + Write + ReadReady, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    Adapter<S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    const VALID_TX_SIZE: () = assert!(TX_SIZE > 0, "TX_SIZE must be greater than zero");

    /// Creates a new adapter using the default timeouts. Modem is assumed to be in single connection mode.
    pub fn new(serial: S, timer: T) -> Self {
        Self::with_config(serial, timer, Config::default())
    }

    /// Creates a new adapter using the given timeouts
    pub fn with_config(serial: S, timer: T, config: Config) -> Self {
        let () = Self::VALID_TX_SIZE;

        Self {
            serial,
            timer,
            config,
            pending: ResponseBuffer::new(),
            session: Session::default(),
        }
    }

    /// Returns the current timeouts
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the timeouts
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Sets the timeout for sending data in ms
    pub fn set_send_timeout_ms(&mut self, timeout: u32) {
        self.config.send_timeout_ms = timeout;
    }

    /// Returns the connection mode the modem is currently in
    pub fn mode(&self) -> ConnectionMode {
        self.session.mode
    }

    /// Releases serial stream and timer
    pub fn release(self) -> (S, T) {
        (self.serial, self.timer)
    }

    /// Sends a command, waits for one of its tokens and maps the error if the command failed.
    /// Returns the matched token.
    pub(crate) fn send_command<Cmd: AtCommand>(&mut self, command: Cmd) -> Result<&'static str, Error> {
        let timeout = command.timeout_ms(&self.config);
        self.exchange(&command, timeout).map_err(|error| command.command_error(error))
    }

    fn exchange<Cmd: AtCommand>(&mut self, command: &Cmd, timeout: u32) -> Result<&'static str, CommandError> {
        let line = command.encode()?;
        debug!("Sending AT{} ({} bytes)", Cmd::NAME, line.len());

        self.write_command(line.as_bytes())?;
        let token = self.wait_for(command.tokens(), timeout)?;

        if command.rejections().contains(&token) {
            debug!("AT{} rejected by \"{}\"", Cmd::NAME, token);
            return Err(CommandError::Rejected);
        }

        trace!("AT{} completed by \"{}\"", Cmd::NAME, token);
        Ok(token)
    }

    /// Drains stale input and writes the given bytes
    pub(crate) fn write_command(&mut self, bytes: &[u8]) -> Result<(), CommandError> {
        self.flush_input()?;
        self.serial.write_all(bytes).map_err(serial_error)?;
        self.serial.flush().map_err(serial_error)
    }

    /// Returns the next byte if one is available without blocking
    pub(crate) fn poll_byte(&mut self) -> Result<Option<u8>, CommandError> {
        if !self.serial.read_ready().map_err(serial_error)? {
            return Ok(None);
        }

        let mut byte = [0x0; 1];
        match self.serial.read(&mut byte).map_err(serial_error)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Starts a new deadline
    pub(crate) fn start_deadline(&mut self, timeout_ms: u32) -> Result<(), CommandError> {
        self.timer
            .start(TimerDurationU32::millis(timeout_ms))
            .map_err(|_| CommandError::Timer)
    }

    /// Returns true if the deadline started last has elapsed
    pub(crate) fn deadline_elapsed(&mut self) -> Result<bool, CommandError> {
        match self.timer.wait() {
            Ok(_) => Ok(true),
            Err(nb::Error::WouldBlock) => Ok(false),
            Err(nb::Error::Other(_)) => Err(CommandError::Timer),
        }
    }

    /// Blocks for the given duration
    pub(crate) fn delay_ms(&mut self, duration_ms: u32) -> Result<(), CommandError> {
        self.start_deadline(duration_ms)?;
        nb::block!(self.timer.wait()).map_err(|_| CommandError::Timer)
    }
}

/// Maps any serial error to its kind
pub(crate) fn serial_error<E: embedded_io::Error>(error: E) -> CommandError {
    CommandError::Serial(error.kind())
}
