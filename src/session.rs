//! # Connection session
//!
//! The modem either handles a single connection or up to five multiplexed connections (`AT+CIPMUX`).
//! In multiplexed mode every connection related command carries the link ID. The current mode is
//! tracked by the adapter, and any [Link] not matching the mode is refused with
//! [Error::ModeMismatch] before anything is written to the modem.
//!
//! ## Example
//!
//! ````
//! # use esp8266_at::adapter::Adapter;
//! # use esp8266_at::example::{ExampleSerial, ExampleTimer};
//! # use esp8266_at::session::{Link, LinkId, Protocol};
//! let mut serial = ExampleSerial::default();
//! serial.expect(b"AT+CIPMUX=1\r\n", b"AT+CIPMUX=1\r\r\n\r\nOK\r\n");
//! serial.expect(b"AT+CIPSTART=0,\"TCP\",\"10.0.0.1\",21\r\n", b"0,CONNECT\r\n\r\nOK\r\n");
//! serial.expect(b"AT+CIPSEND=0,6\r\n", b"\r\nOK\r\n> ");
//! serial.expect(b"hallo!", b"\r\nRecv 6 bytes\r\n\r\nSEND OK\r\n\r\n+IPD,0,16:nice to see you!");
//! serial.expect(b"AT+CIPCLOSE=0\r\n", b"0,CLOSED\r\n\r\nOK\r\n");
//!
//! let mut adapter: Adapter<_, _, 1_000_000, 256, 256> = Adapter::new(serial, ExampleTimer::default());
//! adapter.set_multiplexing(true).unwrap();
//!
//! let link = Link::Multiplexed(LinkId::new(0).unwrap());
//! adapter.open(link, Protocol::Tcp, "10.0.0.1", 21).unwrap();
//! adapter.send_data(link, b"hallo!").unwrap();
//!
//! let mut buffer = [0x0; 64];
//! let frame = adapter.receive_data(link, &mut buffer).unwrap();
//! assert_eq!(b"nice to see you!", &buffer[..frame.len()]);
//!
//! adapter.close_link(link).unwrap();
//! ````
use crate::adapter::{Adapter, CommandError, Error};
use crate::commands::{
    CloseSocketCommand, ConnectCommand, ServerCommand, ServerTimeoutCommand, SetMultipleConnectionsCommand,
    TransmissionPrepareCommand,
};
use crate::frame::{Frame, FramingError};
use crate::responses::{ALREADY_CONNECT, ERROR, LINK_IS_NOT, NO_CHANGE, SEND_FAIL, SEND_OK};
use embedded_io::{Read, ReadReady, Write};
use fugit_timer::Timer;
use log::{debug, warn};

/// Max. number of concurrent connections in multiplexed mode
pub const MAX_LINKS: usize = 5;

/// Max. idle timeout of the TCP server in seconds
pub const MAX_SERVER_TIMEOUT: u16 = 7200;

/// Connection regime of the modem
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionMode {
    /// One implicit connection, commands carry no link ID
    #[default]
    Single,

    /// Up to five connections, each command carries the link ID
    Multiplexed,
}

/// Validated link ID in [0, 4]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkId(u8);

impl LinkId {
    /// Highest valid link ID
    pub const MAX: u8 = (MAX_LINKS - 1) as u8;

    /// Returns None if the ID is out of range
    pub const fn new(id: u8) -> Option<Self> {
        if id > Self::MAX {
            return None;
        }

        Some(Self(id))
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for LinkId {
    type Error = FramingError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id).ok_or(FramingError::InvalidLinkId(id as u32))
    }
}

/// Addresses a connection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Link {
    /// The implicit connection of single connection mode
    Single,

    /// A connection of multiplexed mode
    Multiplexed(LinkId),
}

/// Transport protocol of a connection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

/// Internal connection state
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum LinkState {
    /// Link is free and may be (re)used
    #[default]
    Closed,

    /// Link was handed out as socket but is not connected yet
    Open,

    /// Connection is established
    Connected,
}

/// Connection mode and link states
#[derive(Clone, Debug, Default)]
pub(crate) struct Session {
    pub(crate) mode: ConnectionMode,

    /// State per link ID. Index 0 is used for the single connection.
    pub(crate) links: [LinkState; MAX_LINKS],
}

impl Session {
    /// Initial state after modem restart
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns the link ID to embed in commands. Fails if the link does not match the mode.
    pub(crate) fn resolve(&self, link: Link) -> Result<Option<LinkId>, Error> {
        match (self.mode, link) {
            (ConnectionMode::Single, Link::Single) => Ok(None),
            (ConnectionMode::Multiplexed, Link::Multiplexed(id)) => Ok(Some(id)),
            _ => {
                debug!("Link {:?} refused in {:?} mode", link, self.mode);
                Err(Error::ModeMismatch)
            }
        }
    }

    pub(crate) fn state(&self, link: Link) -> LinkState {
        self.links[Self::slot(link)]
    }

    pub(crate) fn set_state(&mut self, link: Link, state: LinkState) {
        self.links[Self::slot(link)] = state;
    }

    /// Returns the next free link of the current mode
    pub(crate) fn next_free(&self) -> Option<Link> {
        match self.mode {
            ConnectionMode::Single => match self.links[0] {
                LinkState::Closed => Some(Link::Single),
                _ => None,
            },
            ConnectionMode::Multiplexed => self
                .links
                .iter()
                .position(|state| *state == LinkState::Closed)
                .and_then(|index| LinkId::new(index as u8))
                .map(Link::Multiplexed),
        }
    }

    fn slot(link: Link) -> usize {
        match link {
            Link::Single => 0,
            Link::Multiplexed(id) => id.index(),
        }
    }
}

impl<S: Read + Write + ReadReady, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    Adapter<S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    /// Switches between single (false) and multiplexed (true) connection mode.
    ///
    /// The modem refuses the change while a connection exists (`Link is builded`).
    pub fn set_multiplexing(&mut self, enabled: bool) -> Result<(), Error> {
        self.send_command(SetMultipleConnectionsCommand::new(enabled))?;

        let mode = if enabled {
            ConnectionMode::Multiplexed
        } else {
            ConnectionMode::Single
        };

        if mode != self.session.mode {
            debug!("Connection mode changed to {:?}", mode);
            self.session.links = Default::default();
            self.session.mode = mode;
        }

        Ok(())
    }

    /// Opens a TCP connection or UDP transmission to the given host (IP or domain name).
    ///
    /// If the modem reports the link as already connected, the connection is reused.
    pub fn open(&mut self, link: Link, protocol: Protocol, host: &str, port: u16) -> Result<(), Error> {
        let link_id = self.session.resolve(link)?;

        let token = self.send_command(ConnectCommand::new(link_id, protocol, host, port))?;
        if token == ALREADY_CONNECT {
            debug!("Link {:?} already connected", link);
        }

        self.session.set_state(link, LinkState::Connected);
        Ok(())
    }

    /// Transmits the payload as a whole. An empty payload is not transmitted.
    ///
    /// The modem accepts max. 2048 bytes per transmission. Splitting longer payloads is up to the caller,
    /// s. [TcpClientStack](embedded_nal::TcpClientStack) implementation.
    pub fn send_data(&mut self, link: Link, data: &[u8]) -> Result<(), Error> {
        let link_id = self.session.resolve(link)?;

        if data.is_empty() {
            return Ok(());
        }

        self.send_command(TransmissionPrepareCommand::new(link_id, data.len()))?;
        self.transmit(data).map_err(Error::SendFailed)
    }

    /// Writes the payload after the prompt was received and waits for the confirmation
    fn transmit(&mut self, data: &[u8]) -> Result<(), CommandError> {
        self.write_command(data)?;
        debug!("Transmitting {} bytes", data.len());

        let timeout = self.config.send_timeout_ms;
        match self.wait_for(&[SEND_OK, SEND_FAIL, ERROR], timeout)? {
            SEND_OK => Ok(()),
            token => {
                warn!("Transmission failed: {}", token);
                Err(CommandError::Rejected)
            }
        }
    }

    /// Waits for the next frame using the configured timeouts, s. [Self::receive_data_with_timeout]
    pub fn receive_data(&mut self, link: Link, buffer: &mut [u8]) -> Result<Frame, Error> {
        let timeout = self.config.receive_timeout_ms;
        self.receive_data_with_timeout(link, buffer, timeout)
    }

    /// Waits for the next frame and copies its payload to the buffer.
    ///
    /// In single mode every frame is accepted. In multiplexed mode a frame of another link is
    /// discarded and returned as not [delivered](Frame::is_delivered), with zero length.
    /// The payload read is bounded by [payload_timeout_ms](crate::config::Config::payload_timeout_ms).
    pub fn receive_data_with_timeout(&mut self, link: Link, buffer: &mut [u8], timeout_ms: u32) -> Result<Frame, Error> {
        let link_id = self.session.resolve(link)?;
        let payload_timeout = self.config.payload_timeout_ms;

        self.receive_frame_for(link_id, buffer, timeout_ms, payload_timeout)
    }

    /// Waits for the next frame regardless of its link
    pub fn receive_any(&mut self, buffer: &mut [u8]) -> Result<Frame, Error> {
        let timeout = self.config.receive_timeout_ms;
        let payload_timeout = self.config.payload_timeout_ms;

        self.receive_frame(buffer, timeout, payload_timeout)
    }

    /// Closes the connection. The link is considered closed afterwards, even if the command failed.
    pub fn close_link(&mut self, link: Link) -> Result<(), Error> {
        let link_id = self.session.resolve(link)?;

        let result = self.send_command(CloseSocketCommand::new(link_id));
        self.session.set_state(link, LinkState::Closed);

        if result? == LINK_IS_NOT {
            debug!("Link {:?} was already closed", link);
        }

        Ok(())
    }

    /// Starts the TCP server listening on the given port. Requires multiplexed mode on modem side.
    pub fn start_server(&mut self, port: u16) -> Result<(), Error> {
        if self.send_command(ServerCommand::start(port))? == NO_CHANGE {
            debug!("Server already listening");
        }

        Ok(())
    }

    /// Stops the TCP server. The modem is restarted afterwards, as it keeps the port bound otherwise.
    pub fn stop_server(&mut self) -> Result<(), Error> {
        self.send_command(ServerCommand::stop())?;
        self.restart()
    }

    /// Sets the idle timeout in seconds of the connections accepted by the server. 0 disables the timeout.
    pub fn set_server_timeout(&mut self, seconds: u16) -> Result<(), Error> {
        if seconds > MAX_SERVER_TIMEOUT {
            return Err(Error::InvalidServerTimeout);
        }

        self.send_command(ServerTimeoutCommand::new(seconds))?;
        Ok(())
    }

    /// Returns true if the link was opened by [Self::open] and not closed since
    pub fn is_connected(&self, link: Link) -> Result<bool, Error> {
        self.session.resolve(link)?;
        Ok(self.session.state(link) == LinkState::Connected)
    }
}
