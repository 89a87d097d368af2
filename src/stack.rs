//! # TCP client stack
//!
//! This crate implements [TcpClientStack] of [embedded_nal] on top of the connection session.
//!
//! Sockets are allocated in the connection mode the modem is currently in. In single mode just one
//! socket is available, in multiplexed mode up to five. Payloads are split in chunks of TX_SIZE bytes,
//! s. [Adapter] for more details.
//!
//! ## Example
//!
//! ````
//! # use core::str::FromStr;
//! # use core::net::SocketAddr;
//! # use embedded_nal::TcpClientStack;
//! # use esp8266_at::adapter::Adapter;
//! # use esp8266_at::example::{ExampleSerial, ExampleTimer};
//! let mut serial = ExampleSerial::default();
//! serial.expect(b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21\r\n", b"CONNECT\r\n\r\nOK\r\n");
//! serial.expect(b"AT+CIPSEND=6\r\n", b"\r\nOK\r\n> ");
//! serial.expect(b"hallo!", b"\r\nRecv 6 bytes\r\n\r\nSEND OK\r\n\r\n+IPD,16:nice to see you!");
//! serial.expect(b"AT+CIPCLOSE\r\n", b"CLOSED\r\n\r\nOK\r\n");
//!
//! let mut adapter: Adapter<_, _, 1_000_000, 1024, 1024> = Adapter::new(serial, ExampleTimer::default());
//!
//! // Creating a TCP connection
//! let mut socket = adapter.socket().unwrap();
//! adapter.connect(&mut socket, SocketAddr::from_str("10.0.0.1:21").unwrap()).unwrap();
//!
//! // Sending some data
//! adapter.send(&mut socket, b"hallo!").unwrap();
//!
//! // Receiving some data
//! let mut rx_buffer = [0x0; 64];
//! let length = adapter.receive(&mut socket, &mut rx_buffer).unwrap();
//! assert_eq!(16, length);
//! assert_eq!(b"nice to see you!", &rx_buffer[..16]);
//!
//! // Closing socket
//! adapter.close(socket).unwrap();
//! ````
use crate::adapter::{Adapter, CommandError, Error};
use crate::session::{Link, LinkState, Protocol};
use core::fmt::Write as _;
use core::net::SocketAddr;
use embedded_io::{Read, ReadReady, Write};
use embedded_nal::{TcpClientStack, TcpError, TcpErrorKind};
use fugit_timer::Timer;
use heapless::String;

/// Max. length of a formatted IP address
const MAX_HOST_LEN: usize = 39;

/// Unique socket for a network connection
#[derive(Debug)]
pub struct Socket {
    /// Link the socket is bound to
    pub(crate) link: Link,
}

impl Socket {
    pub(crate) fn new(link: Link) -> Self {
        Self { link }
    }

    /// Returns the link the socket is bound to
    pub fn link(&self) -> Link {
        self.link
    }
}

impl TcpError for Error {
    fn kind(&self) -> TcpErrorKind {
        match self {
            Error::SocketUnconnected | Error::SendFailed(CommandError::Rejected) => TcpErrorKind::PipeClosed,
            _ => TcpErrorKind::Other,
        }
    }
}

impl<S: Read + Write + ReadReady, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    TcpClientStack for Adapter<S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    type TcpSocket = Socket;
    type Error = Error;

    /// Returns a new socket of the current connection mode.
    /// If no link is available [Error::NoSocketAvailable] is returned.
    fn socket(&mut self) -> Result<Self::TcpSocket, Self::Error> {
        let link = self.session.next_free().ok_or(Error::NoSocketAvailable)?;
        self.session.set_state(link, LinkState::Open);

        Ok(Socket::new(link))
    }

    /// Opens a new TCP connection. IPv6 addresses are passed to the modem, but are not supported
    /// by ESP8266 firmware.
    fn connect(&mut self, socket: &mut Socket, remote: SocketAddr) -> nb::Result<(), Self::Error> {
        let mut host: String<MAX_HOST_LEN> = String::new();
        write!(host, "{}", remote.ip()).map_err(|_| Error::ConnectFailed(CommandError::Overflow))?;

        self.open(socket.link, Protocol::Tcp, &host, remote.port())?;
        Ok(())
    }

    /// Sends the given buffer and returns the length (in bytes) sent.
    /// The data is divided into smaller blocks. The block size is determined by the generic constant TX_SIZE.
    fn send(&mut self, socket: &mut Socket, buffer: &[u8]) -> nb::Result<usize, Error> {
        if self.session.state(socket.link) != LinkState::Connected {
            return Err(nb::Error::Other(Error::SocketUnconnected));
        }

        for chunk in buffer.chunks(TX_SIZE) {
            self.send_data(socket.link, chunk)?;
        }

        Ok(buffer.len())
    }

    /// Receives the next frame of the socket.
    ///
    /// Returns [nb::Error::WouldBlock] if no frame arrived in time or the frame belongs to another
    /// socket. Returns [Error::Truncated] if the frame does not fit in the buffer.
    fn receive(&mut self, socket: &mut Self::TcpSocket, buffer: &mut [u8]) -> nb::Result<usize, Self::Error> {
        match self.receive_data(socket.link, buffer) {
            Ok(frame) if !frame.is_delivered() => Err(nb::Error::WouldBlock),
            Ok(frame) => Ok(frame.complete()?),
            Err(Error::ReceiveFailed(CommandError::Timeout)) => Err(nb::Error::WouldBlock),
            Err(error) => Err(nb::Error::Other(error)),
        }
    }

    /// Closes a socket
    ///
    /// If the socket is not connected, no command is sent to the modem. The socket is released in
    /// any case, so that it can be reused.
    fn close(&mut self, socket: Self::TcpSocket) -> Result<(), Self::Error> {
        if self.session.state(socket.link) != LinkState::Connected {
            self.session.set_state(socket.link, LinkState::Closed);
            return Ok(());
        }

        self.close_link(socket.link)
    }
}
