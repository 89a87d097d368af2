//! # WIFI configuration
//!
//! Joining or hosting a network, querying the module and the restart sequence.
//!
//! Note: Changing the WIFI mode restarts the modem, which drops all connections and resets the
//! connection mode to single.
//!
//! ## Example
//!
//! ````
//! # use esp8266_at::adapter::Adapter;
//! # use esp8266_at::example::{ExampleSerial, ExampleTimer};
//! # use esp8266_at::wifi::WifiAdapter;
//! let mut serial = ExampleSerial::default();
//! serial.expect(b"AT+CWJAP=\"test_wifi\",\"secret\"\r\n", b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");
//! serial.expect(
//!     b"AT+CIFSR\r\n",
//!     b"AT+CIFSR\r\r\n+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n",
//! );
//!
//! let mut adapter: Adapter<_, _, 1_000_000, 256, 256> = Adapter::new(serial, ExampleTimer::default());
//! adapter.join("test_wifi", "secret").unwrap();
//!
//! let address = adapter.get_address().unwrap();
//! assert_eq!("10:fe:ed:05:ba:50", address.station_mac.unwrap().as_str());
//! assert_eq!("10.0.0.181", address.station_ipv4.unwrap().to_string());
//! ````
use crate::adapter::{Adapter, CommandError, Error};
use crate::commands::{
    AccessPointConnectCommand, AccessPointDisconnectCommand, AliveCommand, AtCommand, ConnectionStatusCommand,
    ListAccessPointsCommand, ListStationsCommand, ObtainLocalAddressCommand, RestartCommand, SoftApCommand,
    VersionCommand, WifiModeCommand, WifiModeQueryCommand,
};
use crate::responses::{BLOCK_END, ECHO_END, ERROR, OK};
use core::fmt::Debug;
use core::net::Ipv4Addr;
use core::str::FromStr;
use embedded_io::{Read, ReadReady, Write};
use fugit_timer::Timer;
use heapless::String;
use log::{debug, warn};

/// Max. length of the SSID
pub const MAX_SSID_LEN: usize = 32;

/// Max. length of the password
pub const MAX_PASSWORD_LEN: usize = 64;

/// Wifi network adapter trait
pub trait WifiAdapter {
    /// Error of the WIFI operations
    type Error: Debug;

    /// Connects to an WIFI access point
    fn join(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;

    /// Disconnects from the current access point
    fn leave(&mut self) -> Result<(), Self::Error>;

    /// Returns local address information
    fn get_address(&mut self) -> Result<LocalAddress, Self::Error>;
}

/// WIFI operation mode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WifiMode {
    /// Joins other access points
    Station = 1,

    /// Hosts an access point
    SoftAp = 2,

    /// Both station and access point
    StationSoftAp = 3,
}

impl TryFrom<u8> for WifiMode {
    type Error = Error;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            1 => Ok(WifiMode::Station),
            2 => Ok(WifiMode::SoftAp),
            3 => Ok(WifiMode::StationSoftAp),
            _ => Err(Error::UnknownWifiMode),
        }
    }
}

/// Encryption of the soft access point
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Encryption {
    Open = 0,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
}

/// Local IP and MAC addresses
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct LocalAddress {
    /// Station IPv4 address if assigned
    pub station_ipv4: Option<Ipv4Addr>,

    /// Soft access point IPv4 address if enabled
    pub soft_ap_ipv4: Option<Ipv4Addr>,

    /// Station MAC address
    pub station_mac: Option<String<17>>,
}

impl LocalAddress {
    /// Parses a single `+CIFSR:<type>,"<address>"` line. Unknown address types are ignored.
    pub(crate) fn parse_line(&mut self, line: &str) -> Result<(), Error> {
        let Some(entry) = line.trim().strip_prefix("+CIFSR:") else {
            return Ok(());
        };

        let (kind, address) = entry.split_once(',').ok_or(Error::AddressError(CommandError::Parse))?;
        let address = address.trim_matches('"');

        match kind {
            "STAIP" => self.station_ipv4 = Some(parse_ipv4(address)?),
            "APIP" => self.soft_ap_ipv4 = Some(parse_ipv4(address)?),
            "STAMAC" => {
                self.station_mac =
                    Some(String::from_str(address).map_err(|_| Error::AddressError(CommandError::Parse))?)
            }
            _ => {}
        }

        Ok(())
    }
}

fn parse_ipv4(address: &str) -> Result<Ipv4Addr, Error> {
    Ipv4Addr::from_str(address).map_err(|_| Error::AddressError(CommandError::Parse))
}

impl<S: Read + Write + ReadReady, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    WifiAdapter for Adapter<S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    type Error = Error;

    /// Joins the given access point. Credentials are not logged.
    ///
    /// Requires station mode, s. [Adapter::set_wifi_mode].
    fn join(&mut self, ssid: &str, password: &str) -> Result<(), Error> {
        if ssid.len() > MAX_SSID_LEN {
            return Err(Error::InvalidSsidLength);
        }

        if password.len() > MAX_PASSWORD_LEN {
            return Err(Error::InvalidPasswordLength);
        }

        self.send_command(AccessPointConnectCommand::new(ssid, password))?;
        debug!("Joined access point");
        Ok(())
    }

    fn leave(&mut self) -> Result<(), Error> {
        self.send_command(AccessPointDisconnectCommand)?;
        Ok(())
    }

    /// Returns the station IP and MAC address and the soft access point IP
    fn get_address(&mut self) -> Result<LocalAddress, Error> {
        let mut address = LocalAddress::default();
        let timeout = self.config.command_timeout_ms;

        let line = ObtainLocalAddressCommand.encode().map_err(Error::AddressError)?;
        self.write_command(line.as_bytes()).map_err(Error::AddressError)?;

        loop {
            let line = self.read_line_until(b'\n', timeout).map_err(|error| match error {
                Error::Command(error) => Error::AddressError(error),
                error => error,
            })?;

            match line.trim() {
                OK => return Ok(address),
                ERROR => return Err(Error::AddressError(CommandError::Rejected)),
                _ => {}
            }

            address.parse_line(line)?;
        }
    }
}

impl<S: Read + Write + ReadReady, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    Adapter<S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    /// Checks if the modem is responsive
    pub fn kick(&mut self) -> Result<(), Error> {
        self.send_command(AliveCommand)?;
        Ok(())
    }

    /// Restarts the modem and waits until it is responsive again.
    ///
    /// All connections are dropped and the connection mode is reset to single.
    pub fn restart(&mut self) -> Result<(), Error> {
        self.send_command(RestartCommand)?;
        self.session.reset();

        let policy = self.config.restart;
        self.delay_ms(policy.settle_ms).map_err(Error::RestartFailed)?;

        for attempt in 1..=policy.attempts {
            match self.kick() {
                Ok(()) => {
                    debug!("Modem ready after {} attempt(s)", attempt);
                    return self.delay_ms(policy.stabilize_ms).map_err(Error::RestartFailed);
                }
                Err(Error::Command(CommandError::Timeout | CommandError::Rejected)) => {
                    warn!("Modem not ready after restart ({}/{})", attempt, policy.attempts);
                    self.delay_ms(policy.poll_interval_ms).map_err(Error::RestartFailed)?;
                }
                Err(error) => return Err(error),
            }
        }

        Err(Error::ModemUnresponsive)
    }

    /// Returns the current WIFI mode
    pub fn get_wifi_mode(&mut self) -> Result<WifiMode, Error> {
        let mode = self.send_query(WifiModeQueryCommand, "+CWMODE:", BLOCK_END)?;
        let mode = u8::from_str(mode.trim()).map_err(|_| Error::WifiModeError(CommandError::Parse))?;

        WifiMode::try_from(mode)
    }

    /// Sets the WIFI mode. The modem is restarted if the mode changes.
    pub fn set_wifi_mode(&mut self, mode: WifiMode) -> Result<(), Error> {
        if self.get_wifi_mode()? == mode {
            return Ok(());
        }

        self.send_command(WifiModeCommand::new(mode))?;
        debug!("WIFI mode set to {:?}, restarting", mode);
        self.restart()
    }

    /// Configures the soft access point. Requires soft AP mode, s. [Self::set_wifi_mode].
    pub fn set_soft_ap(&mut self, ssid: &str, password: &str, channel: u8, encryption: Encryption) -> Result<(), Error> {
        if ssid.len() > MAX_SSID_LEN {
            return Err(Error::InvalidSsidLength);
        }

        if password.len() > MAX_PASSWORD_LEN {
            return Err(Error::InvalidPasswordLength);
        }

        self.send_command(SoftApCommand::new(ssid, password, channel, encryption as u8))?;
        Ok(())
    }

    /// Returns the firmware version information
    pub fn version(&mut self) -> Result<&str, Error> {
        self.send_query(VersionCommand, ECHO_END, BLOCK_END)
    }

    /// Returns the raw list of visible access points, one `+CWLAP:` line per access point
    pub fn access_points(&mut self) -> Result<&str, Error> {
        self.send_query(ListAccessPointsCommand, ECHO_END, BLOCK_END)
    }

    /// Returns the raw list of stations joined to the soft access point
    pub fn joined_stations(&mut self) -> Result<&str, Error> {
        self.send_query(ListStationsCommand, ECHO_END, BLOCK_END)
    }

    /// Returns the raw connection status
    pub fn connection_status(&mut self) -> Result<&str, Error> {
        self.send_query(ConnectionStatusCommand, ECHO_END, BLOCK_END)
    }
}
