use crate::adapter::{CommandError, Error};
use crate::config::Config;
use crate::responses::{ALREADY_CONNECT, ERROR, FAIL, LINK_IS_BUILDED, LINK_IS_NOT, NO_CHANGE, OK, PROMPT};
use crate::session::{LinkId, Protocol};
use crate::wifi::WifiMode;
use heapless::Vec;
use numtoa::NumToA;

/// Max. length of an encoded command line incl. CRLF
pub(crate) const MAX_LINE_LEN: usize = 256;

/// Trait for mapping command errors
pub(crate) trait CommandErrorHandler {
    /// Maps the exchange error to the error of the operation
    fn command_error(&self, error: CommandError) -> Error;
}

/// A single line AT command
pub(crate) trait AtCommand: CommandErrorHandler {
    /// Command name following the `AT` prefix, e.g. `+CIPMUX`
    const NAME: &'static str;

    /// Appends the command arguments
    fn write_args(&self, _line: &mut CommandLine) -> Result<(), CommandError> {
        Ok(())
    }

    /// Tokens terminating the response. First listed token wins if several match at once.
    fn tokens(&self) -> &'static [&'static str] {
        &[OK, ERROR]
    }

    /// Subset of [Self::tokens] signaling that the modem refused the command
    fn rejections(&self) -> &'static [&'static str] {
        &[ERROR]
    }

    /// Response timeout
    fn timeout_ms(&self, config: &Config) -> u32 {
        config.command_timeout_ms
    }

    /// Encodes the full command line incl. CRLF
    fn encode(&self) -> Result<CommandLine, CommandError> {
        let mut line = CommandLine::new(Self::NAME)?;
        self.write_args(&mut line)?;
        line.terminate()?;
        Ok(line)
    }
}

/// Encoding buffer of a single command line
pub(crate) struct CommandLine {
    bytes: Vec<u8, MAX_LINE_LEN>,

    /// Number of arguments written so far
    args: usize,
}

impl CommandLine {
    pub fn new(name: &str) -> Result<Self, CommandError> {
        let mut line = Self {
            bytes: Vec::new(),
            args: 0,
        };

        line.push(b"AT")?;
        line.push(name.as_bytes())?;
        Ok(line)
    }

    /// Appends an unquoted decimal argument
    pub fn number(&mut self, value: u32) -> Result<(), CommandError> {
        self.separator()?;
        let mut buffer = [0x0; 20];
        self.push(value.numtoa(10, &mut buffer))
    }

    /// Appends a quoted string argument. Quotes, commas and backslashes get escaped.
    pub fn quoted(&mut self, value: &str) -> Result<(), CommandError> {
        self.separator()?;
        self.push_byte(b'"')?;

        for byte in value.bytes() {
            if matches!(byte, b'"' | b',' | b'\\') {
                self.push_byte(b'\\')?;
            }
            self.push_byte(byte)?;
        }

        self.push_byte(b'"')
    }

    /// Appends the line end
    pub fn terminate(&mut self) -> Result<(), CommandError> {
        self.push(b"\r\n")
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    fn separator(&mut self) -> Result<(), CommandError> {
        let separator = if self.args == 0 { b'=' } else { b',' };
        self.args += 1;
        self.push_byte(separator)
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), CommandError> {
        self.bytes.extend_from_slice(bytes).map_err(|_| CommandError::Overflow)
    }

    fn push_byte(&mut self, byte: u8) -> Result<(), CommandError> {
        self.bytes.push(byte).map_err(|_| CommandError::Overflow)
    }
}

/// Liveness check
pub(crate) struct AliveCommand;

impl AtCommand for AliveCommand {
    const NAME: &'static str = "";
}

impl CommandErrorHandler for AliveCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::Command(error)
    }
}

/// Restarts the module
pub(crate) struct RestartCommand;

impl AtCommand for RestartCommand {
    const NAME: &'static str = "+RST";
}

impl CommandErrorHandler for RestartCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::RestartFailed(error)
    }
}

/// Queries the firmware version
pub(crate) struct VersionCommand;

impl AtCommand for VersionCommand {
    const NAME: &'static str = "+GMR";
}

impl CommandErrorHandler for VersionCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::Command(error)
    }
}

/// Queries the current WIFI mode
pub(crate) struct WifiModeQueryCommand;

impl AtCommand for WifiModeQueryCommand {
    const NAME: &'static str = "+CWMODE?";
}

impl CommandErrorHandler for WifiModeQueryCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::WifiModeError(error)
    }
}

/// Sets the WIFI mode
pub(crate) struct WifiModeCommand {
    mode: WifiMode,
}

impl WifiModeCommand {
    pub fn new(mode: WifiMode) -> Self {
        Self { mode }
    }
}

impl AtCommand for WifiModeCommand {
    const NAME: &'static str = "+CWMODE";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        line.number(self.mode as u32)
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[OK, NO_CHANGE, ERROR]
    }
}

impl CommandErrorHandler for WifiModeCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::WifiModeError(error)
    }
}

/// Command for joining a WIFI access point
pub(crate) struct AccessPointConnectCommand<'a> {
    /// The SSID of the target access point
    ssid: &'a str,

    /// The password/key of the target access point
    password: &'a str,
}

impl<'a> AccessPointConnectCommand<'a> {
    pub fn new(ssid: &'a str, password: &'a str) -> Self {
        Self { ssid, password }
    }
}

impl AtCommand for AccessPointConnectCommand<'_> {
    const NAME: &'static str = "+CWJAP";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        line.quoted(self.ssid)?;
        line.quoted(self.password)
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[OK, FAIL, ERROR]
    }

    fn rejections(&self) -> &'static [&'static str] {
        &[FAIL, ERROR]
    }

    fn timeout_ms(&self, config: &Config) -> u32 {
        config.join_timeout_ms
    }
}

impl CommandErrorHandler for AccessPointConnectCommand<'_> {
    fn command_error(&self, error: CommandError) -> Error {
        Error::JoinFailed(error)
    }
}

/// Disconnects from the current access point
pub(crate) struct AccessPointDisconnectCommand;

impl AtCommand for AccessPointDisconnectCommand {
    const NAME: &'static str = "+CWQAP";
}

impl CommandErrorHandler for AccessPointDisconnectCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::LeaveFailed(error)
    }
}

/// Lists the available access points
pub(crate) struct ListAccessPointsCommand;

impl AtCommand for ListAccessPointsCommand {
    const NAME: &'static str = "+CWLAP";

    fn timeout_ms(&self, config: &Config) -> u32 {
        config.list_timeout_ms
    }
}

impl CommandErrorHandler for ListAccessPointsCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::Command(error)
    }
}

/// Configures the soft access point
pub(crate) struct SoftApCommand<'a> {
    ssid: &'a str,
    password: &'a str,

    /// WIFI channel
    channel: u8,

    /// Encryption: 0 = open, 2 = WPA_PSK, 3 = WPA2_PSK, 4 = WPA_WPA2_PSK
    encryption: u8,
}

impl<'a> SoftApCommand<'a> {
    pub fn new(ssid: &'a str, password: &'a str, channel: u8, encryption: u8) -> Self {
        Self {
            ssid,
            password,
            channel,
            encryption,
        }
    }
}

impl AtCommand for SoftApCommand<'_> {
    const NAME: &'static str = "+CWSAP";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        line.quoted(self.ssid)?;
        line.quoted(self.password)?;
        line.number(self.channel as u32)?;
        line.number(self.encryption as u32)
    }

    fn timeout_ms(&self, config: &Config) -> u32 {
        config.soft_ap_timeout_ms
    }
}

impl CommandErrorHandler for SoftApCommand<'_> {
    fn command_error(&self, error: CommandError) -> Error {
        Error::SoftApFailed(error)
    }
}

/// Lists the stations joined to the soft access point
pub(crate) struct ListStationsCommand;

impl AtCommand for ListStationsCommand {
    const NAME: &'static str = "+CWLIF";
}

impl CommandErrorHandler for ListStationsCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::Command(error)
    }
}

/// Queries the connection status
pub(crate) struct ConnectionStatusCommand;

impl AtCommand for ConnectionStatusCommand {
    const NAME: &'static str = "+CIPSTATUS";
}

impl CommandErrorHandler for ConnectionStatusCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::Command(error)
    }
}

/// Command for receiving local address information
pub(crate) struct ObtainLocalAddressCommand;

impl AtCommand for ObtainLocalAddressCommand {
    const NAME: &'static str = "+CIFSR";
}

impl CommandErrorHandler for ObtainLocalAddressCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::AddressError(error)
    }
}

/// Enables/Disables multiple connections
pub(crate) struct SetMultipleConnectionsCommand {
    /// 0: single connection, 1: multiple connections
    mode: u32,
}

impl SetMultipleConnectionsCommand {
    pub fn new(enabled: bool) -> Self {
        Self { mode: enabled as u32 }
    }
}

impl AtCommand for SetMultipleConnectionsCommand {
    const NAME: &'static str = "+CIPMUX";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        line.number(self.mode)
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[OK, LINK_IS_BUILDED, ERROR]
    }

    fn rejections(&self) -> &'static [&'static str] {
        &[LINK_IS_BUILDED, ERROR]
    }
}

impl CommandErrorHandler for SetMultipleConnectionsCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::MultiplexingFailed(error)
    }
}

/// Establishes a TCP connection or UDP transmission
pub(crate) struct ConnectCommand<'a> {
    /// Link ID, only given in multiplexed mode
    link_id: Option<LinkId>,

    /// Connection type
    protocol: Protocol,

    /// Remote IP address or domain name
    remote_host: &'a str,

    /// Remote port
    port: u16,
}

impl<'a> ConnectCommand<'a> {
    pub fn new(link_id: Option<LinkId>, protocol: Protocol, remote_host: &'a str, port: u16) -> Self {
        Self {
            link_id,
            protocol,
            remote_host,
            port,
        }
    }
}

impl AtCommand for ConnectCommand<'_> {
    const NAME: &'static str = "+CIPSTART";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        if let Some(link_id) = self.link_id {
            line.number(link_id.get() as u32)?;
        }

        line.quoted(self.protocol.as_str())?;
        line.quoted(self.remote_host)?;
        line.number(self.port as u32)
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[OK, ERROR, ALREADY_CONNECT]
    }

    fn timeout_ms(&self, config: &Config) -> u32 {
        config.connect_timeout_ms
    }
}

impl CommandErrorHandler for ConnectCommand<'_> {
    fn command_error(&self, error: CommandError) -> Error {
        Error::ConnectFailed(error)
    }
}

/// Announces a transmission of the given length, answered by the send prompt
pub(crate) struct TransmissionPrepareCommand {
    link_id: Option<LinkId>,
    length: usize,
}

impl TransmissionPrepareCommand {
    pub fn new(link_id: Option<LinkId>, length: usize) -> Self {
        Self { link_id, length }
    }
}

impl AtCommand for TransmissionPrepareCommand {
    const NAME: &'static str = "+CIPSEND";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        if let Some(link_id) = self.link_id {
            line.number(link_id.get() as u32)?;
        }

        let length = u32::try_from(self.length).map_err(|_| CommandError::Overflow)?;
        line.number(length)
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[PROMPT, ERROR]
    }

    fn timeout_ms(&self, config: &Config) -> u32 {
        config.prompt_timeout_ms
    }
}

impl CommandErrorHandler for TransmissionPrepareCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::TransmissionStartFailed(error)
    }
}

/// Closes a connection
pub(crate) struct CloseSocketCommand {
    link_id: Option<LinkId>,
}

impl CloseSocketCommand {
    pub fn new(link_id: Option<LinkId>) -> Self {
        Self { link_id }
    }
}

impl AtCommand for CloseSocketCommand {
    const NAME: &'static str = "+CIPCLOSE";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        match self.link_id {
            None => Ok(()),
            Some(link_id) => line.number(link_id.get() as u32),
        }
    }

    fn tokens(&self) -> &'static [&'static str] {
        match self.link_id {
            None => &[OK, ERROR],
            Some(_) => &[OK, LINK_IS_NOT, ERROR],
        }
    }

    fn timeout_ms(&self, config: &Config) -> u32 {
        config.close_timeout_ms
    }
}

impl CommandErrorHandler for CloseSocketCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::CloseFailed(error)
    }
}

/// Starts (port given) or stops the TCP server
pub(crate) struct ServerCommand {
    port: Option<u16>,
}

impl ServerCommand {
    pub fn start(port: u16) -> Self {
        Self { port: Some(port) }
    }

    pub fn stop() -> Self {
        Self { port: None }
    }
}

impl AtCommand for ServerCommand {
    const NAME: &'static str = "+CIPSERVER";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        match self.port {
            None => line.number(0),
            Some(port) => {
                line.number(1)?;
                line.number(port as u32)
            }
        }
    }

    fn tokens(&self) -> &'static [&'static str] {
        match self.port {
            None => &[OK, ERROR],
            Some(_) => &[OK, NO_CHANGE, ERROR],
        }
    }
}

impl CommandErrorHandler for ServerCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::ServerFailed(error)
    }
}

/// Sets the idle timeout of connections accepted by the TCP server
pub(crate) struct ServerTimeoutCommand {
    seconds: u16,
}

impl ServerTimeoutCommand {
    pub fn new(seconds: u16) -> Self {
        Self { seconds }
    }
}

impl AtCommand for ServerTimeoutCommand {
    const NAME: &'static str = "+CIPSTO";

    fn write_args(&self, line: &mut CommandLine) -> Result<(), CommandError> {
        line.number(self.seconds as u32)
    }
}

impl CommandErrorHandler for ServerTimeoutCommand {
    fn command_error(&self, error: CommandError) -> Error {
        Error::ServerFailed(error)
    }
}
