//! Response tokens of the ESP8266 AT firmware

/// Command succeeded
pub const OK: &str = "OK";

/// Command failed or is unknown
pub const ERROR: &str = "ERROR";

/// Joining the access point failed
pub const FAIL: &str = "FAIL";

/// Setting is already active (CWMODE, CIPSERVER)
pub const NO_CHANGE: &str = "no change";

/// Connection was already established (CIPSTART)
pub const ALREADY_CONNECT: &str = "ALREADY CONNECT";

/// Connection to close does not exist (CIPCLOSE)
pub const LINK_IS_NOT: &str = "link is not";

/// Multiplexing can't be changed while a connection exists (CIPMUX)
pub const LINK_IS_BUILDED: &str = "Link is builded";

/// Payload was transmitted
pub const SEND_OK: &str = "SEND OK";

/// Payload transmission failed
pub const SEND_FAIL: &str = "SEND FAIL";

/// Modem is waiting for the raw payload after CIPSEND
pub const PROMPT: &str = ">";

/// Line end of the echoed command, begin of multi line responses
pub const ECHO_END: &str = "\r\r\n";

/// End of multi line responses
pub const BLOCK_END: &str = "\r\n\r\nOK";

/// Prefix of inbound data frames
pub const FRAME_MARKER: &[u8] = b"+IPD,";
