//! # Timeouts and restart policy
//!
//! All values are in milliseconds. The defaults match the response times of ESP8266 AT firmware
//! 1.x on a 115200 baud link.
//!
//! ````
//! use esp8266_at::config::Config;
//!
//! let mut config = Config::default();
//! config.join_timeout_ms = 20_000;
//! config.restart.attempts = 10;
//! assert_eq!(3_000, config.payload_timeout_ms);
//! ````

/// Timeouts of the single exchanges
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Default timeout for simple commands which get responded by OK
    pub command_timeout_ms: u32,

    /// Timeout for joining an access point (CWJAP)
    pub join_timeout_ms: u32,

    /// Timeout for opening a TCP/UDP connection (CIPSTART)
    pub connect_timeout_ms: u32,

    /// Timeout until the send prompt `>` is received after CIPSEND
    pub prompt_timeout_ms: u32,

    /// Timeout until the transmission is confirmed by `SEND OK`
    pub send_timeout_ms: u32,

    /// Timeout for closing a connection (CIPCLOSE)
    pub close_timeout_ms: u32,

    /// Max. time to wait for an inbound frame header (`+IPD,...:`)
    pub receive_timeout_ms: u32,

    /// Max. time to wait for the payload bytes once a frame header was received
    pub payload_timeout_ms: u32,

    /// Timeout for listing access points (CWLAP)
    pub list_timeout_ms: u32,

    /// Timeout for configuring the soft access point (CWSAP)
    pub soft_ap_timeout_ms: u32,

    /// Restart sequence timing
    pub restart: RestartPolicy,
}

/// Timing of the restart sequence
///
/// After the reset command is accepted, the modem is given `settle_ms` to reboot. Afterwards it
/// gets checked by `AT` up to `attempts` times, waiting `poll_interval_ms` between the checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay after the reset command was accepted
    pub settle_ms: u32,

    /// Max. number of liveness checks
    pub attempts: usize,

    /// Delay between two failed liveness checks
    pub poll_interval_ms: u32,

    /// Delay after the first successful check, until the modem is fully operational
    pub stabilize_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout_ms: 1_000,
            join_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            prompt_timeout_ms: 5_000,
            send_timeout_ms: 10_000,
            close_timeout_ms: 5_000,
            receive_timeout_ms: 1_000,
            payload_timeout_ms: 3_000,
            list_timeout_ms: 10_000,
            soft_ap_timeout_ms: 5_000,
            restart: RestartPolicy::default(),
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            settle_ms: 2_000,
            attempts: 5,
            poll_interval_ms: 100,
            stabilize_ms: 1_500,
        }
    }
}
