//! Example that runs on Linux using a serial-USB-adapter.
//!
//! Joins the given access point, fetches the public IP from ifconfig.net and prints it.
use std::{
    env, io,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use embedded_nal::TcpClientStack;
use esp8266_at::{
    adapter::Adapter,
    wifi::{WifiAdapter, WifiMode},
};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

// Chunk size in bytes when sending data. Max value: 2048.
const TX_SIZE: usize = 1024;
// Capacity of the response buffer, needs to hold the longest extracted response.
const RX_SIZE: usize = 2048;

// Timer frequency in Hz
const TIMER_HZ: u32 = 1000;

fn main() {
    env_logger::init();

    // Parse args
    let args: Vec<String> = env::args().collect();
    if args.len() != 5 {
        println!("Usage: {} <path-to-serial> <baudrate> <ssid> <psk>", args[0]);
        println!("Example: {} /dev/ttyUSB0 115200 mywifi hellopasswd123", args[0]);
        println!("\nNote: To run the example with debug logging, run it like this:");
        println!("\n  RUST_LOG=trace cargo run --example linux -- /dev/ttyUSB0 115200 mywifi hellopasswd123");
        std::process::exit(1);
    }
    let dev = &args[1];
    let baud_rate: u32 = args[2].parse().unwrap();
    let ssid = &args[3];
    let psk = &args[4];

    println!("Starting (dev={}, baud={:?})...", dev, baud_rate);

    // Open serial port
    let port = serialport::new(dev, baud_rate)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(10))
        .open()
        .expect("Could not open serial port");

    let mut adapter: Adapter<_, _, TIMER_HZ, TX_SIZE, RX_SIZE> =
        Adapter::new(serial::SerialStream::new(port), timer::SysTimer::new());

    adapter.kick().expect("Modem is not responding");
    println!("Firmware:\n{}", adapter.version().expect("Could not query version"));

    // Join WIFI access point
    adapter.set_wifi_mode(WifiMode::Station).expect("Could not set station mode");
    println!("Join WiFi \"{}\"...", ssid);
    adapter.join(ssid, psk).expect("Could not join access point");

    let address = adapter.get_address().expect("Could not get local address");
    println!("Local address: {:?}", address.station_ipv4);

    // Resolve IPv4 for ifconfig.net
    let remote_host = "ifconfig.net";
    let socket_addr = (remote_host, 80)
        .to_socket_addrs()
        .unwrap()
        .find(SocketAddr::is_ipv4)
        .unwrap();

    // Create TCP connection
    let mut socket = adapter.socket().expect("Failed to create socket");
    println!("Connecting to {}...", remote_host);
    adapter
        .connect(&mut socket, socket_addr)
        .unwrap_or_else(|_| panic!("Failed to connect to {}", remote_host));
    println!("Connected!");

    // Send HTTP request
    println!("Sending HTTP request...");
    let request = b"GET / HTTP/1.1\r\nAccept: text/plain\r\nHost: ifconfig.net\r\nConnection: close\r\n\r\n";
    adapter.send(&mut socket, request).expect("Could not send HTTP request");

    // Read response
    let mut rx_buf = [0; RX_SIZE];
    let bytes_read = nb::block!(adapter.receive(&mut socket, &mut rx_buf)).expect("Error while receiving data");
    println!("Read {} bytes", bytes_read);
    let response = std::str::from_utf8(&rx_buf[..bytes_read]).expect("HTTP response is not valid UTF8");

    // Very primitive HTTP response parsing
    let (headers, body) = response.split_once("\r\n\r\n").unwrap_or_else(|| {
        println!("Response:\n---\n{}\n---", response);
        panic!("Could not parse HTTP response");
    });
    if !headers.starts_with("HTTP/1.1 200 ") {
        panic!("Bad HTTP response, expected 200 but found {}", headers.lines().next().unwrap_or(""));
    }
    println!("Your public IP, as returned by {}: {}", remote_host, body.trim());

    adapter.close(socket).expect("Could not close socket");
}

mod serial {
    use super::{io, SerialPort};
    use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};

    /// Serial port exposed by embedded-io traits
    pub struct SerialStream {
        port: Box<dyn SerialPort>,
    }

    impl SerialStream {
        pub fn new(port: Box<dyn SerialPort>) -> Self {
            Self { port }
        }
    }

    fn error_kind(error: io::Error) -> ErrorKind {
        log::error!("Serial error: {}", error);

        match error.kind() {
            io::ErrorKind::TimedOut => ErrorKind::TimedOut,
            io::ErrorKind::Interrupted => ErrorKind::Interrupted,
            _ => ErrorKind::Other,
        }
    }

    impl ErrorType for SerialStream {
        type Error = ErrorKind;
    }

    impl Read for SerialStream {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            match io::Read::read(&mut self.port, buf) {
                Ok(count) => Ok(count),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(error_kind(e)),
            }
        }
    }

    impl ReadReady for SerialStream {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            let available = self.port.bytes_to_read().map_err(|e| error_kind(e.into()))?;
            Ok(available > 0)
        }
    }

    impl Write for SerialStream {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            io::Write::write(&mut self.port, buf).map_err(error_kind)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            io::Write::flush(&mut self.port).map_err(error_kind)
        }
    }
}

mod timer {
    use std::{convert::TryInto, time::Instant as StdInstant};

    use fugit::Instant;
    use fugit_timer::Timer;

    /// A timer with millisecond precision.
    pub struct SysTimer {
        start: StdInstant,
        duration_ms: u32,
        started: bool,
    }

    impl SysTimer {
        pub fn new() -> SysTimer {
            SysTimer {
                start: StdInstant::now(),
                duration_ms: 0,
                started: false,
            }
        }
    }

    impl Timer<1000> for SysTimer {
        type Error = &'static str;

        fn now(&mut self) -> fugit::TimerInstantU32<1000> {
            let milliseconds = (StdInstant::now() - self.start).as_millis();
            let ticks: u32 = milliseconds.try_into().expect("u32 timer overflow");
            Instant::<u32, 1, 1000>::from_ticks(ticks)
        }

        fn start(&mut self, duration: fugit::TimerDurationU32<1000>) -> Result<(), Self::Error> {
            self.start = StdInstant::now();
            self.duration_ms = duration.ticks();
            self.started = true;
            Ok(())
        }

        fn cancel(&mut self) -> Result<(), Self::Error> {
            if !self.started {
                return Err("cannot cancel stopped timer");
            }

            self.started = false;
            Ok(())
        }

        fn wait(&mut self) -> nb::Result<(), Self::Error> {
            if (StdInstant::now() - self.start).as_millis() >= self.duration_ms.into() {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        }
    }
}
