use crate::adapter::{Adapter, CommandError, Error};
use crate::session::{Link, LinkId};
use crate::tests::mock::{MockSerial, PollTimer};
use core::net::SocketAddr;
use core::str::FromStr;
use embedded_nal::{TcpClientStack, TcpError, TcpErrorKind};

type AdapterType = Adapter<MockSerial, PollTimer, 1_000_000, 4, 64>;

fn address(address: &str) -> SocketAddr {
    SocketAddr::from_str(address).unwrap()
}

/// Returns an adapter in multiplexed mode using the given script
fn multiplexed(mut serial: MockSerial) -> AdapterType {
    let mut script = MockSerial::new();
    script.expect(b"AT+CIPMUX=1\r\n", b"\r\nOK\r\n");

    let mut adapter: AdapterType = Adapter::new(script, PollTimer::new());
    adapter.set_multiplexing(true).unwrap();
    adapter.serial.assert_script_done();

    std::mem::swap(&mut adapter.serial, &mut serial);
    adapter
}

#[test]
fn test_socket_single_mode() {
    let mut adapter: AdapterType = Adapter::new(MockSerial::new(), PollTimer::new());

    let socket = adapter.socket().unwrap();
    assert_eq!(Link::Single, socket.link());

    assert_eq!(Error::NoSocketAvailable, adapter.socket().unwrap_err());
    assert!(adapter.serial.written().is_empty());
}

#[test]
fn test_socket_multiplexed_mode() {
    let mut adapter = multiplexed(MockSerial::new());

    for id in 0..5 {
        let socket = adapter.socket().unwrap();
        assert_eq!(Link::Multiplexed(LinkId::new(id).unwrap()), socket.link());
    }

    assert_eq!(Error::NoSocketAvailable, adapter.socket().unwrap_err());
}

#[test]
fn test_socket_released_on_close() {
    let mut adapter = multiplexed(MockSerial::new());

    let first = adapter.socket().unwrap();
    let _second = adapter.socket().unwrap();
    adapter.close(first).unwrap();

    // Unconnected socket is released without any command
    assert!(adapter.serial.written().is_empty());

    let socket = adapter.socket().unwrap();
    assert_eq!(Link::Multiplexed(LinkId::new(0).unwrap()), socket.link());
}

#[test]
fn test_connect_ipv4() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21\r\n", b"CONNECT\r\n\r\nOK\r\n");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    adapter.connect(&mut socket, address("10.0.0.1:21")).unwrap();

    assert!(adapter.is_connected(Link::Single).unwrap());
    adapter.serial.assert_script_done();
}

#[test]
fn test_connect_ipv6() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=\"TCP\",\"2001:db8::1\",8080\r\n", b"\r\nERROR\r\n");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    let error = adapter.connect(&mut socket, address("[2001:db8::1]:8080")).unwrap_err();

    assert_eq!(nb::Error::Other(Error::ConnectFailed(CommandError::Rejected)), error);
}

#[test]
fn test_connect_multiplexed() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=1,\"TCP\",\"10.0.0.2\",443\r\n", b"1,CONNECT\r\n\r\nOK\r\n");

    let mut adapter = multiplexed(serial);
    let _first = adapter.socket().unwrap();
    let mut second = adapter.socket().unwrap();
    adapter.connect(&mut second, address("10.0.0.2:443")).unwrap();

    assert!(adapter.is_connected(second.link()).unwrap());
}

#[test]
fn test_send_unconnected() {
    let mut adapter: AdapterType = Adapter::new(MockSerial::new(), PollTimer::new());
    let mut socket = adapter.socket().unwrap();

    let error = adapter.send(&mut socket, b"data").unwrap_err();
    assert_eq!(nb::Error::Other(Error::SocketUnconnected), error);
    assert_eq!(TcpErrorKind::PipeClosed, Error::SocketUnconnected.kind());
}

#[test]
fn test_send_chunked() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21\r\n", b"CONNECT\r\n\r\nOK\r\n");
    serial.expect(b"AT+CIPSEND=4\r\n", b"\r\nOK\r\n> ");
    serial.expect(b"hell", b"\r\nSEND OK\r\n");
    serial.expect(b"AT+CIPSEND=4\r\n", b"\r\nOK\r\n> ");
    serial.expect(b"o wo", b"\r\nSEND OK\r\n");
    serial.expect(b"AT+CIPSEND=3\r\n", b"\r\nOK\r\n> ");
    serial.expect(b"rld", b"\r\nSEND OK\r\n");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    adapter.connect(&mut socket, address("10.0.0.1:21")).unwrap();

    assert_eq!(11, adapter.send(&mut socket, b"hello world").unwrap());
    adapter.serial.assert_script_done();
}

#[test]
fn test_send_failed_stops_transmission() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21\r\n", b"CONNECT\r\n\r\nOK\r\n");
    serial.expect(b"AT+CIPSEND=4\r\n", b"\r\nOK\r\n> ");
    serial.expect(b"hell", b"\r\nSEND FAIL\r\n");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    adapter.connect(&mut socket, address("10.0.0.1:21")).unwrap();

    let error = adapter.send(&mut socket, b"hello world").unwrap_err();
    assert_eq!(nb::Error::Other(Error::SendFailed(CommandError::Rejected)), error);
    assert_eq!(TcpErrorKind::PipeClosed, Error::SendFailed(CommandError::Rejected).kind());
    assert!(!adapter.serial.written_str().contains("o wo"));
}

#[test]
fn test_receive() {
    let mut serial = MockSerial::new();
    serial.inject(b"+IPD,3:abc");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    let mut buffer = [0x0; 8];

    assert_eq!(3, adapter.receive(&mut socket, &mut buffer).unwrap());
    assert_eq!(b"abc", &buffer[..3]);
}

#[test]
fn test_receive_would_block() {
    let mut adapter: AdapterType = Adapter::new(MockSerial::new(), PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    let mut buffer = [0x0; 8];

    let error = adapter.receive(&mut socket, &mut buffer).unwrap_err();
    assert_eq!(nb::Error::WouldBlock, error);
}

#[test]
fn test_receive_other_socket_would_block() {
    let mut adapter = multiplexed(MockSerial::new());
    let mut socket = adapter.socket().unwrap();
    let _other = adapter.socket().unwrap();
    let mut buffer = [0x0; 8];

    adapter.serial.inject(b"+IPD,1,2:hi+IPD,0,2:ok");

    let error = adapter.receive(&mut socket, &mut buffer).unwrap_err();
    assert_eq!(nb::Error::WouldBlock, error);
    assert_eq!(b"+IPD,0,2:ok".to_vec(), adapter.serial.unread());

    // Frame of the socket itself is still delivered
    assert_eq!(2, adapter.receive(&mut socket, &mut buffer).unwrap());
    assert_eq!(b"ok", &buffer[..2]);
    assert_eq!(vec![1_000, 3_000, 1_000, 3_000], adapter.timer.started[1..].to_vec());
}

#[test]
fn test_receive_truncated() {
    let mut serial = MockSerial::new();
    serial.inject(b"+IPD,6:abcdef");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    let mut buffer = [0x0; 4];

    let error = adapter.receive(&mut socket, &mut buffer).unwrap_err();
    assert_eq!(
        nb::Error::Other(Error::Truncated {
            declared: 6,
            written: 4
        }),
        error
    );
    assert_eq!(b"abcd", &buffer);
}

#[test]
fn test_receive_framing_error() {
    let mut serial = MockSerial::new();
    serial.inject(b"+IPD,0:");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    let mut buffer = [0x0; 4];

    let error = adapter.receive(&mut socket, &mut buffer).unwrap_err();
    assert_eq!(nb::Error::Other(Error::Framing(crate::frame::FramingError::InvalidLength)), error);
    assert_eq!(TcpErrorKind::Other, Error::Framing(crate::frame::FramingError::InvalidLength).kind());
}

#[test]
fn test_close_connected() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21\r\n", b"CONNECT\r\n\r\nOK\r\n");
    serial.expect(b"AT+CIPCLOSE\r\n", b"CLOSED\r\n\r\nOK\r\n");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    adapter.connect(&mut socket, address("10.0.0.1:21")).unwrap();
    adapter.close(socket).unwrap();

    // Link is available again
    let socket = adapter.socket().unwrap();
    assert_eq!(Link::Single, socket.link());
    adapter.serial.assert_script_done();
}

#[test]
fn test_close_failed_releases_socket() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21\r\n", b"CONNECT\r\n\r\nOK\r\n");
    serial.expect(b"AT+CIPCLOSE\r\n", b"\r\nERROR\r\n");

    let mut adapter: AdapterType = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    adapter.connect(&mut socket, address("10.0.0.1:21")).unwrap();

    assert_eq!(Error::CloseFailed(CommandError::Rejected), adapter.close(socket).unwrap_err());
    assert!(adapter.socket().is_ok());
}

#[test]
fn test_send_smallest_chunk_size() {
    let mut serial = MockSerial::new();
    serial.expect(b"AT+CIPSTART=\"TCP\",\"10.0.0.1\",21\r\n", b"CONNECT\r\n\r\nOK\r\n");
    serial.expect(b"AT+CIPSEND=1\r\n", b"\r\nOK\r\n> ");
    serial.expect(b"o", b"\r\nSEND OK\r\n");
    serial.expect(b"AT+CIPSEND=1\r\n", b"\r\nOK\r\n> ");
    serial.expect(b"k", b"\r\nSEND OK\r\n");

    let mut adapter: Adapter<_, _, 1_000_000, 1, 64> = Adapter::new(serial, PollTimer::new());
    let mut socket = adapter.socket().unwrap();
    adapter.connect(&mut socket, address("10.0.0.1:21")).unwrap();

    assert_eq!(2, adapter.send(&mut socket, b"ok").unwrap());
    adapter.serial.assert_script_done();
}
