//! Mocks for doc examples
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use heapless::{Deque, Vec};

/// Reply of commands which are not scripted
const DEFAULT_REPLY: &[u8] = b"\r\nOK\r\n";

/// Scripted modem mock
///
/// Once the host has written the expected bytes of the next script entry, the reply of the entry
/// gets available for reading. Any other command line is answered by OK.
#[derive(Default)]
pub struct ExampleSerial {
    /// Expected host output and modem reply
    script: Vec<(&'static [u8], &'static [u8]), 16>,

    /// Index of the next script entry
    next: usize,

    /// Bytes written since the last matched entry
    written: Vec<u8, 256>,

    /// Bytes available for reading
    rx: Deque<u8, 1024>,
}

impl ExampleSerial {
    /// Appends a script entry
    pub fn expect(&mut self, output: &'static [u8], reply: &'static [u8]) {
        self.script.push((output, reply)).unwrap();
    }

    /// Makes the given bytes available for reading right away
    pub fn inject(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.rx.push_back(*byte).unwrap();
        }
    }

    fn process_output(&mut self) {
        let expected = self.script.get(self.next).map(|(output, _)| *output);

        if expected == Some(self.written.as_slice()) {
            let (_, reply) = self.script[self.next];
            self.next += 1;
            self.written.clear();
            self.inject(reply);
            return;
        }

        let pending = expected.map_or(false, |output| output.starts_with(&self.written));
        if !pending && self.written.ends_with(b"\r\n") {
            self.written.clear();
            self.inject(DEFAULT_REPLY);
        }
    }
}

impl ErrorType for ExampleSerial {
    type Error = ErrorKind;
}

impl Read for ExampleSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut count = 0;

        while count < buf.len() {
            match self.rx.pop_front() {
                None => break,
                Some(byte) => buf[count] = byte,
            }
            count += 1;
        }

        Ok(count)
    }
}

impl ReadReady for ExampleSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for ExampleSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for byte in buf {
            self.written.push(*byte).map_err(|_| ErrorKind::OutOfMemory)?;
            self.process_output();
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Timer mock, each deadline elapses after a fixed number of polls and is reported once
#[derive(Default)]
pub struct ExampleTimer {
    /// Remaining polls until the current deadline elapses
    remaining: Option<u32>,
}

impl Timer<1_000_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        unimplemented!()
    }

    fn start(&mut self, _duration: TimerDurationU32<1000000>) -> Result<(), Self::Error> {
        self.remaining = Some(1_000);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        unimplemented!()
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        match self.remaining {
            Some(0) => {
                self.remaining = None;
                Ok(())
            }
            Some(count) => {
                self.remaining = Some(count - 1);
                Err(nb::Error::WouldBlock)
            }
            None => Err(nb::Error::WouldBlock),
        }
    }
}
