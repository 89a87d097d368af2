use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer as FugitTimer;
use mockall::mock;
use std::collections::VecDeque;
use std::time::Instant;

/// Scripted serial stream
///
/// Each script entry consists of the expected host output and the modem reply. The reply gets
/// readable as soon as the host has written the expected bytes.
pub struct MockSerial {
    /// Expected output and reply, in order
    script: VecDeque<(Vec<u8>, Vec<u8>)>,

    /// Output written since the last matched script entry
    pending_output: Vec<u8>,

    /// All bytes written by the host
    written: Vec<u8>,

    /// Bytes readable by the host
    rx: VecDeque<u8>,

    /// Max. bytes returned per read() call
    chunk_size: usize,

    /// Reports no data on every N-th read_ready() call
    stall_every: Option<usize>,

    /// read_ready() call count
    ready_calls: usize,

    /// Returns the given error on read_ready() once the readable bytes are consumed
    read_error: Option<ErrorKind>,

    /// Returns the given error on write()
    write_error: Option<ErrorKind>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            pending_output: vec![],
            written: vec![],
            rx: VecDeque::new(),
            chunk_size: usize::MAX,
            stall_every: None,
            ready_calls: 0,
            read_error: None,
            write_error: None,
        }
    }

    /// Adds a script entry
    pub fn expect(&mut self, output: &[u8], reply: &[u8]) {
        self.script.push_back((output.to_vec(), reply.to_vec()));
    }

    /// Makes the bytes readable right away, e.g. stale data or unsolicited frames
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Limits the bytes returned per read() call
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size;
    }

    /// Simulates a slow line, reporting no data on every N-th poll
    pub fn stall_every(&mut self, count: usize) {
        self.stall_every = Some(count);
    }

    /// Simulates a broken stream once the readable bytes are consumed
    pub fn fail_reads(&mut self, kind: ErrorKind) {
        self.read_error = Some(kind);
    }

    pub fn fail_writes(&mut self, kind: ErrorKind) {
        self.write_error = Some(kind);
    }

    /// Returns all written bytes as string
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).to_string()
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Returns the bytes which were not read by the host
    pub fn unread(&self) -> Vec<u8> {
        self.rx.iter().copied().collect()
    }

    /// Asserts that all script entries got matched
    pub fn assert_script_done(&self) {
        assert!(self.script.is_empty(), "Unmatched script entries: {:?}", self.script.len());
    }

    fn process_output(&mut self) {
        let Some((expected, _)) = self.script.front() else {
            return;
        };

        if !expected.starts_with(&self.pending_output) {
            panic!(
                "Unexpected output {:?}, expected {:?}",
                String::from_utf8_lossy(&self.pending_output),
                String::from_utf8_lossy(expected)
            );
        }

        if expected.len() == self.pending_output.len() {
            let (_, reply) = self.script.pop_front().unwrap();
            self.pending_output.clear();
            self.rx.extend(reply);
        }
    }
}

impl ErrorType for MockSerial {
    type Error = ErrorKind;
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let count = buf.len().min(self.chunk_size).min(self.rx.len());

        for byte in buf.iter_mut().take(count) {
            *byte = self.rx.pop_front().unwrap();
        }

        Ok(count)
    }
}

impl ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.ready_calls += 1;

        if let Some(count) = self.stall_every {
            if self.ready_calls % count == 0 {
                return Ok(false);
            }
        }

        if self.rx.is_empty() {
            if let Some(kind) = self.read_error {
                return Err(kind);
            }
        }

        Ok(!self.rx.is_empty())
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if let Some(kind) = self.write_error {
            return Err(kind);
        }

        for byte in buf {
            self.written.push(*byte);
            self.pending_output.push(*byte);
            self.process_output();
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Timer elapsing after a fixed number of wait() polls.
/// Like a hardware one-shot timer, the expiry is reported by a single wait() call.
pub struct PollTimer {
    /// Polls per deadline
    budget: u32,

    /// Remaining polls of the current deadline
    remaining: Option<u32>,

    /// Durations in ms of all started deadlines
    pub started: Vec<u32>,
}

impl PollTimer {
    pub fn new() -> Self {
        Self::with_budget(1_000)
    }

    pub fn with_budget(budget: u32) -> Self {
        Self {
            budget,
            remaining: None,
            started: vec![],
        }
    }
}

impl FugitTimer<1_000_000> for PollTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        unimplemented!()
    }

    fn start(&mut self, duration: TimerDurationU32<1000000>) -> Result<(), u32> {
        self.started.push(duration.to_millis());
        self.remaining = Some(self.budget);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), u32> {
        unimplemented!()
    }

    fn wait(&mut self) -> nb::Result<(), u32> {
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

/// Timer based on the system clock
pub struct StdTimer {
    start: Instant,
    duration_us: u64,
}

impl StdTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            duration_us: 0,
        }
    }
}

impl FugitTimer<1_000_000> for StdTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        unimplemented!()
    }

    fn start(&mut self, duration: TimerDurationU32<1000000>) -> Result<(), u32> {
        self.start = Instant::now();
        self.duration_us = duration.ticks() as u64;
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), u32> {
        unimplemented!()
    }

    fn wait(&mut self) -> nb::Result<(), u32> {
        if self.start.elapsed().as_micros() >= self.duration_us as u128 {
            return Ok(());
        }

        Err(nb::Error::WouldBlock)
    }
}

mock! {
    pub Timer{}

    impl FugitTimer<1_000_000> for Timer {
        type Error = u32;

        fn now(&mut self) -> TimerInstantU32<1000000>;
        fn start(&mut self, duration: TimerDurationU32<1000000>) -> Result<(), u32>;
        fn cancel(&mut self) -> Result<(), u32>;
        fn wait(&mut self) -> nb::Result<(), u32>;
    }
}

impl MockTimer {
    /// Short hand helper for returning a milliseconds duration
    pub fn duration_ms(duration: u32) -> TimerDurationU32<1_000_000> {
        TimerDurationU32::millis(duration)
    }
}
