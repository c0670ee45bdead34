//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Serial transport session.
//!
//! The driver only needs byte-level write, byte-level read with a timeout, a
//! "bytes waiting" query and a receive-buffer purge; the [`Transport`] trait
//! captures exactly that, with the production implementation riding on
//! `serialport`. On top of it sit the session primitives: a carriage-return
//! framed line reader that tolerates the controller's inconsistent framing,
//! a send-with-retries command exchange, and a drain loop for the unsolicited
//! status lines the controller emits during movements.
//!

use crate::protocol::command::RESPONSE_TERMINATOR;
use std::io::Read;
use std::time::Duration;

/// Default per-read timeout for a command response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(1500);

/// Shutter replies are slow; `GOPN`/`GCLS` use this instead.
pub const SHUTTER_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the fire-and-forget `STOP`.
pub const ABORT_COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

const RESPONSE_MAX_LEN: usize = 4096;

/// A command is re-sent up to this many times after a response timeout.
const COMMAND_RETRIES: usize = 3;

const RETRY_DELAY: Duration = Duration::from_millis(1500);

/// Read timeout while draining already-buffered unsolicited lines.
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub enum TransportError {
    /// Not a single byte arrived before the read timed out.
    Timeout,
    /// The retry budget was exhausted without any response.
    NoResponse,
    Io(std::io::Error)
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "no response within the read timeout"),
            TransportError::NoResponse => write!(f, "no response after retries"),
            TransportError::Io(e) => write!(f, "I/O error: {}", e)
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> TransportError {
        TransportError::Io(e)
    }
}

impl From<serialport::Error> for TransportError {
    fn from(e: serialport::Error) -> TransportError {
        TransportError::Io(e.into())
    }
}

/// Byte-level link to the controller.
pub trait Transport {
    fn write_command(&mut self, command: &str) -> Result<(), TransportError>;

    /// Reads one byte; `Ok(None)` means the read timed out.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransportError>;

    fn bytes_waiting(&mut self) -> Result<usize, TransportError>;

    /// Discards anything sitting in the receive buffer.
    fn purge(&mut self) -> Result<(), TransportError>;
}

/// Suspends the control thread; a seam so that the bounded recovery loops can
/// be exercised in tests without wall-clock delays.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

pub struct StdSleeper;

impl Sleeper for StdSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// `Transport` over a serial port, 9600 8N1 as the DDW unit expects.
pub struct SerialTransport {
    serial_port: Box<dyn serialport::SerialPort>
}

impl SerialTransport {
    /// Opens the given system device, e.g. "COM3" on Windows or
    /// "/dev/ttyUSB0" on Linux.
    pub fn new(device: &str, hardware_flow_control: bool) -> Result<SerialTransport, TransportError> {
        let serial_port = serialport::new(device, 9600)
            .data_bits(serialport::DataBits::Eight)
            .flow_control(if hardware_flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(50))
            .open()?;

        Ok(SerialTransport{ serial_port })
    }
}

impl Transport for SerialTransport {
    fn write_command(&mut self, command: &str) -> Result<(), TransportError> {
        use std::io::Write;
        self.serial_port.write_all(command.as_bytes())?;
        self.serial_port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransportError> {
        self.serial_port.set_timeout(timeout)?;
        let mut buf = [0u8; 1];
        match self.serial_port.read_exact(&mut buf) {
            Ok(()) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(TransportError::Io(e))
        }
    }

    fn bytes_waiting(&mut self) -> Result<usize, TransportError> {
        Ok(self.serial_port.bytes_to_read()? as usize)
    }

    fn purge(&mut self) -> Result<(), TransportError> {
        self.serial_port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

/// Reads one line, stripping the trailing carriage return.
///
/// A response that arrives with at least one byte but never a terminator is
/// returned as-is once the read times out: some firmware revisions do not
/// terminate every line. `Timeout` is only reported when nothing at all
/// arrived.
pub fn read_response(transport: &mut dyn Transport, timeout: Duration)
    -> Result<String, TransportError>
{
    let mut line = String::new();

    loop {
        match transport.read_byte(timeout)? {
            Some(byte) if byte == RESPONSE_TERMINATOR => return Ok(line),

            Some(byte) => {
                line.push(byte as char);
                if line.len() >= RESPONSE_MAX_LEN {
                    log::warn!("response exceeds {} bytes, truncating", RESPONSE_MAX_LEN);
                    return Ok(line);
                }
            },

            None => {
                return if line.is_empty() { Err(TransportError::Timeout) } else { Ok(line) };
            }
        }
    }
}

/// One command/response exchange: purge stale input, write the command, read
/// one line back. A timed-out exchange is repeated (full purge+send+read) up
/// to [`COMMAND_RETRIES`] more times with a fixed delay in between.
pub fn send_command(
    transport: &mut dyn Transport,
    sleeper: &mut dyn Sleeper,
    command: &str,
    timeout: Duration
) -> Result<String, TransportError> {
    let mut timeouts = 0;

    loop {
        transport.purge()?;
        log::debug!("sending \"{}\"", command.trim_end());
        transport.write_command(command)?;

        match read_response(transport, timeout) {
            Ok(line) => {
                log::debug!("response \"{}\"", line);
                return Ok(line);
            },

            Err(TransportError::Timeout) => {
                if timeouts >= COMMAND_RETRIES {
                    return Err(TransportError::NoResponse);
                }
                timeouts += 1;
                log::debug!("response timed out, resending \"{}\"", command.trim_end());
                sleeper.sleep(RETRY_DELAY);
            },

            Err(e) => return Err(e)
        }
    }
}

/// Reads every line already buffered by the controller, keeping only the most
/// recent fully read one; several unsolicited status lines can pile up
/// between two polls and only the newest reflects current state.
///
/// `Timeout` means nothing was waiting — the caller must treat it as "no new
/// status since last check", not as a failure.
pub fn drain_pending(transport: &mut dyn Transport) -> Result<String, TransportError> {
    let mut last = String::new();
    let mut anything_read = false;

    loop {
        if transport.bytes_waiting()? == 0 {
            break;
        }
        anything_read = true;
        match read_response(transport, DRAIN_READ_TIMEOUT) {
            Ok(line) => last = line,
            Err(TransportError::Timeout) => break,
            Err(e) => return Err(e)
        }
    }

    if !anything_read {
        return Err(TransportError::Timeout);
    }

    Ok(last)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    pub struct NoopSleeper;

    impl Sleeper for NoopSleeper {
        fn sleep(&mut self, _duration: Duration) {}
    }

    /// Plays back canned replies: each expected command, once written, queues
    /// its reply bytes for subsequent reads. Unsolicited lines can be pushed
    /// directly into the receive queue.
    ///
    /// State is shared between clones, so a test can hand one clone to the
    /// driver and keep another to inject lines and inspect writes.
    #[derive(Clone)]
    pub struct ScriptedTransport {
        inner: std::rc::Rc<std::cell::RefCell<Inner>>
    }

    struct Inner {
        expected: VecDeque<(String, Vec<u8>)>,
        read_queue: VecDeque<u8>,
        writes: Vec<String>
    }

    impl ScriptedTransport {
        pub fn new() -> ScriptedTransport {
            ScriptedTransport{ inner: std::rc::Rc::new(std::cell::RefCell::new(Inner{
                expected: VecDeque::new(), read_queue: VecDeque::new(), writes: vec![]
            })) }
        }

        /// Queues `replies` (each CR-terminated) for when `command` is written.
        pub fn expect(self, command: &str, replies: &[&str]) -> ScriptedTransport {
            self.queue_reply(command, replies);
            self
        }

        /// Non-consuming form of `expect`, for scripting replies after the
        /// transport has been handed to the driver.
        pub fn queue_reply(&self, command: &str, replies: &[&str]) {
            let mut bytes = vec![];
            for reply in replies {
                bytes.extend_from_slice(reply.as_bytes());
                bytes.push(RESPONSE_TERMINATOR);
            }
            self.inner.borrow_mut().expected.push_back((command.to_string(), bytes));
        }

        /// Like `expect`, but the reply bytes go out exactly as given (e.g. to
        /// simulate a missing terminator).
        pub fn expect_raw(self, command: &str, reply: &[u8]) -> ScriptedTransport {
            self.inner.borrow_mut().expected.push_back((command.to_string(), reply.to_vec()));
            self
        }

        /// Makes `line` (CR-terminated) appear in the receive buffer, as if
        /// the controller had sent it unsolicited.
        pub fn push_unsolicited(&self, line: &str) {
            let mut inner = self.inner.borrow_mut();
            inner.read_queue.extend(line.as_bytes());
            inner.read_queue.push_back(RESPONSE_TERMINATOR);
        }

        pub fn push_unsolicited_raw(&self, bytes: &[u8]) {
            self.inner.borrow_mut().read_queue.extend(bytes);
        }

        pub fn write_count(&self) -> usize {
            self.inner.borrow().writes.len()
        }

        pub fn last_write(&self) -> Option<String> {
            self.inner.borrow().writes.last().cloned()
        }

        pub fn writes(&self) -> Vec<String> {
            self.inner.borrow().writes.clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn write_command(&mut self, command: &str) -> Result<(), TransportError> {
            let mut inner = self.inner.borrow_mut();
            inner.writes.push(command.to_string());
            if let Some((expected_command, _)) = inner.expected.front() {
                if expected_command == command {
                    let (_, reply) = inner.expected.pop_front().unwrap();
                    inner.read_queue.extend(reply);
                }
            }
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, TransportError> {
            Ok(self.inner.borrow_mut().read_queue.pop_front())
        }

        fn bytes_waiting(&mut self) -> Result<usize, TransportError> {
            Ok(self.inner.borrow().read_queue.len())
        }

        fn purge(&mut self) -> Result<(), TransportError> {
            self.inner.borrow_mut().read_queue.clear();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{NoopSleeper, ScriptedTransport};

    #[test]
    fn given_terminated_line_terminator_is_stripped() {
        let mut transport = ScriptedTransport::new();
        transport.push_unsolicited("GINF-REPLY");

        let line = read_response(&mut transport, Duration::from_millis(10)).unwrap();
        assert_eq!("GINF-REPLY", line);
    }

    #[test]
    fn given_unterminated_line_partial_read_is_accepted() {
        let mut transport = ScriptedTransport::new();
        transport.push_unsolicited_raw(b"V4,701");

        let line = read_response(&mut transport, Duration::from_millis(10)).unwrap();
        assert_eq!("V4,701", line);
    }

    #[test]
    fn given_no_data_read_times_out() {
        let mut transport = ScriptedTransport::new();
        assert!(matches!(
            read_response(&mut transport, Duration::from_millis(10)),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn given_silent_device_command_is_retried_then_fails() {
        let mut transport = ScriptedTransport::new();
        let result = send_command(
            &mut transport, &mut NoopSleeper, "GINF", DEFAULT_COMMAND_TIMEOUT
        );
        assert!(matches!(result, Err(TransportError::NoResponse)));
        // initial attempt plus three retries
        assert_eq!(4, transport.write_count());
    }

    #[test]
    fn given_reply_on_first_attempt_no_retry_happens() {
        let mut transport = ScriptedTransport::new().expect("GINF", &["V1,1,2,3,4,0,1,0,0"]);
        let line = send_command(
            &mut transport, &mut NoopSleeper, "GINF", DEFAULT_COMMAND_TIMEOUT
        ).unwrap();
        assert_eq!("V1,1,2,3,4,0,1,0,0", line);
        assert_eq!(1, transport.write_count());
    }

    #[test]
    fn given_several_pending_lines_only_the_last_survives() {
        let mut transport = ScriptedTransport::new();
        transport.push_unsolicited("P100");
        transport.push_unsolicited("P200");
        transport.push_unsolicited("P300");

        assert_eq!("P300", drain_pending(&mut transport).unwrap());
    }

    #[test]
    fn given_nothing_pending_drain_reports_timeout() {
        let mut transport = ScriptedTransport::new();
        assert!(matches!(drain_pending(&mut transport), Err(TransportError::Timeout)));
    }
}
