//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Dome control module.
//!
//! The controller has no blocking-call semantics: every movement command
//! returns an immediate acknowledgment and the operation then runs on its
//! own, streaming unsolicited status lines. Callers therefore start an
//! operation and poll the matching `is_*_complete` predicate (typically every
//! 1–2 seconds) until it reports `true` or fails.
//!
//! The driver performs no internal locking; all calls must come from the
//! single thread that owns the connection.
//!

pub mod ddw;
pub mod simulator;

use crate::protocol::{ParseError, ProtocolProfile, ShutterState};
use crate::transport::{Sleeper, TransportError};
use std::time::Duration;
use strum::EnumIter;
use strum_macros as sm;

#[derive(Debug)]
pub enum DomeError {
    /// Operation attempted before a link was established.
    NotConnected,
    /// The connection attempt itself failed (port open or firmware query).
    NoLink,
    /// A movement is underway and conflicts with the request; retry later.
    CommandInProgress,
    /// The controller did not answer within the transport retry budget.
    NoResponse,
    Timeout,
    /// A response could not be split into fields at all.
    BadFormat,
    /// A response does not have the shape the protocol requires.
    MalformedResponse,
    /// Non-numeric content where a number was required.
    DataOutOfRange,
    /// The operation finished but the physical state does not match the
    /// request (e.g. the dome settled outside tolerance).
    CommandFailed,
    CommandNotSupported,
    Io(std::io::Error)
}

impl std::fmt::Display for DomeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DomeError::NotConnected => write!(f, "not connected"),
            DomeError::NoLink => write!(f, "cannot establish a link to the controller"),
            DomeError::CommandInProgress => write!(f, "a movement is already in progress"),
            DomeError::NoResponse => write!(f, "no response from the controller"),
            DomeError::Timeout => write!(f, "the controller did not answer in time"),
            DomeError::BadFormat => write!(f, "response could not be split into fields"),
            DomeError::MalformedResponse => write!(f, "malformed response"),
            DomeError::DataOutOfRange => write!(f, "non-numeric content in a numeric field"),
            DomeError::CommandFailed => write!(f, "the operation did not reach the requested state"),
            DomeError::CommandNotSupported => write!(f, "not supported by this controller"),
            DomeError::Io(e) => write!(f, "I/O error: {}", e)
        }
    }
}

impl std::error::Error for DomeError {}

impl From<TransportError> for DomeError {
    fn from(e: TransportError) -> DomeError {
        match e {
            TransportError::Timeout => DomeError::Timeout,
            TransportError::NoResponse => DomeError::NoResponse,
            TransportError::Io(e) => DomeError::Io(e)
        }
    }
}

impl From<ParseError> for DomeError {
    fn from(e: ParseError) -> DomeError {
        match e {
            ParseError::BadFormat => DomeError::BadFormat,
            ParseError::MalformedResponse => DomeError::MalformedResponse,
            ParseError::DataOutOfRange => DomeError::DataOutOfRange
        }
    }
}

/// Observatory dome rotation/shutter controller.
///
/// Movement operations return as soon as the command is acknowledged; the
/// corresponding completion predicate must then be polled. The predicates are
/// also where failures surface: "stopped outside tolerance" is
/// [`DomeError::CommandFailed`] from `is_goto_complete`, not from
/// `goto_azimuth`.
pub trait Dome {
    #[must_use]
    fn info(&self) -> String;

    fn model(&self) -> String;

    fn firmware_version(&mut self) -> Result<String, DomeError>;

    /// Starts rotating towards `azimuth_deg` (degrees, 0..360).
    fn goto_azimuth(&mut self, azimuth_deg: f64) -> Result<(), DomeError>;

    fn open_shutter(&mut self) -> Result<(), DomeError>;

    fn close_shutter(&mut self) -> Result<(), DomeError>;

    /// Starts a move to the home sensor position.
    fn go_home(&mut self) -> Result<(), DomeError>;

    /// Starts a full-rotation calibration of the steps-per-revolution count.
    fn calibrate(&mut self) -> Result<(), DomeError>;

    /// The dome has no distinct park position; home doubles as park.
    fn park(&mut self) -> Result<(), DomeError>;

    fn unpark(&mut self) -> Result<(), DomeError>;

    /// Not supported by this device family; present for API symmetry with
    /// other dome drivers.
    fn sync_to(&mut self, azimuth_deg: f64, elevation_deg: f64) -> Result<(), DomeError>;

    /// Stops any motion; best-effort, does not wait for confirmation.
    fn abort(&mut self) -> Result<(), DomeError>;

    fn is_goto_complete(&mut self) -> Result<bool, DomeError>;
    fn is_open_complete(&mut self) -> Result<bool, DomeError>;
    fn is_close_complete(&mut self) -> Result<bool, DomeError>;
    fn is_park_complete(&mut self) -> Result<bool, DomeError>;
    fn is_unpark_complete(&mut self) -> Result<bool, DomeError>;
    fn is_find_home_complete(&mut self) -> Result<bool, DomeError>;
    fn is_calibrating_complete(&mut self) -> Result<bool, DomeError>;

    // Getters refresh from the device when connected and idle; otherwise they
    // return the last known value.
    fn current_azimuth(&mut self) -> f64;
    fn current_elevation(&mut self) -> f64;
    fn home_azimuth(&mut self) -> f64;
    fn shutter_state(&mut self) -> ShutterState;
    fn steps_per_revolution(&mut self) -> u32;
    fn is_at_home(&mut self) -> bool;
    fn is_parked(&self) -> bool;

    fn disconnect(&mut self);
}

#[derive(sm::EnumDiscriminants)]
#[strum_discriminants(derive(EnumIter))]
pub enum DomeConnection {
    /// Direct serial connection to a DDW unit.
    DdwSerial{ device: String, hardware_flow_control: bool, profile: ProtocolProfile },
    Simulator
}

pub fn connect_to_dome(connection: DomeConnection) -> Result<Box<dyn Dome>, DomeError> {
    match connection {
        DomeConnection::DdwSerial{ device, hardware_flow_control, profile } => {
            Ok(Box::new(ddw::DdwDome::new(&device, hardware_flow_control, profile)?))
        },

        DomeConnection::Simulator => Ok(Box::new(simulator::Simulator::new()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    TimedOut
}

/// Sleeps `interval`, then evaluates `predicate`; repeats until the predicate
/// holds or `max_attempts` runs out. Used by the multi-step recovery
/// sequences (re-homing, connect-time resynchronization) instead of ad hoc
/// sleep-and-retry loops.
pub fn poll_until<F>(
    sleeper: &mut dyn Sleeper,
    interval: Duration,
    max_attempts: usize,
    mut predicate: F
) -> Result<PollOutcome, DomeError>
    where F: FnMut() -> Result<bool, DomeError>
{
    for _ in 0..max_attempts {
        sleeper.sleep(interval);
        if predicate()? {
            return Ok(PollOutcome::Completed);
        }
    }

    Ok(PollOutcome::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::NoopSleeper;

    #[test]
    fn given_predicate_turns_true_polling_completes() {
        let mut countdown = 3;
        let outcome = poll_until(&mut NoopSleeper, Duration::from_secs(1), 10, || {
            countdown -= 1;
            Ok(countdown == 0)
        }).unwrap();
        assert_eq!(PollOutcome::Completed, outcome);
    }

    #[test]
    fn given_predicate_never_true_polling_times_out() {
        let mut attempts = 0;
        let outcome = poll_until(&mut NoopSleeper, Duration::from_secs(1), 5, || {
            attempts += 1;
            Ok(false)
        }).unwrap();
        assert_eq!(PollOutcome::TimedOut, outcome);
        assert_eq!(5, attempts);
    }

    #[test]
    fn given_predicate_error_polling_propagates_it() {
        let result = poll_until(&mut NoopSleeper, Duration::from_secs(1), 5, || {
            Err(DomeError::CommandFailed)
        });
        assert!(matches!(result, Err(DomeError::CommandFailed)));
    }
}
