//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Digital Dome Works (DDW) controller driver.
//!
//! The engine is a polled state machine. Movement commands get an immediate
//! one-line acknowledgment; afterwards the controller streams unsolicited
//! status lines which the completion predicates drain and classify, until a
//! terminal `V...` INF record arrives. Calibration constants (steps per
//! revolution, home position, coast, dead zone) are only ever taken from a
//! full INF record, never refreshed mid-movement.
//!

use crate::dome::{Dome, DomeError, PollOutcome};
use crate::protocol::{
    classify_response, command, goto_command, parse_status_record,
    HomeSensor, ProtocolProfile, ResponseEvent, ShutterState, StatusRecord
};
use crate::stopwatch::Stopwatch;
use crate::transport::{
    drain_pending, read_response, send_command,
    SerialTransport, Sleeper, StdSleeper, Transport, TransportError,
    ABORT_COMMAND_TIMEOUT, DEFAULT_COMMAND_TIMEOUT, SHUTTER_COMMAND_TIMEOUT
};
use crate::units::ticks_to_degrees;
use std::time::Duration;

/// Minimum spacing between two `GINF` queries; the controller gets confused
/// when polled faster.
const INF_REFRESH_INTERVAL: f64 = 2.0;

/// With a movement flagged in progress, silence longer than this means the
/// terminal status line was likely lost; the driver then queries directly.
const DATA_WATCHDOG: f64 = 30.0;

/// Home azimuth assumed until the first INF record arrives.
const DEFAULT_HOME_AZIMUTH: f64 = 180.0;

const MOTION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MOTION_POLL_ATTEMPTS: usize = 60;

const CONNECT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CONNECT_POLL_ATTEMPTS: usize = 5;

/// Both completion windows (dead zone right after a goto, coast once motion
/// stopped) compare ceil-rounded degrees; the controller itself only works in
/// whole degrees.
fn within_window(goal_deg: f64, actual_deg: f64, window_deg: f64) -> bool {
    let goal = goal_deg.ceil();
    let actual = actual_deg.ceil();
    goal >= actual - window_deg && goal <= actual + window_deg
}

/// Driver-side movement state; the controller itself does not answer "are you
/// moving", it has to be inferred from the response stream.
struct DriverState {
    dome_moving: bool,
    shutter_moving: bool,
    calibrating: bool,
    parked: bool,
    has_shutter: bool,
    shutter_open: bool,
    shutter_state: ShutterState,
    steps_per_rev: u32,
    home_az_deg: f64,
    coast_deg: f64,
    dead_zone_deg: f64,
    current_az_deg: f64,
    current_el_deg: f64,
    /// Target of the goto in progress; `None` while homing or calibrating,
    /// where the counter-derived azimuth must not end the wait early.
    goto_az_deg: Option<f64>
}

impl Default for DriverState {
    fn default() -> DriverState {
        DriverState{
            dome_moving: false,
            shutter_moving: false,
            calibrating: false,
            // assume parked after a power cycle, as the controller does
            parked: true,
            has_shutter: false,
            shutter_open: false,
            shutter_state: ShutterState::Unknown,
            steps_per_rev: 0,
            home_az_deg: DEFAULT_HOME_AZIMUTH,
            coast_deg: 0.0,
            dead_zone_deg: 0.0,
            current_az_deg: 0.0,
            current_el_deg: 0.0,
            goto_az_deg: None
        }
    }
}

pub struct DdwDome {
    connection_str: String,
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    profile: ProtocolProfile,
    connected: bool,
    firmware_version: Option<String>,
    /// Last full INF record; replaced wholesale, never partially updated.
    status: Option<StatusRecord>,
    refresh_timer: Stopwatch,
    data_received_timer: Stopwatch,
    state: DriverState
}

impl DdwDome {
    pub fn new(device: &str, hardware_flow_control: bool, profile: ProtocolProfile)
        -> Result<DdwDome, DomeError>
    {
        let transport = SerialTransport::new(device, hardware_flow_control)
            .map_err(|e| { log::warn!("cannot open {}: {}", device, e); DomeError::NoLink })?;
        DdwDome::with_transport(device, Box::new(transport), Box::new(StdSleeper), profile)
    }

    /// Connects over an already-open transport; lets alternate links (and
    /// tests) drive the protocol engine directly.
    pub fn with_transport(
        connection_str: &str,
        transport: Box<dyn Transport>,
        sleeper: Box<dyn Sleeper>,
        profile: ProtocolProfile
    ) -> Result<DdwDome, DomeError> {
        let mut dome = DdwDome{
            connection_str: connection_str.to_string(),
            transport,
            sleeper,
            profile,
            connected: true,
            firmware_version: None,
            status: None,
            refresh_timer: Stopwatch::new(),
            data_received_timer: Stopwatch::new(),
            state: DriverState::default()
        };
        dome.connect_init()?;
        Ok(dome)
    }

    /// Last parsed INF record, including the opaque telemetry fields.
    pub fn status_record(&self) -> Option<&StatusRecord> {
        self.status.as_ref()
    }

    fn connect_init(&mut self) -> Result<(), DomeError> {
        if let Err(e) = self.refresh_status(true) {
            log::warn!("connection handshake with {} failed: {}", self.connection_str, e);
            return Err(DomeError::NoLink);
        }
        let (version, at_home) = match &self.status {
            Some(record) => (record.version.clone(), record.home == HomeSensor::AtHome),
            None => return Err(DomeError::NoLink)
        };
        self.firmware_version = Some(version.clone());
        log::info!("connected to {}, firmware {}", self.connection_str, version);

        // A power cycle can leave the azimuth counter desynchronized: the
        // home sensor reads active while the counter points elsewhere. Nudge
        // the dome off the sensor, then re-home to resynchronize the counter.
        if at_home {
            let azimuth = self.state.current_az_deg;
            let home = self.state.home_az_deg;
            let coast = self.state.coast_deg;
            if azimuth < home - coast || azimuth > home + coast {
                log::warn!(
                    "home sensor active but azimuth {:.1}° disagrees with home {:.1}°, resynchronizing",
                    azimuth, home
                );
                self.goto_azimuth(azimuth - 1.5 * coast)?;
                if self.wait_for(CONNECT_POLL_INTERVAL, CONNECT_POLL_ATTEMPTS,
                    |dome| dome.is_goto_complete())? == PollOutcome::TimedOut
                {
                    return Err(DomeError::CommandFailed);
                }
                self.state.goto_az_deg = None;
                self.go_home()?;
                if self.wait_for(CONNECT_POLL_INTERVAL, CONNECT_POLL_ATTEMPTS,
                    |dome| dome.is_find_home_complete())? == PollOutcome::TimedOut
                {
                    return Err(DomeError::CommandFailed);
                }
            }
        }

        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        if self.state.dome_moving || self.state.shutter_moving {
            return Err(DomeError::CommandInProgress);
        }
        Ok(())
    }

    fn command(&mut self, command: &str, timeout: Duration) -> Result<String, DomeError> {
        Ok(send_command(self.transport.as_mut(), self.sleeper.as_mut(), command, timeout)?)
    }

    /// Fetches a fresh INF record unless the last one is recent enough.
    ///
    /// The rate gate is checked before the movement gate: while a movement is
    /// in progress a recent cached record is still served, only an actual
    /// query is refused.
    fn refresh_status(&mut self, force: bool) -> Result<(), DomeError> {
        if !force
            && self.status.is_some()
            && self.refresh_timer.elapsed_seconds() < INF_REFRESH_INTERVAL
        {
            return Ok(());
        }
        if self.state.dome_moving || self.state.shutter_moving {
            return Err(DomeError::CommandInProgress);
        }

        let line = match self.command(command::GET_INF, DEFAULT_COMMAND_TIMEOUT) {
            Ok(line) => line,
            Err(e) => {
                // still counts as a query for rate-limiting purposes
                self.refresh_timer.reset();
                return Err(e);
            }
        };
        let parsed = parse_status_record(&line, &self.profile);
        self.refresh_timer.reset();
        self.status = Some(parsed?);
        self.sync_state_from_status();
        self.data_received_timer.reset();
        Ok(())
    }

    /// Propagates the cached INF record into the driver state.
    fn sync_state_from_status(&mut self) {
        let record = match &self.status {
            Some(record) => record.clone(),
            None => return
        };
        if record.steps_per_rev != 0 {
            let circle = self.profile.circle_degrees;
            self.state.steps_per_rev = record.steps_per_rev;
            self.state.home_az_deg = ticks_to_degrees(record.home_ticks, record.steps_per_rev, circle);
            self.state.coast_deg = ticks_to_degrees(record.coast_ticks, record.steps_per_rev, circle);
            self.state.current_az_deg = ticks_to_degrees(record.azimuth_ticks, record.steps_per_rev, circle);
        }
        if let Some(dead_zone) = record.dead_zone_deg() {
            self.state.dead_zone_deg = dead_zone;
        }
        self.state.shutter_state = record.shutter;
        match record.shutter {
            ShutterState::Open => {
                self.state.has_shutter = true;
                self.state.shutter_open = true;
            },
            ShutterState::Closed => {
                self.state.has_shutter = true;
                self.state.shutter_open = false;
            },
            ShutterState::Unknown => self.state.shutter_open = false
        }
        self.state.current_el_deg =
            if self.state.has_shutter && self.state.shutter_open { 90.0 } else { 0.0 };
    }

    fn adopt_full_status(&mut self, record: StatusRecord) {
        self.status = Some(record);
        self.refresh_timer.reset();
        self.sync_state_from_status();
    }

    fn update_azimuth_from_ticks(&mut self, ticks: f64) {
        if self.state.steps_per_rev != 0 {
            self.state.current_az_deg =
                ticks_to_degrees(ticks, self.state.steps_per_rev, self.profile.circle_degrees);
        }
    }

    /// Ends the goto early when a position report already falls into the dead
    /// zone around the target; the controller does not rotate for differences
    /// below the dead zone, so no terminal record would come. The goal is
    /// cleared along with the moving flag: a dead-zone no-op must not be
    /// re-judged against the narrower coast window afterwards.
    fn maybe_short_circuit_goto(&mut self) {
        if let Some(goal) = self.state.goto_az_deg {
            if within_window(goal, self.state.current_az_deg, self.state.dead_zone_deg) {
                self.state.dome_moving = false;
                self.state.goto_az_deg = None;
            }
        }
    }

    /// Consumes the acknowledgment of a rotation command (`G<NNN>`, `GHOM`,
    /// `GTRN`).
    fn handle_motion_reply(&mut self, line: &str) -> Result<(), DomeError> {
        if line.is_empty() {
            return Ok(());
        }
        match classify_response(line, &self.profile)? {
            ResponseEvent::FullStatus(record) => {
                // no motion needed; the record reflects the final state
                self.state.dome_moving = false;
                self.adopt_full_status(record);
            },
            ResponseEvent::Rotating{ position_ticks, .. } => {
                self.state.dome_moving = true;
                if let Some(ticks) = position_ticks {
                    self.update_azimuth_from_ticks(ticks);
                    self.maybe_short_circuit_goto();
                }
            },
            ResponseEvent::AzimuthTick => self.state.dome_moving = true,
            ResponseEvent::PositionReport(ticks) => {
                self.state.dome_moving = true;
                self.update_azimuth_from_ticks(ticks);
                self.maybe_short_circuit_goto();
            },
            _ => return Err(DomeError::MalformedResponse)
        }
        self.data_received_timer.reset();
        Ok(())
    }

    fn handle_shutter_reply(&mut self, line: &str) -> Result<(), DomeError> {
        if line.is_empty() {
            return Ok(());
        }
        match classify_response(line, &self.profile)? {
            ResponseEvent::FullStatus(record) => {
                self.state.shutter_moving = false;
                self.adopt_full_status(record);
            },
            ResponseEvent::ShutterMoving(_) => self.state.shutter_moving = true,
            _ => return Err(DomeError::MalformedResponse)
        }
        self.data_received_timer.reset();
        Ok(())
    }

    /// Drains unsolicited lines and updates the rotation state; returns
    /// whether the dome is still believed to be rotating.
    fn poll_dome_motion(&mut self) -> Result<bool, DomeError> {
        if !self.state.dome_moving {
            return Ok(false);
        }

        match drain_pending(self.transport.as_mut()) {
            Err(TransportError::Timeout) => {
                // nothing new since the last poll
                if self.data_received_timer.elapsed_seconds() >= DATA_WATCHDOG {
                    log::warn!(
                        "no status from the dome for {:.0} s, querying directly", DATA_WATCHDOG
                    );
                    self.state.dome_moving = false;
                    self.refresh_status(true)?;
                }
            },
            Err(e) => {
                self.state.dome_moving = false;
                return Err(e.into());
            },
            Ok(line) if line.is_empty() => (),
            Ok(line) => self.apply_rotation_event(&line)?
        }

        Ok(self.state.dome_moving)
    }

    fn apply_rotation_event(&mut self, line: &str) -> Result<(), DomeError> {
        match classify_response(line, &self.profile) {
            Ok(ResponseEvent::FullStatus(record)) => {
                self.state.dome_moving = false;
                self.adopt_full_status(record);
                self.data_received_timer.reset();
            },
            Ok(ResponseEvent::Rotating{ position_ticks, .. }) => {
                self.state.dome_moving = true;
                if let Some(ticks) = position_ticks {
                    self.update_azimuth_from_ticks(ticks);
                    self.maybe_short_circuit_goto();
                }
                self.data_received_timer.reset();
            },
            Ok(ResponseEvent::AzimuthTick) | Ok(ResponseEvent::ManualOperation) => {
                self.state.dome_moving = true;
                self.data_received_timer.reset();
            },
            Ok(ResponseEvent::PositionReport(ticks)) => {
                self.state.dome_moving = true;
                self.update_azimuth_from_ticks(ticks);
                self.maybe_short_circuit_goto();
                self.data_received_timer.reset();
            },
            Ok(_) => {
                log::debug!("ignoring \"{}\" while rotating", line);
                self.state.dome_moving = false;
            },
            Err(e) => {
                if line.starts_with('V') {
                    // truncated terminal record; the move is over, details
                    // come with the next query
                    self.state.dome_moving = false;
                } else {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn poll_shutter_motion(&mut self) -> Result<bool, DomeError> {
        if !self.state.shutter_moving {
            return Ok(false);
        }

        match drain_pending(self.transport.as_mut()) {
            Err(TransportError::Timeout) => {
                if self.data_received_timer.elapsed_seconds() >= DATA_WATCHDOG {
                    log::warn!(
                        "no status from the shutter for {:.0} s, querying directly", DATA_WATCHDOG
                    );
                    self.state.shutter_moving = false;
                    self.refresh_status(true)?;
                }
            },
            Err(e) => {
                self.state.shutter_moving = false;
                return Err(e.into());
            },
            Ok(line) if line.is_empty() => (),
            Ok(line) => self.apply_shutter_event(&line)?
        }

        Ok(self.state.shutter_moving)
    }

    fn apply_shutter_event(&mut self, line: &str) -> Result<(), DomeError> {
        match classify_response(line, &self.profile) {
            Ok(ResponseEvent::FullStatus(record)) => {
                // an INF streamed mid-travel reports the shutter
                // indeterminate; only a definite state ends the wait
                self.state.shutter_moving = record.shutter == ShutterState::Unknown;
                self.adopt_full_status(record);
                self.data_received_timer.reset();
            },
            Ok(ResponseEvent::ShutterMoving(_)) | Ok(ResponseEvent::ManualOperation) => {
                self.state.shutter_moving = true;
                self.data_received_timer.reset();
            },
            Ok(_) => {
                log::debug!("ignoring \"{}\" while the shutter moves", line);
                self.state.shutter_moving = false;
            },
            Err(e) => {
                if line.starts_with('V') {
                    self.state.shutter_moving = false;
                } else {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Current azimuth: live from the stream while rotating, otherwise from a
    /// (rate-limited) INF refresh.
    fn dome_azimuth(&mut self) -> Result<f64, DomeError> {
        if !self.state.dome_moving && !self.state.shutter_moving {
            self.refresh_status(false)?;
        }
        Ok(self.state.current_az_deg)
    }

    fn dome_at_home(&mut self) -> Result<bool, DomeError> {
        self.refresh_status(false)?;
        let at_home = matches!(&self.status, Some(record) if record.home == HomeSensor::AtHome);
        if at_home {
            self.state.dome_moving = false;
        }
        Ok(at_home)
    }

    /// Bounded sleep-and-poll loop over a completion predicate, used by the
    /// multi-step recovery sequences.
    fn wait_for<F>(&mut self, interval: Duration, max_attempts: usize, mut predicate: F)
        -> Result<PollOutcome, DomeError>
        where F: FnMut(&mut DdwDome) -> Result<bool, DomeError>
    {
        for _ in 0..max_attempts {
            self.sleeper.sleep(interval);
            if predicate(self)? {
                return Ok(PollOutcome::Completed);
            }
        }
        Ok(PollOutcome::TimedOut)
    }
}

impl Dome for DdwDome {
    fn info(&self) -> String {
        format!("DDW dome on {}", self.connection_str)
    }

    fn model(&self) -> String {
        "DDW".to_string()
    }

    fn firmware_version(&mut self) -> Result<String, DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        match &self.firmware_version {
            Some(version) => Ok(version.clone()),
            None => {
                self.refresh_status(false)?;
                match &self.status {
                    Some(record) => {
                        self.firmware_version = Some(record.version.clone());
                        Ok(record.version.clone())
                    },
                    None => Err(DomeError::NoResponse)
                }
            }
        }
    }

    fn goto_azimuth(&mut self, azimuth_deg: f64) -> Result<(), DomeError> {
        self.ensure_idle()?;
        let line = self.command(&goto_command(azimuth_deg), DEFAULT_COMMAND_TIMEOUT)?;
        self.state.goto_az_deg = Some(azimuth_deg);
        self.handle_motion_reply(&line)?;
        if !self.state.dome_moving {
            // a full record in reply means the target was within the dead
            // zone and no movement was started; there is nothing to judge
            // against the coast window later
            self.state.goto_az_deg = None;
        }
        Ok(())
    }

    fn open_shutter(&mut self) -> Result<(), DomeError> {
        self.ensure_idle()?;
        let line = self.command(command::OPEN_SHUTTER, SHUTTER_COMMAND_TIMEOUT)?;
        self.handle_shutter_reply(&line)
    }

    fn close_shutter(&mut self) -> Result<(), DomeError> {
        self.ensure_idle()?;
        let line = self.command(command::CLOSE_SHUTTER, SHUTTER_COMMAND_TIMEOUT)?;
        self.handle_shutter_reply(&line)
    }

    fn go_home(&mut self) -> Result<(), DomeError> {
        self.ensure_idle()?;
        self.state.goto_az_deg = None;
        let line = self.command(command::GO_HOME, DEFAULT_COMMAND_TIMEOUT)?;

        // A full record instead of movement means the controller believes it
        // is already home. When the sensor is active but the counter
        // disagrees, move off the sensor and try again so that the counter
        // gets resynchronized.
        if line.starts_with('V') {
            let record = parse_status_record(&line, &self.profile)?;
            let at_home = record.home == HomeSensor::AtHome;
            self.state.dome_moving = false;
            self.adopt_full_status(record);
            self.data_received_timer.reset();

            if at_home {
                let azimuth = self.state.current_az_deg;
                let home = self.state.home_az_deg;
                let coast = self.state.coast_deg;
                if azimuth < home - coast || azimuth > home + coast {
                    log::warn!(
                        "home sensor active but azimuth {:.1}° disagrees with home {:.1}°, re-homing",
                        azimuth, home
                    );
                    let off_target = azimuth + self.state.dead_zone_deg + 1.0;
                    self.goto_azimuth(off_target)?;
                    if self.wait_for(MOTION_POLL_INTERVAL, MOTION_POLL_ATTEMPTS,
                        |dome| dome.is_goto_complete())? == PollOutcome::TimedOut
                    {
                        return Err(DomeError::CommandFailed);
                    }
                    self.state.goto_az_deg = None;
                    let line = self.command(command::GO_HOME, DEFAULT_COMMAND_TIMEOUT)?;
                    self.handle_motion_reply(&line)?;
                    if self.wait_for(MOTION_POLL_INTERVAL, MOTION_POLL_ATTEMPTS,
                        |dome| dome.is_find_home_complete())? == PollOutcome::TimedOut
                    {
                        return Err(DomeError::CommandFailed);
                    }
                }
            }
            return Ok(());
        }

        self.handle_motion_reply(&line)
    }

    fn calibrate(&mut self) -> Result<(), DomeError> {
        self.ensure_idle()?;
        self.state.goto_az_deg = None;
        let line = self.command(command::CALIBRATE, DEFAULT_COMMAND_TIMEOUT)?;
        self.handle_motion_reply(&line)?;
        if self.state.dome_moving {
            self.state.calibrating = true;
        }
        Ok(())
    }

    fn park(&mut self) -> Result<(), DomeError> {
        self.go_home()
    }

    fn unpark(&mut self) -> Result<(), DomeError> {
        self.state.parked = false;
        self.go_home()
    }

    fn sync_to(&mut self, _azimuth_deg: f64, _elevation_deg: f64) -> Result<(), DomeError> {
        // the controller's azimuth counter can only be resynchronized by
        // re-homing, not set to an arbitrary value
        Err(DomeError::CommandNotSupported)
    }

    fn abort(&mut self) -> Result<(), DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        self.state.dome_moving = false;
        self.state.shutter_moving = false;
        self.state.calibrating = false;
        self.state.goto_az_deg = None;

        self.transport.purge().map_err(DomeError::from)?;
        self.transport.write_command(command::STOP).map_err(DomeError::from)?;
        // the controller may or may not acknowledge; do not wait for it
        match read_response(self.transport.as_mut(), ABORT_COMMAND_TIMEOUT) {
            Ok(_) | Err(TransportError::Timeout) => Ok(()),
            Err(e) => Err(e.into())
        }
    }

    fn is_goto_complete(&mut self) -> Result<bool, DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        if self.poll_dome_motion()? {
            return Ok(false);
        }
        let azimuth = self.dome_azimuth()?;
        match self.state.goto_az_deg {
            None => Ok(true),
            Some(goal) if within_window(goal, azimuth, self.state.coast_deg) => Ok(true),
            Some(goal) => {
                log::warn!(
                    "dome settled at {:.1}°, outside the ±{:.1}° window around {:.1}°",
                    azimuth, self.state.coast_deg, goal
                );
                Err(DomeError::CommandFailed)
            }
        }
    }

    fn is_open_complete(&mut self) -> Result<bool, DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        if self.poll_shutter_motion()? {
            return Ok(false);
        }
        self.refresh_status(false)?;
        match self.state.shutter_state {
            ShutterState::Open => Ok(true),
            other => {
                log::warn!("shutter reports {:?} after an open command", other);
                Err(DomeError::CommandFailed)
            }
        }
    }

    fn is_close_complete(&mut self) -> Result<bool, DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        if self.poll_shutter_motion()? {
            return Ok(false);
        }
        self.refresh_status(false)?;
        match self.state.shutter_state {
            ShutterState::Closed => Ok(true),
            other => {
                log::warn!("shutter reports {:?} after a close command", other);
                Err(DomeError::CommandFailed)
            }
        }
    }

    fn is_park_complete(&mut self) -> Result<bool, DomeError> {
        let complete = self.is_find_home_complete()?;
        if complete {
            self.state.parked = true;
        }
        Ok(complete)
    }

    fn is_unpark_complete(&mut self) -> Result<bool, DomeError> {
        let complete = self.is_find_home_complete()?;
        if complete {
            self.state.parked = false;
        }
        Ok(complete)
    }

    fn is_find_home_complete(&mut self) -> Result<bool, DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        if self.poll_dome_motion()? {
            return Ok(false);
        }
        if self.dome_at_home()? {
            Ok(true)
        } else {
            log::warn!("dome stopped but the home sensor is not active");
            Err(DomeError::CommandFailed)
        }
    }

    fn is_calibrating_complete(&mut self) -> Result<bool, DomeError> {
        if !self.connected {
            return Err(DomeError::NotConnected);
        }
        if self.poll_dome_motion()? {
            return Ok(false);
        }
        if !self.state.calibrating {
            return Ok(true);
        }
        let azimuth = self.dome_azimuth()?;
        if azimuth.ceil() != self.state.home_az_deg.ceil() {
            // a calibration run ends on the home sensor; trust the sensor
            // over the counter
            self.state.current_az_deg = self.state.home_az_deg;
        }
        self.state.calibrating = false;
        Ok(true)
    }

    fn current_azimuth(&mut self) -> f64 {
        if self.connected {
            let _ = self.dome_azimuth();
        }
        self.state.current_az_deg
    }

    fn current_elevation(&mut self) -> f64 {
        if self.connected && !self.state.shutter_moving {
            let _ = self.refresh_status(false);
        }
        self.state.current_el_deg
    }

    fn home_azimuth(&mut self) -> f64 {
        if self.connected && !self.state.dome_moving && !self.state.shutter_moving {
            let _ = self.refresh_status(false);
        }
        self.state.home_az_deg
    }

    fn shutter_state(&mut self) -> ShutterState {
        if self.connected && !self.state.dome_moving && !self.state.shutter_moving {
            let _ = self.refresh_status(false);
        }
        self.state.shutter_state
    }

    fn steps_per_revolution(&mut self) -> u32 {
        if self.connected && !self.state.dome_moving && !self.state.shutter_moving {
            let _ = self.refresh_status(false);
        }
        self.state.steps_per_rev
    }

    fn is_at_home(&mut self) -> bool {
        self.connected && self.dome_at_home().unwrap_or(false)
    }

    fn is_parked(&self) -> bool {
        self.state.parked
    }

    fn disconnect(&mut self) {
        if self.connected {
            let _ = self.transport.purge();
            log::info!("disconnected from {}", self.connection_str);
        }
        self.connected = false;
        self.firmware_version = None;
        self.status = None;
        self.state = DriverState::default();
    }
}
