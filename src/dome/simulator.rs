use crate::dome::{Dome, DomeError};
use crate::protocol::ShutterState;

/// Degrees of rotation per completion poll.
const ROTATION_STEP: f64 = 15.0;

/// Completion polls needed for a full shutter travel.
const SHUTTER_TRAVEL_POLLS: u32 = 3;

const HOME_AZIMUTH: f64 = 180.0;

/// In-memory dome: every completion poll advances the simulated movement by
/// one step, so client code sees the same start-then-poll life cycle as with
/// the real controller.
pub struct Simulator {
    connected: bool,
    current_az_deg: f64,
    target_az_deg: f64,
    shutter: ShutterState,
    shutter_target: Option<ShutterState>,
    shutter_polls_left: u32,
    parked: bool
}

impl Simulator {
    pub fn new() -> Simulator {
        Simulator{
            connected: true,
            current_az_deg: HOME_AZIMUTH,
            target_az_deg: HOME_AZIMUTH,
            shutter: ShutterState::Closed,
            shutter_target: None,
            shutter_polls_left: 0,
            parked: true
        }
    }

    fn rotation_pending(&self) -> bool {
        (self.current_az_deg - self.target_az_deg).abs() > 1.0e-9
    }

    fn step_rotation(&mut self) {
        let mut diff = (self.target_az_deg - self.current_az_deg).rem_euclid(360.0);
        if diff > 180.0 { diff -= 360.0; }
        if diff.abs() <= ROTATION_STEP {
            self.current_az_deg = self.target_az_deg;
        } else {
            self.current_az_deg =
                (self.current_az_deg + ROTATION_STEP * diff.signum()).rem_euclid(360.0);
        }
    }

    fn step_shutter(&mut self) -> bool {
        match self.shutter_target {
            None => true,
            Some(target) => {
                if self.shutter_polls_left > 1 {
                    self.shutter_polls_left -= 1;
                    self.shutter = ShutterState::Unknown;
                    false
                } else {
                    self.shutter = target;
                    self.shutter_target = None;
                    self.shutter_polls_left = 0;
                    true
                }
            }
        }
    }

    fn ensure_connected(&self) -> Result<(), DomeError> {
        if self.connected { Ok(()) } else { Err(DomeError::NotConnected) }
    }

    fn is_rotation_complete(&mut self) -> Result<bool, DomeError> {
        self.ensure_connected()?;
        if self.rotation_pending() {
            self.step_rotation();
        }
        Ok(!self.rotation_pending())
    }
}

impl Dome for Simulator {
    fn info(&self) -> String {
        "Dome simulator".to_string()
    }

    fn model(&self) -> String {
        "Simulator".to_string()
    }

    fn firmware_version(&mut self) -> Result<String, DomeError> {
        self.ensure_connected()?;
        Ok("SIM".to_string())
    }

    fn goto_azimuth(&mut self, azimuth_deg: f64) -> Result<(), DomeError> {
        self.ensure_connected()?;
        self.target_az_deg = azimuth_deg.rem_euclid(360.0);
        self.parked = false;
        Ok(())
    }

    fn open_shutter(&mut self) -> Result<(), DomeError> {
        self.ensure_connected()?;
        if self.shutter != ShutterState::Open {
            self.shutter_target = Some(ShutterState::Open);
            self.shutter_polls_left = SHUTTER_TRAVEL_POLLS;
        }
        Ok(())
    }

    fn close_shutter(&mut self) -> Result<(), DomeError> {
        self.ensure_connected()?;
        if self.shutter != ShutterState::Closed {
            self.shutter_target = Some(ShutterState::Closed);
            self.shutter_polls_left = SHUTTER_TRAVEL_POLLS;
        }
        Ok(())
    }

    fn go_home(&mut self) -> Result<(), DomeError> {
        self.ensure_connected()?;
        self.target_az_deg = HOME_AZIMUTH;
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), DomeError> {
        self.go_home()
    }

    fn park(&mut self) -> Result<(), DomeError> {
        self.go_home()
    }

    fn unpark(&mut self) -> Result<(), DomeError> {
        self.ensure_connected()?;
        self.parked = false;
        Ok(())
    }

    fn sync_to(&mut self, _azimuth_deg: f64, _elevation_deg: f64) -> Result<(), DomeError> {
        self.ensure_connected()?;
        Err(DomeError::CommandNotSupported)
    }

    fn abort(&mut self) -> Result<(), DomeError> {
        self.ensure_connected()?;
        self.target_az_deg = self.current_az_deg;
        self.shutter_target = None;
        self.shutter_polls_left = 0;
        Ok(())
    }

    fn is_goto_complete(&mut self) -> Result<bool, DomeError> {
        self.is_rotation_complete()
    }

    fn is_open_complete(&mut self) -> Result<bool, DomeError> {
        self.ensure_connected()?;
        Ok(self.step_shutter() && self.shutter == ShutterState::Open)
    }

    fn is_close_complete(&mut self) -> Result<bool, DomeError> {
        self.ensure_connected()?;
        Ok(self.step_shutter() && self.shutter == ShutterState::Closed)
    }

    fn is_park_complete(&mut self) -> Result<bool, DomeError> {
        let complete = self.is_rotation_complete()?;
        if complete {
            self.parked = true;
        }
        Ok(complete)
    }

    fn is_unpark_complete(&mut self) -> Result<bool, DomeError> {
        self.ensure_connected()?;
        Ok(true)
    }

    fn is_find_home_complete(&mut self) -> Result<bool, DomeError> {
        self.is_rotation_complete()
    }

    fn is_calibrating_complete(&mut self) -> Result<bool, DomeError> {
        self.is_rotation_complete()
    }

    fn current_azimuth(&mut self) -> f64 {
        self.current_az_deg
    }

    fn current_elevation(&mut self) -> f64 {
        if self.shutter == ShutterState::Open { 90.0 } else { 0.0 }
    }

    fn home_azimuth(&mut self) -> f64 {
        HOME_AZIMUTH
    }

    fn shutter_state(&mut self) -> ShutterState {
        self.shutter
    }

    fn steps_per_revolution(&mut self) -> u32 {
        360
    }

    fn is_at_home(&mut self) -> bool {
        (self.current_az_deg - HOME_AZIMUTH).abs() < 1.0
    }

    fn is_parked(&self) -> bool {
        self.parked
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_goto_polling_advances_until_the_target() {
        let mut dome = Simulator::new();
        dome.goto_azimuth(240.0).unwrap();

        let mut polls = 0;
        while !dome.is_goto_complete().unwrap() {
            polls += 1;
            assert!(polls < 100);
        }
        assert_eq!(240.0, dome.current_azimuth());
        assert!(polls >= 3);
    }

    #[test]
    fn given_goto_across_north_the_short_way_is_taken() {
        let mut dome = Simulator::new();
        dome.goto_azimuth(350.0).unwrap();
        while !dome.is_goto_complete().unwrap() {}

        dome.goto_azimuth(10.0).unwrap();
        assert!(!dome.is_goto_complete().unwrap());
        // 350° + 15° wraps to 5°, not 335°
        assert!((dome.current_azimuth() - 5.0).abs() < 1.0e-9);
    }

    #[test]
    fn given_sync_request_it_is_not_supported() {
        let mut dome = Simulator::new();
        assert!(matches!(dome.sync_to(100.0, 0.0), Err(DomeError::CommandNotSupported)));
    }

    #[test]
    fn given_shutter_cycle_states_progress() {
        let mut dome = Simulator::new();
        dome.open_shutter().unwrap();
        assert!(!dome.is_open_complete().unwrap());
        assert_eq!(ShutterState::Unknown, dome.shutter_state());
        assert!(!dome.is_open_complete().unwrap());
        assert!(dome.is_open_complete().unwrap());
        assert_eq!(ShutterState::Open, dome.shutter_state());
        assert_eq!(90.0, dome.current_elevation());

        dome.close_shutter().unwrap();
        while !dome.is_close_complete().unwrap() {}
        assert_eq!(ShutterState::Closed, dome.shutter_state());
    }

    #[test]
    fn given_abort_the_dome_stays_put() {
        let mut dome = Simulator::new();
        dome.goto_azimuth(300.0).unwrap();
        assert!(!dome.is_goto_complete().unwrap());
        dome.abort().unwrap();
        assert!(dome.is_goto_complete().unwrap());
        assert!((dome.current_azimuth() - 195.0).abs() < 1.0e-9);
    }
}
