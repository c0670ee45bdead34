//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Driver for Technical Innovations' Digital Dome Works (DDW) observatory
//! dome controllers.
//!
//! The controller rotates the dome and operates the shutter; it speaks a
//! compact ASCII protocol over a 9600 8N1 serial link. Client code talks to
//! the [`dome::Dome`] trait, obtained from [`dome::connect_to_dome`]:
//!
//! ```no_run
//! use ddwdome::dome::{connect_to_dome, DomeConnection};
//! use ddwdome::protocol::ProtocolProfile;
//!
//! let mut dome = connect_to_dome(DomeConnection::DdwSerial{
//!     device: "/dev/ttyUSB0".to_string(),
//!     hardware_flow_control: false,
//!     profile: ProtocolProfile::default()
//! }).unwrap();
//!
//! dome.goto_azimuth(135.0).unwrap();
//! while !dome.is_goto_complete().unwrap() {
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! ```
//!

pub mod dome;
pub mod protocol;
pub mod stopwatch;
pub mod transport;
pub mod units;
