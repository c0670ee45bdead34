//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! DDW wire protocol: commands, INF record parsing, response classification.
//!
//! The controller speaks a compact ASCII protocol over the serial link. Each
//! command is a short keyword (e.g. `GINF`, `GHOM`) or `G<NNN>` for a goto;
//! each response is a single line terminated by a carriage return. While a
//! movement is in progress the controller streams unsolicited one-character
//! status lines (`L`, `R`, `T`, `P<ticks>`, `C`, `O`, `S`) until the
//! operation finishes with a full `V...` INF record.
//!
//! Everything in this module is pure; I/O lives in [`crate::transport`].
//!

pub mod command {
    pub const GET_INF: &str = "GINF";
    pub const GO_HOME: &str = "GHOM";
    pub const CALIBRATE: &str = "GTRN";
    pub const OPEN_SHUTTER: &str = "GOPN";
    pub const CLOSE_SHUTTER: &str = "GCLS";
    pub const STOP: &str = "STOP\n";

    pub const RESPONSE_TERMINATOR: u8 = 0x0D;
}

/// INF record field indexes (23-field revisions; `V1` firmware stops at `HOME`).
mod field {
    pub const VERSION: usize = 0;
    pub const DTICKS: usize = 1;
    pub const HOME_AZ: usize = 2;
    pub const COAST: usize = 3;
    pub const ADAZ: usize = 4;
    pub const SLAVE: usize = 5;
    pub const SHUTTER: usize = 6;
    pub const DSR: usize = 7;
    pub const HOME: usize = 8;
    pub const AUX_START: usize = 9;
    pub const INTDZ: usize = 21;
}

const V1_FIELD_COUNT: usize = 9;
const FULL_FIELD_COUNT: usize = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Splitting produced no fields at all.
    BadFormat,
    /// The response does not have the shape the protocol requires.
    MalformedResponse,
    /// A field that must be numeric is not.
    DataOutOfRange
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParseError::BadFormat => write!(f, "response could not be split into fields"),
            ParseError::MalformedResponse => write!(f, "response does not match the protocol"),
            ParseError::DataOutOfRange => write!(f, "non-numeric content in a numeric field")
        }
    }
}

impl std::error::Error for ParseError {}

/// Firmware-revision-specific protocol parameters.
///
/// The DDW firmware went through several incompatible revisions; rather than
/// maintaining parallel drivers, the differences are collected here and the
/// single engine is parameterized by them.
#[derive(Clone, Copy, Debug)]
pub struct ProtocolProfile {
    /// Degrees in a full dome revolution. Most firmware maps `DTICKS` ticks to
    /// 360 degrees, but at least one revision used 359; no documented
    /// rationale exists, so this stays configurable instead of being silently
    /// "fixed".
    pub circle_degrees: f64,
    /// Drop empty segments when splitting fields. INF fields are positional,
    /// so dropping empties shifts every later field; kept only for firmware
    /// that actually emits such records.
    pub drop_empty_fields: bool
}

impl Default for ProtocolProfile {
    fn default() -> ProtocolProfile {
        ProtocolProfile{ circle_degrees: 360.0, drop_empty_fields: false }
    }
}

impl ProtocolProfile {
    /// Profile matching the oldest deployed firmware revision.
    pub fn legacy() -> ProtocolProfile {
        ProtocolProfile{ circle_degrees: 359.0, drop_empty_fields: true }
    }
}

//  0=indeterminate, 1=closed, 2=open
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::FromRepr)]
#[repr(i32)]
pub enum ShutterState {
    Unknown = 0,
    Closed = 1,
    Open = 2
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::FromRepr)]
#[repr(i32)]
pub enum HomeSensor {
    AtHome = 0,
    NotAtHome = 1
}

/// A parsed INF record.
///
/// Replaced wholesale on every successful `GINF` (or terminal `V...` status
/// line); never partially updated.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusRecord {
    /// Protocol version tag, e.g. "V4". Doubles as the firmware version string.
    pub version: String,
    /// Encoder ticks per full dome revolution (`DTICKS`).
    pub steps_per_rev: u32,
    /// Home position in ticks.
    pub home_ticks: f64,
    /// Coast (overshoot allowance) in ticks.
    pub coast_ticks: f64,
    /// Current azimuth in ticks (`ADAZ`).
    pub azimuth_ticks: f64,
    pub slave_mode: bool,
    pub shutter: ShutterState,
    pub dsr: bool,
    pub home: HomeSensor,
    /// Weather/peripheral telemetry fields (index 9 onwards); opaque to the
    /// driver and passed through unmodified.
    pub aux: Vec<String>
}

impl StatusRecord {
    /// Dead zone (`INTDZ`) in whole degrees, as the firmware reports it.
    /// `None` on `V1` records, which do not carry the field.
    pub fn dead_zone_deg(&self) -> Option<f64> {
        self.aux.get(field::INTDZ - field::AUX_START).and_then(|s| parse_f64(s).ok())
    }
}

/// Splits a response line into fields.
///
/// With `drop_empty` set, empty segments are removed (matching the behavior
/// of some firmware-era host drivers); by default they are preserved so that
/// positional field indexes stay meaningful.
pub fn parse_fields<'a>(line: &'a str, separator: char, drop_empty: bool)
    -> Result<Vec<&'a str>, ParseError>
{
    let mut fields: Vec<&str> = line.split(separator).collect();
    if drop_empty {
        fields.retain(|f| !f.is_empty());
    }
    if fields.is_empty() || (fields.len() == 1 && fields[0].is_empty()) {
        return Err(ParseError::BadFormat);
    }

    Ok(fields)
}

fn parse_u32(s: &str) -> Result<u32, ParseError> {
    s.trim().parse::<u32>().map_err(|_| ParseError::DataOutOfRange)
}

fn parse_f64(s: &str) -> Result<f64, ParseError> {
    s.trim().parse::<f64>().map_err(|_| ParseError::DataOutOfRange)
}

fn parse_i32(s: &str) -> Result<i32, ParseError> {
    s.trim().parse::<i32>().map_err(|_| ParseError::DataOutOfRange)
}

/// Parses a full INF record, e.g.:
///
/// `V4,701,527,4,526,0,1,1,0,522,532,0,128,255,255,255,255,255,255,255,999,5,0`
///
/// `V1` records carry 9 fields, every later revision 23; fewer fields than
/// required is a framing error.
pub fn parse_status_record(line: &str, profile: &ProtocolProfile)
    -> Result<StatusRecord, ParseError>
{
    let fields = parse_fields(line, ',', profile.drop_empty_fields)?;

    let required = if fields[field::VERSION] == "V1" { V1_FIELD_COUNT } else { FULL_FIELD_COUNT };
    if fields.len() < required {
        return Err(ParseError::MalformedResponse);
    }

    Ok(StatusRecord{
        version: fields[field::VERSION].to_string(),
        steps_per_rev: parse_u32(fields[field::DTICKS])?,
        home_ticks: parse_f64(fields[field::HOME_AZ])?,
        coast_ticks: parse_f64(fields[field::COAST])?,
        azimuth_ticks: parse_f64(fields[field::ADAZ])?,
        slave_mode: parse_i32(fields[field::SLAVE])? != 0,
        shutter: ShutterState::from_repr(parse_i32(fields[field::SHUTTER])?)
            .unwrap_or(ShutterState::Unknown),
        dsr: parse_i32(fields[field::DSR])? != 0,
        home: HomeSensor::from_repr(parse_i32(fields[field::HOME])?)
            .unwrap_or(HomeSensor::NotAtHome),
        aux: fields[field::AUX_START..].iter().map(|s| s.to_string()).collect()
    })
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RotationDirection {
    Left,
    Right
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShutterMotion {
    Opening,
    Closing
}

/// A response line classified by its leading character.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseEvent {
    /// `V...` — a full INF record; the current operation has finished.
    FullStatus(StatusRecord),
    /// `L`/`R`, optionally with an embedded `P<ticks>` position fragment.
    Rotating{ direction: RotationDirection, position_ticks: Option<f64> },
    /// `T` — azimuth encoder tick while rotating.
    AzimuthTick,
    /// `P<ticks>` — position report while rotating.
    PositionReport(f64),
    /// `C`/`O` — shutter motion.
    ShutterMoving(ShutterMotion),
    /// `S` — manual operation in progress.
    ManualOperation,
    Unrecognized
}

/// Classifies one response line. Pure; the state transitions that consume the
/// result live in the driver.
pub fn classify_response(line: &str, profile: &ProtocolProfile)
    -> Result<ResponseEvent, ParseError>
{
    match line.chars().next() {
        None => Ok(ResponseEvent::Unrecognized),

        Some('V') => Ok(ResponseEvent::FullStatus(parse_status_record(line, profile)?)),

        Some(ch @ 'L') | Some(ch @ 'R') => {
            let direction = if ch == 'L' { RotationDirection::Left } else { RotationDirection::Right };
            let position_ticks = if line[1..].starts_with('P') {
                Some(parse_position_fragment(line, profile)?)
            } else {
                None
            };
            Ok(ResponseEvent::Rotating{ direction, position_ticks })
        },

        Some('T') => Ok(ResponseEvent::AzimuthTick),

        Some('P') => Ok(ResponseEvent::PositionReport(parse_position_fragment(line, profile)?)),

        Some('O') => Ok(ResponseEvent::ShutterMoving(ShutterMotion::Opening)),

        Some('C') => Ok(ResponseEvent::ShutterMoving(ShutterMotion::Closing)),

        Some('S') => Ok(ResponseEvent::ManualOperation),

        Some(_) => Ok(ResponseEvent::Unrecognized)
    }
}

/// Extracts the tick count following the `P` in lines like `P350` or `LP350`.
fn parse_position_fragment(line: &str, profile: &ProtocolProfile) -> Result<f64, ParseError> {
    let fields = parse_fields(line, 'P', profile.drop_empty_fields)?;
    match fields.last() {
        Some(last) if !last.is_empty() => parse_f64(last),
        _ => Err(ParseError::DataOutOfRange)
    }
}

/// Formats a goto command; the azimuth is truncated to an integer and
/// zero-padded to three digits, as the controller expects.
pub fn goto_command(azimuth_deg: f64) -> String {
    format!("G{:03}", azimuth_deg as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INF: &str = "V4,701,527,4,526,0,1,1,0,522,532,0,128,255,255,255,255,255,255,255,999,5,0";

    fn profile() -> ProtocolProfile { ProtocolProfile::default() }

    #[test]
    fn given_separators_no_field_equals_whole_input() {
        for input in ["a,,b", "1,2,3", ",x"].iter() {
            let fields = parse_fields(input, ',', false).unwrap();
            assert!(fields.iter().all(|f| f != input));
        }
    }

    #[test]
    fn given_empty_segments_policy_decides() {
        assert_eq!(vec!["a", "", "b"], parse_fields("a,,b", ',', false).unwrap());
        assert_eq!(vec!["a", "b"], parse_fields("a,,b", ',', true).unwrap());
    }

    #[test]
    fn given_no_fields_parse_fails() {
        assert_eq!(Err(ParseError::BadFormat), parse_fields("", ',', false));
        assert_eq!(Err(ParseError::BadFormat), parse_fields(",,,", ',', true));
    }

    #[test]
    fn given_full_v4_record_parse_succeeds() {
        let record = parse_status_record(SAMPLE_INF, &profile()).unwrap();
        assert_eq!("V4", record.version);
        assert_eq!(701, record.steps_per_rev);
        assert_eq!(527.0, record.home_ticks);
        assert_eq!(4.0, record.coast_ticks);
        assert_eq!(526.0, record.azimuth_ticks);
        assert_eq!(ShutterState::Closed, record.shutter);
        assert_eq!(HomeSensor::AtHome, record.home);
        assert_eq!(14, record.aux.len());
        assert_eq!(Some(5.0), record.dead_zone_deg());
    }

    #[test]
    fn given_truncated_record_parse_fails() {
        let truncated = SAMPLE_INF.split(',').take(8).collect::<Vec<_>>().join(",");
        assert_eq!(Err(ParseError::MalformedResponse), parse_status_record(&truncated, &profile()));
    }

    #[test]
    fn given_v1_record_nine_fields_suffice() {
        let record = parse_status_record("V1,701,527,4,526,0,2,1,1", &profile()).unwrap();
        assert_eq!("V1", record.version);
        assert_eq!(ShutterState::Open, record.shutter);
        assert_eq!(HomeSensor::NotAtHome, record.home);
        assert!(record.aux.is_empty());
        assert_eq!(None, record.dead_zone_deg());
    }

    #[test]
    fn given_non_numeric_field_parse_fails() {
        assert_eq!(
            Err(ParseError::DataOutOfRange),
            parse_status_record("V4,abc,527,4,526,0,1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0", &profile())
        );
    }

    #[test]
    fn given_unknown_shutter_code_state_is_unknown() {
        let record = parse_status_record("V1,701,527,4,526,0,7,1,0", &profile()).unwrap();
        assert_eq!(ShutterState::Unknown, record.shutter);
    }

    #[test]
    fn given_movement_lines_classification_matches() {
        let p = profile();
        assert_eq!(
            ResponseEvent::Rotating{ direction: RotationDirection::Right, position_ticks: None },
            classify_response("R", &p).unwrap()
        );
        assert_eq!(
            ResponseEvent::Rotating{ direction: RotationDirection::Left, position_ticks: Some(350.0) },
            classify_response("LP350", &p).unwrap()
        );
        assert_eq!(ResponseEvent::AzimuthTick, classify_response("T", &p).unwrap());
        assert_eq!(ResponseEvent::PositionReport(350.0), classify_response("P350", &p).unwrap());
        assert_eq!(
            ResponseEvent::ShutterMoving(ShutterMotion::Opening),
            classify_response("O", &p).unwrap()
        );
        assert_eq!(
            ResponseEvent::ShutterMoving(ShutterMotion::Closing),
            classify_response("C", &p).unwrap()
        );
        assert_eq!(ResponseEvent::ManualOperation, classify_response("S", &p).unwrap());
        assert_eq!(ResponseEvent::Unrecognized, classify_response("x", &p).unwrap());
        assert_eq!(ResponseEvent::Unrecognized, classify_response("", &p).unwrap());
    }

    #[test]
    fn given_full_status_line_classification_parses_it() {
        match classify_response(SAMPLE_INF, &profile()).unwrap() {
            ResponseEvent::FullStatus(record) => assert_eq!(701, record.steps_per_rev),
            other => panic!("unexpected event: {:?}", other)
        }
    }

    #[test]
    fn given_bare_position_marker_classification_fails() {
        assert_eq!(Err(ParseError::DataOutOfRange), classify_response("P", &profile()));
    }

    #[test]
    fn given_azimuth_goto_command_is_zero_padded() {
        assert_eq!("G090", goto_command(90.0));
        assert_eq!("G005", goto_command(5.7));
        assert_eq!("G270", goto_command(270.4));
    }
}
