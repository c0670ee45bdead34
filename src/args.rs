//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Command-line argument parsing.
//!

mod cmdline {
    pub const ENABLE_LOGGING: &str = "log";
    pub const DEVICE: &str = "device";
    pub const SIMULATOR: &str = "simulator";
    pub const HW_FLOW_CONTROL: &str = "hw-flow-control";
    pub const LEGACY_PROTOCOL: &str = "legacy-protocol";
}

pub struct Args {
    pub logging: bool,
    /// Serial device of the DDW unit, e.g. "/dev/ttyUSB0" or "COM3".
    pub device: Option<String>,
    pub simulator: bool,
    pub hardware_flow_control: bool,
    /// Use the oldest firmware revision's protocol quirks.
    pub legacy_protocol: bool
}

impl Default for Args {
    fn default() -> Args {
        Args{
            logging: false,
            device: None,
            simulator: false,
            hardware_flow_control: false,
            legacy_protocol: false
        }
    }
}

pub fn parse_command_line<I: Iterator<Item=String>>(stream: I) -> Args {
    let allowed_options = vec![
        cmdline::ENABLE_LOGGING,
        cmdline::DEVICE,
        cmdline::SIMULATOR,
        cmdline::HW_FLOW_CONTROL,
        cmdline::LEGACY_PROTOCOL
    ];

    // key: option name
    let mut option_values = std::collections::HashMap::<String, Vec<String>>::new();

    let mut current: Option<&mut Vec<String>> = None;

    for arg in stream.skip(1) /*skip the binary name*/ {
        if arg.starts_with("--") {
            match &arg[2..] {
                x if !allowed_options.contains(&x) => {
                    eprintln!("Unknown command-line option: {}.", x);
                    return Args::default();
                },

                opt => current = Some(option_values.entry(opt.to_string()).or_insert(vec![])),
            }
        } else {
            if current.is_none() {
                eprintln!("Unexpected value: {}.", arg);
                return Args::default();
            } else {
                (*(*current.as_mut().unwrap())).push(arg);
            }
        }
    }

    Args{
        logging: option_values.contains_key(cmdline::ENABLE_LOGGING),
        device: option_values.get(cmdline::DEVICE).and_then(|values| values.first().cloned()),
        simulator: option_values.contains_key(cmdline::SIMULATOR),
        hardware_flow_control: option_values.contains_key(cmdline::HW_FLOW_CONTROL),
        legacy_protocol: option_values.contains_key(cmdline::LEGACY_PROTOCOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(words: &[&str]) -> Args {
        parse_command_line(
            std::iter::once("ddwdome".to_string()).chain(words.iter().map(|s| s.to_string()))
        )
    }

    #[test]
    fn given_device_option_its_value_is_captured() {
        let args = args_of(&["--device", "/dev/ttyUSB0", "--log"]);
        assert_eq!(Some("/dev/ttyUSB0".to_string()), args.device);
        assert!(args.logging);
        assert!(!args.simulator);
    }

    #[test]
    fn given_unknown_option_defaults_are_returned() {
        let args = args_of(&["--frobnicate"]);
        assert_eq!(None, args.device);
        assert!(!args.logging);
    }
}
