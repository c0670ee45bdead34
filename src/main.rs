//
// ddwdome - Digital Dome Works (DDW) dome controller driver
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Interactive command-line client of the `ddwdome` library.
//!

mod args;

use ddwdome::dome::{connect_to_dome, poll_until, Dome, DomeConnection, DomeError, PollOutcome};
use ddwdome::protocol::ProtocolProfile;
use ddwdome::transport::StdSleeper;
use std::io::{BufRead, Write};
use std::time::Duration;

pub const VERSION_STRING: &'static str = include_str!(concat!(env!("OUT_DIR"), "/version"));

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: usize = 300;

fn main() {
    let args = args::parse_command_line(std::env::args());

    if args.logging { set_up_logging(); }

    log::info!("ddwdome ver. {} started", VERSION_STRING);

    let connection = if args.simulator {
        DomeConnection::Simulator
    } else {
        let device = match args.device {
            Some(device) => device,
            None => {
                eprintln!("No serial device given; use --device <path> or --simulator.");
                std::process::exit(1);
            }
        };
        let profile = if args.legacy_protocol {
            ProtocolProfile::legacy()
        } else {
            ProtocolProfile::default()
        };
        DomeConnection::DdwSerial{
            device,
            hardware_flow_control: args.hardware_flow_control,
            profile
        }
    };

    let mut dome = match connect_to_dome(connection) {
        Ok(dome) => dome,
        Err(e) => {
            eprintln!("Connection failed: {}.", e);
            std::process::exit(1);
        }
    };
    println!("Connected to {}.", dome.info());
    println!("Type \"help\" for the command list.");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => ()
        }
        if !run_command(dome.as_mut(), line.trim()) {
            break;
        }
    }

    dome.disconnect();
}

/// Returns `false` when the client should quit.
fn run_command(dome: &mut dyn Dome, line: &str) -> bool {
    let mut words = line.split_whitespace();
    match words.next() {
        None => (),

        Some("help") => print_help(),

        Some("status") => print_status(dome),

        Some("goto") => {
            match words.next().and_then(|s| s.parse::<f64>().ok()) {
                Some(azimuth) if (0.0..360.0).contains(&azimuth) => {
                    if started(dome.goto_azimuth(azimuth)) {
                        wait(dome, "goto", |d| d.is_goto_complete());
                    }
                },
                _ => println!("Usage: goto <azimuth 0-359>.")
            }
        },

        Some("open") => {
            if started(dome.open_shutter()) {
                wait(dome, "shutter open", |d| d.is_open_complete());
            }
        },

        Some("close") => {
            if started(dome.close_shutter()) {
                wait(dome, "shutter close", |d| d.is_close_complete());
            }
        },

        Some("home") => {
            if started(dome.go_home()) {
                wait(dome, "homing", |d| d.is_find_home_complete());
            }
        },

        Some("cal") => {
            if started(dome.calibrate()) {
                wait(dome, "calibration", |d| d.is_calibrating_complete());
            }
        },

        Some("park") => {
            if started(dome.park()) {
                wait(dome, "parking", |d| d.is_park_complete());
            }
        },

        Some("unpark") => {
            if started(dome.unpark()) {
                wait(dome, "unparking", |d| d.is_unpark_complete());
            }
        },

        Some("stop") => {
            match dome.abort() {
                Ok(()) => println!("Stopped."),
                Err(e) => println!("Stop failed: {}.", e)
            }
        },

        Some("quit") | Some("exit") => return false,

        Some(other) => println!("Unknown command: {}.", other)
    }

    true
}

fn started(result: Result<(), DomeError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            println!("Command failed: {}.", e);
            false
        }
    }
}

fn wait(
    dome: &mut dyn Dome,
    description: &str,
    predicate: fn(&mut dyn Dome) -> Result<bool, DomeError>
) {
    let outcome = poll_until(&mut StdSleeper, POLL_INTERVAL, MAX_POLLS, || predicate(dome));
    match outcome {
        Ok(PollOutcome::Completed) => println!("{}: complete (azimuth {:.1}°).", description, dome.current_azimuth()),
        Ok(PollOutcome::TimedOut) => println!("{}: timed out.", description),
        Err(e) => println!("{}: failed ({}).", description, e)
    }
}

fn print_status(dome: &mut dyn Dome) {
    println!("model:           {}", dome.model());
    match dome.firmware_version() {
        Ok(version) => println!("firmware:        {}", version),
        Err(e) => println!("firmware:        unavailable ({})", e)
    }
    println!("azimuth:         {:.1}°", dome.current_azimuth());
    println!("elevation:       {:.1}°", dome.current_elevation());
    println!("home azimuth:    {:.1}°", dome.home_azimuth());
    println!("steps per rev.:  {}", dome.steps_per_revolution());
    println!("shutter:         {:?}", dome.shutter_state());
    println!("at home:         {}", dome.is_at_home());
    println!("parked:          {}", dome.is_parked());
}

fn print_help() {
    println!("status        show dome state");
    println!("goto <az>     rotate to the given azimuth (degrees)");
    println!("open          open the shutter");
    println!("close         close the shutter");
    println!("home          rotate to the home position");
    println!("cal           calibrate the steps-per-revolution count");
    println!("park          park (home) the dome");
    println!("unpark        unpark the dome");
    println!("stop          stop all motion");
    println!("quit          disconnect and exit");
}

fn set_up_logging() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("{}\n\n{}", info, backtrace);
    }));

    let logfile = dirs::data_dir().unwrap_or(std::path::Path::new("").to_path_buf())
        .join(format!("ddwdome_{}.log", chrono::Local::now().format("%Y-%m-%d_%H%M%S")));
    println!("Logging to: {}", logfile.to_string_lossy());
    simplelog::WriteLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::ConfigBuilder::new()
            .set_target_level(simplelog::LevelFilter::Error)
            .build(),
        std::fs::File::create(logfile).unwrap()
    ).unwrap();
}
