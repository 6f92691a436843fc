//! Route-B smart meter polling daemon: brings the Wi-SUN module up, joins
//! the meter's PAN (scanning and caching the beacon descriptor on first
//! run), then polls instantaneous power and current over ECHONET Lite.

mod bridge;
mod serial;

use clap::{Arg, ArgAction, Command};
use echonet::code::DeviceClass;
use echonet::esv::EnetService;
use echonet::frame::EchonetRequest;
use echonet::object::EnetObject;
use echonet::property::{MomentCurrent, MomentPower, Property};
use echonet::transport::{Transport, TransportConfig};
use skstack::adapter::RadioAdapter;
use skstack::epan::Epan;
use skstack::link::SerialWrite;
use slog::{debug, error, info, warn, Logger};
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

const SCAN_DURATION: u8 = 6;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = Command::new("meterd")
        .about("Polls a Route-B smart electricity meter over a Wi-SUN module")
        .arg(
            Arg::new("port")
                .long("port")
                .env("SERIAL_PORT")
                .required(true)
                .help("Serial port of the Wi-SUN module"),
        )
        .arg(
            Arg::new("rbid")
                .long("rbid")
                .env("RB_ID")
                .required(true)
                .help("Route-B authentication id"),
        )
        .arg(
            Arg::new("rbpassword")
                .long("rbpassword")
                .env("RB_PASSWORD")
                .required(true)
                .help("Route-B password"),
        )
        .arg(
            Arg::new("epan-file")
                .long("epan-file")
                .default_value("epan.json")
                .help("Cache file for the scanned beacon descriptor"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .get_matches();

    let log = init_logging(matches.get_flag("verbose"));

    let port = matches.get_one::<String>("port").expect("required argument");
    let rbid = matches.get_one::<String>("rbid").expect("required argument");
    let rbpassword = matches.get_one::<String>("rbpassword").expect("required argument");
    let epan_file = matches.get_one::<String>("epan-file").expect("defaulted argument");

    match run(port, rbid, rbpassword, Path::new(epan_file), &log).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(log, "daemon failed"; "error" => %err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(if verbose { Severity::Debug } else { Severity::Info });
    builder.destination(Destination::Stderr);
    builder.build().expect("logger construction failed")
}

async fn run(
    port: &str,
    rbid: &str,
    rbpassword: &str,
    epan_file: &Path,
    log: &Logger,
) -> Result<(), Box<dyn Error>> {
    let (reader, writer) = serial::open(port)?;
    let mut adapter = RadioAdapter::start(reader, writer, log);

    adapter.init(rbid, rbpassword).await?;

    let epan = load_or_scan(&mut adapter, epan_file, log).await?;
    let address = adapter.join(&epan).await?;

    let (cmd, events) = adapter.into_parts();
    let mut transport = Transport::start(
        bridge::MeterUplink::new(cmd, address),
        bridge::MeterDownlink::new(events),
        TransportConfig::new(skstack::UDP_PAYLOAD_LIMIT),
        log,
    );

    poll_meter(&mut transport, log).await
}

/// Reuse the cached beacon descriptor when one is on disk; scan and cache
/// otherwise.
async fn load_or_scan<W: SerialWrite>(
    adapter: &mut RadioAdapter<W>,
    epan_file: &Path,
    log: &Logger,
) -> Result<Epan, Box<dyn Error>> {
    if epan_file.exists() {
        match Epan::load(epan_file) {
            Ok(epan) if epan.is_complete() => {
                info!(log, "using cached pan descriptor"; "file" => %epan_file.display());
                return Ok(epan);
            }
            Ok(_) => warn!(log, "cached pan descriptor incomplete, rescanning"),
            Err(err) => {
                warn!(log, "cached pan descriptor unreadable, rescanning"; "error" => %err)
            }
        }
    }

    let epan = adapter
        .scan(SCAN_DURATION)
        .await?
        .ok_or("no pan descriptor found; is the meter in range?")?;

    if let Err(err) = epan.save(epan_file) {
        warn!(log, "failed to cache pan descriptor"; "error" => %err);
    }

    Ok(epan)
}

/// Wait for the meter's instance list, then keep requesting instantaneous
/// power and current, re-issuing the request after every answer.
async fn poll_meter(transport: &mut Transport, log: &Logger) -> Result<(), Box<dyn Error>> {
    let controller = EnetObject::new(DeviceClass::Controller, 0x01);

    info!(log, "waiting for the meter's instance list");
    let meter = loop {
        let response = transport.recv().await.ok_or("transport closed")?;
        let object = response.properties.iter().find_map(|property| match property {
            Property::InstanceList(list) => list.objects.first().copied(),
            _ => None,
        });
        if let Some(object) = object {
            break object;
        }
    };
    info!(log, "meter discovered"; "object" => ?meter);

    let request = EchonetRequest::new(
        controller,
        meter,
        EnetService::Get,
        vec![
            Property::MomentPower(MomentPower::default()),
            Property::MomentCurrent(MomentCurrent::default()),
        ],
    );

    transport.send(request.clone())?;

    while let Some(response) = transport.recv().await {
        let mut answered = false;

        for property in &response.properties {
            match property {
                Property::MomentPower(power) => {
                    info!(log, "instantaneous power"; "watts" => ?power.value);
                    answered = true;
                }
                Property::MomentCurrent(current) => {
                    info!(log, "instantaneous current";
                          "r_phase" => ?current.r_phase,
                          "t_phase" => ?current.t_phase);
                    answered = true;
                }
                other => debug!(log, "property"; "value" => ?other),
            }
        }

        if answered {
            transport.send(request.clone())?;
        }
    }

    Err("transport closed".into())
}
