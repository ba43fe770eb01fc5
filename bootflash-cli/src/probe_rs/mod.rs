use clap::ValueEnum;
use colored::Colorize;
use probe_rs::{
    Permissions, Session,
    config::TargetSelector,
    probe::{DebugProbeInfo, Probe, WireProtocol, list::Lister},
};

use crate::error::Result;

mod flash_progress;
pub mod flashing;
pub mod probe_selector;

use probe_selector::{ProbeIdentity, ProbeSelector, choose_probe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    Swd,
    Jtag,
}

impl From<Protocol> for WireProtocol {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Swd => WireProtocol::Swd,
            Protocol::Jtag => WireProtocol::Jtag,
        }
    }
}

/// How to reach the target
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub probe: Option<ProbeSelector>,
    /// Target name, auto-detected when not given
    pub chip: Option<String>,
    pub protocol: Option<Protocol>,
    pub speed_khz: Option<u32>,
    pub connect_under_reset: bool,
}

pub fn list_probes() -> Vec<DebugProbeInfo> {
    Lister::new().list_all()
}

/// Print all attached probes, each followed by the `--probe` value that selects it.
pub fn print_probe_list() {
    let probes = list_probes();
    if probes.is_empty() {
        println!("{}", "No debug probes found.".yellow());
        return;
    }

    println!("{}", "Attached debug probes:".bold());
    for (index, probe) in probes.iter().enumerate() {
        println!(
            "  [{index}] {}  {} {}",
            probe.label(),
            "--probe".dimmed(),
            probe.selector()
        );
    }
}

/// Opens the probe chosen by `selector`, or the only attached probe.
pub fn connect_to_probe(selector: Option<&ProbeSelector>) -> Result<Probe> {
    let probes = list_probes();
    let info = choose_probe(&probes, selector)?;
    tracing::info!("Using probe {}", info.label());

    Ok(info.open()?)
}

/// Configure the probe and attach to the target.
pub fn attach(mut probe: Probe, options: &ConnectOptions) -> Result<Session> {
    if let Some(protocol) = options.protocol {
        probe.select_protocol(protocol.into())?;
    }

    if let Some(speed) = options.speed_khz {
        let actual = probe.set_speed(speed)?;
        tracing::debug!("Probe speed set to {actual} kHz (requested {speed} kHz)");
    }

    let target = match &options.chip {
        Some(chip) => TargetSelector::Unspecified(chip.clone()),
        None => TargetSelector::Auto,
    };

    let session = if options.connect_under_reset {
        probe.attach_under_reset(target, Permissions::default())?
    } else {
        probe.attach(target, Permissions::default())?
    };
    tracing::info!("Attached to {}", session.target().name);

    Ok(session)
}
