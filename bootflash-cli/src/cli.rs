use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::{
    error::Result,
    firmware_image::ImageFormat,
    flash_and_reset::{FlashPlan, ProgramOptions, ResetMode},
    probe_rs::{ConnectOptions, Protocol, probe_selector::ProbeSelector},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandLineArgs {
    /// Firmware image to flash (bin, hex or elf)
    #[clap(required_unless_present = "list_probes")]
    pub image: Option<PathBuf>,

    /// Target chip name, auto-detected if omitted
    #[clap(long, env = "BOOTFLASH_CHIP")]
    pub chip: Option<String>,

    /// Debug probe to use as VID:PID[:SERIAL]
    #[clap(long, env = "BOOTFLASH_PROBE")]
    pub probe: Option<String>,

    /// Wire protocol between probe and target
    #[clap(long, value_enum, env = "BOOTFLASH_PROTOCOL")]
    pub protocol: Option<Protocol>,

    /// Probe speed in kHz
    #[clap(long, env = "BOOTFLASH_SPEED")]
    pub speed: Option<u32>,

    /// Hold the target in reset while attaching
    #[clap(long, action)]
    pub connect_under_reset: bool,

    /// Image format, detected from extension and content if omitted
    #[clap(long, value_enum)]
    pub format: Option<ImageFormat>,

    /// Load address for raw binaries (defaults to the boot memory start)
    #[clap(long, value_parser = parse_address)]
    pub base_address: Option<u64>,

    /// Read back and compare after programming
    #[clap(long, action)]
    pub verify: bool,

    /// Erase the whole chip instead of only the written sectors
    #[clap(long, action)]
    pub chip_erase: bool,

    /// Run every step except the flash writes
    #[clap(long, action)]
    pub dry_run: bool,

    /// What to do with the target after flashing
    #[clap(long, value_enum, default_value = "run")]
    pub reset: ResetMode,

    /// List attached debug probes and exit
    #[clap(long, action)]
    pub list_probes: bool,

    /// More log output (-v debug, -vv trace)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors, hide progress bars
    #[clap(short, long, action, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl CommandLineArgs {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn connect_options(&self) -> Result<ConnectOptions> {
        let probe = self.probe.as_deref().map(str::parse::<ProbeSelector>).transpose()?;

        Ok(ConnectOptions {
            probe,
            chip: self.chip.clone(),
            protocol: self.protocol,
            speed_khz: self.speed,
            connect_under_reset: self.connect_under_reset,
        })
    }

    pub fn flash_plan(&self) -> FlashPlan {
        FlashPlan {
            base_address: self.base_address,
            program: ProgramOptions {
                verify: self.verify,
                chip_erase: self.chip_erase,
                dry_run: self.dry_run,
            },
            reset: self.reset,
        }
    }
}

/// Parse a hex (`0x` prefixed) or decimal address
fn parse_address(value: &str) -> std::result::Result<u64, String> {
    let value = value.trim().replace('_', "");
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };

    parsed.map_err(|e| format!("invalid address {value:?}: {e}"))
}
