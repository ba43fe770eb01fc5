use std::time::Duration;

use probe_rs::{
    Session,
    config::MemoryRegion,
    flashing::{self, BinOptions, DownloadOptions, ElfOptions, Format},
};

use crate::{
    boot_memory::{MemoryRegionInfo, RegionKind},
    error::Result,
    firmware_image::{FirmwareImage, ImageFormat},
    flash_and_reset::{FlashTarget, ProgramOptions, ResetMode},
    probe_rs::flash_progress::FlashProgressBars,
};

fn define_download_options<'a>(options: &ProgramOptions, show_progress: bool) -> DownloadOptions<'a> {
    let mut download_options = DownloadOptions::default();
    download_options.verify = options.verify;
    download_options.do_chip_erase = options.chip_erase;
    download_options.dry_run = options.dry_run;
    download_options.progress = FlashProgressBars::new(show_progress).into_flash_progress();

    download_options
}

fn download_format(image: &FirmwareImage, base_address: Option<u64>) -> Format {
    match image.format {
        ImageFormat::Bin => Format::Bin(BinOptions {
            base_address,
            skip: 0,
        }),
        ImageFormat::Hex => Format::Hex,
        ImageFormat::Elf => Format::Elf(ElfOptions::default()),
    }
}

fn region_info(region: &MemoryRegion) -> MemoryRegionInfo {
    match region {
        MemoryRegion::Nvm(nvm) => MemoryRegionInfo {
            name: nvm.name.clone().unwrap_or_else(|| "NVM".to_string()),
            range: nvm.range.clone(),
            kind: RegionKind::Nvm,
            is_boot: nvm.access.as_ref().is_some_and(|access| access.boot),
            is_alias: nvm.is_alias,
        },
        MemoryRegion::Ram(ram) => MemoryRegionInfo {
            name: ram.name.clone().unwrap_or_else(|| "RAM".to_string()),
            range: ram.range.clone(),
            kind: RegionKind::Ram,
            is_boot: false,
            is_alias: false,
        },
        other => MemoryRegionInfo {
            name: "Generic".to_string(),
            range: other.address_range(),
            kind: RegionKind::Generic,
            is_boot: false,
            is_alias: false,
        },
    }
}

/// A target attached through probe-rs. Dropping it releases the probe.
pub struct ProbeRsTarget {
    session: Session,
    show_progress: bool,
}

impl ProbeRsTarget {
    pub fn new(session: Session, show_progress: bool) -> Self {
        Self {
            session,
            show_progress,
        }
    }
}

impl FlashTarget for ProbeRsTarget {
    fn name(&self) -> String {
        self.session.target().name.clone()
    }

    fn memory_regions(&self) -> Vec<MemoryRegionInfo> {
        self.session
            .target()
            .memory_map
            .iter()
            .map(region_info)
            .collect()
    }

    fn program(
        &mut self,
        image: &FirmwareImage,
        base_address: Option<u64>,
        options: &ProgramOptions,
    ) -> Result<()> {
        flashing::download_file_with_options(
            &mut self.session,
            &image.path,
            download_format(image, base_address),
            define_download_options(options, self.show_progress),
        )?;

        Ok(())
    }

    fn reset(&mut self, mode: ResetMode) -> Result<()> {
        let mut core = self.session.core(0)?;
        match mode {
            ResetMode::Run => core.reset()?,
            ResetMode::Halt => {
                core.reset_and_halt(Duration::from_millis(100))?;
            }
            ResetMode::None => {}
        }

        Ok(())
    }
}
