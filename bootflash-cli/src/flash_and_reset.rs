use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use clap::ValueEnum;

use crate::{
    boot_memory::{
        BootRegion, MemoryRegionInfo, check_image_fits, resolve_base_address, select_boot_region,
    },
    error::{Error, Result},
    firmware_image::FirmwareImage,
};

/// What happens to the target once the image is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResetMode {
    /// Reset and let the core execute the new image
    #[default]
    Run,
    /// Reset and halt at the reset vector
    Halt,
    /// Leave the target untouched
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramOptions {
    pub verify: bool,
    pub chip_erase: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashPlan {
    /// Overrides the boot region start for raw binaries
    pub base_address: Option<u64>,
    pub program: ProgramOptions,
    pub reset: ResetMode,
}

/// A programmable target (e.g., a probe-rs session)
pub trait FlashTarget {
    fn name(&self) -> String;
    fn memory_regions(&self) -> Vec<MemoryRegionInfo>;
    fn program(
        &mut self,
        image: &FirmwareImage,
        base_address: Option<u64>,
        options: &ProgramOptions,
    ) -> Result<()>;
    fn reset(&mut self, mode: ResetMode) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FlashReport {
    pub target: String,
    pub region: BootRegion,
    pub base_address: Option<u64>,
    pub bytes: u64,
    pub dry_run: bool,
    pub reset: Option<ResetMode>,
    pub elapsed: Duration,
}

impl Display for FlashReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = if self.dry_run { "Dry run of" } else { "Flashed" };
        write!(f, "{verb} {} bytes to {} [{}", self.bytes, self.target, self.region.name)?;
        if let Some(base) = self.base_address {
            write!(f, " @ {base:#010X}")?;
        }
        write!(f, "] in {:.2}s", self.elapsed.as_secs_f64())?;

        match self.reset {
            Some(ResetMode::Run) => write!(f, ", target running"),
            Some(ResetMode::Halt) => write!(f, ", target halted"),
            Some(ResetMode::None) | None => write!(f, ", target not reset"),
        }
    }
}

fn check_abort(abort_flag: &AtomicBool, next_stage: &'static str) -> Result<()> {
    if abort_flag.load(Ordering::SeqCst) {
        return Err(Error::Interrupted(next_stage));
    }
    Ok(())
}

/// Locate the boot memory, program the image into it and reset the target.
///
/// The abort flag is checked before each stage; a running stage always completes.
pub fn flash_and_reset(
    target: &mut dyn FlashTarget,
    image: &FirmwareImage,
    plan: &FlashPlan,
    abort_flag: &AtomicBool,
) -> Result<FlashReport> {
    let started = Instant::now();

    let region = select_boot_region(&target.memory_regions())?;
    tracing::info!(
        "Boot memory: {} ({:#010X}..{:#010X})",
        region.name,
        region.range.start,
        region.range.end
    );

    let base_address = resolve_base_address(image, &region, plan.base_address);
    check_image_fits(image, &region, base_address)?;

    check_abort(abort_flag, "programming")?;
    tracing::info!("Programming {:?} ({})", image.path, image.format);
    target.program(image, base_address, &plan.program)?;

    let reset = if plan.program.dry_run || plan.reset == ResetMode::None {
        None
    } else {
        check_abort(abort_flag, "reset")?;
        tracing::info!("Resetting target ({:?})", plan.reset);
        target.reset(plan.reset)?;
        Some(plan.reset)
    };

    Ok(FlashReport {
        target: target.name(),
        region,
        base_address,
        bytes: image.payload_size(),
        dry_run: plan.program.dry_run,
        reset,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{boot_memory::RegionKind, firmware_image::ImageFormat};
    use std::path::PathBuf;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Program(Option<u64>, ProgramOptions),
        Reset(ResetMode),
    }

    /// Records every call; sets the abort flag after programming when asked to
    struct FakeTarget<'a> {
        regions: Vec<MemoryRegionInfo>,
        calls: Vec<Call>,
        abort_after_program: Option<&'a AtomicBool>,
    }

    impl<'a> FakeTarget<'a> {
        fn new() -> Self {
            Self {
                regions: vec![
                    MemoryRegionInfo {
                        name: "SRAM".to_string(),
                        range: 0x2000_0000..0x2000_4000,
                        kind: RegionKind::Ram,
                        is_boot: false,
                        is_alias: false,
                    },
                    MemoryRegionInfo {
                        name: "FLASH".to_string(),
                        range: 0x0800_0000..0x0802_0000,
                        kind: RegionKind::Nvm,
                        is_boot: true,
                        is_alias: false,
                    },
                ],
                calls: Vec::new(),
                abort_after_program: None,
            }
        }
    }

    impl FlashTarget for FakeTarget<'_> {
        fn name(&self) -> String {
            "fake".to_string()
        }

        fn memory_regions(&self) -> Vec<MemoryRegionInfo> {
            self.regions.clone()
        }

        fn program(
            &mut self,
            _image: &FirmwareImage,
            base_address: Option<u64>,
            options: &ProgramOptions,
        ) -> Result<()> {
            self.calls.push(Call::Program(base_address, options.clone()));
            if let Some(flag) = self.abort_after_program {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn reset(&mut self, mode: ResetMode) -> Result<()> {
            self.calls.push(Call::Reset(mode));
            Ok(())
        }
    }

    fn bin_image(size: u64) -> FirmwareImage {
        FirmwareImage {
            path: PathBuf::from("firmware.bin"),
            format: ImageFormat::Bin,
            size,
            elf: None,
            hex_data_bytes: None,
        }
    }

    #[test]
    fn test_programs_boot_memory_then_resets() {
        let mut target = FakeTarget::new();
        let abort = AtomicBool::new(false);

        let report =
            flash_and_reset(&mut target, &bin_image(1024), &FlashPlan::default(), &abort).unwrap();

        assert_eq!(
            target.calls,
            vec![
                Call::Program(Some(0x0800_0000), ProgramOptions::default()),
                Call::Reset(ResetMode::Run)
            ]
        );
        assert_eq!(report.region.name, "FLASH");
        assert_eq!(report.bytes, 1024);
        assert_eq!(report.reset, Some(ResetMode::Run));
    }

    #[test]
    fn test_dry_run_skips_reset() {
        let mut target = FakeTarget::new();
        let plan = FlashPlan {
            program: ProgramOptions {
                dry_run: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let report =
            flash_and_reset(&mut target, &bin_image(16), &plan, &AtomicBool::new(false)).unwrap();

        assert_eq!(target.calls.len(), 1);
        assert!(report.dry_run);
        assert_eq!(report.reset, None);
    }

    #[test]
    fn test_reset_none_leaves_target() {
        let mut target = FakeTarget::new();
        let plan = FlashPlan {
            reset: ResetMode::None,
            ..Default::default()
        };

        flash_and_reset(&mut target, &bin_image(16), &plan, &AtomicBool::new(false)).unwrap();
        assert!(!target.calls.iter().any(|c| matches!(c, Call::Reset(_))));
    }

    #[test]
    fn test_halt_mode_is_forwarded() {
        let mut target = FakeTarget::new();
        let plan = FlashPlan {
            reset: ResetMode::Halt,
            base_address: Some(0x0801_0000),
            ..Default::default()
        };

        flash_and_reset(&mut target, &bin_image(16), &plan, &AtomicBool::new(false)).unwrap();
        assert_eq!(
            target.calls,
            vec![
                Call::Program(Some(0x0801_0000), ProgramOptions::default()),
                Call::Reset(ResetMode::Halt)
            ]
        );
    }

    #[test]
    fn test_abort_before_programming() {
        let mut target = FakeTarget::new();
        let abort = AtomicBool::new(true);

        let result = flash_and_reset(&mut target, &bin_image(16), &FlashPlan::default(), &abort);

        assert!(matches!(result, Err(Error::Interrupted("programming"))));
        assert!(target.calls.is_empty());
    }

    #[test]
    fn test_abort_during_programming_skips_reset() {
        let abort = AtomicBool::new(false);
        let mut target = FakeTarget::new();
        target.abort_after_program = Some(&abort);

        let result = flash_and_reset(&mut target, &bin_image(16), &FlashPlan::default(), &abort);

        assert!(matches!(result, Err(Error::Interrupted("reset"))));
        assert_eq!(target.calls.len(), 1);
    }

    #[test]
    fn test_oversized_image_is_not_programmed() {
        let mut target = FakeTarget::new();
        let result = flash_and_reset(
            &mut target,
            &bin_image(0x2_0001),
            &FlashPlan::default(),
            &AtomicBool::new(false),
        );

        assert!(matches!(result, Err(Error::ImageTooLarge { .. })));
        assert!(target.calls.is_empty());
    }

    #[test]
    fn test_report_display() {
        let report = FlashReport {
            target: "stm32f401re".to_string(),
            region: BootRegion {
                name: "FLASH".to_string(),
                range: 0x0800_0000..0x0808_0000,
            },
            base_address: Some(0x0800_0000),
            bytes: 2048,
            dry_run: false,
            reset: Some(ResetMode::Run),
            elapsed: Duration::from_millis(1500),
        };

        assert_eq!(
            report.to_string(),
            "Flashed 2048 bytes to stm32f401re [FLASH @ 0x08000000] in 1.50s, target running"
        );
    }
}
