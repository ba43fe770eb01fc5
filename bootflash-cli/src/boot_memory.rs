use std::ops::Range;

use crate::{
    error::{Error, Result},
    firmware_image::{FirmwareImage, ImageFormat},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Nvm,
    Ram,
    Generic,
}

/// Target memory region, independent of the debug probe library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegionInfo {
    pub name: String,
    pub range: Range<u64>,
    pub kind: RegionKind,
    pub is_boot: bool,
    pub is_alias: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRegion {
    pub name: String,
    pub range: Range<u64>,
}

impl BootRegion {
    pub fn start(&self) -> u64 {
        self.range.start
    }

    pub fn contains(&self, address: u64) -> bool {
        self.range.contains(&address)
    }
}

/// Pick the flash region the target boots from.
///
/// Prefers a non-alias NVM region flagged as boot memory and otherwise falls back
/// to the first non-alias NVM region.
pub fn select_boot_region(regions: &[MemoryRegionInfo]) -> Result<BootRegion> {
    let mut nvm_regions = regions
        .iter()
        .filter(|region| region.kind == RegionKind::Nvm && !region.is_alias);

    let region = nvm_regions
        .clone()
        .find(|region| region.is_boot)
        .or_else(|| nvm_regions.next())
        .ok_or(Error::NoBootMemory)?;

    Ok(BootRegion {
        name: region.name.clone(),
        range: region.range.clone(),
    })
}

/// Address a raw binary is written to. Formats with embedded addresses return `None`.
pub fn resolve_base_address(
    image: &FirmwareImage,
    region: &BootRegion,
    base_override: Option<u64>,
) -> Option<u64> {
    match image.format {
        ImageFormat::Bin => Some(base_override.unwrap_or(region.start())),
        ImageFormat::Hex | ImageFormat::Elf => {
            if let Some(base) = base_override {
                tracing::warn!(
                    "Ignoring base address {:#010X}: {} images carry their own addresses",
                    base,
                    image.format
                );
            }
            None
        }
    }
}

/// Ensure a raw binary fits the boot region. ELF segments outside it are only reported.
pub fn check_image_fits(image: &FirmwareImage, region: &BootRegion, base: Option<u64>) -> Result<()> {
    if let Some(base) = base {
        if !region.contains(base) {
            return Err(Error::BaseOutsideRegion {
                region: region.name.clone(),
                base,
                start: region.range.start,
                end: region.range.end,
            });
        }

        let end = base.saturating_add(image.size);
        if end > region.range.end {
            return Err(Error::ImageTooLarge {
                region: region.name.clone(),
                base,
                size: image.size,
                start: region.range.start,
                end: region.range.end,
            });
        }
    }

    if let Some(elf) = &image.elf {
        for segment in &elf.segments {
            if segment.start < region.range.start || segment.end > region.range.end {
                tracing::warn!(
                    "Segment {:#010X}..{:#010X} lies outside boot memory {}",
                    segment.start,
                    segment.end,
                    region.name
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware_image::ElfSummary;
    use std::path::PathBuf;

    fn region(name: &str, range: Range<u64>, kind: RegionKind, is_boot: bool) -> MemoryRegionInfo {
        MemoryRegionInfo {
            name: name.to_string(),
            range,
            kind,
            is_boot,
            is_alias: false,
        }
    }

    fn image(format: ImageFormat, size: u64) -> FirmwareImage {
        FirmwareImage {
            path: PathBuf::from("fw"),
            format,
            size,
            elf: None,
            hex_data_bytes: None,
        }
    }

    fn flash() -> BootRegion {
        BootRegion {
            name: "FLASH".to_string(),
            range: 0x0800_0000..0x0801_0000,
        }
    }

    #[test]
    fn test_boot_flag_wins() {
        let regions = vec![
            region("RAM", 0x2000_0000..0x2000_8000, RegionKind::Ram, true),
            region("DATA", 0x0808_0000..0x0809_0000, RegionKind::Nvm, false),
            region("FLASH", 0x0800_0000..0x0808_0000, RegionKind::Nvm, true),
        ];

        let boot = select_boot_region(&regions).unwrap();
        assert_eq!(boot.name, "FLASH");
        assert_eq!(boot.start(), 0x0800_0000);
    }

    #[test]
    fn test_falls_back_to_first_nvm() {
        let regions = vec![
            region("RAM", 0x2000_0000..0x2000_8000, RegionKind::Ram, false),
            region("BANK1", 0x0000_0000..0x0004_0000, RegionKind::Nvm, false),
            region("BANK2", 0x0004_0000..0x0008_0000, RegionKind::Nvm, false),
        ];

        assert_eq!(select_boot_region(&regions).unwrap().name, "BANK1");
    }

    #[test]
    fn test_alias_regions_are_skipped() {
        let mut alias = region("ALIAS", 0x0000_0000..0x0008_0000, RegionKind::Nvm, true);
        alias.is_alias = true;
        let regions = vec![
            alias,
            region("FLASH", 0x0800_0000..0x0808_0000, RegionKind::Nvm, false),
        ];

        assert_eq!(select_boot_region(&regions).unwrap().name, "FLASH");
    }

    #[test]
    fn test_no_nvm_fails() {
        let regions = vec![region("RAM", 0x2000_0000..0x2000_8000, RegionKind::Ram, true)];
        assert!(matches!(
            select_boot_region(&regions),
            Err(Error::NoBootMemory)
        ));
    }

    #[test]
    fn test_bin_base_defaults_to_region_start() {
        let base = resolve_base_address(&image(ImageFormat::Bin, 16), &flash(), None);
        assert_eq!(base, Some(0x0800_0000));

        let base = resolve_base_address(&image(ImageFormat::Bin, 16), &flash(), Some(0x0800_4000));
        assert_eq!(base, Some(0x0800_4000));
    }

    #[test]
    fn test_addressed_formats_ignore_base() {
        let hex = image(ImageFormat::Hex, 16);
        assert_eq!(resolve_base_address(&hex, &flash(), Some(0x0800_4000)), None);
    }

    #[test]
    fn test_bin_fits_exactly() {
        let bin = image(ImageFormat::Bin, 0x1_0000);
        assert!(check_image_fits(&bin, &flash(), Some(0x0800_0000)).is_ok());
    }

    #[test]
    fn test_bin_too_large() {
        let bin = image(ImageFormat::Bin, 0x1_0001);
        assert!(matches!(
            check_image_fits(&bin, &flash(), Some(0x0800_0000)),
            Err(Error::ImageTooLarge { size: 0x1_0001, .. })
        ));
    }

    #[test]
    fn test_base_outside_region() {
        let bin = image(ImageFormat::Bin, 4);
        assert!(matches!(
            check_image_fits(&bin, &flash(), Some(0x2000_0000)),
            Err(Error::BaseOutsideRegion { .. })
        ));
    }

    #[test]
    fn test_elf_outside_region_only_warns() {
        let mut elf = image(ImageFormat::Elf, 4096);
        elf.elf = Some(ElfSummary {
            entry: 0x0800_0101,
            segments: vec![0x0800_0000..0x0800_0400, 0x1FFF_0000..0x1FFF_0010],
        });

        assert!(check_image_fits(&elf, &flash(), None).is_ok());
    }
}
