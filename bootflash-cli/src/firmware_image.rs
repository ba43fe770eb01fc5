use std::{
    fmt::Display,
    ops::Range,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use object::{
    Endianness, FileKind, Object, elf,
    read::elf::{ElfFile, ElfFile32, ElfFile64, FileHeader, ProgramHeader},
};

use crate::error::{Error, Result};

const ELF_MAGIC: &[u8] = b"\x7fELF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageFormat {
    /// Raw binary, placed at the boot memory start (or --base-address)
    Bin,
    /// Intel HEX, carries its own addresses
    Hex,
    /// ELF executable, loadable segments carry their own addresses
    Elf,
}

impl ImageFormat {
    /// Detect the image format from the file extension, falling back to the file content.
    pub fn detect(path: &Path, bytes: &[u8]) -> ImageFormat {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("bin") => ImageFormat::Bin,
            Some("hex") | Some("ihex") => ImageFormat::Hex,
            Some("elf") | Some("axf") | Some("out") => ImageFormat::Elf,
            _ => Self::detect_from_content(bytes),
        }
    }

    fn detect_from_content(bytes: &[u8]) -> ImageFormat {
        if bytes.starts_with(ELF_MAGIC) {
            ImageFormat::Elf
        } else if looks_like_intel_hex(bytes) {
            ImageFormat::Hex
        } else {
            ImageFormat::Bin
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::Bin => "bin",
            ImageFormat::Hex => "hex",
            ImageFormat::Elf => "elf",
        };
        write!(f, "{name}")
    }
}

/// Every non-empty line must be a `:`-prefixed record of hex digits
fn looks_like_intel_hex(bytes: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return false;
    };

    let mut records = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let Some(first) = records.next() else {
        return false;
    };

    std::iter::once(first).chain(records).all(|line| {
        line.len() > 1
            && line.starts_with(':')
            && line[1..].chars().all(|c| c.is_ascii_hexdigit())
    })
}

/// Loadable data of an ELF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSummary {
    pub entry: u64,
    /// Physical (load) address ranges, where the data is programmed
    pub segments: Vec<Range<u64>>,
}

impl ElfSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let summary = match FileKind::parse(bytes)? {
            FileKind::Elf32 => Self::from_elf(ElfFile32::<Endianness>::parse(bytes)?)?,
            FileKind::Elf64 => Self::from_elf(ElfFile64::<Endianness>::parse(bytes)?)?,
            other => {
                return Err(Error::invalid_image(format!(
                    "expected an ELF file, found {other:?}"
                )));
            }
        };

        if summary.segments.is_empty() {
            return Err(Error::invalid_image("ELF file has no loadable segments"));
        }

        Ok(summary)
    }

    fn from_elf<Elf: FileHeader>(file: ElfFile<'_, Elf>) -> Result<Self> {
        let endian = file.endian();
        let mut segments = Vec::new();

        for header in file.elf_program_headers() {
            let size: u64 = header.p_filesz(endian).into();
            if header.p_type(endian) != elf::PT_LOAD || size == 0 {
                continue;
            }

            let start: u64 = header.p_paddr(endian).into();
            let end = start.checked_add(size).ok_or_else(|| {
                Error::invalid_image(format!(
                    "segment at {start:#X} with {size} bytes overflows the address space"
                ))
            })?;
            segments.push(start..end);
        }

        Ok(Self {
            entry: file.entry(),
            segments,
        })
    }

    pub fn loadable_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.end - s.start).sum()
    }
}

/// Sum of the data record lengths of an Intel HEX file
fn hex_data_bytes(bytes: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::invalid_image("Intel HEX file is not valid text"))?;

    let mut total = 0u64;
    for record in ihex::Reader::new(text) {
        if let ihex::Record::Data { value, .. } = record? {
            total += value.len() as u64;
        }
    }

    Ok(total)
}

#[derive(Debug, Clone)]
pub struct FirmwareImage {
    pub path: PathBuf,
    pub format: ImageFormat,
    /// File size on disk
    pub size: u64,
    pub elf: Option<ElfSummary>,
    pub hex_data_bytes: Option<u64>,
}

impl FirmwareImage {
    /// Read the image, detecting its format unless `format_override` is given.
    pub fn load(path: &Path, format_override: Option<ImageFormat>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(Error::ImageEmpty(path.to_path_buf()));
        }

        let format = format_override.unwrap_or_else(|| ImageFormat::detect(path, &bytes));
        let (elf, hex_data_bytes) = match format {
            ImageFormat::Elf => (Some(ElfSummary::parse(&bytes)?), None),
            ImageFormat::Hex => (None, Some(hex_data_bytes(&bytes)?)),
            ImageFormat::Bin => (None, None),
        };

        tracing::debug!("Loaded {:?} as {} ({} bytes)", path, format, bytes.len());

        Ok(Self {
            path: path.to_path_buf(),
            format,
            size: bytes.len() as u64,
            elf,
            hex_data_bytes,
        })
    }

    /// Bytes that end up in target memory
    pub fn payload_size(&self) -> u64 {
        match (&self.elf, self.hex_data_bytes) {
            (Some(elf), _) => elf.loadable_bytes(),
            (None, Some(data_bytes)) => data_bytes,
            (None, None) => self.size,
        }
    }
}
