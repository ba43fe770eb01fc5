use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("probe-rs error: {0}")]
    ProbeRs(#[from] probe_rs::Error),

    #[error("debug probe error: {0}")]
    DebugProbe(#[from] probe_rs::probe::DebugProbeError),

    #[error("flashing failed: {0}")]
    Download(#[from] probe_rs::flashing::FileDownloadError),

    #[error("Intel HEX parse error: {0}")]
    IntelHex(#[from] ihex::ReaderError),

    #[error("ELF parse error: {0}")]
    Elf(#[from] object::Error),

    #[error("firmware image {0:?} is empty")]
    ImageEmpty(PathBuf),

    #[error("invalid firmware image: {0}")]
    InvalidImage(String),

    #[error("no debug probe found")]
    NoProbeFound,

    #[error("no attached probe matches {0}")]
    ProbeNotFound(String),

    #[error("multiple probes attached, choose one with --probe: {}", .0.join(", "))]
    AmbiguousProbe(Vec<String>),

    #[error("invalid probe selector {0:?}, expected VID:PID[:SERIAL]")]
    InvalidSelector(String),

    #[error("target has no non-volatile boot memory")]
    NoBootMemory,

    #[error(
        "image of {size} bytes at {base:#010X} does not fit in {region} ({start:#010X}..{end:#010X})"
    )]
    ImageTooLarge {
        region: String,
        base: u64,
        size: u64,
        start: u64,
        end: u64,
    },

    #[error("base address {base:#010X} is outside {region} ({start:#010X}..{end:#010X})")]
    BaseOutsideRegion {
        region: String,
        base: u64,
        start: u64,
        end: u64,
    },

    #[error("interrupted before {0}")]
    Interrupted(&'static str),
}

impl Error {
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }
}
