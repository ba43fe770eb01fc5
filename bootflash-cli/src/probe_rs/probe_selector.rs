use std::{fmt::Display, str::FromStr};

use probe_rs::probe::DebugProbeInfo;

use crate::error::{Error, Result};

/// Identity of an attached probe as reported by USB enumeration
pub trait ProbeIdentity {
    fn label(&self) -> String;
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn serial_number(&self) -> Option<&str>;

    /// The `--probe` value that picks exactly this probe
    fn selector(&self) -> ProbeSelector {
        ProbeSelector {
            vendor_id: self.vendor_id(),
            product_id: self.product_id(),
            serial_number: self.serial_number().map(str::to_string),
        }
    }
}

impl ProbeIdentity for DebugProbeInfo {
    fn label(&self) -> String {
        format!(
            "{} ({:04x}:{:04x}{})",
            self.identifier,
            self.vendor_id,
            self.product_id,
            self.serial_number
                .as_deref()
                .map(|sn| format!(":{sn}"))
                .unwrap_or_default()
        )
    }

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }
}

/// `VID:PID[:SERIAL]` with hexadecimal ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSelector {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
}

impl ProbeSelector {
    pub fn matches(&self, probe: &impl ProbeIdentity) -> bool {
        self.vendor_id == probe.vendor_id()
            && self.product_id == probe.product_id()
            && match &self.serial_number {
                Some(serial) => probe.serial_number() == Some(serial.as_str()),
                None => true,
            }
    }
}

fn parse_hex_id(value: &str) -> Option<u16> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16).ok()
}

impl FromStr for ProbeSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSelector(s.to_string());

        // Serial numbers may contain ':' themselves
        let mut parts = s.splitn(3, ':');
        let vendor_id = parts.next().and_then(parse_hex_id).ok_or_else(invalid)?;
        let product_id = parts.next().and_then(parse_hex_id).ok_or_else(invalid)?;
        let serial_number = match parts.next() {
            Some("") => return Err(invalid()),
            Some(serial) => Some(serial.to_string()),
            None => None,
        };

        Ok(Self {
            vendor_id,
            product_id,
            serial_number,
        })
    }
}

impl Display for ProbeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let Some(serial) = &self.serial_number {
            write!(f, ":{serial}")?;
        }
        Ok(())
    }
}

/// Pick the probe to use from the attached ones.
pub fn choose_probe<'a, P: ProbeIdentity>(
    probes: &'a [P],
    selector: Option<&ProbeSelector>,
) -> Result<&'a P> {
    if probes.is_empty() {
        return Err(Error::NoProbeFound);
    }

    match selector {
        Some(selector) => probes
            .iter()
            .find(|probe| selector.matches(*probe))
            .ok_or_else(|| Error::ProbeNotFound(selector.to_string())),
        None => match probes {
            [probe] => Ok(probe),
            _ => Err(Error::AmbiguousProbe(
                probes.iter().map(ProbeIdentity::label).collect(),
            )),
        },
    }
}
