//! Message codecs for the generic sorter command dialect.
//!
//! This crate pins down the line-oriented ASCII messages spoken by the
//! simulated sorter family (and by the integration tests). Each message type
//! is one explicit encode/decode pair; nothing here knows about transaction
//! state or retry policy.

use link::{Command, ParseError, Response};

/// Message terminator used by the sorter dialect.
pub const EOL: &str = "\r\n";

/// Interrupt bytes signalled by the sorter family.
pub mod srq {
    /// Devices are in place and ready for test.
    pub const DEVICE_READY: u8 = 0x41;
    /// Binning of the current devices finished.
    pub const BIN_DONE: u8 = 0x42;
    /// Equipment entered a jammed state.
    pub const JAM: u8 = 0x4a;
    /// A new lot was started at the equipment.
    pub const LOT_STARTED: u8 = 0x46;
    /// The current lot ran empty.
    pub const LOT_DONE: u8 = 0x47;
}

fn strip_eol(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b'\r' || bytes[end - 1] == b'\n') {
        end -= 1;
    }
    &bytes[..end]
}

/// `ID?`: asks the equipment for its identity string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdQuery;

impl Command for IdQuery {
    fn encode(&self) -> Vec<u8> {
        format!("ID?{EOL}").into_bytes()
    }
}

/// Identity answer, e.g. `ID GSORT-2000`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdReply {
    /// Equipment model/revision text.
    pub ident: String,
}

impl Response for IdReply {
    fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let line = strip_eol(bytes);
        let text = std::str::from_utf8(line).map_err(|_| ParseError::new("ID <ident>", bytes))?;
        match text.strip_prefix("ID ") {
            Some(rest) if !rest.is_empty() => Ok(Self {
                ident: rest.to_owned(),
            }),
            _ => Err(ParseError::new("ID <ident>", bytes)),
        }
    }
}

/// `FULLSITES?`: polls which sites hold a device ready for test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FullSitesQuery;

impl Command for FullSitesQuery {
    fn encode(&self) -> Vec<u8> {
        format!("FULLSITES?{EOL}").into_bytes()
    }
}

/// Populated-site answer, e.g. `FULLSITES 00000003`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FullSites {
    /// Bit N set means site N holds a device.
    pub mask: u32,
}

impl FullSites {
    /// Returns whether the given site index holds a device.
    pub fn is_full(&self, site: usize) -> bool {
        site < 32 && self.mask & (1 << site) != 0
    }
}

impl Response for FullSites {
    fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let line = strip_eol(bytes);
        let text = std::str::from_utf8(line)
            .map_err(|_| ParseError::new("FULLSITES <hex mask>", bytes))?;
        let rest = text
            .strip_prefix("FULLSITES ")
            .ok_or_else(|| ParseError::new("FULLSITES <hex mask>", bytes))?;
        let mask = u32::from_str_radix(rest.trim(), 16)
            .map_err(|_| ParseError::new("FULLSITES <hex mask>", bytes))?;
        Ok(Self { mask })
    }
}

/// `BINON ...`: routes the current devices to their destination bins.
///
/// One field per site, colon-separated site index and slot; sites without a
/// destination (slot −1) are sent as `-`, which the equipment treats as its
/// own default retest position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinOn {
    /// Destination slot per site, −1 meaning "equipment default".
    pub slots: Vec<i64>,
}

impl Command for BinOn {
    fn encode(&self) -> Vec<u8> {
        let mut out = String::from("BINON");
        for (site, slot) in self.slots.iter().enumerate() {
            if *slot < 0 {
                out.push_str(&format!(" {site}:-"));
            } else {
                out.push_str(&format!(" {site}:{slot}"));
            }
        }
        out.push_str(EOL);
        out.into_bytes()
    }
}

/// `BINRP ...`: combined reprobe/bin command.
///
/// Sites flagged for reprobe are sent as `R` and keep their device; all
/// others carry a destination slot as in [`BinOn`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinReprobe {
    /// Reprobe request per site.
    pub reprobe: Vec<bool>,
    /// Destination slot per non-reprobed site, −1 meaning "default".
    pub slots: Vec<i64>,
}

impl Command for BinReprobe {
    fn encode(&self) -> Vec<u8> {
        let mut out = String::from("BINRP");
        for site in 0..self.slots.len().max(self.reprobe.len()) {
            if self.reprobe.get(site).copied().unwrap_or(false) {
                out.push_str(&format!(" {site}:R"));
            } else {
                match self.slots.get(site).copied().unwrap_or(-1) {
                    slot if slot < 0 => out.push_str(&format!(" {site}:-")),
                    slot => out.push_str(&format!(" {site}:{slot}")),
                }
            }
        }
        out.push_str(EOL);
        out.into_bytes()
    }
}

/// `REPROBE`: asks the equipment to re-contact all current devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reprobe;

impl Command for Reprobe {
    fn encode(&self) -> Vec<u8> {
        format!("REPROBE{EOL}").into_bytes()
    }
}

/// Plain `OK` acknowledge line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack;

impl Response for Ack {
    fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if strip_eol(bytes) == b"OK" {
            Ok(Ack)
        } else {
            Err(ParseError::new("OK", bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round() {
        assert_eq!(IdQuery.encode(), b"ID?\r\n");
        let reply = IdReply::parse(b"ID GSORT-2000 rev 4\r\n").unwrap();
        assert_eq!(reply.ident, "GSORT-2000 rev 4");
        assert!(IdReply::parse(b"GSORT-2000").is_err());
    }

    #[test]
    fn fullsites_mask() {
        let reply = FullSites::parse(b"FULLSITES 00000003\r\n").unwrap();
        assert_eq!(reply.mask, 3);
        assert!(reply.is_full(0));
        assert!(reply.is_full(1));
        assert!(!reply.is_full(2));
        assert!(FullSites::parse(b"FULLSITES zz").is_err());
    }

    #[test]
    fn binon_renders_default_as_dash() {
        let cmd = BinOn {
            slots: vec![3, -1, 0],
        };
        assert_eq!(cmd.encode(), b"BINON 0:3 1:- 2:0\r\n");
    }

    #[test]
    fn binrp_marks_reprobed_sites() {
        let cmd = BinReprobe {
            reprobe: vec![false, true],
            slots: vec![2, 5],
        };
        assert_eq!(cmd.encode(), b"BINRP 0:2 1:R\r\n");
    }

    #[test]
    fn ack_accepts_only_ok() {
        assert!(Ack::parse(b"OK\r\n").is_ok());
        assert!(Ack::parse(b"NOK\r\n").is_err());
    }
}
