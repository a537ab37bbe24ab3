//! PMT (Program Map Table) parsing.
//!
//! The PMT names the PCR PID for a service, which is what the gating logic
//! consumes, along with the elementary stream list.

use super::psi::PsiSection;
use super::table_id;

/// A single elementary stream entry in the PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    /// Stream type.
    pub stream_type: u8,
    /// Elementary PID.
    pub elementary_pid: u16,
}

/// Parsed PMT (Program Map Table).
#[derive(Debug, Clone, Default)]
pub struct PmtTable {
    /// Service id (program number).
    pub service_id: u16,
    /// Version number.
    pub version_number: u8,
    /// PID carrying the authoritative PCR for this service.
    pub pcr_pid: u16,
    /// Elementary streams.
    pub streams: Vec<PmtStream>,
}

impl PmtTable {
    /// Parse a PMT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::PMT {
            return Err("Not a PMT section");
        }

        let data = section.data;
        if data.len() < 4 {
            return Err("PMT data too short");
        }

        let pcr_pid = ((data[0] as u16 & 0x1F) << 8) | data[1] as u16;
        let program_info_length = ((data[2] as usize & 0x0F) << 8) | data[3] as usize;

        if data.len() < 4 + program_info_length {
            return Err("Invalid program info length");
        }

        let mut pmt = PmtTable {
            service_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            pcr_pid,
            streams: Vec::new(),
        };

        let mut offset = 4 + program_info_length;
        while offset + 5 <= data.len() {
            let stream_type = data[offset];
            let elementary_pid = ((data[offset + 1] as u16 & 0x1F) << 8) | data[offset + 2] as u16;
            let es_info_length =
                ((data[offset + 3] as usize & 0x0F) << 8) | data[offset + 4] as usize;

            offset += 5;
            if offset + es_info_length > data.len() {
                break;
            }
            offset += es_info_length;

            pmt.streams.push(PmtStream {
                stream_type,
                elementary_pid,
            });
        }

        Ok(pmt)
    }
}
