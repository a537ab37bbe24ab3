//! PAT (Program Association Table) parsing.
//!
//! The PAT is transmitted on PID 0x0000 and maps service ids to the PIDs
//! carrying their PMTs.

use super::psi::PsiSection;
use super::table_id;

/// A single PAT entry (service id and PMT PID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Service id (program number).
    pub service_id: u16,
    /// PID of the PMT for this service.
    pub pmt_pid: u16,
}

/// Parsed PAT (Program Association Table).
#[derive(Debug, Clone, Default)]
pub struct PatTable {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Services carried by this transport stream.
    pub programs: Vec<PatEntry>,
    /// NIT PID (program number 0 entry), when present.
    pub nit_pid: Option<u16>,
}

impl PatTable {
    /// Parse a PAT from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::PAT {
            return Err("Not a PAT section");
        }

        let data = section.data;
        if data.len() % 4 != 0 {
            return Err("Invalid PAT data length");
        }

        let mut pat = PatTable {
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            programs: Vec::new(),
            nit_pid: None,
        };

        for chunk in data.chunks(4) {
            let service_id = ((chunk[0] as u16) << 8) | chunk[1] as u16;
            let pid = ((chunk[2] as u16 & 0x1F) << 8) | chunk[3] as u16;

            if service_id == 0 {
                pat.nit_pid = Some(pid);
            } else {
                pat.programs.push(PatEntry {
                    service_id,
                    pmt_pid: pid,
                });
            }
        }

        Ok(pat)
    }

    /// Get the PMT PID for a specific service id.
    pub fn pmt_pid(&self, service_id: u16) -> Option<u16> {
        self.programs
            .iter()
            .find(|p| p.service_id == service_id)
            .map(|p| p.pmt_pid)
    }
}
