//! MPEG-TS packet and PSI/SI table layer.
//!
//! This module provides the parsing substrate for the program filter and the
//! airtime tracker: 188-byte packet framing, PSI section collection with
//! CRC-32 validation, and the three tables the gating logic consumes.
//!
//! # Supported Tables
//! - PAT (Program Association Table) - PID 0x0000
//! - PMT (Program Map Table) - Variable PIDs from PAT
//! - EIT present/following, actual (Event Information Table) - PID 0x0012

pub mod demux;
pub mod eit;
pub mod packet;
pub mod pat;
pub mod pmt;
pub mod psi;

#[cfg(test)]
pub mod testutil;

pub use demux::{CompletedTable, SectionDemux, Table};
pub use eit::{EitEvent, EitTable};
pub use packet::{TsPacket, SYNC_BYTE, TS_PACKET_SIZE};
pub use pat::{PatEntry, PatTable};
pub use pmt::{PmtStream, PmtTable};
pub use psi::{PsiHeader, PsiSection};

/// Well-known PIDs in MPEG-TS.
pub mod pid {
    /// Program Association Table PID.
    pub const PAT: u16 = 0x0000;
    /// Event Information Table PID.
    pub const EIT: u16 = 0x0012;
}

/// Table IDs for PSI/SI tables.
pub mod table_id {
    /// Program Association Section.
    pub const PAT: u8 = 0x00;
    /// Program Map Section.
    pub const PMT: u8 = 0x02;
    /// Event Information Section - actual TS, present/following.
    pub const EIT_PF_ACTUAL: u8 = 0x4E;
}
