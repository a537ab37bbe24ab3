//! PSI/SI section demultiplexer.
//!
//! Collects sections on subscribed PIDs, validates them, assembles
//! multi-section tables (EIT p/f splits present and following across section
//! numbers 0 and 1), and returns parsed tables to the caller. A table is
//! dispatched once per version; retransmissions of the version most recently
//! dispatched for the same (PID, table id, extension) are dropped here, so a
//! new dispatch always means the table changed.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use super::eit::EitTable;
use super::packet::TsPacket;
use super::pat::PatTable;
use super::pmt::PmtTable;
use super::psi::{PsiSection, SectionCollector};
use super::table_id;

/// A parsed table delivered by the demultiplexer.
#[derive(Debug, Clone)]
pub enum Table {
    Pat(PatTable),
    Pmt(PmtTable),
    Eit(EitTable),
}

impl Table {
    /// Table name and version for log lines.
    fn describe(&self) -> (&'static str, u8) {
        match self {
            Table::Pat(pat) => ("PAT", pat.version_number),
            Table::Pmt(pmt) => ("PMT", pmt.version_number),
            Table::Eit(eit) => ("EIT p/f", eit.version_number),
        }
    }
}

/// A dispatched table together with the PID it was collected from.
///
/// The source PID matters: some channels leak PAT sections onto the EIT PID
/// around midnight, and handlers reject tables from the wrong PID.
#[derive(Debug, Clone)]
pub struct CompletedTable {
    pub pid: u16,
    pub table: Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey {
    pid: u16,
    table_id: u8,
    extension: u16,
}

#[derive(Debug)]
struct PendingTable {
    version: u8,
    last_section_number: u8,
    sections: BTreeMap<u8, Vec<u8>>,
}

/// Section demultiplexer over subscribed PIDs.
#[derive(Debug, Default)]
pub struct SectionDemux {
    collectors: HashMap<u16, SectionCollector>,
    pending: HashMap<TableKey, PendingTable>,
    dispatched: HashMap<TableKey, u8>,
}

impl SectionDemux {
    /// Create a demultiplexer with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting sections on a PID.
    pub fn subscribe(&mut self, pid: u16) {
        self.collectors.entry(pid).or_default();
    }

    /// Stop collecting on a PID and release its buffers.
    pub fn unsubscribe(&mut self, pid: u16) {
        self.collectors.remove(&pid);
        self.pending.retain(|key, _| key.pid != pid);
        self.dispatched.retain(|key, _| key.pid != pid);
    }

    /// Whether a PID is currently subscribed.
    pub fn is_subscribed(&self, pid: u16) -> bool {
        self.collectors.contains_key(&pid)
    }

    /// Feed one packet; returns any tables completed by it.
    pub fn feed(&mut self, packet: &TsPacket) -> Vec<CompletedTable> {
        let mut completed = Vec::new();

        if packet.transport_error() || packet.is_scrambled() || !packet.has_payload() {
            return completed;
        }

        let pid = packet.pid();
        let Some(collector) = self.collectors.get_mut(&pid) else {
            return completed;
        };

        if collector.add_data(packet.payload(), packet.continuity_counter(), packet.pusi()) {
            if let Some(section) = collector.take_section() {
                self.process_section(pid, &section, &mut completed);
            }
        }

        completed
    }

    fn process_section(&mut self, pid: u16, section: &[u8], completed: &mut Vec<CompletedTable>) {
        let parsed = match PsiSection::parse(section) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Broken section on PID#{:04X}, skip: {}", pid, e);
                return;
            }
        };

        let header = parsed.header;
        match header.table_id {
            table_id::PAT | table_id::PMT | table_id::EIT_PF_ACTUAL => {}
            _ => return,
        }
        if !header.current_next_indicator {
            return;
        }

        let key = TableKey {
            pid,
            table_id: header.table_id,
            extension: header.table_id_extension,
        };

        if self.dispatched.get(&key) == Some(&header.version_number) {
            // Retransmission of the version already delivered.
            return;
        }

        let complete = {
            let pending = self.pending.entry(key).or_insert_with(|| PendingTable {
                version: header.version_number,
                last_section_number: header.last_section_number,
                sections: BTreeMap::new(),
            });
            if pending.version != header.version_number {
                // A new version obsoletes any partially assembled table.
                pending.version = header.version_number;
                pending.last_section_number = header.last_section_number;
                pending.sections.clear();
            }
            pending
                .sections
                .insert(header.section_number, section.to_vec());
            pending.sections.len() == pending.last_section_number as usize + 1
        };

        if complete {
            let pending = self.pending.remove(&key).expect("pending entry exists");
            self.dispatched.insert(key, pending.version);
            if let Some(table) = assemble_table(key.table_id, &pending) {
                let (name, version) = table.describe();
                debug!("{} v{} completed on PID#{:04X}", name, version, pid);
                completed.push(CompletedTable { pid, table });
            }
        }
    }
}

/// Merge the sections of a complete table into one parsed value.
fn assemble_table(tid: u8, pending: &PendingTable) -> Option<Table> {
    let mut pat: Option<PatTable> = None;
    let mut pmt: Option<PmtTable> = None;
    let mut eit: Option<EitTable> = None;

    for section in pending.sections.values() {
        let parsed = PsiSection::parse(section).ok()?;
        match tid {
            table_id::PAT => match PatTable::parse(&parsed) {
                Ok(part) => match &mut pat {
                    Some(pat) => {
                        pat.programs.extend(part.programs);
                        pat.nit_pid = pat.nit_pid.or(part.nit_pid);
                    }
                    None => pat = Some(part),
                },
                Err(e) => {
                    warn!("Broken PAT, skip: {}", e);
                    return None;
                }
            },
            table_id::PMT => match PmtTable::parse(&parsed) {
                Ok(part) => pmt = Some(part),
                Err(e) => {
                    warn!("Broken PMT, skip: {}", e);
                    return None;
                }
            },
            table_id::EIT_PF_ACTUAL => match EitTable::parse(&parsed) {
                Ok(part) => match &mut eit {
                    Some(eit) => eit.events.extend(part.events),
                    None => eit = Some(part),
                },
                Err(e) => {
                    warn!("Broken EIT, skip: {}", e);
                    return None;
                }
            },
            _ => return None,
        }
    }

    match tid {
        table_id::PAT => pat.map(Table::Pat),
        table_id::PMT => pmt.map(Table::Pmt),
        table_id::EIT_PF_ACTUAL => eit.map(Table::Eit),
        _ => None,
    }
}
