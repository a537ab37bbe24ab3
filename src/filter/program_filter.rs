//! Program filter: gates a TS stream to one event's airtime.
//!
//! The filter waits until the PMT has named the PCR PID and the EIT has
//! yielded a PCR window for the target event, then starts forwarding at the
//! first PCR inside the window and stops at the first PCR past its end. The
//! window follows EIT revisions, so broadcast time drifts move the gate.

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, trace, warn};

use crate::error::PipelineError;
use crate::pcr::{compare_pcr, time_to_pcr};
use crate::pipeline::PacketSink;
use crate::ts::{pid, CompletedTable, EitEvent, EitTable, PatTable, PmtTable, SectionDemux, Table,
                TsPacket};

use super::event::{locate_target_event, EitDecision};

/// Program filter configuration.
#[derive(Debug, Clone)]
pub struct ProgramFilterOptions {
    /// Target service id.
    pub sid: u16,
    /// Target event id.
    pub eid: u16,
    /// PCR observed at `clock_time`.
    pub clock_pcr: i64,
    /// Wall-clock instant paired with `clock_pcr`.
    pub clock_time: DateTime<Utc>,
    /// Widens the window before the event start, in milliseconds.
    pub start_margin_ms: i64,
    /// Widens the window past the event end, in milliseconds.
    pub end_margin_ms: i64,
    /// Forward PAT packets live while waiting instead of buffering them.
    pub pre_streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitReady,
    Streaming,
}

/// Packet-gating state machine for a single service/event pair.
pub struct ProgramFilter {
    option: ProgramFilterOptions,
    demux: SectionDemux,
    sink: Option<Box<dyn PacketSink>>,
    state: State,
    last_pat_packets: Vec<TsPacket>,
    last_pmt_packets: Vec<TsPacket>,
    pmt_pid: Option<u16>,
    pcr_pid: Option<u16>,
    start_pcr: i64,
    end_pcr: i64,
    pcr_range_ready: bool,
    stop: bool,
}

impl ProgramFilter {
    /// Create a filter; a sink must be connected before it can run.
    pub fn new(option: ProgramFilterOptions) -> Self {
        let mut demux = SectionDemux::new();
        demux.subscribe(pid::PAT);
        demux.subscribe(pid::EIT);
        debug!("Demux += PAT EIT");

        ProgramFilter {
            option,
            demux,
            sink: None,
            state: State::WaitReady,
            last_pat_packets: Vec::new(),
            last_pmt_packets: Vec::new(),
            pmt_pid: None,
            pcr_pid: None,
            start_pcr: 0,
            end_pcr: 0,
            pcr_range_ready: false,
            stop: false,
        }
    }

    /// Attach the downstream sink. The filter owns it exclusively.
    pub fn connect(&mut self, sink: Box<dyn PacketSink>) {
        debug_assert!(self.sink.is_none(), "sink connected twice");
        self.sink = Some(sink);
    }

    fn sink_mut(&mut self) -> Result<&mut Box<dyn PacketSink>, PipelineError> {
        match self.sink.as_mut() {
            Some(sink) => Ok(sink),
            None => {
                error!("No sink has been connected");
                Err(PipelineError::NoSink)
            }
        }
    }

    fn wait_ready(&mut self, packet: &TsPacket) -> Result<bool, PipelineError> {
        if self.stop {
            warn!("Canceled");
            return Ok(false);
        }

        let packet_pid = packet.pid();

        if packet_pid == pid::PAT {
            if self.option.pre_streaming {
                return self.forward(packet);
            }
            // Keep only the packets of the most recent PAT section.
            if packet.pusi() {
                self.last_pat_packets.clear();
            }
            self.last_pat_packets.push(packet.clone());
        } else if self.pmt_pid == Some(packet_pid) {
            if packet.pusi() {
                self.last_pmt_packets.clear();
            }
            self.last_pmt_packets.push(packet.clone());
        } else {
            // Drop other packets while waiting.
        }

        if self.pcr_pid.is_none() || !self.pcr_range_ready {
            return Ok(true);
        }

        if Some(packet_pid) != self.pcr_pid {
            return Ok(true);
        }

        let Some(packet_pcr) = packet.pcr() else {
            // Some channels routinely send PCR-PID packets without a PCR
            // field; they carry no timing information, keep waiting.
            trace!("No PCR value in PCR#{:04X}", packet_pid);
            return Ok(true);
        };

        if compare_pcr(packet_pcr, self.end_pcr) >= 0 {
            info!("Reached the end PCR");
            self.stop = true;
            return Ok(false);
        }

        if compare_pcr(packet_pcr, self.start_pcr) < 0 {
            return Ok(true);
        }

        info!("Reached the start PCR");

        if !self.option.pre_streaming {
            assert!(
                !self.last_pat_packets.is_empty(),
                "a PAT must have been seen before the PCR window opens"
            );
            let pats = std::mem::take(&mut self.last_pat_packets);
            for pat in &pats {
                if !self.forward(pat)? {
                    return Ok(false);
                }
            }
        }
        let pmts = std::mem::take(&mut self.last_pmt_packets);
        for pmt in &pmts {
            if !self.forward(pmt)? {
                return Ok(false);
            }
        }

        self.state = State::Streaming;
        self.forward(packet)
    }

    fn do_streaming(&mut self, packet: &TsPacket) -> Result<bool, PipelineError> {
        if self.stop {
            info!("Done");
            return Ok(false);
        }

        if Some(packet.pid()) == self.pcr_pid {
            match packet.pcr() {
                Some(packet_pcr) => {
                    if compare_pcr(packet_pcr, self.end_pcr) >= 0 {
                        info!("Reached the end PCR");
                        self.stop = true;
                        return Ok(false);
                    }
                }
                None => {
                    trace!("No PCR value in PCR#{:04X}", packet.pid());
                }
            }
        }

        self.forward(packet)
    }

    fn forward(&mut self, packet: &TsPacket) -> Result<bool, PipelineError> {
        let cont = self.sink_mut()?.handle_packet(packet)?;
        if !cont {
            self.stop = true;
        }
        Ok(cont)
    }

    fn handle_table(&mut self, completed: CompletedTable) {
        match completed.table {
            Table::Pat(pat) => self.handle_pat(completed.pid, pat),
            Table::Pmt(pmt) => self.handle_pmt(pmt),
            Table::Eit(eit) => self.handle_eit(eit),
        }
    }

    fn handle_pat(&mut self, source_pid: u16, pat: PatTable) {
        // Some channels leak PAT sections onto the EIT PID around midnight.
        if source_pid != pid::PAT {
            warn!("PAT delivered on PID#{:04X}, skip", source_pid);
            return;
        }
        if pat.transport_stream_id == 0 {
            warn!("PAT with TSID 0, skip");
            return;
        }

        // Upstream reduces the stream to the target service, so its absence
        // from a valid PAT is a wiring bug, not broadcast data.
        let new_pmt_pid = pat
            .pmt_pid(self.option.sid)
            .expect("target service must appear in the PAT");

        if let Some(old) = self.pmt_pid.take() {
            debug!("Demux -= PMT#{:04X}", old);
            self.demux.unsubscribe(old);
        }

        self.pmt_pid = Some(new_pmt_pid);
        self.demux.subscribe(new_pmt_pid);
        debug!("Demux += PMT#{:04X}", new_pmt_pid);
    }

    fn handle_pmt(&mut self, pmt: PmtTable) {
        if pmt.service_id != self.option.sid {
            warn!("PMT.SID#{:04X} unmatched, skip", pmt.service_id);
            return;
        }

        self.pcr_pid = Some(pmt.pcr_pid);
        debug!("PCR#{:04X}", pmt.pcr_pid);
        for stream in &pmt.streams {
            debug!(
                "ES#{:04X} stream_type {:#04X}",
                stream.elementary_pid, stream.stream_type
            );
        }
    }

    fn handle_eit(&mut self, eit: EitTable) {
        if eit.service_id != self.option.sid {
            return;
        }

        match locate_target_event(&eit, self.option.eid) {
            EitDecision::NoEvents => {
                error!("No event in EIT, stop");
                self.stop = true;
            }
            EitDecision::Present(event) => {
                debug!("Event#{:04X} has started", self.option.eid);
                self.update_pcr_range(event);
            }
            EitDecision::Following(event) => {
                debug!("Event#{:04X} will start soon", self.option.eid);
                self.update_pcr_range(event);
            }
            EitDecision::NoFollowing => {
                warn!("No following event in EIT");
                if self.state != State::Streaming {
                    error!("Event#{:04X} might have been canceled", self.option.eid);
                    self.stop = true;
                }
                // While streaming, keep going until PCR reaches the end.
            }
            EitDecision::NotListed => {
                if self.state != State::Streaming {
                    error!("Event#{:04X} might have been canceled", self.option.eid);
                    self.stop = true;
                }
            }
        }
    }

    fn update_pcr_range(&mut self, event: &EitEvent) {
        let start_time = event.start_time - Duration::milliseconds(self.option.start_margin_ms);
        let end_time = event.start_time
            + Duration::seconds(event.duration_secs as i64)
            + Duration::milliseconds(self.option.end_margin_ms);
        self.start_pcr = time_to_pcr(start_time, self.option.clock_time, self.option.clock_pcr);
        self.end_pcr = time_to_pcr(end_time, self.option.clock_time, self.option.clock_pcr);
        info!(
            "Updated PCR range: {:011X} ({}) .. {:011X} ({})",
            self.start_pcr, start_time, self.end_pcr, end_time
        );
        self.pcr_range_ready = true;
    }
}

impl PacketSink for ProgramFilter {
    fn start(&mut self) -> Result<(), PipelineError> {
        self.sink_mut()?.start()
    }

    fn end(&mut self) -> Result<(), PipelineError> {
        self.sink_mut()?.end()
    }

    fn handle_packet(&mut self, packet: &TsPacket) -> Result<bool, PipelineError> {
        if self.sink.is_none() {
            error!("No sink has been connected");
            return Err(PipelineError::NoSink);
        }

        // Table effects apply before the gating decision for the same packet.
        let tables = self.demux.feed(packet);
        for table in tables {
            self.handle_table(table);
        }

        match self.state {
            State::WaitReady => self.wait_ready(packet),
            State::Streaming => self.do_streaming(packet),
        }
    }
}
