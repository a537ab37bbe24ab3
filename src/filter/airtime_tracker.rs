//! Airtime tracker: reports event timing changes as JSON lines.
//!
//! An external scheduler tails the output and adjusts its recording window
//! whenever the broadcaster shifts the target event. One record is emitted
//! per dispatched EIT table that still lists the event.

use std::io::Write;

use log::{debug, error, warn};
use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::{JsonlWriter, PacketSink};
use crate::ts::{pid, EitEvent, EitTable, SectionDemux, Table, TsPacket};

use super::event::{locate_target_event, EitDecision};

/// Airtime tracker configuration.
#[derive(Debug, Clone)]
pub struct AirtimeTrackerOptions {
    /// Target service id.
    pub sid: u16,
    /// Target event id.
    pub eid: u16,
}

/// One emitted timing record.
///
/// Field order is the output order; `start_time` and `duration` are
/// milliseconds.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EventTiming {
    pub nid: u16,
    pub tsid: u16,
    pub sid: u16,
    pub eid: u16,
    #[serde(rename = "startTime")]
    pub start_time: i64,
    pub duration: i64,
}

/// EIT observer for a single service/event pair.
pub struct AirtimeTracker<W: Write> {
    option: AirtimeTrackerOptions,
    demux: SectionDemux,
    sink: JsonlWriter<W>,
    done: bool,
}

impl<W: Write> AirtimeTracker<W> {
    /// Create a tracker writing records into `sink`.
    pub fn new(option: AirtimeTrackerOptions, sink: JsonlWriter<W>) -> Self {
        let mut demux = SectionDemux::new();
        demux.subscribe(pid::EIT);
        debug!("Demux += EIT");

        AirtimeTracker {
            option,
            demux,
            sink,
            done: false,
        }
    }

    fn handle_eit(&mut self, eit: EitTable) -> Result<(), PipelineError> {
        if eit.service_id != self.option.sid {
            warn!("EIT.SID#{:04X} unmatched, skip", eit.service_id);
            return Ok(());
        }

        match locate_target_event(&eit, self.option.eid) {
            EitDecision::NoEvents => {
                error!("No event in EIT");
                self.done = true;
                Ok(())
            }
            EitDecision::Present(event) => {
                debug!("Event#{:04X} has started", self.option.eid);
                self.write_event_timing(&eit, event)
            }
            EitDecision::Following(event) => {
                debug!("Event#{:04X} will start soon", self.option.eid);
                self.write_event_timing(&eit, event)
            }
            EitDecision::NoFollowing => {
                warn!("No following event in EIT");
                self.done = true;
                Ok(())
            }
            EitDecision::NotListed => {
                error!("Event#{:04X} might have been canceled", self.option.eid);
                self.done = true;
                Ok(())
            }
        }
    }

    fn write_event_timing(&mut self, eit: &EitTable, event: &EitEvent) -> Result<(), PipelineError> {
        let record = EventTiming {
            nid: eit.original_network_id,
            tsid: eit.transport_stream_id,
            sid: eit.service_id,
            eid: event.event_id,
            start_time: event.start_time.timestamp_millis(),
            duration: event.duration_secs as i64 * 1000,
        };
        self.sink.emit(&record)
    }
}

impl<W: Write> PacketSink for AirtimeTracker<W> {
    fn handle_packet(&mut self, packet: &TsPacket) -> Result<bool, PipelineError> {
        let tables = self.demux.feed(packet);
        for completed in tables {
            if let Table::Eit(eit) = completed.table {
                self.handle_eit(eit)?;
            }
        }
        Ok(!self.done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::testutil::{eit_section, jst, media_packet, section_packets, EventSpec};
    use std::cell::RefCell;
    use std::rc::Rc;

    const SID: u16 = 0x0001;
    const EID: u16 = 0x1000;

    /// Shared buffer so emitted lines stay inspectable while the tracker
    /// owns the writer.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn tracker() -> (AirtimeTracker<SharedBuf>, SharedBuf) {
        let buf = SharedBuf::default();
        let tracker = AirtimeTracker::new(
            AirtimeTrackerOptions { sid: SID, eid: EID },
            JsonlWriter::new(buf.clone()),
        );
        (tracker, buf)
    }

    fn feed_eit_pair(
        tracker: &mut AirtimeTracker<SharedBuf>,
        version: u8,
        first_cc: u8,
        present_eid: u16,
        duration_secs: u32,
    ) -> bool {
        let t0 = jst(2021, 1, 1, 21, 0, 0);
        let present = eit_section(
            SID,
            0x1234,
            0x0004,
            version,
            0,
            1,
            &[EventSpec {
                event_id: present_eid,
                start: t0,
                duration_secs,
            }],
        );
        let following = eit_section(
            SID,
            0x1234,
            0x0004,
            version,
            1,
            1,
            &[EventSpec {
                event_id: 0x1001,
                start: t0,
                duration_secs: 3600,
            }],
        );
        let mut cont = true;
        for packet in section_packets(pid::EIT, first_cc, &present) {
            cont = tracker.handle_packet(&packet).unwrap();
        }
        for packet in section_packets(pid::EIT, first_cc + 1, &following) {
            cont = tracker.handle_packet(&packet).unwrap();
        }
        cont
    }

    #[test]
    fn test_emits_record_for_present_event() {
        let (mut tracker, buf) = tracker();
        assert!(feed_eit_pair(&mut tracker, 1, 0, EID, 1800));

        let expected_start = jst(2021, 1, 1, 21, 0, 0).timestamp_millis();
        let expected = format!(
            "{{\"nid\":4,\"tsid\":4660,\"sid\":1,\"eid\":4096,\"startTime\":{},\"duration\":1800000}}\n",
            expected_start
        );
        assert_eq!(String::from_utf8(buf.0.borrow().clone()).unwrap(), expected);
    }

    #[test]
    fn test_emits_record_per_eit_update() {
        let (mut tracker, buf) = tracker();
        assert!(feed_eit_pair(&mut tracker, 1, 0, EID, 1800));
        // Same version retransmitted: suppressed by the demux.
        assert!(feed_eit_pair(&mut tracker, 1, 4, EID, 1800));
        // Revised duration under a new version: a second record.
        assert!(feed_eit_pair(&mut tracker, 2, 8, EID, 2700));

        let out = buf.0.borrow();
        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"duration\":1800000"));
        assert!(lines[1].contains("\"duration\":2700000"));
    }

    #[test]
    fn test_following_event_matches() {
        let (mut tracker, buf) = tracker();
        let t0 = jst(2021, 1, 1, 21, 0, 0);
        let present = eit_section(
            SID,
            0x1234,
            0x0004,
            1,
            0,
            1,
            &[EventSpec {
                event_id: 0x0FFF,
                start: t0,
                duration_secs: 60,
            }],
        );
        let following = eit_section(
            SID,
            0x1234,
            0x0004,
            1,
            1,
            1,
            &[EventSpec {
                event_id: EID,
                start: jst(2021, 1, 1, 21, 1, 0),
                duration_secs: 1800,
            }],
        );
        for packet in section_packets(pid::EIT, 0, &present) {
            assert!(tracker.handle_packet(&packet).unwrap());
        }
        for packet in section_packets(pid::EIT, 1, &following) {
            assert!(tracker.handle_packet(&packet).unwrap());
        }

        let out = buf.0.borrow();
        let line = std::str::from_utf8(&out).unwrap();
        assert!(line.contains("\"eid\":4096"));
        assert!(line.contains("\"duration\":1800000"));
    }

    #[test]
    fn test_zero_events_goes_terminal() {
        let (mut tracker, buf) = tracker();
        let empty = eit_section(SID, 0x1234, 0x0004, 1, 0, 0, &[]);
        let packets = section_packets(pid::EIT, 0, &empty);
        assert!(!tracker.handle_packet(&packets[0]).unwrap());
        assert!(buf.0.borrow().is_empty());
        // Terminal sticks.
        assert!(!tracker.handle_packet(&media_packet(0x0301, 0)).unwrap());
    }

    #[test]
    fn test_target_absent_goes_terminal() {
        let (mut tracker, buf) = tracker();
        assert!(!feed_eit_pair(&mut tracker, 1, 0, 0x0FFF, 60));
        assert!(buf.0.borrow().is_empty());
    }

    #[test]
    fn test_other_service_ignored() {
        let (mut tracker, buf) = tracker();
        let t0 = jst(2021, 1, 1, 21, 0, 0);
        let other = eit_section(
            0x0099,
            0x1234,
            0x0004,
            1,
            0,
            0,
            &[EventSpec {
                event_id: EID,
                start: t0,
                duration_secs: 60,
            }],
        );
        for packet in section_packets(pid::EIT, 0, &other) {
            assert!(tracker.handle_packet(&packet).unwrap());
        }
        assert!(buf.0.borrow().is_empty());
    }

    #[test]
    fn test_non_eit_packets_pass_quietly() {
        let (mut tracker, buf) = tracker();
        assert!(tracker.handle_packet(&media_packet(0x0301, 0)).unwrap());
        assert!(tracker.handle_packet(&media_packet(0x0000, 0)).unwrap());
        assert!(buf.0.borrow().is_empty());
    }
}
