//! Builders for synthetic TS packets and PSI/SI sections used across tests.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use super::packet::{TsPacket, SYNC_BYTE, TS_PACKET_SIZE};
use super::psi::crc32_mpeg2;
use super::table_id;

/// A wall-clock instant given in JST, as UTC.
pub fn jst(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(year, month, day, hour, min, sec)
        .unwrap()
        .with_timezone(&Utc)
}

/// Wrap a long-form section body in header and CRC.
pub fn build_section(
    tid: u8,
    extension: u16,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    body: &[u8],
) -> Vec<u8> {
    let section_length = (5 + body.len() + 4) as u16;
    let mut section = vec![
        tid,
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        (section_length & 0xFF) as u8,
        (extension >> 8) as u8,
        (extension & 0xFF) as u8,
        0xC1 | (version << 1),
        section_number,
        last_section_number,
    ];
    section.extend_from_slice(body);
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

/// Build a single-section PAT.
pub fn build_pat(tsid: u16, version: u8, services: &[(u16, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    for &(sid, pmt_pid) in services {
        body.extend_from_slice(&sid.to_be_bytes());
        body.push(0xE0 | (pmt_pid >> 8) as u8);
        body.push((pmt_pid & 0xFF) as u8);
    }
    build_section(table_id::PAT, tsid, version, 0, 0, &body)
}

/// Build a single-section PMT.
pub fn build_pmt(sid: u16, version: u8, pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    let mut body = vec![
        0xE0 | (pcr_pid >> 8) as u8,
        (pcr_pid & 0xFF) as u8,
        0xF0,
        0x00, // program_info_length = 0
    ];
    for &(stream_type, pid) in streams {
        body.push(stream_type);
        body.push(0xE0 | (pid >> 8) as u8);
        body.push((pid & 0xFF) as u8);
        body.push(0xF0);
        body.push(0x00); // es_info_length = 0
    }
    build_section(table_id::PMT, sid, version, 0, 0, &body)
}

/// One event for [`eit_section`].
pub struct EventSpec {
    pub event_id: u16,
    /// Start instant; encoded as JST MJD + BCD.
    pub start: DateTime<Utc>,
    pub duration_secs: u32,
}

/// Build one EIT p/f (actual) section carrying the given events.
pub fn eit_section(
    sid: u16,
    tsid: u16,
    nid: u16,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    events: &[EventSpec],
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&tsid.to_be_bytes());
    body.extend_from_slice(&nid.to_be_bytes());
    body.push(last_section_number); // segment_last_section_number
    body.push(table_id::EIT_PF_ACTUAL); // last_table_id

    for event in events {
        body.extend_from_slice(&event.event_id.to_be_bytes());

        let local = event.start.with_timezone(&FixedOffset::east_opt(9 * 3600).unwrap());
        let mjd_epoch = NaiveDate::from_ymd_opt(1858, 11, 17).unwrap();
        let mjd = (local.date_naive() - mjd_epoch).num_days() as u16;
        body.extend_from_slice(&mjd.to_be_bytes());
        body.push(encode_bcd(chrono::Timelike::hour(&local) as u8));
        body.push(encode_bcd(chrono::Timelike::minute(&local) as u8));
        body.push(encode_bcd(chrono::Timelike::second(&local) as u8));

        let duration = event.duration_secs;
        body.push(encode_bcd((duration / 3600) as u8));
        body.push(encode_bcd(((duration / 60) % 60) as u8));
        body.push(encode_bcd((duration % 60) as u8));

        body.push(0x00); // running_status + free_CA + descriptors_length high
        body.push(0x00); // descriptors_length low
    }

    build_section(
        table_id::EIT_PF_ACTUAL,
        sid,
        version,
        section_number,
        last_section_number,
        &body,
    )
}

fn encode_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Split a section into TS packets (pointer field on the first).
pub fn section_packets(pid: u16, first_cc: u8, section: &[u8]) -> Vec<TsPacket> {
    let mut packets = Vec::new();
    let mut remaining = section;
    let mut cc = first_cc;
    let mut first = true;

    while first || !remaining.is_empty() {
        let mut buf = vec![0xFFu8; TS_PACKET_SIZE];
        buf[0] = SYNC_BYTE;
        buf[1] = (if first { 0x40 } else { 0x00 }) | (pid >> 8) as u8;
        buf[2] = (pid & 0xFF) as u8;
        buf[3] = 0x10 | (cc & 0x0F);

        let mut offset = 4;
        if first {
            buf[offset] = 0x00; // pointer field
            offset += 1;
        }
        let take = remaining.len().min(TS_PACKET_SIZE - offset);
        buf[offset..offset + take].copy_from_slice(&remaining[..take]);
        remaining = &remaining[take..];

        packets.push(TsPacket::parse(Bytes::from(buf)).unwrap());
        cc = (cc + 1) & 0x0F;
        first = false;
    }

    packets
}

/// A packet on `pid` whose adaptation field carries the given PCR base.
pub fn pcr_packet(pid: u16, cc: u8, pcr_base: i64) -> TsPacket {
    let mut buf = vec![0xFFu8; TS_PACKET_SIZE];
    buf[0] = SYNC_BYTE;
    buf[1] = (pid >> 8) as u8;
    buf[2] = (pid & 0xFF) as u8;
    buf[3] = 0x30 | (cc & 0x0F); // adaptation field + payload
    buf[4] = 7; // adaptation field length
    buf[5] = 0x10; // PCR flag
    buf[6] = (pcr_base >> 25) as u8;
    buf[7] = (pcr_base >> 17) as u8;
    buf[8] = (pcr_base >> 9) as u8;
    buf[9] = (pcr_base >> 1) as u8;
    buf[10] = ((pcr_base & 0x01) << 7) as u8 | 0x7E; // base LSB, reserved, ext MSB = 0
    buf[11] = 0x00;
    TsPacket::parse(Bytes::from(buf)).unwrap()
}

/// A payload-only packet with no PCR (media or PCR PID without a PCR field).
pub fn media_packet(pid: u16, cc: u8) -> TsPacket {
    let mut buf = vec![0xAAu8; TS_PACKET_SIZE];
    buf[0] = SYNC_BYTE;
    buf[1] = (pid >> 8) as u8;
    buf[2] = (pid & 0xFF) as u8;
    buf[3] = 0x10 | (cc & 0x0F);
    TsPacket::parse(Bytes::from(buf)).unwrap()
}
