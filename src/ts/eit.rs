//! EIT present/following (actual) parsing.
//!
//! The EIT p/f carries the current and next event of a service. ARIB streams
//! encode event start times as MJD + BCD in JST wall clock; they are
//! converted to UTC once here so the rest of the pipeline works in a single
//! time scale.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use super::psi::PsiSection;
use super::table_id;

/// Seconds east of UTC for Japan Standard Time.
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// A single event in the EIT p/f.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitEvent {
    /// Event id (identifies one broadcast program).
    pub event_id: u16,
    /// Event start, converted from the JST broadcast clock.
    pub start_time: DateTime<Utc>,
    /// Scheduled duration in seconds.
    pub duration_secs: u32,
}

/// Parsed EIT present/following (actual).
#[derive(Debug, Clone)]
pub struct EitTable {
    /// Service id.
    pub service_id: u16,
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Originating network id.
    pub original_network_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Present event first, following second. At most two.
    pub events: Vec<EitEvent>,
}

impl EitTable {
    /// Parse an EIT p/f (actual) from a PSI section.
    pub fn parse(section: &PsiSection) -> Result<Self, &'static str> {
        if section.header.table_id != table_id::EIT_PF_ACTUAL {
            return Err("Not an EIT p/f actual section");
        }

        let data = section.data;
        if data.len() < 6 {
            return Err("EIT data too short");
        }

        let transport_stream_id = ((data[0] as u16) << 8) | data[1] as u16;
        let original_network_id = ((data[2] as u16) << 8) | data[3] as u16;
        // data[4] is segment_last_section_number, data[5] is last_table_id.

        let mut eit = EitTable {
            service_id: section.header.table_id_extension,
            transport_stream_id,
            original_network_id,
            version_number: section.header.version_number,
            events: Vec::new(),
        };

        let mut offset = 6;
        while offset + 12 <= data.len() {
            let event_id = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
            let start_time = decode_start_time(&data[offset + 2..offset + 7])?;
            let duration_secs = decode_bcd_duration(&data[offset + 7..offset + 10])?;
            let descriptors_length =
                ((data[offset + 10] as usize & 0x0F) << 8) | data[offset + 11] as usize;

            offset += 12;
            if offset + descriptors_length > data.len() {
                return Err("Invalid EIT descriptor loop length");
            }
            offset += descriptors_length;

            eit.events.push(EitEvent {
                event_id,
                start_time,
                duration_secs,
            });
        }

        Ok(eit)
    }
}

/// Decode a 40-bit MJD + BCD start time (JST) into UTC.
fn decode_start_time(bytes: &[u8]) -> Result<DateTime<Utc>, &'static str> {
    if bytes.iter().all(|&b| b == 0xFF) {
        // Undefined start time (NVOD reference events).
        return Err("Undefined event start time");
    }

    let mjd = ((bytes[0] as i64) << 8) | bytes[1] as i64;

    // Integer form of the MJD conversion from ETSI EN 300 468 annex C.
    let yp = (mjd * 100 - 1_507_820) / 36_525;
    let mp = (mjd * 10_000 - 149_561_000 - (yp * 36_525 / 100) * 10_000) / 306_001;
    let day = mjd - 14_956 - (yp * 36_525 / 100) - (mp * 306_001 / 10_000);
    let k = if mp == 14 || mp == 15 { 1 } else { 0 };
    let year = yp + k + 1900;
    let month = mp - 1 - k * 12;

    let hour = decode_bcd(bytes[2])?;
    let minute = decode_bcd(bytes[3])?;
    let second = decode_bcd(bytes[4])?;

    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .ok_or("Invalid MJD date")?;
    let time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
        .ok_or("Invalid BCD time")?;
    let naive = NaiveDateTime::new(date, time);

    let jst = FixedOffset::east_opt(JST_OFFSET_SECS).expect("valid fixed offset");
    let local = naive
        .and_local_timezone(jst)
        .single()
        .ok_or("Invalid JST time")?;
    Ok(local.with_timezone(&Utc))
}

/// Decode a 24-bit BCD hh:mm:ss duration into seconds.
fn decode_bcd_duration(bytes: &[u8]) -> Result<u32, &'static str> {
    let hours = decode_bcd(bytes[0])? as u32;
    let minutes = decode_bcd(bytes[1])? as u32;
    let seconds = decode_bcd(bytes[2])? as u32;
    Ok(hours * 3600 + minutes * 60 + seconds)
}

fn decode_bcd(byte: u8) -> Result<u8, &'static str> {
    let high = byte >> 4;
    let low = byte & 0x0F;
    if high > 9 || low > 9 {
        return Err("Invalid BCD digit");
    }
    Ok(high * 10 + low)
}
