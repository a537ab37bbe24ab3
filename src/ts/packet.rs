//! MPEG-TS packet parsing.
//!
//! Packets are parsed once at ingest into an immutable, cheaply clonable
//! value. The program filter holds the most recent PAT/PMT sections as
//! rolling buffers of whole packets, so the raw bytes stay attached to the
//! parsed header via a shared [`Bytes`] buffer.

use bytes::Bytes;

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// A parsed, immutable TS packet.
#[derive(Debug, Clone)]
pub struct TsPacket {
    data: Bytes,
    pid: u16,
    payload_unit_start: bool,
    transport_error: bool,
    scrambling_control: u8,
    adaptation_field_control: u8,
    continuity_counter: u8,
    pcr: Option<i64>,
    payload_offset: usize,
}

impl TsPacket {
    /// Parse a TS packet from an owned 188-byte buffer.
    pub fn parse(data: Bytes) -> Result<Self, &'static str> {
        if data.len() != TS_PACKET_SIZE {
            return Err("Packet must be exactly 188 bytes");
        }

        if data[0] != SYNC_BYTE {
            return Err("Invalid sync byte");
        }

        let pid = ((data[1] as u16 & 0x1F) << 8) | data[2] as u16;
        let payload_unit_start = data[1] & 0x40 != 0;
        let transport_error = data[1] & 0x80 != 0;
        let scrambling_control = (data[3] >> 6) & 0x03;
        let adaptation_field_control = (data[3] >> 4) & 0x03;
        let continuity_counter = data[3] & 0x0F;

        let mut pcr = None;
        let mut payload_offset = 4;

        if adaptation_field_control & 0x02 != 0 {
            let af_length = data[4] as usize;
            payload_offset = 5 + af_length;

            if af_length > 0 {
                let flags = data[5];
                // PCR flag; the 6-byte PCR field needs af_length >= 7.
                if flags & 0x10 != 0 && af_length >= 7 {
                    let base = ((data[6] as i64) << 25)
                        | ((data[7] as i64) << 17)
                        | ((data[8] as i64) << 9)
                        | ((data[9] as i64) << 1)
                        | ((data[10] as i64) >> 7);
                    // The 9-bit/27 MHz extension in data[10..12] is dropped;
                    // gating compares 33-bit bases at 90 kHz.
                    pcr = Some(base);
                }
            }
        }

        Ok(TsPacket {
            data,
            pid,
            payload_unit_start,
            transport_error,
            scrambling_control,
            adaptation_field_control,
            continuity_counter,
            pcr,
            payload_offset,
        })
    }

    /// Packet Identifier (13 bits).
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Payload unit start indicator.
    pub fn pusi(&self) -> bool {
        self.payload_unit_start
    }

    /// Transport error indicator.
    pub fn transport_error(&self) -> bool {
        self.transport_error
    }

    /// Continuity counter (4 bits).
    pub fn continuity_counter(&self) -> u8 {
        self.continuity_counter
    }

    /// Check if the packet is scrambled.
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }

    /// Check if the packet carries a payload.
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }

    /// PCR base (33 bits at 90 kHz), when the adaptation field carries one.
    pub fn pcr(&self) -> Option<i64> {
        self.pcr
    }

    /// Payload bytes (empty when the adaptation field fills the packet).
    pub fn payload(&self) -> &[u8] {
        if self.has_payload() && self.payload_offset < TS_PACKET_SIZE {
            &self.data[self.payload_offset..]
        } else {
            &[]
        }
    }

    /// The full 188-byte packet.
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }
}
