//! Packet source and sink plumbing.
//!
//! The pipeline is synchronous: a reader yields packets one at a time and a
//! sink consumes them until it signals the terminal condition by returning
//! `Ok(false)` from `handle_packet`.

use std::io::{self, Read, Write};

use bytes::Bytes;
use log::{info, warn};
use serde::Serialize;

use crate::error::PipelineError;
use crate::ts::{TsPacket, SYNC_BYTE, TS_PACKET_SIZE};

/// Downstream consumer of TS packets.
///
/// `handle_packet` returning `Ok(false)` tells the upstream to stop feeding;
/// no further packets will be forwarded after that.
pub trait PacketSink {
    /// Called once before the first packet.
    fn start(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Called once after the last packet.
    fn end(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Consume one packet; `Ok(false)` is the terminal signal.
    fn handle_packet(&mut self, packet: &TsPacket) -> Result<bool, PipelineError>;
}

/// Reads 188-byte TS packets from a byte stream, re-syncing on lost framing.
pub struct PacketReader<R> {
    reader: R,
    synced: bool,
}

impl<R: Read> PacketReader<R> {
    /// Wrap a byte stream.
    pub fn new(reader: R) -> Self {
        PacketReader {
            reader,
            synced: false,
        }
    }

    /// Read the next packet; `None` at end of stream.
    pub fn next_packet(&mut self) -> Result<Option<TsPacket>, PipelineError> {
        let mut buf = [0u8; TS_PACKET_SIZE];
        loop {
            if !self.find_sync()? {
                return Ok(None);
            }
            buf[0] = SYNC_BYTE;
            if !read_full(&mut self.reader, &mut buf[1..])? {
                return Ok(None);
            }

            match TsPacket::parse(Bytes::copy_from_slice(&buf)) {
                Ok(packet) => {
                    self.synced = true;
                    return Ok(Some(packet));
                }
                Err(e) => {
                    warn!("Dropping malformed packet: {}", e);
                    self.synced = false;
                }
            }
        }
    }

    fn find_sync(&mut self) -> Result<bool, PipelineError> {
        let mut byte = [0u8; 1];
        loop {
            if self.reader.read(&mut byte)? == 0 {
                return Ok(false);
            }
            if byte[0] == SYNC_BYTE {
                return Ok(true);
            }
            if self.synced {
                warn!("Lost TS sync, scanning for sync byte");
                self.synced = false;
            }
        }
    }
}

/// Read until `buf` is full; false when the stream ends first.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, io::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled > 0 {
                warn!("Stream ended inside a packet, dropping {} bytes", filled + 1);
            }
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

/// Pump packets from a reader into a sink until terminal or end of stream.
pub fn feed_packets<R: Read, S: PacketSink>(
    reader: &mut PacketReader<R>,
    sink: &mut S,
) -> Result<(), PipelineError> {
    sink.start()?;
    while let Some(packet) = reader.next_packet()? {
        if !sink.handle_packet(&packet)? {
            info!("Sink went terminal, stop feeding");
            break;
        }
    }
    sink.end()
}

/// Sink that forwards raw packet bytes into a writer.
pub struct WriteSink<W: Write> {
    writer: io::BufWriter<W>,
}

impl<W: Write> WriteSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        WriteSink {
            writer: io::BufWriter::new(writer),
        }
    }
}

impl<W: Write> PacketSink for WriteSink<W> {
    fn end(&mut self) -> Result<(), PipelineError> {
        self.writer.flush()?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: &TsPacket) -> Result<bool, PipelineError> {
        self.writer.write_all(packet.as_bytes())?;
        Ok(true)
    }
}

/// Writes one compact JSON object per line, flushing after each record so
/// external consumers see it immediately.
pub struct JsonlWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonlWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        JsonlWriter { writer }
    }

    /// Serialize one record followed by a newline.
    pub fn emit<T: Serialize>(&mut self, record: &T) -> Result<(), PipelineError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
