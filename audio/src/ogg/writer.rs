//! Opus-in-OGG writer.
//!
//! Writes an OpusHead identification page, an OpusTags comment page, one
//! page per audio packet (with continuation pages for oversized packets),
//! and an EOS page on close. Granule positions count 48 kHz samples per
//! RFC 7845.

use std::io::{self, Write};

use super::page_crc;

const HEADER_SIZE: usize = 27;
const FLAG_CONTINUATION: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;
// 80ms at 48kHz, RFC 7845 §5.1.
const PRE_SKIP: u16 = 3840;

/// Streams Opus packets into a single-stream OGG container.
pub struct OpusWriter<W: Write> {
    writer: W,
    serial: u32,
    sequence: u32,
    granule: i64,
    closed: bool,
}

impl<W: Write> OpusWriter<W> {
    /// Creates the writer and emits the OpusHead and OpusTags pages.
    pub fn new(writer: W, sample_rate: u32, channels: u8) -> io::Result<Self> {
        Self::with_serial(writer, sample_rate, channels, 1)
    }

    /// Same as [`new`](Self::new) with an explicit stream serial number.
    pub fn with_serial(writer: W, sample_rate: u32, channels: u8, serial: u32) -> io::Result<Self> {
        let mut w = Self {
            writer,
            serial,
            sequence: 0,
            granule: 0,
            closed: false,
        };

        let mut head = Vec::with_capacity(19);
        head.extend_from_slice(b"OpusHead");
        head.push(1); // version
        head.push(channels);
        head.extend_from_slice(&PRE_SKIP.to_le_bytes());
        head.extend_from_slice(&sample_rate.to_le_bytes());
        head.extend_from_slice(&0u16.to_le_bytes()); // output gain
        head.push(0); // channel mapping family
        w.write_packet_pages(&head, FLAG_BOS, 0)?;

        let vendor = b"talkbox";
        let mut tags = Vec::with_capacity(8 + 4 + vendor.len() + 4);
        tags.extend_from_slice(b"OpusTags");
        tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        tags.extend_from_slice(vendor);
        tags.extend_from_slice(&0u32.to_le_bytes()); // no user comments
        w.write_packet_pages(&tags, 0, 0)?;

        Ok(w)
    }

    /// Writes one Opus packet. `duration_48k` is the packet duration in
    /// 48 kHz samples (960 for a 20 ms frame).
    pub fn write_frame(&mut self, frame: &[u8], duration_48k: i64) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "writer closed"));
        }
        self.granule += duration_48k;
        let granule = self.granule;
        self.write_packet_pages(frame, 0, granule)
    }

    /// Current granule position (48 kHz samples written).
    pub fn granule(&self) -> i64 {
        self.granule
    }

    /// Writes the EOS page and flushes. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let granule = self.granule;
        self.write_packet_pages(&[], FLAG_EOS, granule)?;
        self.writer.flush()
    }

    // Emits the pages for one packet. Packets needing more than 255 lacing
    // values straddle onto continuation pages; only the final page carries
    // the granule position.
    fn write_packet_pages(&mut self, payload: &[u8], flags: u8, granule: i64) -> io::Result<()> {
        let mut lacing: Vec<u8> = Vec::with_capacity(payload.len() / 255 + 1);
        let full = payload.len() / 255;
        lacing.resize(full, 255);
        lacing.push((payload.len() % 255) as u8);

        let mut offset = 0usize;
        let mut first = true;
        let mut remaining = lacing.as_slice();
        while !remaining.is_empty() {
            let take = remaining.len().min(255);
            let (seg, rest) = remaining.split_at(take);
            remaining = rest;

            let body_len: usize = seg.iter().map(|&v| v as usize).sum();
            let body = &payload[offset..offset + body_len];
            offset += body_len;

            let last = remaining.is_empty();
            let mut header_type = flags;
            if !first {
                header_type |= FLAG_CONTINUATION;
            }
            let page_granule = if last { granule } else { -1 };
            self.write_page(header_type, page_granule, seg, body)?;
            first = false;
        }
        Ok(())
    }

    fn write_page(
        &mut self,
        header_type: u8,
        granule: i64,
        lacing: &[u8],
        body: &[u8],
    ) -> io::Result<()> {
        let mut page = Vec::with_capacity(HEADER_SIZE + lacing.len() + body.len());
        page.extend_from_slice(b"OggS");
        page.push(0); // version
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&self.serial.to_le_bytes());
        page.extend_from_slice(&self.sequence.to_le_bytes());
        page.extend_from_slice(&[0u8; 4]); // crc placeholder
        page.push(lacing.len() as u8);
        page.extend_from_slice(lacing);
        page.extend_from_slice(body);

        let crc = page_crc(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());

        self.sequence += 1;
        self.writer.write_all(&page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::read_packets;
    use std::io::Cursor;

    #[test]
    fn produces_ogg_pages() {
        let mut buf = Vec::new();
        let mut w = OpusWriter::new(&mut buf, 48_000, 1).unwrap();
        w.write_frame(&[0xf8, 0x01, 0x02], 960).unwrap();
        w.write_frame(&[0xf8, 0x03, 0x04], 960).unwrap();
        assert_eq!(w.granule(), 1920);
        w.close().unwrap();

        assert_eq!(&buf[..4], b"OggS");
    }

    #[test]
    fn round_trip_through_reader() {
        let mut buf = Vec::new();
        let mut w = OpusWriter::new(&mut buf, 48_000, 1).unwrap();
        w.write_frame(&[0xf8, 0x01], 960).unwrap();
        w.write_frame(&[0xf8, 0x02], 960).unwrap();
        w.write_frame(&[0xf8, 0x03], 960).unwrap();
        w.close().unwrap();

        let packets: Vec<_> = read_packets(Cursor::new(buf))
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        // OpusHead and OpusTags are yielded too; audio packets follow.
        let audio: Vec<_> = packets
            .into_iter()
            .filter(|p| !crate::ogg::is_opus_header(&p.data))
            .collect();
        assert_eq!(audio.len(), 3);
        assert_eq!(audio[0].data, vec![0xf8, 0x01]);
        assert_eq!(audio[2].data, vec![0xf8, 0x03]);
        assert_eq!(audio[2].granule, 2880);
    }

    #[test]
    fn oversized_packet_straddles_pages() {
        // 70_000 bytes needs 275 lacing values, so the packet spans two
        // pages with a continuation flag on the second.
        let payload: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();

        let mut buf = Vec::new();
        let mut w = OpusWriter::new(&mut buf, 48_000, 1).unwrap();
        w.write_frame(&payload, 960).unwrap();
        w.close().unwrap();

        let packets: Vec<_> = read_packets(Cursor::new(buf))
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        let audio: Vec<_> = packets
            .into_iter()
            .filter(|p| !crate::ogg::is_opus_header(&p.data))
            .collect();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].data, payload);
    }

    #[test]
    fn close_is_idempotent() {
        let mut buf = Vec::new();
        let mut w = OpusWriter::new(&mut buf, 48_000, 1).unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert!(w.write_frame(&[0xf8], 960).is_err());
    }
}
