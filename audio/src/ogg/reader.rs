//! Packet-oriented OGG reader.
//!
//! Pages are parsed per RFC 3533 and packets are reassembled from lacing
//! values, including packets straddling page boundaries via continuation
//! pages. Chained streams are supported: a BOS page resets the assembler.

use std::io::{self, Read};

/// One packet recovered from the container.
#[derive(Debug, Clone)]
pub struct OggPacket {
    /// Packet bytes.
    pub data: Vec<u8>,
    /// Granule position of the page the packet completed on.
    pub granule: i64,
    /// Serial number of the logical stream.
    pub serial: u32,
}

/// Reads packets from an OGG byte stream.
pub struct PacketReader<R: Read> {
    reader: R,
    pending: Vec<u8>,
    pending_open: bool,
    queue: std::collections::VecDeque<OggPacket>,
    eof: bool,
}

impl<R: Read> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            pending_open: false,
            queue: std::collections::VecDeque::new(),
            eof: false,
        }
    }

    /// Returns the next non-empty packet, or `None` at end of input.
    pub fn read_packet(&mut self) -> io::Result<Option<OggPacket>> {
        loop {
            if let Some(p) = self.queue.pop_front() {
                return Ok(Some(p));
            }
            if self.eof {
                return Ok(None);
            }
            self.read_page()?;
        }
    }

    fn read_page(&mut self) -> io::Result<()> {
        let mut header = [0u8; 27];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.eof = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if &header[..4] != b"OggS" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid OGG capture pattern",
            ));
        }

        let header_type = header[5];
        let granule = i64::from_le_bytes(header[6..14].try_into().unwrap());
        let serial = u32::from_le_bytes(header[14..18].try_into().unwrap());
        let n_segments = header[26] as usize;

        let mut lacing = vec![0u8; n_segments];
        self.reader.read_exact(&mut lacing)?;
        let body_len: usize = lacing.iter().map(|&v| v as usize).sum();
        let mut body = vec![0u8; body_len];
        self.reader.read_exact(&mut body)?;

        let is_bos = header_type & 0x02 != 0;
        let is_continuation = header_type & 0x01 != 0;

        // A fresh page while a packet is still open means the tail of the
        // previous packet was lost; drop the partial data. A BOS page starts
        // a new chained stream and always resets.
        if is_bos || (!is_continuation && self.pending_open) {
            self.pending.clear();
            self.pending_open = false;
        }
        // A continuation page without an open packet continues a packet we
        // never saw the start of; skip its leading continued segments.
        let mut skipping = is_continuation && !self.pending_open;

        let mut offset = 0usize;
        for &value in &lacing {
            let segment = &body[offset..offset + value as usize];
            offset += value as usize;

            if skipping {
                if value < 255 {
                    skipping = false;
                }
                continue;
            }

            self.pending.extend_from_slice(segment);
            self.pending_open = true;
            if value < 255 {
                let data = std::mem::take(&mut self.pending);
                self.pending_open = false;
                if !data.is_empty() {
                    self.queue.push_back(OggPacket {
                        data,
                        granule,
                        serial,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Iterator over the packets of an OGG stream.
pub struct PacketIter<R: Read> {
    reader: PacketReader<R>,
    done: bool,
}

/// Returns an iterator over the packets in `reader`.
pub fn read_packets<R: Read>(reader: R) -> PacketIter<R> {
    PacketIter {
        reader: PacketReader::new(reader),
        done: false,
    }
}

impl<R: Read> Iterator for PacketIter<R> {
    type Item = io::Result<OggPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_packet() {
            Ok(Some(p)) => Some(Ok(p)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
