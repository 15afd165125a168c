use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::seq::SeqNumber;

/// The fixed 12-byte header transmitted at the start of every datagram.
///
/// Numeric fields are little-endian on the wire; each flag is a single byte
///  (0 or 1), followed by five bytes of zero padding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub seq_number: SeqNumber,
    pub ack_number: SeqNumber,
    pub ack: bool,
    pub syn: bool,
    pub fin: bool,
}

impl PacketHeader {
    pub const SERIALIZED_LEN: usize = 12;

    pub fn syn(seq_number: SeqNumber) -> PacketHeader {
        PacketHeader {
            seq_number,
            ack_number: SeqNumber::from_raw(0),
            ack: false,
            syn: true,
            fin: false,
        }
    }

    pub fn syn_ack(seq_number: SeqNumber, ack_number: SeqNumber) -> PacketHeader {
        PacketHeader {
            seq_number,
            ack_number,
            ack: true,
            syn: true,
            fin: false,
        }
    }

    /// Header of a data frame or of a payload-free cumulative ACK.
    pub fn ack(seq_number: SeqNumber, ack_number: SeqNumber) -> PacketHeader {
        PacketHeader {
            seq_number,
            ack_number,
            ack: true,
            syn: false,
            fin: false,
        }
    }

    pub fn fin(seq_number: SeqNumber) -> PacketHeader {
        PacketHeader {
            seq_number,
            ack_number: SeqNumber::from_raw(0),
            ack: false,
            syn: false,
            fin: true,
        }
    }

    pub fn fin_ack(seq_number: SeqNumber, ack_number: SeqNumber) -> PacketHeader {
        PacketHeader {
            seq_number,
            ack_number,
            ack: true,
            syn: false,
            fin: true,
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.seq_number.to_raw());
        buf.put_u16_le(self.ack_number.to_raw());
        buf.put_u8(self.ack as u8);
        buf.put_u8(self.syn as u8);
        buf.put_u8(self.fin as u8);
        buf.put_bytes(0, 5);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PacketHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!(
                "datagram of {} bytes is shorter than the header",
                buf.remaining()
            );
        }

        let seq_number = SeqNumber::from_raw(buf.get_u16_le());
        let ack_number = SeqNumber::from_raw(buf.get_u16_le());
        let ack = buf.get_u8() != 0;
        let syn = buf.get_u8() != 0;
        let fin = buf.get_u8() != 0;
        buf.advance(5);

        Ok(PacketHeader {
            seq_number,
            ack_number,
            ack,
            syn,
            fin,
        })
    }
}

/// A complete wire frame: header followed by the (possibly empty) payload.
pub fn encode_frame(header: &PacketHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PacketHeader::SERIALIZED_LEN + payload.len());
    header.ser(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}
