use bytes::Bytes;

use crate::packet_header::PacketHeader;
use crate::seq::SeqNumber;

/// Where an arriving data frame landed relative to the contiguous run.
#[derive(Debug, PartialEq, Eq)]
pub enum Insertion {
    /// The frame extended the contiguous prefix (possibly splicing in
    ///  previously buffered out-of-order frames); acknowledge with the new
    ///  cumulative number.
    InOrder { ack_number: SeqNumber },
    /// The frame was buffered ahead of a gap, or dropped as an exact
    ///  duplicate; the latest cumulative ACK must be repeated.
    OutOfOrder,
    /// The frame is already covered by the cumulative ACK; repeat it.
    Behind,
}

/// Ordered buffer of received data frames, indexed by wrap-around sequence
///  number.
///
/// The buffer is a sequence-ordered vec with an integer cursor marking the
///  insertion point one past the last packet of the contiguous prefix. An
///  index survives insertions at its own position, which a list iterator
///  would not.
pub struct ReassemblyBuffer {
    packets: Vec<(PacketHeader, Bytes)>,
    inorder_cursor: usize,
    expect_seq_number: SeqNumber,
}

impl ReassemblyBuffer {
    pub fn new(expect_seq_number: SeqNumber) -> ReassemblyBuffer {
        ReassemblyBuffer {
            packets: Vec::new(),
            inorder_cursor: 0,
            expect_seq_number,
        }
    }

    /// The next in-order sequence number the peer has to produce.
    pub fn expect_seq_number(&self) -> SeqNumber {
        self.expect_seq_number
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn insert(&mut self, header: PacketHeader, payload: Bytes) -> Insertion {
        let seq = header.seq_number;

        if seq == self.expect_seq_number {
            self.packets.insert(self.inorder_cursor, (header, payload));
            let ack_number = self.extend_contiguous_run();
            self.expect_seq_number = ack_number;
            Insertion::InOrder { ack_number }
        } else if seq.is_after(self.expect_seq_number) {
            self.insert_out_of_order(header, payload);
            Insertion::OutOfOrder
        } else {
            Insertion::Behind
        }
    }

    /// Starting at the just-inserted packet, walk over successors as long as
    ///  each one starts exactly where its predecessor ended. Returns the new
    ///  cumulative ACK and leaves the cursor one past the last chained packet.
    fn extend_contiguous_run(&mut self) -> SeqNumber {
        let mut last = self.inorder_cursor;
        while last + 1 < self.packets.len() {
            let end_of_last = self.end_seq(last);
            if self.packets[last + 1].0.seq_number == end_of_last {
                last += 1;
            } else {
                break;
            }
        }
        self.inorder_cursor = last + 1;
        self.end_seq(last)
    }

    /// Linear search forward from the cursor; insert before the first packet
    ///  with a strictly larger wrap-adjusted sequence, drop exact duplicates.
    fn insert_out_of_order(&mut self, header: PacketHeader, payload: Bytes) {
        let seq = header.seq_number;
        let mut index = self.inorder_cursor;
        while index < self.packets.len() {
            let stored = self.packets[index].0.seq_number;
            if stored == seq {
                return;
            }
            if stored.is_after(seq) {
                break;
            }
            index += 1;
        }
        self.packets.insert(index, (header, payload));
    }

    fn end_seq(&self, index: usize) -> SeqNumber {
        let (header, payload) = &self.packets[index];
        header.seq_number.plus(payload.len())
    }

    /// All buffered payloads concatenated in buffer order. Gaps left by an
    ///  abandoned session simply vanish; on a completed session the buffer is
    ///  contiguous and this is the transferred byte stream.
    pub fn assemble(&self) -> Vec<u8> {
        let mut content = Vec::with_capacity(self.packets.iter().map(|(_, p)| p.len()).sum());
        for (_, payload) in &self.packets {
            content.extend_from_slice(payload);
        }
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_frame(seq: u16, payload: &[u8]) -> (PacketHeader, Bytes) {
        let header = PacketHeader::ack(SeqNumber::from_raw(seq), SeqNumber::from_raw(0));
        (header, Bytes::copy_from_slice(payload))
    }

    fn in_order_ack(buffer: &mut ReassemblyBuffer, seq: u16, payload: &[u8]) -> u16 {
        let (header, bytes) = data_frame(seq, payload);
        match buffer.insert(header, bytes) {
            Insertion::InOrder { ack_number } => ack_number.to_raw(),
            other => panic!("expected in-order insertion, got {:?}", other),
        }
    }

    #[test]
    fn test_in_order_sequence() {
        let mut buffer = ReassemblyBuffer::new(SeqNumber::from_raw(100));

        assert_eq!(in_order_ack(&mut buffer, 100, b"abc"), 103);
        assert_eq!(in_order_ack(&mut buffer, 103, b"de"), 105);
        assert_eq!(in_order_ack(&mut buffer, 105, b"f"), 106);

        assert_eq!(buffer.expect_seq_number().to_raw(), 106);
        assert_eq!(buffer.assemble(), b"abcdef");
    }

    #[test]
    fn test_gap_is_bridged_when_missing_frame_arrives() {
        let mut buffer = ReassemblyBuffer::new(SeqNumber::from_raw(0));

        assert_eq!(in_order_ack(&mut buffer, 0, b"aaa"), 3);

        // frame at 6 arrives before frame at 3
        let (header, payload) = data_frame(6, b"ccc");
        assert_eq!(buffer.insert(header, payload), Insertion::OutOfOrder);
        assert_eq!(buffer.expect_seq_number().to_raw(), 3);

        // the gap filler chains straight through the buffered frame
        assert_eq!(in_order_ack(&mut buffer, 3, b"bbb"), 9);
        assert_eq!(buffer.assemble(), b"aaabbbccc");
    }

    #[test]
    fn test_out_of_order_frames_kept_sorted() {
        let mut buffer = ReassemblyBuffer::new(SeqNumber::from_raw(0));

        for (seq, payload) in [(9u16, b"dd".as_ref()), (3, b"bbb"), (6, b"ccc")] {
            let (header, bytes) = data_frame(seq, payload);
            assert_eq!(buffer.insert(header, bytes), Insertion::OutOfOrder);
        }

        assert_eq!(in_order_ack(&mut buffer, 0, b"aaa"), 11);
        assert_eq!(buffer.assemble(), b"aaabbbcccdd");
    }

    #[test]
    fn test_duplicate_out_of_order_dropped() {
        let mut buffer = ReassemblyBuffer::new(SeqNumber::from_raw(0));

        let (header, payload) = data_frame(5, b"xx");
        assert_eq!(buffer.insert(header, payload), Insertion::OutOfOrder);

        let (header, payload) = data_frame(5, b"xx");
        assert_eq!(buffer.insert(header, payload), Insertion::OutOfOrder);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_behind_not_inserted() {
        let mut buffer = ReassemblyBuffer::new(SeqNumber::from_raw(0));
        assert_eq!(in_order_ack(&mut buffer, 0, b"abc"), 3);

        // retransmission of the frame just acknowledged
        let (header, payload) = data_frame(0, b"abc");
        assert_eq!(buffer.insert(header, payload), Insertion::Behind);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.expect_seq_number().to_raw(), 3);
    }

    #[test]
    fn test_chain_across_sequence_wrap() {
        let start = crate::seq::MAX_SEQ - 2;
        let mut buffer = ReassemblyBuffer::new(SeqNumber::from_raw(start));

        // 25598 + 3 wraps to 1
        assert_eq!(in_order_ack(&mut buffer, start, b"xyz"), 1);
        assert_eq!(in_order_ack(&mut buffer, 1, b"w"), 2);
        assert_eq!(buffer.assemble(), b"xyzw");
    }

    #[test]
    fn test_cursor_survives_insertion_at_cursor_position() {
        let mut buffer = ReassemblyBuffer::new(SeqNumber::from_raw(0));

        // ahead-of-gap frame lands exactly at the cursor position
        let (header, payload) = data_frame(4, b"bb");
        assert_eq!(buffer.insert(header, payload), Insertion::OutOfOrder);

        // the in-order frame still inserts in front of it and chains over it
        assert_eq!(in_order_ack(&mut buffer, 0, b"aaaa"), 6);
        assert_eq!(buffer.assemble(), b"aaaabb");
    }
}
