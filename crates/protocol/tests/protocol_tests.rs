//! Integration tests for the pigpio wire protocol
//!
//! Covers framing, result classification and reassembly under arbitrary
//! chunking of the byte stream.
//!
//! Run with: `cargo test -p protocol`

use bytes::Bytes;
use proptest::prelude::*;
use protocol::commands::{BR1, HWVER, I2CRD, NB, PIGPV, READ, SPIX, TICK, WRITE};
use protocol::{
    NotificationRecord, RecordBuffer, ResponseBuffer, ResponseFrame, ResponseResult,
    decode_response, encode_response,
};

fn header(words: [u32; 4]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Feed `wire` to a response buffer in the given chunk sizes
fn reassemble(wire: &[u8], chunk_sizes: &[usize]) -> (Vec<ResponseFrame>, ResponseBuffer) {
    let mut buf = ResponseBuffer::new();
    let mut frames = Vec::new();
    let mut offset = 0;
    let mut sizes = chunk_sizes.iter().cycle();

    while offset < wire.len() {
        let size = (*sizes.next().unwrap()).min(wire.len() - offset);
        buf.push(&wire[offset..offset + size]);
        offset += size;
        while let Some(frame) = buf.next_frame().unwrap() {
            frames.push(frame);
        }
    }
    (frames, buf)
}

mod classification {
    use super::*;

    #[test]
    fn test_hwver_all_ones_is_unsigned() {
        let (frame, used) = decode_response(&header([HWVER, 0, 0, 0xFFFF_FFFF]))
            .unwrap()
            .unwrap();
        assert_eq!(used, 16);
        assert_eq!(frame.result, ResponseResult::Value(0xFFFF_FFFF));
    }

    #[test]
    fn test_same_word_is_error_for_other_commands() {
        let (frame, _) = decode_response(&header([READ, 0, 0, 0xFFFF_FFFF]))
            .unwrap()
            .unwrap();
        assert_eq!(frame.result, ResponseResult::Error(-1));
    }

    #[test]
    fn test_tick_wraps_above_i32() {
        let tick = 0x8000_0001;
        let (frame, _) = decode_response(&header([TICK, 0, 0, tick])).unwrap().unwrap();
        assert_eq!(frame.result, ResponseResult::Value(tick));
    }

    #[test]
    fn test_pigpv_and_br1() {
        for (cmd, value) in [(PIGPV, 79), (BR1, 0x0FFF_FFFF)] {
            let (frame, _) = decode_response(&header([cmd, 0, 0, value])).unwrap().unwrap();
            assert_eq!(frame.result, ResponseResult::Value(value));
        }
    }
}

mod reassembly {
    use super::*;

    #[test]
    fn test_byte_at_a_time() {
        let mut wire = header([WRITE, 4, 1, 0]);
        wire.extend(header([I2CRD, 1, 2, 2]));
        wire.extend_from_slice(&[0x55, 0x66]);
        wire.extend(header([NB, 0, 0, 0]));

        let (frames, rest) = reassemble(&wire, &[1]);
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[1].result,
            ResponseResult::Extended(Bytes::from_static(&[0x55, 0x66]))
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_trailing_partial_is_held() {
        let mut wire = header([READ, 4, 0, 1]);
        wire.extend(&header([READ, 5, 0, 0])[..9]);

        let (frames, rest) = reassemble(&wire, &[25]);
        assert_eq!(frames.len(), 1);
        assert_eq!(rest.len(), 9);
    }
}

fn arb_frame() -> impl Strategy<Value = ResponseFrame> {
    let plain = (any::<u32>(), 0u32..=i32::MAX as u32).prop_map(|(p1, v)| ResponseFrame {
        command: READ,
        p1,
        p2: 0,
        result: ResponseResult::Value(v),
    });
    let error = (any::<u32>(), i32::MIN..0).prop_map(|(p1, code)| ResponseFrame {
        command: WRITE,
        p1,
        p2: 1,
        result: ResponseResult::Error(code),
    });
    let never_fail = any::<u32>().prop_map(|v| ResponseFrame {
        command: TICK,
        p1: 0,
        p2: 0,
        result: ResponseResult::Value(v),
    });
    let extended = (
        prop::sample::select(vec![I2CRD, SPIX]),
        prop::collection::vec(any::<u8>(), 1..64),
    )
        .prop_map(|(command, ext)| ResponseFrame {
            command,
            p1: 3,
            p2: ext.len() as u32,
            result: ResponseResult::Extended(Bytes::from(ext)),
        });
    prop_oneof![plain, error, never_fail, extended]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Any chunking of a frame sequence yields the same frames in order
    #[test]
    fn prop_chunking_preserves_frames(
        frames in prop::collection::vec(arb_frame(), 1..20),
        chunk_sizes in prop::collection::vec(1usize..40, 1..8),
    ) {
        let wire: Vec<u8> = frames.iter().flat_map(|f| encode_response(f).to_vec()).collect();
        let (decoded, rest) = reassemble(&wire, &chunk_sizes);
        prop_assert_eq!(decoded, frames);
        prop_assert!(rest.is_empty());
    }

    /// A truncated tail never yields a frame and is never consumed
    #[test]
    fn prop_incomplete_tail_is_untouched(frame in arb_frame(), cut in 0usize..16) {
        let wire = encode_response(&frame);
        let cut = cut.min(wire.len() - 1);
        let mut buf = ResponseBuffer::new();
        buf.push(&wire[..cut]);
        prop_assert!(buf.next_frame().unwrap().is_none());
        prop_assert_eq!(buf.len(), cut);
    }

    /// Record reassembly leaves less than one record behind
    #[test]
    fn prop_record_remainder_bounded(
        levels in prop::collection::vec(any::<u32>(), 0..30),
        chunk in 1usize..50,
    ) {
        let wire: Vec<u8> = levels
            .iter()
            .enumerate()
            .flat_map(|(i, l)| NotificationRecord { seq: i as u16, flags: 0, tick: i as u32, levels: *l }.encode())
            .collect();

        let mut buf = RecordBuffer::new();
        let mut seen = Vec::new();
        for piece in wire.chunks(chunk) {
            seen.extend(buf.drain_chunk(piece).into_iter().map(|r| r.levels));
            prop_assert!(buf.len() < protocol::RECORD_SIZE);
        }
        prop_assert_eq!(seen, levels);
        prop_assert!(buf.is_empty());
    }

    /// Decoding arbitrary bytes never panics
    #[test]
    fn prop_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_response(&data);
    }
}
