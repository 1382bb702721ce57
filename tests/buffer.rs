use eventcore::{DynamicBuffer, Error};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_write_spans_whole_chunks() {
    let mut buffer = DynamicBuffer::new(100).unwrap();
    let data = pattern(315);

    buffer.write(&data).unwrap();
    assert_eq!(buffer.len(), 315);
    assert_eq!(buffer.chunk_count(), 4);

    let mut out = vec![0u8; 315];
    assert_eq!(buffer.read(&mut out).unwrap(), 315);
    assert_eq!(out, data);
    assert_eq!(buffer.len(), 0);
    assert!(buffer.is_empty());
}

#[test]
fn test_reuse_after_drain() {
    let mut buffer = DynamicBuffer::new(100).unwrap();
    let data = pattern(315);

    for _ in 0..3 {
        buffer.write(&data).unwrap();
        let mut out = vec![0u8; 400];
        let n = buffer.read(&mut out).unwrap();

        assert_eq!(&out[..n], &data[..]);
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.chunk_count(), 1);
    }
}

#[test]
fn test_overflow_leaves_buffer_untouched() {
    let mut buffer = DynamicBuffer::with_limit(16, 40).unwrap();
    buffer.write(&pattern(30)).unwrap();
    let chunks = buffer.chunk_count();

    assert!(buffer.will_overflow(11));
    assert!(!buffer.will_overflow(10));

    let err = buffer.write(&pattern(11)).unwrap_err();
    assert!(matches!(
        err,
        Error::Overflow {
            requested: 41,
            limit: 40
        }
    ));
    assert_eq!(buffer.len(), 30);
    assert_eq!(buffer.chunk_count(), chunks);
    assert!(!buffer.is_locked());

    let mut out = vec![0u8; 64];
    assert_eq!(buffer.read(&mut out).unwrap(), 30);
    assert_eq!(&out[..30], &pattern(30)[..]);
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    assert!(matches!(
        DynamicBuffer::new(0),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_second_lock_is_rejected() {
    let mut buffer = DynamicBuffer::new(8).unwrap();
    buffer.write(b"abcdef").unwrap();

    drop(buffer.read_lock(4).unwrap());
    assert!(buffer.is_locked());
    assert!(matches!(buffer.read_lock(1), Err(Error::Locked)));
    assert!(matches!(buffer.write_lock(1), Err(Error::Locked)));
    assert!(matches!(buffer.clear(), Err(Error::Locked)));

    buffer.read_unlock(2).unwrap();
    assert!(!buffer.is_locked());
    assert_eq!(buffer.len(), 4);
}

#[test]
fn test_unlock_protocol_errors() {
    let mut buffer = DynamicBuffer::new(8).unwrap();

    assert!(matches!(buffer.read_unlock(0), Err(Error::NotLocked)));
    assert!(matches!(buffer.write_unlock(0), Err(Error::NotLocked)));

    drop(buffer.write_lock(5).unwrap());
    assert!(matches!(buffer.read_unlock(0), Err(Error::NotLocked)));
    assert!(matches!(
        buffer.write_unlock(6),
        Err(Error::UnlockExceeds {
            locked: 5,
            requested: 6
        })
    ));

    // The failed unlock keeps the lock in place.
    buffer.write_unlock(0).unwrap();
    assert_eq!(buffer.len(), 0);
}

#[test]
fn test_read_lock_covers_at_most_len() {
    let mut buffer = DynamicBuffer::new(4).unwrap();
    buffer.write(b"0123456789").unwrap();

    let spans = buffer.read_lock(6).unwrap();
    let seen: Vec<u8> = spans.iter().flat_map(|s| s.iter().copied()).collect();
    assert_eq!(seen, b"012345".to_vec());
    drop(spans);
    buffer.read_unlock(6).unwrap();

    let spans = buffer.read_lock(100).unwrap();
    let seen: Vec<u8> = spans.iter().flat_map(|s| s.iter().copied()).collect();
    assert_eq!(seen, b"6789".to_vec());
    drop(spans);
    buffer.read_unlock(0).unwrap();
    assert_eq!(buffer.len(), 4);
}

#[test]
fn test_partial_write_commit() {
    let mut buffer = DynamicBuffer::new(4).unwrap();

    let mut spans = buffer.write_lock(10).unwrap();
    assert_eq!(spans.iter().map(|s| s.len()).sum::<usize>(), 10);
    spans[0].copy_from_slice(b"abcd");
    spans[1][..2].copy_from_slice(b"ef");
    drop(spans);

    buffer.write_unlock(6).unwrap();
    assert_eq!(buffer.len(), 6);
    assert_eq!(buffer.chunk_count(), 2);

    buffer.write(b"gh").unwrap();
    let mut out = [0u8; 8];
    assert_eq!(buffer.read(&mut out).unwrap(), 8);
    assert_eq!(&out, b"abcdefgh");
}

proptest! {
    #[test]
    fn prop_round_trip_any_chunk_size(
        chunk_size in 1usize..64,
        writes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..8),
    ) {
        let mut buffer = DynamicBuffer::new(chunk_size).unwrap();
        let mut expected = Vec::new();

        for data in &writes {
            buffer.write(data).unwrap();
            expected.extend_from_slice(data);
        }
        prop_assert_eq!(buffer.len(), expected.len());

        let mut out = vec![0u8; expected.len()];
        let n = buffer.read(&mut out).unwrap();
        prop_assert_eq!(n, expected.len());
        prop_assert_eq!(out, expected);
        prop_assert!(buffer.is_empty());
    }
}
