// Tests for the per-track audio buffer
//
// These verify the append-order and accounting invariants: total sample
// count equals the sum of chunk sizes in arrival order, dropped chunks are
// counted rather than hidden, and a mic hot-swap keeps writing into one
// continuous buffer.

use recscribe::SharedBuffer;

#[test]
fn test_append_preserves_arrival_order() {
    let buffer = SharedBuffer::new();

    buffer.push_from_callback(&[0.1, 0.2]);
    buffer.push_from_callback(&[0.3]);
    buffer.push_from_callback(&[0.4, 0.5, 0.6]);

    assert_eq!(buffer.total_samples(), 6);
    assert_eq!(buffer.dropped_chunks(), 0);

    let samples = buffer.take().finish();
    assert_eq!(samples, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
}

#[test]
fn test_total_samples_matches_sum_of_chunk_sizes() {
    let buffer = SharedBuffer::new();

    let chunk_sizes = [512usize, 1024, 256, 1024, 64];
    for size in chunk_sizes {
        buffer.push_from_callback(&vec![0.0f32; size]);
    }

    let expected: usize = chunk_sizes.iter().sum();
    assert_eq!(buffer.total_samples(), expected);

    let finished = buffer.take().finish();
    assert_eq!(finished.len(), expected);
}

#[test]
fn test_hot_swap_continues_into_same_buffer() {
    let buffer = SharedBuffer::new();

    // First stream handle writes, then is dropped (device swap)...
    let first_stream = buffer.clone();
    first_stream.push_from_callback(&[1.0, 2.0]);
    drop(first_stream);

    // ...and the replacement keeps appending to the same track.
    let second_stream = buffer.clone();
    second_stream.push_from_callback(&[3.0, 4.0]);

    let samples = buffer.take().finish();
    assert_eq!(samples, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_take_leaves_buffer_empty() {
    let buffer = SharedBuffer::new();
    buffer.push_from_callback(&[0.5; 100]);

    let first = buffer.take();
    assert_eq!(first.total_samples(), 100);

    assert!(buffer.is_empty());
    assert_eq!(buffer.take().finish().len(), 0);
}

#[test]
fn test_first_arrival_set_once() {
    let buffer = SharedBuffer::new();
    assert!(buffer.first_arrival().is_none());

    buffer.push_from_callback(&[0.0]);
    let first = buffer.first_arrival().expect("first chunk arrived");

    buffer.push_from_callback(&[0.0]);
    assert_eq!(buffer.first_arrival(), Some(first));
}
