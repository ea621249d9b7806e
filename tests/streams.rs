//! Substream tests: bounded reads and window-relative seeks.

use std::io::{Cursor, Read, Seek, SeekFrom};

use bytestruct::Substream;

#[test]
fn bounded_read_is_capped_at_the_window() {
    let mut outer = Cursor::new(vec![1, 2, 3, 4, 5, 6]);
    outer.set_position(1);
    let mut sub = Substream::bounded(&mut outer, 4).unwrap();
    let mut buf = Vec::new();
    sub.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, vec![2, 3, 4]);
    // Further reads return nothing.
    let mut one = [0u8; 1];
    assert_eq!(sub.read(&mut one).unwrap(), 0);
}

#[test]
fn reads_advance_the_outer_stream() {
    let mut outer = Cursor::new(vec![1, 2, 3, 4]);
    {
        let mut sub = Substream::bounded(&mut outer, 2).unwrap();
        let mut buf = [0u8; 2];
        sub.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
    }
    assert_eq!(outer.position(), 2);
}

#[test]
fn seeks_are_window_relative() {
    let mut outer = Cursor::new(vec![10, 11, 12, 13, 14, 15]);
    outer.set_position(2);
    let mut sub = Substream::bounded(&mut outer, 5).unwrap();

    assert_eq!(sub.seek(SeekFrom::Start(1)).unwrap(), 1);
    let mut one = [0u8; 1];
    sub.read_exact(&mut one).unwrap();
    assert_eq!(one[0], 13);

    assert_eq!(sub.seek(SeekFrom::End(-1)).unwrap(), 2);
    sub.read_exact(&mut one).unwrap();
    assert_eq!(one[0], 14);
}

#[test]
fn seeks_clamp_to_the_window() {
    let mut outer = Cursor::new(vec![1, 2, 3, 4, 5, 6]);
    outer.set_position(1);
    let mut sub = Substream::bounded(&mut outer, 4).unwrap();

    assert_eq!(sub.seek(SeekFrom::Start(10)).unwrap(), 3);
    assert_eq!(sub.seek(SeekFrom::Current(-100)).unwrap(), 0);
}

#[test]
fn unbounded_substream_reaches_the_outer_end() {
    let mut outer = Cursor::new(vec![1, 2, 3]);
    outer.set_position(1);
    let mut sub = Substream::new(&mut outer).unwrap();
    assert_eq!(sub.seek(SeekFrom::End(0)).unwrap(), 2);
    let mut buf = Vec::new();
    sub.seek(SeekFrom::Start(0)).unwrap();
    sub.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, vec![2, 3]);
}
