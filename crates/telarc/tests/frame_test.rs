//! Integration tests for the frame codec and fan-out writer.

use std::io::Read;
use telarc::{
    encode_frame, ArchiveError, FrameReader, FrameWriter, ShardWriter, FRAME_HEADER_SIZE,
};
use tempfile::TempDir;

fn decode_all(data: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = FrameReader::from_reader(data);
    let mut buf = vec![0u8; 1 << 16];
    let mut frames = Vec::new();
    while let Some(n) = reader.read_frame(&mut buf).unwrap() {
        frames.push(buf[FRAME_HEADER_SIZE..n].to_vec());
    }
    frames
}

#[test]
fn test_roundtrip_various_sizes() {
    for len in [0usize, 1, 7, 255, 256, 4096] {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let frame = encode_frame(&payload);
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + len);

        let frames = decode_all(&frame);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], payload);
    }
}

#[test]
fn test_one_success_then_end_of_stream() {
    let frame = encode_frame(b"only");
    let mut reader = FrameReader::from_reader(&frame[..]);
    let mut buf = [0u8; 64];
    assert_eq!(reader.read_frame(&mut buf).unwrap(), Some(8));
    assert_eq!(reader.read_frame(&mut buf).unwrap(), None);
    // Stays at end of stream on repeated reads.
    assert_eq!(reader.read_frame(&mut buf).unwrap(), None);
}

#[test]
fn test_truncation_reports_exact_missing_count() {
    let mut data = encode_frame(&[0u8; 50]);
    data.truncate(FRAME_HEADER_SIZE + 20); // 30 payload bytes missing
    let mut reader = FrameReader::from_reader(&data[..]);
    let mut buf = [0u8; 128];
    match reader.read_frame(&mut buf) {
        Err(ArchiveError::Truncated(missing)) => assert_eq!(missing, 30),
        other => panic!("expected Truncated, got {:?}", other),
    }
}

#[test]
fn test_writer_reader_roundtrip_stream() {
    let payloads: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; (i as usize) * 3]).collect();
    let mut writer = FrameWriter::new(Vec::new());
    for payload in &payloads {
        writer.write_frame(payload).unwrap();
    }
    assert_eq!(decode_all(&writer.into_inner()), payloads);
}

#[test]
fn test_shard_writer_scatters_without_loss() {
    let dir = TempDir::new().unwrap();
    let mut writer = ShardWriter::create(dir.path(), 3).unwrap();
    assert_eq!(writer.len(), 3);

    let payloads: Vec<Vec<u8>> = (0..100u8).map(|i| vec![i, i.wrapping_mul(7)]).collect();
    for payload in &payloads {
        writer.write_frame(payload).unwrap();
    }
    writer.close().unwrap();

    // Every frame lands whole in exactly one destination.
    let mut recovered = Vec::new();
    for i in 1..=3 {
        let path = dir.path().join(format!("rt_{:04}.dat", i));
        let mut data = Vec::new();
        std::fs::File::open(&path)
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        recovered.extend(decode_all(&data));
    }
    assert_eq!(recovered.len(), payloads.len());
    recovered.sort();
    let mut expected = payloads.clone();
    expected.sort();
    assert_eq!(recovered, expected);
}
