use crate::error::PatchError;
use crate::level::{deflate_bytes, detect_compression_level, CANDIDATE_LEVELS};
use crate::raw::crc32;
use crate::tests::fixtures::match_rich_payload;

#[test]
fn detects_each_candidate_level() {
    let payload = match_rich_payload(96 * 1024);

    // The payload is deliberately match-rich, so each candidate produces a
    // distinct stream; otherwise detection would be untestable.
    let streams: Vec<Vec<u8>> = CANDIDATE_LEVELS
        .iter()
        .map(|&level| deflate_bytes(&payload, level).expect("deflate"))
        .collect();
    for a in 0..streams.len() {
        for b in a + 1..streams.len() {
            assert_ne!(
                streams[a], streams[b],
                "levels {} and {} compressed identically",
                CANDIDATE_LEVELS[a], CANDIDATE_LEVELS[b]
            );
        }
    }

    for (ix, &level) in CANDIDATE_LEVELS.iter().enumerate() {
        let original_crc = crc32(&streams[ix]);
        let detected =
            detect_compression_level("res/raw/blob.bin", &payload, original_crc).expect("detect");
        assert_eq!(detected, level);

        let recompressed = deflate_bytes(&payload, detected).expect("deflate");
        assert_eq!(crc32(&recompressed), original_crc);
    }
}

#[test]
fn unreproducible_stream_is_fatal() {
    let payload = match_rich_payload(16 * 1024);
    // Level 0 emits stored blocks, which no candidate level reproduces.
    let stored = deflate_bytes(&payload, 0).expect("deflate");
    let err = detect_compression_level("res/raw/blob.bin", &payload, crc32(&stored)).unwrap_err();
    assert!(matches!(
        err,
        PatchError::UndeterminedCompressionLevel { .. }
    ));
}
