//! End-to-end decode tests over on-disk model bundles

mod common;

use std::sync::Arc;

use lattis_decoder::{
    registry, DecodeError, DecodeSession, FeatureArchiveWriter, LatticeArchiveReader,
};
use ndarray::Array2;

use common::DIM;

#[test]
fn test_loaded_context_exposes_all_artifacts() {
    let fixture = common::build();
    let context = common::load_context(&fixture);

    assert_eq!(context.transition_model().num_pdfs(), 2);
    assert_eq!(context.acoustic_model().output_dim(), 2);
    assert!(context.graph().num_states() >= 3);
    assert_eq!(context.symbols().len(), 3);
    assert!(context.info().contains(&format!("input-dim: {}", DIM)));
}

#[test]
fn test_single_buffer_decode_writes_one_entry() {
    let fixture = common::build();
    let session = DecodeSession::with_defaults(common::load_context(&fixture));

    let out = fixture.dir.path().join("lat.ark");
    let buffer = common::yes_no_buffer(100);
    let outcome = session
        .decode_buffer(&out, "utt-100", &buffer, 100, DIM)
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.words, vec![1, 2]);
    assert_eq!(outcome.text, "yes no");
    assert!(outcome.frames > 0);

    let entries = LatticeArchiveReader::open(&out).unwrap().read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "utt-100");
    assert_eq!(entries[0].1.best_path().unwrap().words, vec![1, 2]);
}

#[test]
fn test_zero_frame_buffer_counts_as_failure_and_writes_nothing() {
    let fixture = common::build();
    let session = DecodeSession::with_defaults(common::load_context(&fixture));

    let out = fixture.dir.path().join("lat.ark");
    let outcome = session.decode_buffer(&out, "utt-empty", &[], 0, DIM).unwrap();

    assert!(!outcome.success);
    assert!(outcome.words.is_empty());
    assert!(outcome.reason.is_some());

    // Sink exists but holds no entries
    let entries = LatticeArchiveReader::open(&out).unwrap().read_all().unwrap();
    assert!(entries.is_empty());
}

#[test]
fn test_wrong_feature_dimension_fails_with_reason() {
    let fixture = common::build();
    let session = DecodeSession::with_defaults(common::load_context(&fixture));
    let out = fixture.dir.path().join("lat.ark");

    // Consistent buffer, but three columns against a 40-dim model
    let outcome = session
        .decode_buffer(&out, "utt-narrow", &[0.0; 12], 4, 3)
        .unwrap();

    assert!(!outcome.success);
    let reason = outcome.reason.unwrap();
    assert!(reason.contains("dimension"), "unexpected reason: {}", reason);

    let entries = LatticeArchiveReader::open(&out).unwrap().read_all().unwrap();
    assert!(entries.is_empty());
}

#[test]
fn test_mismatched_buffer_length_is_rejected() {
    let fixture = common::build();
    let session = DecodeSession::with_defaults(common::load_context(&fixture));
    let out = fixture.dir.path().join("lat.ark");

    let err = session
        .decode_buffer(&out, "utt-bad", &[0.0; 10], 100, DIM)
        .unwrap_err();
    assert!(matches!(err, DecodeError::InvalidInput(_)));
}

#[test]
fn test_batch_counts_failures_and_writes_survivors_in_order() {
    let fixture = common::build();
    let session = DecodeSession::with_defaults(common::load_context(&fixture));

    let feats = fixture.dir.path().join("feats.ark");
    let out = fixture.dir.path().join("lat.ark");

    let mut writer = FeatureArchiveWriter::create(&feats).unwrap();
    for (key, frames) in [("utt-a", 60), ("utt-b", 0), ("utt-c", 90), ("utt-d", 30)] {
        let buf = common::yes_no_buffer(frames);
        let matrix = Array2::from_shape_vec((frames, if frames == 0 { 0 } else { DIM }), buf)
            .unwrap();
        writer.write(key, &matrix).unwrap();
    }
    writer.flush().unwrap();

    // Differently typed path arguments are fine
    let stats = session.decode_archive(&feats, out.as_path()).unwrap();
    assert_eq!(stats.num_success, 3);
    assert_eq!(stats.num_fail, 1);
    assert!(stats.total_frames > 0);
    assert!(stats.total_likelihood.is_finite());

    let entries = LatticeArchiveReader::open(&out).unwrap().read_all().unwrap();
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["utt-a", "utt-c", "utt-d"]);
}

#[test]
fn test_same_input_produces_identical_archives() {
    let fixture = common::build();
    let session = DecodeSession::with_defaults(common::load_context(&fixture));

    let buffer = common::yes_no_buffer(48);
    let out_a = fixture.dir.path().join("a.ark");
    let out_b = fixture.dir.path().join("b.ark");

    session.decode_buffer(&out_a, "utt", &buffer, 48, DIM).unwrap();
    session.decode_buffer(&out_b, "utt", &buffer, 48, DIM).unwrap();

    let a = std::fs::read(&out_a).unwrap();
    let b = std::fs::read(&out_b).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn test_concurrent_decodes_share_one_context() {
    let fixture = common::build();
    let handle = registry::register(common::load_context(&fixture));
    let dir = Arc::new(fixture.dir.path().to_path_buf());

    let threads: Vec<_> = (0..8)
        .map(|i| {
            let dir = Arc::clone(&dir);
            std::thread::spawn(move || {
                let context = registry::get(handle).unwrap();
                let session = DecodeSession::with_defaults(context);
                let out = dir.join(format!("lat-{}.ark", i));
                let buffer = common::yes_no_buffer(60);
                let outcome = session
                    .decode_buffer(&out, &format!("utt-{}", i), &buffer, 60, DIM)
                    .unwrap();
                assert!(outcome.success);
                out
            })
        })
        .collect();

    let mut contents = Vec::new();
    for (i, t) in threads.into_iter().enumerate() {
        let out = t.join().unwrap();
        let entries = LatticeArchiveReader::open(&out).unwrap().read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, format!("utt-{}", i));
        contents.push(entries[0].1.best_path().unwrap().words.clone());
    }

    // Identical inputs, identical results, regardless of interleaving
    assert!(contents.iter().all(|w| *w == contents[0]));

    registry::release(handle).unwrap();
}

#[test]
fn test_released_handle_is_rejected() {
    let fixture = common::build();
    let handle = registry::register(common::load_context(&fixture));
    registry::release(handle).unwrap();

    assert!(matches!(
        registry::get(handle),
        Err(DecodeError::UnknownHandle(_))
    ));
}
