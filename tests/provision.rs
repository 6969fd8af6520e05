mod common;

use std::fs;

use httpmock::prelude::*;
use sha2::{Digest, Sha256};
use tempfile::tempdir;

use d3net_separator::{
    ensure_model,
    io::sniff::{sniff_bytes, ContentKind},
    ModelSource, StemError,
};

use common::fake_weights;

const HTML_PAGE: &str = "<!DOCTYPE html>\n<html><head><title>Not Found</title></head><body>gone</body></html>";

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

#[test]
fn downloads_once_when_missing_then_reuses() {
    let tmp = tempdir().unwrap();
    let weights = fake_weights(256 * 1024);

    let server = MockServer::start();
    let model_mock = server.mock(|when, then| {
        when.method(GET).path("/d3net-mss.h5");
        then.status(200)
            .header("Content-Length", weights.len().to_string().as_str())
            .body(weights.clone());
    });

    let source = ModelSource::new(
        server.url("/d3net-mss.h5"),
        tmp.path().join("pretrained_models"),
        "d3net-mss.h5",
    );

    let first = ensure_model(&source).expect("first ensure_model failed");
    assert!(first.downloaded);
    assert_eq!(fs::read(&first.local_path).unwrap(), weights);
    model_mock.assert_hits(1);

    let second = ensure_model(&source).expect("second ensure_model failed");
    assert!(!second.downloaded);
    assert_eq!(first.local_path, second.local_path, "model path should be stable");
    model_mock.assert_hits(1);
}

#[test]
fn cached_html_page_is_replaced_exactly_once() {
    let tmp = tempdir().unwrap();
    let weights = fake_weights(64 * 1024);

    let server = MockServer::start();
    let model_mock = server.mock(|when, then| {
        when.method(GET).path("/d3net-mss.h5");
        then.status(200).body(weights.clone());
    });

    let source = ModelSource::new(server.url("/d3net-mss.h5"), tmp.path(), "d3net-mss.h5");
    fs::write(source.local_path(), HTML_PAGE).unwrap();

    let handle = ensure_model(&source).unwrap();
    assert!(handle.downloaded, "HTML placeholder should force a download");
    assert_eq!(fs::read(&handle.local_path).unwrap(), weights);
    model_mock.assert_hits(1);

    let again = ensure_model(&source).unwrap();
    assert!(!again.downloaded);
    model_mock.assert_hits(1);
}

#[test]
fn html_response_is_rejected() {
    let tmp = tempdir().unwrap();

    let server = MockServer::start();
    let _mock = server.mock(|when, then| {
        when.method(GET).path("/expired.h5");
        then.status(200)
            .header("Content-Type", "text/html")
            .body(HTML_PAGE);
    });

    let source = ModelSource::new(server.url("/expired.h5"), tmp.path(), "d3net-mss.h5");
    match ensure_model(&source) {
        Err(StemError::InvalidArtifact { mime, .. }) => assert_eq!(mime, "text/html"),
        other => panic!("expected InvalidArtifact, got {other:?}"),
    }
    assert!(!source.local_path().exists(), "HTML must not be kept as weights");
}

#[test]
fn checksum_mismatch_returns_error() {
    let tmp = tempdir().unwrap();
    let weights = fake_weights(64 * 1024);
    let mut bad_sha = sha256_hex(&weights);
    let first = &bad_sha[0..1];
    bad_sha.replace_range(0..1, if first == "a" { "b" } else { "a" });

    let server = MockServer::start();
    let _mock = server.mock(|when, then| {
        when.method(GET).path("/bad.h5");
        then.status(200).body(weights.clone());
    });

    let source =
        ModelSource::new(server.url("/bad.h5"), tmp.path(), "bad.h5").with_sha256(bad_sha);
    let err = ensure_model(&source).expect_err("expected checksum error");
    let msg = err.to_string().to_lowercase();
    assert!(msg.contains("checksum"), "expected checksum error, got: {msg}");
}

#[test]
fn pinned_digest_accepts_matching_cache() {
    let tmp = tempdir().unwrap();
    let weights = fake_weights(32 * 1024);

    let server = MockServer::start();
    let model_mock = server.mock(|when, then| {
        when.method(GET).path("/d3net-mss.h5");
        then.status(200).body(weights.clone());
    });

    let source = ModelSource::new(server.url("/d3net-mss.h5"), tmp.path(), "d3net-mss.h5")
        .with_sha256(sha256_hex(&weights).to_uppercase());
    fs::write(source.local_path(), &weights).unwrap();

    let handle = ensure_model(&source).unwrap();
    assert!(!handle.downloaded);
    model_mock.assert_hits(0);
}

#[test]
fn failed_download_leaves_no_partial_file() {
    let tmp = tempdir().unwrap();

    let server = MockServer::start();
    let _mock = server.mock(|when, then| {
        when.method(GET).path("/missing.h5");
        then.status(404);
    });

    let source = ModelSource::new(server.url("/missing.h5"), tmp.path(), "d3net-mss.h5");
    let err = ensure_model(&source).expect_err("404 must fail");
    assert!(matches!(err, StemError::Network(_)), "got {err:?}");
    assert!(!source.local_path().exists());
    assert!(!source.local_path().with_extension("part").exists());
}

#[test]
fn sniffing_tells_pages_from_weights() {
    assert_eq!(sniff_bytes(HTML_PAGE.as_bytes()), ContentKind::Html);
    assert_eq!(sniff_bytes(b"\xEF\xBB\xBF  <HTML lang=\"en\">"), ContentKind::Html);
    assert_eq!(sniff_bytes(b"\n\n<head><meta charset=utf-8>"), ContentKind::Html);
    assert_eq!(sniff_bytes(b"plain words\n"), ContentKind::Text);
    assert_eq!(sniff_bytes(&fake_weights(512)), ContentKind::Hdf5);
    assert_eq!(sniff_bytes(&[0x08, 0x07, 0x00, 0x12, 0xff]), ContentKind::Binary);
    assert_eq!(ContentKind::Html.mime(), "text/html");
}
