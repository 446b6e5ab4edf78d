use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

const DICTIONARY_FILES: [&str; 5] = [
    "jieba.dict.utf8",
    "hmm_model.utf8",
    "user.dict.utf8",
    "idf.utf8",
    "stop_words.utf8",
];

fn write_dictionary(dir: &Path, words: &str) {
    for name in DICTIONARY_FILES {
        fs::write(dir.join(name), "").expect("dictionary file should be written");
    }
    fs::write(dir.join("jieba.dict.utf8"), words).expect("word list should be written");
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should contain valid json")
}

#[test]
fn tokenize_prints_latin_words_as_json() {
    let output = cargo_bin_cmd!("pdf-viewer-cli")
        .arg("tokenize")
        .arg("Hello, well-known world!")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(stdout_json(&output), json!(["Hello", "well-known", "world"]));
}

#[test]
fn tokenize_segments_cjk_with_dictionary() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    write_dictionary(temp.path(), "你好\n世界\n");

    let output = cargo_bin_cmd!("pdf-viewer-cli")
        .arg("tokenize")
        .arg("你好，世界")
        .arg("--dict")
        .arg(temp.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(stdout_json(&output), json!(["你好", "世界"]));
}

#[test]
fn locate_reports_nearest_token() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let ocr_path = temp.path().join("ocr.json");
    let quad = |x0: f32, y0: f32, x1: f32, y1: f32| {
        json!({ "points": [
            { "x": x0, "y": y0 }, { "x": x1, "y": y0 },
            { "x": x1, "y": y1 }, { "x": x0, "y": y1 }
        ]})
    };
    let ocr = json!({
        "success": true,
        "text": "hello world\nsecond",
        "confidence": 0.9,
        "boxes": [quad(0.0, 0.0, 110.0, 20.0), quad(0.0, 30.0, 60.0, 50.0)],
        "texts": ["hello world", "second"],
        "scores": [0.9, 0.9],
        "elapsed_ms": 12,
        "error": null
    });
    fs::write(&ocr_path, ocr.to_string()).expect("ocr json should be written");

    let output = cargo_bin_cmd!("pdf-viewer-cli")
        .arg("locate")
        .arg(&ocr_path)
        .arg("--x")
        .arg("80")
        .arg("--y")
        .arg("10")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["token"]["word"], "world");
    assert_eq!(value["token"]["start_index"], 6);
    assert_eq!(value["token"]["line_index"], 0);
    assert_eq!(value["distance"], 0.0);
}

#[test]
fn locate_fails_for_missing_file() {
    cargo_bin_cmd!("pdf-viewer-cli")
        .arg("locate")
        .arg("/nonexistent/ocr.json")
        .arg("--x")
        .arg("1")
        .arg("--y")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn locate_fails_for_invalid_json() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json").expect("file should be written");

    cargo_bin_cmd!("pdf-viewer-cli")
        .arg("locate")
        .arg(&path)
        .arg("--x")
        .arg("1")
        .arg("--y")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse OCR result"));
}

#[test]
fn check_dict_names_missing_files() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    write_dictionary(temp.path(), "");
    fs::remove_file(temp.path().join("stop_words.utf8")).expect("file should be removed");

    cargo_bin_cmd!("pdf-viewer-cli")
        .arg("check-dict")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing dictionary files: stop_words.utf8"));
}

#[test]
fn check_dict_accepts_complete_directory() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    write_dictionary(temp.path(), "词\n");

    cargo_bin_cmd!("pdf-viewer-cli")
        .arg("check-dict")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("ok\n"));
}

#[test]
fn config_reads_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("viewer.conf");
    fs::write(&path, "ocr_debounce_ms = 120\ncache_max_pages = 64\n")
        .expect("config should be written");

    cargo_bin_cmd!("pdf-viewer-cli")
        .arg("config")
        .arg("--file")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("ocr_debounce_ms = 120"))
        .stdout(predicate::str::contains("cache_max_pages = 64"));
}

#[test]
fn config_rejects_invalid_environment() {
    cargo_bin_cmd!("pdf-viewer-cli")
        .arg("config")
        .env("PDF_VIEWER_OCR_DEBOUNCE_MS", "9000")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration in environment"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pdf-viewer-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
