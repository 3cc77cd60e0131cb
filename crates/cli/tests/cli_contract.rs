use assert_cmd::cargo::cargo_bin_cmd;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::{Path, PathBuf};

fn write_fixture_pdf(dir: &Path, name: &str, page_count: usize) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let mut kids = Vec::new();
    for page in 0..page_count {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", page + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("content should encode"),
        ));

        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(page_tree_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
            ("MediaBox", Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let page_tree = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(page_count as i64)),
    ]);
    doc.objects.insert(page_tree_id, Object::Dictionary(page_tree));

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(page_tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let path = dir.join(name);
    doc.save(&path).expect("fixture should save");
    path
}

fn write_signature_png(dir: &Path) -> PathBuf {
    let pixels = image::RgbaImage::from_pixel(8, 4, image::Rgba([0, 0, 0, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encoding should succeed");

    let path = dir.join("signature.png");
    std::fs::write(&path, bytes).expect("png fixture should write");
    path
}

fn write_placements(dir: &Path, value: &Value) -> PathBuf {
    let path = dir.join("placements.json");
    std::fs::write(&path, serde_json::to_vec_pretty(value).expect("placements should serialize"))
        .expect("placements fixture should write");
    path
}

#[test]
fn info_emits_page_geometry_json() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture_pdf(temp.path(), "doc.pdf", 2);

    let output = cargo_bin_cmd!("inkseal-cli")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"][0]["page"], 1);
    assert_eq!(value["pages"][0]["width"], 612.0);
    assert_eq!(value["pages"][1]["height"], 792.0);
}

#[test]
fn info_fails_for_missing_file() {
    cargo_bin_cmd!("inkseal-cli")
        .arg("info")
        .arg("missing.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    std::fs::write(&path, b"not a pdf").expect("fixture should write");

    cargo_bin_cmd!("inkseal-cli")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn sign_bakes_placements_into_a_new_document() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture_pdf(temp.path(), "doc.pdf", 2);
    write_signature_png(temp.path());

    let placements = write_placements(
        temp.path(),
        &json!({
            "pages": [
                { "page": 1, "renderedWidth": 800.0, "renderedHeight": 1000.0 },
                { "page": 2, "renderedWidth": 800.0, "renderedHeight": 1000.0 }
            ],
            "signatures": [
                { "image": "signature.png", "page": 1, "x": 100.0, "y": 0.0, "width": 200.0, "height": 80.0 },
                { "image": "signature.png", "page": 2, "x": 300.0, "y": 400.0, "width": 150.0, "height": 60.0 }
            ]
        }),
    );

    let output_path = temp.path().join("signed.pdf");

    cargo_bin_cmd!("inkseal-cli")
        .arg("sign")
        .arg(&pdf)
        .arg("--placements")
        .arg(&placements)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("signed.pdf"));

    let doc = Document::load(&output_path).expect("signed output should parse");
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 2);

    for page in [1_u32, 2] {
        let dict = doc.get_dictionary(pages[&page]).expect("page dictionary expected");
        let Object::Array(contents) = dict.get(b"Contents").expect("contents expected") else {
            panic!("signed page should have appended contents");
        };
        assert_eq!(contents.len(), 2, "page {page} should carry one appended stream");
    }
}

#[test]
fn sign_fails_for_out_of_range_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture_pdf(temp.path(), "doc.pdf", 1);
    write_signature_png(temp.path());

    let placements = write_placements(
        temp.path(),
        &json!({
            "signatures": [
                { "image": "signature.png", "page": 9, "x": 10.0, "y": 10.0, "width": 100.0, "height": 40.0 }
            ]
        }),
    );

    cargo_bin_cmd!("inkseal-cli")
        .arg("sign")
        .arg(&pdf)
        .arg("--placements")
        .arg(&placements)
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn sign_fails_for_unreadable_image() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture_pdf(temp.path(), "doc.pdf", 1);

    let placements = write_placements(
        temp.path(),
        &json!({
            "signatures": [
                { "image": "absent.png", "page": 1, "x": 10.0, "y": 10.0, "width": 100.0, "height": 40.0 }
            ]
        }),
    );

    cargo_bin_cmd!("inkseal-cli")
        .arg("sign")
        .arg(&pdf)
        .arg("--placements")
        .arg(&placements)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to bake signatures"));
}

#[test]
fn history_supports_add_list_promote_remove() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store_root = temp.path().join("store");
    let png = write_signature_png(temp.path());

    let added = cargo_bin_cmd!("inkseal-cli")
        .arg("history")
        .arg("--store-root")
        .arg(&store_root)
        .arg("add")
        .arg(&png)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let record: Value = serde_json::from_slice(&added).expect("add should print the record");
    let id = record["id"].as_str().expect("record id expected").to_owned();
    assert!(record["dataUrl"]
        .as_str()
        .expect("record data url expected")
        .starts_with("data:image/png;base64,"));

    let listed = cargo_bin_cmd!("inkseal-cli")
        .arg("history")
        .arg("--store-root")
        .arg(&store_root)
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let records: Value = serde_json::from_slice(&listed).expect("list should print json");
    assert_eq!(records.as_array().map(Vec::len), Some(1));
    assert_eq!(records[0]["id"], Value::String(id.clone()));

    cargo_bin_cmd!("inkseal-cli")
        .arg("history")
        .arg("--store-root")
        .arg(&store_root)
        .arg("promote")
        .arg(&id)
        .assert()
        .success();

    cargo_bin_cmd!("inkseal-cli")
        .arg("history")
        .arg("--store-root")
        .arg(&store_root)
        .arg("remove")
        .arg(&id)
        .assert()
        .success();

    let emptied = cargo_bin_cmd!("inkseal-cli")
        .arg("history")
        .arg("--store-root")
        .arg(&store_root)
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let records: Value = serde_json::from_slice(&emptied).expect("list should print json");
    assert_eq!(records.as_array().map(Vec::len), Some(0));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("inkseal-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
