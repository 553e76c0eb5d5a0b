use orthanc_cli::multipart::{ExtractionResult, MultipartError, MultipartResult, Target, extract};
use pretty_assertions::assert_eq;
use std::{
    fs,
    io::{self, Read},
    path::Path,
};

const BOUNDARY: &str = "a9f2c1e07b3d";

fn content_type() -> String {
    format!("multipart/related; type=\"application/dicom\"; boundary={BOUNDARY}")
}

/// Build a WADO-RS style body from `(extra headers, payload)` pairs.
fn wado_body(parts: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (headers, payload) in parts {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Type: application/dicom\r\n").as_bytes(),
        );
        if !headers.is_empty() {
            body.extend_from_slice(headers.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Fake DICOM payload: preamble, magic, then bytes that include CRLF and
/// dash runs.
fn payload(seed: u8, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; 128];
    data.extend_from_slice(b"DICM");
    data.extend_from_slice(b"\r\n--a9f2c1e0\r\n\r\n");
    data.extend((0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)));
    data
}

/// Extract `body` with the standard content type, discarding the report.
fn extract_quietly(body: &[u8], target: Target) -> MultipartResult<ExtractionResult> {
    extract(&content_type(), body, &target, io::sink())
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Two instances from different series that share an instance UID suffix.
fn same_last_segment() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        (
            "Content-Location: /dicom-web/studies/9/series/A/instances/1",
            payload(11, 300),
        ),
        (
            "Content-Location: /dicom-web/studies/9/series/B/instances/1",
            payload(12, 400),
        ),
    ]
}

#[test]
fn directory_extraction_writes_every_part() {
    let parts = vec![
        (
            "Content-Location: /dicom-web/studies/1.2/series/1.2.3/instances/1.2.3.4",
            payload(1, 70_000),
        ),
        (
            "Content-Location: /dicom-web/studies/1.2/series/1.2.3/instances/1.2.3.5",
            payload(2, 10),
        ),
        ("", payload(3, 5_000)),
    ];
    let expected_total: u64 = parts.iter().map(|(_, data)| data.len() as u64).sum();
    let body = wado_body(&parts);

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("study");
    let mut report = Vec::new();
    let target = Target::Directory(out.clone());
    let result = extract(&content_type(), &body[..], &target, &mut report).unwrap();

    assert_eq!(result.part_count, 3);
    assert_eq!(result.total_bytes, expected_total);
    assert_eq!(
        file_names(&out),
        vec!["1.2.3.4.dcm", "1.2.3.5.dcm", "instance_0003.dcm"]
    );
    assert_eq!(fs::read(out.join("1.2.3.4.dcm")).unwrap(), parts[0].1);
    assert_eq!(fs::read(out.join("instance_0003.dcm")).unwrap(), parts[2].1);

    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("Extracted 3 files"));
}

#[test]
fn repeated_extraction_is_deterministic() {
    let body = wado_body(&[("", payload(9, 100)), ("", payload(8, 200))]);
    let dir = tempfile::tempdir().unwrap();

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    extract_quietly(&body, Target::Directory(first.clone())).unwrap();
    extract_quietly(&body, Target::Directory(second.clone())).unwrap();

    assert_eq!(
        file_names(&first),
        vec!["instance_0001.dcm", "instance_0002.dcm"]
    );
    assert_eq!(file_names(&first), file_names(&second));
    for name in file_names(&first) {
        assert_eq!(
            fs::read(first.join(&name)).unwrap(),
            fs::read(second.join(&name)).unwrap()
        );
    }
}

#[test]
fn zero_parts_write_no_files() {
    let body = format!("--{BOUNDARY}--\r\n");
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("empty");

    let result = extract_quietly(body.as_bytes(), Target::Directory(out.clone())).unwrap();

    assert_eq!(result.part_count, 0);
    assert_eq!(result.total_bytes, 0);
    assert!(file_names(&out).is_empty());
}

#[test]
fn malformed_content_type_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never");

    let err = extract(
        "multipart/related; type=application/dicom",
        &b""[..],
        &Target::Directory(out.clone()),
        io::sink(),
    )
    .unwrap_err();

    assert!(matches!(err, MultipartError::MalformedContentType { .. }));
    assert!(!out.exists());
}

#[test]
fn truncated_body_is_an_error() {
    let mut body = wado_body(&[("", payload(4, 1_000))]);
    body.truncate(body.len() - 40);

    let dir = tempfile::tempdir().unwrap();
    let err = extract_quietly(&body, Target::Directory(dir.path().join("t"))).unwrap_err();

    assert!(matches!(err, MultipartError::Truncated), "{err:?}");
}

#[test]
fn truncated_archive_is_an_error() {
    let mut body = wado_body(&[("", payload(4, 10)), ("", payload(5, 1_000))]);
    body.truncate(body.len() - 40);

    let dir = tempfile::tempdir().unwrap();
    let err = extract_quietly(&body, Target::Archive(dir.path().join("t.zip"))).unwrap_err();

    assert!(matches!(err, MultipartError::Truncated), "{err:?}");
}

#[test]
fn archive_entries_match_parts() {
    let parts = vec![
        ("Content-Location: /instances/aaa", payload(5, 3_000)),
        (
            "Content-Disposition: attachment; filename=\"../../etc/scan.dcm\"",
            payload(6, 42),
        ),
    ];
    let body = wado_body(&parts);

    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("study.zip");
    let result = extract_quietly(&body, Target::Archive(archive.clone())).unwrap();
    assert_eq!(result.part_count, 2);

    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    assert_eq!(zip.len(), 2);

    for (name, expected) in [("aaa.dcm", &parts[0].1), ("scan.dcm", &parts[1].1)] {
        let mut entry = zip.by_name(name).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        assert_eq!(&data, expected);
    }
}

#[test]
fn duplicate_names_in_a_directory_keep_every_part() {
    let parts = same_last_segment();
    let body = wado_body(&parts);

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("study");
    let result = extract_quietly(&body, Target::Directory(out.clone())).unwrap();

    assert_eq!(result.part_count, 2);
    assert_eq!(file_names(&out), vec!["1.dcm", "1_0002.dcm"]);
    assert_eq!(fs::read(out.join("1.dcm")).unwrap(), parts[0].1);
    assert_eq!(fs::read(out.join("1_0002.dcm")).unwrap(), parts[1].1);
}

#[test]
fn duplicate_names_in_an_archive_keep_every_part() {
    let parts = same_last_segment();
    let body = wado_body(&parts);

    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("study.zip");
    let result = extract_quietly(&body, Target::Archive(archive.clone())).unwrap();
    assert_eq!(result.part_count, 2);

    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    assert_eq!(zip.len(), 2);

    for (name, expected) in [("1.dcm", &parts[0].1), ("1_0002.dcm", &parts[1].1)] {
        let mut entry = zip.by_name(name).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        assert_eq!(&data, expected);
    }
}

#[test]
fn listing_reports_without_writing() {
    let body = wado_body(&[
        ("Content-Location: /instances/1.2.3", payload(7, 10)),
        ("", payload(7, 20)),
    ]);
    let mut report = Vec::new();

    let result = extract(&content_type(), &body[..], &Target::Listing, &mut report).unwrap();

    assert_eq!(result.part_count, 2);
    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("application/dicom"));
    assert!(report.contains("/instances/1.2.3"));
    assert!(report.contains("Total: 2 parts"));
}
