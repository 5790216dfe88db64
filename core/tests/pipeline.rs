use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use medanon_core::catalog::table_columns;
use medanon_core::relocate::{IdentifyingField, ImagingDocument};
use medanon_core::{run, CancelToken, RunConfig, RunOutcome};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

fn write_dicom(path: &Path, name: &str, id: &str) {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(SECONDARY_CAPTURE),
    ));
    obj.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from("2.25.42"),
    ));
    obj.put(DataElement::new(
        tags::PATIENT_NAME,
        VR::PN,
        PrimitiveValue::from(name),
    ));
    obj.put(DataElement::new(
        tags::PATIENT_ID,
        VR::LO,
        PrimitiveValue::from(id),
    ));
    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LE)
                .media_storage_sop_class_uid(SECONDARY_CAPTURE)
                .media_storage_sop_instance_uid("2.25.42"),
        )
        .unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    file.write_to_file(path).unwrap();
}

/// Archive with four studies:
/// UID1 has a readable image, UID2 has no image and an unknown code,
/// UID3 references a missing file, UIDC references an absolute path.
fn build_archive(dir: &Path) -> RunConfig {
    let archive = dir.join("archive");
    std::fs::create_dir_all(&archive).unwrap();

    let medical = Connection::open(archive.join("MEDICAL.GDB")).unwrap();
    medical
        .execute_batch(
            "CREATE TABLE STUDIES (STUDY_UID TEXT, STUDY_RESULT TEXT);
             CREATE TABLE SERIES (SERIES_UID TEXT, STUDY_UID TEXT);
             CREATE TABLE IMAGES (IMAGE_PATH TEXT, SERIES_UID TEXT);
             CREATE TABLE PATIENTS (
                 PATIENT_ID INTEGER PRIMARY KEY,
                 PATIENT_NAME TEXT,
                 PATIENT_NAME_R TEXT,
                 PATIENT_CASE_HISTORY_NUMBER TEXT,
                 PATIENT_ADDRESS_REGION TEXT,
                 PATIENT_ADDRESS_AREA TEXT,
                 PATIENT_ADDRESS_CITY TEXT,
                 PATIENT_ADDRESS_SHF TEXT,
                 PATIENT_NAME_STD TEXT,
                 PATIENT_SEX TEXT
             );
             CREATE INDEX PAT_IDX1 ON PATIENTS (PATIENT_NAME);
             CREATE INDEX PAT_IDX2 ON PATIENTS (PATIENT_NAME_R);
             CREATE INDEX PAT_IDX3 ON PATIENTS (PATIENT_CASE_HISTORY_NUMBER);
             INSERT INTO STUDIES VALUES
                 ('UID1', 'A00 mild'), ('UID2', 'Z99'), ('UID3', 'B20'), ('UIDC', 'A00');
             INSERT INTO SERIES VALUES
                 ('S1', 'UID1'), ('S3', 'UID3'), ('SC', 'UIDC');
             INSERT INTO IMAGES VALUES
                 ('scans/img1.dcm', 'S1'),
                 ('scans/missing.dcm', 'S3'),
                 ('/C/data/img2.dcm', 'SC');
             INSERT INTO PATIENTS VALUES
                 (1, 'Ivanov', 'IVANOV', 'CH-1', 'R', 'A', 'C', 'S', 'IVANOV I', 'M');",
        )
        .unwrap();

    let diagnosis = Connection::open(archive.join("MKB10.GDB")).unwrap();
    diagnosis
        .execute_batch(
            "CREATE TABLE MKB10 (MKB_VALUES TEXT);
             INSERT INTO MKB10 VALUES ('A00 Cholera'), ('B01 Varicella');",
        )
        .unwrap();

    write_dicom(&archive.join("scans/img1.dcm"), "Doe^Jane", "123456");

    RunConfig::new(
        archive.join("MEDICAL.GDB"),
        archive.join("MKB10.GDB"),
        dir.join("out"),
    )
}

fn read_report(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|record| record.unwrap().iter().map(String::from).collect())
        .collect()
}

#[test]
fn test_full_run() {
    let dir = TempDir::new().unwrap();
    let config = build_archive(dir.path());

    let summary = run(&config, &CancelToken::new()).unwrap();

    // UID3 and UIDC have no readable source
    assert_eq!(summary.outcome, RunOutcome::CompletedWithSkips);
    assert_eq!(summary.outcome.exit_code(), 2);
    assert_eq!(summary.studies, 4);
    assert_eq!(summary.relocation.written(), 1);
    assert_eq!(summary.relocation.skipped(), 2);

    let rows = read_report(&config.report_path());
    assert_eq!(
        rows,
        vec![
            vec!["images/scans/img1.dcm", "UID1", "A00 mild", "A00 Cholera"],
            vec!["Not found", "UID2", "Z99", "Description not found"],
            vec!["Not found", "UID3", "B20", "Description not found"],
            vec!["Not found", "UIDC", "A00", "A00 Cholera"],
        ]
    );
}

#[test]
fn test_relocated_image_is_anonymized() {
    let dir = TempDir::new().unwrap();
    let config = build_archive(dir.path());

    run(&config, &CancelToken::new()).unwrap();

    let written: PathBuf = config.output_dir.join("images/scans/img1.dcm");
    let document = ImagingDocument::open(&written).unwrap();
    assert_eq!(
        document.get(IdentifyingField::SubjectName).as_deref(),
        Some("Anonymous")
    );
    assert_eq!(
        document.get(IdentifyingField::SubjectId).as_deref(),
        Some("00000000")
    );

    let source = ImagingDocument::open(&dir.path().join("archive/scans/img1.dcm")).unwrap();
    assert_eq!(
        source.get(IdentifyingField::SubjectName).as_deref(),
        Some("Doe^Jane")
    );
}

#[test]
fn test_missing_source_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = build_archive(dir.path());

    run(&config, &CancelToken::new()).unwrap();

    assert!(!config.output_dir.join("images/scans/missing.dcm").exists());
    assert!(!config.output_dir.join("images/data/img2.dcm").exists());
}

#[test]
fn test_sanitized_copy() {
    let dir = TempDir::new().unwrap();
    let config = build_archive(dir.path());

    run(&config, &CancelToken::new()).unwrap();

    let copy = Connection::open(config.sanitized_db_path()).unwrap();
    let mut paths: Vec<String> = copy
        .prepare("SELECT IMAGE_PATH FROM IMAGES ORDER BY rowid")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .map(|p| p.unwrap())
        .collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "images/data/img2.dcm",
            "images/scans/img1.dcm",
            "images/scans/missing.dcm",
        ]
    );

    let columns = table_columns(&copy, "PATIENTS").unwrap();
    assert_eq!(columns, vec!["PATIENT_ID", "PATIENT_SEX"]);
    let indices: i64 = copy
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'PAT_IDX%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indices, 0);

    // The original keeps its identifying columns and stored paths
    let original = Connection::open(&config.outcomes_db).unwrap();
    assert_eq!(table_columns(&original, "PATIENTS").unwrap().len(), 10);
    let stored: String = original
        .query_row(
            "SELECT IMAGE_PATH FROM IMAGES WHERE SERIES_UID = 'SC'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored, "/C/data/img2.dcm");
}

#[test]
fn test_cancelled_run_writes_no_report() {
    let dir = TempDir::new().unwrap();
    let config = build_archive(dir.path());
    let cancel = CancelToken::new();
    cancel.cancel();

    let summary = run(&config, &cancel).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert_eq!(summary.outcome.exit_code(), 3);
    assert!(!config.report_path().exists());
}
