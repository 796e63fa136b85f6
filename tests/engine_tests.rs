//! End-to-end tests of extraction, matching and the scan coordinator

mod common;

use common::*;
use macroscan::config::ScanConfig;
use macroscan::report::outcomes::FAILURE_LOG;
use macroscan::report::ScanSummary;
use macroscan::scanner::{
    CancelToken, Coordinator, DocumentType, NetworkPatterns, ScanProgress, ScanResult, ScanStatus,
    ShareRoot, ShareState, scan_file,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn patterns() -> NetworkPatterns {
    NetworkPatterns::default()
}

fn share_of(dir: &Path) -> ShareRoot {
    ShareRoot::new(dir.to_str().unwrap())
}

fn config(output_dir: PathBuf, workers: usize) -> ScanConfig {
    ScanConfig {
        output_dir,
        worker_count: Some(workers),
        ..Default::default()
    }
}

/// Populate a share with one document of every interesting kind.
/// Returns the number of candidate files written.
fn populate_share(root: &Path) -> usize {
    let finance = root.join("finance");
    let archive = root.join("archive").join("2019");
    fs::create_dir_all(&finance).unwrap();
    fs::create_dir_all(&archive).unwrap();

    write_zip_document(&root.join("plain.docx"), "word", None);
    write_zip_document(
        &finance.join("budget.xlsm"),
        "xl",
        Some(&vba_project(&[("Module1", UNC_MACRO)])),
    );
    write_zip_document(
        &finance.join("loader.xlsm"),
        "xl",
        Some(&vba_project(&[("Module1", DRIVE_MACRO)])),
    );
    write_zip_document(
        &root.join("hello.pptm"),
        "ppt",
        Some(&vba_project(&[("Module1", PLAIN_MACRO)])),
    );
    write_legacy_document(
        &archive.join("memo.doc"),
        Some("/Macros/VBA"),
        &[("NewMacros", UNC_MACRO)],
    );
    write_legacy_document(&archive.join("old.xls"), None, &[]);
    fs::write(archive.join("broken.docm"), b"not a zip").unwrap();
    fs::write(root.join("readme.txt"), b"ignored").unwrap();
    fs::write(finance.join("data.csv"), b"ignored").unwrap();
    7
}

fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.records().map(|r| r.unwrap()).collect()
}

fn partial_reports(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().ends_with(".partial"))
        .collect()
}

/// Sets the cancel flag once `after` files have been recorded
struct CancelAfter {
    token: CancelToken,
    after: usize,
}

impl ScanProgress for CancelAfter {
    fn file_recorded(&self, _result: &ScanResult, summary: &ScanSummary) {
        if summary.files_scanned() >= self.after {
            self.token.cancel();
        }
    }
}

#[test]
fn test_document_without_macros_is_not_found() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("report.docx");
    write_zip_document(&path, "word", None);

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::NotFound);
    assert_eq!(result.document_type, DocumentType::Word);
    assert!(result.found_string.is_empty());
    assert!(result.last_modified.is_some());
}

#[test]
fn test_macro_without_network_path_is_found_with_empty_string() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("hello.docm");
    write_zip_document(&path, "word", Some(&vba_project(&[("Module1", PLAIN_MACRO)])));

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Found);
    assert!(result.found_string.is_empty());
    assert!(!result.has_network_path());
}

#[test]
fn test_unc_literal_reported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("budget.xlsm");
    write_zip_document(&path, "xl", Some(&vba_project(&[("Module1", UNC_MACRO)])));

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Found);
    assert_eq!(result.document_type, DocumentType::Excel);
    assert_eq!(result.found_string, r"\\fileserver01\finance\budget.xlsx");
}

#[test]
fn test_mapped_drive_literal_reported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("loader.xlsm");
    write_zip_document(&path, "xl", Some(&vba_project(&[("Module1", DRIVE_MACRO)])));

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Found);
    assert_eq!(result.found_string, r"Z:\data\file.xlsx");
}

#[test]
fn test_first_match_follows_module_order() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("two.docm");
    let project = vba_project(&[("Module1", PLAIN_MACRO), ("Module2", DRIVE_MACRO), ("Module3", UNC_MACRO)]);
    write_zip_document(&path, "word", Some(&project));

    let first = scan_file(&path, &patterns(), false);
    assert_eq!(first.found_string, r"Z:\data\file.xlsx");

    let all = scan_file(&path, &patterns(), true);
    assert_eq!(all.found_string, r"Z:\data\file.xlsx; \\fileserver01\finance\budget.xlsx");
}

#[test]
fn test_legacy_word_and_excel_projects() {
    let temp = TempDir::new().unwrap();
    let doc = temp.path().join("memo.doc");
    write_legacy_document(&doc, Some("/Macros/VBA"), &[("NewMacros", UNC_MACRO)]);
    let xls = temp.path().join("sheet.xls");
    write_legacy_document(&xls, Some("/_VBA_PROJECT_CUR/VBA"), &[("Module1", DRIVE_MACRO)]);
    let plain = temp.path().join("plain.doc");
    write_legacy_document(&plain, None, &[]);

    let result = scan_file(&doc, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Found);
    assert_eq!(result.found_string, r"\\fileserver01\finance\budget.xlsx");

    let result = scan_file(&xls, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Found);
    assert_eq!(result.document_type, DocumentType::Excel);
    assert_eq!(result.found_string, r"Z:\data\file.xlsx");

    assert_eq!(scan_file(&plain, &patterns(), false).status, ScanStatus::NotFound);
}

#[test]
fn test_truncated_module_stream_is_decode_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cut.xlsm");
    let mut stream = module_stream(UNC_MACRO);
    stream.truncate(stream.len() - 20);
    write_zip_document(&path, "xl", Some(&vba_project_raw(&[("Module1", stream)])));

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Error);
    assert!(result.reason.contains("decode"), "{}", result.reason);
    assert!(result.found_string.is_empty());
}

#[test]
fn test_truncated_vba_project_part_is_decode_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cut.docm");
    let mut project = vba_project(&[("Module1", UNC_MACRO)]);
    project.truncate(600);
    write_zip_document(&path, "word", Some(&project));

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Error);
    assert!(result.reason.contains("decode"), "{}", result.reason);
}

#[test]
fn test_run_writes_one_row_per_candidate() {
    for workers in [1, 4] {
        let temp = TempDir::new().unwrap();
        let share_dir = temp.path().join("fs01").join("dept");
        fs::create_dir_all(&share_dir).unwrap();
        let candidates = populate_share(&share_dir);
        let share = share_of(&share_dir);

        let coordinator =
            Coordinator::new(config(temp.path().join("out"), workers), CancelToken::new()).unwrap();
        let outcome = coordinator.run(std::slice::from_ref(&share)).unwrap();
        let summary = &outcome.summary;

        assert_eq!(summary.files_scanned(), candidates, "workers={workers}");
        assert_eq!(summary.macros_found(), 4);
        assert_eq!(summary.network_paths_found(), 3);
        assert_eq!(summary.errors(), 1);
        assert_eq!(summary.abandoned(), 0);

        let totals = summary.share(&share).unwrap();
        assert_eq!(totals.state, ShareState::Complete);
        let report = totals.report_path.clone().unwrap();
        let name = report.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("fs01-dept-MacroScan-"), "{name}");

        let rows = read_rows(&report);
        assert_eq!(rows.len(), candidates);
        let mut paths: Vec<&str> = rows.iter().map(|r| r.get(0).unwrap()).collect();
        let sorted = {
            let mut p = paths.clone();
            p.sort();
            p
        };
        assert_eq!(paths, sorted, "rows are sorted by path");
        paths.dedup();
        assert_eq!(paths.len(), candidates, "no duplicate rows");

        let broken = rows.iter().find(|r| r[0].ends_with("broken.docm")).unwrap();
        assert_eq!(&broken[1], "Error");
        assert!(broken[5].contains("ContainerCorrupt"));

        let budget = rows.iter().find(|r| r[0].ends_with("budget.xlsm")).unwrap();
        assert_eq!(&budget[1], "Found");
        assert_eq!(&budget[3], "Excel");
        assert_eq!(&budget[4], r"\\fileserver01\finance\budget.xlsx");
        assert!(!budget[2].is_empty());

        assert!(outcome.summary_log.exists());
        let leftovers: Vec<_> = fs::read_dir(temp.path().join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

#[test]
fn test_repeated_runs_produce_identical_reports() {
    let temp = TempDir::new().unwrap();
    let share_dir = temp.path().join("srv").join("team");
    fs::create_dir_all(&share_dir).unwrap();
    populate_share(&share_dir);
    let share = share_of(&share_dir);

    let mut reports = Vec::new();
    for (i, workers) in [1, 4, 4].into_iter().enumerate() {
        let out = temp.path().join(format!("out{i}"));
        let coordinator = Coordinator::new(config(out, workers), CancelToken::new()).unwrap();
        let outcome = coordinator.run(std::slice::from_ref(&share)).unwrap();
        let report = outcome.summary.share(&share).unwrap().report_path.clone().unwrap();
        reports.push(fs::read(report).unwrap());
    }
    assert_eq!(reports[0], reports[1]);
    assert_eq!(reports[1], reports[2]);
}

#[test]
fn test_unreachable_share_does_not_stop_run() {
    let temp = TempDir::new().unwrap();
    let good_dir = temp.path().join("nas").join("good");
    fs::create_dir_all(&good_dir).unwrap();
    let candidates = populate_share(&good_dir);
    let good = share_of(&good_dir);
    let missing = share_of(&temp.path().join("nas").join("offline"));

    let out = temp.path().join("out");
    let mut cfg = config(out.clone(), 2);
    cfg.walker_threads = 2;
    let coordinator = Coordinator::new(cfg, CancelToken::new()).unwrap();
    let outcome = coordinator.run(&[missing.clone(), good.clone()]).unwrap();
    let summary = &outcome.summary;

    assert!(matches!(summary.share(&missing).unwrap().state, ShareState::Failed(_)));
    assert!(summary.share(&missing).unwrap().report_path.is_none());
    assert_eq!(summary.share(&good).unwrap().state, ShareState::Complete);
    assert_eq!(summary.files_scanned(), candidates);

    let log = fs::read_to_string(&outcome.summary_log).unwrap();
    assert!(log.contains("UNREACHABLE (UnreachableShare:"), "{log}");
    assert!(log.contains(missing.as_str()));

    let reports: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("-MacroScan-") && name.ends_with(".csv"))
        .collect();
    assert_eq!(reports.len(), 1, "{reports:?}");
    assert!(reports[0].starts_with("nas-good-"));

    let failures = fs::read_to_string(out.join(FAILURE_LOG)).unwrap();
    assert!(failures.contains(missing.as_str()));
}

#[test]
fn test_empty_share_gets_header_only_report() {
    let temp = TempDir::new().unwrap();
    let share_dir = temp.path().join("empty").join("share");
    fs::create_dir_all(share_dir.join("nested")).unwrap();
    fs::write(share_dir.join("nested").join("notes.txt"), b"x").unwrap();
    let share = share_of(&share_dir);

    let coordinator = Coordinator::new(config(temp.path().join("out"), 3), CancelToken::new()).unwrap();
    let outcome = coordinator.run(std::slice::from_ref(&share)).unwrap();

    let totals = outcome.summary.share(&share).unwrap();
    assert_eq!(totals.state, ShareState::Complete);
    let content = fs::read_to_string(totals.report_path.as_ref().unwrap()).unwrap();
    assert_eq!(content.trim_end(), "FilePath,Status,LastModified,Type,FoundString,Reason");
}

#[test]
fn test_vba_part_with_huge_declared_size_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let share_dir = temp.path().join("share");
    fs::create_dir_all(&share_dir).unwrap();
    let bomb = share_dir.join("bomb.docm");
    write_zip_document(&bomb, "word", Some(&vba_project(&[("Module1", UNC_MACRO)])));
    set_declared_size(&bomb, "word/vbaProject.bin", 0xFFFF_FFF0);
    write_zip_document(
        &share_dir.join("fine.xlsm"),
        "xl",
        Some(&vba_project(&[("Module1", DRIVE_MACRO)])),
    );

    let result = scan_file(&bomb, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Error);
    assert_eq!(result.error_kind, Some("ContainerCorrupt"));
    assert!(result.reason.contains("exceeds"), "{}", result.reason);

    let share = share_of(&share_dir);
    let coordinator = Coordinator::new(config(temp.path().join("out"), 2), CancelToken::new()).unwrap();
    let outcome = coordinator.run(std::slice::from_ref(&share)).unwrap();
    let totals = outcome.summary.share(&share).unwrap();
    assert_eq!(totals.state, ShareState::Complete);
    assert_eq!(totals.files_scanned, 2);
    assert_eq!(totals.network_paths_found, 1);
    assert_eq!(totals.errors_by_kind.get("ContainerCorrupt"), Some(&1));
}

#[test]
fn test_legacy_presentation_projects() {
    let temp = TempDir::new().unwrap();
    let with_unc = temp.path().join("deck.ppt");
    write_legacy_presentation(&with_unc, Some(&vba_project(&[("Module1", UNC_MACRO)])), true);
    let plain = temp.path().join("plain.ppt");
    write_legacy_presentation(&plain, None, false);
    let lost = temp.path().join("lost.pps");
    write_legacy_presentation(&lost, None, true);

    let result = scan_file(&with_unc, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Found);
    assert_eq!(result.document_type, DocumentType::PowerPoint);
    assert_eq!(result.found_string, r"\\fileserver01\finance\budget.xlsx");

    assert_eq!(scan_file(&plain, &patterns(), false).status, ScanStatus::NotFound);

    let result = scan_file(&lost, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Error);
    assert_eq!(result.error_kind, Some("MacroDecodeFailed"));
    assert!(result.reason.contains("decode"), "{}", result.reason);
}

#[test]
fn test_encrypted_package_has_its_own_reason() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("secret.docm");
    write_encrypted_package(&path);

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Error);
    assert_eq!(result.document_type, DocumentType::Word);
    assert_eq!(result.error_kind, Some("EncryptedDocument"));
    assert!(result.reason.starts_with("EncryptedDocument: "), "{}", result.reason);
}

#[test]
fn test_compound_file_with_ooxml_extension_is_read() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("renamed.docm");
    write_legacy_document(&path, Some("/Macros/VBA"), &[("NewMacros", DRIVE_MACRO)]);

    let result = scan_file(&path, &patterns(), false);
    assert_eq!(result.status, ScanStatus::Found);
    assert_eq!(result.found_string, r"Z:\data\file.xlsx");
}

#[test]
fn test_summary_counts_folders_and_error_causes() {
    let temp = TempDir::new().unwrap();
    let share_dir = temp.path().join("corp").join("docs");
    fs::create_dir_all(&share_dir).unwrap();
    let candidates = populate_share(&share_dir);
    write_encrypted_package(&share_dir.join("finance").join("payroll.xlsm"));
    let share = share_of(&share_dir);

    let coordinator = Coordinator::new(config(temp.path().join("out"), 2), CancelToken::new()).unwrap();
    let outcome = coordinator.run(std::slice::from_ref(&share)).unwrap();
    let summary = &outcome.summary;

    assert_eq!(summary.files_scanned(), candidates + 1);
    assert_eq!(summary.folders_scanned(), 4);
    assert_eq!(summary.errors(), 2);
    let by_kind = summary.errors_by_kind();
    assert_eq!(by_kind.get("ContainerCorrupt"), Some(&1));
    assert_eq!(by_kind.get("EncryptedDocument"), Some(&1));

    let log = fs::read_to_string(&outcome.summary_log).unwrap();
    assert!(log.contains("Folders scanned:     4"), "{log}");
    assert!(log.contains("EncryptedDocument=1"), "{log}");
}

#[test]
fn test_cancel_mid_run_keeps_reports_consistent() {
    let temp = TempDir::new().unwrap();
    let share_dir = temp.path().join("bulk").join("share");
    fs::create_dir_all(&share_dir).unwrap();
    let candidates = 300;
    for i in 0..candidates {
        write_zip_document(&share_dir.join(format!("doc{i:03}.docx")), "word", None);
    }
    let share = share_of(&share_dir);
    let out = temp.path().join("out");

    let cancel = CancelToken::new();
    let progress = CancelAfter {
        token: cancel.clone(),
        after: 5,
    };
    let coordinator = Coordinator::new(config(out.clone(), 1), cancel.clone())
        .unwrap()
        .with_progress(progress);
    let outcome = coordinator.run(std::slice::from_ref(&share)).unwrap();
    let summary = &outcome.summary;

    assert!(cancel.is_cancelled());
    assert!(summary.is_cancelled());
    assert!(summary.files_scanned() >= 5);
    assert!(summary.files_scanned() < candidates, "{}", summary.files_scanned());
    assert!(summary.files_scanned() + summary.abandoned() <= candidates);

    let totals = summary.share(&share).unwrap();
    assert_eq!(totals.state, ShareState::Cancelled);
    let rows = read_rows(totals.report_path.as_ref().unwrap());
    assert_eq!(rows.len(), summary.files_scanned());
    assert!(partial_reports(&out).is_empty());

    let log = fs::read_to_string(&outcome.summary_log).unwrap();
    assert!(log.contains("CANCELLED"), "{log}");
}

#[cfg(unix)]
#[test]
fn test_directory_loop_becomes_error_row() {
    let temp = TempDir::new().unwrap();
    let share_dir = temp.path().join("loop").join("share");
    let sub = share_dir.join("sub");
    fs::create_dir_all(&sub).unwrap();
    write_zip_document(&share_dir.join("doc.docx"), "word", None);
    std::os::unix::fs::symlink(&share_dir, sub.join("back")).unwrap();
    let share = share_of(&share_dir);

    let mut cfg = config(temp.path().join("out"), 2);
    cfg.follow_symlinks = true;
    let coordinator = Coordinator::new(cfg, CancelToken::new()).unwrap();
    let outcome = coordinator.run(std::slice::from_ref(&share)).unwrap();

    let totals = outcome.summary.share(&share).unwrap();
    assert_eq!(totals.state, ShareState::Complete);
    assert_eq!(totals.files_scanned, 2);
    assert_eq!(totals.errors, 1);
    assert_eq!(totals.errors_by_kind.get("DirectoryLoop"), Some(&1));

    let rows = read_rows(totals.report_path.as_ref().unwrap());
    assert_eq!(rows.len(), 2);
    let looped = rows.iter().find(|r| &r[1] == "Error").unwrap();
    assert!(looped[0].ends_with("back"), "{:?}", looped);
    assert!(looped[5].starts_with("DirectoryLoop: "), "{:?}", looped);
}
