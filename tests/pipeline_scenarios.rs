mod support;

use assert_matches::assert_matches;
use quality_report::config::ErrorPolicy;
use quality_report::error::ReportError;
use quality_report::grouper;
use quality_report::layout::Cell;
use quality_report::model::Resolution;
use quality_report::pipeline::{EXIT_FAILURE, EXIT_GENERATED, EXIT_NO_SUBMISSIONS, RunOutcome};
use std::fs;
use support::{
    FakeFileStore, METADATA_HEADERS, REPORT_DATE, SOURCE_DATE, TestWorkspace, drive_link,
    jpeg_bytes, png_bytes, product_header, strings, submission_table,
};

fn headers_with(photo_headers: &[String]) -> Vec<String> {
    let mut headers = strings(&METADATA_HEADERS);
    headers.extend(photo_headers.iter().cloned());
    headers
}

fn metadata_row(date: &str, store: &str, name: &str) -> Vec<String> {
    strings(&[date, store, name, "555-0101", "lead@example.com"])
}

fn page_count(path: &std::path::Path) -> usize {
    lopdf::Document::load(path).expect("load pdf").get_pages().len()
}

/// One store, two valid overall photos, three product columns with one
/// broken link.
#[test]
fn scenario_a_single_store_with_one_broken_product_link() {
    let ws = TestWorkspace::new();
    let headers = headers_with(&[
        "Overall Photo 1".to_string(),
        "Overall Photo 2".to_string(),
        product_header("Cherries"),
        product_header("apples"),
        product_header("Bananas"),
    ]);
    let mut row = metadata_row(SOURCE_DATE, "Main St Market", "Ana");
    row.extend([
        drive_link("overall-1"),
        "https://drive.google.com/open?id=overall-2".to_string(),
        drive_link("missing-cherries"),
        drive_link("apples-id"),
        "https://drive.google.com/uc?id=bananas-id".to_string(),
    ]);
    let table = submission_table(&headers, &[row]);

    let store = FakeFileStore::new()
        .with_file("overall-1", jpeg_bytes(640, 480, [10, 120, 10]))
        .with_file("overall-2", png_bytes(480, 640, [120, 10, 10]))
        .with_file("apples-id", jpeg_bytes(300, 400, [200, 20, 20]))
        .with_file("bananas-id", png_bytes(400, 300, [220, 220, 0]));
    let pipeline = ws.pipeline(&store, ErrorPolicy::ContinueOnError);

    let records = grouper::group(&table, REPORT_DATE).expect("group");
    let prepared = pipeline
        .prepare(&records, &ws.path("work"))
        .expect("prepare");
    assert_eq!(prepared.sections.len(), 1);
    let section = &prepared.sections[0];

    let overall = section.overall_row().expect("overall row");
    assert_eq!(overall.rows.len(), 1);
    assert!(overall.rows[0].iter().all(|cell| matches!(cell, Cell::Image { .. })));

    let grid = section.product_grid().expect("product grid");
    assert_eq!(grid.rows.len(), 1);
    let paths: Vec<_> = grid.rows[0]
        .iter()
        .map(|cell| cell.image_path().expect("image cell").to_path_buf())
        .collect();
    let store_dir = ws.image_dir().join("Main_St_Market");
    let work = ws.path("work");
    assert_eq!(
        paths,
        vec![
            work.join("Main_St_Market_apples_overlay.jpg"),
            work.join("Main_St_Market_Bananas_overlay.jpg"),
            ws.placeholder(),
        ]
    );
    assert!(paths[..2].iter().all(|path| path.is_file()));
    assert!(store_dir.join("apples.jpg").is_file());
    assert!(!store_dir.join("Cherries.jpg").exists());
    assert!(!work.join("assets_not_uploaded_overlay.png").exists());

    assert_eq!(prepared.summary.image_count(Resolution::Fetched), 4);
    assert_eq!(prepared.summary.image_count(Resolution::DownloadFailed), 1);

    let outcome = pipeline.run(&table).expect("run");
    assert_eq!(outcome.exit_code(), EXIT_GENERATED);
    let path = assert_matches!(outcome, RunOutcome::Generated { path, .. } => path);
    assert_eq!(
        path,
        ws.output_dir().join("Daily_Quality_Report_2026-10-19.pdf")
    );
    assert_eq!(page_count(&path), 1);
    assert!(!ws.output_dir().join("temp_overlays").exists());
}

/// Two stores and no product columns: two sections, exactly one break.
#[test]
fn scenario_b_two_stores_are_separated_by_one_page_break() {
    let ws = TestWorkspace::new();
    let headers = headers_with(&["Overall Photo 1".to_string(), "Overall Photo 2".to_string()]);
    let mut first = metadata_row(SOURCE_DATE, "Harbor", "Ben");
    first.extend([drive_link("harbor-1"), String::new()]);
    let mut second = metadata_row(SOURCE_DATE, "Hilltop", "Cy");
    second.extend([drive_link("hill-1"), drive_link("hill-2")]);
    let table = submission_table(&headers, &[first, second]);

    let store = FakeFileStore::new()
        .with_file("harbor-1", jpeg_bytes(200, 150, [0, 0, 200]))
        .with_file("hill-1", jpeg_bytes(200, 150, [0, 200, 0]))
        .with_file("hill-2", jpeg_bytes(150, 200, [200, 0, 0]));
    let pipeline = ws.pipeline(&store, ErrorPolicy::ContinueOnError);

    let records = grouper::group(&table, REPORT_DATE).expect("group");
    let prepared = pipeline
        .prepare(&records, &ws.path("work"))
        .expect("prepare");
    assert_eq!(prepared.sections.len(), 2);

    let first = &prepared.sections[0];
    assert_eq!(first.store_name, "Harbor");
    let header = first.header().expect("header");
    assert_eq!(header.details[0], ("Name".to_string(), "Ben".to_string()));
    assert!(first.product_grid().expect("grid").rows.is_empty());
    assert_eq!(
        first.overall_row().expect("overall").rows[0][1].image_path(),
        Some(ws.placeholder().as_path())
    );

    let second = &prepared.sections[1];
    assert_eq!(second.store_name, "Hilltop");
    assert_eq!(
        second.header().expect("header").details[0].1,
        "Cy".to_string()
    );

    let outcome = pipeline.run(&table).expect("run");
    let path = assert_matches!(outcome, RunOutcome::Generated { path, .. } => path);
    assert_eq!(page_count(&path), 2);
}

#[test]
fn same_product_label_in_two_stores_gets_distinct_overlays() {
    let ws = TestWorkspace::new();
    let headers = headers_with(&[product_header("Kiwi")]);
    let mut north = metadata_row(SOURCE_DATE, "North", "Ben");
    north.push(drive_link("kiwi-north"));
    let mut south = metadata_row(SOURCE_DATE, "South", "Cy");
    south.push(drive_link("kiwi-south"));
    let table = submission_table(&headers, &[north, south]);

    let store = FakeFileStore::new()
        .with_file("kiwi-north", jpeg_bytes(300, 400, [0, 160, 0]))
        .with_file("kiwi-south", jpeg_bytes(300, 400, [160, 0, 0]));
    let pipeline = ws.pipeline(&store, ErrorPolicy::ContinueOnError);

    let records = grouper::group(&table, REPORT_DATE).expect("group");
    let work = ws.path("work");
    let prepared = pipeline.prepare(&records, &work).expect("prepare");
    let kiwi_paths: Vec<_> = prepared
        .sections
        .iter()
        .map(|section| {
            section.product_grid().expect("grid").rows[0][0]
                .image_path()
                .expect("image cell")
                .to_path_buf()
        })
        .collect();
    assert_eq!(
        kiwi_paths,
        vec![work.join("North_Kiwi_overlay.jpg"), work.join("South_Kiwi_overlay.jpg")]
    );
    assert_ne!(kiwi_paths[0], kiwi_paths[1]);
    assert!(kiwi_paths.iter().all(|path| path.is_file()));

    let outcome = pipeline.run(&table).expect("run");
    let path = assert_matches!(outcome, RunOutcome::Generated { path, .. } => path);
    assert_eq!(page_count(&path), 2);
    assert!(!ws.output_dir().join("temp_overlays").exists());
}

#[test]
fn scenario_c_no_rows_for_date_is_an_empty_outcome() {
    let ws = TestWorkspace::new();
    let headers = headers_with(&[product_header("Kiwi")]);
    let mut row = metadata_row("10/18/2026", "Harbor", "Ben");
    row.push(drive_link("kiwi"));
    let table = submission_table(&headers, &[row]);

    let store = FakeFileStore::new();
    let outcome = ws
        .pipeline(&store, ErrorPolicy::ContinueOnError)
        .run(&table)
        .expect("run");

    assert_matches!(outcome, RunOutcome::NoSubmissions);
    assert_eq!(outcome.exit_code(), EXIT_NO_SUBMISSIONS);
    assert_eq!(store.call_count(), 0);
    assert!(!ws.output_dir().exists());
}

fn two_store_table() -> quality_report::table::SheetTable {
    let headers = headers_with(&[product_header("Kiwi")]);
    let mut bad = metadata_row(SOURCE_DATE, "Bad Store", "Ben");
    bad.push(drive_link("kiwi-bad"));
    let mut good = metadata_row(SOURCE_DATE, "Good Store", "Cy");
    good.push(drive_link("kiwi-good"));
    submission_table(&headers, &[bad, good])
}

/// A regular file where the store's image directory should go
fn block_store_dir(ws: &TestWorkspace, dir_name: &str) {
    fs::create_dir_all(ws.image_dir()).expect("image dir");
    fs::write(ws.image_dir().join(dir_name), b"in the way").expect("blocker");
}

#[test]
fn failing_store_is_skipped_when_continuing_on_error() {
    let ws = TestWorkspace::new();
    block_store_dir(&ws, "Bad_Store");
    let store = FakeFileStore::new().with_file("kiwi-good", png_bytes(50, 50, [0, 255, 0]));

    let outcome = ws
        .pipeline(&store, ErrorPolicy::ContinueOnError)
        .run(&two_store_table())
        .expect("run");

    let summary = assert_matches!(outcome, RunOutcome::Generated { summary, .. } => summary);
    assert_eq!(summary.stores_rendered, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].store, "Bad Store");
    assert!(summary.is_partial_success());
    assert_eq!(store.calls(), vec!["kiwi-good".to_string()]);
}

#[test]
fn failing_store_aborts_run_when_policy_is_abort() {
    let ws = TestWorkspace::new();
    block_store_dir(&ws, "Bad_Store");
    let store = FakeFileStore::new().with_file("kiwi-good", png_bytes(50, 50, [0, 255, 0]));

    let err = ws
        .pipeline(&store, ErrorPolicy::Abort)
        .run(&two_store_table())
        .unwrap_err();

    assert_matches!(err, ReportError::Store { ref store, .. } if store == "Bad Store");
    assert!(!err.is_fatal());
    assert!(!ws.output_dir().join("Daily_Quality_Report_2026-10-19.pdf").exists());
    assert!(!ws.output_dir().join("temp_overlays").exists());
    assert_eq!(store.call_count(), 0);
}

#[test]
fn every_store_failing_renders_nothing() {
    let ws = TestWorkspace::new();
    block_store_dir(&ws, "Bad_Store");
    block_store_dir(&ws, "Good_Store");
    let store = FakeFileStore::new();

    let outcome = ws
        .pipeline(&store, ErrorPolicy::ContinueOnError)
        .run(&two_store_table())
        .expect("run");

    assert_eq!(outcome.exit_code(), EXIT_FAILURE);
    let summary = assert_matches!(outcome, RunOutcome::NothingRendered { summary } => summary);
    assert_eq!(summary.failures.len(), 2);
    assert_eq!(summary.success_rate(), 0.0);
}

#[test]
fn missing_required_column_is_fatal() {
    let ws = TestWorkspace::new();
    let table = submission_table(
        &strings(&["Date", "Store Name", "Name"]),
        &[strings(&[SOURCE_DATE, "Harbor", "Ben"])],
    );
    let err = ws
        .pipeline(FakeFileStore::new(), ErrorPolicy::ContinueOnError)
        .run(&table)
        .unwrap_err();
    assert!(err.is_fatal());
    assert_matches!(err, ReportError::MissingColumns { columns } if columns == vec!["Phone Number".to_string()]);
}

#[test]
fn empty_product_cells_render_placeholders_without_downloads() {
    let ws = TestWorkspace::new();
    let headers = headers_with(&[product_header("Kiwi"), product_header("Figs")]);
    let mut row = metadata_row(SOURCE_DATE, "Harbor", "Ben");
    row.extend([String::new(), "   ".to_string()]);
    let table = submission_table(&headers, &[row]);

    let store = FakeFileStore::new();
    let pipeline = ws.pipeline(&store, ErrorPolicy::ContinueOnError);
    let records = grouper::group(&table, REPORT_DATE).expect("group");
    let prepared = pipeline.prepare(&records, &ws.path("work")).expect("prepare");

    let grid = prepared.sections[0].product_grid().expect("grid");
    assert_eq!(grid.rows.len(), 1);
    assert_eq!(grid.rows[0][0].image_path(), Some(ws.placeholder().as_path()));
    assert_eq!(grid.rows[0][1].image_path(), Some(ws.placeholder().as_path()));
    assert!(grid.rows[0][2].is_empty());
    assert_eq!(prepared.summary.image_count(Resolution::NoReference), 2);
    assert_eq!(store.call_count(), 0);
}
