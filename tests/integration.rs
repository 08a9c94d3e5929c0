//! Integration tests for RFM Segmenter

use rfm_segmenter::config::AppConfig;
use rfm_segmenter::{
    ModelArtifacts, SegmentError, SegmentLabeler, SegmentTier, SegmentationPipeline,
};
use rust_decimal::Decimal;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, Builder, NamedTempFile};

const HEADER: &str =
    "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country";

fn shipped(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(path)
}

/// Pipeline built from the artifacts and segment bindings shipped in the repository
fn shipped_pipeline() -> SegmentationPipeline {
    let config = AppConfig::load_from_path(shipped("config/config.toml")).unwrap();
    let artifacts = ModelArtifacts::load(
        &shipped("models/rfm_scaler.json"),
        &shipped("models/kmeans_model.json"),
    )
    .unwrap();
    let labeler = SegmentLabeler::from_bindings(&config.segments).unwrap();
    SegmentationPipeline::new(artifacts, labeler).unwrap()
}

fn sample_rows() -> Vec<String> {
    let mut rows = vec![
        // Customer 17850 - two invoices, long inactive
        "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,02/01/2011 08:26,2.55,17850,United Kingdom".to_string(),
        "536365,71053,WHITE METAL LANTERN,6,02/01/2011 08:26,3.39,17850,United Kingdom".to_string(),
        "536366,22633,HAND WARMER UNION JACK,6,02/01/2011 09:00,1.85,17850,United Kingdom".to_string(),
        // Customer 13047 - one small recent purchase and a return
        "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,12/05/2011 08:34,2.75,13047,United Kingdom".to_string(),
        "C536368,84406B,CREAM CUPID HEARTS COAT HANGER,-5,12/05/2011 09:10,2.75,13047,United Kingdom".to_string(),
        // Anonymous and zero-price rows
        "536369,22752,SET 7 BABUSHKA NESTING BOXES,2,12/06/2011 10:15,7.65,,United Kingdom".to_string(),
        "536370,22457,NATURAL SLATE HEART CHALKBOARD,4,12/06/2011 11:00,0,99999,United Kingdom".to_string(),
    ];

    // Customer 12347 - fifteen invoices of 1000, the last one is the batch maximum
    for i in 0..15 {
        let date = if i == 14 {
            "12/09/2011 12:50".to_string()
        } else {
            format!("11/{:02}/2011 10:00", i + 1)
        };
        rows.push(format!(
            "5800{i:02},21730,GLASS STAR FROSTED T-LIGHT HOLDER,100,{date},10.00,12347,Iceland"
        ));
    }

    rows
}

fn write_csv(rows: &[String]) -> NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_end_to_end_pipeline() {
    let pipeline = shipped_pipeline();
    let input = write_csv(&sample_rows());

    let report = pipeline.run_file(input.path()).unwrap();

    // 3 customers; 99999 only has a zero-price row
    assert_eq!(report.len(), 3);
    let rows = report.rows();

    let loyal = &rows[0];
    assert_eq!(loyal.profile.customer_id, 12347);
    assert_eq!(loyal.profile.recency, 1);
    assert_eq!(loyal.profile.frequency, 15);
    assert_eq!(loyal.profile.monetary, Decimal::from(15000));
    assert_eq!(loyal.cluster_id, 3);
    assert_eq!(loyal.segment, SegmentTier::Loyal);

    let casual = &rows[1];
    assert_eq!(casual.profile.customer_id, 13047);
    assert_eq!(casual.profile.recency, 5);
    assert_eq!(casual.profile.frequency, 1);
    assert_eq!(casual.profile.monetary, Decimal::from(22));
    assert_eq!(casual.segment, SegmentTier::Casual);

    let churned = &rows[2];
    assert_eq!(churned.profile.customer_id, 17850);
    assert_eq!(churned.profile.recency, 312);
    assert_eq!(churned.profile.frequency, 2);
    assert_eq!(churned.profile.monetary, Decimal::new(4674, 2));
    assert_eq!(churned.segment, SegmentTier::Churned);

    let total: usize = report.summary().iter().map(|c| c.customers).sum();
    assert_eq!(total, 3);
}

#[test]
fn test_profile_invariants_hold() {
    let pipeline = shipped_pipeline();
    let input = write_csv(&sample_rows());
    let report = pipeline.run_file(input.path()).unwrap();

    let model_ids = pipeline.clusters().cluster_ids();
    for row in report.rows() {
        assert!(row.profile.recency >= 1);
        assert!(row.profile.frequency >= 1);
        assert!(row.profile.monetary > Decimal::ZERO);
        assert!(model_ids.contains(&row.cluster_id));
    }
}

#[test]
fn test_shuffled_input_gives_identical_report() {
    let pipeline = shipped_pipeline();
    let rows = sample_rows();
    let mut shuffled = rows.clone();
    shuffled.reverse();
    shuffled.rotate_left(5);

    let original = pipeline.run_file(write_csv(&rows).path()).unwrap();
    let reordered = pipeline.run_file(write_csv(&shuffled).path()).unwrap();

    assert_eq!(original, reordered);
    assert_eq!(
        original.to_csv_bytes().unwrap(),
        reordered.to_csv_bytes().unwrap()
    );
}

#[test]
fn test_rerun_gives_identical_assignments() {
    let pipeline = shipped_pipeline();
    let input = write_csv(&sample_rows());

    let first = pipeline.run_file(input.path()).unwrap();
    let second = pipeline.run_file(input.path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_all_anonymous_batch_is_empty_report() {
    let pipeline = shipped_pipeline();
    let input = write_csv(&[
        "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/01/2010 08:26,2.55,,United Kingdom".to_string(),
        "536366,22633,HAND WARMER UNION JACK,6,12/01/2010 08:28,1.85,,United Kingdom".to_string(),
    ]);

    let report = pipeline.run_file(input.path()).unwrap();
    assert!(report.is_empty());
    assert!(report.summary().is_empty());

    let dir = tempdir().unwrap();
    let report_path = dir.path().join("report.csv");
    report.write_csv(&report_path).unwrap();
    let written = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(written.lines().count(), 1);
}

#[test]
fn test_batch_errors_leave_pipeline_usable() {
    let pipeline = shipped_pipeline();

    let mut bad = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(bad, "InvoiceNo,Quantity,InvoiceDate,UnitPrice").unwrap();
    writeln!(bad, "1,1,12/01/2010 08:26,1.0").unwrap();
    let err = pipeline.run_file(bad.path()).unwrap_err();
    assert!(matches!(err, SegmentError::MissingRequiredColumn { .. }));
    assert!(!err.is_startup_fatal());

    let unsupported = Builder::new().suffix(".pdf").tempfile().unwrap();
    let err = pipeline.run_file(unsupported.path()).unwrap_err();
    assert!(matches!(err, SegmentError::UnsupportedInputFormat { .. }));

    // The next batch still runs
    let good = write_csv(&sample_rows());
    assert_eq!(pipeline.run_file(good.path()).unwrap().len(), 3);
}

#[test]
fn test_cancellation_with_unreadable_date_is_dropped() {
    let mut rows = sample_rows();
    rows.push(
        "C536380,22633,HAND WARMER UNION JACK,-1,01.12.2010 10:00,1.85,17850,United Kingdom"
            .to_string(),
    );
    let report = shipped_pipeline().run_file(write_csv(&rows).path()).unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.rows()[2].profile.monetary, Decimal::new(4674, 2));
}

#[test]
fn test_oversized_sale_fails_only_its_batch() {
    let pipeline = shipped_pipeline();
    let huge = write_csv(&[format!(
        "536999,22633,HAND WARMER UNION JACK,{},12/01/2011 10:00,100000000000,12346,United Kingdom",
        i64::MAX
    )]);

    let err = pipeline.run_file(huge.path()).unwrap_err();
    assert!(matches!(err, SegmentError::AmountOverflow { customer_id: 12346 }));
    assert!(!err.is_startup_fatal());

    assert_eq!(pipeline.run_file(write_csv(&sample_rows()).path()).unwrap().len(), 3);
}

#[test]
fn test_latin1_input() {
    let mut bytes = format!("{HEADER}\n").into_bytes();
    bytes.extend_from_slice(b"536370,22728,CAF\xC9 AU LAIT MUG,24,12/01/2010 08:45,3.75,12583,France\n");
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let batch = rfm_segmenter::load_transactions(file.path()).unwrap();
    assert_eq!(batch.records[0].description, "CAFÉ AU LAIT MUG");

    let report = shipped_pipeline().run_file(file.path()).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.rows()[0].profile.monetary, Decimal::from(90));
}

#[test]
fn test_stale_segment_configuration_is_fatal() {
    let mut clusters = Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        clusters,
        r#"{{"format_version":1,"features":["recency","frequency","monetary"],
            "centroids":[{{"id":0,"center":[0,0,0]}},{{"id":4,"center":[1,1,1]}}]}}"#
    )
    .unwrap();

    let artifacts =
        ModelArtifacts::load(&shipped("models/rfm_scaler.json"), clusters.path()).unwrap();
    let err = SegmentationPipeline::new(artifacts, SegmentLabeler::default()).unwrap_err();
    assert!(matches!(err, SegmentError::UnmappedCluster { cluster_id: 4 }));
    assert!(err.is_startup_fatal());
}

#[test]
fn test_missing_artifact_is_startup_fatal() {
    let dir = tempdir().unwrap();
    let err = ModelArtifacts::load(
        &dir.path().join("rfm_scaler.json"),
        &shipped("models/kmeans_model.json"),
    )
    .unwrap_err();
    assert!(err.is_startup_fatal());
}

#[test]
fn test_report_and_summary_files() {
    let pipeline = shipped_pipeline();
    let report = pipeline.run_file(write_csv(&sample_rows()).path()).unwrap();

    let dir = tempdir().unwrap();
    let report_path = dir.path().join("segmented.csv");
    let summary_path = dir.path().join("summary.csv");
    report.write_csv(&report_path).unwrap();
    report.write_summary_csv(&summary_path).unwrap();

    let written = std::fs::read_to_string(&report_path).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next().unwrap(),
        "CustomerID,Recency,Frequency,Monetary,Cluster,Segment,Action"
    );
    assert!(lines.next().unwrap().starts_with("12347,1,15,15000,3,Loyal (Silver),"));

    let summary = std::fs::read_to_string(&summary_path).unwrap();
    assert_eq!(
        summary.lines().collect::<Vec<_>>(),
        vec![
            "Segment,Customers",
            "Loyal (Silver),1",
            "Casual (Bronze),1",
            "Inactive (Churn),1",
        ]
    );
}

#[test]
fn test_shipped_demo_file() {
    let report = shipped_pipeline()
        .run_file(&shipped("demos/sample_transactions.csv"))
        .unwrap();

    // 12583, 13047, 14911 and 17850; the anonymous row is dropped
    let ids: Vec<i64> = report.rows().iter().map(|r| r.profile.customer_id).collect();
    assert_eq!(ids, vec![12583, 13047, 14911, 17850]);
}
