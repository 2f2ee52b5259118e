//! Integration tests for ChurnForge

use churnforge::config::EncoderConfig;
use churnforge::data::write_csv;
use churnforge::{
    load_client_data, load_modelling_data, load_price_data, synthesize_features, train_and_evaluate,
    Encoder, FeatureMatrix, ForestConfig, PipelineConfig, PipelineError,
};
use polars::prelude::*;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const CLIENT_HEADER: &str = "id,channel_sales,cons_12m,cons_gas_12m,cons_last_month,date_activ,date_end,date_modif_prod,date_renewal,forecast_cons_12m,forecast_cons_year,forecast_discount_energy,forecast_meter_rent_12m,forecast_price_energy_off_peak,forecast_price_energy_peak,forecast_price_pow_off_peak,has_gas,margin_net_pow_ele,origin_up,churn";

const CHANNELS: [&str; 3] = [
    "foosdfpfkusacimwkcsosbicdxkicaua",
    "lmkebamcaaclubfxadlmueccxoimlema",
    "MISSING",
];
const ORIGINS: [&str; 3] = [
    "lxidpiddsbxsbosboudacockeimpuepw",
    "kamkkxfxxuwbdslkwifmmcsiusiuosws",
    "ldkssxwpmemidmecebumciepifcamkci",
];

/// Client file with `n` clients; every fourth client churns and has a wide price spread
fn create_client_csv(n: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", CLIENT_HEADER).unwrap();
    for i in 0..n {
        let churn = i % 4 == 0;
        let activ_year = 2005 + (i % 9);
        writeln!(
            file,
            "C{i},{channel},{cons},{gas},{last},{activ_year}-03-15,2016-0{end_month}-20,2014-11-01,2015-0{end_month}-21,{fcons},{fyear},0,{rent},0.14,0.0,44.3,{has_gas},{margin},{origin},{churn}",
            channel = CHANNELS[i % 3],
            cons = 1000 + i * 37,
            gas = if i % 5 == 0 { 1200 } else { 0 },
            last = i * 3,
            end_month = 1 + i % 9,
            fcons = 150 + i,
            fyear = i % 13,
            rent = 10 + i % 30,
            has_gas = if i % 5 == 0 { "t" } else { "f" },
            margin = (if churn { 40.0 } else { 15.0 }) + (i % 3) as f64,
            origin = ORIGINS[i % 3],
            churn = u8::from(churn),
        )
        .unwrap();
    }
    file
}

/// Twelve monthly quotes per client; clients whose index ends in 9 get none
fn create_price_csv(n: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "id,price_date,price_off_peak_var,price_peak_var,price_mid_peak_var,price_off_peak_fix,price_peak_fix,price_mid_peak_fix"
    )
    .unwrap();
    for i in 0..n {
        if i % 10 == 9 {
            continue;
        }
        let spread = if i % 4 == 0 { 0.05 } else { 0.01 };
        // Write months in reverse to exercise explicit period sorting
        for month in (1..=12).rev() {
            let off_peak = 0.10 + 0.002 * month as f64;
            writeln!(
                file,
                "C{i},2015-{month:02}-01,{off_peak:.4},{peak:.4},{mid:.4},{fix:.3},24.4,16.2",
                peak = off_peak - spread,
                mid = off_peak - 2.0 * spread,
                fix = 40.0 + 0.1 * month as f64,
            )
            .unwrap();
        }
    }
    file
}

fn path(file: &NamedTempFile) -> &str {
    file.path().to_str().unwrap()
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        forest: ForestConfig {
            n_trees: 20,
            max_depth: Some(6),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_end_to_end_pipeline() {
    let clients = create_client_csv(40);
    let prices = create_price_csv(40);

    let client_df = load_client_data(path(&clients)).unwrap();
    let price_df = load_price_data(path(&prices)).unwrap();
    assert_eq!(client_df.height(), 40);

    // Clients 9, 19, 29 and 39 have no price series
    let enriched = synthesize_features(&client_df, &price_df).unwrap();
    assert_eq!(enriched.height(), 36);

    let config = test_config();
    let encoded = Encoder::new(config.encoder.clone()).transform(&enriched).unwrap();
    let matrix = FeatureMatrix::from_frame(&encoded, "churn").unwrap();
    assert_eq!(matrix.n_samples(), 36);
    assert!(!matrix.feature_names.iter().any(|n| n == "id" || n == "churn"));

    let outcome = train_and_evaluate(&matrix, &config).unwrap();
    assert_eq!(outcome.test_rows, 9);
    assert_eq!(outcome.train_rows, 27);
    assert!(outcome.report.accuracy >= 0.0 && outcome.report.accuracy <= 1.0);
    let total: usize = outcome.report.confusion.iter().flatten().sum();
    assert_eq!(total, 9);
}

#[test]
fn test_offpeak_diff_uses_chronological_order() {
    let clients = create_client_csv(4);
    let prices = create_price_csv(4);

    let client_df = load_client_data(path(&clients)).unwrap();
    let price_df = load_price_data(path(&prices)).unwrap();
    let enriched = synthesize_features(&client_df, &price_df).unwrap();

    let row = enriched
        .lazy()
        .filter(col("id").eq(lit("C1")))
        .collect()
        .unwrap();
    let energy = row
        .column("offpeak_diff_dec_january_energy")
        .unwrap()
        .f64()
        .unwrap()
        .get(0)
        .unwrap();
    // December (0.124) minus January (0.102), although December is written first
    assert!((energy - 0.022).abs() < 1e-9);
}

#[test]
fn test_encoded_export_round_trips_into_trainer() {
    let clients = create_client_csv(40);
    let prices = create_price_csv(40);
    let dir = tempdir().unwrap();
    let export_path = dir.path().join("data_for_modelling.csv");
    let export_str = export_path.to_str().unwrap();

    let enriched = synthesize_features(
        &load_client_data(path(&clients)).unwrap(),
        &load_price_data(path(&prices)).unwrap(),
    )
    .unwrap();
    let mut encoded = Encoder::new(EncoderConfig::default()).transform(&enriched).unwrap();
    write_csv(&mut encoded, export_str).unwrap();

    let modelling = load_modelling_data(export_str, "churn").unwrap();
    assert_eq!(modelling.height(), encoded.height());

    let matrix = FeatureMatrix::from_frame(&modelling, "churn").unwrap();
    let outcome = train_and_evaluate(&matrix, &test_config()).unwrap();
    assert_eq!(outcome.test_rows + outcome.train_rows, 36);
}

#[test]
fn test_same_seed_same_report() {
    let clients = create_client_csv(40);
    let prices = create_price_csv(40);
    let enriched = synthesize_features(
        &load_client_data(path(&clients)).unwrap(),
        &load_price_data(path(&prices)).unwrap(),
    )
    .unwrap();
    let encoded = Encoder::default().transform(&enriched).unwrap();
    let matrix = FeatureMatrix::from_frame(&encoded, "churn").unwrap();

    let first = train_and_evaluate(&matrix, &test_config()).unwrap();
    let second = train_and_evaluate(&matrix, &test_config()).unwrap();
    assert_eq!(first.report, second.report);
}

#[test]
fn test_error_handling_missing_input() {
    let err = load_price_data("does/not/exist/price_data.csv").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::InputNotFound { .. })
    ));
}

#[test]
fn test_error_handling_disjoint_stores() {
    let clients = create_client_csv(3);
    let mut prices = NamedTempFile::new().unwrap();
    writeln!(
        prices,
        "id,price_date,price_off_peak_var,price_peak_var,price_mid_peak_var,price_off_peak_fix,price_peak_fix,price_mid_peak_fix"
    )
    .unwrap();
    writeln!(prices, "X1,2015-01-01,0.12,0.10,0.07,40.6,24.4,16.2").unwrap();

    let err = synthesize_features(
        &load_client_data(path(&clients)).unwrap(),
        &load_price_data(path(&prices)).unwrap(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::EmptyJoinResult { .. })
    ));
}
