//! Loading of the client, price and modelling tables using Polars

use crate::error::PipelineError;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Format of every date column in the input files
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Lifecycle dates of a client contract
pub const CLIENT_DATE_COLUMNS: [&str; 4] = ["date_activ", "date_end", "date_modif_prod", "date_renewal"];

/// Price components of a quote: off-peak/peak/mid-peak for energy (var) and power (fix)
pub const PRICE_COLUMNS: [&str; 6] = [
    "price_off_peak_var",
    "price_peak_var",
    "price_mid_peak_var",
    "price_off_peak_fix",
    "price_peak_fix",
    "price_mid_peak_fix",
];

pub const ID_COLUMN: &str = "id";
pub const CHURN_COLUMN: &str = "churn";
pub const PRICE_DATE_COLUMN: &str = "price_date";

/// Load the client table and parse its lifecycle dates
///
/// # Arguments
/// * `file_path` - Path to the client CSV file
///
/// # Returns
/// * One row per client with `Date` typed lifecycle columns
pub fn load_client_data(file_path: &str) -> crate::Result<DataFrame> {
    let df = read_csv(file_path)?;
    let client_df = prepare_client_frame(df)?;
    info!(rows = client_df.height(), "loaded client data");
    Ok(client_df)
}

/// Load the price series table and parse its period column
pub fn load_price_data(file_path: &str) -> crate::Result<DataFrame> {
    let df = read_csv(file_path)?;
    let price_df = prepare_price_frame(df)?;
    info!(rows = price_df.height(), "loaded price data");
    Ok(price_df)
}

/// Load an already engineered, fully numeric modelling table
pub fn load_modelling_data(file_path: &str, label_column: &str) -> crate::Result<DataFrame> {
    let df = read_csv(file_path)?;
    require_columns(&df, "modelling data", &[label_column])?;
    info!(rows = df.height(), columns = df.width(), "loaded modelling data");
    Ok(df)
}

/// Validate and type a raw client frame
///
/// `id` becomes a string column, the four lifecycle dates are parsed strictly
/// and `churn` is cast to an integer label.
pub fn prepare_client_frame(df: DataFrame) -> crate::Result<DataFrame> {
    let mut required = vec![ID_COLUMN, CHURN_COLUMN];
    required.extend(CLIENT_DATE_COLUMNS);
    require_columns(&df, "client data", &required)?;

    let mut exprs = vec![
        col(ID_COLUMN).cast(DataType::String),
        col(CHURN_COLUMN).cast(DataType::Int64),
    ];
    exprs.extend(CLIENT_DATE_COLUMNS.iter().map(|name| parse_date(name)));

    let client_df = df.lazy().with_columns(exprs).collect()?;
    reject_missing_dates(&client_df, "client data", &CLIENT_DATE_COLUMNS)?;
    Ok(client_df)
}

/// Validate and type a raw price frame
pub fn prepare_price_frame(df: DataFrame) -> crate::Result<DataFrame> {
    let mut required = vec![ID_COLUMN, PRICE_DATE_COLUMN];
    required.extend(PRICE_COLUMNS);
    require_columns(&df, "price data", &required)?;

    let mut exprs = vec![col(ID_COLUMN).cast(DataType::String), parse_date(PRICE_DATE_COLUMN)];
    exprs.extend(PRICE_COLUMNS.iter().map(|name| col(name).cast(DataType::Float64)));

    let price_df = df.lazy().with_columns(exprs).collect()?;
    reject_missing_dates(&price_df, "price data", &[PRICE_DATE_COLUMN])?;
    Ok(price_df)
}

/// Write a table to CSV with a header row
pub fn write_csv(df: &mut DataFrame, file_path: &str) -> crate::Result<()> {
    let mut file = File::create(file_path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!(path = file_path, rows = df.height(), "exported table");
    Ok(())
}

/// Fail with a schema mismatch naming the first missing column
pub fn require_columns(df: &DataFrame, table: &str, columns: &[&str]) -> crate::Result<()> {
    for name in columns {
        if df.column(name).is_err() {
            return Err(PipelineError::schema(table, format!("missing column '{}'", name)).into());
        }
    }
    Ok(())
}

/// Blank date cells parse to null; a row without its date cannot be placed in time
fn reject_missing_dates(df: &DataFrame, table: &str, columns: &[&str]) -> crate::Result<()> {
    for name in columns {
        let missing = df.column(name)?.null_count();
        if missing > 0 {
            return Err(PipelineError::schema(table, format!("{} rows have no '{}'", missing, name)).into());
        }
    }
    Ok(())
}

fn read_csv(file_path: &str) -> crate::Result<DataFrame> {
    if !Path::new(file_path).exists() {
        return Err(PipelineError::InputNotFound {
            path: file_path.to_string(),
        }
        .into());
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(PathBuf::from(file_path)))?
        .finish()?;

    debug!(path = file_path, rows = df.height(), columns = df.width(), "read csv");
    Ok(df)
}

pub(crate) fn parse_date(name: &str) -> Expr {
    col(name).str().to_date(StrptimeOptions {
        format: Some(DATE_FORMAT.into()),
        ..Default::default()
    })
}
