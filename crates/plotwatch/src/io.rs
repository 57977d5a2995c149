//! Tabular (CSV) input and result export.

use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pipeline::{RecordError, RecordErrorKind, RequestBatch, RequestStage};
use crate::snapshot::Snapshot;
use crate::types::{
    ChangeResult, ClassificationRequest, Observation, PlotwatchError, PlotwatchResult,
    ThresholdRule,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn reader<R: Read>(rdr: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(rdr)
}

#[derive(Debug, Deserialize)]
struct ObservationRow {
    #[serde(alias = "spatial_unit_id")]
    plot_id: String,
    date: String,
    ndvi: f64,
    ndbi: f64,
    ndwi: f64,
}

/// Read observations (`plot_id,date,ndvi,ndbi,ndwi`). Any bad row is fatal.
pub fn read_observations<R: Read>(rdr: R) -> PlotwatchResult<Vec<Observation>> {
    let mut out = Vec::new();
    for (i, row) in reader(rdr).deserialize::<ObservationRow>().enumerate() {
        let row = row?;
        let date = parse_date(&row.date).map_err(|e| {
            PlotwatchError::InvalidInput(format!("observation row {}: {e}", i + 1))
        })?;
        out.push(Observation {
            plot_id: row.plot_id,
            date,
            ndvi: row.ndvi,
            ndbi: row.ndbi,
            ndwi: row.ndwi,
        });
    }
    Ok(out)
}

pub fn read_observations_file(path: &Path) -> PlotwatchResult<Vec<Observation>> {
    read_observations(std::fs::File::open(path)?)
}

/// Read threshold rules (`land_type,vegetation_rule,construction_rule,flooding_rule`).
pub fn read_rules<R: Read>(rdr: R) -> PlotwatchResult<Vec<ThresholdRule>> {
    let mut out = Vec::new();
    for row in reader(rdr).deserialize::<ThresholdRule>() {
        out.push(row?);
    }
    Ok(out)
}

pub fn read_rules_file(path: &Path) -> PlotwatchResult<Vec<ThresholdRule>> {
    read_rules(std::fs::File::open(path)?)
}

#[derive(Debug, Deserialize)]
struct RequestRow {
    request_id: String,
    #[serde(alias = "spatial_unit_id")]
    plot_id: String,
    baseline_date: String,
    target_date: String,
    #[serde(default)]
    land_type: Option<String>,
}

/// Read the request batch (`request_id,plot_id,baseline_date,target_date[,land_type]`).
///
/// A file that cannot be opened or has an unusable header is fatal. Rows that
/// fail to parse are returned in [`RequestBatch::rejected`].
pub fn read_requests<R: Read>(rdr: R) -> PlotwatchResult<RequestBatch> {
    let mut table = reader(rdr);
    let headers = table.headers()?.clone();
    for required in ["request_id", "baseline_date", "target_date"] {
        if !headers.iter().any(|h| h == required) {
            return Err(PlotwatchError::InvalidInput(format!(
                "request file is missing column '{required}'"
            )));
        }
    }
    if !headers.iter().any(|h| h == "plot_id" || h == "spatial_unit_id") {
        return Err(PlotwatchError::InvalidInput(
            "request file is missing column 'plot_id'".to_string(),
        ));
    }

    let mut batch = RequestBatch::default();
    for (i, record) in table.records().enumerate() {
        let row_label = format!("row {}", i + 1);
        let parsed = record
            .map_err(|e| e.to_string())
            .and_then(|rec| rec.deserialize::<RequestRow>(Some(&headers)).map_err(|e| e.to_string()))
            .and_then(request_from_row);

        match parsed {
            Ok(req) => batch.requests.push(req),
            Err(reason) => {
                tracing::warn!(row = %row_label, %reason, "Rejected request row");
                batch.rejected.push(RecordError {
                    request_id: row_label,
                    plot_id: String::new(),
                    stage: RequestStage::Received,
                    kind: RecordErrorKind::MalformedRow,
                    reason,
                });
            }
        }
    }
    Ok(batch)
}

pub fn read_requests_file(path: &Path) -> PlotwatchResult<RequestBatch> {
    read_requests(std::fs::File::open(path)?)
}

fn request_from_row(row: RequestRow) -> Result<ClassificationRequest, String> {
    let baseline_date = parse_date(&row.baseline_date).map_err(|e| format!("baseline_date: {e}"))?;
    let target_date = parse_date(&row.target_date).map_err(|e| format!("target_date: {e}"))?;
    Ok(ClassificationRequest {
        request_id: row.request_id,
        plot_id: row.plot_id,
        baseline_date,
        target_date,
        land_type: row.land_type.filter(|lt| !lt.trim().is_empty()),
    })
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| format!("invalid date '{s}' ({e}), expected YYYY-MM-DD"))
}

/// Output format for [`export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = PlotwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(PlotwatchError::InvalidInput(format!(
                "unknown export format '{other}', expected csv or json"
            ))),
        }
    }
}

/// Flat export row mirroring the result fields.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    request_id: &'a str,
    plot_id: &'a str,
    matched_baseline_date: NaiveDate,
    matched_target_date: NaiveDate,
    baseline_ndvi: f64,
    baseline_ndbi: f64,
    baseline_ndwi: f64,
    target_ndvi: f64,
    target_ndbi: f64,
    target_ndwi: f64,
    delta_ndvi: f64,
    delta_ndbi: f64,
    delta_ndwi: f64,
    rules_used: &'a str,
    vegetation_rule_matched: bool,
    construction_rule_matched: bool,
    flooding_rule_matched: bool,
    vegetation_inference: &'a str,
    construction_inference: &'a str,
    flood_inference: &'a str,
}

impl<'a> From<&'a ChangeResult> for ExportRow<'a> {
    fn from(r: &'a ChangeResult) -> Self {
        Self {
            request_id: &r.request_id,
            plot_id: &r.plot_id,
            matched_baseline_date: r.matched_baseline_date,
            matched_target_date: r.matched_target_date,
            baseline_ndvi: r.baseline.ndvi,
            baseline_ndbi: r.baseline.ndbi,
            baseline_ndwi: r.baseline.ndwi,
            target_ndvi: r.target.ndvi,
            target_ndbi: r.target.ndbi,
            target_ndwi: r.target.ndwi,
            delta_ndvi: r.delta.ndvi,
            delta_ndbi: r.delta.ndbi,
            delta_ndwi: r.delta.ndwi,
            rules_used: &r.rules_used,
            vegetation_rule_matched: r.vegetation.rule_matched,
            construction_rule_matched: r.construction.rule_matched,
            flooding_rule_matched: r.flooding.rule_matched,
            vegetation_inference: &r.vegetation.inference,
            construction_inference: &r.construction.inference,
            flood_inference: &r.flooding.inference,
        }
    }
}

/// Serialize a snapshot's results, optionally for one plot.
pub fn export<W: Write>(
    snapshot: &Snapshot,
    plot_id: Option<&str>,
    format: ExportFormat,
    writer: W,
) -> PlotwatchResult<usize> {
    let results = snapshot.results_for(plot_id);
    let rows: Vec<ExportRow<'_>> = results.iter().map(|r| ExportRow::from(*r)).collect();

    match format {
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(writer);
            for row in &rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(writer, &rows)?;
        }
    }

    Ok(rows.len())
}

/// Export to a file, creating parent directories as needed.
pub fn export_file(
    snapshot: &Snapshot,
    plot_id: Option<&str>,
    format: ExportFormat,
    path: &Path,
) -> PlotwatchResult<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    let count = export(snapshot, plot_id, format, std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.display(), rows = count, "Exported results");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, RunSummary};
    use crate::testing::sample_result;

    #[test]
    fn test_read_observations() {
        let data = "plot_id,date,ndvi,ndbi,ndwi\np1,2024-01-01,0.6,0.1,-0.2\np1, 2024-02-01 ,0.5,0.1,-0.1\n";
        let obs = read_observations(data.as_bytes()).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(obs[0].ndvi, 0.6);
    }

    #[test]
    fn test_bad_observation_is_fatal() {
        let data = "plot_id,date,ndvi,ndbi,ndwi\np1,01/02/2024,0.6,0.1,-0.2\n";
        assert!(matches!(
            read_observations(data.as_bytes()),
            Err(PlotwatchError::InvalidInput(_))
        ));
        let data = "plot_id,date,ndvi,ndbi,ndwi\np1,2024-01-01,high,0.1,-0.2\n";
        assert!(matches!(read_observations(data.as_bytes()), Err(PlotwatchError::Csv(_))));
    }

    #[test]
    fn test_read_rules() {
        let data = "land_type,vegetation_rule,construction_rule,flooding_rule\n\
                    Grassland,dvi > 0.3 AND dbi < -0.1,dbi < -0.2,dwi < -0.2\n";
        let rules = read_rules(data.as_bytes()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].vegetation_rule, "dvi > 0.3 AND dbi < -0.1");
    }

    #[test]
    fn test_read_requests_with_rejections() {
        let data = "request_id,spatial_unit_id,baseline_date,target_date,land_type\n\
                    r1,p1,2024-01-01,2024-06-01,Forest\n\
                    r2,p2,2024-13-01,2024-06-01,\n\
                    r3,p3,2024-01-01,2024-06-01,\n";
        let batch = read_requests(data.as_bytes()).unwrap();
        assert_eq!(batch.requests.len(), 2);
        assert_eq!(batch.requests[0].land_type.as_deref(), Some("Forest"));
        assert_eq!(batch.requests[1].land_type, None);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].kind, RecordErrorKind::MalformedRow);
        assert!(batch.rejected[0].reason.contains("baseline_date"));
    }

    #[test]
    fn test_requests_without_land_type_column() {
        let data = "request_id,plot_id,baseline_date,target_date\nr1,p1,2024-01-01,2024-06-01\n";
        let batch = read_requests(data.as_bytes()).unwrap();
        assert_eq!(batch.requests.len(), 1);
        assert!(batch.requests[0].land_type.is_none());
    }

    #[test]
    fn test_requests_missing_column_is_fatal() {
        let data = "request_id,plot_id,target_date\nr1,p1,2024-06-01\n";
        assert!(matches!(
            read_requests(data.as_bytes()),
            Err(PlotwatchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_export_csv_and_json() {
        let snap = Snapshot::new(
            "run-1".into(),
            PipelineConfig::default(),
            RunSummary::default(),
            vec![sample_result("r1", "p1"), sample_result("r2", "p2")],
        );

        let mut buf = Vec::new();
        let n = export(&snap, None, ExportFormat::Csv, &mut buf).unwrap();
        assert_eq!(n, 2);
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("request_id,plot_id,matched_baseline_date"));
        assert!(header.ends_with("vegetation_inference,construction_inference,flood_inference"));
        assert_eq!(text.lines().count(), 3);

        let mut buf = Vec::new();
        export(&snap, Some("p2"), ExportFormat::Json, &mut buf).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["request_id"], "r2");
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
