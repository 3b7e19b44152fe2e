use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CompanyRecord, CompanyShare, CoverageSummary, GrowthConfig, Notice, RecomputeReport,
    RecordSet, apply_cancellations, company_shares, recompute,
};
use crate::error::{EngineError, RunError, ValidationError};
use crate::io::{
    export_to_path, export_to_string, read_records_from_path, render_notices, render_records,
    render_shares, render_summary,
};

#[derive(Args, Debug, Clone, Copy)]
struct GrowthArgs {
    #[arg(
        long,
        default_value_t = 3.0,
        allow_negative_numbers = true,
        help = "Growth rate for the least-used companies, in percent"
    )]
    min_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 8.0,
        allow_negative_numbers = true,
        help = "Growth rate ceiling before redistribution, in percent"
    )]
    max_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 2.0,
        help = "Percent by which growth must exceed cancelled revenue"
    )]
    safety_margin: f64,
}

#[derive(Parser, Debug)]
#[command(
    name = "renewal",
    about = "Renewal growth projections with cancellation shortfall redistribution"
)]
struct Cli {
    #[arg(
        long,
        help = "CSV with 'Company Name', 'Customer Value' and 'Used' columns"
    )]
    input: PathBuf,
    #[arg(
        long = "cancel",
        value_name = "COMPANY",
        help = "Company to mark as cancelled; repeatable. Replaces any Cancelled column in the input"
    )]
    cancel: Vec<String>,
    #[arg(long, help = "Write the recomputed records to this CSV path")]
    output: Option<PathBuf>,
    #[arg(long, help = "Print the report as JSON instead of a table")]
    json: bool,
    #[command(flatten)]
    growth: GrowthArgs,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordPayload {
    name: Option<String>,
    spend: Option<f64>,
    usage: Option<f64>,
    #[serde(default)]
    cancelled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RecomputePayload {
    records: Vec<RecordPayload>,
    cancelled_names: Option<Vec<String>>,
    min_growth_rate: Option<f64>,
    max_growth_rate: Option<f64>,
    safety_margin: Option<f64>,
}

#[derive(Debug)]
struct ApiRequest {
    records: RecordSet,
    config: GrowthConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    min_growth_rate: f64,
    max_growth_rate: f64,
    coverage_margin: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecomputeResponse {
    config: ConfigResponse,
    mean_usage: f64,
    summary: CoverageSummary,
    records: RecordSet,
    shares: Vec<CompanyShare>,
    notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_config(args: GrowthArgs) -> Result<GrowthConfig, ValidationError> {
    let invalid = |msg: &str| -> Result<GrowthConfig, ValidationError> {
        Err(ValidationError::InvalidConfig(msg.to_string()))
    };

    if !args.min_growth_rate.is_finite() {
        return invalid("--min-growth-rate must be a finite number");
    }

    if !args.max_growth_rate.is_finite() {
        return invalid("--max-growth-rate must be a finite number");
    }

    if args.max_growth_rate < args.min_growth_rate {
        return invalid("--max-growth-rate must be >= --min-growth-rate");
    }

    if !args.safety_margin.is_finite() || args.safety_margin < -100.0 {
        return invalid("--safety-margin must be a number >= -100");
    }

    let config = GrowthConfig {
        min_growth_rate: args.min_growth_rate / 100.0,
        max_growth_rate: args.max_growth_rate / 100.0,
        coverage_margin: 1.0 + args.safety_margin / 100.0,
    };
    config.validate()?;
    Ok(config)
}

fn default_growth_args() -> GrowthArgs {
    GrowthArgs {
        min_growth_rate: 3.0,
        max_growth_rate: 8.0,
        safety_margin: 2.0,
    }
}

pub fn run_cli_from_args<I, T>(args: I) -> Result<(), RunError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let output = run_cli(cli)?;
    print!("{output}");
    Ok(())
}

fn run_cli(cli: Cli) -> Result<String, RunError> {
    let config = build_config(cli.growth)?;
    let mut records = read_records_from_path(&cli.input)?;
    if !cli.cancel.is_empty() {
        records = apply_cancellations(&records, &cli.cancel);
    }

    let report = recompute(&records, &config)?;
    if let Some(path) = &cli.output {
        export_to_path(&report.records, path)?;
    }

    if cli.json {
        let response = build_recompute_response(&config, report);
        return Ok(format!("{}\n", serde_json::to_string_pretty(&response)?));
    }

    let shares = company_shares(&report.records);
    let mut out = render_records(&report.records);
    out.push('\n');
    out.push_str(&render_summary(&report.summary));
    out.push_str("\nCompany shares\n");
    out.push_str(&render_shares(&shares));
    let notices = render_notices(&report.notices);
    if !notices.is_empty() {
        out.push('\n');
        out.push_str(&notices);
    }
    Ok(out)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/defaults", get(defaults_handler))
        .route("/api/recompute", post(recompute_handler))
        .route("/api/export", post(export_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "renewal HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/defaults");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn defaults_handler() -> Response {
    match build_config(default_growth_args()) {
        Ok(config) => json_response(StatusCode::OK, config_response(&config)),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

async fn recompute_handler(Json(payload): Json<RecomputePayload>) -> Response {
    recompute_handler_impl(payload).await
}

async fn recompute_handler_impl(payload: RecomputePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    match recompute(&request.records, &request.config) {
        Ok(report) => json_response(
            StatusCode::OK,
            build_recompute_response(&request.config, report),
        ),
        Err(err) => engine_error_response(&err),
    }
}

async fn export_handler(Json(payload): Json<RecomputePayload>) -> Response {
    export_handler_impl(payload).await
}

async fn export_handler_impl(payload: RecomputePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let report = match recompute(&request.records, &request.config) {
        Ok(report) => report,
        Err(err) => return engine_error_response(&err),
    };

    match export_to_string(&report.records) {
        Ok(csv) => with_cache_control((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"renewals.csv\"",
                ),
            ],
            csv,
        )),
        Err(err) => {
            warn!(error = %err, "export failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

fn engine_error_response(err: &EngineError) -> Response {
    let status = match err {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        _ if err.is_degenerate_input() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %err, status = status.as_u16(), "recompute rejected");
    error_response(status, &err.to_string())
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<RecomputePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload).map_err(|e| e.to_string())
}

fn api_request_from_payload(payload: RecomputePayload) -> Result<ApiRequest, ValidationError> {
    let mut args = default_growth_args();
    if let Some(v) = payload.min_growth_rate {
        args.min_growth_rate = v;
    }
    if let Some(v) = payload.max_growth_rate {
        args.max_growth_rate = v;
    }
    if let Some(v) = payload.safety_margin {
        args.safety_margin = v;
    }
    let config = build_config(args)?;

    let mut rows = Vec::with_capacity(payload.records.len());
    for (index, record) in payload.records.into_iter().enumerate() {
        let row = index + 1;
        let Some(name) = record.name else {
            return Err(ValidationError::MissingField { row, column: "name" });
        };
        let Some(spend) = record.spend else {
            return Err(ValidationError::MissingField {
                row,
                column: "spend",
            });
        };
        let Some(usage) = record.usage else {
            return Err(ValidationError::MissingField {
                row,
                column: "usage",
            });
        };
        rows.push(CompanyRecord {
            cancelled: record.cancelled,
            ..CompanyRecord::new(name, spend, usage)
        });
    }

    let mut records = RecordSet::new(rows)?;
    if let Some(names) = payload.cancelled_names {
        records = apply_cancellations(&records, &names);
    }

    Ok(ApiRequest { records, config })
}

fn config_response(config: &GrowthConfig) -> ConfigResponse {
    ConfigResponse {
        min_growth_rate: config.min_growth_rate,
        max_growth_rate: config.max_growth_rate,
        coverage_margin: config.coverage_margin,
    }
}

fn build_recompute_response(config: &GrowthConfig, report: RecomputeReport) -> RecomputeResponse {
    let shares = company_shares(&report.records);
    RecomputeResponse {
        config: config_response(config),
        mean_usage: report.mean_usage,
        summary: report.summary,
        records: report.records,
        shares,
        notices: report.notices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_csv() -> &'static str {
        "Company Name,Customer Value,Used\nAcme,1000,10\nGlobex,2000,20\nInitech,3000,30\n"
    }

    fn sample_cli(input: PathBuf) -> Cli {
        Cli {
            input,
            cancel: Vec::new(),
            output: None,
            json: false,
            growth: default_growth_args(),
        }
    }

    #[test]
    fn build_config_converts_percent_flags() {
        let config = build_config(default_growth_args()).expect("valid config");
        assert_approx(config.min_growth_rate, 0.03);
        assert_approx(config.max_growth_rate, 0.08);
        assert_approx(config.coverage_margin, 1.02);
    }

    #[test]
    fn build_config_rejects_inverted_bounds() {
        let mut args = default_growth_args();
        args.min_growth_rate = 9.0;
        let err = build_config(args).expect_err("must reject min > max");
        assert!(err.to_string().contains("--max-growth-rate"));
    }

    #[test]
    fn build_config_accepts_a_negative_floor() {
        let mut args = default_growth_args();
        args.min_growth_rate = -2.0;
        let config = build_config(args).expect("negative floor is allowed");
        assert_approx(config.min_growth_rate, -0.02);
    }

    #[test]
    fn build_config_rejects_margin_below_minus_hundred() {
        let mut args = default_growth_args();
        args.safety_margin = -150.0;
        let err = build_config(args).expect_err("margin factor would be negative");
        assert!(err.to_string().contains("--safety-margin"));
    }

    #[test]
    fn cli_parses_repeated_cancellations_and_percent_flags() {
        let cli = Cli::try_parse_from([
            "renewal",
            "--input",
            "book.csv",
            "--cancel",
            "Acme",
            "--cancel",
            "Globex",
            "--max-growth-rate",
            "10",
            "--json",
        ])
        .expect("valid arguments");
        assert_eq!(cli.input, PathBuf::from("book.csv"));
        assert_eq!(cli.cancel, vec!["Acme".to_string(), "Globex".to_string()]);
        assert_approx(cli.growth.max_growth_rate, 10.0);
        assert_approx(cli.growth.min_growth_rate, 3.0);
        assert!(cli.json);
    }

    #[test]
    fn cli_requires_input() {
        assert!(Cli::try_parse_from(["renewal"]).is_err());
    }

    #[test]
    fn api_request_from_json_parses_camel_case_keys() {
        let json = r#"{
          "records": [
            {"name": "Acme", "spend": 1000, "usage": 10},
            {"name": "Globex", "spend": 2000, "usage": 20, "cancelled": true}
          ],
          "minGrowthRate": 2,
          "maxGrowthRate": 6,
          "safetyMargin": 5
        }"#;
        let request = api_request_from_json(json).expect("json should parse");
        assert_approx(request.config.min_growth_rate, 0.02);
        assert_approx(request.config.max_growth_rate, 0.06);
        assert_approx(request.config.coverage_margin, 1.05);
        assert_eq!(request.records.len(), 2);
        assert!(request.records.records()[1].cancelled);
    }

    #[test]
    fn api_request_cancelled_names_replace_row_flags() {
        let json = r#"{
          "records": [
            {"name": "Acme", "spend": 1000, "usage": 10, "cancelled": true},
            {"name": "Globex", "spend": 2000, "usage": 20}
          ],
          "cancelledNames": ["Globex"]
        }"#;
        let request = api_request_from_json(json).expect("json should parse");
        let flags: Vec<bool> = request.records.iter().map(|r| r.cancelled).collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn api_request_reports_missing_fields_by_row() {
        let json = r#"{"records": [{"name": "Acme", "spend": 1}, {"name": "Globex"}]}"#;
        let err = api_request_from_json(json).expect_err("usage is required");
        assert_eq!(err, "row 1: missing value for 'usage'");
    }

    #[test]
    fn api_request_rejects_negative_spend() {
        let json = r#"{"records": [{"name": "Acme", "spend": -1, "usage": 1}]}"#;
        let err = api_request_from_json(json).expect_err("negative spend");
        assert!(err.contains("spend must be >= 0"));
    }

    #[test]
    fn recompute_response_serialization_contains_expected_fields() {
        let json = r#"{
          "records": [
            {"name": "Acme", "spend": 1000, "usage": 10},
            {"name": "Globex", "spend": 2000, "usage": 20},
            {"name": "Initech", "spend": 3000, "usage": 30}
          ],
          "cancelledNames": ["Acme"]
        }"#;
        let request = api_request_from_json(json).expect("json should parse");
        let report = recompute(&request.records, &request.config).expect("recompute");
        let response = build_recompute_response(&request.config, report);

        assert!(response.summary.redistributed);
        assert_eq!(response.shares.len(), 3);
        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"records\""));
        assert!(json.contains("\"growthRate\""));
        assert!(json.contains("\"growthAmount\""));
        assert!(json.contains("\"newTotal\""));
        assert!(json.contains("\"requiredCoverage\""));
        assert!(json.contains("\"coverageMargin\""));
        assert!(json.contains("\"shares\""));
    }

    #[tokio::test]
    async fn recompute_handler_maps_errors_to_status_codes() {
        let payload = RecomputePayload {
            records: vec![RecordPayload {
                name: Some("Acme".to_string()),
                spend: Some(1000.0),
                usage: Some(10.0),
                cancelled: true,
            }],
            ..RecomputePayload::default()
        };
        let response = recompute_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let payload = RecomputePayload {
            max_growth_rate: Some(1.0),
            ..RecomputePayload::default()
        };
        let response = recompute_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let payload = RecomputePayload {
            records: vec![RecordPayload {
                name: Some("Acme".to_string()),
                spend: Some(1.7e308),
                usage: Some(1.0),
                cancelled: false,
            }],
            ..RecomputePayload::default()
        };
        let response = recompute_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = recompute_handler_impl(RecomputePayload::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }

    #[tokio::test]
    async fn export_handler_returns_csv_attachment() {
        let payload = RecomputePayload {
            records: vec![RecordPayload {
                name: Some("Acme".to_string()),
                spend: Some(1000.0),
                usage: Some(10.0),
                cancelled: false,
            }],
            ..RecomputePayload::default()
        };
        let response = export_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"text/csv; charset=utf-8"[..])
        );
    }

    #[test]
    fn run_cli_prints_table_summary_and_shares() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("book.csv");
        fs::write(&input, sample_csv()).expect("write input");

        let mut cli = sample_cli(input);
        cli.cancel = vec!["Acme".to_string()];
        let output = run_cli(cli).expect("cli run");

        assert!(output.contains("CANCELLED"));
        assert!(output.contains("2408.00"));
        assert!(output.contains("3612.00"));
        assert!(output.contains("Required coverage:  1020.00"));
        assert!(output.contains("Company shares"));
        assert!(output.contains("50.0%  Initech"));
    }

    #[test]
    fn run_cli_exports_and_prints_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("book.csv");
        let export = dir.path().join("out.csv");
        fs::write(&input, sample_csv()).expect("write input");

        let mut cli = sample_cli(input);
        cli.output = Some(export.clone());
        cli.json = true;
        let output = run_cli(cli).expect("cli run");

        let value: serde_json::Value = serde_json::from_str(&output).expect("json output");
        assert_eq!(value["records"].as_array().map(Vec::len), Some(3));
        assert_eq!(value["summary"]["redistributed"], serde_json::Value::Bool(false));

        let exported = fs::read_to_string(&export).expect("export written");
        assert_eq!(exported.lines().count(), 4);
    }

    #[test]
    fn run_cli_surfaces_validation_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("book.csv");
        fs::write(&input, "Company Name,Used\nAcme,10\n").expect("write input");

        let err = run_cli(sample_cli(input)).expect_err("missing spend column");
        assert!(err.to_string().contains("Customer Value"));
    }
}
