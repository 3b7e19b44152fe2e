use std::fmt::Write;

use crate::core::{CompanyShare, CoverageSummary, Notice, RecordSet};

const NOT_AVAILABLE: &str = "N/A";

pub fn render_records(records: &RecordSet) -> String {
    let name_width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Company Name".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:>14}  {:>10}  {:>9}  {:>14}  {:>14}  {}",
        "Company Name", "Current Spend", "Used", "% Growth", "Growth Amount", "New Total", "Status"
    );
    for record in records.iter() {
        let growth_rate = record
            .growth_rate()
            .map(|rate| format!("{:.2}%", rate * 100.0))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let status = if record.cancelled { "CANCELLED" } else { "" };
        let _ = writeln!(
            out,
            "{:<name_width$}  {:>14}  {:>10}  {:>9}  {:>14}  {:>14}  {}",
            record.name,
            record.spend,
            record.usage,
            growth_rate,
            money(record.growth_amount()),
            money(record.new_total()),
            status
        );
    }
    out
}

pub fn render_summary(summary: &CoverageSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Original total:     {:.2}", summary.original_total);
    let _ = writeln!(out, "Lost revenue:       {:.2}", summary.lost_revenue);
    let _ = writeln!(out, "Required coverage:  {:.2}", summary.required_coverage);
    let _ = writeln!(out, "Estimated growth:   {:.2}", summary.covered_growth);
    if summary.redistributed {
        let _ = writeln!(
            out,
            "Shortfall:          {:.2} (redistributed over {:.2} active spend)",
            summary.shortfall, summary.active_spend_total
        );
    } else {
        let _ = writeln!(out, "Shortfall:          none");
    }
    let _ = writeln!(out, "Projected total:    {:.2}", summary.projected_total);
    out
}

pub fn render_shares(shares: &[CompanyShare]) -> String {
    let mut out = String::new();
    for share in shares {
        let _ = writeln!(out, "{:>6.1}%  {}", share.share * 100.0, share.name);
    }
    out
}

pub fn render_notices(notices: &[Notice]) -> String {
    let mut out = String::new();
    for notice in notices {
        let line = match notice {
            Notice::ZeroMeanUsage => {
                "warning: every usage value is zero; all companies were given the same ratio"
                    .to_string()
            }
            Notice::ZeroSpendRecord { name, .. } => {
                format!("warning: '{name}' has no spend and received no redistributed growth")
            }
        };
        let _ = writeln!(out, "{line}");
    }
    out
}

fn money(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
