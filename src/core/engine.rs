use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use super::types::{
    CompanyRecord, CompanyShare, CoverageSummary, Estimate, GrowthConfig, Notice, Projection,
    RecomputeReport, RecordSet, Redistribution,
};
use crate::error::{EngineError, ValidationError};

pub fn recompute(
    records: &RecordSet,
    config: &GrowthConfig,
) -> Result<RecomputeReport, EngineError> {
    config.validate()?;
    let estimate = estimate(records, config)?;
    let redistribution = redistribute(&estimate.records, config.coverage_margin)?;

    let mut notices = estimate.notices;
    notices.extend(redistribution.notices);

    debug!(
        records = records.len(),
        mean_usage = estimate.mean_usage,
        shortfall = redistribution.summary.shortfall,
        redistributed = redistribution.summary.redistributed,
        "recompute finished"
    );

    Ok(RecomputeReport {
        records: redistribution.records,
        summary: redistribution.summary,
        mean_usage: estimate.mean_usage,
        notices,
    })
}

pub fn estimate(records: &RecordSet, config: &GrowthConfig) -> Result<Estimate, EngineError> {
    config.validate()?;
    if records.is_empty() {
        return Ok(Estimate {
            records: RecordSet::default(),
            mean_usage: 0.0,
            notices: Vec::new(),
        });
    }

    // Cancelled rows stay in the denominator.
    let mean_usage = records.iter().map(|r| r.usage).sum::<f64>() / records.len() as f64;
    if !mean_usage.is_finite() {
        return Err(EngineError::NonFiniteMeanUsage);
    }

    let mut notices = Vec::new();
    if mean_usage == 0.0 {
        warn!(
            records = records.len(),
            "mean usage is zero, falling back to a usage ratio of 1.0"
        );
        notices.push(Notice::ZeroMeanUsage);
    }

    let min_rate = config.min_growth_rate;
    let max_rate = config.max_growth_rate;
    let mut estimated = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let usage_ratio = if mean_usage == 0.0 {
            1.0
        } else {
            record.usage / mean_usage
        };
        let growth_rate = bounded_growth_rate(usage_ratio, min_rate, max_rate);
        let growth_amount = record.spend * growth_rate;
        let projection = Projection {
            usage_ratio,
            growth_rate,
            growth_amount,
            new_total: record.spend + growth_amount,
        };
        ensure_finite_projection(index, &record.name, &projection)?;
        estimated.push(CompanyRecord {
            projection: Some(projection),
            ..record.clone()
        });
    }

    Ok(Estimate {
        records: RecordSet::from_validated(estimated),
        mean_usage,
        notices,
    })
}

fn ensure_finite_projection(
    index: usize,
    name: &str,
    projection: &Projection,
) -> Result<(), EngineError> {
    if projection.growth_rate.is_finite()
        && projection.growth_amount.is_finite()
        && projection.new_total.is_finite()
    {
        return Ok(());
    }
    Err(EngineError::NonFiniteProjection {
        index,
        name: name.to_string(),
    })
}

fn ensure_finite(value: f64, quantity: &'static str) -> Result<f64, EngineError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::NonFiniteAggregate { quantity })
    }
}

fn bounded_growth_rate(usage_ratio: f64, min_rate: f64, max_rate: f64) -> f64 {
    let raw_rate = min_rate + usage_ratio * (max_rate - min_rate);
    // inf * 0 when the bounds coincide
    if raw_rate.is_nan() {
        return min_rate;
    }
    raw_rate.clamp(min_rate, max_rate)
}

pub fn redistribute(
    records: &RecordSet,
    margin_factor: f64,
) -> Result<Redistribution, EngineError> {
    if !margin_factor.is_finite() || margin_factor < 0.0 {
        return Err(ValidationError::InvalidConfig(
            "coverage margin must be a finite factor >= 0".to_string(),
        )
        .into());
    }

    let mut lost_revenue = 0.0;
    let mut covered_growth = 0.0;
    let mut active_spend_total = 0.0;
    for (index, record) in records.iter().enumerate() {
        let Some(projection) = record.projection else {
            return Err(EngineError::NotEstimated {
                index,
                name: record.name.clone(),
            });
        };
        if record.cancelled {
            lost_revenue += record.spend;
        } else {
            covered_growth += projection.growth_amount;
            active_spend_total += record.spend;
        }
    }

    let lost_revenue = ensure_finite(lost_revenue, "lost revenue")?;
    let covered_growth = ensure_finite(covered_growth, "covered growth")?;
    let active_spend_total = ensure_finite(active_spend_total, "active spend total")?;
    let original_total = ensure_finite(records.original_total(), "original total")?;
    let required_coverage = ensure_finite(lost_revenue * margin_factor, "required coverage")?;
    let shortfall = ensure_finite(required_coverage - covered_growth, "shortfall")?;
    let redistributed = shortfall > 0.0;

    let mut adjusted = records.records().to_vec();
    let mut notices = Vec::new();
    if redistributed {
        if active_spend_total == 0.0 {
            return Err(EngineError::UnsatisfiableCoverage {
                shortfall,
                lost_revenue,
            });
        }

        for (index, record) in adjusted.iter_mut().enumerate() {
            if record.cancelled {
                continue;
            }
            if record.spend == 0.0 {
                warn!(
                    index,
                    name = %record.name,
                    "zero-spend company receives no redistributed growth"
                );
                notices.push(Notice::ZeroSpendRecord {
                    index,
                    name: record.name.clone(),
                });
                continue;
            }
            if let Some(projection) = record.projection.as_mut() {
                let extra = record.spend / active_spend_total * shortfall;
                projection.growth_amount += extra;
                projection.new_total = record.spend + projection.growth_amount;
                // Not re-clamped: closing the gap may push past the nominal ceiling.
                projection.growth_rate = projection.growth_amount / record.spend;
                ensure_finite_projection(index, &record.name, projection)?;
            }
        }
        debug!(
            shortfall,
            lost_revenue,
            active_spend_total,
            "shortfall redistributed across active companies"
        );
    }

    let projected_total = ensure_finite(
        adjusted
            .iter()
            .filter(|r| !r.cancelled)
            .filter_map(|r| r.new_total())
            .sum(),
        "projected total",
    )?;

    Ok(Redistribution {
        summary: CoverageSummary {
            original_total,
            lost_revenue,
            covered_growth,
            required_coverage,
            shortfall,
            active_spend_total,
            redistributed,
            projected_total,
        },
        records: RecordSet::from_validated(adjusted),
        notices,
    })
}

/// Marks exactly the rows whose name is in `names` as cancelled and every other
/// row as active. Rows sharing a name are all affected. Projections are cleared,
/// so the result has to go through [`recompute`] before it is read.
pub fn apply_cancellations<S: AsRef<str>>(records: &RecordSet, names: &[S]) -> RecordSet {
    let selected: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
    for name in &selected {
        if !records.iter().any(|r| r.name == *name) {
            warn!(name, "cancellation requested for unknown company");
        }
    }

    let flagged = records
        .iter()
        .map(|record| CompanyRecord {
            cancelled: selected.contains(record.name.as_str()),
            projection: None,
            ..record.clone()
        })
        .collect();
    RecordSet::from_validated(flagged)
}

pub fn company_shares(records: &RecordSet) -> Vec<CompanyShare> {
    let mut by_name: BTreeMap<&str, f64> = BTreeMap::new();
    for record in records.iter() {
        *by_name.entry(record.name.as_str()).or_default() += record.spend;
    }
    let total = records.original_total();
    by_name
        .into_iter()
        .map(|(name, spend)| CompanyShare {
            name: name.to_string(),
            spend,
            share: if total > 0.0 { spend / total } else { 0.0 },
        })
        .collect()
}
