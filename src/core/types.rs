use serde::Serialize;

use crate::error::ValidationError;

pub const DEFAULT_MIN_GROWTH_RATE: f64 = 0.03;
pub const DEFAULT_MAX_GROWTH_RATE: f64 = 0.08;
pub const DEFAULT_COVERAGE_MARGIN: f64 = 1.02;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthConfig {
    pub min_growth_rate: f64,
    pub max_growth_rate: f64,
    /// Multiplier applied to cancelled revenue; 1.02 means growth must beat the loss by 2%.
    pub coverage_margin: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            min_growth_rate: DEFAULT_MIN_GROWTH_RATE,
            max_growth_rate: DEFAULT_MAX_GROWTH_RATE,
            coverage_margin: DEFAULT_COVERAGE_MARGIN,
        }
    }
}

impl GrowthConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.min_growth_rate.is_finite() || !self.max_growth_rate.is_finite() {
            return Err(ValidationError::InvalidConfig(
                "growth rate bounds must be finite".to_string(),
            ));
        }
        if self.max_growth_rate < self.min_growth_rate {
            return Err(ValidationError::InvalidConfig(
                "maximum growth rate must be >= minimum growth rate".to_string(),
            ));
        }
        if !self.coverage_margin.is_finite() || self.coverage_margin < 0.0 {
            return Err(ValidationError::InvalidConfig(
                "coverage margin must be a finite factor >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub usage_ratio: f64,
    pub growth_rate: f64,
    pub growth_amount: f64,
    pub new_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    pub name: String,
    pub spend: f64,
    pub usage: f64,
    pub cancelled: bool,
    #[serde(flatten)]
    pub projection: Option<Projection>,
}

impl CompanyRecord {
    pub fn new(name: impl Into<String>, spend: f64, usage: f64) -> Self {
        Self {
            name: name.into(),
            spend,
            usage,
            cancelled: false,
            projection: None,
        }
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn growth_rate(&self) -> Option<f64> {
        self.projection.map(|p| p.growth_rate)
    }

    pub fn growth_amount(&self) -> Option<f64> {
        self.projection.map(|p| p.growth_amount)
    }

    pub fn new_total(&self) -> Option<f64> {
        self.projection.map(|p| p.new_total)
    }
}

/// Ordered rows sharing one computation cycle.
///
/// Inputs are checked once by [`RecordSet::new`]; the engine never re-validates
/// per field. Derived fields are only ever replaced wholesale by a recompute.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<CompanyRecord>,
}

impl RecordSet {
    pub fn new(records: Vec<CompanyRecord>) -> Result<Self, ValidationError> {
        for (index, record) in records.iter().enumerate() {
            let row = index + 1;
            if record.name.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    row,
                    column: "name",
                });
            }
            if !record.spend.is_finite() {
                return Err(ValidationError::NonFinite {
                    row,
                    column: "spend",
                });
            }
            if record.spend < 0.0 {
                return Err(ValidationError::NegativeSpend {
                    row,
                    value: record.spend,
                });
            }
            if !record.usage.is_finite() {
                return Err(ValidationError::NonFinite {
                    row,
                    column: "usage",
                });
            }
        }
        Ok(Self { records })
    }

    pub(crate) fn from_validated(records: Vec<CompanyRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CompanyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompanyRecord> {
        self.records.iter()
    }

    pub fn original_total(&self) -> f64 {
        self.records.iter().map(|r| r.spend).sum()
    }

    /// Flags one row. Any change invalidates every projection in the set, since
    /// redistribution depends on all rows.
    pub fn set_cancelled(&mut self, index: usize, cancelled: bool) -> bool {
        let Some(record) = self.records.get_mut(index) else {
            return false;
        };
        if record.cancelled != cancelled {
            record.cancelled = cancelled;
            self.clear_projections();
        }
        true
    }

    pub fn is_projected(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.projection.is_some())
    }

    pub(crate) fn clear_projections(&mut self) {
        for record in &mut self.records {
            record.projection = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    pub original_total: f64,
    pub lost_revenue: f64,
    pub covered_growth: f64,
    pub required_coverage: f64,
    pub shortfall: f64,
    pub active_spend_total: f64,
    pub redistributed: bool,
    pub projected_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    /// Every usage was zero; all ratios fell back to 1.0.
    ZeroMeanUsage,
    /// Active company with zero spend kept its estimated rate and got no extra growth.
    #[serde(rename_all = "camelCase")]
    ZeroSpendRecord { index: usize, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub records: RecordSet,
    pub mean_usage: f64,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redistribution {
    pub records: RecordSet,
    pub summary: CoverageSummary,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeReport {
    pub records: RecordSet,
    pub summary: CoverageSummary,
    pub mean_usage: f64,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyShare {
    pub name: String,
    pub spend: f64,
    pub share: f64,
}
