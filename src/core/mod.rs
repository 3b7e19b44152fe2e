mod engine;
mod types;

pub use engine::{apply_cancellations, company_shares, estimate, recompute, redistribute};
pub use types::{
    CompanyRecord, CompanyShare, CoverageSummary, DEFAULT_COVERAGE_MARGIN,
    DEFAULT_MAX_GROWTH_RATE, DEFAULT_MIN_GROWTH_RATE, Estimate, GrowthConfig, Notice, Projection,
    RecomputeReport, RecordSet, Redistribution,
};
