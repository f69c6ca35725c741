#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod align;
pub mod dedup;
pub mod error;
pub mod window;

pub use align::{AlignReport, AlignSpec, Alignment, FanoutPolicy, MatchFilter, PeriodMatch, align};
pub use dedup::{
    CANONICAL_PERIOD_END, DEDUP_STATUS, Dedup, DedupReport, Deduplicator, PrecedenceRule, RuleCount,
    attach_canonical_period_end, canonical_period_ends,
};
pub use error::{MergeError, Result};
pub use window::{
    Aggregation, CADENCE_CHANGED, CADENCE_MONTHS, IS_FIRST_OBS, MonthlySeries, WindowAggregator,
    WindowReport, WindowSpec,
};
