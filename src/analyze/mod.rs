// src/analyze/mod.rs
//! Content analysis: weight table, spam signals, relevance scorer.

pub mod antispam;
pub mod scoring;
pub mod weights;

pub use crate::analyze::antispam::{AntiSpam, SpamSignal};
pub use crate::analyze::scoring::{keyword_regex, priority_for, ContentScorer};
pub use crate::analyze::weights::{
    load_scoring_file, KeywordCategory, PriorityThresholds, ScoringConfig, Tier,
};
