//! Declarative scoring table, loaded from the `[scoring]` section of `config/relay.toml`.
//!
//! TOML shape (every key optional, missing keys keep the built-in defaults):
//! ```toml
//! [scoring.base]
//! release = 30
//! pull_request = 15
//! commit = 5
//! social_post = 0
//!
//! [[scoring.categories]]
//! name = "urgency"
//! weight = 20
//! urgent = true
//! keywords = ["breaking", "outage"]
//!
//! [scoring.spam]
//! keywords = ["giveaway"]
//! max_emphasis_run = 4
//! ceiling = 10
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::model::SourceType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseWeights {
    pub release: i32,
    pub pull_request: i32,
    pub commit: i32,
    pub social_post: i32,
}

impl Default for BaseWeights {
    fn default() -> Self {
        Self {
            release: 30,
            pull_request: 15,
            commit: 5,
            social_post: 0,
        }
    }
}

impl BaseWeights {
    pub fn for_type(&self, t: SourceType) -> i32 {
        match t {
            SourceType::Release => self.release,
            SourceType::PullRequest => self.pull_request,
            SourceType::Commit => self.commit,
            SourceType::SocialPost => self.social_post,
        }
    }
}

/// A weighted keyword group. Every distinct keyword that matches adds `weight` once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCategory {
    pub name: String,
    pub weight: i32,
    /// A match in this category marks the item as breaking.
    #[serde(default)]
    pub urgent: bool,
    pub keywords: Vec<String>,
}

/// `points` apply when the measured value is `>= min`. Only the best matching tier counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub min: u64,
    pub points: i32,
}

pub fn tier_points(tiers: &[Tier], value: u64) -> Option<Tier> {
    tiers
        .iter()
        .filter(|t| value >= t.min)
        .max_by_key(|t| (t.points, t.min))
        .copied()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityWeights {
    pub verified: i32,
    pub follower_tiers: Vec<Tier>,
}

impl Default for AuthorityWeights {
    fn default() -> Self {
        Self {
            verified: 15,
            follower_tiers: vec![
                Tier { min: 100_000, points: 15 },
                Tier { min: 10_000, points: 10 },
                Tier { min: 1_000, points: 5 },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    pub keywords: Vec<String>,
    /// Characters counted as "emphasis" (runs of any mix of them).
    pub emphasis_chars: String,
    pub max_emphasis_run: usize,
    /// Upper bound on the score of a spam item.
    pub ceiling: u8,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            keywords: [
                "giveaway",
                "free money",
                "click here",
                "airdrop",
                "dm me",
                "follow back",
                "100x",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            emphasis_chars: "!?$".to_string(),
            max_emphasis_run: 4,
            ceiling: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityThresholds {
    pub medium: u8,
    pub high: u8,
    pub breaking: u8,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            medium: 40,
            high: 60,
            breaking: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base: BaseWeights,
    pub categories: Vec<KeywordCategory>,
    pub authority: AuthorityWeights,
    /// Tiers over likes + retweets + replies.
    pub engagement_tiers: Vec<Tier>,
    pub spam: SpamConfig,
    pub thresholds: PriorityThresholds,
}

fn category(name: &str, weight: i32, urgent: bool, keywords: &[&str]) -> KeywordCategory {
    KeywordCategory {
        name: name.to_string(),
        weight,
        urgent,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base: BaseWeights::default(),
            categories: vec![
                category(
                    "domain",
                    15,
                    false,
                    &[
                        "marketing",
                        "campaign",
                        "launch",
                        "newsletter",
                        "audience",
                        "brand",
                        "growth",
                        "content",
                    ],
                ),
                category(
                    "technical",
                    10,
                    false,
                    &[
                        "api",
                        "sdk",
                        "integration",
                        "webhook",
                        "performance",
                        "migration",
                        "refactor",
                        "benchmark",
                    ],
                ),
                category(
                    "urgency",
                    20,
                    true,
                    &[
                        "breaking",
                        "urgent",
                        "critical",
                        "outage",
                        "security",
                        "vulnerability",
                        "hotfix",
                        "incident",
                    ],
                ),
            ],
            authority: AuthorityWeights::default(),
            engagement_tiers: vec![
                Tier { min: 1_000, points: 20 },
                Tier { min: 100, points: 10 },
                Tier { min: 10, points: 5 },
            ],
            spam: SpamConfig::default(),
            thresholds: PriorityThresholds::default(),
        }
    }
}

/// Load a standalone scoring table (same shape as the `[scoring]` section).
pub fn load_scoring_file(path: &Path) -> anyhow::Result<ScoringConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading scoring table {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing scoring table {}", path.display()))
}
