//! Normalized records exchanged between pollers, the scoring pipeline and dispatchers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of upstream unit. Releases carry more inherent weight than commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Release,
    PullRequest,
    Commit,
    SocialPost,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Release => "release",
            SourceType::PullRequest => "pull_request",
            SourceType::Commit => "commit",
            SourceType::SocialPost => "social_post",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorMeta {
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub followers: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMeta {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub retweets: u64,
    #[serde(default)]
    pub replies: u64,
}

impl EngagementMeta {
    pub fn total(&self) -> u64 {
        self.likes
            .saturating_add(self.retweets)
            .saturating_add(self.replies)
    }
}

/// A single fetched unit: a GitHub release/PR/commit or an inbound social post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamItem {
    /// Stable, never reused within `source`.
    pub id: String,
    /// Upstream name the item came from, e.g. "github" or "x".
    #[serde(default)]
    pub source: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: Option<AuthorMeta>,
    #[serde(default)]
    pub engagement: Option<EngagementMeta>,
}

impl UpstreamItem {
    /// Process-wide identity used by the deduplicator.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }

    /// Title and body joined for keyword matching.
    pub fn searchable_text(&self) -> String {
        match self.title.as_deref() {
            Some(t) if !t.is_empty() => format!("{t} {}", self.text),
            _ => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Breaking,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Breaking => "breaking",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upstream item together with its analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: UpstreamItem,
    /// 0..=100
    pub relevance_score: u8,
    pub priority: Priority,
    pub categories: BTreeSet<String>,
    pub is_spam: bool,
    pub is_breaking: bool,
    /// Signal contributions in the order they were applied.
    pub reasons: Vec<String>,
}
