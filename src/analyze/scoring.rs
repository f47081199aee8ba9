//! Relevance scoring.
//!
//! score = base(source_type)
//!       + Σ category.weight per distinct matched keyword
//!       + authority (verified, best follower tier)
//!       + engagement (best tier of likes + retweets + replies)
//! then clamped to [0, 100], and to `spam.ceiling` when a spam signal fires.
//!
//! Pure in (item, table): the same item always gets the same score, tags and reasons.

use anyhow::Context;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

use super::antispam::AntiSpam;
use super::weights::{tier_points, PriorityThresholds, ScoringConfig};
use crate::model::{Priority, ScoredItem, UpstreamItem};

/// Case-insensitive keyword matcher. Word boundaries are only asserted on sides where the
/// keyword itself starts/ends with a word character, so "c++" or ".net" still match.
pub fn keyword_regex(keyword: &str) -> anyhow::Result<Regex> {
    let k = keyword.trim();
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let lead = if is_word(k.chars().next()) { r"\b" } else { "" };
    let tail = if is_word(k.chars().last()) { r"\b" } else { "" };
    let pattern = format!("(?i){lead}{}{tail}", regex::escape(k));
    Regex::new(&pattern).with_context(|| format!("compiling keyword `{keyword}`"))
}

/// Tier selection. `breaking` needs both the score and the urgency flag; a high score
/// without urgency stays `high`.
pub fn priority_for(score: u8, urgent: bool, t: &PriorityThresholds) -> Priority {
    if urgent && score >= t.breaking {
        Priority::Breaking
    } else if score >= t.high {
        Priority::High
    } else if score >= t.medium {
        Priority::Medium
    } else {
        Priority::Low
    }
}

#[derive(Debug)]
struct CompiledCategory {
    name: String,
    weight: i32,
    urgent: bool,
    keywords: Vec<(String, Regex)>,
}

#[derive(Debug)]
pub struct ContentScorer {
    cfg: ScoringConfig,
    categories: Vec<CompiledCategory>,
    spam: AntiSpam,
}

impl ContentScorer {
    /// Compile the table once. Keywords repeated within a category (ignoring case) count once.
    pub fn new(cfg: ScoringConfig) -> anyhow::Result<Self> {
        let mut categories = Vec::with_capacity(cfg.categories.len());
        for cat in &cfg.categories {
            let mut seen = HashSet::new();
            let mut keywords = Vec::new();
            for k in &cat.keywords {
                let k = k.trim();
                if k.is_empty() || !seen.insert(k.to_lowercase()) {
                    continue;
                }
                keywords.push((k.to_string(), keyword_regex(k)?));
            }
            categories.push(CompiledCategory {
                name: cat.name.clone(),
                weight: cat.weight,
                urgent: cat.urgent,
                keywords,
            });
        }
        let spam = AntiSpam::new(&cfg.spam)?;
        Ok(Self {
            cfg,
            categories,
            spam,
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    pub fn score(&self, item: &UpstreamItem) -> ScoredItem {
        let text = item.searchable_text();
        let mut reasons = Vec::new();
        let mut tags = BTreeSet::new();
        tags.insert(item.source_type.as_str().to_string());

        let base = self.cfg.base.for_type(item.source_type);
        let mut score = i64::from(base);
        if base != 0 {
            reasons.push(format!("base:{}({:+})", item.source_type, base));
        }

        let mut urgent = false;
        for cat in &self.categories {
            let mut hit = false;
            for (k, re) in &cat.keywords {
                if re.is_match(&text) {
                    hit = true;
                    score += i64::from(cat.weight);
                    reasons.push(format!("keyword:{}:{}({:+})", cat.name, k, cat.weight));
                }
            }
            if hit {
                tags.insert(cat.name.clone());
                urgent |= cat.urgent;
            }
        }

        if let Some(author) = &item.author {
            if author.verified {
                let w = self.cfg.authority.verified;
                score += i64::from(w);
                reasons.push(format!("authority:verified({w:+})"));
            }
            if let Some(t) = tier_points(&self.cfg.authority.follower_tiers, author.followers) {
                score += i64::from(t.points);
                reasons.push(format!("authority:followers>={}({:+})", t.min, t.points));
            }
        }

        if let Some(eng) = &item.engagement {
            if let Some(t) = tier_points(&self.cfg.engagement_tiers, eng.total()) {
                score += i64::from(t.points);
                reasons.push(format!("engagement>={}({:+})", t.min, t.points));
            }
        }

        let mut relevance_score = score.clamp(0, 100) as u8;

        let spam = self.spam.check(&text);
        let is_spam = spam.is_some();
        if let Some(signal) = spam {
            relevance_score = relevance_score.min(self.cfg.spam.ceiling);
            reasons.push(signal.reason());
            tags.insert("spam".to_string());
        }

        ScoredItem {
            item: item.clone(),
            relevance_score,
            priority: priority_for(relevance_score, urgent, &self.cfg.thresholds),
            categories: tags,
            is_spam,
            is_breaking: urgent,
            reasons,
        }
    }
}
