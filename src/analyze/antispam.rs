//! Spam signal detection.
//!
//! Two independent triggers:
//! - any spam keyword (case-insensitive, word-bounded)
//! - a run of emphasis characters (any mix of `emphasis_chars`, e.g. "!!!!" or "?!?!")
//!   at least `max_emphasis_run` long
//!
//! Detection only reports; clamping the score is the scorer's job.

use regex::Regex;

use super::weights::SpamConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpamSignal {
    Keyword(String),
    Emphasis { run: usize },
}

impl SpamSignal {
    pub fn reason(&self) -> String {
        match self {
            SpamSignal::Keyword(k) => format!("spam:keyword:{k}"),
            SpamSignal::Emphasis { run } => format!("spam:emphasis_run:{run}"),
        }
    }
}

#[derive(Debug)]
pub struct AntiSpam {
    keywords: Vec<(String, Regex)>,
    emphasis_chars: Vec<char>,
    max_emphasis_run: usize,
}

impl AntiSpam {
    pub fn new(cfg: &SpamConfig) -> anyhow::Result<Self> {
        let keywords = cfg
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| Ok((k.clone(), super::scoring::keyword_regex(k)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            keywords,
            emphasis_chars: cfg.emphasis_chars.chars().collect(),
            // A run of 0 or 1 would flag every "!" in normal prose.
            max_emphasis_run: cfg.max_emphasis_run.max(2),
        })
    }

    /// First matching signal, keywords before emphasis.
    pub fn check(&self, text: &str) -> Option<SpamSignal> {
        if let Some((k, _)) = self.keywords.iter().find(|(_, re)| re.is_match(text)) {
            return Some(SpamSignal::Keyword(k.clone()));
        }
        let run = self.longest_emphasis_run(text);
        (run >= self.max_emphasis_run).then_some(SpamSignal::Emphasis { run })
    }

    pub fn longest_emphasis_run(&self, text: &str) -> usize {
        let mut best = 0usize;
        let mut cur = 0usize;
        for c in text.chars() {
            if self.emphasis_chars.contains(&c) {
                cur += 1;
                best = best.max(cur);
            } else {
                cur = 0;
            }
        }
        best
    }
}
