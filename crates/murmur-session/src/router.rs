//! Routing decision: resume an idle conversation or start a new one.
//!
//! Each candidate gets three sub-scores (keyword overlap, recency,
//! continuation cue) combined by configured weights. A continuation phrase
//! on a conversation inside the strong recency window is floored at the
//! continuation boost, so "also do X" right after a turn always resumes.
//! The router holds no state besides its configuration.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use murmur_core::RouterConfig;

use crate::continuation::ContinuationDetector;
use crate::keywords::{extract_keywords, jaccard};
use crate::registry::ConversationRecord;
use crate::types::{CandidateScore, RoutingDecision};

/// Scores candidates and picks a verdict.
#[derive(Debug, Clone, Default)]
pub struct Router {
    config: RouterConfig,
}

/// Command-level signals, computed once per routing call.
struct CommandSignals<'a> {
    keywords: BTreeSet<String>,
    /// The continuation phrase as written in the command, if any.
    continuation: Option<&'a str>,
}

impl<'a> CommandSignals<'a> {
    fn from_command(command: &'a str) -> Self {
        Self {
            keywords: extract_keywords(command),
            continuation: ContinuationDetector::shared().matched_phrase(command),
        }
    }
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Decide where `command` goes, given the routable conversations at `now`.
    ///
    /// Total over its input: empty commands and empty candidate lists
    /// simply produce a `New` verdict.
    pub fn route(
        &self,
        command: &str,
        candidates: &[ConversationRecord],
        now: DateTime<Utc>,
    ) -> RoutingDecision {
        if candidates.is_empty() {
            return RoutingDecision::new_conversation(1.0, "no active conversations");
        }

        let signals = CommandSignals::from_command(command);
        let scores = self.score_all(&signals, candidates, now);
        let Some(best) = scores.first() else {
            return RoutingDecision::new_conversation(1.0, "no active conversations");
        };

        let threshold = self.config.confidence_threshold;
        if best.total >= threshold {
            RoutingDecision::resume(
                best.session_id.clone(),
                best.total,
                self.explain(&signals, best),
            )
        } else {
            RoutingDecision::new_conversation(
                1.0 - best.total,
                format!(
                    "best score {:.2} below threshold {:.2}",
                    best.total, threshold
                ),
            )
        }
    }

    /// Score every candidate, best first.
    ///
    /// The sort is stable, so equal totals keep their input order.
    pub fn score(
        &self,
        command: &str,
        candidates: &[ConversationRecord],
        now: DateTime<Utc>,
    ) -> Vec<CandidateScore> {
        self.score_all(&CommandSignals::from_command(command), candidates, now)
    }

    fn score_all(
        &self,
        signals: &CommandSignals<'_>,
        candidates: &[ConversationRecord],
        now: DateTime<Utc>,
    ) -> Vec<CandidateScore> {
        let mut scores: Vec<CandidateScore> = candidates
            .iter()
            .map(|record| self.score_one(signals, record, now))
            .collect();
        scores.sort_by(|a, b| b.total.total_cmp(&a.total));
        scores
    }

    fn score_one(
        &self,
        signals: &CommandSignals<'_>,
        record: &ConversationRecord,
        now: DateTime<Utc>,
    ) -> CandidateScore {
        let cfg = &self.config;
        let age = record.age(now);
        let age_secs = age.num_milliseconds() as f64 / 1000.0;
        let very_recent = age <= cfg.strong_recency();

        let keyword = jaccard(&signals.keywords, &record.topic_keywords);
        let recency = self.recency(age_secs);
        let continuation = if signals.continuation.is_some() { 1.0 } else { 0.0 };

        let mut total = keyword * cfg.keyword_weight
            + recency * cfg.recency_weight
            + continuation * cfg.continuation_weight;

        let boosted = signals.continuation.is_some() && very_recent;
        if boosted {
            total = total.max(cfg.continuation_boost);
        }

        CandidateScore {
            session_id: record.session_id.clone(),
            keyword,
            recency,
            continuation,
            age_secs,
            boosted,
            total: total.clamp(0.0, 1.0),
        }
    }

    /// 1.0 inside the strong window, then halving every half-life.
    fn recency(&self, age_secs: f64) -> f64 {
        let strong = self.config.strong_recency_secs as f64;
        if age_secs <= strong {
            return 1.0;
        }
        let half_life = self.config.recency_half_life_secs.max(1) as f64;
        0.5_f64.powf((age_secs - strong) / half_life)
    }

    fn explain(&self, signals: &CommandSignals<'_>, score: &CandidateScore) -> String {
        let mut parts = Vec::new();
        if score.keyword > 0.0 {
            parts.push(format!("keyword overlap={:.2}", score.keyword));
        }
        if score.age_secs <= self.config.strong_recency_secs as f64 {
            parts.push("very recent".to_string());
        } else {
            parts.push(format!("recency={:.2}", score.recency));
        }
        if let Some(phrase) = signals.continuation {
            parts.push(format!("continuation signal \"{}\"", phrase.to_lowercase()));
        }
        if score.boosted {
            parts.push("strong continuation match".to_string());
        }
        parts.join("; ")
    }
}
