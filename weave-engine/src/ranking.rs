//! Pattern ranking collaborator.
//!
//! The engine does not score patterns against free-text descriptions
//! itself. It hands the feature vectors of its patterns to a
//! [`PatternRanker`] and applies the returned scores.

use serde::{Deserialize, Serialize};
use weave_core::config::PatternMatchingConfig;
use weave_core::patterns::PatternFeatures;
use weave_core::CodePattern;

/// Error type for ranking operations.
#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    /// No ranker is attached to the engine
    #[error("no pattern ranker configured")]
    Unavailable,

    /// The ranker failed
    #[error("ranking failed: {0}")]
    Failed(String),
}

/// Result type for ranking operations.
pub type RankingResult<T> = Result<T, RankingError>;

/// What the caller is looking for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingQuery {
    pub description: String,
    /// Restrict candidates to one pattern type.
    pub pattern_type: Option<String>,
    pub similarity_threshold: f64,
    pub max_results: usize,
}

impl RankingQuery {
    /// Build a query with threshold and limit taken from configuration.
    pub fn from_config(
        description: impl Into<String>,
        pattern_type: Option<String>,
        config: &PatternMatchingConfig,
    ) -> Self {
        Self {
            description: description.into(),
            pattern_type,
            similarity_threshold: config.similarity_threshold,
            max_results: config.max_patterns_returned,
        }
    }
}

/// A pattern with the score the ranker gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPattern {
    pub score: f64,
    pub pattern: CodePattern,
}

/// Scores candidate patterns against a query.
///
/// # Example
///
/// ```ignore
/// struct Keyword;
///
/// impl PatternRanker for Keyword {
///     fn rank(&self, query: &RankingQuery, candidates: &[PatternFeatures])
///         -> RankingResult<Vec<(String, f64)>>
///     {
///         Ok(candidates
///             .iter()
///             .filter(|c| c.name_tokens.iter().any(|t| query.description.contains(t.as_str())))
///             .map(|c| (c.pattern_id.clone(), 1.0))
///             .collect())
///     }
///
///     fn name(&self) -> &str {
///         "keyword"
///     }
/// }
/// ```
pub trait PatternRanker: Send + Sync {
    /// Return `(pattern_id, score)` pairs, best first. Scores are in [0, 1].
    /// Ids the ranker omits are treated as not matching.
    fn rank(
        &self,
        query: &RankingQuery,
        candidates: &[PatternFeatures],
    ) -> RankingResult<Vec<(String, f64)>>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Apply ranker output to the candidate patterns: unknown ids and non-finite
/// scores are dropped, scores below the threshold are cut and the list is
/// truncated.
pub fn apply_ranking(
    query: &RankingQuery,
    patterns: &[&CodePattern],
    ranked: Vec<(String, f64)>,
) -> Vec<RankedPattern> {
    let mut results = Vec::new();
    for (pattern_id, score) in ranked {
        if results.len() >= query.max_results {
            break;
        }
        if !score.is_finite() {
            tracing::debug!("Ranker returned non-finite score for {}", pattern_id);
            continue;
        }
        let score = score.clamp(0.0, 1.0);
        if score < query.similarity_threshold {
            continue;
        }
        if results
            .iter()
            .any(|r: &RankedPattern| r.pattern.pattern_id == pattern_id)
        {
            continue;
        }
        let Some(pattern) = patterns.iter().find(|p| p.pattern_id == pattern_id) else {
            tracing::debug!("Ranker returned unknown pattern: {}", pattern_id);
            continue;
        };
        let mut pattern = (*pattern).clone();
        pattern.similarity_score = score;
        results.push(RankedPattern { score, pattern });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::types::Metadata;

    fn pattern(id: &str) -> CodePattern {
        CodePattern {
            pattern_id: id.to_string(),
            pattern_type: "database_crud".to_string(),
            files: Vec::new(),
            nodes: Vec::new(),
            relationships: Vec::new(),
            template_data: Metadata::new(),
            similarity_score: 0.8,
        }
    }

    fn query(threshold: f64, max_results: usize) -> RankingQuery {
        RankingQuery {
            description: "customer list".to_string(),
            pattern_type: None,
            similarity_threshold: threshold,
            max_results,
        }
    }

    #[test]
    fn test_from_config() {
        let config = PatternMatchingConfig::default();
        let q = RankingQuery::from_config("orders", Some("aspx_page".into()), &config);
        assert_eq!(q.similarity_threshold, 0.7);
        assert_eq!(q.max_results, 5);
    }

    #[test]
    fn test_apply_ranking_threshold_and_limit() {
        let a = pattern("crud_a");
        let b = pattern("crud_b");
        let c = pattern("crud_c");
        let candidates = vec![&a, &b, &c];
        let ranked = vec![
            ("crud_b".to_string(), 0.95),
            ("crud_x".to_string(), 0.9),
            ("crud_a".to_string(), 0.75),
            ("crud_c".to_string(), 0.5),
        ];

        let results = apply_ranking(&query(0.7, 5), &candidates, ranked.clone());
        let ids: Vec<&str> = results.iter().map(|r| r.pattern.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["crud_b", "crud_a"]);
        assert_eq!(results[0].pattern.similarity_score, 0.95);

        let limited = apply_ranking(&query(0.0, 1), &candidates, ranked);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_apply_ranking_drops_non_finite_scores() {
        let a = pattern("crud_a");
        let b = pattern("crud_b");
        let candidates = vec![&a, &b];
        let ranked = vec![
            ("crud_a".to_string(), f64::NAN),
            ("crud_b".to_string(), f64::INFINITY),
            ("crud_a".to_string(), 0.8),
        ];

        let results = apply_ranking(&query(0.0, 5), &candidates, ranked);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pattern.pattern_id, "crud_a");
        assert_eq!(results[0].score, 0.8);
    }
}
