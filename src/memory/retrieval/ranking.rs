//! Ranking utilities shared by the semantic and graph stores.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::memory::ingest::dedupe::normalize_text;

/// Bonus added when the whole query phrase appears in one field.
pub const PHRASE_BONUS: f64 = 0.5;

/// Sort items by descending score, breaking ties with the more recent item first.
pub fn sort_by_score_then_recency<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (f64, DateTime<Utc>),
{
    items.sort_by(|a, b| compare_score_then_recency(key(a), key(b)));
}

/// Ordering used by [`sort_by_score_then_recency`].
#[must_use]
pub fn compare_score_then_recency(a: (f64, DateTime<Utc>), b: (f64, DateTime<Utc>)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1))
}

/// Tokenized keyword query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordQuery {
    phrase: String,
    terms: Vec<String>,
}

impl KeywordQuery {
    /// Parse a free-text query. Returns `None` when it has no terms.
    #[must_use]
    pub fn parse(query: &str) -> Option<Self> {
        let phrase = normalize_text(query);
        let mut terms: Vec<String> = Vec::new();
        for term in phrase
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            if !terms.iter().any(|existing| existing == term) {
                terms.push(term.to_string());
            }
        }
        if terms.is_empty() {
            return None;
        }
        Some(Self { phrase, terms })
    }

    /// The whole query, normalized.
    #[must_use]
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Lower-cased unique terms, in query order.
    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Match-breadth score of `fields` in `[0, 1]`.
    ///
    /// `(matched_terms / total_terms + phrase_bonus) / 1.5`, where a term
    /// matches if any field contains it.
    #[must_use]
    pub fn score(&self, fields: &[&str]) -> f64 {
        let lowered: Vec<String> = fields.iter().map(|f| normalize_text(f)).collect();
        let matched = self
            .terms
            .iter()
            .filter(|term| lowered.iter().any(|field| field.contains(term.as_str())))
            .count();
        if matched == 0 {
            return 0.0;
        }
        let bonus = if lowered.iter().any(|field| field.contains(&self.phrase)) {
            PHRASE_BONUS
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let breadth = matched as f64 / self.terms.len() as f64;
        (breadth + bonus) / (1.0 + PHRASE_BONUS)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_sort_by_score_then_recency() {
        let now = Utc::now();
        let mut items = vec![
            ("old", 0.7, now - Duration::seconds(10)),
            ("top", 0.9, now - Duration::seconds(30)),
            ("new", 0.7, now),
            ("low", 0.5, now),
        ];
        sort_by_score_then_recency(&mut items, |item| (item.1, item.2));
        let order: Vec<&str> = items.iter().map(|item| item.0).collect();
        assert_eq!(order, vec!["top", "new", "old", "low"]);
    }

    #[test]
    fn test_keyword_query_parsing() {
        assert!(KeywordQuery::parse("   ").is_none());
        assert!(KeywordQuery::parse("?!").is_none());
        let query = KeywordQuery::parse("Postgres postgres  Replica").unwrap();
        assert_eq!(query.terms(), ["postgres", "replica"]);
    }

    #[test]
    fn test_keyword_score_breadth_and_phrase_bonus() {
        let query = KeywordQuery::parse("postgres replica").unwrap();
        let full = query.score(&["Postgres Replica", "System"]);
        assert!((full - 1.0).abs() < 1e-12);

        let split = query.score(&["postgres", "replica set"]);
        assert!((split - 1.0 / 1.5).abs() < 1e-12);

        let half = query.score(&["postgres", "Database"]);
        assert!((half - 0.5 / 1.5).abs() < 1e-12);

        assert!(query.score(&["redis", "Cache"]).abs() < f64::EPSILON);
    }
}
