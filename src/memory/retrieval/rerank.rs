//! Cross-encoder reranking over an OpenAI-compatible completions endpoint.
//!
//! Each candidate is scored by asking the model a yes/no relevance question
//! and reading the probability mass of the first generated token.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::memory::core::config::RerankerConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Boxed future type for reranker operations.
pub type RerankFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Score used when only the "yes" token shows up in the top logprobs.
pub const YES_ONLY_SCORE: f64 = 0.9;

/// Score used when only the "no" token shows up in the top logprobs.
pub const NO_ONLY_SCORE: f64 = 0.1;

const TOP_LOGPROBS: u32 = 20;

/// Relevance of one candidate after reranking.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    /// Index of the candidate in the input slice.
    pub index: usize,
    /// Relevance in `[0, 1]`.
    pub score: f64,
}

/// Reorders candidate texts by relevance to a query.
pub trait Reranker: Send + Sync {
    /// Score every candidate, sorted by score desc then original index.
    ///
    /// # Errors
    /// Returns `Rerank` if any candidate cannot be scored.
    fn rerank<'a>(
        &'a self,
        query: &'a str,
        candidates: &'a [String],
    ) -> RerankFuture<'a, MemoryResult<Vec<RerankScore>>>;
}

/// Reranker backed by a vLLM-style `/v1/completions` endpoint.
#[derive(Clone, Debug)]
pub struct CompletionReranker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl CompletionReranker {
    /// Build a reranker from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn new(config: &RerankerConfig) -> MemoryResult<Self> {
        let endpoint = url::Url::parse(&config.base_url)?.join("v1/completions")?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| MemoryError::Rerank(format!("http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: config.model.clone(),
        })
    }

    async fn score_one(&self, query: &str, document: &str) -> MemoryResult<f64> {
        let request = CompletionRequest {
            model: &self.model,
            prompt: relevance_prompt(query, document),
            max_tokens: 1,
            temperature: 0.0,
            logprobs: TOP_LOGPROBS,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| MemoryError::Rerank(err.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryError::Rerank(format!(
                "reranker returned status: {}",
                response.status()
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|err| MemoryError::Rerank(format!("malformed response: {err}")))?;
        score_from_response(&body)
    }
}

impl Reranker for CompletionReranker {
    fn rerank<'a>(
        &'a self,
        query: &'a str,
        candidates: &'a [String],
    ) -> RerankFuture<'a, MemoryResult<Vec<RerankScore>>> {
        Box::pin(async move {
            let mut scores = Vec::with_capacity(candidates.len());
            for (index, document) in candidates.iter().enumerate() {
                let score = self.score_one(query, document).await?;
                scores.push(RerankScore { index, score });
            }
            sort_scores(&mut scores);
            debug!(candidates = candidates.len(), "reranked candidates");
            Ok(scores)
        })
    }
}

/// Sort by score desc, ties by original index.
pub fn sort_scores(scores: &mut [RerankScore]) {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
}

fn relevance_prompt(query: &str, document: &str) -> String {
    format!(
        "<Instruct>: Given a query, retrieve relevant passages\n<Query>: {query}\n<Document>: {document}\nRelevant:"
    )
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f64,
    logprobs: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ChoiceLogprobs {
    #[serde(default)]
    top_logprobs: Vec<Option<Map<String, Value>>>,
}

fn score_from_response(response: &CompletionResponse) -> MemoryResult<f64> {
    let top = response
        .choices
        .first()
        .and_then(|choice| choice.logprobs.as_ref())
        .and_then(|logprobs| logprobs.top_logprobs.first())
        .and_then(Option::as_ref)
        .ok_or_else(|| MemoryError::Rerank("response has no top logprobs".to_string()))?;
    relevance_from_logprobs(top)
}

/// Turn the first-token logprob table into `P(yes) / (P(yes) + P(no))`.
///
/// # Errors
/// Returns `Rerank` when neither token is present.
pub fn relevance_from_logprobs(top: &Map<String, Value>) -> MemoryResult<f64> {
    let mut yes: Option<f64> = None;
    let mut no: Option<f64> = None;

    for (token, logprob) in top {
        let Some(logprob) = logprob.as_f64() else {
            continue;
        };
        let slot = match token.trim().to_lowercase().as_str() {
            "yes" | "yes," | "yes." => &mut yes,
            "no" | "no," | "no." => &mut no,
            _ => continue,
        };
        *slot = Some(slot.map_or(logprob, |current| current.max(logprob)));
    }

    match (yes, no) {
        (Some(yes), Some(no)) => {
            let max = yes.max(no);
            let p_yes = (yes - max).exp();
            let p_no = (no - max).exp();
            Ok(p_yes / (p_yes + p_no))
        }
        (Some(_), None) => Ok(YES_ONLY_SCORE),
        (None, Some(_)) => Ok(NO_ONLY_SCORE),
        (None, None) => Err(MemoryError::Rerank(
            "neither yes nor no among top logprobs".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn top(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_relevance_balanced_logprobs() {
        let score = relevance_from_logprobs(&top(json!({"yes": -0.5, "no": -0.5}))).unwrap();
        assert!((score - 0.5).abs() < 1e-12);

        let score = relevance_from_logprobs(&top(json!({" Yes": -0.1, "no": -2.3}))).unwrap();
        let expected = (-0.1f64).exp() / ((-0.1f64).exp() + (-2.3f64).exp());
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_relevance_single_sided_and_missing() {
        assert!(
            (relevance_from_logprobs(&top(json!({"yes.": -0.2, "maybe": -1.0}))).unwrap()
                - YES_ONLY_SCORE)
                .abs()
                < f64::EPSILON
        );
        assert!(
            (relevance_from_logprobs(&top(json!({"No,": -0.2}))).unwrap() - NO_ONLY_SCORE).abs()
                < f64::EPSILON
        );
        assert!(relevance_from_logprobs(&top(json!({"the": -0.2}))).is_err());
    }

    #[test]
    fn test_score_from_completion_fixture() {
        let body: CompletionResponse = serde_json::from_value(json!({
            "id": "cmpl-1",
            "choices": [{
                "index": 0,
                "text": " yes",
                "logprobs": {
                    "tokens": [" yes"],
                    "top_logprobs": [{" yes": -0.05, " no": -3.0}]
                }
            }]
        }))
        .unwrap();
        let score = score_from_response(&body).unwrap();
        assert!(score > 0.9 && score < 1.0);

        let empty: CompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(score_from_response(&empty).is_err());
    }

    #[test]
    fn test_sort_scores_ties_by_index() {
        let mut scores = vec![
            RerankScore { index: 0, score: 0.2 },
            RerankScore { index: 1, score: 0.8 },
            RerankScore { index: 2, score: 0.8 },
        ];
        sort_scores(&mut scores);
        let order: Vec<usize> = scores.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[tokio::test]
    async fn test_unreachable_reranker_fails() {
        let reranker = CompletionReranker::new(&RerankerConfig {
            enabled: true,
            base_url: "http://127.0.0.1:9".to_string(),
            model: "reranker".to_string(),
            candidate_multiplier: 3,
        })
        .unwrap();
        let candidates = vec!["a".to_string()];
        let err = reranker.rerank("q", &candidates).await.unwrap_err();
        assert!(matches!(err, MemoryError::Rerank(_)));
    }
}
