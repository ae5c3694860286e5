//! Keyword sentiment annotation (afterQuery)

use async_trait::async_trait;
use serde_json::Value;

use crate::hooks::{HookPoint, HookResult, HookSet, Plugin, TurnResult};

const POSITIVE_WORDS: &[&str] = &[
    "love", "great", "excellent", "happy", "good", "best", "wonderful", "amazing",
    "fantastic", "beautiful", "awesome", "perfect", "enjoy", "pleased", "delighted",
    "excited", "glad", "thankful", "grateful", "brilliant",
];

const NEGATIVE_WORDS: &[&str] = &[
    "hate", "bad", "terrible", "sad", "worst", "awful", "horrible", "angry",
    "frustrated", "disappointed", "upset", "annoying", "boring", "poor", "wrong",
    "fail", "failed", "miserable", "depressed", "worried",
];

/// Score text from -1.0 (negative) to 1.0 (positive); 0.0 when no keyword hits
pub fn sentiment_score(text: &str) -> f32 {
    let mut positive = 0u32;
    let mut negative = 0u32;

    for word in text.to_lowercase().split_whitespace() {
        let clean: String = word.chars().filter(|c| c.is_alphabetic()).collect();
        if POSITIVE_WORDS.contains(&clean.as_str()) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&clean.as_str()) {
            negative += 1;
        }
    }

    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    ((positive as f32 - negative as f32) / total as f32).clamp(-1.0, 1.0)
}

/// Stores the response's sentiment score in `extras["sentiment"]`
#[derive(Debug, Default)]
pub struct SentimentTagger;

impl SentimentTagger {
    pub const NAME: &'static str = "sentiment";
}

#[async_trait]
impl Plugin for SentimentTagger {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookPoint::AfterQuery.into()
    }

    async fn after_query(&self, mut result: TurnResult) -> HookResult<TurnResult> {
        let score = sentiment_score(&result.response);
        result
            .extras
            .insert("sentiment".to_string(), Value::from(f64::from(score)));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{ModelTier, QueryAnalysis, RouteOutcome};

    #[test]
    fn test_sentiment_score() {
        assert_eq!(sentiment_score("I love this, it's great!"), 1.0);
        assert_eq!(sentiment_score("This is terrible and awful."), -1.0);
        assert_eq!(sentiment_score("good but wrong"), 0.0);
        assert_eq!(sentiment_score("The sky is blue."), 0.0);
    }

    #[tokio::test]
    async fn test_tags_result() {
        let result = TurnResult::from_route(
            RouteOutcome {
                response: "Happy to help!".to_string(),
                model_name: "m".to_string(),
                tier: ModelTier::Fast,
                analysis: QueryAnalysis::fallback(),
            },
            0,
            false,
        );

        let tagged = SentimentTagger.after_query(result).await.unwrap();
        assert_eq!(tagged.extras["sentiment"], Value::from(1.0));
    }
}
