//! Thread titles from the first user message

use std::sync::Arc;

use tally_ai::{ChatMessage, CompletionApi, CompletionRequest};

use crate::error::{Error, Result};

pub const DEFAULT_TITLE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TITLE_LANGUAGE: &str = "Japanese";

/// Upper bound on title length, in characters
const TITLE_MAX_CHARS: usize = 10;

const ENCLOSING_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('「', '」'),
    ('『', '』'),
    ('【', '】'),
    ('(', ')'),
    ('（', '）'),
    ('[', ']'),
];

/// Derives short thread titles with a one-shot completion
pub struct TitleSynthesizer {
    api: Arc<dyn CompletionApi>,
    model: String,
    language: String,
}

impl TitleSynthesizer {
    pub fn new(
        api: Arc<dyn CompletionApi>,
        model: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            api,
            model: model.into(),
            language: language.into(),
        }
    }

    fn prompt(&self, seed_text: &str) -> String {
        if self.language.eq_ignore_ascii_case("japanese") {
            format!(
                "以下の文章のタイトルを日本語で最大{}文字で簡潔に付けてください。括弧は不要です。\n{}",
                TITLE_MAX_CHARS, seed_text
            )
        } else {
            format!(
                "Give the following text a concise title in {} of at most {} characters. \
                 Do not wrap it in brackets or quotes.\n{}",
                self.language, TITLE_MAX_CHARS, seed_text
            )
        }
    }

    /// Ask the model for a title for `seed_text`
    pub async fn synthesize(&self, seed_text: &str) -> Result<String> {
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![ChatMessage::user(self.prompt(seed_text))],
        );
        let raw = self.api.complete(&request).await.map_err(Error::Network)?;

        let title = clean_title(&raw);
        if title.is_empty() {
            return Err(Error::Network(tally_ai::Error::UnexpectedResponse(
                "model returned an empty title".into(),
            )));
        }
        Ok(title)
    }
}

/// First line, trimmed, with enclosing quotes or brackets removed
fn clean_title(raw: &str) -> String {
    let mut title = raw.trim().lines().next().unwrap_or("").trim();
    'strip: loop {
        for (open, close) in ENCLOSING_PAIRS {
            if let Some(inner) = title
                .strip_prefix(*open)
                .and_then(|t| t.strip_suffix(*close))
            {
                title = inner.trim();
                continue 'strip;
            }
        }
        break;
    }
    title.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  挨拶  "), "挨拶");
        assert_eq!(clean_title("「挨拶」"), "挨拶");
        assert_eq!(clean_title("\"Greeting\"\n"), "Greeting");
        assert_eq!(clean_title("【『挨拶』】"), "挨拶");
        assert_eq!(clean_title("Rust (book)"), "Rust (book)");
        assert_eq!(clean_title("Line one\nLine two"), "Line one");
        assert_eq!(clean_title("「」"), "");
    }

    #[test]
    fn test_japanese_prompt() {
        let titles = TitleSynthesizer::new(Arc::new(MockApi::new()), "gpt-4o-mini", "Japanese");
        assert_eq!(
            titles.prompt("こんにちは"),
            "以下の文章のタイトルを日本語で最大10文字で簡潔に付けてください。括弧は不要です。\nこんにちは"
        );
    }

    #[test]
    fn test_other_language_prompt() {
        let titles = TitleSynthesizer::new(Arc::new(MockApi::new()), "gpt-4o-mini", "English");
        let prompt = titles.prompt("hello");
        assert!(prompt.contains("in English"));
        assert!(prompt.ends_with("\nhello"));
    }

    #[tokio::test]
    async fn test_synthesize_uses_title_model() {
        let api = Arc::new(MockApi::new().with_title("「挨拶」"));
        let titles = TitleSynthesizer::new(api.clone(), "gpt-4o-mini", "Japanese");

        assert_eq!(titles.synthesize("Hello").await.unwrap(), "挨拶");
        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4o-mini");
        assert!(!requests[0].include_usage);
        assert!(requests[0].messages[0].content.ends_with("\nHello"));
    }

    #[tokio::test]
    async fn test_empty_title_is_error() {
        let api = Arc::new(MockApi::new().with_title("  \"\" "));
        let titles = TitleSynthesizer::new(api, "gpt-4o-mini", "Japanese");
        assert!(titles.synthesize("Hello").await.is_err());
    }

    #[tokio::test]
    async fn test_network_failure() {
        let api = Arc::new(MockApi::new());
        let titles = TitleSynthesizer::new(api, "gpt-4o-mini", "Japanese");
        assert!(matches!(
            titles.synthesize("Hello").await,
            Err(Error::Network(_))
        ));
    }
}
