use crate::traits::CompletionRequest;
use crate::types::Article;

/// Body characters quoted per article in the summary excerpt.
pub const EXCERPT_BODY_CHARS: usize = 500;
/// Total character budget for the summary excerpt.
pub const EXCERPT_MAX_CHARS: usize = 3000;
/// Number of headlines shown to the title generator.
pub const TITLE_SOURCE_ARTICLES: usize = 5;

pub const SUMMARY_MAX_TOKENS: u32 = 300;
pub const TITLE_MAX_TOKENS: u32 = 100;
pub const GENERATION_TEMPERATURE: f32 = 0.7;

const DONT_TELL_ME: &str = r#"
Do not narrate or describe what you are doing.
Do not preface your answer with phrases like "Here is a summary" or "Title:".
Answer with the requested text only."#;

fn take_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Title plus the first part of each body, capped to a fixed budget.
pub fn summary_excerpt(articles: &[Article]) -> String {
    let combined = articles
        .iter()
        .map(|article| {
            let (body, _) = take_chars(&article.content, EXCERPT_BODY_CHARS);
            format!("Title: {}\nContent: {}...", article.title, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    match take_chars(&combined, EXCERPT_MAX_CHARS) {
        (head, true) => format!("{}...", head),
        (all, false) => all.to_string(),
    }
}

/// Bulleted list of the first few non-empty headlines.
pub fn title_excerpt(articles: &[Article]) -> String {
    articles
        .iter()
        .take(TITLE_SOURCE_ARTICLES)
        .filter(|a| !a.title.trim().is_empty())
        .map(|a| format!("- {}", a.title.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_request(articles: &[Article]) -> CompletionRequest {
    CompletionRequest {
        system: format!(
            "Read the following news articles, which all cover the same event, and summarize \
the core issue concisely in no more than 200 characters.{}",
            DONT_TELL_ME
        ),
        prompt: format!(
            "Analyze the following articles:\n\n{}",
            summary_excerpt(articles)
        ),
        max_tokens: SUMMARY_MAX_TOKENS,
        temperature: GENERATION_TEMPERATURE,
    }
}

pub fn title_request(articles: &[Article]) -> CompletionRequest {
    CompletionRequest {
        system: format!(
            "Using the headlines below as reference, write a short and clear title for the news \
issue they describe, in no more than 50 characters.{}",
            DONT_TELL_ME
        ),
        prompt: format!(
            "Create an issue title from these headlines:\n\n{}",
            title_excerpt(articles)
        ),
        max_tokens: TITLE_MAX_TOKENS,
        temperature: GENERATION_TEMPERATURE,
    }
}

pub fn fallback_summary(article_count: usize) -> String {
    format!("{} articles in this issue", article_count)
}

pub fn fallback_title(article_count: usize) -> String {
    format!("Issue: {} articles", article_count)
}

/// Trims generated text and unwraps a single pair of surrounding quotes.
///
/// Returns `None` when nothing usable is left.
pub fn tidy_generated(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let unquoted = ['"', '\'', '“']
        .iter()
        .find_map(|&open| {
            let close = if open == '“' { '”' } else { open };
            trimmed
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
        })
        .unwrap_or(trimmed)
        .trim();

    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}
