//! Content acquisition for a single subtopic. Callers never see an error:
//! failures turn into a placeholder paragraph naming the subtopic.

use crate::ai::client::{AiError, AiResult};
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

pub(crate) const SYSTEM_PROMPT: &str =
    "You are a specialized academic content writer that creates well-researched, informative content. \
     Write in a professional academic style appropriate for the specified academic level.";

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub main_topic: String,
    pub section_title: String,
    pub subtopic_title: String,
    pub academic_level: String,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn write_content(&self, request: &ContentRequest) -> AiResult<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredContent {
    pub text: String,
    /// True when `text` is the placeholder rather than generated content.
    pub is_fallback: bool,
}

pub fn placeholder_content(subtopic_title: &str) -> String {
    format!(
        "An error occurred while generating content for \"{}\". Please try again later.",
        subtopic_title
    )
}

/// Always yields non-empty text.
pub async fn acquire_content(
    source: Option<&dyn ContentSource>,
    request: &ContentRequest,
    timeout: Duration,
) -> AcquiredContent {
    let result = match source {
        Some(source) => match tokio::time::timeout(timeout, source.write_content(request)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(timeout)),
        },
        None => Err(AiError::MissingApiKey),
    };

    match result.map(|text| clean_content(&text)) {
        Ok(text) if !text.is_empty() => AcquiredContent {
            text,
            is_fallback: false,
        },
        Ok(_) => {
            warn!("Empty content returned for '{}'", request.subtopic_title);
            fallback(request)
        }
        Err(e) => {
            warn!(
                "Error generating AI content for '{}': {}",
                request.subtopic_title, e
            );
            fallback(request)
        }
    }
}

fn fallback(request: &ContentRequest) -> AcquiredContent {
    AcquiredContent {
        text: placeholder_content(&request.subtopic_title),
        is_fallback: true,
    }
}

pub(crate) fn build_content_prompt(request: &ContentRequest) -> String {
    format!(
        "Write detailed content for the subtopic \"{}\" within the section \"{}\" of a research document about \"{}\".\n\
         The content should be suitable for {} level.\n\
         Include relevant information, examples, and explanations where necessary.\n\
         Keep the academic style and within 100-120 words.\n\
         Do not include citations in brackets, but write as if the content is well-researched. \
         Do not return markdown. Return the content directly and nothing else.",
        request.subtopic_title, request.section_title, request.main_topic, request.academic_level
    )
}

/// Strips markdown residue and bracketed numeric citations, normalises paragraph breaks.
pub(crate) fn clean_content(raw: &str) -> String {
    let paragraphs: Vec<String> = raw
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(|block| {
            let joined = block
                .lines()
                .map(|line| line.trim().trim_start_matches('#').trim())
                .filter(|line| !line.is_empty() && !line.starts_with("```"))
                .collect::<Vec<_>>()
                .join(" ");
            strip_citations(&joined.replace("**", "").replace("__", ""))
        })
        .filter(|block| !block.is_empty())
        .collect();
    paragraphs.join("\n\n")
}

/// Removes `[1]`, `[2, 3]`, `[4-6]` style markers.
fn strip_citations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        let (before, from_bracket) = rest.split_at(start);
        match from_bracket.find(']') {
            Some(end)
                if end > 1
                    && from_bracket[1..end]
                        .chars()
                        .all(|c| c.is_ascii_digit() || c == ',' || c == '-' || c == ' ') =>
            {
                out.push_str(before.trim_end());
                rest = &from_bracket[end + 1..];
            }
            _ => {
                out.push_str(before);
                out.push('[');
                rest = &from_bracket[1..];
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
