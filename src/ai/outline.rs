//! Outline acquisition: asks an [`OutlineSource`] for a structure and falls
//! back to a fixed six-section outline whenever that fails.

use crate::ai::client::{AiError, AiResult};
use crate::core::outline::{Outline, Section, Subtopic};
use crate::Topic;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

pub(crate) const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that specializes in creating detailed research document outlines.";

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineRequest {
    pub topic: String,
    pub academic_level: String,
    pub document_length: u32,
    pub description: Option<String>,
}

impl OutlineRequest {
    pub fn from_topic(topic: &Topic) -> Self {
        Self {
            topic: topic.main_topic.trim().to_string(),
            academic_level: topic.academic_level_or_default().to_string(),
            document_length: topic.document_length,
            description: topic
                .topic_description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        }
    }
}

/// One proposed section as returned by the outline endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProposal {
    pub section_title: String,
    #[serde(default)]
    pub subtopic_titles: Vec<String>,
}

#[async_trait]
pub trait OutlineSource: Send + Sync {
    async fn propose_outline(&self, request: &OutlineRequest) -> AiResult<Vec<SectionProposal>>;
}

/// Never fails: any error, timeout or missing source yields [`static_outline`].
pub async fn acquire_outline(
    source: Option<&dyn OutlineSource>,
    request: &OutlineRequest,
    timeout: Duration,
) -> Outline {
    let Some(source) = source else {
        info!("No outline source configured, using static outline for '{}'", request.topic);
        return static_outline(&request.topic);
    };

    let proposals = match tokio::time::timeout(timeout, source.propose_outline(request)).await {
        Ok(result) => result,
        Err(_) => Err(AiError::Timeout(timeout)),
    };

    match proposals.and_then(validate_proposals) {
        Ok(proposals) => {
            info!(
                "Received outline with {} sections for '{}'",
                proposals.len(),
                request.topic
            );
            build_outline(&request.topic, proposals)
        }
        Err(e) => {
            warn!("Error generating AI outline, falling back to static outline: {}", e);
            static_outline(&request.topic)
        }
    }
}

/// Fresh ids for every node, everything selected, no content yet.
pub fn build_outline(topic: &str, proposals: Vec<SectionProposal>) -> Outline {
    let sections = proposals
        .into_iter()
        .map(|proposal| {
            let subtopics = proposal
                .subtopic_titles
                .iter()
                .map(|title| Subtopic::new(Uuid::new_v4().to_string(), title.trim()))
                .collect();
            Section::new(
                Uuid::new_v4().to_string(),
                proposal.section_title.trim(),
                subtopics,
            )
        })
        .collect();
    Outline::new(topic, sections)
}

/// Schema check applied to every remote outline before it is used.
pub fn validate_proposals(proposals: Vec<SectionProposal>) -> AiResult<Vec<SectionProposal>> {
    if proposals.is_empty() {
        return Err(AiError::InvalidResponse("outline has no sections".to_string()));
    }
    for (index, proposal) in proposals.iter().enumerate() {
        if proposal.section_title.trim().is_empty() {
            return Err(AiError::InvalidResponse(format!(
                "section {} has an empty title",
                index + 1
            )));
        }
        if proposal.subtopic_titles.is_empty() {
            return Err(AiError::InvalidResponse(format!(
                "section '{}' has no subtopics",
                proposal.section_title
            )));
        }
        if proposal.subtopic_titles.iter().any(|t| t.trim().is_empty()) {
            return Err(AiError::InvalidResponse(format!(
                "section '{}' has an empty subtopic title",
                proposal.section_title
            )));
        }
    }
    Ok(proposals)
}

pub(crate) fn build_outline_prompt(request: &OutlineRequest) -> String {
    let (sections, subtopics) = match request.document_length {
        0..=3 => ("3-4", "2-3"),
        4..=10 => ("5-7", "2-4"),
        11..=20 => ("7-9", "3-4"),
        _ => ("9-12", "3-5"),
    };

    let mut prompt = format!(
        "Generate a detailed research document outline for the topic: \"{}\".\n\
         The document is written at the {} level and should span about {} page(s).\n\
         Include {} main sections with {} subtopics each.\n",
        request.topic, request.academic_level, request.document_length, sections, subtopics
    );
    if let Some(description) = &request.description {
        prompt.push_str(&format!("Additional context from the author: {}\n", description));
    }
    prompt.push_str(
        "Respond with JSON only: an object with a \"sections\" array, where each entry has a \
         \"sectionTitle\" string and a \"subtopicTitles\" array of strings.",
    );
    prompt
}

pub(crate) fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "sections": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "sectionTitle": { "type": "STRING" },
                        "subtopicTitles": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["sectionTitle", "subtopicTitles"]
                }
            }
        },
        "required": ["sections"]
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutlinePayload {
    Wrapped { sections: Vec<SectionProposal> },
    Bare(Vec<SectionProposal>),
}

/// Accepts `{"sections": [...]}` or a bare array, optionally inside a code fence.
pub(crate) fn parse_outline_response(raw: &str) -> AiResult<Vec<SectionProposal>> {
    let payload: OutlinePayload = serde_json::from_str(strip_code_fence(raw))?;
    let proposals = match payload {
        OutlinePayload::Wrapped { sections } => sections,
        OutlinePayload::Bare(sections) => sections,
    };
    validate_proposals(proposals)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// The fixed fallback structure. Synchronous and infallible.
pub fn static_outline(topic: &str) -> Outline {
    let sections: [(&str, [(&str, String); 2]); 6] = [
        (
            "Introduction",
            [
                ("Background", format!("This section provides a comprehensive background on {}.", topic)),
                (
                    "Research Question",
                    format!("The primary research question this document addresses is related to {}.", topic),
                ),
            ],
        ),
        (
            "Literature Review",
            [
                ("Previous Studies", format!("Several studies have explored aspects of {} in recent years.", topic)),
                (
                    "Theoretical Framework",
                    format!("The theoretical framework for analyzing {} draws from multiple disciplines.", topic),
                ),
            ],
        ),
        (
            "Methodology",
            [
                ("Research Design", format!("This research employs a mixed-methods approach to study {}.", topic)),
                (
                    "Data Collection",
                    format!(
                        "Data was collected through surveys, interviews, and analysis of existing literature on {}.",
                        topic
                    ),
                ),
            ],
        ),
        (
            "Findings",
            [
                ("Primary Results", format!("The research revealed several key findings about {}.", topic)),
                (
                    "Data Analysis",
                    format!("Statistical analysis of the data shows interesting patterns related to {}.", topic),
                ),
            ],
        ),
        (
            "Discussion",
            [
                (
                    "Interpretation of Results",
                    format!("The results suggest several implications for understanding {}.", topic),
                ),
                (
                    "Limitations",
                    format!("There are several limitations to this study of {} that should be acknowledged.", topic),
                ),
            ],
        ),
        (
            "Conclusion",
            [
                (
                    "Summary of Findings",
                    format!("In summary, this research has contributed to the understanding of {} in several ways.", topic),
                ),
                ("Future Research", format!("Future studies should explore additional aspects of {}.", topic)),
            ],
        ),
    ];

    let sections = sections
        .into_iter()
        .enumerate()
        .map(|(index, (title, subtopics))| {
            let section_id = (index + 1).to_string();
            let subtopics = subtopics
                .into_iter()
                .enumerate()
                .map(|(sub_index, (sub_title, content))| {
                    Subtopic::new(format!("{}-{}", section_id, sub_index + 1), sub_title).with_content(content)
                })
                .collect();
            Section::new(section_id, title, subtopics)
        })
        .collect();

    Outline::new(topic, sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait]
    impl OutlineSource for FailingSource {
        async fn propose_outline(&self, _request: &OutlineRequest) -> AiResult<Vec<SectionProposal>> {
            Err(AiError::Api("HTTP 503: unavailable".to_string()))
        }
    }

    struct SlowSource;

    #[async_trait]
    impl OutlineSource for SlowSource {
        async fn propose_outline(&self, _request: &OutlineRequest) -> AiResult<Vec<SectionProposal>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
    }

    struct FixedSource(Vec<SectionProposal>);

    #[async_trait]
    impl OutlineSource for FixedSource {
        async fn propose_outline(&self, _request: &OutlineRequest) -> AiResult<Vec<SectionProposal>> {
            Ok(self.0.clone())
        }
    }

    fn solar_request() -> OutlineRequest {
        OutlineRequest::from_topic(&Topic::new("Solar Power").with_level("Undergraduate").with_length(5))
    }

    fn assert_static_outline(outline: &Outline) {
        let titles: Vec<&str> = outline.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            ["Introduction", "Literature Review", "Methodology", "Findings", "Discussion", "Conclusion"]
        );
        for section in &outline.sections {
            assert!(section.is_selected);
            assert_eq!(section.subtopics.len(), 2);
            assert!(section.subtopics.iter().all(|s| s.is_selected));
        }
        let intro = &outline.sections[0];
        assert!(intro.subtopics.iter().all(|s| s.content.contains("Solar Power")));
    }

    #[tokio::test]
    async fn failing_source_falls_back_to_static_outline() {
        let outline = acquire_outline(Some(&FailingSource), &solar_request(), Duration::from_secs(5)).await;
        assert_eq!(outline.main_topic, "Solar Power");
        assert_static_outline(&outline);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_static_outline() {
        let outline = acquire_outline(Some(&SlowSource), &solar_request(), Duration::from_millis(50)).await;
        assert_static_outline(&outline);
    }

    #[tokio::test]
    async fn missing_source_uses_static_outline() {
        let outline = acquire_outline(None, &solar_request(), Duration::from_secs(1)).await;
        assert_static_outline(&outline);
    }

    #[tokio::test]
    async fn invalid_proposals_fall_back() {
        let source = FixedSource(vec![SectionProposal {
            section_title: "Only a title".to_string(),
            subtopic_titles: vec![],
        }]);
        let outline = acquire_outline(Some(&source), &solar_request(), Duration::from_secs(1)).await;
        assert_static_outline(&outline);
    }

    #[tokio::test]
    async fn remote_outline_gets_fresh_ids_and_empty_content() {
        let source = FixedSource(vec![
            SectionProposal {
                section_title: " Photovoltaics ".to_string(),
                subtopic_titles: vec!["Cells".to_string(), "Panels".to_string()],
            },
            SectionProposal {
                section_title: "Storage".to_string(),
                subtopic_titles: vec!["Batteries".to_string()],
            },
        ]);
        let outline = acquire_outline(Some(&source), &solar_request(), Duration::from_secs(1)).await;

        assert_eq!(outline.sections.len(), 2);
        assert_eq!(outline.sections[0].title, "Photovoltaics");
        assert_ne!(outline.sections[0].id, outline.sections[1].id);
        assert_ne!(outline.sections[0].subtopics[0].id, outline.sections[0].subtopics[1].id);
        for (_, subtopic) in outline.selected_subtopics() {
            assert!(subtopic.content.is_empty());
        }
        assert_eq!(outline.selected_subtopic_count(), 3);
    }

    #[test]
    fn static_outline_ids_are_positional() {
        let outline = static_outline("Tides");
        assert_eq!(outline.sections[2].id, "3");
        assert_eq!(outline.sections[2].subtopics[1].id, "3-2");
    }

    #[test]
    fn parses_wrapped_bare_and_fenced_json() {
        let wrapped = r#"{"sections":[{"sectionTitle":"A","subtopicTitles":["a1","a2"]}]}"#;
        assert_eq!(parse_outline_response(wrapped).unwrap()[0].subtopic_titles.len(), 2);

        let bare = r#"[{"sectionTitle":"B","subtopicTitles":["b1"]}]"#;
        assert_eq!(parse_outline_response(bare).unwrap()[0].section_title, "B");

        let fenced = "```json\n{\"sections\":[{\"sectionTitle\":\"C\",\"subtopicTitles\":[\"c1\"]}]}\n```";
        assert_eq!(parse_outline_response(fenced).unwrap()[0].section_title, "C");

        assert!(parse_outline_response(r#"{"sections":[]}"#).is_err());
        assert!(parse_outline_response("sorry, I cannot help").is_err());
    }

    #[test]
    fn prompt_scales_with_length() {
        let short = build_outline_prompt(&OutlineRequest::from_topic(&Topic::new("Bees").with_length(1)));
        assert!(short.contains("3-4 main sections"));
        let long = build_outline_prompt(&OutlineRequest::from_topic(&Topic::new("Bees").with_length(25)));
        assert!(long.contains("9-12 main sections"));
        assert!(long.contains("\"Bees\""));
        assert!(long.contains("Undergraduate level"));
    }
}
