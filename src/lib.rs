pub mod core {
    pub mod outline;
    pub mod selection;
    pub mod preview;
    pub mod layout;
    pub mod writer;
}

pub mod ai {
    pub mod client;
    pub mod outline;
    pub mod content;
}

pub mod generation;
pub mod session;

pub mod utils {
    pub mod document_processor;
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_ACADEMIC_LEVEL: &str = "Undergraduate";
pub const DEFAULT_CITATION_FORMAT: &str = "APA";
pub const DEFAULT_DOCUMENT_LENGTH: u32 = 5;

/// Parameters entered on the first wizard step. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub main_topic: String,
    /// Target length in pages.
    pub document_length: u32,
    pub output_format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_level: Option<String>,
}

impl Topic {
    pub fn new(main_topic: impl Into<String>) -> Self {
        Self {
            main_topic: main_topic.into(),
            document_length: DEFAULT_DOCUMENT_LENGTH,
            output_format: OutputFormat::Docx,
            topic_description: None,
            citation_format: Some(DEFAULT_CITATION_FORMAT.to_string()),
            academic_level: Some(DEFAULT_ACADEMIC_LEVEL.to_string()),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.academic_level = Some(level.into());
        self
    }

    pub fn with_length(mut self, pages: u32) -> Self {
        self.document_length = pages;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn academic_level_or_default(&self) -> &str {
        self.academic_level
            .as_deref()
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .unwrap_or(DEFAULT_ACADEMIC_LEVEL)
    }

    /// Checks the constraints the topic form enforces before submission.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.main_topic.trim().is_empty() {
            anyhow::bail!("Research topic must not be empty");
        }
        if self.document_length == 0 {
            anyhow::bail!("Document length must be at least one page");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    Docx,
    Pdf,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Docx => write!(f, "DOCX"),
            OutputFormat::Pdf => write!(f, "PDF"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(OutputFormat::Docx),
            "pdf" => Ok(OutputFormat::Pdf),
            other => anyhow::bail!("Unsupported output format: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_defaults_match_form() {
        let topic = Topic::new("Solar Power");
        assert_eq!(topic.document_length, 5);
        assert_eq!(topic.output_format, OutputFormat::Docx);
        assert_eq!(topic.citation_format.as_deref(), Some("APA"));
        assert_eq!(topic.academic_level_or_default(), "Undergraduate");
    }

    #[test]
    fn blank_topic_is_rejected() {
        assert!(Topic::new("   ").validate().is_err());
        assert!(Topic::new("Tides").with_length(0).validate().is_err());
        assert!(Topic::new("Tides").validate().is_ok());
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("PDF".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        assert_eq!(" docx ".parse::<OutputFormat>().unwrap(), OutputFormat::Docx);
        assert!("odt".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Pdf.extension(), "pdf");
    }

    #[test]
    fn topic_json_uses_wire_names() {
        let json = serde_json::to_value(Topic::new("Bees")).unwrap();
        assert_eq!(json["mainTopic"], "Bees");
        assert_eq!(json["outputFormat"], "DOCX");
        assert_eq!(json["documentLength"], 5);
    }
}
