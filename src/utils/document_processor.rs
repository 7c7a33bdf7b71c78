use crate::ai::content::ContentSource;
use crate::ai::outline::OutlineSource;
use crate::core::outline::Outline;
use crate::core::writer::{export_file_stem, ExportNotice};
use crate::generation::FillState;
use crate::session::WizardSession;
use crate::{OutputFormat, Topic};
use anyhow::Result;
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ProcessorOptions {
    /// Formats to export. Empty means the topic's own output format.
    pub formats: Vec<OutputFormat>,
    /// Also write the Markdown preview next to the exports.
    pub write_preview: bool,
    /// Also write the final outline as JSON.
    pub save_outline: bool,
    /// Section titles to deselect before content generation.
    pub exclude_sections: Vec<String>,
}

#[derive(Debug)]
pub struct ProcessReport {
    pub outline: Outline,
    pub fill_state: FillState,
    pub notices: Vec<ExportNotice>,
    pub preview_path: Option<PathBuf>,
    pub outline_path: Option<PathBuf>,
}

impl ProcessReport {
    pub fn all_saved(&self) -> bool {
        self.notices.iter().all(ExportNotice::is_saved)
    }
}

/// Drives one whole wizard run without user interaction.
pub struct DocumentProcessor {
    outline_source: Option<Arc<dyn OutlineSource>>,
    content_source: Option<Arc<dyn ContentSource>>,
    timeout: Option<Duration>,
    options: ProcessorOptions,
}

impl DocumentProcessor {
    pub fn new(
        outline_source: Option<Arc<dyn OutlineSource>>,
        content_source: Option<Arc<dyn ContentSource>>,
    ) -> Self {
        Self {
            outline_source,
            content_source,
            timeout: None,
            options: ProcessorOptions::default(),
        }
    }

    /// No AI collaborators: static outline and placeholder content.
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    pub fn with_options(mut self, options: ProcessorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Topic in, documents out: outline, selection, content, preview, export.
    pub async fn run<P: AsRef<Path>>(&self, topic: Topic, out_dir: P) -> Result<ProcessReport> {
        let out_dir = out_dir.as_ref();
        info!("Starting document generation for: {}", topic.main_topic);

        fs::create_dir_all(out_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create output directory: {}", e))?;
        info!("Output directory prepared: {}", out_dir.display());

        let mut session = WizardSession::new(self.outline_source.clone(), self.content_source.clone());
        if let Some(timeout) = self.timeout {
            session = session.with_timeout(timeout);
        }

        let formats = if self.options.formats.is_empty() {
            vec![topic.output_format]
        } else {
            self.options.formats.clone()
        };

        session
            .submit_topic(topic)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to submit topic: {}", e))?;

        if !self.options.exclude_sections.is_empty() {
            debug!("Excluding sections: {:?}", self.options.exclude_sections);
            session
                .exclude_sections(&self.options.exclude_sections)
                .map_err(|e| anyhow::anyhow!("Failed to apply section exclusions: {}", e))?;
        }
        session
            .next()
            .map_err(|e| anyhow::anyhow!("Nothing left to generate: {}", e))?;

        let fill_state = session
            .generate_all(|progress| {
                info!(
                    "Content progress: {}/{} ({:.0}%)",
                    progress.completed,
                    progress.total,
                    progress.fraction() * 100.0
                );
            })
            .await
            .map_err(|e| anyhow::anyhow!("Content generation failed: {}", e))?;
        if let FillState::Failed { subtopic_id } = &fill_state {
            warn!(
                "Some subtopics received placeholder content, first was {}",
                subtopic_id
            );
        }
        session
            .next()
            .map_err(|e| anyhow::anyhow!("Failed to open preview: {}", e))?;

        let outline = session
            .outline()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Session lost its outline"))?;
        let stem = export_file_stem(&outline.main_topic);

        let preview_path = if self.options.write_preview {
            let path = out_dir.join(format!("{}.md", stem));
            let preview = session.preview().unwrap_or_default();
            fs::write(&path, preview)
                .map_err(|e| anyhow::anyhow!("Failed to write preview file: {}", e))?;
            info!("Saved preview to file: {}", path.display());
            Some(path)
        } else {
            None
        };

        let outline_path = if self.options.save_outline {
            let path = out_dir.join(format!("{}.outline.json", stem));
            let json = serde_json::to_string_pretty(&outline)?;
            fs::write(&path, json)
                .map_err(|e| anyhow::anyhow!("Failed to write outline file: {}", e))?;
            info!("Saved outline to file: {}", path.display());
            Some(path)
        } else {
            None
        };

        let mut notices = Vec::with_capacity(formats.len());
        for format in formats {
            let notice = session
                .export(format, out_dir)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to export {}: {}", format, e))?;
            if !notice.is_saved() {
                error!("{}", notice.message());
            }
            notices.push(notice);
        }

        info!("Document generation completed for: {}", outline.main_topic);
        Ok(ProcessReport {
            outline,
            fill_state,
            notices,
            preview_path,
            outline_path,
        })
    }
}
