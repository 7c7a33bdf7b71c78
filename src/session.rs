//! Wizard controller: holds the current topic and outline and gates moves
//! between the four steps.

use crate::ai::client::DEFAULT_TIMEOUT_SECS;
use crate::ai::content::ContentSource;
use crate::ai::outline::{acquire_outline, OutlineRequest, OutlineSource};
use crate::core::outline::Outline;
use crate::core::preview::render_markdown;
use crate::core::selection;
use crate::core::writer::{export_document_async, ExportNotice, TitlePage};
use crate::generation::{CancelHandle, ContentFillDriver, FillProgress, FillState};
use crate::{OutputFormat, Topic};
use log::{debug, info};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Undo depth. Older revisions are dropped.
const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    TopicEntry,
    OutlineReview,
    ContentGeneration,
    Preview,
}

impl WizardStep {
    fn following(self) -> Option<WizardStep> {
        match self {
            WizardStep::TopicEntry => Some(WizardStep::OutlineReview),
            WizardStep::OutlineReview => Some(WizardStep::ContentGeneration),
            WizardStep::ContentGeneration => Some(WizardStep::Preview),
            WizardStep::Preview => None,
        }
    }

    fn preceding(self) -> WizardStep {
        match self {
            WizardStep::TopicEntry | WizardStep::OutlineReview => WizardStep::TopicEntry,
            WizardStep::ContentGeneration => WizardStep::OutlineReview,
            WizardStep::Preview => WizardStep::ContentGeneration,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    #[error("no outline has been generated yet")]
    NoOutline,
    #[error("no subtopics are selected")]
    NothingSelected,
    #[error("cannot leave {step:?}: {reason}")]
    GateNotMet { step: WizardStep, reason: &'static str },
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("an export is already running")]
    ExportInProgress,
}

pub struct WizardSession {
    step: WizardStep,
    topic: Option<Topic>,
    outline: Option<Outline>,
    history: VecDeque<Outline>,
    outline_source: Option<Arc<dyn OutlineSource>>,
    driver: ContentFillDriver,
    timeout: Duration,
    exporting: AtomicBool,
}

impl WizardSession {
    pub fn new(
        outline_source: Option<Arc<dyn OutlineSource>>,
        content_source: Option<Arc<dyn ContentSource>>,
    ) -> Self {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        Self {
            step: WizardStep::TopicEntry,
            topic: None,
            outline: None,
            history: VecDeque::new(),
            outline_source,
            driver: ContentFillDriver::new(content_source).with_timeout(timeout),
            timeout,
            exporting: AtomicBool::new(false),
        }
    }

    /// Session with no AI collaborators: static outline, placeholder content.
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.driver = self.driver.with_timeout(timeout);
        self
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    pub fn outline(&self) -> Option<&Outline> {
        self.outline.as_ref()
    }

    pub fn fill_state(&self) -> &FillState {
        self.driver.state()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.driver.cancel_handle()
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Validates the topic, acquires an outline for it and moves to outline review.
    pub async fn submit_topic(&mut self, topic: Topic) -> Result<&Outline, SessionError> {
        topic
            .validate()
            .map_err(|e| SessionError::InvalidTopic(e.to_string()))?;

        let request = OutlineRequest::from_topic(&topic);
        let outline = acquire_outline(self.outline_source.as_deref(), &request, self.timeout).await;
        info!(
            "Outline for '{}' has {} sections",
            outline.main_topic,
            outline.sections.len()
        );

        self.driver.reset();
        self.driver.set_academic_level(topic.academic_level_or_default());
        self.history.clear();
        self.topic = Some(topic);
        self.step = WizardStep::OutlineReview;
        Ok(self.outline.insert(outline))
    }

    pub fn toggle_section(&mut self, section_id: &str) -> Result<(), SessionError> {
        let next = selection::toggle_section(self.require_outline()?, section_id);
        self.replace_outline(next);
        Ok(())
    }

    pub fn toggle_subtopic(&mut self, section_id: &str, subtopic_id: &str) -> Result<(), SessionError> {
        let next = selection::toggle_subtopic(self.require_outline()?, section_id, subtopic_id);
        self.replace_outline(next);
        Ok(())
    }

    /// Deselects sections by title. No history entry when nothing matched.
    pub fn exclude_sections<S: AsRef<str>>(&mut self, titles: &[S]) -> Result<(), SessionError> {
        let current = self.require_outline()?;
        let next = selection::exclude_sections_by_title(current, titles);
        if &next != current {
            self.replace_outline(next);
        }
        Ok(())
    }

    /// Runs the fill driver over the current outline. A complete outline is left alone.
    pub async fn generate_all<F>(&mut self, on_progress: F) -> Result<FillState, SessionError>
    where
        F: FnMut(FillProgress),
    {
        let outline = self.require_outline()?.clone();
        if outline.selected_subtopic_count() == 0 {
            return Err(SessionError::NothingSelected);
        }
        self.step = WizardStep::ContentGeneration;

        let filled = self.driver.fill_all(&outline, on_progress).await;
        if filled != outline {
            self.replace_outline(filled);
        }
        Ok(self.driver.state().clone())
    }

    pub async fn regenerate(&mut self, section_id: &str, subtopic_id: &str) -> Result<(), SessionError> {
        let outline = self.require_outline()?.clone();
        let next = self.driver.regenerate_one(&outline, section_id, subtopic_id).await;
        self.replace_outline(next);
        Ok(())
    }

    pub fn can_advance(&self) -> bool {
        self.advance_gate().is_ok()
    }

    pub fn next(&mut self) -> Result<WizardStep, SessionError> {
        self.advance_gate()?;
        if let Some(step) = self.step.following() {
            self.step = step;
        }
        debug!("Wizard moved to {:?}", self.step);
        Ok(self.step)
    }

    pub fn back(&mut self) -> WizardStep {
        self.step = self.step.preceding();
        debug!("Wizard moved back to {:?}", self.step);
        self.step
    }

    /// Restores the outline as it was before the last replacement.
    pub fn undo(&mut self) -> Result<(), SessionError> {
        let previous = self.history.pop_back().ok_or(SessionError::NothingToUndo)?;
        self.outline = Some(previous);
        Ok(())
    }

    /// Discards topic, outline and history and returns to topic entry.
    pub fn reset(&mut self) {
        info!("Resetting wizard session");
        self.step = WizardStep::TopicEntry;
        self.topic = None;
        self.outline = None;
        self.history.clear();
        self.driver.reset();
    }

    pub fn preview(&self) -> Option<String> {
        self.outline.as_ref().map(render_markdown)
    }

    /// Writes the current outline in `format` under `out_dir`. Export failures
    /// come back as [`ExportNotice::Failed`]; the outline is untouched either way.
    /// Only one export runs at a time per session.
    pub async fn export(
        &self,
        format: OutputFormat,
        out_dir: impl Into<PathBuf>,
    ) -> Result<ExportNotice, SessionError> {
        let outline = self.require_outline()?.clone();
        let _guard = self.begin_export()?;
        let title_page = match &self.topic {
            Some(topic) => TitlePage::for_topic(topic),
            None => TitlePage::default(),
        };
        Ok(export_document_async(outline, format, title_page, out_dir.into()).await)
    }

    fn advance_gate(&self) -> Result<(), SessionError> {
        let gate = |reason| SessionError::GateNotMet {
            step: self.step,
            reason,
        };
        match self.step {
            WizardStep::TopicEntry => {
                if self.outline.is_none() {
                    return Err(gate("no outline yet"));
                }
            }
            WizardStep::OutlineReview => {
                let outline = self.require_outline()?;
                if outline.selected_subtopic_count() == 0 {
                    return Err(SessionError::NothingSelected);
                }
            }
            WizardStep::ContentGeneration => {
                let outline = self.require_outline()?;
                if self.driver.state().is_running() || !outline.is_content_complete() {
                    return Err(gate("content generation not complete"));
                }
            }
            WizardStep::Preview => return Err(gate("last step")),
        }
        Ok(())
    }

    fn begin_export(&self) -> Result<ExportGuard<'_>, SessionError> {
        self.exporting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SessionError::ExportInProgress)?;
        Ok(ExportGuard(&self.exporting))
    }

    fn require_outline(&self) -> Result<&Outline, SessionError> {
        self.outline.as_ref().ok_or(SessionError::NoOutline)
    }

    fn replace_outline(&mut self, next: Outline) {
        if let Some(previous) = self.outline.replace(next) {
            self.history.push_back(previous);
            if self.history.len() > MAX_HISTORY {
                self.history.pop_front();
            }
        }
    }
}

/// Clears the session's export flag when the export finishes or is dropped.
struct ExportGuard<'a>(&'a AtomicBool);

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solar() -> Topic {
        Topic::new("Solar Power")
    }

    #[tokio::test]
    async fn empty_topic_is_rejected() {
        let mut session = WizardSession::offline();
        let err = session.submit_topic(Topic::new("   ")).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTopic(_)));
        assert_eq!(session.step(), WizardStep::TopicEntry);
        assert!(!session.can_advance());
    }

    #[tokio::test]
    async fn offline_run_reaches_preview() {
        let mut session = WizardSession::offline();
        let outline = session.submit_topic(solar()).await.unwrap();
        assert_eq!(outline.sections.len(), 6);
        assert_eq!(session.step(), WizardStep::OutlineReview);

        assert_eq!(session.next().unwrap(), WizardStep::ContentGeneration);

        // the static outline arrives with content, so there is nothing to fill
        let state = session.generate_all(|_| {}).await.unwrap();
        assert_eq!(state, FillState::Idle);
        assert!(!session.can_undo());

        session.regenerate("1", "1-1").await.unwrap();
        let text = &session.outline().unwrap().subtopic("1", "1-1").unwrap().content;
        assert!(text.contains("\"Background\""));
        assert!(session.can_advance());
        assert_eq!(session.next().unwrap(), WizardStep::Preview);

        let preview = session.preview().unwrap();
        assert!(preview.starts_with("# Solar Power"));
        assert!(!preview.contains("_Content will appear here"));
    }

    struct TwoSections;

    #[async_trait::async_trait]
    impl OutlineSource for TwoSections {
        async fn propose_outline(
            &self,
            _request: &OutlineRequest,
        ) -> crate::ai::client::AiResult<Vec<crate::ai::outline::SectionProposal>> {
            Ok(vec![
                crate::ai::outline::SectionProposal {
                    section_title: "Panels".to_string(),
                    subtopic_titles: vec!["Cells".to_string(), "Efficiency".to_string()],
                },
                crate::ai::outline::SectionProposal {
                    section_title: "Grid".to_string(),
                    subtopic_titles: vec!["Storage".to_string()],
                },
            ])
        }
    }

    struct Writes;

    #[async_trait::async_trait]
    impl ContentSource for Writes {
        async fn write_content(
            &self,
            request: &crate::ai::content::ContentRequest,
        ) -> crate::ai::client::AiResult<String> {
            Ok(format!("Notes on {}.", request.subtopic_title))
        }
    }

    #[tokio::test]
    async fn preview_gate_waits_for_content() {
        let mut session = WizardSession::new(Some(Arc::new(TwoSections)), Some(Arc::new(Writes)));
        session.submit_topic(solar()).await.unwrap();
        session.next().unwrap();
        assert!(!session.can_advance());
        assert!(matches!(
            session.next(),
            Err(SessionError::GateNotMet {
                step: WizardStep::ContentGeneration,
                ..
            })
        ));

        let mut fractions = Vec::new();
        let state = session
            .generate_all(|p| fractions.push(p.fraction()))
            .await
            .unwrap();
        assert_eq!(state, FillState::Done);
        assert_eq!(fractions.last(), Some(&1.0));
        assert_eq!(session.next().unwrap(), WizardStep::Preview);
        assert!(session.preview().unwrap().contains("Notes on Storage."));

        // generation is one history entry and can be undone
        session.undo().unwrap();
        assert_eq!(session.outline().unwrap().pending_subtopic_count(), 3);
    }

    #[tokio::test]
    async fn deselecting_everything_blocks_generation() {
        let mut session = WizardSession::offline();
        session.submit_topic(solar()).await.unwrap();
        for id in ["1", "2", "3", "4", "5", "6"] {
            session.toggle_section(id).unwrap();
        }
        assert_eq!(session.next(), Err(SessionError::NothingSelected));
        assert_eq!(
            session.generate_all(|_| {}).await,
            Err(SessionError::NothingSelected)
        );
    }

    #[tokio::test]
    async fn undo_restores_previous_selection() {
        let mut session = WizardSession::offline();
        session.submit_topic(solar()).await.unwrap();
        assert!(!session.can_undo());

        session.toggle_subtopic("2", "2-1").unwrap();
        assert!(!session.outline().unwrap().subtopic("2", "2-1").unwrap().is_selected);

        session.undo().unwrap();
        assert!(session.outline().unwrap().subtopic("2", "2-1").unwrap().is_selected);
        assert_eq!(session.undo(), Err(SessionError::NothingToUndo));
    }

    #[tokio::test]
    async fn back_is_always_allowed_and_reset_clears() {
        let mut session = WizardSession::offline();
        session.submit_topic(solar()).await.unwrap();
        assert_eq!(session.back(), WizardStep::TopicEntry);
        assert_eq!(session.back(), WizardStep::TopicEntry);
        assert!(session.can_advance());

        session.reset();
        assert!(session.outline().is_none());
        assert!(session.topic().is_none());
        assert_eq!(session.fill_state(), &FillState::Idle);
        assert_eq!(session.toggle_section("1"), Err(SessionError::NoOutline));
    }

    #[tokio::test]
    async fn export_before_outline_is_an_error() {
        let session = WizardSession::offline();
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            session.export(OutputFormat::Pdf, dir.path()).await.err(),
            Some(SessionError::NoOutline)
        );
    }

    #[tokio::test]
    async fn second_export_waits_for_the_first() {
        let mut session = WizardSession::offline();
        session.submit_topic(solar()).await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let guard = session.begin_export().unwrap();
        assert_eq!(
            session.export(OutputFormat::Docx, dir.path()).await.err(),
            Some(SessionError::ExportInProgress)
        );
        assert!(!dir.path().join("Solar_Power.docx").exists());

        drop(guard);
        let notice = session.export(OutputFormat::Docx, dir.path()).await.unwrap();
        assert!(notice.is_saved());
        // the flag is released after a finished export too
        assert!(session.begin_export().is_ok());
    }

    #[tokio::test]
    async fn undo_history_keeps_the_latest_fifty() {
        let mut session = WizardSession::offline();
        session.submit_topic(solar()).await.unwrap();
        for _ in 0..60 {
            session.toggle_subtopic("2", "2-1").unwrap();
        }
        assert_eq!(session.history.len(), MAX_HISTORY);

        for _ in 0..MAX_HISTORY {
            session.undo().unwrap();
        }
        assert_eq!(session.undo(), Err(SessionError::NothingToUndo));
        // 60 toggles minus 50 undone leaves 10 applied, an even count
        assert!(session.outline().unwrap().subtopic("2", "2-1").unwrap().is_selected);
    }
}
