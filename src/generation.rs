use crate::ai::client::DEFAULT_TIMEOUT_SECS;
use crate::ai::content::{acquire_content, ContentRequest, ContentSource};
use crate::core::outline::Outline;
use crate::DEFAULT_ACADEMIC_LEVEL;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillState {
    Idle,
    /// `current` is the 1-based position of the subtopic being written.
    Running { current: usize, total: usize },
    Done,
    Cancelled { completed: usize, total: usize },
    /// The run finished but `subtopic_id` (the first of possibly several)
    /// got placeholder text instead of generated content.
    Failed { subtopic_id: String },
}

impl FillState {
    pub fn is_running(&self) -> bool {
        matches!(self, FillState::Running { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillProgress {
    pub completed: usize,
    pub total: usize,
}

impl FillProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

/// Shared flag polled between subtopics. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct PendingSubtopic {
    section_id: String,
    subtopic_id: String,
    section_title: String,
    subtopic_title: String,
}

/// Walks the selected subtopics one at a time and merges generated content
/// back into the outline.
pub struct ContentFillDriver {
    source: Option<Arc<dyn ContentSource>>,
    academic_level: String,
    timeout: Duration,
    cancel: CancelHandle,
    state: FillState,
}

impl ContentFillDriver {
    pub fn new(source: Option<Arc<dyn ContentSource>>) -> Self {
        Self {
            source,
            academic_level: DEFAULT_ACADEMIC_LEVEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cancel: CancelHandle::new(),
            state: FillState::Idle,
        }
    }

    pub fn with_academic_level(mut self, level: impl Into<String>) -> Self {
        self.academic_level = level.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_academic_level(&mut self, level: impl Into<String>) {
        self.academic_level = level.into();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> &FillState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.cancel.clear();
        self.state = FillState::Idle;
    }

    /// Fills every selected subtopic whose content is empty, in display order.
    ///
    /// `on_progress` fires once before the first request and after each merge.
    /// Returns the input unchanged when nothing is pending.
    ///
    /// A cancel raised before the call stops the run before its first request.
    /// The run that stops consumes the flag; so does a run that finishes.
    pub async fn fill_all<F>(&mut self, outline: &Outline, mut on_progress: F) -> Outline
    where
        F: FnMut(FillProgress),
    {
        let total = outline.selected_subtopic_count();
        let pending: Vec<PendingSubtopic> = outline
            .selected_subtopics()
            .filter(|(_, subtopic)| !subtopic.has_content())
            .map(|(section, subtopic)| PendingSubtopic {
                section_id: section.id.clone(),
                subtopic_id: subtopic.id.clone(),
                section_title: section.title.clone(),
                subtopic_title: subtopic.title.clone(),
            })
            .collect();

        if pending.is_empty() {
            debug!("No subtopics waiting for content, skipping fill");
            return outline.clone();
        }

        let mut completed = total - pending.len();
        let mut first_failed: Option<String> = None;
        let mut current = outline.clone();

        info!(
            "Generating content for {} of {} selected subtopics",
            pending.len(),
            total
        );
        on_progress(FillProgress { completed, total });

        for item in pending {
            if self.cancel.is_cancelled() {
                warn!("Content generation cancelled after {}/{}", completed, total);
                self.cancel.clear();
                self.state = FillState::Cancelled { completed, total };
                return current;
            }

            self.state = FillState::Running {
                current: completed + 1,
                total,
            };
            let request = ContentRequest {
                main_topic: current.main_topic.clone(),
                section_title: item.section_title,
                subtopic_title: item.subtopic_title,
                academic_level: self.academic_level.clone(),
            };
            let content = acquire_content(self.source.as_deref(), &request, self.timeout).await;
            if content.is_fallback && first_failed.is_none() {
                first_failed = Some(item.subtopic_id.clone());
            }

            if let Some(next) =
                current.with_subtopic_content(&item.section_id, &item.subtopic_id, content.text)
            {
                current = next;
            }
            completed += 1;
            debug!("Generated content for '{}' ({}/{})", request.subtopic_title, completed, total);
            on_progress(FillProgress { completed, total });
        }

        self.cancel.clear();
        self.state = match first_failed {
            Some(subtopic_id) => FillState::Failed { subtopic_id },
            None => FillState::Done,
        };
        info!("Content generation finished: {:?}", self.state);
        current
    }

    /// Rewrites one subtopic's content regardless of what it holds. The fill
    /// state is left alone. Unknown ids return an unchanged copy.
    pub async fn regenerate_one(
        &self,
        outline: &Outline,
        section_id: &str,
        subtopic_id: &str,
    ) -> Outline {
        let Some(section) = outline.section(section_id) else {
            debug!("regenerate: no section '{}'", section_id);
            return outline.clone();
        };
        let Some(subtopic) = section.subtopic(subtopic_id) else {
            debug!("regenerate: no subtopic '{}' in '{}'", subtopic_id, section_id);
            return outline.clone();
        };

        let request = ContentRequest {
            main_topic: outline.main_topic.clone(),
            section_title: section.title.clone(),
            subtopic_title: subtopic.title.clone(),
            academic_level: self.academic_level.clone(),
        };
        info!("Regenerating content for '{}'", request.subtopic_title);
        let content = acquire_content(self.source.as_deref(), &request, self.timeout).await;
        outline
            .with_subtopic_content(section_id, subtopic_id, content.text)
            .unwrap_or_else(|| outline.clone())
    }
}
