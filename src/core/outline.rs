use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Leaf node of the outline. `content` stays empty until generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subtopic {
    pub id: String,
    pub title: String,
    pub is_selected: bool,
    #[serde(default)]
    pub content: String,
}

impl Subtopic {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            is_selected: true,
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// Blank-line delimited blocks of the content, trimmed, empty blocks dropped.
    pub fn paragraphs(&self) -> Vec<&str> {
        self.content
            .split("\n\n")
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub is_selected: bool,
    #[serde(default)]
    pub subtopics: Vec<Arc<Subtopic>>,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, subtopics: Vec<Subtopic>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            is_selected: true,
            subtopics: subtopics.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn subtopic(&self, subtopic_id: &str) -> Option<&Subtopic> {
        self.subtopics
            .iter()
            .map(Arc::as_ref)
            .find(|subtopic| subtopic.id == subtopic_id)
    }

    pub fn any_subtopic_selected(&self) -> bool {
        self.subtopics.iter().any(|subtopic| subtopic.is_selected)
    }

    pub fn selected_subtopics(&self) -> impl Iterator<Item = &Subtopic> {
        self.subtopics
            .iter()
            .map(Arc::as_ref)
            .filter(|subtopic| subtopic.is_selected)
    }
}

/// The single mutable aggregate of a wizard run.
///
/// Edits never happen in place: every operation returns a new `Outline`
/// that shares the untouched sections and subtopics with its predecessor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub main_topic: String,
    pub sections: Vec<Arc<Section>>,
}

impl Outline {
    pub fn new(main_topic: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            main_topic: main_topic.into(),
            sections: sections.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections
            .iter()
            .map(Arc::as_ref)
            .find(|section| section.id == section_id)
    }

    pub fn subtopic(&self, section_id: &str, subtopic_id: &str) -> Option<&Subtopic> {
        self.section(section_id)?.subtopic(subtopic_id)
    }

    /// Selected subtopics of selected sections, in display order.
    pub fn selected_subtopics(&self) -> impl Iterator<Item = (&Section, &Subtopic)> {
        self.sections
            .iter()
            .map(Arc::as_ref)
            .filter(|section| section.is_selected)
            .flat_map(|section| {
                section
                    .selected_subtopics()
                    .map(move |subtopic| (section, subtopic))
            })
    }

    pub fn selected_subtopic_count(&self) -> usize {
        self.selected_subtopics().count()
    }

    /// Selected subtopics still waiting for content.
    pub fn pending_subtopic_count(&self) -> usize {
        self.selected_subtopics()
            .filter(|(_, subtopic)| !subtopic.has_content())
            .count()
    }

    /// True when something is selected and every selected subtopic has content.
    pub fn is_content_complete(&self) -> bool {
        self.selected_subtopic_count() > 0 && self.pending_subtopic_count() == 0
    }

    pub fn any_section_selected(&self) -> bool {
        self.sections.iter().any(|section| section.is_selected)
    }

    /// Returns a copy with one section replaced by `edit(section)`.
    /// `None` when no section has that id.
    pub fn with_section<F>(&self, section_id: &str, edit: F) -> Option<Outline>
    where
        F: FnOnce(&Section) -> Section,
    {
        let index = self
            .sections
            .iter()
            .position(|section| section.id == section_id)?;
        let mut sections = self.sections.clone();
        sections[index] = Arc::new(edit(&self.sections[index]));
        Some(Outline {
            main_topic: self.main_topic.clone(),
            sections,
        })
    }

    /// Returns a copy with one subtopic's content overwritten.
    pub fn with_subtopic_content(
        &self,
        section_id: &str,
        subtopic_id: &str,
        content: String,
    ) -> Option<Outline> {
        self.subtopic(section_id, subtopic_id)?;
        self.with_section(section_id, |section| {
            let subtopics = section
                .subtopics
                .iter()
                .map(|subtopic| {
                    if subtopic.id == subtopic_id {
                        Arc::new(Subtopic {
                            content: content.clone(),
                            ..subtopic.as_ref().clone()
                        })
                    } else {
                        Arc::clone(subtopic)
                    }
                })
                .collect();
            Section {
                subtopics,
                ..section.clone()
            }
        })
    }

    /// Whether the section at `index` is the same allocation in both outlines.
    pub fn shares_section(&self, other: &Outline, index: usize) -> bool {
        match (self.sections.get(index), other.sections.get(index)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The selected-only view used for numbering, preview and export.
    pub fn filtered(&self) -> FilteredOutline<'_> {
        let sections = self
            .sections
            .iter()
            .map(Arc::as_ref)
            .filter(|section| section.is_selected)
            .enumerate()
            .map(|(section_index, section)| {
                let number = section_index + 1;
                let subtopics = section
                    .selected_subtopics()
                    .enumerate()
                    .map(|(subtopic_index, subtopic)| NumberedSubtopic {
                        section_number: number,
                        number: subtopic_index + 1,
                        subtopic,
                    })
                    .collect();
                NumberedSection {
                    number,
                    section,
                    subtopics,
                }
            })
            .collect();

        FilteredOutline {
            main_topic: &self.main_topic,
            sections,
        }
    }
}

/// Outline reduced to its selected nodes, numbered by position.
#[derive(Debug, Clone)]
pub struct FilteredOutline<'a> {
    pub main_topic: &'a str,
    pub sections: Vec<NumberedSection<'a>>,
}

impl FilteredOutline<'_> {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct NumberedSection<'a> {
    /// 1-based position among selected sections.
    pub number: usize,
    pub section: &'a Section,
    pub subtopics: Vec<NumberedSubtopic<'a>>,
}

impl NumberedSection<'_> {
    /// `"<n>. <title>"`
    pub fn heading(&self) -> String {
        format!("{}. {}", self.number, self.section.title)
    }
}

#[derive(Debug, Clone)]
pub struct NumberedSubtopic<'a> {
    pub section_number: usize,
    /// 1-based position among the selected subtopics of its section.
    pub number: usize,
    pub subtopic: &'a Subtopic,
}

impl NumberedSubtopic<'_> {
    /// `"<n>.<m>"`
    pub fn composite_number(&self) -> String {
        format!("{}.{}", self.section_number, self.number)
    }

    /// `"<n>.<m>. <title>"`
    pub fn heading(&self) -> String {
        format!("{}. {}", self.composite_number(), self.subtopic.title)
    }
}
