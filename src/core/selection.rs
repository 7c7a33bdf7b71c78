//! Selection editor: pure toggles over an [`Outline`].
//!
//! Turning a section off forces all of its subtopics off. Turning a section
//! on keeps the children as they were, unless none of them is selected, in
//! which case all of them are selected so the section never ends up selected
//! with an empty selection underneath it. Toggling a subtopic recomputes the
//! parent as "any child selected".

use crate::core::outline::{Outline, Section, Subtopic};
use log::debug;
use std::sync::Arc;

/// Flips a section's selection. Unknown ids return an unchanged copy.
pub fn toggle_section(outline: &Outline, section_id: &str) -> Outline {
    let updated = outline.with_section(section_id, |section| {
        let is_selected = !section.is_selected;
        let subtopics: Vec<Arc<Subtopic>> = if !is_selected {
            section
                .subtopics
                .iter()
                .map(|subtopic| set_selected(subtopic, false))
                .collect()
        } else if section.any_subtopic_selected() {
            section.subtopics.clone()
        } else {
            section
                .subtopics
                .iter()
                .map(|subtopic| set_selected(subtopic, true))
                .collect()
        };
        Section {
            is_selected,
            subtopics,
            ..section.clone()
        }
    });

    updated.unwrap_or_else(|| {
        debug!("toggle_section: no section with id {}", section_id);
        outline.clone()
    })
}

/// Flips a subtopic's selection and re-derives its section's flag.
/// Selecting a subtopic under an unselected section is not allowed and
/// leaves the outline unchanged.
pub fn toggle_subtopic(outline: &Outline, section_id: &str, subtopic_id: &str) -> Outline {
    let Some(section) = outline.section(section_id) else {
        debug!("toggle_subtopic: no section with id {}", section_id);
        return outline.clone();
    };
    let Some(target) = section.subtopic(subtopic_id) else {
        debug!(
            "toggle_subtopic: no subtopic {} in section {}",
            subtopic_id, section_id
        );
        return outline.clone();
    };
    if !section.is_selected && !target.is_selected {
        debug!(
            "toggle_subtopic: section {} is unselected, ignoring {}",
            section_id, subtopic_id
        );
        return outline.clone();
    }

    outline
        .with_section(section_id, |section| {
            let subtopics: Vec<Arc<Subtopic>> = section
                .subtopics
                .iter()
                .map(|subtopic| {
                    if subtopic.id == subtopic_id {
                        set_selected(subtopic, !subtopic.is_selected)
                    } else {
                        Arc::clone(subtopic)
                    }
                })
                .collect();
            let is_selected = subtopics.iter().any(|subtopic| subtopic.is_selected);
            Section {
                is_selected,
                subtopics,
                ..section.clone()
            }
        })
        .unwrap_or_else(|| outline.clone())
}

/// Deselects every section whose title matches, ignoring case.
pub fn exclude_sections_by_title<S: AsRef<str>>(outline: &Outline, titles: &[S]) -> Outline {
    let ids: Vec<String> = outline
        .sections
        .iter()
        .filter(|section| section.is_selected)
        .filter(|section| {
            titles
                .iter()
                .any(|title| title.as_ref().trim().eq_ignore_ascii_case(section.title.trim()))
        })
        .map(|section| section.id.clone())
        .collect();

    ids.iter()
        .fold(outline.clone(), |current, id| toggle_section(&current, id))
}

fn set_selected(subtopic: &Arc<Subtopic>, is_selected: bool) -> Arc<Subtopic> {
    if subtopic.is_selected == is_selected {
        Arc::clone(subtopic)
    } else {
        Arc::new(Subtopic {
            is_selected,
            ..subtopic.as_ref().clone()
        })
    }
}
