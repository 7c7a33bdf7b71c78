use crate::core::outline::Outline;

/// Plain-text (Markdown) rendering of the selected part of an outline, as
/// shown on the preview step.
pub fn render_markdown(outline: &Outline) -> String {
    let filtered = outline.filtered();
    let mut text = format!("# {}\n\n", filtered.main_topic);

    for section in &filtered.sections {
        text.push_str(&format!("## {}\n\n", section.heading()));
        for subtopic in &section.subtopics {
            text.push_str(&format!("### {}\n\n", subtopic.heading()));
            let paragraphs = subtopic.subtopic.paragraphs();
            if paragraphs.is_empty() {
                text.push_str("_Content will appear here after generation_\n\n");
            }
            for paragraph in paragraphs {
                text.push_str(paragraph);
                text.push_str("\n\n");
            }
        }
    }

    text
}
