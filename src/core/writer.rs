use crate::core::layout::{PageGeometry, PdfLayout};
use crate::core::outline::Outline;
use crate::{OutputFormat, Topic};
use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use docx_rs::{
    AlignmentType, Docx, Paragraph, Run, Style, StyleType, Tab, TabLeaderType,
    TabValueType,
};
use log::{debug, error, info};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::fs;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// Right tab stop for table-of-contents page numbers, in twips.
const TOC_TAB_POSITION: usize = 9000;
const TOC_INDENT: i32 = 720;
const SEPARATOR: &str = "________________________________________";

/// Writer turns the selected part of an outline into a serialized document.
pub trait Writer {
    fn format(&self) -> OutputFormat;

    fn render(&self, outline: &Outline, title_page: &TitlePage) -> Result<Vec<u8>>;
}

/// Title block of the DOCX export: three descriptive lines and a date.
#[derive(Debug, Clone, PartialEq)]
pub struct TitlePage {
    pub lines: Vec<String>,
    pub date: NaiveDate,
}

impl TitlePage {
    pub fn new(lines: Vec<String>, date: NaiveDate) -> Self {
        Self { lines, date }
    }

    pub fn for_topic(topic: &Topic) -> Self {
        Self::for_topic_on(topic, Local::now().date_naive())
    }

    pub fn for_topic_on(topic: &Topic, date: NaiveDate) -> Self {
        let mut level = format!("{} Level", topic.academic_level_or_default());
        if let Some(citation) = topic.citation_format.as_deref().filter(|c| !c.trim().is_empty()) {
            level.push_str(&format!(" · {} Citation Style", citation.trim()));
        }
        Self {
            lines: vec![
                "Research Document".to_string(),
                level,
                "Generated with Research Document Generator".to_string(),
            ],
            date,
        }
    }

    pub fn formatted_date(&self) -> String {
        self.date.format("%B %-d, %Y").to_string()
    }
}

impl Default for TitlePage {
    fn default() -> Self {
        Self::for_topic(&Topic::new(""))
    }
}

/// A rendered document ready to be saved.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Outcome of an export, the only thing the exporter reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportNotice {
    Saved { format: OutputFormat, path: PathBuf },
    Failed { format: OutputFormat, message: String },
}

impl ExportNotice {
    pub fn is_saved(&self) -> bool {
        matches!(self, ExportNotice::Saved { .. })
    }

    pub fn message(&self) -> String {
        match self {
            ExportNotice::Saved { format, path } => format!(
                "Your document has been downloaded as a {} file: {}",
                format,
                path.display()
            ),
            ExportNotice::Failed { message, .. } => format!(
                "There was an error exporting your document. Please try again. ({})",
                message
            ),
        }
    }
}

/// `"<main topic with whitespace runs as _>.<ext>"`.
pub fn export_file_name(main_topic: &str, format: OutputFormat) -> String {
    format!("{}.{}", export_file_stem(main_topic), format.extension())
}

/// Main topic with whitespace runs as `_`. Path separators are replaced too
/// so the file always lands inside the output directory.
pub fn export_file_stem(main_topic: &str) -> String {
    let mut stem = String::with_capacity(main_topic.len());
    let mut in_whitespace = false;
    for c in main_topic.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                stem.push('_');
            }
            in_whitespace = true;
        } else {
            stem.push(if c == '/' || c == '\\' { '_' } else { c });
            in_whitespace = false;
        }
    }
    if stem.is_empty() {
        stem.push_str("document");
    }
    stem
}

pub fn writer_for(format: OutputFormat) -> Box<dyn Writer + Send + Sync> {
    match format {
        OutputFormat::Pdf => Box::new(PdfWriter::default()),
        OutputFormat::Docx => Box::new(DocxWriter),
    }
}

pub fn render_export(
    outline: &Outline,
    format: OutputFormat,
    title_page: &TitlePage,
) -> Result<ExportFile> {
    let bytes = writer_for(format).render(outline, title_page)?;
    Ok(ExportFile {
        file_name: export_file_name(&outline.main_topic, format),
        mime_type: format.mime_type(),
        bytes,
    })
}

pub fn save_export<P: AsRef<Path>>(file: &ExportFile, out_dir: P) -> Result<PathBuf> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)
        .map_err(|e| anyhow!("Failed to create output directory {}: {}", out_dir.display(), e))?;
    let path = out_dir.join(&file.file_name);
    fs::write(&path, &file.bytes)
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
    debug!(
        "Wrote {} bytes ({}) to {}",
        file.bytes.len(),
        file.mime_type,
        path.display()
    );
    Ok(path)
}

/// Renders and saves one format. Failures, panics included, come back as
/// [`ExportNotice::Failed`]; the outline is never touched.
pub fn export_document<P: AsRef<Path>>(
    outline: &Outline,
    format: OutputFormat,
    title_page: &TitlePage,
    out_dir: P,
) -> ExportNotice {
    let out_dir = out_dir.as_ref();
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        render_export(outline, format, title_page).and_then(|file| save_export(&file, out_dir))
    }));
    notice_from(format, attempt.unwrap_or_else(|_| Err(anyhow!("renderer panicked"))))
}

/// Async variant of [`export_document`]. Rendering and the file write run on
/// the blocking pool for both formats.
pub async fn export_document_async(
    outline: Outline,
    format: OutputFormat,
    title_page: TitlePage,
    out_dir: PathBuf,
) -> ExportNotice {
    let joined = tokio::task::spawn_blocking(move || {
        export_document(&outline, format, &title_page, &out_dir)
    })
    .await;
    joined.unwrap_or_else(|e| notice_from(format, Err(anyhow!("export task failed: {}", e))))
}

fn notice_from(format: OutputFormat, result: Result<PathBuf>) -> ExportNotice {
    match result {
        Ok(path) => {
            info!("Exported {} document to {}", format, path.display());
            ExportNotice::Saved { format, path }
        }
        Err(e) => {
            error!("Error exporting {} document: {:#}", format, e);
            ExportNotice::Failed {
                format,
                message: format!("{:#}", e),
            }
        }
    }
}

/// PDF writer drawing a [`PdfLayout`] with the built-in Helvetica faces.
#[derive(Debug, Clone, Default)]
pub struct PdfWriter {
    pub geometry: PageGeometry,
}

impl Writer for PdfWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Pdf
    }

    fn render(&self, outline: &Outline, _title_page: &TitlePage) -> Result<Vec<u8>> {
        let layout = PdfLayout::build_with(outline, self.geometry.clone());
        let geometry = &layout.geometry;
        let page_width = Mm(geometry.width as f32);
        let page_height = Mm(geometry.height as f32);

        let (doc, first_page, first_layer) =
            PdfDocument::new(layout.title.as_str(), page_width, page_height, "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("Failed to load Helvetica: {:?}", e))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("Failed to load Helvetica-Bold: {:?}", e))?;

        for (index, page) in layout.pages.iter().enumerate() {
            let (page_index, layer_index) = if index == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(page_width, page_height, format!("Page {} Layer 1", page.number))
            };
            let layer = doc.get_page(page_index).get_layer(layer_index);

            for line in &page.lines {
                let font = if line.bold { &bold } else { &regular };
                layer.use_text(
                    line.text.clone(),
                    line.font_size as f32,
                    Mm(line.position.x as f32),
                    Mm((geometry.height - line.position.y) as f32),
                    font,
                );
            }
        }

        debug!(
            "Laid out PDF for '{}' on {} page(s)",
            layout.title,
            layout.page_count()
        );
        doc.save_to_bytes()
            .map_err(|e| anyhow!("Failed to serialize PDF: {:?}", e))
    }
}

/// DOCX writer: title page, table of contents, then one page per section.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxWriter;

impl Writer for DocxWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Docx
    }

    fn render(&self, outline: &Outline, title_page: &TitlePage) -> Result<Vec<u8>> {
        let docx = self.build_document(outline, title_page);
        let mut buffer = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut buffer)
            .map_err(|e| anyhow!("Failed to serialize DOCX: {}", e))?;
        Ok(buffer.into_inner())
    }
}

impl DocxWriter {
    pub fn build_document(&self, outline: &Outline, title_page: &TitlePage) -> Docx {
        let filtered = outline.filtered();
        let mut docx = Docx::new()
            .add_style(Style::new("Title", StyleType::Paragraph).name("Title").size(48).bold())
            .add_style(Style::new("Heading1", StyleType::Paragraph).name("heading 1").size(32).bold())
            .add_style(Style::new("Heading2", StyleType::Paragraph).name("heading 2").size(26).bold());

        // Title page
        docx = docx.add_paragraph(
            Paragraph::new()
                .style("Title")
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text(filtered.main_topic)),
        );
        for line in &title_page.lines {
            docx = docx.add_paragraph(centered(line));
        }
        docx = docx
            .add_paragraph(centered(&title_page.formatted_date()))
            .add_paragraph(centered(SEPARATOR));

        // Table of contents
        if !filtered.is_empty() {
            docx = docx.add_paragraph(
                Paragraph::new().add_run(Run::new().add_text("Table of Contents").bold().size(28)),
            );
            for section in &filtered.sections {
                // Placeholder page number: the section's own position.
                let page = section.number.to_string();
                docx = docx.add_paragraph(toc_entry(&section.heading(), &page));
                for subtopic in &section.subtopics {
                    docx = docx.add_paragraph(
                        toc_entry(&subtopic.heading(), &page).indent(Some(TOC_INDENT), None, None, None),
                    );
                }
            }
        }

        // Body
        for section in &filtered.sections {
            let mut heading = Paragraph::new().style("Heading1");
            if section.number > 1 {
                heading = heading.page_break_before(true);
            }
            docx = docx.add_paragraph(heading.add_run(Run::new().add_text(section.heading())));

            for subtopic in &section.subtopics {
                docx = docx.add_paragraph(
                    Paragraph::new()
                        .style("Heading2")
                        .add_run(Run::new().add_text(subtopic.heading())),
                );
                for paragraph in subtopic.subtopic.paragraphs() {
                    docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(paragraph)));
                }
            }
        }

        docx
    }
}

fn centered(text: &str) -> Paragraph {
    Paragraph::new()
        .align(AlignmentType::Center)
        .add_run(Run::new().add_text(text))
}

fn toc_entry(label: &str, page: &str) -> Paragraph {
    Paragraph::new()
        .add_tab(
            Tab::new()
                .val(TabValueType::Right)
                .leader(TabLeaderType::Dot)
                .pos(TOC_TAB_POSITION),
        )
        .add_run(Run::new().add_text(label).add_tab().add_text(page))
}
