use chrono::NaiveDate;
use docgen_rs::core::layout::PdfLayout;
use docgen_rs::core::outline::{Outline, Section, Subtopic};
use docgen_rs::core::selection::{toggle_section, toggle_subtopic};
use docgen_rs::core::writer::{export_document, export_document_async, render_export, ExportNotice, TitlePage};
use docgen_rs::{OutputFormat, Topic};
use roxmltree::Document;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

#[derive(Debug)]
struct DocxParagraph {
    style: Option<String>,
    text: String,
    /// `w:pageBreakBefore` in the paragraph properties.
    page_break: bool,
    /// A `w:br w:type="page"` run inside the paragraph.
    inline_break: bool,
}

/// Reads `word/document.xml` back out of a packed DOCX.
fn docx_paragraphs(bytes: &[u8]) -> Vec<DocxParagraph> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("docx is a zip package");
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .expect("document.xml present")
        .read_to_string(&mut xml)
        .expect("document.xml is utf-8");
    let doc = Document::parse(&xml).expect("document.xml parses");

    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "p")
        .map(|p| {
            let style = p
                .descendants()
                .find(|n| n.is_element() && n.tag_name().name() == "pStyle")
                .and_then(|n| n.attribute((W, "val")))
                .map(str::to_string);
            let mut text = String::new();
            for node in p.descendants().filter(|n| n.is_element()) {
                match node.tag_name().name() {
                    "t" => text.push_str(node.text().unwrap_or_default()),
                    "tab" if node.parent().map(|r| r.tag_name().name() == "r").unwrap_or(false) => {
                        text.push('\t')
                    }
                    _ => {}
                }
            }
            let page_break = p.descendants().any(|n| {
                n.is_element()
                    && n.tag_name().name() == "pageBreakBefore"
                    && !matches!(n.attribute((W, "val")), Some("false") | Some("0"))
            });
            let inline_break = p.descendants().any(|n| {
                n.is_element() && n.tag_name().name() == "br" && n.attribute((W, "type")) == Some("page")
            });
            DocxParagraph {
                style,
                text,
                page_break,
                inline_break,
            }
        })
        .collect()
}

fn climate_outline() -> Outline {
    Outline::new(
        "Climate Change Effects",
        vec![
            Section::new(
                "s1",
                "Oceans",
                vec![
                    Subtopic::new("s1-1", "Sea level").with_content("Water rises.\n\nCoasts retreat."),
                    Subtopic::new("s1-2", "Acidity").with_content("pH falls."),
                ],
            ),
            Section::new(
                "s2",
                "Land",
                vec![Subtopic::new("s2-1", "Drought").with_content("Soils dry out.")],
            ),
            Section::new(
                "s3",
                "Policy",
                vec![Subtopic::new("s3-1", "Treaties").with_content("Nations agree.")],
            ),
        ],
    )
}

fn title_page() -> TitlePage {
    TitlePage::for_topic_on(
        &Topic::new("Climate Change Effects"),
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
    )
}

#[test]
fn docx_file_name_and_mime_type() {
    let file = render_export(&climate_outline(), OutputFormat::Docx, &title_page()).unwrap();
    assert_eq!(file.file_name, "Climate_Change_Effects.docx");
    assert_eq!(
        file.mime_type,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
}

#[test]
fn docx_title_page_toc_and_body() {
    let file = render_export(&climate_outline(), OutputFormat::Docx, &title_page()).unwrap();
    let paragraphs = docx_paragraphs(&file.bytes);

    assert_eq!(paragraphs[0].style.as_deref(), Some("Title"));
    assert_eq!(paragraphs[0].text, "Climate Change Effects");
    assert_eq!(paragraphs[1].text, "Research Document");
    assert!(paragraphs.iter().any(|p| p.text == "May 1, 2024"));

    let toc: Vec<&str> = paragraphs
        .iter()
        .filter(|p| p.text.contains('\t'))
        .map(|p| p.text.as_str())
        .collect();
    assert_eq!(
        toc,
        [
            "1. Oceans\t1",
            "1.1. Sea level\t1",
            "1.2. Acidity\t1",
            "2. Land\t2",
            "2.1. Drought\t2",
            "3. Policy\t3",
            "3.1. Treaties\t3",
        ]
    );

    let headings: Vec<(&str, bool)> = paragraphs
        .iter()
        .filter(|p| p.style.as_deref() == Some("Heading1"))
        .map(|p| (p.text.as_str(), p.page_break))
        .collect();
    assert_eq!(
        headings,
        [("1. Oceans", false), ("2. Land", true), ("3. Policy", true)]
    );
    // the break belongs to the heading itself, not to an empty line before it
    assert!(paragraphs.iter().all(|p| !p.inline_break));

    let sub_headings: Vec<&str> = paragraphs
        .iter()
        .filter(|p| p.style.as_deref() == Some("Heading2"))
        .map(|p| p.text.as_str())
        .collect();
    assert_eq!(
        sub_headings,
        ["1.1. Sea level", "1.2. Acidity", "2.1. Drought", "3.1. Treaties"]
    );

    // one body paragraph per blank-line block
    let sea_level = paragraphs
        .iter()
        .position(|p| p.text == "1.1. Sea level" && p.style.as_deref() == Some("Heading2"))
        .unwrap();
    assert_eq!(paragraphs[sea_level + 1].text, "Water rises.");
    assert_eq!(paragraphs[sea_level + 2].text, "Coasts retreat.");
    assert_eq!(paragraphs[sea_level + 3].text, "1.2. Acidity");
}

#[test]
fn docx_renumbers_after_deselection() {
    let outline = toggle_section(&climate_outline(), "s1");
    let outline = toggle_subtopic(&outline, "s3", "s3-1");
    let file = render_export(&outline, OutputFormat::Docx, &title_page()).unwrap();
    let paragraphs = docx_paragraphs(&file.bytes);

    let headings: Vec<(&str, bool)> = paragraphs
        .iter()
        .filter(|p| p.style.as_deref() == Some("Heading1"))
        .map(|p| (p.text.as_str(), p.page_break))
        .collect();
    assert_eq!(headings, [("1. Land", false)]);
    assert!(!paragraphs.iter().any(|p| p.text.contains("Oceans")));
    assert!(!paragraphs.iter().any(|p| p.text.contains("Treaties")));
}

#[test]
fn docx_with_nothing_selected_is_title_page_only() {
    let outline = ["s1", "s2", "s3"]
        .iter()
        .fold(climate_outline(), |outline, id| toggle_section(&outline, id));
    let file = render_export(&outline, OutputFormat::Docx, &title_page()).unwrap();
    let paragraphs = docx_paragraphs(&file.bytes);

    assert_eq!(paragraphs[0].text, "Climate Change Effects");
    assert!(paragraphs.iter().all(|p| p.style.as_deref() != Some("Heading1")));
    assert!(!paragraphs.iter().any(|p| p.text == "Table of Contents"));
}

#[test]
fn pdf_page_count_matches_layout() {
    let long = "Glacial melt feeds rivers that in turn shape the coastline over many decades. ".repeat(80);
    let outline = climate_outline()
        .with_subtopic_content("s2", "s2-1", long)
        .unwrap();
    let file = render_export(&outline, OutputFormat::Pdf, &title_page()).unwrap();
    assert_eq!(file.file_name, "Climate_Change_Effects.pdf");

    let pdf = lopdf::Document::load_mem(&file.bytes).unwrap();
    let layout = PdfLayout::build(&outline);
    assert!(layout.page_count() > 1);
    assert_eq!(pdf.get_pages().len(), layout.page_count());
}

#[test]
fn pdf_with_nothing_selected_has_one_page() {
    let outline = ["s1", "s2", "s3"]
        .iter()
        .fold(climate_outline(), |outline, id| toggle_section(&outline, id));
    let file = render_export(&outline, OutputFormat::Pdf, &title_page()).unwrap();
    let pdf = lopdf::Document::load_mem(&file.bytes).unwrap();
    assert_eq!(pdf.get_pages().len(), 1);
}

#[test]
fn export_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();

    let outline = climate_outline();
    let notice = export_document(&outline, OutputFormat::Pdf, &title_page(), &blocker);
    assert!(matches!(notice, ExportNotice::Failed { format: OutputFormat::Pdf, .. }));
    assert!(notice.message().starts_with("There was an error exporting your document"));
    assert_eq!(outline, climate_outline());
}

#[tokio::test]
async fn async_docx_export_lands_in_out_dir() {
    let dir = tempfile::tempdir().unwrap();
    let notice = export_document_async(
        climate_outline(),
        OutputFormat::Docx,
        title_page(),
        dir.path().to_path_buf(),
    )
    .await;

    let expected = dir.path().join("Climate_Change_Effects.docx");
    assert_eq!(
        notice,
        ExportNotice::Saved {
            format: OutputFormat::Docx,
            path: expected.clone()
        }
    );
    let bytes = std::fs::read(expected).unwrap();
    assert!(!docx_paragraphs(&bytes).is_empty());
}
