use crate::core::outline::Outline;

const MM_PER_PT: f64 = 25.4 / 72.0;

/// Physical position of a placed line. Millimetres, `y` measured from the top edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionInfo {
    pub x: f64,
    pub y: f64,
    pub page_number: u32,
}

/// Page metrics for the PDF export, in millimetres and points.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub top_margin: f64,
    /// Lines starting below this cursor position go to the next page.
    pub max_cursor: f64,
    pub section_indent: f64,
    pub body_indent: f64,
    pub wrap_width: f64,
    pub title_size: f64,
    pub text_size: f64,
    pub heading_advance: f64,
    pub line_advance: f64,
    pub block_gap: f64,
    pub subtopic_gap: f64,
}

impl PageGeometry {
    /// Rightmost x any glyph may reach: the end of a full-width body line.
    pub fn right_edge(&self) -> f64 {
        self.body_indent + self.wrap_width
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        // A4 portrait
        Self {
            width: 210.0,
            height: 297.0,
            top_margin: 20.0,
            max_cursor: 280.0,
            section_indent: 20.0,
            body_indent: 25.0,
            wrap_width: 170.0,
            title_size: 18.0,
            text_size: 12.0,
            heading_advance: 10.0,
            line_advance: 7.0,
            block_gap: 3.0,
            subtopic_gap: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Title,
    SectionHeading,
    SubtopicHeading,
    /// One wrapped line of a content block. `subtopic` is the composite
    /// number (`"1.2"`), `block` the 0-based paragraph index within it.
    Body { subtopic: String, block: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub kind: LineKind,
    pub font_size: f64,
    pub bold: bool,
    pub position: PositionInfo,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub number: u32,
    pub lines: Vec<PlacedLine>,
}

/// Paginated layout of the selected part of an outline, ready to be drawn.
#[derive(Debug, Clone)]
pub struct PdfLayout {
    pub title: String,
    pub geometry: PageGeometry,
    pub pages: Vec<PageLayout>,
}

impl PdfLayout {
    pub fn build(outline: &Outline) -> Self {
        Self::build_with(outline, PageGeometry::default())
    }

    pub fn build_with(outline: &Outline, geometry: PageGeometry) -> Self {
        let filtered = outline.filtered();
        let mut cursor = Cursor::new(geometry);

        cursor.place_wrapped(
            filtered.main_topic,
            LineKind::Title,
            cursor.geometry.section_indent,
            cursor.geometry.title_size,
            false,
            cursor.geometry.heading_advance,
        );

        for section in &filtered.sections {
            cursor.advance(cursor.geometry.heading_advance);
            cursor.place_wrapped(
                &section.heading(),
                LineKind::SectionHeading,
                cursor.geometry.section_indent,
                cursor.geometry.text_size,
                true,
                cursor.geometry.heading_advance,
            );

            for subtopic in &section.subtopics {
                cursor.place_wrapped(
                    &subtopic.heading(),
                    LineKind::SubtopicHeading,
                    cursor.geometry.body_indent,
                    cursor.geometry.text_size,
                    true,
                    cursor.geometry.line_advance,
                );

                let number = subtopic.composite_number();
                for (block, paragraph) in subtopic.subtopic.paragraphs().into_iter().enumerate() {
                    if block > 0 {
                        cursor.advance(cursor.geometry.block_gap);
                    }
                    cursor.place_wrapped(
                        paragraph,
                        LineKind::Body {
                            subtopic: number.clone(),
                            block,
                        },
                        cursor.geometry.body_indent,
                        cursor.geometry.text_size,
                        false,
                        cursor.geometry.line_advance,
                    );
                }

                cursor.advance(cursor.geometry.subtopic_gap);
            }
        }

        PdfLayout {
            title: filtered.main_topic.to_string(),
            geometry: cursor.geometry,
            pages: cursor.pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = &PlacedLine> {
        self.pages.iter().flat_map(|page| page.lines.iter())
    }
}

struct Cursor {
    geometry: PageGeometry,
    y: f64,
    pages: Vec<PageLayout>,
}

impl Cursor {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            y: geometry.top_margin,
            geometry,
            pages: vec![PageLayout {
                number: 1,
                lines: Vec::new(),
            }],
        }
    }

    fn advance(&mut self, by: f64) {
        self.y += by;
    }

    /// Wraps `text` to the space left of [`PageGeometry::right_edge`] and places
    /// each line. Lines are `line_advance` apart; `after` follows the last one.
    fn place_wrapped(
        &mut self,
        text: &str,
        kind: LineKind,
        x: f64,
        font_size: f64,
        bold: bool,
        after: f64,
    ) {
        let mut lines = wrap_text(text, self.geometry.right_edge() - x, font_size);
        if lines.is_empty() {
            lines.push(String::new());
        }
        let last = lines.len() - 1;
        for (index, line) in lines.into_iter().enumerate() {
            self.place(line, kind.clone(), x, font_size, bold);
            let by = if index == last { after } else { self.geometry.line_advance };
            self.advance(by);
        }
    }

    /// Starts a new page first when the line would fall below the printable area.
    fn place(&mut self, text: String, kind: LineKind, x: f64, font_size: f64, bold: bool) {
        if self.y > self.geometry.max_cursor {
            let number = self.pages.len() as u32 + 1;
            self.pages.push(PageLayout {
                number,
                lines: Vec::new(),
            });
            self.y = self.geometry.top_margin;
        }

        let page_number = self.pages.len() as u32;
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(PlacedLine {
                text,
                kind,
                font_size,
                bold,
                position: PositionInfo { x, y, page_number },
            });
        }
    }
}

/// Greedy word wrap against an estimated Helvetica advance width.
/// Words wider than the line are broken between characters.
pub fn wrap_text(text: &str, max_width_mm: f64, font_size_pt: f64) -> Vec<String> {
    let space = text_width_mm(" ", font_size_pt);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        let mut word_width = text_width_mm(&word, font_size_pt);

        while word_width > max_width_mm {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            let (head, tail) = split_to_width(&word, max_width_mm, font_size_pt);
            lines.push(head);
            word = tail;
            word_width = text_width_mm(&word, font_size_pt);
        }
        if word.is_empty() {
            continue;
        }

        if current.is_empty() {
            current = word;
            current_width = word_width;
        } else if current_width + space + word_width <= max_width_mm {
            current.push(' ');
            current.push_str(&word);
            current_width += space + word_width;
        } else {
            lines.push(std::mem::replace(&mut current, word));
            current_width = word_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub fn text_width_mm(text: &str, font_size_pt: f64) -> f64 {
    let em: f64 = text.chars().map(glyph_advance).sum();
    em * font_size_pt * MM_PER_PT
}

fn split_to_width(word: &str, max_width_mm: f64, font_size_pt: f64) -> (String, String) {
    let mut width = 0.0;
    let mut split_at = word.len();
    for (index, c) in word.char_indices() {
        let advance = glyph_advance(c) * font_size_pt * MM_PER_PT;
        if width + advance > max_width_mm && index > 0 {
            split_at = index;
            break;
        }
        width += advance;
    }
    if split_at == word.len() {
        // a single glyph wider than the line
        let first = word.chars().next().map(char::len_utf8).unwrap_or(word.len());
        split_at = first;
    }
    (word[..split_at].to_string(), word[split_at..].to_string())
}

/// Approximate Helvetica advance widths, in em.
fn glyph_advance(c: char) -> f64 {
    match c {
        ' ' | '.' | ',' | ':' | ';' | '!' | '/' | '\\' | 'I' | 'f' | 't' => 0.278,
        'i' | 'j' | 'l' | '|' => 0.222,
        '\'' => 0.191,
        '"' => 0.355,
        '-' | '(' | ')' | 'r' | '[' | ']' => 0.333,
        'm' | 'M' => 0.833,
        'W' => 0.944,
        'w' => 0.722,
        'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' | 'J' => 0.5,
        '0'..='9' | 'a' | 'b' | 'd' | 'e' | 'g' | 'h' | 'n' | 'o' | 'p' | 'q' | 'u' => 0.556,
        'A'..='Z' => 0.667,
        _ => 0.556,
    }
}
