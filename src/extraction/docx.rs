use super::ExtractionError;
use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, Run, RunChild, StructuredDataTag,
    StructuredDataTagChild, Table, TableCellContent, TableChild, TableRowChild,
};

/// Extract raw text from a DOCX archive, one line per paragraph.
///
/// Paragraphs inside tables, hyperlinks and content controls are included; styling is not.
pub(super) async fn extract_text(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || read_paragraphs(&bytes))
        .await
        .map_err(|error| ExtractionError::Docx(format!("reader aborted: {error}")))?
}

fn read_paragraphs(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(|error| ExtractionError::Docx(error.to_string()))?;

    let mut text = String::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(paragraph) => write_paragraph(paragraph, &mut text),
            DocumentChild::Table(table) => write_table(table, &mut text),
            DocumentChild::StructuredDataTag(tag) => write_tag(tag, &mut text),
            _ => {}
        }
    }
    Ok(text)
}

fn write_paragraph(paragraph: &Paragraph, out: &mut String) {
    write_inline(&paragraph.children, out);
    out.push('\n');
}

fn write_inline(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => write_run(run, out),
            ParagraphChild::Hyperlink(link) => write_inline(&link.children, out),
            ParagraphChild::StructuredDataTag(tag) => write_tag(tag, out),
            _ => {}
        }
    }
}

fn write_run(run: &Run, out: &mut String) {
    for child in &run.children {
        match child {
            RunChild::Text(t) => out.push_str(&t.text),
            RunChild::Tab(_) => out.push('\t'),
            RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

fn write_table(table: &Table, out: &mut String) {
    for row in &table.rows {
        let TableChild::TableRow(row) = row;
        for cell in &row.cells {
            let TableRowChild::TableCell(cell) = cell;
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(paragraph) => write_paragraph(paragraph, out),
                    TableCellContent::Table(nested) => write_table(nested, out),
                    _ => {}
                }
            }
        }
    }
}

fn write_tag(tag: &StructuredDataTag, out: &mut String) {
    for child in &tag.children {
        match child {
            StructuredDataTagChild::Paragraph(paragraph) => write_paragraph(paragraph, out),
            StructuredDataTagChild::Run(run) => write_run(run, out),
            StructuredDataTagChild::Table(table) => write_table(table, out),
            StructuredDataTagChild::StructuredDataTag(nested) => write_tag(nested, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Hyperlink, HyperlinkType, TableCell, TableRow};

    fn build_docx() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Quarterly report").bold()))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Revenue grew "))
                    .add_run(Run::new().add_text("twelve percent.").italic()),
            )
            .build()
            .pack(&mut buffer)
            .expect("pack docx");
        buffer.into_inner()
    }

    #[tokio::test]
    async fn extracts_paragraph_text_without_styling() {
        let text = extract_text(build_docx()).await.expect("docx text");
        assert_eq!(text, "Quarterly report\nRevenue grew twelve percent.\n");
    }

    #[tokio::test]
    async fn includes_table_cells_and_hyperlink_text() {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let cell = |text: &str| {
            TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
        };
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Regional results")))
            .add_table(Table::new(vec![
                TableRow::new(vec![cell("Region"), cell("Revenue")]),
                TableRow::new(vec![cell("North"), cell("4.2M")]),
            ]))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("See "))
                    .add_hyperlink(
                        Hyperlink::new("appendix", HyperlinkType::Anchor)
                            .add_run(Run::new().add_text("the appendix")),
                    ),
            )
            .build()
            .pack(&mut buffer)
            .expect("pack docx");

        let text = extract_text(buffer.into_inner()).await.expect("docx text");

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"Regional results"));
        for cell in ["Region", "Revenue", "North", "4.2M"] {
            assert!(lines.contains(&cell), "missing table cell {cell:?} in {text:?}");
        }
        assert!(text.contains("See the appendix"), "hyperlink text dropped: {text:?}");
    }

    #[tokio::test]
    async fn rejects_non_zip_payload() {
        let error = extract_text(b"plain bytes".to_vec())
            .await
            .expect_err("invalid docx");
        assert!(matches!(error, ExtractionError::Docx(_)));
    }
}
