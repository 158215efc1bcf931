use std::collections::HashSet;
use std::fmt;

use crate::errors::AppError;

const MIN_LINE_CHARS: usize = 3;
const MAX_LINE_CHARS: usize = 255;
pub const MAX_LINES: usize = 200;
const BULLETS: &[char] = &['-', '*', '•', '·', '–', '>'];

#[derive(Debug, PartialEq)]
pub enum ImportError {
    Empty,
    TooLarge { size: usize, limit: usize },
    UnsupportedType(String),
    NotUtf8,
    TooManyLines { count: usize, limit: usize },
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Empty => write!(f, "Document is empty"),
            ImportError::TooLarge { size, limit } => {
                write!(f, "Document is {} bytes, limit is {} bytes", size, limit)
            }
            ImportError::UnsupportedType(mime) => {
                write!(f, "Unsupported document type {}; upload plain text", mime)
            }
            ImportError::NotUtf8 => write!(f, "Document is not valid UTF-8 text"),
            ImportError::TooManyLines { count, limit } => {
                write!(f, "Document has {} task lines, limit is {}", count, limit)
            }
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Checks an uploaded document and returns its text. Binary formats that
/// `infer` recognises are refused; text-like types pass through.
pub fn read_document(bytes: &[u8], limit: usize) -> Result<String, ImportError> {
    if bytes.is_empty() {
        return Err(ImportError::Empty);
    }
    if bytes.len() > limit {
        return Err(ImportError::TooLarge { size: bytes.len(), limit });
    }
    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() != infer::MatcherType::Text {
            return Err(ImportError::UnsupportedType(kind.mime_type().to_string()));
        }
    }
    let text = std::str::from_utf8(bytes).map_err(|_| ImportError::NotUtf8)?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn strip_numbering(line: &str) -> &str {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return line;
    }
    let rest = &line[digits..];
    match rest.chars().next() {
        Some('.') | Some(')') => rest[1..].trim_start(),
        _ => line,
    }
}

fn clean_line(raw: &str) -> String {
    let line = raw.trim();
    let line = line.trim_start_matches(BULLETS).trim_start();
    let line = strip_numbering(line);
    line.chars().take(MAX_LINE_CHARS).collect::<String>().trim_end().to_string()
}

/// Turns a plain-text document into candidate task names: one per line,
/// with bullets and list numbering removed, short lines dropped and
/// duplicates collapsed in first-seen order.
pub fn extract_task_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(clean_line)
        .filter(|line| line.chars().count() >= MIN_LINE_CHARS)
        .filter(|line| seen.insert(line.to_lowercase()))
        .collect()
}

/// Extracts task lines and refuses documents with more than
/// [`MAX_LINES`] of them.
pub fn task_lines(text: &str) -> Result<Vec<String>, ImportError> {
    let lines = extract_task_lines(text);
    if lines.len() > MAX_LINES {
        return Err(ImportError::TooManyLines { count: lines.len(), limit: MAX_LINES });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullets_and_numbering_are_stripped() {
        let text = "- Prepare budget\n* Call vendor\n• Book venue\n1. Draft agenda\n2) Send invites\n";
        assert_eq!(
            extract_task_lines(text),
            vec!["Prepare budget", "Call vendor", "Book venue", "Draft agenda", "Send invites"]
        );
    }

    #[test]
    fn blank_short_and_duplicate_lines_are_dropped() {
        let text = "\r\n  \nok\nReview contract\nreview contract\n  Review contract  \n";
        assert_eq!(extract_task_lines(text), vec!["Review contract"]);
    }

    #[test]
    fn numbers_that_are_not_list_markers_survive() {
        assert_eq!(extract_task_lines("2024 roadmap review"), vec!["2024 roadmap review"]);
    }

    #[test]
    fn long_lines_are_truncated() {
        let long = "x".repeat(400);
        let lines = extract_task_lines(&long);
        assert_eq!(lines[0].chars().count(), 255);
    }

    #[test]
    fn line_count_is_capped() {
        let at_limit: String = (0..MAX_LINES).map(|i| format!("Task {}\n", i)).collect();
        assert_eq!(task_lines(&at_limit).unwrap().len(), MAX_LINES);

        let over: String = (0..=MAX_LINES).map(|i| format!("Task {}\n", i)).collect();
        assert_eq!(
            task_lines(&over),
            Err(ImportError::TooManyLines { count: MAX_LINES + 1, limit: MAX_LINES })
        );
    }

    #[test]
    fn plain_text_document_is_accepted() {
        let text = read_document("\u{feff}Task one\nTask two".as_bytes(), 1024).unwrap();
        assert_eq!(text, "Task one\nTask two");
    }

    #[test]
    fn binary_document_is_refused() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(
            read_document(&png, 1024),
            Err(ImportError::UnsupportedType("image/png".to_string()))
        );
    }

    #[test]
    fn oversize_empty_and_invalid_utf8_are_refused() {
        assert_eq!(read_document(b"", 10), Err(ImportError::Empty));
        assert_eq!(
            read_document(b"0123456789ab", 10),
            Err(ImportError::TooLarge { size: 12, limit: 10 })
        );
        assert_eq!(read_document(&[b'a', 0xff, 0xfe, b'b'], 10), Err(ImportError::NotUtf8));
    }
}
