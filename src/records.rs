//! CSV ingestion for replay datasets.
//!
//! Parsing is two-phase: the header line is resolved into a
//! [`HeaderMapping`] (fatal if either column is missing), then every
//! following non-blank line is read leniently. Rows missing a question or
//! an answer are dropped without error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ParseError;

const QUESTION_KEYS: &[&str] = &["question", "input"];
const ANSWER_KEYS: &[&str] = &["answer", "output", "response"];

pub const TEMPLATE_FILE_NAME: &str = "replay_template.csv";
pub const TEMPLATE_CSV: &str = "question,answer\n\
\"What is your name?\",\"My name is Jarvis AI\"\n\
\"How can you help me?\",\"I can assist you with various tasks and answer your questions\"";

/// One question/answer pair. Both fields are non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
}

impl QaRecord {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// How a line is cut into fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSplitting {
    /// Plain comma split; quotes stay part of the field.
    #[default]
    Naive,
    /// Double-quoted fields may hold commas; `""` is a literal quote.
    Quoted,
}

impl FieldSplitting {
    fn split(self, line: &str) -> Vec<String> {
        match self {
            FieldSplitting::Naive => line.split(',').map(|f| f.trim().to_string()).collect(),
            FieldSplitting::Quoted => split_quoted(line),
        }
    }
}

// Quotes only open a field when they are its first non-space character.
fn split_quoted(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted_field = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            ',' => {
                fields.push(finish_field(&field, quoted_field));
                field.clear();
                quoted_field = false;
            }
            '"' if !quoted_field && field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quoted_field = true;
            }
            _ => field.push(c),
        }
    }
    fields.push(finish_field(&field, quoted_field));
    fields
}

fn finish_field(raw: &str, quoted: bool) -> String {
    if quoted {
        // Keep the quoted content as-is, only drop padding after the closing quote.
        raw.trim_end().to_string()
    } else {
        raw.trim().to_string()
    }
}

/// Column positions of the question and answer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMapping {
    pub question_column: usize,
    pub answer_column: usize,
}

impl HeaderMapping {
    /// First header containing one of the keys (case-insensitive) wins.
    pub fn resolve(headers: &[String]) -> Result<Self, ParseError> {
        let find = |keys: &[&str]| {
            headers.iter().position(|h| {
                let lower = h.to_lowercase();
                keys.iter().any(|k| lower.contains(k))
            })
        };

        match (find(QUESTION_KEYS), find(ANSWER_KEYS)) {
            (Some(question_column), Some(answer_column)) => Ok(Self {
                question_column,
                answer_column,
            }),
            _ => Err(ParseError::MissingColumns {
                header: headers.to_vec(),
            }),
        }
    }

    fn extract(&self, fields: &[String]) -> Option<QaRecord> {
        let question = fields.get(self.question_column)?;
        let answer = fields.get(self.answer_column)?;
        if question.is_empty() || answer.is_empty() {
            return None;
        }
        Some(QaRecord::new(question.as_str(), answer.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser {
    splitting: FieldSplitting,
}

impl RecordParser {
    pub fn new(splitting: FieldSplitting) -> Self {
        Self { splitting }
    }

    pub fn parse(&self, raw: &str) -> Result<Vec<QaRecord>, ParseError> {
        let mut lines = raw.split('\n');
        let header_line = lines.next().unwrap_or_default();
        let headers = self.splitting.split(header_line.trim());
        let mapping = HeaderMapping::resolve(&headers)?;

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let fields = self.splitting.split(line.trim());
            match mapping.extract(&fields) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }

        debug!(
            records = records.len(),
            dropped,
            question_column = mapping.question_column,
            answer_column = mapping.answer_column,
            "Parsed replay CSV"
        );
        Ok(records)
    }
}

/// Parse with the default (naive comma) splitting.
pub fn parse(raw: &str) -> Result<Vec<QaRecord>, ParseError> {
    RecordParser::default().parse(raw)
}

/// First few records of a dataset plus how many were left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordPreview {
    pub total: usize,
    pub shown: Vec<QaRecord>,
    pub remaining: usize,
}

pub fn preview(records: &[QaRecord], limit: usize) -> RecordPreview {
    let shown: Vec<QaRecord> = records.iter().take(limit).cloned().collect();
    RecordPreview {
        total: records.len(),
        remaining: records.len() - shown.len(),
        shown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_keeps_quotes_literally() {
        let raw = "question,answer\n\"What is your name?\",\"My name is X\"\n\"How can you help?\",\"I can assist you\"";
        let records = parse(raw).unwrap();
        assert_eq!(
            records,
            vec![
                QaRecord::new("\"What is your name?\"", "\"My name is X\""),
                QaRecord::new("\"How can you help?\"", "\"I can assist you\""),
            ]
        );
    }

    #[test]
    fn test_parse_plain_rows() {
        let raw = "question,answer\nWhat is your name?,My name is X\nHow can you help?,I can assist you\n";
        let records = parse(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], QaRecord::new("What is your name?", "My name is X"));
        assert_eq!(records[1], QaRecord::new("How can you help?", "I can assist you"));
    }

    #[test]
    fn test_missing_columns() {
        let err = parse("foo,bar\n1,2\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingColumns {
                header: vec!["foo".to_string(), "bar".to_string()]
            }
        );
    }

    #[test]
    fn test_missing_only_answer_column_is_fatal() {
        assert!(matches!(
            parse("question,notes\nq,n\n"),
            Err(ParseError::MissingColumns { .. })
        ));
    }

    #[test]
    fn test_empty_input_is_missing_columns() {
        assert!(matches!(parse(""), Err(ParseError::MissingColumns { .. })));
    }

    #[test]
    fn test_header_synonyms_and_case() {
        let raw = "id, User Input ,Model RESPONSE\n1,hi,hello\n";
        let records = parse(raw).unwrap();
        assert_eq!(records, vec![QaRecord::new("hi", "hello")]);
    }

    #[test]
    fn test_first_matching_header_wins() {
        let mapping = HeaderMapping::resolve(&[
            "input".to_string(),
            "question".to_string(),
            "output".to_string(),
            "answer".to_string(),
        ])
        .unwrap();
        assert_eq!(mapping.question_column, 0);
        assert_eq!(mapping.answer_column, 2);
    }

    #[test]
    fn test_columns_in_reverse_order() {
        let raw = "answer,question\nfour,two plus two?\n";
        assert_eq!(parse(raw).unwrap(), vec![QaRecord::new("two plus two?", "four")]);
    }

    #[test]
    fn test_partial_and_blank_rows_are_dropped() {
        let raw = "question,answer\n\nonly question,\n,only answer\n   \nshort\ngood q , good a \r\n";
        let records = parse(raw).unwrap();
        assert_eq!(records, vec![QaRecord::new("good q", "good a")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let raw = "Question,Answer\r\nq1,a1\r\nq2,a2\r\n";
        let records = parse(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], QaRecord::new("q2", "a2"));
    }

    #[test]
    fn test_order_and_duplicates_preserved() {
        let raw = "question,answer\nb,2\na,1\nb,2\n";
        let questions: Vec<_> = parse(raw).unwrap().into_iter().map(|r| r.question).collect();
        assert_eq!(questions, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_naive_split_misaligns_embedded_commas() {
        let raw = "question,answer\n\"Hello, who are you?\",\"Jarvis\"\n";
        let records = parse(raw).unwrap();
        assert_eq!(records, vec![QaRecord::new("\"Hello", "who are you?\"")]);
    }

    #[test]
    fn test_quoted_split_keeps_embedded_commas() {
        let parser = RecordParser::new(FieldSplitting::Quoted);
        let raw = "\"question\",\"answer\"\n\"Hello, who are you?\", \"I am \"\"Jarvis\"\", an assistant\"\n";
        let records = parser.parse(raw).unwrap();
        assert_eq!(
            records,
            vec![QaRecord::new("Hello, who are you?", "I am \"Jarvis\", an assistant")]
        );
    }

    #[test]
    fn test_quoted_split_template() {
        let records = RecordParser::new(FieldSplitting::Quoted)
            .parse(TEMPLATE_CSV)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], QaRecord::new("What is your name?", "My name is Jarvis AI"));
    }

    #[test]
    fn test_quoted_split_empty_quoted_field_is_dropped() {
        let records = RecordParser::new(FieldSplitting::Quoted)
            .parse("question,answer\n\"\",\"a\"\nq,a\n")
            .unwrap();
        assert_eq!(records, vec![QaRecord::new("q", "a")]);
    }

    #[test]
    fn test_split_quoted_unquoted_fields_are_trimmed() {
        assert_eq!(split_quoted(" a , b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_quoted("a,,"), vec!["a", "", ""]);
    }

    #[test]
    fn test_preview() {
        let records: Vec<QaRecord> = (0..7)
            .map(|i| QaRecord::new(format!("q{i}"), format!("a{i}")))
            .collect();
        let p = preview(&records, 5);
        assert_eq!(p.total, 7);
        assert_eq!(p.shown.len(), 5);
        assert_eq!(p.remaining, 2);

        let small = preview(&records[..3], 5);
        assert_eq!(small.shown.len(), 3);
        assert_eq!(small.remaining, 0);
    }
}
