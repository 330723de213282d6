use jarvis::records::{self, preview, FieldSplitting, RecordParser, TEMPLATE_CSV};
use jarvis::{parse, ParseError, QaRecord};

#[test]
fn test_quoted_example_is_split_naively() {
    let raw = "question,answer\n\"What is your name?\",\"My name is X\"\n\"How can you help?\",\"I can assist you\"";

    let records = parse(raw).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].question, "\"What is your name?\"");
    assert_eq!(records[0].answer, "\"My name is X\"");
    assert_eq!(records[1].question, "\"How can you help?\"");
    assert_eq!(records[1].answer, "\"I can assist you\"");
}

#[test]
fn test_unmatched_header_fails_without_records() {
    let result = parse("foo,bar\nq,a\nq2,a2\n");
    assert!(matches!(result, Err(ParseError::MissingColumns { .. })));
}

#[test]
fn test_record_count_matches_usable_rows() {
    let raw = "\
Input,Expected Output,notes
hello,hi there,greeting

what is 2+2,4,
,orphan answer,bad
orphan question,,bad
   \t
last,row,
";
    let records = parse(raw).unwrap();
    assert_eq!(
        records,
        vec![
            QaRecord::new("hello", "hi there"),
            QaRecord::new("what is 2+2", "4"),
            QaRecord::new("last", "row"),
        ]
    );
}

#[test]
fn test_header_only_yields_no_records() {
    assert!(parse("question,answer\n").unwrap().is_empty());
    assert!(parse("question,answer").unwrap().is_empty());
}

#[test]
fn test_missing_columns_message_is_actionable() {
    let err = parse("prompt,completion\n").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("CSV must have columns for questions and answers"));
    assert!(message.contains("prompt"));
}

#[test]
fn test_template_round_trips_through_quoted_parser() {
    let records = RecordParser::new(FieldSplitting::Quoted).parse(TEMPLATE_CSV).unwrap();
    assert_eq!(
        records,
        vec![
            QaRecord::new("What is your name?", "My name is Jarvis AI"),
            QaRecord::new(
                "How can you help me?",
                "I can assist you with various tasks and answer your questions"
            ),
        ]
    );
}

#[test]
fn test_preview_of_parsed_dataset() {
    let mut raw = String::from("question,answer\n");
    for i in 0..12 {
        raw.push_str(&format!("q{i},a{i}\n"));
    }
    let records = parse(&raw).unwrap();
    let p = preview(&records, 5);

    assert_eq!(p.total, 12);
    assert_eq!(p.remaining, 7);
    assert_eq!(p.shown.first(), Some(&QaRecord::new("q0", "a0")));
    assert_eq!(p.shown.last(), Some(&QaRecord::new("q4", "a4")));
}

#[test]
fn test_template_file_name() {
    assert!(records::TEMPLATE_FILE_NAME.ends_with(".csv"));
    assert!(TEMPLATE_CSV.starts_with("question,answer\n"));
}
