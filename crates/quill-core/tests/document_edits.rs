use quill_core::{Document, DocumentChange, LineChange, LineTracker, TextDocument};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Mirrors the document's line table purely from change notifications.
struct LineLengths {
    lengths: Vec<usize>,
}

impl LineLengths {
    fn from_document(doc: &TextDocument) -> Self {
        let lengths = (1..=doc.line_count())
            .map(|n| doc.line_by_number(n).expect("line in range").total_length())
            .collect();
        Self { lengths }
    }

    fn apply(&mut self, change: &DocumentChange) {
        for line_change in &change.line_changes {
            match *line_change {
                LineChange::BeforeRemove { line_number } => {
                    self.lengths.remove(line_number - 1);
                }
                LineChange::SetLength {
                    line_number,
                    new_total_length,
                } => self.lengths[line_number - 1] = new_total_length,
                LineChange::Inserted {
                    insertion_pos,
                    new_line,
                    new_total_length,
                } => {
                    assert_eq!(insertion_pos + 1, new_line);
                    self.lengths.insert(new_line - 1, new_total_length);
                }
                LineChange::Rebuilt { .. } => unreachable!("replace never rebuilds"),
            }
        }
    }
}

#[derive(Default)]
struct CallLog {
    calls: Vec<String>,
}

impl LineTracker for CallLog {
    type Error = std::convert::Infallible;

    fn before_remove_line(&mut self, line_number: usize) -> Result<(), Self::Error> {
        self.calls.push(format!("remove {line_number}"));
        Ok(())
    }

    fn set_line_length(&mut self, line_number: usize, new_total_length: usize) -> Result<(), Self::Error> {
        self.calls.push(format!("length {line_number} {new_total_length}"));
        Ok(())
    }

    fn line_inserted(&mut self, insertion_pos: usize, new_line: usize) -> Result<(), Self::Error> {
        self.calls.push(format!("insert {insertion_pos} {new_line}"));
        Ok(())
    }

    fn rebuild_document(&mut self, line_count: usize) -> Result<(), Self::Error> {
        self.calls.push(format!("rebuild {line_count}"));
        Ok(())
    }

    fn change_complete(&mut self, _change: &DocumentChange) -> Result<(), Self::Error> {
        self.calls.push("complete".to_string());
        Ok(())
    }
}

#[test]
fn test_random_edits_keep_line_table_consistent() {
    const PIECES: [&str; 8] = ["a", "bc", "\n", "\r", "\r\n", "x\ny", "", "long line text "];
    let mut rng = StdRng::seed_from_u64(7);
    let mut doc = TextDocument::new("first\nsecond\r\nthird\rfourth");
    let mut reference: Vec<char> = doc.to_string().chars().collect();
    let mut mirror = LineLengths::from_document(&doc);

    for step in 0..3_000 {
        let offset = rng.gen_range(0..=reference.len());
        let length = rng.gen_range(0..=(reference.len() - offset).min(6));
        let text = PIECES[rng.gen_range(0..PIECES.len())];

        let change = doc.replace(offset, length, text).expect("edit in range");
        reference.splice(offset..offset + length, text.chars());
        mirror.apply(&change);

        let expected: String = reference.iter().collect();
        assert_eq!(doc.to_string(), expected, "text after step {step}");
        let fresh = TextDocument::new(&expected);
        assert_eq!(doc.line_count(), fresh.line_count(), "line count after step {step}");
        for n in 1..=doc.line_count() {
            assert_eq!(
                doc.line_by_number(n).expect("in range"),
                fresh.line_by_number(n).expect("in range"),
                "line {n} after step {step}"
            );
        }
        assert_eq!(mirror.lengths, LineLengths::from_document(&doc).lengths);
    }
}

#[test]
fn test_change_replays_onto_tracker_in_order() {
    let mut doc = TextDocument::new("a\nb\nc");
    let change = doc.replace(1, 3, "X\nY\nZ").expect("edit in range");
    let mut log = CallLog::default();
    change.apply_to(&mut log).expect("infallible");
    assert_eq!(
        log.calls,
        vec![
            "remove 2",
            "remove 2",
            "length 1 3",
            "insert 1 2",
            "insert 2 3",
            "complete"
        ]
    );
    assert_eq!(doc.to_string(), "aX\nY\nZc");
}

#[test]
fn test_set_text_replays_as_rebuild() {
    let mut doc = TextDocument::new("a");
    let change = doc.set_text("1\n2\n3\n");
    let mut log = CallLog::default();
    change.apply_to(&mut log).expect("infallible");
    assert_eq!(log.calls, vec!["rebuild 4", "complete"]);
}

#[test]
fn test_edit_inside_line_after_lone_cr_touches_only_that_line() {
    let mut doc = TextDocument::new("a\rbcd\ne");
    let change = doc.insert(4, "Z").expect("edit in range");
    assert_eq!(
        change.line_changes,
        vec![LineChange::SetLength {
            line_number: 2,
            new_total_length: 5,
        }]
    );
    assert_eq!(doc.to_string(), "a\rbcZd\ne");
}

#[test]
fn test_newline_at_line_start_pairs_with_lone_cr() {
    let mut doc = TextDocument::new("a\rb");
    let change = doc.insert(2, "\n").expect("edit in range");
    let mut log = CallLog::default();
    change.apply_to(&mut log).expect("infallible");
    assert_eq!(log.calls, vec!["remove 2", "length 1 3", "insert 1 2", "complete"]);
    assert_eq!(doc.line_count(), 2);
    assert_eq!(doc.line_by_number(1).expect("in range").total_length(), 3);
}
