use std::sync::Arc;

use proptest::prelude::*;
use quill_core::{DocumentLine, LineDelimiter, Segment};
use quill_highlight::{HighlightedLine, HighlightedSection, HighlightingColor};

const LINE_LENGTH: usize = 40;

fn document_line() -> DocumentLine {
    DocumentLine {
        line_number: 1,
        offset: 100,
        length: LINE_LENGTH,
        delimiter: LineDelimiter::Lf,
    }
}

fn overlay(start: usize, length: usize, color: &Arc<HighlightingColor>) -> HighlightedLine {
    let length = length.min(LINE_LENGTH - start);
    HighlightedLine::with_sections(
        &document_line(),
        vec![HighlightedSection::new(100 + start, length, Arc::clone(color))],
    )
}

fn covered_by(line: &HighlightedLine, color: &Arc<HighlightingColor>) -> Vec<usize> {
    let mut offsets: Vec<usize> = line
        .sections()
        .iter()
        .filter(|section| Arc::ptr_eq(&section.color, color))
        .flat_map(|section| section.offset..section.offset + section.length)
        .collect();
    offsets.sort_unstable();
    offsets
}

proptest! {
    #[test]
    fn merging_keeps_sections_nested_or_disjoint(
        overlays in prop::collection::vec((0..LINE_LENGTH, 1usize..16), 1..12),
    ) {
        let mut line = HighlightedLine::new(&document_line());
        let mut colors = Vec::new();
        for (start, length) in overlays {
            let color = Arc::new(HighlightingColor::new());
            let incoming = overlay(start, length, &color);
            let expected: Vec<usize> = incoming
                .sections()
                .iter()
                .flat_map(|section| section.offset..section.offset + section.length)
                .collect();

            line.merge_with(&incoming);
            prop_assert!(line.is_well_formed(), "{:?}", line.sections());
            prop_assert_eq!(covered_by(&line, &color), expected);
            colors.push(color);
        }
    }

    #[test]
    fn innermost_covering_section_is_latest_overlay(
        overlays in prop::collection::vec((0..LINE_LENGTH, 1usize..16), 1..8),
        probe in 100..100 + LINE_LENGTH,
    ) {
        let mut line = HighlightedLine::new(&document_line());
        let mut latest = None;
        for (start, length) in overlays {
            let color = Arc::new(HighlightingColor::new());
            let incoming = overlay(start, length, &color);
            if incoming.sections()[0].offset <= probe && probe < incoming.sections()[0].end_offset() {
                latest = Some(Arc::clone(&color));
            }
            line.merge_with(&incoming);
        }

        let innermost = line
            .sections()
            .iter()
            .filter(|section| section.offset <= probe && probe < section.end_offset())
            .last()
            .map(|section| Arc::clone(&section.color));
        prop_assert_eq!(innermost.map(|c| Arc::as_ptr(&c)), latest.map(|c| Arc::as_ptr(&c)));
    }
}
