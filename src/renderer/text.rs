//! Batching of placed glyphs into text-showing runs.
//!
//! Glyphs drawn one at a time on the same baseline are merged into a single
//! `TJ` array. Small deviations from the advance the font would produce are
//! ignored; larger ones become one explicit adjustment.

use crate::geometry::Si;
use crate::writer::content_stream::TextArrayItem;

/// Gaps below this many device pixels are absorbed into the run.
pub const GAP_THRESHOLD_PIXELS: Si = 4;

/// A glyph placed but not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGlyph {
    /// Origin in layout units, offsets already applied
    pub x: Si,
    /// Baseline in layout units, offsets already applied
    pub y: Si,
    /// Advance in device pixels
    pub advance: i32,
    /// Encoded glyph
    pub item: TextArrayItem,
}

/// One `Td` + `TJ` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRun {
    /// Origin of the first glyph in layout units
    pub x: Si,
    /// Baseline in layout units
    pub y: Si,
    /// Encoded glyph strings and spacing corrections
    pub items: Vec<TextArrayItem>,
}

/// Append an encoded glyph, merging it into the previous string item when
/// both use the same encoding.
fn push_glyph(items: &mut Vec<TextArrayItem>, item: &TextArrayItem) {
    match (items.last_mut(), item) {
        (Some(TextArrayItem::Text(run)), TextArrayItem::Text(bytes)) => run.extend_from_slice(bytes),
        (Some(TextArrayItem::HexText(run)), TextArrayItem::HexText(bytes)) => run.extend_from_slice(bytes),
        _ => items.push(item.clone()),
    }
}

/// Split glyphs into runs, one per baseline change.
///
/// Within a run the expected position of each glyph is the previous one's
/// position plus its advance. A deviation of at least
/// [`GAP_THRESHOLD_PIXELS`] inserts the adjustment
/// `-dx * (1000 / pixel) / font_size`; anything smaller is dropped and the
/// expected position is kept.
pub fn batch_runs(glyphs: &[PendingGlyph], pixel: Si, font_size: f64) -> Vec<GlyphRun> {
    let mut runs = Vec::new();
    let mut iter = glyphs.iter().peekable();
    let threshold = GAP_THRESHOLD_PIXELS * pixel;

    while let Some(first) = iter.next() {
        let mut run = GlyphRun {
            x: first.x,
            y: first.y,
            items: Vec::new(),
        };
        push_glyph(&mut run.items, &first.item);
        let mut x = first.x;
        let mut w = first.advance as Si * pixel;

        while let Some(next) = iter.next_if(|g| g.y == run.y) {
            let mut dx = next.x - x - w;
            if dx.abs() >= threshold {
                run.items
                    .push(TextArrayItem::Adjustment(-(dx as f64) * (1000.0 / pixel as f64) / font_size));
            } else {
                dx = 0;
            }
            x += w + dx;
            w = next.advance as Si * pixel;
            push_glyph(&mut run.items, &next.item);
        }
        runs.push(run);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: Si = 256;

    fn glyph(x: Si, y: Si, code: u8) -> PendingGlyph {
        PendingGlyph {
            x,
            y,
            advance: 10,
            item: TextArrayItem::Text(vec![code]),
        }
    }

    #[test]
    fn test_exact_advance_merges() {
        let glyphs = vec![glyph(0, 0, b'a'), glyph(10 * PIXEL, 0, b'b'), glyph(20 * PIXEL, 0, b'c')];
        let runs = batch_runs(&glyphs, PIXEL, 100.0);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].items, vec![TextArrayItem::Text(b"abc".to_vec())]);
    }

    #[test]
    fn test_small_gap_ignored() {
        let glyphs = vec![glyph(0, 0, b'a'), glyph(13 * PIXEL + 255, 0, b'b')];
        let runs = batch_runs(&glyphs, PIXEL, 100.0);
        assert_eq!(runs[0].items.len(), 1);
    }

    #[test]
    fn test_large_gap_adjusts_once() {
        let glyphs = vec![glyph(0, 0, b'a'), glyph(15 * PIXEL, 0, b'b')];
        let runs = batch_runs(&glyphs, PIXEL, 100.0);
        assert_eq!(
            runs[0].items,
            vec![
                TextArrayItem::Text(b"a".to_vec()),
                TextArrayItem::Adjustment(-50.0),
                TextArrayItem::Text(b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn test_threshold_gap_splits() {
        let late = vec![glyph(0, 0, b'a'), glyph(14 * PIXEL, 0, b'b')];
        assert_eq!(
            batch_runs(&late, PIXEL, 100.0)[0].items,
            vec![
                TextArrayItem::Text(b"a".to_vec()),
                TextArrayItem::Adjustment(-40.0),
                TextArrayItem::Text(b"b".to_vec()),
            ]
        );
        let early = vec![glyph(0, 0, b'a'), glyph(6 * PIXEL, 0, b'b')];
        assert_eq!(batch_runs(&early, PIXEL, 100.0)[0].items[1], TextArrayItem::Adjustment(40.0));
    }

    #[test]
    fn test_negative_gap() {
        let glyphs = vec![glyph(0, 0, b'a'), glyph(5 * PIXEL, 0, b'b')];
        let runs = batch_runs(&glyphs, PIXEL, 50.0);
        assert_eq!(runs[0].items[1], TextArrayItem::Adjustment(100.0));
    }

    #[test]
    fn test_baseline_change_starts_run() {
        let glyphs = vec![glyph(0, 0, b'a'), glyph(10 * PIXEL, -PIXEL, b'b'), glyph(20 * PIXEL, -PIXEL, b'c')];
        let runs = batch_runs(&glyphs, PIXEL, 100.0);
        assert_eq!(runs.len(), 2);
        assert_eq!((runs[1].x, runs[1].y), (10 * PIXEL, -PIXEL));
        assert_eq!(runs[1].items, vec![TextArrayItem::Text(b"bc".to_vec())]);
    }

    #[test]
    fn test_ignored_gaps_accumulate() {
        // each glyph is 3 px late; the expected position does not follow,
        // so the second deviation is 6 px and gets corrected
        let glyphs = vec![glyph(0, 0, b'a'), glyph(13 * PIXEL, 0, b'b'), glyph(26 * PIXEL, 0, b'c')];
        let runs = batch_runs(&glyphs, PIXEL, 100.0);
        assert_eq!(
            runs[0].items,
            vec![
                TextArrayItem::Text(b"ab".to_vec()),
                TextArrayItem::Adjustment(-60.0),
                TextArrayItem::Text(b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn test_hex_glyphs_merge() {
        let glyphs = vec![
            PendingGlyph {
                x: 0,
                y: 0,
                advance: 1,
                item: TextArrayItem::HexText(vec![0, 3]),
            },
            PendingGlyph {
                x: PIXEL,
                y: 0,
                advance: 1,
                item: TextArrayItem::HexText(vec![0, 4]),
            },
        ];
        let runs = batch_runs(&glyphs, PIXEL, 10.0);
        assert_eq!(runs[0].items, vec![TextArrayItem::HexText(vec![0, 3, 0, 4])]);
    }
}
