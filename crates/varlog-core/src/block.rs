// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Block extraction: locating `<tag ...> ... </tag>` spans in free-form text.
//!
//! Generated text is messy: tags get nested, duplicated or left unclosed. A
//! greedy regex cross-matches in those cases, so pairing works backwards from
//! closing tags instead:
//!
//! 1. Collect every valid closing tag (`</tag`, optional whitespace, `>`).
//! 2. Walk closes from last to first. For each, pick the nearest opening tag
//!    that starts before the search boundary and whose `>` ends before the
//!    close begins.
//! 3. Shrink the boundary to the matched opening tag, so no region can be
//!    claimed twice. Closes that fall inside a claimed region are skipped.
//!
//! Unmatched closes and unclosed opens are ignored without error.

/// Separator placed between outer block texts in a signature.
pub const SIGNATURE_SEPARATOR: &str = "\n\u{241E}\n";

/// Byte offsets of one matched block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSpan {
    /// Offset of `<` in the opening tag.
    pub open_start: usize,
    /// Offset just past the opening tag's `>` (start of the inner text).
    pub open_content_end: usize,
    /// Offset of `<` in the closing tag (end of the inner text).
    pub close_start: usize,
    /// Offset just past the closing tag's `>`.
    pub close_end: usize,
}

impl BlockSpan {
    /// Inner text between the tags.
    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        &text[self.open_content_end..self.close_start]
    }

    /// Full text from opening `<` through closing `>`.
    pub fn outer<'a>(&self, text: &'a str) -> &'a str {
        &text[self.open_start..self.close_end]
    }
}

#[derive(Clone, Copy, Debug)]
struct TagHit {
    start: usize,
    end: usize,
}

/// Finds matched spans for `tag` (ASCII case-insensitive), in document order.
pub fn find_block_spans(text: &str, tag: &str) -> Vec<BlockSpan> {
    if tag.is_empty() {
        return Vec::new();
    }
    let opens = scan_opening_tags(text, tag);
    let closes = scan_closing_tags(text, tag);

    let mut spans = Vec::new();
    let mut boundary = text.len();
    for close in closes.iter().rev() {
        if close.start >= boundary {
            continue;
        }
        let open = opens
            .iter()
            .rev()
            .find(|open| open.start < boundary && open.end <= close.start);
        if let Some(open) = open {
            spans.push(BlockSpan {
                open_start: open.start,
                open_content_end: open.end,
                close_start: close.start,
                close_end: close.end,
            });
            boundary = open.start;
        }
    }
    spans.reverse();
    spans
}

/// Inner text of every block with non-whitespace content.
pub fn extract_blocks<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    find_block_spans(text, tag)
        .into_iter()
        .map(|span| span.inner(text))
        .filter(|inner| !inner.trim().is_empty())
        .collect()
}

/// Change-detection signature: trimmed outer texts joined by
/// [`SIGNATURE_SEPARATOR`]. Empty means the text carries no blocks.
pub fn compute_signature(text: &str, tag: &str) -> String {
    find_block_spans(text, tag)
        .iter()
        .map(|span| span.outer(text).trim())
        .collect::<Vec<_>>()
        .join(SIGNATURE_SEPARATOR)
}

fn starts_with_ignore_case(haystack: &[u8], at: usize, needle: &[u8]) -> bool {
    haystack
        .get(at..at + needle.len())
        .is_some_and(|window| window.eq_ignore_ascii_case(needle))
}

/// `<tag` followed by whitespace or `>`, ending at the next `>`. Self-closing
/// `<tag/>` forms are not block openers.
fn scan_opening_tags(text: &str, tag: &str) -> Vec<TagHit> {
    let bytes = text.as_bytes();
    let name = tag.as_bytes();
    let mut hits = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' && starts_with_ignore_case(bytes, i + 1, name) {
            let after = i + 1 + name.len();
            match bytes.get(after) {
                Some(b'>') => {
                    hits.push(TagHit {
                        start: i,
                        end: after + 1,
                    });
                    i = after + 1;
                    continue;
                }
                Some(c) if c.is_ascii_whitespace() => {
                    if let Some(rel) = bytes[after..].iter().position(|&b| b == b'>') {
                        let gt = after + rel;
                        if bytes[gt - 1] != b'/' && !bytes[after..gt].contains(&b'<') {
                            hits.push(TagHit {
                                start: i,
                                end: gt + 1,
                            });
                            i = gt + 1;
                            continue;
                        }
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    hits
}

/// `</tag`, optional whitespace, `>`.
fn scan_closing_tags(text: &str, tag: &str) -> Vec<TagHit> {
    let bytes = text.as_bytes();
    let name = tag.as_bytes();
    let mut hits = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'<' && bytes[i + 1] == b'/' && starts_with_ignore_case(bytes, i + 2, name)
        {
            let mut j = i + 2 + name.len();
            while bytes.get(j).is_some_and(u8::is_ascii_whitespace) {
                j += 1;
            }
            if bytes.get(j) == Some(&b'>') {
                hits.push(TagHit { start: i, end: j + 1 });
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = "state";

    #[test]
    fn extracts_blocks_in_document_order() {
        let text = "intro <state>a: 1</state> middle <STATE mode=\"x\">b: 2</state >";
        assert_eq!(extract_blocks(text, TAG), vec!["a: 1", "b: 2"]);
    }

    #[test]
    fn unclosed_opening_tag_is_ignored() {
        let text = "<state>thinking... <state>hp: 1</state>";
        let spans = find_block_spans(text, TAG);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].inner(text), "hp: 1");
    }

    #[test]
    fn unmatched_close_is_skipped() {
        let text = "</state> stray <state>x: 1</state>";
        assert_eq!(extract_blocks(text, TAG), vec!["x: 1"]);
    }

    #[test]
    fn spans_never_overlap_with_nested_tags() {
        let text = "<state><state>x: 1</state></state>";
        let spans = find_block_spans(text, TAG);
        assert_eq!(spans.len(), 1);
        for pair in spans.windows(2) {
            assert!(pair[0].close_end <= pair[1].open_start);
        }
    }

    #[test]
    fn malformed_closing_tags_do_not_count() {
        let text = "<state>x: 1</state extra>";
        assert!(find_block_spans(text, TAG).is_empty());
    }

    #[test]
    fn self_closing_tag_is_not_an_opener() {
        let text = "<state/> <state>y: 2</state>";
        assert_eq!(extract_blocks(text, TAG), vec!["y: 2"]);
    }

    #[test]
    fn whitespace_only_blocks_are_dropped_but_signed() {
        let text = "<state>  \n </state>";
        assert!(extract_blocks(text, TAG).is_empty());
        assert_eq!(compute_signature(text, TAG), "<state>  \n </state>");
    }

    #[test]
    fn signature_changes_with_attributes_and_is_empty_without_blocks() {
        let a = compute_signature("<state>x: 1</state>", TAG);
        let b = compute_signature("<state v=\"2\">x: 1</state>", TAG);
        assert_ne!(a, b);
        assert_eq!(compute_signature("no blocks here", TAG), "");
    }

    #[test]
    fn signature_ignores_text_outside_blocks() {
        let a = compute_signature("hello <state>x: 1</state>", TAG);
        let b = compute_signature("goodbye <state>x: 1</state>\n", TAG);
        assert_eq!(a, b);
    }
}
