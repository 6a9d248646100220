//! Post text cleanup ahead of address extraction.

/// ASCII and CJK punctuation replaced by spaces.
const PUNCTUATION: &str = r##"!"#$%&'()*+,-./:;<=>?@[]^_`{|}~“”？，！【】（）、。：；’‘…￥·"##;

/// Strip `#topic#` segments and punctuation, collapse whitespace.
///
/// The first `#` opens a segment and the next one closes it; the whole
/// segment, markers included, becomes a single space. A trailing unmatched
/// `#` leaves the rest of the text as is for the punctuation pass.
pub fn normalize(text: &str) -> String {
    let without_topics = strip_topics(text);
    let spaced: String = without_topics
        .chars()
        .map(|c| if PUNCTUATION.contains(c) { ' ' } else { c })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_topics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut open: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match (c, open) {
            ('#', None) => open = Some(i),
            ('#', Some(_)) => {
                out.push(' ');
                open = None;
            }
            (_, None) => out.push(c),
            (_, Some(_)) => {}
        }
    }
    if let Some(start) = open {
        out.push_str(&text[start..]);
    }
    out
}
