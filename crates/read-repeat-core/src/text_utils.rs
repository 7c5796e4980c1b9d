//! Text splitting helpers for speech and highlighting.

/// Characters that close a phrase when followed by whitespace.
const PHRASE_TERMINATORS: [char; 5] = ['.', '!', '?', ':', ';'];

/// Very lightweight phrase splitter based on punctuation.
///
/// A boundary sits after a terminator that is followed by whitespace, or on
/// any run of line breaks. Terminators stay attached to their phrase. There
/// is no abbreviation handling: "Mr. Smith" ends a phrase after "Mr.".
/// Text without any boundary becomes a single phrase equal to the trimmed
/// input.
pub fn segment_into_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let end = if is_line_break(ch) {
            Some(idx)
        } else if PHRASE_TERMINATORS.contains(&ch)
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace())
        {
            Some(idx + ch.len_utf8())
        } else {
            None
        };

        let Some(end) = end else {
            continue;
        };
        push_trimmed(&mut phrases, &text[start..end]);

        // Swallow the separator run so it never starts the next phrase.
        start = end;
        while let Some(&(next_idx, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            chars.next();
            start = next_idx + next.len_utf8();
        }
        if is_line_break(ch) {
            start = start.max(idx + ch.len_utf8());
        }
    }
    push_trimmed(&mut phrases, &text[start.min(text.len())..]);

    if phrases.is_empty() {
        return vec![text.trim().to_string()];
    }
    phrases
}

fn push_trimmed(phrases: &mut Vec<String>, span: &str) {
    let trimmed = span.trim();
    if !trimmed.is_empty() {
        phrases.push(trimmed.to_string());
    }
}

fn is_line_break(ch: char) -> bool {
    matches!(ch, '\n' | '\r')
}
