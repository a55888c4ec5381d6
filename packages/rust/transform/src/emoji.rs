//! Emoji policy applied to serialized HTML.

use coursebook_shared::EmojiMode;

/// Longest emoji sequence (in chars) tried at each position.
const MAX_EMOJI_CHARS: usize = 10;

const VARIATION_SELECTOR: char = '\u{fe0f}';

/// Apply `mode` to every emoji glyph in `input`.
pub fn apply_emoji_policy(input: &str, mode: EmojiMode) -> String {
    match mode {
        EmojiMode::Keep => input.to_string(),
        EmojiMode::Replace => rewrite_emoji(input, |emoji, out| {
            out.push(':');
            match emoji.shortcode() {
                Some(code) => out.push_str(code),
                None => out.push_str(&emoji.name().replace(' ', "_")),
            }
            out.push(':');
        }),
        EmojiMode::Remove => rewrite_emoji(input, |_, _| {}),
    }
}

/// Scan for the longest emoji match at each non-ASCII position and let
/// `emit` write its replacement.
fn rewrite_emoji(input: &str, emit: impl Fn(&emojis::Emoji, &mut String)) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if c.is_ascii() {
            out.push(c);
            rest = &rest[1..];
            continue;
        }

        match longest_match(rest) {
            Some((emoji, len)) => {
                emit(emoji, &mut out);
                rest = &rest[len..];
                if let Some(after) = rest.strip_prefix(VARIATION_SELECTOR) {
                    rest = after;
                }
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// Longest prefix of `s` that is a known emoji, with its byte length.
fn longest_match(s: &str) -> Option<(&'static emojis::Emoji, usize)> {
    let ends: Vec<usize> = s
        .char_indices()
        .skip(1)
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .take(MAX_EMOJI_CHARS)
        .collect();

    ends.into_iter()
        .rev()
        .find_map(|end| emojis::get(&s[..end]).map(|emoji| (emoji, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_uses_shortcodes() {
        assert_eq!(
            apply_emoji_policy("<p>Done 🚀 now</p>", EmojiMode::Replace),
            "<p>Done :rocket: now</p>"
        );
    }

    #[test]
    fn replace_consumes_variation_selector() {
        let out = apply_emoji_policy("I \u{2764}\u{fe0f} Rust", EmojiMode::Replace);
        assert_eq!(out, "I :heart: Rust");
    }

    #[test]
    fn remove_strips_glyphs() {
        assert_eq!(apply_emoji_policy("a🎉b", EmojiMode::Remove), "ab");
    }

    #[test]
    fn keep_is_identity() {
        let s = "tea 🍵 time";
        assert_eq!(apply_emoji_policy(s, EmojiMode::Keep), s);
    }

    #[test]
    fn non_emoji_unicode_is_untouched() {
        let s = "Ääkköset ja 中文 — ok";
        assert_eq!(apply_emoji_policy(s, EmojiMode::Replace), s);
        assert_eq!(apply_emoji_policy(s, EmojiMode::Remove), s);
    }

    #[test]
    fn replace_is_idempotent() {
        let once = apply_emoji_policy("👍 and 🎉", EmojiMode::Replace);
        assert_eq!(apply_emoji_policy(&once, EmojiMode::Replace), once);
    }
}
