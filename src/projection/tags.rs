//! Hashtag extraction from post text

/// Maximum length of a hashtag in characters
const MAX_TAG_LEN: usize = 64;

/// Extracts lowercase hashtags from free text.
///
/// A tag is a `#` at the start of the text or after whitespace, followed
/// by 1 to 64 ASCII alphanumeric or underscore characters. Duplicates are
/// dropped, keeping first-occurrence order.
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut at_boundary = true;

    while let Some(c) = chars.next() {
        if c == '#' && at_boundary {
            let mut tag = String::new();
            while let Some(&next) = chars.peek() {
                if tag.len() < MAX_TAG_LEN && (next.is_ascii_alphanumeric() || next == '_') {
                    tag.push(next.to_ascii_lowercase());
                    chars.next();
                } else {
                    break;
                }
            }
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
            // The tag body never ends at a boundary; a directly following
            // '#' starts plain text, not a new tag
            at_boundary = false;
        } else {
            at_boundary = c.is_whitespace();
        }
    }

    tags
}
