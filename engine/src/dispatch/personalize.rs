//! Name placeholder substitution for plain-text campaigns.

/// Equivalent spellings of the recipient-name placeholder.
const NAME_TOKENS: &[&str] = &["${nom}", "${name}", "{nom}", "{name}"];

/// Substitute the recipient's name into a message template.
///
/// A recipient without a name gets the empty string; runs of spaces left
/// behind by an empty substitution collapse to a single space.
pub fn personalize(template: &str, name: Option<&str>) -> String {
    let name = name.unwrap_or("");
    let mut message = template.to_string();
    for token in NAME_TOKENS {
        message = message.replace(token, name);
    }
    collapse_spaces(&message)
}

/// Collapse runs of ordinary spaces to one, leaving other whitespace alone.
fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !previous_space {
                out.push(c);
            }
            previous_space = true;
        } else {
            out.push(c);
            previous_space = false;
        }
    }
    out
}
