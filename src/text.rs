//! Text utilities for height estimation

/// Reduce comment markup to the text a row would display.
///
/// Tags are dropped, `<br>` and `</p>` become line breaks and the common
/// entities are decoded.
#[must_use]
pub fn plain_text(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('>') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let tag = rest[start + 1..start + end].trim().to_ascii_lowercase();
        if tag.starts_with("br") || tag == "/p" {
            out.push('\n');
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);

    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim_end()
        .to_string()
}

/// Wrap text to a maximum width in characters, preserving line breaks.
///
/// Words longer than the width are split.
#[must_use]
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return Vec::new();
    }

    let mut lines = Vec::new();
    for raw_line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in raw_line.split_whitespace() {
            let word_len = word.chars().count();
            if current_len > 0 && current_len + 1 + word_len <= max_width {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
                continue;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
            }

            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max_width {
                let tail = chars.split_off(max_width);
                lines.push(chars.into_iter().collect());
                chars = tail;
            }
            current_len = chars.len();
            current = chars.into_iter().collect();
        }
        lines.push(current);
    }

    lines
}

/// Number of lines `text` occupies at `max_width`.
#[must_use]
pub fn wrapped_line_count(text: &str, max_width: usize) -> usize {
    wrap_text(text, max_width).len()
}
