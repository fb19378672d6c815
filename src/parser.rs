use std::num::ParseFloatError;

/// One tokenized G-code line. Field values stay as raw text until asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct GCodeLine<'a> {
    pub command: &'a str,
    pub words: Vec<(char, &'a str)>,
    pub comment: Option<&'a str>,
}

impl GCodeLine<'_> {
    /// `G0` or `G1`
    pub fn is_motion(&self) -> bool {
        self.command.eq_ignore_ascii_case("G0") || self.command.eq_ignore_ascii_case("G1")
    }

    pub fn is_command(&self, code: &str) -> bool {
        self.command.eq_ignore_ascii_case(code)
    }

    /// Numeric value of the last word with this letter, if present.
    pub fn field(&self, letter: char) -> Result<Option<f32>, ParseFloatError> {
        match self.words.iter().rev().find(|(c, _)| *c == letter) {
            Some((_, raw)) => raw.parse::<f32>().map(Some),
            None => Ok(None),
        }
    }
}

pub fn parse_line(line: &str) -> Option<GCodeLine<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (content, comment) = match line.split_once(';') {
        Some((code, comment)) => (code.trim(), Some(comment)),
        None => (line, None),
    };

    if content.is_empty() {
        return comment.map(|comment| GCodeLine {
            command: "",
            words: Vec::new(),
            comment: Some(comment),
        });
    }

    // Slicers separate words with whitespace; packed words like "G1X10" are not split.
    let mut parts = content.split_whitespace();
    let command = parts.next()?;

    if !command.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let words = parts
        .filter_map(|part| {
            let c = part.chars().next()?;
            c.is_ascii_alphabetic()
                .then(|| (c.to_ascii_uppercase(), &part[c.len_utf8()..]))
        })
        .collect();

    Some(GCodeLine {
        command,
        words,
        comment,
    })
}

/// Slicer settings announced in a header comment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommentHints {
    pub layer_height: Option<f32>,
    pub extrusion_width: Option<f32>,
}

impl CommentHints {
    pub fn is_empty(&self) -> bool {
        self.layer_height.is_none() && self.extrusion_width.is_none()
    }
}

/// Read layer height / extrusion width hints from a `;` comment line.
///
/// Keys match case-insensitively with a space or underscore; the value is the
/// first number anywhere on the line.
pub fn comment_hint(line: &str) -> CommentHints {
    let line = line.trim();
    if !line.starts_with(';') {
        return CommentHints::default();
    }

    let lower = line.to_ascii_lowercase();
    let names_layer = lower.contains("layer height") || lower.contains("layer_height");
    let names_width = lower.contains("extrusion width") || lower.contains("extrusion_width");
    if !names_layer && !names_width {
        return CommentHints::default();
    }

    let value = first_number(line);
    CommentHints {
        layer_height: value.filter(|_| names_layer),
        extrusion_width: value.filter(|_| names_width),
    }
}

/// First `-?digits[.digits]` token in the text.
fn first_number(text: &str) -> Option<f32> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let begin = if start > 0 && bytes[start - 1] == b'-' {
        start - 1
    } else {
        start
    };

    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    text[begin..end].parse().ok()
}
