use crate::text_metrics;

use super::TextBlock;

/// Font settings shared by every label measured in one layout pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextStyle<'a> {
    pub font_family: &'a str,
    pub font_size: f32,
    pub line_height: f32,
    pub fast_metrics: bool,
}

/// Measures `text`, wrapping at word boundaries when `max_width` is given.
/// Words wider than `max_width` are kept whole and reported as overflow.
pub(crate) fn measure_text(text: &str, style: TextStyle<'_>, max_width: Option<f32>) -> TextBlock {
    let mut lines = Vec::new();
    let mut overflow = 0.0f32;
    for line in split_lines(text) {
        match max_width {
            Some(limit) => {
                for word in line.split_whitespace() {
                    let w = text_width(word, style);
                    if w > limit {
                        overflow = overflow.max(w - limit);
                    }
                }
                lines.extend(wrap_line(&line, limit, style));
            }
            None => lines.push(line),
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    let width = lines
        .iter()
        .map(|line| text_width(line, style))
        .fold(0.0, f32::max);
    let height = lines.len() as f32 * style.font_size * style.line_height;
    TextBlock {
        lines,
        width,
        height,
        font_size: style.font_size,
        overflow,
    }
}

pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.replace("<br/>", "\n")
        .replace("<br>", "\n")
        .replace("\\n", "\n")
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect()
}

pub(crate) fn wrap_line(line: &str, max_width: f32, style: TextStyle<'_>) -> Vec<String> {
    if text_width(line, style) <= max_width {
        return vec![line.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, style) > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub(crate) fn text_width(text: &str, style: TextStyle<'_>) -> f32 {
    if style.fast_metrics {
        return fallback_text_width(text, style.font_size);
    }
    text_metrics::measure_text_width(text, style.font_size, style.font_family)
        .unwrap_or_else(|| fallback_text_width(text, style.font_size))
}

/// Width estimate from per-character em factors calibrated against
/// Arial/Helvetica advances.
pub(crate) fn fallback_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().map(char_width_factor).sum::<f32>() * font_size
}

fn char_width_factor(ch: char) -> f32 {
    match ch {
        ' ' | 'f' | 't' | 'r' => 0.31,
        '.' | ',' | ':' | ';' | '|' | '!' | '\'' | 'i' | 'j' | 'l' | 'I' => 0.25,
        '(' | ')' | '[' | ']' | '{' | '}' | '/' | '\\' | '-' => 0.33,
        'm' | 'M' => 0.87,
        'w' | 'W' => 0.90,
        '@' | '%' | '&' | '#' => 0.94,
        'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 0.65,
        'C' | 'D' | 'G' | 'H' | 'N' | 'O' | 'Q' | 'R' | 'U' => 0.73,
        'F' | 'J' | 'L' | 'T' | 'Z' => 0.59,
        'a'..='z' => 0.56,
        '0'..='9' => 0.56,
        // CJK and other wide scripts occupy a full em.
        c if (c as u32) >= 0x2E80 => 1.0,
        _ => 0.58,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(size: f32) -> TextStyle<'static> {
        TextStyle {
            font_family: "sans-serif",
            font_size: size,
            line_height: 1.25,
            fast_metrics: true,
        }
    }

    #[test]
    fn split_lines_handles_breaks_and_whitespace() {
        assert_eq!(split_lines("a<br/>b"), vec!["a", "b"]);
        assert_eq!(split_lines("a\\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("  hello   big \n world "), vec!["hello big", "world"]);
    }

    #[test]
    fn fallback_width_scales_with_font_size() {
        let w16 = fallback_text_width("Hello", 16.0);
        let w32 = fallback_text_width("Hello", 32.0);
        assert!((w32 - w16 * 2.0).abs() < 0.01);
        assert!(fallback_text_width("数据", 10.0) >= 20.0);
    }

    #[test]
    fn long_text_wraps_within_limit() {
        let block = measure_text(
            "this is a rather long line that should be wrapped",
            fast(16.0),
            Some(100.0),
        );
        assert!(block.lines.len() > 1);
        assert!(block.width <= 100.0 + 0.01);
        assert_eq!(block.overflow, 0.0);
        assert!((block.height - block.lines.len() as f32 * 20.0).abs() < 1e-3);
    }

    #[test]
    fn unbreakable_word_reports_overflow() {
        let block = measure_text("Supercalifragilistic", fast(16.0), Some(60.0));
        assert_eq!(block.lines, vec!["Supercalifragilistic"]);
        assert!(block.overflow > 0.0);
    }

    #[test]
    fn empty_label_is_one_blank_line() {
        let block = measure_text("", fast(14.0), Some(100.0));
        assert_eq!(block.lines, vec![String::new()]);
        assert_eq!(block.width, 0.0);
    }
}
