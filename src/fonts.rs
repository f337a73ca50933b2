//! Text measurement for the builtin PDF fonts.
//!
//! Pages are drawn with the standard Helvetica faces, which every PDF
//! viewer provides, so glyph advances come from the Helvetica AFM metrics
//! rather than from an embedded font file. Oblique faces share the upright
//! widths.

/// Advance widths (1/1000 em) of Helvetica for U+0020..=U+007E.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722,
    722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556,
    556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500,
    500, 334, 260, 334, 584,
];

/// Advance widths (1/1000 em) of Helvetica-Bold for U+0020..=U+007E.
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722,
    722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611,
    611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556,
    500, 389, 280, 389, 584,
];

/// How text may be broken into lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    /// Break between words only; overlong words overflow.
    Words,
    /// Break between words, and inside words that do not fit a line.
    BreakWords,
    /// Never break; only explicit newlines start a line.
    NoWrap,
}

/// Vertical metrics and advance widths of the Helvetica family.
#[derive(Debug, Clone, Copy)]
pub struct FontMetrics {
    /// In 1/1000 em.
    pub ascender: f32,
    pub descender: f32,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            ascender: 718.0,
            descender: -207.0,
        }
    }
}

impl FontMetrics {
    /// Advance of a single character in 1/1000 em.
    fn advance(&self, c: char, bold: bool) -> f32 {
        let table = if bold { &HELVETICA_BOLD } else { &HELVETICA };
        let code = c as u32;
        if (0x20..=0x7E).contains(&code) {
            return table[(code - 0x20) as usize] as f32;
        }
        match c {
            '\u{00A0}' => 278.0,
            '\t' => 278.0,
            // Accented Latin letters take the width of their base letter.
            'à' | 'á' => table[(b'a' - 0x20) as usize] as f32,
            'è' | 'é' => table[(b'e' - 0x20) as usize] as f32,
            'ò' | 'ó' => table[(b'o' - 0x20) as usize] as f32,
            'ì' | 'í' => table[(b'i' - 0x20) as usize] as f32,
            'ù' | 'ú' => table[(b'u' - 0x20) as usize] as f32,
            'À' | 'Á' | 'È' | 'É' => table[(b'E' - 0x20) as usize] as f32,
            '\u{2018}' | '\u{2019}' => 222.0,
            '\u{201C}' | '\u{201D}' => 333.0,
            '\u{2013}' => 556.0,
            '\u{2014}' => 1000.0,
            '\u{2022}' => 350.0,
            _ => 556.0,
        }
    }

    /// Width of `text` in points at `font_size`.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool) -> f32 {
        text.chars().map(|c| self.advance(c, bold)).sum::<f32>() * font_size / 1000.0
    }

    /// Line height in points.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Distance from the top of a line box to the baseline, in points.
    pub fn baseline_offset(&self, font_size: f32, line_height_factor: f32) -> f32 {
        let content = (self.ascender - self.descender) / 1000.0 * font_size;
        let half_leading = (self.line_height_px(font_size, line_height_factor) - content) / 2.0;
        half_leading + self.ascender / 1000.0 * font_size
    }
}

/// Break `text` into lines no wider than `max_width` points.
///
/// Explicit `\n` always starts a new line. Runs of other ASCII whitespace
/// collapse to one space.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    max_width: f32,
    mode: WrapMode,
    fonts: &FontMetrics,
) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        // Only ASCII whitespace separates words; NBSP binds.
        let words: Vec<&str> = paragraph
            .split(|c: char| c.is_ascii_whitespace())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }
        if mode == WrapMode::NoWrap || max_width <= 0.0 {
            lines.push(words.join(" "));
            continue;
        }

        let fits = |s: &str| fonts.measure_text_width(s, font_size, bold) <= max_width;
        let mut current = String::new();
        for word in words {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if fits(&candidate) {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if mode == WrapMode::BreakWords && !fits(word) {
                // Split by characters; every chunk gets at least one.
                for c in word.chars() {
                    let mut next = current.clone();
                    next.push(c);
                    if !current.is_empty() && !fits(&next) {
                        lines.push(std::mem::take(&mut current));
                        current.push(c);
                    } else {
                        current = next;
                    }
                }
            } else {
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    // Drop the empty line a trailing newline leaves behind.
    while lines.len() > 1 && lines.last().map(String::is_empty).unwrap_or(false) {
        lines.pop();
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_widths() {
        let m = FontMetrics::default();
        // H e l l o = 722 + 556 + 222 + 222 + 556
        let w = m.measure_text_width("Hello", 10.0, false);
        assert!((w - 22.78).abs() < 0.01, "{w}");
        // Digits are tabular in both weights.
        assert_eq!(
            m.measure_text_width("1234,56", 9.0, false),
            m.measure_text_width("1234,56", 9.0, true)
        );
        let bold = m.measure_text_width("Totale", 9.0, true);
        assert!(bold > m.measure_text_width("Totale", 9.0, false));
    }

    #[test]
    fn word_wrap_basic() {
        let m = FontMetrics::default();
        let lines = wrap_text("Hello world foo bar", 16.0, false, 60.0, WrapMode::Words, &m);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
        assert!(lines.iter().all(|l| !l.starts_with(' ')));
    }

    #[test]
    fn explicit_newlines_are_kept() {
        let m = FontMetrics::default();
        let lines = wrap_text("Via Roma 1\n00100 Roma", 9.0, false, 500.0, WrapMode::Words, &m);
        assert_eq!(lines, vec!["Via Roma 1", "00100 Roma"]);
    }

    #[test]
    fn nowrap_keeps_one_line() {
        let m = FontMetrics::default();
        let lines = wrap_text("a b c d e f g", 16.0, false, 10.0, WrapMode::NoWrap, &m);
        assert_eq!(lines, vec!["a b c d e f g"]);
    }

    #[test]
    fn long_words_break_only_when_allowed() {
        let m = FontMetrics::default();
        let iban = "IT60X0542811101000000123456";
        let kept = wrap_text(iban, 9.0, false, 40.0, WrapMode::Words, &m);
        assert_eq!(kept, vec![iban]);

        let broken = wrap_text(iban, 9.0, false, 40.0, WrapMode::BreakWords, &m);
        assert!(broken.len() > 1);
        assert_eq!(broken.concat(), iban);
        for line in &broken {
            assert!(m.measure_text_width(line, 9.0, false) <= 40.0, "{line}");
        }
    }
}
