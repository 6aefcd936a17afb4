//! Font selection and sizing for signature/hint overlays (spec §4.7),
//! ported from `pdf_font_util.py` and the sizing loop in `pdf_tool_util.py`.
//!
//! No TTF binaries ship with this repository (spec §1 out-of-scope static
//! resources), so ascent is approximated by a per-font ascent-to-em ratio
//! rather than parsed from real font metrics (declared below, ratios
//! chosen from each font's typical cap-height/ascent proportions).

/// Unicode codepoint ranges *Dancing Script* covers, used to decide
/// whether a signer's name can render in the cursive signature font or
/// must fall back to *Jason Handwriting 2*.
pub const DANCING_SCRIPT_UNICODE_TABLE: &[(u32, u32)] = &[
    (0x0, 0x0),
    (0xD, 0xD),
    (0x20, 0x7E),
    (0xA0, 0x17E),
    (0x18F, 0x18F),
    (0x192, 0x192),
    (0x1A0, 0x1A1),
    (0x1AF, 0x1B0),
    (0x1C4, 0x1CC),
    (0x1E6, 0x1E7),
    (0x1EA, 0x1EB),
    (0x1FA, 0x21B),
    (0x22A, 0x22D),
    (0x230, 0x233),
    (0x237, 0x237),
    (0x259, 0x259),
    (0x2BC, 0x2BC),
    (0x2C6, 0x2C7),
    (0x2C9, 0x2C9),
    (0x2D8, 0x2DD),
    (0x300, 0x304),
    (0x306, 0x30C),
    (0x30F, 0x30F),
    (0x311, 0x312),
    (0x31B, 0x31B),
    (0x323, 0x324),
    (0x326, 0x328),
    (0x32E, 0x32E),
    (0x331, 0x331),
    (0x335, 0x335),
    (0x1E80, 0x1E85),
    (0x1E9E, 0x1E9E),
    (0x1EA0, 0x1EF9),
    (0x2013, 0x2014),
    (0x2018, 0x201A),
    (0x201C, 0x201E),
    (0x2020, 0x2022),
    (0x2026, 0x2026),
    (0x2030, 0x2030),
    (0x2039, 0x203A),
    (0x2044, 0x2044),
    (0x2074, 0x2074),
    (0x20A1, 0x20A1),
    (0x20A3, 0x20A4),
    (0x20A6, 0x20A7),
    (0x20A9, 0x20A9),
    (0x20AB, 0x20AD),
    (0x20B1, 0x20B2),
    (0x20B5, 0x20B5),
    (0x20B9, 0x20BA),
    (0x20BC, 0x20BD),
    (0x2116, 0x2116),
    (0x2122, 0x2122),
    (0x2205, 0x2205),
    (0x2212, 0x2212),
    (0x2215, 0x2215),
    (0x2219, 0x2219),
    (0x2248, 0x2248),
    (0x2260, 0x2260),
    (0x2264, 0x2265),
    (0xFB01, 0xFB02),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFont {
    DancingScript,
    JasonHandwriting,
}

impl SignatureFont {
    pub fn base14_name(self) -> &'static str {
        match self {
            SignatureFont::DancingScript => "DancingScript-Regular",
            SignatureFont::JasonHandwriting => "JasonHandwriting2-Regular",
        }
    }

    /// Ascent as a fraction of font size, declared in lieu of real font
    /// metrics (see module docs).
    fn ascent_ratio(self) -> f64 {
        match self {
            SignatureFont::DancingScript => 0.72,
            SignatureFont::JasonHandwriting => 0.80,
        }
    }
}

pub const HANAMIN_ASCENT_RATIO: f64 = 0.88;
pub const INCONSOLATA_ASCENT_RATIO: f64 = 0.75;

fn char_in_dancing_script(c: char) -> bool {
    let code = c as u32;
    DANCING_SCRIPT_UNICODE_TABLE
        .iter()
        .any(|&(begin, end)| code >= begin && code <= end)
}

/// Picks *Dancing Script* only if every codepoint of `name` is covered;
/// otherwise falls back to *Jason Handwriting 2* (spec §4.7).
pub fn choose_signature_font(name: &str) -> SignatureFont {
    if name.chars().all(char_in_dancing_script) {
        SignatureFont::DancingScript
    } else {
        SignatureFont::JasonHandwriting
    }
}

/// Largest font size, in 0.1-unit steps, whose ascent stays at or below
/// `height * max_ratio` (spec §4.7: "Font size is chosen iteratively in
/// 0.1-unit steps").
pub fn fit_font_size(ascent_ratio: f64, height: f64, max_ratio: f64) -> f64 {
    let mut size = 1.0f64;
    loop {
        let render_height = ascent_ratio * size;
        if render_height / height <= max_ratio {
            size += 0.1;
        } else {
            size -= 0.1;
            break;
        }
    }
    size.max(0.1)
}

pub fn signature_font_size(font: SignatureFont, height: f64) -> f64 {
    fit_font_size(font.ascent_ratio(), height, SIG_HEIGHT_RATIO)
}

pub const SIG_HEIGHT_RATIO: f64 = 0.6;
pub const HINT_HEIGHT_RATIO: f64 = 0.25;
pub const HANAMIN_FONT_FACTOR: f64 = 1.2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ascii_name_chooses_dancing_script() {
        assert_eq!(choose_signature_font("Jane Doe"), SignatureFont::DancingScript);
    }

    #[test]
    fn a_name_with_uncovered_codepoints_falls_back_to_jason_handwriting() {
        assert_eq!(choose_signature_font("田中太郎"), SignatureFont::JasonHandwriting);
    }

    #[test]
    fn empty_name_chooses_dancing_script() {
        assert_eq!(choose_signature_font(""), SignatureFont::DancingScript);
    }

    #[test]
    fn fit_font_size_keeps_ascent_within_the_max_ratio() {
        let height = 20.0;
        let max_ratio = SIG_HEIGHT_RATIO;
        let ascent_ratio = 0.72;
        let size = fit_font_size(ascent_ratio, height, max_ratio);
        assert!(ascent_ratio * size / height <= max_ratio);
        assert!(ascent_ratio * (size + 0.1) / height > max_ratio);
    }

    #[test]
    fn fit_font_size_steps_down_once_when_the_starting_size_already_overshoots() {
        // At size 1.0 the ratio already exceeds max_ratio, so the loop backs
        // off by a single 0.1 step rather than searching further down.
        let size = fit_font_size(100.0, 1.0, 0.01);
        assert!((size - 0.9).abs() < 1e-9);
    }
}
