//! Native text quality classification
//!
//! Decides per page whether the text embedded in the document is good enough
//! to return as-is, or whether the page has to go through OCR. Scanned pages
//! carry no text at all; pages with broken font encodings carry text that is
//! mostly symbols and replacement characters.

use crate::config::ExtractionConfig;

/// Classifier verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextQuality {
    Sufficient,
    Insufficient(Deficiency),
}

/// Why native text was rejected
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deficiency {
    /// Fewer than the minimum number of characters after trimming
    TooShort { chars: usize, min: usize },
    /// Share of non-alphanumeric characters above the limit
    Garbled { symbol_ratio: f32, max: f32 },
}

impl TextQuality {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, TextQuality::Sufficient)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextClassifier {
    min_chars: usize,
    max_symbol_ratio: f32,
}

impl TextClassifier {
    pub fn new(min_chars: usize, max_symbol_ratio: f32) -> Self {
        Self {
            min_chars,
            max_symbol_ratio,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.min_text_chars, config.max_symbol_ratio)
    }

    /// Classify a page's native text. Empty text is never sufficient.
    pub fn classify(&self, text: &str) -> TextQuality {
        let trimmed = text.trim();
        let chars = trimmed.chars().count();
        if chars == 0 || chars < self.min_chars {
            return TextQuality::Insufficient(Deficiency::TooShort {
                chars,
                min: self.min_chars,
            });
        }

        let ratio = symbol_ratio(trimmed);
        if ratio > self.max_symbol_ratio {
            return TextQuality::Insufficient(Deficiency::Garbled {
                symbol_ratio: ratio,
                max: self.max_symbol_ratio,
            });
        }

        TextQuality::Sufficient
    }
}

/// Share of non-whitespace characters that are not alphanumeric.
/// Control and replacement characters count as symbols.
pub fn symbol_ratio(text: &str) -> f32 {
    let (symbols, total) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(symbols, total), c| {
            if c.is_alphanumeric() {
                (symbols, total + 1)
            } else {
                (symbols + 1, total + 1)
            }
        });

    if total == 0 {
        0.0
    } else {
        symbols as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classifier() -> TextClassifier {
        TextClassifier::new(10, 0.5)
    }

    #[rstest]
    #[case("", false)]
    #[case("   \n\t  ", false)]
    #[case("123456789", false)]
    #[case("1234567890", true)]
    #[case("  1234567890  ", true)]
    #[case("Estimated Attendance: 12000", true)]
    #[case("\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}ab", false)]
    #[case("!@#$%^&*()_+abcd", false)]
    #[case("!@#$%abcde", true)]
    #[case("\u{1}\u{2}\u{3}\u{4}\u{5}\u{6}abcd", false)]
    #[case("Größe: 12 Einheiten", true)]
    fn test_classify(#[case] text: &str, #[case] sufficient: bool) {
        assert_eq!(classifier().classify(text).is_sufficient(), sufficient, "{:?}", text);
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // 10 characters, 20 bytes
        let text = "éééééééééé";
        assert!(classifier().classify(text).is_sufficient());
        assert!(!classifier().classify(&text[..18]).is_sufficient());
    }

    #[test]
    fn test_empty_text_rejected_even_with_zero_threshold() {
        let lenient = TextClassifier::new(0, 1.0);
        assert_eq!(
            lenient.classify(""),
            TextQuality::Insufficient(Deficiency::TooShort { chars: 0, min: 0 })
        );
        assert!(lenient.classify("x").is_sufficient());
    }

    #[test]
    fn test_deficiency_reports_ratio() {
        match classifier().classify("%%%%%%%%ab") {
            TextQuality::Insufficient(Deficiency::Garbled { symbol_ratio, max }) => {
                assert!((symbol_ratio - 0.8).abs() < 1e-6);
                assert_eq!(max, 0.5);
            }
            other => panic!("expected garbled, got {:?}", other),
        }
    }

    #[test]
    fn test_symbol_ratio() {
        assert_eq!(symbol_ratio(""), 0.0);
        assert_eq!(symbol_ratio("    "), 0.0);
        assert_eq!(symbol_ratio("ab.."), 0.5);
        assert_eq!(symbol_ratio("a b c"), 0.0);
    }
}
