//! Fuzzy field-keyword matching over extracted page text
//!
//! For every configured keyword the last line of the page whose fuzzy
//! partial-match score reaches the threshold is reported. OCR output is noisy
//! ("Estimated Attendence", "Capac1ty"), so exact search is not enough.

use rmcp::schemars::JsonSchema;
use serde::Serialize;

/// A keyword and the page line it matched
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct KeywordMatch {
    pub keyword: String,
    pub line: String,
}

/// Match keywords against the lines of `text`.
///
/// Results follow the order of `keywords`; keywords without a match are
/// omitted. When several lines match, the last one wins.
pub fn extract_keywords(text: &str, keywords: &[String], threshold: u8) -> Vec<KeywordMatch> {
    let lines: Vec<(Vec<char>, &str)> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| (l.to_lowercase().chars().collect(), l))
        .collect();

    keywords
        .iter()
        .filter_map(|keyword| {
            let needle: Vec<char> = keyword.to_lowercase().chars().collect();
            lines
                .iter()
                .rev()
                .find(|(lower, _)| partial_ratio(&needle, lower) >= f64::from(threshold))
                .map(|(_, line)| KeywordMatch {
                    keyword: keyword.clone(),
                    line: line.to_string(),
                })
        })
        .collect()
}

/// Best [`ratio`] between the shorter sequence and any equally long window
/// of the longer one, 0-100.
pub fn partial_ratio(a: &[char], b: &[char]) -> f64 {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0.0;
    }

    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let score = ratio(short, window);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

/// Normalized Indel similarity, 0-100: `2 * lcs / (len_a + len_b)`
pub fn ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(&chars("abc"), &chars("abc")), 100.0);
        assert_eq!(ratio(&chars("abc"), &chars("xyz")), 0.0);
        assert_eq!(ratio(&chars(""), &chars("")), 100.0);
        assert!((ratio(&chars("abcd"), &chars("abxd")) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_ratio_finds_substring() {
        let score = partial_ratio(&chars("capacity"), &chars("venue capacity: 5000 seats"));
        assert_eq!(score, 100.0);
        assert_eq!(partial_ratio(&chars(""), &chars("anything")), 0.0);
    }

    #[test]
    fn test_extract_keywords_tolerates_ocr_noise() {
        let text = "EVENT SUMMARY\nEstimated Attendence: 12,000\nParking Capac1ty 800\n";
        let keywords = vec![
            "Estimated Attendance".to_string(),
            "Parking Capacity".to_string(),
            "Celebrity Arrival".to_string(),
        ];

        let matches = extract_keywords(text, &keywords, 70);
        assert_eq!(
            matches,
            vec![
                KeywordMatch {
                    keyword: "Estimated Attendance".to_string(),
                    line: "Estimated Attendence: 12,000".to_string(),
                },
                KeywordMatch {
                    keyword: "Parking Capacity".to_string(),
                    line: "Parking Capac1ty 800".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_last_matching_line_wins() {
        let text = "Capacity: draft\nnotes\nCapacity: 5000";
        let matches = extract_keywords(text, &["Capacity".to_string()], 90);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line, "Capacity: 5000");
    }

    #[test]
    fn test_no_keywords_no_matches() {
        assert!(extract_keywords("Capacity: 5000", &[], 70).is_empty());
        assert!(extract_keywords("", &["Capacity".to_string()], 70).is_empty());
    }
}
