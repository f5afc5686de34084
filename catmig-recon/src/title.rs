//! Title verification between a local record and its authority counterpart
//!
//! Both sides are normalized (lowercase, punctuation dropped, whitespace collapsed)
//! and compared with a 0-100 similarity score. Perfect mode compares the strings as
//! they stand; fuzzy mode sorts tokens first so word order does not matter.

use catmig_common::TaggedRecord;

/// Score of an exact match after normalization
pub const PERFECT_SCORE: u8 = 100;

/// Fuzzy threshold when none is configured
pub const DEFAULT_MIN_RATIO: u8 = 50;

/// Comparison mode for one verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Order-sensitive, passes only at [`PERFECT_SCORE`]
    Perfect,
    /// Token-sort ratio, passes at or above `min_ratio`
    Fuzzy { min_ratio: u8 },
}

/// Authority title as shown to people and as compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleParts {
    /// Title proper and remainder (`245 $a $b`)
    pub comparison: String,
    /// Comparison text plus statement of responsibility and part number/name
    pub display: String,
}

impl TitleParts {
    /// Extract from an authority record's title field; `None` without `245 $a`
    pub fn from_record(record: &TaggedRecord) -> Option<Self> {
        let field = record.first(catmig_common::marc::record::TITLE_TAG)?;
        let a = field.subfield('a').filter(|a| !a.trim().is_empty())?;

        let mut comparison = a.trim().to_string();
        if let Some(b) = field.subfield('b') {
            comparison.push(' ');
            comparison.push_str(b.trim());
        }

        let mut display = comparison.clone();
        if let Some(c) = field.subfield('c') {
            display.push(' ');
            display.push_str(c.trim());
        }
        if let Some(n) = field.subfield('n') {
            display.push_str(&format!(" (n: {})", n.trim()));
        }
        if let Some(p) = field.subfield('p') {
            display.push_str(&format!(" (p: {})", p.trim()));
        }

        Some(Self {
            comparison,
            display,
        })
    }
}

/// A comparison that fell short of a perfect score, kept for the title audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleComparison {
    pub local_raw: String,
    pub authority_raw: String,
    pub local_normalized: String,
    pub authority_normalized: String,
    pub score: u8,
    pub passed: bool,
}

/// Outcome of one verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleCheck {
    pub passed: bool,
    pub score: u8,
    /// Present for every non-perfect comparison
    pub comparison: Option<TitleComparison>,
}

impl TitleCheck {
    pub fn is_perfect(&self) -> bool {
        self.passed && self.score == PERFECT_SCORE
    }
}

/// Lowercase, replace punctuation with nothing and collapse whitespace
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '_' {
                Some(c.to_lowercase().collect::<String>())
            } else if c.is_whitespace() {
                Some(" ".to_string())
            } else {
                None
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of two strings scaled to 0-100
///
/// Only identical strings score 100; long strings a few edits apart round down
/// to 99 at most.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a == b {
        return PERFECT_SCORE;
    }
    let score = (strsim::normalized_levenshtein(a, b) * 100.0).round() as u8;
    score.min(PERFECT_SCORE - 1)
}

/// [`ratio`] after sorting each side's tokens
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<_> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Title verifier, configured once per run
#[derive(Debug, Clone, Copy)]
pub struct TitleVerifier {
    title_check: bool,
}

impl TitleVerifier {
    pub fn new(title_check: bool) -> Self {
        Self { title_check }
    }

    /// Compare a local title with the authority's title parts
    ///
    /// Called only once an authority record exists. With checking disabled that is
    /// enough to pass; a record without a title field scores zero.
    pub fn verify(
        &self,
        local_title: Option<&str>,
        authority: Option<&TitleParts>,
        mode: MatchMode,
    ) -> TitleCheck {
        if !self.title_check {
            return TitleCheck {
                passed: true,
                score: PERFECT_SCORE,
                comparison: None,
            };
        }

        let local_raw = local_title.unwrap_or_default();
        let authority_raw = authority.map(|p| p.comparison.as_str()).unwrap_or_default();
        let local_normalized = normalize_title(local_raw);
        let authority_normalized = normalize_title(authority_raw);

        let (score, passed) = if authority.is_none() {
            (0, false)
        } else {
            match mode {
                MatchMode::Perfect => {
                    let score = ratio(&local_normalized, &authority_normalized);
                    (score, local_normalized == authority_normalized)
                }
                MatchMode::Fuzzy { min_ratio } => {
                    let score = token_sort_ratio(&local_normalized, &authority_normalized);
                    (score, score >= min_ratio)
                }
            }
        };

        let comparison = (score != PERFECT_SCORE).then(|| TitleComparison {
            local_raw: local_raw.to_string(),
            authority_raw: authority
                .map(|p| p.display.clone())
                .unwrap_or_default(),
            local_normalized,
            authority_normalized,
            score,
            passed,
        });

        TitleCheck {
            passed,
            score,
            comparison,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(comparison: &str) -> TitleParts {
        TitleParts {
            comparison: comparison.to_string(),
            display: comparison.to_string(),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_title("The Catcher in the Rye /"), "the catcher in the rye");
        assert_eq!(normalize_title("  Dune :  a   novel. "), "dune a novel");
        assert_eq!(normalize_title("J.D.'s"), "jds");
    }

    #[test]
    fn test_perfect_ignores_punctuation_and_case() {
        let verifier = TitleVerifier::new(true);
        let check = verifier.verify(
            Some("The Catcher in the Rye."),
            Some(&parts("the catcher in the rye /")),
            MatchMode::Perfect,
        );
        assert!(check.is_perfect());
        assert!(check.comparison.is_none());
    }

    #[test]
    fn test_perfect_is_order_sensitive() {
        let verifier = TitleVerifier::new(true);
        let check = verifier.verify(
            Some("rye the catcher"),
            Some(&parts("the catcher rye")),
            MatchMode::Perfect,
        );
        assert!(!check.passed);
        assert!(check.comparison.is_some());
    }

    #[test]
    fn test_long_titles_one_edit_apart_are_not_perfect() {
        let stem = "a very long serial title that keeps going ".repeat(6);
        let local = format!("{stem}x");
        let authority = format!("{stem}y");
        assert!(local.len() > 250);

        let verifier = TitleVerifier::new(true);
        let check = verifier.verify(Some(&local), Some(&parts(&authority)), MatchMode::Perfect);
        assert!(!check.passed);
        assert!(!check.is_perfect());
        assert_eq!(check.score, 99);
        assert!(check.comparison.is_some());

        let fuzzy = verifier.verify(
            Some(&local),
            Some(&parts(&authority)),
            MatchMode::Fuzzy { min_ratio: 50 },
        );
        assert!(fuzzy.passed);
        assert!(!fuzzy.is_perfect());
    }

    #[test]
    fn test_fuzzy_sorts_tokens() {
        let verifier = TitleVerifier::new(true);
        let check = verifier.verify(
            Some("rye the catcher"),
            Some(&parts("the catcher rye")),
            MatchMode::Fuzzy { min_ratio: 50 },
        );
        assert_eq!(check.score, 100);
        assert!(check.passed);
    }

    #[test]
    fn test_fuzzy_threshold() {
        let verifier = TitleVerifier::new(true);
        let check = verifier.verify(
            Some("Gardening basics"),
            Some(&parts("Quantum chromodynamics")),
            MatchMode::Fuzzy { min_ratio: 50 },
        );
        assert!(!check.passed);
        assert!(check.score < 50);
        assert_eq!(check.comparison.unwrap().score, check.score);
    }

    #[test]
    fn test_missing_authority_title_scores_zero() {
        let verifier = TitleVerifier::new(true);
        let check = verifier.verify(Some("Anything"), None, MatchMode::Fuzzy { min_ratio: 0 });
        assert_eq!(check.score, 0);
        assert!(!check.passed);
    }

    #[test]
    fn test_disabled_check_passes() {
        let verifier = TitleVerifier::new(false);
        let check = verifier.verify(None, None, MatchMode::Perfect);
        assert!(check.is_perfect());
    }

    #[test]
    fn test_title_parts_display() {
        let record = TaggedRecord::with_fields(
            catmig_common::Leader::default(),
            vec![catmig_common::TaggedField::data(
                "245",
                ['1', '0'],
                vec![
                    catmig_common::Subfield::new('a', "Collected works :"),
                    catmig_common::Subfield::new('b', "essays /"),
                    catmig_common::Subfield::new('c', "A. Author."),
                    catmig_common::Subfield::new('n', "Part 2,"),
                ],
            )],
        );
        let parts = TitleParts::from_record(&record).unwrap();
        assert_eq!(parts.comparison, "Collected works : essays /");
        assert_eq!(
            parts.display,
            "Collected works : essays / A. Author. (n: Part 2,)"
        );
    }
}
