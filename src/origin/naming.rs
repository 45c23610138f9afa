//! Filename strategies
//!
//! Logical filenames stored in application data do not always match the
//! object names in the bucket. Each strategy proposes one alternative
//! spelling; the fetcher tries them in order until the origin answers.
//! New filename families are added by appending a strategy, not by touching
//! the fetch loop.

/// One way of turning a logical filename into a stored object name
pub trait NameStrategy: Send + Sync + std::fmt::Debug {
    /// Short label used in logs
    fn label(&self) -> &'static str;

    /// Candidate object name, or None if the strategy does not apply
    fn candidate(&self, logical_filename: &str) -> Option<String>;
}

/// The logical filename, unchanged
#[derive(Debug, Default)]
pub struct AsGiven;

impl NameStrategy for AsGiven {
    fn label(&self) -> &'static str {
        "as_given"
    }

    fn candidate(&self, logical_filename: &str) -> Option<String> {
        Some(logical_filename.to_string())
    }
}

/// Underscores replaced by spaces, for filename families whose objects were
/// uploaded with spaces but are referenced with underscores
#[derive(Debug)]
pub struct UnderscoresToSpaces {
    prefixes: Vec<String>,
}

impl UnderscoresToSpaces {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }
}

impl NameStrategy for UnderscoresToSpaces {
    fn label(&self) -> &'static str {
        "underscores_to_spaces"
    }

    fn candidate(&self, logical_filename: &str) -> Option<String> {
        let matches_family = self
            .prefixes
            .iter()
            .any(|prefix| logical_filename.starts_with(prefix.as_str()));
        if !matches_family || !logical_filename.contains('_') {
            return None;
        }
        Some(logical_filename.replace('_', " "))
    }
}

/// The percent-decoded filename, for references that were stored already
/// encoded (`my%20clip.mp4`) and would otherwise be encoded twice
#[derive(Debug, Default)]
pub struct PercentDecoded;

impl NameStrategy for PercentDecoded {
    fn label(&self) -> &'static str {
        "percent_decoded"
    }

    fn candidate(&self, logical_filename: &str) -> Option<String> {
        if !has_percent_escape(logical_filename) {
            return None;
        }
        urlencoding::decode(logical_filename)
            .ok()
            .map(|decoded| decoded.into_owned())
    }
}

fn has_percent_escape(s: &str) -> bool {
    s.as_bytes()
        .windows(3)
        .any(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
}

/// Strategies in priority order: exact name, space substitution for the
/// configured prefixes, then percent-decoding
pub fn default_strategies(space_substitution_prefixes: &[String]) -> Vec<Box<dyn NameStrategy>> {
    vec![
        Box::new(AsGiven),
        Box::new(UnderscoresToSpaces::new(space_substitution_prefixes.to_vec())),
        Box::new(PercentDecoded),
    ]
}

/// Whether `object_name` contains a `.` or `..` path segment.
///
/// URL parsers collapse such segments (including `%2e%2e`), so the request
/// would leave the bucket prefix.
pub fn has_dot_segment(object_name: &str) -> bool {
    object_name
        .split('/')
        .any(|segment| segment == "." || segment == "..")
}

/// Ordered, de-duplicated candidate names for a logical filename.
/// Names with dot segments are never proposed.
pub fn candidates(
    strategies: &[Box<dyn NameStrategy>],
    logical_filename: &str,
) -> Vec<(&'static str, String)> {
    let mut out: Vec<(&'static str, String)> = Vec::new();
    for strategy in strategies {
        if let Some(name) = strategy.candidate(logical_filename) {
            if has_dot_segment(&name) {
                tracing::warn!(
                    filename = %logical_filename,
                    strategy = strategy.label(),
                    "Skipping object name with dot segment"
                );
                continue;
            }
            if !out.iter().any(|(_, existing)| existing == &name) {
                out.push((strategy.label(), name));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery() -> Vec<Box<dyn NameStrategy>> {
        default_strategies(&["gallery_".to_string()])
    }

    fn names(logical: &str) -> Vec<String> {
        candidates(&gallery(), logical)
            .into_iter()
            .map(|(_, n)| n)
            .collect()
    }

    #[test]
    fn test_plain_name_has_single_candidate() {
        assert_eq!(names("demo.mp4"), vec!["demo.mp4"]);
    }

    #[test]
    fn test_gallery_name_tries_exact_then_spaces() {
        assert_eq!(
            names("gallery_Our_vitamin_sea_rework_2_compressed.mp4"),
            vec![
                "gallery_Our_vitamin_sea_rework_2_compressed.mp4",
                "gallery Our vitamin sea rework 2 compressed.mp4",
            ]
        );
    }

    #[test]
    fn test_underscores_outside_family_are_left_alone() {
        assert_eq!(names("hero_banner.mp4"), vec!["hero_banner.mp4"]);
    }

    #[test]
    fn test_percent_encoded_name_adds_decoded_candidate() {
        assert_eq!(
            names("my%20clip%20(1).mp4"),
            vec!["my%20clip%20(1).mp4", "my clip (1).mp4"]
        );
    }

    #[test]
    fn test_lone_percent_is_not_an_escape() {
        assert_eq!(names("100%.png"), vec!["100%.png"]);
    }

    #[test]
    fn test_duplicates_are_removed() {
        let strategies: Vec<Box<dyn NameStrategy>> = vec![Box::new(AsGiven), Box::new(AsGiven)];
        assert_eq!(candidates(&strategies, "a.mp4").len(), 1);
    }

    #[test]
    fn test_dot_segments_are_never_candidates() {
        assert!(names("../../authenticated/private/secret.mp4").is_empty());
        assert!(names("./demo.mp4").is_empty());
        assert_eq!(
            names("%2E%2E/%2E%2E/authenticated/secret.mp4"),
            vec!["%2E%2E/%2E%2E/authenticated/secret.mp4"]
        );
    }

    #[test]
    fn test_dots_inside_segments_are_allowed() {
        assert_eq!(names("v1..final.mp4"), vec!["v1..final.mp4"]);
        assert_eq!(names(".hidden/clip.mp4"), vec![".hidden/clip.mp4"]);
    }

    #[test]
    fn test_labels_follow_priority() {
        let labels: Vec<&str> = candidates(&gallery(), "gallery_a%20b.mp4")
            .into_iter()
            .map(|(l, _)| l)
            .collect();
        assert_eq!(
            labels,
            vec!["as_given", "underscores_to_spaces", "percent_decoded"]
        );
    }
}
