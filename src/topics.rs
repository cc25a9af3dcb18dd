// Topic taxonomy and normalisation.
// The 16 canonical tags and their synonym table ship as a versioned data
// file (data/topics.toml) so the taxonomy can evolve without code changes.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

const TAXONOMY_TOML: &str = include_str!("../data/topics.toml");

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    version: u32,
    tags: Vec<String>,
    synonyms: HashMap<String, String>,
}

/// Loaded taxonomy: ordered canonical tags plus the synonym lookup.
#[derive(Debug)]
pub struct Taxonomy {
    version: u32,
    tags: Vec<String>,
    /// canonical tag -> position, the tiebreak order for aggregation
    order: HashMap<String, usize>,
    synonyms: HashMap<String, String>,
}

static TAXONOMY: Lazy<Taxonomy> = Lazy::new(|| {
    let file: TaxonomyFile =
        toml::from_str(TAXONOMY_TOML).expect("embedded topics.toml is valid");
    let order = file
        .tags
        .iter()
        .enumerate()
        .map(|(i, t)| (t.clone(), i))
        .collect();
    Taxonomy {
        version: file.version,
        tags: file.tags,
        order,
        synonyms: file.synonyms,
    }
});

pub fn taxonomy() -> &'static Taxonomy {
    &TAXONOMY
}

impl Taxonomy {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_canonical(&self, tag: &str) -> bool {
        self.order.contains_key(tag)
    }

    fn rank(&self, tag: &str) -> usize {
        self.order.get(tag).copied().unwrap_or(usize::MAX)
    }

    /// Map one free-form topic string to a canonical tag. Unknown strings
    /// are dropped (`None`) -- more informative than a catch-all bucket.
    pub fn normalize(&self, raw: &str) -> Option<&str> {
        let folded = casefold(raw);
        if folded.is_empty() {
            return None;
        }
        // Accept canonical tags spelled with spaces or underscores.
        let as_tag = folded.replace(' ', "_");
        if let Some((tag, _)) = self.order.get_key_value(as_tag.as_str()) {
            return Some(tag.as_str());
        }
        self.synonyms.get(folded.as_str()).map(|s| s.as_str())
    }

    /// Normalize a whole list: unknowns dropped, duplicates removed,
    /// input order preserved.
    pub fn normalize_all<S: AsRef<str>>(&self, raw: &[S]) -> Vec<String> {
        let mut seen = Vec::new();
        for value in raw {
            if let Some(tag) = self.normalize(value.as_ref()) {
                if !seen.iter().any(|s| s == tag) {
                    seen.push(tag.to_string());
                }
            }
        }
        seen
    }

    /// Aggregate item-level topic lists to the meeting level: sorted by
    /// frequency across items (descending), ties broken by taxonomy order.
    pub fn aggregate<S: AsRef<str>>(&self, per_item: &[Vec<S>]) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for topics in per_item {
            for topic in topics {
                let topic = topic.as_ref();
                if self.is_canonical(topic) {
                    *counts.entry(topic).or_insert(0) += 1;
                }
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|(a_tag, a_n), (b_tag, b_n)| {
            b_n.cmp(a_n).then_with(|| self.rank(a_tag).cmp(&self.rank(b_tag)))
        });
        ranked.into_iter().map(|(tag, _)| tag.to_string()).collect()
    }
}

/// Lowercase and strip punctuation, collapsing runs of whitespace.
fn casefold(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_space = true;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if (c.is_whitespace() || c == '-' || c == '_' || c == '/') && !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn taxonomy_has_sixteen_tags() {
        assert_eq!(taxonomy().tags().len(), 16);
        assert!(taxonomy().is_canonical("housing"));
        assert!(taxonomy().is_canonical("other"));
    }

    #[test]
    fn synonyms_map_to_canonical_tags() {
        let t = taxonomy();
        assert_eq!(t.normalize("affordable housing"), Some("housing"));
        assert_eq!(t.normalize("Affordable Housing!"), Some("housing"));
        assert_eq!(t.normalize("Public Safety"), Some("public_safety"));
        assert_eq!(t.normalize("rezoning"), Some("zoning"));
    }

    #[test]
    fn unknown_topics_are_dropped_not_bucketed() {
        assert_eq!(taxonomy().normalize("alien technology"), None);
        assert_eq!(taxonomy().normalize(""), None);
    }

    #[test]
    fn normalize_all_dedupes_and_preserves_order() {
        let topics = taxonomy().normalize_all(&[
            "rezoning",
            "affordable housing",
            "zoning amendment",
            "alien technology",
        ]);
        assert_eq!(topics, vec!["zoning", "housing"]);
    }

    #[test]
    fn aggregation_sorts_by_frequency_then_taxonomy_order() {
        let per_item = vec![
            vec!["housing", "budget"],
            vec!["budget"],
            vec!["zoning", "budget"],
            vec!["zoning"],
        ];
        let aggregated = taxonomy().aggregate(&per_item);
        // budget appears 3x, zoning 2x, housing 1x
        assert_eq!(aggregated, vec!["budget", "zoning", "housing"]);

        // Frequency tie between housing and zoning resolves by taxonomy
        // order (housing first).
        let tied = vec![vec!["zoning"], vec!["housing"]];
        assert_eq!(taxonomy().aggregate(&tied), vec!["housing", "zoning"]);
    }
}
