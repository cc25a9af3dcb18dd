// Deterministic matter id generation.
//
// Every id is `{banana}_{first 16 hex chars of SHA-256}`, hashed over the
// byte sequence `{banana}|{tier}|{canonical}` where tier is one of `file`,
// `vendor`, `title`. The tier token makes cross-tier collisions impossible
// and the banana prefix scopes ids per city: Nashville's BL2025-1098 and
// Memphis's BL2025-1098 are distinct matters.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::types::Banana;

/// Reading/reintroduction prefixes stripped during title normalisation.
static READING_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*((first|second|third|fourth|1st|2nd|3rd|4th)\s+(reading|read)|reintroduced|re-introduced|substitute)\s*[:\-]?\s*",
    )
    .expect("reading prefix regex compiles")
});

/// Titles that never identify a matter, normalised form. These agenda
/// fixtures recur at every meeting and must stay unique items.
const EXCLUDED_TITLES: &[&str] = &[
    "public comment",
    "public comments",
    "staff comments",
    "closed session",
    "open forum",
    "roll call",
    "call to order",
    "adjournment",
    "approval of minutes",
    "approval of the minutes",
    "pledge of allegiance",
    "announcements",
    "consent calendar",
];

/// Minimum length for a normalised title to be identifying.
const MIN_TITLE_LEN: usize = 30;

/// Generate a matter id using the three-tier fallback: public legislative
/// number, then vendor matter id, then normalised title. Returns `None`
/// when no tier yields an identifying value -- such items are always
/// treated as unique.
pub fn generate_matter_id(
    banana: &Banana,
    matter_file: Option<&str>,
    matter_id: Option<&str>,
    title: Option<&str>,
) -> Option<String> {
    if let Some(file) = matter_file.map(str::trim).filter(|f| !f.is_empty()) {
        return Some(hash_id(banana, "file", &file.to_uppercase()));
    }
    if let Some(vendor_id) = matter_id.map(str::trim).filter(|v| !v.is_empty()) {
        return Some(hash_id(banana, "vendor", vendor_id));
    }
    let normalised = normalize_title(title?);
    if normalised.len() < MIN_TITLE_LEN || EXCLUDED_TITLES.contains(&normalised.as_str()) {
        return None;
    }
    Some(hash_id(banana, "title", &normalised))
}

/// Tier-3 title normalisation: strip reading prefixes (repeatedly, so
/// "SECOND READING: REINTRODUCED ..." collapses fully), squeeze
/// whitespace, lowercase. District prefixes are deliberately left in
/// place; collapsing them risks merging distinct matters.
pub fn normalize_title(title: &str) -> String {
    let mut rest = title.trim().to_string();
    loop {
        let stripped = READING_PREFIX.replace(&rest, "").into_owned();
        if stripped == rest {
            break;
        }
        rest = stripped;
    }
    rest.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn hash_id(banana: &Banana, tier: &str, canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(banana.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(tier.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}_{}", banana.as_str(), &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn banana(raw: &str) -> Banana {
        Banana::parse(raw).unwrap()
    }

    #[test]
    fn tier1_is_deterministic_and_case_insensitive() {
        let nashville = banana("nashvilleTN");
        let a = generate_matter_id(&nashville, Some("BL2025-1098"), None, None).unwrap();
        let b = generate_matter_id(&nashville, Some("  bl2025-1098 "), None, None).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("nashvilleTN_"));
        assert_eq!(a.len(), "nashvilleTN_".len() + 16);
    }

    #[test]
    fn ids_are_scoped_by_city() {
        let nashville = generate_matter_id(&banana("nashvilleTN"), Some("X"), None, None).unwrap();
        let memphis = generate_matter_id(&banana("memphisTN"), Some("X"), None, None).unwrap();
        assert_ne!(nashville, memphis);
    }

    #[test]
    fn tiers_never_collide() {
        let city = banana("paloaltoCA");
        let by_file = generate_matter_id(&city, Some("2025-42"), None, None).unwrap();
        let by_vendor = generate_matter_id(&city, None, Some("2025-42"), None).unwrap();
        assert_ne!(by_file, by_vendor);
    }

    #[test]
    fn tier_priority_prefers_matter_file() {
        let city = banana("paloaltoCA");
        let with_both =
            generate_matter_id(&city, Some("BL-1"), Some("uuid-xyz"), Some("a long enough title here"))
                .unwrap();
        let file_only = generate_matter_id(&city, Some("BL-1"), None, None).unwrap();
        assert_eq!(with_both, file_only);
    }

    #[test]
    fn title_normalisation_strips_reading_prefixes() {
        assert_eq!(
            normalize_title("FIRST READING: An ordinance amending Title 17"),
            "an ordinance amending title 17"
        );
        assert_eq!(
            normalize_title("SECOND READ - An   ordinance amending Title 17"),
            "an ordinance amending title 17"
        );
        assert_eq!(
            normalize_title("REINTRODUCED: FIRST READING: An ordinance amending Title 17"),
            "an ordinance amending title 17"
        );
    }

    #[test]
    fn two_readings_share_one_id() {
        let city = banana("nashvilleTN");
        let first = generate_matter_id(
            &city,
            None,
            None,
            Some("FIRST READING: An ordinance amending Title 17 of the code"),
        );
        let second = generate_matter_id(
            &city,
            None,
            None,
            Some("SECOND READING: An ordinance amending Title 17 of the code"),
        );
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn boilerplate_and_short_titles_produce_no_id() {
        let city = banana("nashvilleTN");
        assert_eq!(generate_matter_id(&city, None, None, Some("Public Comment")), None);
        assert_eq!(generate_matter_id(&city, None, None, Some("Roll Call")), None);
        assert_eq!(generate_matter_id(&city, None, None, Some("Short title")), None);
    }

    #[test]
    fn district_prefix_is_left_in_place() {
        let city = banana("nashvilleTN");
        let with_district = generate_matter_id(
            &city,
            None,
            None,
            Some("District 3: Sidewalk repair program for the fiscal year"),
        );
        let without = generate_matter_id(
            &city,
            None,
            None,
            Some("Sidewalk repair program for the fiscal year"),
        );
        assert_ne!(with_district, without);
    }
}
