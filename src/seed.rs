// City seed import: the only out-of-band write path into the catalogue.
// Accepts the bootstrap file as JSON (an array) or CSV with a header row;
// bad rows are reported and skipped, never fatal.

use std::path::Path;

use serde::Deserialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::errors::{DatabaseError, ValidationError};
use crate::repository::cities::CityRepo;
use crate::types::{Banana, City, CityStatus, Vendor};

#[derive(Debug, Deserialize)]
pub struct SeedCity {
    pub name: String,
    pub state: String,
    pub vendor: String,
    pub slug: String,
    #[serde(default)]
    pub county: Option<String>,
    /// JSON: an array. CSV: a single `;`-separated field.
    #[serde(default)]
    pub zipcodes: Option<ZipcodeField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ZipcodeField {
    List(Vec<String>),
    Joined(String),
}

impl ZipcodeField {
    fn into_list(self) -> Vec<String> {
        match self {
            ZipcodeField::List(list) => list,
            ZipcodeField::Joined(joined) => joined
                .split([';', '|'])
                .map(str::trim)
                .filter(|z| !z.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<String>,
}

/// Import a seed file, upserting each valid city.
pub async fn import_cities(pool: &PgPool, path: &Path) -> Result<ImportReport, DatabaseError> {
    let rows = read_seed_file(path)
        .map_err(|e| DatabaseError::Integrity(format!("seed file unreadable: {e}")))?;

    let mut report = ImportReport::default();
    let mut conn = pool.acquire().await?;
    for (index, row) in rows.into_iter().enumerate() {
        match seed_to_city(row) {
            Ok(city) => {
                CityRepo::add_city(&mut conn, &city).await?;
                report.imported += 1;
            }
            Err(e) => {
                warn!(row = index + 1, error = %e, "skipping seed row");
                report.skipped.push(format!("row {}: {e}", index + 1));
            }
        }
    }
    info!(
        imported = report.imported,
        skipped = report.skipped.len(),
        "city seed import finished"
    );
    Ok(report)
}

fn read_seed_file(path: &Path) -> anyhow::Result<Vec<SeedCity>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    } else {
        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for result in reader.deserialize() {
            let row: SeedCity = result?;
            rows.push(row);
        }
        Ok(rows)
    }
}

fn seed_to_city(seed: SeedCity) -> Result<City, ValidationError> {
    let vendor: Vendor = seed.vendor.parse()?;
    let banana = Banana::derive(&seed.name, &seed.state)?;
    if seed.slug.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "slug",
            reason: "empty".into(),
        });
    }
    Ok(City {
        banana,
        name: seed.name.trim().to_string(),
        state: seed.state.trim().to_ascii_uppercase(),
        vendor,
        slug: seed.slug.trim().to_string(),
        county: seed.county.filter(|c| !c.trim().is_empty()),
        status: CityStatus::Active,
        last_sync_at: None,
        zipcodes: seed.zipcodes.map(ZipcodeField::into_list).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn json_seed_rows_become_cities() {
        let seed: Vec<SeedCity> = serde_json::from_str(
            r#"[{"name": "Palo Alto", "state": "CA", "vendor": "primegov",
                 "slug": "cityofpaloalto", "zipcodes": ["94301", "94306"]}]"#,
        )
        .unwrap();
        let city = seed_to_city(seed.into_iter().next().unwrap()).unwrap();
        assert_eq!(city.banana.as_str(), "paloaltoCA");
        assert_eq!(city.vendor, Vendor::PrimeGov);
        assert_eq!(city.zipcodes, vec!["94301", "94306"]);
    }

    #[test]
    fn csv_seed_rows_parse_with_joined_zipcodes() {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "name,state,vendor,slug,county,zipcodes").unwrap();
        writeln!(file, "Nashville,TN,legistar,nashville,Davidson,37201;37203").unwrap();
        let rows = read_seed_file(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
        let city = seed_to_city(rows.into_iter().next().unwrap()).unwrap();
        assert_eq!(city.banana.as_str(), "nashvilleTN");
        assert_eq!(city.zipcodes, vec!["37201", "37203"]);
        assert_eq!(city.county.as_deref(), Some("Davidson"));
    }

    #[test]
    fn unknown_vendors_are_rejected_per_row() {
        let seed = SeedCity {
            name: "Springfield".into(),
            state: "IL".into(),
            vendor: "faxmachine".into(),
            slug: "springfield".into(),
            county: None,
            zipcodes: None,
        };
        assert!(seed_to_city(seed).is_err());
    }
}
