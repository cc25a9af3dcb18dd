// City catalogue store. Cities are written by the seed importer and read
// by everything else; `last_sync_at` is the conductor's freshness marker.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::errors::DatabaseError;
use crate::types::{Banana, City, CityStatus, Vendor};

#[derive(Debug, Clone, sqlx::FromRow)]
struct CityRow {
    banana: String,
    name: String,
    state: String,
    vendor: String,
    slug: String,
    county: Option<String>,
    status: String,
    last_sync_at: Option<DateTime<Utc>>,
}

const CITY_COLUMNS: &str =
    "banana, name, state, vendor, slug, county, status, last_sync_at";

/// The unified lookup: callers pass the most specific key they hold.
#[derive(Debug, Clone)]
pub enum CityLookup<'a> {
    Banana(&'a Banana),
    VendorSlug { vendor: Vendor, slug: &'a str },
    Zipcode(&'a str),
    NameState { name: &'a str, state: &'a str },
}

#[derive(Debug, Clone, Default)]
pub struct CityFilters {
    pub vendor: Option<Vendor>,
    pub state: Option<String>,
    pub status: Option<CityStatus>,
}

pub struct CityRepo;

impl CityRepo {
    /// Idempotent upsert of a city and its zipcodes.
    #[instrument(skip(conn, city), fields(banana = %city.banana))]
    pub async fn add_city(conn: &mut PgConnection, city: &City) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO cities (banana, name, state, vendor, slug, county, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (banana)
            DO UPDATE SET
                vendor = EXCLUDED.vendor,
                slug = EXCLUDED.slug,
                county = COALESCE(EXCLUDED.county, cities.county),
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(city.banana.as_str())
        .bind(&city.name)
        .bind(&city.state)
        .bind(city.vendor.as_str())
        .bind(&city.slug)
        .bind(&city.county)
        .bind(city.status.as_str())
        .execute(&mut *conn)
        .await?;

        for (index, zipcode) in city.zipcodes.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO zipcodes (banana, zipcode, is_primary)
                VALUES ($1, $2, $3)
                ON CONFLICT (banana, zipcode) DO UPDATE SET is_primary = EXCLUDED.is_primary
                "#,
            )
            .bind(city.banana.as_str())
            .bind(zipcode)
            .bind(index == 0)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Fetch one city by whichever key the caller has.
    #[instrument(skip(conn, lookup))]
    pub async fn get_city(
        conn: &mut PgConnection,
        lookup: CityLookup<'_>,
    ) -> Result<Option<City>, DatabaseError> {
        let row: Option<CityRow> = match lookup {
            CityLookup::Banana(banana) => {
                sqlx::query_as(&format!(
                    "SELECT {CITY_COLUMNS} FROM cities WHERE banana = $1"
                ))
                .bind(banana.as_str())
                .fetch_optional(&mut *conn)
                .await?
            }
            CityLookup::VendorSlug { vendor, slug } => {
                sqlx::query_as(&format!(
                    "SELECT {CITY_COLUMNS} FROM cities WHERE vendor = $1 AND slug = $2"
                ))
                .bind(vendor.as_str())
                .bind(slug)
                .fetch_optional(&mut *conn)
                .await?
            }
            CityLookup::Zipcode(zipcode) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {CITY_COLUMNS} FROM cities
                    WHERE banana IN (SELECT banana FROM zipcodes WHERE zipcode = $1)
                    ORDER BY banana LIMIT 1
                    "#
                ))
                .bind(zipcode)
                .fetch_optional(&mut *conn)
                .await?
            }
            CityLookup::NameState { name, state } => {
                sqlx::query_as(&format!(
                    "SELECT {CITY_COLUMNS} FROM cities WHERE LOWER(name) = LOWER($1) AND state = UPPER($2)"
                ))
                .bind(name)
                .bind(state)
                .fetch_optional(&mut *conn)
                .await?
            }
        };

        match row {
            Some(row) => Ok(Some(Self::hydrate(conn, row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(conn, filters))]
    pub async fn get_cities(
        conn: &mut PgConnection,
        filters: &CityFilters,
    ) -> Result<Vec<City>, DatabaseError> {
        let rows: Vec<CityRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CITY_COLUMNS} FROM cities
            WHERE ($1::text IS NULL OR vendor = $1)
              AND ($2::text IS NULL OR state = UPPER($2))
              AND ($3::text IS NULL OR status = $3)
            ORDER BY banana
            "#
        ))
        .bind(filters.vendor.map(|v| v.as_str()))
        .bind(filters.state.as_deref())
        .bind(filters.status.map(|s| s.as_str()))
        .fetch_all(&mut *conn)
        .await?;

        let mut cities = Vec::with_capacity(rows.len());
        for row in rows {
            cities.push(Self::hydrate(conn, row).await?);
        }
        Ok(cities)
    }

    /// Active cities whose last successful sync is older than the cutoff
    /// (or that never synced).
    #[instrument(skip(conn))]
    pub async fn cities_needing_sync(
        conn: &mut PgConnection,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<City>, DatabaseError> {
        let rows: Vec<CityRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CITY_COLUMNS} FROM cities
            WHERE status = 'active'
              AND (last_sync_at IS NULL OR last_sync_at < $1)
            ORDER BY last_sync_at ASC NULLS FIRST
            "#
        ))
        .bind(older_than)
        .fetch_all(&mut *conn)
        .await?;

        let mut cities = Vec::with_capacity(rows.len());
        for row in rows {
            cities.push(Self::hydrate(conn, row).await?);
        }
        Ok(cities)
    }

    #[instrument(skip(conn))]
    pub async fn mark_synced(
        conn: &mut PgConnection,
        banana: &Banana,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE cities SET last_sync_at = $2, updated_at = NOW() WHERE banana = $1")
            .bind(banana.as_str())
            .bind(at)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn hydrate(conn: &mut PgConnection, row: CityRow) -> Result<City, DatabaseError> {
        let zipcodes: Vec<String> = sqlx::query_scalar(
            "SELECT zipcode FROM zipcodes WHERE banana = $1 ORDER BY is_primary DESC, zipcode",
        )
        .bind(&row.banana)
        .fetch_all(conn)
        .await?;

        Ok(City {
            banana: Banana::parse(&row.banana)
                .map_err(|e| DatabaseError::Integrity(e.to_string()))?,
            name: row.name,
            state: row.state,
            vendor: row
                .vendor
                .parse()
                .map_err(|e: crate::errors::ValidationError| DatabaseError::Integrity(e.to_string()))?,
            slug: row.slug,
            county: row.county,
            status: if row.status == "inactive" {
                CityStatus::Inactive
            } else {
                CityStatus::Active
            },
            last_sync_at: row.last_sync_at,
            zipcodes,
        })
    }
}
