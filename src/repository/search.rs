// Read-side search: full text over meetings, items, and matters, plus the
// two special-cased query shapes residents actually type -- zipcodes and
// state names -- which resolve through the city catalogue.

use chrono::NaiveDateTime;
use sqlx::PgConnection;
use tracing::instrument;

use crate::errors::DatabaseError;
use crate::types::Banana;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub banana: Option<Banana>,
    pub topic: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            banana: None,
            topic: None,
            limit: 20,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CityHit {
    pub banana: String,
    pub name: String,
    pub state: String,
    pub meeting_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeetingHit {
    pub id: String,
    pub banana: String,
    pub title: String,
    pub date: Option<NaiveDateTime>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemHit {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatterHit {
    pub id: String,
    pub banana: String,
    pub title: String,
    pub matter_file: Option<String>,
    pub appearance_count: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub cities: Vec<CityHit>,
    pub meetings: Vec<MeetingHit>,
    pub items: Vec<ItemHit>,
    pub matters: Vec<MatterHit>,
}

pub struct SearchRepo;

impl SearchRepo {
    /// Dispatch on query shape: zipcode, state name, or free text.
    #[instrument(skip(conn, query), fields(q = %query.query))]
    pub async fn search(
        conn: &mut PgConnection,
        query: &SearchQuery,
    ) -> Result<SearchResults, DatabaseError> {
        let trimmed = query.query.trim();

        if is_zipcode(trimmed) {
            return Self::search_by_zipcode(conn, trimmed, query).await;
        }
        if let Some(state_code) = state_code_for_name(trimmed) {
            return Self::search_by_state(conn, state_code, query).await;
        }
        Self::full_text(conn, query).await
    }

    async fn search_by_zipcode(
        conn: &mut PgConnection,
        zipcode: &str,
        query: &SearchQuery,
    ) -> Result<SearchResults, DatabaseError> {
        let cities: Vec<CityHit> = sqlx::query_as(
            r#"
            SELECT c.banana, c.name, c.state,
                   (SELECT COUNT(*) FROM meetings m WHERE m.banana = c.banana) AS meeting_count
            FROM cities c
            JOIN zipcodes z ON z.banana = c.banana
            WHERE z.zipcode = $1
            ORDER BY c.banana
            "#,
        )
        .bind(zipcode)
        .fetch_all(&mut *conn)
        .await?;

        let mut meetings = Vec::new();
        for city in &cities {
            let rows: Vec<MeetingHit> = sqlx::query_as(
                r#"
                SELECT id, banana, title, date, summary
                FROM meetings
                WHERE banana = $1
                ORDER BY date DESC NULLS LAST
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(&city.banana)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&mut *conn)
            .await?;
            meetings.extend(rows);
        }

        Ok(SearchResults {
            cities,
            meetings,
            ..SearchResults::default()
        })
    }

    async fn search_by_state(
        conn: &mut PgConnection,
        state_code: &str,
        query: &SearchQuery,
    ) -> Result<SearchResults, DatabaseError> {
        let cities: Vec<CityHit> = sqlx::query_as(
            r#"
            SELECT c.banana, c.name, c.state,
                   (SELECT COUNT(*) FROM meetings m WHERE m.banana = c.banana) AS meeting_count
            FROM cities c
            WHERE c.state = $1
            ORDER BY c.name
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(state_code)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(conn)
        .await?;

        Ok(SearchResults {
            cities,
            ..SearchResults::default()
        })
    }

    async fn full_text(
        conn: &mut PgConnection,
        query: &SearchQuery,
    ) -> Result<SearchResults, DatabaseError> {
        let banana = query.banana.as_ref().map(|b| b.as_str());

        let meetings: Vec<MeetingHit> = sqlx::query_as(
            r#"
            SELECT id, banana, title, date, summary
            FROM meetings
            WHERE to_tsvector('english', title || ' ' || COALESCE(summary, ''))
                      @@ plainto_tsquery('english', $1)
              AND ($2::text IS NULL OR banana = $2)
              AND ($3::text IS NULL OR EXISTS (
                    SELECT 1 FROM meeting_topics t
                    WHERE t.meeting_id = meetings.id AND t.topic = $3))
            ORDER BY date DESC NULLS LAST
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&query.query)
        .bind(banana)
        .bind(query.topic.as_deref())
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&mut *conn)
        .await?;

        let items: Vec<ItemHit> = sqlx::query_as(
            r#"
            SELECT i.id, i.meeting_id, i.title, i.summary
            FROM items i
            JOIN meetings m ON m.id = i.meeting_id
            WHERE to_tsvector('english', i.title || ' ' || COALESCE(i.summary, ''))
                      @@ plainto_tsquery('english', $1)
              AND ($2::text IS NULL OR m.banana = $2)
              AND ($3::text IS NULL OR EXISTS (
                    SELECT 1 FROM item_topics t
                    WHERE t.item_id = i.id AND t.topic = $3))
            ORDER BY i.created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&query.query)
        .bind(banana)
        .bind(query.topic.as_deref())
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&mut *conn)
        .await?;

        let matters: Vec<MatterHit> = sqlx::query_as(
            r#"
            SELECT id, banana, title, matter_file, appearance_count
            FROM city_matters
            WHERE to_tsvector('english', title || ' ' || COALESCE(canonical_summary, ''))
                      @@ plainto_tsquery('english', $1)
              AND ($2::text IS NULL OR banana = $2)
              AND ($3::text IS NULL OR EXISTS (
                    SELECT 1 FROM matter_topics t
                    WHERE t.matter_id = city_matters.id AND t.topic = $3))
            ORDER BY last_seen DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&query.query)
        .bind(banana)
        .bind(query.topic.as_deref())
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(conn)
        .await?;

        Ok(SearchResults {
            cities: Vec::new(),
            meetings,
            items,
            matters,
        })
    }
}

fn is_zipcode(query: &str) -> bool {
    query.len() == 5 && query.chars().all(|c| c.is_ascii_digit())
}

/// US state (and DC) display names to postal codes.
const STATE_NAMES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("district of columbia", "DC"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

fn state_code_for_name(query: &str) -> Option<&'static str> {
    let folded = query.to_lowercase();
    STATE_NAMES
        .iter()
        .find(|(name, _)| *name == folded)
        .map(|(_, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zipcodes_are_five_digits() {
        assert!(is_zipcode("94301"));
        assert!(!is_zipcode("9430"));
        assert!(!is_zipcode("94301-1234"));
        assert!(!is_zipcode("nine4301"));
    }

    #[test]
    fn state_names_resolve_case_insensitively() {
        assert_eq!(state_code_for_name("California"), Some("CA"));
        assert_eq!(state_code_for_name("new york"), Some("NY"));
        assert_eq!(state_code_for_name("Cascadia"), None);
    }
}
