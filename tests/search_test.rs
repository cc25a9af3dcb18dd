// Search integration test - requires a live Postgres.
// Set ENGAGIC_TEST_DB_URL to run; it skips silently otherwise.

use sqlx::PgPool;

use engagic::{
    Banana, City, CityRepo, CityStatus, MeetingRepo, MeetingStatus, Participation, RawMeeting,
    SearchQuery, SearchRepo, Vendor,
};

async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("ENGAGIC_TEST_DB_URL") else {
        eprintln!("skipping: ENGAGIC_TEST_DB_URL not set");
        return None;
    };
    let pool = engagic::connect(&url, 5).await.expect("test db reachable");
    engagic::migrate(&pool).await.expect("migrations apply");

    // This test owns every CA and TX city in the test database.
    let mut conn = pool.acquire().await.unwrap();
    sqlx::query("DELETE FROM cities WHERE state IN ('CA', 'TX')")
        .execute(&mut *conn)
        .await
        .unwrap();
    Some(pool)
}

async fn seed_city(pool: &PgPool, name: &str, state: &str, zipcodes: &[&str]) -> Banana {
    let banana = Banana::derive(name, state).unwrap();
    let city = City {
        banana: banana.clone(),
        name: name.to_string(),
        state: state.to_string(),
        vendor: Vendor::Granicus,
        slug: name.to_lowercase().replace(' ', ""),
        county: None,
        status: CityStatus::Active,
        last_sync_at: None,
        zipcodes: zipcodes.iter().map(|z| z.to_string()).collect(),
    };
    let mut conn = pool.acquire().await.unwrap();
    CityRepo::add_city(&mut conn, &city).await.unwrap();
    banana
}

async fn seed_meeting(pool: &PgPool, banana: &Banana, suffix: &str) {
    let id = format!("{banana}_{suffix}");
    let raw = RawMeeting {
        vendor_meeting_id: suffix.to_string(),
        title: "City Council Regular Meeting".to_string(),
        date: Some("2025-07-22T18:30:00".parse().unwrap()),
        agenda_url: Some("https://example.granicus.com/AgendaViewer.php?clip_id=1".to_string()),
        packet_urls: vec![],
        participation: Participation::default(),
        status: MeetingStatus::Scheduled,
        fingerprint: None,
        items: vec![],
    };
    let mut conn = pool.acquire().await.unwrap();
    MeetingRepo::store_meeting(&mut conn, &id, banana, &raw)
        .await
        .unwrap();
}

#[tokio::test]
async fn state_and_zipcode_queries_resolve_through_the_catalogue() {
    let Some(pool) = test_pool().await else { return };

    let ca_names = [
        "Palo Alto", "Sunnyvale", "Mountain View", "Cupertino", "San Mateo",
        "Redwood City", "Menlo Park", "Los Altos", "Milpitas", "Santa Clara",
    ];
    for name in ca_names {
        let zipcodes: &[&str] = if name == "Palo Alto" { &["94301"] } else { &[] };
        let banana = seed_city(&pool, name, "CA", zipcodes).await;
        seed_meeting(&pool, &banana, "m1").await;
    }
    for name in ["Austin", "Dallas", "Houston"] {
        seed_city(&pool, name, "TX", &[]).await;
    }

    let mut conn = pool.acquire().await.unwrap();

    // State-name query: exactly the ten CA cities, with meeting counts.
    let results = SearchRepo::search(
        &mut conn,
        &SearchQuery {
            limit: 50,
            ..SearchQuery::new("California")
        },
    )
    .await
    .unwrap();
    assert_eq!(results.cities.len(), 10);
    assert!(results.cities.iter().all(|c| c.state == "CA"));
    assert!(results.cities.iter().all(|c| c.meeting_count == 1));

    // Zipcode query: resolves to Palo Alto and its meetings.
    let results = SearchRepo::search(&mut conn, &SearchQuery::new("94301"))
        .await
        .unwrap();
    assert_eq!(results.cities.len(), 1);
    assert_eq!(results.cities[0].banana, "paloaltoCA");
    assert_eq!(results.meetings.len(), 1);
    assert_eq!(results.meetings[0].id, "paloaltoCA_m1");

    // Free text still reaches the meetings index.
    let results = SearchRepo::search(&mut conn, &SearchQuery::new("council"))
        .await
        .unwrap();
    assert!(!results.meetings.is_empty());
}
