// Matter tracking integration tests - require a live Postgres.
// Set ENGAGIC_TEST_DB_URL to run; they skip silently otherwise.
// Run with --test-threads=1: the tests share one database.

use chrono::Utc;
use futures::FutureExt;
use sqlx::PgPool;

use engagic::{
    generate_matter_id, transaction, Attachment, Banana, City, CityRepo, CityStatus, ItemRecord,
    ItemRepo, MatterRepo, MatterTracker, MeetingRepo, MeetingStatus, Participation, RawMeeting,
    TrackDecision, TrackedItem, Vendor,
};

async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("ENGAGIC_TEST_DB_URL") else {
        eprintln!("skipping: ENGAGIC_TEST_DB_URL not set");
        return None;
    };
    let pool = engagic::connect(&url, 5).await.expect("test db reachable");
    engagic::migrate(&pool).await.expect("migrations apply");
    Some(pool)
}

async fn seed_city(pool: &PgPool, banana: &str, name: &str, state: &str) -> Banana {
    let banana = Banana::parse(banana).unwrap();
    // Re-runs against the same database start from a clean slate for this
    // city. Matters don't cascade from cities, so they go explicitly.
    {
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("DELETE FROM city_matters WHERE banana = $1")
            .bind(banana.as_str())
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("DELETE FROM cities WHERE banana = $1")
            .bind(banana.as_str())
            .execute(&mut *conn)
            .await
            .unwrap();
    }
    let city = City {
        banana: banana.clone(),
        name: name.to_string(),
        state: state.to_string(),
        vendor: Vendor::Legistar,
        slug: name.to_lowercase(),
        county: None,
        status: CityStatus::Active,
        last_sync_at: None,
        zipcodes: vec![],
    };
    let mut conn = pool.acquire().await.unwrap();
    CityRepo::add_city(&mut conn, &city).await.unwrap();
    banana
}

async fn seed_meeting(pool: &PgPool, banana: &Banana, meeting_id: &str, date: &str) {
    let raw = RawMeeting {
        vendor_meeting_id: meeting_id.to_string(),
        title: "Metropolitan Council".to_string(),
        date: Some(format!("{date}T18:30:00").parse().unwrap()),
        agenda_url: Some("https://example.legistar.com/MeetingDetail.aspx?ID=1".to_string()),
        packet_urls: vec![],
        participation: Participation::default(),
        status: MeetingStatus::Scheduled,
        fingerprint: None,
        items: vec![],
    };
    let mut conn = pool.acquire().await.unwrap();
    MeetingRepo::store_meeting(&mut conn, meeting_id, banana, &raw)
        .await
        .unwrap();
}

#[allow(clippy::too_many_arguments)]
async fn seed_item(
    pool: &PgPool,
    meeting_id: &str,
    item_id: &str,
    title: &str,
    matter_file: Option<&str>,
    matter_id: Option<&str>,
    urls: &[&str],
) {
    let record = ItemRecord {
        id: item_id.to_string(),
        title: title.to_string(),
        sequence: 1,
        attachments: urls.iter().map(|u| Attachment::pdf("Exhibit", *u)).collect(),
        sponsors: vec![],
        matter_file: matter_file.map(str::to_string),
        matter_id: matter_id.map(str::to_string),
        vote: None,
    };
    let mut conn = pool.acquire().await.unwrap();
    ItemRepo::store_agenda_items(&mut conn, meeting_id, &[record])
        .await
        .unwrap();
}

#[allow(clippy::too_many_arguments)]
async fn track(
    pool: &PgPool,
    banana: &Banana,
    meeting_id: &str,
    item_id: &str,
    title: &str,
    matter_file: Option<&str>,
    matter_id: Option<&str>,
    urls: &[&str],
) -> TrackDecision {
    let attachments: Vec<Attachment> =
        urls.iter().map(|u| Attachment::pdf("Exhibit", *u)).collect();
    let banana = banana.clone();
    let meeting_id = meeting_id.to_string();
    let item_id = item_id.to_string();
    let title = title.to_string();
    let matter_file = matter_file.map(str::to_string);
    let matter_id = matter_id.map(str::to_string);
    transaction(pool, |conn| {
        let attachments = attachments.clone();
        let banana = banana.clone();
        let meeting_id = meeting_id.clone();
        let item_id = item_id.clone();
        let title = title.clone();
        let matter_file = matter_file.clone();
        let matter_id = matter_id.clone();
        async move {
            let tracked = TrackedItem {
                item_id: &item_id,
                title: &title,
                matter_file: matter_file.as_deref(),
                matter_id: matter_id.as_deref(),
                attachments: &attachments,
                vote: None,
            };
            MatterTracker::track_item(conn, &banana, &meeting_id, None, &tracked, Utc::now()).await
        }
        .boxed()
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn two_readings_of_the_same_ordinance_share_one_matter() {
    let Some(pool) = test_pool().await else { return };
    let banana = seed_city(&pool, "nashvilleTN", "Nashville", "TN").await;

    seed_meeting(&pool, &banana, "nashvilleTN_M1", "2025-05-01").await;
    seed_meeting(&pool, &banana, "nashvilleTN_M2", "2025-05-15").await;
    let attachment = ["https://example.legistar.com/View.ashx?ID=14501"];
    seed_item(&pool, "nashvilleTN_M1", "nashvilleTN_M1:0001", "FIRST READING: An ordinance amending Title 17", Some("BL2025-1098"), None, &attachment).await;
    seed_item(&pool, "nashvilleTN_M2", "nashvilleTN_M2:0001", "SECOND READING: An ordinance amending Title 17", Some("BL2025-1098"), None, &attachment).await;

    // First sighting: summarise.
    let first = track(&pool, &banana, "nashvilleTN_M1", "nashvilleTN_M1:0001",
        "FIRST READING: An ordinance amending Title 17", Some("BL2025-1098"), None, &attachment).await;
    let TrackDecision::SummarizeNew { matter_id } = first else {
        panic!("expected SummarizeNew, got {first:?}");
    };

    // The processor records the canonical copy after the (one) LLM call.
    transaction(&pool, |conn| {
        let matter_id = matter_id.clone();
        let urls = attachment;
        async move {
            let attachments: Vec<Attachment> =
                urls.iter().map(|u| Attachment::pdf("Exhibit", *u)).collect();
            MatterTracker::record_canonical(
                conn,
                &matter_id,
                "An ordinance amending Title 17.",
                &["zoning".to_string()],
                &attachments,
            )
            .await
        }
        .boxed()
    })
    .await
    .unwrap();

    // Second reading, same attachments: canonical summary reused.
    let second = track(&pool, &banana, "nashvilleTN_M2", "nashvilleTN_M2:0001",
        "SECOND READING: An ordinance amending Title 17", Some("BL2025-1098"), None, &attachment).await;
    assert_eq!(
        second,
        TrackDecision::ReuseCanonical { matter_id: matter_id.clone() }
    );

    let mut conn = pool.acquire().await.unwrap();
    let matter = MatterRepo::get_matter(&mut conn, &matter_id).await.unwrap().unwrap();
    assert_eq!(matter.appearance_count, 2);

    let first_item = ItemRepo::get_item(&mut conn, "nashvilleTN_M1:0001").await.unwrap().unwrap();
    let second_item = ItemRepo::get_item(&mut conn, "nashvilleTN_M2:0001").await.unwrap().unwrap();
    assert_eq!(second_item.summary.as_deref(), Some("An ordinance amending Title 17."));
    assert_eq!(second_item.matter_id.as_deref(), Some(matter_id.as_str()));
    assert_eq!(first_item.matter_id.as_deref(), Some(matter_id.as_str()));
    assert_eq!(second_item.topics, vec!["zoning"]);

    let problems = MatterRepo::validate_matter_tracking(&mut conn).await.unwrap();
    assert!(problems.is_empty(), "integrity problems: {problems:?}");
}

#[tokio::test]
async fn changed_attachments_trigger_reprocessing() {
    let Some(pool) = test_pool().await else { return };
    let banana = seed_city(&pool, "knoxvilleTN", "Knoxville", "TN").await;

    seed_meeting(&pool, &banana, "knoxvilleTN_M1", "2025-05-01").await;
    seed_meeting(&pool, &banana, "knoxvilleTN_M2", "2025-05-15").await;
    let original = ["https://example.legistar.com/View.ashx?ID=100"];
    let revised = ["https://example.legistar.com/View.ashx?ID=200"];
    seed_item(&pool, "knoxvilleTN_M1", "knoxvilleTN_M1:0001", "An ordinance on sidewalks", Some("BL2025-1098"), None, &original).await;
    seed_item(&pool, "knoxvilleTN_M2", "knoxvilleTN_M2:0001", "An ordinance on sidewalks", Some("BL2025-1098"), None, &revised).await;

    let first = track(&pool, &banana, "knoxvilleTN_M1", "knoxvilleTN_M1:0001",
        "An ordinance on sidewalks", Some("BL2025-1098"), None, &original).await;
    let matter_id = first.matter_id().unwrap().to_string();

    transaction(&pool, |conn| {
        let matter_id = matter_id.clone();
        async move {
            let attachments = vec![Attachment::pdf("Exhibit", original[0])];
            MatterTracker::record_canonical(conn, &matter_id, "First version.",
                &["transportation".to_string()], &attachments).await
        }
        .boxed()
    })
    .await
    .unwrap();

    // Different attachment hash: must reprocess, not reuse.
    let second = track(&pool, &banana, "knoxvilleTN_M2", "knoxvilleTN_M2:0001",
        "An ordinance on sidewalks", Some("BL2025-1098"), None, &revised).await;
    assert_eq!(second, TrackDecision::Reprocess { matter_id: matter_id.clone() });

    transaction(&pool, |conn| {
        let matter_id = matter_id.clone();
        async move {
            let attachments = vec![Attachment::pdf("Exhibit", revised[0])];
            MatterTracker::record_canonical(conn, &matter_id, "Second version.",
                &["transportation".to_string()], &attachments).await
        }
        .boxed()
    })
    .await
    .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let matter = MatterRepo::get_matter(&mut conn, &matter_id).await.unwrap().unwrap();
    assert_eq!(matter.canonical_summary.as_deref(), Some("Second version."));
    let expected_hash =
        MatterTracker::attachment_fingerprint(&[Attachment::pdf("Exhibit", revised[0])]);
    assert_eq!(matter.attachment_hash, expected_hash);
    assert_eq!(matter.appearance_count, 2);
}

#[tokio::test]
async fn the_same_matter_file_in_two_cities_stays_separate() {
    let Some(pool) = test_pool().await else { return };
    let nashville = seed_city(&pool, "clarksvilleTN", "Clarksville", "TN").await;
    let memphis = seed_city(&pool, "franklinTN", "Franklin", "TN").await;

    seed_meeting(&pool, &nashville, "clarksvilleTN_M1", "2025-06-01").await;
    seed_meeting(&pool, &memphis, "franklinTN_M1", "2025-06-01").await;
    let urls = ["https://example.legistar.com/View.ashx?ID=300"];
    seed_item(&pool, "clarksvilleTN_M1", "clarksvilleTN_M1:0001", "An ordinance about parks", Some("2025-123"), None, &urls).await;
    seed_item(&pool, "franklinTN_M1", "franklinTN_M1:0001", "An ordinance about parks", Some("2025-123"), None, &urls).await;

    let a = track(&pool, &nashville, "clarksvilleTN_M1", "clarksvilleTN_M1:0001",
        "An ordinance about parks", Some("2025-123"), None, &urls).await;
    let b = track(&pool, &memphis, "franklinTN_M1", "franklinTN_M1:0001",
        "An ordinance about parks", Some("2025-123"), None, &urls).await;

    let id_a = a.matter_id().unwrap();
    let id_b = b.matter_id().unwrap();
    assert_ne!(id_a, id_b);
    assert!(id_a.starts_with("clarksvilleTN_"));
    assert!(id_b.starts_with("franklinTN_"));

    // No cross-contamination: a canonical summary on one leaves the other
    // untouched.
    transaction(&pool, |conn| {
        let id_a = id_a.to_string();
        async move {
            MatterTracker::record_canonical(conn, &id_a, "Clarksville parks ordinance.",
                &["parks".to_string()], &[]).await
        }
        .boxed()
    })
    .await
    .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let other = MatterRepo::get_matter(&mut conn, id_b).await.unwrap().unwrap();
    assert_eq!(other.canonical_summary, None);
}

#[tokio::test]
async fn a_vendor_matter_id_alone_drives_tier_two() {
    let Some(pool) = test_pool().await else { return };
    let banana = seed_city(&pool, "lebanonTN", "Lebanon", "TN").await;

    seed_meeting(&pool, &banana, "lebanonTN_M1", "2025-06-10").await;
    let urls = ["https://example.legistar.com/View.ashx?ID=400"];
    let title = "An ordinance with no public file number yet";
    seed_item(&pool, "lebanonTN_M1", "lebanonTN_M1:0001", title,
        None, Some("9f41c2d8-5a60-4f02-b7cd-aa11"), &urls).await;

    let decision = track(&pool, &banana, "lebanonTN_M1", "lebanonTN_M1:0001", title,
        None, Some("9f41c2d8-5a60-4f02-b7cd-aa11"), &urls).await;
    let TrackDecision::SummarizeNew { matter_id } = decision else {
        panic!("expected SummarizeNew, got {decision:?}");
    };

    // The title is long enough to qualify for tier 3, so only a tier-2
    // hash here proves the vendor id actually won the fallback.
    let expected =
        generate_matter_id(&banana, None, Some("9f41c2d8-5a60-4f02-b7cd-aa11"), None).unwrap();
    assert_eq!(matter_id, expected);

    let mut conn = pool.acquire().await.unwrap();
    let matter = MatterRepo::get_matter(&mut conn, &matter_id).await.unwrap().unwrap();
    assert_eq!(matter.matter_id.as_deref(), Some("9f41c2d8-5a60-4f02-b7cd-aa11"));
    assert_eq!(matter.matter_file, None);

    let item = ItemRepo::get_item(&mut conn, "lebanonTN_M1:0001").await.unwrap().unwrap();
    assert_eq!(item.matter_id.as_deref(), Some(matter_id.as_str()));
    assert_eq!(item.vendor_matter_id.as_deref(), Some("9f41c2d8-5a60-4f02-b7cd-aa11"));
}
