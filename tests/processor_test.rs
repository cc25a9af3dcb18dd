// Processor integration test - requires a live Postgres.
// Set ENGAGIC_TEST_DB_URL to run; it skips silently otherwise.
//
// Attachments are served by a throwaway local HTTP listener so the
// extractor exercises its real download path; the summariser is a
// counting stub so the cached-summary economics are observable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use engagic::{
    Banana, City, CityRepo, CityStatus, Config, Confidence, ItemRecord, ItemRepo, MatterRepo,
    MeetingRepo, MeetingStatus, Participation, Processor, ProcessingError, ProcessingStatus,
    RawMeeting, Summarizer, SummaryRequest, SummaryResult, Vendor,
};

const AGENDA_BODY: &str = "<html><body><p>The council will consider an ordinance amending \
Title 17 of the municipal code to permit accessory dwelling units in all residential \
districts, subject to design review and a five hundred square foot minimum lot remainder. \
Staff recommends approval after the second reading.</p></body></html>";

struct CountingSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryResult, ProcessingError> {
        assert!(!request.text.trim().is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SummaryResult {
            summary: "An ordinance permitting accessory dwelling units.".to_string(),
            topics: vec!["zoning".to_string(), "housing".to_string()],
            confidence: Confidence::High,
            thinking_trace: None,
            model: "stub".to_string(),
        })
    }
}

async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("ENGAGIC_TEST_DB_URL") else {
        eprintln!("skipping: ENGAGIC_TEST_DB_URL not set");
        return None;
    };
    let pool = engagic::connect(&url, 5).await.expect("test db reachable");
    engagic::migrate(&pool).await.expect("migrations apply");
    Some(pool)
}

/// Serve a fixed HTML body on a local port, one response per connection.
async fn serve_fixture(body: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}/packet/agenda.html")
}

async fn seed_city(pool: &PgPool, banana: &str) -> Banana {
    let banana = Banana::parse(banana).unwrap();
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
    let city = City {
        banana: banana.clone(),
        name: "Processorville".to_string(),
        state: banana.state().to_string(),
        vendor: Vendor::Legistar,
        slug: "processorville".to_string(),
        county: None,
        status: CityStatus::Active,
        last_sync_at: None,
        zipcodes: vec![],
    };
    CityRepo::add_city(&mut conn, &city).await.unwrap();
    banana
}

async fn seed_meeting_with_item(
    pool: &PgPool,
    banana: &Banana,
    meeting_id: &str,
    date: &str,
    title: &str,
    attachment_url: &str,
) {
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
    let record = ItemRecord {
        id: format!("{meeting_id}:0001"),
        title: title.to_string(),
        sequence: 1,
        attachments: vec![engagic::Attachment::pdf("Exhibit A", attachment_url)],
        sponsors: vec![],
        matter_file: Some("BL2025-1098".to_string()),
        matter_id: None,
        vote: None,
    };
    ItemRepo::store_agenda_items(&mut conn, meeting_id, &[record])
        .await
        .unwrap();
}

#[tokio::test]
async fn two_readings_cost_one_llm_call() {
    let Some(pool) = test_pool().await else { return };
    let banana = seed_city(&pool, "proctestaTN").await;
    let attachment_url = serve_fixture(AGENDA_BODY).await;

    seed_meeting_with_item(
        &pool, &banana, "proctestaTN_M1", "2025-05-01",
        "FIRST READING: An ordinance amending Title 17",
        &attachment_url,
    )
    .await;
    seed_meeting_with_item(
        &pool, &banana, "proctestaTN_M2", "2025-05-15",
        "SECOND READING: An ordinance amending Title 17",
        &attachment_url,
    )
    .await;

    let summarizer = Arc::new(CountingSummarizer {
        calls: AtomicUsize::new(0),
    });
    let config = Config::for_tests("unused");
    let processor = Processor::new(pool.clone(), &config, summarizer.clone()).unwrap();

    processor.process_meeting("proctestaTN_M1").await.unwrap();
    processor.process_meeting("proctestaTN_M2").await.unwrap();

    // Same matter, same attachments: the second reading rode the canonical
    // summary and never touched the LLM.
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

    let mut conn = pool.acquire().await.unwrap();
    let first = ItemRepo::get_item(&mut conn, "proctestaTN_M1:0001").await.unwrap().unwrap();
    let second = ItemRepo::get_item(&mut conn, "proctestaTN_M2:0001").await.unwrap().unwrap();
    assert_eq!(first.summary, second.summary);
    assert_eq!(
        first.summary.as_deref(),
        Some("An ordinance permitting accessory dwelling units.")
    );

    let matter = MatterRepo::get_matter(&mut conn, first.matter_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(matter.appearance_count, 2);

    // Meeting-level rollup: topics aggregated, status completed, method
    // recorded.
    let meeting = MeetingRepo::get_meeting(&mut conn, "proctestaTN_M1").await.unwrap().unwrap();
    assert_eq!(meeting.processing_status, ProcessingStatus::Completed);
    assert!(meeting.processing_method.is_some());
    let mut topics = meeting.topics.clone();
    topics.sort();
    assert_eq!(topics, vec!["housing", "zoning"]);

    let payload = MeetingRepo::meeting_payload(&mut conn, "proctestaTN_M1", true)
        .await
        .unwrap()
        .unwrap();
    assert!(payload.has_items);
    assert_eq!(payload.items.as_ref().map(Vec::len), Some(1));
}
