// Granicus adapter. Granicus publishes per-city ViewPublisher listing
// pages; agendas are usually one compiled PDF, so there is no item-level
// support here. The slug is `{subdomain}` or `{subdomain}/{view_id}`.

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;
use url::Url;

use crate::errors::VendorError;
use crate::types::{FetchWindow, MeetingStatus, Participation, RawMeeting, Vendor};

use super::client::AdapterClient;
use super::dates::parse_vendor_date;
use super::html;
use super::VendorAdapter;

pub struct GranicusAdapter {
    subdomain: String,
    view_id: String,
    client: AdapterClient,
}

impl GranicusAdapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        let (subdomain, view_id) = match slug.split_once('/') {
            Some((sub, view)) => (sub.to_string(), view.to_string()),
            None => (slug.to_string(), "1".to_string()),
        };
        Self {
            subdomain,
            view_id,
            client,
        }
    }

    fn listing_url(&self) -> String {
        format!(
            "https://{}.granicus.com/ViewPublisher.php?view_id={}",
            self.subdomain, self.view_id
        )
    }
}

#[async_trait]
impl VendorAdapter for GranicusAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Granicus
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let listing_url = self.listing_url();
        let page = self.client.get_text(&listing_url).await?;
        let listings = html::granicus::parse_listing(&page, &listing_url)?;

        let now = Utc::now();
        let mut meetings = Vec::new();
        for listing in listings {
            let date = parse_vendor_date(&listing.date_text);
            // The upcoming block can still contain stale rows; combined
            // pages are filtered to the window here.
            if let Some(d) = date {
                if !window.contains(d, now) {
                    continue;
                }
            }

            let mut packet_urls = listing.packet_urls.clone();
            if packet_urls.is_empty() {
                if let Some(agenda) = listing.agenda_url.as_deref() {
                    match self.client.discover_pdf_links(agenda, 1).await {
                        Ok(found) => packet_urls = found,
                        Err(e) => {
                            warn!(url = agenda, error = %e, "granicus pdf discovery failed")
                        }
                    }
                }
            }
            if listing.agenda_url.is_none() && packet_urls.is_empty() {
                warn!(title = %listing.title, "skipping granicus row without documents");
                continue;
            }

            let vendor_meeting_id = listing
                .agenda_url
                .as_deref()
                .and_then(clip_id)
                .unwrap_or_else(|| synth_id(&listing.title, &listing.date_text));

            meetings.push(RawMeeting {
                vendor_meeting_id,
                title: listing.title,
                date,
                agenda_url: listing.agenda_url,
                packet_urls,
                participation: Participation::default(),
                status: MeetingStatus::Scheduled,
                fingerprint: None,
                items: Vec::new(),
            });
        }
        Ok(meetings)
    }
}

/// AgendaViewer links carry a stable clip id.
fn clip_id(agenda_url: &str) -> Option<String> {
    let url = Url::parse(agenda_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("clip_id"))
        .map(|(_, value)| format!("clip-{value}"))
}

/// Stable fallback id for rows without a clip id.
fn synth_id(title: &str, date_text: &str) -> String {
    let compact: String = format!("{title}-{date_text}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    compact.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slug_splits_into_subdomain_and_view() {
        let client = AdapterClient::new(std::time::Duration::from_secs(30)).unwrap();
        let adapter = GranicusAdapter::new("sunnyvale/33", client);
        assert_eq!(
            adapter.listing_url(),
            "https://sunnyvale.granicus.com/ViewPublisher.php?view_id=33"
        );
    }

    #[test]
    fn ids_prefer_the_clip_id() {
        assert_eq!(
            clip_id("https://x.granicus.com/AgendaViewer.php?view_id=2&clip_id=991").as_deref(),
            Some("clip-991")
        );
        assert_eq!(synth_id("City Council", "Jul 22, 2025"), "city-council-jul-22-2025");
    }
}
