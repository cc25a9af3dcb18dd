// CivicPlus adapter. CivicPlus cities run AgendaCenter on their own
// domain, so the slug is the full host (e.g. `www.cityofpaloalto.org`).

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::errors::VendorError;
use crate::types::{FetchWindow, MeetingStatus, Participation, RawMeeting, Vendor};

use super::client::AdapterClient;
use super::dates::parse_vendor_date;
use super::html;
use super::VendorAdapter;

pub struct CivicPlusAdapter {
    host: String,
    client: AdapterClient,
}

impl CivicPlusAdapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        Self {
            host: slug.trim_matches('/').to_string(),
            client,
        }
    }

    fn agenda_center_url(&self) -> String {
        format!("https://{}/AgendaCenter", self.host)
    }
}

#[async_trait]
impl VendorAdapter for CivicPlusAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::CivicPlus
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let url = self.agenda_center_url();
        let page = self.client.get_text(&url).await?;
        let listings = html::civicplus::parse_agenda_center(&page, &url)?;

        let now = Utc::now();
        let mut meetings = Vec::new();
        for listing in listings {
            let date = parse_vendor_date(&listing.date_text);
            if let Some(d) = date {
                if !window.contains(d, now) {
                    continue;
                }
            }
            let Some(vendor_meeting_id) = listing.meeting_ref.clone() else {
                warn!(title = %listing.title, "skipping agendacenter row without a file reference");
                continue;
            };

            meetings.push(RawMeeting {
                vendor_meeting_id,
                title: listing.title,
                date,
                agenda_url: listing.agenda_url,
                packet_urls: listing.packet_urls,
                participation: Participation::default(),
                status: MeetingStatus::Scheduled,
                fingerprint: None,
                items: Vec::new(),
            });
        }
        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn the_slug_is_a_full_host() {
        let adapter = CivicPlusAdapter::new(
            "www.cityofx.gov/",
            AdapterClient::new(std::time::Duration::from_secs(30)).unwrap(),
        );
        assert_eq!(adapter.agenda_center_url(), "https://www.cityofx.gov/AgendaCenter");
    }
}
