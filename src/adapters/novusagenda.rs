// NovusAgenda adapter. The public portal is one server-rendered table of
// meetings with links to the HTML agenda viewer and the compiled PDF.

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::errors::VendorError;
use crate::types::{FetchWindow, MeetingStatus, Participation, RawMeeting, Vendor};

use super::client::AdapterClient;
use super::dates::parse_vendor_date;
use super::html;
use super::VendorAdapter;

pub struct NovusAgendaAdapter {
    slug: String,
    client: AdapterClient,
}

impl NovusAgendaAdapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        Self {
            slug: slug.to_string(),
            client,
        }
    }

    fn portal_url(&self) -> String {
        format!(
            "https://{}.novusagenda.com/agendapublic/meetingsresponsive.aspx",
            self.slug
        )
    }
}

#[async_trait]
impl VendorAdapter for NovusAgendaAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::NovusAgenda
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let url = self.portal_url();
        let page = self.client.get_text(&url).await?;
        let listings = html::novusagenda::parse_meeting_table(&page, &url)?;

        let now = Utc::now();
        let mut meetings = Vec::new();
        for listing in listings {
            let date = parse_vendor_date(&listing.date_text);
            // The portal lists the full year; filter to the window.
            if let Some(d) = date {
                if !window.contains(d, now) {
                    continue;
                }
            }
            let Some(vendor_meeting_id) = listing.meeting_ref.clone() else {
                warn!(title = %listing.title, "skipping novusagenda row without a meeting id");
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
    fn portal_url_is_derived_from_the_slug() {
        let adapter = NovusAgendaAdapter::new(
            "cityofx",
            AdapterClient::new(std::time::Duration::from_secs(30)).unwrap(),
        );
        assert_eq!(
            adapter.portal_url(),
            "https://cityofx.novusagenda.com/agendapublic/meetingsresponsive.aspx"
        );
    }
}
