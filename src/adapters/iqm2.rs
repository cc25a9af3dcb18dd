// IQM2 adapter. IQM2 citizen portals render a server-side calendar with
// typed document links; agendas are PDFs behind FileOpen.aspx, so there is
// no item-level support.

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::errors::VendorError;
use crate::types::{FetchWindow, MeetingStatus, Participation, RawMeeting, Vendor};

use super::client::AdapterClient;
use super::dates::parse_vendor_date;
use super::html;
use super::VendorAdapter;

pub struct Iqm2Adapter {
    slug: String,
    client: AdapterClient,
}

impl Iqm2Adapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        Self {
            slug: slug.to_string(),
            client,
        }
    }

    fn calendar_url(&self) -> String {
        format!("https://{}.iqm2.com/Citizens/Calendar.aspx?View=List", self.slug)
    }
}

#[async_trait]
impl VendorAdapter for Iqm2Adapter {
    fn vendor(&self) -> Vendor {
        Vendor::Iqm2
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let url = self.calendar_url();
        let page = self.client.get_text(&url).await?;
        let listings = html::iqm2::parse_calendar(&page, &url)?;

        let now = Utc::now();
        let mut meetings = Vec::new();
        for listing in listings {
            let date = parse_vendor_date(&listing.date_text);
            // The calendar shows the whole year; keep the window.
            if let Some(d) = date {
                if !window.contains(d, now) {
                    continue;
                }
            }
            let Some(vendor_meeting_id) = listing.meeting_ref.clone() else {
                warn!(title = %listing.title, "skipping iqm2 row without a meeting id");
                continue;
            };
            if listing.agenda_url.is_none() && listing.packet_urls.is_empty() {
                warn!(title = %listing.title, "skipping iqm2 row without documents");
                continue;
            }

            // Cancellations are flagged in the row title on this platform.
            let status = if listing.title.to_ascii_lowercase().contains("cancelled")
                || listing.title.to_ascii_lowercase().contains("canceled")
            {
                MeetingStatus::Cancelled
            } else {
                MeetingStatus::Scheduled
            };

            meetings.push(RawMeeting {
                vendor_meeting_id,
                title: listing.title,
                date,
                agenda_url: listing.agenda_url,
                packet_urls: listing.packet_urls,
                participation: Participation::default(),
                status,
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
    fn calendar_url_uses_the_list_view() {
        let adapter = Iqm2Adapter::new(
            "cityofx",
            AdapterClient::new(std::time::Duration::from_secs(30)).unwrap(),
        );
        assert_eq!(
            adapter.calendar_url(),
            "https://cityofx.iqm2.com/Citizens/Calendar.aspx?View=List"
        );
    }
}
