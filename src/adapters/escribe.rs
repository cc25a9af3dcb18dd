// eScribe adapter. eScribe publishes a meeting calendar and fully
// structured HTML agendas, so items come straight off the agenda page.

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::errors::VendorError;
use crate::types::{
    Attachment, FetchWindow, MeetingStatus, Participation, RawMeeting, Vendor,
};

use super::client::AdapterClient;
use super::dates::parse_vendor_date;
use super::html;
use super::VendorAdapter;

pub struct EscribeAdapter {
    slug: String,
    client: AdapterClient,
}

impl EscribeAdapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        Self {
            slug: slug.to_string(),
            client,
        }
    }

    fn calendar_url(&self) -> String {
        format!("https://pub-{}.escribemeetings.com/?FillWidth=1", self.slug)
    }

    fn agenda_url(&self, meeting_ref: &str) -> String {
        format!(
            "https://pub-{}.escribemeetings.com/Meeting.aspx?Id={meeting_ref}&Agenda=Agenda&lang=English",
            self.slug
        )
    }
}

#[async_trait]
impl VendorAdapter for EscribeAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Escribe
    }

    fn supports_items(&self) -> bool {
        true
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let calendar_url = self.calendar_url();
        let page = self.client.get_text(&calendar_url).await?;
        let listings = html::escribe::parse_meeting_list(&page, &calendar_url)?;

        let now = Utc::now();
        let mut meetings = Vec::new();
        for listing in listings {
            let date = parse_vendor_date(&listing.date_text);
            if let Some(d) = date {
                if !window.contains(d, now) {
                    continue;
                }
            }
            let Some(agenda_url) = listing.agenda_url.clone() else {
                warn!(title = %listing.title, "skipping escribe meeting without an agenda link");
                continue;
            };
            let vendor_meeting_id = listing
                .meeting_ref
                .clone()
                .unwrap_or_else(|| agenda_url.clone());

            // Items are on the agenda page itself; a failed parse degrades
            // to a meeting-level record rather than losing the meeting.
            let items = match self.client.get_text(&agenda_url).await {
                Ok(agenda_page) => {
                    match html::escribe::parse_agenda_items(&agenda_page, &agenda_url) {
                        Ok(items) => items,
                        Err(e) => {
                            warn!(url = %agenda_url, error = %e, "escribe agenda parse failed");
                            Vec::new()
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %agenda_url, error = %e, "escribe agenda fetch failed");
                    Vec::new()
                }
            };

            meetings.push(RawMeeting {
                vendor_meeting_id,
                title: listing.title,
                date,
                agenda_url: Some(agenda_url),
                packet_urls: Vec::new(),
                participation: Participation::default(),
                status: MeetingStatus::Scheduled,
                fingerprint: None,
                items,
            });
        }
        Ok(meetings)
    }

    async fn discover_item_attachments(
        &self,
        meeting_ref: &str,
    ) -> Result<Vec<Attachment>, VendorError> {
        let url = self.agenda_url(meeting_ref);
        let page = self.client.get_text(&url).await?;
        let items = html::escribe::parse_agenda_items(&page, &url)?;
        Ok(items.into_iter().flat_map(|item| item.attachments).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn urls_follow_the_pub_subdomain_scheme() {
        let adapter = EscribeAdapter::new(
            "cityofx",
            AdapterClient::new(std::time::Duration::from_secs(30)).unwrap(),
        );
        assert_eq!(adapter.calendar_url(), "https://pub-cityofx.escribemeetings.com/?FillWidth=1");
        assert_eq!(
            adapter.agenda_url("abc-123"),
            "https://pub-cityofx.escribemeetings.com/Meeting.aspx?Id=abc-123&Agenda=Agenda&lang=English"
        );
    }
}
