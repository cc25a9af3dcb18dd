// PrimeGov adapter. PrimeGov's public portal has a JSON API with separate
// upcoming and archived listings; documents are compiled per template
// ("Agenda", "Agenda Packet") and downloaded by document id.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::errors::VendorError;
use crate::types::{FetchWindow, MeetingStatus, Participation, RawMeeting, Vendor};

use super::client::AdapterClient;
use super::dates::parse_vendor_date;
use super::VendorAdapter;

pub struct PrimeGovAdapter {
    slug: String,
    client: AdapterClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortalMeeting {
    id: i64,
    title: Option<String>,
    #[serde(default)]
    date_time: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    document_list: Vec<PortalDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortalDocument {
    id: i64,
    #[serde(default)]
    template_name: Option<String>,
}

impl PrimeGovAdapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        Self {
            slug: slug.to_string(),
            client,
        }
    }

    fn portal_base(&self) -> String {
        format!("https://{}.primegov.com", self.slug)
    }

    fn document_url(&self, document_id: i64) -> String {
        format!(
            "{}/api/v2/PublicPortal/CompiledDocument?meetingDocumentId={document_id}&compileOutputType=Pdf",
            self.portal_base()
        )
    }

    fn convert(&self, meeting: PortalMeeting, window: FetchWindow) -> Option<RawMeeting> {
        let title = meeting.title.filter(|t| !t.trim().is_empty())?;
        let date = meeting.date_time.as_deref().and_then(parse_vendor_date);
        if let Some(d) = date {
            if !window.contains(d, Utc::now()) {
                return None;
            }
        }

        let mut agenda_url = None;
        let mut packet_urls = Vec::new();
        for doc in &meeting.document_list {
            let template = doc.template_name.as_deref().unwrap_or_default();
            let lower = template.to_ascii_lowercase();
            if lower.contains("packet") {
                packet_urls.push(self.document_url(doc.id));
            } else if lower.contains("agenda") && agenda_url.is_none() {
                agenda_url = Some(self.document_url(doc.id));
            }
        }
        if agenda_url.is_none() && packet_urls.is_empty() {
            warn!(slug = %self.slug, meeting = meeting.id, "skipping primegov meeting without documents");
            return None;
        }

        Some(RawMeeting {
            vendor_meeting_id: meeting.id.to_string(),
            title,
            date,
            agenda_url,
            packet_urls,
            participation: Participation {
                virtual_url: meeting.video_url,
                ..Participation::default()
            },
            status: MeetingStatus::Scheduled,
            fingerprint: None,
            items: Vec::new(),
        })
    }
}

#[async_trait]
impl VendorAdapter for PrimeGovAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::PrimeGov
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let upcoming_url = format!(
            "{}/api/v2/PublicPortal/ListUpcomingMeetings",
            self.portal_base()
        );
        let mut portal_meetings: Vec<PortalMeeting> = self.client.get_json(&upcoming_url).await?;

        // The upcoming endpoint ignores the past; pull the current year's
        // archive when the window reaches back.
        if window.days_back > 0 {
            let archive_url = format!(
                "{}/api/v2/PublicPortal/ListArchivedMeetings?year={}",
                self.portal_base(),
                Utc::now().year()
            );
            match self.client.get_json::<Vec<PortalMeeting>>(&archive_url).await {
                Ok(archived) => portal_meetings.extend(archived),
                Err(e) => warn!(slug = %self.slug, error = %e, "primegov archive listing failed"),
            }
        }

        let mut meetings = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for meeting in portal_meetings {
            if !seen.insert(meeting.id) {
                continue;
            }
            if let Some(raw) = self.convert(meeting, window) {
                meetings.push(raw);
            }
        }
        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn adapter() -> PrimeGovAdapter {
        PrimeGovAdapter::new(
            "cityofx",
            AdapterClient::new(std::time::Duration::from_secs(30)).unwrap(),
        )
    }

    #[test]
    fn documents_split_into_agenda_and_packet() {
        let meeting = PortalMeeting {
            id: 42,
            title: Some("City Council".into()),
            date_time: Some(Utc::now().format("%Y-%m-%dT18:30:00").to_string()),
            video_url: Some("https://zoom.example.com/j/1".into()),
            document_list: vec![
                PortalDocument {
                    id: 7,
                    template_name: Some("Agenda".into()),
                },
                PortalDocument {
                    id: 8,
                    template_name: Some("Agenda Packet".into()),
                },
            ],
        };
        let raw = adapter()
            .convert(meeting, FetchWindow { days_back: 14, days_forward: 60 })
            .unwrap();
        assert_eq!(raw.vendor_meeting_id, "42");
        assert!(raw.agenda_url.as_deref().unwrap().contains("meetingDocumentId=7"));
        assert_eq!(raw.packet_urls.len(), 1);
        assert!(raw.packet_urls[0].contains("meetingDocumentId=8"));
        assert_eq!(raw.participation.virtual_url.as_deref(), Some("https://zoom.example.com/j/1"));
    }

    #[test]
    fn documentless_meetings_are_skipped() {
        let meeting = PortalMeeting {
            id: 43,
            title: Some("Closed Session".into()),
            date_time: None,
            video_url: None,
            document_list: vec![],
        };
        assert!(adapter()
            .convert(meeting, FetchWindow { days_back: 14, days_forward: 60 })
            .is_none());
    }
}
