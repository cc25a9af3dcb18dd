// CivicClerk adapter. CivicClerk exposes an OData-flavoured API; events
// list published files by kind and agenda items hang off the event
// resource, so this vendor gets item-level records.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::errors::VendorError;
use crate::types::{
    Attachment, FetchWindow, MeetingStatus, Participation, RawAgendaItem, RawMeeting, Vendor,
};

use super::client::AdapterClient;
use super::dates::parse_vendor_date;
use super::VendorAdapter;

pub struct CivicClerkAdapter {
    slug: String,
    client: AdapterClient,
}

#[derive(Debug, Deserialize)]
struct ODataList<T> {
    #[serde(default)]
    value: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClerkEvent {
    id: i64,
    #[serde(default)]
    event_name: Option<String>,
    #[serde(default)]
    start_date_time: Option<String>,
    #[serde(default)]
    published_files: Vec<ClerkFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClerkFile {
    file_id: i64,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClerkAgendaItem {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sort_order: Option<u32>,
    #[serde(default)]
    legislative_file_number: Option<String>,
    #[serde(default)]
    files: Vec<ClerkFile>,
}

impl CivicClerkAdapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        Self {
            slug: slug.to_string(),
            client,
        }
    }

    fn api_base(&self) -> String {
        format!("https://{}.api.civicclerk.com/v1", self.slug)
    }

    fn file_stream_url(&self, file_id: i64) -> String {
        format!(
            "{}/Meetings/GetMeetingFileStream(fileId={file_id},plainText=false)",
            self.api_base()
        )
    }

    fn file_to_attachment(&self, file: &ClerkFile) -> Attachment {
        Attachment {
            name: file
                .name
                .clone()
                .or_else(|| file.kind.clone())
                .unwrap_or_else(|| "attachment".into()),
            url: self.file_stream_url(file.file_id),
            kind: "pdf".into(),
            meta_id: Some(file.file_id.to_string()),
        }
    }

    async fn fetch_items(&self, event_id: i64) -> Vec<RawAgendaItem> {
        let url = format!("{}/Events({event_id})/agendaItems", self.api_base());
        let response: ODataList<ClerkAgendaItem> = match self.client.get_json(&url).await {
            Ok(list) => list,
            Err(e) => {
                warn!(slug = %self.slug, event = event_id, error = %e, "civicclerk agenda items fetch failed");
                return Vec::new();
            }
        };

        response
            .value
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let title = item.name.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
                Some(RawAgendaItem {
                    title,
                    sequence: item.sort_order.unwrap_or(index as u32),
                    matter_file: item.legislative_file_number.filter(|f| !f.trim().is_empty()),
                    matter_id: None,
                    attachments: item
                        .files
                        .iter()
                        .map(|f| self.file_to_attachment(f))
                        .collect(),
                    sponsors: Vec::new(),
                    vote: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl VendorAdapter for CivicClerkAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::CivicClerk
    }

    fn supports_items(&self) -> bool {
        true
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let start = (Utc::now() - Duration::days(window.days_back)).format("%Y-%m-%dT00:00:00Z");
        let url = format!(
            "{}/Events?$filter=startDateTime+ge+{start}&$orderby=startDateTime",
            self.api_base()
        );
        let response: ODataList<ClerkEvent> = self.client.get_json(&url).await?;

        let now = Utc::now();
        let mut meetings = Vec::new();
        for event in response.value {
            let Some(title) = event.event_name.clone().filter(|t| !t.trim().is_empty()) else {
                warn!(slug = %self.slug, event = event.id, "skipping unnamed civicclerk event");
                continue;
            };
            let date = event.start_date_time.as_deref().and_then(parse_vendor_date);
            if let Some(d) = date {
                if !window.contains(d, now) {
                    continue;
                }
            }

            let mut agenda_url = None;
            let mut packet_urls = Vec::new();
            for file in &event.published_files {
                let kind = file.kind.as_deref().unwrap_or_default().to_ascii_lowercase();
                if kind.contains("packet") {
                    packet_urls.push(self.file_stream_url(file.file_id));
                } else if kind.contains("agenda") && agenda_url.is_none() {
                    agenda_url = Some(self.file_stream_url(file.file_id));
                }
            }
            if agenda_url.is_none() && packet_urls.is_empty() {
                warn!(slug = %self.slug, event = event.id, "skipping civicclerk event without documents");
                continue;
            }

            let items = self.fetch_items(event.id).await;
            meetings.push(RawMeeting {
                vendor_meeting_id: event.id.to_string(),
                title,
                date,
                agenda_url,
                packet_urls,
                participation: Participation::default(),
                status: MeetingStatus::Scheduled,
                fingerprint: None,
                items,
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
    fn file_stream_urls_are_odata_shaped() {
        let adapter = CivicClerkAdapter::new(
            "cityofx",
            AdapterClient::new(std::time::Duration::from_secs(30)).unwrap(),
        );
        assert_eq!(
            adapter.file_stream_url(17),
            "https://cityofx.api.civicclerk.com/v1/Meetings/GetMeetingFileStream(fileId=17,plainText=false)"
        );
    }
}
