// Legistar adapter. Granicus's Legistar platform exposes a public OData
// web API; item-level agendas and vote outcomes come from the event-items
// endpoint, with the InSite HTML page as a fallback for deployments that
// disable it.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::errors::VendorError;
use crate::types::{
    Attachment, FetchWindow, MeetingStatus, Participation, RawAgendaItem, RawMeeting, RawVote,
    Vendor, VoteOutcome,
};

use super::client::AdapterClient;
use super::dates::{combine_date_and_time, parse_vendor_date};
use super::html;
use super::VendorAdapter;

const API_BASE: &str = "https://webapi.legistar.com/v1";

pub struct LegistarAdapter {
    slug: String,
    client: AdapterClient,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "EventId")]
    id: i64,
    #[serde(rename = "EventBodyName")]
    body_name: Option<String>,
    #[serde(rename = "EventDate")]
    date: Option<String>,
    #[serde(rename = "EventTime")]
    time: Option<String>,
    #[serde(rename = "EventAgendaFile")]
    agenda_file: Option<String>,
    #[serde(rename = "EventInSiteURL")]
    insite_url: Option<String>,
    #[serde(rename = "EventAgendaStatusName")]
    agenda_status: Option<String>,
    #[serde(rename = "EventLastModifiedUtc")]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    #[serde(rename = "EventItemTitle")]
    title: Option<String>,
    #[serde(rename = "EventItemAgendaSequence")]
    sequence: Option<u32>,
    #[serde(rename = "EventItemMatterFile")]
    matter_file: Option<String>,
    #[serde(rename = "EventItemMatterId")]
    matter_id: Option<i64>,
    #[serde(rename = "EventItemPassedFlagName")]
    passed_flag: Option<String>,
    #[serde(rename = "EventItemMatterAttachments", default)]
    attachments: Vec<MatterAttachment>,
}

#[derive(Debug, Deserialize)]
struct MatterAttachment {
    #[serde(rename = "MatterAttachmentName")]
    name: Option<String>,
    #[serde(rename = "MatterAttachmentHyperlink")]
    hyperlink: Option<String>,
}

impl LegistarAdapter {
    pub fn new(slug: &str, client: AdapterClient) -> Self {
        Self {
            slug: slug.to_string(),
            client,
        }
    }

    fn events_url(&self, window: FetchWindow) -> String {
        let now = Utc::now().date_naive();
        let start = now - Duration::days(window.days_back);
        let end = now + Duration::days(window.days_forward);
        format!(
            "{API_BASE}/{}/events?$filter=EventDate+ge+datetime'{start}'+and+EventDate+le+datetime'{end}'&$orderby=EventDate",
            self.slug
        )
    }

    async fn fetch_items(&self, event: &Event) -> Vec<RawAgendaItem> {
        let url = format!(
            "{API_BASE}/{}/events/{}/eventitems?AgendaNote=1&MinutesNote=1&Attachments=1",
            self.slug, event.id
        );
        let api_items: Vec<EventItem> = match self.client.get_json(&url).await {
            Ok(items) => items,
            Err(e) => {
                warn!(slug = %self.slug, event = event.id, error = %e, "event items fetch failed");
                Vec::new()
            }
        };

        let mut items: Vec<RawAgendaItem> = api_items
            .into_iter()
            .filter_map(|item| {
                let title = item.title.map(|t| t.trim().to_string())?;
                if title.is_empty() {
                    return None;
                }
                let attachments = item
                    .attachments
                    .into_iter()
                    .filter_map(|a| {
                        let url = a.hyperlink?;
                        Some(Attachment::pdf(a.name.unwrap_or_else(|| "attachment".into()), url))
                    })
                    .collect();
                let vote = item
                    .passed_flag
                    .as_deref()
                    .and_then(VoteOutcome::parse)
                    .map(|outcome| RawVote {
                        outcome,
                        tally: None,
                    });
                Some(RawAgendaItem {
                    sponsors: html::helpers::extract_sponsors(&title),
                    title,
                    sequence: item.sequence.unwrap_or(0),
                    matter_file: item.matter_file.filter(|f| !f.trim().is_empty()),
                    matter_id: item.matter_id.map(|id| id.to_string()),
                    attachments,
                    vote,
                })
            })
            .collect();

        // Smaller deployments disable the items API; their InSite page
        // still renders the agenda grid.
        if items.is_empty() {
            if let Some(insite) = event.insite_url.as_deref() {
                match self.client.get_text(insite).await {
                    Ok(page) => match html::legistar::parse_agenda_items(&page, insite) {
                        Ok(parsed) => items = parsed,
                        Err(e) => {
                            warn!(slug = %self.slug, event = event.id, error = %e, "insite agenda parse failed")
                        }
                    },
                    Err(e) => {
                        warn!(slug = %self.slug, event = event.id, error = %e, "insite agenda fetch failed")
                    }
                }
            }
        }
        items
    }
}

#[async_trait]
impl VendorAdapter for LegistarAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Legistar
    }

    fn supports_items(&self) -> bool {
        true
    }

    fn supports_votes(&self) -> bool {
        true
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError> {
        let events: Vec<Event> = self.client.get_json(&self.events_url(window)).await?;

        let mut meetings = Vec::with_capacity(events.len());
        for event in events {
            let Some(title) = event.body_name.clone().filter(|t| !t.trim().is_empty()) else {
                warn!(slug = %self.slug, event = event.id, "skipping event without a body name");
                continue;
            };
            if event.agenda_file.is_none() && event.insite_url.is_none() {
                warn!(slug = %self.slug, event = event.id, "skipping event without any document");
                continue;
            }

            let date = event
                .date
                .as_deref()
                .and_then(parse_vendor_date)
                .map(|d| combine_date_and_time(d, event.time.as_deref()));

            let status = match event.agenda_status.as_deref() {
                Some(s) if s.eq_ignore_ascii_case("cancelled") => MeetingStatus::Cancelled,
                Some(s) if s.eq_ignore_ascii_case("revised") => MeetingStatus::Revised,
                _ => MeetingStatus::Scheduled,
            };

            let items = self.fetch_items(&event).await;
            meetings.push(RawMeeting {
                vendor_meeting_id: event.id.to_string(),
                title,
                date,
                agenda_url: event.insite_url,
                packet_urls: event.agenda_file.into_iter().collect(),
                participation: Participation::default(),
                status,
                fingerprint: event.last_modified,
                items,
            });
        }
        Ok(meetings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_url_carries_the_window_filter() {
        let adapter = LegistarAdapter::new(
            "nashville",
            AdapterClient::new(std::time::Duration::from_secs(30)).unwrap(),
        );
        let url = adapter.events_url(FetchWindow {
            days_back: 14,
            days_forward: 60,
        });
        assert!(url.starts_with("https://webapi.legistar.com/v1/nashville/events?$filter=EventDate"));
        assert!(url.contains("$orderby=EventDate"));
    }
}
