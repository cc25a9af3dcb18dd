// CivicPlus AgendaCenter listing parser. AgendaCenter rows link documents
// through `/AgendaCenter/ViewFile/...` paths whose suffix encodes the
// meeting date (`_MMDDYYYY-NNN`), which doubles as the meeting reference.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::errors::VendorError;

use super::{helpers, MeetingListing};

static VIEWFILE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d{8})-(\d+)").expect("viewfile regex compiles"));

pub fn parse_agenda_center(html: &str, page_url: &str) -> Result<Vec<MeetingListing>, VendorError> {
    let base = Url::parse(page_url)
        .map_err(|e| VendorError::Parsing(format!("bad civicplus page url {page_url}: {e}")))?;
    let document = Html::parse_document(html);

    let rows = Selector::parse("tr.catAgendaRow").expect("static selector");
    let date_cell = Selector::parse("td.date, td h4").expect("static selector");
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut listings = Vec::new();
    for row in document.select(&rows) {
        let mut title = String::new();
        let mut date_text = row
            .select(&date_cell)
            .map(helpers::element_text)
            .find(|t| !t.is_empty())
            .unwrap_or_default();
        let mut agenda_url = None;
        let mut packet_urls = Vec::new();
        let mut meeting_ref = None;

        for anchor in row.select(&anchors) {
            let href = anchor.value().attr("href").unwrap_or_default();
            if !href.contains("/AgendaCenter/ViewFile/") {
                continue;
            }
            let Some(url) = helpers::absolute_url(&base, href) else {
                continue;
            };
            let label = helpers::element_text(anchor);
            if meeting_ref.is_none() {
                if let Some(captures) = VIEWFILE_REF.captures(href) {
                    meeting_ref = Some(format!("{}-{}", &captures[1], &captures[2]));
                    if date_text.is_empty() {
                        date_text = mmddyyyy_to_text(&captures[1]);
                    }
                }
            }
            if href.contains("/Agenda/") && agenda_url.is_none() {
                agenda_url = Some(url);
                if title.is_empty() && !label.is_empty() {
                    title = label;
                }
            } else if href.contains("/Packet/") || href.contains("/Minutes/") {
                if href.contains("/Packet/") {
                    packet_urls.push(url);
                }
            }
        }

        if title.is_empty() {
            // Some skins put the meeting name on the row heading instead of
            // the agenda link.
            let heading = Selector::parse("td p, td strong").expect("static selector");
            title = row
                .select(&heading)
                .map(helpers::element_text)
                .find(|t| !t.is_empty())
                .unwrap_or_default();
        }
        if title.is_empty() || (agenda_url.is_none() && packet_urls.is_empty()) {
            continue;
        }

        listings.push(MeetingListing {
            title,
            date_text,
            agenda_url,
            packet_urls,
            meeting_ref,
        });
    }
    Ok(listings)
}

/// `07222025` -> `07/22/2025`, the shape the shared date parser accepts.
fn mmddyyyy_to_text(raw: &str) -> String {
    if raw.len() == 8 {
        format!("{}/{}/{}", &raw[0..2], &raw[2..4], &raw[4..8])
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r##"
        <table class="listing">
          <tr class="catAgendaRow">
            <td class="date">Jul 22, 2025</td>
            <td><a href="/AgendaCenter/ViewFile/Agenda/_07222025-1620">City Council Regular Meeting</a></td>
            <td><a href="/AgendaCenter/ViewFile/Packet/_07222025-1620">Packet</a></td>
          </tr>
          <tr class="catAgendaRow">
            <td class="date"></td>
            <td><a href="/AgendaCenter/ViewFile/Agenda/_08052025-1633">Planning Commission</a></td>
          </tr>
        </table>
    "##;

    #[test]
    fn rows_resolve_documents_and_refs() {
        let listings = parse_agenda_center(FIXTURE, "https://www.cityofx.gov/AgendaCenter").unwrap();
        assert_eq!(listings.len(), 2);

        let council = &listings[0];
        assert_eq!(council.title, "City Council Regular Meeting");
        assert_eq!(council.date_text, "Jul 22, 2025");
        assert_eq!(council.meeting_ref.as_deref(), Some("07222025-1620"));
        assert_eq!(
            council.agenda_url.as_deref(),
            Some("https://www.cityofx.gov/AgendaCenter/ViewFile/Agenda/_07222025-1620")
        );
        assert_eq!(council.packet_urls.len(), 1);
    }

    #[test]
    fn missing_date_cell_recovers_the_date_from_the_href() {
        let listings = parse_agenda_center(FIXTURE, "https://www.cityofx.gov/AgendaCenter").unwrap();
        assert_eq!(listings[1].date_text, "08/05/2025");
    }
}
