// NovusAgenda public meeting table parser. The portal renders a RadGrid
// whose rows carry the date, the body name, and icon links to the HTML
// agenda viewer and the compiled PDF.

use scraper::{Html, Selector};
use url::Url;

use crate::errors::VendorError;

use super::{helpers, MeetingListing};

pub fn parse_meeting_table(html: &str, page_url: &str) -> Result<Vec<MeetingListing>, VendorError> {
    let base = Url::parse(page_url)
        .map_err(|e| VendorError::Parsing(format!("bad novusagenda page url {page_url}: {e}")))?;
    let document = Html::parse_document(html);

    let rows = Selector::parse("tr.rgRow, tr.rgAltRow").expect("static selector");
    let cells = Selector::parse("td").expect("static selector");
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut listings = Vec::new();
    for row in document.select(&rows) {
        let texts: Vec<String> = row.select(&cells).map(helpers::element_text).collect();
        let date_text = texts
            .iter()
            .find(|t| t.chars().any(|c| c.is_ascii_digit()))
            .cloned()
            .unwrap_or_default();
        let title = texts
            .iter()
            .filter(|t| !t.is_empty() && *t != &date_text)
            .max_by_key(|t| t.len())
            .cloned()
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let mut agenda_url = None;
        let mut packet_urls = Vec::new();
        let mut meeting_ref = None;
        for anchor in row.select(&anchors) {
            let href = anchor.value().attr("href").unwrap_or_default();
            let Some(url) = helpers::absolute_url(&base, href) else {
                continue;
            };
            if href.contains("ViewAgenda.aspx") {
                agenda_url = Some(url.clone());
            } else if href.contains("DisplayAgendaPDF.ashx") {
                packet_urls.push(url.clone());
            } else {
                continue;
            }
            if meeting_ref.is_none() {
                meeting_ref = meeting_id_param(&url);
            }
        }
        if agenda_url.is_none() && packet_urls.is_empty() {
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

fn meeting_id_param(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("meetingid"))
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r##"
        <table id="radGridMeetings">
          <tr class="rgRow">
            <td>07/22/2025</td>
            <td>Board of Commissioners</td>
            <td><a href="ViewAgenda.aspx?MeetingID=871"><img alt="html"/></a></td>
            <td><a href="DisplayAgendaPDF.ashx?MeetingID=871"><img alt="pdf"/></a></td>
          </tr>
          <tr class="rgAltRow">
            <td>08/05/2025</td>
            <td>Planning Board</td>
            <td></td>
            <td></td>
          </tr>
        </table>
    "##;

    #[test]
    fn rows_with_documents_become_listings() {
        let listings = parse_meeting_table(
            FIXTURE,
            "https://cityofx.novusagenda.com/agendapublic/meetingsresponsive.aspx",
        )
        .unwrap();
        // The second row has no document links and is skipped.
        assert_eq!(listings.len(), 1);
        let row = &listings[0];
        assert_eq!(row.title, "Board of Commissioners");
        assert_eq!(row.date_text, "07/22/2025");
        assert_eq!(row.meeting_ref.as_deref(), Some("871"));
        assert!(row.agenda_url.as_deref().unwrap().contains("ViewAgenda.aspx"));
        assert_eq!(row.packet_urls.len(), 1);
    }
}
