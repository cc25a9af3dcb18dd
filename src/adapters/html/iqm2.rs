// IQM2 citizen-portal calendar parser. IQM2 renders the month view as
// `RowLink` divs; each row links a meeting detail page and numbered
// document downloads through `FileOpen.aspx` (type 14 = agenda, 1 = packet).

use scraper::{Html, Selector};
use url::Url;

use crate::errors::VendorError;

use super::{helpers, MeetingListing};

pub fn parse_calendar(html: &str, page_url: &str) -> Result<Vec<MeetingListing>, VendorError> {
    let base = Url::parse(page_url)
        .map_err(|e| VendorError::Parsing(format!("bad iqm2 page url {page_url}: {e}")))?;
    let document = Html::parse_document(html);

    let rows = Selector::parse("div.Row.MeetingRow, tr.MeetingRow").expect("static selector");
    let title_link = Selector::parse("a[href*='Detail_Meeting.aspx']").expect("static selector");
    let doc_links = Selector::parse("a[href*='FileOpen.aspx']").expect("static selector");
    let date_cell = Selector::parse(".RowTop, .MeetingDate, td").expect("static selector");

    let mut listings = Vec::new();
    for row in document.select(&rows) {
        let Some(anchor) = row.select(&title_link).next() else {
            continue;
        };
        let title = helpers::element_text(anchor);
        if title.is_empty() {
            continue;
        }
        let detail_url = anchor
            .value()
            .attr("href")
            .and_then(|href| helpers::absolute_url(&base, href));
        let meeting_ref = detail_url.as_deref().and_then(meeting_id_param);

        let date_text = row
            .select(&date_cell)
            .map(helpers::element_text)
            .find(|text| text.chars().any(|c| c.is_ascii_digit()))
            .unwrap_or_default();

        let mut agenda_url = detail_url;
        let mut packet_urls = Vec::new();
        for doc in row.select(&doc_links) {
            let href = doc.value().attr("href").unwrap_or_default();
            let Some(url) = helpers::absolute_url(&base, href) else {
                continue;
            };
            match file_type_param(&url).as_deref() {
                Some("14") => agenda_url = Some(url),
                Some("1") => packet_urls.push(url),
                _ => {}
            }
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
        .find(|(key, _)| key.eq_ignore_ascii_case("id"))
        .map(|(_, value)| value.into_owned())
}

fn file_type_param(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("type"))
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r##"
        <div class="Row MeetingRow">
          <div class="RowTop">Jul 22, 2025 6:30 PM</div>
          <a href="/Citizens/Detail_Meeting.aspx?ID=2471">City Council</a>
          <a href="/Citizens/FileOpen.aspx?Type=14&ID=2471&Inline=True">Agenda</a>
          <a href="/Citizens/FileOpen.aspx?Type=1&ID=2471">Agenda Packet</a>
        </div>
        <div class="Row MeetingRow">
          <div class="RowTop">Aug 5, 2025</div>
          <a href="/Citizens/Detail_Meeting.aspx?ID=2480">Finance Committee</a>
        </div>
    "##;

    #[test]
    fn calendar_rows_classify_documents_by_type() {
        let listings =
            parse_calendar(FIXTURE, "https://cityofx.iqm2.com/Citizens/Calendar.aspx").unwrap();
        assert_eq!(listings.len(), 2);

        let council = &listings[0];
        assert_eq!(council.title, "City Council");
        assert_eq!(council.date_text, "Jul 22, 2025 6:30 PM");
        assert_eq!(council.meeting_ref.as_deref(), Some("2471"));
        assert!(council.agenda_url.as_deref().unwrap().contains("Type=14"));
        assert_eq!(council.packet_urls.len(), 1);
        assert!(council.packet_urls[0].contains("Type=1&"));

        // Rows without document links fall back to the detail page.
        let committee = &listings[1];
        assert!(committee
            .agenda_url
            .as_deref()
            .unwrap()
            .contains("Detail_Meeting.aspx?ID=2480"));
        assert!(committee.packet_urls.is_empty());
    }
}
