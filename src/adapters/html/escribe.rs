// eScribe parsers: the public meeting calendar and the HTML agenda page.
// eScribe is the only vendor here that publishes a fully structured HTML
// agenda, so its adapter gets item-level records straight from the page.

use scraper::{Html, Selector};
use url::Url;

use crate::errors::VendorError;
use crate::types::RawAgendaItem;

use super::{helpers, MeetingListing};

pub fn parse_meeting_list(html: &str, page_url: &str) -> Result<Vec<MeetingListing>, VendorError> {
    let base = Url::parse(page_url)
        .map_err(|e| VendorError::Parsing(format!("bad escribe page url {page_url}: {e}")))?;
    let document = Html::parse_document(html);

    let items = Selector::parse("div.meeting-item").expect("static selector");
    let title_link = Selector::parse("a[href*='Meeting.aspx']").expect("static selector");
    let date_span = Selector::parse(".meeting-date, time").expect("static selector");

    let mut listings = Vec::new();
    for element in document.select(&items) {
        let Some(anchor) = element.select(&title_link).next() else {
            continue;
        };
        let title = helpers::element_text(anchor);
        let Some(agenda_url) = anchor
            .value()
            .attr("href")
            .and_then(|href| helpers::absolute_url(&base, href))
        else {
            continue;
        };
        let date_text = element
            .select(&date_span)
            .map(helpers::element_text)
            .find(|t| !t.is_empty())
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let meeting_ref = Url::parse(&agenda_url).ok().and_then(|u| {
            u.query_pairs()
                .find(|(key, _)| key.eq_ignore_ascii_case("id"))
                .map(|(_, value)| value.into_owned())
        });

        listings.push(MeetingListing {
            title,
            date_text,
            agenda_url: Some(agenda_url),
            packet_urls: Vec::new(),
            meeting_ref,
        });
    }
    Ok(listings)
}

/// Parse the structured agenda page into items. Each item container holds
/// a numbered heading and an attachment list.
pub fn parse_agenda_items(html: &str, page_url: &str) -> Result<Vec<RawAgendaItem>, VendorError> {
    let base = Url::parse(page_url)
        .map_err(|e| VendorError::Parsing(format!("bad escribe agenda url {page_url}: {e}")))?;
    let document = Html::parse_document(html);

    let containers = Selector::parse("div.AgendaItemContainer").expect("static selector");
    let titles = Selector::parse(".AgendaItemTitle").expect("static selector");
    let attachment_links =
        Selector::parse(".AgendaItemAttachment a[href], a.AgendaItemAttachment").expect("static selector");

    let mut items = Vec::new();
    for (index, container) in document.select(&containers).enumerate() {
        let Some(title_el) = container.select(&titles).next() else {
            continue;
        };
        let full_title = helpers::element_text(title_el);
        if full_title.is_empty() {
            continue;
        }
        // Headings come numbered ("4.1 Zoning By-law Amendment"); the
        // number is the agenda position, not part of the title.
        let (sequence, title) = split_heading_number(&full_title, index as u32);

        let attachments = container
            .select(&attachment_links)
            .filter_map(|anchor| helpers::attachment_from_anchor(&base, anchor))
            .collect();

        let body_text = helpers::element_text(container);
        items.push(RawAgendaItem {
            sponsors: helpers::extract_sponsors(&body_text),
            title,
            sequence,
            matter_file: None,
            matter_id: None,
            attachments,
            vote: None,
        });
    }
    Ok(items)
}

fn split_heading_number(full: &str, fallback: u32) -> (u32, String) {
    let mut parts = full.splitn(2, ' ');
    let head = parts.next().unwrap_or_default();
    if let Some(rest) = parts.next() {
        let digits: String = head.chars().filter(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && head.chars().all(|c| c.is_ascii_digit() || c == '.') {
            // "4.1" -> 41 keeps sub-item ordering stable within a section.
            if let Ok(n) = digits.parse::<u32>() {
                return (n, rest.trim().to_string());
            }
        }
    }
    (fallback, full.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn calendar_items_resolve_links_and_refs() {
        let html = r##"
            <div class="meeting-item">
              <h3><a href="Meeting.aspx?Id=abc-123&Agenda=Agenda&lang=English">Regular Council</a></h3>
              <span class="meeting-date">Jul 22, 2025 6:30 PM</span>
            </div>
        "##;
        let listings =
            parse_meeting_list(html, "https://pub-cityofx.escribemeetings.com/").unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, "Regular Council");
        assert_eq!(listings[0].meeting_ref.as_deref(), Some("abc-123"));
    }

    #[test]
    fn agenda_containers_become_numbered_items() {
        let html = r##"
            <div class="AgendaItemContainer">
              <div class="AgendaItemTitle">4.1 Zoning By-law Amendment for 12 Main St</div>
              <div class="AgendaItemAttachment"><a href="/FileStream.ashx?DocumentId=991">Staff Report.pdf</a></div>
            </div>
            <div class="AgendaItemContainer">
              <div class="AgendaItemTitle">Adjournment</div>
            </div>
        "##;
        let items = parse_agenda_items(
            html,
            "https://pub-cityofx.escribemeetings.com/Meeting.aspx?Id=abc-123",
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sequence, 41);
        assert_eq!(items[0].title, "Zoning By-law Amendment for 12 Main St");
        assert_eq!(items[0].attachments.len(), 1);
        assert_eq!(items[1].title, "Adjournment");
        assert_eq!(items[1].sequence, 1);
    }
}
