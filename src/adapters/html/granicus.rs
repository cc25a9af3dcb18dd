// Granicus ViewPublisher listing parser. Granicus splits its tables into
// an upcoming block and an archive block; we target the upcoming block and
// only fall back to the whole page when a deployment omits it.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::errors::VendorError;

use super::{helpers, MeetingListing};

pub fn parse_listing(html: &str, page_url: &str) -> Result<Vec<MeetingListing>, VendorError> {
    let base = Url::parse(page_url)
        .map_err(|e| VendorError::Parsing(format!("bad granicus page url {page_url}: {e}")))?;
    let document = Html::parse_document(html);

    let upcoming = Selector::parse("div#upcoming tr.listingRow").expect("static selector");
    let any_row = Selector::parse("tr.listingRow").expect("static selector");

    let rows: Vec<ElementRef<'_>> = {
        let scoped: Vec<_> = document.select(&upcoming).collect();
        if scoped.is_empty() {
            document.select(&any_row).collect()
        } else {
            scoped
        }
    };

    let cells = Selector::parse("td.listItem").expect("static selector");
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut listings = Vec::new();
    for row in rows {
        let texts: Vec<String> = row.select(&cells).map(helpers::element_text).collect();
        let title = texts.first().cloned().unwrap_or_default();
        // The date is whichever cell parses later; grab the first cell that
        // contains a digit so "In Progress" badges don't shadow it.
        let date_text = texts
            .iter()
            .skip(1)
            .find(|t| t.chars().any(|c| c.is_ascii_digit()))
            .cloned()
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let mut agenda_url = None;
        let mut packet_urls = Vec::new();
        for anchor in row.select(&anchors) {
            let href = anchor.value().attr("href").unwrap_or_default();
            let label = helpers::element_text(anchor).to_ascii_lowercase();
            let Some(url) = helpers::absolute_url(&base, href) else {
                continue;
            };
            if label.contains("agenda") && href.contains("AgendaViewer") {
                agenda_url = Some(url);
            } else if label.contains("packet") || url.to_ascii_lowercase().ends_with(".pdf") {
                packet_urls.push(url);
            }
        }

        listings.push(MeetingListing {
            title,
            date_text,
            agenda_url,
            packet_urls,
            meeting_ref: None,
        });
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r##"
        <div id="upcoming">
          <table class="listingTable">
            <tr class="listingRow">
              <td class="listItem">City Council</td>
              <td class="listItem">Jul 22, 2025 6:30 PM</td>
              <td class="listItem"><a href="AgendaViewer.php?view_id=2&clip_id=991">Agenda</a></td>
              <td class="listItem"><a href="/AgendaPackets/991.pdf">Packet</a></td>
            </tr>
          </table>
        </div>
        <div id="archive">
          <table class="listingTable">
            <tr class="listingRow">
              <td class="listItem">Old Meeting</td>
              <td class="listItem">Jan 2, 2020</td>
            </tr>
          </table>
        </div>
    "##;

    #[test]
    fn only_the_upcoming_block_is_parsed() {
        let listings =
            parse_listing(FIXTURE, "https://sunnyvale.granicus.com/ViewPublisher.php?view_id=2")
                .unwrap();
        assert_eq!(listings.len(), 1);
        let row = &listings[0];
        assert_eq!(row.title, "City Council");
        assert_eq!(row.date_text, "Jul 22, 2025 6:30 PM");
        assert_eq!(
            row.agenda_url.as_deref(),
            Some("https://sunnyvale.granicus.com/AgendaViewer.php?view_id=2&clip_id=991")
        );
        assert_eq!(row.packet_urls, vec!["https://sunnyvale.granicus.com/AgendaPackets/991.pdf"]);
    }

    #[test]
    fn falls_back_to_all_rows_without_an_upcoming_block() {
        let html = r#"<table><tr class="listingRow">
            <td class="listItem">Planning Commission</td>
            <td class="listItem">Aug 1, 2025</td>
        </tr></table>"#;
        let listings =
            parse_listing(html, "https://x.granicus.com/ViewPublisher.php?view_id=1").unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, "Planning Commission");
    }
}
