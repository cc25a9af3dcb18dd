// Legistar InSite meeting-detail parser. Used as the fallback when the
// Legistar web API returns a meeting without event items but the meeting
// has an InSite HTML page (smaller deployments disable the items API).

use scraper::{Html, Selector};
use url::Url;

use crate::errors::VendorError;
use crate::types::{Attachment, RawAgendaItem};

use super::helpers;

/// Parse agenda items out of an InSite MeetingDetail page. The item grid is
/// a RadGrid table whose data rows alternate `rgRow` / `rgAltRow`.
pub fn parse_agenda_items(html: &str, page_url: &str) -> Result<Vec<RawAgendaItem>, VendorError> {
    let base = Url::parse(page_url)
        .map_err(|e| VendorError::Parsing(format!("bad legistar page url {page_url}: {e}")))?;
    let document = Html::parse_document(html);

    let rows = Selector::parse("table.rgMasterTable tr.rgRow, table.rgMasterTable tr.rgAltRow")
        .expect("static selector");
    let cells = Selector::parse("td").expect("static selector");
    let anchors = Selector::parse("a[href]").expect("static selector");

    let mut items = Vec::new();
    for (index, row) in document.select(&rows).enumerate() {
        let mut matter_file = None;
        let mut matter_id = None;
        let mut attachments: Vec<Attachment> = Vec::new();

        for anchor in row.select(&anchors) {
            let href = anchor.value().attr("href").unwrap_or_default();
            if href.contains("LegislationDetail.aspx") {
                let text = helpers::element_text(anchor);
                if !text.is_empty() {
                    matter_file = Some(text);
                }
                matter_id = legislation_guid(&base, href).or(matter_id);
            } else if href.contains("View.ashx") || href.to_ascii_lowercase().ends_with(".pdf") {
                if let Some(attachment) = helpers::attachment_from_anchor(&base, anchor) {
                    if !attachments.iter().any(|a| a.url == attachment.url) {
                        attachments.push(attachment);
                    }
                }
            }
        }

        // The title cell is the widest text cell that isn't the file link.
        let title = row
            .select(&cells)
            .map(helpers::element_text)
            .filter(|text| Some(text.as_str()) != matter_file.as_deref())
            .max_by_key(String::len)
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let sponsors = helpers::extract_sponsors(&title);
        items.push(RawAgendaItem {
            title,
            sequence: index as u32,
            matter_file,
            matter_id,
            attachments,
            sponsors,
            vote: None,
        });
    }
    Ok(items)
}

/// Legistar links carry the matter's GUID in the query string.
fn legislation_guid(base: &Url, href: &str) -> Option<String> {
    let resolved = base.join(href).ok()?;
    resolved
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("guid"))
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r##"
        <table class="rgMasterTable">
          <tr class="rgRow">
            <td><a href="LegislationDetail.aspx?ID=101&GUID=AAAA-1111">BL2025-1098</a></td>
            <td>1</td>
            <td>FIRST READING: An ordinance amending Title 17. Sponsors: Alice Jones, Bob Smith</td>
            <td><a href="View.ashx?M=F&ID=14501&GUID=BBBB">Exhibit A</a></td>
          </tr>
          <tr class="rgAltRow">
            <td></td>
            <td>2</td>
            <td>Public Comment</td>
            <td></td>
          </tr>
        </table>
    "##;

    #[test]
    fn rows_become_items_with_matter_links() {
        let items =
            parse_agenda_items(FIXTURE, "https://nashville.legistar.com/MeetingDetail.aspx?ID=5")
                .unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.matter_file.as_deref(), Some("BL2025-1098"));
        assert_eq!(first.matter_id.as_deref(), Some("AAAA-1111"));
        assert!(first.title.starts_with("FIRST READING"));
        assert_eq!(first.attachments.len(), 1);
        assert_eq!(first.attachments[0].kind, "pdf");
        assert_eq!(first.sponsors.len(), 2);

        let second = &items[1];
        assert_eq!(second.matter_file, None);
        assert_eq!(second.title, "Public Comment");
        assert_eq!(second.sequence, 1);
    }
}
