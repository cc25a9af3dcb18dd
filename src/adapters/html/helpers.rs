// DOM traversal helpers shared by the vendor parsers.

use scraper::ElementRef;
use url::Url;

use crate::types::{Attachment, Sponsor};

/// Visible text of an element, whitespace-collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against the page base; relative links are the norm on
/// these portals.
pub fn absolute_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Build an attachment from an anchor, classifying by URL shape and label.
/// Unknown document kinds are preserved as `unknown`, never dropped.
pub fn attachment_from_anchor(base: &Url, anchor: ElementRef<'_>) -> Option<Attachment> {
    let href = anchor.value().attr("href")?;
    let url = absolute_url(base, href)?;
    let mut name = element_text(anchor);
    if name.is_empty() {
        name = anchor
            .value()
            .attr("title")
            .unwrap_or("attachment")
            .to_string();
    }
    Some(Attachment {
        kind: classify_attachment(&name, &url).to_string(),
        meta_id: extract_meta_id(&url),
        name,
        url,
    })
}

/// Document kind from the URL (preferred) or the link label.
pub fn classify_attachment(name: &str, url: &str) -> &'static str {
    let url_lower = url.to_ascii_lowercase();
    let path = url_lower.split(['?', '#']).next().unwrap_or(&url_lower);
    if path.ends_with(".pdf") || url_lower.contains("view.ashx") {
        return "pdf";
    }
    if path.ends_with(".doc") || path.ends_with(".docx") {
        return "doc";
    }
    if path.ends_with(".htm") || path.ends_with(".html") {
        return "html";
    }
    let name_lower = name.to_ascii_lowercase();
    if name_lower.contains("pdf") {
        "pdf"
    } else {
        "unknown"
    }
}

/// Pull a vendor document id out of query strings like `?ID=123&GUID=...`
/// or `?meetingid=456`.
fn extract_meta_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    for (key, value) in parsed.query_pairs() {
        let key = key.to_ascii_lowercase();
        if key == "id" || key == "meetingid" || key == "fileid" || key == "documentid" {
            if !value.is_empty() {
                return Some(value.into_owned());
            }
        }
    }
    None
}

/// Parse a `Sponsors: Alice Jones, Bob Smith` style line into references.
/// District qualifiers in parentheses are kept with the member.
pub fn extract_sponsors(text: &str) -> Vec<Sponsor> {
    let lower = text.to_ascii_lowercase();
    let marker = lower
        .find("sponsors:")
        .map(|i| i + "sponsors:".len())
        .or_else(|| lower.find("sponsored by").map(|i| i + "sponsored by".len()));
    let Some(idx) = marker else {
        return Vec::new();
    };

    let rest = text[idx..].trim().trim_start_matches(':').trim();
    let rest = rest.split(['.', ';']).next().unwrap_or(rest);
    rest.split(" and ")
        .flat_map(|part| part.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let (name, district) = match (name.find('('), name.rfind(')')) {
                (Some(open), Some(close)) if open < close => (
                    name[..open].trim(),
                    Some(name[open + 1..close].trim().to_string()),
                ),
                _ => (name, None),
            };
            Sponsor {
                name: name.to_string(),
                district,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scraper::{Html, Selector};

    #[test]
    fn attachment_classification_prefers_the_url() {
        assert_eq!(classify_attachment("Exhibit A", "https://x.gov/a.pdf"), "pdf");
        assert_eq!(classify_attachment("Exhibit A", "https://x.gov/View.ashx?M=A"), "pdf");
        assert_eq!(classify_attachment("Staff report", "https://x.gov/report.docx"), "doc");
        assert_eq!(classify_attachment("Map", "https://x.gov/map"), "unknown");
    }

    #[test]
    fn anchor_attachments_resolve_relative_links() {
        let html = Html::parse_fragment(r#"<a href="/files/exhibit.pdf">Exhibit A</a>"#);
        let selector = Selector::parse("a").unwrap();
        let anchor = html.select(&selector).next().unwrap();
        let base = Url::parse("https://city.legistar.com/page").unwrap();
        let attachment = attachment_from_anchor(&base, anchor).unwrap();
        assert_eq!(attachment.url, "https://city.legistar.com/files/exhibit.pdf");
        assert_eq!(attachment.name, "Exhibit A");
        assert_eq!(attachment.kind, "pdf");
    }

    #[test]
    fn sponsor_lines_split_on_commas_and_and() {
        let sponsors = extract_sponsors("Sponsors: Alice Jones (District 3), Bob Smith and Carol Wu");
        assert_eq!(sponsors.len(), 3);
        assert_eq!(sponsors[0].name, "Alice Jones");
        assert_eq!(sponsors[0].district.as_deref(), Some("District 3"));
        assert_eq!(sponsors[2].name, "Carol Wu");
    }

    #[test]
    fn text_without_sponsor_marker_yields_nothing() {
        assert!(extract_sponsors("An ordinance amending Title 17").is_empty());
    }
}
