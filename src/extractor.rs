// Text extraction from agenda documents. Downloads through the shared
// adapter client, dispatches on content type, and scores what came out.
// Poor text is returned flagged and never retried here; the strategy field
// leaves room for premium extraction paths to slot in behind the same
// return type.

use tracing::{debug, warn};

use crate::adapters::AdapterClient;
use crate::errors::ExtractionError;
use crate::types::TextQuality;

/// Quality gate: shorter, letter-poorer, or word-poorer text is `Poor`.
const MIN_LENGTH: usize = 100;
const MIN_LETTER_RATIO: f64 = 0.3;
const MIN_WORDS: usize = 20;

/// How the text was obtained. One variant per extraction strategy so a
/// second-tier strategy (OCR, LLM-over-PDF) can be added without touching
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    PdfText,
    HtmlText,
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub quality: TextQuality,
    pub strategy: ExtractionStrategy,
}

pub struct TextExtractor {
    client: AdapterClient,
}

impl TextExtractor {
    pub fn new(client: AdapterClient) -> Self {
        Self { client }
    }

    /// Fetch a document URL and extract UTF-8 text from it.
    pub async fn extract_url(&self, url: &str) -> Result<ExtractedText, ExtractionError> {
        let (bytes, content_type) =
            self.client
                .get_document(url)
                .await
                .map_err(|e| ExtractionError::Download {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        let is_pdf = content_type.contains("pdf") || bytes.starts_with(b"%PDF");

        let (text, strategy) = if is_pdf {
            (extract_pdf_text(&bytes, url)?, ExtractionStrategy::PdfText)
        } else {
            let html = String::from_utf8_lossy(&bytes);
            (extract_html_text(&html), ExtractionStrategy::HtmlText)
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ExtractionError::NoText {
                url: url.to_string(),
            });
        }

        let quality = score_quality(&text);
        if quality == TextQuality::Poor {
            warn!(url, chars = text.len(), "extracted text scored poor");
        } else {
            debug!(url, chars = text.len(), "extracted text");
        }
        Ok(ExtractedText {
            text,
            quality,
            strategy,
        })
    }

    /// Extract and concatenate several attachments, in order. Individual
    /// failures degrade to the rest; all-failed is an error.
    pub async fn extract_concatenated(&self, urls: &[String]) -> Result<ExtractedText, ExtractionError> {
        let mut pieces = Vec::new();
        let mut strategy = ExtractionStrategy::PdfText;
        let mut last_error = None;
        for url in urls {
            match self.extract_url(url).await {
                Ok(extracted) => {
                    strategy = extracted.strategy;
                    pieces.push(extracted.text);
                }
                Err(e) => {
                    warn!(url, error = %e, "attachment extraction failed, continuing");
                    last_error = Some(e);
                }
            }
        }
        if pieces.is_empty() {
            return Err(last_error.unwrap_or(ExtractionError::NoText {
                url: urls.first().cloned().unwrap_or_default(),
            }));
        }
        let text = pieces.join("\n\n");
        let quality = score_quality(&text);
        Ok(ExtractedText {
            text,
            quality,
            strategy,
        })
    }
}

fn extract_pdf_text(bytes: &[u8], url: &str) -> Result<String, ExtractionError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Download {
        url: url.to_string(),
        reason: format!("pdf extraction failed: {e}"),
    })
}

/// Strip boilerplate and return the visible text of an HTML page.
pub fn extract_html_text(html: &str) -> String {
    use scraper::{ElementRef, Html, Selector};

    /// Tags whose subtrees are invisible or navigational chrome.
    const SKIP_TAGS: &[&str] = &["script", "style", "nav", "header", "footer", "noscript"];

    fn walk(element: ElementRef<'_>, out: &mut String) {
        for child in element.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                if SKIP_TAGS.contains(&child_el.value().name()) {
                    continue;
                }
                walk(child_el, out);
            } else if let Some(text) = child.value().as_text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(trimmed);
                }
            }
        }
    }

    let document = Html::parse_document(html);
    let body = Selector::parse("body").expect("static selector");
    let root = document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element());
    let mut out = String::new();
    walk(root, &mut out);
    out
}

/// Good iff length >= 100 chars AND letter ratio >= 0.3 AND >= 20 words.
pub fn score_quality(text: &str) -> TextQuality {
    if text.len() < MIN_LENGTH {
        return TextQuality::Poor;
    }
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let ratio = letters as f64 / text.chars().count().max(1) as f64;
    if ratio < MIN_LETTER_RATIO {
        return TextQuality::Poor;
    }
    if text.split_whitespace().count() < MIN_WORDS {
        return TextQuality::Poor;
    }
    TextQuality::Good
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_text_scores_poor() {
        let fifty = "The council will meet to discuss zoning soon.".to_string();
        assert!(fifty.len() < 100);
        assert_eq!(score_quality(&fifty), TextQuality::Poor);
    }

    #[test]
    fn normal_english_scores_good() {
        let sentence = "The city council will consider an ordinance amending the zoning code to permit accessory dwelling units in residential districts. ";
        let text = sentence.repeat(4);
        assert!(text.len() >= 500);
        assert_eq!(score_quality(&text), TextQuality::Good);
    }

    #[test]
    fn digit_soup_scores_poor() {
        let text = "0123456789 ".repeat(30);
        assert_eq!(score_quality(&text), TextQuality::Poor);
    }

    #[test]
    fn html_boilerplate_is_stripped() {
        let html = r#"
            <html><head><style>.x{color:red}</style></head>
            <body>
              <nav>Home | About</nav>
              <h1>Agenda</h1>
              <p>Call to order and roll call.</p>
              <script>var x = 1;</script>
              <footer>Copyright</footer>
            </body></html>
        "#;
        let text = extract_html_text(html);
        assert!(text.contains("Agenda"));
        assert!(text.contains("Call to order"));
        assert!(!text.contains("color:red"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("Home | About"));
    }
}
