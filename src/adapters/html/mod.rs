// Per-vendor HTML parsers. Listing parsers turn a vendor's meeting index
// page into `MeetingListing` rows; agenda parsers turn a single meeting's
// HTML page into `RawAgendaItem`s. Vendor modules share helpers only and
// never import each other.

pub mod helpers;

pub mod civicplus;
pub mod escribe;
pub mod granicus;
pub mod iqm2;
pub mod legistar;
pub mod novusagenda;

/// One row of a vendor's meeting index page, before date parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingListing {
    pub title: String,
    pub date_text: String,
    pub agenda_url: Option<String>,
    pub packet_urls: Vec<String>,
    /// Vendor-side reference (numeric id, guid) when the page exposes one.
    pub meeting_ref: Option<String>,
}
