// Vendor adapters: everything platform-specific about one civic-tech
// vendor lives in that vendor's module. The registry at the bottom is the
// only code in the crate that dispatches on vendor identity.

pub mod client;
pub mod dates;
pub mod html;

mod civicclerk;
mod civicplus;
mod escribe;
mod granicus;
mod iqm2;
mod legistar;
mod novusagenda;
mod primegov;

use async_trait::async_trait;

pub use client::AdapterClient;

use crate::errors::VendorError;
use crate::types::{Attachment, FetchWindow, RawMeeting, Vendor};

/// The common fetch contract every adapter satisfies.
///
/// `fetch_meetings` opens a fresh vendor session per call and yields only
/// fully-constructed records: anything missing a required field is skipped
/// and logged at the source, never emitted half-built.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Whether this vendor publishes item-level agendas.
    fn supports_items(&self) -> bool {
        false
    }

    /// Whether this vendor exposes vote records.
    fn supports_votes(&self) -> bool {
        false
    }

    async fn fetch_meetings(&self, window: FetchWindow) -> Result<Vec<RawMeeting>, VendorError>;

    /// Fetch attachments published separately from the meeting record.
    async fn discover_item_attachments(
        &self,
        _meeting_ref: &str,
    ) -> Result<Vec<Attachment>, VendorError> {
        Ok(Vec::new())
    }
}

/// Build the adapter for a city's vendor. Keyed by the `Vendor` enum so a
/// new platform is one new module plus one arm here.
pub fn for_vendor(vendor: Vendor, slug: &str, client: AdapterClient) -> Box<dyn VendorAdapter> {
    match vendor {
        Vendor::Legistar => Box::new(legistar::LegistarAdapter::new(slug, client)),
        Vendor::Granicus => Box::new(granicus::GranicusAdapter::new(slug, client)),
        Vendor::PrimeGov => Box::new(primegov::PrimeGovAdapter::new(slug, client)),
        Vendor::CivicClerk => Box::new(civicclerk::CivicClerkAdapter::new(slug, client)),
        Vendor::CivicPlus => Box::new(civicplus::CivicPlusAdapter::new(slug, client)),
        Vendor::NovusAgenda => Box::new(novusagenda::NovusAgendaAdapter::new(slug, client)),
        Vendor::Escribe => Box::new(escribe::EscribeAdapter::new(slug, client)),
        Vendor::Iqm2 => Box::new(iqm2::Iqm2Adapter::new(slug, client)),
    }
}
