// Domain model for the ingestion core.
// Raw* types are what vendor adapters emit; the rest is what the
// repositories persist. Validated newtypes enforce their invariants at
// construction so downstream code never re-checks them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Supported civic-tech platforms. The adapter registry is the only place
/// allowed to match on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    Legistar,
    Granicus,
    PrimeGov,
    CivicClerk,
    CivicPlus,
    NovusAgenda,
    Escribe,
    Iqm2,
}

impl Vendor {
    pub const ALL: [Vendor; 8] = [
        Vendor::Legistar,
        Vendor::Granicus,
        Vendor::PrimeGov,
        Vendor::CivicClerk,
        Vendor::CivicPlus,
        Vendor::NovusAgenda,
        Vendor::Escribe,
        Vendor::Iqm2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Legistar => "legistar",
            Vendor::Granicus => "granicus",
            Vendor::PrimeGov => "primegov",
            Vendor::CivicClerk => "civicclerk",
            Vendor::CivicPlus => "civicplus",
            Vendor::NovusAgenda => "novusagenda",
            Vendor::Escribe => "escribe",
            Vendor::Iqm2 => "iqm2",
        }
    }
}

impl FromStr for Vendor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legistar" => Ok(Vendor::Legistar),
            "granicus" => Ok(Vendor::Granicus),
            "primegov" => Ok(Vendor::PrimeGov),
            "civicclerk" => Ok(Vendor::CivicClerk),
            "civicplus" => Ok(Vendor::CivicPlus),
            "novusagenda" => Ok(Vendor::NovusAgenda),
            "escribe" | "e-scribe" => Ok(Vendor::Escribe),
            "iqm2" => Ok(Vendor::Iqm2),
            other => Err(ValidationError::InvalidField {
                field: "vendor",
                reason: format!("unknown vendor {other:?}"),
            }),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, vendor-agnostic city identifier: lowercase alphanumerics of the
/// city name followed by the uppercase two-letter state code.
///
/// # Invariants
/// - Non-empty name component
/// - Exactly two ASCII-alphabetic uppercase state characters at the end
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Banana(String);

impl Banana {
    /// Derive from a display name and state code, e.g.
    /// `("Palo Alto", "ca")` -> `paloaltoCA`.
    pub fn derive(name: &str, state: &str) -> Result<Self, ValidationError> {
        let state = state.trim();
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidState(state.to_string()));
        }
        let compact: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if compact.is_empty() {
            return Err(ValidationError::InvalidBanana(format!(
                "city name {name:?} has no alphanumeric characters"
            )));
        }
        Ok(Self(format!("{compact}{}", state.to_ascii_uppercase())))
    }

    /// Accept an already-derived identifier, re-checking its shape.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.len() < 3 {
            return Err(ValidationError::InvalidBanana(raw.to_string()));
        }
        let (name_part, state_part) = raw.split_at(raw.len() - 2);
        if !state_part.chars().all(|c| c.is_ascii_uppercase())
            || !name_part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ValidationError::InvalidBanana(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing two-letter state code.
    pub fn state(&self) -> &str {
        &self.0[self.0.len() - 2..]
    }
}

impl fmt::Display for Banana {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CityStatus {
    Active,
    Inactive,
}

impl CityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CityStatus::Active => "active",
            CityStatus::Inactive => "inactive",
        }
    }
}

/// Vendor-reported meeting lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    Cancelled,
    Postponed,
    Revised,
    Rescheduled,
    Completed,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::Cancelled => "cancelled",
            MeetingStatus::Postponed => "postponed",
            MeetingStatus::Revised => "revised",
            MeetingStatus::Rescheduled => "rescheduled",
            MeetingStatus::Completed => "completed",
        }
    }
}

impl FromStr for MeetingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MeetingStatus::Scheduled),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            "postponed" => Ok(MeetingStatus::Postponed),
            "revised" => Ok(MeetingStatus::Revised),
            "rescheduled" => Ok(MeetingStatus::Rescheduled),
            "completed" => Ok(MeetingStatus::Completed),
            other => Err(ValidationError::InvalidField {
                field: "meeting_status",
                reason: format!("unknown status {other:?}"),
            }),
        }
    }
}

/// Our own processing lifecycle, orthogonal to the vendor's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingMethod {
    #[serde(rename = "item-based")]
    ItemBased,
    #[serde(rename = "monolithic")]
    Monolithic,
    #[serde(rename = "batch")]
    Batch,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMethod::ItemBased => "item-based",
            ProcessingMethod::Monolithic => "monolithic",
            ProcessingMethod::Batch => "batch",
        }
    }
}

/// Legislative disposition of a matter, when a terminal vote was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatterDisposition {
    Active,
    Passed,
    Failed,
    Tabled,
    Withdrawn,
    Referred,
    Amended,
    Vetoed,
    Enacted,
}

impl MatterDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatterDisposition::Active => "active",
            MatterDisposition::Passed => "passed",
            MatterDisposition::Failed => "failed",
            MatterDisposition::Tabled => "tabled",
            MatterDisposition::Withdrawn => "withdrawn",
            MatterDisposition::Referred => "referred",
            MatterDisposition::Amended => "amended",
            MatterDisposition::Vetoed => "vetoed",
            MatterDisposition::Enacted => "enacted",
        }
    }

    /// Whether this disposition ends the matter's life.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MatterDisposition::Active | MatterDisposition::Referred)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    Passed,
    Failed,
    Tabled,
    Withdrawn,
    Referred,
    Amended,
    Vetoed,
    Enacted,
}

impl VoteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteOutcome::Passed => "passed",
            VoteOutcome::Failed => "failed",
            VoteOutcome::Tabled => "tabled",
            VoteOutcome::Withdrawn => "withdrawn",
            VoteOutcome::Referred => "referred",
            VoteOutcome::Amended => "amended",
            VoteOutcome::Vetoed => "vetoed",
            VoteOutcome::Enacted => "enacted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" | "approved" | "adopted" => Some(VoteOutcome::Passed),
            "failed" | "fail" | "rejected" => Some(VoteOutcome::Failed),
            "tabled" => Some(VoteOutcome::Tabled),
            "withdrawn" => Some(VoteOutcome::Withdrawn),
            "referred" => Some(VoteOutcome::Referred),
            "amended" => Some(VoteOutcome::Amended),
            "vetoed" => Some(VoteOutcome::Vetoed),
            "enacted" => Some(VoteOutcome::Enacted),
            _ => None,
        }
    }

    pub fn to_disposition(&self) -> MatterDisposition {
        match self {
            VoteOutcome::Passed => MatterDisposition::Passed,
            VoteOutcome::Failed => MatterDisposition::Failed,
            VoteOutcome::Tabled => MatterDisposition::Tabled,
            VoteOutcome::Withdrawn => MatterDisposition::Withdrawn,
            VoteOutcome::Referred => MatterDisposition::Referred,
            VoteOutcome::Amended => MatterDisposition::Amended,
            VoteOutcome::Vetoed => MatterDisposition::Vetoed,
            VoteOutcome::Enacted => MatterDisposition::Enacted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SyncCity,
    ProcessMeeting,
    ProcessItem,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SyncCity => "sync_city",
            JobKind::ProcessMeeting => "process_meeting",
            JobKind::ProcessItem => "process_item",
        }
    }
}

impl FromStr for JobKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync_city" => Ok(JobKind::SyncCity),
            "process_meeting" => Ok(JobKind::ProcessMeeting),
            "process_item" => Ok(JobKind::ProcessItem),
            other => Err(ValidationError::InvalidField {
                field: "job_kind",
                reason: format!("unknown kind {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLetter,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::DeadLetter => "dead_letter",
        }
    }
}

/// How confident the summariser says it is in its own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Extraction quality verdict. Poor text is returned flagged, never retried
/// on the free tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextQuality {
    Good,
    Poor,
}

/// Ways a meeting can be joined. All fields best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub is_hybrid: bool,
}

impl Participation {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.phone.is_none()
            && self.virtual_url.is_none()
            && self.meeting_id.is_none()
            && !self.is_hybrid
    }
}

/// A downloadable document referenced by an item or meeting. Unknown kinds
/// are preserved with `kind = "unknown"` rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default = "Attachment::unknown_kind")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_id: Option<String>,
}

impl Attachment {
    fn unknown_kind() -> String {
        "unknown".to_string()
    }

    pub fn pdf(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: "pdf".to_string(),
            meta_id: None,
        }
    }
}

/// Council-member reference on an agenda item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sponsor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
    pub absent: u32,
}

/// Vote record attached to a raw agenda item, for vendors that expose one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVote {
    pub outcome: VoteOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tally: Option<VoteTally>,
}

/// One line of a meeting's agenda as the adapter saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAgendaItem {
    pub title: String,
    pub sequence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matter_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matter_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub sponsors: Vec<Sponsor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<RawVote>,
}

/// Canonical meeting record emitted by an adapter. Adapters never emit
/// partially-constructed records; anything missing a required field is
/// skipped at the source and logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeeting {
    pub vendor_meeting_id: String,
    pub title: String,
    /// Vendor-local wall-clock time when the vendor supplies one; adapters
    /// that only get UTC say so by converting before emitting.
    pub date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agenda_url: Option<String>,
    #[serde(default)]
    pub packet_urls: Vec<String>,
    #[serde(default)]
    pub participation: Participation,
    pub status: MeetingStatus,
    /// Marker for change detection; vendors that expose a revision stamp
    /// put it here so unchanged meetings can be skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub items: Vec<RawAgendaItem>,
}

impl RawMeeting {
    /// A raw meeting is persistable when it has an id, a title, and at
    /// least one document URL.
    pub fn is_complete(&self) -> bool {
        !self.vendor_meeting_id.trim().is_empty()
            && !self.title.trim().is_empty()
            && (self.agenda_url.is_some() || !self.packet_urls.is_empty())
    }
}

/// Fetch horizon handed to adapters.
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    pub days_back: i64,
    pub days_forward: i64,
}

impl FetchWindow {
    pub fn contains(&self, date: NaiveDateTime, now: DateTime<Utc>) -> bool {
        let start = now.date_naive() - chrono::Duration::days(self.days_back);
        let end = now.date_naive() + chrono::Duration::days(self.days_forward);
        let d = date.date();
        d >= start && d <= end
    }
}

/// A city in the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub banana: Banana,
    pub name: String,
    pub state: String,
    pub vendor: Vendor,
    pub slug: String,
    pub county: Option<String>,
    pub status: CityStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub zipcodes: Vec<String>,
}

/// A persisted meeting, as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub banana: Banana,
    pub title: String,
    pub date: Option<NaiveDateTime>,
    pub agenda_url: Option<String>,
    pub packet_urls: Vec<String>,
    pub summary: Option<String>,
    pub participation: Option<Participation>,
    pub status: MeetingStatus,
    pub topics: Vec<String>,
    pub processing_status: ProcessingStatus,
    pub processing_method: Option<ProcessingMethod>,
    pub processing_time_ms: Option<i64>,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted agenda item. `matter_id` is the composite matter link;
/// `vendor_matter_id` is the raw platform identifier it may have been
/// derived from (the Tier-2 input).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaItem {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub sequence: u32,
    pub attachments: Vec<Attachment>,
    pub sponsors: Vec<Sponsor>,
    pub matter_id: Option<String>,
    pub matter_file: Option<String>,
    pub vendor_matter_id: Option<String>,
    pub summary: Option<String>,
    pub topics: Vec<String>,
    /// Vote record as fetched, for vendors that expose one; adopted onto
    /// the matter appearance during tracking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<RawVote>,
}

/// A recurring legislative item tracked across meetings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matter {
    pub id: String,
    pub banana: Banana,
    pub matter_file: Option<String>,
    pub matter_id: Option<String>,
    pub title: String,
    pub canonical_summary: Option<String>,
    pub topics: Vec<String>,
    pub attachment_hash: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub appearance_count: i32,
    pub status: Option<MatterDisposition>,
    pub final_vote_date: Option<NaiveDate>,
}

/// One occurrence of a matter on a meeting's agenda.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatterAppearance {
    pub matter_id: String,
    pub meeting_id: String,
    pub appeared_at: Option<NaiveDateTime>,
    pub sequence: i32,
    pub vote_outcome: Option<VoteOutcome>,
    pub vote_tally: Option<VoteTally>,
}

/// A queued unit of work.
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: i64,
    pub kind: JobKind,
    pub payload: String,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The contractually fixed JSON representation consumed by the API layer.
/// `has_items` is derived from the existence of item rows, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingPayload {
    pub id: String,
    pub banana: String,
    pub title: String,
    pub date: Option<NaiveDateTime>,
    pub agenda_url: Option<String>,
    pub packet_url: Vec<String>,
    pub summary: Option<String>,
    pub participation: Option<Participation>,
    pub topics: Vec<String>,
    pub has_items: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<AgendaItem>>,
    pub processing_status: ProcessingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn banana_derivation_strips_punctuation_and_spaces() {
        let banana = Banana::derive("Palo Alto", "ca").unwrap();
        assert_eq!(banana.as_str(), "paloaltoCA");

        let banana = Banana::derive("St. Paul", "MN").unwrap();
        assert_eq!(banana.as_str(), "stpaulMN");

        let banana = Banana::derive("Winston-Salem", "nc").unwrap();
        assert_eq!(banana.as_str(), "winstonsalemNC");
    }

    #[test]
    fn banana_rejects_bad_state_codes() {
        assert!(Banana::derive("Nashville", "Tenn").is_err());
        assert!(Banana::derive("Nashville", "t").is_err());
        assert!(Banana::derive("???", "TN").is_err());
    }

    #[test]
    fn banana_parse_round_trips() {
        let banana = Banana::parse("nashvilleTN").unwrap();
        assert_eq!(banana.state(), "TN");
        assert!(Banana::parse("NashvilleTN").is_err());
        assert!(Banana::parse("tn").is_err());
    }

    #[test]
    fn vendor_round_trips_through_strings() {
        for vendor in Vendor::ALL {
            assert_eq!(vendor.as_str().parse::<Vendor>().unwrap(), vendor);
        }
    }

    #[test]
    fn raw_meeting_completeness_requires_a_document() {
        let mut meeting = RawMeeting {
            vendor_meeting_id: "123".into(),
            title: "City Council".into(),
            date: None,
            agenda_url: None,
            packet_urls: vec![],
            participation: Participation::default(),
            status: MeetingStatus::Scheduled,
            fingerprint: None,
            items: vec![],
        };
        assert!(!meeting.is_complete());
        meeting.packet_urls.push("https://example.com/packet.pdf".into());
        assert!(meeting.is_complete());
    }

    #[test]
    fn vote_outcomes_map_to_dispositions() {
        let outcome = VoteOutcome::parse("Adopted").unwrap();
        assert_eq!(outcome, VoteOutcome::Passed);
        assert_eq!(outcome.to_disposition(), MatterDisposition::Passed);
        assert!(outcome.to_disposition().is_terminal());
        assert!(VoteOutcome::parse("present").is_none());
    }
}
