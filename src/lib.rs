// Engagic - civic meeting ingestion and processing core
// Root library module

pub mod adapters;
pub mod config;
pub mod errors;
pub mod extractor;
pub mod matter_id;
pub mod matter_tracker;
pub mod observability;
pub mod pipeline;
pub mod repository;
pub mod seed;
pub mod summarizer;
pub mod topics;
pub mod types;

// Re-export the pieces callers wire together
pub use config::Config;
pub use observability::init_logging;

pub use errors::{
    ConfigError, DatabaseError, ExtractionError, JobError, ProcessingError, ValidationError,
    VendorError,
};

pub use types::{
    AgendaItem, Attachment, Banana, City, CityStatus, Confidence, FetchWindow, JobKind, JobStatus,
    Matter, MatterAppearance, MatterDisposition, Meeting, MeetingPayload, MeetingStatus,
    Participation, ProcessingMethod, ProcessingStatus, QueueJob, RawAgendaItem, RawMeeting,
    RawVote, Sponsor, TextQuality, Vendor, VoteOutcome, VoteTally,
};

pub use adapters::{for_vendor, AdapterClient, VendorAdapter};
pub use extractor::{ExtractedText, ExtractionStrategy, TextExtractor};
pub use matter_id::{generate_matter_id, normalize_title};
pub use matter_tracker::{MatterTracker, TrackDecision, TrackedItem};
pub use summarizer::{LlmSummarizer, Summarizer, SummaryRequest, SummaryResult};
pub use topics::{taxonomy, Taxonomy};

pub use repository::cities::{CityFilters, CityLookup, CityRepo};
pub use repository::items::{ItemRecord, ItemRepo, ItemSummaryUpdate};
pub use repository::matters::{MatterRepo, NewMatter};
pub use repository::meetings::{MeetingRepo, StoreOutcome};
pub use repository::queue::{meeting_priority, ClaimedJob, QueueRepo, QueueStats, SYNC_PRIORITY};
pub use repository::search::{SearchQuery, SearchRepo, SearchResults};
pub use repository::{connect, migrate, transaction};

pub use pipeline::{Conductor, Fetcher, Processor, VendorRateLimiter};
