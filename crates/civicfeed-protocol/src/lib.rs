//! Request and response bodies of the civicfeed HTTP API.

pub mod error;
pub mod types;

pub use error::{ErrorCode, ErrorResponse};
pub use types::{
    CommentStatusRequest, CreateCommentRequest, CreateReportRequest, EventStatusRequest, EventView,
    IngestionReport, PublicEvent, ReportReceipt, SourceError, SourceResult,
};
