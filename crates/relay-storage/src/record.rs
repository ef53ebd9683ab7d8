//! `Request Log Record` (spec.md §3): immutable once recorded. Assembled
//! by `relay-core::RequestLogger` (Component G) and delivered through
//! `LogSink`.

use relay_provider_core::GroupId;
use relay_stream::StreamContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Retry,
    Final,
}

#[derive(Debug, Clone)]
pub struct RequestLogRecord {
    pub id: String,
    pub timestamp: time::OffsetDateTime,
    pub group_id: GroupId,
    pub group_name: String,
    pub credential_value: Option<String>,
    pub model: Option<String>,
    pub success: bool,
    pub source_ip: String,
    pub status: Option<u16>,
    pub request_path: String,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub user_agent: Option<String>,
    pub record_type: RecordType,
    pub is_stream: bool,
    pub upstream_address: String,
    pub request_body: String,
    pub response_body: String,
    pub stream_content: Option<StreamContent>,
}
