//! Request Logger (spec.md §4.G, Component G): assembles the immutable
//! `RequestLogRecord` from an attempt's outcome and truncation rules, then
//! delivers it to the `LogSink` collaborator. Delivery failure is reported
//! at `error` level but never propagates to the client response. Grounded
//! on `gproxy-core::handler`'s `DownstreamTrafficEvent` assembly, trimmed
//! to the fields spec.md §3 names.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use relay_common::truncate::{TRUNCATION_MARKER, truncate_body_with_marker, truncate_str};
use relay_provider_core::GroupId;
use relay_stream::StreamContent;
use relay_storage::{LogSink, RecordType, RequestLogRecord};

/// §4.G: "response body to a fixed ceiling (>= 64 KiB recommended)" — the
/// floor applied underneath whatever a group's `MaxResponseBodyLogSize`
/// configures.
const RESPONSE_CEILING_FLOOR: usize = 64 * 1024;
const PATH_AND_ADDRESS_LIMIT: usize = 500;
const USER_AGENT_LIMIT: usize = 512;

pub struct RecordInputs<'a> {
    pub group_id: GroupId,
    pub group_name: &'a str,
    pub credential_value: Option<&'a str>,
    pub model: Option<String>,
    pub source_ip: String,
    pub status: Option<u16>,
    pub request_path: String,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub user_agent: Option<String>,
    pub record_type: RecordType,
    pub is_stream: bool,
    pub upstream_address: String,
    pub request_body: &'a Bytes,
    pub response_body: Bytes,
    /// `true` when `response_body` was already cut short by the Streaming
    /// Tee (spec.md §4.F) and needs the truncation marker appended, rather
    /// than re-truncated here.
    pub response_already_truncated: bool,
    pub stream_content: Option<StreamContent>,
    pub max_request_body_log_size: usize,
    pub max_response_body_log_size: usize,
}

pub fn build_record(inputs: RecordInputs<'_>) -> RequestLogRecord {
    let response_ceiling = inputs.max_response_body_log_size.max(RESPONSE_CEILING_FLOOR);
    let response_body = if inputs.response_already_truncated {
        format!(
            "{}{TRUNCATION_MARKER}",
            String::from_utf8_lossy(&inputs.response_body)
        )
    } else {
        truncate_body_with_marker(&inputs.response_body, response_ceiling)
    };
    let request_body = truncate_str(
        &String::from_utf8_lossy(inputs.request_body),
        inputs.max_request_body_log_size,
    );

    let success = inputs.error_message.is_none() && inputs.status.is_some_and(|s| s < 400);

    RequestLogRecord {
        id: relay_common::ids::new_record_id(),
        timestamp: time::OffsetDateTime::now_utc(),
        group_id: inputs.group_id,
        group_name: inputs.group_name.to_string(),
        credential_value: inputs.credential_value.map(str::to_string),
        model: inputs.model,
        success,
        source_ip: inputs.source_ip,
        status: inputs.status,
        request_path: truncate_str(&inputs.request_path, PATH_AND_ADDRESS_LIMIT),
        duration_ms: inputs.duration.as_millis() as u64,
        error_message: inputs.error_message,
        user_agent: inputs
            .user_agent
            .map(|ua| truncate_str(&ua, USER_AGENT_LIMIT)),
        record_type: inputs.record_type,
        is_stream: inputs.is_stream,
        upstream_address: truncate_str(&inputs.upstream_address, PATH_AND_ADDRESS_LIMIT),
        request_body,
        response_body,
        stream_content: inputs.stream_content,
    }
}

#[derive(Clone)]
pub struct RequestLogger {
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Records exactly one log entry. Never fails the caller: a sink error
    /// is logged at `error` and swallowed (spec.md §7 "LogSinkFailure").
    pub async fn record(&self, record: RequestLogRecord) {
        let record_type = record.record_type;
        let success = record.success;
        let status = record.status;
        let group_name = record.group_name.clone();

        if let Err(err) = self.sink.record(record).await {
            tracing::error!(error = %err, group = %group_name, "request log sink delivery failed");
        }

        match (record_type, success) {
            (RecordType::Final, true) => {
                tracing::info!(group = %group_name, status = ?status, "request_final")
            }
            (RecordType::Final, false) => {
                tracing::warn!(group = %group_name, status = ?status, "request_final")
            }
            (RecordType::Retry, _) => {
                tracing::warn!(group = %group_name, status = ?status, "request_retry")
            }
        }
    }
}
