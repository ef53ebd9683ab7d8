//! Retry Executor (spec.md §4.E, Component E): the per-request state
//! machine binding credential selection, upstream dispatch, error
//! classification, and retry/terminate. Realized as an iterative attempt
//! loop, not recursion, per spec.md §9 Design Notes. Grounded on
//! `gproxy-core::proxy_engine`'s `ProxyEngine::handle`/`handle_protocol`
//! attempt loop shape (`attempt_no` counter, `loop { … }`, credential-scoped
//! retry-used tracking), replaced here with simpler per-group rotation (no
//! per-op dispatch-rule resolution, no OAuth refresh retry) and the error
//! taxonomy spec.md §7 names.

use std::pin::Pin;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use http::StatusCode;
use tokio::sync::mpsc;

use relay_channels::build_upstream_url;
use relay_headers::{InterpolationContext, apply_header_rules};
use relay_keypool::{KeyPoolError, KeyPoolIndex};
use relay_provider_core::{Credential, CredentialId, Group, Headers, header_remove, header_set};
use relay_stream::{TeeError, tee_stream};
use relay_storage::RecordType;

use crate::channel_instance::ChannelInstanceCache;
use crate::logger::{RecordInputs, RequestLogger, build_record};

/// Everything the Channel Adapter / Header Rule Engine / Request Logger
/// need, captured once per request (spec.md §3 "Attempt Context" minus the
/// per-attempt fields, which live as locals inside `run`).
pub struct IncomingRequest {
    pub group: Group,
    pub method: http::Method,
    /// Full original request path + query, e.g.
    /// `/proxy/prod/v1/chat/completions?foo=bar` (spec.md §6).
    pub request_path_and_query: String,
    pub headers: Headers,
    pub body: Bytes,
    pub source_ip: String,
    pub user_agent: Option<String>,
    /// Set when the caller addressed a specific credential via `/id_<n>/`
    /// — disables retry (spec.md §6, §4.E).
    pub single_credential_id: Option<CredentialId>,
    pub is_stream: bool,
    pub model: Option<String>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

pub enum ProxyOutcome {
    Buffered {
        status: StatusCode,
        headers: Headers,
        body: Bytes,
    },
    Stream {
        status: StatusCode,
        headers: Headers,
        body: ByteStream,
    },
}

pub struct RetryExecutor {
    key_pools: KeyPoolIndex,
    channel_cache: ChannelInstanceCache,
    logger: RequestLogger,
}

const AUTH_HEADER_NAMES: [&str; 3] = ["authorization", "x-api-key", "x-goog-api-key"];

impl RetryExecutor {
    pub fn new(key_pools: KeyPoolIndex, channel_cache: ChannelInstanceCache, logger: RequestLogger) -> Self {
        Self {
            key_pools,
            channel_cache,
            logger,
        }
    }

    pub async fn run(&self, req: IncomingRequest) -> ProxyOutcome {
        let group = &req.group;
        let pool = self.key_pools.pool_for(group.id).await;

        let instance = match self.channel_cache.get_or_build(group).await {
            Ok(instance) => instance,
            Err(err) => {
                return self
                    .terminal_internal_error(&req, "channel instance build failed", &err.to_string())
                    .await;
            }
        };

        let mut attempt_index: u32 = 0;

        loop {
            let attempt_started = Instant::now();

            let credential = match req.single_credential_id {
                Some(id) => pool.select_by_id(id).await,
                None => pool.select().await,
            };
            let credential = match credential {
                Ok(credential) => credential,
                Err(err) => {
                    return self
                        .terminal_selection_error(&req, attempt_started, err)
                        .await;
                }
            };

            let upstream_base = match instance.router.pick().await {
                Ok(base) => base,
                Err(err) => {
                    return self
                        .terminal_internal_error(&req, "no upstream configured", &err.to_string())
                        .await;
                }
            };

            let url = match build_upstream_url(&upstream_base, &group.name, &req.request_path_and_query) {
                Ok(url) => url,
                Err(err) => {
                    return self
                        .terminal_internal_error(&req, "failed to build upstream url", &err.to_string())
                        .await;
                }
            };

            let mut headers = req.headers.clone();
            strip_known_auth_headers(&mut headers);
            instance.adapter.modify_request(&mut headers, &credential.value);
            let interp = InterpolationContext {
                client_ip: &req.source_ip,
                group_name: &group.name,
                api_key: &credential.value,
                now: SystemTime::now(),
            };
            apply_header_rules(&mut headers, &group.header_rules, &interp);

            let client = if req.is_stream {
                &instance.clients.stream
            } else {
                &instance.clients.unary
            };

            let send_result = send_attempt(
                client,
                req.method.clone(),
                &url,
                &headers,
                req.body.clone(),
                req.is_stream,
                instance.clients.response_header_timeout,
            )
            .await;

            let resp = match send_result {
                Ok(resp) => resp,
                Err(message) => {
                    pool.update_status(credential.id, false, group.config.blacklist_threshold)
                        .await;
                    match self
                        .retry_or_terminate(
                            &req,
                            &credential,
                            &mut attempt_index,
                            attempt_started,
                            &url,
                            None,
                            message,
                            Bytes::new(),
                        )
                        .await
                    {
                        Some(outcome) => return outcome,
                        None => continue,
                    }
                }
            };

            match classify_response(resp, req.is_stream).await {
                Classified::Stream {
                    status,
                    headers: upstream_headers,
                    response,
                } => {
                    pool.update_status(credential.id, true, group.config.blacklist_threshold)
                        .await;
                    return self
                        .stream_to_client(
                            &req, group, &credential, status, upstream_headers, response, &url, attempt_started,
                        )
                        .await;
                }
                Classified::Buffered { status, body } => {
                    pool.update_status(credential.id, true, group.config.blacklist_threshold)
                        .await;
                    let duration = attempt_started.elapsed();
                    self.logger
                        .record(build_record(RecordInputs {
                            group_id: group.id,
                            group_name: &group.name,
                            credential_value: Some(&credential.value),
                            model: req.model.clone(),
                            source_ip: req.source_ip.clone(),
                            status: Some(status.as_u16()),
                            request_path: req.request_path_and_query.clone(),
                            duration,
                            error_message: None,
                            user_agent: req.user_agent.clone(),
                            record_type: RecordType::Final,
                            is_stream: false,
                            upstream_address: url.clone(),
                            request_body: &req.body,
                            response_body: body.clone(),
                            response_already_truncated: false,
                            stream_content: None,
                            max_request_body_log_size: group.config.max_request_body_log_size,
                            max_response_body_log_size: group.config.max_response_body_log_size,
                        }))
                        .await;
                    return ProxyOutcome::Buffered {
                        status,
                        headers: json_content_type(),
                        body,
                    };
                }
                Classified::UpstreamError {
                    status,
                    body,
                    parsed_error,
                } => {
                    pool.update_status(credential.id, false, group.config.blacklist_threshold)
                        .await;
                    let message = parsed_error.unwrap_or_else(|| String::from_utf8_lossy(&body).to_string());
                    match self
                        .retry_or_terminate(
                            &req,
                            &credential,
                            &mut attempt_index,
                            attempt_started,
                            &url,
                            Some(status),
                            message,
                            body,
                        )
                        .await
                    {
                        Some(outcome) => return outcome,
                        None => continue,
                    }
                }
            }
        }
    }

    /// Logs one "retry" record and sleeps, or logs the terminal "final"
    /// record and forwards the last upstream body, per spec.md §4.E step 5.
    /// Returns `None` to tell the caller to loop back to Select.
    #[allow(clippy::too_many_arguments)]
    async fn retry_or_terminate(
        &self,
        req: &IncomingRequest,
        credential: &Credential,
        attempt_index: &mut u32,
        attempt_started: Instant,
        upstream_address: &str,
        status: Option<StatusCode>,
        error_message: String,
        body: Bytes,
    ) -> Option<ProxyOutcome> {
        let group = &req.group;
        let single_credential = req.single_credential_id.is_some();
        let can_retry = !single_credential && *attempt_index < group.config.max_retries;

        if can_retry {
            let duration = attempt_started.elapsed();
            self.logger
                .record(build_record(RecordInputs {
                    group_id: group.id,
                    group_name: &group.name,
                    credential_value: Some(&credential.value),
                    model: req.model.clone(),
                    source_ip: req.source_ip.clone(),
                    status: status.map(|s| s.as_u16()),
                    request_path: req.request_path_and_query.clone(),
                    duration,
                    error_message: Some(error_message),
                    user_agent: req.user_agent.clone(),
                    record_type: RecordType::Retry,
                    is_stream: req.is_stream,
                    upstream_address: upstream_address.to_string(),
                    request_body: &req.body,
                    response_body: body,
                    response_already_truncated: false,
                    stream_content: None,
                    max_request_body_log_size: group.config.max_request_body_log_size,
                    max_response_body_log_size: group.config.max_response_body_log_size,
                }))
                .await;
            tokio::time::sleep(Duration::from_millis(group.config.retry_interval_ms)).await;
            *attempt_index += 1;
            return None;
        }

        let duration = attempt_started.elapsed();
        let response_status = status.unwrap_or(StatusCode::BAD_GATEWAY);
        self.logger
            .record(build_record(RecordInputs {
                group_id: group.id,
                group_name: &group.name,
                credential_value: Some(&credential.value),
                model: req.model.clone(),
                source_ip: req.source_ip.clone(),
                status: Some(response_status.as_u16()),
                request_path: req.request_path_and_query.clone(),
                duration,
                error_message: Some(error_message),
                user_agent: req.user_agent.clone(),
                record_type: RecordType::Final,
                is_stream: req.is_stream,
                upstream_address: upstream_address.to_string(),
                request_body: &req.body,
                response_body: body.clone(),
                response_already_truncated: false,
                stream_content: None,
                max_request_body_log_size: group.config.max_request_body_log_size,
                max_response_body_log_size: group.config.max_response_body_log_size,
            }))
            .await;

        let (headers, forwarded_body) = wrap_or_passthrough_error(&body);
        Some(ProxyOutcome::Buffered {
            status: response_status,
            headers,
            body: forwarded_body,
        })
    }

    async fn terminal_selection_error(&self, req: &IncomingRequest, attempt_started: Instant, err: KeyPoolError) -> ProxyOutcome {
        let group = &req.group;
        let (status, message) = match err {
            KeyPoolError::NoKeysAvailable => (StatusCode::SERVICE_UNAVAILABLE, "no active credentials available for group".to_string()),
            KeyPoolError::KeyNotFound(id) => (StatusCode::BAD_REQUEST, format!("credential {id} not found")),
            KeyPoolError::KeyInactive(id) => (StatusCode::BAD_REQUEST, format!("credential {id} is not active")),
        };
        self.logger
            .record(build_record(RecordInputs {
                group_id: group.id,
                group_name: &group.name,
                credential_value: None,
                model: req.model.clone(),
                source_ip: req.source_ip.clone(),
                status: Some(status.as_u16()),
                request_path: req.request_path_and_query.clone(),
                duration: attempt_started.elapsed(),
                error_message: Some(message.clone()),
                user_agent: req.user_agent.clone(),
                record_type: RecordType::Final,
                is_stream: req.is_stream,
                upstream_address: String::new(),
                request_body: &req.body,
                response_body: Bytes::new(),
                response_already_truncated: false,
                stream_content: None,
                max_request_body_log_size: group.config.max_request_body_log_size,
                max_response_body_log_size: group.config.max_response_body_log_size,
            }))
            .await;
        ProxyOutcome::Buffered {
            status,
            headers: json_content_type(),
            body: wrap_error_json("KEY_PROVIDER_ERROR", &message),
        }
    }

    async fn terminal_internal_error(&self, req: &IncomingRequest, context: &str, detail: &str) -> ProxyOutcome {
        let group = &req.group;
        let message = format!("{context}: {detail}");
        tracing::error!(group = %group.name, error = %message, "internal_error");
        self.logger
            .record(build_record(RecordInputs {
                group_id: group.id,
                group_name: &group.name,
                credential_value: None,
                model: req.model.clone(),
                source_ip: req.source_ip.clone(),
                status: Some(500),
                request_path: req.request_path_and_query.clone(),
                duration: Duration::ZERO,
                error_message: Some(message.clone()),
                user_agent: req.user_agent.clone(),
                record_type: RecordType::Final,
                is_stream: req.is_stream,
                upstream_address: String::new(),
                request_body: &req.body,
                response_body: Bytes::new(),
                response_already_truncated: false,
                stream_content: None,
                max_request_body_log_size: group.config.max_request_body_log_size,
                max_response_body_log_size: group.config.max_response_body_log_size,
            }))
            .await;
        ProxyOutcome::Buffered {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: json_content_type(),
            body: wrap_error_json("INTERNAL_ERROR", &message),
        }
    }

    /// Streams the upstream 2xx body to the client while teeing it into
    /// log/parse buffers, via a channel-pump task (spec.md §4.F). Grounded
    /// on `WreqUpstreamClient::convert_response`'s chunk-pump
    /// (`tokio::sync::mpsc` + spawned forwarding task), generalized to also
    /// run the Stream Parser and emit the terminal log record once the tee
    /// completes — the spawn boundary is what lets a client mid-stream
    /// disconnect (detected by the forwarding `send` failing) produce
    /// exactly one "final" record without the handler blocking on it.
    #[allow(clippy::too_many_arguments)]
    async fn stream_to_client(
        &self,
        req: &IncomingRequest,
        group: &Group,
        credential: &Credential,
        status: StatusCode,
        mut headers: Headers,
        response: reqwest::Response,
        upstream_address: &str,
        attempt_started: Instant,
    ) -> ProxyOutcome {
        header_set(&mut headers, "Content-Type", "text/event-stream");
        header_set(&mut headers, "Cache-Control", "no-cache");
        header_set(&mut headers, "Connection", "keep-alive");
        header_set(&mut headers, "X-Accel-Buffering", "no");

        let (tx, rx) = mpsc::channel::<Bytes>(16);
        let upstream_byte_stream = Box::pin(response.bytes_stream().map(|item| {
            item.map_err(|err| std::io::Error::other(err.to_string()))
        }));

        let channel_kind = group.channel;
        let log_ceiling = group.config.max_response_body_log_size;
        let request_body = req.body.clone();
        let request_path = req.request_path_and_query.clone();
        let source_ip = req.source_ip.clone();
        let user_agent = req.user_agent.clone();
        let model = req.model.clone();
        let group_id = group.id;
        let group_name = group.name.clone();
        let credential_value = credential.value.clone();
        let upstream_address = upstream_address.to_string();
        let max_request_body_log_size = group.config.max_request_body_log_size;
        let logger = self.logger.clone();

        tokio::spawn(async move {
            let outcome = tee_stream(
                upstream_byte_stream,
                move |chunk| {
                    let tx = tx.clone();
                    async move { tx.send(chunk).await.map_err(|_| TeeError::ClientDisconnected) }
                },
                channel_kind,
                log_ceiling,
            )
            .await;

            let client_disconnected = outcome.parsed.is_none();
            let record = build_record(RecordInputs {
                group_id,
                group_name: &group_name,
                credential_value: Some(credential_value.as_str()),
                model,
                source_ip,
                status: Some(if client_disconnected { 499 } else { status.as_u16() }),
                request_path,
                duration: attempt_started.elapsed(),
                error_message: None,
                user_agent,
                record_type: RecordType::Final,
                is_stream: true,
                upstream_address,
                request_body: &request_body,
                response_body: outcome.log_body,
                response_already_truncated: outcome.log_truncated,
                stream_content: outcome.parsed,
                max_request_body_log_size,
                max_response_body_log_size: log_ceiling,
            });
            logger.record(record).await;
        });

        let body_stream: ByteStream = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        }));

        ProxyOutcome::Stream {
            status,
            headers,
            body: body_stream,
        }
    }
}

fn strip_known_auth_headers(headers: &mut Headers) {
    for name in AUTH_HEADER_NAMES {
        header_remove(headers, name);
    }
}

fn json_content_type() -> Headers {
    vec![("content-type".to_string(), "application/json".to_string())]
}

fn wrap_error_json(code: &str, message: &str) -> Bytes {
    let body = serde_json::json!({ "error": { "code": code, "message": message } });
    Bytes::from(serde_json::to_vec(&body).unwrap_or_default())
}

/// §6 "Error passthrough on terminal failure": forward a JSON object
/// verbatim, otherwise wrap the raw body as an `UPSTREAM_ERROR`.
fn wrap_or_passthrough_error(body: &Bytes) -> (Headers, Bytes) {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value @ serde_json::Value::Object(_)) => {
            let encoded = serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec());
            (json_content_type(), Bytes::from(encoded))
        }
        _ => {
            let message = String::from_utf8_lossy(body).to_string();
            (json_content_type(), wrap_error_json("UPSTREAM_ERROR", &message))
        }
    }
}

/// Best-effort human-readable message extraction from a vendor error body
/// (spec.md §4.E "extract a human-readable parsed error … best effort").
fn extract_parsed_error(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("error")
        .and_then(|err| err.get("message"))
        .and_then(serde_json::Value::as_str)
        .or_else(|| value.get("message").and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

fn headers_to_vec(headers: &reqwest::header::HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.as_str().to_string(), s.to_string())))
        .collect()
}

fn is_gzip(headers: &Headers) -> bool {
    headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("content-encoding") && v.eq_ignore_ascii_case("gzip"))
}

/// §9 Gzip: decompressed for the unary/log-parse path only, never on the
/// byte-for-byte streaming forward path. Falls back to the raw bytes on a
/// malformed gzip stream rather than failing the request.
fn gunzip(body: &[u8]) -> Bytes {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(body);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => Bytes::from(out),
        Err(_) => Bytes::copy_from_slice(body),
    }
}

enum Classified {
    Stream {
        status: StatusCode,
        headers: Headers,
        response: reqwest::Response,
    },
    Buffered {
        status: StatusCode,
        body: Bytes,
    },
    UpstreamError {
        status: StatusCode,
        body: Bytes,
        parsed_error: Option<String>,
    },
}

/// §4.E step 3 "Classify": HTTP 404 or status < 400 is pass-through
/// success (404 reflects routing, not credential health, and is
/// deliberately non-retryable); everything else is a retryable upstream
/// error. Only 2xx pass-through responses are eligible to stream — a
/// non-2xx pass-through (e.g. a 3xx) is buffered like an error body.
async fn classify_response(response: reqwest::Response, want_stream: bool) -> Classified {
    let status = response.status();
    let is_pass_through = status.as_u16() == 404 || status.as_u16() < 400;

    if is_pass_through && want_stream && status.is_success() {
        let headers = headers_to_vec(response.headers());
        return Classified::Stream {
            status,
            headers,
            response,
        };
    }

    let gzip = is_gzip(&headers_to_vec(response.headers()));
    let raw = response.bytes().await.unwrap_or_default();
    let body = if gzip { gunzip(&raw) } else { raw };

    if is_pass_through {
        Classified::Buffered { status, body }
    } else {
        let parsed_error = extract_parsed_error(&body);
        Classified::UpstreamError {
            status,
            body,
            parsed_error,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn send_attempt(
    client: &reqwest::Client,
    method: http::Method,
    url: &str,
    headers: &Headers,
    body: Bytes,
    is_stream: bool,
    response_header_timeout: Duration,
) -> Result<reqwest::Response, String> {
    let mut builder = client.request(method, url).body(body);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let send_future = builder.send();
    let result = if is_stream {
        match tokio::time::timeout(response_header_timeout, send_future).await {
            Ok(inner) => inner,
            Err(_) => return Err("timed out waiting for response headers".to_string()),
        }
    } else {
        send_future.await
    };

    result.map_err(|err| err.to_string())
}
