use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{InferenceClient, InferenceFailure, SubmitOptions};
use crate::detect::wire::WireScanRecord;
use crate::detect::DetectionResult;
use crate::history::{HistoryEntry, HistoryFeed, HistoryQuery};
use crate::ingest::CapturedFrame;

const MAX_RESPONSE_BYTES: u64 = 4 * 1024 * 1024;
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Blocking HTTP client for the detection service.
///
/// Every request is bounded by the agent timeout so a stuck service cannot
/// leave a scan loading forever.
#[derive(Clone, Debug)]
pub struct HttpInferenceClient {
    base: Url,
    agent: ureq::Agent,
}

impl HttpInferenceClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid api url '{}': {}", base_url, e))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { base, agent })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, InferenceFailure> {
        self.base
            .join(path)
            .map_err(|e| InferenceFailure::Network(format!("bad endpoint {}: {}", path, e)))
    }
}

impl InferenceClient for HttpInferenceClient {
    fn submit(
        &self,
        frame: &CapturedFrame,
        options: SubmitOptions,
    ) -> Result<DetectionResult, InferenceFailure> {
        let dims = frame.dims();
        if !dims.is_valid() {
            return Err(InferenceFailure::InvalidFrame(dims.to_string()));
        }

        let mut url = self.endpoint("detect/")?;
        url.query_pairs_mut()
            .append_pair("store", if options.persist { "true" } else { "false" });

        let boundary = format!("faceguard-{:016x}", rand::random::<u64>());
        let body = multipart_body(&boundary, frame);

        let started = Instant::now();
        let response = self
            .agent
            .post(url.as_str())
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .map_err(classify_error)?;
        let record: WireScanRecord = read_json(response)?;
        let boxes = record
            .boxes()
            .map_err(|e| InferenceFailure::InvalidResponse(e.to_string()))?;
        log::debug!(
            "detect {} ({}, {} bytes, store={}) -> {} boxes in {}ms",
            frame.filename(),
            dims,
            frame.bytes().len(),
            options.persist,
            boxes.len(),
            started.elapsed().as_millis()
        );
        DetectionResult::new(record.scan_id(), boxes, dims)
            .map_err(|e| InferenceFailure::InvalidResponse(e.to_string()))
    }
}

impl HistoryFeed for HttpInferenceClient {
    fn fetch(&self, query: HistoryQuery) -> Result<Vec<HistoryEntry>, InferenceFailure> {
        let mut url = self.endpoint("history/")?;
        url.query_pairs_mut()
            .append_pair("skip", &query.skip.to_string())
            .append_pair("limit", &query.limit.to_string());
        let response = self.agent.get(url.as_str()).call().map_err(classify_error)?;
        let records: Vec<WireScanRecord> = read_json(response)?;
        records
            .into_iter()
            .map(|record| {
                HistoryEntry::from_wire(record)
                    .map_err(|e| InferenceFailure::InvalidResponse(e.to_string()))
            })
            .collect()
    }
}

fn multipart_body(boundary: &str, frame: &CapturedFrame) -> Vec<u8> {
    let filename = frame.filename().replace(['"', '\r', '\n'], "_");
    let mut body = Vec::with_capacity(frame.bytes().len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", frame.content_type()).as_bytes());
    body.extend_from_slice(frame.bytes());
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn read_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, InferenceFailure> {
    let mut raw = String::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_string(&mut raw)
        .map_err(|e| classify_io(&e))?;
    serde_json::from_str(&raw).map_err(|e| InferenceFailure::InvalidResponse(e.to_string()))
}

fn classify_error(err: ureq::Error) -> InferenceFailure {
    match err {
        ureq::Error::Status(status, response) => {
            let message: String = response
                .into_string()
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_MESSAGE_CHARS)
                .collect();
            InferenceFailure::Service { status, message }
        }
        ureq::Error::Transport(transport) => {
            if is_timeout(&transport) {
                InferenceFailure::Timeout
            } else {
                InferenceFailure::Network(transport.to_string())
            }
        }
    }
}

fn classify_io(err: &std::io::Error) -> InferenceFailure {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => InferenceFailure::Timeout,
        _ => InferenceFailure::Network(err.to_string()),
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = err.source();
    }
    transport.to_string().contains("timed out")
}
