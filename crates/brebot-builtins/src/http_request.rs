use brebot_core::{BrebotError, BrebotResult};
use brebot_skills::{Skill, SkillCall, SkillDescriptor, SkillOutput};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// HTTP request skill. Calls external APIs with GET/POST/PUT/PATCH/DELETE.
pub struct HttpRequestSkill {
    descriptor: SkillDescriptor,
    client: reqwest::Client,
    allow_private: bool,
}

impl HttpRequestSkill {
    pub fn new() -> BrebotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| BrebotError::Skill(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            descriptor: SkillDescriptor {
                id: "http_request".to_string(),
                name: "HTTP request".to_string(),
                description: "Call an external HTTP API (webhook, n8n flow, REST endpoint)."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "The URL to call"},
                        "method": {
                            "type": "string",
                            "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"],
                            "description": "HTTP method (default: GET)"
                        },
                        "headers": {
                            "type": "object",
                            "description": "Optional HTTP headers as key-value pairs"
                        },
                        "json": {"description": "Optional JSON request body"}
                    },
                    "required": ["url"]
                }),
                critical_default: false,
                keywords: vec![
                    "http".into(),
                    "api".into(),
                    "webhook".into(),
                    "fetch".into(),
                    "call".into(),
                ],
            },
            client,
            allow_private: false,
        })
    }

    /// Permit loopback and private-network targets. Off by default.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private = true;
        self
    }
}

#[async_trait]
impl Skill for HttpRequestSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: SkillCall) -> BrebotResult<SkillOutput> {
        let url = call.str_input("url").unwrap_or_default();
        if url.is_empty() {
            return Err(BrebotError::Execution("Empty URL".into()));
        }

        let parsed_url = reqwest::Url::parse(url)
            .map_err(|e| BrebotError::Execution(format!("Invalid URL '{url}': {e}")))?;

        match parsed_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(BrebotError::Execution(format!(
                    "Unsupported scheme '{scheme}'. Only http/https allowed."
                )));
            }
        }

        // Block internal/private networks (SSRF prevention)
        if let Some(host) = parsed_url.host_str() {
            if !self.allow_private && is_private_host(host) {
                return Err(BrebotError::Execution(format!(
                    "Access denied: '{host}' resolves to a private/internal address"
                )));
            }
        }

        let method = call.str_input("method").unwrap_or("GET").to_uppercase();
        let mut request = match method.as_str() {
            "GET" => self.client.get(parsed_url),
            "POST" => self.client.post(parsed_url),
            "PUT" => self.client.put(parsed_url),
            "PATCH" => self.client.patch(parsed_url),
            "DELETE" => self.client.delete(parsed_url),
            _ => {
                return Err(BrebotError::Execution(format!(
                    "Unsupported method '{method}'"
                )));
            }
        };

        if let Some(headers) = call.inputs.get("headers").and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(key.as_str(), v);
                }
            }
        }
        if let Some(body) = call.inputs.get("json") {
            request = request.json(body);
        }

        info!(job_id = %call.job_id, step_no = call.step_no, url = %url, method = %method, "HTTP request");

        let response = request
            .send()
            .await
            .map_err(|e| BrebotError::Execution(format!("HTTP request failed: {e}")))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| BrebotError::Execution(format!("Failed to read response body: {e}")))?;

        if body_bytes.len() > MAX_RESPONSE_SIZE {
            return Err(BrebotError::Execution(format!(
                "Response too large: {} bytes (max: {MAX_RESPONSE_SIZE} bytes)",
                body_bytes.len()
            )));
        }

        let body_text = String::from_utf8_lossy(&body_bytes).to_string();
        if !(200..400).contains(&status) {
            return Err(BrebotError::Execution(format!(
                "HTTP {status} from {url}: {}",
                body_text.chars().take(200).collect::<String>()
            )));
        }

        let body = if content_type.contains("json") {
            serde_json::from_str(&body_text).unwrap_or(serde_json::Value::String(body_text))
        } else {
            serde_json::Value::String(body_text)
        };

        Ok(SkillOutput::new(serde_json::json!({
            "status": status,
            "contentType": content_type,
            "body": body,
        })))
    }
}

/// Check if a host resolves to a private/internal network address (SSRF prevention).
fn is_private_host(host: &str) -> bool {
    let private_patterns = [
        "localhost",
        "127.",
        "10.",
        "192.168.",
        "169.254.",
        "0.0.0.0",
        "[::1]",
        "::1",
        "metadata.google",
        "metadata.aws",
    ];

    let host_lower = host.to_lowercase();
    if private_patterns.iter().any(|p| host_lower.starts_with(p)) {
        return true;
    }
    // 172.16.0.0/12
    if let Some(rest) = host_lower.strip_prefix("172.") {
        if let Some(octet) = rest.split('.').next().and_then(|o| o.parse::<u8>().ok()) {
            return (16..=31).contains(&octet);
        }
    }
    false
}
