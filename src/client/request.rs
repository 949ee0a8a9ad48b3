use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use url::Url;

use crate::error::Result;

/// Request payloads the backend accepts
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    /// `application/x-www-form-urlencoded`, used by the token endpoint
    Form(Vec<(String, String)>),
    /// Single-file multipart upload. Kept as raw bytes so the form can be
    /// rebuilt when the request is replayed.
    Multipart {
        field: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Send without credentials and skip the refresh protocol
    pub anonymous: bool,
}

impl RequestOptions {
    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Self::default()
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// An outbound call with everything needed to send it again
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<RequestBody>,
    pub options: RequestOptions,
    retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
            retried: false,
        }
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Marks the single allowed replay. Returns false if it was already used.
    pub(crate) fn mark_retried(&mut self) -> bool {
        if self.retried {
            return false;
        }
        self.retried = true;
        true
    }

    /// Body summary for debug logs. Form bodies carry credentials and are
    /// never printed; secret JSON fields are masked.
    pub(crate) fn describe_body(&self) -> String {
        match &self.body {
            None => "-".to_string(),
            Some(RequestBody::Json(value)) => redact(value).to_string(),
            Some(RequestBody::Form(fields)) => format!("<form: {} fields>", fields.len()),
            Some(RequestBody::Multipart { file_name, bytes, .. }) => {
                format!("<multipart: {} ({} bytes)>", file_name, bytes.len())
            }
        }
    }

    /// Build a fresh reqwest request for one attempt
    pub(crate) fn build(
        &self,
        http: &reqwest::Client,
        url: Url,
        access_token: Option<&str>,
    ) -> Result<RequestBuilder> {
        let mut builder = http.request(self.method.clone(), url);

        if !self.options.query.is_empty() {
            builder = builder.query(&self.options.query);
        }

        for (name, value) in &self.options.headers {
            // The session token always wins over a caller-supplied one
            if access_token.is_some() && name.eq_ignore_ascii_case("authorization") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }

        builder = match &self.body {
            None => builder,
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Multipart {
                field,
                file_name,
                mime,
                bytes,
            }) => {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)?;
                builder.multipart(reqwest::multipart::Form::new().part(field.clone(), part))
            }
        };

        Ok(builder)
    }
}

const SECRET_FIELDS: &[&str] = &["password", "refresh_token", "access_token"];

fn redact(value: &Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, field)| {
                    let shown = if SECRET_FIELDS.contains(&key.as_str()) {
                        Value::String("***".to_string())
                    } else {
                        redact(field)
                    };
                    (key.clone(), shown)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
