use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::AUTHORIZATION,
    multipart::{Form, Part},
    RequestBuilder, Response, StatusCode,
};
use serde_json::{json, Value};

use crate::{
    auth::AuthState,
    models::{TimesheetList, UsageSample},
    settings::TrackerSettings,
};

use super::{BackendError, TimesheetBackend};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

const OPEN_TIMESHEET_PATH: &str = "/employee/start_timesheet";
const CLOSE_TIMESHEET_PATH: &str = "/employee/stop_tracking";
const CURRENT_TIMESHEET_PATH: &str = "/employee/get_employee_current_timesheet";
const BUFFER_USAGE_PATH: &str = "/employee/event_buffering";
const SYNC_PATH: &str = "/employee/sync";
const UPLOAD_SCREENSHOT_PATH: &str = "/employee/upload-screenshot";

/// REST client for the employee timesheet API.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<AuthState>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth: Arc<AuthState>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::Transport(format!("failed to build client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn from_settings(
        settings: &TrackerSettings,
        auth: Arc<AuthState>,
    ) -> Result<Self, BackendError> {
        Self::new(settings.backend_url.clone(), settings.request_timeout(), auth)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let request = match self.auth.bearer() {
            Some(bearer) => request.header(AUTHORIZATION, bearer),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body);
        log_debug!("backend returned {status} with body {body:?}");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BackendError::Unauthorized { detail })
            }
            StatusCode::NOT_FOUND => Err(BackendError::NotFound { detail }),
            _ => Err(BackendError::Status {
                status: status.as_u16(),
                detail,
            }),
        }
    }
}

/// FastAPI-style error bodies carry the user-facing message in `detail`.
fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("detail")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|detail| !detail.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl TimesheetBackend for HttpBackend {
    async fn open_timesheet(&self) -> Result<(), BackendError> {
        let request = self.client.post(self.url(OPEN_TIMESHEET_PATH)).json(&json!({}));
        self.send(request).await.map(|_| ())
    }

    async fn close_timesheet(&self) -> Result<(), BackendError> {
        let request = self.client.put(self.url(CLOSE_TIMESHEET_PATH)).json(&json!({}));
        self.send(request).await.map(|_| ())
    }

    async fn get_current_timesheet(&self) -> Result<TimesheetList, BackendError> {
        let request = self.client.get(self.url(CURRENT_TIMESHEET_PATH));
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => return Ok(TimesheetList::empty()),
            Err(err) => return Err(err),
        };

        let body = response
            .text()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(TimesheetList::empty());
        }

        serde_json::from_str(&body).map_err(|err| BackendError::Decode(err.to_string()))
    }

    async fn buffer_usage(&self, sample: &UsageSample) -> Result<(), BackendError> {
        let request = self.client.post(self.url(BUFFER_USAGE_PATH)).json(sample);
        self.send(request).await.map(|_| ())
    }

    async fn sync(&self) -> Result<(), BackendError> {
        let request = self.client.post(self.url(SYNC_PATH)).json(&json!({}));
        self.send(request).await.map(|_| ())
    }

    async fn upload_screenshot(&self, png: Vec<u8>, file_name: String) -> Result<(), BackendError> {
        let part = Part::bytes(png)
            .file_name(file_name)
            .mime_str("image/png")
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        let form = Form::new().part("file", part);

        let request = self
            .client
            .post(self.url(UPLOAD_SCREENSHOT_PATH))
            .multipart(form);
        self.send(request).await.map(|_| ())
    }
}
