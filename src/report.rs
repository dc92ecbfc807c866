//! Report pipeline
//!
//! One report request runs these stages in order, inside a single job:
//! fetch history → reconstruct threads → render → upload. Upload is the last
//! stage, so a failed job never leaves a half-written report behind.

use crate::config::{Config, ReportConfig};
use crate::dispatcher::JobQueue;
use crate::error::{Error, Result};
use crate::graph::{DriveUploader, GraphClient, HistoryFetcher, TokenProvider};
use crate::render::ReportRenderer;
use crate::threads::reconstruct;
use crate::types::{
    JobId, Message, ReportDetails, ReportFormat, ReportParameters, ReportScope, UploadedItem,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Receives the outcome of a background report job
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    /// The report was stored in the drive
    async fn report_ready(&self, params: &ReportParameters, item: &UploadedItem);

    /// The report could not be produced; the user gets an apology
    async fn report_failed(&self, params: &ReportParameters, error: &Error);
}

/// Produces history reports and stores them in a drive
#[derive(Clone)]
pub struct HistoryReportService {
    fetcher: HistoryFetcher,
    uploader: DriveUploader,
    renderer: Arc<dyn ReportRenderer>,
    reports_folder: Option<String>,
    formats: Vec<ReportFormat>,
}

impl HistoryReportService {
    /// Build the service from configuration
    pub fn new(
        config: &Config,
        tokens: Arc<dyn TokenProvider>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        let client = GraphClient::new(config, tokens);
        Self::from_parts(
            HistoryFetcher::new(client.clone(), &config.fetch),
            DriveUploader::new(client, &config.upload),
            renderer,
            &config.report,
        )
    }

    /// Build the service from already constructed components
    ///
    /// Lets several services share one [`GraphClient`] and connection pool.
    pub fn from_parts(
        fetcher: HistoryFetcher,
        uploader: DriveUploader,
        renderer: Arc<dyn ReportRenderer>,
        report: &ReportConfig,
    ) -> Self {
        Self {
            fetcher,
            uploader,
            renderer,
            reports_folder: report.reports_folder.clone(),
            formats: report.formats.clone(),
        }
    }

    /// Run the whole pipeline for one request and return the stored file
    ///
    /// # Errors
    ///
    /// - [`Error::Render`] if `params.format` is not enabled in the report
    ///   configuration or no renderer handles it (both checked before any request
    ///   is made), or if rendering fails
    /// - [`Error::Fetch`] / [`Error::Upload`] for remote failures
    pub async fn prepare_report_in_drive(
        &self,
        params: &ReportParameters,
        cancel: &CancellationToken,
    ) -> Result<UploadedItem> {
        if !self.formats.contains(&params.format) {
            return Err(Error::Render(format!(
                "{} reports are not enabled",
                params.format
            )));
        }
        if !self.renderer.supports(params.format) {
            return Err(Error::Render(format!(
                "no renderer registered for {} reports",
                params.format
            )));
        }

        let till = Utc::now();
        let since = params.period.since(till);

        let messages = self
            .fetcher
            .fetch_history(&params.scope, since, cancel)
            .await?;
        let details = build_details(params, since, till, messages);
        tracing::debug!(
            threads = details.threads.len(),
            messages = details.message_count(),
            format = %params.format,
            "Rendering report"
        );

        let document = self.renderer.render(&details, params.format)?;

        let file_name = report_file_name(till, params.format);
        let path = match self.reports_folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(folder) if !folder.is_empty() => format!("{folder}/{file_name}"),
            _ => file_name.clone(),
        };

        let mut item = self
            .uploader
            .upload(&document, &path, &params.drive, cancel)
            .await?;
        item.file_name = Some(file_name);

        tracing::info!(
            path = %path,
            bytes = document.len(),
            messages = details.message_count(),
            "Report stored in drive"
        );
        Ok(item)
    }

    /// Queue a report job and return without waiting
    ///
    /// When the job finishes, `notifier` gets exactly one call: `report_ready`
    /// with the stored file, or `report_failed` with the error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if the queue no longer accepts jobs.
    pub fn submit_report(
        self: &Arc<Self>,
        queue: &JobQueue,
        params: ReportParameters,
        notifier: Arc<dyn FailureNotifier>,
    ) -> Result<JobId> {
        let service = Arc::clone(self);
        let name = format!("{} report", params.format);

        queue.submit(name, move |cancel| async move {
            match service.prepare_report_in_drive(&params, &cancel).await {
                Ok(item) => {
                    notifier.report_ready(&params, &item).await;
                    Ok(())
                }
                Err(e) => {
                    notifier.report_failed(&params, &e).await;
                    Err(e)
                }
            }
        })
    }
}

impl std::fmt::Debug for HistoryReportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryReportService")
            .field("fetcher", &self.fetcher)
            .field("uploader", &self.uploader)
            .field("reports_folder", &self.reports_folder)
            .field("formats", &self.formats)
            .finish_non_exhaustive()
    }
}

/// `{till:%Y-%m-%d_%H-%M-%S}_history_report_.{ext}`
pub fn report_file_name(till: DateTime<Utc>, format: ReportFormat) -> String {
    format!(
        "{}_history_report_.{}",
        till.format("%Y-%m-%d_%H-%M-%S"),
        format.extension()
    )
}

/// Assemble the renderer input for a request
pub fn build_details(
    params: &ReportParameters,
    since: Option<DateTime<Utc>>,
    till: DateTime<Utc>,
    messages: Vec<Message>,
) -> ReportDetails {
    let (is_channel, is_conversation, is_group_chat, team_id) = match &params.scope {
        ReportScope::Chat { .. } => (false, false, true, None),
        ReportScope::Channel { team_id, .. } => (true, false, false, Some(team_id.clone())),
        ReportScope::Thread { team_id, .. } => (false, true, false, Some(team_id.clone())),
    };

    ReportDetails {
        since,
        till,
        team_name: params.team_name.clone(),
        team_id,
        channel_name: params.channel_name.clone(),
        author: params.author.clone(),
        is_channel,
        is_conversation,
        is_group_chat,
        threads: reconstruct(messages),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StaticToken;
    use crate::render::RendererRegistry;
    use crate::types::{DriveScope, ReportPeriod};
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(scope: ReportScope, format: ReportFormat) -> ReportParameters {
        ReportParameters {
            scope,
            period: ReportPeriod::Last7Days,
            format,
            drive: DriveScope::Personal,
            author: Some("Alex".to_string()),
            team_name: None,
            channel_name: None,
        }
    }

    fn service(server: &MockServer, folder: Option<&str>) -> HistoryReportService {
        let mut config = Config::default();
        config.graph.endpoint = server.uri();
        config.retry.max_retries = 0;
        config.report.reports_folder = folder.map(str::to_string);
        HistoryReportService::new(
            &config,
            Arc::new(StaticToken::new("t")),
            Arc::new(RendererRegistry::with_builtins()),
        )
    }

    #[test]
    fn file_name_uses_generation_time() {
        let till = Utc.with_ymd_and_hms(2024, 2, 29, 23, 5, 1).unwrap();
        assert_eq!(
            report_file_name(till, ReportFormat::Pdf),
            "2024-02-29_23-05-01_history_report_.pdf"
        );
    }

    #[test]
    fn details_flags_follow_scope() {
        let till = Utc::now();
        let channel = params(
            ReportScope::Channel {
                team_id: "t1".to_string(),
                channel_id: "c1".to_string(),
            },
            ReportFormat::Txt,
        );
        let details = build_details(&channel, None, till, Vec::new());
        assert!(details.is_channel && !details.is_conversation && !details.is_group_chat);
        assert_eq!(details.team_id.as_deref(), Some("t1"));

        let chat = params(
            ReportScope::Chat {
                chat_id: "x".to_string(),
            },
            ReportFormat::Txt,
        );
        let details = build_details(&chat, None, till, Vec::new());
        assert!(details.is_group_chat);
        assert_eq!(details.team_id, None);
    }

    #[tokio::test]
    async fn unsupported_format_fails_before_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = service(&server, None)
            .prepare_report_in_drive(
                &params(
                    ReportScope::Chat {
                        chat_id: "c".to_string(),
                    },
                    ReportFormat::Html,
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[tokio::test]
    async fn disabled_format_fails_before_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.graph.endpoint = server.uri();
        config.report.formats = vec![ReportFormat::Txt];
        let client = GraphClient::with_http_client(
            reqwest::Client::new(),
            &config,
            Arc::new(StaticToken::new("t")),
        );
        let service = HistoryReportService::from_parts(
            HistoryFetcher::new(client.clone(), &config.fetch),
            DriveUploader::new(client, &config.upload),
            Arc::new(RendererRegistry::with_builtins()),
            &config.report,
        );

        let err = service
            .prepare_report_in_drive(
                &params(
                    ReportScope::Chat {
                        chat_id: "c".to_string(),
                    },
                    ReportFormat::Json,
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            Error::Render(message) => assert!(message.contains("JSON"), "got: {message}"),
            other => panic!("expected render error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_is_uploaded_into_reports_folder() {
        let server = MockServer::start().await;
        let created = Utc::now() - chrono::Duration::hours(2);
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "m1",
                    "createdDateTime": created.to_rfc3339(),
                    "body": { "content": "hello", "contentType": "text" },
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(
                r"^/me/drive/root:/History/\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}_history_report_\.json:/content$",
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "item-1",
                "eTag": "\"{ABC-123},1\"",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let item = service(&server, Some("/History/"))
            .prepare_report_in_drive(
                &params(
                    ReportScope::Chat {
                        chat_id: "c1".to_string(),
                    },
                    ReportFormat::Json,
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(item.id, "item-1");
        assert_eq!(item.unique_id, "ABC-123");
        let file_name = item.file_name.unwrap();
        assert!(file_name.ends_with("_history_report_.json"), "got {file_name}");
    }
}
