//! Paginated message history retrieval
//!
//! Graph returns message collections newest first, 50 per page at most, with an
//! `@odata.nextLink` cursor to the next page. When a cutoff is given, paging stops
//! at the first page that reaches past it, so old history is never downloaded.

use super::client::GraphClient;
use crate::config::FetchConfig;
use crate::error::{FetchError, RequestError};
use crate::types::{Message, MessagePage, ReportScope};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Retrieves the messages of a chat, channel or channel thread
#[derive(Clone, Debug)]
pub struct HistoryFetcher {
    client: GraphClient,
    page_size: u32,
    expand_channel_replies: bool,
}

impl HistoryFetcher {
    /// Create a fetcher using the paging settings from `config`
    pub fn new(client: GraphClient, config: &FetchConfig) -> Self {
        Self {
            client,
            page_size: config.page_size,
            expand_channel_replies: config.expand_channel_replies,
        }
    }

    /// Fetch every message of `scope` created at or after `since`
    ///
    /// A cutoff later than the current time yields an empty result without any
    /// request being made. Pages must arrive newest first; the first page holding
    /// a message older than the cutoff is the last one requested.
    ///
    /// # Errors
    ///
    /// Any permanent request failure aborts the whole fetch; partial results are
    /// discarded.
    pub async fn fetch_history(
        &self,
        scope: &ReportScope,
        since: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, FetchError> {
        if let Some(cutoff) = since {
            if cutoff > Utc::now() {
                tracing::debug!(cutoff = %cutoff, "Cutoff lies in the future, nothing to fetch");
                return Ok(Vec::new());
            }
        }

        let token = self
            .client
            .access_token()
            .await
            .map_err(|e| FetchError::Token(e.to_string()))?;

        let messages = match scope {
            ReportScope::Chat { chat_id } => {
                let url = self.client.url(&format!("chats/{chat_id}/messages"));
                self.fetch_paged(&token, self.first_page(&url), since, cancel)
                    .await?
            }
            ReportScope::Channel {
                team_id,
                channel_id,
            } => {
                let base = self.channel_messages_url(team_id, channel_id);
                let mut messages = self
                    .fetch_paged(&token, self.first_page(&base), since, cancel)
                    .await?;

                if self.expand_channel_replies {
                    let roots: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
                    for root_id in roots {
                        let replies_url = format!("{base}/{root_id}/replies");
                        let replies = self
                            .fetch_paged(&token, self.first_page(&replies_url), since, cancel)
                            .await?;
                        messages.extend(replies);
                    }
                }
                messages
            }
            ReportScope::Thread {
                team_id,
                channel_id,
                message_id,
            } => {
                let root_url = format!(
                    "{}/{message_id}",
                    self.channel_messages_url(team_id, channel_id)
                );
                let root: Message = self.get_json(&token, &root_url, cancel).await?;
                let replies_url = format!("{root_url}/replies");
                let replies = self
                    .fetch_paged(&token, self.first_page(&replies_url), since, cancel)
                    .await?;

                let mut messages = Vec::with_capacity(replies.len() + 1);
                messages.push(root);
                messages.extend(replies);
                messages
            }
        };

        tracing::info!(
            messages = messages.len(),
            cutoff = ?since,
            "Fetched message history"
        );
        Ok(messages)
    }

    fn channel_messages_url(&self, team_id: &str, channel_id: &str) -> String {
        self.client
            .url(&format!("teams/{team_id}/channels/{channel_id}/messages"))
    }

    fn first_page(&self, collection_url: &str) -> String {
        format!("{collection_url}?$top={}", self.page_size)
    }

    /// Follow `@odata.nextLink` from `url`, applying the cutoff policy
    async fn fetch_paged(
        &self,
        token: &str,
        url: String,
        since: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, FetchError> {
        let mut results = Vec::new();
        let mut next = Some(url);
        let mut pages = 0u32;

        while let Some(url) = next.take() {
            let page: MessagePage = self.get_json(token, &url, cancel).await?;
            pages += 1;

            if page.value.is_empty() {
                break;
            }

            let reached_cutoff = match since {
                Some(cutoff) => {
                    let crossed = page.value.iter().any(|m| m.created_date_time < cutoff);
                    results.extend(
                        page.value
                            .into_iter()
                            .filter(|m| m.created_date_time >= cutoff),
                    );
                    crossed
                }
                None => {
                    results.extend(page.value);
                    false
                }
            };

            if reached_cutoff {
                tracing::debug!(pages, "Page reached past the cutoff, stop paging");
                break;
            }

            next = page.next_link.filter(|link| !link.is_empty());
        }

        tracing::debug!(pages, messages = results.len(), "Collection paged");
        Ok(results)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        let response = self
            .client
            .send(token, cancel, |http| http.get(url))
            .await
            .map_err(|e| match e {
                RequestError::Cancelled => FetchError::Cancelled,
                other => FetchError::Request(other),
            })?;

        response.json::<T>().await.map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::client::StaticToken;
    use chrono::Duration;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer) -> HistoryFetcher {
        let mut config = Config::default();
        config.graph.endpoint = server.uri();
        config.retry.max_retries = 0;
        let client = GraphClient::new(&config, Arc::new(StaticToken::new("t")));
        HistoryFetcher::new(client, &config.fetch)
    }

    fn message(id: &str, created: DateTime<Utc>, reply_to: Option<&str>) -> Value {
        json!({
            "id": id,
            "replyToId": reply_to,
            "createdDateTime": created.to_rfc3339(),
            "body": { "content": format!("text of {id}"), "contentType": "text" },
        })
    }

    fn page(messages: Vec<Value>, next: Option<String>) -> Value {
        match next {
            Some(link) => json!({ "value": messages, "@odata.nextLink": link }),
            None => json!({ "value": messages }),
        }
    }

    #[tokio::test]
    async fn future_cutoff_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
            .expect(0)
            .mount(&server)
            .await;

        let scope = ReportScope::Chat {
            chat_id: "c1".to_string(),
        };
        let messages = fetcher(&server)
            .fetch_history(
                &scope,
                Some(Utc::now() + Duration::hours(1)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn paging_stops_at_first_page_past_cutoff() {
        let server = MockServer::start().await;
        let now = Utc::now();
        let cutoff = now - Duration::days(7);

        // 120 messages newest first: 50 + 50 + 20; the last two of page two are too old
        let page1: Vec<Value> = (0..50)
            .map(|i| message(&format!("m{i}"), now - Duration::minutes(i), None))
            .collect();
        let mut page2: Vec<Value> = (50..98)
            .map(|i| message(&format!("m{i}"), now - Duration::hours(i), None))
            .collect();
        page2.push(message("old1", cutoff - Duration::minutes(1), None));
        page2.push(message("old2", cutoff - Duration::hours(1), None));
        let page3: Vec<Value> = (100..120)
            .map(|i| message(&format!("m{i}"), cutoff - Duration::days(i), None))
            .collect();

        Mock::given(method("GET"))
            .and(path("/chats/c1/messages"))
            .and(query_param("$top", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                page1,
                Some(format!("{}/chats/c1/messages/page2", server.uri())),
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                page2,
                Some(format!("{}/chats/c1/messages/page3", server.uri())),
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages/page3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(page3, None)))
            .expect(0)
            .mount(&server)
            .await;

        let scope = ReportScope::Chat {
            chat_id: "c1".to_string(),
        };
        let messages = fetcher(&server)
            .fetch_history(&scope, Some(cutoff), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(messages.len(), 98);
        assert!(messages.iter().all(|m| m.created_date_time >= cutoff));
        assert!(!messages.iter().any(|m| m.id.starts_with("old")));
    }

    #[tokio::test]
    async fn without_cutoff_all_pages_are_read() {
        let server = MockServer::start().await;
        let now = Utc::now();

        Mock::given(method("GET"))
            .and(path("/chats/c1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![message("a", now, None), message("b", now - Duration::days(400), None)],
                Some(format!("{}/chats/c1/messages/next", server.uri())),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![message("c", now - Duration::days(800), None)],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let scope = ReportScope::Chat {
            chat_id: "c1".to_string(),
        };
        let messages = fetcher(&server)
            .fetch_history(&scope, None, &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_page_ends_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![],
                Some(format!("{}/chats/c1/messages/next", server.uri())),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
            .expect(0)
            .mount(&server)
            .await;

        let scope = ReportScope::Chat {
            chat_id: "c1".to_string(),
        };
        let messages = fetcher(&server)
            .fetch_history(&scope, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn channel_roots_are_expanded_with_replies() {
        let server = MockServer::start().await;
        let now = Utc::now();

        Mock::given(method("GET"))
            .and(path("/teams/t1/channels/ch1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![
                    message("r2", now - Duration::minutes(5), None),
                    message("r1", now - Duration::minutes(30), None),
                ],
                None,
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/teams/t1/channels/ch1/messages/r1/replies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![message("r1-a", now - Duration::minutes(10), Some("r1"))],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/teams/t1/channels/ch1/messages/r2/replies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
            .expect(1)
            .mount(&server)
            .await;

        let scope = ReportScope::Channel {
            team_id: "t1".to_string(),
            channel_id: "ch1".to_string(),
        };
        let messages = fetcher(&server)
            .fetch_history(&scope, Some(now - Duration::days(1)), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1", "r1-a"]);
    }

    #[tokio::test]
    async fn thread_scope_fetches_root_then_replies() {
        let server = MockServer::start().await;
        let now = Utc::now();

        Mock::given(method("GET"))
            .and(path("/teams/t1/channels/ch1/messages/root"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(message("root", now - Duration::days(30), None)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/teams/t1/channels/ch1/messages/root/replies"))
            .and(query_param("$top", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![
                    message("new", now - Duration::hours(1), Some("root")),
                    message("stale", now - Duration::days(3), Some("root")),
                ],
                Some(format!("{}/never", server.uri())),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let scope = ReportScope::Thread {
            team_id: "t1".to_string(),
            channel_id: "ch1".to_string(),
            message_id: "root".to_string(),
        };
        let messages = fetcher(&server)
            .fetch_history(&scope, Some(now - Duration::days(1)), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "new"]);
    }

    #[tokio::test]
    async fn permanent_failure_aborts_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scope = ReportScope::Chat {
            chat_id: "c1".to_string(),
        };
        let err = fetcher(&server)
            .fetch_history(&scope, None, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            FetchError::Request(e) => assert_eq!(e.status(), Some(404)),
            other => panic!("expected request error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_page_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chats/c1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let scope = ReportScope::Chat {
            chat_id: "c1".to_string(),
        };
        let err = fetcher(&server)
            .fetch_history(&scope, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_yields_cancelled() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let scope = ReportScope::Chat {
            chat_id: "c1".to_string(),
        };
        let err = fetcher(&server)
            .fetch_history(&scope, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
