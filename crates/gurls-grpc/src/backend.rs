//! `LinkBackend` over gRPC, with status → taxonomy mapping.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tonic::{transport::Channel, Code, Request, Response, Status};
use tracing::{debug, warn};

use gurls_core::{
    backend::{
        short_url, BackendError, BackendResult, CreatedLink, LinkBackend, LinkRequest, LinkStats,
        LinkSummary,
    },
    domain::UserId,
    errors::Error,
};

use crate::proto::{self, shortener_client::ShortenerClient};

/// Remote operations; each accepts a different subset of typed failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    CreateLink,
    GetLinkStats,
    DeleteLink,
    ListUserLinks,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Op::CreateLink => "CreateLink",
            Op::GetLinkStats => "GetLinkStats",
            Op::DeleteLink => "DeleteLink",
            Op::ListUserLinks => "ListUserLinks",
        }
    }

    /// Reduce a remote status to the closed taxonomy for this operation.
    pub fn classify(self, status: &Status) -> BackendError {
        match (self, status.code()) {
            (Op::CreateLink, Code::AlreadyExists) => BackendError::AliasConflict,
            (Op::GetLinkStats | Op::DeleteLink, Code::NotFound) => BackendError::NotFound,
            (_, code) => BackendError::Unavailable(format!("{code:?}: {}", status.message())),
        }
    }
}

/// Shortening service client. Cheap to clone; clones share one HTTP/2 channel.
#[derive(Clone, Debug)]
pub struct GrpcBackend {
    client: ShortenerClient<Channel>,
    timeout: Duration,
    base_url: String,
}

impl GrpcBackend {
    /// Dial the backend, waiting at most `timeout` for the connection.
    ///
    /// `address` may be `host:port` (plaintext assumed) or a full URI.
    pub async fn connect(
        address: &str,
        timeout: Duration,
        base_url: impl Into<String>,
    ) -> gurls_core::Result<Self> {
        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };

        let channel = Channel::from_shared(uri)
            .map_err(|e| Error::Config(format!("invalid backend address {address}: {e}")))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect()
            .await
            .map_err(|e| Error::External(format!("failed to connect to backend: {e}")))?;

        Ok(Self::from_channel(channel, timeout, base_url))
    }

    pub fn from_channel(channel: Channel, timeout: Duration, base_url: impl Into<String>) -> Self {
        Self {
            client: ShortenerClient::new(channel),
            timeout,
            base_url: base_url.into(),
        }
    }

    fn request<T>(&self, msg: T) -> Request<T> {
        let mut req = Request::new(msg);
        req.set_timeout(self.timeout);
        req
    }

    /// Bound a call by the configured timeout and classify its failure.
    async fn finish<T>(
        &self,
        op: Op,
        call: impl std::future::Future<Output = Result<Response<T>, Status>>,
    ) -> BackendResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(resp)) => Ok(resp.into_inner()),
            Ok(Err(status)) => {
                let err = op.classify(&status);
                match &err {
                    BackendError::Unavailable(_) => {
                        warn!(op = op.name(), code = ?status.code(), message = status.message(), "backend call failed")
                    }
                    _ => debug!(op = op.name(), code = ?status.code(), "backend call rejected"),
                }
                Err(err)
            }
            Err(_) => {
                warn!(op = op.name(), timeout = ?self.timeout, "backend call timed out");
                Err(BackendError::Unavailable(format!(
                    "{} timed out after {:?}",
                    op.name(),
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl LinkBackend for GrpcBackend {
    async fn create_link(&self, req: LinkRequest) -> BackendResult<CreatedLink> {
        let mut client = self.client.clone();
        let call = client.create_link(self.request(create_request(req)));
        let resp = self.finish(Op::CreateLink, call).await?;
        Ok(CreatedLink {
            short_url: short_url(&self.base_url, &resp.alias),
            alias: resp.alias,
        })
    }

    async fn get_stats(&self, alias: &str) -> BackendResult<LinkStats> {
        let mut client = self.client.clone();
        let call = client.get_link_stats(self.request(proto::GetLinkStatsRequest {
            alias: alias.to_string(),
        }));
        let resp = self.finish(Op::GetLinkStats, call).await?;
        stats_from_proto(resp)
    }

    async fn delete_link(&self, alias: &str) -> BackendResult<()> {
        let mut client = self.client.clone();
        let call = client.delete_link(self.request(proto::DeleteLinkRequest {
            alias: alias.to_string(),
        }));
        self.finish(Op::DeleteLink, call).await?;
        Ok(())
    }

    async fn list_user_links(&self, user: UserId) -> BackendResult<Vec<LinkSummary>> {
        let mut client = self.client.clone();
        let call = client.list_user_links(self.request(proto::ListUserLinksRequest {
            user_tg_id: user.0,
        }));
        let resp = self.finish(Op::ListUserLinks, call).await?;
        resp.links.into_iter().map(summary_from_proto).collect()
    }
}

pub fn create_request(req: LinkRequest) -> proto::CreateLinkRequest {
    proto::CreateLinkRequest {
        original_url: req.original_url,
        user_tg_id: req.owner.0,
        title: req.title,
        custom_alias: req.custom_alias,
        expires_at: req.expires_at.map(to_timestamp),
    }
}

pub fn stats_from_proto(resp: proto::GetLinkStatsResponse) -> BackendResult<LinkStats> {
    Ok(LinkStats {
        original_url: resp.original_url,
        title: resp.title,
        click_count: resp.click_count,
        expires_at: resp.expires_at.map(from_timestamp).transpose()?,
        clicks_by_category: resp.clicks_by_device.into_iter().collect(),
    })
}

pub fn summary_from_proto(link: proto::Link) -> BackendResult<LinkSummary> {
    Ok(LinkSummary {
        alias: link.alias,
        original_url: link.original_url,
        title: link.title,
        click_count: link.click_count,
        expires_at: link.expires_at.map(from_timestamp).transpose()?,
    })
}

fn to_timestamp(t: DateTime<Utc>) -> proto::Timestamp {
    proto::Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    }
}

fn from_timestamp(ts: proto::Timestamp) -> BackendResult<DateTime<Utc>> {
    u32::try_from(ts.nanos)
        .ok()
        .and_then(|nanos| DateTime::<Utc>::from_timestamp(ts.seconds, nanos))
        .ok_or_else(|| {
            BackendError::Unavailable(format!(
                "invalid timestamp in response: {}s {}ns",
                ts.seconds, ts.nanos
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn create_maps_already_exists_to_conflict() {
        assert_eq!(
            Op::CreateLink.classify(&Status::already_exists("taken")),
            BackendError::AliasConflict
        );
        assert!(matches!(
            Op::CreateLink.classify(&Status::not_found("?")),
            BackendError::Unavailable(_)
        ));
    }

    #[test]
    fn stats_and_delete_map_not_found() {
        for op in [Op::GetLinkStats, Op::DeleteLink] {
            assert_eq!(op.classify(&Status::not_found("nope")), BackendError::NotFound);
            assert!(matches!(
                op.classify(&Status::already_exists("?")),
                BackendError::Unavailable(_)
            ));
        }
    }

    #[test]
    fn everything_else_is_unavailable() {
        for status in [
            Status::unavailable("down"),
            Status::deadline_exceeded("slow"),
            Status::internal("bug"),
            Status::not_found("x"),
        ] {
            let err = Op::ListUserLinks.classify(&status);
            assert!(matches!(err, BackendError::Unavailable(_)), "{status:?}");
        }
    }

    #[test]
    fn unavailable_reason_keeps_code_and_message() {
        let err = Op::GetLinkStats.classify(&Status::unavailable("connection refused"));
        assert_eq!(
            err,
            BackendError::Unavailable("Unavailable: connection refused".to_string())
        );
    }

    #[test]
    fn create_request_carries_all_fields() {
        let expires = DateTime::<Utc>::from_timestamp(1_700_000_000, 500).unwrap();
        let mut req = LinkRequest::new(UserId(77), "https://x.com");
        req.title = Some("T".into());
        req.custom_alias = Some("z".into());
        req.expires_at = Some(expires);

        let wire = create_request(req);
        assert_eq!(wire.original_url, "https://x.com");
        assert_eq!(wire.user_tg_id, 77);
        assert_eq!(wire.title.as_deref(), Some("T"));
        assert_eq!(wire.custom_alias.as_deref(), Some("z"));
        assert_eq!(
            wire.expires_at,
            Some(proto::Timestamp {
                seconds: 1_700_000_000,
                nanos: 500
            })
        );
    }

    #[test]
    fn stats_response_converts_to_snapshot() {
        let mut by_device = HashMap::new();
        by_device.insert("mobile".to_string(), 2);
        by_device.insert("desktop".to_string(), 5);

        let stats = stats_from_proto(proto::GetLinkStatsResponse {
            alias: "a".into(),
            original_url: "https://x.com".into(),
            title: None,
            click_count: 7,
            created_at: None,
            expires_at: Some(proto::Timestamp {
                seconds: 0,
                nanos: 0,
            }),
            clicks_by_device: by_device,
        })
        .unwrap();

        assert_eq!(stats.click_count, 7);
        assert_eq!(stats.expires_at, DateTime::<Utc>::from_timestamp(0, 0));
        let labels: Vec<_> = stats.clicks_by_category.keys().cloned().collect();
        assert_eq!(labels, vec!["desktop", "mobile"]);
    }

    #[test]
    fn invalid_timestamp_is_a_failure() {
        let err = summary_from_proto(proto::Link {
            alias: "a".into(),
            original_url: "https://x.com".into(),
            title: None,
            click_count: 0,
            created_at: None,
            expires_at: Some(proto::Timestamp {
                seconds: 0,
                nanos: -1,
            }),
        })
        .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn list_preserves_service_order() {
        let links = vec!["c", "a", "b"]
            .into_iter()
            .map(|alias| proto::Link {
                alias: alias.to_string(),
                original_url: format!("https://{alias}.example"),
                ..Default::default()
            })
            .map(summary_from_proto)
            .collect::<BackendResult<Vec<_>>>()
            .unwrap();
        let aliases: Vec<_> = links.iter().map(|l| l.alias.as_str()).collect();
        assert_eq!(aliases, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn unreachable_backend_times_out_as_unavailable() {
        // Lazily-connected channel to a port nothing listens on.
        let channel = Channel::from_static("http://127.0.0.1:9").connect_lazy();
        let backend = GrpcBackend::from_channel(channel, Duration::from_millis(200), "https://sho.rt");
        let err = backend.get_stats("abc").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)), "{err:?}");
    }
}
