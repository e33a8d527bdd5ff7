use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::model::{
    AddContactReq, EnrollReq, ErrorBody, ImportPhoneReq, ImportPhoneResp, MembersReq, MembersResp,
};
use super::PlatformClient;
use crate::community::CommunityRef;
use crate::config::Gateway;
use crate::error::PlatformError;
use crate::model::Recipient;

/// HTTP client for the session gateway that fronts the platform's user API.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    session: String,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    pub fn new(base_url: Url, session: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tg-bulkinvite/0.1")
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn from_config(cfg: &Gateway) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid gateway.base_url: {}", cfg.base_url))?;
        Self::new(
            base_url,
            cfg.session.clone(),
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    pub fn build_request<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(path)
            .context("invalid gateway base URL")?;
        self.http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build gateway request")
    }

    /// POST and decode the JSON reply.
    async fn call<B, R>(&self, path: &str, body: &B) -> Result<R, PlatformError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let res = self.send(path, body).await?;
        res.json::<R>().await.map_err(transport_error)
    }

    /// POST where only the status matters; any 2xx body, including none, is success.
    async fn call_unit<B>(&self, path: &str, body: &B) -> Result<(), PlatformError>
    where
        B: Serialize + Sync,
    {
        self.send(path, body).await.map(|_| ())
    }

    async fn send<B>(&self, path: &str, body: &B) -> Result<reqwest::Response, PlatformError>
    where
        B: Serialize + Sync,
    {
        let request = self
            .build_request(path, body)
            .map_err(|e| PlatformError::Transport(format!("{:#}", e)))?;
        debug!(url = %request.url(), "gateway request");

        let res = self.http.execute(request).await.map_err(transport_error)?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let err = classify(status, &body, &text);
            warn!(%status, code = body.code.as_deref().unwrap_or(""), %err, "gateway call failed");
            return Err(err);
        }
        Ok(res)
    }
}

fn transport_error(err: reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout
    } else {
        PlatformError::Transport(err.to_string())
    }
}

/// Map a gateway error response onto the platform error taxonomy.
pub fn classify(status: StatusCode, body: &ErrorBody, raw: &str) -> PlatformError {
    let message = body
        .message
        .clone()
        .unwrap_or_else(|| raw.trim().to_string());
    let code = body.code.as_deref().unwrap_or("");
    if status == StatusCode::TOO_MANY_REQUESTS
        || code.starts_with("FLOOD_WAIT")
        || code == "PEER_FLOOD"
    {
        return PlatformError::RateLimited {
            retry_after: body.retry_after.map(Duration::from_secs),
        };
    }
    match code {
        "USER_PRIVACY_RESTRICTED" | "USER_NOT_MUTUAL_CONTACT" => PlatformError::PrivacyRestricted,
        "USER_ALREADY_PARTICIPANT" => PlatformError::AlreadyMember,
        "CHAT_ADMIN_REQUIRED" => PlatformError::AdminRequired,
        _ if status == StatusCode::NOT_FOUND => PlatformError::NotFound(message),
        _ if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT => {
            PlatformError::Timeout
        }
        _ => PlatformError::Rejected(format!("{}: {}", status.as_u16(), message)),
    }
}

#[async_trait]
impl PlatformClient for GatewayClient {
    async fn list_members(
        &self,
        community: &CommunityRef,
    ) -> Result<Vec<Recipient>, PlatformError> {
        let req = MembersReq {
            session: &self.session,
            community: community.to_string(),
        };
        let resp: MembersResp = self.call("v1/members", &req).await?;
        Ok(resp.members)
    }

    async fn add_contact(&self, recipient: &Recipient) -> Result<(), PlatformError> {
        let req = AddContactReq {
            session: &self.session,
            user_id: recipient.id,
            first_name: recipient.display_name.as_deref().unwrap_or(""),
            phone: recipient.phone.as_deref().unwrap_or(""),
        };
        self.call_unit("v1/contacts", &req).await
    }

    async fn enroll(
        &self,
        destination: &CommunityRef,
        recipient_id: i64,
    ) -> Result<(), PlatformError> {
        let req = EnrollReq {
            session: &self.session,
            destination: destination.to_string(),
            user_id: recipient_id,
        };
        self.call_unit("v1/enroll", &req).await
    }

    async fn resolve_phone(&self, phone: &str) -> Result<Option<Recipient>, PlatformError> {
        let req = ImportPhoneReq {
            session: &self.session,
            phone,
        };
        let resp: ImportPhoneResp = self.call("v1/contacts/import", &req).await?;
        Ok(resp.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GatewayClient {
        GatewayClient::new(
            Url::parse(&format!("{}/", server.uri())).unwrap(),
            "s1".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn body(code: &str) -> ErrorBody {
        ErrorBody {
            code: Some(code.into()),
            message: Some("nope".into()),
            retry_after: None,
        }
    }

    #[test]
    fn classify_rate_limits() {
        let b = ErrorBody {
            code: Some("FLOOD_WAIT_30".into()),
            message: None,
            retry_after: Some(30),
        };
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, &b, ""),
            PlatformError::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, &ErrorBody::default(), ""),
            PlatformError::RateLimited { retry_after: None }
        );
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, &body("PEER_FLOOD"), ""),
            PlatformError::RateLimited { .. }
        ));
    }

    #[test]
    fn classify_codes() {
        assert_eq!(
            classify(StatusCode::FORBIDDEN, &body("USER_PRIVACY_RESTRICTED"), ""),
            PlatformError::PrivacyRestricted
        );
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, &body("USER_ALREADY_PARTICIPANT"), ""),
            PlatformError::AlreadyMember
        );
        assert_eq!(
            classify(StatusCode::NOT_FOUND, &ErrorBody::default(), " no such chat "),
            PlatformError::NotFound("no such chat".into())
        );
        assert_eq!(
            classify(StatusCode::GATEWAY_TIMEOUT, &ErrorBody::default(), ""),
            PlatformError::Timeout
        );
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, &body("WHATEVER"), ""),
            PlatformError::Rejected("500: nope".into())
        );
    }

    #[test]
    fn builds_json_post() {
        let client = GatewayClient::new(
            Url::parse("http://127.0.0.1:5328/").unwrap(),
            "s1".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let req = client
            .build_request(
                "v1/enroll",
                &EnrollReq {
                    session: "s1",
                    destination: "@dest".into(),
                    user_id: 42,
                },
            )
            .unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().as_str(), "http://127.0.0.1:5328/v1/enroll");
        let bytes = req.body().and_then(|b| b.as_bytes()).unwrap();
        let v: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(v["user_id"], 42);
        assert_eq!(v["destination"], "@dest");
    }

    #[tokio::test]
    async fn enroll_accepts_empty_success_replies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/enroll"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let dest = CommunityRef::parse("@dest").unwrap();
        assert_eq!(client.enroll(&dest, 42).await, Ok(()));
        let mut r = Recipient::new(42);
        r.phone = Some("+15550142".into());
        assert_eq!(client.add_contact(&r).await, Ok(()));
    }

    #[tokio::test]
    async fn enroll_error_reply_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/enroll"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "USER_PRIVACY_RESTRICTED",
                "message": "privacy"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let dest = CommunityRef::parse("@dest").unwrap();
        assert_eq!(
            client.enroll(&dest, 7).await,
            Err(PlatformError::PrivacyRestricted)
        );
    }
}
