use crate::config::IdentityProviderConfig;
use crate::error::app_error::AppError;
use crate::models::identity::ExternalIdentityProfile;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

/// Exchanges an access token for the caller's external identity.
#[async_trait::async_trait]
pub trait IdentityProviderClient: Send + Sync {
    async fn get_profile(&self, access_token: &str) -> Result<ExternalIdentityProfile, AppError>;
}

/// Auth0 `/userinfo` client.
pub struct Auth0Client {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user_id: Option<String>,
    sub: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: String,
    #[serde(default)]
    locale: String,
}

impl UserInfo {
    fn into_profile(self) -> Result<ExternalIdentityProfile, AppError> {
        let external_id = self
            .user_id
            .or(self.sub)
            .ok_or_else(|| AppError::identity_provider("profile has no user id"))?;

        let profile = ExternalIdentityProfile {
            external_id,
            display_name: self.name,
            picture_uri: self.picture,
            locale: self.locale,
        };
        profile
            .validate()
            .map_err(|e| AppError::identity_provider(format!("invalid profile: {e}")))?;

        Ok(profile)
    }
}

impl Auth0Client {
    pub fn new(config: &IdentityProviderConfig) -> Result<Self, AppError> {
        Self::with_base_url(config.base_url(), Duration::from_secs(config.timeout_seconds))
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl IdentityProviderClient for Auth0Client {
    async fn get_profile(&self, access_token: &str) -> Result<ExternalIdentityProfile, AppError> {
        let url = format!("{}/userinfo", self.base_url);
        let response = self.http.get(&url).bearer_auth(access_token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("identity provider rejected access token");
                Err(AppError::Unauthorized)
            }
            status if status.is_success() => response.json::<UserInfo>().await?.into_profile(),
            status => {
                warn!(%status, "identity provider returned unexpected status");
                Err(AppError::identity_provider(format!("unexpected status {status}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> Auth0Client {
        Auth0Client::with_base_url(server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn maps_userinfo_body_to_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer good-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "auth0|abc123",
                "name": "Jane Doe",
                "picture": "https://example.com/jane.png",
                "locale": "fi"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = client_for(&server).await.get_profile("good-token").await.unwrap();

        assert_eq!(profile.external_id, "auth0|abc123");
        assert_eq!(profile.display_name, "Jane Doe");
        assert_eq!(profile.picture_uri, "https://example.com/jane.png");
        assert_eq!(profile.locale, "fi");
    }

    #[tokio::test]
    async fn legacy_user_id_wins_over_sub() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_id": "google-oauth2|1",
                "sub": "ignored",
                "picture": "https://example.com/p.png"
            })))
            .mount(&server)
            .await;

        let profile = client_for(&server).await.get_profile("token").await.unwrap();
        assert_eq!(profile.external_id, "google-oauth2|1");
        assert_eq!(profile.display_name, "");
    }

    #[tokio::test]
    async fn rejected_token_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_profile("expired").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn provider_outage_is_a_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_profile("token").await.unwrap_err();
        assert!(matches!(err, AppError::IdentityProvider { .. }));
    }

    #[tokio::test]
    async fn profile_without_identity_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "Nobody" })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_profile("token").await.unwrap_err();
        assert!(matches!(err, AppError::IdentityProvider { .. }));
    }
}
