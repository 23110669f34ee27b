//! Credentials - TokenCredential の実装
//!
//! # ClientSecretCredential のフロー
//! 1. Entra ID (AAD) に client_credentials で token を要求
//! 2. レジストリの `/oauth2/exchange` で refresh token に交換
//! 3. レジストリの `/oauth2/token` で scope ごとの access token を取得
//!
//! token は credential インスタンスの寿命（= 1 回の run）の間だけキャッシュします。
//! rotation は扱いません。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::domain::RegistryError;
use crate::ports::TokenCredential;

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const REGISTRY_AAD_SCOPE: &str = "https://containerregistry.azure.net/.default";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AadTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// 固定の token を返すだけの credential（テストやローカルのレジストリ向け）
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn access_token(&self, _scope: &str) -> Result<String, RegistryError> {
        Ok(self.token.clone())
    }
}

/// tenant / client id / client secret から registry token を得る credential
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    registry_endpoint: String,
    refresh_token: Mutex<Option<String>>,
    access_tokens: Mutex<HashMap<String, String>>,
}

impl ClientSecretCredential {
    pub fn new(
        registry_endpoint: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            registry_endpoint: registry_endpoint.into(),
            refresh_token: Mutex::new(None),
            access_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// sovereign cloud や fake server 向けに authority を差し替える
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    fn registry_url(&self, path: &str) -> String {
        format!("{}{}", self.registry_endpoint.trim_end_matches('/'), path)
    }

    /// token exchange の `service` パラメータ（レジストリのホスト名）
    fn service(&self) -> Result<String, RegistryError> {
        let url = reqwest::Url::parse(&self.registry_endpoint)
            .map_err(|e| RegistryError::Decode(format!("invalid registry endpoint: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| RegistryError::Decode("registry endpoint has no host".to_string()))?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T, RegistryError> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(format!("POST {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::from_status(status.as_u16(), body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RegistryError::Decode(format!("POST {url}: {e}")))
    }

    async fn aad_token(&self) -> Result<String, RegistryError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        );
        let response: AadTokenResponse = self
            .post_form(
                &url,
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("scope", REGISTRY_AAD_SCOPE),
                ],
            )
            .await?;
        Ok(response.access_token)
    }

    async fn registry_refresh_token(&self) -> Result<String, RegistryError> {
        let mut cached = self.refresh_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let aad = self.aad_token().await?;
        let service = self.service()?;
        let response: RefreshTokenResponse = self
            .post_form(
                &self.registry_url("/oauth2/exchange"),
                &[
                    ("grant_type", "access_token"),
                    ("service", service.as_str()),
                    ("tenant", self.tenant_id.as_str()),
                    ("access_token", aad.as_str()),
                ],
            )
            .await?;
        *cached = Some(response.refresh_token.clone());
        Ok(response.refresh_token)
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn access_token(&self, scope: &str) -> Result<String, RegistryError> {
        if let Some(token) = self.access_tokens.lock().await.get(scope) {
            return Ok(token.clone());
        }

        let refresh = self.registry_refresh_token().await?;
        let service = self.service()?;
        let response: AccessTokenResponse = self
            .post_form(
                &self.registry_url("/oauth2/token"),
                &[
                    ("grant_type", "refresh_token"),
                    ("service", service.as_str()),
                    ("scope", scope),
                    ("refresh_token", refresh.as_str()),
                ],
            )
            .await?;

        self.access_tokens
            .lock()
            .await
            .insert(scope.to_string(), response.access_token.clone());
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone, Default)]
    struct FakeAuth {
        calls: Arc<StdMutex<Vec<String>>>,
    }

    async fn aad(
        State(fake): State<FakeAuth>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        fake.calls.lock().unwrap().push("aad".to_string());
        if form.get("client_secret").map(String::as_str) != Some("s3cret") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"})));
        }
        (StatusCode::OK, Json(json!({"access_token": "aad-token"})))
    }

    async fn exchange(
        State(fake): State<FakeAuth>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        fake.calls
            .lock()
            .unwrap()
            .push(format!("exchange {}", form["access_token"]));
        Json(json!({"refresh_token": "refresh-token"}))
    }

    async fn token(
        State(fake): State<FakeAuth>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        fake.calls
            .lock()
            .unwrap()
            .push(format!("token {} {}", form["scope"], form["refresh_token"]));
        Json(json!({"access_token": format!("access:{}", form["scope"])}))
    }

    async fn spawn_fake(fake: FakeAuth) -> String {
        let app = Router::new()
            .route("/tenant-1/oauth2/v2.0/token", post(aad))
            .route("/oauth2/exchange", post(exchange))
            .route("/oauth2/token", post(token))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn exchanges_once_and_caches_per_scope() {
        let fake = FakeAuth::default();
        let base = spawn_fake(fake.clone()).await;
        let credential = ClientSecretCredential::new(&base, "tenant-1", "client-1", "s3cret")
            .with_authority(&base);

        let catalog = credential.access_token("registry:catalog:*").await.unwrap();
        let again = credential.access_token("registry:catalog:*").await.unwrap();
        let repo = credential
            .access_token("repository:web:metadata_read,delete")
            .await
            .unwrap();

        assert_eq!(catalog, "access:registry:catalog:*");
        assert_eq!(again, catalog);
        assert_eq!(repo, "access:repository:web:metadata_read,delete");
        assert_eq!(
            fake.calls.lock().unwrap().clone(),
            vec![
                "aad".to_string(),
                "exchange aad-token".to_string(),
                "token registry:catalog:* refresh-token".to_string(),
                "token repository:web:metadata_read,delete refresh-token".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_secret_is_unauthorized() {
        let base = spawn_fake(FakeAuth::default()).await;
        let credential = ClientSecretCredential::new(&base, "tenant-1", "client-1", "wrong")
            .with_authority(&base);

        let err = credential.access_token("registry:catalog:*").await.unwrap_err();

        assert!(matches!(err, RegistryError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn static_credential_ignores_scope() {
        let credential = StaticTokenCredential::new("t");
        assert_eq!(credential.access_token("anything").await.unwrap(), "t");
    }
}
