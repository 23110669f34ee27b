//! AcrRegistryClient - Azure Container Registry 互換の REST クライアント
//!
//! # エンドポイント
//! - `GET    /acr/v1/_catalog?n=`
//! - `GET    /acr/v1/{repo}/_manifests?orderby=timedesc&n=`
//! - `DELETE /acr/v1/{repo}/_tags/{tag}`
//! - `DELETE /v2/{repo}/manifests/{digest}`
//!
//! 次ページはレスポンスの `Link: <...>; rel="next"` ヘッダで辿り、
//! ヘッダが無くなった時点で終了します（`n` は上限のヒントにすぎない）。
//! retry は行いません（失敗はそのまま RegistryError として返す）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::Url;
use reqwest::header::{HeaderMap, LINK};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::{ArtifactManifest, Digest, RegistryError};
use crate::ports::{RegistryClient, RegistryStream, TokenCredential};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PAGE_SIZE: usize = 100;
const CATALOG_SCOPE: &str = "registry:catalog:*";
const NEWEST_FIRST: &str = "timedesc";

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ManifestPage {
    #[serde(default)]
    manifests: Option<Vec<ManifestEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    digest: String,
    last_update_time: DateTime<Utc>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl ManifestEntry {
    fn into_manifest(self, repository: &str) -> ArtifactManifest {
        ArtifactManifest {
            digest: Digest::new(self.digest),
            repository_name: repository.to_string(),
            last_updated_on: self.last_update_time,
            tags: self.tags.unwrap_or_default(),
        }
    }
}

fn repository_scope(repository: &str) -> String {
    format!("repository:{repository}:metadata_read,delete")
}

/// `Link` ヘッダから `rel="next"` の参照を取り出す
fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let (target, params) = link.split_once(';')?;
            let is_next = params
                .split(';')
                .map(str::trim)
                .any(|p| p == "rel=\"next\"" || p == "rel=next");
            is_next.then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
        })
}

/// AcrRegistryClient は RegistryClient の HTTP 実装
#[derive(Clone)]
pub struct AcrRegistryClient {
    endpoint: String,
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    page_size: usize,
}

impl AcrRegistryClient {
    /// `endpoint` は `https://myregistry.azurecr.io` の形式
    pub fn new(endpoint: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            http,
            credential,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    /// 最初のページの URL（`n` と追加のクエリ付き）
    fn first_page(&self, path: &str, extra: &[(&str, &str)]) -> Result<Url, RegistryError> {
        let n = self.page_size.to_string();
        let params = std::iter::once(("n", n.as_str())).chain(extra.iter().copied());
        Url::parse_with_params(&self.url(path), params)
            .map_err(|e| RegistryError::Decode(format!("invalid registry endpoint: {e}")))
    }

    /// `Link` の参照は相対パスのことが多いので endpoint を基準に解決する
    fn resolve(&self, link: &str) -> Result<Url, RegistryError> {
        Url::parse(&self.endpoint)
            .and_then(|base| base.join(link))
            .map_err(|e| RegistryError::Decode(format!("invalid next link {link}: {e}")))
    }

    /// 1 ページ分を取得し、次ページの URL があればそれも返す
    async fn get_page<T: DeserializeOwned>(
        &self,
        scope: &str,
        url: Url,
    ) -> Result<(T, Option<Url>), RegistryError> {
        let path = url.path().to_string();
        let token = self.credential.access_token(scope).await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(format!("GET {path}: {e}")))?;
        let response = check_status(response).await?;
        let next = next_link(response.headers())
            .map(|link| self.resolve(&link))
            .transpose()?;
        let page = response
            .json::<T>()
            .await
            .map_err(|e| RegistryError::Decode(format!("GET {path}: {e}")))?;
        Ok((page, next))
    }

    async fn delete(&self, scope: &str, path: &str) -> Result<(), RegistryError> {
        let token = self.credential.access_token(scope).await?;
        let response = self
            .http
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(format!("DELETE {path}: {e}")))?;
        check_status(response).await?;
        Ok(())
    }
}

/// 2xx 以外を RegistryError に変換
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/errors/0/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    Err(RegistryError::from_status(status.as_u16(), message))
}

#[async_trait]
impl RegistryClient for AcrRegistryClient {
    fn list_repository_names(&self) -> RegistryStream<'_, String> {
        let first = self.first_page("/acr/v1/_catalog", &[]);
        stream::try_unfold(Some(first), move |next| async move {
            let Some(url) = next else {
                return Ok::<_, RegistryError>(None);
            };
            let (page, next): (CatalogPage, _) = self.get_page(CATALOG_SCOPE, url?).await?;
            let names = page.repositories.unwrap_or_default();
            Ok(Some((names, next.map(Ok))))
        })
        .map_ok(|names| stream::iter(names.into_iter().map(Ok::<_, RegistryError>)))
        .try_flatten()
        .boxed()
    }

    fn list_manifests<'a>(&'a self, repository: &'a str) -> RegistryStream<'a, ArtifactManifest> {
        let scope = repository_scope(repository);
        let first = self.first_page(
            &format!("/acr/v1/{repository}/_manifests"),
            &[("orderby", NEWEST_FIRST)],
        );
        stream::try_unfold(Some(first), move |next| {
            let scope = scope.clone();
            async move {
                let Some(url) = next else {
                    return Ok::<_, RegistryError>(None);
                };
                let (page, next): (ManifestPage, _) = self.get_page(&scope, url?).await?;
                let manifests: Vec<ArtifactManifest> = page
                    .manifests
                    .unwrap_or_default()
                    .into_iter()
                    .map(|entry| entry.into_manifest(repository))
                    .collect();
                Ok(Some((manifests, next.map(Ok))))
            }
        })
        .map_ok(|manifests| stream::iter(manifests.into_iter().map(Ok::<_, RegistryError>)))
        .try_flatten()
        .boxed()
    }

    async fn delete_tag(
        &self,
        repository: &str,
        _digest: &Digest,
        tag: &str,
    ) -> Result<(), RegistryError> {
        self.delete(
            &repository_scope(repository),
            &format!("/acr/v1/{repository}/_tags/{tag}"),
        )
        .await
    }

    async fn delete_manifest(
        &self,
        repository: &str,
        digest: &Digest,
    ) -> Result<(), RegistryError> {
        self.delete(
            &repository_scope(repository),
            &format!("/v2/{repository}/manifests/{digest}"),
        )
        .await
    }
}
