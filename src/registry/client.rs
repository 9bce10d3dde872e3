// RegistryClient answers existence lookups against the destination registry
// using the Registry HTTP API v2 manifest endpoint.

use crate::copy::Credentials;
use crate::error::{ReplicatorError, Result};
use crate::image::DigestUtils;
use crate::registry::ExistenceChecker;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

const DIGEST_HEADER: &str = "docker-content-digest";

/// Accept every manifest flavour so multi-arch indexes resolve to their own digest
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

pub struct RegistryClientBuilder {
    login_server: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl RegistryClientBuilder {
    pub fn new(login_server: impl Into<String>) -> Self {
        Self {
            login_server: login_server.into(),
            credentials: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("image-replicator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let server = self.login_server.trim().trim_end_matches('/');
        if server.is_empty() {
            return Err(ReplicatorError::Configuration(
                "login server cannot be empty".to_string(),
            ));
        }
        let base = if server.starts_with("http://") || server.starts_with("https://") {
            format!("{}/", server)
        } else {
            format!("https://{}/", server)
        };

        Ok(RegistryClient {
            client,
            base_url: Url::parse(&base)?,
            credentials: self.credentials,
        })
    }
}

pub struct RegistryClient {
    client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl RegistryClient {
    pub fn builder(login_server: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder::new(login_server)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn manifest_url(&self, repository: &str, tag: &str) -> Result<Url> {
        Ok(self
            .base_url
            .join(&format!("v2/{}/manifests/{}", repository, tag))?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        self.authorize(request.header(ACCEPT, MANIFEST_ACCEPT))
            .send()
            .await
            .map_err(|e| ReplicatorError::Lookup(format!("{} failed: {}", what, e)))
    }

    fn status_error(status: StatusCode, repository: &str, tag: &str) -> ReplicatorError {
        let reason = match status.as_u16() {
            401 => "unauthorized".to_string(),
            403 => "forbidden: insufficient permissions".to_string(),
            429 => "rate limited".to_string(),
            500..=599 => format!("registry unavailable (HTTP {})", status),
            _ => format!("unexpected HTTP {}", status),
        };
        ReplicatorError::Lookup(format!("{}:{}: {}", repository, tag, reason))
    }

    fn header_digest(response: &Response) -> Option<String> {
        response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }

    /// Fetch the manifest body and hash it; used when HEAD omits the digest header
    async fn fetch_digest(&self, url: Url, repository: &str, tag: &str) -> Result<Option<String>> {
        let response = self.send(self.client.get(url), "manifest fetch").await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                if let Some(digest) = Self::header_digest(&response) {
                    return Ok(Some(digest));
                }
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| ReplicatorError::Lookup(format!("manifest read failed: {}", e)))?;
                Ok(Some(DigestUtils::compute_docker_digest(&body)))
            }
            status => Err(Self::status_error(status, repository, tag)),
        }
    }
}

#[async_trait]
impl ExistenceChecker for RegistryClient {
    async fn lookup(&self, repository: &str, tag: &str) -> Result<Option<String>> {
        let url = self.manifest_url(repository, tag)?;
        let response = self.send(self.client.head(url.clone()), "manifest lookup").await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => match Self::header_digest(&response) {
                Some(digest) => Ok(Some(digest)),
                None => self.fetch_digest(url, repository, tag).await,
            },
            status => Err(Self::status_error(status, repository, tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned HTTP responses, one per connection, chosen by request line
    async fn serve(responder: fn(&str) -> String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0;
                    while !String::from_utf8_lossy(&buf[..read]).contains("\r\n\r\n") {
                        match socket.read(&mut buf[read..]).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => read += n,
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).to_string();
                    let request_line = request.lines().next().unwrap_or_default().to_string();
                    let response = responder(&request_line);
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn client(server: &str) -> RegistryClient {
        RegistryClient::builder(server)
            .with_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[test]
    fn builds_https_base_url_by_default() {
        let client = RegistryClient::builder("mirror.azurecr.io/").build().unwrap();
        assert_eq!(client.base_url().as_str(), "https://mirror.azurecr.io/");
        assert_eq!(
            client.manifest_url("hub/library/nginx", "1.25").unwrap().as_str(),
            "https://mirror.azurecr.io/v2/hub/library/nginx/manifests/1.25"
        );
    }

    #[tokio::test]
    async fn returns_digest_header_when_present() {
        let server = serve(|line| {
            if line.starts_with("HEAD /v2/library/nginx/manifests/latest") {
                "HTTP/1.1 200 OK\r\nDocker-Content-Digest: sha256:abc\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
            } else {
                "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
            }
        })
        .await;
        let client = client(&server);

        assert_eq!(
            client.lookup("library/nginx", "latest").await.unwrap(),
            Some("sha256:abc".to_string())
        );
        assert_eq!(client.lookup("redis", "7").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hashes_body_when_header_missing() {
        let server = serve(|line| {
            if line.starts_with("GET") {
                "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}".to_string()
            } else {
                "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
            }
        })
        .await;

        let digest = client(&server).lookup("app", "v1").await.unwrap();
        assert_eq!(digest, Some(DigestUtils::compute_docker_digest(b"{}")));
    }

    #[tokio::test]
    async fn auth_failure_is_a_lookup_error() {
        let server = serve(|_| {
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        })
        .await;

        let err = client(&server).lookup("private/app", "v1").await.unwrap_err();
        assert!(matches!(err, ReplicatorError::Lookup(msg) if msg.contains("unauthorized")));
    }
}
