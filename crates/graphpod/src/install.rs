use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;

/// The minimal package-installation facility loaded into the sandbox during
/// bootstrap: fetches named Python module sources from the registry and
/// writes them into the sandbox's module directory.
pub struct PackageInstaller {
    http: Client,
    registry_url: String,
    site_dir: PathBuf,
}

impl PackageInstaller {
    pub fn new(
        registry_url: impl Into<String>,
        site_dir: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            registry_url: registry_url.into(),
            site_dir: site_dir.into(),
        })
    }

    pub async fn install(&self, package: &str) -> anyhow::Result<PathBuf> {
        let url = format!("{}/{package}.py", self.registry_url.trim_end_matches('/'));
        let source = self
            .fetch_text(&url)
            .await
            .with_context(|| format!("failed to install package '{package}'"))?;
        let path = self.site_dir.join(format!("{package}.py"));
        fs::write(&path, source)
            .with_context(|| format!("failed to write package '{package}' into the sandbox"))?;
        Ok(path)
    }

    pub async fn fetch_text(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetch failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("fetch failed: {url}"))?;
        Ok(response.text().await?)
    }

    pub fn site_dir(&self) -> &Path {
        &self.site_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{StubRoute, StubServer};
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread")]
    async fn install_writes_fetched_module_source() {
        let server = StubServer::serve(vec![StubRoute::new(
            "/packages/agentgraph.py",
            200,
            "END = '__end__'\n",
        )])
        .await
        .expect("stub server");
        let site = TempDir::new().expect("tempdir");
        let installer =
            PackageInstaller::new(server.url("/packages"), site.path()).expect("installer");

        let path = installer.install("agentgraph").await.expect("install");

        assert_eq!(path, site.path().join("agentgraph.py"));
        let written = fs::read_to_string(&path).expect("read back");
        assert_eq!(written, "END = '__end__'\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn registry_failure_fails_the_install() {
        let server = StubServer::serve(vec![StubRoute::new("/packages/agentgraph.py", 500, "")])
            .await
            .expect("stub server");
        let site = TempDir::new().expect("tempdir");
        let installer =
            PackageInstaller::new(server.url("/packages"), site.path()).expect("installer");

        let err = installer
            .install("agentgraph")
            .await
            .expect_err("should fail");
        assert!(
            format!("{err:#}").contains("agentgraph"),
            "error should name the package: {err:#}"
        );
        assert!(!site.path().join("agentgraph.py").exists());
    }
}
