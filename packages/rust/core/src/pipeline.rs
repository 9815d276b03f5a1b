//! End-to-end scrape pipeline: base URL → sitemap → batched crawl → Markdown
//! artifacts → session record.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use url::Url;

use siteqa_artifacts::{Artifact, ArtifactWriter};
use siteqa_crawler::Crawler;
use siteqa_discovery::DiscoveryOptions;
use siteqa_markdown::ConvertOptions;
use siteqa_shared::Result;
use siteqa_storage::{SessionStore, validate_session_name};

use crate::progress::{PipelineCrawlProgress, ProgressReporter};

/// Result of one scrape run.
#[derive(Debug, Default)]
pub struct ScrapeSummary {
    /// URLs found in the sitemap.
    pub discovered: usize,
    /// Pages fetched successfully.
    pub crawled: usize,
    pub fetch_failures: usize,
    /// Fetched pages that could not be converted or written.
    pub write_failures: usize,
    pub artifacts: Vec<Artifact>,
    pub batches: usize,
    pub elapsed: Duration,
}

impl ScrapeSummary {
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}

/// Scrapes a site into Markdown artifacts and registers them with a session.
pub struct Scraper {
    crawler: Crawler,
    writer: ArtifactWriter,
    sessions: SessionStore,
    discovery: DiscoveryOptions,
}

impl Scraper {
    pub fn new(
        crawler: Crawler,
        writer: ArtifactWriter,
        sessions: SessionStore,
        discovery: DiscoveryOptions,
    ) -> Self {
        Self {
            crawler,
            writer,
            sessions,
            discovery,
        }
    }

    /// Run the scrape pipeline.
    ///
    /// 1. Discovery: read `<base_url>/sitemap.xml`
    /// 2. Crawl in batches
    /// 3. Convert HTML → Markdown and write artifacts
    /// 4. Append artifact paths to the session's `scraped_files`
    ///
    /// An unreachable sitemap yields an empty summary, not an error.
    #[instrument(skip(self, progress), fields(base_url = %base_url))]
    pub async fn scrape(
        &self,
        base_url: &Url,
        session: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<ScrapeSummary> {
        validate_session_name(session)?;
        let start = Instant::now();

        // --- Phase 1: Discovery ---
        progress.phase("Reading sitemap");
        let targets = siteqa_discovery::discover(base_url, &self.discovery).await;
        if targets.is_empty() {
            info!("no URLs to scrape");
            return Ok(ScrapeSummary {
                elapsed: start.elapsed(),
                ..ScrapeSummary::default()
            });
        }

        // --- Phase 2: Crawl ---
        progress.phase("Crawling pages");
        let crawl = self
            .crawler
            .crawl_all(
                &targets,
                self.crawler.config().batch_size,
                &PipelineCrawlProgress { inner: progress },
            )
            .await;

        // --- Phase 3: Convert + write ---
        progress.phase("Writing artifacts");
        let total = crawl.results.len();
        let mut artifacts = Vec::with_capacity(total);
        let mut write_failures = 0;

        for result in &crawl.results {
            let Some(html) = result.html() else {
                continue;
            };
            let opts = ConvertOptions {
                source_url: result.target.url().clone(),
                fetched_at: result.fetched_at,
            };

            let written = match siteqa_markdown::convert(html, &opts) {
                Ok(page) => self.writer.write(&page.source_url, &page.to_document()).await,
                Err(e) => Err(e),
            };

            match written {
                Ok(artifact) => {
                    progress.artifact_written(&artifact.path, artifacts.len() + 1, total);
                    artifacts.push(artifact);
                }
                Err(e) => {
                    write_failures += 1;
                    warn!(url = %result.target, error = %e, "could not write artifact, skipping page");
                }
            }
        }

        // --- Phase 4: Register with the session ---
        if !artifacts.is_empty() {
            progress.phase("Updating session");
            let mut record = self.sessions.load(session).await?;
            record.track_files(artifacts.iter().map(|a| a.path.clone()));
            self.sessions.save(&record, session).await?;
        }

        let summary = ScrapeSummary {
            discovered: targets.len(),
            crawled: crawl.results.len(),
            fetch_failures: crawl.failures.len(),
            write_failures,
            artifacts,
            batches: crawl.batches,
            elapsed: start.elapsed(),
        };

        info!(
            discovered = summary.discovered,
            written = summary.artifacts.len(),
            fetch_failures = summary.fetch_failures,
            write_failures = summary.write_failures,
            elapsed_ms = summary.elapsed.as_millis(),
            "scrape completed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::progress::SilentProgress;
    use siteqa_crawler::HttpFetcher;
    use siteqa_shared::CrawlConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("siteqa-scrape-test-{}", uuid::Uuid::now_v7()))
    }

    async fn scraper(dir: &std::path::Path) -> Scraper {
        let config = CrawlConfig {
            batch_size: 2,
            ..CrawlConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap().allow_localhost(true);
        Scraper::new(
            Crawler::new(Arc::new(fetcher), config),
            ArtifactWriter::new(dir.join("out")),
            SessionStore::open(dir.join("sessions")).await.unwrap(),
            DiscoveryOptions::default(),
        )
    }

    fn page(title: &str) -> String {
        format!(
            "<html><head><title>{title}</title></head><body><main><h1>{title}</h1>\
             <p>Some text with a <a href=\"/other\">link</a>.</p></main></body></html>"
        )
    }

    #[tokio::test]
    async fn scrape_writes_artifacts_and_tracks_them() {
        let server = MockServer::start().await;
        let base = server.uri();
        let sitemap = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/guide</loc></url>
  <url><loc>{base}/api</loc></url>
  <url><loc>{base}/missing</loc></url>
</urlset>"#
        );

        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
            .mount(&server)
            .await;
        for (route, title) in [("/guide", "Guide"), ("/api", "API Reference")] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/html")
                        .set_body_string(page(title)),
                )
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = temp_dir();
        let scraper = scraper(&dir).await;
        let base_url = Url::parse(&base).unwrap();

        let summary = scraper.scrape(&base_url, "s1", &SilentProgress).await.unwrap();

        assert_eq!(summary.discovered, 3);
        assert_eq!(summary.crawled, 2);
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.artifacts.len(), 2);

        let guide = std::fs::read_to_string(&summary.artifacts[0].path).unwrap();
        assert!(guide.starts_with("---\nsource_url: "));
        assert!(guide.contains("title: \"Guide\""));
        assert!(guide.contains(&format!("({base}/other)")));

        let record = scraper.sessions.load("s1").await.unwrap();
        assert_eq!(record.scraped_files, summary.artifact_paths());

        // A second run re-writes the same files and does not duplicate them.
        scraper.scrape(&base_url, "s1", &SilentProgress).await.unwrap();
        let record = scraper.sessions.load("s1").await.unwrap();
        assert_eq!(record.scraped_files.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_sitemap_is_an_empty_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = temp_dir();
        let scraper = scraper(&dir).await;
        let base_url = Url::parse(&server.uri()).unwrap();

        let summary = scraper.scrape(&base_url, "s1", &SilentProgress).await.unwrap();

        assert_eq!(summary.discovered, 0);
        assert!(summary.artifacts.is_empty());
        assert!(!scraper.sessions.exists("s1").await.unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn invalid_session_name_is_rejected() {
        let dir = temp_dir();
        let scraper = scraper(&dir).await;
        let base_url = Url::parse("https://docs.example.com").unwrap();

        let err = scraper
            .scrape(&base_url, "../escape", &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, siteqa_shared::SiteQaError::Validation { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
