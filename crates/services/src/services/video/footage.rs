//! Stock footage search and download.
//!
//! [`gather_candidates`] walks every keyword phrase through a narrowing
//! query ladder and guarantees the minimum candidate count by drawing on the
//! generic pool and finally the emergency clips.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::fallback::FallbackCatalog;
use super::keywords::KeywordSet;
use super::{VideoError, VideoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    pub fn of(width: u32, height: u32) -> Self {
        match height.cmp(&width) {
            std::cmp::Ordering::Greater => Orientation::Portrait,
            std::cmp::Ordering::Less => Orientation::Landscape,
            std::cmp::Ordering::Equal => Orientation::Square,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Organic,
    FallbackPool,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoCandidate {
    pub source_url: String,
    pub orientation: Orientation,
    pub width: u32,
    pub height: u32,
    pub origin: CandidateOrigin,
    /// Query that produced the hit
    pub query: String,
}

#[async_trait]
pub trait FootageSource: Send + Sync {
    /// Best single hit for `query`, if any. Origin is set by the caller.
    async fn search(&self, query: &str) -> VideoResult<Option<VideoCandidate>>;

    async fn download(&self, candidate: &VideoCandidate, dest: &Path) -> VideoResult<()>;
}

/// Queries for one phrase, broadest last: the full phrase, its first two
/// words, then its first word unless that is a stop word.
pub fn query_ladder(phrase: &str, catalog: &FallbackCatalog) -> Vec<String> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    let mut ladder = Vec::new();
    if words.is_empty() {
        return ladder;
    }

    ladder.push(words.join(" "));
    if words.len() > 2 {
        ladder.push(words[..2].join(" "));
    }
    if words.len() > 1 && !catalog.is_stop_word(words[0]) {
        ladder.push(words[0].to_string());
    }
    ladder
}

fn push_unique(candidates: &mut Vec<VideoCandidate>, candidate: VideoCandidate) -> bool {
    if candidates.iter().any(|c| c.source_url == candidate.source_url) {
        return false;
    }
    candidates.push(candidate);
    true
}

async fn search_logged(source: &dyn FootageSource, query: &str) -> Option<VideoCandidate> {
    match source.search(query).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!("[FOOTAGE] Search for '{}' failed: {}", query, e);
            None
        }
    }
}

/// Always returns at least `min` candidates (and at most `max`).
pub async fn gather_candidates(
    source: &dyn FootageSource,
    keywords: &KeywordSet,
    catalog: &FallbackCatalog,
    min: usize,
    max: usize,
) -> Vec<VideoCandidate> {
    let max = max.max(min);
    let mut candidates: Vec<VideoCandidate> = Vec::new();

    'phrases: for phrase in keywords.phrases() {
        if candidates.len() >= max {
            break;
        }
        for query in query_ladder(phrase, catalog) {
            if let Some(mut hit) = search_logged(source, &query).await {
                hit.origin = CandidateOrigin::Organic;
                hit.query = query;
                if push_unique(&mut candidates, hit) {
                    continue 'phrases;
                }
            }
        }
    }

    if candidates.len() < min {
        info!(
            "[FOOTAGE] {} organic candidate(s); drawing from generic pool",
            candidates.len()
        );
        for query in catalog.generic_pool() {
            if candidates.len() >= min {
                break;
            }
            if let Some(mut hit) = search_logged(source, query).await {
                hit.origin = CandidateOrigin::FallbackPool;
                hit.query = query.clone();
                push_unique(&mut candidates, hit);
            }
        }
    }

    if candidates.len() < min {
        warn!("[FOOTAGE] Generic pool exhausted; using emergency clips");
        for clip in catalog.emergency_candidates() {
            if candidates.len() >= min {
                break;
            }
            push_unique(&mut candidates, clip);
        }
    }

    candidates
}

async fn download_one(
    source: &dyn FootageSource,
    candidate: &VideoCandidate,
    dir: &Path,
    idx: usize,
) -> Option<PathBuf> {
    let dest = dir.join(format!("clip_{}.mp4", idx));
    match source.download(candidate, &dest).await {
        Ok(()) => Some(dest),
        Err(e) => {
            warn!("[FOOTAGE] Download of {} failed: {}", candidate.source_url, e);
            None
        }
    }
}

/// Downloads all candidates concurrently into `dir`, keeping successes in
/// candidate order.
pub async fn download_all(
    source: &dyn FootageSource,
    candidates: &[VideoCandidate],
    dir: &Path,
) -> Vec<PathBuf> {
    let downloads = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| download_one(source, candidate, dir, idx))
        .collect::<Vec<_>>();

    stream::iter(downloads)
        .buffered(candidates.len().max(1))
        .filter_map(|path| async move { path })
        .collect()
        .await
}

/// Replacement clips for downloads or conversions that fell through.
///
/// Draws untried hits from the generic pool, then the emergency clips, each
/// URL at most once per run.
pub struct FootageReserve<'a> {
    catalog: &'a FallbackCatalog,
    tried: HashSet<String>,
    pool_cursor: usize,
    emergency_cursor: usize,
    next_file: usize,
}

impl<'a> FootageReserve<'a> {
    /// `used` are the candidates already downloaded into the work directory.
    pub fn new(catalog: &'a FallbackCatalog, used: &[VideoCandidate]) -> Self {
        Self {
            catalog,
            tried: used.iter().map(|c| c.source_url.clone()).collect(),
            pool_cursor: 0,
            emergency_cursor: 0,
            next_file: used.len(),
        }
    }

    async fn next_candidate(&mut self, source: &dyn FootageSource) -> Option<VideoCandidate> {
        let catalog = self.catalog;
        while let Some(query) = catalog.generic_pool().get(self.pool_cursor) {
            self.pool_cursor += 1;
            if let Some(mut hit) = search_logged(source, query).await {
                if self.tried.insert(hit.source_url.clone()) {
                    hit.origin = CandidateOrigin::FallbackPool;
                    hit.query = query.clone();
                    return Some(hit);
                }
            }
        }

        let emergency = catalog.emergency_candidates();
        while let Some(clip) = emergency.get(self.emergency_cursor) {
            self.emergency_cursor += 1;
            if self.tried.insert(clip.source_url.clone()) {
                return Some(clip.clone());
            }
        }
        None
    }

    /// Downloads the next replacement that succeeds, or `None` once the
    /// pool and the emergency clips are used up.
    pub async fn download_next(&mut self, source: &dyn FootageSource, dir: &Path) -> Option<PathBuf> {
        while let Some(candidate) = self.next_candidate(source).await {
            let idx = self.next_file;
            self.next_file += 1;
            info!(
                "[FOOTAGE] Replacement clip {} ({:?})",
                candidate.source_url, candidate.origin
            );
            if let Some(path) = download_one(source, &candidate, dir, idx).await {
                return Some(path);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FootageConfig {
    pub api_base: String,
    pub per_page: u32,
    pub timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl Default for FootageConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.pexels.com".to_string(),
            per_page: 5,
            timeout_secs: 20,
            download_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PexelsSearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct PexelsVideoFile {
    link: String,
    width: Option<u32>,
    height: Option<u32>,
    file_type: Option<String>,
}

/// Picks the file closest to a 1080x1920 portrait rendition, preferring
/// earlier (more relevant) videos.
fn select_best_file(videos: &[PexelsVideo]) -> Option<PexelsVideoFile> {
    let usable = |f: &&PexelsVideoFile| {
        f.file_type.as_deref().unwrap_or("video/mp4") == "video/mp4"
            && f.width.is_some()
            && f.height.is_some()
    };
    let distance = |f: &PexelsVideoFile| (f.height.unwrap_or(0) as i64 - 1920).abs();

    let portrait = videos.iter().find_map(|video| {
        video
            .video_files
            .iter()
            .filter(usable)
            .filter(|f| f.height > f.width)
            .min_by_key(|f| distance(*f))
    });

    portrait
        .or_else(|| {
            videos
                .iter()
                .find_map(|video| video.video_files.iter().filter(usable).max_by_key(|f| f.height))
        })
        .cloned()
}

/// Pexels video search client.
pub struct PexelsClient {
    client: Client,
    download_client: Client,
    api_base: String,
    api_key: Option<String>,
    per_page: u32,
}

impl PexelsClient {
    pub fn new(config: &FootageConfig, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        let download_client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            download_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            per_page: config.per_page,
        }
    }

    pub fn from_env(config: &FootageConfig) -> Self {
        let api_key = std::env::var("PEXELS_API_KEY").ok();
        if api_key.is_none() {
            warn!("[FOOTAGE] PEXELS_API_KEY not set; searches will fall back to emergency clips");
        }
        Self::new(config, api_key)
    }
}

#[async_trait]
impl FootageSource for PexelsClient {
    async fn search(&self, query: &str) -> VideoResult<Option<VideoCandidate>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VideoError::Footage("PEXELS_API_KEY not configured".to_string()))?;

        let response = self
            .client
            .get(format!("{}/videos/search", self.api_base))
            .header("Authorization", api_key)
            .query(&[
                ("query", query.to_string()),
                ("orientation", "portrait".to_string()),
                ("per_page", self.per_page.to_string()),
            ])
            .send()
            .await
            .map_err(|e| VideoError::Footage(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VideoError::Footage(format!(
                "search returned {}",
                response.status()
            )));
        }

        let body: PexelsSearchResponse = response
            .json()
            .await
            .map_err(|e| VideoError::Footage(e.to_string()))?;

        Ok(select_best_file(&body.videos).map(|file| {
            let width = file.width.unwrap_or(0);
            let height = file.height.unwrap_or(0);
            VideoCandidate {
                source_url: file.link,
                orientation: Orientation::of(width, height),
                width,
                height,
                origin: CandidateOrigin::Organic,
                query: query.to_string(),
            }
        }))
    }

    async fn download(&self, candidate: &VideoCandidate, dest: &Path) -> VideoResult<()> {
        let response = self
            .download_client
            .get(&candidate.source_url)
            .send()
            .await
            .map_err(|e| VideoError::Footage(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VideoError::Footage(format!(
                "download returned {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| VideoError::Footage(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns a hit only for queries listed in `hits`.
    struct ScriptedSource {
        hits: HashMap<String, String>,
        queries: Mutex<Vec<String>>,
        fail_downloads: bool,
    }

    impl ScriptedSource {
        fn new(hits: &[(&str, &str)]) -> Self {
            Self {
                hits: hits
                    .iter()
                    .map(|(q, url)| (q.to_string(), url.to_string()))
                    .collect(),
                queries: Mutex::new(Vec::new()),
                fail_downloads: false,
            }
        }
    }

    #[async_trait]
    impl FootageSource for ScriptedSource {
        async fn search(&self, query: &str) -> VideoResult<Option<VideoCandidate>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.hits.get(query).map(|url| VideoCandidate {
                source_url: url.clone(),
                orientation: Orientation::Portrait,
                width: 1080,
                height: 1920,
                origin: CandidateOrigin::Organic,
                query: query.to_string(),
            }))
        }

        async fn download(&self, _candidate: &VideoCandidate, dest: &Path) -> VideoResult<()> {
            if self.fail_downloads {
                return Err(VideoError::Footage("boom".into()));
            }
            tokio::fs::write(dest, b"clip").await?;
            Ok(())
        }
    }

    fn keywords(phrases: &[&str]) -> KeywordSet {
        KeywordSet::new(phrases.iter().map(|s| s.to_string()).collect(), false)
    }

    #[test]
    fn ladder_narrows_and_skips_stop_words() {
        let catalog = FallbackCatalog::builtin();
        assert_eq!(
            query_ladder("students registering university office", &catalog),
            vec!["students registering university office", "students registering", "students"]
        );
        assert_eq!(
            query_ladder("the campus library", &catalog),
            vec!["the campus library", "the campus"]
        );
        assert_eq!(query_ladder("graduation ceremony", &catalog), vec!["graduation ceremony", "graduation"]);
    }

    #[tokio::test]
    async fn organic_hits_stop_at_max() {
        let catalog = FallbackCatalog::builtin();
        let source = ScriptedSource::new(&[
            ("a b", "u1"),
            ("c d", "u2"),
            ("e f", "u3"),
            ("g h", "u4"),
        ]);
        let found = gather_candidates(&source, &keywords(&["a b", "c d", "e f", "g h"]), &catalog, 2, 3).await;
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|c| c.origin == CandidateOrigin::Organic));
        assert!(!source.queries.lock().unwrap().contains(&"g h".to_string()));
    }

    #[tokio::test]
    async fn ladder_falls_back_to_shorter_queries() {
        let catalog = FallbackCatalog::builtin();
        let source = ScriptedSource::new(&[("students", "u1"), ("exam hall", "u2")]);
        let found = gather_candidates(
            &source,
            &keywords(&["students taking exam", "exam hall crowded"]),
            &catalog,
            2,
            3,
        )
        .await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].query, "students");
        assert_eq!(found[1].query, "exam hall");
    }

    #[tokio::test]
    async fn duplicate_urls_are_ignored() {
        let catalog = FallbackCatalog::builtin();
        let source = ScriptedSource::new(&[
            ("a b", "same"),
            ("c d", "same"),
            ("university campus aerial view", "pool1"),
        ]);
        let found = gather_candidates(&source, &keywords(&["a b", "c d"]), &catalog, 2, 3).await;
        let urls: Vec<_> = found.iter().map(|c| c.source_url.as_str()).collect();
        assert_eq!(urls, vec!["same", "pool1"]);
    }

    #[tokio::test]
    async fn no_organic_hits_uses_pool_to_exactly_minimum() {
        let catalog = FallbackCatalog::builtin();
        let source = ScriptedSource::new(&[
            ("university campus aerial view", "p1"),
            ("students walking campus", "p2"),
            ("college students studying together", "p3"),
        ]);
        let found = gather_candidates(
            &source,
            &keywords(&["x y", "z w", "q r", "s t"]),
            &catalog,
            2,
            3,
        )
        .await;
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.origin == CandidateOrigin::FallbackPool));
    }

    #[tokio::test]
    async fn emergency_clips_fill_the_gap() {
        let catalog = FallbackCatalog::builtin();
        let source = ScriptedSource::new(&[("x y", "o1")]);
        let found = gather_candidates(&source, &keywords(&["x y", "z w"]), &catalog, 2, 3).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].origin, CandidateOrigin::Organic);
        assert_eq!(found[1].origin, CandidateOrigin::Emergency);

        let nothing = ScriptedSource::new(&[]);
        let found = gather_candidates(&nothing, &keywords(&["x y"]), &catalog, 2, 3).await;
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.origin == CandidateOrigin::Emergency));
    }

    #[tokio::test]
    async fn downloads_keep_successes() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FallbackCatalog::builtin();
        let candidates = catalog.emergency_candidates();

        let source = ScriptedSource::new(&[]);
        let paths = download_all(&source, &candidates, dir.path()).await;
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.exists()));

        let mut failing = ScriptedSource::new(&[]);
        failing.fail_downloads = true;
        assert!(download_all(&failing, &candidates, dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn reserve_skips_used_urls_then_runs_dry() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FallbackCatalog::builtin();
        let source = ScriptedSource::new(&[
            ("university campus aerial view", "already-used"),
            ("students walking campus", "p2"),
        ]);
        let used = source.search("university campus aerial view").await.unwrap().unwrap();

        let mut reserve = FootageReserve::new(&catalog, &[used]);
        let first = reserve.download_next(&source, dir.path()).await.unwrap();
        assert_eq!(first.file_name().unwrap(), "clip_1.mp4");
        assert!(reserve.download_next(&source, dir.path()).await.is_some());
        assert!(reserve.download_next(&source, dir.path()).await.is_some());
        assert!(reserve.download_next(&source, dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn reserve_gives_up_when_every_download_fails() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FallbackCatalog::builtin();
        let mut source = ScriptedSource::new(&[("students walking campus", "p2")]);
        source.fail_downloads = true;

        let mut reserve = FootageReserve::new(&catalog, &[]);
        assert!(reserve.download_next(&source, dir.path()).await.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn best_file_prefers_portrait_near_1080p() {
        let json = serde_json::json!({
            "videos": [
                { "video_files": [
                    { "link": "land", "width": 1920, "height": 1080, "file_type": "video/mp4" }
                ]},
                { "video_files": [
                    { "link": "p4k", "width": 2160, "height": 3840, "file_type": "video/mp4" },
                    { "link": "p1080", "width": 1080, "height": 1920, "file_type": "video/mp4" },
                    { "link": "p720", "width": 720, "height": 1280, "file_type": "video/mp4" }
                ]}
            ]
        });
        let body: PexelsSearchResponse = serde_json::from_value(json).unwrap();
        assert_eq!(select_best_file(&body.videos).unwrap().link, "p1080");
    }

    #[test]
    fn best_file_falls_back_to_landscape() {
        let json = serde_json::json!({
            "videos": [{ "video_files": [
                { "link": "sd", "width": 960, "height": 540, "file_type": "video/mp4" },
                { "link": "hd", "width": 1920, "height": 1080, "file_type": "video/mp4" }
            ]}]
        });
        let body: PexelsSearchResponse = serde_json::from_value(json).unwrap();
        assert_eq!(select_best_file(&body.videos).unwrap().link, "hd");
    }
}
