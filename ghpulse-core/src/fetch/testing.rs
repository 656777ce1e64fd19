//! In-memory doubles for pagination and pipeline tests

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use super::paginator::PageStream;
use super::{Page, PagedApi};
use crate::checkpoint::StreamProgress;
use crate::model::{Activity, Issue, IssueState, Repository, RepositorySummary};
use crate::sink::{DocumentSink, UpsertStats};
use crate::{Error, Result};

/// `day` days after 2024-01-01
pub fn ts(day: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(day)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dated(pub DateTime<Utc>);

impl Activity for Dated {
    fn activity_time(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Serves a fixed list of pages and records what the paginator did
pub struct ScriptedStream {
    pages: Vec<Page<Dated>>,
    requested: Mutex<Vec<Option<String>>>,
    records: Mutex<Vec<StreamProgress>>,
    persisted: AtomicUsize,
    persist_calls: AtomicUsize,
    fail_persist_on: Option<usize>,
}

impl ScriptedStream {
    pub fn new(pages: Vec<Page<Dated>>) -> Self {
        Self {
            pages,
            requested: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
            persisted: AtomicUsize::new(0),
            persist_calls: AtomicUsize::new(0),
            fail_persist_on: None,
        }
    }

    /// `total` items split into pages whose cursor is the next offset
    pub fn uniform(total: usize, page_size: usize) -> Self {
        let items: Vec<_> = (0..total).map(|i| Dated(ts(i as i64))).collect();
        let chunks: Vec<_> = items.chunks(page_size).map(<[Dated]>::to_vec).collect();
        let last = chunks.len().saturating_sub(1);

        let pages = if chunks.is_empty() {
            vec![Page::last(Vec::new())]
        } else {
            chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| {
                    if i == last {
                        Page::last(chunk)
                    } else {
                        Page::with_next(chunk, ((i + 1) * page_size).to_string())
                    }
                })
                .collect()
        };
        Self::new(pages)
    }

    /// Fail the `n`th persist call (1-based)
    pub fn failing_persist_on(mut self, n: usize) -> Self {
        self.fail_persist_on = Some(n);
        self
    }

    pub fn requested(&self) -> Vec<Option<String>> {
        self.requested.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<StreamProgress> {
        self.records.lock().unwrap().clone()
    }

    pub fn persisted(&self) -> usize {
        self.persisted.load(Ordering::SeqCst)
    }

    fn index_of(&self, cursor: Option<&str>) -> Option<usize> {
        match cursor {
            None => Some(0),
            Some(cursor) => self
                .pages
                .iter()
                .position(|page| page.next_cursor.as_deref() == Some(cursor))
                .map(|i| i + 1),
        }
    }
}

#[async_trait]
impl PageStream for ScriptedStream {
    type Item = Dated;

    fn target(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Page<Dated>> {
        self.requested
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));
        self.index_of(cursor)
            .and_then(|i| self.pages.get(i).cloned())
            .ok_or_else(|| Error::RepositoryNotAccessible("scripted".to_string()))
    }

    async fn persist(&self, items: &[Dated]) -> Result<()> {
        let call = self.persist_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_persist_on == Some(call) {
            return Err(Error::Persistence("scripted write failure".to_string()));
        }
        self.persisted.fetch_add(items.len(), Ordering::SeqCst);
        Ok(())
    }

    fn record(&self, progress: &StreamProgress) {
        self.records.lock().unwrap().push(progress.clone());
    }
}

pub fn repository(name: &str, stars: u64) -> Repository {
    Repository {
        owner: "acme".to_string(),
        name: name.to_string(),
        description: None,
        url: format!("https://github.com/acme/{}", name),
        stars,
        forks: 0,
        primary_language: None,
        is_archived: false,
        is_fork: false,
        is_private: false,
        created_at: ts(0),
        updated_at: ts(10),
        pushed_at: Some(ts(10)),
    }
}

fn issue(repository: &str, number: u64) -> Issue {
    Issue {
        repository: repository.to_string(),
        number,
        title: format!("Issue {}", number),
        state: IssueState::Open,
        author: None,
        labels: Vec::new(),
        comments: 0,
        url: format!("https://github.com/acme/{}/issues/{}", repository, number),
        created_at: ts(1000 - number as i64),
        updated_at: ts(1000 - number as i64),
        closed_at: None,
    }
}

/// How the fake API answers issue requests for one repository
#[derive(Debug, Clone)]
pub enum IssueScript {
    /// Item count of each page, served with page-number cursors
    Pages(Vec<usize>),
    NotAccessible,
    Failing,
}

/// Paged API over in-memory repositories with scripted issue behavior
pub struct FakeApi {
    repos: Option<Vec<Repository>>,
    issues: Mutex<HashMap<String, IssueScript>>,
    repo_requests: Mutex<Vec<Option<String>>>,
    issue_requests: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new(repos: Vec<Repository>) -> Self {
        Self {
            repos: Some(repos),
            issues: Mutex::new(HashMap::new()),
            repo_requests: Mutex::new(Vec::new()),
            issue_requests: Mutex::new(Vec::new()),
        }
    }

    /// `n` repositories named `repo-000`, `repo-001`, ...
    pub fn with_repositories(n: usize) -> Self {
        Self::new(
            (0..n)
                .map(|i| repository(&format!("repo-{:03}", i), i as u64))
                .collect(),
        )
    }

    pub fn missing_organization() -> Self {
        Self {
            repos: None,
            ..Self::new(Vec::new())
        }
    }

    pub fn issues(self, repo: &str, script: IssueScript) -> Self {
        self.set_issues(repo, script);
        self
    }

    pub fn set_issues(&self, repo: &str, script: IssueScript) {
        self.issues
            .lock()
            .unwrap()
            .insert(repo.to_string(), script);
    }

    pub fn reset_requests(&self) {
        self.repo_requests.lock().unwrap().clear();
        self.issue_requests.lock().unwrap().clear();
    }

    pub fn repository_requests(&self) -> Vec<Option<String>> {
        self.repo_requests.lock().unwrap().clone()
    }

    /// Repositories whose issues were requested, in order of first request
    pub fn issue_repositories(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for repo in self.issue_requests.lock().unwrap().iter() {
            if !seen.contains(repo) {
                seen.push(repo.clone());
            }
        }
        seen
    }

    pub fn issue_requests(&self, repo: &str) -> usize {
        self.issue_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == repo)
            .count()
    }
}

#[async_trait]
impl PagedApi for FakeApi {
    async fn organization_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Repository>> {
        self.repo_requests
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));

        let repos = self
            .repos
            .as_ref()
            .ok_or_else(|| Error::OrganizationNotFound(org.to_string()))?;
        let offset = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| Error::Api(format!("bad cursor {}", cursor)))?,
            None => 0,
        };
        let end = (offset + page_size as usize).min(repos.len());
        let items = repos[offset.min(end)..end].to_vec();

        Ok(if end < repos.len() {
            Page::with_next(items, end.to_string())
        } else {
            Page::last(items)
        })
    }

    async fn repository_issues(
        &self,
        org: &str,
        repo: &str,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<Page<Issue>> {
        self.issue_requests.lock().unwrap().push(repo.to_string());

        let script = self
            .issues
            .lock()
            .unwrap()
            .get(repo)
            .cloned()
            .unwrap_or(IssueScript::Pages(Vec::new()));

        let counts = match script {
            IssueScript::Pages(counts) => counts,
            IssueScript::NotAccessible => {
                return Err(Error::RepositoryNotAccessible(format!("{}/{}", org, repo)))
            }
            IssueScript::Failing => return Err(Error::Api("scripted failure".to_string())),
        };

        let page: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(1);
        let first: usize = counts.iter().take(page - 1).sum();
        let count = counts.get(page - 1).copied().unwrap_or(0);
        let items = (first..first + count)
            .map(|n| issue(repo, n as u64 + 1))
            .collect();

        Ok(if page < counts.len() {
            Page::with_next(items, (page + 1).to_string())
        } else {
            Page::last(items)
        })
    }
}

/// Document sink over in-memory maps
#[derive(Default)]
pub struct MemorySink {
    repos: Mutex<BTreeMap<(String, String), Repository>>,
    issues: Mutex<BTreeMap<(String, String, u64), Issue>>,
    repo_writes: AtomicUsize,
    fail_repo_write_on: Mutex<Option<usize>>,
    issue_writes: AtomicUsize,
    fail_issue_writes_from: Mutex<Option<usize>>,
}

impl MemorySink {
    /// Fail the `n`th repository write (1-based)
    pub fn fail_repository_write(&self, n: usize) {
        *self.fail_repo_write_on.lock().unwrap() = Some(n);
    }

    /// Fail the `n`th issue write (1-based) and every one after it
    pub fn fail_issue_writes_from(&self, n: usize) {
        *self.fail_issue_writes_from.lock().unwrap() = Some(n);
    }

    pub fn repository_count(&self) -> usize {
        self.repos.lock().unwrap().len()
    }

    pub fn issue_count(&self) -> usize {
        self.issues.lock().unwrap().len()
    }
}

fn upsert<K: Ord, V: PartialEq>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
    stats: &mut UpsertStats,
) {
    match map.get(&key) {
        None => stats.upserted += 1,
        Some(old) if *old != value => stats.modified += 1,
        Some(_) => return,
    }
    map.insert(key, value);
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn upsert_repositories(&self, org: &str, repos: &[Repository]) -> Result<UpsertStats> {
        let write = self.repo_writes.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_repo_write_on.lock().unwrap() == Some(write) {
            return Err(Error::Persistence("scripted write failure".to_string()));
        }

        let mut stats = UpsertStats::default();
        let mut map = self.repos.lock().unwrap();
        for repo in repos {
            upsert(
                &mut map,
                (org.to_string(), repo.name.clone()),
                repo.clone(),
                &mut stats,
            );
        }
        Ok(stats)
    }

    async fn upsert_issues(&self, org: &str, issues: &[Issue]) -> Result<UpsertStats> {
        let write = self.issue_writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_issue_writes_from
            .lock()
            .unwrap()
            .is_some_and(|from| write >= from)
        {
            return Err(Error::Persistence("disk full".to_string()));
        }

        let mut stats = UpsertStats::default();
        let mut map = self.issues.lock().unwrap();
        for issue in issues {
            upsert(
                &mut map,
                (org.to_string(), issue.repository.clone(), issue.number),
                issue.clone(),
                &mut stats,
            );
        }
        Ok(stats)
    }

    async fn repository_summaries(&self, org: &str) -> Result<Vec<RepositorySummary>> {
        let mut summaries: Vec<_> = self
            .repos
            .lock()
            .unwrap()
            .iter()
            .filter(|((owner, _), _)| owner == org)
            .map(|((owner, name), repo)| RepositorySummary {
                org: owner.clone(),
                name: name.clone(),
                stars: repo.stars,
            })
            .collect();
        summaries.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.name.cmp(&b.name)));
        Ok(summaries)
    }
}
