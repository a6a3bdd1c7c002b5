//! Contract tests for the in-memory backends.

use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use quarry_backend::fakes::{FailingBackend, MemoryBackend, MemoryRepo};
use quarry_backend::{
    CommitQuery, CommitSearchRequest, CommitSearcher, FileMatch, IndexedKind, IndexedQuery,
    IndexedSearchBatch, IndexedSearchOptions, IndexedSearcher, PatternInfo, RawCommit,
    RepoOptions, RepoResolver, RepoRevs, SearcherRequest, Signature, SymbolRequest,
    SymbolSearcher, UnindexedSearcher,
};

fn commit(oid: &str, author: &str, message: &str, day: u32) -> RawCommit {
    let sig = Signature {
        name: author.to_string(),
        email: format!("{author}@example.com"),
        date: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
    };
    RawCommit {
        oid: oid.to_string(),
        author: sig.clone(),
        committer: sig,
        message: message.to_string(),
        parents: vec![],
        diff: Some("--- a/main.go\n+++ b/main.go\n+fmt.Println(\"hi\")\n".to_string()),
        modified_files: vec!["main.go".to_string()],
    }
}

fn backend() -> MemoryBackend {
    MemoryBackend::new(vec![
        MemoryRepo::new(1, "github.com/acme/api")
            .with_file("main.go", "package main\nfunc main() {}\n")
            .with_symbol("main", "function", "main.go", 1)
            .with_commit(commit("a1b2c3d4e5", "alice", "fix: handle errors", 10)),
        MemoryRepo::new(2, "github.com/acme/web")
            .with_file("index.ts", "export const main = 1;\n")
            .unindexed(),
        MemoryRepo::new(3, "github.com/other/api-fork")
            .with_file("main.go", "package main\n")
            .fork(),
        MemoryRepo::new(4, "github.com/acme/old").archived(),
    ])
}

#[tokio::test]
async fn test_resolve_pages_are_ordered_and_disjoint() {
    let b = backend();
    let opts = RepoOptions::default();

    let first = b.resolve_page(&opts, None, 2).await.unwrap();
    assert_eq!(first.repos.len(), 2);
    assert_eq!(first.repos[0].repo.id, 1);
    assert_eq!(first.next, Some(3));

    let second = b.resolve_page(&opts, first.next, 2).await.unwrap();
    assert_eq!(
        second.repos.iter().map(|r| r.repo.id).collect::<Vec<_>>(),
        vec![3, 4]
    );
    assert_eq!(second.next, None);
}

#[tokio::test]
async fn test_resolve_applies_filters_and_reports_missing_revs() {
    let b = backend();
    let opts = RepoOptions {
        repo_filters: vec!["acme@main:v9".into()],
        no_forks: true,
        no_archived: true,
        ..Default::default()
    };
    let page = b.resolve_page(&opts, None, 0).await.unwrap();
    let names: Vec<_> = page.repos.iter().map(|r| r.repo.name.as_str()).collect();
    assert_eq!(names, vec!["github.com/acme/api", "github.com/acme/web"]);
    assert_eq!(page.repos[0].revs, vec!["main"]);
    assert_eq!(page.missing_revs.len(), 2);
    assert_eq!(page.missing_revs[0].revs, vec!["v9"]);

    let excluded = b.excluded(&opts).await.unwrap();
    assert_eq!(excluded.forks, 0);
    assert_eq!(excluded.archived, 1);
}

#[tokio::test]
async fn test_bad_repo_filter_is_bad_request() {
    let b = backend();
    let opts = RepoOptions {
        repo_filters: vec!["(".into()],
        ..Default::default()
    };
    let err = b.resolve_page(&opts, None, 10).await.unwrap_err();
    assert!(err.is_bad_request());
}

#[tokio::test]
async fn test_resolve_expands_rev_globs() {
    let b = MemoryBackend::new(vec![MemoryRepo::new(1, "github.com/acme/api")
        .with_branch("feature/a")
        .with_branch("feature/b")
        .with_branch("release")]);
    let opts = RepoOptions {
        repo_filters: vec!["acme@*refs/heads/feature/*".into()],
        ..Default::default()
    };
    let page = b.resolve_page(&opts, None, 0).await.unwrap();
    assert_eq!(page.repos.len(), 1);
    assert_eq!(page.repos[0].revs, vec!["feature/a", "feature/b"]);
    assert!(page.missing_revs.is_empty());

    let none = RepoOptions {
        repo_filters: vec!["acme@*refs/heads/hotfix/*".into()],
        ..Default::default()
    };
    assert!(b.resolve_page(&none, None, 0).await.unwrap().repos.is_empty());
}

#[tokio::test]
async fn test_indexed_search_streams_per_repo() {
    let b = backend();
    let query = IndexedQuery::Substring {
        pattern: "package main".into(),
        case_sensitive: false,
        file_name: false,
        content: true,
    };
    let batches = Mutex::new(Vec::<IndexedSearchBatch>::new());
    IndexedSearcher::search(
        &b,
        &query,
        &IndexedSearchOptions::default(),
        &|batch: IndexedSearchBatch| batches.lock().unwrap().push(batch),
    )
    .await
    .unwrap();

    let batches = batches.into_inner().unwrap();
    // repo 2 is not indexed
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].files[0].file_name, "main.go");
    assert_eq!(batches[0].files[0].line_matches[0].line_number, 1);
}

#[tokio::test]
async fn test_indexed_symbol_search() {
    let b = backend();
    let query = IndexedQuery::Symbol(Box::new(IndexedQuery::Substring {
        pattern: "main".into(),
        case_sensitive: true,
        file_name: false,
        content: true,
    }));
    let opts = IndexedSearchOptions {
        kind: IndexedKind::Symbol,
        ..Default::default()
    };
    let files = Mutex::new(Vec::new());
    IndexedSearcher::search(&b, &query, &opts, &|batch: IndexedSearchBatch| {
        files.lock().unwrap().extend(batch.files)
    })
    .await
    .unwrap();
    let files = files.into_inner().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].symbols[0].name, "main");
    assert_eq!(files[0].symbols[0].line_number, 2);
}

#[tokio::test]
async fn test_indexed_file_limit() {
    let b = backend();
    let opts = IndexedSearchOptions {
        file_match_limit: 1,
        ..Default::default()
    };
    let batches = Mutex::new(Vec::<IndexedSearchBatch>::new());
    IndexedSearcher::search(
        &b,
        &IndexedQuery::Const(true),
        &opts,
        &|batch: IndexedSearchBatch| batches.lock().unwrap().push(batch),
    )
    .await
    .unwrap();
    let batches = batches.into_inner().unwrap();
    let total: usize = batches.iter().map(|b| b.files.len()).sum();
    assert_eq!(total, 1);
    assert!(batches.last().unwrap().limit_hit);
}

#[tokio::test]
async fn test_indexed_repos_reports_unindexed() {
    let b = backend();
    let page = b
        .resolve_page(&RepoOptions::default(), None, 0)
        .await
        .unwrap();
    let indexed = b.indexed_repos(&page.repos).await.unwrap();
    assert!(indexed.contains(&1));
    assert!(!indexed.contains(&2));
}

#[tokio::test]
async fn test_unindexed_search() {
    let b = backend();
    let req = SearcherRequest {
        repo: "github.com/acme/web".into(),
        repo_id: 2,
        commit: "HEAD".into(),
        pattern_info: PatternInfo {
            pattern: "main".into(),
            ..Default::default()
        },
        ..Default::default()
    };
    let got = Mutex::new(Vec::new());
    let limit_hit = UnindexedSearcher::search(&b, &req, &|m: Vec<FileMatch>| {
        got.lock().unwrap().extend(m)
    })
    .await
    .unwrap();
    assert!(!limit_hit);
    assert_eq!(got.into_inner().unwrap()[0].path, "index.ts");
    assert_eq!(b.calls(), vec!["searcher:github.com/acme/web@HEAD"]);

    let missing = SearcherRequest {
        commit: "v9".into(),
        ..req
    };
    let err = UnindexedSearcher::search(&b, &missing, &|_: Vec<FileMatch>| {})
        .await
        .unwrap_err();
    assert!(err.to_string().contains("v9"));
}

#[tokio::test]
async fn test_symbol_search() {
    let b = backend();
    let req = SymbolRequest {
        repo: quarry_backend::RepoRef::new(1, "github.com/acme/api"),
        pattern: "^ma".into(),
        is_regexp: true,
        first: 10,
        ..Default::default()
    };
    let symbols = SymbolSearcher::search(&b, &req).await.unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0].path, "main.go");
}

#[tokio::test]
async fn test_commit_search() {
    let b = backend();
    let req = CommitSearchRequest {
        repo: RepoRevs::default_branch(quarry_backend::RepoRef::new(1, "github.com/acme/api")),
        query: CommitQuery::and(vec![
            CommitQuery::AuthorMatches {
                expr: "ALICE".into(),
                ignore_case: true,
            },
            CommitQuery::DiffMatches {
                expr: "Println".into(),
                ignore_case: false,
            },
        ]),
        include_diff: false,
        include_modified_files: true,
        limit: 0,
    };
    let got = Mutex::new(Vec::new());
    CommitSearcher::search(&b, &req, &|c: Vec<RawCommit>| got.lock().unwrap().extend(c))
        .await
        .unwrap();
    let got = got.into_inner().unwrap();
    assert_eq!(got.len(), 1);
    assert!(got[0].diff.is_none());
    assert_eq!(got[0].modified_files, vec!["main.go"]);
}

#[tokio::test]
async fn test_failing_backend_fails_every_call() {
    let f = FailingBackend::new("commits");
    assert!(f
        .resolve_page(&RepoOptions::default(), None, 1)
        .await
        .is_err());
    let err = SymbolSearcher::search(&f, &SymbolRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "backend unavailable: commits");
}
