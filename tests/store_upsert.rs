// tests/store_upsert.rs
use sector_digest::store::{LocalStore, NewArticle, NewSource, Store};
use sector_digest::upsert::{get_or_create, persist_article};

fn source(url: &str) -> NewSource {
    NewSource {
        title: "t".into(),
        url: url.into(),
        domain: sector_digest::trust::extract_domain(url),
        sector: "Finance".into(),
    }
}

fn article(title: &str) -> NewArticle {
    NewArticle {
        title: title.into(),
        content: "body[1]".into(),
        sector: "Finance".into(),
        impact_score: 4,
    }
}

#[tokio::test]
async fn same_url_across_runs_reuses_the_row_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("digest.json");

    let first = {
        let store = LocalStore::open(&path).unwrap();
        persist_article(
            &store,
            &article("one"),
            &[source("https://ft.com/x"), source("https://ft.com/x")],
            &["Banking".to_string()],
        )
        .await
        .unwrap()
    };
    assert_eq!(first.source_ids[0], first.source_ids[1]);

    let store = LocalStore::open(&path).unwrap();
    let second = persist_article(
        &store,
        &article("two"),
        &[source("https://ft.com/y"), source("https://ft.com/x")],
        &["Banking".to_string(), "Payments".into()],
    )
    .await
    .unwrap();

    assert_eq!(second.source_ids[1], first.source_ids[0]);
    assert_eq!(second.tag_ids[0], first.tag_ids[0]);
    let stats = store.stats().await.unwrap();
    assert_eq!((stats.articles, stats.sources, stats.tags), (2, 2, 2));

    // duplicate positions link once
    let view = store.article(first.id).await.unwrap().unwrap();
    assert_eq!(view.sources.len(), 1);
}

#[tokio::test]
async fn uncommitted_work_is_invisible() {
    let store = LocalStore::in_memory();
    {
        let mut tx = store.begin().await.unwrap();
        let ids = get_or_create(tx.as_mut(), &[source("https://ft.com/z")]).await.unwrap();
        assert_eq!(ids.len(), 1);
        // dropped without commit
    }
    assert_eq!(store.stats().await.unwrap().sources, 0);

    let mut tx = store.begin().await.unwrap();
    let again = get_or_create(tx.as_mut(), &[source("https://ft.com/z")]).await.unwrap();
    tx.commit().await.unwrap();
    drop(tx);
    assert_eq!(again.len(), 1);
    assert_eq!(store.stats().await.unwrap().sources, 1);
}

#[tokio::test]
async fn commits_from_two_handles_on_one_file_both_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("digest.json");
    let first = LocalStore::open(&path).unwrap();
    let second = LocalStore::open(&path).unwrap();

    let a = persist_article(
        &first,
        &article("one"),
        &[source("https://ft.com/x")],
        &["Banking".to_string()],
    )
    .await
    .unwrap();
    // opened before the first commit, must still see it
    let b = persist_article(
        &second,
        &article("two"),
        &[source("https://ft.com/x"), source("https://ft.com/y")],
        &["Banking".to_string()],
    )
    .await
    .unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(b.source_ids[0], a.source_ids[0]);
    assert_eq!(b.tag_ids[0], a.tag_ids[0]);

    let reopened = LocalStore::open(&path).unwrap();
    let stats = reopened.stats().await.unwrap();
    assert_eq!((stats.articles, stats.sources, stats.tags), (2, 2, 1));
    assert!(first.article(b.id).await.unwrap().is_some());
}
