//! SQLite repository integration tests
//!
//! Run against a real database file created by the common schema code.

mod helpers;

use helpers::{create_test_db, wire_repositories, TAG_TABLE};
use imtag_register::models::{
    FileLocation, ImageEntry, ImageHash, ImageMetadata, ImageSize, ModelTagEntries, TaggerResult,
};
use imtag_register::repositories::unit_of_work::{IMAGES, MODEL_TAG};
use imtag_register::repositories::{
    ImagesRepository, ModelTagRepository, RepositoryError, Transactional, UnitOfWorkError,
};
use imtag_register::RegisterError;

fn entry(name: &str, content: &[u8]) -> ImageEntry {
    ImageEntry::from_metadata(ImageMetadata::create(
        FileLocation::new(format!("images/{}", name)).unwrap(),
        content,
        ImageSize::new(64, 48).unwrap(),
        "png",
        content.len() as u64,
    ))
}

fn tags() -> TaggerResult {
    TaggerResult::new(vec![
        (
            "general".to_string(),
            vec![("sky".to_string(), 0.4), ("cloud".to_string(), 0.9)],
        ),
        ("rating".to_string(), vec![("safe".to_string(), 0.99)]),
    ])
}

#[tokio::test]
async fn test_add_returns_ids_in_submission_order() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let entries = vec![entry("c.png", b"c"), entry("a.png", b"a"), entry("b.png", b"b")];
    let ids = repos.images.add(&entries).await.unwrap();
    repos.images.commit().await.unwrap();

    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    for (id, expected) in ids.iter().zip(&entries) {
        let stored = repos.images.get(*id).await.unwrap().unwrap();
        assert_eq!(stored.image_id, Some(*id));
        assert_eq!(stored.file_location, expected.file_location);
        assert_eq!(stored.hash, expected.hash);
        assert_eq!((stored.width, stored.height), (64, 48));
        assert!(stored.added_at.is_some());
        assert!(stored.updated_at.is_some());
    }
}

#[tokio::test]
async fn test_add_empty_is_noop() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    assert!(repos.images.add(&[]).await.unwrap().is_empty());
    assert!(!repos.session.in_transaction().await);
}

#[tokio::test]
async fn test_duplicate_hash_rejected() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    repos.images.add(&[entry("one.png", b"same")]).await.unwrap();
    repos.images.commit().await.unwrap();

    let result = repos.images.add(&[entry("two.png", b"same")]).await;
    assert!(matches!(result, Err(RepositoryError::DuplicateImage(_))));
    repos.images.rollback().await.unwrap();

    assert_eq!(repos.images.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_find_by_hashes_spans_chunks() {
    let (_dir, pool) = create_test_db().await;
    // Chunk of 2 forces several lookup queries
    let repos = wire_repositories(&pool, 2);

    let entries: Vec<ImageEntry> = (0..5)
        .map(|i| entry(&format!("{}.png", i), format!("content {}", i).as_bytes()))
        .collect();
    repos.images.add(&entries).await.unwrap();
    repos.images.commit().await.unwrap();

    let mut wanted: Vec<ImageHash> = entries.iter().map(|e| e.hash.clone()).collect();
    wanted.push(ImageHash::from_binary(b"never stored"));

    let found = repos.images.find_by_hashes(&wanted).await.unwrap();
    let mut found_hashes: Vec<ImageHash> = found.into_iter().map(|e| e.hash).collect();
    found_hashes.sort();

    let mut expected: Vec<ImageHash> = entries.into_iter().map(|e| e.hash).collect();
    expected.sort();
    assert_eq!(found_hashes, expected);

    assert!(repos.images.find_by_hashes(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_remove_contains() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let ids = repos
        .images
        .add(&[entry("a.png", b"a"), entry("b.png", b"b")])
        .await
        .unwrap();
    repos.images.commit().await.unwrap();

    let mut moved = repos.images.get(ids[0]).await.unwrap().unwrap();
    moved.file_location = FileLocation::new("archive/a.png").unwrap();
    repos.images.update(&[moved]).await.unwrap();
    repos.images.commit().await.unwrap();

    let stored = repos.images.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(stored.file_location.as_str(), "archive/a.png");

    // Never-persisted entry cannot be updated
    let result = repos.images.update(&[entry("c.png", b"c")]).await;
    assert!(matches!(result, Err(RepositoryError::MissingImageId(_))));
    repos.images.rollback().await.unwrap();

    let mut ghost = stored.clone();
    ghost.image_id = Some(9999);
    let result = repos.images.update(&[ghost]).await;
    assert!(matches!(result, Err(RepositoryError::ImageNotFound(_))));
    repos.images.rollback().await.unwrap();

    assert!(matches!(
        repos.images.update(&[]).await,
        Err(RepositoryError::InvalidArgument(_))
    ));
    assert!(matches!(
        repos.images.remove(&[]).await,
        Err(RepositoryError::InvalidArgument(_))
    ));

    assert_eq!(repos.images.remove(&[ids[1], 9999]).await.unwrap(), 1);
    repos.images.commit().await.unwrap();

    assert!(repos.images.contains(ids[0]).await.unwrap());
    assert!(!repos.images.contains(ids[1]).await.unwrap());
    assert_eq!(repos.images.list(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_model_tags_round_trip() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);
    assert_eq!(repos.model_tag.table(), TAG_TABLE);

    let ids = repos.images.add(&[entry("a.png", b"a")]).await.unwrap();
    let written = repos
        .model_tag
        .add(&[ModelTagEntries::from_tagger_result(ids[0], &tags())])
        .await
        .unwrap();
    repos.session.commit().await.unwrap();
    assert_eq!(written, 3);

    let stored = repos.model_tag.get(ids[0]).await.unwrap();
    let rows: Vec<(String, String)> = stored
        .iter()
        .map(|e| (e.category.clone(), e.tag.clone()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("general".to_string(), "cloud".to_string()),
            ("general".to_string(), "sky".to_string()),
            ("rating".to_string(), "safe".to_string()),
        ]
    );
    assert!(stored.iter().all(|e| e.image_id == ids[0] && !e.archived));

    assert_eq!(repos.model_tag.remove_all_by_image_id(ids[0]).await.unwrap(), 3);
    repos.model_tag.commit().await.unwrap();
    assert_eq!(repos.model_tag.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_repository_calls_run_on_spawned_tasks() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let images = repos.images.clone();
    let model_tag = repos.model_tag.clone();
    let image_id = tokio::spawn(async move {
        let ids = images.add(&[entry("a.png", b"a")]).await?;
        model_tag
            .add(&[ModelTagEntries::from_tagger_result(ids[0], &tags())])
            .await?;
        model_tag.commit().await?;
        Ok::<_, RepositoryError>(ids[0])
    })
    .await
    .unwrap()
    .unwrap();

    let images = repos.images.clone();
    let model_tag = repos.model_tag.clone();
    let (found, stored, tag_count) = tokio::spawn(async move {
        let found = images.find_by_hashes(&[entry("a.png", b"a").hash]).await?;
        let stored = images.contains(image_id).await?;
        let tag_count = model_tag.count().await?;
        Ok::<_, RepositoryError>((found, stored, tag_count))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(found.len(), 1);
    assert!(stored);
    assert_eq!(tag_count, 3);
}

#[tokio::test]
async fn test_tags_for_unknown_image_rejected() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let result = repos
        .model_tag
        .add(&[ModelTagEntries::from_tagger_result(4242, &tags())])
        .await;
    assert!(matches!(result, Err(RepositoryError::ImageNotFound(_))));
    repos.model_tag.rollback().await.unwrap();
}

#[tokio::test]
async fn test_removing_image_cascades_to_tags() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let ids = repos.images.add(&[entry("a.png", b"a")]).await.unwrap();
    repos
        .model_tag
        .add(&[ModelTagEntries::from_tagger_result(ids[0], &tags())])
        .await
        .unwrap();
    repos.session.commit().await.unwrap();

    repos.images.remove(&ids).await.unwrap();
    repos.images.commit().await.unwrap();

    assert_eq!(repos.model_tag.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unit_of_work_commits_both_tables() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let image_ids = repos
        .unit_of_work
        .run(|uow| async move {
            let images = uow.images(IMAGES)?;
            let model_tag = uow.model_tag(MODEL_TAG)?;

            let ids = images.add(&[entry("a.png", b"a")]).await?;
            model_tag
                .add(&[ModelTagEntries::from_tagger_result(ids[0], &tags())])
                .await?;
            Ok::<_, RegisterError>(ids)
        })
        .await
        .unwrap();

    assert!(!repos.session.in_transaction().await);
    assert_eq!(repos.images.count().await.unwrap(), 1);
    assert_eq!(repos.model_tag.get(image_ids[0]).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unit_of_work_failure_rolls_back_both_tables() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let result = repos
        .unit_of_work
        .run(|uow| async move {
            let images = uow.images(IMAGES)?;
            let model_tag = uow.model_tag(MODEL_TAG)?;

            let ids = images.add(&[entry("a.png", b"a")]).await?;
            model_tag
                .add(&[ModelTagEntries::from_tagger_result(ids[0], &tags())])
                .await?;
            // Tag rows for a missing image fail after the first writes succeeded
            model_tag
                .add(&[ModelTagEntries::from_tagger_result(ids[0] + 100, &tags())])
                .await?;
            Ok::<_, RegisterError>(())
        })
        .await;

    assert!(matches!(
        result,
        Err(RegisterError::Repository(RepositoryError::ImageNotFound(_)))
    ));
    assert!(!repos.session.in_transaction().await);
    assert_eq!(repos.images.count().await.unwrap(), 0);
    assert_eq!(repos.model_tag.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unit_of_work_unknown_repository() {
    let (_dir, pool) = create_test_db().await;
    let repos = wire_repositories(&pool, 500);

    let result = repos
        .unit_of_work
        .run(|uow| async move {
            uow.images("thumbnails")?;
            Ok::<_, RegisterError>(())
        })
        .await;

    assert!(matches!(
        result,
        Err(RegisterError::UnitOfWork(UnitOfWorkError::RepositoryNotFound(_)))
    ));
}
