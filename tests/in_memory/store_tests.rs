//! Contract tests for [`InMemoryBuildStore`].

use chrono::{TimeZone, Utc};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use solobuild::build::{
    adapters::memory::InMemoryBuildStore,
    domain::{
        BranchName, Checksum, NewArtifact, NewBuildTask, PrincipalId, SourceSelector,
        StoredFile, TaskId, TaskStatus, TaskTransition,
    },
    ports::{BuildStore, BuildStoreError, SortOrder, TaskQuery},
};

#[fixture]
fn store() -> InMemoryBuildStore {
    InMemoryBuildStore::new()
}

fn draft(initiator: i64) -> NewBuildTask {
    NewBuildTask::new(
        PrincipalId::new(initiator).expect("valid principal"),
        SourceSelector::new(BranchName::new("main").expect("branch")),
        SourceSelector::new(BranchName::new("main").expect("branch")),
        &DefaultClock,
    )
}

fn stored_file(name: &str) -> StoredFile {
    StoredFile {
        file_name: name.to_owned(),
        file_path: format!("/srv/artifacts/{name}"),
        file_size: 3,
        checksum: Checksum::new(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        )
        .expect("checksum"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn query_filters_orders_and_pages(store: InMemoryBuildStore) {
    let mut ids = Vec::new();
    for initiator in [1, 2, 1] {
        let task = store.create_task(draft(initiator)).await.expect("create");
        ids.push(task.id());
    }
    let first = *ids.first().expect("first id");
    store
        .update_task(
            first,
            TaskTransition::Enqueue {
                message: "Task queued".to_owned(),
            },
        )
        .await
        .expect("enqueue");

    let queued = store
        .query_tasks(&TaskQuery::new().with_statuses(TaskStatus::ACTIVE))
        .await
        .expect("query");
    assert_eq!(queued.iter().map(|task| task.id()).collect::<Vec<_>>(), [first]);

    let newest_by_one = store
        .query_tasks(
            &TaskQuery::new()
                .with_initiator(PrincipalId::new(1).expect("principal"))
                .ordered(SortOrder::NewestFirst)
                .limit(1),
        )
        .await
        .expect("query");
    assert_eq!(
        newest_by_one.first().map(|task| task.id()),
        ids.last().copied()
    );

    let second_page = store
        .query_tasks(&TaskQuery::new().ordered(SortOrder::OldestFirst).offset(1).limit(5))
        .await
        .expect("query");
    assert_eq!(second_page.len(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tasks_resolve_by_token(store: InMemoryBuildStore) {
    let task = store.create_task(draft(3)).await.expect("create");
    let found = store
        .find_task_by_token(task.token())
        .await
        .expect("lookup")
        .expect("task should be found");
    assert_eq!(found, task);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_transition_leaves_the_record_intact(store: InMemoryBuildStore) {
    let task = store.create_task(draft(1)).await.expect("create");
    let at = Utc
        .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
        .single()
        .expect("timestamp");
    store
        .update_task(
            task.id(),
            TaskTransition::Fail {
                at,
                cause: "boom".to_owned(),
            },
        )
        .await
        .expect("fail");

    let result = store
        .update_task(
            task.id(),
            TaskTransition::Succeed {
                at,
                message: "Build completed".to_owned(),
            },
        )
        .await;
    assert!(matches!(result, Err(BuildStoreError::Transition(_))));

    let stored = store
        .find_task(task.id())
        .await
        .expect("lookup")
        .expect("task");
    assert_eq!(stored.status(), TaskStatus::Failed);
    assert_eq!(stored.error_message(), Some("boom"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn one_artifact_per_task(store: InMemoryBuildStore) {
    let task = store.create_task(draft(1)).await.expect("create");
    let artifact = store
        .create_artifact(NewArtifact {
            task_id: task.id(),
            file: stored_file("a.apk"),
            created_at: Utc::now(),
        })
        .await
        .expect("first artifact");
    assert_eq!(artifact.download_url(), "/artifacts/a.apk");
    assert_eq!(artifact.download_count(), 0);
    assert!(!artifact.is_archived());

    let duplicate = store
        .create_artifact(NewArtifact {
            task_id: task.id(),
            file: stored_file("b.apk"),
            created_at: Utc::now(),
        })
        .await;
    assert!(matches!(duplicate, Err(BuildStoreError::DuplicateArtifact(id)) if id == task.id()));

    let orphan = store
        .create_artifact(NewArtifact {
            task_id: TaskId::new(999).expect("id"),
            file: stored_file("c.apk"),
            created_at: Utc::now(),
        })
        .await;
    assert!(matches!(orphan, Err(BuildStoreError::TaskNotFound(_))));
}
