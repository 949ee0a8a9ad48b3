mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::oneshot;

use common::Backend;
use jurisconsultor_client::models::{Project, Task};
use jurisconsultor_client::optimistic::OptimisticList;
use jurisconsultor_client::resources::ListFilter;
use jurisconsultor_client::ClientError;

#[tokio::test]
async fn rejected_archive_restores_flag() -> Result<()> {
    let backend = Backend::start().await?;
    backend.state.forbid_project_updates.store(true, Ordering::SeqCst);
    let (client, _store) = backend.logged_in_client()?;

    let projects = client.projects().with_default_filter(ListFilter::include_archived(true));
    let view = OptimisticList::<Project>::load(Arc::new(projects.clone())).await?;
    let before = view.snapshot();

    let (release, hold) = oneshot::channel::<()>();
    let projects_ref = &projects;
    let mutation = view.apply_optimistic(
        "p1",
        |p| Project {
            is_archived: true,
            ..p.clone()
        },
        move || async move {
            let _ = hold.await;
            projects_ref.set_archived("p1", true).await
        },
    );

    let view_ref = &view;
    let observer = async move {
        // Projected before the server answers
        assert!(view_ref.get("p1").unwrap().is_archived);
        assert!(view_ref.is_pending("p1"));
        let _ = release.send(());
    };

    let (result, ()) = tokio::join!(mutation, observer);

    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::Validation { status: 403, .. }));
    assert_eq!(err.user_message(), "Only the project owner can archive it");
    assert_eq!(view.snapshot(), before);
    assert!(!view.is_pending("p1"));
    assert_eq!(backend.state.project("p1").unwrap()["is_archived"], false);
    Ok(())
}

#[tokio::test]
async fn confirmed_archive_keeps_canonical_record_across_refresh() -> Result<()> {
    let backend = Backend::start().await?;
    let (client, _store) = backend.expired_client()?;

    let projects = client.projects().with_default_filter(ListFilter::include_archived(true));
    let view = OptimisticList::<Project>::load(Arc::new(projects.clone())).await?;
    let mut published = view.subscribe();

    let project = view
        .apply_optimistic(
            "p2",
            |p| Project {
                is_archived: true,
                ..p.clone()
            },
            || projects.set_archived("p2", true),
        )
        .await?;

    assert!(project.is_archived);
    assert_eq!(project.members.len(), 2);
    assert_eq!(view.get("p2"), Some(project));
    assert!(published.has_changed()?);
    assert!(published.borrow_and_update().iter().any(|p| p.id == "p2" && p.is_archived));
    assert_eq!(backend.state.refresh_calls(), 1);
    assert_eq!(backend.state.project("p2").unwrap()["is_archived"], true);
    Ok(())
}

#[tokio::test]
async fn rejected_assignment_restores_previous_assignee() -> Result<()> {
    let backend = Backend::start().await?;
    let (client, _store) = backend.logged_in_client()?;

    let tasks = client.tasks();
    let view = OptimisticList::<Task>::load(Arc::new(tasks.for_project("p1"))).await?;
    let before = view.get("t2").unwrap();

    let err = view
        .apply_optimistic(
            "t2",
            |t| Task {
                assignee_email: Some("outsider@gmail.com".to_string()),
                ..t.clone()
            },
            || tasks.assign("t2", Some("outsider@gmail.com")),
        )
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "Assignee must be a member of the project");
    assert_eq!(view.get("t2"), Some(before));
    Ok(())
}

#[tokio::test]
async fn stale_rollback_refetches_authoritative_list() -> Result<()> {
    let backend = Backend::start().await?;
    backend.state.forbid_project_updates.store(true, Ordering::SeqCst);
    let (client, _store) = backend.logged_in_client()?;

    let projects = client.projects().with_default_filter(ListFilter::include_archived(true));
    let view = OptimisticList::<Project>::load(Arc::new(projects.clone())).await?;

    let (release, hold) = oneshot::channel::<()>();
    let projects_ref = &projects;
    let mutation = view.apply_optimistic(
        "p1",
        |p| Project {
            is_archived: true,
            ..p.clone()
        },
        move || async move {
            let _ = hold.await;
            projects_ref.set_archived("p1", true).await
        },
    );

    let view_ref = &view;
    let observer = async move {
        // The list is replaced while the archive is in flight
        view_ref.replace(Vec::new());
        let _ = release.send(());
    };

    let (result, ()) = tokio::join!(mutation, observer);

    assert!(matches!(result, Err(ClientError::Validation { status: 403, .. })));
    let snapshot = view.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(!view.get("p1").unwrap().is_archived);
    assert_eq!(backend.state.hits("GET /projects/"), 2);
    Ok(())
}

#[tokio::test]
async fn optimistic_delete_removes_from_view_and_backend() -> Result<()> {
    let backend = Backend::start().await?;
    let (client, _store) = backend.logged_in_client()?;

    let projects = client.projects().with_default_filter(ListFilter::include_archived(true));
    let view = OptimisticList::<Project>::load(Arc::new(projects.clone())).await?;

    view.remove_optimistic("p2", || projects.remove("p2")).await?;

    assert!(view.get("p2").is_none());
    assert_eq!(view.snapshot().len(), 2);
    assert!(backend.state.project("p2").is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_target_is_rejected_without_request() -> Result<()> {
    let backend = Backend::start().await?;
    let (client, _store) = backend.logged_in_client()?;

    let projects = client.projects();
    let view = OptimisticList::<Project>::load(Arc::new(projects.clone())).await?;

    let err = view
        .apply_optimistic("p3", |p| p.clone(), || projects.set_archived("p3", false))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::UnknownEntity(ref id) if id == "p3"));
    assert_eq!(backend.state.hits("PUT /projects/{id}"), 0);
    Ok(())
}
