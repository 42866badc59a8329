// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the in-memory live-workflow cache. These run against SQLite
//! and need no external services.

use chrono::{TimeZone, Utc};
use gantry_model::labels::{ARCHIVING_STATUS_ARCHIVED, KEY_ARCHIVING_STATUS};
use gantry_model::list_options::ListOptions;
use gantry_model::workflow::{Workflow, WorkflowPhase};
use gantry_store::LiveWorkflowStore;

fn workflow(uid: &str, namespace: &str, name: &str, started_hour: u32) -> Workflow {
    let mut wf = Workflow::default();
    wf.metadata.uid = uid.to_string();
    wf.metadata.namespace = namespace.to_string();
    wf.metadata.name = name.to_string();
    wf.status.phase = WorkflowPhase::Running;
    wf.status.started_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, started_hour, 0, 0).unwrap());
    wf
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let store = LiveWorkflowStore::new_in_memory("").await.unwrap();
    let mut wf = workflow("u1", "argo", "wf-a", 9);
    store.upsert(&wf).await.unwrap();
    wf.status.phase = WorkflowPhase::Succeeded;
    store.upsert(&wf).await.unwrap();

    let listed = store.list_workflows(&ListOptions::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status.phase, WorkflowPhase::Succeeded);
}

#[tokio::test]
async fn archived_workflows_leave_the_cache() {
    let store = LiveWorkflowStore::new_in_memory("").await.unwrap();
    let mut wf = workflow("u1", "argo", "wf-a", 9);
    store.upsert(&wf).await.unwrap();

    wf.metadata.set_label(KEY_ARCHIVING_STATUS, ARCHIVING_STATUS_ARCHIVED);
    store.upsert(&wf).await.unwrap();

    assert_eq!(store.count_workflows(&ListOptions::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_removes_row_and_labels() {
    let store = LiveWorkflowStore::new_in_memory("").await.unwrap();
    let mut wf = workflow("u1", "argo", "wf-a", 9);
    wf.metadata.set_label("app", "web");
    store.upsert(&wf).await.unwrap();
    store.delete("u1").await.unwrap();

    let opts = ListOptions::from_parts("", "app=web", "", "", "", None, "").unwrap();
    assert!(store.list_workflows(&opts).await.unwrap().is_empty());
    assert_eq!(store.count_workflows(&ListOptions::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn label_selector_filters_and_instance_scopes() {
    let store = LiveWorkflowStore::new_in_memory("inst-a").await.unwrap();
    let mut tagged = workflow("u1", "argo", "wf-a", 9);
    tagged.metadata.set_label("app", "web");
    store.upsert(&tagged).await.unwrap();
    let mut other = workflow("u2", "argo", "wf-b", 10);
    other.metadata.set_label("app", "batch");
    store.upsert(&other).await.unwrap();

    let opts = ListOptions::from_parts("argo", "app=web", "", "", "", None, "").unwrap();
    let listed = store.list_workflows(&opts).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.name, "wf-a");

    let opts = ListOptions::from_parts("argo", "app notin (web)", "", "", "", None, "").unwrap();
    let listed = store.list_workflows(&opts).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.name, "wf-b");
}

#[tokio::test]
async fn listing_sorts_by_started_at_desc_with_name_tiebreak() {
    let store = LiveWorkflowStore::new_in_memory("").await.unwrap();
    store.upsert(&workflow("u1", "argo", "older", 8)).await.unwrap();
    store.upsert(&workflow("u2", "argo", "newer", 12)).await.unwrap();
    store.upsert(&workflow("u3", "argo", "a-same", 12)).await.unwrap();

    let listed = store.list_workflows(&ListOptions::default()).await.unwrap();
    let names: Vec<_> = listed.iter().map(|w| w.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["a-same", "newer", "older"]);

    let mut asc = ListOptions::default();
    asc.ascending = true;
    let listed = store.list_workflows(&asc).await.unwrap();
    assert_eq!(listed[0].metadata.name, "older");
}

#[tokio::test]
async fn pagination_walks_every_row_exactly_once() {
    let store = LiveWorkflowStore::new_in_memory("").await.unwrap();
    for i in 0..5 {
        store
            .upsert(&workflow(&format!("u{i}"), "argo", &format!("wf-{i}"), 10 + i))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut offset = 0i64;
    loop {
        let opts = ListOptions::default().with_limit(2).with_offset(offset);
        let mut page = store.list_workflows(&opts).await.unwrap();
        let more = page.len() as i64 > 2;
        page.truncate(2);
        seen.extend(page.into_iter().map(|w| w.metadata.name));
        if !more {
            break;
        }
        offset += 2;
    }
    assert_eq!(seen.len(), 5);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn started_at_range_filter() {
    let store = LiveWorkflowStore::new_in_memory("").await.unwrap();
    store.upsert(&workflow("u1", "argo", "early", 6)).await.unwrap();
    store.upsert(&workflow("u2", "argo", "late", 18)).await.unwrap();

    let opts = ListOptions::from_parts("", "", "spec.startedAt>2024-05-01T12:00:00Z", "", "", None, "")
        .unwrap();
    let listed = store.list_workflows(&opts).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.name, "late");
}

#[tokio::test]
async fn replace_all_swaps_contents() {
    let store = LiveWorkflowStore::new_in_memory("").await.unwrap();
    store.upsert(&workflow("u1", "argo", "gone", 9)).await.unwrap();
    store
        .replace_all(&[workflow("u2", "argo", "kept", 10)])
        .await
        .unwrap();
    let listed = store.list_workflows(&ListOptions::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.name, "kept");
}
