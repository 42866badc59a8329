// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Row shape shared by the archive and the live cache.

use chrono::SecondsFormat;
use gantry_model::workflow::Workflow;

use crate::error::StoreError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowRecord {
    pub uid: String,
    #[sqlx(default)]
    pub instance_id: String,
    #[sqlx(default)]
    pub cluster_name: String,
    pub namespace: String,
    pub name: String,
    #[sqlx(default)]
    pub phase: String,
    #[sqlx(default)]
    pub started_at: Option<String>,
    #[sqlx(default)]
    pub finished_at: Option<String>,
    pub workflow: String,
}

impl WorkflowRecord {
    pub fn from_workflow(wf: &Workflow, instance_id: &str) -> Result<Self, StoreError> {
        let fmt = |t: &chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Micros, true);
        Ok(WorkflowRecord {
            uid: wf.metadata.uid.clone(),
            instance_id: instance_id.to_string(),
            cluster_name: String::new(),
            namespace: wf.metadata.namespace.clone(),
            name: wf.metadata.name.clone(),
            phase: wf.status.phase.to_string(),
            started_at: wf.status.started_at.as_ref().map(fmt),
            finished_at: wf.status.finished_at.as_ref().map(fmt),
            workflow: serde_json::to_string(wf)?,
        })
    }

    pub fn to_workflow(&self) -> Result<Workflow, StoreError> {
        serde_json::from_str(&self.workflow).map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_model::workflow::WorkflowPhase;

    #[test]
    fn record_round_trip() {
        let mut wf = Workflow::default();
        wf.metadata.uid = "u-1".into();
        wf.metadata.namespace = "argo".into();
        wf.metadata.name = "wf".into();
        wf.status.phase = WorkflowPhase::Succeeded;
        wf.status.started_at = Some(chrono::Utc::now());
        let record = WorkflowRecord::from_workflow(&wf, "inst").unwrap();
        assert_eq!(record.phase, "Succeeded");
        assert!(record.started_at.is_some());
        let back = record.to_workflow().unwrap();
        assert_eq!(back.metadata.name, "wf");
    }
}
