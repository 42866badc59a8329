// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gantry resource model.
//!
//! Shared types for the API server and its storage layers: workflow and
//! template resources, object metadata, the selector grammars accepted on
//! list calls, and the claims carried by authenticated requests. Everything
//! here is transport-agnostic; serialization follows the camelCase wire
//! convention of the control plane.

pub mod claims;
pub mod labels;
pub mod list_options;
pub mod meta;
pub mod selector;
pub mod template;
pub mod workflow;

pub use claims::Claims;
pub use labels::InstanceTag;
pub use list_options::{ListOptions, ListOptionsError, NameFilter};
pub use meta::{ListMeta, ObjectMeta};
pub use selector::{FieldFilter, LabelOperator, LabelRequirement, SelectorError};
pub use template::{
    ClusterWorkflowTemplate, ClusterWorkflowTemplateList, CronWorkflow, CronWorkflowList,
    EventBinding, EventBindingList, WorkflowTemplate, WorkflowTemplateList, workflow_from_cron,
    workflow_from_template,
};
pub use workflow::{
    Artifact, FileArtifact, ModelError, NodePhase, NodeStatus, NodeType, ObjectStoreArtifact,
    RawArtifact, Workflow, WorkflowList, WorkflowPhase,
};
