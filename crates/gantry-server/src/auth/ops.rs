// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The closed set of API operations and the verb/resource each one needs.
//!
//! Authorization never guesses from the request path; every handler names its
//! operation here and the policy engine works off the verb/resource pair.

/// Every operation the API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateWorkflow,
    GetWorkflow,
    ListWorkflows,
    WatchWorkflows,
    DeleteWorkflow,
    RetryWorkflow,
    ResubmitWorkflow,
    ResumeWorkflow,
    SuspendWorkflow,
    TerminateWorkflow,
    StopWorkflow,
    SetWorkflow,
    LintWorkflow,
    SubmitWorkflow,
    PodLogs,
    CreateWorkflowTemplate,
    GetWorkflowTemplate,
    ListWorkflowTemplates,
    UpdateWorkflowTemplate,
    DeleteWorkflowTemplate,
    LintWorkflowTemplate,
    CreateClusterWorkflowTemplate,
    GetClusterWorkflowTemplate,
    ListClusterWorkflowTemplates,
    UpdateClusterWorkflowTemplate,
    DeleteClusterWorkflowTemplate,
    LintClusterWorkflowTemplate,
    CreateCronWorkflow,
    GetCronWorkflow,
    ListCronWorkflows,
    UpdateCronWorkflow,
    DeleteCronWorkflow,
    LintCronWorkflow,
    SuspendCronWorkflow,
    ResumeCronWorkflow,
    ListArchivedWorkflows,
    GetArchivedWorkflow,
    DeleteArchivedWorkflow,
    RetryArchivedWorkflow,
    ResubmitArchivedWorkflow,
    ListArchivedWorkflowLabelKeys,
    ListArchivedWorkflowLabelValues,
    ListEventBindings,
    ReceiveEvent,
    CreateSyncLimit,
    GetSyncLimit,
    UpdateSyncLimit,
    DeleteSyncLimit,
    GetArtifact,
    GetArchivedArtifact,
    GetInfo,
    GetUserInfo,
    GetVersion,
}

impl Operation {
    /// All operations, for coverage checks.
    pub const ALL: &'static [Operation] = &[
        Operation::CreateWorkflow,
        Operation::GetWorkflow,
        Operation::ListWorkflows,
        Operation::WatchWorkflows,
        Operation::DeleteWorkflow,
        Operation::RetryWorkflow,
        Operation::ResubmitWorkflow,
        Operation::ResumeWorkflow,
        Operation::SuspendWorkflow,
        Operation::TerminateWorkflow,
        Operation::StopWorkflow,
        Operation::SetWorkflow,
        Operation::LintWorkflow,
        Operation::SubmitWorkflow,
        Operation::PodLogs,
        Operation::CreateWorkflowTemplate,
        Operation::GetWorkflowTemplate,
        Operation::ListWorkflowTemplates,
        Operation::UpdateWorkflowTemplate,
        Operation::DeleteWorkflowTemplate,
        Operation::LintWorkflowTemplate,
        Operation::CreateClusterWorkflowTemplate,
        Operation::GetClusterWorkflowTemplate,
        Operation::ListClusterWorkflowTemplates,
        Operation::UpdateClusterWorkflowTemplate,
        Operation::DeleteClusterWorkflowTemplate,
        Operation::LintClusterWorkflowTemplate,
        Operation::CreateCronWorkflow,
        Operation::GetCronWorkflow,
        Operation::ListCronWorkflows,
        Operation::UpdateCronWorkflow,
        Operation::DeleteCronWorkflow,
        Operation::LintCronWorkflow,
        Operation::SuspendCronWorkflow,
        Operation::ResumeCronWorkflow,
        Operation::ListArchivedWorkflows,
        Operation::GetArchivedWorkflow,
        Operation::DeleteArchivedWorkflow,
        Operation::RetryArchivedWorkflow,
        Operation::ResubmitArchivedWorkflow,
        Operation::ListArchivedWorkflowLabelKeys,
        Operation::ListArchivedWorkflowLabelValues,
        Operation::ListEventBindings,
        Operation::ReceiveEvent,
        Operation::CreateSyncLimit,
        Operation::GetSyncLimit,
        Operation::UpdateSyncLimit,
        Operation::DeleteSyncLimit,
        Operation::GetArtifact,
        Operation::GetArchivedArtifact,
        Operation::GetInfo,
        Operation::GetUserInfo,
        Operation::GetVersion,
    ];

    /// The verb the caller must hold for this operation.
    pub fn verb(&self) -> &'static str {
        use Operation::*;
        match self {
            CreateWorkflow | SubmitWorkflow | ResubmitWorkflow | RetryArchivedWorkflow
            | ResubmitArchivedWorkflow => "create",
            GetWorkflow | LintWorkflow | GetArchivedWorkflow | PodLogs | GetArtifact
            | GetArchivedArtifact => "get",
            ListWorkflows | ListArchivedWorkflows | ListArchivedWorkflowLabelKeys
            | ListArchivedWorkflowLabelValues => "list",
            WatchWorkflows => "watch",
            DeleteWorkflow | DeleteArchivedWorkflow => "delete",
            RetryWorkflow | ResumeWorkflow | SuspendWorkflow | TerminateWorkflow | StopWorkflow
            | SetWorkflow => "update",
            CreateWorkflowTemplate => "create",
            GetWorkflowTemplate | LintWorkflowTemplate => "get",
            ListWorkflowTemplates => "list",
            UpdateWorkflowTemplate => "update",
            DeleteWorkflowTemplate => "delete",
            CreateClusterWorkflowTemplate => "create",
            GetClusterWorkflowTemplate | LintClusterWorkflowTemplate => "get",
            ListClusterWorkflowTemplates => "list",
            UpdateClusterWorkflowTemplate => "update",
            DeleteClusterWorkflowTemplate => "delete",
            CreateCronWorkflow => "create",
            GetCronWorkflow | LintCronWorkflow => "get",
            ListCronWorkflows => "list",
            UpdateCronWorkflow | SuspendCronWorkflow | ResumeCronWorkflow => "update",
            DeleteCronWorkflow => "delete",
            ListEventBindings => "list",
            ReceiveEvent => "get",
            CreateSyncLimit => "create",
            GetSyncLimit => "get",
            UpdateSyncLimit => "update",
            DeleteSyncLimit => "delete",
            GetInfo | GetUserInfo | GetVersion => "get",
        }
    }

    /// The resource group the verb applies to.
    pub fn resource(&self) -> &'static str {
        use Operation::*;
        match self {
            CreateWorkflow | GetWorkflow | ListWorkflows | WatchWorkflows | DeleteWorkflow
            | RetryWorkflow | ResubmitWorkflow | ResumeWorkflow | SuspendWorkflow
            | TerminateWorkflow | StopWorkflow | SetWorkflow | LintWorkflow | SubmitWorkflow
            | ListArchivedWorkflows | GetArchivedWorkflow | DeleteArchivedWorkflow
            | RetryArchivedWorkflow | ResubmitArchivedWorkflow | ListArchivedWorkflowLabelKeys
            | ListArchivedWorkflowLabelValues | GetArtifact | GetArchivedArtifact => "workflows",
            PodLogs => "podlogs",
            CreateWorkflowTemplate | GetWorkflowTemplate | ListWorkflowTemplates
            | UpdateWorkflowTemplate | DeleteWorkflowTemplate | LintWorkflowTemplate => {
                "workflowtemplates"
            }
            CreateClusterWorkflowTemplate | GetClusterWorkflowTemplate
            | ListClusterWorkflowTemplates | UpdateClusterWorkflowTemplate
            | DeleteClusterWorkflowTemplate | LintClusterWorkflowTemplate => {
                "clusterworkflowtemplates"
            }
            CreateCronWorkflow | GetCronWorkflow | ListCronWorkflows | UpdateCronWorkflow
            | DeleteCronWorkflow | LintCronWorkflow | SuspendCronWorkflow | ResumeCronWorkflow => {
                "cronworkflows"
            }
            ListEventBindings => "eventbindings",
            ReceiveEvent => "events",
            CreateSyncLimit | GetSyncLimit | UpdateSyncLimit | DeleteSyncLimit => "workflows",
            GetInfo => "infos",
            GetUserInfo => "userinfos",
            GetVersion => "versions",
        }
    }
}
