//! Branch lifecycle: open (`init`) and finish (`close`) feature, release and hotfix
//! branches.
//!
//! Git work runs through the [`CommandSequencer`] and is fail-fast with no rollback.
//! Tracker and merge-host calls happen only after git succeeded; their failures are
//! collected as [`SideEffect`]s on the outcome and never fail the command.

use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::{
    Capabilities, IssueTracker, IssueUpdate, MergeHost, MergeRequestDraft, MergeRequestInfo,
    NamedId, TrackerIssue,
};
use crate::branch::{BranchDescriptor, BranchKind, BranchNaming, Classification};
use crate::git::{GitCli, GitCommands};
use crate::hooks::HookInstaller;
use crate::ledger::{IssueLedger, TrackedIssueRecord};
use crate::projects::{Integration, PathRegistry, ProjectContext};
use crate::prompt::{PromptError, Prompter, SelectOption};
use crate::sequencer::{CommandSequencer, CommandStep, SequenceError, SequenceReport};

/// Where a run currently is. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    SelectingContext,
    ClassifyingOrCreating,
    Sequencing,
    IntegratingIssue,
    RequestingMerge,
    Done,
    Failed,
}

/// Fatal errors: the command stops and reports failure
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("can not detect type of branch '{branch}'")]
    Classification { branch: String },

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("could not read the current branch: {0}")]
    BranchUnreadable(#[source] anyhow::Error),

    #[error("issue id must be a number, got '{0}'")]
    InvalidIssueId(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// A non-fatal problem met after (or instead of) an external call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// The integration is off for the rest of this run
    Degraded {
        integration: Integration,
        reason: String,
    },
    /// A follow-up action failed; git changes already made stay in place
    Failed { action: String, reason: String },
}

impl SideEffect {
    fn degraded(integration: Integration, reason: impl fmt::Display) -> Self {
        let reason = reason.to_string();
        warn!(?integration, %reason, "Integration disabled for this run");
        SideEffect::Degraded {
            integration,
            reason,
        }
    }

    fn failed(action: impl Into<String>, reason: impl fmt::Display) -> Self {
        let action = action.into();
        let reason = reason.to_string();
        warn!(%action, %reason, "Side effect failed");
        SideEffect::Failed { action, reason }
    }
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Degraded {
                integration: Integration::IssueTracker,
                reason,
            } => write!(f, "issue tracker integration skipped: {}", reason),
            SideEffect::Degraded {
                integration: Integration::MergeHost,
                reason,
            } => write!(f, "merge host integration skipped: {}", reason),
            SideEffect::Failed { action, reason } => write!(f, "{} failed: {}", action, reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub branch: String,
    pub report: SequenceReport,
    /// Issue linked to the new branch, when the tracker lookup succeeded
    pub issue: Option<TrackerIssue>,
    pub tracked: Option<TrackedIssueRecord>,
    pub hook: Option<PathBuf>,
    pub side_effects: Vec<SideEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeRequestOutcome {
    Created {
        target: String,
        info: MergeRequestInfo,
    },
    /// Merge host not in use: the user opens the request by hand
    Manual { target: String },
    Failed { target: String, reason: String },
}

impl MergeRequestOutcome {
    pub fn target(&self) -> &str {
        match self {
            MergeRequestOutcome::Created { target, .. }
            | MergeRequestOutcome::Manual { target }
            | MergeRequestOutcome::Failed { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub branch: String,
    pub descriptor: BranchDescriptor,
    /// Remote was updated (false under `no_update`: the branch was only closed locally)
    pub pushed: bool,
    pub report: SequenceReport,
    pub linked_issue: Option<u64>,
    pub hook_removed: bool,
    /// Status the linked issue was moved to
    pub status: Option<NamedId>,
    pub merge_requests: Vec<MergeRequestOutcome>,
    pub side_effects: Vec<SideEffect>,
}

pub struct BranchLifecycle {
    naming: BranchNaming,
    sequencer: CommandSequencer,
    ledger: IssueLedger,
    prompter: Arc<dyn Prompter>,
    capabilities: Capabilities,
    hooks: HookInstaller,
    no_update: bool,
}

fn transition(phase: LifecyclePhase) {
    info!(?phase, "Lifecycle phase");
}

/// `""` and `"0"` mean "no issue"
pub fn parse_issue_id(input: &str) -> Result<Option<u64>, LifecycleError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(id) => Ok(Some(id)),
        Err(_) => Err(LifecycleError::InvalidIssueId(trimmed.to_string())),
    }
}

/// Steps that create `branch` from `parent`
pub fn init_steps(ctx: &ProjectContext, parent: &str, branch: &str, no_update: bool) -> Vec<CommandStep> {
    vec![
        GitCommands::checkout(parent),
        GitCommands::pull(&ctx.remote, parent, no_update),
        GitCommands::checkout_new(branch),
    ]
}

/// Steps that bring `branch` up to date with its parent and publish it
pub fn close_steps(
    ctx: &ProjectContext,
    descriptor: &BranchDescriptor,
    branch: &str,
    no_update: bool,
) -> Vec<CommandStep> {
    let tag_message = match descriptor.kind {
        BranchKind::Feature => None,
        BranchKind::Release => Some(format!("New release for v{}", descriptor.discriminator)),
        BranchKind::Hotfix => Some(format!("new hotfix for v{}", descriptor.discriminator)),
    };
    let parent = match descriptor.kind {
        BranchKind::Feature => &ctx.dev_branch,
        BranchKind::Release | BranchKind::Hotfix => &ctx.master_branch,
    };

    let mut steps = vec![
        GitCommands::checkout(parent),
        GitCommands::pull(&ctx.remote, parent, no_update),
        GitCommands::checkout(branch),
        GitCommands::merge(parent),
    ];
    if let Some(message) = tag_message {
        steps.push(GitCommands::annotated_tag(&descriptor.discriminator, &message));
    }
    steps.push(GitCommands::push(&ctx.remote, branch, no_update));
    if descriptor.kind != BranchKind::Feature {
        steps.push(GitCommands::push_tags(&ctx.remote, no_update));
    }
    steps
}

impl BranchLifecycle {
    pub fn new(
        naming: BranchNaming,
        sequencer: CommandSequencer,
        ledger: IssueLedger,
        prompter: Arc<dyn Prompter>,
        capabilities: Capabilities,
        hooks: HookInstaller,
    ) -> Self {
        Self {
            naming,
            sequencer,
            ledger,
            prompter,
            capabilities,
            hooks,
            no_update: false,
        }
    }

    /// Skip every remote pull and push
    pub fn with_no_update(mut self, no_update: bool) -> Self {
        self.no_update = no_update;
        self
    }

    pub fn naming(&self) -> &BranchNaming {
        &self.naming
    }

    /// Tracker client, if this project uses one and credentials are configured
    fn tracker_for(&self, ctx: &ProjectContext) -> Option<Arc<dyn IssueTracker>> {
        if ctx.uses(Integration::IssueTracker) {
            self.capabilities.tracker.clone()
        } else {
            None
        }
    }

    fn merge_host_for(&self, ctx: &ProjectContext) -> Option<(Arc<dyn MergeHost>, u64)> {
        if !ctx.uses(Integration::MergeHost) {
            return None;
        }
        match (&self.capabilities.merge_host, ctx.merge_host_project_id) {
            (Some(host), Some(project_id)) => Some((host.clone(), project_id)),
            _ => None,
        }
    }

    /// Pick the project for this run through the registry
    pub async fn select_context(
        &self,
        registry: &PathRegistry,
        explicit: Option<&str>,
    ) -> Result<ProjectContext, LifecycleError> {
        transition(LifecyclePhase::SelectingContext);
        let ctx = registry
            .select(
                self.prompter.as_ref(),
                explicit,
                self.capabilities.merge_host.as_deref(),
            )
            .await?;
        info!(alias = %ctx.alias, path = %ctx.working_directory.display(), "Selected project");
        Ok(ctx)
    }

    /// Use `explicit` or ask for the branch kind
    pub fn choose_kind(&self, explicit: Option<BranchKind>) -> Result<BranchKind, LifecycleError> {
        if let Some(kind) = explicit {
            return Ok(kind);
        }
        let options: Vec<SelectOption> = BranchKind::all()
            .iter()
            .map(|k| SelectOption::new(k.as_str(), k.as_str()))
            .collect();
        let choice = self.prompter.select(
            "select a branch type",
            &options,
            Some(BranchKind::Feature.as_str()),
        )?;
        BranchKind::from_key(&choice)
            .ok_or_else(|| LifecycleError::Prompt(PromptError::Failed(choice)))
    }

    /// Create a new branch of `kind` off its parent
    pub async fn init(
        &self,
        ctx: &ProjectContext,
        kind: BranchKind,
        discriminator: Option<String>,
    ) -> Result<InitOutcome, LifecycleError> {
        let result = self.init_inner(ctx, kind, discriminator).await;
        match &result {
            Ok(_) => transition(LifecyclePhase::Done),
            Err(e) => {
                transition(LifecyclePhase::Failed);
                error!(alias = %ctx.alias, error = %e, "init failed");
            }
        }
        result
    }

    async fn init_inner(
        &self,
        ctx: &ProjectContext,
        kind: BranchKind,
        discriminator: Option<String>,
    ) -> Result<InitOutcome, LifecycleError> {
        transition(LifecyclePhase::ClassifyingOrCreating);
        let mut side_effects = Vec::new();

        let mut tracker = self.tracker_for(ctx);
        if ctx.uses(Integration::IssueTracker) && tracker.is_none() {
            side_effects.push(SideEffect::degraded(
                Integration::IssueTracker,
                "tracker credentials are not configured",
            ));
        }

        let mut issue = None;
        let mut issue_id = None;
        if let Some(client) = tracker.clone() {
            let answer = self.prompter.input("Enter issue id (redmine)", None)?;
            issue_id = parse_issue_id(&answer)?;

            match issue_id {
                None => {
                    debug!("No issue id given, skipping tracker integration");
                    tracker = None;
                }
                Some(id) => match client.get_issue(id).await {
                    Ok(found) => {
                        info!(issue_id = id, subject = %found.subject, "Linked issue");
                        issue = Some(found);
                    }
                    Err(e) => {
                        side_effects.push(SideEffect::degraded(
                            Integration::IssueTracker,
                            format!("issue #{}: {}", id, e),
                        ));
                        tracker = None;
                        issue_id = None;
                    }
                },
            }
        }

        let discriminator = match discriminator {
            Some(d) if !d.trim().is_empty() => d.trim().to_string(),
            _ => self
                .prompter
                .input(kind.discriminator_prompt(), Some(kind.default_discriminator()))?
                .trim()
                .to_string(),
        };
        let discriminator = if discriminator.is_empty() {
            kind.default_discriminator().to_string()
        } else {
            discriminator
        };

        let branch = self.naming.compose(kind, &discriminator, issue_id);
        let parent = match kind {
            BranchKind::Feature | BranchKind::Release => &ctx.dev_branch,
            BranchKind::Hotfix => &ctx.master_branch,
        };
        info!(%branch, %parent, "Creating branch");

        transition(LifecyclePhase::Sequencing);
        let steps = init_steps(ctx, parent, &branch, self.no_update);
        let report = self.sequencer.run(&steps, &ctx.working_directory).await?;

        let (tracked, hook) = match (tracker, issue_id) {
            (Some(client), Some(id)) => {
                transition(LifecyclePhase::IntegratingIssue);
                self.link_issue(ctx, client.as_ref(), id, &branch, &mut side_effects)
                    .await
            }
            _ => (None, None),
        };

        Ok(InitOutcome {
            branch,
            report,
            issue,
            tracked,
            hook,
            side_effects,
        })
    }

    /// Choose an activity, record the issue in the ledger and install the hook.
    /// Then assign the issue to the tracker's current user.
    ///
    /// The hook is only installed once the ledger holds the record it reads.
    async fn link_issue(
        &self,
        ctx: &ProjectContext,
        tracker: &dyn IssueTracker,
        issue_id: u64,
        branch: &str,
        side_effects: &mut Vec<SideEffect>,
    ) -> (Option<TrackedIssueRecord>, Option<PathBuf>) {
        let activity = match self.choose_activity(tracker).await {
            Ok(activity) => activity,
            Err(reason) => {
                side_effects.push(SideEffect::failed("select time-log activity", reason));
                return (None, None);
            }
        };

        let record = TrackedIssueRecord::new(issue_id, &ctx.alias, branch, activity, Utc::now());
        let tracked = match self.ledger.upsert(record.clone()) {
            Ok(()) => Some(record),
            Err(e) => {
                side_effects.push(SideEffect::failed("record tracked issue", format!("{:#}", e)));
                None
            }
        };

        let hook = if tracked.is_some() {
            match self.hooks.install(
                &ctx.working_directory,
                issue_id,
                tracker.base_url(),
                tracker.api_key(),
            ) {
                Ok(path) => Some(path),
                Err(e) => {
                    side_effects.push(SideEffect::failed(
                        "install post-commit hook",
                        format!("{:#}", e),
                    ));
                    None
                }
            }
        } else {
            None
        };

        match tracker.current_user().await {
            Ok(user) => {
                let update = IssueUpdate {
                    assignee_id: Some(user.id),
                    ..IssueUpdate::default()
                };
                if let Err(e) = tracker.update_issue(issue_id, &update).await {
                    side_effects.push(SideEffect::failed("assign issue", e));
                } else {
                    info!(issue_id, user = %user.name, "Assigned issue");
                }
            }
            Err(e) => side_effects.push(SideEffect::failed("assign issue", e)),
        }

        (tracked, hook)
    }

    async fn choose_activity(&self, tracker: &dyn IssueTracker) -> Result<u64, String> {
        let activities = tracker.list_activities().await.map_err(|e| e.to_string())?;
        let options: Vec<SelectOption> = activities
            .iter()
            .map(|a| SelectOption::new(&a.name, a.id.to_string()))
            .collect();
        let choice = self
            .prompter
            .select("select an activity (for use log times)", &options, None)
            .map_err(|e| e.to_string())?;
        choice
            .parse::<u64>()
            .map_err(|_| format!("unexpected activity id '{}'", choice))
    }

    /// Merge the current branch with its parent, tag it when versioned, publish it
    /// and open merge requests
    pub async fn close(&self, ctx: &ProjectContext) -> Result<CloseOutcome, LifecycleError> {
        let result = self.close_inner(ctx).await;
        match &result {
            Ok(_) => transition(LifecyclePhase::Done),
            Err(e) => {
                transition(LifecyclePhase::Failed);
                error!(alias = %ctx.alias, error = %e, "close failed");
            }
        }
        result
    }

    async fn close_inner(&self, ctx: &ProjectContext) -> Result<CloseOutcome, LifecycleError> {
        transition(LifecyclePhase::ClassifyingOrCreating);
        self.sequencer.publish(GitCommands::CURRENT_BRANCH);
        let branch = GitCli::current_branch(self.sequencer.runner().as_ref(), &ctx.working_directory)
            .await
            .map_err(LifecycleError::BranchUnreadable)?;

        let descriptor = match self.naming.classify(&branch) {
            Classification::Known(descriptor) => descriptor,
            Classification::Unknown => return Err(LifecycleError::Classification { branch }),
        };
        debug!(kind = %descriptor.kind, discriminator = %descriptor.discriminator, "Classified branch");

        let mut side_effects = Vec::new();
        let linked = self.ledger.find_by_branch(&branch)?;
        let linked_issue = linked.as_ref().map(|r| r.issue_id);

        let mut hook_removed = false;
        if ctx.uses(Integration::IssueTracker) && linked.is_some() {
            match self.hooks.remove(&ctx.working_directory) {
                Ok(removed) => hook_removed = removed,
                Err(e) => side_effects.push(SideEffect::failed("remove post-commit hook", e)),
            }
        }

        transition(LifecyclePhase::Sequencing);
        let steps = close_steps(ctx, &descriptor, &branch, self.no_update);
        let report = self.sequencer.run(&steps, &ctx.working_directory).await?;
        let pushed = !self.no_update;
        info!(%branch, pushed, "Closed branch");

        let mut status = None;
        if let Some(issue_id) = linked_issue {
            if ctx.uses(Integration::IssueTracker) {
                transition(LifecyclePhase::IntegratingIssue);
                match self.tracker_for(ctx) {
                    Some(tracker) => {
                        status = self
                            .update_status(tracker.as_ref(), issue_id, &mut side_effects)
                            .await;
                    }
                    None => side_effects.push(SideEffect::degraded(
                        Integration::IssueTracker,
                        "tracker credentials are not configured",
                    )),
                }
            }
        }

        transition(LifecyclePhase::RequestingMerge);
        let mut targets = Vec::new();
        if descriptor.kind != BranchKind::Feature {
            targets.push(ctx.master_branch.clone());
        }
        targets.push(ctx.dev_branch.clone());

        let mut merge_requests = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = self.request_merge(ctx, &branch, target).await;
            if let MergeRequestOutcome::Failed { target, reason } = &outcome {
                side_effects.push(SideEffect::failed(
                    format!("merge request to '{}'", target),
                    reason,
                ));
            }
            merge_requests.push(outcome);
        }

        Ok(CloseOutcome {
            branch,
            descriptor,
            pushed,
            report,
            linked_issue,
            hook_removed,
            status,
            merge_requests,
            side_effects,
        })
    }

    async fn update_status(
        &self,
        tracker: &dyn IssueTracker,
        issue_id: u64,
        side_effects: &mut Vec<SideEffect>,
    ) -> Option<NamedId> {
        let statuses = match tracker.list_statuses().await {
            Ok(statuses) => statuses,
            Err(e) => {
                side_effects.push(SideEffect::failed("fetch issue statuses", e));
                return None;
            }
        };

        let options: Vec<SelectOption> = statuses
            .iter()
            .map(|s| SelectOption::new(&s.name, s.id.to_string()))
            .collect();
        let choice = match self
            .prompter
            .select("(redmine) Update issue status", &options, None)
        {
            Ok(choice) => choice,
            Err(e) => {
                side_effects.push(SideEffect::failed("select issue status", e));
                return None;
            }
        };
        let Some(selected) = statuses.into_iter().find(|s| s.id.to_string() == choice) else {
            side_effects.push(SideEffect::failed(
                "select issue status",
                format!("unknown status '{}'", choice),
            ));
            return None;
        };

        match tracker
            .update_issue(issue_id, &IssueUpdate::status(selected.id))
            .await
        {
            Ok(()) => {
                info!(issue_id, status = %selected.name, "Updated issue status");
                Some(selected)
            }
            Err(e) => {
                side_effects.push(SideEffect::failed("update issue status", e));
                None
            }
        }
    }

    async fn request_merge(
        &self,
        ctx: &ProjectContext,
        source: &str,
        target: String,
    ) -> MergeRequestOutcome {
        let Some((host, project_id)) = self.merge_host_for(ctx) else {
            return MergeRequestOutcome::Manual { target };
        };

        let draft = MergeRequestDraft::between(project_id, source, &target);
        match host.create_merge_request(&draft).await {
            Ok(info) => {
                info!(%source, %target, number = info.number, "Created merge request");
                MergeRequestOutcome::Created { target, info }
            }
            Err(e) => MergeRequestOutcome::Failed {
                target,
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProjectContext {
        ProjectContext::new("api", "/src/api")
    }

    fn descriptor(kind: BranchKind, discriminator: &str) -> BranchDescriptor {
        BranchDescriptor {
            kind,
            discriminator: discriminator.to_string(),
            linked_issue_id: None,
        }
    }

    fn texts(steps: &[CommandStep]) -> Vec<(&str, bool)> {
        steps.iter().map(|s| (s.text.as_str(), s.skip)).collect()
    }

    #[test]
    fn test_parse_issue_id() {
        assert_eq!(parse_issue_id("").unwrap(), None);
        assert_eq!(parse_issue_id(" 0 ").unwrap(), None);
        assert_eq!(parse_issue_id("42").unwrap(), Some(42));
        assert!(matches!(
            parse_issue_id("abc"),
            Err(LifecycleError::InvalidIssueId(_))
        ));
    }

    #[test]
    fn test_init_steps() {
        let steps = init_steps(&ctx(), "dev", "feature/login", false);
        assert_eq!(
            texts(&steps),
            vec![
                ("git checkout dev", false),
                ("git pull origin dev", false),
                ("git checkout -b feature/login", false),
            ]
        );
    }

    #[test]
    fn test_feature_close_steps() {
        let steps = close_steps(
            &ctx(),
            &descriptor(BranchKind::Feature, "login"),
            "feature/login#5",
            false,
        );
        assert_eq!(
            texts(&steps),
            vec![
                ("git checkout dev", false),
                ("git pull origin dev", false),
                ("git checkout feature/login#5", false),
                ("git merge dev", false),
                ("git push origin feature/login#5", false),
            ]
        );
    }

    #[test]
    fn test_hotfix_close_steps_offline() {
        let steps = close_steps(
            &ctx(),
            &descriptor(BranchKind::Hotfix, "1.0.1"),
            "hotfix/1.0.1",
            true,
        );
        assert_eq!(
            texts(&steps),
            vec![
                ("git checkout master", false),
                ("git pull origin master", true),
                ("git checkout hotfix/1.0.1", false),
                ("git merge master", false),
                ("git tag -a v1.0.1 -m \"new hotfix for v1.0.1\"", false),
                ("git push origin hotfix/1.0.1", true),
                ("git push origin --tags", true),
            ]
        );
    }

    #[test]
    fn test_side_effect_display() {
        let effect = SideEffect::Failed {
            action: "update issue status".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(effect.to_string(), "update issue status failed: boom");
    }

    #[test]
    fn test_classification_error_message() {
        let err = LifecycleError::Classification {
            branch: "wip-stuff".to_string(),
        };
        assert_eq!(err.to_string(), "can not detect type of branch 'wip-stuff'");
    }
}
