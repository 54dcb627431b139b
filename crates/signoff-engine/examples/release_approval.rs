//! Drive a two-step release approval end to end.
//!
//! ```sh
//! cargo run --example release_approval
//! ```

use std::sync::Arc;

use signoff_engine::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signoff_engine=debug")),
        )
        .init();

    let notifier = Arc::new(RecordingNotifier::new());
    let store = Arc::new(InMemoryPersistence::new());
    let orchestrator = Arc::new(
        ApprovalOrchestrator::new(OrchestratorConfig::default())
            .with_notifier(notifier.clone())
            .with_persistence(store.clone())
            .with_identity(Arc::new(StaticIdentity)),
    );

    let worker = SweepWorker::new(orchestrator.clone(), SweeperConfig::default());
    worker.start();

    let spec = WorkflowSpec::new("release 2.4.0", WorkflowKind::Sequential, "release-bot")
        .with_step(
            StepSpec::new("lead signoff", StepKind::Approval)
                .with_approver(Approver::new("alice", "team_lead")),
        )
        .with_step(
            StepSpec::new("ops review", StepKind::Review)
                .with_approver(Approver::new("bob", "ops")),
        );
    let ctx = AssessmentContext::new()
        .with_business_impact(55.0)
        .with_technical_impact(35.0)
        .with_data_sensitivity(20.0)
        .with_budget_at_stake(12_500.0);

    let workflow = orchestrator.submit(spec, Priority::High, ctx).await?;
    println!(
        "admitted {} (tier {:?}, status {:?})",
        workflow.id, workflow.risk_tier, workflow.status
    );

    let outcome = orchestrator
        .submit_decision(
            workflow.id,
            workflow.steps[0].id,
            DecisionInput::approve("alice", "change set reviewed against the release checklist"),
        )
        .await?;
    println!("lead signoff -> {:?}", outcome.step_status);

    let outcome = orchestrator
        .submit_decision(
            workflow.id,
            workflow.steps[1].id,
            DecisionInput::approve("bob", "capacity and rollback verified in staging"),
        )
        .await?;
    println!("ops review -> {:?}", outcome.step_status);
    println!("workflow -> {:?}", outcome.workflow_status);

    let snapshot = orchestrator.metrics().snapshot();
    println!(
        "decisions committed: {}, notifications sent: {}",
        snapshot.decisions_committed,
        notifier.sent().len()
    );

    worker.shutdown().await;
    Ok(())
}
