use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use greenlight::{
    config, init_config, BackgroundExecutor, BlockingRunner, CheckpointRequest, CollectedData,
    ExecutionEngine, ExecutionMode, FnStepLogic, InMemoryStore, ReviewDecision, StepOutcome,
    TimeoutWatchdog, WorkflowSpec, WorkflowStatus,
};

#[derive(Parser)]
#[command(name = "greenlight")]
#[command(about = "Human-in-the-loop workflow orchestration")]
#[command(
    long_about = "Greenlight drives multi-step workflows that pause at checkpoints for a human \
                  decision, with deadline enforcement on every review. The demo commands run a \
                  sample loan-intake workflow end to end."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sample workflow in blocking mode and approve its checkpoint
    Blocking {
        /// Reviewer id recorded on the resolution
        #[arg(long, default_value = "loan_officer_001")]
        reviewer: String,
    },
    /// Run the sample workflow in background mode, polling status and
    /// resolving the checkpoint with modified data
    Background {
        /// Reviewer id recorded on the resolution
        #[arg(long, default_value = "loan_officer_001")]
        reviewer: String,
        /// Seconds between status polls
        #[arg(long, default_value = "1")]
        poll_seconds: u64,
    },
    /// Run the sample workflow with a short review deadline and let the
    /// watchdog fail it
    Timeout {
        /// Review deadline in seconds
        #[arg(long, default_value = "2")]
        timeout_seconds: i64,
    },
}

/// Sample loan-intake step logic: collect, pause for verification, finalize.
fn sample_steps(review_timeout: Option<i64>) -> FnStepLogic<impl Fn(&str, &CollectedData) -> Result<StepOutcome, greenlight::StepError> + Send + Sync>
{
    FnStepLogic::new(move |step_name, _data| match step_name {
        "collect_application" => {
            let mut output = CollectedData::new();
            output.insert("applicant".to_string(), "Jordan Example".into());
            output.insert("loan_amount".to_string(), 500_000.into());
            Ok(StepOutcome::Complete { output })
        }
        "financial_verification" => Ok(StepOutcome::Checkpoint(CheckpointRequest {
            step_name: "financial_verification".to_string(),
            description: "Verify declared income against the loan amount".to_string(),
            suggestion: Some("Income documents look consistent".to_string()),
            timeout_seconds: review_timeout,
        })),
        "finalize" => {
            let mut output = CollectedData::new();
            output.insert("approved".to_string(), true.into());
            Ok(StepOutcome::Complete { output })
        }
        other => Err(greenlight::StepError::new(format!("unknown step '{other}'"))),
    })
}

fn sample_spec(mode: ExecutionMode, reviewer: Option<String>) -> WorkflowSpec {
    WorkflowSpec {
        owner_id: "demo_user_001".to_string(),
        steps: vec![
            "collect_application".to_string(),
            "financial_verification".to_string(),
            "finalize".to_string(),
        ],
        reviewer_id: reviewer,
        initial_data: CollectedData::new(),
        execution_mode: mode,
    }
}

async fn run_blocking(reviewer: String) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(ExecutionEngine::new(store, Arc::new(sample_steps(None))));
    let runner = BlockingRunner::new(engine);

    let workflow = runner
        .run(sample_spec(ExecutionMode::Blocking, Some(reviewer.clone())))
        .await?;
    println!("workflow {} is {}", workflow.id, workflow.status);

    let Some(review_id) = workflow.outstanding_review() else {
        anyhow::bail!("expected the workflow to pause for review");
    };
    println!("review {review_id} pending; approving with modified income");

    let mut modified = CollectedData::new();
    modified.insert("annual_income".to_string(), 75_000.into());
    let workflow = runner
        .resume(
            review_id,
            ReviewDecision::Modify,
            Some(modified),
            Some("Approved with verified income".to_string()),
            Some(reviewer),
        )
        .await?;
    println!(
        "workflow {} finished as {} with data {}",
        workflow.id,
        workflow.status,
        serde_json::to_string_pretty(&workflow.collected_data)?
    );
    Ok(())
}

async fn run_background(reviewer: String, poll_seconds: u64) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(ExecutionEngine::new(store, Arc::new(sample_steps(None))));
    let executor = BackgroundExecutor::new(engine.clone());

    let workflow_id = executor
        .start(sample_spec(ExecutionMode::Background, Some(reviewer.clone())))
        .await?;
    println!("started background workflow {workflow_id}");

    let review_id = poll_until_paused(&engine, workflow_id, poll_seconds).await?;
    let pending = engine.registry().list_pending(Some(&reviewer)).await?;
    println!("{} review(s) pending for {reviewer}", pending.len());

    executor
        .resume(
            review_id,
            ReviewDecision::Approve,
            None,
            Some("Looks good".to_string()),
            Some(reviewer),
        )
        .await?;
    executor.join(workflow_id).await;

    let workflow = engine.status(workflow_id).await?;
    println!("workflow {} finished as {}", workflow.id, workflow.status);
    Ok(())
}

async fn run_timeout(timeout_seconds: i64) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(ExecutionEngine::new(
        store.clone(),
        Arc::new(sample_steps(Some(timeout_seconds))),
    ));
    let executor = BackgroundExecutor::new(engine.clone());
    let watchdog = TimeoutWatchdog::new(store, engine.clone())
        .with_interval(Duration::from_secs(1))
        .spawn();

    let workflow_id = executor
        .start(sample_spec(ExecutionMode::Background, None))
        .await?;
    println!("started workflow {workflow_id} with a {timeout_seconds}s review deadline");

    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let workflow = engine.status(workflow_id).await?;
        println!("status: {}", workflow.status);
        if workflow.status.is_terminal() {
            println!(
                "error: {}",
                workflow.error_message.as_deref().unwrap_or("<none>")
            );
            break;
        }
    }

    watchdog.shutdown().await;
    Ok(())
}

async fn poll_until_paused(
    engine: &Arc<ExecutionEngine>,
    workflow_id: Uuid,
    poll_seconds: u64,
) -> Result<Uuid> {
    loop {
        tokio::time::sleep(Duration::from_secs(poll_seconds)).await;
        let workflow = engine.status(workflow_id).await?;
        println!("status: {}", workflow.status);
        match workflow.status {
            WorkflowStatus::PausedForHuman => {
                return workflow
                    .outstanding_review()
                    .ok_or_else(|| anyhow::anyhow!("paused workflow with no review"));
            }
            status if status.is_terminal() => {
                anyhow::bail!("workflow ended as {status} before pausing");
            }
            _ => continue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_config()?;
    let settings = config()?;
    greenlight::init_telemetry(settings.observability.json_logs)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Blocking { reviewer } => run_blocking(reviewer).await?,
        Commands::Background {
            reviewer,
            poll_seconds,
        } => run_background(reviewer, poll_seconds).await?,
        Commands::Timeout { timeout_seconds } => run_timeout(timeout_seconds).await?,
    }

    greenlight::shutdown_telemetry();
    Ok(())
}
