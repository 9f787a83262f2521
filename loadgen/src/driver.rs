use std::sync::Arc;
use std::time::Duration;

use pg_session::{MemoryReporter, OutcomeReporter, Session, SessionError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;

use crate::args::LoadConfig;
use crate::workload::{Task, create_schema, seed_data};

#[derive(Debug, Default, Clone, Copy)]
struct UserTally {
    tasks: u64,
    failed: u64,
}

pub(crate) async fn run(config: LoadConfig) -> Result<(), SessionError> {
    config.session.validate()?;

    let memory = Arc::new(MemoryReporter::new());
    let reporter = summary_reporter(&memory);
    let deadline = config
        .duration_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let started = Instant::now();

    if config.seed_data {
        let mut session = Session::new(config.session.clone(), Arc::clone(&reporter))?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        create_schema(&mut session).await?;
        seed_data(&mut session, &mut rng).await?;
        session.close().await;
    }

    let mut handles = Vec::with_capacity(config.users);
    for id in 0..config.users {
        let config = config.clone();
        let reporter = Arc::clone(&reporter);
        handles.push(tokio::spawn(run_user(id, config, reporter, deadline)));
    }

    let mut total = UserTally::default();
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(tally)) => {
                total.tasks += tally.tasks;
                total.failed += tally.failed;
            }
            Ok(Err(err)) => tracing::error!(user = id, "user stopped early: {err}"),
            Err(join_err) => tracing::error!(user = id, "user task panicked: {join_err}"),
        }
    }

    for (name, stats) in memory.summary() {
        tracing::info!(
            "{:<12} requests={} failures={} avg={:.2}ms max={}ms rows={}",
            name,
            stats.requests,
            stats.failures,
            stats.average_millis(),
            stats.max_elapsed.as_millis(),
            stats.rows
        );
    }
    tracing::info!(
        "complete: users={} tasks={} failed={} elapsed={}ms",
        config.users,
        total.tasks,
        total.failed,
        started.elapsed().as_millis()
    );
    Ok(())
}

/// Sessions already log their own failures, so outcomes only feed the summary.
fn summary_reporter(memory: &Arc<MemoryReporter>) -> Arc<dyn OutcomeReporter> {
    memory.clone()
}

async fn run_user(
    id: usize,
    config: LoadConfig,
    reporter: Arc<dyn OutcomeReporter>,
    deadline: Option<Instant>,
) -> Result<UserTally, SessionError> {
    let mut session = Session::new(config.session.clone(), reporter)?
        .with_span(tracing::info_span!("user", id));
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(id as u64));
    let mut tally = UserTally::default();

    session.warm_up().await;
    if let Err(err) = create_schema(&mut session).await {
        tracing::error!(user = id, "create_schema failed: {err}");
    }

    let max_tasks = config.iterations.unwrap_or(u64::MAX);
    while tally.tasks < max_tasks && deadline.is_none_or(|d| Instant::now() < d) {
        let task = Task::pick(&mut rng);
        tally.tasks += 1;
        match task.run(&mut session, &mut rng).await {
            Ok(outcome) if outcome.succeeded => {}
            Ok(outcome) => {
                tally.failed += 1;
                if let Some(reason) = outcome.failure {
                    tracing::warn!(user = id, task = task.name(), "task failed: {reason}");
                }
            }
            Err(err) => {
                tally.failed += 1;
                tracing::error!(user = id, task = task.name(), "task raised: {err}");
            }
        }

        if config.think_time_ms > 0 {
            let pause = rng.random_range(0..=config.think_time_ms);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
    }

    session.close().await;
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_feed_only_the_summary() {
        let memory = Arc::new(MemoryReporter::new());
        let reporter = summary_reporter(&memory);
        let memory_sink: Arc<dyn OutcomeReporter> = memory.clone();
        assert!(Arc::ptr_eq(&reporter, &memory_sink));
    }
}
