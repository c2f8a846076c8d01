use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::database::QueryExecutor;
use crate::error::{Error, Result};
use crate::k8s::{BranchKind, Cluster, PhaseSource};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const BRANCH_READY_TIMEOUT: Duration = Duration::from_secs(120);
pub const NAMESPACE_DELETION_TIMEOUT: Duration = Duration::from_secs(120);
pub const SOURCE_ATTEMPTS: u32 = 30;

const SOURCE_SETTLE: Duration = Duration::from_secs(5);
const SCHEMA_SETTLE: Duration = Duration::from_secs(2);

/// Calls `check` every `interval` until it yields `true` or `timeout` has
/// elapsed. Errors from `check` are logged and polling carries on.
pub async fn poll_until<F, Fut>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        match check().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) => tracing::warn!("Error checking {}: {}", what, err),
        }

        tokio::time::sleep(interval).await;
    }

    Err(Error::Timeout(what.to_string()))
}

pub async fn wait_for_branch_ready<S: PhaseSource + ?Sized>(
    source: &S,
    namespace: &str,
    kind: BranchKind,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    tracing::info!("Waiting for {} {} to become Ready...", kind, name);

    let what = format!("{kind} {name} to become Ready");
    poll_until(&what, POLL_INTERVAL, timeout, || async move {
        let phase = source.phase(namespace, kind, name).await?;
        tracing::debug!(?phase, "observed branch phase");
        Ok(phase.is_ready())
    })
    .await?;

    tracing::info!("{} {} is Ready", kind, name);
    Ok(())
}

pub async fn wait_for_namespace_deletion<C: Cluster + ?Sized>(
    client: &C,
    namespace: &str,
    timeout: Duration,
) -> Result<()> {
    let mut attempt = 0;
    let what = format!("namespace {namespace} to be deleted");

    poll_until(&what, POLL_INTERVAL, timeout, || {
        attempt += 1;
        let attempt = attempt;
        async move {
            let exists = client.namespace_exists(namespace).await?;
            if exists {
                tracing::info!("Waiting for namespace deletion... ({})", attempt);
            }
            Ok(!exists)
        }
    })
    .await
}

/// Gives a freshly started database a few seconds, then retries `SELECT 1`
/// until it answers.
pub async fn wait_for_database<E: QueryExecutor + ?Sized>(
    executor: &E,
    namespace: &str,
    pod: &str,
    database: &str,
    attempts: u32,
) -> Result<()> {
    tracing::info!("Waiting for database initialization...");
    tokio::time::sleep(SOURCE_SETTLE).await;

    for attempt in 1..=attempts {
        match executor.execute(namespace, pod, database, "SELECT 1").await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::debug!("{} not answering yet: {}", executor.dialect(), err);
                tracing::info!("Still initializing... ({}/{})", attempt, attempts);
            }
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Err(Error::Timeout(format!(
        "{} database on {pod} to be ready",
        executor.dialect()
    )))
}

/// Checks once that `expected` shows up in `SHOW DATABASES`, i.e. the source
/// database has finished running its init scripts.
pub async fn check_database_exists<E: QueryExecutor + ?Sized>(
    executor: &E,
    namespace: &str,
    pod: &str,
    expected: &str,
) -> Result<()> {
    tokio::time::sleep(SCHEMA_SETTLE).await;

    let output = executor
        .execute(namespace, pod, "", "SHOW DATABASES")
        .await?;

    if output.lines().any(|line| line.trim() == expected) {
        Ok(())
    } else {
        Err(Error::not_found(format!(
            "database {expected} on {pod} (still initializing)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::k8s::PhaseState;

    /// Replays a scripted sequence of phase reads, repeating the last one.
    struct ScriptedPhases {
        script: Mutex<VecDeque<Result<PhaseState>>>,
        reads: Mutex<u32>,
    }

    impl ScriptedPhases {
        fn new(script: Vec<Result<PhaseState>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                reads: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PhaseSource for ScriptedPhases {
        async fn phase(&self, _: &str, _: BranchKind, name: &str) -> Result<PhaseState> {
            *self.reads.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front() {
                    Some(Ok(state)) => Ok(state.clone()),
                    Some(Err(_)) | None => Err(Error::not_found(name.to_string())),
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_pending() {
        let source = ScriptedPhases::new(vec![
            Ok(PhaseState::Unset),
            Ok(PhaseState::Other("Pending".into())),
            Ok(PhaseState::Ready),
        ]);

        wait_for_branch_ready(&source, "ns", BranchKind::Mysql, "b", BRANCH_READY_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(*source.reads.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_do_not_stop_polling() {
        let source = ScriptedPhases::new(vec![
            Err(Error::not_found("b")),
            Err(Error::not_found("b")),
            Ok(PhaseState::Ready),
        ]);

        wait_for_branch_ready(&source, "ns", BranchKind::Postgres, "b", BRANCH_READY_TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lowercase_ready_times_out() {
        let source = ScriptedPhases::new(vec![Ok(PhaseState::Other("ready".into()))]);
        let started = Instant::now();

        let err = wait_for_branch_ready(
            &source,
            "ns",
            BranchKind::Mysql,
            "b",
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(what) if what.contains("MysqlBranchDatabase b")));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(*source.reads.lock().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_checks_immediately() {
        let mut calls = 0;
        poll_until("thing", POLL_INTERVAL, Duration::from_secs(1), || {
            calls += 1;
            async { Ok(true) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 1);
    }

    /// Executor that fails a fixed number of times before answering.
    struct FlakyExecutor {
        failures: Mutex<u32>,
        output: String,
    }

    #[async_trait]
    impl QueryExecutor for FlakyExecutor {
        fn dialect(&self) -> &'static str {
            "fake"
        }

        async fn execute(&self, _: &str, _: &str, _: &str, _: &str) -> Result<String> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::not_found("connection refused"));
            }
            Ok(self.output.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn database_answers_within_attempts() {
        let exec = FlakyExecutor {
            failures: Mutex::new(3),
            output: "1".into(),
        };

        wait_for_database(&exec, "ns", "mysql-test", "", SOURCE_ATTEMPTS)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn database_never_answers() {
        let exec = FlakyExecutor {
            failures: Mutex::new(u32::MAX),
            output: String::new(),
        };

        let err = wait_for_database(&exec, "ns", "postgres-test", "userdb", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn schema_check_matches_whole_lines() {
        let exec = FlakyExecutor {
            failures: Mutex::new(0),
            output: "Database\ninformation_schema\nuserdb\n".into(),
        };

        assert!(check_database_exists(&exec, "ns", "mysql-test", "user")
            .await
            .is_err());
        assert!(check_database_exists(&exec, "ns", "mysql-test", "userdb")
            .await
            .is_ok());
    }
}
