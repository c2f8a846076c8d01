//! Command implementations shared by both database flavours.
//!
//! Everything written to stdout here is the command's result and is read by
//! the CI scripts; progress goes through `tracing` to stderr.

pub mod mysql;
pub mod postgres;

use std::io;

use kube::ResourceExt;

use crate::database::QueryExecutor;
use crate::error::{Result, ResultExt};
use crate::k8s::{
    branch_selector, is_pod_ready, scenario_selector, BranchKind, Cluster, KubeClient,
};
use crate::race::{self, PROBE_ATTEMPTS, PROBE_INTERVAL, PROBE_QUERY};
use crate::report::{verify_report, Expectation, TableCounts};
use crate::wait::{self, BRANCH_READY_TIMEOUT, NAMESPACE_DELETION_TIMEOUT};

/// What differs between the MySQL and PostgreSQL flavours of a command.
pub struct Engine<'a> {
    pub kind: BranchKind,
    pub executor: &'a dyn QueryExecutor,
    /// Database the scenario data lives in on a branch pod.
    pub branch_database: &'static str,
    /// Database the race probe connects to; empty for the client default.
    pub probe_database: &'static str,
    /// Tables counted by `verify-scenario`, in argument order.
    pub tables: &'static [&'static str],
    pub parse_counts: fn(&str) -> TableCounts,
}

pub async fn connect() -> Result<KubeClient> {
    KubeClient::try_default()
        .await
        .context("failed to create k8s client")
}

pub fn count_query(tables: &[&str]) -> String {
    tables
        .iter()
        .enumerate()
        .map(|(i, table)| {
            if i == 0 {
                format!("SELECT '{table}' as tbl, COUNT(*) as cnt FROM {table}")
            } else {
                format!("SELECT '{table}', COUNT(*) FROM {table}")
            }
        })
        .collect::<Vec<_>>()
        .join(" UNION ")
}

pub fn print_lines(output: &str) {
    for line in output.trim().lines() {
        println!("{line}");
    }
}

pub async fn verify_scenario<C: Cluster + ?Sized>(
    kube: &C,
    engine: &Engine<'_>,
    namespace: &str,
    scenario: &str,
    expected_counts: Vec<String>,
    mode: &str,
) -> Result<()> {
    if mode.is_empty() {
        println!("Scenario: {scenario}");
    } else {
        println!("Scenario: {scenario} ({mode})");
    }

    if let Err(err) = kube.get_pod(namespace, &scenario_selector(scenario)).await {
        println!("WARNING: Scenario pod not found");
        return Err(err).context("scenario pod not found");
    }

    let branch = engine.kind.branch_name(scenario);
    let pod = match kube.get_pod(namespace, &branch_selector(&branch)).await {
        Ok(pod) => pod,
        Err(err) => {
            println!("Status: Branch database not ready yet");
            return Err(err).context("branch database not ready");
        }
    };

    println!("Status: Branch database ready");

    let output = match engine
        .executor
        .execute(
            namespace,
            &pod.name_any(),
            engine.branch_database,
            &count_query(engine.tables),
        )
        .await
    {
        Ok(output) => output,
        Err(err) => {
            println!("WARNING: Query failed");
            return Err(err).context("query failed");
        }
    };

    print_lines(&output);

    let actual = (engine.parse_counts)(&output);
    let expected = Expectation::new(engine.tables.iter().copied().zip(expected_counts));

    verify_report(&mut io::stdout(), &expected, &actual)
}

pub async fn query_branch<C: Cluster + ?Sized>(
    kube: &C,
    engine: &Engine<'_>,
    namespace: &str,
    scenario: &str,
    query: &str,
) -> Result<()> {
    let branch = engine.kind.branch_name(scenario);
    let pod = kube
        .get_pod(namespace, &branch_selector(&branch))
        .await
        .context(format!(
            "branch database pod not found for scenario {scenario}"
        ))?;

    let output = engine
        .executor
        .execute(namespace, &pod.name_any(), engine.branch_database, query)
        .await
        .context("query failed")?;

    print!("{output}");
    Ok(())
}

pub async fn wait_namespace_deletion<C: Cluster + ?Sized>(
    kube: &C,
    namespace: &str,
) -> Result<()> {
    wait::wait_for_namespace_deletion(kube, namespace, NAMESPACE_DELETION_TIMEOUT).await?;
    println!("Namespace deleted");
    Ok(())
}

/// Waits for the branch to be marked `Ready`, then checks the database really
/// accepts connections straight away.
pub async fn test_race_condition<C: Cluster + ?Sized>(
    kube: &C,
    engine: &Engine<'_>,
    namespace: &str,
    scenario: &str,
) -> Result<()> {
    let branch = engine.kind.branch_name(scenario);
    println!("Watching for branch {branch} to become Ready...");

    wait::wait_for_branch_ready(kube, namespace, engine.kind, &branch, BRANCH_READY_TIMEOUT)
        .await
        .context("branch database never became ready")?;

    println!("Status is Ready - attempting immediate connection (this should work without race condition)...");

    let pod = kube
        .get_pod(namespace, &branch_selector(&branch))
        .await
        .context("failed to get branch pod")?;
    let pod_name = pod.name_any();

    if !is_pod_ready(&pod) {
        tracing::info!(pod = %pod_name, "pod does not report the Ready condition yet");
    }

    race::probe(
        &mut io::stdout(),
        engine.executor.dialect(),
        PROBE_ATTEMPTS,
        PROBE_INTERVAL,
        |_| {
            engine
                .executor
                .execute(namespace, &pod_name, engine.probe_database, PROBE_QUERY)
        },
    )
    .await?;

    Ok(())
}
