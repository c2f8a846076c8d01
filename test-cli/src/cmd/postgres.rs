use clap::Subcommand;

use super::{print_lines, Engine};
use crate::database::{Kubectl, PostgresExec, QueryExecutor};
use crate::error::Result;
use crate::k8s::BranchKind;
use crate::report::parse_postgres_counts;
use crate::wait::{self, SOURCE_ATTEMPTS};

pub const SOURCE_POD: &str = "postgres-test";
pub const SOURCE_DATABASE: &str = "userdb";
pub const BRANCH_DATABASE: &str = "branch_db";

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PostgresCommand {
    /// Compare users/orders/products row counts in a scenario's branch database.
    VerifyScenario {
        namespace: String,
        scenario: String,
        users: String,
        orders: String,
        products: String,
        /// Free-form label printed next to the scenario, e.g. "full copy".
        mode: String,
    },
    /// Run a query against the source database.
    QuerySource { namespace: String, query: String },
    /// Run a query against a scenario's branch database.
    QueryBranch {
        namespace: String,
        scenario: String,
        query: String,
    },
    /// Wait until the source database accepts queries.
    WaitSource { namespace: String },
    /// Wait until a namespace is gone.
    WaitNamespaceDeletion { namespace: String },
    /// Check a branch accepts connections as soon as it is marked Ready.
    TestRaceCondition { namespace: String, scenario: String },
}

pub(super) fn engine(executor: &dyn QueryExecutor) -> Engine<'_> {
    Engine {
        kind: BranchKind::Postgres,
        executor,
        branch_database: BRANCH_DATABASE,
        probe_database: BRANCH_DATABASE,
        tables: &["users", "orders", "products"],
        parse_counts: parse_postgres_counts,
    }
}

pub async fn run(command: PostgresCommand, kubectl: Kubectl) -> Result<()> {
    let exec = PostgresExec::new(kubectl);

    match command {
        PostgresCommand::VerifyScenario {
            namespace,
            scenario,
            users,
            orders,
            products,
            mode,
        } => {
            let kube = super::connect().await?;
            super::verify_scenario(
                &kube,
                &engine(&exec),
                &namespace,
                &scenario,
                vec![users, orders, products],
                &mode,
            )
            .await
        }
        PostgresCommand::QuerySource { namespace, query } => {
            let output = exec
                .execute(&namespace, SOURCE_POD, SOURCE_DATABASE, &query)
                .await?;
            print_lines(&output);
            Ok(())
        }
        PostgresCommand::QueryBranch {
            namespace,
            scenario,
            query,
        } => {
            let kube = super::connect().await?;
            super::query_branch(&kube, &engine(&exec), &namespace, &scenario, &query).await
        }
        PostgresCommand::WaitSource { namespace } => {
            wait::wait_for_database(
                &exec,
                &namespace,
                SOURCE_POD,
                SOURCE_DATABASE,
                SOURCE_ATTEMPTS,
            )
            .await?;
            println!("Database is ready");
            Ok(())
        }
        PostgresCommand::WaitNamespaceDeletion { namespace } => {
            let kube = super::connect().await?;
            super::wait_namespace_deletion(&kube, &namespace).await
        }
        PostgresCommand::TestRaceCondition {
            namespace,
            scenario,
        } => {
            let kube = super::connect().await?;
            super::test_race_condition(&kube, &engine(&exec), &namespace, &scenario).await
        }
    }
}
