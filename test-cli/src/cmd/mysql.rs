use clap::Subcommand;

use super::{print_lines, Engine};
use crate::database::{Kubectl, MysqlExec, QueryExecutor};
use crate::error::Result;
use crate::k8s::BranchKind;
use crate::report::parse_mysql_counts;
use crate::wait::{self, SOURCE_ATTEMPTS};

pub const SOURCE_POD: &str = "mysql-test";
pub const SOURCE_DATABASE: &str = "user";

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum MysqlCommand {
    /// Compare users/orders row counts in a scenario's branch database.
    VerifyScenario {
        namespace: String,
        scenario: String,
        users: String,
        orders: String,
        /// Free-form label printed next to the scenario, e.g. "full copy".
        mode: String,
        password: String,
    },
    /// Run a query against the source database.
    QuerySource {
        namespace: String,
        query: String,
        password: String,
    },
    /// Run a query against a scenario's branch database.
    QueryBranch {
        namespace: String,
        scenario: String,
        query: String,
        password: String,
    },
    /// Wait until the source database accepts queries.
    WaitSource { namespace: String, password: String },
    /// Wait until a namespace is gone.
    WaitNamespaceDeletion { namespace: String },
    /// Check a branch accepts connections as soon as it is marked Ready.
    TestRaceCondition {
        namespace: String,
        scenario: String,
        password: String,
    },
}

pub(super) fn engine(executor: &dyn QueryExecutor) -> Engine<'_> {
    Engine {
        kind: BranchKind::Mysql,
        executor,
        branch_database: SOURCE_DATABASE,
        probe_database: "",
        tables: &["users", "orders"],
        parse_counts: parse_mysql_counts,
    }
}

pub async fn run(command: MysqlCommand, kubectl: Kubectl) -> Result<()> {
    match command {
        MysqlCommand::VerifyScenario {
            namespace,
            scenario,
            users,
            orders,
            mode,
            password,
        } => {
            let kube = super::connect().await?;
            let exec = MysqlExec::new(kubectl, password);
            super::verify_scenario(
                &kube,
                &engine(&exec),
                &namespace,
                &scenario,
                vec![users, orders],
                &mode,
            )
            .await
        }
        MysqlCommand::QuerySource {
            namespace,
            query,
            password,
        } => {
            let exec = MysqlExec::new(kubectl, password);

            if let Err(err) =
                wait::check_database_exists(&exec, &namespace, SOURCE_POD, SOURCE_DATABASE).await
            {
                println!("Status: Database still initializing...");
                return Err(err);
            }
            println!("Status: Ready");

            let output = exec
                .execute(&namespace, SOURCE_POD, SOURCE_DATABASE, &query)
                .await?;
            print_lines(&output);
            Ok(())
        }
        MysqlCommand::QueryBranch {
            namespace,
            scenario,
            query,
            password,
        } => {
            let kube = super::connect().await?;
            let exec = MysqlExec::new(kubectl, password);
            super::query_branch(&kube, &engine(&exec), &namespace, &scenario, &query).await
        }
        MysqlCommand::WaitSource {
            namespace,
            password,
        } => {
            let exec = MysqlExec::new(kubectl, password);
            wait::wait_for_database(&exec, &namespace, SOURCE_POD, "", SOURCE_ATTEMPTS).await?;
            println!("Database is ready");
            Ok(())
        }
        MysqlCommand::WaitNamespaceDeletion { namespace } => {
            let kube = super::connect().await?;
            super::wait_namespace_deletion(&kube, &namespace).await
        }
        MysqlCommand::TestRaceCondition {
            namespace,
            scenario,
            password,
        } => {
            let kube = super::connect().await?;
            let exec = MysqlExec::new(kubectl, password);
            super::test_race_condition(&kube, &engine(&exec), &namespace, &scenario).await
        }
    }
}
