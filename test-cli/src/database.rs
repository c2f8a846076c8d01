use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn dialect(&self) -> &'static str;

    /// Runs `query` against `database` inside `pod` and returns the client's
    /// combined output. An empty `database` leaves the client's default.
    async fn execute(
        &self,
        namespace: &str,
        pod: &str,
        database: &str,
        query: &str,
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    program: String,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl Kubectl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `kubectl exec -n <namespace> <pod> -- <command...>`, returning the exit
    /// status and stdout followed by stderr.
    pub async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        command: &[String],
    ) -> Result<(std::process::ExitStatus, String)> {
        tracing::debug!(%namespace, %pod, program = %self.program, "kubectl exec");

        let output = Command::new(&self.program)
            .args(["exec", "-n", namespace, pod, "--"])
            .args(command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok((output.status, combined))
    }
}

pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Command line for the `mysql` client. Runs through `sh -c` so stderr can be
/// discarded: the client echoes its arguments, password included, on failure.
pub fn mysql_command(password: &str, database: &str, query: &str) -> Vec<String> {
    let statement = if database.is_empty() {
        query.to_string()
    } else {
        format!("USE {database}; {query}")
    };

    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "mysql -u root -p{} -e {} 2>/dev/null",
            shell_quote(password),
            shell_quote(&statement)
        ),
    ]
}

pub fn psql_command(database: &str, query: &str) -> Vec<String> {
    ["psql", "-U", "postgres", "-d", database, "-c", query]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub struct MysqlExec {
    kubectl: Kubectl,
    password: String,
}

impl MysqlExec {
    pub fn new(kubectl: Kubectl, password: impl Into<String>) -> Self {
        Self {
            kubectl,
            password: password.into(),
        }
    }
}

#[async_trait]
impl QueryExecutor for MysqlExec {
    fn dialect(&self) -> &'static str {
        "MySQL"
    }

    async fn execute(
        &self,
        namespace: &str,
        pod: &str,
        database: &str,
        query: &str,
    ) -> Result<String> {
        let command = mysql_command(&self.password, database, query);
        let (status, output) = self.kubectl.exec(namespace, pod, &command).await?;

        if !status.success() {
            // output is dropped on purpose: it may carry the password
            return Err(Error::Query {
                dialect: "mysql",
                status,
                output: None,
            });
        }

        Ok(output)
    }
}

pub struct PostgresExec {
    kubectl: Kubectl,
}

impl PostgresExec {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl QueryExecutor for PostgresExec {
    fn dialect(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn execute(
        &self,
        namespace: &str,
        pod: &str,
        database: &str,
        query: &str,
    ) -> Result<String> {
        let command = psql_command(database, query);
        let (status, output) = self.kubectl.exec(namespace, pod, &command).await?;

        if !status.success() {
            return Err(Error::Query {
                dialect: "postgres",
                status,
                output: Some(output),
            });
        }

        Ok(output)
    }
}
