use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::{Client, ResourceExt};
use serde_json::Value;

use crate::error::{Error, Result};

pub const BRANCH_GROUP: &str = "dbs.mirrord.metalbear.co";
pub const BRANCH_VERSION: &str = "v1alpha1";

/// Label the Job controller puts on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Mysql,
    Postgres,
}

impl BranchKind {
    pub fn kind(self) -> &'static str {
        match self {
            Self::Mysql => "MysqlBranchDatabase",
            Self::Postgres => "PgBranchDatabase",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Self::Mysql => "mysqlbranchdatabases",
            Self::Postgres => "pgbranchdatabases",
        }
    }

    /// Name of the branch resource the test harness creates for `scenario`.
    pub fn branch_name(self, scenario: &str) -> String {
        match self {
            Self::Mysql => format!("mysql-test-branch-{scenario}"),
            Self::Postgres => format!("pg-test-branch-{scenario}"),
        }
    }

    pub fn api_resource(self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(BRANCH_GROUP, BRANCH_VERSION, self.kind());
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Observed `status.phase` of a branch database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseState {
    Ready,
    Other(String),
    /// The controller has not written a phase yet.
    Unset,
}

impl PhaseState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Reads `status.phase` out of an untyped object body.
    pub fn from_object(name: &str, data: &Value) -> Result<Self> {
        let status = match data.get("status") {
            None | Some(Value::Null) => return Ok(Self::Unset),
            Some(Value::Object(status)) => status,
            Some(_) => return Err(Error::InvalidPhase(name.to_string())),
        };

        match status.get("phase") {
            None | Some(Value::Null) => Ok(Self::Unset),
            Some(Value::String(phase)) if phase == "Ready" => Ok(Self::Ready),
            Some(Value::String(phase)) => Ok(Self::Other(phase.clone())),
            Some(_) => Err(Error::InvalidPhase(name.to_string())),
        }
    }
}

#[async_trait]
pub trait PhaseSource: Send + Sync {
    async fn phase(&self, namespace: &str, kind: BranchKind, name: &str) -> Result<PhaseState>;
}

/// The cluster reads the test commands need.
#[async_trait]
pub trait Cluster: PhaseSource {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    async fn get_pod(&self, namespace: &str, selector: &str) -> Result<Pod> {
        let pods = self.list_pods(namespace, selector).await?;

        let pod = first_database_pod(pods, selector)?;
        tracing::debug!(pod = %pod.name_any(), %selector, "located pod");
        Ok(pod)
    }
}

pub fn scenario_selector(scenario: &str) -> String {
    format!("test-scenario={scenario}")
}

pub fn branch_selector(branch_name: &str) -> String {
    format!("db-owner-name={branch_name}")
}

/// Picks the first pod that was not spawned by a Job. Database pods and
/// one-shot seeding jobs share selectors, so job pods must be skipped.
pub fn first_database_pod(pods: Vec<Pod>, selector: &str) -> Result<Pod> {
    if pods.is_empty() {
        return Err(Error::not_found(format!(
            "no pods found with selector: {selector}"
        )));
    }

    pods.into_iter()
        .find(|pod| !pod.labels().contains_key(JOB_NAME_LABEL))
        .ok_or_else(|| {
            Error::not_found(format!("no non-job pods found with selector: {selector}"))
        })
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// In-cluster configuration first, then the local kubeconfig.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Cluster for KubeClient {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items)
    }

    // `get_opt` maps 404 to `None`; any other API error is returned.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        Ok(namespaces.get_opt(namespace).await?.is_some())
    }
}

#[async_trait]
impl PhaseSource for KubeClient {
    async fn phase(&self, namespace: &str, kind: BranchKind, name: &str) -> Result<PhaseState> {
        let resource = kind.api_resource();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);

        let obj = api.get(name).await?;
        PhaseState::from_object(name, &obj.data)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use kube::api::ObjectMeta;
    use serde_json::json;

    use super::*;

    fn pod(name: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn skips_job_pods() {
        let selector = "db-owner-name=mysql-test-branch-a";
        let pods = vec![
            pod("seed-xyz", &[("db-owner-name", "x"), ("job-name", "seed")]),
            pod("branch-0", &[("db-owner-name", "x")]),
        ];

        let found = first_database_pod(pods, selector).unwrap();
        assert_eq!(found.name_any(), "branch-0");
    }

    #[test]
    fn only_job_pods_is_not_found() {
        let pods = vec![
            pod("seed-1", &[("job-name", "seed")]),
            pod("seed-2", &[("job-name", "seed"), ("app", "db")]),
        ];

        let err = first_database_pod(pods, "app=db").unwrap_err();
        assert!(matches!(err, Error::NotFound(msg) if msg.contains("no non-job pods")));
    }

    #[test]
    fn empty_list_is_not_found() {
        let err = first_database_pod(vec![], "app=db").unwrap_err();
        assert!(matches!(err, Error::NotFound(msg) if msg.contains("no pods found")));
    }

    #[test]
    fn job_label_value_does_not_matter() {
        for value in ["", "seed", "anything"] {
            let pods = vec![pod("job", &[("job-name", value)])];
            assert!(first_database_pod(pods, "x=y").is_err());
        }
    }

    #[test]
    fn ready_condition() {
        let mut p = pod("db", &[]);
        assert!(!is_pod_ready(&p));

        p.status = Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".into(),
                status: "True".into(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        assert!(is_pod_ready(&p));
    }

    #[test]
    fn phase_is_ready_only_for_exact_literal() {
        let phase = |v: Value| PhaseState::from_object("b", &v).unwrap();

        assert_eq!(phase(json!({"status": {"phase": "Ready"}})), PhaseState::Ready);
        assert_eq!(
            phase(json!({"status": {"phase": "ready"}})),
            PhaseState::Other("ready".into())
        );
        assert_eq!(
            phase(json!({"status": {"phase": "Pending"}})),
            PhaseState::Other("Pending".into())
        );
        assert_eq!(phase(json!({"spec": {}})), PhaseState::Unset);
        assert_eq!(phase(json!({"status": {}})), PhaseState::Unset);
    }

    #[test]
    fn non_string_phase_is_an_error() {
        let err = PhaseState::from_object("b", &json!({"status": {"phase": 3}})).unwrap_err();
        assert!(matches!(err, Error::InvalidPhase(name) if name == "b"));
    }

    #[test]
    fn branch_resource_coordinates() {
        let ar = BranchKind::Postgres.api_resource();
        assert_eq!(ar.group, BRANCH_GROUP);
        assert_eq!(ar.version, BRANCH_VERSION);
        assert_eq!(ar.kind, "PgBranchDatabase");
        assert_eq!(ar.plural, "pgbranchdatabases");
        assert_eq!(
            BranchKind::Mysql.branch_name("env-val"),
            "mysql-test-branch-env-val"
        );
    }
}
