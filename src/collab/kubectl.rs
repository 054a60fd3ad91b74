//! kubectl-backed readiness checks and manifest application

use crate::collab::wait::poll_until;
use crate::collab::{CollaboratorError, CommandSpec, ManifestApplier, ReadinessChecker};
use crate::core::context::ClusterHandle;
use crate::core::hooks::DeploymentRef;
use crate::core::interval::WaitInterval;
use crate::core::mode::ServiceExposure;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Limit for a single kubectl call
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// kubectl wrapper used for polling and `kubectl apply`
#[derive(Debug, Clone)]
pub struct KubectlCli {
    kubectl_path: PathBuf,
}

impl KubectlCli {
    pub fn new(kubectl_path: impl Into<PathBuf>) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
        }
    }

    async fn get_json(
        &self,
        cluster: &ClusterHandle,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Value, CollaboratorError> {
        let out = CommandSpec::new(&self.kubectl_path)
            .kubeconfig(&cluster.kubeconfig_path)
            .arg("get")
            .args(args.iter().copied())
            .args(["-o", "json"])
            .run(CALL_TIMEOUT, cancel)
            .await?;
        serde_json::from_str(&out)
            .map_err(|e| CollaboratorError::InvalidResponse(format!("kubectl get {}: {}", args.join(" "), e)))
    }

    /// InternalIP of the first node
    pub async fn node_internal_ip(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError> {
        let nodes = self.get_json(cluster, &["nodes"], cancel).await?;
        first_node_ip(&nodes)
            .ok_or_else(|| CollaboratorError::InvalidResponse("no node with an InternalIP".to_string()))
    }
}

/// True once the deployment reports the `Available` condition
pub fn deployment_available(deployment: &Value) -> bool {
    deployment["status"]["conditions"]
        .as_array()
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c["type"] == "Available" && c["status"] == "True")
        })
        .unwrap_or(false)
}

/// True once at least one endpoint address backs the service
pub fn endpoints_ready(endpoints: &Value) -> bool {
    endpoints["subsets"]
        .as_array()
        .map(|subsets| {
            subsets.iter().any(|s| {
                s["addresses"]
                    .as_array()
                    .map(|a| !a.is_empty())
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// `host:port` under which the service is reachable for the given exposure
pub fn service_address(
    service: &Value,
    exposure: ServiceExposure,
    node_ip: Option<&str>,
) -> Option<String> {
    let port = &service["spec"]["ports"][0];
    match exposure {
        ServiceExposure::LoadBalancer => {
            let ingress = &service["status"]["loadBalancer"]["ingress"][0];
            let host = ingress["hostname"].as_str().or_else(|| ingress["ip"].as_str())?;
            Some(format!("{}:{}", host, port["port"].as_u64()?))
        }
        ServiceExposure::NodePort => Some(format!("{}:{}", node_ip?, port["nodePort"].as_u64()?)),
        ServiceExposure::ClusterIP => {
            let ip = service["spec"]["clusterIP"].as_str()?;
            Some(format!("{}:{}", ip, port["port"].as_u64()?))
        }
    }
}

fn first_node_ip(nodes: &Value) -> Option<String> {
    nodes["items"][0]["status"]["addresses"]
        .as_array()?
        .iter()
        .find(|a| a["type"] == "InternalIP")
        .and_then(|a| a["address"].as_str())
        .map(str::to_string)
}

#[async_trait]
impl ReadinessChecker for KubectlCli {
    async fn wait_for_deployment_available(
        &self,
        cluster: &ClusterHandle,
        deployment: &DeploymentRef,
        interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Waiting for {} to be available", deployment);
        let what = format!("{} available", deployment);
        poll_until(&what, interval, cancel, move || async move {
            let json = self
                .get_json(
                    cluster,
                    &["deployment", &deployment.name, "-n", &deployment.namespace],
                    cancel,
                )
                .await?;
            Ok(deployment_available(&json).then_some(()))
        })
        .await
    }

    async fn wait_for_service(
        &self,
        cluster: &ClusterHandle,
        namespace: &str,
        name: &str,
        exposure: ServiceExposure,
        interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError> {
        info!("Waiting for service {}/{} ({})", namespace, name, exposure);
        let what = format!("service {}/{} reachable", namespace, name);
        poll_until(&what, interval, cancel, move || async move {
            let endpoints = self
                .get_json(cluster, &["endpoints", name, "-n", namespace], cancel)
                .await?;
            if !endpoints_ready(&endpoints) {
                return Ok(None);
            }
            let service = self
                .get_json(cluster, &["service", name, "-n", namespace], cancel)
                .await?;
            let node_ip = match exposure {
                ServiceExposure::NodePort => Some(self.node_internal_ip(cluster, cancel).await?),
                _ => None,
            };
            let address = service_address(&service, exposure, node_ip.as_deref());
            debug!("service {}/{} address: {:?}", namespace, name, address);
            Ok(address)
        })
        .await
    }

    async fn node_address(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError> {
        self.node_internal_ip(cluster, cancel).await
    }
}

#[async_trait]
impl ManifestApplier for KubectlCli {
    async fn apply(
        &self,
        cluster: &ClusterHandle,
        manifest: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        debug!("Applying manifest ({} bytes)", manifest.len());
        CommandSpec::new(&self.kubectl_path)
            .kubeconfig(&cluster.kubeconfig_path)
            .args(["apply", "-f", "-"])
            .stdin(manifest)
            .run(CALL_TIMEOUT, cancel)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deployment_available_condition() {
        let ready = json!({"status": {"conditions": [
            {"type": "Progressing", "status": "True"},
            {"type": "Available", "status": "True"}
        ]}});
        let not_ready = json!({"status": {"conditions": [
            {"type": "Available", "status": "False"}
        ]}});
        assert!(deployment_available(&ready));
        assert!(!deployment_available(&not_ready));
        assert!(!deployment_available(&json!({})));
    }

    #[test]
    fn test_endpoints_ready() {
        assert!(endpoints_ready(&json!({"subsets": [{"addresses": [{"ip": "10.0.0.5"}]}]})));
        assert!(!endpoints_ready(&json!({"subsets": [{"notReadyAddresses": [{"ip": "10.0.0.5"}]}]})));
        assert!(!endpoints_ready(&json!({})));
    }

    #[test]
    fn test_service_address_per_exposure() {
        let svc = json!({
            "spec": {"clusterIP": "10.96.0.12", "ports": [{"port": 3000, "nodePort": 30080}]},
            "status": {"loadBalancer": {"ingress": [{"hostname": "abc.elb.amazonaws.com"}]}}
        });
        assert_eq!(
            service_address(&svc, ServiceExposure::NodePort, Some("172.18.0.2")).as_deref(),
            Some("172.18.0.2:30080")
        );
        assert_eq!(
            service_address(&svc, ServiceExposure::LoadBalancer, None).as_deref(),
            Some("abc.elb.amazonaws.com:3000")
        );
        assert_eq!(
            service_address(&svc, ServiceExposure::ClusterIP, None).as_deref(),
            Some("10.96.0.12:3000")
        );
    }

    #[test]
    fn test_pending_load_balancer_has_no_address() {
        let svc = json!({"spec": {"ports": [{"port": 3000}]}, "status": {"loadBalancer": {}}});
        assert_eq!(service_address(&svc, ServiceExposure::LoadBalancer, None), None);
    }

    #[test]
    fn test_first_node_ip() {
        let nodes = json!({"items": [{"status": {"addresses": [
            {"type": "Hostname", "address": "kind-control-plane"},
            {"type": "InternalIP", "address": "172.18.0.2"}
        ]}}]});
        assert_eq!(first_node_ip(&nodes).as_deref(), Some("172.18.0.2"));
    }
}
