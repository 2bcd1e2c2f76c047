//! Kubernetes Driver Implementation
//!
//! # Features
//! - Reachability check via `kubectl cluster-info`
//! - Inventory of namespaces, pods, deployments and services across all namespaces
//! - Confirmed commands run through the shell unmodified; one without
//!   `--context` only runs while the current kubeconfig context is the
//!   session's own
//!
//! # Implementation Notes
//! - Every call pins `--context` so the operator's current kubeconfig context
//!   never leaks into a session for another cluster
//! - The four listings run concurrently and fail independently
//! - Listings use `-o json` and only read `metadata` and `status.phase`

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::engine::context::{BackendContext, Inventory, InventorySection};
use crate::error::{ParleyError, Result};
use crate::executor::{execute_shell, failure_reason, ProcessRunner};
use crate::validation::kubectl_contexts;

pub struct KubectlDriver {
    context: String,
    runner: Arc<dyn ProcessRunner>,
}

impl KubectlDriver {
    pub fn new(context: String, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { context, runner }
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = vec!["--context".to_string(), self.context.clone()];
        args.extend(rest.iter().map(|s| (*s).to_string()));
        args
    }

    pub async fn check_authentication(&self) -> Result<()> {
        let output = self
            .runner
            .run("kubectl", &self.args(&["cluster-info", "--request-timeout=10s"]))
            .await
            .map_err(|e| ParleyError::auth(format!("Could not run kubectl: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ParleyError::auth(format!(
                "Cluster for context '{}' is not reachable: {}",
                self.context,
                failure_reason(&output)
            )))
        }
    }

    pub async fn build_context(&self) -> Result<BackendContext> {
        let (namespaces, pods, deployments, services) = tokio::join!(
            self.list("namespaces", false, |item| name_of(item).map(str::to_string)),
            self.list("pods", true, pod_entry),
            self.list("deployments", true, namespaced_name),
            self.list("services", true, namespaced_name),
        );

        let inventory = Inventory::new(format!("Kubernetes cluster (context {})", self.context))
            .section(InventorySection::new("Namespaces", namespaces))
            .section(InventorySection::new("Pods", pods))
            .section(InventorySection::new("Deployments", deployments))
            .section(InventorySection::new("Services", services))
            .note(format!("add --context {} to every kubectl command", self.context));

        for (title, reason) in inventory.failures() {
            warn!(section = title, %reason, "Kubernetes listing failed");
        }
        if inventory.all_failed() {
            return Err(ParleyError::context(format!(
                "No cluster resources could be listed for context '{}'",
                self.context
            )));
        }

        Ok(BackendContext::Kubernetes(inventory))
    }

    pub async fn execute(&self, command: &str) -> Result<Vec<u8>> {
        if kubectl_contexts(command).is_empty() {
            self.ensure_current_context().await?;
        }
        execute_shell(self.runner.as_ref(), command).await
    }

    async fn ensure_current_context(&self) -> Result<()> {
        let args = ["config".to_string(), "current-context".to_string()];
        let output = self
            .runner
            .run("kubectl", &args)
            .await
            .map_err(|e| ParleyError::execution(format!("Could not run kubectl: {e}")))?;

        if !output.status.success() {
            return Err(ParleyError::execution(format!(
                "The command has no --context and the current kubeconfig context is unknown: {}",
                failure_reason(&output)
            )));
        }

        let current = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if current != self.context {
            return Err(ParleyError::execution(format!(
                "The command has no --context and the current kubeconfig context is '{current}', \
                 not '{}'. Nothing was run.",
                self.context
            )));
        }
        Ok(())
    }

    async fn list(
        &self,
        resource: &str,
        all_namespaces: bool,
        entry: fn(&Value) -> Option<String>,
    ) -> std::result::Result<Vec<String>, String> {
        let mut rest = vec!["get", resource, "-o", "json"];
        if all_namespaces {
            rest.push("--all-namespaces");
        }

        let output = self.runner.run("kubectl", &self.args(&rest)).await.map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(failure_reason(&output));
        }

        parse_items(&output.stdout, entry)
    }
}

/// Entries from a `kind: List` JSON document
fn parse_items(
    stdout: &[u8],
    entry: fn(&Value) -> Option<String>,
) -> std::result::Result<Vec<String>, String> {
    let doc: Value = serde_json::from_slice(stdout).map_err(|e| format!("unexpected output: {e}"))?;
    let items = doc
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| "unexpected output: no items".to_string())?;
    Ok(items.iter().filter_map(entry).collect())
}

fn name_of(item: &Value) -> Option<&str> {
    item.pointer("/metadata/name").and_then(Value::as_str)
}

fn namespaced_name(item: &Value) -> Option<String> {
    let name = name_of(item)?;
    let namespace = item.pointer("/metadata/namespace").and_then(Value::as_str).unwrap_or("default");
    Some(format!("{namespace}/{name}"))
}

fn pod_entry(item: &Value) -> Option<String> {
    let base = namespaced_name(item)?;
    match item.pointer("/status/phase").and_then(Value::as_str) {
        Some(phase) => Some(format!("{base} ({phase})")),
        None => Some(base),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use std::sync::Mutex;

    /// Answers by matching the joined argument list against known resources.
    struct FakeKubectl {
        reachable: bool,
        forbidden: &'static [&'static str],
        current_context: &'static str,
        calls: Mutex<Vec<Vec<String>>>,
        shell: Mutex<Vec<String>>,
    }

    impl FakeKubectl {
        fn new(reachable: bool, forbidden: &'static [&'static str]) -> Self {
            Self {
                reachable,
                forbidden,
                current_context: "aks-dev",
                calls: Mutex::new(Vec::new()),
                shell: Mutex::new(Vec::new()),
            }
        }
    }

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeKubectl {
        async fn run(&self, program: &str, args: &[String]) -> std::io::Result<Output> {
            if program == "sh" {
                self.shell.lock().unwrap().push(args[1].clone());
                return Ok(output(0, "pod/web-1 restarted\n", ""));
            }
            assert_eq!(program, "kubectl");
            self.calls.lock().unwrap().push(args.to_vec());
            let line = args.join(" ");

            if line == "config current-context" {
                return Ok(output(0, &format!("{}\n", self.current_context), ""));
            }

            if line.contains("cluster-info") {
                return Ok(if self.reachable {
                    output(0, "Kubernetes control plane is running", "")
                } else {
                    output(1, "", "Unable to connect to the server: dial tcp: i/o timeout\n")
                });
            }

            let resource = args.get(3).map(String::as_str).unwrap_or_default();
            if self.forbidden.contains(&resource) {
                return Ok(output(1, "", &format!("Error from server (Forbidden): {resource} is forbidden\n")));
            }

            let body = match resource {
                "namespaces" => r#"{"items":[{"metadata":{"name":"kube-system"}},{"metadata":{"name":"default"}}]}"#,
                "pods" => r#"{"items":[{"metadata":{"name":"web-2","namespace":"shop"},"status":{"phase":"Pending"}},{"metadata":{"name":"web-1","namespace":"shop"},"status":{"phase":"Running"}}]}"#,
                "deployments" => r#"{"items":[{"metadata":{"name":"web","namespace":"shop"}}]}"#,
                _ => r#"{"items":[]}"#,
            };
            Ok(output(0, body, ""))
        }
    }

    fn driver(fake: FakeKubectl) -> (KubectlDriver, Arc<FakeKubectl>) {
        let fake = Arc::new(fake);
        (KubectlDriver::new("aks-dev".to_string(), fake.clone()), fake)
    }

    #[tokio::test]
    async fn test_auth_pins_context() {
        let (driver, fake) = driver(FakeKubectl::new(true, &[]));
        driver.check_authentication().await.unwrap();
        assert_eq!(fake.calls.lock().unwrap()[0][..3], ["--context", "aks-dev", "cluster-info"]);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_auth_error() {
        let (driver, _) = driver(FakeKubectl::new(false, &[]));
        let err = driver.check_authentication().await.unwrap_err();
        assert!(matches!(err, ParleyError::Auth(_)));
        assert!(err.message().contains("i/o timeout"));
    }

    #[tokio::test]
    async fn test_inventory_sorted_with_partial_failure() {
        let (driver, _) = driver(FakeKubectl::new(true, &["services"]));
        let rendered = driver.build_context().await.unwrap().render();

        insta::assert_snapshot!(rendered, @r"
Kubernetes cluster (context aks-dev):
Namespaces: default, kube-system
Pods: shop/web-1 (Running), shop/web-2 (Pending)
Deployments: shop/web
Services: unavailable: Error from server (Forbidden): services is forbidden
Note: add --context aks-dev to every kubectl command
");
    }

    #[tokio::test]
    async fn test_all_listings_failing_is_context_error() {
        let (driver, _) =
            driver(FakeKubectl::new(true, &["namespaces", "pods", "deployments", "services"]));
        let err = driver.build_context().await.unwrap_err();
        assert!(matches!(err, ParleyError::Context(_)));
    }

    #[tokio::test]
    async fn test_execute_in_session_context() {
        let (driver, fake) = driver(FakeKubectl::new(true, &[]));
        driver.execute("kubectl rollout restart deploy/web -n shop").await.unwrap();
        assert_eq!(*fake.shell.lock().unwrap(), vec!["kubectl rollout restart deploy/web -n shop"]);
    }

    #[tokio::test]
    async fn test_execute_refuses_other_current_context() {
        let mut fake = FakeKubectl::new(true, &[]);
        fake.current_context = "aks-prod";
        let (driver, fake) = driver(fake);

        let err = driver.execute("kubectl delete pod web-1 -n shop").await.unwrap_err();
        assert!(matches!(err, ParleyError::Execution(_)));
        assert!(err.message().contains("'aks-prod'"));
        assert!(fake.shell.lock().unwrap().is_empty());

        // an explicit --context skips the check
        driver.execute("kubectl --context aks-dev get pods").await.unwrap();
        assert_eq!(fake.shell.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_items_rejects_garbage() {
        assert!(parse_items(b"not json", pod_entry).is_err());
        assert!(parse_items(b"{}", pod_entry).is_err());
    }
}
