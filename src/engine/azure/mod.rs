//! Azure Driver Implementation
//!
//! # Features
//! - Session check via `az account show`
//! - Inventory of resource groups, virtual machines and storage accounts
//! - Confirmed commands run through the shell unmodified
//!
//! # Implementation Notes
//! - Relies on an existing `az login` session; no credentials are stored
//! - When a subscription is configured every listing is scoped to it
//! - Listings run concurrently and fail independently

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::engine::context::{BackendContext, Inventory, InventorySection};
use crate::error::{ParleyError, Result};
use crate::executor::{execute_shell, failure_reason, ProcessRunner};

pub struct AzureDriver {
    subscription: Option<String>,
    runner: Arc<dyn ProcessRunner>,
}

impl AzureDriver {
    pub fn new(subscription: Option<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { subscription, runner }
    }

    fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = rest.iter().map(|s| (*s).to_string()).collect();
        args.extend(["-o".to_string(), "json".to_string()]);
        if let Some(sub) = &self.subscription {
            args.extend(["--subscription".to_string(), sub.clone()]);
        }
        args
    }

    pub async fn check_authentication(&self) -> Result<()> {
        let output = self
            .runner
            .run("az", &self.args(&["account", "show"]))
            .await
            .map_err(|e| ParleyError::auth(format!("Could not run az: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ParleyError::auth(format!(
                "Azure CLI session is not valid (run `az login`): {}",
                failure_reason(&output)
            )))
        }
    }

    pub async fn build_context(&self) -> Result<BackendContext> {
        let (groups, vms, storage) = tokio::join!(
            self.list(&["group", "list"], group_entry),
            self.list(&["vm", "list"], scoped_entry),
            self.list(&["storage", "account", "list"], scoped_entry),
        );

        let heading = match &self.subscription {
            Some(sub) => format!("Azure subscription {sub}"),
            None => "Azure subscription (CLI default)".to_string(),
        };

        let mut inventory = Inventory::new(heading)
            .section(InventorySection::new("Resource groups", groups))
            .section(InventorySection::new("Virtual machines", vms))
            .section(InventorySection::new("Storage accounts", storage));
        if let Some(sub) = &self.subscription {
            inventory = inventory.note(format!("add --subscription {sub} to every az command"));
        }

        for (title, reason) in inventory.failures() {
            warn!(section = title, %reason, "Azure listing failed");
        }
        if inventory.all_failed() {
            return Err(ParleyError::context("No Azure resources could be listed"));
        }

        Ok(BackendContext::Cloud(inventory))
    }

    pub async fn execute(&self, command: &str) -> Result<Vec<u8>> {
        execute_shell(self.runner.as_ref(), command).await
    }

    async fn list(
        &self,
        subcommand: &[&str],
        entry: fn(&Value) -> Option<String>,
    ) -> std::result::Result<Vec<String>, String> {
        let output = self.runner.run("az", &self.args(subcommand)).await.map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(failure_reason(&output));
        }

        let doc: Value =
            serde_json::from_slice(&output.stdout).map_err(|e| format!("unexpected output: {e}"))?;
        let items = doc.as_array().ok_or_else(|| "unexpected output: not a list".to_string())?;
        Ok(items.iter().filter_map(entry).collect())
    }
}

/// `name (location)`
fn group_entry(item: &Value) -> Option<String> {
    let name = item.get("name").and_then(Value::as_str)?;
    match item.get("location").and_then(Value::as_str) {
        Some(location) => Some(format!("{name} ({location})")),
        None => Some(name.to_string()),
    }
}

/// `resource-group/name`
fn scoped_entry(item: &Value) -> Option<String> {
    let name = item.get("name").and_then(Value::as_str)?;
    match item.get("resourceGroup").and_then(Value::as_str) {
        Some(group) => Some(format!("{group}/{name}")),
        None => Some(name.to_string()),
    }
}
