//! Typed remediation command templates
//!
//! Each template is a builder function over resource identity fields. The
//! [`CommandTemplate`] enum maps the identifiers used in `template:` command
//! references onto those builders.

use std::collections::BTreeMap;

use crate::error::TemplateError;
use crate::models::{ResourceRef, KIND_DEPLOYMENT, KIND_POD};

/// Known remediation templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTemplate {
    /// Patch container resource requests or limits
    FixPodResources,
    /// Trigger a rolling restart of a deployment
    RestartDeployment,
    /// Scale a deployment to a replica count
    ScaleDeployment,
}

impl CommandTemplate {
    pub const ALL: [CommandTemplate; 3] = [
        CommandTemplate::FixPodResources,
        CommandTemplate::RestartDeployment,
        CommandTemplate::ScaleDeployment,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            CommandTemplate::FixPodResources => "fix-pod-resources",
            CommandTemplate::RestartDeployment => "restart-deployment",
            CommandTemplate::ScaleDeployment => "scale-deployment",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    /// Render the template for `resource` using the reference's parameters
    pub fn render(
        &self,
        resource: &ResourceRef,
        params: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        match self {
            CommandTemplate::RestartDeployment => {
                self.expect_kind(resource, KIND_DEPLOYMENT)?;
                Ok(restart_deployment(&resource.name, &resource.namespace))
            }
            CommandTemplate::ScaleDeployment => {
                self.expect_kind(resource, KIND_DEPLOYMENT)?;
                let raw = self.param(params, "replicas")?;
                let replicas = raw.parse().map_err(|_| TemplateError::InvalidParameter {
                    template: self.id(),
                    parameter: "replicas",
                    value: raw.to_string(),
                })?;
                Ok(scale_deployment(&resource.name, &resource.namespace, replicas))
            }
            CommandTemplate::FixPodResources => {
                let path = self.param(params, "path")?;
                if path != "limits" && path != "requests" {
                    return Err(TemplateError::InvalidParameter {
                        template: self.id(),
                        parameter: "path",
                        value: path.to_string(),
                    });
                }
                Ok(fix_pod_resources(
                    resource,
                    path,
                    self.param(params, "resource")?,
                    self.param(params, "value")?,
                ))
            }
        }
    }

    fn expect_kind(&self, resource: &ResourceRef, kind: &'static str) -> Result<(), TemplateError> {
        if resource.kind == kind {
            Ok(())
        } else {
            Err(TemplateError::KindMismatch {
                template: self.id(),
                expected: kind,
                actual: resource.kind.clone(),
            })
        }
    }

    fn param<'a>(
        &self,
        params: &'a BTreeMap<String, String>,
        name: &'static str,
    ) -> Result<&'a str, TemplateError> {
        params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or(TemplateError::MissingParameter {
                template: self.id(),
                parameter: name,
            })
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

pub fn restart_deployment(name: &str, namespace: &str) -> String {
    format!("kubectl rollout restart deployment {} -n {}", name, namespace)
}

pub fn scale_deployment(name: &str, namespace: &str, replicas: u32) -> String {
    format!(
        "kubectl scale deployment {} -n {} --replicas={}",
        name, namespace, replicas
    )
}

/// JSON patch replacing one resource quantity of the first container
pub fn fix_pod_resources(resource: &ResourceRef, path: &str, quantity: &str, value: &str) -> String {
    let spec_path = if resource.kind == KIND_POD {
        "/spec/containers/0/resources"
    } else {
        "/spec/template/spec/containers/0/resources"
    };
    format!(
        r#"kubectl patch {} {} -n {} --type=json -p='[{{"op": "replace", "path": "{}/{}", "value": {{"{}": "{}"}}}}]'"#,
        resource.kind.to_lowercase(),
        resource.name,
        resource.namespace,
        spec_path,
        path,
        quantity,
        value
    )
}
