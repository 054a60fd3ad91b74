//! Embedded manifest templates
//!
//! Templates use `${VAR}` placeholders filled from the run variables.

use crate::core::config::expand_variables;
use serde_json::json;
use std::collections::BTreeMap;

pub const NGROK_INGRESS_CLASS: &str = include_str!("templates/ngrok-ingress-class.yaml");
pub const NGINX_INGRESS_CLASS: &str = include_str!("templates/nginx-ingress-class.yaml");
pub const RANCHER_SETTING_PATCH: &str = include_str!("templates/rancher-setting-patch.yaml");
pub const RANCHER_INGRESS: &str = include_str!("templates/rancher-ingress.yaml");
pub const RANCHER_SERVICE_PATCH: &str = include_str!("templates/rancher-service-patch.yaml");
pub const GITEA_INGRESS: &str = include_str!("templates/gitea-ingress.yaml");
pub const CAPI_PROVIDERS: &str = include_str!("templates/capi-providers.yaml");

/// Render a template; `overrides` take precedence over `variables`
pub fn render(
    template: &str,
    variables: &BTreeMap<String, String>,
    overrides: &[(&str, &str)],
) -> String {
    expand_variables(template, |name| {
        overrides
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
            .or_else(|| variables.get(name).cloned())
    })
}

/// A `kubernetes.io/basic-auth` Secret holding `username` and `password`
///
/// Serialized rather than templated so any credential survives as a YAML string.
pub fn basic_auth_secret(
    name: &str,
    namespace: &str,
    username: &str,
    password: &str,
) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace },
        "type": "kubernetes.io/basic-auth",
        "stringData": { "username": username, "password": password },
    }))
}
