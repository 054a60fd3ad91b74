//! Names and constants shared by the suite stages

/// Config variable names
pub mod vars {
    pub const RANCHER_HOSTNAME: &str = "RANCHER_HOSTNAME";
    pub const KUBERNETES_MANAGEMENT_VERSION: &str = "KUBERNETES_MANAGEMENT_VERSION";
    pub const NGROK_API_KEY: &str = "NGROK_API_KEY";
    pub const NGROK_AUTHTOKEN: &str = "NGROK_AUTHTOKEN";
    pub const NGROK_PATH: &str = "NGROK_PATH";
    pub const NGROK_REPO_NAME: &str = "NGROK_REPO_NAME";
    pub const NGROK_URL: &str = "NGROK_URL";
    pub const CERT_MANAGER_PATH: &str = "CERT_MANAGER_PATH";
    pub const CERT_MANAGER_URL: &str = "CERT_MANAGER_URL";
    pub const CERT_MANAGER_REPO_NAME: &str = "CERT_MANAGER_REPO_NAME";
    pub const RANCHER_REPO_NAME: &str = "RANCHER_REPO_NAME";
    pub const RANCHER_URL: &str = "RANCHER_URL";
    pub const RANCHER_PATH: &str = "RANCHER_PATH";
    pub const RANCHER_VERSION: &str = "RANCHER_VERSION";
    pub const RANCHER_PASSWORD: &str = "RANCHER_PASSWORD";
    pub const GITEA_REPO_NAME: &str = "GITEA_REPO_NAME";
    pub const GITEA_REPO_URL: &str = "GITEA_REPO_URL";
    pub const GITEA_CHART_NAME: &str = "GITEA_CHART_NAME";
    pub const GITEA_CHART_VERSION: &str = "GITEA_CHART_VERSION";
    pub const GITEA_USER_NAME: &str = "GITEA_USER_NAME";
    pub const GITEA_USER_PWD: &str = "GITEA_USER_PWD";
}

/// Interval phase labels
pub mod phases {
    pub const WAIT_RANCHER: &str = "wait-rancher";
    pub const WAIT_CONTROLLERS: &str = "wait-controllers";
    pub const WAIT_GITEA: &str = "wait-gitea";
    pub const WAIT_GITEA_SERVICE: &str = "wait-gitea-service";
    pub const WAIT_GITEA_UNINSTALL: &str = "wait-gitea-uninstall";
    pub const WAIT_TURTLES_UNINSTALL: &str = "wait-turtles-uninstall";
}

pub const TUNNEL_NAMESPACE: &str = "ngrok";
pub const TUNNEL_RELEASE: &str = "ngrok";
pub const TUNNEL_DEPLOYMENT: &str = "ngrok-ingress-controller-kubernetes-ingress-controller-manager";

pub const NGINX_NAMESPACE: &str = "ingress-nginx";
pub const NGINX_RELEASE: &str = "ingress-nginx";
pub const NGINX_DEPLOYMENT: &str = "ingress-nginx-controller";
pub const NGINX_CHART: &str = "ingress-nginx/ingress-nginx";
pub const NGINX_REPO_NAME: &str = "ingress-nginx";
pub const NGINX_REPO_URL: &str = "https://kubernetes.github.io/ingress-nginx";

pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";
pub const CERT_MANAGER_RELEASE: &str = "cert-manager";
pub const CERT_MANAGER_DEPLOYMENT: &str = "cert-manager";

pub const RANCHER_NAMESPACE: &str = "cattle-system";
pub const RANCHER_RELEASE: &str = "rancher";
pub const RANCHER_DEPLOYMENT: &str = "rancher";
pub const RANCHER_WEBHOOK_DEPLOYMENT: &str = "rancher-webhook";

pub const TURTLES_NAMESPACE: &str = "rancher-turtles-system";
pub const TURTLES_RELEASE: &str = "rancher-turtles";
pub const TURTLES_REPO_NAME: &str = "turtles";
pub const TURTLES_REPO_URL: &str = "https://rancher.github.io/turtles";
pub const TURTLES_CHART: &str = "turtles/rancher-turtles";
pub const TURTLES_BASELINE_VERSION: &str = "v0.6.0";
pub const TURTLES_DEPLOYMENT: &str = "rancher-turtles-controller-manager";
pub const TURTLES_IMAGE_REPO: &str = "ghcr.io/rancher/turtles-e2e";
pub const TURTLES_IMAGE_TAG: &str = "v0.0.1";

pub const CHARTMUSEUM_NAMESPACE: &str = "chartmuseum";
pub const CHARTMUSEUM_RELEASE: &str = "chartmuseum";
pub const CHARTMUSEUM_REPO_NAME: &str = "chartmuseum";
pub const CHARTMUSEUM_REPO_URL: &str = "https://chartmuseum.github.io/charts";
pub const CHARTMUSEUM_CHART: &str = "chartmuseum/chartmuseum";
pub const CHARTMUSEUM_DEPLOYMENT: &str = "chartmuseum";
pub const CHARTMUSEUM_URL: &str = "http://chartmuseum.chartmuseum.svc.cluster.local:8080";

pub const GITEA_NAMESPACE: &str = "default";
pub const GITEA_RELEASE: &str = "gitea";
pub const GITEA_DEPLOYMENT: &str = "gitea";
pub const GITEA_HTTP_SERVICE: &str = "gitea-http";
pub const AUTH_SECRET_NAME: &str = "basic-auth-secret";

pub const CAAPF_DEPLOYMENT: &str = "caapf-controller-manager";

/// Architecture suffix used by the locally built add-on image
pub fn image_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Locally built add-on image, e.g. `ghcr.io/rancher/turtles-e2e-amd64`
pub fn upgrade_image() -> String {
    format!("{}-{}", TURTLES_IMAGE_REPO, image_arch())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_image_has_arch_suffix() {
        let image = upgrade_image();
        assert!(image.starts_with("ghcr.io/rancher/turtles-e2e-"));
        assert!(!image.ends_with("x86_64"));
    }
}
