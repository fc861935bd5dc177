//! OpenStack credential resolution
//!
//! `OS_*` environment variables win over the `os_*` request options.

use kubeprov_core::{OpenStackOptions, ProvisionError, Result};

pub const OS_AUTH_URL: &str = "OS_AUTH_URL";
pub const OS_USERNAME: &str = "OS_USERNAME";
pub const OS_PASSWORD: &str = "OS_PASSWORD";
pub const OS_PROJECT_NAME: &str = "OS_PROJECT_NAME";
pub const OS_REGION_NAME: &str = "OS_REGION_NAME";
pub const OS_USER_DOMAIN_NAME: &str = "OS_USER_DOMAIN_NAME";
pub const OS_PROJECT_DOMAIN_NAME: &str = "OS_PROJECT_DOMAIN_NAME";

/// Resolved credentials for the `openstack` CLI
#[derive(Clone, PartialEq, Eq)]
pub struct OpenStackAuth {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    pub domain_name: Option<String>,
    pub region_name: Option<String>,
}

impl std::fmt::Debug for OpenStackAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStackAuth")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"********")
            .field("project_name", &self.project_name)
            .field("domain_name", &self.domain_name)
            .field("region_name", &self.region_name)
            .finish()
    }
}

impl OpenStackAuth {
    /// Resolve against the process environment
    pub fn resolve(options: &OpenStackOptions) -> Result<Self> {
        Self::resolve_with(options, |key| std::env::var(key).ok())
    }

    /// Resolve using `env` to look up `OS_*` variables
    pub fn resolve_with<F>(options: &OpenStackOptions, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str, fallback: &Option<String>| {
            env(var)
                .filter(|v| !v.is_empty())
                .or_else(|| fallback.clone())
        };

        let auth_url = lookup(OS_AUTH_URL, &options.auth_url);
        let username = lookup(OS_USERNAME, &options.username);
        let password = lookup(OS_PASSWORD, &options.password);
        let project_name = lookup(OS_PROJECT_NAME, &options.project_name);

        let missing: Vec<&str> = [
            ("auth_url", &auth_url),
            ("username", &username),
            ("password", &password),
            ("project_name", &project_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect();

        match (auth_url, username, password, project_name) {
            (Some(auth_url), Some(username), Some(password), Some(project_name)) => Ok(Self {
                auth_url,
                username,
                password,
                project_name,
                domain_name: options.domain_name.clone(),
                region_name: lookup(OS_REGION_NAME, &options.region_name),
            }),
            _ => Err(ProvisionError::config(format!(
                "{} not found in the configuration or environment",
                missing.join(", ")
            ))),
        }
    }

    /// Variables passed to every `openstack` invocation
    pub fn env_vars(&self) -> Vec<(&'static str, &str)> {
        let mut vars = vec![
            (OS_AUTH_URL, self.auth_url.as_str()),
            (OS_USERNAME, self.username.as_str()),
            (OS_PASSWORD, self.password.as_str()),
            (OS_PROJECT_NAME, self.project_name.as_str()),
        ];
        if let Some(domain) = &self.domain_name {
            vars.push((OS_USER_DOMAIN_NAME, domain));
            vars.push((OS_PROJECT_DOMAIN_NAME, domain));
        }
        if let Some(region) = &self.region_name {
            vars.push((OS_REGION_NAME, region));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn options() -> OpenStackOptions {
        OpenStackOptions {
            auth_url: Some("https://keystone.example:5000/v3".to_string()),
            username: Some("ops".to_string()),
            password: Some("hunter2".to_string()),
            project_name: Some("k8s".to_string()),
            region_name: Some("RegionOne".to_string()),
            ..Default::default()
        }
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_environment_wins() {
        let auth = OpenStackAuth::resolve_with(
            &options(),
            env(&[(OS_USERNAME, "admin"), (OS_REGION_NAME, "RegionTwo")]),
        )
        .unwrap();
        assert_eq!(auth.username, "admin");
        assert_eq!(auth.password, "hunter2");
        assert_eq!(auth.region_name.as_deref(), Some("RegionTwo"));
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let mut options = options();
        options.password = None;
        options.project_name = None;
        let err = OpenStackAuth::resolve_with(&options, env(&[])).unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration(_)));
        assert!(err.to_string().contains("password, project_name"));
    }

    #[test]
    fn test_environment_fills_missing_option() {
        let mut options = options();
        options.auth_url = None;
        let auth =
            OpenStackAuth::resolve_with(&options, env(&[(OS_AUTH_URL, "https://id.example")]))
                .unwrap();
        assert_eq!(auth.auth_url, "https://id.example");
    }

    #[test]
    fn test_debug_redacts_password() {
        let auth = OpenStackAuth::resolve_with(&options(), env(&[])).unwrap();
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_domain_sets_both_domain_vars() {
        let mut options = options();
        options.domain_name = Some("Default".to_string());
        let auth = OpenStackAuth::resolve_with(&options, env(&[])).unwrap();
        let vars = auth.env_vars();
        assert!(vars.contains(&(OS_USER_DOMAIN_NAME, "Default")));
        assert!(vars.contains(&(OS_PROJECT_DOMAIN_NAME, "Default")));
    }
}
