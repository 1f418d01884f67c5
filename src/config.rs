//! Configuração do saltdeploy.
//!
//! As credenciais vêm sempre das variáveis de ambiente `SALTAPI_*`, sem
//! valores padrão. Timeouts e a política de falha vêm de `saltdeploy.toml`
//! quando o arquivo existe; valores ausentes usam defaults sensíveis.
//! A validação reúne todos os problemas de uma vez em [`ConfigError`].

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::salt::EAuth;

pub const ENV_EAUTH: &str = "SALTAPI_EAUTH";
pub const ENV_PASS: &str = "SALTAPI_PASS";
pub const ENV_URL: &str = "SALTAPI_URL";
pub const ENV_USER: &str = "SALTAPI_USER";

/// Arquivo de configuração lido do diretório atual quando `--config` não é dado.
pub const DEFAULT_CONFIG_FILE: &str = "saltdeploy.toml";

/// Um problema encontrado em uma variável de ambiente.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigIssue {
    #[allow(dead_code)]
    pub fn var(&self) -> &'static str {
        match self {
            ConfigIssue::Missing(var) => var,
            ConfigIssue::Invalid { var, .. } => var,
        }
    }
}

/// Todas as falhas de configuração encontradas, na ordem das variáveis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", render_issues(.issues))]
pub struct ConfigError {
    pub issues: Vec<ConfigIssue>,
}

fn render_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Credenciais da Salt API. Imutáveis após a leitura.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub user: String,
    pub password: String,
    pub eauth: EAuth,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("eauth", &self.eauth)
            .finish()
    }
}

impl Credentials {
    /// Lê e valida as quatro variáveis usando `lookup` como fonte.
    ///
    /// Nenhuma variável é opcional; todas as ausentes ou inválidas são
    /// reportadas juntas. Um valor que não é UTF-8 conta como inválido,
    /// não como ausente.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut issues = Vec::new();

        let eauth = parsed(&lookup, ENV_EAUTH, &mut issues, |raw| {
            raw.parse::<EAuth>().map_err(|e| e.to_string())
        });
        let password = parsed(&lookup, ENV_PASS, &mut issues, non_empty);
        let url = parsed(&lookup, ENV_URL, &mut issues, |raw| {
            validate_url(&raw).map(|()| raw)
        });
        let user = parsed(&lookup, ENV_USER, &mut issues, non_empty);

        match (url, user, password, eauth) {
            (Some(url), Some(user), Some(password), Some(eauth)) if issues.is_empty() => Ok(Self {
                url,
                user,
                password,
                eauth,
            }),
            _ => Err(ConfigError { issues }),
        }
    }
}

/// Lê `var` e aplica `check`, registrando em `issues` qualquer problema.
fn parsed<F, T>(
    lookup: &F,
    var: &'static str,
    issues: &mut Vec<ConfigIssue>,
    check: impl FnOnce(String) -> Result<T, String>,
) -> Option<T>
where
    F: Fn(&str) -> Option<OsString>,
{
    let outcome = match lookup(var) {
        None => Err(ConfigIssue::Missing(var)),
        Some(value) => value
            .into_string()
            .map_err(|_| "not valid UTF-8".to_string())
            .and_then(check)
            .map_err(|reason| ConfigIssue::Invalid { var, reason }),
    };
    match outcome {
        Ok(value) => Some(value),
        Err(issue) => {
            issues.push(issue);
            None
        }
    }
}

fn non_empty(value: String) -> Result<String, String> {
    if value.is_empty() {
        Err("must not be empty".into())
    } else {
        Ok(value)
    }
}

fn validate_url(raw: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme `{other}`")),
    }
}

/// Timeouts por etapa de rede, em segundos.
#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_clone_secs")]
    pub clone_secs: u64,
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    #[serde(default = "default_login_secs")]
    pub login_secs: u64,
    #[serde(default = "default_apply_secs")]
    pub apply_secs: u64,
    #[serde(default = "default_teardown_secs")]
    pub teardown_secs: u64,
}

fn default_clone_secs() -> u64 {
    300
}

fn default_connect_secs() -> u64 {
    10
}

fn default_login_secs() -> u64 {
    30
}

// O master responde ao local_async logo após publicar o job, mas pode
// demorar com muitos minions conectados.
fn default_apply_secs() -> u64 {
    120
}

fn default_teardown_secs() -> u64 {
    10
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            clone_secs: default_clone_secs(),
            connect_secs: default_connect_secs(),
            login_secs: default_login_secs(),
            apply_secs: default_apply_secs(),
            teardown_secs: default_teardown_secs(),
        }
    }
}

impl Timeouts {
    pub fn git_clone(&self) -> Duration {
        Duration::from_secs(self.clone_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn login(&self) -> Duration {
        Duration::from_secs(self.login_secs)
    }

    pub fn apply(&self) -> Duration {
        Duration::from_secs(self.apply_secs)
    }

    pub fn teardown(&self) -> Duration {
        Duration::from_secs(self.teardown_secs)
    }
}

/// Conteúdo opcional de `saltdeploy.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    /// Mantém o clone em disco quando uma etapa falha.
    #[serde(default)]
    pub keep_on_failure: bool,

    #[serde(default)]
    pub timeouts: Timeouts,
}

impl FileConfig {
    /// Carrega `path`. Um caminho explícito precisa existir; o arquivo
    /// padrão é opcional e, ausente, resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<FileConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> + use<> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_EAUTH, "pam"),
            (ENV_PASS, "hunter2"),
            (ENV_URL, "https://salt.gserv.me:8000"),
            (ENV_USER, "deploy"),
        ]
    }

    #[test]
    fn reads_all_four_variables() {
        let creds = Credentials::from_lookup(env(&full_env())).unwrap();
        assert_eq!(creds.eauth, EAuth::Pam);
        assert_eq!(creds.password, "hunter2");
        assert_eq!(creds.url, "https://salt.gserv.me:8000");
        assert_eq!(creds.user, "deploy");
    }

    #[test]
    fn every_eauth_backend_is_accepted() {
        for eauth in EAuth::ALL {
            let mut vars = full_env();
            vars[0] = (ENV_EAUTH, eauth.as_str());
            let creds = Credentials::from_lookup(env(&vars)).unwrap();
            assert_eq!(creds.eauth, eauth);
        }
    }

    #[test]
    fn each_missing_variable_is_reported() {
        for skip in [ENV_EAUTH, ENV_PASS, ENV_URL, ENV_USER] {
            let vars: Vec<_> = full_env().into_iter().filter(|(k, _)| *k != skip).collect();
            let err = Credentials::from_lookup(env(&vars)).unwrap_err();
            assert_eq!(err.issues, vec![ConfigIssue::Missing(skip)]);
        }
    }

    #[test]
    fn all_problems_are_listed_at_once() {
        let err = Credentials::from_lookup(env(&[
            (ENV_EAUTH, "kerberos"),
            (ENV_URL, "ftp://salt"),
        ]))
        .unwrap_err();
        let vars: Vec<_> = err.issues.iter().map(ConfigIssue::var).collect();
        assert_eq!(vars, vec![ENV_EAUTH, ENV_PASS, ENV_URL, ENV_USER]);
        assert!(matches!(err.issues[0], ConfigIssue::Invalid { .. }));
        assert!(matches!(err.issues[2], ConfigIssue::Invalid { .. }));

        let message = err.to_string();
        assert!(message.contains("SALTAPI_PASS is not set"));
        assert!(message.contains("unsupported scheme `ftp`"));
    }

    #[test]
    fn empty_password_is_invalid() {
        let mut vars = full_env();
        vars[1] = (ENV_PASS, "");
        let err = Credentials::from_lookup(env(&vars)).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ConfigIssue::Invalid {
                var: ENV_PASS,
                reason: "must not be empty".into()
            }]
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_value_is_invalid_not_missing() {
        use std::os::unix::ffi::OsStringExt;

        let full = env(&full_env());
        let lookup = move |key: &str| {
            if key == ENV_USER {
                Some(OsString::from_vec(vec![b'd', 0xff, b'p']))
            } else {
                full(key)
            }
        };
        let err = Credentials::from_lookup(lookup).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ConfigIssue::Invalid {
                var: ENV_USER,
                reason: "not valid UTF-8".into()
            }]
        );
        assert!(err.to_string().contains("SALTAPI_USER is invalid: not valid UTF-8"));
        assert!(!err.to_string().contains("not set"));
    }

    #[test]
    fn config_issue_display() {
        assert_eq!(
            ConfigIssue::Missing(ENV_URL).to_string(),
            "SALTAPI_URL is not set"
        );
        let err = ConfigError {
            issues: vec![
                ConfigIssue::Missing(ENV_PASS),
                ConfigIssue::Invalid {
                    var: ENV_EAUTH,
                    reason: "unknown eauth backend `x`".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration: SALTAPI_PASS is not set; SALTAPI_EAUTH is invalid: unknown eauth backend `x`"
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::from_lookup(env(&full_env())).unwrap();
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn default_file_config_values() {
        let config = FileConfig::default();
        assert!(!config.keep_on_failure);
        assert_eq!(config.timeouts.clone_secs, 300);
        assert_eq!(config.timeouts.connect_secs, 10);
        assert_eq!(config.timeouts.login_secs, 30);
        assert_eq!(config.timeouts.apply_secs, 120);
        assert_eq!(config.timeouts.teardown_secs, 10);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            keep_on_failure = true

            [timeouts]
            apply_secs = 300
        "#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert!(config.keep_on_failure);
        assert_eq!(config.timeouts.apply(), Duration::from_secs(300));
        assert_eq!(config.timeouts.login_secs, 30);
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(FileConfig::load(Some(&missing)).is_err());

        let present = dir.path().join("saltdeploy.toml");
        std::fs::write(&present, "[timeouts]\nlogin_secs = 5\n").unwrap();
        let config = FileConfig::load(Some(&present)).unwrap();
        assert_eq!(config.timeouts.login_secs, 5);
    }
}
