//! Tipos de dados trocados com a interface `rest_cherrypy` da Salt API.
//!
//! Todas as respostas da Salt API vêm embrulhadas em `{"return": [...]}`;
//! [`SaltReturn`] representa esse envelope. O backend de autenticação
//! ([`EAuth`]) é convertido a partir de texto com [`EAuth::from_str`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Backend de autenticação externa (eauth) usado pelo master para validar
/// usuário e senha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EAuth {
    Auto,
    Django,
    File,
    Keystone,
    Ldap,
    Mysql,
    Pam,
    Rest,
    #[serde(rename = "sharedsecret")]
    SharedSecret,
    Yubico,
}

impl EAuth {
    /// Nome do backend exatamente como o master o espera no campo `eauth`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EAuth::Auto => "auto",
            EAuth::Django => "django",
            EAuth::File => "file",
            EAuth::Keystone => "keystone",
            EAuth::Ldap => "ldap",
            EAuth::Mysql => "mysql",
            EAuth::Pam => "pam",
            EAuth::Rest => "rest",
            EAuth::SharedSecret => "sharedsecret",
            EAuth::Yubico => "yubico",
        }
    }

    pub const ALL: [EAuth; 10] = [
        EAuth::Auto,
        EAuth::Django,
        EAuth::File,
        EAuth::Keystone,
        EAuth::Ldap,
        EAuth::Mysql,
        EAuth::Pam,
        EAuth::Rest,
        EAuth::SharedSecret,
        EAuth::Yubico,
    ];
}

impl fmt::Display for EAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Erro de conversão para nomes de backend desconhecidos.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown eauth backend `{0}`")]
pub struct UnknownEAuth(pub String);

impl FromStr for EAuth {
    type Err = UnknownEAuth;

    /// Aceita o nome sem diferenciar maiúsculas de minúsculas e ignorando
    /// espaços nas pontas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        EAuth::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| UnknownEAuth(s.to_string()))
    }
}

/// Envelope `{"return": [...]}` comum a todas as respostas.
#[derive(Debug, Clone, Deserialize)]
pub struct SaltReturn<T> {
    #[serde(rename = "return")]
    pub entries: Vec<T>,
}

/// Corpo do `POST /login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub eauth: EAuth,
}

/// Registro de sessão devolvido pelo `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRecord {
    /// Token enviado no cabeçalho `X-Auth-Token` das chamadas seguintes.
    pub token: String,
    /// Instante (epoch, segundos) em que o token expira.
    #[serde(default)]
    pub expire: Option<f64>,
    #[serde(default)]
    pub user: Option<String>,
}

/// Um "lowstate" do `rest_cherrypy`: uma chamada de função em um cliente Salt.
#[derive(Debug, Clone, Serialize)]
pub struct Lowstate<'a> {
    pub client: &'a str,
    pub tgt: &'a str,
    pub fun: &'a str,
    pub arg: Vec<&'a str>,
}

impl<'a> Lowstate<'a> {
    /// `state.apply` assíncrono: o master devolve o jid imediatamente,
    /// sem esperar o minion terminar.
    pub fn apply_state(host: &'a str, state: &'a str) -> Self {
        Self {
            client: "local_async",
            tgt: host,
            fun: "state.apply",
            arg: vec![state],
        }
    }
}

/// Registro de resultado de um job disparado com `local_async`.
///
/// O master devolve `{}` quando nenhum minion casa com o alvo, por isso
/// ambos os campos são opcionais.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub jid: Option<String>,
    #[serde(default)]
    pub minions: Vec<String>,
}

/// Resultado de uma aplicação de estado: a sequência de registros devolvida.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateJob {
    pub records: Vec<JobRecord>,
}

impl StateJob {
    /// Identificador do job do primeiro registro, o único consumido.
    pub fn jid(&self) -> Option<&str> {
        self.records.first().and_then(|r| r.jid.as_deref())
    }

    /// Minions alvo do primeiro registro.
    pub fn minions(&self) -> &[String] {
        self.records
            .first()
            .map(|r| r.minions.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eauth_parses_case_insensitively() {
        assert_eq!("PAM".parse::<EAuth>().unwrap(), EAuth::Pam);
        assert_eq!(" ldap ".parse::<EAuth>().unwrap(), EAuth::Ldap);
        assert_eq!(
            "SharedSecret".parse::<EAuth>().unwrap(),
            EAuth::SharedSecret
        );
    }

    #[test]
    fn eauth_rejects_unknown_backend() {
        let err = "kerberos".parse::<EAuth>().unwrap_err();
        assert_eq!(err.to_string(), "unknown eauth backend `kerberos`");
    }

    #[test]
    fn eauth_names_match_serde_form() {
        for eauth in EAuth::ALL {
            let json = serde_json::to_string(&eauth).unwrap();
            assert_eq!(json, format!("\"{}\"", eauth.as_str()));
        }
    }

    #[test]
    fn login_request_serializes_eauth_as_name() {
        let req = LoginRequest {
            username: "deploy",
            password: "hunter2",
            eauth: EAuth::SharedSecret,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["eauth"], "sharedsecret");
        assert_eq!(json["username"], "deploy");
    }

    #[test]
    fn lowstate_targets_state_apply_async() {
        let low = Lowstate::apply_state("shimmer.gserv.me", "docker/kotdis-bot");
        let json = serde_json::to_value(vec![low]).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "client": "local_async",
                "tgt": "shimmer.gserv.me",
                "fun": "state.apply",
                "arg": ["docker/kotdis-bot"]
            }])
        );
    }

    #[test]
    fn login_return_deserializes_from_api_format() {
        let body = r#"{"return": [{
            "token": "6d1b722e",
            "start": 1672574400.0,
            "expire": 1672617600.0,
            "user": "deploy",
            "eauth": "pam",
            "perms": [".*"]
        }]}"#;
        let parsed: SaltReturn<LoginRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.entries[0].token, "6d1b722e");
        assert_eq!(parsed.entries[0].user.as_deref(), Some("deploy"));
    }

    #[test]
    fn state_job_reads_first_jid_only() {
        let body = r#"{"return": [
            {"jid": "20230101120000123456", "minions": ["shimmer.gserv.me"]},
            {"jid": "20230101120000999999", "minions": []}
        ]}"#;
        let parsed: SaltReturn<JobRecord> = serde_json::from_str(body).unwrap();
        let job = StateJob {
            records: parsed.entries,
        };
        assert_eq!(job.jid(), Some("20230101120000123456"));
        assert_eq!(job.minions(), ["shimmer.gserv.me".to_string()]);
    }

    #[test]
    fn state_job_without_match_has_no_jid() {
        let parsed: SaltReturn<JobRecord> = serde_json::from_str(r#"{"return": [{}]}"#).unwrap();
        let job = StateJob {
            records: parsed.entries,
        };
        assert_eq!(job.jid(), None);
        assert!(job.minions().is_empty());
        assert_eq!(StateJob::default().jid(), None);
    }
}
