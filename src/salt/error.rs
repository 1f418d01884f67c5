//! Tipos de erro para o cliente da Salt API.
//!
//! Define [`SaltError`] com variantes para credenciais recusadas, erros HTTP,
//! respostas sem jid, uso fora de ordem e erros de rede.

use thiserror::Error;

/// Erros que podem ocorrer ao interagir com a Salt API.
#[derive(Debug, Error)]
pub enum SaltError {
    /// `login` chamado antes de `setup`.
    #[error("session not set up, call setup() first")]
    NotSetUp,

    /// `apply_state` chamado sem token de sessão.
    #[error("not logged in, call login() first")]
    NotLoggedIn,

    /// O master recusou as credenciais (HTTP 401).
    #[error("authentication rejected by the Salt master")]
    Unauthorized,

    /// Qualquer outro status HTTP de erro, com o corpo da resposta.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// O primeiro registro de retorno não trouxe um `jid`
    /// (retorno vazio ou nenhum minion casou com o alvo).
    #[error("no job id returned for target `{target}`")]
    MissingJid { target: String },

    /// Resposta de login sem nenhum registro de sessão.
    #[error("login response carried no session token")]
    MissingToken,

    /// Falha de rede ou de decodificação do `reqwest`.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
