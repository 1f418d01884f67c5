//! Interface de linha de comando do saltdeploy baseada em clap.
//!
//! Nenhum argumento é obrigatório: as credenciais vêm do ambiente. As flags
//! só ajustam o arquivo de configuração, o diretório do clone, a política
//! de falha e o nível de log.

use std::path::PathBuf;

use clap::Parser;

/// Clona o Saltcord e aplica o estado do kotdis-bot via Salt API.
///
/// Requer SALTAPI_URL, SALTAPI_USER, SALTAPI_PASS e SALTAPI_EAUTH.
#[derive(Debug, Parser)]
#[command(name = "saltdeploy", version, about)]
pub struct Cli {
    /// Arquivo de configuração TOML (padrão: saltdeploy.toml, se existir).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Diretório onde o repositório é clonado (padrão: diretório atual).
    #[arg(long, value_name = "PATH")]
    pub workdir: Option<PathBuf>,

    /// Mantém o clone em disco quando uma etapa falha.
    #[arg(long, default_value_t = false)]
    pub keep_on_failure: bool,

    /// Habilita logs detalhados (debug).
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_runs_without_arguments() {
        let cli = Cli::parse_from(["saltdeploy"]);
        assert!(cli.config.is_none());
        assert!(cli.workdir.is_none());
        assert!(!cli.keep_on_failure);
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "saltdeploy",
            "--config",
            "deploy.toml",
            "--workdir",
            "/tmp/deploy",
            "--keep-on-failure",
            "-v",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("deploy.toml")));
        assert_eq!(cli.workdir, Some(PathBuf::from("/tmp/deploy")));
        assert!(cli.keep_on_failure);
        assert!(cli.verbose);
    }

    #[test]
    fn cli_rejects_positional_arguments() {
        assert!(Cli::try_parse_from(["saltdeploy", "shimmer.gserv.me"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
