//! Aquisição do repositório de automação via libgit2.
//!
//! O [`RepoFetcher`] clona o repositório; o [`ClonedRepo`] é o guarda que
//! possui o diretório clonado e o remove ao sair de escopo, em qualquer
//! caminho de saída, a menos que tenha sido marcado para ser mantido.

use std::io;
use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Repositório de automação clonado a cada execução.
pub const REPO_URL: &str = "https://gitlab.com/gserv.me/Saltcord.git";

/// Nome do diretório do clone, relativo ao diretório de trabalho.
pub const CLONE_DIR: &str = "Saltcord";

/// Revisão que o clone deixou em HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneInfo {
    /// Hash curto (7 caracteres) do commit em HEAD.
    pub head: String,
    /// Nome da branch em HEAD, se houver.
    pub branch: Option<String>,
}

/// Clona um repositório remoto em um caminho local.
///
/// Roda em uma thread bloqueante; `abort` é cancelado quando a execução é
/// interrompida ou o timeout do clone expira, e a implementação deve parar
/// assim que possível.
pub trait RepoFetcher {
    /// Falha se `dest` já existir e não estiver vazio.
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        abort: &CancellationToken,
    ) -> Result<CloneInfo, git2::Error>;
}

/// Implementação de produção usando o `RepoBuilder` do libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

impl RepoFetcher for GitFetcher {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        abort: &CancellationToken,
    ) -> Result<CloneInfo, git2::Error> {
        // Retornar false do callback faz o libgit2 abortar a transferência.
        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|_| !abort.is_cancelled());
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks);

        let repo = RepoBuilder::new().fetch_options(fetch).clone(url, dest)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        let short = commit.id().to_string()[..7].to_string();
        Ok(CloneInfo {
            head: short,
            branch: head.shorthand().map(str::to_string),
        })
    }
}

/// Remove o diretório do clone, ignorando um diretório inexistente.
///
/// Outros erros são registrados e engolidos: a remoção nunca derruba a execução.
pub fn remove_clone_dir(path: &Path) -> bool {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed clone directory");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove clone directory");
            false
        }
    }
}

/// Guarda de escopo para o diretório clonado.
///
/// Só existe depois de um clone bem-sucedido, então nunca remove um
/// diretório que já existia antes da execução.
#[derive(Debug)]
pub struct ClonedRepo {
    path: PathBuf,
    info: CloneInfo,
    armed: bool,
}

impl ClonedRepo {
    pub fn new(path: PathBuf, info: CloneInfo) -> Self {
        Self {
            path,
            info,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &CloneInfo {
        &self.info
    }

    /// Desarma o guarda: o diretório fica em disco após o drop.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Remove o diretório agora e desarma o guarda.
    pub fn remove(mut self) -> bool {
        self.armed = false;
        remove_clone_dir(&self.path)
    }
}

impl Drop for ClonedRepo {
    fn drop(&mut self) {
        if self.armed {
            remove_clone_dir(&self.path);
        }
    }
}
