use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, Credentials, FileConfig, Timeouts};
use crate::error::{DeployError, Stage};
use crate::git::{CLONE_DIR, ClonedRepo, REPO_URL, RepoFetcher, remove_clone_dir};
use crate::salt::{SaltApi, SaltClient, SaltError};
use crate::ui::Reporter;

/// Minion the state is applied to. Fixed for every run.
pub const TARGET_HOST: &str = "shimmer.gserv.me";
/// State applied to [`TARGET_HOST`]. Fixed for every run.
pub const TARGET_STATE: &str = "docker/kotdis-bot";

/// How long an abandoned clone gets to notice the abort before its
/// directory is removed.
const CLONE_ABORT_GRACE: Duration = Duration::from_secs(5);

/// A validated deployment plan: everything a run needs, checked up front.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub credentials: Credentials,
    pub timeouts: Timeouts,
    /// Keep the clone on disk when a stage fails.
    pub keep_on_failure: bool,
    /// Parent directory of the clone.
    pub workdir: PathBuf,
    pub repo_url: String,
}

impl Deployment {
    /// Validate the environment (through `lookup`) and combine it with the file config.
    pub fn from_lookup<F>(lookup: F, file: FileConfig, workdir: PathBuf) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let credentials = Credentials::from_lookup(lookup)?;
        Ok(Self {
            credentials,
            timeouts: file.timeouts,
            keep_on_failure: file.keep_on_failure,
            workdir,
            repo_url: REPO_URL.to_string(),
        })
    }

    pub fn clone_path(&self) -> PathBuf {
        self.workdir.join(CLONE_DIR)
    }

    /// Build the production Salt API client for these credentials.
    pub fn client(&self) -> SaltClient {
        let c = &self.credentials;
        SaltClient::new(c.user.clone(), c.password.clone(), c.url.clone(), c.eauth)
            .with_connect_timeout(self.timeouts.connect())
    }

    /// Run the pipeline: clone, set up, log in, apply, tear down, clean up.
    ///
    /// Returns the job id of the state run. The clone is removed on every
    /// exit path unless `keep_on_failure` is set and a stage failed.
    pub async fn run<F, S, M, R>(
        &self,
        fetcher: F,
        make_client: M,
        reporter: &mut R,
        cancel: &CancellationToken,
    ) -> Result<String, DeployError>
    where
        F: RepoFetcher + Send + 'static,
        S: SaltApi,
        M: FnOnce(&Deployment) -> S,
        R: Reporter,
    {
        reporter.stage("=> Cloning repo");
        let repo = self.acquire(fetcher, cancel).await?;
        debug!(
            path = %repo.path().display(),
            head = %repo.info().head,
            branch = ?repo.info().branch,
            "repository cloned"
        );

        reporter.stage("=> Setting up Salt API");
        let mut client = make_client(self);
        let outcome = self.session(&mut client, reporter, cancel).await;

        match &outcome {
            Err(e) if self.keep_on_failure => {
                let path = repo.keep();
                warn!(path = %path.display(), error = %e, "keeping clone directory after failure");
            }
            _ => {
                reporter.stage("=> Removing cloned repo");
                repo.remove();
            }
        }
        outcome
    }

    /// Clone on a blocking thread, bounded by the clone timeout and `cancel`.
    async fn acquire<F>(
        &self,
        fetcher: F,
        cancel: &CancellationToken,
    ) -> Result<ClonedRepo, DeployError>
    where
        F: RepoFetcher + Send + 'static,
    {
        let dest = self.clone_path();
        // libgit2 clones into an existing empty directory, which the guard
        // would then delete.
        if dest.exists() {
            return Err(DeployError::CloneDirExists(dest));
        }

        let url = self.repo_url.clone();
        let target = dest.clone();
        let abort = cancel.child_token();
        let fetch_abort = abort.clone();
        let mut task =
            tokio::task::spawn_blocking(move || fetcher.fetch(&url, &target, &fetch_abort));

        let limit = self.timeouts.git_clone();
        let stopped = tokio::select! {
            biased;
            _ = cancel.cancelled() => DeployError::Cancelled { stage: Stage::Clone },
            _ = tokio::time::sleep(limit) => DeployError::Timeout {
                stage: Stage::Clone,
                secs: limit.as_secs(),
            },
            joined = &mut task => {
                return match joined? {
                    Ok(info) => Ok(ClonedRepo::new(dest, info)),
                    Err(source) => Err(DeployError::Clone {
                        url: self.repo_url.clone(),
                        source,
                    }),
                };
            }
        };

        abort.cancel();
        warn!(error = %stopped, "abandoning clone");
        if tokio::time::timeout(CLONE_ABORT_GRACE, task).await.is_err() {
            warn!(path = %dest.display(), "clone thread still running after abort");
        }
        remove_clone_dir(&dest);
        Err(stopped)
    }

    async fn session<S, R>(
        &self,
        client: &mut S,
        reporter: &mut R,
        cancel: &CancellationToken,
    ) -> Result<String, DeployError>
    where
        S: SaltApi,
        R: Reporter,
    {
        bounded(Stage::Setup, self.timeouts.connect(), cancel, client.setup()).await?;

        let result = self.login_and_apply(client, reporter, cancel).await;

        // Logout still runs after a failed login or apply, and after Ctrl-C.
        reporter.waiting("closing Salt session");
        let teardown = bounded(
            Stage::Teardown,
            self.timeouts.teardown(),
            &CancellationToken::new(),
            client.teardown(),
        )
        .await;
        reporter.done_waiting();
        if let Err(e) = teardown {
            warn!(error = %e, "salt teardown failed");
        }

        result
    }

    async fn login_and_apply<S, R>(
        &self,
        client: &mut S,
        reporter: &mut R,
        cancel: &CancellationToken,
    ) -> Result<String, DeployError>
    where
        S: SaltApi,
        R: Reporter,
    {
        reporter.stage("=> Logging into Salt");
        reporter.waiting(&format!("authenticating as {}", self.credentials.user));
        bounded(Stage::Login, self.timeouts.login(), cancel, client.login()).await?;
        reporter.done_waiting();

        reporter.stage("=> Applying state");
        reporter.waiting(&format!("{TARGET_STATE} on {TARGET_HOST}"));
        let job = bounded(
            Stage::Apply,
            self.timeouts.apply(),
            cancel,
            client.apply_state(TARGET_HOST, TARGET_STATE),
        )
        .await?;
        reporter.done_waiting();

        // apply_state only succeeds with a jid in the first record.
        let jid = job.jid().unwrap_or_default().to_string();
        info!(jid = %jid, minions = ?job.minions(), "state applied");
        reporter.job_id(&jid);
        Ok(jid)
    }
}

/// Drive one Salt call under a timeout, aborting early if `cancel` fires.
async fn bounded<T, Fut>(
    stage: Stage,
    limit: Duration,
    cancel: &CancellationToken,
    call: Fut,
) -> Result<T, DeployError>
where
    Fut: Future<Output = Result<T, SaltError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeployError::Cancelled { stage }),
        res = tokio::time::timeout(limit, call) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(DeployError::Salt { stage, source }),
            Err(_) => Err(DeployError::Timeout { stage, secs: limit.as_secs() }),
        },
    }
}

/// Validate configuration, then run. Nothing touches the network or the
/// filesystem when validation fails.
pub async fn run_from_lookup<L, F, S, M, R>(
    lookup: L,
    file: FileConfig,
    workdir: &Path,
    fetcher: F,
    make_client: M,
    reporter: &mut R,
    cancel: &CancellationToken,
) -> Result<String, DeployError>
where
    L: Fn(&str) -> Option<OsString>,
    F: RepoFetcher + Send + 'static,
    S: SaltApi,
    M: FnOnce(&Deployment) -> S,
    R: Reporter,
{
    let deployment = Deployment::from_lookup(lookup, file, workdir.to_path_buf())?;
    deployment.run(fetcher, make_client, reporter, cancel).await
}
