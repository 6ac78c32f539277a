//! Best-effort run metadata: pull request, branch, commit, environment tag.
//!
//! Each source is a [`MetadataProvider`] returning `Option<String>`; the
//! first provider that knows a value wins. Nothing here ever fails a run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, warn};

/// Piece of run metadata a provider may know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    PullRequest,
    Branch,
    Commit,
    Environment,
}

impl std::fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataKey::PullRequest => write!(f, "pull request"),
            MetadataKey::Branch => write!(f, "branch"),
            MetadataKey::Commit => write!(f, "commit"),
            MetadataKey::Environment => write!(f, "environment"),
        }
    }
}

/// A source of run metadata (CI variables, version control, ...).
pub trait MetadataProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Look up one value. Must not panic; unknown or failed lookups are `None`.
    fn lookup(&self, key: MetadataKey) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Environment variables
// ---------------------------------------------------------------------------

/// Reads CI variables from a snapshot taken when the provider is built.
#[derive(Debug, Clone, Default)]
pub struct EnvProvider {
    vars: HashMap<String, String>,
}

impl EnvProvider {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    fn candidates(key: MetadataKey) -> &'static [&'static str] {
        match key {
            MetadataKey::PullRequest => &[
                "GITHUB_PR_NUMBER",
                "CI_PULL_REQUEST",
                "CHANGE_ID",
                "PULL_REQUEST_NUMBER",
            ],
            MetadataKey::Branch => &["GITHUB_REF_NAME", "CI_BRANCH"],
            MetadataKey::Commit => &["GITHUB_SHA", "CI_COMMIT_SHA"],
            MetadataKey::Environment => &["TESTLEDGER_ENV"],
        }
    }
}

impl MetadataProvider for EnvProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    fn lookup(&self, key: MetadataKey) -> Option<String> {
        Self::candidates(key).iter().find_map(|var| {
            self.vars
                .get(*var)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// Asks the local `git` binary for branch and commit.
#[derive(Debug, Clone, Default)]
pub struct GitProvider {
    repo_dir: Option<PathBuf>,
}

impl GitProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run git inside `dir` instead of the working directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: Some(dir.into()),
        }
    }

    fn rev_parse(&self, args: &[&str]) -> Option<String> {
        let mut cmd = Command::new("git");
        cmd.arg("rev-parse").args(args);
        if let Some(dir) = &self.repo_dir {
            cmd.current_dir(dir);
        }

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                debug!(error = %e, "git not available");
                return None;
            }
        };
        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git rev-parse failed"
            );
            return None;
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl MetadataProvider for GitProvider {
    fn name(&self) -> &'static str {
        "git"
    }

    fn lookup(&self, key: MetadataKey) -> Option<String> {
        match key {
            MetadataKey::Branch => self.rev_parse(&["--abbrev-ref", "HEAD"]),
            MetadataKey::Commit => self.rev_parse(&["HEAD"]),
            MetadataKey::PullRequest | MetadataKey::Environment => None,
        }
    }
}

/// Version control first, then CI variables captured from this process.
pub fn default_providers() -> Vec<Box<dyn MetadataProvider>> {
    vec![
        Box::new(GitProvider::new()),
        Box::new(EnvProvider::from_process()),
    ]
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Resolved metadata handed to the recorder when a run is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub pr: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub environment: Option<String>,
}

impl RunContext {
    /// Ask every provider in order; `default_environment` fills the
    /// environment tag when no provider knows it.
    pub fn collect(providers: &[Box<dyn MetadataProvider>], default_environment: &str) -> Self {
        let resolve = |key: MetadataKey| {
            providers.iter().find_map(|p| {
                let value = p.lookup(key)?;
                debug!(provider = p.name(), %key, %value, "resolved run metadata");
                Some(value)
            })
        };

        let pr = resolve(MetadataKey::PullRequest);
        let branch = resolve(MetadataKey::Branch);
        let commit = resolve(MetadataKey::Commit);
        let environment = resolve(MetadataKey::Environment).or_else(|| {
            let fallback = default_environment.trim();
            (!fallback.is_empty()).then(|| fallback.to_string())
        });

        if branch.is_none() {
            warn!("could not determine branch for this run");
        }
        if commit.is_none() {
            warn!("could not determine commit for this run");
        }

        Self {
            pr,
            branch,
            commit,
            environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, MetadataKey, &'static str);

    impl MetadataProvider for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn lookup(&self, key: MetadataKey) -> Option<String> {
            (key == self.1).then(|| self.2.to_string())
        }
    }

    #[test]
    fn test_env_provider_precedence() {
        let env = EnvProvider::from_pairs([
            ("CHANGE_ID", "17"),
            ("CI_PULL_REQUEST", "9"),
            ("GITHUB_PR_NUMBER", "  "),
            ("CI_BRANCH", "develop"),
        ]);
        assert_eq!(env.lookup(MetadataKey::PullRequest).as_deref(), Some("9"));
        assert_eq!(env.lookup(MetadataKey::Branch).as_deref(), Some("develop"));
        assert_eq!(env.lookup(MetadataKey::Commit), None);
    }

    #[test]
    fn test_first_provider_wins() {
        let providers: Vec<Box<dyn MetadataProvider>> = vec![
            Box::new(Fixed("vcs", MetadataKey::Branch, "main")),
            Box::new(EnvProvider::from_pairs([
                ("GITHUB_REF_NAME", "ci-branch"),
                ("GITHUB_SHA", "abc123"),
                ("TESTLEDGER_ENV", "staging"),
            ])),
        ];
        let ctx = RunContext::collect(&providers, "development");
        assert_eq!(ctx.branch.as_deref(), Some("main"));
        assert_eq!(ctx.commit.as_deref(), Some("abc123"));
        assert_eq!(ctx.environment.as_deref(), Some("staging"));
        assert_eq!(ctx.pr, None);
    }

    #[test]
    fn test_missing_metadata_degrades_to_defaults() {
        let ctx = RunContext::collect(&[], "development");
        assert_eq!(
            ctx,
            RunContext {
                environment: Some("development".into()),
                ..RunContext::default()
            }
        );
        assert_eq!(RunContext::collect(&[], "").environment, None);
    }

    #[test]
    fn test_git_outside_repository_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitProvider::in_dir(dir.path());
        assert_eq!(git.lookup(MetadataKey::PullRequest), None);
        // Either git is missing or the directory is not a repository.
        assert_eq!(git.lookup(MetadataKey::Commit), None);
    }
}
