//! Mapping between the host's view of storage and the worker's local
//! mounts.
//!
//! The host names every directory in its own namespace; the worker sees the
//! same storage under a different root. Both roots are fixed for the
//! process lifetime and every translation is a pure prefix substitution on
//! the path string, with no normalization and no symlink resolution.

use std::env;

use thiserror::Error;

/// Environment variable naming the host-visible root directory.
pub const HOSTER_ROOT_ENV: &str = "HOSTER_ROOT";

/// Environment variable naming the worker-local root directory.
pub const WORKER_ROOT_ENV: &str = "WORKER_ROOT";

/// Errors from configuration and path translation.
#[derive(Debug, Error)]
pub enum RemapError {
    /// A required root directory variable is absent.
    #[error("missing env var: {0}")]
    MissingEnv(&'static str),
    /// The path does not live under the configured host root.
    #[error("path '{path}' does not start with {HOSTER_ROOT_ENV}='{root}'")]
    Unmapped {
        /// The host path that failed to translate.
        path: String,
        /// The configured host root.
        root: String,
    },
}

/// Fixed host-root/worker-root pair, read once at process start.
#[derive(Debug, Clone)]
pub struct DirMapping {
    hoster_root: String,
    worker_root: String,
}

impl DirMapping {
    /// Build a mapping from explicit roots.
    ///
    /// A trailing path separator is appended to either root if missing, so
    /// translation never splices two path components together.
    pub fn new(hoster_root: impl Into<String>, worker_root: impl Into<String>) -> Self {
        Self {
            hoster_root: with_trailing_slash(hoster_root.into()),
            worker_root: with_trailing_slash(worker_root.into()),
        }
    }

    /// Read both roots from the environment.
    ///
    /// Absence of either is fatal before any request is read.
    pub fn from_env() -> Result<Self, RemapError> {
        let hoster =
            env::var(HOSTER_ROOT_ENV).map_err(|_| RemapError::MissingEnv(HOSTER_ROOT_ENV))?;
        let worker =
            env::var(WORKER_ROOT_ENV).map_err(|_| RemapError::MissingEnv(WORKER_ROOT_ENV))?;
        Ok(Self::new(hoster, worker))
    }

    /// Map a host-visible directory to its worker-local mount.
    pub fn translate(&self, hoster_path: &str) -> Result<String, RemapError> {
        match hoster_path.strip_prefix(&self.hoster_root) {
            Some(suffix) => Ok(format!("{}{}", self.worker_root, suffix)),
            None => Err(RemapError::Unmapped {
                path: hoster_path.to_string(),
                root: self.hoster_root.clone(),
            }),
        }
    }

    /// Derive the job-private output directory: the translated
    /// column-family directory with a zero-padded job-id suffix.
    ///
    /// Distinct job ids always yield distinct directories, so concurrent
    /// jobs against the same family never collide.
    pub fn output_dir(&self, cf_dir: &str, job_id: u32) -> Result<String, RemapError> {
        Ok(format!("{}/job-{:08}", self.translate(cf_dir)?, job_id))
    }
}

fn with_trailing_slash(mut dir: String) -> String {
    if !dir.is_empty() && !dir.ends_with('/') {
        dir.push('/');
    }
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_is_prefix_substitution() {
        let mapping = DirMapping::new("/mnt/host/", "/mnt/worker/");
        for suffix in ["db", "db/cf0", "a/./b/../c", "deep/nested/dir"] {
            assert_eq!(
                mapping.translate(&format!("/mnt/host/{suffix}")).unwrap(),
                format!("/mnt/worker/{suffix}")
            );
        }
    }

    #[test]
    fn translate_rejects_unmapped_paths() {
        let mapping = DirMapping::new("/mnt/host", "/mnt/worker");
        let err = mapping.translate("/elsewhere/db").unwrap_err();
        assert!(matches!(err, RemapError::Unmapped { .. }));
        // The host root itself (without separator) is not under the root.
        assert!(mapping.translate("/mnt/host").is_err());
    }

    #[test]
    fn roots_gain_trailing_separator() {
        let bare = DirMapping::new("/mnt/host", "/mnt/worker");
        let slashed = DirMapping::new("/mnt/host/", "/mnt/worker/");
        assert_eq!(
            bare.translate("/mnt/host/db").unwrap(),
            slashed.translate("/mnt/host/db").unwrap()
        );
    }

    #[test]
    fn output_dir_is_injective_in_job_id() {
        let mapping = DirMapping::new("/mnt/host", "/mnt/worker");
        let first = mapping.output_dir("/mnt/host/db/cf0", 1).unwrap();
        let second = mapping.output_dir("/mnt/host/db/cf0", 2).unwrap();
        assert_eq!(first, "/mnt/worker/db/cf0/job-00000001");
        assert_eq!(second, "/mnt/worker/db/cf0/job-00000002");
        assert_ne!(first, second);
    }

    #[test]
    fn from_env_requires_both_roots() {
        env::remove_var(HOSTER_ROOT_ENV);
        env::remove_var(WORKER_ROOT_ENV);
        let err = DirMapping::from_env().unwrap_err();
        assert!(matches!(err, RemapError::MissingEnv(_)));
    }
}
