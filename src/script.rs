//! Remote script generation.
//!
//! Renders the small shell script that runs on the target host: ensure
//! `~user/.ssh` and `authorized_keys` exist, append (or filter out) the
//! public key, and delete itself as its last statement. The append is
//! guarded by an occurrence count of the trimmed key text, so running
//! the script any number of times never duplicates the key.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

/// Whether a run installs or removes the public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Add,
    Delete,
}

impl KeyAction {
    /// Short tag used in the per-host report.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAction::Add => "ADD",
            KeyAction::Delete => "DEL",
        }
    }
}

/// A rendered remote script, staged locally and addressed remotely.
///
/// Created fresh per transfer attempt. Both paths share a random numeric
/// suffix so overlapping runs cannot collide. The remote file is removed
/// by the script's own final statement (best effort: a mid-script failure
/// leaves it behind, which is harmless because re-running is safe).
#[derive(Debug)]
pub struct RemoteScript {
    /// Local staging location, under the system temp directory.
    pub local_path: PathBuf,

    /// Fixed remote staging location under /tmp.
    pub remote_path: String,

    /// Rendered shell source.
    pub content: String,
}

impl RemoteScript {
    /// Render the script that idempotently appends `public_key` to
    /// `~user/.ssh/authorized_keys`.
    pub fn for_adding(public_key: &str, user: &str) -> Self {
        let (local_path, remote_path) = staging_paths();
        let key = public_key.trim();
        let content = format!(
            r#"mkdir -p ~{user}/.ssh

touch ~{user}/.ssh/authorized_keys

COUNT=`cat ~{user}/.ssh/authorized_keys | grep -i '{key}' | wc -l`

if [ "$COUNT" -eq 0 ]; then
  printf '\n{key}\n' >> ~{user}/.ssh/authorized_keys
fi

rm {remote_path}
"#
        );

        Self {
            local_path,
            remote_path,
            content,
        }
    }

    /// Render the inverse script: filter `public_key` out of
    /// `~user/.ssh/authorized_keys`. Same directory and file guarantees,
    /// same self-deletion as the last statement.
    pub fn for_deleting(public_key: &str, user: &str) -> Self {
        let (local_path, remote_path) = staging_paths();
        let key = public_key.trim();
        let content = format!(
            r#"mkdir -p ~{user}/.ssh

touch ~{user}/.ssh/authorized_keys

grep -v -F '{key}' ~{user}/.ssh/authorized_keys > {remote_path}.keep
mv {remote_path}.keep ~{user}/.ssh/authorized_keys

rm {remote_path}
"#
        );

        Self {
            local_path,
            remote_path,
            content,
        }
    }

    /// Render for the given action.
    pub fn for_action(action: KeyAction, public_key: &str, user: &str) -> Self {
        match action {
            KeyAction::Add => Self::for_adding(public_key, user),
            KeyAction::Delete => Self::for_deleting(public_key, user),
        }
    }

    /// File name shared by the local and remote staging paths.
    pub fn base_name(&self) -> &str {
        self.remote_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.remote_path)
    }

    /// Write the script to its local staging path.
    ///
    /// The returned guard removes the local file when dropped, on every
    /// exit path of the transfer attempt.
    pub fn stage(&self) -> std::io::Result<StagedScript> {
        fs::write(&self.local_path, &self.content)?;
        Ok(StagedScript {
            path: self.local_path.clone(),
        })
    }
}

/// Drop guard for the locally staged script file.
#[derive(Debug)]
pub struct StagedScript {
    path: PathBuf,
}

impl StagedScript {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedScript {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("removing staged script '{}': {}", self.path.display(), e);
        }
    }
}

/// Pick matching local and remote staging paths with a fresh random
/// suffix.
fn staging_paths() -> (PathBuf, String) {
    let base_name = format!("ssh-script.{}", rand::random::<u64>());
    let local_path = std::env::temp_dir().join(&base_name);
    let remote_path = format!("/tmp/{}", base_name);
    (local_path, remote_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIJx9 test@example\n";

    #[test]
    fn test_add_script_contains_user_and_key() {
        let script = RemoteScript::for_adding(KEY, "icke");
        assert!(script.content.contains("~icke/.ssh/authorized_keys"));
        assert!(script.content.contains(KEY.trim()));
        // the key is appended with a leading newline
        assert!(script.content.contains("printf '\\n"));
    }

    #[test]
    fn test_add_script_is_guarded_by_count() {
        let script = RemoteScript::for_adding(KEY, "root");
        let guard = script
            .content
            .find("COUNT=")
            .expect("count guard missing");
        let append = script
            .content
            .find(">> ~root/.ssh/authorized_keys")
            .expect("append missing");
        assert!(guard < append, "append must be behind the count guard");
        assert!(script.content.contains(r#"if [ "$COUNT" -eq 0 ]"#));
    }

    #[test]
    fn test_delete_script_filters_key() {
        let script = RemoteScript::for_deleting(KEY, "root");
        assert!(script.content.contains("grep -v -F"));
        assert!(!script.content.contains(">> ~root/.ssh/authorized_keys"));
    }

    #[test]
    fn test_self_delete_is_last_statement() {
        for script in [
            RemoteScript::for_adding(KEY, "root"),
            RemoteScript::for_deleting(KEY, "root"),
        ] {
            let last = script.content.trim_end().lines().last().unwrap();
            assert_eq!(last, format!("rm {}", script.remote_path));
        }
    }

    #[test]
    fn test_paths_share_random_suffix() {
        let a = RemoteScript::for_adding(KEY, "root");
        let b = RemoteScript::for_adding(KEY, "root");

        assert_eq!(
            a.local_path.file_name().unwrap().to_str().unwrap(),
            a.base_name()
        );
        assert!(a.remote_path.starts_with("/tmp/ssh-script."));
        assert_ne!(a.remote_path, b.remote_path);
    }

    #[test]
    fn test_stage_writes_and_drop_cleans_up() {
        let script = RemoteScript::for_adding(KEY, "root");
        let staged = script.stage().unwrap();
        assert_eq!(fs::read_to_string(staged.path()).unwrap(), script.content);

        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }
}
