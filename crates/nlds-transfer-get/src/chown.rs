use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};

use crate::error::Error;

/// Restores ownership on a transferred file, per spec §4.6: "ownership
/// restoration may require a privileged helper if the running process
/// cannot `chown` directly — model this as an injected capability with a
/// boolean enable flag and an executable name."
///
/// When disabled, `nlds-transfer-get` attempts the `chown(2)` syscall
/// directly, which only succeeds if the worker itself runs with
/// `CAP_CHOWN` (e.g. as root). When enabled, ownership changes are
/// delegated to a separate setuid helper binary, located the same way
/// connector subprocesses are in this codebase's agent-style tooling.
#[derive(Clone)]
pub struct Chowner {
    helper: Option<PathBuf>,
}

impl Chowner {
    pub fn direct() -> Self {
        Self { helper: None }
    }

    pub fn via_helper(helper_name: &str) -> Result<Self, Error> {
        let helper = locate_bin::locate(helper_name).map_err(Error::ChownHelper)?;
        Ok(Self { helper: Some(helper) })
    }

    pub async fn chown(&self, path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
        match &self.helper {
            Some(helper) => self.chown_via_helper(helper, path, uid, gid).await,
            None => nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
                .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32)),
        }
    }

    async fn chown_via_helper(&self, helper: &Path, path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
        let mut cmd = async_process::Command::new(helper);
        cmd.arg(uid.to_string()).arg(gid.to_string()).arg(path);

        let child: async_process::Child = cmd
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?
            .into();

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("chown helper exited with {status}"),
            ))
        }
    }
}
