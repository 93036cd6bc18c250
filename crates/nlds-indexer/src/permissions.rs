use std::ffi::CString;
use std::os::unix::fs::MetadataExt;

use crate::error::Error;

/// The caller's resolved identity for a permission check: their uid plus
/// the union of primary and supplementary gids, per spec §4.3 ("the
/// requesting user's uid and the union of primary and supplementary gids
/// as resolved from the host's name service").
#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: u32,
    pub gids: Vec<u32>,
}

impl Identity {
    /// Resolves `username`'s uid and full group set via the host's name
    /// service (NSS), the same lookup `id <user>` performs.
    pub fn resolve(username: &str) -> Result<Self, Error> {
        let user = nix::unistd::User::from_name(username)
            .map_err(|_| Error::UnknownUser(username.to_string()))?
            .ok_or_else(|| Error::UnknownUser(username.to_string()))?;

        let mut gids = resolve_supplementary_gids(username, user.gid.as_raw())?;
        if !gids.contains(&user.gid.as_raw()) {
            gids.push(user.gid.as_raw());
        }

        Ok(Self {
            uid: user.uid.as_raw(),
            gids,
        })
    }
}

/// Wraps `getgrouplist(3)`: nix has no safe binding for it, so this talks
/// to libc directly. Retries once with a larger buffer if the initial
/// guess of 64 groups isn't enough.
fn resolve_supplementary_gids(username: &str, primary_gid: u32) -> Result<Vec<u32>, Error> {
    let c_username = CString::new(username).map_err(|_| Error::UnknownUser(username.to_string()))?;

    let mut ngroups: libc::c_int = 64;
    loop {
        let mut groups: Vec<libc::gid_t> = vec![0; ngroups as usize];
        let rc = unsafe {
            libc::getgrouplist(
                c_username.as_ptr(),
                primary_gid as libc::gid_t,
                groups.as_mut_ptr(),
                &mut ngroups,
            )
        };

        if rc >= 0 {
            groups.truncate(ngroups as usize);
            return Ok(groups.into_iter().map(|g| g as u32).collect());
        }
        // rc == -1: ngroups was updated with the actual count required.
        if ngroups as usize > 4096 {
            return Err(Error::UnknownUser(username.to_string()));
        }
    }
}

/// Whether `identity` can read a file with the given owner/group/mode, per
/// the standard owner/group/other permission bit precedence.
pub fn can_read(metadata: &std::fs::Metadata, identity: &Identity) -> bool {
    let mode = metadata.mode();
    if metadata.uid() == identity.uid {
        return mode & 0o400 != 0;
    }
    if identity.gids.contains(&metadata.gid()) {
        return mode & 0o040 != 0;
    }
    mode & 0o004 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_read_bit_grants_access_to_the_owning_uid() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(tmp.path(), std::os::unix::fs::PermissionsExt::from_mode(0o600))
            .unwrap();
        let metadata = tmp.path().metadata().unwrap();
        let identity = Identity {
            uid: metadata.uid(),
            gids: vec![metadata.gid()],
        };
        assert!(can_read(&metadata, &identity));
    }

    #[test]
    fn owner_only_file_denies_an_unrelated_identity() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(tmp.path(), std::os::unix::fs::PermissionsExt::from_mode(0o600))
            .unwrap();
        let metadata = tmp.path().metadata().unwrap();
        let identity = Identity {
            uid: metadata.uid() + 1,
            gids: vec![metadata.gid() + 1],
        };
        assert!(!can_read(&metadata, &identity));
    }

    #[test]
    fn world_readable_file_is_readable_by_anyone() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(tmp.path(), std::os::unix::fs::PermissionsExt::from_mode(0o644))
            .unwrap();
        let metadata = tmp.path().metadata().unwrap();
        let identity = Identity {
            uid: 999999,
            gids: vec![999999],
        };
        assert!(can_read(&metadata, &identity));
    }
}
