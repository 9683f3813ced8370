//! Numeric id to name resolution against the host's name service.

use std::ffi::CStr;

/// Resolves uids and gids to names. The system implementation asks the
/// host's name service; tests substitute a fixed table. Implementations
/// may block on I/O and are therefore always invoked outside the
/// identity-cache lock.
pub trait IdentityResolver: Send + Sync {
    /// `None` when the id is unknown to the name service.
    fn user_name(&self, uid: u32) -> Option<String>;
    fn group_name(&self, gid: u32) -> Option<String>;
}

/// Name-service lookups via `getpwuid_r` / `getgrgid_r`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentityResolver;

impl IdentityResolver for SystemIdentityResolver {
    fn user_name(&self, uid: u32) -> Option<String> {
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf = [0u8; 4096];
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwuid_r(
                uid as libc::uid_t,
                &mut pwd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut result,
            )
        };
        if rc != 0 || result.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        name.to_str().ok().map(str::to_string)
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut buf = [0u8; 4096];
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = unsafe {
            libc::getgrgid_r(
                gid as libc::gid_t,
                &mut grp,
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut result,
            )
        };
        if rc != 0 || result.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(grp.gr_name) };
        name.to_str().ok().map(str::to_string)
    }
}
