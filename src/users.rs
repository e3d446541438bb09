//! User directory lookups (passwd)

use std::ffi::{CStr, CString};
use std::fmt;

/// A passwd entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Numeric id; `None` for a malformed entry
    pub uid: Option<u32>,
    pub name: String,
}

impl UserRecord {
    pub fn new(uid: u32, name: impl Into<String>) -> Self {
        Self {
            uid: Some(uid),
            name: name.into(),
        }
    }

    /// A record is usable only with both an id and a name
    pub fn is_well_formed(&self) -> bool {
        self.uid.is_some() && !self.name.is_empty()
    }
}

/// Lookup service for local users
pub trait UserDirectory: Send + Sync + fmt::Debug {
    fn by_name(&self, name: &str) -> Option<UserRecord>;

    fn by_id(&self, uid: u32) -> Option<UserRecord>;

    /// Name of a valid user id
    fn name_of(&self, uid: u32) -> Option<String> {
        self.by_id(uid)
            .filter(UserRecord::is_well_formed)
            .map(|record| record.name)
    }

    /// Id of a valid user name
    fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name(name)
            .filter(UserRecord::is_well_formed)
            .and_then(|record| record.uid)
    }
}

/// The system user database via `getpwnam_r`/`getpwuid_r`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUsers;

impl UserDirectory for SystemUsers {
    fn by_name(&self, name: &str) -> Option<UserRecord> {
        let c_name = CString::new(name).ok()?;
        // SAFETY: all pointers come from read_entry and stay valid for the call
        read_entry(|pwd, buf, len, result| unsafe {
            libc::getpwnam_r(c_name.as_ptr(), pwd, buf, len, result)
        })
    }

    fn by_id(&self, uid: u32) -> Option<UserRecord> {
        // SAFETY: all pointers come from read_entry and stay valid for the call
        read_entry(|pwd, buf, len, result| unsafe { libc::getpwuid_r(uid, pwd, buf, len, result) })
    }
}

const MAX_BUFFER: usize = 1 << 20;

/// Call a reentrant passwd lookup, growing the buffer on ERANGE
fn read_entry<F>(lookup: F) -> Option<UserRecord>
where
    F: Fn(*mut libc::passwd, *mut libc::c_char, libc::size_t, *mut *mut libc::passwd) -> libc::c_int,
{
    use std::mem::MaybeUninit;

    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = lookup(pwd.as_mut_ptr(), buf.as_mut_ptr(), buf.len(), &mut result);
        if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }

        // SAFETY: a non-null result means pwd was filled in and its strings point into buf
        let record = unsafe {
            let pwd = pwd.assume_init();
            UserRecord {
                uid: Some(pwd.pw_uid),
                name: CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned(),
            }
        };
        return Some(record);
    }
}

/// Fixed in-memory directory for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticUsers(pub Vec<UserRecord>);

#[cfg(test)]
impl UserDirectory for StaticUsers {
    fn by_name(&self, name: &str) -> Option<UserRecord> {
        self.0.iter().find(|r| r.name == name).cloned()
    }

    fn by_id(&self, uid: u32) -> Option<UserRecord> {
        self.0.iter().find(|r| r.uid == Some(uid)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_users_resolve_root() {
        let users = SystemUsers;
        assert_eq!(users.name_of(0).as_deref(), Some("root"));
        assert_eq!(users.id_of("root"), Some(0));
    }

    #[test]
    fn unknown_user_is_none() {
        let users = SystemUsers;
        assert_eq!(users.id_of("no-such-user-stagehand-test"), None);
        assert!(users.by_name("bad\0name").is_none());
    }

    #[test]
    fn malformed_records_are_rejected() {
        let users = StaticUsers(vec![
            UserRecord {
                uid: None,
                name: "ghost".into(),
            },
            UserRecord::new(1001, ""),
        ]);
        assert_eq!(users.id_of("ghost"), None);
        assert_eq!(users.name_of(1001), None);
    }
}
