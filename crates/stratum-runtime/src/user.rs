//! `/etc/passwd` and `/etc/group` parsing and `user[:group]` resolution.

use crate::SynthesisError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

/// The identity a container process runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecUser {
    pub uid: u32,
    pub gid: u32,
    pub additional_gids: Vec<u32>,
    pub home: String,
}

impl Default for ExecUser {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            additional_gids: Vec::new(),
            home: "/".to_owned(),
        }
    }
}

/// Parse passwd content. Comments, blank lines and malformed lines are skipped.
pub fn parse_passwd(content: &str) -> Vec<PasswdEntry> {
    content
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 6 {
                return None;
            }
            Some(PasswdEntry {
                name: fields[0].to_owned(),
                uid: fields[2].parse().ok()?,
                gid: fields[3].parse().ok()?,
                home: fields[5].to_owned(),
            })
        })
        .collect()
}

/// Parse group content. Comments, blank lines and malformed lines are skipped.
pub fn parse_group(content: &str) -> Vec<GroupEntry> {
    content
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 4 {
                return None;
            }
            Some(GroupEntry {
                name: fields[0].to_owned(),
                gid: fields[2].parse().ok()?,
                members: fields[3]
                    .split(',')
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned)
                    .collect(),
            })
        })
        .collect()
}

/// Resolve an image `User` value (`user`, `uid`, `user:group`, `uid:gid`, ...).
///
/// Names can only be resolved through the given databases. A user found in
/// `passwd` contributes its primary gid and home. Without an explicit group,
/// supplementary groups are every `group` entry listing the user as a member.
/// An empty value means root.
pub fn resolve_exec_user(
    spec: &str,
    passwd: Option<&[PasswdEntry]>,
    groups: Option<&[GroupEntry]>,
) -> Result<ExecUser, SynthesisError> {
    let (user_arg, group_arg) = match spec.split_once(':') {
        Some((u, g)) => (u, Some(g)),
        None => (spec, None),
    };
    let user_arg = if user_arg.is_empty() { "0" } else { user_arg };

    let mut exec = ExecUser::default();
    let numeric_uid: Option<u32> = user_arg.parse().ok();

    let matched = passwd.and_then(|entries| {
        entries
            .iter()
            .find(|e| e.name == user_arg || Some(e.uid) == numeric_uid)
    });

    match (matched, numeric_uid) {
        (Some(entry), _) => {
            exec.uid = entry.uid;
            exec.gid = entry.gid;
            exec.home = entry.home.clone();
        }
        (None, Some(uid)) => exec.uid = uid,
        (None, None) if passwd.is_none() => {
            return Err(SynthesisError::UnresolvableUser(format!(
                "user name '{user_arg}' needs a root filesystem with /etc/passwd"
            )));
        }
        (None, None) => {
            return Err(SynthesisError::UnresolvableUser(format!(
                "no user '{user_arg}' in /etc/passwd"
            )));
        }
    }

    match group_arg {
        Some(group_arg) => {
            exec.gid = resolve_group(group_arg, groups)?;
        }
        None => {
            // Supplementary groups are only gathered for a user given by name.
            let by_name = matched.filter(|e| e.name == user_arg);
            if let (Some(entry), Some(groups)) = (by_name, groups) {
                for g in groups.iter().filter(|g| g.members.contains(&entry.name)) {
                    if !exec.additional_gids.contains(&g.gid) {
                        exec.additional_gids.push(g.gid);
                    }
                }
            }
        }
    }

    Ok(exec)
}

fn resolve_group(group_arg: &str, groups: Option<&[GroupEntry]>) -> Result<u32, SynthesisError> {
    if group_arg.is_empty() {
        return Err(SynthesisError::UnresolvableUser(
            "empty group after ':'".to_owned(),
        ));
    }
    let numeric: Option<u32> = group_arg.parse().ok();
    let found = groups.and_then(|entries| {
        entries
            .iter()
            .find(|g| g.name == group_arg || Some(g.gid) == numeric)
    });
    match (found, numeric) {
        (Some(g), _) => Ok(g.gid),
        (None, Some(gid)) => Ok(gid),
        (None, None) if groups.is_none() => Err(SynthesisError::UnresolvableUser(format!(
            "group name '{group_arg}' needs a root filesystem with /etc/group"
        ))),
        (None, None) => Err(SynthesisError::UnresolvableUser(format!(
            "no group '{group_arg}' in /etc/group"
        ))),
    }
}
