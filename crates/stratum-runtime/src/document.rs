//! The OCI runtime configuration document and its default Linux template.
//!
//! Field order in these structs is the serialization order, and annotations
//! live in a `BTreeMap`, so a given document always serializes to the same
//! bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stratum_schema::{IdMapping, MapOptions};

pub const OCI_RUNTIME_VERSION: &str = "1.0.2";

pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const DEFAULT_HOSTNAME: &str = "stratum";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub oci_version: String,
    pub process: Process,
    pub root: Root,
    pub hostname: String,
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub linux: Linux,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub terminal: bool,
    pub user: RuntimeUser,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
    pub capabilities: Capabilities,
    pub rlimits: Vec<Rlimit>,
    pub no_new_privileges: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeUser {
    pub uid: u32,
    pub gid: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_gids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub bounding: Vec<String>,
    pub effective: Vec<String>,
    pub permitted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rlimit {
    #[serde(rename = "type")]
    pub kind: String,
    pub hard: u64,
    pub soft: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub path: String,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Mount {
    fn new(destination: &str, kind: &str, source: &str, options: &[&str]) -> Self {
        Self {
            destination: destination.to_owned(),
            kind: kind.to_owned(),
            source: source.to_owned(),
            options: options.iter().map(|o| (*o).to_owned()).collect(),
        }
    }

    /// Mount a fresh tmpfs at `destination`, as done for image volumes.
    pub fn volume(destination: &str) -> Self {
        Self::new(
            destination,
            "tmpfs",
            "none",
            &["rw", "nosuid", "nodev", "noexec", "relatime"],
        )
    }

    /// Numeric value of an `<key>=<n>` option such as `uid=0` or `gid=5`.
    pub fn id_option(&self, key: &str) -> Option<u32> {
        self.options.iter().find_map(|o| {
            o.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .and_then(|n| n.parse().ok())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uid_mappings: Vec<IdMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gid_mappings: Vec<IdMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    pub namespaces: Vec<Namespace>,
    pub masked_paths: Vec<String>,
    pub readonly_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub devices: Vec<DeviceRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRule {
    pub allow: bool,
    pub access: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Pid,
    Network,
    Ipc,
    Uts,
    Mount,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(rename = "type")]
    pub kind: NamespaceKind,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl RuntimeConfig {
    /// The default Linux template: a non-terminal `sh` as root inside fresh
    /// pid, network, ipc, uts and mount namespaces.
    pub fn linux_default() -> Self {
        let caps = strings(&["CAP_AUDIT_WRITE", "CAP_KILL", "CAP_NET_BIND_SERVICE"]);
        Self {
            oci_version: OCI_RUNTIME_VERSION.to_owned(),
            process: Process {
                terminal: false,
                user: RuntimeUser {
                    uid: 0,
                    gid: 0,
                    additional_gids: Vec::new(),
                },
                args: strings(&["sh"]),
                env: vec![format!("PATH={DEFAULT_PATH}"), "TERM=xterm".to_owned()],
                cwd: "/".to_owned(),
                capabilities: Capabilities {
                    bounding: caps.clone(),
                    effective: caps.clone(),
                    permitted: caps,
                },
                rlimits: vec![Rlimit {
                    kind: "RLIMIT_NOFILE".to_owned(),
                    hard: 1024,
                    soft: 1024,
                }],
                no_new_privileges: true,
            },
            root: Root {
                path: "rootfs".to_owned(),
                readonly: false,
            },
            hostname: DEFAULT_HOSTNAME.to_owned(),
            mounts: vec![
                Mount::new("/proc", "proc", "proc", &[]),
                Mount::new(
                    "/dev",
                    "tmpfs",
                    "tmpfs",
                    &["nosuid", "strictatime", "mode=755", "size=65536k"],
                ),
                Mount::new(
                    "/dev/pts",
                    "devpts",
                    "devpts",
                    &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620", "gid=5"],
                ),
                Mount::new(
                    "/dev/shm",
                    "tmpfs",
                    "shm",
                    &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
                ),
                Mount::new("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
                Mount::new("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
                Mount::new(
                    "/sys/fs/cgroup",
                    "cgroup",
                    "cgroup",
                    &["nosuid", "noexec", "nodev", "relatime", "ro"],
                ),
            ],
            annotations: BTreeMap::new(),
            linux: Linux {
                uid_mappings: Vec::new(),
                gid_mappings: Vec::new(),
                resources: Some(Resources {
                    devices: vec![DeviceRule {
                        allow: false,
                        access: "rwm".to_owned(),
                    }],
                }),
                namespaces: [
                    NamespaceKind::Pid,
                    NamespaceKind::Network,
                    NamespaceKind::Ipc,
                    NamespaceKind::Uts,
                    NamespaceKind::Mount,
                ]
                .into_iter()
                .map(|kind| Namespace { kind })
                .collect(),
                masked_paths: strings(&[
                    "/proc/acpi",
                    "/proc/asound",
                    "/proc/kcore",
                    "/proc/keys",
                    "/proc/latency_stats",
                    "/proc/timer_list",
                    "/proc/timer_stats",
                    "/proc/sched_debug",
                    "/sys/firmware",
                    "/proc/scsi",
                ]),
                readonly_paths: strings(&[
                    "/proc/bus",
                    "/proc/fs",
                    "/proc/irq",
                    "/proc/sys",
                    "/proc/sysrq-trigger",
                ]),
            },
        }
    }

    pub fn has_namespace(&self, kind: NamespaceKind) -> bool {
        self.linux.namespaces.iter().any(|ns| ns.kind == kind)
    }

    pub fn add_namespace(&mut self, kind: NamespaceKind) {
        if !self.has_namespace(kind) {
            self.linux.namespaces.push(Namespace { kind });
        }
    }

    pub fn remove_namespace(&mut self, kind: NamespaceKind) {
        self.linux.namespaces.retain(|ns| ns.kind != kind);
    }

    /// Set an environment variable, replacing an existing entry in place.
    pub fn set_env(&mut self, key: &str, value: &str) {
        let entry = format!("{key}={value}");
        let existing = self
            .process
            .env
            .iter_mut()
            .find(|e| e.split_once('=').map_or(e.as_str(), |(k, _)| k) == key);
        match existing {
            Some(slot) => *slot = entry,
            None => self.process.env.push(entry),
        }
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.process.env.iter().find_map(|e| match e.split_once('=') {
            Some((k, v)) if k == key => Some(v),
            _ => None,
        })
    }

    /// Adjust the document so an unprivileged user can run it.
    ///
    /// Rootless containers get their own user namespace, share the host
    /// network namespace, cannot set mount ownership, and can only see
    /// `/sys` through a read-only bind. Cgroup resources are dropped since
    /// an unprivileged runtime cannot apply them.
    pub fn make_rootless(&mut self) {
        self.add_namespace(NamespaceKind::User);
        self.remove_namespace(NamespaceKind::Network);

        for mount in &mut self.mounts {
            mount
                .options
                .retain(|o| !o.starts_with("uid=") && !o.starts_with("gid="));
        }

        self.mounts
            .retain(|m| m.destination != "/sys" && !m.destination.starts_with("/sys/"));
        self.mounts.push(Mount::new(
            "/sys",
            "none",
            "/sys",
            &["rbind", "nosuid", "noexec", "nodev", "ro"],
        ));

        self.linux.resources = None;
    }

    /// Record the mappings in the document. Non-empty mappings imply a user namespace.
    pub fn set_id_mappings(&mut self, options: &MapOptions) {
        self.linux.uid_mappings = options.uid_mappings().to_vec();
        self.linux.gid_mappings = options.gid_mappings().to_vec();
        if !options.is_identity() {
            self.add_namespace(NamespaceKind::User);
        }
    }
}
