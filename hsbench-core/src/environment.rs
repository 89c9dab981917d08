use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use sysinfo::System;

const CONTAINER_MARKERS: [&str; 2] = ["/.dockerenv", "/run/.containerenv"];
const CGROUP_PATH: &str = "/proc/1/cgroup";
const CGROUP_HINTS: [&str; 5] = ["docker", "kubepods", "containerd", "lxc", "podman"];

/// Host snapshot embedded in every report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub platform: String,
    pub os_release: String,
    pub kernel_release: String,
    pub machine: String,
    pub host_name: String,
    pub harness_version: String,
    pub cpu_count: usize,
    pub in_container: bool,
    pub git_commit: String,
    pub timestamp_utc: String,
}

impl Environment {
    pub fn detect() -> Self {
        let markers: Vec<bool> = CONTAINER_MARKERS
            .iter()
            .map(|p| Path::new(p).exists())
            .collect();
        let cgroup = std::fs::read_to_string(CGROUP_PATH).ok();

        Self {
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            os_release: System::long_os_version().unwrap_or_default(),
            kernel_release: System::kernel_version().unwrap_or_default(),
            machine: std::env::consts::ARCH.to_string(),
            host_name: System::host_name().unwrap_or_default(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            cpu_count: crate::runner::logical_cpu_count(),
            in_container: detect_in_container(
                std::env::var("CI").ok().as_deref(),
                &markers,
                cgroup.as_deref(),
            ),
            git_commit: detect_git_commit(std::env::var("GIT_COMMIT").ok()),
            timestamp_utc: utc_now(),
        }
    }
}

/// RFC 3339 UTC timestamp with second precision.
pub fn utc_now() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}

pub fn detect_git_commit(from_env: Option<String>) -> String {
    from_env
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn detect_in_container(ci: Option<&str>, markers: &[bool], cgroup: Option<&str>) -> bool {
    if ci.is_some_and(is_truthy) {
        return true;
    }
    if markers.iter().any(|exists| *exists) {
        return true;
    }
    cgroup.is_some_and(|content| CGROUP_HINTS.iter().any(|hint| content.contains(hint)))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_prefers_env() {
        assert_eq!(detect_git_commit(Some("abc123".to_string())), "abc123");
        assert_eq!(detect_git_commit(Some("  ".to_string())), "unknown");
        assert_eq!(detect_git_commit(None), "unknown");
    }

    #[test]
    fn ci_flag_marks_container() {
        assert!(detect_in_container(Some("true"), &[], None));
        assert!(detect_in_container(Some("TRUE"), &[], None));
        assert!(!detect_in_container(Some("false"), &[], None));
        assert!(!detect_in_container(None, &[false, false], None));
    }

    #[test]
    fn markers_and_cgroup_mark_container() {
        assert!(detect_in_container(None, &[false, true], None));
        assert!(detect_in_container(
            None,
            &[],
            Some("0::/kubepods/besteffort/pod1234")
        ));
        assert!(!detect_in_container(None, &[], Some("0::/init.scope")));
    }

    #[test]
    fn detect_fills_identifiers() {
        let env = Environment::detect();
        assert!(env.platform.contains(std::env::consts::OS));
        assert_eq!(env.machine, std::env::consts::ARCH);
        assert!(env.cpu_count >= 1);
        assert!(env.timestamp_utc.ends_with('Z'));
    }
}
