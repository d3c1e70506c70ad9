//! `/etc/os-release` parsing

use super::error::ProvisionError;

/// Linux distribution family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistroFamily {
    /// Debian, Ubuntu, and derivatives (apt-based)
    Debian,
    /// RHEL, CentOS, Fedora, Amazon Linux (dnf/yum-based)
    RedHat,
    /// Alpine Linux (apk-based)
    Alpine,
    /// Arch Linux (pacman-based)
    Arch,
    /// SUSE/openSUSE (zypper-based)
    Suse,
    /// Unknown distribution
    Unknown(String),
}

impl std::fmt::Display for DistroFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistroFamily::Debian => write!(f, "Debian/Ubuntu"),
            DistroFamily::RedHat => write!(f, "RHEL/Fedora"),
            DistroFamily::Alpine => write!(f, "Alpine"),
            DistroFamily::Arch => write!(f, "Arch"),
            DistroFamily::Suse => write!(f, "SUSE"),
            DistroFamily::Unknown(id) => write!(f, "Unknown ({id})"),
        }
    }
}

/// Identity of a remote operating system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    pub family: DistroFamily,
    /// e.g. "ubuntu", "boot2docker"
    pub id: String,
    pub id_like: String,
    pub pretty_name: String,
    pub version_id: Option<String>,
}

impl std::fmt::Display for OsRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.pretty_name.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}", self.pretty_name)
        }
    }
}

impl OsRelease {
    pub fn parse(content: &str) -> Result<Self, ProvisionError> {
        let mut id = String::new();
        let mut id_like = String::new();
        let mut pretty_name = String::new();
        let mut version_id = None;

        for line in content.lines() {
            if let Some((key, value)) = line.trim().split_once('=') {
                let value = value.trim_matches(|c| c == '"' || c == '\'');
                match key {
                    "ID" => id = value.to_lowercase(),
                    "ID_LIKE" => id_like = value.to_lowercase(),
                    "PRETTY_NAME" => pretty_name = value.to_string(),
                    "VERSION_ID" => version_id = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        if id.is_empty() {
            return Err(ProvisionError::OsRelease("no ID in /etc/os-release".to_string()));
        }

        let family = classify(&id, &id_like);
        Ok(Self {
            family,
            id,
            id_like,
            pretty_name,
            version_id,
        })
    }
}

fn classify(id: &str, id_like: &str) -> DistroFamily {
    match id {
        "ubuntu" | "debian" | "linuxmint" | "pop" | "elementary" | "raspbian" => {
            DistroFamily::Debian
        }
        "amzn" | "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "ol" => {
            DistroFamily::RedHat
        }
        "alpine" => DistroFamily::Alpine,
        "arch" | "manjaro" | "endeavouros" => DistroFamily::Arch,
        "opensuse" | "sles" | "opensuse-leap" | "opensuse-tumbleweed" => DistroFamily::Suse,
        _ => {
            // derivatives
            if id_like.contains("debian") || id_like.contains("ubuntu") {
                DistroFamily::Debian
            } else if id_like.contains("rhel")
                || id_like.contains("fedora")
                || id_like.contains("centos")
            {
                DistroFamily::RedHat
            } else if id_like.contains("arch") {
                DistroFamily::Arch
            } else if id_like.contains("suse") {
                DistroFamily::Suse
            } else {
                DistroFamily::Unknown(id.to_string())
            }
        }
    }
}
