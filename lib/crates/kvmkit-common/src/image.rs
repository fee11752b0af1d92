//! Cloud image catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A base cloud image kvmkit knows how to download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Distro {
    #[serde(rename = "ubuntu-20.04")]
    #[cfg_attr(feature = "clap", value(name = "ubuntu-20.04"))]
    Ubuntu2004,
    #[serde(rename = "ubuntu-22.04")]
    #[cfg_attr(feature = "clap", value(name = "ubuntu-22.04"))]
    #[default]
    Ubuntu2204,
    #[serde(rename = "ubuntu-24.04")]
    #[cfg_attr(feature = "clap", value(name = "ubuntu-24.04"))]
    Ubuntu2404,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown image '{0}'. Known images: ubuntu-20.04, ubuntu-22.04, ubuntu-24.04")]
pub struct UnknownDistro(pub String);

impl Distro {
    /// Every catalog entry, in display order.
    pub const ALL: [Distro; 3] = [Distro::Ubuntu2004, Distro::Ubuntu2204, Distro::Ubuntu2404];

    /// Catalog name, also used as the local file stem (`<name>.img`).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Distro::Ubuntu2004 => "ubuntu-20.04",
            Distro::Ubuntu2204 => "ubuntu-22.04",
            Distro::Ubuntu2404 => "ubuntu-24.04",
        }
    }

    /// Download URL of the upstream cloud image.
    #[must_use]
    pub fn url(self) -> &'static str {
        match self {
            Distro::Ubuntu2004 => {
                "https://cloud-images.ubuntu.com/focal/current/focal-server-cloudimg-amd64.img"
            }
            Distro::Ubuntu2204 => {
                "https://cloud-images.ubuntu.com/jammy/current/jammy-server-cloudimg-amd64.img"
            }
            Distro::Ubuntu2404 => {
                "https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img"
            }
        }
    }

    /// libosinfo short id passed to `virt-install --os-variant`.
    #[must_use]
    pub fn os_variant(self) -> &'static str {
        match self {
            Distro::Ubuntu2004 => "ubuntu20.04",
            Distro::Ubuntu2204 => "ubuntu22.04",
            Distro::Ubuntu2404 => "ubuntu24.04",
        }
    }

    /// Local file name of the downloaded image.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.img", self.name())
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Distro {
    type Err = UnknownDistro;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Distro::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| UnknownDistro(s.to_string()))
    }
}
