use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Whether a fetch targets a directory tree or a single file.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// Not chosen by the caller. Treated the same as `Any`.
    #[default]
    Unset,

    /// Let the selected backend decide.
    Any,

    Directory,

    File,
}

impl FetchMode {
    /// True once the mode commits to either `get` or `get_file`.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Directory | Self::File)
    }
}

impl Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Unset => "unset",
                Self::Any => "any",
                Self::Directory => "directory",
                Self::File => "file",
            }
        )
    }
}
