use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no plugin named '{0}'")]
    UnknownPlugin(String),

    #[error("a plugin named '{0}' is already registered")]
    DuplicatePlugin(String),

    #[error("preset '{name}' not found{hint}")]
    UnknownPreset { name: String, hint: String },

    #[error("invalid preset: {0}")]
    InvalidPreset(String),

    #[error("internship '{0}' not found")]
    UnknownInternship(String),

    #[error("company '{0}' not found")]
    UnknownCompany(String),

    #[error("another run is in progress (lock held on {})", .0.display())]
    RunInProgress(PathBuf),
}

impl Error {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Builds an `UnknownPreset` error, suggesting the closest known name.
    pub(crate) fn unknown_preset<'a>(name: &str, known: impl IntoIterator<Item = &'a String>) -> Self {
        let closest = known
            .into_iter()
            .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
            .filter(|(score, _)| *score >= 0.8)
            .max_by(|a, b| a.0.total_cmp(&b.0));

        let hint = match closest {
            Some((_, candidate)) => format!(" (did you mean '{}'?)", candidate),
            None => String::new(),
        };

        Error::UnknownPreset {
            name: name.to_string(),
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_preset_suggests_close_name() {
        let known = vec!["backend-remote".to_string(), "frontend".to_string()];
        let err = Error::unknown_preset("backend-remot", &known);
        assert_eq!(
            err.to_string(),
            "preset 'backend-remot' not found (did you mean 'backend-remote'?)"
        );
    }

    #[test]
    fn test_unknown_preset_without_close_name() {
        let known = vec!["frontend".to_string()];
        let err = Error::unknown_preset("zzz", &known);
        assert_eq!(err.to_string(), "preset 'zzz' not found");
    }
}
