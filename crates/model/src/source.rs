use protocol::types;

pub(crate) const UNKNOWN_SOURCE_LABEL: &str = "Unknown Source";

/// Opaque reference to the source of a stack frame or breakpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    raw: types::Source,
    available: bool,
}

impl Source {
    pub fn new(raw: types::Source) -> Self {
        Self {
            raw,
            available: true,
        }
    }

    /// Placeholder for frames the adapter could not locate
    pub fn unknown() -> Self {
        Self {
            raw: types::Source {
                name: Some(UNKNOWN_SOURCE_LABEL.to_string()),
                ..Default::default()
            },
            available: false,
        }
    }

    pub fn from_path(path: impl Into<std::path::PathBuf>) -> Self {
        let path = path.into();
        Self::new(types::Source {
            name: path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|s| s.to_string()),
            path: Some(path),
            ..Default::default()
        })
    }

    pub fn raw(&self) -> &types::Source {
        &self.raw
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.name.as_deref()
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub(crate) fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Whether both refer to the same underlying source: by path, then by adapter reference,
    /// then by name
    pub fn same_origin(&self, other: &Source) -> bool {
        match (&self.raw.path, &other.raw.path) {
            (Some(a), Some(b)) => return a == b,
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => {}
        }
        match (self.raw.source_reference, other.raw.source_reference) {
            (Some(a), Some(b)) if a > 0 || b > 0 => return a == b,
            _ => {}
        }
        self.raw.name.is_some() && self.raw.name == other.raw.name
    }
}

impl From<types::Source> for Source {
    fn from(raw: types::Source) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_is_unavailable() {
        let source = Source::unknown();
        assert!(!source.available());
        assert_eq!(source.name(), Some(UNKNOWN_SOURCE_LABEL));
    }

    #[test]
    fn same_origin_prefers_paths() {
        let a = Source::from_path("/tmp/a.py");
        let b = Source::from_path("/tmp/a.py");
        let c = Source::from_path("/tmp/c.py");
        assert!(a.same_origin(&b));
        assert!(!a.same_origin(&c));
        assert!(!a.same_origin(&Source::unknown()));
    }
}
