//! Fragment identity and file naming.

use std::collections::BTreeMap;

use crate::model::RecordId;

/// Kinds of fragment owned by the sync engine. Declaration order is the write
/// order: pools exist before anything references them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FragmentKind {
    Upstream,
    Site,
    Redirect,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 3] = [
        FragmentKind::Upstream,
        FragmentKind::Site,
        FragmentKind::Redirect,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            FragmentKind::Upstream => "upstream-",
            FragmentKind::Site => "site-",
            FragmentKind::Redirect => "redirect-",
        }
    }
}

/// Stable identity of a managed fragment: `{kind}-{id}.conf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentKey {
    pub kind: FragmentKind,
    pub id: RecordId,
}

impl FragmentKey {
    pub fn upstream(id: RecordId) -> Self {
        Self {
            kind: FragmentKind::Upstream,
            id,
        }
    }

    pub fn site(id: RecordId) -> Self {
        Self {
            kind: FragmentKind::Site,
            id,
        }
    }

    pub fn redirect(id: RecordId) -> Self {
        Self {
            kind: FragmentKind::Redirect,
            id,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}.conf", self.kind.prefix(), self.id)
    }

    /// Inverse of [`file_name`](Self::file_name).
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".conf")?;
        FragmentKind::ALL.iter().find_map(|kind| {
            let id = stem.strip_prefix(kind.prefix())?.parse().ok()?;
            Some(Self { kind: *kind, id })
        })
    }
}

impl std::fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Rendered fragment set, ordered for deterministic iteration.
pub type Fragments = BTreeMap<FragmentKey, String>;

/// True for any `.conf` file carrying a managed prefix, parseable or not.
pub fn is_managed_file_name(file_name: &str) -> bool {
    file_name.ends_with(".conf")
        && FragmentKind::ALL
            .iter()
            .any(|kind| file_name.starts_with(kind.prefix()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(FragmentKey::upstream(3).file_name(), "upstream-3.conf");
        assert_eq!(FragmentKey::parse("site-12.conf"), Some(FragmentKey::site(12)));
        assert_eq!(FragmentKey::parse("redirect-x.conf"), None);
        assert_eq!(FragmentKey::parse("default.conf"), None);
    }

    #[test]
    fn test_managed_names() {
        assert!(is_managed_file_name("site-1.conf"));
        assert!(is_managed_file_name("site-legacy.conf"));
        assert!(!is_managed_file_name("default.conf"));
        assert!(!is_managed_file_name("acme-a.example.com.conf"));
        assert!(!is_managed_file_name(".site-1.conf.tmp"));
    }

    #[test]
    fn test_kind_order_puts_upstreams_first() {
        let mut keys = vec![
            FragmentKey::redirect(1),
            FragmentKey::site(1),
            FragmentKey::upstream(9),
        ];
        keys.sort();
        assert_eq!(keys[0].kind, FragmentKind::Upstream);
        assert_eq!(keys[2].kind, FragmentKind::Redirect);
    }
}
