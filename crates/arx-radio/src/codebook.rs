//! Static codebooks used by the compressor
//!
//! - [`StatusCode`] maps the equipment status vocabulary to single bytes
//! - [`PathAbbreviator`] shortens hierarchical equipment paths
//!
//! Neither holds state; both are plain lookup tables.

use serde::{Deserialize, Serialize};

/// Alias substituted for the established building identifier
pub const BUILDING_ALIAS: &str = "B1";

/// Literal prefix stripped from building-scoped paths
pub const BUILDING_PREFIX: &str = "/building/";

/// Substring replacements applied to every path
pub const PATH_ABBREVIATIONS: &[(&str, &str)] = &[
    ("/floor-", "/"),
    ("/room-", "/"),
    ("/zone-", "/"),
    ("/electrical", "E"),
    ("/hvac", "H"),
    ("/plumbing", "P"),
    ("/network", "N"),
    ("/security", "S"),
];

/// Equipment status vocabulary with its one-byte wire codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    /// Operating normally
    Operational,
    /// Running with reduced capability
    Degraded,
    /// Not working
    Failed,
    /// Under maintenance
    Maintenance,
    /// Not reachable
    Offline,
    /// State unknown
    Unknown,
}

impl StatusCode {
    /// All statuses in table order
    pub const ALL: [StatusCode; 6] = [
        StatusCode::Operational,
        StatusCode::Degraded,
        StatusCode::Failed,
        StatusCode::Maintenance,
        StatusCode::Offline,
        StatusCode::Unknown,
    ];

    /// Vocabulary name as used by the building model
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Operational => "OPERATIONAL",
            StatusCode::Degraded => "DEGRADED",
            StatusCode::Failed => "FAILED",
            StatusCode::Maintenance => "MAINTENANCE",
            StatusCode::Offline => "OFFLINE",
            StatusCode::Unknown => "UNKNOWN",
        }
    }

    /// One-byte wire code
    pub fn code(&self) -> u8 {
        match self {
            StatusCode::Operational => b'O',
            StatusCode::Degraded => b'D',
            StatusCode::Failed => b'F',
            StatusCode::Maintenance => b'M',
            StatusCode::Offline => b'X',
            StatusCode::Unknown => b'U',
        }
    }

    /// Look up a status by its wire code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Look up a status by its exact vocabulary name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shortens equipment paths for the wire
///
/// With a building context, every path is rewritten relative to
/// [`BUILDING_ALIAS`]: a leading `/building/` and the context identifier are
/// stripped when present and the alias is prepended. The alias is a single
/// fixed slot, so the far end must track which building was established.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathAbbreviator;

impl PathAbbreviator {
    /// Create a new abbreviator
    pub fn new() -> Self {
        Self
    }

    /// Compress a path, optionally relative to an established building
    pub fn compress(&self, path: &str, building_context: &str) -> String {
        let mut compressed = self.apply_context(path, building_context);
        for (pattern, replacement) in PATH_ABBREVIATIONS {
            if compressed.contains(pattern) {
                compressed = compressed.replace(pattern, replacement);
            }
        }
        compressed
    }

    fn apply_context(&self, path: &str, building_context: &str) -> String {
        if building_context.is_empty() {
            return path.to_string();
        }

        let scoped = path.strip_prefix(BUILDING_PREFIX).unwrap_or(path);
        let rest = match scoped.strip_prefix(building_context) {
            // Only a whole segment matches, so `HQ2` is not read as `HQ` + `2`
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => scoped,
        };

        if rest.is_empty() || rest.starts_with('/') {
            format!("{}{}", BUILDING_ALIAS, rest)
        } else {
            format!("{}/{}", BUILDING_ALIAS, rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_roundtrip() {
        for status in StatusCode::ALL {
            assert_eq!(StatusCode::from_code(status.code()), Some(status));
            assert_eq!(StatusCode::from_name(status.as_str()), Some(status));
        }
        assert_eq!(StatusCode::Offline.code(), b'X');
        assert_eq!(StatusCode::from_code(b'Z'), None);
    }

    #[test]
    fn test_status_name_is_case_sensitive() {
        assert_eq!(StatusCode::from_name("operational"), None);
        assert_eq!(StatusCode::from_name("OPERATIONAL"), Some(StatusCode::Operational));
    }

    #[test]
    fn test_compress_with_context() {
        let abbreviator = PathAbbreviator::new();
        let compressed = abbreviator.compress(
            "/building/ARXOS-NA-US-NY-NYC-0001/floor-02/room-203/electrical/outlet-02",
            "ARXOS-NA-US-NY-NYC-0001",
        );
        assert_eq!(compressed, "B1/02/203E/outlet-02");
    }

    #[test]
    fn test_compress_without_context() {
        let abbreviator = PathAbbreviator::new();
        assert_eq!(
            abbreviator.compress("/building/HQ/zone-4/hvac/ahu-1", ""),
            "/building/HQ/4H/ahu-1"
        );
    }

    #[test]
    fn test_compress_other_building_still_gets_alias() {
        let abbreviator = PathAbbreviator::new();
        assert_eq!(
            abbreviator.compress("/building/OTHER/floor-1/security/cam", "HQ"),
            "B1/OTHER/1S/cam"
        );
        // Identifier that merely shares a prefix with the context
        assert_eq!(abbreviator.compress("/building/HQ2/floor-1", "HQ"), "B1/HQ2/1");
    }

    #[test]
    fn test_relative_path_with_context() {
        let abbreviator = PathAbbreviator::new();
        assert_eq!(abbreviator.compress("/floor-02/room-203", "HQ"), "B1/02/203");
        assert_eq!(abbreviator.compress("zone-4/hvac", "HQ"), "B1/4H");
    }

    #[test]
    fn test_context_without_building_prefix() {
        let abbreviator = PathAbbreviator::new();
        assert_eq!(abbreviator.compress("HQ/room-12", "HQ"), "B1/12");
        assert_eq!(abbreviator.compress("/building/HQ", "HQ"), "B1");
    }

    #[test]
    fn test_replacements_are_not_anchored() {
        let abbreviator = PathAbbreviator::new();
        assert_eq!(
            abbreviator.compress("/a/plumbing/b/network/c/plumbing", ""),
            "/aP/bN/cP"
        );
    }
}
