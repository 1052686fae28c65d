/// Default colors handed out to labels that have never been seen before.
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#06b6d4", "#3b82f6", "#8b5cf6", "#ec4899",
];

pub const DEFAULT_LABEL_COLOR: &str = "#6b7280";

/// Tree configuration: identity of the synthetic root and label coloring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Id of the synthetic root node. Must not collide with an entity id.
    pub root_id: String,
    /// Display name of the root. Carries no structural meaning.
    pub root_name: String,
    pub label_palette: Vec<String>,
    /// Used when the palette is empty.
    pub default_label_color: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root_id: "root".to_string(),
            root_name: "Root".to_string(),
            label_palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            default_label_color: DEFAULT_LABEL_COLOR.to_string(),
        }
    }
}

impl TreeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Optional environment variables:
    /// - `TREE_ROOT_ID`: id of the synthetic root
    /// - `TREE_ROOT_NAME`: display name of the root
    /// - `TREE_LABEL_PALETTE`: comma-separated `#rrggbb` colors
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(root_id) = lookup("TREE_ROOT_ID") {
            let root_id = root_id.trim();
            if root_id.is_empty() {
                return Err(ConfigError::EmptyRootId);
            }
            config.root_id = root_id.to_string();
        }

        if let Some(root_name) = lookup("TREE_ROOT_NAME") {
            config.root_name = root_name;
        }

        if let Some(palette) = lookup("TREE_LABEL_PALETTE") {
            config.label_palette = palette
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| {
                    if is_hex_color(c) {
                        Ok(c.to_string())
                    } else {
                        Err(ConfigError::InvalidColor(c.to_string()))
                    }
                })
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TREE_ROOT_ID must not be empty")]
    EmptyRootId,

    #[error("Invalid palette color: {0} (expected #rrggbb)")]
    InvalidColor(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = TreeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TreeConfig::default());
        assert_eq!(config.label_palette.len(), 8);
    }

    #[test]
    fn test_overrides() {
        let config = TreeConfig::from_lookup(lookup(&[
            ("TREE_ROOT_ID", " __root__ "),
            ("TREE_ROOT_NAME", "Library"),
            ("TREE_LABEL_PALETTE", "#000000, #FFFFFF,"),
        ]))
        .unwrap();
        assert_eq!(config.root_id, "__root__");
        assert_eq!(config.root_name, "Library");
        assert_eq!(config.label_palette, vec!["#000000", "#FFFFFF"]);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            TreeConfig::from_lookup(lookup(&[("TREE_ROOT_ID", "  ")])),
            Err(ConfigError::EmptyRootId)
        ));
        assert!(matches!(
            TreeConfig::from_lookup(lookup(&[("TREE_LABEL_PALETTE", "#12345g")])),
            Err(ConfigError::InvalidColor(c)) if c == "#12345g"
        ));
    }
}
