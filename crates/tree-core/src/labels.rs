//! Canonical label lists and the global label catalog.
//!
//! A payload stores its labels as an ordered, duplicate-free list of names.
//! On the wire (and towards the remote) the list is a single comma-separated
//! string. Colors and usage counts are not stored per node; they live in a
//! catalog computed from the whole tree.

use crate::node::Label;
use serde::{Deserialize, Serialize};

pub const SEPARATOR: char = ',';

/// Split a canonical label string: trim each part, drop empties and repeats.
pub fn parse(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(SEPARATOR) {
        let name = part.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

pub fn join(names: &[String]) -> String {
    let mut out = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(name);
    }
    out
}

/// Normalize an arbitrary list the same way [`parse`] does.
pub fn normalize(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Append `name` unless it is blank or already present.
pub fn insert(names: &mut Vec<String>, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || names.iter().any(|n| n == name) {
        return false;
    }
    names.push(name.to_string());
    true
}

/// Remove `name`; false if it was not present.
pub fn remove(names: &mut Vec<String>, name: &str) -> bool {
    let name = name.trim();
    let before = names.len();
    names.retain(|n| n != name);
    names.len() != before
}

/// Structured labels derived from a canonical list.
pub fn to_node_labels(names: &[String]) -> Vec<Label> {
    names.iter().map(|n| Label::named(n)).collect()
}

/// True when `names` carries every label in `filter`.
pub fn contains_all(names: &[String], filter: &[String]) -> bool {
    filter.iter().all(|f| names.iter().any(|n| n == f.trim()))
}

/// Serde adapter: a label list travels as its canonical string.
///
/// Deserialization also accepts a JSON array of names or `null`.
pub mod canonical {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(names: &[String], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::join(names))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            List(Vec<String>),
        }

        Ok(match Option::<Raw>::deserialize(d)? {
            Some(Raw::Text(text)) => super::parse(&text),
            Some(Raw::List(list)) => super::normalize(list),
            None => Vec::new(),
        })
    }
}

/// One row of the global label catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogLabel {
    pub name: String,
    pub color: String,
    pub count: usize,
}

/// Recompute the catalog from scratch.
///
/// `label_lists` yields every node's label list in a stable traversal order.
/// Names keep the color they had in `previous`; new names take
/// `palette[index % palette.len()]` where `index` is the name's position in
/// first-seen order (custom labels come after every counted name). Custom
/// labels that no node uses are included with a zero count. The result is
/// sorted by count descending, then name ascending.
pub fn compute_catalog<'a>(
    label_lists: impl IntoIterator<Item = &'a [String]>,
    previous: &[CatalogLabel],
    custom: &[String],
    palette: &[String],
    fallback_color: &str,
) -> Vec<CatalogLabel> {
    let mut rows: Vec<CatalogLabel> = Vec::new();
    let color_for = |name: &str, index: usize| -> String {
        previous
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.color.clone())
            .or_else(|| (!palette.is_empty()).then(|| palette[index % palette.len()].clone()))
            .unwrap_or_else(|| fallback_color.to_string())
    };

    for names in label_lists {
        for name in names {
            match rows.iter_mut().find(|r| &r.name == name) {
                Some(row) => row.count += 1,
                None => {
                    let color = color_for(name, rows.len());
                    rows.push(CatalogLabel {
                        name: name.clone(),
                        color,
                        count: 1,
                    });
                }
            }
        }
    }

    for name in custom {
        let name = name.trim();
        if name.is_empty() || rows.iter().any(|r| r.name == name) {
            continue;
        }
        let color = color_for(name, rows.len());
        rows.push(CatalogLabel {
            name: name.to_string(),
            color,
            count: 0,
        });
    }

    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_trims_and_dedups() {
        assert_eq!(parse(" work, home ,,work,  "), names(&["work", "home"]));
        assert!(parse("").is_empty());
        assert!(parse(" , ,").is_empty());
    }

    #[test]
    fn test_join_is_canonical() {
        assert_eq!(join(&names(&["a", "b c"])), "a,b c");
        assert_eq!(join(&[]), "");
        assert_eq!(parse(&join(&names(&["x", "y"]))), names(&["x", "y"]));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut list = names(&["a"]);
        assert!(insert(&mut list, " b "));
        assert!(!insert(&mut list, "a"));
        assert!(!insert(&mut list, "  "));
        assert_eq!(list, names(&["a", "b"]));

        assert!(remove(&mut list, "a"));
        assert!(!remove(&mut list, "missing"));
        assert_eq!(list, names(&["b"]));
    }

    #[test]
    fn test_canonical_serde_accepts_string_list_and_null() {
        #[derive(serde::Deserialize, serde::Serialize)]
        struct Holder {
            #[serde(default, with = "canonical")]
            labels: Vec<String>,
        }

        let h: Holder = serde_json::from_str(r#"{"labels": "a, b"}"#).unwrap();
        assert_eq!(h.labels, names(&["a", "b"]));
        let h: Holder = serde_json::from_str(r#"{"labels": ["a", "a", "c"]}"#).unwrap();
        assert_eq!(h.labels, names(&["a", "c"]));
        let h: Holder = serde_json::from_str(r#"{"labels": null}"#).unwrap();
        assert!(h.labels.is_empty());
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert!(h.labels.is_empty());

        let out = serde_json::to_string(&Holder { labels: names(&["a", "b"]) }).unwrap();
        assert_eq!(out, r#"{"labels":"a,b"}"#);
    }

    #[test]
    fn test_catalog_counts_colors_and_order() {
        let lists = [names(&["work", "home"]), names(&["work"]), names(&["zeta"])];
        let previous = vec![CatalogLabel {
            name: "home".into(),
            color: "#111111".into(),
            count: 9,
        }];
        let palette = names(&["#aaaaaa", "#bbbbbb"]);

        let catalog = compute_catalog(
            lists.iter().map(Vec::as_slice),
            &previous,
            &names(&["custom", "work"]),
            &palette,
            "#000000",
        );

        assert_eq!(
            catalog,
            vec![
                CatalogLabel { name: "work".into(), color: "#aaaaaa".into(), count: 2 },
                CatalogLabel { name: "home".into(), color: "#111111".into(), count: 1 },
                CatalogLabel { name: "zeta".into(), color: "#aaaaaa".into(), count: 1 },
                CatalogLabel { name: "custom".into(), color: "#bbbbbb".into(), count: 0 },
            ]
        );
    }

    #[test]
    fn test_catalog_without_palette_uses_fallback() {
        let lists = [names(&["a"])];
        let catalog = compute_catalog(lists.iter().map(Vec::as_slice), &[], &[], &[], "#999999");
        assert_eq!(catalog[0].color, "#999999");
    }
}
