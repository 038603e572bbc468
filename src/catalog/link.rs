use serde::{Deserialize, Serialize};

use crate::catalog::nullable;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkCategory {
    /// Lecture slides and handouts.
    #[default]
    Materials,
    External,
    #[serde(other)]
    Other,
}

impl LinkCategory {
    pub fn heading(self) -> &'static str {
        match self {
            LinkCategory::Materials => "Lecture materials",
            LinkCategory::External => "External links",
            LinkCategory::Other => "Other links",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// A shared document; `pageNumber` deep-links into it.
    Drive,
    #[default]
    #[serde(other)]
    External,
}

/// A course resource shown alongside the level list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub category: LinkCategory,
    #[serde(rename = "type", default, deserialize_with = "nullable::or_default")]
    pub kind: LinkKind,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub icon: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub order: i64,
}

impl Link {
    /// Target URL. Drive documents open at `page_number` when one is set.
    pub fn href(&self) -> String {
        match (self.kind, self.page_number) {
            (LinkKind::Drive, Some(page)) => format!("{}#page={page}", self.url),
            _ => self.url.clone(),
        }
    }

    pub fn display_icon(&self) -> &str {
        if !self.icon.is_empty() {
            return &self.icon;
        }
        match self.category {
            LinkCategory::Materials => "📄",
            _ => "🔗",
        }
    }
}

/// Links grouped by category, each group in `order` with catalog order kept
/// for ties. Empty groups are left out.
pub fn grouped_by_category(links: &[Link]) -> Vec<(LinkCategory, Vec<&Link>)> {
    let mut sorted: Vec<&Link> = links.iter().collect();
    sorted.sort_by_key(|l| (l.category, l.order));
    let mut groups: Vec<(LinkCategory, Vec<&Link>)> = Vec::new();
    for link in sorted {
        match groups.last_mut() {
            Some((category, members)) if *category == link.category => members.push(link),
            _ => groups.push((link.category, vec![link])),
        }
    }
    groups
}
