// file: src/models/item.rs
// description: media items discovered by a task and the persisted description record

use serde::{Deserialize, Serialize};

/// One search hit as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub item_id: String,
    pub download_url: Option<String>,
}

impl ItemRef {
    pub fn is_downloadable(&self) -> bool {
        self.download_url.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<ItemRef>,
    pub next_cursor: Option<String>,
}

impl SearchPage {
    pub fn downloadable_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_downloadable()).count()
    }
}

/// A downloaded item owned by the task that discovered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub item_id: String,
    pub local_path: String,
    pub description: Option<String>,
}

impl Item {
    pub fn downloaded(item_id: String, local_path: String) -> Self {
        Self {
            item_id,
            local_path,
            description: None,
        }
    }

    pub fn with_description(self, description: String) -> Self {
        Self {
            description: Some(description),
            ..self
        }
    }

    pub fn into_record(self, keyword: &str) -> Option<DescriptionRecord> {
        let summary = self.description?;
        Some(DescriptionRecord {
            task_keyword: keyword.to_string(),
            filename: self.local_path,
            summary,
        })
    }
}

/// Durable per-item unit of the keyword-scoped description log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionRecord {
    pub task_keyword: String,
    pub filename: String,
    pub summary: String,
}
