use anyhow::Result;

use super::{VaultClient, VaultItem};

/// Query layer over a `VaultClient`. Search runs server-side when the client
/// supports the query shape and falls back to a local case-insensitive
/// substring filter otherwise; both paths return the same logical result set.
pub struct QueryEngine<'a, C: VaultClient> {
    client: &'a C,
}

impl<'a, C: VaultClient> QueryEngine<'a, C> {
    pub fn new(client: &'a C) -> Self {
        QueryEngine { client }
    }

    pub fn find(&self, query: &str) -> Result<Vec<VaultItem>> {
        if let Some(items) = self.client.search_items(query)? {
            return Ok(items);
        }

        let all = self.client.list_items()?;
        Ok(filter_by_name(all, query))
    }

    /// A named custom field from one item. Absent field is a normal case and
    /// returns `None`, not an error.
    pub fn field(&self, id: &str, name: &str) -> Result<Option<String>> {
        let item = self.client.get_item(id)?;
        Ok(field_value(&item, name))
    }

    pub fn password(&self, id: &str) -> Result<Option<String>> {
        self.client.get_password(id)
    }

    /// Resolve a logical key against an already-fetched item: custom fields
    /// first, the primary password as the last fallback for `PASSWORD`.
    pub fn logical_value(&self, item: &VaultItem, key: &str) -> Result<Option<String>> {
        if let Some(value) = field_value(item, key) {
            return Ok(Some(value));
        }

        if key.eq_ignore_ascii_case("PASSWORD") {
            return self.client.get_password(&item.id);
        }

        Ok(None)
    }
}

/// Case-insensitive field lookup; vault field names rarely agree on casing
/// with the env-style keys callers ask for.
fn field_value(item: &VaultItem, name: &str) -> Option<String> {
    item.fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
        .filter(|v| !v.is_empty())
}

pub fn filter_by_name(items: Vec<VaultItem>, query: &str) -> Vec<VaultItem> {
    let needle = query.to_lowercase();
    items
        .into_iter()
        .filter(|i| i.name.to_lowercase().contains(&needle))
        .collect()
}
