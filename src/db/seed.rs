use crate::db::{RowSets, SchoolYearRow, Store, StoreError};
use uuid::Uuid;

/// Seeds the default school years when every table is empty.
/// Returns how many rows were inserted.
pub async fn seed_all(store: &dyn Store, labels: &[String]) -> Result<usize, StoreError> {
    let existing = store.load().await?;
    if !existing.is_empty() {
        return Ok(0);
    }

    let rows = RowSets {
        school_years: labels
            .iter()
            .enumerate()
            .map(|(idx, label)| SchoolYearRow {
                id: Uuid::new_v4(),
                label: label.clone(),
                position: idx as i32,
            })
            .collect(),
        ..Default::default()
    };
    store.replace_all(&rows).await?;
    tracing::info!("Seeded {} default school years", rows.school_years.len());
    Ok(rows.school_years.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    #[tokio::test]
    async fn test_seed_only_into_empty_store() {
        let store = MemoryStore::new();
        let labels = vec!["2026-2027".to_string(), "2027-2028".to_string()];

        assert_eq!(seed_all(&store, &labels).await.unwrap(), 2);
        let loaded = store.load().await.unwrap();
        let seeded: Vec<&str> = loaded.school_years.iter().map(|y| y.label.as_str()).collect();
        assert_eq!(seeded, vec!["2026-2027", "2027-2028"]);

        assert_eq!(seed_all(&store, &labels).await.unwrap(), 0);
        assert_eq!(store.load().await.unwrap().school_years.len(), 2);
    }
}
