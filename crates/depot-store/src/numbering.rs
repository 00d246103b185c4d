use std::collections::HashMap;

use async_trait::async_trait;
use depot_core::{DocumentKind, DocumentNumbering, StoreResult};
use tokio::sync::Mutex;

/// Sequential numbers per (kind, warehouse code), starting at 1.
#[derive(Default)]
pub struct InMemoryDocumentNumbering {
    sequences: Mutex<HashMap<(DocumentKind, String), u64>>,
}

#[async_trait]
impl DocumentNumbering for InMemoryDocumentNumbering {
    async fn next_number(&self, kind: DocumentKind, warehouse_code: &str) -> StoreResult<String> {
        let mut sequences = self.sequences.lock().await;
        let counter = sequences
            .entry((kind, warehouse_code.to_string()))
            .or_insert(0);
        *counter += 1;

        Ok(format!(
            "{}-{}-{:05}",
            kind.number_prefix(),
            warehouse_code,
            counter
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn numbers_are_sequential_per_kind_and_warehouse() {
        let numbering = InMemoryDocumentNumbering::default();

        let a = numbering
            .next_number(DocumentKind::Receipt, "HN01")
            .await
            .unwrap();
        let b = numbering
            .next_number(DocumentKind::Receipt, "HN01")
            .await
            .unwrap();
        let c = numbering
            .next_number(DocumentKind::Issue, "HN01")
            .await
            .unwrap();
        let d = numbering
            .next_number(DocumentKind::Receipt, "SG02")
            .await
            .unwrap();

        assert_eq!(a, "RC-HN01-00001");
        assert_eq!(b, "RC-HN01-00002");
        assert_eq!(c, "IS-HN01-00001");
        assert_eq!(d, "RC-SG02-00001");
    }
}
