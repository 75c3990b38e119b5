use crate::error::FieldStoreError;
use crate::permission::Principal;
use crate::repository::{ListOrder, RecordStore};
use serde::Serialize;

/// Tabular snapshot of the records a principal may see. Header labels and
/// row cells follow catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    pub keys: Vec<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Exports every record visible to `principal`, ordered by identifier. No
/// search term applies.
pub fn export_table(
    records: &RecordStore,
    principal: &Principal,
) -> Result<ExportTable, FieldStoreError> {
    let mut rows = Vec::new();
    let catalog = records.scan(principal, "", ListOrder::Identifier, None, |record| {
        rows.push(record.values.into_iter().map(|(_, value)| value).collect());
        Ok(())
    })?;
    Ok(ExportTable {
        keys: catalog.key_list(),
        headers: catalog.fields().iter().map(|f| f.label.clone()).collect(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::export_table;
    use crate::FieldStore;
    use crate::config::FieldStoreConfig;
    use crate::permission::{Principal, Role};
    use crate::repository::FieldValues;
    use tempfile::tempdir;

    fn values(name: &str) -> FieldValues {
        FieldValues::from([("name".to_string(), name.to_string())])
    }

    #[test]
    fn export_is_scoped_and_ordered_by_id() {
        let dir = tempdir().expect("temp dir");
        let store = FieldStore::open(FieldStoreConfig::in_memory(), dir.path()).expect("open");
        let alice = Principal::new("a@x", Role::A, "Chennai");
        let bob = Principal::new("b@x", Role::B, "Madurai");
        let admin = Principal::new("hq@x", Role::X, "HQ");

        let records = store.records();
        records.create(&alice, &values("Zara")).expect("create");
        records.create(&bob, &values("Bala")).expect("create");
        records.create(&alice, &values("Anu")).expect("create");

        let mine = export_table(records, &alice).expect("export");
        let name_idx = mine.keys.iter().position(|k| k == "name").expect("name column");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine.rows[0][name_idx], "Zara");
        assert_eq!(mine.rows[1][name_idx], "Anu");
        assert_eq!(mine.headers[name_idx], "Name");

        let all = export_table(records, &admin).expect("export");
        assert_eq!(all.len(), 3);
        assert!(all.rows.iter().all(|row| row.len() == all.keys.len()));
    }
}
