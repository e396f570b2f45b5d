//! Schema confirmation workflow for one file

use tracing::debug;

use super::override_store::{KeyValueBackend, SchemaOverrideStore, SchemaStatus};
use super::{ColumnSchema, ColumnType};
use crate::DataError;

/// Draft of a file schema being reviewed by the user
///
/// Any modification moves the file to `editing`; `save` writes the draft
/// as the override and confirms it, `cancel` throws the draft away.
pub struct SchemaEditor<'a, B: KeyValueBackend> {
    store: &'a SchemaOverrideStore<B>,
    file_id: String,
    inferred: Vec<ColumnSchema>,
    draft: Vec<ColumnSchema>,
}

impl<'a, B: KeyValueBackend> SchemaEditor<'a, B> {
    /// Open an editor seeded with the effective schema of `file_id`
    pub fn new(
        store: &'a SchemaOverrideStore<B>,
        file_id: impl Into<String>,
        inferred: Vec<ColumnSchema>,
    ) -> Self {
        let file_id = file_id.into();
        let draft = store.effective_schema(&file_id, &inferred);
        Self {
            store,
            file_id,
            inferred,
            draft,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn draft(&self) -> &[ColumnSchema] {
        &self.draft
    }

    pub fn status(&self) -> SchemaStatus {
        self.store.status(&self.file_id)
    }

    /// Enter `editing`
    pub fn begin_edit(&mut self) -> Result<(), DataError> {
        if self.status() != SchemaStatus::Editing {
            self.store.set_status(&self.file_id, SchemaStatus::Editing)?;
        }
        Ok(())
    }

    pub fn set_column_type(
        &mut self,
        column: &str,
        column_type: ColumnType,
    ) -> Result<(), DataError> {
        let index = self.column_index(column)?;
        self.begin_edit()?;
        self.draft[index].column_type = column_type;
        debug!("Draft column '{}' of '{}' set to {}", column, self.file_id, column_type);
        Ok(())
    }

    pub fn rename_column(&mut self, column: &str, new_name: &str) -> Result<(), DataError> {
        let index = self.column_index(column)?;
        if column != new_name && self.draft.iter().any(|c| c.name == new_name) {
            return Err(DataError::DuplicateColumn(new_name.to_string()));
        }
        self.begin_edit()?;
        self.draft[index].name = new_name.to_string();
        Ok(())
    }

    /// Replace the draft with the inferred schema
    pub fn reset_to_inferred(&mut self) -> Result<(), DataError> {
        self.begin_edit()?;
        self.draft = self.inferred.clone();
        Ok(())
    }

    /// Drop the draft and leave `editing`
    pub fn cancel(&mut self) -> Result<(), DataError> {
        self.draft = self.store.effective_schema(&self.file_id, &self.inferred);
        let status = if self.store.has_override(&self.file_id) {
            SchemaStatus::Confirmed
        } else {
            SchemaStatus::Unconfirmed
        };
        self.store.set_status(&self.file_id, status)
    }

    /// Save the draft as the file's override
    pub fn save(&mut self) -> Result<(), DataError> {
        self.store.save_override(&self.file_id, &self.draft)
    }

    fn column_index(&self, column: &str) -> Result<usize, DataError> {
        self.draft
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| DataError::UnknownColumn(column.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::infer_schema;

    fn inferred() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("id", ColumnType::Int),
            ColumnSchema::new("amount", ColumnType::Float),
            ColumnSchema::new("joined", ColumnType::Date),
        ]
    }

    #[test]
    fn test_edit_and_save() {
        let store = SchemaOverrideStore::in_memory();
        store.register_file("f.csv").unwrap();

        let mut editor = SchemaEditor::new(&store, "f.csv", inferred());
        assert_eq!(editor.status(), SchemaStatus::Unconfirmed);

        editor.set_column_type("amount", ColumnType::String).unwrap();
        assert_eq!(editor.status(), SchemaStatus::Editing);
        // nothing persisted until save
        assert!(store.load_override("f.csv").is_none());

        editor.save().unwrap();
        assert_eq!(store.status("f.csv"), SchemaStatus::Confirmed);
        assert_eq!(store.load_override("f.csv").unwrap()[1].column_type, ColumnType::String);
    }

    #[test]
    fn test_cancel_restores_previous_state() {
        let store = SchemaOverrideStore::in_memory();
        let mut editor = SchemaEditor::new(&store, "f.csv", inferred());
        editor.set_column_type("id", ColumnType::String).unwrap();
        editor.cancel().unwrap();
        assert_eq!(editor.status(), SchemaStatus::Unconfirmed);
        assert_eq!(editor.draft(), inferred().as_slice());

        editor.save().unwrap();
        editor.rename_column("id", "user_id").unwrap();
        editor.cancel().unwrap();
        assert_eq!(editor.status(), SchemaStatus::Confirmed);
        assert_eq!(editor.draft()[0].name, "id");
    }

    #[test]
    fn test_rename_rejects_duplicates() {
        let store = SchemaOverrideStore::in_memory();
        let mut editor = SchemaEditor::new(&store, "f.csv", inferred());
        assert!(matches!(
            editor.rename_column("id", "amount"),
            Err(DataError::DuplicateColumn(_))
        ));
        assert!(matches!(
            editor.set_column_type("missing", ColumnType::Int),
            Err(DataError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_reset_to_inferred() {
        let store = SchemaOverrideStore::in_memory();
        store
            .save_override("f.csv", &[ColumnSchema::new("id", ColumnType::String)])
            .unwrap();

        let mut editor = SchemaEditor::new(&store, "f.csv", inferred());
        assert_eq!(editor.draft().len(), 1);
        editor.reset_to_inferred().unwrap();
        assert_eq!(editor.draft(), inferred().as_slice());
        assert_eq!(editor.status(), SchemaStatus::Editing);
    }

    #[test]
    fn test_csv_upload_scenario() {
        let rows = vec![vec!["1".to_string(), "19.99".to_string(), "2024-03-01".to_string()]];
        let columns: Vec<String> =
            ["id", "amount", "joined"].iter().map(|s| s.to_string()).collect();
        let schema = infer_schema(&rows, &columns);
        assert_eq!(schema, inferred());

        let store = SchemaOverrideStore::in_memory();
        let mut editor = SchemaEditor::new(&store, "upload.csv", schema);
        editor.set_column_type("amount", ColumnType::String).unwrap();
        editor.save().unwrap();

        let saved = store.load_override("upload.csv").unwrap();
        assert_eq!(saved[1], ColumnSchema::new("amount", ColumnType::String));
        assert_eq!(store.status("upload.csv"), SchemaStatus::Confirmed);
    }
}
