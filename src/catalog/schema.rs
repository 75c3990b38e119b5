use crate::catalog::types::FieldDefinition;
use crate::catalog::{ID_COLUMN, RESERVED_KEYS, is_reserved, validate_key};
use crate::error::{FieldStoreError, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single edit to the field catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogEdit {
    Append { key: String, label: String },
    /// `position` is zero-based and may equal the catalog length.
    InsertAt {
        position: usize,
        key: String,
        label: String,
    },
    RenameLabel { index: usize, label: String },
    Remove { index: usize },
    MoveUp { index: usize },
    MoveDown { index: usize },
}

impl CatalogEdit {
    /// Whether applying this edit can change the physical column layout.
    pub fn changes_layout(&self) -> bool {
        !matches!(self, CatalogEdit::RenameLabel { .. })
    }
}

/// The ordered set of fields every record carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldDefinition>", into = "Vec<FieldDefinition>")]
pub struct FieldCatalog {
    fields: Vec<FieldDefinition>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self, FieldStoreError> {
        let catalog = Self { fields };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    pub fn key_list(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.key.clone()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn validate(&self) -> Result<(), FieldStoreError> {
        if self.fields.is_empty() {
            return Err(FieldStoreError::Validation(
                "field catalog must contain at least one field".into(),
            ));
        }
        // SQLite column names are ASCII case-insensitive.
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !validate_key(&field.key) || field.key.eq_ignore_ascii_case(ID_COLUMN) {
                return Err(FieldStoreError::Validation(format!(
                    "invalid field key '{}'",
                    field.key
                )));
            }
            if !seen.insert(field.key.to_ascii_lowercase()) {
                return Err(FieldStoreError::Validation(format!(
                    "duplicate field key '{}'",
                    field.key
                )));
            }
        }
        for reserved in RESERVED_KEYS {
            if !self.contains(reserved) {
                return Err(FieldStoreError::Validation(format!(
                    "reserved field '{reserved}' is missing"
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, edit: CatalogEdit) -> Result<(), FieldStoreError> {
        match edit {
            CatalogEdit::Append { key, label } => self.append(FieldDefinition::new(key, label)),
            CatalogEdit::InsertAt {
                position,
                key,
                label,
            } => self.insert_at(position, FieldDefinition::new(key, label)),
            CatalogEdit::RenameLabel { index, label } => self.rename_label(index, label),
            CatalogEdit::Remove { index } => self.remove(index).map(|_| ()),
            CatalogEdit::MoveUp { index } => self.move_up(index),
            CatalogEdit::MoveDown { index } => self.move_down(index),
        }
    }

    pub fn append(&mut self, mut field: FieldDefinition) -> Result<(), FieldStoreError> {
        field.label = field.label.trim().to_string();
        self.check_new_field(&field)?;
        self.fields.push(field);
        Ok(())
    }

    pub fn insert_at(
        &mut self,
        position: usize,
        mut field: FieldDefinition,
    ) -> Result<(), FieldStoreError> {
        field.label = field.label.trim().to_string();
        self.check_new_field(&field)?;
        if position > self.fields.len() {
            return Err(FieldStoreError::Validation(format!(
                "insert position {position} is outside 0..={}",
                self.fields.len()
            )));
        }
        self.fields.insert(position, field);
        Ok(())
    }

    pub fn rename_label(
        &mut self,
        index: usize,
        label: impl Into<String>,
    ) -> Result<(), FieldStoreError> {
        let label = label.into();
        let label = label.trim();
        if label.is_empty() {
            return Err(FieldStoreError::Validation("field label is required".into()));
        }
        let field = self.field_mut(index)?;
        if is_reserved(&field.key) {
            return Err(FieldStoreError::Validation(format!(
                "cannot rename system field '{}'",
                field.key
            )));
        }
        field.label = label.to_string();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<FieldDefinition, FieldStoreError> {
        let field = self.field_mut(index)?;
        if is_reserved(&field.key) {
            return Err(FieldStoreError::Validation(format!(
                "cannot remove system field '{}'",
                field.key
            )));
        }
        Ok(self.fields.remove(index))
    }

    pub fn move_up(&mut self, index: usize) -> Result<(), FieldStoreError> {
        self.field_mut(index)?;
        if index == 0 {
            return Err(FieldStoreError::Validation(
                "first field cannot move up".into(),
            ));
        }
        self.fields.swap(index - 1, index);
        Ok(())
    }

    pub fn move_down(&mut self, index: usize) -> Result<(), FieldStoreError> {
        self.field_mut(index)?;
        if index + 1 == self.fields.len() {
            return Err(FieldStoreError::Validation(
                "last field cannot move down".into(),
            ));
        }
        self.fields.swap(index, index + 1);
        Ok(())
    }

    fn field_mut(&mut self, index: usize) -> Result<&mut FieldDefinition, FieldStoreError> {
        self.fields
            .get_mut(index)
            .ok_or_else(|| FieldStoreError::NotFound {
                resource_type: ResourceType::Field,
                resource_id: index.to_string(),
            })
    }

    fn check_new_field(&self, field: &FieldDefinition) -> Result<(), FieldStoreError> {
        if field.key.is_empty() || field.label.is_empty() {
            return Err(FieldStoreError::Validation(
                "field key and label are required".into(),
            ));
        }
        if !validate_key(&field.key) {
            return Err(FieldStoreError::Validation(format!(
                "invalid field key '{}': use letters, digits and underscores, not starting with a digit",
                field.key
            )));
        }
        if field.key.eq_ignore_ascii_case(ID_COLUMN) {
            return Err(FieldStoreError::Validation(format!(
                "field key '{ID_COLUMN}' is used by the record identifier"
            )));
        }
        if self
            .fields
            .iter()
            .any(|f| f.key.eq_ignore_ascii_case(&field.key))
        {
            return Err(FieldStoreError::Validation(format!(
                "duplicate field key '{}'",
                field.key
            )));
        }
        Ok(())
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self {
            fields: DEFAULT_FIELDS
                .iter()
                .map(|(key, label)| FieldDefinition::new(*key, *label))
                .collect(),
        }
    }
}

impl TryFrom<Vec<FieldDefinition>> for FieldCatalog {
    type Error = FieldStoreError;

    fn try_from(fields: Vec<FieldDefinition>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<FieldCatalog> for Vec<FieldDefinition> {
    fn from(catalog: FieldCatalog) -> Self {
        catalog.fields
    }
}

const DEFAULT_FIELDS: &[(&str, &str)] = &[
    ("prefix", "Team Prefix"),
    ("sno", "S.No"),
    ("GPF_CPS_No", "GPF/CPS No"),
    ("IFHRMS_No", "IFHRMS No"),
    ("Salutation", "Salutation"),
    ("name", "Name"),
    ("father_name", "Father's Name"),
    ("dob", "Date of Birth"),
    ("gender", "Gender"),
    ("Mobile_no", "CUG Mobile No"),
    ("Email_ID", "Email ID"),
    ("PAN_No", "PAN No"),
    ("Aadhar_No", "Aadhar No"),
    ("Designation", "Designation"),
    ("Marital_Status", "Marital Status"),
    ("Native_Place_District", "Native Place/District"),
    ("address", "Address"),
    ("Police_Station_Limit", "Police Station Limit"),
    ("Native_Assembly", "Native Assembly"),
    ("Blood_Group", "Blood Group"),
    ("Date_of_Entry_into_service", "Date of Entry into service"),
    ("Date_of_Retirement", "Date of Retirement"),
    ("Appointment_Rank", "Appointment Rank"),
    ("Direct_20_Rank_Promoted_ACP", "Direct/20%/Rank Promoted/ACP"),
    (
        "Date_of_Promotion_in_Present_Rank",
        "Date of Promotion in Present Rank",
    ),
    (
        "Date_of_Completion_of_Probation",
        "Date of Completion of Probation",
    ),
    (
        "Religion_Hindu_Muslim_Christian",
        "Religion(Hindu/Muslim/Christian)",
    ),
    ("Community_SC_ST_BC_MBC", "Community (SC/ST/BC/MBC)"),
    ("Caste", "Caste"),
    ("Educational_Qualification", "Educational Qualification"),
    (
        "Additional_Technical_Qualification",
        "Additional/Technical Qualification",
    ),
    ("Languages_Known", "Languages Known"),
    ("Law_Mark", "Law Mark"),
    ("Rewards", "Rewards"),
    ("Medals_Received", "Medals Received"),
    ("Default", "Default"),
    ("Present_Station", "Present Station"),
    (
        "Date_of_Relieving_on_Formerly_District_City",
        "Date of Relieving on Formerly District/City",
    ),
    ("Date_of_Joining_in_ATS", "Date of Joining in ATS"),
    ("ATS_Unit", "ATS Unit"),
    ("bank", "Bank Name"),
    ("account", "Account No"),
    ("ifsc", "IFSC"),
    ("remarks", "Remarks"),
    ("date_increment", "Date of Increment"),
    ("notify_days_increment", "Notify Days Before Increment"),
    ("date_superannuation", "Date of Superannuation"),
    (
        "notify_days_superannuation",
        "Notify Days Before Superannuation",
    ),
    ("role", "Role"),
    ("owner_email", "Owner Email"),
];
