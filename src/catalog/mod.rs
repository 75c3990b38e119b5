pub mod schema;
pub mod store;
pub mod types;

pub use schema::{CatalogEdit, FieldCatalog};
pub use store::CatalogStore;
pub use types::{FieldDefinition, FieldKind};

/// Surrogate row identifier. Never a catalog key.
pub const ID_COLUMN: &str = "id";

/// Owner identity of a record.
pub const OWNER_KEY: &str = "owner_email";
/// Access level of the principal that created a record.
pub const ROLE_KEY: &str = "role";
/// Tenant label of the principal that created a record.
pub const TENANT_KEY: &str = "prefix";

/// Fields every catalog must carry. They can be reordered but never renamed
/// or removed.
pub const RESERVED_KEYS: [&str; 3] = [OWNER_KEY, ROLE_KEY, TENANT_KEY];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`. Every key is checked with this before it
/// is quoted into a SQL statement.
pub fn validate_key(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`. Applied to keys
/// read back from a hand-edited catalog file.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{is_reserved, normalize_key, validate_key};
    use proptest::prelude::*;

    #[test]
    fn validate_key_examples() {
        assert!(validate_key("name"));
        assert!(validate_key("_private"));
        assert!(validate_key("GPF_CPS_No"));
        assert!(validate_key("a1"));
        assert!(!validate_key(""));
        assert!(!validate_key("1abc"));
        assert!(!validate_key("has space"));
        assert!(!validate_key("quote\"d"));
        assert!(!validate_key("dash-ed"));
        assert!(!validate_key("naïve"));
    }

    #[test]
    fn normalize_replaces_non_word_characters() {
        assert_eq!(normalize_key("GPF/CPS No"), "GPF_CPS_No");
        assert_eq!(normalize_key("a.b-c"), "a_b_c");
        assert_eq!(normalize_key("clean_key"), "clean_key");
    }

    #[test]
    fn reserved_keys() {
        assert!(is_reserved("owner_email"));
        assert!(is_reserved("role"));
        assert!(is_reserved("prefix"));
        assert!(!is_reserved("name"));
    }

    proptest! {
        #[test]
        fn well_formed_identifiers_validate(key in "[A-Za-z_][A-Za-z0-9_]{0,31}") {
            prop_assert!(validate_key(&key));
        }

        #[test]
        fn validated_keys_never_need_quoting(key in "\\PC{0,16}") {
            if validate_key(&key) {
                prop_assert!(!key.contains('"'));
                prop_assert_eq!(normalize_key(&key), key);
            }
        }

        #[test]
        fn normalized_keys_only_use_word_characters(raw in "\\PC{1,16}") {
            let key = normalize_key(&raw);
            prop_assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }
}
