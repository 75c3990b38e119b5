use crate::catalog::{FieldCatalog, OWNER_KEY};
use crate::permission::Principal;
use crate::query::plan::{Expr, col};

/// Which rows a principal may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityPredicate {
    AllRows,
    OwnedBy(String),
}

impl VisibilityPredicate {
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.is_elevated() {
            VisibilityPredicate::AllRows
        } else {
            VisibilityPredicate::OwnedBy(principal.identity.clone())
        }
    }

    pub fn to_expr(&self) -> Option<Expr> {
        match self {
            VisibilityPredicate::AllRows => None,
            VisibilityPredicate::OwnedBy(identity) => Some(col(OWNER_KEY).eq(identity.as_str())),
        }
    }

    pub fn admits(&self, owner_identity: &str) -> bool {
        match self {
            VisibilityPredicate::AllRows => true,
            VisibilityPredicate::OwnedBy(identity) => identity == owner_identity,
        }
    }
}

/// Row visibility plus the fields free-text search may look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessScope {
    pub visibility: VisibilityPredicate,
    pub searchable_fields: Vec<String>,
}

impl AccessScope {
    pub fn resolve(principal: &Principal, catalog: &FieldCatalog) -> Self {
        Self {
            visibility: VisibilityPredicate::for_principal(principal),
            searchable_fields: searchable_fields(catalog),
        }
    }

    /// `None` for an empty or all-blank term.
    pub fn search_expr(&self, term: &str) -> Option<Expr> {
        let term = term.trim();
        if term.is_empty() {
            return None;
        }
        Expr::any(
            self.searchable_fields
                .iter()
                .map(|field| col(field).contains(term)),
        )
    }
}

/// Every catalog key except the owner identity, in catalog order. Owner
/// identities are never matched by free text so other tenants' addresses
/// cannot be probed through search.
pub fn searchable_fields(catalog: &FieldCatalog) -> Vec<String> {
    catalog
        .keys()
        .filter(|key| *key != OWNER_KEY)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{AccessScope, VisibilityPredicate, searchable_fields};
    use crate::catalog::FieldCatalog;
    use crate::permission::{Principal, Role};
    use crate::query::plan::Expr;

    #[test]
    fn elevated_sees_all_rows() {
        let hq = Principal::new("hq@x", Role::X, "HQ");
        assert_eq!(
            VisibilityPredicate::for_principal(&hq),
            VisibilityPredicate::AllRows
        );
        assert_eq!(VisibilityPredicate::AllRows.to_expr(), None);
    }

    #[test]
    fn others_see_only_their_rows() {
        let unit = Principal::new("unit@x", Role::A, "Chennai");
        let vis = VisibilityPredicate::for_principal(&unit);
        assert_eq!(
            vis.to_expr(),
            Some(Expr::Eq("owner_email".into(), "unit@x".into()))
        );
        assert!(vis.admits("unit@x"));
        assert!(!vis.admits("hq@x"));
    }

    #[test]
    fn owner_identity_is_not_searchable() {
        let catalog = FieldCatalog::default();
        let fields = searchable_fields(&catalog);
        assert_eq!(fields.len(), catalog.len() - 1);
        assert!(!fields.iter().any(|f| f == "owner_email"));
        assert!(fields.iter().any(|f| f == "role"));
    }

    #[test]
    fn blank_terms_do_not_filter() {
        let scope = AccessScope::resolve(&Principal::new("a@x", Role::A, "T"), &FieldCatalog::default());
        assert_eq!(scope.search_expr(""), None);
        assert_eq!(scope.search_expr("   "), None);
        let expr = scope.search_expr("kumar").expect("expr");
        assert_eq!(expr.columns().len(), scope.searchable_fields.len());
    }
}
