pub mod plan;
pub mod planner;
pub mod scope;

use crate::catalog::{FieldCatalog, ID_COLUMN};
use crate::query::plan::{Order, Query};
use crate::query::scope::AccessScope;

/// Builds the listing query for one principal: visibility always applies,
/// the free-text term only when non-blank. Rows are ordered by the sequence
/// field when the catalog has it, then by identifier.
pub fn build_list_query(
    table: &str,
    sequence_field: &str,
    catalog: &FieldCatalog,
    scope: &AccessScope,
    term: &str,
) -> Query {
    let mut query = Query::select_all().from(table);
    if let Some(visibility) = scope.visibility.to_expr() {
        query = query.and_where(visibility);
    }
    if let Some(search) = scope.search_expr(term) {
        query = query.and_where(search);
    }
    if catalog.contains(sequence_field) {
        query = query.order_by(sequence_field, Order::Asc);
    }
    query.order_by(ID_COLUMN, Order::Asc)
}
