use crate::catalog::validate_key;
use crate::error::FieldStoreError;
use crate::query::plan::{Expr, Query};

/// A query rendered to SQLite text with positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<String>,
}

/// Quotes an identifier after checking it against the key grammar.
pub fn quote_ident(name: &str) -> Result<String, FieldStoreError> {
    if !validate_key(name) {
        return Err(FieldStoreError::Validation(format!(
            "refusing to use '{name}' as a column or table name"
        )));
    }
    Ok(format!("\"{name}\""))
}

pub fn compile_expr(expr: &Expr, params: &mut Vec<String>) -> Result<String, FieldStoreError> {
    Ok(match expr {
        Expr::Eq(column, value) => {
            params.push(value.clone());
            format!("{} = ?{}", quote_ident(column)?, params.len())
        }
        Expr::Like(column, pattern) => {
            params.push(pattern.clone());
            format!("{} LIKE ?{} ESCAPE '\\'", quote_ident(column)?, params.len())
        }
        Expr::And(left, right) => format!(
            "({} AND {})",
            compile_expr(left, params)?,
            compile_expr(right, params)?
        ),
        Expr::Or(left, right) => format!(
            "({} OR {})",
            compile_expr(left, params)?,
            compile_expr(right, params)?
        ),
    })
}

pub fn compile_select(query: &Query) -> Result<CompiledQuery, FieldStoreError> {
    let mut params = Vec::new();
    let mut sql = format!("SELECT * FROM {}", quote_ident(&query.table)?);
    if let Some(predicate) = &query.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(&compile_expr(predicate, &mut params)?);
    }
    if !query.order_by.is_empty() {
        let order = query
            .order_by
            .iter()
            .map(|(column, order)| Ok(format!("{} {}", quote_ident(column)?, order.as_sql())))
            .collect::<Result<Vec<_>, FieldStoreError>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    match (query.limit, query.offset) {
        (Some(limit), offset) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
        (None, 0) => {}
        (None, offset) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
    }
    Ok(CompiledQuery { sql, params })
}

#[cfg(test)]
mod tests {
    use super::{compile_select, quote_ident};
    use crate::query::plan::{Expr, Order, Query, col};

    #[test]
    fn compiles_scoped_search() {
        let query = Query::select_all()
            .from("records")
            .where_(
                col("owner_email").eq("a@x").and(
                    Expr::any(vec![col("name").contains("ann"), col("sno").contains("ann")])
                        .expect("terms"),
                ),
            )
            .order_by("sno", Order::Asc)
            .order_by("id", Order::Asc);
        let compiled = compile_select(&query).expect("compile");
        assert_eq!(
            compiled.sql,
            "SELECT * FROM \"records\" WHERE (\"owner_email\" = ?1 AND (\"name\" LIKE ?2 ESCAPE '\\' OR \"sno\" LIKE ?3 ESCAPE '\\')) ORDER BY \"sno\" ASC, \"id\" ASC"
        );
        assert_eq!(compiled.params, ["a@x", "%ann%", "%ann%"]);
    }

    #[test]
    fn paging_clauses() {
        let q = Query::select_all().from("t").limit(10).offset(20);
        assert!(compile_select(&q).expect("compile").sql.ends_with("LIMIT 10 OFFSET 20"));
        let q = Query::select_all().from("t").offset(5);
        assert!(compile_select(&q).expect("compile").sql.ends_with("LIMIT -1 OFFSET 5"));
    }

    #[test]
    fn rejects_unvalidated_identifiers() {
        assert!(quote_ident("x\" OR 1=1 --").is_err());
        let q = Query::select_all()
            .from("records")
            .where_(col("bad name").eq("v"));
        assert!(compile_select(&q).is_err());
        let q = Query::select_all().from("records; DROP TABLE records");
        assert!(compile_select(&q).is_err());
    }
}
