//! `Search`/`ResultOption` → parameterized SQL projection (§4.2.1).

use super::{ResultOption, ResultOptionItem, Search};
use crate::error::Result;
use crate::layout::RowLayout;
use crate::value::Value;

/// Quotes identifiers for a concrete SQL dialect. This crate ships a default double-quote
/// (ANSI/SQLite/Postgres) quoter; a driver crate can supply its own (backtick for MySQL,
/// bracket for T-SQL) without this crate depending on it.
pub trait Quoting {
	fn quote_identifier(&self, identifier: &str) -> String;
}

/// ANSI-style `"identifier"` quoting, doubling embedded quotes.
pub struct AnsiQuoting;

impl Quoting for AnsiQuoting {
	fn quote_identifier(&self, identifier: &str) -> String {
		format!("\"{}\"", identifier.replace('"', "\"\""))
	}
}

impl Search {
	/// Renders this predicate as a parameterized `WHERE`-clause fragment: `?` placeholders in
	/// declaration order, paired with the bound values in the same order. Never interpolates a
	/// value directly into the text.
	pub fn to_sql(&self, layout: &RowLayout, quoting: &dyn Quoting) -> Result<(String, Vec<Value>)> {
		let mut params = Vec::new();
		let sql = self.render(layout, quoting, &mut params)?;
		Ok((sql, params))
	}

	fn render(&self, layout: &RowLayout, quoting: &dyn Quoting, params: &mut Vec<Value>) -> Result<String> {
		use Search::*;
		let column = |name: &str| -> Result<String> {
			layout.require_field_index(name, false)?;
			Ok(quoting.quote_identifier(name))
		};
		Ok(match self {
			None { inverted } => {
				if *inverted {
					"1=0".to_string()
				} else {
					"1=1".to_string()
				}
			}
			Equals { name, value, inverted } => {
				params.push(value.clone());
				format!("{} {} ?", column(name)?, if *inverted { "!=" } else { "=" })
			}
			Like { name, pattern, inverted } => {
				params.push(Value::String(pattern.clone()));
				format!("{} {} ?", column(name)?, if *inverted { "NOT LIKE" } else { "LIKE" })
			}
			Greater { name, value, inverted } => {
				params.push(value.clone());
				format!("{} {} ?", column(name)?, if *inverted { "<=" } else { ">" })
			}
			GreaterOrEqual { name, value, inverted } => {
				params.push(value.clone());
				format!("{} {} ?", column(name)?, if *inverted { "<" } else { ">=" })
			}
			Smaller { name, value, inverted } => {
				params.push(value.clone());
				format!("{} {} ?", column(name)?, if *inverted { ">=" } else { "<" })
			}
			SmallerOrEqual { name, value, inverted } => {
				params.push(value.clone());
				format!("{} {} ?", column(name)?, if *inverted { ">" } else { "<=" })
			}
			In { name, values, inverted } => {
				if values.is_empty() {
					return Ok(if *inverted { "1=1".to_string() } else { "1=0".to_string() });
				}
				let placeholders = std::iter::repeat("?").take(values.len()).collect::<Vec<_>>().join(", ");
				params.extend(values.iter().cloned());
				format!("{} {}IN ({placeholders})", column(name)?, if *inverted { "NOT " } else { "" })
			}
			And { left, right, inverted } => {
				let l = left.render(layout, quoting, params)?;
				let r = right.render(layout, quoting, params)?;
				format!("{}({l} AND {r})", if *inverted { "NOT " } else { "" })
			}
			Or { left, right, inverted } => {
				let l = left.render(layout, quoting, params)?;
				let r = right.render(layout, quoting, params)?;
				format!("{}({l} OR {r})", if *inverted { "NOT " } else { "" })
			}
		})
	}
}

impl ResultOption {
	/// Renders `ORDER BY … LIMIT … OFFSET …`. `Group` items are skipped: SQL expresses grouping
	/// through `GROUP BY`/aggregate projections a driver builds itself, not through this crate's
	/// row-level dedup semantics.
	pub fn to_sql(&self, layout: &RowLayout, quoting: &dyn Quoting) -> Result<String> {
		let mut clauses = Vec::new();

		let sorts: Vec<String> = self
			.items()
			.iter()
			.filter_map(|item| match item {
				ResultOptionItem::SortAsc(name) => Some((name, "ASC")),
				ResultOptionItem::SortDesc(name) => Some((name, "DESC")),
				_ => None,
			})
			.map(|(name, dir)| -> Result<String> {
				layout.require_field_index(name, false)?;
				Ok(format!("{} {dir}", quoting.quote_identifier(name)))
			})
			.collect::<Result<Vec<_>>>()?;
		if !sorts.is_empty() {
			clauses.push(format!("ORDER BY {}", sorts.join(", ")));
		}

		for item in self.items() {
			match item {
				ResultOptionItem::Limit(n) => clauses.push(format!("LIMIT {n}")),
				ResultOptionItem::Offset(n) => clauses.push(format!("OFFSET {n}")),
				_ => {}
			}
		}

		if clauses.is_empty() {
			return Ok(String::new());
		}
		Ok(clauses.join(" "))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::layout::LayoutBuilder;
	use crate::types::DataType;

	fn layout() -> RowLayout {
		LayoutBuilder::new("Item")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
			.field(FieldProperties::new(1, "amount", DataType::Int64, FieldFlags::empty()))
			.build()
			.unwrap()
	}

	#[test]
	fn renders_parameterized_where_clause() {
		let layout = layout();
		let search = Search::greater("amount", Value::Int64(1)) & Search::equals("id", Value::Int64(2));
		let (sql, params) = search.to_sql(&layout, &AnsiQuoting).unwrap();
		assert_eq!(sql, "(\"amount\" > ? AND \"id\" = ?)");
		assert_eq!(params, vec![Value::Int64(1), Value::Int64(2)]);
	}

	#[test]
	fn renders_order_by_limit_offset() {
		let layout = layout();
		let opts = ResultOption::new().sort_desc("amount").unwrap().limit(10).unwrap().offset(5).unwrap();
		let sql = opts.to_sql(&layout, &AnsiQuoting).unwrap();
		assert_eq!(sql, "ORDER BY \"amount\" DESC LIMIT 10 OFFSET 5");
	}
}
