//! C5 — the query algebra: a composable predicate tree ([`Search`]) and a result-shaping
//! grammar ([`ResultOption`]), with a scan interpreter for the in-memory engine and a
//! projection to parameterized SQL (§4.2, §4.2.1).

mod pattern;
mod sql;

pub use pattern::compile_like_pattern;
pub use sql::{AnsiQuoting, Quoting};

use std::ops::{BitAnd, BitOr, Not};

use crate::error::Result;
use crate::layout::RowLayout;
use crate::value::Value;

/// An immutable predicate over a row's field values. Every comparison variant carries its own
/// `inverted` flag rather than wrapping nodes in a separate `Not`, per the "Search tree" design
/// note (§9): this keeps normal forms (`field == x`, not `Not(Equals(field, x))`) cheap to build
/// and to match on.
#[derive(Debug, Clone)]
pub enum Search {
	None { inverted: bool },
	Equals { name: String, value: Value, inverted: bool },
	Like { name: String, pattern: String, inverted: bool },
	Greater { name: String, value: Value, inverted: bool },
	GreaterOrEqual { name: String, value: Value, inverted: bool },
	Smaller { name: String, value: Value, inverted: bool },
	SmallerOrEqual { name: String, value: Value, inverted: bool },
	In { name: String, values: Vec<Value>, inverted: bool },
	And { left: Box<Search>, right: Box<Search>, inverted: bool },
	Or { left: Box<Search>, right: Box<Search>, inverted: bool },
}

impl Search {
	pub fn none() -> Self {
		Search::None { inverted: false }
	}

	pub fn equals(name: impl Into<String>, value: Value) -> Self {
		Search::Equals { name: name.into(), value, inverted: false }
	}

	pub fn like(name: impl Into<String>, pattern: impl Into<String>) -> Self {
		Search::Like { name: name.into(), pattern: pattern.into(), inverted: false }
	}

	pub fn greater(name: impl Into<String>, value: Value) -> Self {
		Search::Greater { name: name.into(), value, inverted: false }
	}

	pub fn greater_or_equal(name: impl Into<String>, value: Value) -> Self {
		Search::GreaterOrEqual { name: name.into(), value, inverted: false }
	}

	pub fn smaller(name: impl Into<String>, value: Value) -> Self {
		Search::Smaller { name: name.into(), value, inverted: false }
	}

	pub fn smaller_or_equal(name: impl Into<String>, value: Value) -> Self {
		Search::SmallerOrEqual { name: name.into(), value, inverted: false }
	}

	pub fn in_set(name: impl Into<String>, values: Vec<Value>) -> Self {
		Search::In { name: name.into(), values, inverted: false }
	}

	fn inverted(&self) -> bool {
		use Search::*;
		match self {
			None { inverted }
			| Equals { inverted, .. }
			| Like { inverted, .. }
			| Greater { inverted, .. }
			| GreaterOrEqual { inverted, .. }
			| Smaller { inverted, .. }
			| SmallerOrEqual { inverted, .. }
			| In { inverted, .. }
			| And { inverted, .. }
			| Or { inverted, .. } => *inverted,
		}
	}

	/// Validates that every field name this tree references exists in `layout`, coercing nothing
	/// (values are expected to already hold the field's declared [`Value`] variant — this crate's
	/// API is statically typed, unlike the text-driven `ParseValue` coercion the design note
	/// describes for a loosely-typed host). Mirrors `LoadLayout`'s idempotent field-presence check.
	pub fn bind(&self, layout: &RowLayout) -> Result<()> {
		use Search::*;
		match self {
			None { .. } => Ok(()),
			Equals { name, .. }
			| Like { name, .. }
			| Greater { name, .. }
			| GreaterOrEqual { name, .. }
			| Smaller { name, .. }
			| SmallerOrEqual { name, .. }
			| In { name, .. } => layout.require_field_index(name, false).map(|_| ()),
			And { left, right, .. } | Or { left, right, .. } => {
				left.bind(layout)?;
				right.bind(layout)
			}
		}
	}

	/// Evaluates this predicate against a single row, ignoring indices (`Search::Check`, §8
	/// property 5). Used by tests and by back-ends that cannot execute [`Search::scan`] directly.
	pub fn check(&self, layout: &RowLayout, row: &crate::row::Row) -> Result<bool> {
		use Search::*;
		let positive = match self {
			None { .. } => true,
			Equals { name, value, .. } => {
				let idx = layout.require_field_index(name, false)?;
				row.get(idx) == Some(value)
			}
			Like { name, pattern, .. } => {
				let idx = layout.require_field_index(name, false)?;
				let re = pattern::compile_like_pattern(pattern);
				matches!(row.get(idx), Some(Value::String(s)) | Some(Value::User(s)) if re.is_match(s))
			}
			Greater { name, value, .. } => compare(layout, row, name, value)? == std::cmp::Ordering::Greater,
			GreaterOrEqual { name, value, .. } => compare(layout, row, name, value)? != std::cmp::Ordering::Less,
			Smaller { name, value, .. } => compare(layout, row, name, value)? == std::cmp::Ordering::Less,
			SmallerOrEqual { name, value, .. } => compare(layout, row, name, value)? != std::cmp::Ordering::Greater,
			In { name, values, .. } => {
				let idx = layout.require_field_index(name, false)?;
				let actual = row.get(idx);
				values.iter().any(|v| actual == Some(v))
			}
			And { left, right, .. } => left.check(layout, row)? && right.check(layout, row)?,
			Or { left, right, .. } => left.check(layout, row)? || right.check(layout, row)?,
		};
		Ok(positive ^ self.inverted())
	}

	/// Returns the positions (in `source`'s row order) that match this predicate within `scope`,
	/// or the whole table when `scope` is `None` (`Scan`, §4.2).
	pub fn scan(&self, layout: &RowLayout, source: &dyn ScanSource, scope: Option<&[usize]>) -> Result<Vec<usize>> {
		let scope_vec: Vec<usize> = match scope {
			Some(s) => s.to_vec(),
			None => (0..source.len()).collect(),
		};
		let positive = self.positive_positions(layout, source, &scope_vec)?;
		Ok(if self.inverted() { diff_preserving_order(&scope_vec, &positive) } else { positive })
	}

	fn positive_positions(&self, layout: &RowLayout, source: &dyn ScanSource, scope: &[usize]) -> Result<Vec<usize>> {
		use Search::*;
		match self {
			None { .. } => Ok(scope.to_vec()),
			Equals { name, value, .. } => {
				let idx = layout.require_field_index(name, false)?;
				match source.index_lookup(idx, value) {
					Some(positions) => Ok(intersect_preserving_order(scope, &positions)),
					None => Ok(scope.iter().copied().filter(|&p| source.row_at(p).get(idx) == Some(value)).collect()),
				}
			}
			Like { name, pattern, .. } => {
				let idx = layout.require_field_index(name, false)?;
				let re = pattern::compile_like_pattern(pattern);
				Ok(scope
					.iter()
					.copied()
					.filter(|&p| matches!(source.row_at(p).get(idx), Some(Value::String(s)) | Some(Value::User(s)) if re.is_match(s)))
					.collect())
			}
			Greater { name, value, .. } => scan_range(layout, source, scope, name, value, std::cmp::Ordering::Greater, false),
			GreaterOrEqual { name, value, .. } => scan_range(layout, source, scope, name, value, std::cmp::Ordering::Less, true),
			Smaller { name, value, .. } => scan_range(layout, source, scope, name, value, std::cmp::Ordering::Less, false),
			SmallerOrEqual { name, value, .. } => scan_range(layout, source, scope, name, value, std::cmp::Ordering::Greater, true),
			In { name, values, .. } => {
				let mut seen = nohash_hasher::IntSet::default();
				let mut out = Vec::new();
				for value in values {
					let eq = Search::Equals { name: name.clone(), value: value.clone(), inverted: false };
					for pos in eq.positive_positions(layout, source, scope)? {
						if seen.insert(pos as u64) {
							out.push(pos);
						}
					}
				}
				out.sort_unstable();
				Ok(out)
			}
			And { left, right, .. } => {
				let l = left.scan(layout, source, Some(scope))?;
				right.scan(layout, source, Some(&l))
			}
			Or { left, right, .. } => {
				let l = left.scan(layout, source, Some(scope))?;
				let r = right.scan(layout, source, Some(scope))?;
				Ok(union_preserving_order(scope, &l, &r))
			}
		}
	}
}

fn compare(layout: &RowLayout, row: &crate::row::Row, name: &str, value: &Value) -> Result<std::cmp::Ordering> {
	let idx = layout.require_field_index(name, false)?;
	let actual = row.get(idx).unwrap_or(&Value::Null);
	Ok(actual.cmp(value))
}

#[allow(clippy::too_many_arguments)]
fn scan_range(
	layout: &RowLayout,
	source: &dyn ScanSource,
	scope: &[usize],
	name: &str,
	value: &Value,
	excluded: std::cmp::Ordering,
	or_equal: bool,
) -> Result<Vec<usize>> {
	let idx = layout.require_field_index(name, false)?;
	Ok(scope
		.iter()
		.copied()
		.filter(|&p| {
			let actual = source.row_at(p).get(idx).unwrap_or(&Value::Null);
			let ord = actual.cmp(value);
			if ord == std::cmp::Ordering::Equal {
				or_equal
			} else {
				ord != excluded
			}
		})
		.collect())
}

fn intersect_preserving_order(scope: &[usize], other: &[usize]) -> Vec<usize> {
	let other: nohash_hasher::IntSet<u64> = other.iter().map(|&p| p as u64).collect();
	scope.iter().copied().filter(|p| other.contains(&(*p as u64))).collect()
}

fn union_preserving_order(scope: &[usize], a: &[usize], b: &[usize]) -> Vec<usize> {
	let set: nohash_hasher::IntSet<u64> = a.iter().chain(b.iter()).map(|&p| p as u64).collect();
	scope.iter().copied().filter(|p| set.contains(&(*p as u64))).collect()
}

fn diff_preserving_order(scope: &[usize], positive: &[usize]) -> Vec<usize> {
	let positive: nohash_hasher::IntSet<u64> = positive.iter().map(|&p| p as u64).collect();
	scope.iter().copied().filter(|p| !positive.contains(&(*p as u64))).collect()
}

/// What [`Search::scan`] needs from a storage back-end: row access by position and an optional
/// index lookup. Implemented by [`crate::memory::MemoryTable`]; a SQL back-end would instead use
/// [`Search::to_sql`] and never call this trait.
pub trait ScanSource {
	fn len(&self) -> usize;
	fn row_at(&self, position: usize) -> &crate::row::Row;
	/// Positions whose field `field_index` equals `value`, if that field carries an index.
	fn index_lookup(&self, field_index: usize, value: &Value) -> Option<Vec<usize>>;
}

impl Not for Search {
	type Output = Search;
	fn not(self) -> Search {
		use Search::*;
		match self {
			None { inverted } => None { inverted: !inverted },
			Equals { name, value, inverted } => Equals { name, value, inverted: !inverted },
			Like { name, pattern, inverted } => Like { name, pattern, inverted: !inverted },
			Greater { name, value, inverted } => Greater { name, value, inverted: !inverted },
			GreaterOrEqual { name, value, inverted } => GreaterOrEqual { name, value, inverted: !inverted },
			Smaller { name, value, inverted } => Smaller { name, value, inverted: !inverted },
			SmallerOrEqual { name, value, inverted } => SmallerOrEqual { name, value, inverted: !inverted },
			In { name, values, inverted } => In { name, values, inverted: !inverted },
			And { left, right, inverted } => And { left, right, inverted: !inverted },
			Or { left, right, inverted } => Or { left, right, inverted: !inverted },
		}
	}
}

impl BitAnd for Search {
	type Output = Search;
	/// `&` short-circuits on `None`: combining with a non-inverted tautology returns the other side.
	fn bitand(self, rhs: Search) -> Search {
		match (is_tautology(&self), is_tautology(&rhs)) {
			(true, _) => rhs,
			(_, true) => self,
			_ => Search::And { left: Box::new(self), right: Box::new(rhs), inverted: false },
		}
	}
}

impl BitOr for Search {
	type Output = Search;
	fn bitor(self, rhs: Search) -> Search {
		match (is_tautology(&self), is_tautology(&rhs)) {
			(true, _) => self,
			(_, true) => rhs,
			_ => Search::Or { left: Box::new(self), right: Box::new(rhs), inverted: false },
		}
	}
}

fn is_tautology(search: &Search) -> bool {
	matches!(search, Search::None { inverted: false })
}

impl std::fmt::Display for Search {
	/// The debug/display textual form from §4.2.1's sibling design note: `field OP 'value'`,
	/// combinators parenthesized with a leading `NOT` when inverted. Not a parser input.
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		use Search::*;
		match self {
			None { inverted } => write!(f, "{}", if *inverted { "FALSE" } else { "TRUE" }),
			Equals { name, value, inverted } => write!(f, "{name} {} '{value:?}'", if *inverted { "!=" } else { "==" }),
			Like { name, pattern, inverted } => write!(f, "{name} {} '{pattern}'", if *inverted { "NOT LIKE" } else { "LIKE" }),
			Greater { name, value, inverted } => write!(f, "{name} {} '{value:?}'", if *inverted { "<=" } else { ">" }),
			GreaterOrEqual { name, value, inverted } => write!(f, "{name} {} '{value:?}'", if *inverted { "<" } else { ">=" }),
			Smaller { name, value, inverted } => write!(f, "{name} {} '{value:?}'", if *inverted { ">=" } else { "<" }),
			SmallerOrEqual { name, value, inverted } => write!(f, "{name} {} '{value:?}'", if *inverted { ">" } else { "<=" }),
			In { name, values, inverted } => {
				let list = values.iter().map(|v| format!("'{v:?}'")).collect::<Vec<_>>().join(", ");
				write!(f, "{name} {}IN ({list})", if *inverted { "NOT " } else { "" })
			}
			And { left, right, inverted } => write!(f, "{}({left} AND {right})", if *inverted { "NOT " } else { "" }),
			Or { left, right, inverted } => write!(f, "{}({left} OR {right})", if *inverted { "NOT " } else { "" }),
		}
	}
}

/// A single step of the result-shaping grammar (§4.2). [`ResultOption`] is an ordered sequence
/// of these.
#[derive(Debug, Clone)]
pub enum ResultOptionItem {
	Group(String),
	SortAsc(String),
	SortDesc(String),
	Limit(usize),
	Offset(usize),
}

/// Group/sort/limit/offset grammar, applied after a [`Search`] scan (§4.2).
#[derive(Debug, Clone, Default)]
pub struct ResultOption {
	items: Vec<ResultOptionItem>,
}

impl ResultOption {
	pub fn new() -> Self {
		Self::default()
	}

	fn push(mut self, item: ResultOptionItem) -> Result<Self> {
		use ResultOptionItem::*;
		let clashes = matches!(
			(&item, self.items.iter().find(|existing| std::mem::discriminant(*existing) == std::mem::discriminant(&item))),
			(Limit(_), Some(_)) | (Offset(_), Some(_))
		);
		if clashes {
			return Err(crate::error::Error::InvalidArgument("ResultOption already has a Limit/Offset of this kind".into()));
		}
		self.items.push(item);
		Ok(self)
	}

	pub fn group(self, field: impl Into<String>) -> Result<Self> {
		self.push(ResultOptionItem::Group(field.into()))
	}

	pub fn sort_asc(self, field: impl Into<String>) -> Result<Self> {
		self.push(ResultOptionItem::SortAsc(field.into()))
	}

	pub fn sort_desc(self, field: impl Into<String>) -> Result<Self> {
		self.push(ResultOptionItem::SortDesc(field.into()))
	}

	pub fn limit(self, n: usize) -> Result<Self> {
		self.push(ResultOptionItem::Limit(n))
	}

	pub fn offset(self, n: usize) -> Result<Self> {
		self.push(ResultOptionItem::Offset(n))
	}

	pub fn items(&self) -> &[ResultOptionItem] {
		&self.items
	}

	/// Combines two option lists; associative, per §4.2. Fails if both sides declare the same
	/// `Limit`/`Offset` kind.
	pub fn combine(mut self, other: ResultOption) -> Result<Self> {
		for item in other.items {
			self = self.push(item)?;
		}
		Ok(self)
	}

	/// Applies grouping, sorting and offset/limit to a scan's row positions, in the order laid
	/// out in §4.2: group (keep first occurrence per key) → sort (stable, multi-key applied in
	/// reverse declaration order) → offset/limit (clamped to the result size).
	pub fn apply(&self, layout: &RowLayout, source: &dyn ScanSource, positions: Vec<usize>) -> Result<Vec<usize>> {
		let mut positions = positions;

		for item in &self.items {
			if let ResultOptionItem::Group(name) = item {
				let idx = layout.require_field_index(name, false)?;
				let mut seen = std::collections::HashSet::new();
				positions.retain(|&p| seen.insert(source.row_at(p).get(idx).cloned()));
			}
		}

		let sort_keys: Vec<(&str, bool)> = self
			.items
			.iter()
			.filter_map(|item| match item {
				ResultOptionItem::SortAsc(name) => Some((name.as_str(), false)),
				ResultOptionItem::SortDesc(name) => Some((name.as_str(), true)),
				_ => None,
			})
			.collect();
		for (name, descending) in sort_keys.into_iter().rev() {
			let idx = layout.require_field_index(name, false)?;
			positions.sort_by(|&a, &b| {
				let ord = source.row_at(a).get(idx).cmp(&source.row_at(b).get(idx));
				if descending { ord.reverse() } else { ord }
			});
		}

		let offset = self.items.iter().find_map(|i| match i {
			ResultOptionItem::Offset(n) => Some(*n),
			_ => None,
		});
		let limit = self.items.iter().find_map(|i| match i {
			ResultOptionItem::Limit(n) => Some(*n),
			_ => None,
		});
		if let Some(offset) = offset {
			let offset = offset.min(positions.len());
			positions.drain(0..offset);
		}
		if let Some(limit) = limit {
			positions.truncate(limit);
		}
		Ok(positions)
	}
}

impl std::ops::Add for ResultOption {
	type Output = Result<ResultOption>;
	fn add(self, rhs: ResultOption) -> Result<ResultOption> {
		self.combine(rhs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::{FieldFlags, FieldProperties};
	use crate::layout::LayoutBuilder;
	use crate::row::Row;
	use crate::types::DataType;
	use std::sync::Arc;

	struct VecSource {
		rows: Vec<Row>,
	}
	impl ScanSource for VecSource {
		fn len(&self) -> usize {
			self.rows.len()
		}
		fn row_at(&self, position: usize) -> &Row {
			&self.rows[position]
		}
		fn index_lookup(&self, _field_index: usize, _value: &Value) -> Option<Vec<usize>> {
			None
		}
	}

	fn layout() -> Arc<RowLayout> {
		Arc::new(
			LayoutBuilder::new("Item")
				.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID))
				.field(FieldProperties::new(1, "name", DataType::String, FieldFlags::empty()))
				.field(FieldProperties::new(2, "amount", DataType::Int64, FieldFlags::empty()))
				.build()
				.unwrap(),
		)
	}

	fn source() -> VecSource {
		let layout = layout();
		let row = |id, name: &str, amount| Row::new(layout.clone(), vec![Value::Int64(id), Value::String(name.into()), Value::Int64(amount)]).unwrap();
		VecSource { rows: vec![row(1, "a", 1), row(2, "b", 2), row(3, "c", 3)] }
	}

	#[test]
	fn combinator_scan_matches_check() {
		let layout = layout();
		let source = source();
		let search = Search::greater("amount", Value::Int64(1)) & Search::like("name", "%b%");
		let positions = search.scan(&layout, &source, None).unwrap();
		assert_eq!(positions, vec![1]);
		assert!(search.check(&layout, &source.rows[1]).unwrap());
		assert!(!search.check(&layout, &source.rows[0]).unwrap());
	}

	#[test]
	fn not_of_search_is_complement() {
		let layout = layout();
		let source = source();
		let search = Search::equals("id", Value::Int64(2));
		let all: Vec<usize> = (0..3).collect();
		let matched = search.clone().scan(&layout, &source, None).unwrap();
		let complement = (!search).scan(&layout, &source, None).unwrap();
		assert_eq!(matched, vec![1]);
		let mut union = matched.clone();
		union.extend(complement.iter().copied());
		union.sort_unstable();
		assert_eq!(union, all);
	}

	#[test]
	fn and_with_none_short_circuits() {
		let search = Search::none() & Search::equals("id", Value::Int64(1));
		assert!(matches!(search, Search::Equals { .. }));
	}

	#[test]
	fn result_option_rejects_duplicate_limit() {
		let opts = ResultOption::new().limit(1).unwrap();
		assert!(opts.limit(2).is_err());
	}

	#[test]
	fn result_option_orders_group_sort_offset_limit() {
		let layout = layout();
		let source = source();
		let positions: Vec<usize> = (0..3).collect();
		let opts = ResultOption::new().sort_desc("amount").unwrap();
		let ordered = opts.apply(&layout, &source, positions).unwrap();
		assert_eq!(ordered, vec![2, 1, 0]);
	}
}
