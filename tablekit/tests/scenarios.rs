use std::sync::Arc;

use rust_decimal::Decimal;
use tablekit::codec::{read_rows, write_rows, CsvProperties};
use tablekit::{
	codec, DataType, FieldFlags, FieldProperties, LayoutBuilder, MemoryTable, ResultOption, Row, RowLayout, Search, Table,
	Value,
};

fn layout_id_name_amount() -> Arc<RowLayout> {
	Arc::new(
		LayoutBuilder::new("Item")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID | FieldFlags::AUTO_INCREMENT))
			.field(FieldProperties::new(1, "name", DataType::String, FieldFlags::INDEX))
			.field(FieldProperties::new(2, "amount", DataType::Decimal, FieldFlags::empty()))
			.build()
			.unwrap(),
	)
}

fn row(layout: &Arc<RowLayout>, id: i64, name: &str, amount: &str) -> Row {
	Row::new(layout.clone(), vec![Value::Int64(id), Value::String(name.into()), Value::Decimal(amount.parse().unwrap())]).unwrap()
}

/// S1 — insert/read cycle: an auto-increment id assigns 1 on first insert and the row reads back unchanged.
#[test]
fn s1_insert_read_cycle() {
	let layout = layout_id_name_amount();
	let mut table = MemoryTable::new(layout.clone());

	let inserted = table.insert(row(&layout, 0, "a", "1.50")).unwrap();
	assert_eq!(inserted.get(0), Some(&Value::Int64(1)));

	let search = Search::equals("id", Value::Int64(1));
	let fetched = table.get_row(Some(&search), None).unwrap().unwrap();
	assert_eq!(fetched.get(1), Some(&Value::String("a".into())));
	assert_eq!(fetched.get(2), Some(&Value::Decimal(Decimal::new(150, 2))));
}

/// S2 — `(amount > 1) & (name LIKE "%b%")` isolates exactly the one matching row.
#[test]
fn s2_search_combinator() {
	let layout = layout_id_name_amount();
	let mut table = MemoryTable::new(layout.clone());
	for (name, amount) in [("a", "1"), ("b", "2"), ("c", "3")] {
		table.insert(row(&layout, 0, name, amount)).unwrap();
	}

	let search = Search::greater("amount", Value::Decimal(Decimal::new(1, 0))) & Search::like("name", "%b%");
	let rows = table.get_rows(Some(&search), None).unwrap();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].get(1), Some(&Value::String("b".into())));
}

/// S3 — sort-desc + limit 5 + offset 10 over 100 rows returns amounts 90..86.
#[test]
fn s3_ordering_and_paging() {
	let layout = layout_id_name_amount();
	let mut table = MemoryTable::new(layout.clone());
	for i in 1..=100i64 {
		table.insert(row(&layout, 0, "row", &i.to_string())).unwrap();
	}

	let options = ResultOption::new().sort_desc("amount").unwrap().limit(5).unwrap().offset(10).unwrap();
	let rows = table.get_rows(None, Some(&options)).unwrap();
	let amounts: Vec<Decimal> = rows.iter().map(|r| match r.get(2) {
		Some(Value::Decimal(d)) => *d,
		_ => panic!("expected decimal"),
	}).collect();
	assert_eq!(amounts, vec![90, 89, 88, 87, 86].into_iter().map(Decimal::from).collect::<Vec<_>>());
}

/// S4 — DAT v5 preserves nulls: a nullable `Int32` column round-trips both `null` and a concrete value.
#[test]
fn s4_dat_v5_nullable_roundtrip() {
	let layout = Arc::new(
		LayoutBuilder::new("Nullable")
			.field(FieldProperties::new(0, "x", DataType::Int32, FieldFlags::NULLABLE))
			.build()
			.unwrap(),
	);
	let rows = vec![Row::new(layout.clone(), vec![Value::Null]).unwrap(), Row::new(layout.clone(), vec![Value::Int32(7)]).unwrap()];

	let mut buf = Vec::new();
	codec::write_table(&mut buf, &layout, &rows).unwrap();
	let (read_layout, read_rows) = codec::read_table(&buf).unwrap();
	assert_eq!(read_layout.as_ref(), layout.as_ref());
	assert_eq!(read_rows[0].get(0), Some(&Value::Null));
	assert_eq!(read_rows[1].get(0), Some(&Value::Int32(7)));
}

/// S5 — a string containing both the separator and the marker character round-trips through CSV.
#[test]
fn s5_csv_marker_escaping() {
	let layout = Arc::new(LayoutBuilder::new("Strings").field(FieldProperties::new(0, "name", DataType::String, FieldFlags::empty())).build().unwrap());
	let value = "a,b\"c".to_string();
	let rows = vec![Row::new(layout.clone(), vec![Value::String(value.clone())]).unwrap()];

	let properties = CsvProperties::default();
	let mut buf = Vec::new();
	codec::write_csv(&mut buf, &layout, &rows, &properties).unwrap();
	let text = String::from_utf8(buf).unwrap();
	let read_back = codec::read_csv(&text, &layout, &properties).unwrap();
	assert_eq!(read_back[0].get(0), Some(&Value::String(value)));
}

/// S6 — 8 readers and 1 writer hammering a concurrent-wrapped table never observe an error and
/// land on a row count equal to the writer's successful insert total.
#[test]
fn s6_reader_writer_interleave() {
	use tablekit::ConcurrentTable;

	let layout = Arc::new(
		LayoutBuilder::new("Counter")
			.field(FieldProperties::new(0, "id", DataType::Int64, FieldFlags::ID | FieldFlags::AUTO_INCREMENT))
			.build()
			.unwrap(),
	);
	let table = Arc::new(ConcurrentTable::new(MemoryTable::new(layout.clone())).unwrap());
	const INSERTS: usize = 500;

	std::thread::scope(|scope| {
		for _ in 0..8 {
			let table = table.clone();
			scope.spawn(move || {
				for _ in 0..INSERTS {
					let count = table.count(None).unwrap();
					assert!(count <= INSERTS);
				}
			});
		}
		let writer_table = table.clone();
		let writer_layout = layout.clone();
		scope.spawn(move || {
			for _ in 0..INSERTS {
				writer_table.insert(Row::new(writer_layout.clone(), vec![Value::Int64(0)]).unwrap()).unwrap();
			}
		});
	});

	assert_eq!(table.count(None).unwrap(), INSERTS);
}

/// Property 6 — index bookkeeping sums to the row count after a mixed sequence of writes.
#[test]
fn index_consistency_after_mixed_writes() {
	let layout = layout_id_name_amount();
	let mut table = MemoryTable::new(layout.clone());
	let mut inserted = Vec::new();
	for (name, amount) in [("a", "1"), ("b", "2"), ("c", "3"), ("a", "4")] {
		inserted.push(table.insert(row(&layout, 0, name, amount)).unwrap());
	}
	table.delete(&inserted[1]).unwrap();

	let a_count = table.count(Some(&Search::equals("name", Value::String("a".into())))).unwrap();
	let b_count = table.count(Some(&Search::equals("name", Value::String("b".into())))).unwrap();
	let c_count = table.count(Some(&Search::equals("name", Value::String("c".into())))).unwrap();
	assert_eq!(a_count + b_count + c_count, table.count(None).unwrap());
}

/// Property 8 — auto-increment values are strictly increasing across inserts.
#[test]
fn auto_increment_is_monotonic() {
	let layout = layout_id_name_amount();
	let mut table = MemoryTable::new(layout.clone());
	let mut last = 0i64;
	for i in 0..10 {
		let inserted = table.insert(row(&layout, 0, "x", &i.to_string())).unwrap();
		let Some(Value::Int64(id)) = inserted.get(0) else { panic!("expected int64 id") };
        assert!(*id > last);
        last = *id;
	}
}

/// Property 2 — a row-level serializer round trip reproduces the same values under its own embedded layout.
#[test]
fn row_level_roundtrip_matches_values() {
	let layout = layout_id_name_amount();
	let rows = vec![row(&layout, 1, "a", "1.50"), row(&layout, 2, "b", "2.00")];

	let mut buf = Vec::new();
	write_rows(&mut buf, &layout, &rows, true).unwrap();
	let (_, read_back) = read_rows(&buf, None).unwrap();
	assert_eq!(read_back, rows);
}
