use tablekit::{MemoryTable, Schema, Search, Table, TableRow, Value};
use tablekit::codec::{self, CsvProperties};

#[derive(Debug, Clone, TableRow)]
struct Employee {
	#[field(flags = "ID|AUTO_INCREMENT")]
	id: i64,
	#[field(alternative_names = "full_name")]
	name: String,
	department: String,
	salary: f64,
	manager: Option<String>,
}

fn setup_tracing() {
	tracing_subscriber::fmt::init();
}

fn main() {
	setup_tracing();

	let mut table = MemoryTable::new(Employee::layout());

	for employee in [
		Employee { id: 0, name: "Ada Lovelace".into(), department: "Engineering".into(), salary: 145_000.0, manager: None },
		Employee { id: 0, name: "Grace Hopper".into(), department: "Engineering".into(), salary: 150_000.0, manager: Some("Ada Lovelace".into()) },
		Employee { id: 0, name: "Alan Turing".into(), department: "Research".into(), salary: 160_000.0, manager: None },
	] {
		let row = table.insert(employee.into_row()).expect("insert failed");
		let inserted = Employee::from_row(&row).expect("row did not match schema");
		tracing::info!(id = inserted.id, name = %inserted.name, "inserted employee");
	}

	let engineering = Search::equals("department", Value::String("Engineering".into()));
	let count = table.count(Some(&engineering)).expect("count failed");
	println!("engineering headcount: {count}");

	let highest_paid = table.maximum("salary", None).expect("maximum failed").expect("table should not be empty");
	println!("highest salary: {highest_paid:?}");

	let layout = table.layout().clone();
	let rows = table.get_rows(None, None).expect("scan failed");

	let mut dat_bytes = Vec::new();
	codec::write_table(&mut dat_bytes, &layout, &rows).expect("dat encode failed");
	let (restored_layout, restored_rows) = codec::read_table(&dat_bytes).expect("dat decode failed");
	assert_eq!(restored_layout.as_ref(), layout.as_ref());
	assert_eq!(restored_rows.len(), rows.len());
	println!("round-tripped {} rows through the DAT codec ({} bytes)", restored_rows.len(), dat_bytes.len());

	let mut csv_bytes = Vec::new();
	let csv_properties = CsvProperties::default();
	codec::write_csv(&mut csv_bytes, &layout, &rows, &csv_properties).expect("csv encode failed");
	let csv_text = String::from_utf8(csv_bytes).expect("csv output is not utf8");
	println!("--- employees.csv ---\n{csv_text}");

	let csv_rows = codec::read_csv(&csv_text, &layout, &csv_properties).expect("csv decode failed");
	assert_eq!(csv_rows.len(), rows.len());
}
