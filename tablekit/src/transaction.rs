//! A tagged `(kind, row)` pending a `Commit` (§3 "Transaction").

use bitflags::bitflags;

use crate::row::Row;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransactionKind {
	Insert,
	Replace,
	Update,
	Delete,
}

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
	pub struct TransactionFlags: u8 {
		/// Skip auto-increment assignment even if the layout's identifier field requests it.
		const NO_AUTO_INCREMENT = 0b0000_0001;
		/// Allow a `Delete` for a row whose identifier is absent to no-op instead of erroring.
		const IGNORE_MISSING = 0b0000_0010;
	}
}

#[derive(Debug, Clone)]
pub struct Transaction {
	pub kind: TransactionKind,
	pub row: Row,
	pub flags: TransactionFlags,
}

impl Transaction {
	pub fn new(kind: TransactionKind, row: Row) -> Self {
		Self { kind, row, flags: TransactionFlags::empty() }
	}

	pub fn with_flags(mut self, flags: TransactionFlags) -> Self {
		self.flags = flags;
		self
	}
}
