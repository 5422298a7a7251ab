mod schema;

use proc_macro::TokenStream;

/// Expands to a [`tablekit::table::Schema`] implementation for a struct, the compile-time
/// replacement for the runtime attribute scanning `FieldProperties::LoadFieldInfo` performs in
/// the source design (§4.1.1). See the `field`/`datetime_format`/`timespan_format`/
/// `string_format`/`default_value`/`description` attributes for the recognized annotation set.
#[proc_macro_derive(TableRow, attributes(field, datetime_format, timespan_format, string_format, default_value, description))]
pub fn derive_table_row(input: TokenStream) -> TokenStream {
	schema::derive(input).into()
}
