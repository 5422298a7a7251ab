use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Expr, Fields, GenericArgument, LitStr, PathArguments, Type};

struct FieldSpec {
	ident: syn::Ident,
	name: String,
	alternative_names: Vec<String>,
	length: Option<f64>,
	display_format: Option<String>,
	description: Option<String>,
	flag_names: Vec<String>,
	datetime_kind: Option<String>,
	datetime_type: Option<String>,
	timespan_type: Option<String>,
	string_encoding: Option<String>,
	default_value: Option<Expr>,
	nullable: bool,
	value_kind: ValueKind,
}

#[derive(Clone)]
enum ValueKind {
	Simple(&'static str),
	Binary,
	User,
}

pub fn derive(tokens: proc_macro::TokenStream) -> TokenStream {
	let input: DeriveInput = syn::parse(tokens).expect("failed to parse derive input");
	let ident = input.ident;

	let Data::Struct(data) = input.data else {
		panic!("TableRow can only be derived for structs");
	};
	let Fields::Named(fields) = data.fields else {
		panic!("TableRow requires named fields");
	};

	let specs: Vec<FieldSpec> = fields.named.into_iter().map(|field| build_spec(field)).collect();

	let struct_name = ident.to_string();
	let field_builders = specs.iter().enumerate().map(|(index, spec)| field_builder(index, spec));
	let into_row_values = specs.iter().enumerate().map(|(index, spec)| into_row_value(index, spec));
	let from_row_fields = specs.iter().enumerate().map(|(index, spec)| from_row_field(index, spec));
	let field_idents = specs.iter().map(|s| &s.ident).collect::<Vec<_>>();

	quote! {
		impl ::tablekit::Schema for #ident {
			fn layout() -> ::std::sync::Arc<::tablekit::RowLayout> {
				::tablekit::layout::cached_layout::<#ident>(None, || {
					::tablekit::LayoutBuilder::new(#struct_name)
						.bind_record_type::<#ident>()
						#(.field(#field_builders))*
						.build()
				})
				.expect("derived layout failed to build")
			}

			fn into_row(self) -> ::tablekit::Row {
				let layout = <#ident as ::tablekit::Schema>::layout();
				let values = vec![#(#into_row_values),*];
				::tablekit::Row::new(layout, values).expect("derived row has the wrong arity for its own layout")
			}

			fn from_row(row: &::tablekit::Row) -> ::tablekit::Result<Self> {
				Ok(Self {
					#(#field_idents: #from_row_fields,)*
				})
			}
		}
	}
}

fn build_spec(field: syn::Field) -> FieldSpec {
	let ident = field.ident.expect("named field");
	let mut name = ident.to_string();
	let mut alternative_names = Vec::new();
	let mut length = None;
	let mut display_format = None;
	let mut description = None;
	let mut flag_names = Vec::new();
	let mut datetime_kind = None;
	let mut datetime_type = None;
	let mut timespan_type = None;
	let mut string_encoding = None;
	let mut default_value = None;

	for attr in &field.attrs {
		if attr.path().is_ident("field") {
			attr.parse_nested_meta(|meta| {
				if meta.path.is_ident("name") {
					name = meta.value()?.parse::<LitStr>()?.value();
				} else if meta.path.is_ident("length") {
					length = Some(meta.value()?.parse::<syn::LitFloat>()?.base10_parse()?);
				} else if meta.path.is_ident("display_format") {
					display_format = Some(meta.value()?.parse::<LitStr>()?.value());
				} else if meta.path.is_ident("alternative_names") {
					let raw = meta.value()?.parse::<LitStr>()?.value();
					alternative_names = raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
				} else if meta.path.is_ident("flags") {
					let raw = meta.value()?.parse::<LitStr>()?.value();
					flag_names = raw.split('|').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
				}
				Ok(())
			})
			.expect("malformed #[field(...)] attribute");
		} else if attr.path().is_ident("datetime_format") {
			attr.parse_nested_meta(|meta| {
				if meta.path.is_ident("kind") {
					datetime_kind = Some(meta.value()?.parse::<LitStr>()?.value());
				} else if meta.path.is_ident("type") {
					datetime_type = Some(meta.value()?.parse::<LitStr>()?.value());
				}
				Ok(())
			})
			.expect("malformed #[datetime_format(...)] attribute");
		} else if attr.path().is_ident("timespan_format") {
			attr.parse_nested_meta(|meta| {
				if meta.path.is_ident("type") {
					timespan_type = Some(meta.value()?.parse::<LitStr>()?.value());
				}
				Ok(())
			})
			.expect("malformed #[timespan_format(...)] attribute");
		} else if attr.path().is_ident("string_format") {
			attr.parse_nested_meta(|meta| {
				if meta.path.is_ident("encoding") {
					string_encoding = Some(meta.value()?.parse::<LitStr>()?.value());
				}
				Ok(())
			})
			.expect("malformed #[string_format(...)] attribute");
		} else if attr.path().is_ident("default_value") {
			default_value = Some(attr.parse_args::<Expr>().expect("malformed #[default_value(...)] attribute"));
		} else if attr.path().is_ident("description") {
			description = Some(attr.parse_args::<LitStr>().expect("malformed #[description(...)] attribute").value());
		}
	}

	let (inner_ty, nullable_by_type) = unwrap_option(&field.ty);
	let value_kind = classify_type(inner_ty);
	if nullable_by_type {
		flag_names.push("NULLABLE".to_string());
	}

	FieldSpec {
		ident,
		name,
		alternative_names,
		length,
		display_format,
		description,
		flag_names,
		datetime_kind,
		datetime_type,
		timespan_type,
		string_encoding,
		default_value,
		nullable: nullable_by_type,
		value_kind,
	}
}

/// `Option<T>` unwraps to `(T, true)`; anything else is `(ty, false)`. Array members other than
/// `Vec<u8>`/`[u8]` are rejected by `classify_type` (`UnsupportedSchema`, §4.1).
fn unwrap_option(ty: &Type) -> (&Type, bool) {
	if let Type::Path(path) = ty {
		if let Some(segment) = path.path.segments.last() {
			if segment.ident == "Option" {
				if let PathArguments::AngleBracketed(args) = &segment.arguments {
					if let Some(GenericArgument::Type(inner)) = args.args.first() {
						return (inner, true);
					}
				}
			}
		}
	}
	(ty, false)
}

fn classify_type(ty: &Type) -> ValueKind {
	if let Type::Path(path) = ty {
		if let Some(segment) = path.path.segments.last() {
			let name = segment.ident.to_string();
			if name == "Vec" {
				if let PathArguments::AngleBracketed(args) = &segment.arguments {
					if let Some(GenericArgument::Type(Type::Path(inner))) = args.args.first() {
						if inner.path.is_ident("u8") {
							return ValueKind::Binary;
						}
					}
				}
			}
			return match name.as_str() {
				"i8" => ValueKind::Simple("Int8"),
				"i16" => ValueKind::Simple("Int16"),
				"i32" => ValueKind::Simple("Int32"),
				"i64" => ValueKind::Simple("Int64"),
				"u8" => ValueKind::Simple("UInt8"),
				"u16" => ValueKind::Simple("UInt16"),
				"u32" => ValueKind::Simple("UInt32"),
				"u64" => ValueKind::Simple("UInt64"),
				"f32" => ValueKind::Simple("Single"),
				"f64" => ValueKind::Simple("Double"),
				"bool" => ValueKind::Simple("Bool"),
				"char" => ValueKind::Simple("Char"),
				"String" => ValueKind::Simple("String"),
				"Decimal" => ValueKind::Simple("Decimal"),
				"Uuid" => ValueKind::Simple("Guid"),
				"DateTime" => ValueKind::Simple("DateTime"),
				"Duration" => ValueKind::Simple("TimeSpan"),
				_ => ValueKind::User,
			};
		}
	}
	ValueKind::User
}

fn data_type_ident(kind: &ValueKind) -> proc_macro2::Ident {
	match kind {
		ValueKind::Simple(name) => format_ident!("{name}"),
		ValueKind::Binary => format_ident!("Binary"),
		ValueKind::User => format_ident!("User"),
	}
}

fn flags_expr(names: &[String]) -> TokenStream {
	if names.is_empty() {
		return quote! { ::tablekit::FieldFlags::empty() };
	}
	let idents = names.iter().map(|n| {
		let canonical = match n.to_ascii_uppercase().as_str() {
			"ID" => "ID",
			"INDEX" => "INDEX",
			"UNIQUE" => "UNIQUE",
			"AUTOINCREMENT" | "AUTO_INCREMENT" => "AUTO_INCREMENT",
			"NULLABLE" => "NULLABLE",
			other => panic!("unknown field flag '{other}'"),
		};
		format_ident!("{canonical}")
	});
	quote! { #(::tablekit::FieldFlags::#idents)|* }
}

fn field_builder(index: usize, spec: &FieldSpec) -> TokenStream {
	let data_type = data_type_ident(&spec.value_kind);
	let name = &spec.name;
	let flags = flags_expr(&spec.flag_names);
	let alt_names = &spec.alternative_names;
	let length = opt_tokens(spec.length, |v| quote! { Some(#v) });
	let display_format = opt_str(&spec.display_format);
	let description = opt_str(&spec.description);
	let datetime_kind = spec.datetime_kind.as_deref().map(|s| format_ident!("{s}"));
	let datetime_kind_assign = datetime_kind.map(|k| quote! { field.date_time_kind = ::tablekit::DateTimeKind::#k; });
	let datetime_type_ident = spec.datetime_type.as_deref().map(|s| format_ident!("{s}"));
	let timespan_type_ident = spec.timespan_type.as_deref().map(|s| format_ident!("{s}"));
	let date_time_type_assign = match (datetime_type_ident, timespan_type_ident) {
		(Some(t), _) => Some(quote! { field.date_time_type = ::tablekit::DateTimeType::#t; }),
		(None, Some(t)) => Some(quote! { field.date_time_type = ::tablekit::DateTimeType::#t; }),
		(None, None) => None,
	};
	let string_encoding_ident = spec.string_encoding.as_deref().map(|s| format_ident!("{s}"));
	let string_encoding_assign = string_encoding_ident.map(|e| quote! { field.string_encoding = ::tablekit::StringEncoding::#e; });
	let default_value_assign = spec.default_value.as_ref().map(|expr| {
		let ctor = value_ctor(&spec.value_kind, quote! { #expr });
		quote! { field.default_value = Some(#ctor); }
	});

	quote! {
		{
			let mut field = ::tablekit::FieldProperties::new(#index, #name, ::tablekit::DataType::#data_type, #flags);
			field.alternative_names = vec![#(#alt_names.to_string()),*];
			field.maximum_length = #length;
			field.display_format = #display_format;
			field.description = #description;
			#datetime_kind_assign
			#date_time_type_assign
			#string_encoding_assign
			#default_value_assign
			field.validate();
			field
		}
	}
}

fn opt_tokens<T>(value: Option<T>, wrap: impl FnOnce(T) -> TokenStream) -> TokenStream {
	match value {
		Some(v) => wrap(v),
		None => quote! { None },
	}
}

fn opt_str(value: &Option<String>) -> TokenStream {
	match value {
		Some(v) => quote! { Some(#v.to_string()) },
		None => quote! { None },
	}
}

fn value_ctor(kind: &ValueKind, expr: TokenStream) -> TokenStream {
	match kind {
		ValueKind::Simple(name) => {
			let ident = format_ident!("{name}");
			quote! { ::tablekit::Value::#ident(#expr) }
		}
		ValueKind::Binary => quote! { ::tablekit::Value::Binary(#expr) },
		ValueKind::User => quote! { ::tablekit::Value::User(::std::string::ToString::to_string(&(#expr))) },
	}
}

fn into_row_value(index: usize, spec: &FieldSpec) -> TokenStream {
	let ident = &spec.ident;
	if spec.nullable {
		let ctor = value_ctor(&spec.value_kind, quote! { inner });
		quote! {
			match self.#ident {
				Some(inner) => #ctor,
				None => ::tablekit::Value::Null,
			}
		}
	} else {
		let _ = index;
		value_ctor(&spec.value_kind, quote! { self.#ident })
	}
}

fn from_row_field(index: usize, spec: &FieldSpec) -> TokenStream {
	let variant = data_type_ident(&spec.value_kind);
	let field_name = &spec.name;
	let type_name = match &spec.value_kind {
		ValueKind::Simple(name) => name.to_string(),
		ValueKind::Binary => "Binary".to_string(),
		ValueKind::User => "User".to_string(),
	};

	let parsed_user = quote! {
		::std::str::FromStr::from_str(&text).map_err(|_| {
			::tablekit::Error::InvalidSchema(format!("field '{}' holds a value its Rust type could not parse", #field_name))
		})?
	};

	if spec.nullable {
		let matched_arm = match &spec.value_kind {
			ValueKind::User => quote! { Some(::tablekit::Value::User(text)) => Some(#parsed_user), },
			_ => quote! { Some(::tablekit::Value::#variant(value)) => Some(value), },
		};
		quote! {
			match row.get(#index).cloned() {
				None | Some(::tablekit::Value::Null) => None,
				#matched_arm
				other => return Err(::tablekit::Error::InvalidSchema(format!(
					"field '{}' at index {} does not hold a {} value: {:?}", #field_name, #index, #type_name, other
				))),
			}
		}
	} else {
		let matched_arm = match &spec.value_kind {
			ValueKind::User => quote! { Some(::tablekit::Value::User(text)) => #parsed_user, },
			_ => quote! { Some(::tablekit::Value::#variant(value)) => value, },
		};
		quote! {
			match row.get(#index).cloned() {
				#matched_arm
				other => return Err(::tablekit::Error::InvalidSchema(format!(
					"field '{}' at index {} does not hold a {} value: {:?}", #field_name, #index, #type_name, other
				))),
			}
		}
	}
}
