use proc_macro::TokenStream;

mod record;

/// Derive `salus::Record` for a struct with named fields.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Record)]
/// #[record(collection = "customers", tag = "Customer")]
/// struct Customer {
///     #[record(key)]
///     #[serde(rename = "Id")]
///     id: String,
///     name: String,
/// }
/// ```
///
/// - `collection` defaults to the snake_case struct name plus a literal `s`
///   (`LineItem` becomes `line_items`, `Person` becomes `persons`). No plural
///   rules are applied; set `collection` when that is not the name you want.
/// - `tag` (the entity type tag carried on the wire) defaults to the struct name.
/// - Key fields are the ones marked `#[record(key)]`, in declaration order. Without
///   any marker the field named `id` is the key; with neither, expansion fails.
/// - Key names follow serde: a field's `#[serde(rename = "...")]` wins, otherwise
///   the container's `#[serde(rename_all = "...")]` rule applies.
/// - Each key field's type must implement `salus::KeyType` (integers, `String`,
///   `Uuid`), which fixes the key variant when the record type is compiled.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record(input)
}
