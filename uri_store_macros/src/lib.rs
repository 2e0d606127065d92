mod graph_model;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(GraphModel)] derive macro
// ============================================================================

/// Derive macro for the `GraphModel` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, GraphModel)]
/// #[model(graph = "plot", backend = "rdf", mirror = "document")]
/// struct Plot {
///     #[model(identity)]
///     uri: Identity,
///     #[model(segment)]
///     name: Option<String>,
///     description: Option<String>,
/// }
/// ```
///
/// Struct attributes:
/// - `backend = "rdf" | "document" | "relational"` (required). `triple`,
///   `nosql` and `sql` are accepted as aliases.
/// - `graph = "..."` sets the graph prefix. Defaults to the class name.
/// - `name = "..."` sets the class name. Defaults to the snake_case struct name.
/// - `mirror = "..."` names a secondary backend receiving every write.
/// - `collision = "merge" | "suffix"` picks what persist does when a
///   generated URI is taken. Defaults to `merge`.
///
/// Field attributes:
/// - `#[model(identity)]` marks the `Identity` field. If omitted, defaults
///   to a field named `uri`.
/// - `#[model(segment)]` adds the field, in declaration order, to the
///   disambiguating URI segments. `Option` fields that are `None` make
///   generation fail with a missing-segment error.
/// - `#[model(keep)]` excludes the field from `update`.
///
/// `update` overwrites plain fields and only takes `Option` fields that
/// are `Some` on the incoming value.
#[proc_macro_derive(GraphModel, attributes(model))]
pub fn derive_graph_model(input: TokenStream) -> TokenStream {
    graph_model::derive_graph_model(input)
}
