use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Ident, LitStr, Type};

pub fn derive_graph_model(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

struct ModelAttrs {
    name: Option<String>,
    graph: Option<String>,
    backend: Option<TokenStream2>,
    mirror: Option<TokenStream2>,
    collision: Option<TokenStream2>,
}

struct FieldInfo<'a> {
    ident: &'a Ident,
    optional: bool,
    identity: bool,
    segment: bool,
    keep: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let attrs = model_attrs(input)?;
    let fields = named_fields(input)?
        .iter()
        .map(field_info)
        .collect::<syn::Result<Vec<_>>>()?;

    let identity = identity_field(name, &fields)?;
    let class = attrs.name.unwrap_or_else(|| to_snake_case(&name.to_string()));
    let graph = attrs.graph.unwrap_or_else(|| class.clone());
    let backend = attrs.backend.ok_or_else(|| {
        syn::Error::new_spanned(
            name,
            "GraphModel derive: missing #[model(backend = \"rdf\" | \"document\" | \"relational\")]",
        )
    })?;
    let mirror = match attrs.mirror {
        Some(mirror) => quote! { ::core::option::Option::Some(#mirror) },
        None => quote! { ::core::option::Option::None },
    };
    let collision = attrs
        .collision
        .unwrap_or_else(|| quote! { ::uri_store::Collision::Merge });
    let identity_name = identity.to_string();

    let segments = fields.iter().filter(|f| f.segment).map(|f| {
        let ident = f.ident;
        if f.optional {
            quote! { self.#ident.as_ref().map(|v| v.to_string()) }
        } else {
            quote! { ::core::option::Option::Some(self.#ident.to_string()) }
        }
    });

    // The resolved identity field, marked or named `uri`, is never merged.
    let merges = fields.iter().filter(|f| f.ident != identity && !f.keep).map(|f| {
        let ident = f.ident;
        if f.optional {
            quote! {
                if other.#ident.is_some() {
                    self.#ident = other.#ident;
                }
            }
        } else {
            quote! { self.#ident = other.#ident; }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::uri_store::GraphModel for #name #ty_generics #where_clause {
            const NAME: &'static str = #class;
            const GRAPH_PREFIX: &'static str = #graph;
            const BACKEND: ::uri_store::Backend = #backend;
            const MIRROR: ::core::option::Option<::uri_store::Backend> = #mirror;
            const ON_COLLISION: ::uri_store::Collision = #collision;
            const IDENTITY_FIELD: &'static str = #identity_name;

            fn identity(&self) -> &::uri_store::Identity {
                &self.#identity
            }

            fn identity_mut(&mut self) -> &mut ::uri_store::Identity {
                &mut self.#identity
            }

            fn uri_segments(&self) -> ::std::vec::Vec<::core::option::Option<::std::string::String>> {
                ::std::vec![#(#segments),*]
            }

            #[allow(unused_variables)]
            fn update(&mut self, other: Self) -> &mut Self {
                #(#merges)*
                self
            }
        }
    })
}

fn model_attrs(input: &DeriveInput) -> syn::Result<ModelAttrs> {
    let mut attrs = ModelAttrs {
        name: None,
        graph: None,
        backend: None,
        mirror: None,
        collision: None,
    };

    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.name = Some(value.value());
            } else if meta.path.is_ident("graph") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.graph = Some(value.value());
            } else if meta.path.is_ident("backend") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.backend = Some(backend_tokens(&value)?);
            } else if meta.path.is_ident("mirror") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.mirror = Some(backend_tokens(&value)?);
            } else if meta.path.is_ident("collision") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.collision = Some(match value.value().as_str() {
                    "merge" => quote! { ::uri_store::Collision::Merge },
                    "suffix" => quote! { ::uri_store::Collision::Suffix },
                    other => {
                        return Err(syn::Error::new(
                            value.span(),
                            format!("unknown collision policy `{other}`, expected \"merge\" or \"suffix\""),
                        ))
                    }
                });
            } else {
                return Err(meta.error("unsupported model attribute"));
            }
            Ok(())
        })?;
    }

    if let Some(graph) = &attrs.graph {
        if graph.trim().is_empty() {
            return Err(syn::Error::new(Span::call_site(), "graph prefix must not be empty"));
        }
    }

    Ok(attrs)
}

fn backend_tokens(value: &LitStr) -> syn::Result<TokenStream2> {
    match value.value().as_str() {
        "rdf" | "triple" | "sparql" => Ok(quote! { ::uri_store::Backend::Triple }),
        "document" | "nosql" => Ok(quote! { ::uri_store::Backend::Document }),
        "relational" | "sql" => Ok(quote! { ::uri_store::Backend::Relational }),
        other => Err(syn::Error::new(
            value.span(),
            format!("unknown backend `{other}`, expected \"rdf\", \"document\" or \"relational\""),
        )),
    }
}

fn named_fields(input: &DeriveInput) -> syn::Result<&syn::punctuated::Punctuated<Field, syn::Token![,]>> {
    if let Data::Struct(data_struct) = &input.data {
        if let Fields::Named(fields) = &data_struct.fields {
            return Ok(&fields.named);
        }
    }
    Err(syn::Error::new_spanned(
        &input.ident,
        "GraphModel can only be derived for structs with named fields",
    ))
}

fn field_info(field: &Field) -> syn::Result<FieldInfo<'_>> {
    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
    let mut info = FieldInfo {
        ident,
        optional: is_option(&field.ty),
        identity: false,
        segment: false,
        keep: false,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("identity") {
                info.identity = true;
            } else if meta.path.is_ident("segment") {
                info.segment = true;
            } else if meta.path.is_ident("keep") {
                info.keep = true;
            } else {
                return Err(meta.error("unsupported field attribute, expected identity, segment or keep"));
            }
            Ok(())
        })?;
    }

    if info.identity && info.segment {
        return Err(syn::Error::new_spanned(
            ident,
            "the identity field cannot also be a URI segment",
        ));
    }
    Ok(info)
}

fn identity_field<'a>(name: &Ident, fields: &[FieldInfo<'a>]) -> syn::Result<&'a Ident> {
    let marked: Vec<_> = fields.iter().filter(|f| f.identity).collect();
    match marked.as_slice() {
        [only] => return Ok(only.ident),
        [_, second, ..] => {
            return Err(syn::Error::new_spanned(
                second.ident,
                "only one field can be marked #[model(identity)]",
            ))
        }
        [] => {}
    }

    // Default: a field named `uri`
    fields
        .iter()
        .find(|f| f.ident == "uri")
        .map(|f| f.ident)
        .ok_or_else(|| {
            syn::Error::new_spanned(
                name,
                "GraphModel derive: no field marked with #[model(identity)] and no field named `uri`",
            )
        })
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) if path.qself.is_none() => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == "Option")
            .unwrap_or(false),
        _ => false,
    }
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
