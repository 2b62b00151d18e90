//! domap Derive Macro: containers from plain struct declarations
//!
//! `#[derive(Container)]` reads the fields of a struct, their types and their
//! `#[dom(...)]` directives, and generates:
//!
//! - an `impl domap::Container` declaring one schema field per struct field
//! - a `{Name}Fields` trait implemented for `domap::Area<Name>`, with one
//!   typed getter per field and a `set_{field}` method for input, checkbox
//!   and radio fields
//! - `impl domap::Page` / `impl domap::Form` for page and form containers
//!
//! The struct itself is never instantiated; it only carries the declaration.
//!
//! # Example
//!
//! ```ignore
//! use domap::prelude::*;
//!
//! #[derive(Container)]
//! #[dom(form)]
//! struct SearchForm {
//!     #[dom(css = "input[name='q']")]
//!     query: InputValue,
//!     #[dom(css = "#safe")]
//!     safe_search: Checkbox,
//! }
//!
//! let form = Area::<SearchForm>::within(session, node)?;
//! form.set_query("rust page objects")?;
//! form.set_safe_search(true)?;
//! form.submit()?;
//! ```

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, GenericArgument, Ident, Lit,
    LitStr, PathArguments, Type,
};

/// Derive macro declaring a domap container.
///
/// # Container attributes
///
/// - `#[dom(page)]`, `#[dom(component)]` (default), `#[dom(form)]`
/// - `#[dom(name = "...")]` - container name (defaults to the struct name)
/// - `#[dom(url = "...")]` - URL template for pages, with `{name}` placeholders
///
/// # Field attributes
///
/// - `css`, `xpath`, `link_text`, `partial_link_text`, `selector` - selectors,
///   tried in the order they are written
/// - `wait = <seconds>` - wait budget
/// - `default = <expr>` - value returned when nothing matches
/// - `attribute = "..."` - attribute read instead of the visible text
/// - `format = "..."` - date pattern; `DateTime<FixedOffset>` fields need one
///   with a `%z` offset, use `NaiveDateTime` for pages without offsets
/// - `frame` - the nested container lives inside the matched frame
/// - `input`, `checkbox`, `radio` - writable accessors for plain `String` /
///   `bool` / `Option<String>` fields
#[proc_macro_derive(Container, attributes(dom))]
pub fn derive_container(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ============================================================================
// Expansion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Page,
    Component,
    Form,
}

struct ContainerAttrs {
    variant: Variant,
    name: Option<LitStr>,
    url: Option<LitStr>,
}

struct FieldSpec {
    ident: Ident,
    ty: Type,
    directives: Vec<TokenStream2>,
    writable: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let vis = &input.vis;
    let attrs = container_attrs(&input.attrs)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Container can only be derived for structs",
        ));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            name,
            "Container can only be derived for structs with named fields",
        ));
    };

    let fields = named
        .named
        .iter()
        .map(|field| {
            let ident = field
                .ident
                .clone()
                .ok_or_else(|| syn::Error::new_spanned(field, "field must be named"))?;
            field_spec(ident, field.ty.clone(), &field.attrs)
        })
        .collect::<syn::Result<Vec<_>>>()?;

    let container_name = attrs
        .name
        .unwrap_or_else(|| LitStr::new(&name.to_string(), Span::call_site()));
    let variant = match attrs.variant {
        Variant::Page => quote!(::domap::Variant::Page),
        Variant::Component => quote!(::domap::Variant::Component),
        Variant::Form => quote!(::domap::Variant::Form),
    };
    let url = attrs.url.map(|url| quote!(.url(#url)));

    let declarations = fields.iter().map(|field| {
        let field_name = field.ident.to_string();
        let declared = declared(&field.ty);
        let directives = &field.directives;
        quote! {
            .field(#field_name, #declared, ::std::vec![#(#directives),*])
        }
    });

    let fields_trait = format_ident!("{}Fields", name);
    let getter_sigs: Vec<_> = fields
        .iter()
        .map(|field| {
            let ident = &field.ident;
            let ret = getter_type(&field.ty);
            quote!(fn #ident(&self) -> ::domap::DomapResult<#ret>)
        })
        .collect();
    let getter_bodies = fields.iter().zip(&getter_sigs).map(|(field, sig)| {
        let field_name = field.ident.to_string();
        quote! {
            #sig {
                self.get_as(#field_name)
            }
        }
    });
    let setters: Vec<_> = fields
        .iter()
        .filter(|field| field.writable)
        .map(|field| {
            let setter = format_ident!("set_{}", field.ident);
            let field_name = field.ident.to_string();
            (
                quote!(fn #setter<V: ::std::convert::Into<::domap::Write>>(&self, value: V) -> ::domap::DomapResult<()>),
                field_name,
            )
        })
        .collect();
    let setter_sigs = setters.iter().map(|(sig, _)| sig);
    let setter_bodies = setters.iter().map(|(sig, field_name)| {
        quote! {
            #sig {
                self.set(#field_name, value)
            }
        }
    });

    let marker = match attrs.variant {
        Variant::Page => Some(quote!(impl ::domap::Page for #name {})),
        Variant::Form => Some(quote!(impl ::domap::Form for #name {})),
        Variant::Component => None,
    };
    let trait_doc = format!("Typed field accessors of [`{name}`]");

    Ok(quote! {
        impl ::domap::Container for #name {
            const NAME: &'static str = #container_name;
            const VARIANT: ::domap::Variant = #variant;

            fn declare(builder: ::domap::SchemaBuilder) -> ::domap::SchemaBuilder {
                builder #url #(#declarations)*
            }
        }

        #marker

        #[doc = #trait_doc]
        #vis trait #fields_trait {
            #(
                #[allow(missing_docs)]
                #getter_sigs;
            )*
            #(
                #[allow(missing_docs)]
                #setter_sigs;
            )*
        }

        impl #fields_trait for ::domap::Area<#name> {
            #(#getter_bodies)*
            #(#setter_bodies)*
        }
    })
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn container_attrs(attrs: &[Attribute]) -> syn::Result<ContainerAttrs> {
    let mut parsed = ContainerAttrs {
        variant: Variant::Component,
        name: None,
        url: None,
    };
    for attr in attrs.iter().filter(|a| a.path().is_ident("dom")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("page") {
                parsed.variant = Variant::Page;
            } else if meta.path.is_ident("component") {
                parsed.variant = Variant::Component;
            } else if meta.path.is_ident("form") {
                parsed.variant = Variant::Form;
            } else if meta.path.is_ident("name") {
                parsed.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("url") {
                parsed.url = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown container attribute"));
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}

fn field_spec(ident: Ident, ty: Type, attrs: &[Attribute]) -> syn::Result<FieldSpec> {
    let mut directives = Vec::new();
    let mut format = None;
    let mut writable = matches!(
        base_name(&ty).as_deref(),
        Some("InputValue" | "Checkbox" | "Radio")
    );

    for attr in attrs.iter().filter(|a| a.path().is_ident("dom")) {
        attr.parse_nested_meta(|meta| {
            let selector = ["css", "xpath", "link_text", "partial_link_text", "selector"]
                .into_iter()
                .find(|key| meta.path.is_ident(key));
            if let Some(key) = selector {
                let path: LitStr = meta.value()?.parse()?;
                let constructor = format_ident!("{}", key);
                directives.push(quote!(::domap::Directive::#constructor(#path)));
            } else if meta.path.is_ident("wait") {
                let seconds = match meta.value()?.parse::<Lit>()? {
                    Lit::Int(lit) => lit.base10_parse::<f64>()?,
                    Lit::Float(lit) => lit.base10_parse::<f64>()?,
                    other => return Err(syn::Error::new_spanned(other, "wait expects seconds")),
                };
                directives.push(quote!(::domap::Directive::wait(#seconds)));
            } else if meta.path.is_ident("default") {
                let value: Expr = meta.value()?.parse()?;
                directives.push(quote!(::domap::Directive::default(#value)));
            } else if meta.path.is_ident("attribute") {
                let name: LitStr = meta.value()?.parse()?;
                directives.push(quote!(::domap::Directive::attribute(#name)));
            } else if meta.path.is_ident("format") {
                let pattern: LitStr = meta.value()?.parse()?;
                format = Some(pattern.value());
                directives.push(quote!(::domap::Directive::format(#pattern)));
            } else if meta.path.is_ident("frame") {
                directives.push(quote!(::domap::Directive::Frame));
            } else if meta.path.is_ident("input") {
                writable = true;
                directives.push(quote!(::domap::Directive::Flag(::domap::Flag::Input)));
            } else if meta.path.is_ident("checkbox") {
                writable = true;
                directives.push(quote!(::domap::Directive::Flag(::domap::Flag::Checkbox)));
            } else if meta.path.is_ident("radio") {
                writable = true;
                directives.push(quote!(::domap::Directive::Flag(::domap::Flag::Radio)));
            } else {
                return Err(meta.error("unknown field attribute"));
            }
            Ok(())
        })?;
    }

    if base_name(&ty).as_deref() == Some("DateTime") && !format.as_deref().is_some_and(has_offset)
    {
        return Err(syn::Error::new_spanned(
            &ty,
            "DateTime fields need a `format` with a %z offset; use NaiveDateTime otherwise",
        ));
    }

    Ok(FieldSpec {
        ident,
        ty,
        directives,
        writable,
    })
}

// ============================================================================
// Type mapping
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrapper {
    Vec,
    Option,
}

/// Strip one `Vec<T>` or `Option<T>` layer
fn unwrap_type(ty: &Type) -> Option<(Wrapper, &Type)> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    let wrapper = match segment.ident.to_string().as_str() {
        "Vec" => Wrapper::Vec,
        "Option" => Wrapper::Option,
        _ => return None,
    };
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some((wrapper, inner)),
        _ => None,
    }
}

/// Last path segment of the type, e.g. `NaiveDate` for `chrono::NaiveDate`
fn base_name(ty: &Type) -> Option<String> {
    let ty = unwrap_type(ty).map_or(ty, |(_, inner)| inner);
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// Constructor of a leaf kind, `None` for nested containers
fn leaf_constructor(name: &str) -> Option<&'static str> {
    Some(match name {
        "String" => "text",
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64" | "usize" => "integer",
        "f32" | "f64" => "float",
        "NaiveDate" => "date",
        "NaiveDateTime" | "DateTime" => "datetime",
        "bool" => "boolean",
        "Link" => "link",
        "ImageSrc" => "image_src",
        "InnerHtml" => "inner_html",
        "OuterHtml" => "outer_html",
        "InputValue" => "input_value",
        "Checkbox" => "checkbox",
        "Radio" => "radio",
        "Element" | "NodeId" => "node",
        _ => return None,
    })
}

/// Whether a chrono pattern parses a UTC offset
fn has_offset(format: &str) -> bool {
    ["%z", "%:z", "%::z", "%#z"]
        .iter()
        .any(|offset| format.contains(offset))
}

fn is_leaf(ty: &Type) -> bool {
    base_name(ty).is_some_and(|name| leaf_constructor(&name).is_some())
}

/// `Declared` expression for a field type
fn declared(ty: &Type) -> TokenStream2 {
    let (wrapper, inner) = match unwrap_type(ty) {
        Some((wrapper, inner)) => (Some(wrapper), inner),
        None => (None, ty),
    };
    let base = match base_name(inner).as_deref().and_then(leaf_constructor) {
        Some(constructor) => {
            let constructor = format_ident!("{}", constructor);
            quote!(::domap::Declared::#constructor())
        }
        None => quote!(::domap::Declared::component::<#inner>()),
    };
    match wrapper {
        Some(Wrapper::Vec) => quote!(#base.many()),
        Some(Wrapper::Option) => quote!(#base.optional()),
        None => base,
    }
}

/// Return type of the generated getter: containers are read as `Area`s
fn getter_type(ty: &Type) -> TokenStream2 {
    if is_leaf(ty) {
        return quote!(#ty);
    }
    match unwrap_type(ty) {
        Some((Wrapper::Vec, inner)) => quote!(::std::vec::Vec<::domap::Area<#inner>>),
        Some((Wrapper::Option, inner)) => quote!(::std::option::Option<::domap::Area<#inner>>),
        None => quote!(::domap::Area<#ty>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_leaf_types() {
        let cases: [(Type, &str); 6] = [
            (parse_quote!(String), "text"),
            (parse_quote!(u32), "integer"),
            (parse_quote!(chrono::NaiveDate), "date"),
            (parse_quote!(Link), "link"),
            (parse_quote!(InputValue), "input_value"),
            (parse_quote!(domap::Element), "node"),
        ];
        for (ty, expected) in cases {
            let name = base_name(&ty).unwrap_or_default();
            assert_eq!(leaf_constructor(&name), Some(expected));
        }
    }

    #[test]
    fn test_wrappers_are_unwrapped() {
        let many: Type = parse_quote!(Vec<String>);
        assert_eq!(declared(&many).to_string(), quote!(::domap::Declared::text().many()).to_string());
        let optional: Type = parse_quote!(Option<f64>);
        assert_eq!(
            declared(&optional).to_string(),
            quote!(::domap::Declared::float().optional()).to_string()
        );
    }

    #[test]
    fn test_unknown_types_are_containers() {
        let ty: Type = parse_quote!(Vec<Quote>);
        assert!(!is_leaf(&ty));
        assert_eq!(
            declared(&ty).to_string(),
            quote!(::domap::Declared::component::<Quote>().many()).to_string()
        );
        assert_eq!(
            getter_type(&ty).to_string(),
            quote!(::std::vec::Vec<::domap::Area<Quote>>).to_string()
        );
    }

    #[test]
    fn test_writable_aliases() {
        let field = field_spec(parse_quote!(query), parse_quote!(InputValue), &[]);
        assert!(field.is_ok_and(|f| f.writable));
        let attrs: Vec<Attribute> = vec![parse_quote!(#[dom(css = "a")])];
        let field = field_spec(parse_quote!(title), parse_quote!(String), &attrs);
        assert!(field.is_ok_and(|f| !f.writable && f.directives.len() == 1));
    }

    #[test]
    fn test_radio_fields_are_writable() {
        let field = field_spec(parse_quote!(size), parse_quote!(Radio), &[]);
        assert!(field.is_ok_and(|f| f.writable));
        assert_eq!(leaf_constructor("Radio"), Some("radio"));
        let attrs: Vec<Attribute> = vec![parse_quote!(#[dom(css = "input", radio)])];
        let field = field_spec(parse_quote!(size), parse_quote!(Option<String>), &attrs);
        assert!(field.is_ok_and(|f| f.writable && f.directives.len() == 2));
    }

    #[test]
    fn test_zoned_datetime_requires_offset_format() {
        let ty: Type = parse_quote!(DateTime<FixedOffset>);
        assert!(field_spec(parse_quote!(at), ty.clone(), &[]).is_err());
        let naive: Vec<Attribute> = vec![parse_quote!(#[dom(css = "time", format = "%Y-%m-%d %H:%M")])];
        let err = field_spec(parse_quote!(at), ty.clone(), &naive).err();
        assert!(err.is_some_and(|e| e.to_string().contains("%z")));
        let zoned: Vec<Attribute> =
            vec![parse_quote!(#[dom(css = "time", format = "%Y-%m-%d %H:%M %:z")])];
        assert!(field_spec(parse_quote!(at), ty, &zoned).is_ok());
        let optional: Type = parse_quote!(Option<chrono::DateTime<chrono::FixedOffset>>);
        assert!(field_spec(parse_quote!(at), optional, &naive).is_err());
    }

    #[test]
    fn test_naive_datetime_needs_no_offset() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[dom(css = "time", format = "%Y-%m-%d %H:%M")])];
        assert!(field_spec(parse_quote!(at), parse_quote!(NaiveDateTime), &attrs).is_ok());
    }

    #[test]
    fn test_unknown_field_attribute_is_error() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[dom(retries = 3)])];
        assert!(field_spec(parse_quote!(title), parse_quote!(String), &attrs).is_err());
    }
}
