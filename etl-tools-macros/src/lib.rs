//! Procedural macros for ETL MCP tool definitions.
//!
//! `#[tool]` keeps the annotated function as written and emits a companion
//! constructor, `<fn>_tool()`, returning an `etl_tools::ToolRecord`. The
//! record decodes JSON input into the function's parameters, calls it, and
//! serialises the return value.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, Expr, ExprLit, FnArg, ItemFn, Lit, LitStr, Meta, Pat, ReturnType, Type,
    parse_macro_input,
};

#[derive(Default)]
struct ToolAttr {
    name: Option<LitStr>,
    description: Option<LitStr>,
}

/// Marks a function as a tool.
///
/// Accepted forms:
///
/// ```ignore
/// #[tool]
/// fn add(a: i64, b: i64) -> i64 { a + b }
///
/// #[tool(name = "hello_tool", description = "returns hello")]
/// async fn hello(name: String) -> Result<String, ToolError> { Ok(format!("hello {name}")) }
/// ```
///
/// The tool name defaults to the function name and the description to the
/// first paragraph of its doc comment. `async` functions become deferred
/// tools, everything else immediate. Parameters must be owned types that
/// implement `Deserialize`; `Option` parameters may be left out of the input.
/// A return type whose name ends in `Result` is treated as fallible and its
/// error converted with `Into<ToolError>`.
#[proc_macro_attribute]
pub fn tool(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = ToolAttr::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            args.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("description") {
            args.description = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported tool attribute; expected `name` or `description`"))
        }
    });
    parse_macro_input!(attr with parser);

    let function = parse_macro_input!(item as ItemFn);
    expand(args, function)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(attr: ToolAttr, function: ItemFn) -> syn::Result<TokenStream2> {
    let sig = &function.sig;
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "tool functions cannot be generic",
        ));
    }

    let name = match &attr.name {
        Some(lit) if lit.value().trim().is_empty() => {
            return Err(syn::Error::new(lit.span(), "tool name cannot be empty"));
        }
        Some(lit) => lit.value(),
        None => sig.ident.to_string(),
    };
    let description = match attr
        .description
        .map(|lit| lit.value())
        .or_else(|| doc_summary(&function.attrs))
    {
        Some(text) => quote!(::core::option::Option::Some(#text)),
        None => quote!(::core::option::Option::None),
    };

    let mut fields = Vec::new();
    let mut params = Vec::new();
    for input in &sig.inputs {
        let typed = match input {
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "tool functions cannot take `self`",
                ));
            }
            FnArg::Typed(typed) => typed,
        };
        let Pat::Ident(pat) = &*typed.pat else {
            return Err(syn::Error::new_spanned(
                &typed.pat,
                "tool parameters must be plain identifiers",
            ));
        };
        let param = &pat.ident;
        let ty = &typed.ty;
        let default = if is_option(ty) {
            quote!(#[serde(default)])
        } else {
            TokenStream2::new()
        };
        fields.push(quote!(#default #param: #ty));
        params.push(param.clone());
    }

    let decode = if params.is_empty() {
        quote!(let _ = __input;)
    } else {
        quote! {
            #[derive(::etl_tools::__private::serde::Deserialize)]
            #[serde(crate = "::etl_tools::__private::serde")]
            struct __ToolArgs {
                #(#fields,)*
            }
            let __ToolArgs { #(#params,)* } = ::etl_tools::parse_args(#name, __input)?;
        }
    };

    let ident = &sig.ident;
    let call = if sig.asyncness.is_some() {
        quote!(#ident(#(#params),*).await)
    } else {
        quote!(#ident(#(#params),*))
    };
    let convert = if returns_result(&sig.output) {
        quote!(::etl_tools::__private::fallible_output)
    } else {
        quote!(::etl_tools::__private::infallible_output)
    };

    let executor = if sig.asyncness.is_some() {
        quote! {
            ::etl_tools::__private::deferred(#name, #description, |__input| async move {
                #decode
                #convert(#call)
            })
        }
    } else {
        quote! {
            ::etl_tools::__private::immediate(#name, #description, |__input| {
                #decode
                #convert(#call)
            })
        }
    };

    let vis = &function.vis;
    let constructor = format_ident!("{}_tool", ident);
    let doc = format!("Builds the `{name}` tool record for [`{ident}`].");

    Ok(quote! {
        #function

        #[doc = #doc]
        #[must_use]
        #vis fn #constructor() -> ::etl_tools::ToolRecord {
            #executor
        }
    })
}

fn doc_summary(attrs: &[Attribute]) -> Option<String> {
    let mut lines = Vec::new();
    for attr in attrs {
        let Meta::NameValue(meta) = &attr.meta else {
            continue;
        };
        if !meta.path.is_ident("doc") {
            continue;
        }
        if let Expr::Lit(ExprLit {
            lit: Lit::Str(text),
            ..
        }) = &meta.value
        {
            let line = text.value().trim().to_owned();
            if line.is_empty() && !lines.is_empty() {
                break;
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }
    (!lines.is_empty()).then(|| lines.join(" "))
}

fn last_segment(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|seg| seg.ident.to_string()),
        Type::Group(group) => last_segment(&group.elem),
        Type::Paren(paren) => last_segment(&paren.elem),
        _ => None,
    }
}

fn is_option(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|ident| ident == "Option")
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => last_segment(ty).is_some_and(|ident| ident.ends_with("Result")),
    }
}
