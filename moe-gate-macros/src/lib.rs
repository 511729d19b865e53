//! Procedural macros for moe-gate's op registry.
//!
//! - [`define_op!`] emits a function and registers it under a host-visible name.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Expr, Ident, ItemFn};

/// Input for `define_op!`: `name: EXPR, doc: EXPR, fn ...`
struct DefineOpInput {
    name: Expr,
    doc: Expr,
    func: ItemFn,
}

fn parse_keyed_expr(input: syn::parse::ParseStream, key: &str) -> syn::Result<Expr> {
    let kw: Ident = input.parse()?;
    if kw != key {
        return Err(syn::Error::new(kw.span(), format!("expected `{key}`")));
    }
    input.parse::<syn::Token![:]>()?;
    let expr: Expr = input.parse()?;
    input.parse::<syn::Token![,]>()?;
    Ok(expr)
}

impl syn::parse::Parse for DefineOpInput {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let name = parse_keyed_expr(input, "name")?;
        let doc = parse_keyed_expr(input, "doc")?;
        let func: ItemFn = input.parse()?;
        Ok(Self { name, doc, func })
    }
}

/// Define an op and register it with the op registry.
///
/// Generates three items:
/// 1. the function itself, unchanged;
/// 2. `register_{fn}` — registers the function pointer under `name`;
/// 3. an `inventory::submit!` that calls `register_{fn}` when
///    [`moe_gate::registry::init`] runs.
///
/// The registered type is the function pointer type built from the
/// signature, so lookups must use the same parameter and return types.
///
/// # Example
///
/// ```ignore
/// define_op! {
///     name: moe_gate::TOPK_SOFTMAX,
///     doc: moe_gate::TOPK_SOFTMAX_DOC,
///     pub fn topk_softmax(gating: &CpuTensor, params: &TopkSoftmaxParams) -> Result<TopkRouting<CpuTensor>> {
///         ...
///     }
/// }
/// ```
#[proc_macro]
pub fn define_op(input: TokenStream) -> TokenStream {
    let DefineOpInput { name, doc, func } = parse_macro_input!(input as DefineOpInput);

    let vis = &func.vis;
    let sig = &func.sig;
    let fn_name = &sig.ident;
    let register_name = format_ident!("register_{fn_name}");

    if !sig.generics.params.is_empty() {
        return syn::Error::new_spanned(&sig.generics, "define_op! functions cannot be generic")
            .to_compile_error()
            .into();
    }

    // Build the function pointer type from the signature
    let mut param_types = Vec::with_capacity(sig.inputs.len());
    for arg in &sig.inputs {
        match arg {
            syn::FnArg::Typed(pat_type) => {
                let ty = &pat_type.ty;
                param_types.push(quote! { #ty });
            }
            syn::FnArg::Receiver(recv) => {
                return syn::Error::new_spanned(recv, "define_op! functions cannot take `self`")
                    .to_compile_error()
                    .into();
            }
        }
    }

    let return_type = match &sig.output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ty) => quote! { #ty },
    };

    let output = quote! {
        #func

        /// Register this op with the op registry.
        #[doc(hidden)]
        #vis fn #register_name() {
            ::moe_gate::registry::register::<fn(#(#param_types),*) -> #return_type>(
                #name,
                #doc,
                #fn_name,
            );
        }

        ::inventory::submit! {
            ::moe_gate::registry::OpInit(#register_name)
        }
    };

    output.into()
}
