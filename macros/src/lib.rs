use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Expr, FnArg, Ident, ItemFn, Lit, Pat, ReturnType, Token, Type, parse::Parse,
    parse::ParseStream, parse_macro_input,
};

/// Name of the parameter that carries the `CacheManager`.
const CACHE_PARAM: &str = "cache";

struct MacroArgs {
    cache_name: String,
    ttl: Option<u64>,
    key_params: Vec<String>,
}

impl Parse for MacroArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut cache_name = None;
        let mut ttl = None;
        let mut key_params = Vec::new();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "name" => {
                    let lit: Lit = input.parse()?;
                    if let Lit::Str(s) = lit {
                        cache_name = Some(s.value());
                    } else {
                        return Err(syn::Error::new(lit.span(), "name must be a string literal"));
                    }
                }
                "ttl" => {
                    let lit: Lit = input.parse()?;
                    if let Lit::Int(i) = lit {
                        ttl = Some(i.base10_parse()?);
                    } else {
                        return Err(syn::Error::new(lit.span(), "ttl must be an integer"));
                    }
                }
                "key" => {
                    let expr: Expr = input.parse()?;
                    match &expr {
                        Expr::Path(path) if path.path.get_ident().is_some() => {
                            if let Some(ident) = path.path.get_ident() {
                                key_params.push(ident.to_string());
                            }
                        }
                        _ => {
                            return Err(syn::Error::new_spanned(
                                expr,
                                "key must be a parameter name",
                            ));
                        }
                    }
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!(
                            "unknown attribute `{}`, expected `name`, `ttl`, or `key`",
                            other
                        ),
                    ));
                }
            }

            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        let cache_name = cache_name
            .ok_or_else(|| syn::Error::new(input.span(), "missing required attribute `name`"))?;

        Ok(MacroArgs {
            cache_name,
            ttl,
            key_params,
        })
    }
}

/// Whether the return type looks like `Result<..>` or an alias such as `anyhow::Result<..>`.
fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Path(path) => path
                .path
                .segments
                .last()
                .is_some_and(|segment| segment.ident.to_string().ends_with("Result")),
            _ => false,
        },
        ReturnType::Default => false,
    }
}

fn param_names(input_fn: &ItemFn) -> Vec<Ident> {
    input_fn
        .sig
        .inputs
        .iter()
        .filter_map(|arg| {
            if let FnArg::Typed(pat_type) = arg {
                if let Pat::Ident(pat_ident) = &*pat_type.pat {
                    return Some(pat_ident.ident.clone());
                }
            }
            None
        })
        .collect()
}

fn expand(args: MacroArgs, input_fn: ItemFn) -> syn::Result<proc_macro2::TokenStream> {
    let sig = &input_fn.sig;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &sig.fn_token,
            "#[memoized] requires an async fn; use Memoizer::call for synchronous code",
        ));
    }
    if let Some(receiver) = sig.receiver() {
        return Err(syn::Error::new_spanned(
            receiver,
            "#[memoized] does not support methods",
        ));
    }

    let params = param_names(&input_fn);
    let cache_ident = params
        .iter()
        .find(|p| *p == CACHE_PARAM)
        .cloned()
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &sig.inputs,
                "#[memoized] requires a `cache: &CacheManager` parameter",
            )
        })?;

    let key_idents: Vec<Ident> = if args.key_params.is_empty() {
        params.iter().filter(|p| *p != CACHE_PARAM).cloned().collect()
    } else {
        let mut idents = Vec::with_capacity(args.key_params.len());
        for name in &args.key_params {
            match params.iter().find(|p| *p == name) {
                Some(ident) => idents.push(ident.clone()),
                None => {
                    return Err(syn::Error::new_spanned(
                        &sig.ident,
                        format!("key parameter `{}` is not an argument of this function", name),
                    ));
                }
            }
        }
        idents
    };

    let cache_name = args.cache_name;
    let ttl_expr = match args.ttl {
        Some(ttl) => quote! {
            .with_ttl(::std::option::Option::Some(::std::time::Duration::from_secs(#ttl)))
        },
        None => quote! {},
    };
    let call = if returns_result(&sig.output) {
        quote! { try_call_async }
    } else {
        quote! { call_async }
    };

    let output_ty = match &sig.output {
        ReturnType::Type(_, ty) => quote! { #ty },
        ReturnType::Default => quote! { () },
    };

    let attrs = &input_fn.attrs;
    let vis = &input_fn.vis;
    let body = &input_fn.block;

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            let __memo_key = ::mcp_cache::cache::CallKey::new(#cache_name)
                #(.arg(&#key_idents))*;
            let __memoizer = ::mcp_cache::cache::Memoizer::new(
                ::std::clone::Clone::clone(#cache_ident)
            ) #ttl_expr;

            __memoizer
                .#call(__memo_key, move || async move {
                    let __memo_result: #output_ty = #body;
                    __memo_result
                })
                .await
        }
    })
}

/// Cache the results of an async function through a `CacheManager`.
///
/// The function must take a parameter named `cache` of type `&CacheManager`.
/// The cache key is built from `name` and the remaining arguments (or only the
/// ones listed with `key = param`). Functions returning a `Result` only cache
/// their `Ok` values.
///
/// ```ignore
/// #[memoized(name = "search_docs", ttl = 60, key = query)]
/// async fn search_docs(cache: &CacheManager, query: &str, request_id: u64) -> anyhow::Result<Vec<Doc>> {
///     index.search(query).await
/// }
/// ```
#[proc_macro_attribute]
pub fn memoized(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as MacroArgs);
    let input_fn = parse_macro_input!(input as ItemFn);

    match expand(args, input_fn) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}
