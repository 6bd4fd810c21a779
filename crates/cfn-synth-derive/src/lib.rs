//! Provides derive macros for `synth::HasDependencies`.
use quote::quote;
use syn::{Data, DataStruct, DeriveInput, Field, Fields, FieldsNamed};

/// Returns `true` if the field is marked `#[synth(skip)]`.
fn is_skipped(field: &Field) -> syn::Result<bool> {
    let mut skip = false;
    for att in field.attrs.iter() {
        if att.path().is_ident("synth") {
            att.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error(format!(
                        "unsupported field attribute {:?} - must be 'skip'",
                        meta.path
                            .get_ident()
                            .map(|id| id.to_string())
                            .unwrap_or("unknown".to_string())
                    )))
                }
            })?;
        }
    }
    Ok(skip)
}

fn get_merges(input: &DeriveInput) -> syn::Result<Vec<proc_macro2::TokenStream>> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(FieldsNamed { named, .. }),
            ..
        }) => named,
        Data::Struct(DataStruct {
            fields: Fields::Unit,
            ..
        }) => return Ok(vec![]),
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "deriving HasDependencies only supports structs with named fields".to_string(),
            ));
        }
    };

    let mut merges = vec![];
    for field in fields.iter() {
        if is_skipped(field)? {
            continue;
        }
        // UNWRAP: safe because we only support structs with named fields
        let ident = field.ident.clone().unwrap();
        merges.push(quote! {
            .merge(synth::HasDependencies::dependencies(&self.#ident))
        });
    }
    Ok(merges)
}

#[proc_macro_derive(HasDependencies, attributes(synth))]
pub fn derive_has_dependencies(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input: DeriveInput = syn::parse_macro_input!(input);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let merges = match get_merges(&input) {
        Ok(m) => m,
        Err(e) => return e.into_compile_error().into(),
    };

    let output = quote! {
        impl #impl_generics synth::HasDependencies for #name #ty_generics #where_clause {
            fn dependencies(&self) -> synth::Dependencies {
                synth::Dependencies::default()
                    #(#merges)*
            }
        }
    };
    output.into()
}
