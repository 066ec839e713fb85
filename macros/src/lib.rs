//! Derive macros for Komiut actions and versioned state
//!
//! # Available Macros
//!
//! - `#[derive(Action)]` - Classifies action variants as commands or events and
//!   gives every variant a stable snake_case name for logs and metrics
//! - `#[derive(State)]` - Generates accessors for a `#[version]` field
//!
//! # Example
//!
//! ```ignore
//! use komiut_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum QueueAction {
//!     #[command]
//!     ClearError,
//!
//!     #[event]
//!     FrameReceived { raw: String },
//! }
//!
//! assert!(QueueAction::ClearError.is_command());
//! assert_eq!(QueueAction::ClearError.action_name(), "clear_error");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, parse_macro_input};

/// Derive macro for Action enums
///
/// Generates helper methods for action enums:
/// - `is_command()` - Returns true if this variant is marked `#[command]`
/// - `is_event()` - Returns true if this variant is marked `#[event]`
/// - `action_name()` - snake_case variant name, for every variant
///
/// # Attributes
///
/// - `#[command]` - Mark a variant as a command (an intent that may be refused)
/// - `#[event]` - Mark a variant as an event (a fact reported by a collaborator)
///
/// # Panics
///
/// This macro will produce a compile error (not a runtime panic) if:
/// - Applied to a non-enum type
/// - A variant has both `#[command]` and `#[event]` attributes
#[proc_macro_derive(Action, attributes(command, event))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut is_command_arms = Vec::new();
    let mut is_event_arms = Vec::new();
    let mut name_arms = Vec::new();

    for variant in &data_enum.variants {
        let is_command = has_attribute(&variant.attrs, "command");
        let is_event = has_attribute(&variant.attrs, "event");

        if is_command && is_event {
            return syn::Error::new_spanned(variant, "Variant cannot be both #[command] and #[event]")
                .to_compile_error()
                .into();
        }

        let pattern = variant_pattern(&variant.ident, &variant.fields);

        if is_command {
            is_command_arms.push(quote! { #pattern => true, });
        }
        if is_event {
            is_event_arms.push(quote! { #pattern => true, });
        }

        let snake = to_snake_case(&variant.ident.to_string());
        name_arms.push(quote! { #pattern => #snake, });
    }

    // An enum without variants has no arms; the wildcard keeps the match exhaustive.
    let expanded = quote! {
        impl #name {
            /// Returns true if this action is a command
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_command(&self) -> bool {
                match self {
                    #(#is_command_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is an event
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_event(&self) -> bool {
                match self {
                    #(#is_event_arms)*
                    _ => false,
                }
            }

            /// Stable snake_case name of this action, for logs and metric labels
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn action_name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                    _ => "unknown",
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for State structs
///
/// A field marked `#[version]` must be a `komiut_core::version::Version`.
/// The macro generates:
/// - `version()` - current snapshot version
/// - `bump_version()` - advance to the next version (call once per reduction)
///
/// Structs without a `#[version]` field get no methods.
///
/// # Panics
///
/// This macro will produce a compile error (not a runtime panic) if:
/// - Applied to a non-struct type
/// - More than one field is marked `#[version]`
/// - The `#[version]` field is unnamed
#[proc_macro_derive(State, attributes(version))]
pub fn derive_state(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Struct(data_struct) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(State)] can only be used on structs")
            .to_compile_error()
            .into();
    };

    let mut version_fields = data_struct
        .fields
        .iter()
        .filter(|field| has_attribute(&field.attrs, "version"));

    let Some(field) = version_fields.next() else {
        return TokenStream::new();
    };

    if let Some(extra) = version_fields.next() {
        return syn::Error::new_spanned(extra, "Only one field may be marked #[version]")
            .to_compile_error()
            .into();
    }

    let Some(field_name) = field.ident.as_ref() else {
        return syn::Error::new_spanned(field, "#[version] requires a named field")
            .to_compile_error()
            .into();
    };

    let expanded = quote! {
        impl #name {
            /// Current snapshot version of this state
            #[must_use]
            pub const fn version(&self) -> ::komiut_core::version::Version {
                self.#field_name
            }

            /// Advance the snapshot version
            pub fn bump_version(&mut self) {
                self.#field_name = self.#field_name.next();
            }
        }
    };

    TokenStream::from(expanded)
}

/// Match pattern that ignores the variant's fields
fn variant_pattern(ident: &Ident, fields: &Fields) -> proc_macro2::TokenStream {
    match fields {
        Fields::Named(_) => quote! { Self::#ident { .. } },
        Fields::Unnamed(_) => quote! { Self::#ident(..) },
        Fields::Unit => quote! { Self::#ident },
    }
}

/// Helper function to check if an attribute list contains a specific attribute
fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// `SelectionTimedOut` -> `selection_timed_out`
fn to_snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, ch) in ident.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::to_snake_case;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("SelectionTimedOut"), "selection_timed_out");
        assert_eq!(to_snake_case("ClearError"), "clear_error");
        assert_eq!(to_snake_case("Ping"), "ping");
    }
}
