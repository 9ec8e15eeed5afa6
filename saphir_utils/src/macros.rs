//! Utility macros.

/// Creates a [`StringHash`](crate::StringHash) for the given string literal
/// or owned [`String`].
#[macro_export]
macro_rules! hash {
    ($string:literal) => {
        $crate::StringHash::of_literal($string)
    };
    ($string:expr) => {
        $crate::StringHash::of_owned($string)
    };
}

/// Defines a new type with the given name that is a wrapper
/// around a [`StringHash`](crate::StringHash).
#[macro_export]
macro_rules! stringhash_newtype {
    (
        $(#[$attributes:meta])*
        $([$pub:ident])? $name:ident
    ) => {
        $(#[$attributes])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $($pub)? struct $name($($pub)? $crate::StringHash);

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
