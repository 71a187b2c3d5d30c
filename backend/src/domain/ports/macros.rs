//! Helper macro for generating domain port error enums.
//!
//! Each variant gets a snake_case constructor whose fields accept
//! `impl Into<T>`. An optional `retryable: [...]` clause generates
//! `is_retryable()` for the listed variants.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
        retryable: [$($retryable:ident),* $(,)?]
    ) => {
        define_port_error! {
            $(#[$outer])*
            pub enum $name {
                $(
                    $(#[$variant_meta])*
                    $variant $( { $($field : $ty),* } )? => $message
                ),*
            }
        }

        impl $name {
            /// Whether a fresh call with the same input may succeed.
            pub fn is_retryable(&self) -> bool {
                matches!(self, $(Self::$retryable { .. })|*)
            }
        }
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    define_port_error! {
        pub enum NarrationError {
            Busy { message: String } => "busy: {message}",
            Quota { remaining: u32 } => "quota: {remaining}",
            Rejected { message: String, code: u32 } => "rejected: {message} ({code})",
        }
        retryable: [Busy, Quota]
    }

    define_port_error! {
        pub enum LookupError {
            Missing => "missing",
        }
    }

    #[test]
    fn constructors_accept_str_for_string_fields() {
        assert_eq!(NarrationError::busy("try later").to_string(), "busy: try later");
    }

    #[test]
    fn constructors_support_mixed_fields() {
        let err = NarrationError::rejected("voice", 7_u32);
        assert_eq!(err.to_string(), "rejected: voice (7)");
    }

    #[test]
    fn retryable_clause_classifies_variants() {
        assert!(NarrationError::busy("x").is_retryable());
        assert!(NarrationError::quota(0_u32).is_retryable());
        assert!(!NarrationError::rejected("x", 1_u32).is_retryable());
    }

    #[test]
    fn unit_variants_get_constructors() {
        assert_eq!(LookupError::missing(), LookupError::Missing);
    }
}
