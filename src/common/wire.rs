//! Closed wire enumerations
//!
//! Every enumeration that crosses the API boundary keeps its wire name and
//! numeric code stable and has a fallback member for values this build does
//! not recognize. Serialization always emits the wire name; deserialization
//! accepts either the name or the numeric code.

/// Declares a wire enumeration.
///
/// Each variant is listed as `Variant = (code, "wire_name")`. The `fallback`
/// variant absorbs unrecognized names and codes.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = ($code:expr, $wire:literal), )+
        }
        fallback = $fallback:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every member, in wire-code order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// Wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire, )+
                }
            }

            /// Numeric wire code.
            pub fn code(&self) -> i32 {
                match self {
                    $( $name::$variant => $code, )+
                }
            }

            pub fn from_code(code: i32) -> Self {
                $( if code == $code { return $name::$variant; } )+
                $name::$fallback
            }

            pub fn from_wire(name: &str) -> Self {
                match name {
                    $( $wire => $name::$variant, )+
                    _ => $name::$fallback,
                }
            }

            /// Whether this value is a member this build understands.
            pub fn is_known(&self) -> bool {
                *self != $name::$fallback
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok($name::from_wire(s))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                struct WireVisitor;

                impl<'de> serde::de::Visitor<'de> for WireVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                        write!(f, "a {} name or numeric code", stringify!($name))
                    }

                    fn visit_str<E: serde::de::Error>(
                        self,
                        v: &str,
                    ) -> std::result::Result<$name, E> {
                        Ok($name::from_wire(v))
                    }

                    fn visit_i64<E: serde::de::Error>(
                        self,
                        v: i64,
                    ) -> std::result::Result<$name, E> {
                        Ok(i32::try_from(v).map($name::from_code).unwrap_or($name::$fallback))
                    }

                    fn visit_u64<E: serde::de::Error>(
                        self,
                        v: u64,
                    ) -> std::result::Result<$name, E> {
                        Ok(i32::try_from(v).map($name::from_code).unwrap_or($name::$fallback))
                    }
                }

                deserializer.deserialize_any(WireVisitor)
            }
        }
    };
}

pub(crate) use wire_enum;
