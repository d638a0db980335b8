/// Macro to implement `From<T>` for newtype wrappers around primitive types.
#[macro_export]
macro_rules! impl_from_primitive {
    ($wrapper:ident, $primitive:ty) => {
        impl From<$primitive> for $wrapper {
            fn from(value: $primitive) -> Self {
                Self(value)
            }
        }

        impl From<$wrapper> for $primitive {
            fn from(wrapper: $wrapper) -> Self {
                wrapper.0
            }
        }
    };
}

/// Macro to implement `Sub` and a ratio-yielding `Div` for newtype wrappers around
/// numeric types.
#[macro_export]
macro_rules! impl_arith_primitive {
    ($wrapper:ident, $primitive:ty) => {
        impl std::ops::Sub for $wrapper {
            type Output = Self;

            fn sub(self, other: Self) -> Self {
                Self(self.0 - other.0)
            }
        }

        impl std::ops::Div for $wrapper {
            type Output = $primitive;

            fn div(self, other: Self) -> $primitive {
                self.0 / other.0
            }
        }
    };
}
