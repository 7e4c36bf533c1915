//! Conversion of Rust argument lists into ordered bind parameters.

use crate::models::SqlValue;

/// Anything that can be turned into an ordered list of bind parameters.
///
/// Implemented for `()`, tuples of up to twelve elements, arrays, slices and
/// vectors of values convertible into [`SqlValue`]. The [`params!`](crate::params)
/// macro builds a heterogeneous list directly.
pub trait IntoParams {
    fn into_params(self) -> Vec<SqlValue>;
}

impl IntoParams for () {
    fn into_params(self) -> Vec<SqlValue> {
        Vec::new()
    }
}

impl<T: Into<SqlValue>> IntoParams for Vec<T> {
    fn into_params(self) -> Vec<SqlValue> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<SqlValue>, const N: usize> IntoParams for [T; N] {
    fn into_params(self) -> Vec<SqlValue> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<SqlValue> + Clone> IntoParams for &[T] {
    fn into_params(self) -> Vec<SqlValue> {
        self.iter().cloned().map(Into::into).collect()
    }
}

macro_rules! impl_into_params_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<SqlValue>),+> IntoParams for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_params(self) -> Vec<SqlValue> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

impl_into_params_tuple!(A);
impl_into_params_tuple!(A, B);
impl_into_params_tuple!(A, B, C);
impl_into_params_tuple!(A, B, C, D);
impl_into_params_tuple!(A, B, C, D, E);
impl_into_params_tuple!(A, B, C, D, E, F);
impl_into_params_tuple!(A, B, C, D, E, F, G);
impl_into_params_tuple!(A, B, C, D, E, F, G, H);
impl_into_params_tuple!(A, B, C, D, E, F, G, H, I);
impl_into_params_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_into_params_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_into_params_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

/// Build a `Vec<SqlValue>` from heterogeneous values.
///
/// ```
/// let params = simpledb::params![1, "abc", None::<i64>];
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::SqlValue::from($value)),+]
    };
}
